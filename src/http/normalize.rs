use url::form_urlencoded::Serializer;
use url::Url;

/// Canonical form of a URL used for request identity
///
/// # Normalization Steps
///
/// 1. Host lowercased and default port dropped (done by the url parser)
/// 2. Path normalized:
///    - Dot segments and duplicate slashes removed
///    - Trailing slash removed (except for root /)
///    - Empty path becomes /
/// 3. Query parameters sorted by key, stable for repeated keys
/// 4. Empty query string removed
/// 5. Fragment removed unless `keep_fragment` is set
///
/// # Examples
///
/// ```
/// use talpa::http::canonicalize_url;
/// use url::Url;
///
/// let url = Url::parse("HTTP://Example.COM:80/a//b/?z=1&a=2#top").unwrap();
/// assert_eq!(
///     canonicalize_url(&url, false).as_str(),
///     "http://example.com/a/b?a=2&z=1"
/// );
/// ```
pub fn canonicalize_url(url: &Url, keep_fragment: bool) -> Url {
    let mut url = url.clone();

    if !keep_fragment {
        url.set_fragment(None);
    }

    // mailto:, data: and friends have no hierarchical path to normalize
    if url.cannot_be_a_base() {
        return url;
    }

    let path = normalize_path(url.path());
    url.set_path(&path);

    if url.query().is_some() {
        let params = sorted_query_params(&url);
        if params.is_empty() {
            url.set_query(None);
        } else {
            let query = Serializer::new(String::new()).extend_pairs(&params).finish();
            url.set_query(Some(&query));
        }
    }

    url
}

/// Normalizes a URL path by removing dot segments and trailing slashes
fn normalize_path(path: &str) -> String {
    let mut segments: Vec<&str> = Vec::new();

    for segment in path.split('/') {
        match segment {
            "" | "." => continue,
            ".." => {
                segments.pop();
            }
            _ => segments.push(segment),
        }
    }

    if segments.is_empty() {
        return "/".to_string();
    }

    format!("/{}", segments.join("/"))
}

fn sorted_query_params(url: &Url) -> Vec<(String, String)> {
    let mut params: Vec<(String, String)> = url
        .query_pairs()
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    params.sort_by(|a, b| a.0.cmp(&b.0));
    params
}
