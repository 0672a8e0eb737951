//! Form bodies for the forum API

use std::collections::BTreeMap;
use url::form_urlencoded;

/// Field carrying the signature
pub const SIGN_FIELD: &str = "sign";

/// Url-encodes `params` in key order and, given a secret, appends their
/// signature
///
/// The signature is the hex MD5 of every raw `key=value` pair concatenated in
/// key order without separators, followed by the secret.
pub fn signed_form(params: &BTreeMap<String, String>, secret: Option<&str>) -> String {
    let mut form = form_urlencoded::Serializer::new(String::new());
    form.extend_pairs(params);

    if let Some(secret) = secret {
        let mut plain = String::new();
        for (key, value) in params {
            plain.push_str(key);
            plain.push('=');
            plain.push_str(value);
        }
        plain.push_str(secret);
        form.append_pair(SIGN_FIELD, &format!("{:x}", md5::compute(plain.as_bytes())));
    }

    form.finish()
}
