use crate::config::types::{
    Config, EngineConfig, ForumEntry, OutputConfig, SiteEntry, UserAgentConfig,
};
use crate::ConfigError;
use std::collections::HashSet;
use url::Url;

const MAX_CONCURRENCY: usize = 256;
const MAX_QUEUE_CAPACITY_HINT: usize = 65_536;
const MAX_THREADS_PER_PAGE: u32 = 100;
const MIN_POSTS_PER_PAGE: u32 = 2;
const MAX_POSTS_PER_PAGE: u32 = 30;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_engine_config(&config.engine)?;
    validate_user_agent_config(&config.user_agent)?;
    validate_output_config(&config.output)?;
    validate_sites(&config.sites)?;
    validate_forums(&config.forums)?;
    validate_spider_names(config)?;
    Ok(())
}

/// Requires at least one spider and unique names across sites and forums
fn validate_spider_names(config: &Config) -> Result<(), ConfigError> {
    if config.sites.is_empty() && config.forums.is_empty() {
        return Err(ConfigError::Validation(
            "at least one [[site]] or [[forum]] entry is required".to_string(),
        ));
    }

    let mut names = HashSet::new();
    let all = config
        .sites
        .iter()
        .map(|site| site.name.as_str())
        .chain(config.forums.iter().map(|forum| forum.name.as_str()));
    for name in all {
        if !names.insert(name) {
            return Err(ConfigError::Validation(format!(
                "duplicate spider name '{}'",
                name
            )));
        }
    }

    Ok(())
}

/// Validates engine concurrency limits
fn validate_engine_config(config: &EngineConfig) -> Result<(), ConfigError> {
    for (name, value) in [
        ("downloader_concurrency", config.downloader_concurrency),
        ("scraper_concurrency", config.scraper_concurrency),
    ] {
        if !(1..=MAX_CONCURRENCY).contains(&value) {
            return Err(ConfigError::Validation(format!(
                "{} must be between 1 and {}, got {}",
                name, MAX_CONCURRENCY, value
            )));
        }
    }

    if config.queue_capacity_hint > MAX_QUEUE_CAPACITY_HINT {
        return Err(ConfigError::Validation(format!(
            "queue_capacity_hint must be at most {}, got {}",
            MAX_QUEUE_CAPACITY_HINT, config.queue_capacity_hint
        )));
    }

    Ok(())
}

/// Validates user agent configuration
fn validate_user_agent_config(config: &UserAgentConfig) -> Result<(), ConfigError> {
    if config.crawler_name.is_empty() {
        return Err(ConfigError::Validation(
            "crawler_name cannot be empty".to_string(),
        ));
    }

    if !config
        .crawler_name
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-')
    {
        return Err(ConfigError::Validation(format!(
            "crawler_name must contain only alphanumeric characters and hyphens, got '{}'",
            config.crawler_name
        )));
    }

    Url::parse(&config.contact_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid contact_url: {}", e)))?;

    validate_email(&config.contact_email)?;

    Ok(())
}

/// Validates output configuration
fn validate_output_config(config: &OutputConfig) -> Result<(), ConfigError> {
    if config.database_path.is_empty() {
        return Err(ConfigError::Validation(
            "database_path cannot be empty".to_string(),
        ));
    }

    if matches!(config.dump_dir.as_deref(), Some("")) {
        return Err(ConfigError::Validation(
            "dump_dir cannot be empty when set".to_string(),
        ));
    }

    Ok(())
}

/// Validates site entries and their seed URLs
fn validate_sites(sites: &[SiteEntry]) -> Result<(), ConfigError> {
    for site in sites {
        if site.name.is_empty() {
            return Err(ConfigError::Validation(
                "site name cannot be empty".to_string(),
            ));
        }

        if site.seeds.is_empty() {
            return Err(ConfigError::Validation(format!(
                "Site '{}' must have at least one seed URL",
                site.name
            )));
        }

        if site.max_pages < 1 {
            return Err(ConfigError::Validation(format!(
                "Site '{}' max_pages must be >= 1",
                site.name
            )));
        }

        for seed in &site.seeds {
            validate_http_url("Seed URL", seed)?;
        }
    }

    Ok(())
}

/// Validates forum entries, their endpoints and page sizes
fn validate_forums(forums: &[ForumEntry]) -> Result<(), ConfigError> {
    for forum in forums {
        if forum.name.is_empty() {
            return Err(ConfigError::Validation(
                "forum name cannot be empty".to_string(),
            ));
        }

        if forum.forum.is_empty() {
            return Err(ConfigError::Validation(format!(
                "Forum '{}' must name the forum to crawl",
                forum.name
            )));
        }

        validate_http_url("List endpoint", &forum.list_endpoint)?;
        validate_http_url("Thread endpoint", &forum.thread_endpoint)?;

        if forum.list_pages < 1 {
            return Err(ConfigError::Validation(format!(
                "Forum '{}' list_pages must be >= 1",
                forum.name
            )));
        }

        if !(1..=MAX_THREADS_PER_PAGE).contains(&forum.threads_per_page) {
            return Err(ConfigError::Validation(format!(
                "Forum '{}' threads_per_page must be between 1 and {}, got {}",
                forum.name, MAX_THREADS_PER_PAGE, forum.threads_per_page
            )));
        }

        if !(MIN_POSTS_PER_PAGE..=MAX_POSTS_PER_PAGE).contains(&forum.posts_per_page) {
            return Err(ConfigError::Validation(format!(
                "Forum '{}' posts_per_page must be between {} and {}, got {}",
                forum.name, MIN_POSTS_PER_PAGE, MAX_POSTS_PER_PAGE, forum.posts_per_page
            )));
        }

        if forum.params.contains_key("sign") {
            return Err(ConfigError::Validation(format!(
                "Forum '{}' params cannot set 'sign'",
                forum.name
            )));
        }
    }

    Ok(())
}

/// Requires an absolute http(s) URL
fn validate_http_url(what: &str, value: &str) -> Result<(), ConfigError> {
    let url = Url::parse(value)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid {} '{}': {}", what, value, e)))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(ConfigError::Validation(format!(
            "{} '{}' must use HTTP or HTTPS",
            what, value
        )));
    }

    Ok(())
}

/// Basic email validation
fn validate_email(email: &str) -> Result<(), ConfigError> {
    let parts: Vec<&str> = email.split('@').collect();
    if parts.len() != 2 || parts[0].is_empty() || parts[1].is_empty() {
        return Err(ConfigError::Validation(format!(
            "Invalid email format: '{}'",
            email
        )));
    }

    if !parts[1].contains('.') {
        return Err(ConfigError::Validation(format!(
            "Invalid email domain: '{}'",
            email
        )));
    }

    Ok(())
}
