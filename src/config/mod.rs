//! Configuration module for Talpa
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//!
//! # Example
//!
//! ```no_run
//! use talpa::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("talpa.toml")).unwrap();
//! println!("Fetch workers: {}", config.engine.downloader_concurrency);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{
    Config, EngineConfig, ForumEntry, HttpConfig, OutputConfig, SiteEntry, UserAgentConfig,
};

// Re-export parser functions
pub use parser::{compute_config_hash, load_config, load_config_with_hash};
