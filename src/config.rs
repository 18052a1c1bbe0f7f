// src/config.rs

//! Configuration loading utilities.
//!
//! This module provides convenience functions for loading configuration
//! and seed URLs from files.

use std::fs;
use std::path::Path;

use crate::error::{AppError, Result};
use crate::models::Config;
use crate::utils::dedup_preserving_order;

/// Load configuration from a TOML file.
///
/// A missing file yields the defaults; a file that exists but does not parse
/// or validate is an error.
pub fn load_config(path: &Path) -> Result<Config> {
    if !path.exists() {
        log::warn!("No config at {:?}. Using defaults.", path);
        return Ok(Config::default());
    }

    let config = Config::load(path)?;
    config
        .validate()
        .map_err(|e| AppError::config(format!("Invalid config {path:?}: {e}")))?;
    Ok(config)
}

/// Load seed URLs, one per line.
///
/// Lines are trimmed, blank lines dropped, and repeats removed keeping the
/// first occurrence.
pub fn load_url_list(path: &Path) -> Result<Vec<String>> {
    let content = fs::read_to_string(path)?;
    Ok(parse_url_list(&content))
}

fn parse_url_list(content: &str) -> Vec<String> {
    dedup_preserving_order(
        content
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string),
    )
}
