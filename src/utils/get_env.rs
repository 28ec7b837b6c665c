use anyhow::{Context, Error};
use dotenv::dotenv;
use std::env;
use std::str::FromStr;

pub fn get_env_var(key: &str) -> Result<String, Error> {
    dotenv().ok();
    env::var(key).with_context(|| format!("missing environment variable {}", key))
}

/// Like `get_env_var` but treats unset and blank values as absent.
pub fn get_optional_env_var(key: &str) -> Option<String> {
    dotenv().ok();
    env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

pub fn get_env_or<T: FromStr>(key: &str, default: T) -> T {
    get_optional_env_var(key)
        .and_then(|raw| raw.parse::<T>().ok())
        .unwrap_or(default)
}

pub fn env_flag(key: &str) -> bool {
    matches!(
        get_optional_env_var(key).as_deref().map(str::to_ascii_lowercase).as_deref(),
        Some("1" | "true" | "yes" | "on")
    )
}

pub fn env_var_to_vec(key: &str) -> Vec<String> {
    match std::env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .split(',')
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect(),
        _ => Vec::new(),
    }
}
