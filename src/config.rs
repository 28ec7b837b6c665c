use anyhow::bail;

use crate::core::gemini::{DEFAULT_GEMINI_MODEL, GEMINI_BASE_URL};
use crate::utils::constants::{DEFAULT_PORT, DEFAULT_RATE_LIMIT_BURST};
use crate::server::rate_limiter::whitelisted_urls;
use crate::utils::get_env::{env_flag, get_env_or, get_env_var, get_optional_env_var};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanetScaleConfig {
    pub host: String,
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityConfig {
    pub api_key: String,
    pub base_url: Option<String>,
}

/// Server settings, read from the environment (and `.env`).
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub gemini_api_key: String,
    pub gemini_model: String,
    pub gemini_api_url: String,
    pub database: Option<PlanetScaleConfig>,
    pub identity: Option<IdentityConfig>,
    pub require_auth: bool,
    pub whitelisted_hosts: Vec<String>,
    pub rate_limit_burst: u32,
}

impl Config {
    pub fn from_env() -> Result<Self, anyhow::Error> {
        let gemini_api_key = get_env_var("GEMINI_API_KEY")?;

        let database = match (
            get_optional_env_var("PS_DATABASE_HOST"),
            get_optional_env_var("PS_DATABASE_USERNAME"),
            get_optional_env_var("PS_DATABASE_PASSWORD"),
        ) {
            (Some(host), Some(username), Some(password)) => Some(PlanetScaleConfig {
                host,
                username,
                password,
            }),
            (None, None, None) => None,
            _ => bail!(
                "PS_DATABASE_HOST, PS_DATABASE_USERNAME and PS_DATABASE_PASSWORD must be set together"
            ),
        };

        let identity = get_optional_env_var("IDENTITY_API_KEY").map(|api_key| IdentityConfig {
            api_key,
            base_url: get_optional_env_var("IDENTITY_API_URL"),
        });

        let require_auth = env_flag("REQUIRE_AUTH");
        if require_auth && identity.is_none() {
            bail!("REQUIRE_AUTH is set but IDENTITY_API_KEY is missing");
        }

        Ok(Self {
            port: get_env_or("PORT", DEFAULT_PORT),
            gemini_api_key,
            gemini_model: get_optional_env_var("GEMINI_MODEL")
                .unwrap_or_else(|| DEFAULT_GEMINI_MODEL.to_string()),
            gemini_api_url: get_optional_env_var("GEMINI_API_URL")
                .unwrap_or_else(|| GEMINI_BASE_URL.to_string()),
            database,
            identity,
            require_auth,
            whitelisted_hosts: whitelisted_urls(),
            rate_limit_burst: get_env_or("RATE_LIMIT_BURST", DEFAULT_RATE_LIMIT_BURST),
        })
    }
}
