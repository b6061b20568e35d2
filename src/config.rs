//! Client configuration read from the environment (and `.env`).

use validator::Validate;

use crate::{Result, StorefrontError};

const DEFAULT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_CURRENCY: &str = "USD";

#[derive(Clone, Debug, PartialEq, Eq, Validate)]
pub struct ClientConfig {
    /// Base URL of the storefront backend, e.g. `https://shop.example/api`.
    #[validate(url)]
    pub api_url: String,
    /// Bearer token of the signed-in user.
    pub api_token: Option<String>,
    #[validate(range(min = 1, max = 300))]
    pub timeout_secs: u64,
    /// ISO 4217 code attached to computed totals.
    #[validate(length(equal = 3))]
    pub currency: String,
}

impl ClientConfig {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let api_url = lookup("STOREFRONT_API_URL")
            .ok_or_else(|| StorefrontError::Config("STOREFRONT_API_URL is not set".into()))?;
        let timeout_secs = match lookup("STOREFRONT_TIMEOUT_SECS") {
            Some(raw) => raw.parse().map_err(|_| StorefrontError::Config(format!("STOREFRONT_TIMEOUT_SECS is not a number: {raw}")))?,
            None => DEFAULT_TIMEOUT_SECS,
        };
        let config = Self {
            api_url: api_url.trim_end_matches('/').to_string(),
            api_token: lookup("STOREFRONT_API_TOKEN").filter(|t| !t.is_empty()),
            timeout_secs,
            currency: lookup("STOREFRONT_CURRENCY").unwrap_or_else(|| DEFAULT_CURRENCY.to_string()).to_uppercase(),
        };
        config.validate().map_err(|e| StorefrontError::Config(e.to_string()))?;
        Ok(config)
    }
}
