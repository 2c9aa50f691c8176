use anyhow::Result;
use serde::Deserialize;
use std::env;
use std::time::Duration;

use crate::types::AppError;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub search: SearchConfig,
    pub dispatch: DispatchConfig,
    pub deploy: DeployConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SearchConfig {
    pub serpapi_key: String,
    pub base_url: String,
    pub language: String,
    pub timeout_secs: u64,
    pub scrape_timeout_secs: u64,
    pub papers_min_year: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DispatchConfig {
    pub default_num_results: usize,
    pub call_timeout_secs: u64,
}

/// Deployment target. Every field is optional here; `deploy` decides what is fatal.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DeployConfig {
    pub project_id: Option<String>,
    pub location: Option<String>,
    pub bucket: Option<String>,
    pub access_token: Option<String>,
    pub api_base: Option<String>,
}

impl SearchConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn scrape_timeout(&self) -> Duration {
        Duration::from_secs(self.scrape_timeout_secs)
    }
}

impl DispatchConfig {
    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs)
    }
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            default_num_results: 10,
            call_timeout_secs: 30,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build the configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str, default: &str| -> String {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .unwrap_or_else(|| default.to_string())
        };
        let optional = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let seconds = |key: &'static str, default: &str| -> Result<u64> {
            let value: u64 = var(key, default).parse()?;
            if value == 0 {
                return Err(AppError::InvalidConfig(format!("{} must be greater than 0", key)).into());
            }
            Ok(value)
        };

        Ok(Self {
            search: SearchConfig {
                serpapi_key: var("SERPAPI_API_KEY", ""),
                base_url: var("SERPAPI_BASE_URL", "https://serpapi.com")
                    .trim_end_matches('/')
                    .to_string(),
                language: var("SEARCH_LANGUAGE", "en"),
                timeout_secs: seconds("SEARCH_TIMEOUT_SECS", "10")?,
                scrape_timeout_secs: seconds("PROFILE_SCRAPE_TIMEOUT_SECS", "15")?,
                papers_min_year: var("PAPERS_MIN_YEAR", "2000").parse()?,
            },
            dispatch: DispatchConfig {
                default_num_results: var("DEFAULT_NUM_RESULTS", "10").parse()?,
                call_timeout_secs: seconds("PROVIDER_CALL_TIMEOUT_SECS", "30")?,
            },
            deploy: DeployConfig {
                project_id: optional("GOOGLE_CLOUD_PROJECT"),
                location: optional("GOOGLE_CLOUD_LOCATION"),
                bucket: optional("GOOGLE_CLOUD_STORAGE_BUCKET"),
                access_token: optional("GOOGLE_CLOUD_ACCESS_TOKEN"),
                api_base: optional("AGENT_ENGINE_API_BASE"),
            },
        })
    }
}
