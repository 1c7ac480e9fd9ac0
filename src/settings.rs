//! Runtime configuration shared by the resolver and the fetcher.
//!
//! Every field has a default, so an empty (or absent) config file is valid.
//! `DATA_API_URL` in the environment overrides the bulk fetch base url.

use std::{path::Path, time::Duration};

use chrono_tz::Tz;
use eyre::{ensure, Result, WrapErr};
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationSeconds};

pub const DATA_API_URL_ENV: &str = "DATA_API_URL";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub resolver: ResolverSettings,
    pub fetch: FetchSettings,
    pub http: HttpSettings,
}

#[serde_as]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverSettings {
    /// Base url of the data-api instance used for pulse id lookups.
    pub url: String,
    /// Channel ticking on every pulse, used as a clock proxy.
    pub reference_channel: String,
    pub max_attempts: u32,
    /// Time the archive needs to ingest a sample after it was taken.
    #[serde_as(as = "DurationSeconds<u64>")]
    pub catch_up_slack: Duration,
    /// Civil timezone of the archive clock.
    pub timezone: Tz,
}

impl Default for ResolverSettings {
    fn default() -> Self {
        Self {
            url: "https://data-api.psi.ch/sf".to_owned(),
            reference_channel: "SIN-CVME-TIFGUN-EVR0:BUNCH-1-OK".to_owned(),
            max_attempts: 10,
            catch_up_slack: Duration::from_secs(24),
            timezone: chrono_tz::Europe::Zurich,
        }
    }
}

#[serde_as]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchSettings {
    pub url: String,
    pub retries: u32,
    #[serde_as(as = "DurationSeconds<u64>")]
    pub retry_delay: Duration,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            url: "https://data-api.psi.ch/sf".to_owned(),
            retries: 5,
            retry_delay: Duration::from_secs(60),
        }
    }
}

#[serde_as]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpSettings {
    #[serde_as(as = "DurationSeconds<u64>")]
    pub timeout: Duration,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
        }
    }
}

impl Settings {
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let settings: Self = serde_yaml::from_str(yaml).wrap_err("invalid settings")?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(
            self.resolver.max_attempts >= 1,
            "resolver.max_attempts must be at least 1"
        );
        Ok(())
    }

    pub fn load(filepath: &Path) -> Result<Self> {
        let yaml = std::fs::read_to_string(filepath)
            .wrap_err_with(|| format!("unable to read {}", filepath.display()))?;
        Self::from_yaml(&yaml)
    }

    /// Applies environment overrides on top of the file values.
    pub fn with_env(self) -> Self {
        self.with_data_api_url(std::env::var(DATA_API_URL_ENV).ok())
    }

    fn with_data_api_url(mut self, url: Option<String>) -> Self {
        if let Some(url) = url.filter(|url| !url.trim().is_empty()) {
            self.fetch.url = url;
        }
        self
    }
}
