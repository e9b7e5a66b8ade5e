// SPDX-License-Identifier: GPL-3.0-or-later
use std::net::IpAddr;
use std::path::Path;

use anyhow::Result;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use tracing::info;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub pool_max_size: u32,
    /// How long a writer waits on a locked database before giving up.
    pub busy_timeout_ms: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://messybrainz.db".to_string(),
            pool_max_size: 16,
            busy_timeout_ms: 5_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    pub host: String,
    pub port: u16,
    /// Addresses allowed to call the submit endpoint. Empty admits everyone.
    pub allowed_submit_ips: Vec<IpAddr>,
    /// Key required in `X-Api-Key` for cluster merges. Merges are refused when unset.
    pub admin_api_key: Option<String>,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            allowed_submit_ips: Vec::new(),
            admin_api_key: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    pub log_level: String,
    pub json: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizationConfig {
    pub strip_diacritics: bool,
    pub strip_punctuation: bool,
    pub noise_tokens: Vec<String>,
}

impl Default for NormalizationConfig {
    fn default() -> Self {
        Self {
            strip_diacritics: true,
            strip_punctuation: true,
            noise_tokens: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolverConfig {
    /// Insert attempts that may end in a uniqueness conflict with no winner found on the
    /// follow-up lookup before the fingerprint is reported as corrupt. `0` is treated as `1`.
    pub max_conflict_retries: u32,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            max_conflict_retries: 3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmissionConfig {
    pub max_batch_size: usize,
}

impl Default for SubmissionConfig {
    fn default() -> Self {
        Self {
            max_batch_size: 1_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub http: HttpConfig,
    pub telemetry: TelemetryConfig,
    pub normalization: NormalizationConfig,
    pub resolver: ResolverConfig,
    pub submission: SubmissionConfig,
}

/// Load configuration from defaults, optional TOML file, and environment overrides (prefix: MESSYBRAINZ_).
pub fn load(config_path: Option<&Path>) -> Result<AppConfig> {
    let mut figment = Figment::from(Serialized::defaults(AppConfig::default()));

    if let Some(path) = config_path {
        figment = figment.merge(Toml::file(path));
    }

    figment = figment.merge(Env::prefixed("MESSYBRAINZ_").split("__"));

    let config: AppConfig = figment.extract()?;
    info!(target: "config", "configuration loaded");
    Ok(config)
}
