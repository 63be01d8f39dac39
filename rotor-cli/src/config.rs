use std::path::{Path, PathBuf};
use std::time::Duration;

use rotor_engine::{EndpointRange, EndpointTemplate, RotorError, SearchPolicy};
use serde::Deserialize;

use crate::error::{CliError, Result};

/// Application configuration. Every field has a default so a bare
/// invocation works against the stock mirror setup; a TOML file overrides
/// selectively.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AppConfig {
    /// File name the locator searches for.
    pub playlist_name: String,

    /// Candidate paths tried when the recursive search finds nothing.
    pub playlist_candidates: Vec<PathBuf>,

    /// URL scheme used when rewriting entries.
    pub scheme: String,

    /// Host prefix in front of the endpoint id.
    pub endpoint_prefix: String,

    /// Mirror domain.
    pub domain: String,

    /// Lowest valid endpoint id.
    pub endpoint_min: u16,

    /// Highest valid endpoint id.
    pub endpoint_max: u16,

    /// Ranking store location.
    pub ranking_file: PathBuf,

    /// Seconds between git publishes; 0 disables the cooldown.
    pub publish_cooldown_secs: u64,

    /// Timestamp file recording the last successful publish.
    pub last_publish_file: PathBuf,

    /// Candidates probed per resolution.
    pub max_attempts: usize,

    /// Concurrent probes per batch.
    pub batch_size: usize,

    /// Quick-check rounds per stability verification.
    pub stable_tries: u32,

    /// Milliseconds between stability rounds.
    pub inter_trial_delay_ms: u64,

    /// Quick-check request timeout, seconds.
    pub quick_timeout_secs: u64,

    /// Deep-check request timeout, seconds.
    pub deep_timeout_secs: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            playlist_name: "us.m3u".to_owned(),
            playlist_candidates: vec![
                PathBuf::from("PrimeVision/us.m3u"),
                PathBuf::from("IPTV-LIVE/PrimeVision/us.m3u"),
            ],
            scheme: "https".to_owned(),
            endpoint_prefix: "fl".to_owned(),
            domain: "moveonjoy.com".to_owned(),
            endpoint_min: 3,
            endpoint_max: 50,
            ranking_file: PathBuf::from(".rotor_ranking.json"),
            publish_cooldown_secs: 3600,
            last_publish_file: PathBuf::from(".rotor_last_publish"),
            max_attempts: 16,
            batch_size: 4,
            stable_tries: 3,
            inter_trial_delay_ms: 1000,
            quick_timeout_secs: 5,
            deep_timeout_secs: 8,
        }
    }
}

impl AppConfig {
    /// Load configuration, falling back to defaults when no file is given.
    /// A present-but-broken file is an error: silently running with defaults
    /// against the wrong mirror range would be worse.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let text = std::fs::read_to_string(path)
            .map_err(|e| CliError::config(path, e.to_string()))?;
        toml::from_str(&text).map_err(|e| CliError::config(path, e.to_string()))
    }

    pub fn template(&self) -> EndpointTemplate {
        EndpointTemplate::new(&self.scheme, &self.endpoint_prefix, &self.domain)
    }

    pub fn range(&self) -> std::result::Result<EndpointRange, RotorError> {
        EndpointRange::new(self.endpoint_min, self.endpoint_max)
    }

    pub fn search_policy(&self) -> SearchPolicy {
        SearchPolicy {
            max_attempts: self.max_attempts,
            batch_size: self.batch_size,
            stable_tries: self.stable_tries,
            inter_trial_delay: Duration::from_millis(self.inter_trial_delay_ms),
            quick_timeout: Duration::from_secs(self.quick_timeout_secs),
            deep_timeout: Duration::from_secs(self.deep_timeout_secs),
        }
    }

    pub fn publish_cooldown(&self) -> Duration {
        Duration::from_secs(self.publish_cooldown_secs)
    }
}
