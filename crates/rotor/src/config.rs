use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue};

pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/142.0.0.0 Safari/537.36";

/// Configurable options for the HTTP probe.
#[derive(Debug, Clone)]
pub struct ProbeConfig {
    /// Per-request timeout for shallow (metadata/prefix) checks.
    pub quick_timeout: Duration,

    /// Per-request timeout for deep (playlist body + segment prefix) checks.
    pub deep_timeout: Duration,

    /// Connection timeout (time to establish the initial connection).
    pub connect_timeout: Duration,

    /// User agent string.
    pub user_agent: String,

    /// How many leading bytes of a playlist body to fetch when the content
    /// type is ambiguous and the quick check has to scan for segment
    /// references.
    pub playlist_prefix_bytes: usize,

    /// How many leading bytes of a media segment to fetch for the deep
    /// check's container-format inspection. Ten transport-stream packets is
    /// plenty for sync-byte evidence.
    pub segment_prefix_bytes: usize,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            quick_timeout: Duration::from_secs(5),
            deep_timeout: Duration::from_secs(8),
            connect_timeout: Duration::from_secs(10),
            user_agent: DEFAULT_USER_AGENT.to_owned(),
            playlist_prefix_bytes: 4096,
            segment_prefix_bytes: 1880,
        }
    }
}

impl ProbeConfig {
    pub fn default_headers() -> HeaderMap {
        let mut headers = HeaderMap::new();

        headers.insert(
            reqwest::header::ACCEPT,
            HeaderValue::from_static("application/vnd.apple.mpegurl,audio/mpegurl,*/*;q=0.8"),
        );

        headers.insert(
            reqwest::header::ACCEPT_LANGUAGE,
            HeaderValue::from_static("en-US,en;q=0.5"),
        );

        headers.insert(
            reqwest::header::CONNECTION,
            HeaderValue::from_static("keep-alive"),
        );

        headers
    }
}
