// Tiered health probe: shallow metadata checks and deep container-evidence
// checks against one mirror URL.
//
// Every transport error, timeout, and non-success status folds into `false`.
// Retrying belongs to the stability verifier, never to this layer.

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use m3u8_rs::Playlist;
use reqwest::header::{CONTENT_TYPE, RANGE};
use reqwest::{Client, Response};
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, trace};
use url::Url;

use crate::config::ProbeConfig;
use crate::error::RotorError;

/// How much checking backs a probe result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EvidenceDepth {
    Shallow,
    Deep,
}

/// Tri-state result of one check. Probes never fail; they classify.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "state", content = "depth")]
pub enum ProbeOutcome {
    Online(EvidenceDepth),
    Offline(EvidenceDepth),
}

impl ProbeOutcome {
    pub fn is_online(self) -> bool {
        matches!(self, Self::Online(_))
    }
}

/// The network checks that classify one URL as serving a path or not.
#[async_trait]
pub trait StreamProbe: Send + Sync {
    /// Shallow, low-cost classification of `url`.
    async fn quick_check(&self, url: &str) -> bool;

    /// Structural check: quick check, then container-format evidence from a
    /// bounded prefix of the first referenced media segment.
    async fn deep_check(&self, url: &str) -> bool;
}

/// `StreamProbe` over a shared `reqwest` client.
pub struct HttpProbe {
    client: Client,
    config: ProbeConfig,
}

impl HttpProbe {
    pub fn new(config: ProbeConfig) -> Result<Self, RotorError> {
        let client = Client::builder()
            .connect_timeout(config.connect_timeout)
            .user_agent(config.user_agent.clone())
            .default_headers(ProbeConfig::default_headers())
            .build()?;
        Ok(Self { client, config })
    }

    /// Fetch up to `limit` leading bytes of `url`. A `Range` header asks the
    /// server to stop early; the chunked read enforces the cap regardless,
    /// since plenty of mirrors ignore range requests.
    async fn fetch_prefix(&self, url: &str, limit: usize, timeout: Duration) -> Option<Bytes> {
        let response = self
            .client
            .get(url)
            .header(RANGE, format!("bytes=0-{}", limit.saturating_sub(1)))
            .timeout(timeout)
            .send()
            .await
            .ok()?;
        if !response.status().is_success() {
            return None;
        }
        Self::read_capped(response, limit).await
    }

    async fn read_capped(mut response: Response, limit: usize) -> Option<Bytes> {
        let mut buf = BytesMut::with_capacity(limit.min(16 * 1024));
        while let Some(chunk) = response.chunk().await.ok()? {
            buf.extend_from_slice(&chunk);
            if buf.len() >= limit {
                buf.truncate(limit);
                break;
            }
        }
        Some(buf.freeze())
    }

    /// Extract the first referenced media-segment URI from a playlist body.
    ///
    /// Typed parsing first, keeping only URIs with a recognizable segment
    /// extension — the lenient parser will happily treat stray text lines
    /// as segments. A master playlist references only sub-playlists and
    /// therefore yields no segment to inspect; a body the parser rejects
    /// outright falls back to a plain line scan.
    fn first_segment_uri(body: &[u8]) -> Option<String> {
        match m3u8_rs::parse_playlist_res(body) {
            Ok(Playlist::MediaPlaylist(media)) => media
                .segments
                .iter()
                .map(|segment| segment.uri.trim().to_owned())
                .find(|uri| references_media_segment(uri)),
            Ok(Playlist::MasterPlaylist(_)) => {
                trace!("master playlist has no media segment to inspect");
                None
            }
            Err(_) => {
                let text = String::from_utf8_lossy(body);
                text.lines()
                    .map(str::trim)
                    .filter(|line| !line.is_empty() && !line.starts_with('#'))
                    .find(|line| references_media_segment(line))
                    .map(str::to_owned)
            }
        }
    }

    /// Resolve a possibly-relative segment reference against the playlist
    /// URL's directory.
    fn resolve_segment_url(playlist_url: &str, segment_uri: &str) -> Option<Url> {
        let base = Url::parse(playlist_url).ok()?;
        base.join(segment_uri).ok()
    }
}

#[async_trait]
impl StreamProbe for HttpProbe {
    async fn quick_check(&self, url: &str) -> bool {
        let response = match self
            .client
            .head(url)
            .timeout(self.config.quick_timeout)
            .send()
            .await
        {
            Ok(response) => response,
            Err(err) => {
                trace!(url, error = %err, "quick check transport failure");
                return false;
            }
        };

        if !response.status().is_success() {
            trace!(url, status = %response.status(), "quick check non-success");
            return false;
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();
        if is_playlist_content_type(content_type) {
            return true;
        }

        // Ambiguously typed: peek at the body and look for a segment or
        // sub-playlist reference.
        let Some(prefix) = self
            .fetch_prefix(url, self.config.playlist_prefix_bytes, self.config.quick_timeout)
            .await
        else {
            return false;
        };
        has_stream_reference(&String::from_utf8_lossy(&prefix))
    }

    async fn deep_check(&self, url: &str) -> bool {
        if !self.quick_check(url).await {
            return false;
        }

        let response = match self
            .client
            .get(url)
            .timeout(self.config.deep_timeout)
            .send()
            .await
        {
            Ok(response) if response.status().is_success() => response,
            Ok(response) => {
                trace!(url, status = %response.status(), "deep check playlist fetch non-success");
                return false;
            }
            Err(err) => {
                trace!(url, error = %err, "deep check playlist fetch failure");
                return false;
            }
        };

        let body = match response.bytes().await {
            Ok(body) => body,
            Err(err) => {
                trace!(url, error = %err, "deep check body read failure");
                return false;
            }
        };

        let Some(segment_uri) = Self::first_segment_uri(&body) else {
            debug!(url, "no media segment referenced; deep evidence unavailable");
            return false;
        };
        let Some(segment_url) = Self::resolve_segment_url(url, &segment_uri) else {
            debug!(url, %segment_uri, "unresolvable segment reference");
            return false;
        };

        let Some(prefix) = self
            .fetch_prefix(
                segment_url.as_str(),
                self.config.segment_prefix_bytes,
                self.config.deep_timeout,
            )
            .await
        else {
            trace!(segment = %segment_url, "segment prefix fetch failed");
            return false;
        };

        let evidence = media_sniff::looks_like_media_stream(&prefix);
        trace!(segment = %segment_url, evidence, "deep check container inspection");
        evidence
    }
}

fn is_playlist_content_type(content_type: &str) -> bool {
    let essence = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    matches!(
        essence.as_str(),
        "application/vnd.apple.mpegurl"
            | "application/x-mpegurl"
            | "audio/mpegurl"
            | "audio/x-mpegurl"
    )
}

/// Does a playlist prefix reference a media segment or sub-playlist?
/// Comment/directive lines do not count; a bare URI line does.
fn has_stream_reference(text: &str) -> bool {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .any(references_segment)
}

fn references_segment(line: &str) -> bool {
    references_media_segment(line) || strip_query(line).ends_with(".m3u8")
}

/// A reference the deep check can actually inspect: a media segment, not a
/// sub-playlist.
fn references_media_segment(line: &str) -> bool {
    let base = strip_query(line);
    base.ends_with(".ts") || base.ends_with(".m4s") || base.ends_with(".aac")
}

fn strip_query(line: &str) -> &str {
    line.split(['?', '#']).next().unwrap_or(line)
}
