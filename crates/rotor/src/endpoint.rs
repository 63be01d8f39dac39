// Endpoint identity, numeric range, and the URL template binding an
// endpoint + content path to a concrete mirror URL.

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::RotorError;

/// A numbered mirror endpoint. The identifier is opaque to everything except
/// the URL template and the cold-start search, which exploits numeric
/// adjacency.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Endpoint(u16);

impl Endpoint {
    pub const fn new(id: u16) -> Self {
        Self(id)
    }

    pub const fn id(self) -> u16 {
        self.0
    }
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The logical identifier of a piece of content, independent of which
/// endpoint serves it (e.g. `DISNEY/index.m3u8`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentPath(String);

impl ContentPath {
    pub fn new(path: impl Into<String>) -> Self {
        Self(path.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ContentPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Inclusive bounds on valid endpoint identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointRange {
    min: u16,
    max: u16,
}

impl EndpointRange {
    pub fn new(min: u16, max: u16) -> Result<Self, RotorError> {
        if min == 0 || min > max {
            return Err(RotorError::invalid_range(min, max));
        }
        Ok(Self { min, max })
    }

    pub const fn min(self) -> u16 {
        self.min
    }

    pub const fn max(self) -> u16 {
        self.max
    }

    pub fn contains(self, endpoint: Endpoint) -> bool {
        (self.min..=self.max).contains(&endpoint.id())
    }

    /// Identifiers from `max` down to `min`, the order the cold-start search
    /// falls back to once proximity expansion is exhausted.
    pub fn iter_descending(self) -> impl Iterator<Item = Endpoint> {
        (self.min..=self.max).rev().map(Endpoint::new)
    }

    /// Number of identifiers in the range (never zero by construction).
    pub fn count(self) -> usize {
        usize::from(self.max - self.min) + 1
    }
}

/// Renders endpoints into URLs and recognizes mirror URLs in playlist lines.
///
/// The grammar is fixed: `<scheme>://<prefix><id>.<domain>/<content-path>`.
/// A URL that does not match is a normal, typed non-match (`None`), never an
/// error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointTemplate {
    scheme: String,
    prefix: String,
    domain: String,
}

impl Default for EndpointTemplate {
    fn default() -> Self {
        Self {
            scheme: "https".to_owned(),
            prefix: "fl".to_owned(),
            domain: "moveonjoy.com".to_owned(),
        }
    }
}

impl EndpointTemplate {
    pub fn new(
        scheme: impl Into<String>,
        prefix: impl Into<String>,
        domain: impl Into<String>,
    ) -> Self {
        Self {
            scheme: scheme.into(),
            prefix: prefix.into(),
            domain: domain.into(),
        }
    }

    pub fn host_for(&self, endpoint: Endpoint) -> String {
        format!("{}{}.{}", self.prefix, endpoint.id(), self.domain)
    }

    pub fn url_for(&self, endpoint: Endpoint, path: &ContentPath) -> String {
        format!(
            "{}://{}/{}",
            self.scheme,
            self.host_for(endpoint),
            path.as_str()
        )
    }

    /// Parse a candidate URL string into its `(Endpoint, ContentPath)` pair.
    ///
    /// Accepts both `http` and `https` regardless of the render scheme, so a
    /// document written before a scheme migration still resolves.
    pub fn parse_url(&self, text: &str) -> Option<(Endpoint, ContentPath)> {
        let url = Url::parse(text).ok()?;
        if !matches!(url.scheme(), "http" | "https") {
            return None;
        }

        let host = url.host_str()?;
        let endpoint = self.parse_host(host)?;

        let path = url.path().strip_prefix('/')?;
        if path.is_empty() {
            return None;
        }

        Some((endpoint, ContentPath::new(path)))
    }

    fn parse_host(&self, host: &str) -> Option<Endpoint> {
        let rest = host.strip_prefix(self.prefix.as_str())?;
        let digits = rest.strip_suffix(self.domain.as_str())?.strip_suffix('.')?;
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        digits.parse::<u16>().ok().map(Endpoint::new)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn template() -> EndpointTemplate {
        EndpointTemplate::new("https", "fl", "example.com")
    }

    #[test]
    fn render_round_trips_through_parse() {
        let t = template();
        let url = t.url_for(Endpoint::new(25), &ContentPath::new("ACC_NETWORK/index.m3u8"));
        assert_eq!(url, "https://fl25.example.com/ACC_NETWORK/index.m3u8");

        let (endpoint, path) = t.parse_url(&url).unwrap();
        assert_eq!(endpoint, Endpoint::new(25));
        assert_eq!(path.as_str(), "ACC_NETWORK/index.m3u8");
    }

    #[test]
    fn parse_accepts_plain_http() {
        let (endpoint, _) = template()
            .parse_url("http://fl3.example.com/A/index.m3u8")
            .unwrap();
        assert_eq!(endpoint.id(), 3);
    }

    #[test]
    fn parse_rejects_foreign_hosts() {
        let t = template();
        assert!(t.parse_url("https://cdn.other.com/A/index.m3u8").is_none());
        assert!(t.parse_url("https://fl.example.com/A/index.m3u8").is_none());
        assert!(t.parse_url("https://flX9.example.com/A/index.m3u8").is_none());
        assert!(t.parse_url("https://fl9.example.org/A/index.m3u8").is_none());
    }

    #[test]
    fn parse_rejects_empty_path_and_non_urls() {
        let t = template();
        assert!(t.parse_url("https://fl9.example.com/").is_none());
        assert!(t.parse_url("#EXTINF:-1,Some Channel").is_none());
        assert!(t.parse_url("not a url at all").is_none());
    }

    #[test]
    fn range_validation() {
        assert!(EndpointRange::new(3, 50).is_ok());
        assert!(EndpointRange::new(0, 50).is_err());
        assert!(EndpointRange::new(10, 9).is_err());
    }

    #[test]
    fn range_descending_order() {
        let range = EndpointRange::new(3, 6).unwrap();
        let ids: Vec<u16> = range.iter_descending().map(Endpoint::id).collect();
        assert_eq!(ids, vec![6, 5, 4, 3]);
    }
}
