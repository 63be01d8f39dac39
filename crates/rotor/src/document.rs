// Ordered-line playlist model.
//
// The engine never touches the filesystem: it consumes an already-loaded
// line sequence and produces a rewritten one plus a change flag. Locating
// and persisting the file is the caller's job.

use crate::endpoint::{ContentPath, Endpoint, EndpointTemplate};

/// Marker appended to an entry the resolver could not relocate. The original
/// reference is kept; the marker only records when it was last seen dead.
pub const OFFLINE_ANNOTATION: &str = "#~offline-since=";

/// A mirror binding extracted from one document line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub endpoint: Endpoint,
    pub path: ContentPath,
    /// Timestamp text of an existing offline annotation, if the line carries
    /// one.
    pub annotation: Option<String>,
}

#[derive(Debug, Clone)]
struct Line {
    raw: String,
    route: Option<Route>,
    /// Byte range of the URL token inside `raw`, present iff `route` is.
    url_span: Option<(usize, usize)>,
}

/// An ordered sequence of playlist lines, some of which are routable mirror
/// entries. Mutated only through `set_route`/`annotate`.
#[derive(Debug, Clone)]
pub struct Document {
    lines: Vec<Line>,
}

impl Document {
    /// Parse a document from text. Every line is kept verbatim; a line
    /// becomes routable when its first whitespace-separated token matches
    /// the mirror URL grammar. Comment lines (leading `#`) are inert.
    pub fn parse(text: &str, template: &EndpointTemplate) -> Self {
        let lines = text
            .split('\n')
            .map(|raw| Self::parse_line(raw, template))
            .collect();
        Self { lines }
    }

    fn parse_line(raw: &str, template: &EndpointTemplate) -> Line {
        let trimmed = raw.trim_start();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            return Line {
                raw: raw.to_owned(),
                route: None,
                url_span: None,
            };
        }

        let token = trimmed.split_whitespace().next().unwrap_or(trimmed);
        let Some((endpoint, path)) = template.parse_url(token) else {
            return Line {
                raw: raw.to_owned(),
                route: None,
                url_span: None,
            };
        };

        let start = raw.len() - trimmed.len();
        let span = (start, start + token.len());
        let annotation = raw[span.1..]
            .find(OFFLINE_ANNOTATION)
            .map(|at| raw[span.1 + at + OFFLINE_ANNOTATION.len()..].trim().to_owned());

        Line {
            raw: raw.to_owned(),
            route: Some(Route {
                endpoint,
                path,
                annotation,
            }),
            url_span: Some(span),
        }
    }

    /// Reassemble the document text. Lossless for unmodified documents.
    pub fn render(&self) -> String {
        let raws: Vec<&str> = self.lines.iter().map(|l| l.raw.as_str()).collect();
        raws.join("\n")
    }

    /// Routable entries in document order, as `(line_index, route)`.
    pub fn routes(&self) -> impl Iterator<Item = (usize, &Route)> {
        self.lines
            .iter()
            .enumerate()
            .filter_map(|(idx, line)| line.route.as_ref().map(|r| (idx, r)))
    }

    pub fn routable_count(&self) -> usize {
        self.lines.iter().filter(|l| l.route.is_some()).count()
    }

    /// The first endpoint referenced by the document; callers use this as
    /// the preferred ("main") endpoint when none is configured.
    pub fn first_endpoint(&self) -> Option<Endpoint> {
        self.routes().next().map(|(_, r)| r.endpoint)
    }

    /// Rewrite the entry at `index` to point at `endpoint`, dropping any
    /// offline annotation: the entry was just verified healthy.
    ///
    /// No-op on non-routable lines.
    pub fn set_route(&mut self, index: usize, endpoint: Endpoint, template: &EndpointTemplate) {
        let Some(line) = self.lines.get_mut(index) else {
            return;
        };
        let (Some(route), Some((start, _))) = (line.route.as_mut(), line.url_span) else {
            return;
        };

        let url = template.url_for(endpoint, &route.path);
        let mut raw = String::with_capacity(start + url.len());
        raw.push_str(&line.raw[..start]);
        raw.push_str(&url);

        route.endpoint = endpoint;
        route.annotation = None;
        line.url_span = Some((start, start + url.len()));
        line.raw = raw;
    }

    /// Append an offline annotation to the entry at `index`. An entry that
    /// already carries one keeps its original timestamp, so repeated passes
    /// over an unchanged world stay byte-identical.
    pub fn annotate(&mut self, index: usize, timestamp: &str) {
        let Some(line) = self.lines.get_mut(index) else {
            return;
        };
        let Some(route) = line.route.as_mut() else {
            return;
        };
        if route.annotation.is_some() {
            return;
        }

        route.annotation = Some(timestamp.to_owned());
        line.raw = format!("{} {}{}", line.raw, OFFLINE_ANNOTATION, timestamp);
    }

    pub fn route_at(&self, index: usize) -> Option<&Route> {
        self.lines.get(index).and_then(|l| l.route.as_ref())
    }
}
