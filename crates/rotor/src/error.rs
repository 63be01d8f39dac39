/// Engine-level failures.
///
/// Transient network conditions never show up here: the probe layer folds
/// them into `false`/`Offline`, and an unresolvable entry is a normal
/// `None` from the resolver. What remains is the small set of conditions
/// that genuinely stop a run.
#[derive(Debug, thiserror::Error)]
pub enum RotorError {
    #[error("no playlist line matches the mirror URL grammar")]
    NoRoutableEntries,

    #[error("invalid endpoint range {min}..={max}")]
    InvalidEndpointRange { min: u16, max: u16 },

    #[error("failed to build HTTP client: {source}")]
    Client {
        #[from]
        source: reqwest::Error,
    },

    #[error("configuration error: {reason}")]
    Configuration { reason: String },
}

impl RotorError {
    pub fn configuration(reason: impl Into<String>) -> Self {
        Self::Configuration {
            reason: reason.into(),
        }
    }

    pub fn invalid_range(min: u16, max: u16) -> Self {
        Self::InvalidEndpointRange { min, max }
    }
}
