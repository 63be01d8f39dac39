// Scripted probe fake shared by the engine's unit tests. No network, fully
// deterministic.

use std::collections::{HashMap, HashSet, VecDeque};

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::probe::StreamProbe;

#[derive(Default)]
struct Inner {
    /// Per-URL scripted quick-check results, consumed front to back. Takes
    /// precedence over the always-online sets; an exhausted script answers
    /// `false`.
    quick_sequences: HashMap<String, VecDeque<bool>>,
    quick_online: HashSet<String>,
    deep_online: HashSet<String>,
    quick_calls: HashMap<String, usize>,
    deep_calls: HashMap<String, usize>,
}

/// A `StreamProbe` whose answers are scripted per URL. URLs without a
/// script or an online marker are offline.
#[derive(Default)]
pub struct ScriptedProbe {
    inner: Mutex<Inner>,
}

impl ScriptedProbe {
    pub fn new() -> Self {
        Self::default()
    }

    /// Quick and deep checks both pass for `url`.
    pub fn with_online(self, url: &str) -> Self {
        {
            let mut inner = self.inner.lock();
            inner.quick_online.insert(url.to_owned());
            inner.deep_online.insert(url.to_owned());
        }
        self
    }

    /// Quick checks pass for `url`; deep checks fail.
    pub fn with_quick_online(self, url: &str) -> Self {
        self.inner.lock().quick_online.insert(url.to_owned());
        self
    }

    /// Script an exact quick-check result sequence for `url`.
    pub fn with_quick_sequence(self, url: &str, results: impl IntoIterator<Item = bool>) -> Self {
        self.inner
            .lock()
            .quick_sequences
            .insert(url.to_owned(), results.into_iter().collect());
        self
    }

    pub fn quick_calls(&self, url: &str) -> usize {
        self.inner.lock().quick_calls.get(url).copied().unwrap_or(0)
    }

    pub fn deep_calls(&self, url: &str) -> usize {
        self.inner.lock().deep_calls.get(url).copied().unwrap_or(0)
    }
}

#[async_trait]
impl StreamProbe for ScriptedProbe {
    async fn quick_check(&self, url: &str) -> bool {
        let mut inner = self.inner.lock();
        *inner.quick_calls.entry(url.to_owned()).or_insert(0) += 1;

        if let Some(sequence) = inner.quick_sequences.get_mut(url) {
            return sequence.pop_front().unwrap_or(false);
        }
        inner.quick_online.contains(url)
    }

    async fn deep_check(&self, url: &str) -> bool {
        let mut inner = self.inner.lock();
        *inner.deep_calls.entry(url.to_owned()).or_insert(0) += 1;
        inner.deep_online.contains(url)
    }
}
