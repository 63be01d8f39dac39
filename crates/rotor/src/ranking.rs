// Adaptive endpoint ranking: persistent per-endpoint success/failure
// counters that order the failover search.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::Utc;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::endpoint::Endpoint;

/// Reliability history for one endpoint. Counts only grow; nothing here is
/// reset except by deleting the store file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankingRecord {
    pub success_count: u64,
    pub fail_count: u64,
    /// Unix milliseconds of the last update.
    #[serde(default)]
    pub last_updated: i64,
}

impl RankingRecord {
    pub fn observations(&self) -> u64 {
        self.success_count + self.fail_count
    }

    /// Fraction of observed verifications that succeeded. An endpoint with
    /// no observations ranks as 0.0 but is distinguishable by
    /// `observations() == 0`.
    pub fn success_ratio(&self) -> f64 {
        let observations = self.observations();
        if observations == 0 {
            0.0
        } else {
            self.success_count as f64 / observations as f64
        }
    }
}

/// Reliability history consulted and updated by the resolver. The order it
/// produces is a heuristic prior, not a guarantee; callers must still probe
/// before trusting an endpoint.
pub trait RankingStore: Send + Sync {
    fn get(&self, endpoint: Endpoint) -> Option<RankingRecord>;

    /// Record one verification outcome. Updates are independent per
    /// endpoint; concurrent bumps to different endpoints need no
    /// coordination, and the last write to the same endpoint wins.
    fn bump(&self, endpoint: Endpoint, success: bool);

    /// Endpoints in preference order: success ratio descending, then raw
    /// success count, then recency of update.
    fn ordered_endpoints(&self) -> Vec<Endpoint>;

    /// Whether any endpoint has at least one observation. When false, the
    /// resolver falls back to cold-start expansion.
    fn has_observations(&self) -> bool;

    /// Ordered view of every record, for presentation.
    fn snapshot(&self) -> Vec<(Endpoint, RankingRecord)>;
}

fn rank(records: &HashMap<Endpoint, RankingRecord>) -> Vec<(Endpoint, RankingRecord)> {
    let mut entries: Vec<(Endpoint, RankingRecord)> =
        records.iter().map(|(e, r)| (*e, *r)).collect();
    entries.sort_by(|(a_ep, a), (b_ep, b)| {
        b.success_ratio()
            .partial_cmp(&a.success_ratio())
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| b.success_count.cmp(&a.success_count))
            .then_with(|| b.last_updated.cmp(&a.last_updated))
            .then_with(|| a_ep.cmp(b_ep))
    });
    entries
}

/// In-memory store: the base for the file-backed store and the swap-in fake
/// for tests.
#[derive(Debug, Default)]
pub struct MemoryRankingStore {
    records: Mutex<HashMap<Endpoint, RankingRecord>>,
}

impl MemoryRankingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_records(records: HashMap<Endpoint, RankingRecord>) -> Self {
        Self {
            records: Mutex::new(records),
        }
    }

    /// Install a record wholesale. Used when loading persisted state and by
    /// tests that need exact counter values.
    pub fn insert(&self, endpoint: Endpoint, record: RankingRecord) {
        self.records.lock().insert(endpoint, record);
    }
}

impl RankingStore for MemoryRankingStore {
    fn get(&self, endpoint: Endpoint) -> Option<RankingRecord> {
        self.records.lock().get(&endpoint).copied()
    }

    fn bump(&self, endpoint: Endpoint, success: bool) {
        let mut records = self.records.lock();
        let record = records.entry(endpoint).or_default();
        if success {
            record.success_count += 1;
        } else {
            record.fail_count += 1;
        }
        record.last_updated = Utc::now().timestamp_millis();
    }

    fn ordered_endpoints(&self) -> Vec<Endpoint> {
        rank(&self.records.lock()).into_iter().map(|(e, _)| e).collect()
    }

    fn has_observations(&self) -> bool {
        self.records.lock().values().any(|r| r.observations() > 0)
    }

    fn snapshot(&self) -> Vec<(Endpoint, RankingRecord)> {
        rank(&self.records.lock())
    }
}

/// Flat JSON file keyed by endpoint identifier, rewritten after every bump.
///
/// An unreadable or malformed file degrades to an empty store with a
/// warning; stale auxiliary state must never fail a run.
#[derive(Debug)]
pub struct JsonRankingStore {
    path: PathBuf,
    inner: MemoryRankingStore,
}

impl JsonRankingStore {
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let records = match std::fs::read_to_string(&path) {
            Ok(text) => match serde_json::from_str::<HashMap<u16, RankingRecord>>(&text) {
                Ok(parsed) => {
                    debug!(path = %path.display(), records = parsed.len(), "loaded ranking store");
                    parsed
                        .into_iter()
                        .map(|(id, record)| (Endpoint::new(id), record))
                        .collect()
                }
                Err(err) => {
                    warn!(path = %path.display(), error = %err, "malformed ranking store, starting empty");
                    HashMap::new()
                }
            },
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(err) => {
                warn!(path = %path.display(), error = %err, "unreadable ranking store, starting empty");
                HashMap::new()
            }
        };

        Self {
            path,
            inner: MemoryRankingStore::from_records(records),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Best-effort flush. A failed write is logged and absorbed; the
    /// in-memory counters stay authoritative for the rest of the run.
    fn flush(&self) {
        let by_id: HashMap<u16, RankingRecord> = self
            .inner
            .records
            .lock()
            .iter()
            .map(|(e, r)| (e.id(), *r))
            .collect();

        let serialized = match serde_json::to_string_pretty(&by_id) {
            Ok(serialized) => serialized,
            Err(err) => {
                warn!(error = %err, "failed to serialize ranking store");
                return;
            }
        };
        if let Err(err) = std::fs::write(&self.path, serialized) {
            warn!(path = %self.path.display(), error = %err, "failed to persist ranking store");
        }
    }
}

impl RankingStore for JsonRankingStore {
    fn get(&self, endpoint: Endpoint) -> Option<RankingRecord> {
        self.inner.get(endpoint)
    }

    fn bump(&self, endpoint: Endpoint, success: bool) {
        self.inner.bump(endpoint, success);
        self.flush();
    }

    fn ordered_endpoints(&self) -> Vec<Endpoint> {
        self.inner.ordered_endpoints()
    }

    fn has_observations(&self) -> bool {
        self.inner.has_observations()
    }

    fn snapshot(&self) -> Vec<(Endpoint, RankingRecord)> {
        self.inner.snapshot()
    }
}
