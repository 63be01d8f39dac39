// Document reconciliation: restoration to the preferred endpoint first,
// then per-entry repair through the failover resolver.

use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::document::Document;
use crate::endpoint::{ContentPath, Endpoint, EndpointRange, EndpointTemplate};
use crate::error::RotorError;
use crate::probe::{EvidenceDepth, ProbeOutcome, StreamProbe};
use crate::ranking::{RankingRecord, RankingStore};
use crate::resolver::{FailoverResolver, SearchPolicy};
use crate::stability::ensure_stable;

/// What a pass did to one entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum EntryAction {
    /// Entry was healthy where it was.
    Kept,
    /// Entry moved back to the preferred endpoint.
    Restored,
    /// Entry moved from the preferred endpoint to a verified fallback.
    Relocated { from: Endpoint },
    /// No fallback found; entry marked with an offline annotation.
    Annotated,
    /// No fallback found; entry left untouched.
    Unresolved,
}

/// Per-entry snapshot for presentation collaborators.
#[derive(Debug, Clone, Serialize)]
pub struct EntryStatus {
    pub path: ContentPath,
    pub endpoint: Endpoint,
    pub outcome: ProbeOutcome,
    pub action: EntryAction,
}

/// One endpoint's standing in the ranking order.
#[derive(Debug, Clone, Serialize)]
pub struct EndpointStanding {
    pub endpoint: Endpoint,
    #[serde(flatten)]
    pub record: RankingRecord,
}

/// Read-only result of a reconciliation pass.
#[derive(Debug, Clone, Serialize)]
pub struct ReconcileReport {
    pub preferred: Endpoint,
    pub entries: Vec<EntryStatus>,
    pub ranking: Vec<EndpointStanding>,
}

#[derive(Debug)]
pub struct ReconcileOutcome {
    pub document: Document,
    /// True iff the rewritten document differs byte-for-byte from the
    /// input. Callers must not persist or publish on a no-op pass.
    pub changed: bool,
    pub report: ReconcileReport,
}

/// Walks a document's entries and decides keep / restore / relocate /
/// leave-unresolved per entry.
pub struct Reconciler<'a> {
    probe: &'a dyn StreamProbe,
    store: &'a dyn RankingStore,
    template: &'a EndpointTemplate,
    range: EndpointRange,
    /// Stricter policy variant: mark unresolvable entries with a timestamped
    /// annotation instead of leaving them bare.
    annotate_unresolved: bool,
}

impl<'a> Reconciler<'a> {
    pub fn new(
        probe: &'a dyn StreamProbe,
        store: &'a dyn RankingStore,
        template: &'a EndpointTemplate,
        range: EndpointRange,
    ) -> Self {
        Self {
            probe,
            store,
            template,
            range,
            annotate_unresolved: false,
        }
    }

    pub fn with_annotation(mut self, enabled: bool) -> Self {
        self.annotate_unresolved = enabled;
        self
    }

    /// Reconcile every routable entry against the preferred endpoint.
    ///
    /// Restoration runs before repair so a path is never left on a degraded
    /// fallback once its preferred mirror is confirmed healthy again, even
    /// within the same pass.
    pub async fn reconcile(
        &self,
        document: Document,
        preferred: Endpoint,
        policy: &SearchPolicy,
    ) -> Result<ReconcileOutcome, RotorError> {
        let original = document.render();
        let mut document = document;

        let routables: Vec<(usize, crate::document::Route)> = document
            .routes()
            .map(|(idx, route)| (idx, route.clone()))
            .collect();
        if routables.is_empty() {
            return Err(RotorError::NoRoutableEntries);
        }

        debug!(
            entries = routables.len(),
            %preferred,
            "starting reconciliation pass"
        );

        // Verification results for (endpoint, path), memoized per pass so
        // duplicate paths do not re-probe or double-bump.
        let mut verified: HashMap<(Endpoint, ContentPath), bool> = HashMap::new();
        let mut statuses: BTreeMap<usize, EntryStatus> = BTreeMap::new();

        // Pass 1: restoration. Entries sitting on a fallback return to the
        // preferred endpoint as soon as it stably serves their path again.
        for (idx, route) in routables.iter().filter(|(_, r)| r.endpoint != preferred) {
            if self.verify(preferred, &route.path, policy, &mut verified).await {
                info!(path = %route.path, from = %route.endpoint, to = %preferred, "restored to preferred endpoint");
                document.set_route(*idx, preferred, self.template);
                statuses.insert(
                    *idx,
                    EntryStatus {
                        path: route.path.clone(),
                        endpoint: preferred,
                        outcome: ProbeOutcome::Online(EvidenceDepth::Deep),
                        action: EntryAction::Restored,
                    },
                );
            } else {
                // Stays on its fallback; report the fallback's current
                // shallow health so the snapshot reflects reality.
                let url = self.template.url_for(route.endpoint, &route.path);
                let online = self.probe.quick_check(&url).await;
                statuses.insert(
                    *idx,
                    EntryStatus {
                        path: route.path.clone(),
                        endpoint: route.endpoint,
                        outcome: if online {
                            ProbeOutcome::Online(EvidenceDepth::Shallow)
                        } else {
                            ProbeOutcome::Offline(EvidenceDepth::Shallow)
                        },
                        action: EntryAction::Kept,
                    },
                );
            }
        }

        // Pass 2: per-entry repair for entries on the preferred endpoint.
        // Entries restored in pass 1 were just deep-verified and are skipped
        // by construction (the iteration uses pre-pass state).
        let resolver = FailoverResolver::new(self.probe, self.store, self.template, self.range);
        let excluded: HashSet<Endpoint> = [preferred].into();

        for (idx, route) in routables.iter().filter(|(_, r)| r.endpoint == preferred) {
            let url = self.template.url_for(preferred, &route.path);
            if self.probe.quick_check(&url).await {
                statuses.insert(
                    *idx,
                    EntryStatus {
                        path: route.path.clone(),
                        endpoint: preferred,
                        outcome: ProbeOutcome::Online(EvidenceDepth::Shallow),
                        action: EntryAction::Kept,
                    },
                );
                continue;
            }

            match resolver.resolve(&route.path, &excluded, preferred, policy).await {
                Some(fallback) => {
                    info!(path = %route.path, from = %preferred, to = %fallback, "relocated to fallback endpoint");
                    document.set_route(*idx, fallback, self.template);
                    statuses.insert(
                        *idx,
                        EntryStatus {
                            path: route.path.clone(),
                            endpoint: fallback,
                            outcome: ProbeOutcome::Online(EvidenceDepth::Deep),
                            action: EntryAction::Relocated { from: preferred },
                        },
                    );
                }
                None => {
                    warn!(path = %route.path, endpoint = %preferred, "no stable fallback; leaving entry in place");
                    let action = if self.annotate_unresolved {
                        if route.annotation.is_none() {
                            let stamp = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true);
                            document.annotate(*idx, &stamp);
                        }
                        EntryAction::Annotated
                    } else {
                        EntryAction::Unresolved
                    };
                    statuses.insert(
                        *idx,
                        EntryStatus {
                            path: route.path.clone(),
                            endpoint: preferred,
                            outcome: ProbeOutcome::Offline(EvidenceDepth::Shallow),
                            action,
                        },
                    );
                }
            }
        }

        let rendered = document.render();
        let changed = rendered != original;

        let report = ReconcileReport {
            preferred,
            entries: statuses.into_values().collect(),
            ranking: self
                .store
                .snapshot()
                .into_iter()
                .map(|(endpoint, record)| EndpointStanding { endpoint, record })
                .collect(),
        };

        info!(changed, entries = report.entries.len(), "reconciliation pass complete");
        Ok(ReconcileOutcome {
            document,
            changed,
            report,
        })
    }

    /// Stability-verify `endpoint` for `path`, recording the outcome in the
    /// ranking store. Memoized per pass; only real attempts bump counters.
    async fn verify(
        &self,
        endpoint: Endpoint,
        path: &ContentPath,
        policy: &SearchPolicy,
        verified: &mut HashMap<(Endpoint, ContentPath), bool>,
    ) -> bool {
        let key = (endpoint, path.clone());
        if let Some(&cached) = verified.get(&key) {
            return cached;
        }

        let url = self.template.url_for(endpoint, path);
        let stable = ensure_stable(
            self.probe,
            &url,
            policy.stable_tries,
            policy.inter_trial_delay,
        )
        .await;
        self.store.bump(endpoint, stable);
        verified.insert(key, stable);
        stable
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ranking::MemoryRankingStore;
    use crate::test_support::ScriptedProbe;
    use std::time::Duration;

    fn template() -> EndpointTemplate {
        EndpointTemplate::new("https", "fl", "example")
    }

    fn range() -> EndpointRange {
        EndpointRange::new(3, 50).unwrap()
    }

    fn policy() -> SearchPolicy {
        SearchPolicy {
            stable_tries: 2,
            inter_trial_delay: Duration::from_millis(1),
            ..SearchPolicy::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn healthy_document_is_idempotent() {
        let text = "#EXTM3U\nhttps://fl5.example/A/index.m3u8\nhttps://fl5.example/B/index.m3u8\n";
        let tpl = template();
        let store = MemoryRankingStore::new();
        let probe = ScriptedProbe::new()
            .with_quick_online("https://fl5.example/A/index.m3u8")
            .with_quick_online("https://fl5.example/B/index.m3u8");

        let reconciler = Reconciler::new(&probe, &store, &tpl, range());

        for _ in 0..2 {
            let document = Document::parse(text, &tpl);
            let outcome = reconciler
                .reconcile(document, Endpoint::new(5), &policy())
                .await
                .unwrap();
            assert!(!outcome.changed);
            assert_eq!(outcome.document.render(), text);
            assert!(
                outcome
                    .report
                    .entries
                    .iter()
                    .all(|e| e.action == EntryAction::Kept && e.outcome.is_online())
            );
        }
    }

    #[tokio::test(start_paused = true)]
    async fn restoration_takes_precedence_over_working_fallback() {
        // Path X sits on fallback 7; both 7 and the preferred 5 are fully
        // stable. Restoration must win.
        let text = "https://fl7.example/X/index.m3u8\n";
        let tpl = template();
        let store = MemoryRankingStore::new();
        let probe = ScriptedProbe::new()
            .with_online("https://fl5.example/X/index.m3u8")
            .with_online("https://fl7.example/X/index.m3u8");

        let reconciler = Reconciler::new(&probe, &store, &tpl, range());
        let outcome = reconciler
            .reconcile(Document::parse(text, &tpl), Endpoint::new(5), &policy())
            .await
            .unwrap();

        assert!(outcome.changed);
        assert_eq!(
            outcome.document.render(),
            "https://fl5.example/X/index.m3u8\n"
        );
        assert_eq!(outcome.report.entries[0].action, EntryAction::Restored);
        assert_eq!(store.get(Endpoint::new(5)).unwrap().success_count, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_entry_relocates_to_stable_fallback() {
        // End-to-end: fl10 stops serving A; cold-start search lands on 9.
        let text = "https://fl10.example/A/index.m3u8";
        let tpl = template();
        let store = MemoryRankingStore::new();
        let probe = ScriptedProbe::new().with_online("https://fl9.example/A/index.m3u8");

        let reconciler = Reconciler::new(&probe, &store, &tpl, range());
        let outcome = reconciler
            .reconcile(Document::parse(text, &tpl), Endpoint::new(10), &policy())
            .await
            .unwrap();

        assert!(outcome.changed);
        assert_eq!(outcome.document.render(), "https://fl9.example/A/index.m3u8");

        let entry = &outcome.report.entries[0];
        assert_eq!(entry.endpoint, Endpoint::new(9));
        assert_eq!(entry.action, EntryAction::Relocated { from: Endpoint::new(10) });

        let record = store.get(Endpoint::new(9)).unwrap();
        assert_eq!(record.success_count, 1);
        assert_eq!(record.fail_count, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn unresolved_entry_is_left_unchanged_by_default() {
        let text = "https://fl10.example/A/index.m3u8\n";
        let tpl = template();
        let store = MemoryRankingStore::new();
        let probe = ScriptedProbe::new();

        let reconciler = Reconciler::new(&probe, &store, &tpl, range());
        let outcome = reconciler
            .reconcile(
                Document::parse(text, &tpl),
                Endpoint::new(10),
                &SearchPolicy {
                    max_attempts: 2,
                    ..policy()
                },
            )
            .await
            .unwrap();

        assert!(!outcome.changed);
        assert_eq!(outcome.document.render(), text);
        assert_eq!(outcome.report.entries[0].action, EntryAction::Unresolved);
    }

    #[tokio::test(start_paused = true)]
    async fn unresolved_entry_is_annotated_under_strict_policy() {
        let text = "https://fl10.example/A/index.m3u8\n";
        let tpl = template();
        let store = MemoryRankingStore::new();
        let probe = ScriptedProbe::new();

        let reconciler = Reconciler::new(&probe, &store, &tpl, range()).with_annotation(true);
        let search = SearchPolicy {
            max_attempts: 2,
            ..policy()
        };

        let outcome = reconciler
            .reconcile(Document::parse(text, &tpl), Endpoint::new(10), &search)
            .await
            .unwrap();
        assert!(outcome.changed);
        let rendered = outcome.document.render();
        assert!(rendered.contains("https://fl10.example/A/index.m3u8 #~offline-since="));
        assert_eq!(outcome.report.entries[0].action, EntryAction::Annotated);

        // A second pass over the annotated document keeps the original
        // timestamp and reports no change.
        let outcome = reconciler
            .reconcile(Document::parse(&rendered, &tpl), Endpoint::new(10), &search)
            .await
            .unwrap();
        assert!(!outcome.changed);
        assert_eq!(outcome.document.render(), rendered);
    }

    #[tokio::test(start_paused = true)]
    async fn duplicate_paths_verify_once() {
        // Two entries for the same path on the same fallback: one
        // restoration verification, one bump.
        let text = "https://fl7.example/X/index.m3u8\nhttps://fl7.example/X/index.m3u8\n";
        let tpl = template();
        let store = MemoryRankingStore::new();
        let probe = ScriptedProbe::new()
            .with_online("https://fl5.example/X/index.m3u8");

        let reconciler = Reconciler::new(&probe, &store, &tpl, range());
        let outcome = reconciler
            .reconcile(Document::parse(text, &tpl), Endpoint::new(5), &policy())
            .await
            .unwrap();

        assert!(outcome.changed);
        assert_eq!(store.get(Endpoint::new(5)).unwrap().success_count, 1);
        assert_eq!(probe.deep_calls("https://fl5.example/X/index.m3u8"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn no_routable_entries_is_fatal() {
        let text = "#EXTM3U\n# nothing but comments\n";
        let tpl = template();
        let store = MemoryRankingStore::new();
        let probe = ScriptedProbe::new();

        let reconciler = Reconciler::new(&probe, &store, &tpl, range());
        let err = reconciler
            .reconcile(Document::parse(text, &tpl), Endpoint::new(5), &policy())
            .await
            .unwrap_err();
        assert!(matches!(err, RotorError::NoRoutableEntries));
    }
}
