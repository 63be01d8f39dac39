// Failover resolution: candidate generation (learned order or cold-start
// balanced expansion) and batched stability probing.

use std::collections::HashSet;
use std::time::Duration;

use futures::future::join_all;
use tracing::{debug, info};

use crate::endpoint::{ContentPath, Endpoint, EndpointRange, EndpointTemplate};
use crate::probe::StreamProbe;
use crate::ranking::RankingStore;
use crate::stability::ensure_stable;

/// Search parameters for one resolution call. Immutable once handed to
/// `resolve`.
#[derive(Debug, Clone)]
pub struct SearchPolicy {
    /// Upper bound on candidates probed per resolution.
    pub max_attempts: usize,
    /// Candidates probed concurrently; batches run strictly in sequence, so
    /// this also bounds peak outbound connections.
    pub batch_size: usize,
    /// Quick-check rounds required by the stability verifier.
    pub stable_tries: u32,
    /// Pause between successful non-final stability rounds.
    pub inter_trial_delay: Duration,
    /// Per-request budget for shallow checks.
    pub quick_timeout: Duration,
    /// Per-request budget for deep checks.
    pub deep_timeout: Duration,
}

impl Default for SearchPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 16,
            batch_size: 4,
            stable_tries: 3,
            inter_trial_delay: Duration::from_secs(1),
            quick_timeout: Duration::from_secs(5),
            deep_timeout: Duration::from_secs(8),
        }
    }
}

/// Finds a stable endpoint for a content path, consulting the ranking store
/// for ordering and updating it with every verification outcome.
pub struct FailoverResolver<'a> {
    probe: &'a dyn StreamProbe,
    store: &'a dyn RankingStore,
    template: &'a EndpointTemplate,
    range: EndpointRange,
}

impl<'a> FailoverResolver<'a> {
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
        }
    }

    /// Search for an endpoint that stably serves `path`. `None` is a normal
    /// outcome: every candidate was probed and none held up.
    pub async fn resolve(
        &self,
        path: &ContentPath,
        excluded: &HashSet<Endpoint>,
        current: Endpoint,
        policy: &SearchPolicy,
    ) -> Option<Endpoint> {
        let candidates = self.candidates(excluded, current, policy);
        if candidates.is_empty() {
            debug!(%path, "no candidates to probe");
            return None;
        }
        debug!(%path, count = candidates.len(), "probing failover candidates");

        for batch in candidates.chunks(policy.batch_size.max(1)) {
            let results = join_all(batch.iter().map(|&candidate| async move {
                (candidate, self.try_candidate(candidate, path, policy).await)
            }))
            .await;

            // All probes in the batch were already in flight; accept the
            // first success in candidate order and stop issuing batches.
            if let Some((winner, _)) = results.iter().find(|(_, stable)| *stable) {
                info!(%path, endpoint = %winner, "stable fallback found");
                return Some(*winner);
            }
        }

        debug!(%path, "all candidates exhausted");
        None
    }

    async fn try_candidate(
        &self,
        candidate: Endpoint,
        path: &ContentPath,
        policy: &SearchPolicy,
    ) -> bool {
        let url = self.template.url_for(candidate, path);

        if !self.probe.quick_check(&url).await {
            self.store.bump(candidate, false);
            return false;
        }

        let stable = ensure_stable(
            self.probe,
            &url,
            policy.stable_tries,
            policy.inter_trial_delay,
        )
        .await;
        self.store.bump(candidate, stable);
        stable
    }

    fn candidates(
        &self,
        excluded: &HashSet<Endpoint>,
        current: Endpoint,
        policy: &SearchPolicy,
    ) -> Vec<Endpoint> {
        if self.store.has_observations() {
            self.store
                .ordered_endpoints()
                .into_iter()
                .filter(|e| *e != current && !excluded.contains(e) && self.range.contains(*e))
                .take(policy.max_attempts)
                .collect()
        } else {
            cold_start_candidates(self.range, current, excluded, policy.max_attempts)
        }
    }
}

/// Candidate order used before any reliability history exists.
///
/// Numerically adjacent endpoints tend to share infrastructure, so the
/// search alternates outward from the current endpoint (`current-1,
/// current+1, current-2, current+2, ...`) clipped to the valid range, then
/// tops up from the full range in descending identifier order.
pub fn cold_start_candidates(
    range: EndpointRange,
    current: Endpoint,
    excluded: &HashSet<Endpoint>,
    max_attempts: usize,
) -> Vec<Endpoint> {
    let mut candidates: Vec<Endpoint> = Vec::with_capacity(max_attempts.min(range.count()));
    let mut listed: HashSet<Endpoint> = HashSet::new();
    listed.insert(current);

    let push = |candidates: &mut Vec<Endpoint>, listed: &mut HashSet<Endpoint>, id: i32| {
        if candidates.len() >= max_attempts {
            return;
        }
        if id < i32::from(range.min()) || id > i32::from(range.max()) {
            return;
        }
        let endpoint = Endpoint::new(id as u16);
        if excluded.contains(&endpoint) || !listed.insert(endpoint) {
            return;
        }
        candidates.push(endpoint);
    };

    let center = i32::from(current.id());
    let widest = i32::from(range.max()) - i32::from(range.min());
    for distance in 1..=widest.max(1) {
        if candidates.len() >= max_attempts {
            break;
        }
        push(&mut candidates, &mut listed, center - distance);
        push(&mut candidates, &mut listed, center + distance);
    }

    // Fill any remaining budget from the full descending range.
    for endpoint in range.iter_descending() {
        if candidates.len() >= max_attempts {
            break;
        }
        push(&mut candidates, &mut listed, i32::from(endpoint.id()));
    }

    candidates
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ranking::{MemoryRankingStore, RankingRecord};
    use crate::test_support::ScriptedProbe;

    fn template() -> EndpointTemplate {
        EndpointTemplate::new("https", "fl", "example.com")
    }

    fn range() -> EndpointRange {
        EndpointRange::new(3, 50).unwrap()
    }

    fn policy() -> SearchPolicy {
        SearchPolicy {
            inter_trial_delay: Duration::from_millis(1),
            ..SearchPolicy::default()
        }
    }

    fn no_exclusions() -> HashSet<Endpoint> {
        HashSet::new()
    }

    fn ids(endpoints: &[Endpoint]) -> Vec<u16> {
        endpoints.iter().map(|e| e.id()).collect()
    }

    #[test]
    fn cold_start_balanced_expansion() {
        let candidates =
            cold_start_candidates(range(), Endpoint::new(10), &no_exclusions(), 4);
        assert_eq!(ids(&candidates), vec![9, 11, 8, 12]);
    }

    #[test]
    fn cold_start_clips_at_range_bottom() {
        let candidates =
            cold_start_candidates(range(), Endpoint::new(4), &no_exclusions(), 5);
        // 3 and 5 first; below-range offsets vanish, so expansion climbs
        // upward before the descending fill kicks in.
        assert_eq!(ids(&candidates), vec![3, 5, 6, 7, 8]);
    }

    #[test]
    fn cold_start_skips_excluded() {
        let excluded: HashSet<Endpoint> = [Endpoint::new(9), Endpoint::new(11)].into();
        let candidates = cold_start_candidates(range(), Endpoint::new(10), &excluded, 4);
        assert_eq!(ids(&candidates), vec![8, 12, 7, 13]);
    }

    #[test]
    fn cold_start_fills_from_descending_range() {
        let narrow = EndpointRange::new(8, 12).unwrap();
        let candidates =
            cold_start_candidates(narrow, Endpoint::new(10), &no_exclusions(), 10);
        // Expansion covers the whole range; nothing left for the fill.
        assert_eq!(ids(&candidates), vec![9, 11, 8, 12]);

        // With the current endpoint at the edge, expansion runs one-sided
        // and the descending fill contributes nothing new.
        let candidates =
            cold_start_candidates(narrow, Endpoint::new(8), &no_exclusions(), 10);
        assert_eq!(ids(&candidates), vec![9, 10, 11, 12]);
    }

    #[tokio::test(start_paused = true)]
    async fn learned_order_respects_exclusions_and_budget() {
        let store = MemoryRankingStore::new();
        for (id, success, fail) in [(20u16, 9u64, 1u64), (21, 8, 2), (22, 7, 3), (23, 1, 9)] {
            store.insert(
                Endpoint::new(id),
                RankingRecord {
                    success_count: success,
                    fail_count: fail,
                    last_updated: 1,
                },
            );
        }

        let probe = ScriptedProbe::new();
        let tpl = template();
        let resolver = FailoverResolver::new(&probe, &store, &tpl, range());

        let excluded: HashSet<Endpoint> = [Endpoint::new(20)].into();
        let candidates = resolver.candidates(
            &excluded,
            Endpoint::new(22),
            &SearchPolicy {
                max_attempts: 2,
                ..policy()
            },
        );
        // 20 excluded, 22 is current; budget of 2 keeps 21 and 23.
        assert_eq!(ids(&candidates), vec![21, 23]);
    }

    #[tokio::test(start_paused = true)]
    async fn first_stable_candidate_wins_and_later_batches_are_skipped() {
        let store = MemoryRankingStore::new();
        let probe = ScriptedProbe::new()
            .with_online("https://fl9.example.com/A/index.m3u8")
            .with_online("https://fl12.example.com/A/index.m3u8");

        let tpl = template();
        let resolver = FailoverResolver::new(&probe, &store, &tpl, range());
        let path = ContentPath::new("A/index.m3u8");

        let found = resolver
            .resolve(
                &path,
                &no_exclusions(),
                Endpoint::new(10),
                &SearchPolicy {
                    max_attempts: 6,
                    batch_size: 2,
                    ..policy()
                },
            )
            .await;

        // Candidates are [9, 11, 8, 12, 7, 13]; 9 wins in the first batch.
        assert_eq!(found, Some(Endpoint::new(9)));

        // Batch one probed 9 and 11 only; 12 (batch two) was never touched.
        assert_eq!(probe.quick_calls("https://fl12.example.com/A/index.m3u8"), 0);
        assert_eq!(store.get(Endpoint::new(12)), None);

        // The winner was verified and recorded; its batch-mate failed quick
        // and was recorded too.
        assert_eq!(store.get(Endpoint::new(9)).unwrap().success_count, 1);
        assert_eq!(store.get(Endpoint::new(11)).unwrap().fail_count, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn quick_pass_but_unstable_counts_as_failure() {
        let store = MemoryRankingStore::new();
        // 9 answers the first quick check, then flaps.
        let probe = ScriptedProbe::new().with_quick_sequence(
            "https://fl9.example.com/A/index.m3u8",
            [true, true, false],
        );

        let tpl = template();
        let resolver = FailoverResolver::new(&probe, &store, &tpl, range());
        let path = ContentPath::new("A/index.m3u8");

        let found = resolver
            .resolve(
                &path,
                &no_exclusions(),
                Endpoint::new(10),
                &SearchPolicy {
                    max_attempts: 1,
                    batch_size: 1,
                    stable_tries: 2,
                    ..policy()
                },
            )
            .await;

        assert_eq!(found, None);
        let record = store.get(Endpoint::new(9)).unwrap();
        assert_eq!(record.success_count, 0);
        assert_eq!(record.fail_count, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn exhaustion_returns_none() {
        let store = MemoryRankingStore::new();
        let probe = ScriptedProbe::new();
        let tpl = template();
        let resolver = FailoverResolver::new(&probe, &store, &tpl, range());

        let found = resolver
            .resolve(
                &ContentPath::new("A/index.m3u8"),
                &no_exclusions(),
                Endpoint::new(10),
                &SearchPolicy {
                    max_attempts: 3,
                    ..policy()
                },
            )
            .await;
        assert_eq!(found, None);

        // Every probed candidate got a failure mark.
        for id in [9u16, 11, 8] {
            assert_eq!(store.get(Endpoint::new(id)).unwrap().fail_count, 1);
        }
    }
}
