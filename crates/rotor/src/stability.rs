// Stability verification: repeated spaced trials that reject transient
// flaps before a probe result is trusted.

use std::time::Duration;

use tracing::trace;

use crate::probe::StreamProbe;

/// Require `url` to pass `tries` spaced quick checks, finished by one deep
/// check on the final round.
///
/// A single failed round short-circuits to `false` immediately: remaining
/// rounds and delays are skipped, and the deep check never runs. Single-shot
/// checks are cheap but flap under load-balancer churn; sustained agreement
/// plus one structural check balances probe cost against false positives.
pub async fn ensure_stable<P>(probe: &P, url: &str, tries: u32, delay: Duration) -> bool
where
    P: StreamProbe + ?Sized,
{
    let tries = tries.max(1);
    for round in 1..=tries {
        if !probe.quick_check(url).await {
            trace!(url, round, tries, "stability trial failed");
            return false;
        }
        if round == tries {
            let deep = probe.deep_check(url).await;
            trace!(url, deep, "final stability round");
            return deep;
        }
        tokio::time::sleep(delay).await;
    }
    // Loop always returns on the final round.
    false
}
