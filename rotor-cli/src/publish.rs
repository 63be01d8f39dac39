// Version-control publish collaborator: commits and pushes the rewritten
// playlist, gated by a cooldown recorded after the last successful push.

use std::path::{Path, PathBuf};
use std::process::Output;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tokio::process::Command;
use tracing::{info, warn};

use crate::error::{CliError, Result};

/// Cooldown gate over git publishes. The stamp file stores the unix time of
/// the last successful push; a missing or garbled stamp counts as "long
/// ago" so publishing is never wedged by stale auxiliary state.
pub struct PublishGate {
    cooldown: Duration,
    stamp_path: PathBuf,
}

impl PublishGate {
    pub fn new(cooldown: Duration, stamp_path: impl Into<PathBuf>) -> Self {
        Self {
            cooldown,
            stamp_path: stamp_path.into(),
        }
    }

    pub fn is_open(&self) -> bool {
        self.is_open_at(now_secs())
    }

    fn is_open_at(&self, now: u64) -> bool {
        if self.cooldown.is_zero() {
            return true;
        }
        now.saturating_sub(self.last_publish()) >= self.cooldown.as_secs()
    }

    fn last_publish(&self) -> u64 {
        std::fs::read_to_string(&self.stamp_path)
            .ok()
            .and_then(|text| text.trim().parse::<u64>().ok())
            .unwrap_or(0)
    }

    /// Record a successful publish. Best effort: a failed write only means
    /// the next run may publish a little early.
    pub fn record(&self) {
        if let Err(err) = std::fs::write(&self.stamp_path, now_secs().to_string()) {
            warn!(path = %self.stamp_path.display(), error = %err, "failed to record publish time");
        }
    }
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Stage, commit and push the playlist. Returns `Ok(false)` when git found
/// nothing to commit (the document changed in memory but matched the
/// checkout, e.g. after a dry run was reverted).
pub async fn publish(playlist: &Path, message: &str) -> Result<bool> {
    let add = run_git(&["add", &playlist.to_string_lossy()]).await?;
    if !add.status.success() {
        return Err(CliError::git("add", stderr_of(&add)));
    }

    let commit = run_git(&["commit", "-m", message]).await?;
    if !commit.status.success() {
        // git exits non-zero when the index is clean.
        info!("git found nothing to commit");
        return Ok(false);
    }

    let push = run_git(&["push"]).await?;
    if !push.status.success() {
        return Err(CliError::git("push", stderr_of(&push)));
    }
    Ok(true)
}

async fn run_git(args: &[&str]) -> Result<Output> {
    Ok(Command::new("git").args(args).output().await?)
}

fn stderr_of(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).trim().to_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_cooldown_is_always_open() {
        let dir = tempfile::tempdir().unwrap();
        let gate = PublishGate::new(Duration::ZERO, dir.path().join("stamp"));
        assert!(gate.is_open_at(0));
        assert!(gate.is_open_at(u64::MAX));
    }

    #[test]
    fn recent_publish_closes_the_gate() {
        let dir = tempfile::tempdir().unwrap();
        let stamp = dir.path().join("stamp");
        std::fs::write(&stamp, "1000").unwrap();

        let gate = PublishGate::new(Duration::from_secs(3600), &stamp);
        assert!(!gate.is_open_at(1000 + 3599));
        assert!(gate.is_open_at(1000 + 3600));
    }

    #[test]
    fn garbled_stamp_counts_as_open() {
        let dir = tempfile::tempdir().unwrap();
        let stamp = dir.path().join("stamp");
        std::fs::write(&stamp, "not a number").unwrap();

        let gate = PublishGate::new(Duration::from_secs(3600), &stamp);
        assert!(gate.is_open_at(3600));
    }

    #[test]
    fn missing_stamp_counts_as_open() {
        let dir = tempfile::tempdir().unwrap();
        let gate = PublishGate::new(Duration::from_secs(3600), dir.path().join("absent"));
        assert!(gate.is_open_at(1_000_000));
    }

    #[test]
    fn record_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let stamp = dir.path().join("stamp");
        let gate = PublishGate::new(Duration::from_secs(3600), &stamp);

        gate.record();
        assert!(gate.last_publish() > 0);
        assert!(!gate.is_open_at(gate.last_publish() + 10));
    }
}
