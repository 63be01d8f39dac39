// Command implementations for the rotor binary.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use chrono::{SecondsFormat, Utc};
use futures::future::join_all;
use rotor_engine::{
    ContentPath, Document, Endpoint, EntryAction, HttpProbe, JsonRankingStore, ProbeConfig,
    Reconciler, RotorError, StreamProbe,
};
use tracing::{error, info, warn};

use crate::config::AppConfig;
use crate::error::{CliError, Result};
use crate::locator;
use crate::publish::{self, PublishGate};
use crate::status;

pub async fn run_reconcile(
    config: &AppConfig,
    playlist: Option<PathBuf>,
    preferred: Option<u16>,
    dry_run: bool,
    no_publish: bool,
    annotate: bool,
    status_file: Option<PathBuf>,
) -> Result<()> {
    let playlist_path = locate(config, playlist)?;
    info!(playlist = %playlist_path.display(), "using playlist");

    let text = tokio::fs::read_to_string(&playlist_path).await?;
    let template = config.template();
    let range = config.range()?;
    let policy = config.search_policy();

    let document = Document::parse(&text, &template);
    let preferred = match preferred {
        Some(id) => Endpoint::new(id),
        None => document
            .first_endpoint()
            .ok_or(RotorError::NoRoutableEntries)?,
    };
    info!(
        %preferred,
        entries = document.routable_count(),
        "starting reconciliation"
    );

    let store = JsonRankingStore::load(&config.ranking_file);
    let probe = HttpProbe::new(ProbeConfig {
        quick_timeout: policy.quick_timeout,
        deep_timeout: policy.deep_timeout,
        ..ProbeConfig::default()
    })?;

    let reconciler =
        Reconciler::new(&probe, &store, &template, range).with_annotation(annotate);
    let outcome = reconciler.reconcile(document, preferred, &policy).await?;

    summarize(&outcome.report.entries);

    if let Some(status_path) = status_file {
        status::write_status(&status_path, &playlist_path, outcome.changed, &outcome.report)?;
        info!(path = %status_path.display(), "status snapshot written");
    }

    if !outcome.changed {
        info!("document already healthy; nothing to write");
        return Ok(());
    }
    if dry_run {
        info!("dry run: changes not written");
        return Ok(());
    }

    tokio::fs::write(&playlist_path, outcome.document.render()).await?;
    info!(playlist = %playlist_path.display(), "playlist rewritten");

    if no_publish {
        return Ok(());
    }
    let gate = PublishGate::new(config.publish_cooldown(), &config.last_publish_file);
    if !gate.is_open() {
        info!("publish cooldown active; playlist written but not pushed");
        return Ok(());
    }

    let message = format!(
        "Auto-update mirror endpoints at {}",
        Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
    );
    match publish::publish(&playlist_path, &message).await {
        Ok(true) => {
            gate.record();
            info!("changes committed and pushed");
        }
        Ok(false) => info!("working tree already matched; nothing pushed"),
        // A failed push is recoverable on the next run; the playlist on
        // disk is already correct.
        Err(err) => error!(error = %err, "publish failed"),
    }
    Ok(())
}

pub async fn run_scan(
    config: &AppConfig,
    playlist: Option<PathBuf>,
    sample_limit: usize,
) -> Result<()> {
    let playlist_path = locate(config, playlist)?;
    let text = tokio::fs::read_to_string(&playlist_path).await?;

    let template = config.template();
    let range = config.range()?;
    let policy = config.search_policy();

    let document = Document::parse(&text, &template);
    let samples = sample_paths(&document, sample_limit);
    if samples.is_empty() {
        return Err(RotorError::NoRoutableEntries.into());
    }
    let range_label = format!("{}..={}", range.min(), range.max());
    info!(
        range = %range_label,
        samples = samples.len(),
        "scanning endpoint range"
    );

    let probe = HttpProbe::new(ProbeConfig {
        quick_timeout: policy.quick_timeout,
        deep_timeout: policy.deep_timeout,
        ..ProbeConfig::default()
    })?;

    let mut online: Vec<Endpoint> = Vec::new();
    let ids: Vec<Endpoint> = (range.min()..=range.max()).map(Endpoint::new).collect();
    for batch in ids.chunks(policy.batch_size.max(1)) {
        let results = join_all(batch.iter().map(|&endpoint| {
            let probe = &probe;
            let template = &template;
            let samples = &samples;
            async move {
                for path in samples {
                    if probe.quick_check(&template.url_for(endpoint, path)).await {
                        return (endpoint, true);
                    }
                }
                (endpoint, false)
            }
        }))
        .await;

        for (endpoint, serving) in results {
            if serving {
                info!(%endpoint, "endpoint is serving");
                online.push(endpoint);
            } else {
                info!(%endpoint, "endpoint is not serving");
            }
        }
    }

    let rate = (online.len() as f64 / range.count() as f64) * 100.0;
    info!(
        online = online.len(),
        total = range.count(),
        rate = %format!("{rate:.1}%"),
        "scan complete"
    );
    if online.is_empty() {
        warn!("no endpoint in range is serving the sampled paths");
    }
    Ok(())
}

fn locate(config: &AppConfig, playlist: Option<PathBuf>) -> Result<PathBuf> {
    match playlist {
        Some(path) if path.is_file() => Ok(path),
        Some(path) => Err(CliError::PlaylistNotFound {
            name: path.display().to_string(),
            root: PathBuf::from("."),
        }),
        None => locator::find_playlist(
            Path::new("."),
            &config.playlist_name,
            &config.playlist_candidates,
        ),
    }
}

/// Up to `limit` distinct content paths, in document order.
fn sample_paths(document: &Document, limit: usize) -> Vec<ContentPath> {
    let mut seen: HashSet<ContentPath> = HashSet::new();
    let mut samples = Vec::new();
    for (_, route) in document.routes() {
        if samples.len() >= limit.max(1) {
            break;
        }
        if seen.insert(route.path.clone()) {
            samples.push(route.path.clone());
        }
    }
    samples
}

fn summarize(entries: &[rotor_engine::EntryStatus]) {
    let mut kept = 0usize;
    let mut restored = 0usize;
    let mut relocated = 0usize;
    let mut unresolved = 0usize;
    for entry in entries {
        match entry.action {
            EntryAction::Kept => kept += 1,
            EntryAction::Restored => restored += 1,
            EntryAction::Relocated { .. } => relocated += 1,
            EntryAction::Annotated | EntryAction::Unresolved => unresolved += 1,
        }
    }
    info!(kept, restored, relocated, unresolved, "pass summary");
}
