// Document locator: finds the playlist file without a hard-coded path.

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{CliError, Result};

/// Locate the playlist: recursive search for `name` under `root` first
/// (first match in lexicographic directory order), then the configured
/// fallback candidates. Not finding it is fatal for the run.
pub fn find_playlist(root: &Path, name: &str, candidates: &[PathBuf]) -> Result<PathBuf> {
    if let Some(found) = search_tree(root, name) {
        debug!(path = %found.display(), "playlist located by search");
        return Ok(found);
    }

    for candidate in candidates {
        let path = root.join(candidate);
        if path.is_file() {
            debug!(path = %path.display(), "playlist located via fallback candidate");
            return Ok(path);
        }
    }

    Err(CliError::PlaylistNotFound {
        name: name.to_owned(),
        root: root.to_path_buf(),
    })
}

/// Depth-first search, visiting entries in name order so results are stable
/// across runs. Dot-directories (`.git` and friends) are skipped.
fn search_tree(dir: &Path, name: &str) -> Option<PathBuf> {
    let mut entries: Vec<PathBuf> = std::fs::read_dir(dir)
        .ok()?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .collect();
    entries.sort();

    for path in &entries {
        if path.file_name().and_then(|n| n.to_str()) == Some(name) && path.is_file() {
            return Some(path.clone());
        }
    }
    for path in entries {
        let hidden = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.starts_with('.'));
        if path.is_dir() && !hidden {
            if let Some(found) = search_tree(&path, name) {
                return Some(found);
            }
        }
    }
    None
}
