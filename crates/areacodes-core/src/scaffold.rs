//! Skeleton diff files for snapshot pairs that still need annotating.
//!
//! Each changed code gets an unannotated line; an annotator then appends the
//! direction marker and selectors:
//!
//! ```text
//! -110103	崇文区        vanished or renamed in the destination
//! +110101	东城区        appeared or renamed in the destination
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::consts::DIFF_EXTENSION;
use crate::pipeline::{Layout, load_snapshots};
use crate::snapshot::Snapshot;
use crate::{AreaError, Result};

/// Unannotated change lines between two snapshots, in code order.
///
/// A renamed code yields a deletion of the old name followed by an addition
/// of the new one. Returns an empty string when nothing changed.
pub fn skeleton(src: &Snapshot, dst: &Snapshot) -> String {
    let mut out = String::new();
    let codes = src.names.keys().chain(dst.names.keys());
    let mut codes: Vec<u32> = codes.copied().collect();
    codes.sort_unstable();
    codes.dedup();

    for code in codes {
        let (old, new) = (src.name(code), dst.name(code));
        if old == new {
            continue;
        }
        if let Some(old) = old {
            out.push_str(&format!("-{code:06}\t{old}\n"));
        }
        if let Some(new) = new {
            out.push_str(&format!("+{code:06}\t{new}\n"));
        }
    }
    out
}

/// Write a skeleton for every consecutive snapshot pair that changed.
///
/// Existing diff files are left alone unless `force` is set. Returns the
/// paths written.
pub fn scaffold(layout: &Layout, force: bool) -> Result<Vec<PathBuf>> {
    let snapshots = load_snapshots(&layout.data_dir)?;
    fs::create_dir_all(&layout.diff_dir).map_err(|e| AreaError::io(&layout.diff_dir, e))?;

    let pairs: Vec<&Snapshot> = snapshots.values().collect();
    let mut written = Vec::new();
    for pair in pairs.windows(2) {
        let (src, dst) = (pair[0], pair[1]);
        let path = diff_path(&layout.diff_dir, src.time, dst.time);
        if path.exists() && !force {
            debug!(path = %path.display(), "kept existing diff");
            continue;
        }

        let body = skeleton(src, dst);
        if body.is_empty() {
            continue;
        }
        fs::write(&path, body).map_err(|e| AreaError::io(&path, e))?;
        info!(path = %path.display(), "wrote skeleton");
        written.push(path);
    }
    Ok(written)
}

fn diff_path(dir: &Path, src: u32, dst: u32) -> PathBuf {
    dir.join(format!("{src}-{dst}.{DIFF_EXTENSION}"))
}
