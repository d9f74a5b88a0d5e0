//! End-to-end runs over a dataset directory layout.
//!
//! ```text
//! data/YYYY.txt ──fold──▶ Timeline ◀──attach── diff/SRC-DST.diff
//!                            │
//!                     fill implicit edges
//!                            │
//!                 result.csv + codes.json
//! ```

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use tracing::info;

use crate::consts::{DATA_DIRECTORY, DIFF_DIRECTORY, OUTPUT_CSV_PATH, OUTPUT_JSON_PATH};
use crate::diff::{DiffFindings, Problem, lint_diff_file, list_diff_files, process_diff_file};
use crate::files::{for_each_line, list_files, list_files_if_present};
use crate::report::Report;
use crate::snapshot::Snapshot;
use crate::timeline::Timeline;
use crate::{AreaError, Result};

/// Where inputs are read from and reports are written to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    pub data_dir: PathBuf,
    pub diff_dir: PathBuf,
    pub csv_path: PathBuf,
    pub json_path: PathBuf,
}

impl Default for Layout {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(DATA_DIRECTORY),
            diff_dir: PathBuf::from(DIFF_DIRECTORY),
            csv_path: PathBuf::from(OUTPUT_CSV_PATH),
            json_path: PathBuf::from(OUTPUT_JSON_PATH),
        }
    }
}

impl Layout {
    /// The conventional layout under `root`.
    pub fn under(root: &Path) -> Self {
        let default = Self::default();
        Self {
            data_dir: root.join(default.data_dir),
            diff_dir: root.join(default.diff_dir),
            csv_path: root.join(default.csv_path),
            json_path: root.join(default.json_path),
        }
    }
}

/// Every snapshot in `dir`, keyed by time.
pub fn load_snapshots(dir: &Path) -> Result<BTreeMap<u32, Snapshot>> {
    let mut snapshots = BTreeMap::new();
    for path in list_files(dir)? {
        let snapshot = Snapshot::load(&path)?;
        snapshots.insert(snapshot.time, snapshot);
    }
    Ok(snapshots)
}

/// Counts from a finished build.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Summary {
    pub snapshots: usize,
    pub diff_files: usize,
    pub edges: usize,
    pub codes: usize,
    pub rows: usize,
    /// Diff files with asymmetries or omissions.
    pub unclean_files: usize,
}

/// Build the timeline from `layout` without writing anything.
pub fn build_timeline(layout: &Layout) -> Result<(Timeline, Summary)> {
    let snapshots = load_snapshots(&layout.data_dir)?;
    let mut timeline = Timeline::new();
    let mut summary = Summary {
        snapshots: snapshots.len(),
        ..Summary::default()
    };

    for snapshot in snapshots.values() {
        timeline.fold_snapshot(snapshot)?;
        info!(time = snapshot.time, codes = snapshot.len(), "processed snapshot");
    }

    let mut descriptions = Vec::new();
    for diff in list_diff_files(&layout.diff_dir)? {
        let findings: DiffFindings = process_diff_file(&diff, &snapshots, &mut descriptions, |fd| {
            summary.edges += 1;
            timeline.attach(&fd)
        })?;
        summary.diff_files += 1;
        if !findings.is_clean() {
            summary.unclean_files += 1;
        }
    }

    timeline.set_descriptions(descriptions);
    timeline.fill_implicit_successors();
    summary.codes = timeline.len();
    Ok((timeline, summary))
}

/// Full pipeline: build the timeline and write both reports.
pub fn build(layout: &Layout) -> Result<Summary> {
    let (timeline, mut summary) = build_timeline(layout)?;
    let report = Report::build(&timeline)?;
    summary.rows = report.rows.len();

    let mut csv = create(&layout.csv_path)?;
    report
        .write_csv(&mut csv)
        .and_then(|()| csv.flush())
        .map_err(|e| AreaError::io(&layout.csv_path, e))?;

    let mut json = create(&layout.json_path)?;
    report.write_json(&mut json)?;
    json.flush().map_err(|e| AreaError::io(&layout.json_path, e))?;

    info!(
        codes = summary.codes,
        rows = summary.rows,
        csv = %layout.csv_path.display(),
        json = %layout.json_path.display(),
        "reports written"
    );
    Ok(summary)
}

fn create(path: &Path) -> Result<BufWriter<File>> {
    File::create(path)
        .map(BufWriter::new)
        .map_err(|e| AreaError::io(path, e))
}

/// Check every diff file, collecting problems instead of stopping.
///
/// Snapshot errors and unreadable files are still fatal.
pub fn validate(layout: &Layout) -> Result<Vec<Problem>> {
    let snapshots = load_snapshots(&layout.data_dir)?;
    let mut problems = Vec::new();
    for diff in list_diff_files(&layout.diff_dir)? {
        problems.extend(lint_diff_file(&diff, &snapshots)?);
    }
    Ok(problems)
}

/// Annotation progress across all diff files.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Progress {
    /// Change lines carrying a direction marker.
    pub finished: usize,
    /// All change lines.
    pub total: usize,
}

impl Progress {
    pub fn percent(&self) -> f64 {
        if self.total == 0 {
            return 100.0;
        }
        self.finished as f64 / self.total as f64 * 100.0
    }
}

impl std::fmt::Display for Progress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{} ({:.1}%)", self.finished, self.total, self.percent())
    }
}

/// Count annotated change lines in every file of `diff_dir`.
pub fn progress(diff_dir: &Path) -> Result<Progress> {
    let mut progress = Progress::default();
    for path in list_files_if_present(diff_dir)? {
        for_each_line(&path, |_, line| {
            if line.starts_with(['-', '+', '=']) {
                progress.total += 1;
                if line.contains(['>', '<']) {
                    progress.finished += 1;
                }
            }
            Ok(())
        })?;
    }
    Ok(progress)
}
