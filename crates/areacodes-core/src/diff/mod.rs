//! Diff annotation files.
//!
//! A diff file `SRC-DST.diff` annotates every code that changed between the
//! `SRC` and `DST` snapshots. Each file is processed as an independent unit:
//! fresh indexes of both snapshots, a fresh [`SymmetryAudit`], and
//! bookkeeping of which vanished/appeared codes were covered. All of it is
//! dropped when the file is done; only the emitted [`FwdDiff`] edges survive.
//!
//! # Flow
//!
//! ```text
//! line ──parse_line──▶ ChangeLine ──check names──▶ resolve_line ──▶ FwdDiff(s)
//!                                                        │
//!                                                 SymmetryAudit
//! ```
//!
//! Reverse lines (`+CODE name<a,b`) are normalized to forward edges: one
//! edge per resolved predecessor, each pointing at the line's own code.

mod line;
mod select;

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

pub use line::{ChangeKind, ChangeLine, Line, LineError, Selector, parse_line};
pub use select::{Asymmetry, SelectError, SymmetryAudit, resolve, resolve_line};

use crate::files::{display_name, file_stem, for_each_line, list_files_if_present};
use crate::snapshot::{Snapshot, SnapshotIndex};
use crate::{AreaError, Result};

/// A forward successor edge derived from one change line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FwdDiff {
    /// Destination snapshot time.
    pub time: u32,
    /// Code whose entry gains the successors.
    pub code: u32,
    /// Derived from an `=` line.
    pub internal: bool,
    /// The code had children, so the relation is informational only.
    pub optional: bool,
    pub successors: Vec<u32>,
    /// Index into the run's description list, for described files.
    pub desc_id: Option<u32>,
}

/// A diff file and the snapshot pair it annotates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffFile {
    pub path: PathBuf,
    pub src: u32,
    pub dst: u32,
}

impl DiffFile {
    /// Parse the `SRC-DST` file stem.
    pub fn from_path(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let stem = file_stem(&path)?;
        let (src, dst) = stem
            .split_once('-')
            .and_then(|(src, dst)| Some((src.parse().ok()?, dst.parse().ok()?)))
            .ok_or_else(|| AreaError::InvalidFileStem(stem.to_string()))?;
        Ok(Self { path, src, dst })
    }

    /// Name used in diagnostics.
    pub fn name(&self) -> String {
        display_name(&self.path)
    }
}

/// Every diff file in `dir`, ordered by destination then source year.
pub fn list_diff_files(dir: &Path) -> Result<Vec<DiffFile>> {
    let mut diffs = list_files_if_present(dir)?
        .into_iter()
        .map(DiffFile::from_path)
        .collect::<Result<Vec<_>>>()?;
    diffs.sort_by_key(|d| (d.dst, d.src));
    Ok(diffs)
}

/// Dataset-quality findings of one diff file. Non-fatal.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DiffFindings {
    pub asymmetries: Vec<Asymmetry>,
    /// Codes that vanished or appeared without a covering line.
    pub omissions: Vec<u32>,
}

impl DiffFindings {
    pub fn is_clean(&self) -> bool {
        self.asymmetries.is_empty() && self.omissions.is_empty()
    }
}

/// Comment that switches a diff file into described mode.
pub const DESCRIBED_MARKER: &str = "![described]";

/// Description blocks of a described diff file.
///
/// ```text
/// #![described]
/// # First paragraph of the description,
/// # continued.
/// -110103 崇文区>东城区          desc_id 0
/// -110104 宣武区>西城区          desc_id 0
///
/// # Next description.
/// +110119 延庆区<延庆县          desc_id 1
/// ```
///
/// A comment block becomes a description when the next change line is
/// reached; a blank line ends the current description's scope. In
/// described mode every change line must be covered.
#[derive(Debug, Default)]
struct Describer {
    described: bool,
    pending: String,
    current: Option<u32>,
    next_id: u32,
    texts: Vec<String>,
}

impl Describer {
    fn comment(&mut self, text: &str) {
        if text.trim() == DESCRIBED_MARKER {
            self.described = true;
        } else if self.described {
            self.pending.push_str(text.trim_start());
            self.pending.push('\n');
        }
    }

    fn blank(&mut self) {
        self.pending.clear();
        self.current = None;
    }

    /// Id for the change line owning `code`.
    fn change(&mut self, code: u32) -> Result<Option<u32>> {
        if !self.pending.is_empty() {
            self.pending.pop();
            self.texts.push(std::mem::take(&mut self.pending));
            self.current = Some(self.next_id);
            self.next_id += 1;
        }
        if self.described && self.current.is_none() {
            return Err(AreaError::NoDescription(code));
        }
        Ok(self.current)
    }
}

/// Per-file processing state.
pub struct DiffRun {
    time: u32,
    src: SnapshotIndex,
    dst: SnapshotIndex,
    audit: SymmetryAudit,
    /// Source codes not yet deleted.
    undeleted: BTreeSet<u32>,
    /// Destination codes not yet added.
    unadded: BTreeSet<u32>,
    describer: Describer,
}

impl DiffRun {
    pub fn new(src: &Snapshot, dst: &Snapshot) -> Self {
        Self {
            time: dst.time,
            src: SnapshotIndex::from(src),
            dst: SnapshotIndex::from(dst),
            audit: SymmetryAudit::new(),
            undeleted: src.names.keys().copied().collect(),
            unadded: dst.names.keys().copied().collect(),
            describer: Describer::default(),
        }
    }

    /// Number this file's descriptions from `first_id`, so ids stay unique
    /// across files.
    pub fn numbering_descriptions_from(mut self, first_id: u32) -> Self {
        self.describer.next_id = first_id;
        self
    }

    /// Descriptions collected so far, in id order.
    pub fn take_descriptions(&mut self) -> Vec<String> {
        std::mem::take(&mut self.describer.texts)
    }

    /// Process one line, handing resulting edges to `emit`.
    pub fn apply_line(&mut self, text: &str, emit: &mut impl FnMut(FwdDiff) -> Result<()>) -> Result<()> {
        let line = match parse_line(text)? {
            Line::Change(line) => line,
            Line::Comment(comment) => {
                self.describer.comment(comment);
                return Ok(());
            }
            Line::Empty => {
                self.describer.blank();
                return Ok(());
            }
        };
        let desc_id = self.describer.change(line.code)?;
        self.check_names(&line)?;

        let (table, origin) = if line.fwd {
            (&self.dst, &self.src)
        } else {
            (&self.src, &self.dst)
        };
        let resolved = resolve_line(&line, table, origin, &mut self.audit)?;
        if resolved.is_empty() {
            return Err(AreaError::EmptySelectors(line.code));
        }
        let optional = origin.has_children(line.code);

        if line.fwd {
            emit(FwdDiff {
                time: self.time,
                code: line.code,
                internal: line.is_internal(),
                optional,
                successors: resolved,
                desc_id,
            })
        } else {
            for predecessor in resolved {
                emit(FwdDiff {
                    time: self.time,
                    code: predecessor,
                    internal: line.is_internal(),
                    optional,
                    successors: vec![line.code],
                    desc_id,
                })?;
            }
            Ok(())
        }
    }

    fn check_names(&mut self, line: &ChangeLine<'_>) -> Result<()> {
        let code = line.code;
        let src_name = self.src.name_by_code(code);
        let dst_name = self.dst.name_by_code(code);

        match line.kind {
            ChangeKind::Internal => {
                if src_name != dst_name || src_name != Some(line.name) {
                    return Err(AreaError::InvalidInternalChange(code));
                }
            }
            ChangeKind::Deletion => {
                if src_name != Some(line.name) {
                    return Err(AreaError::InvalidDeletion(code));
                }
                if dst_name == Some(line.name) {
                    warn!(code, "same-name deletion");
                }
                if !self.undeleted.remove(&code) {
                    return Err(AreaError::DuplicateDeletion(code));
                }
            }
            ChangeKind::Addition => {
                if dst_name != Some(line.name) {
                    return Err(AreaError::InvalidAddition(code));
                }
                if src_name == Some(line.name) {
                    warn!(code, "same-name addition");
                }
                if !self.unadded.remove(&code) {
                    return Err(AreaError::DuplicateAddition(code));
                }
            }
        }
        Ok(())
    }

    /// Close the run and collect its findings.
    pub fn finish(self) -> DiffFindings {
        DiffFindings {
            asymmetries: self.audit.asymmetries(),
            omissions: self
                .undeleted
                .symmetric_difference(&self.unadded)
                .copied()
                .collect(),
        }
    }
}

fn snapshot_for(snapshots: &BTreeMap<u32, Snapshot>, time: u32) -> Result<&Snapshot> {
    snapshots.get(&time).ok_or(AreaError::MissingSnapshot(time))
}

/// Process one diff file, aborting on the first invalid line.
///
/// Findings are logged as warnings and returned.
pub fn process_diff_file(
    diff: &DiffFile,
    snapshots: &BTreeMap<u32, Snapshot>,
    descriptions: &mut Vec<String>,
    mut emit: impl FnMut(FwdDiff) -> Result<()>,
) -> Result<DiffFindings> {
    let name = diff.name();
    let _span = tracing::info_span!("diff", file = %name).entered();

    let first_id = descriptions.len() as u32;
    let mut run = DiffRun::new(snapshot_for(snapshots, diff.src)?, snapshot_for(snapshots, diff.dst)?)
        .numbering_descriptions_from(first_id);
    let mut edges = 0usize;
    let mut counting_emit = |fd: FwdDiff| {
        debug!(code = fd.code, successors = ?fd.successors, optional = fd.optional, "edge");
        edges += 1;
        emit(fd)
    };

    for_each_line(&diff.path, |line_no, text| {
        run.apply_line(text, &mut counting_emit)
            .map_err(|e| e.at_line(&name, line_no))
    })?;

    descriptions.extend(run.take_descriptions());
    let findings = run.finish();
    for asymmetry in &findings.asymmetries {
        warn!("{asymmetry}");
    }
    if !findings.omissions.is_empty() {
        warn!(codes = ?findings.omissions, "omission detected");
    }
    info!(edges, "processed diff");
    Ok(findings)
}

/// A problem found while linting a diff file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Problem {
    pub file: String,
    /// Full message, file (and line, if any) included.
    pub message: String,
}

impl std::fmt::Display for Problem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

/// Check every line of a diff file without stopping at the first error.
///
/// Line errors, asymmetries and omissions all become problems.
pub fn lint_diff_file(diff: &DiffFile, snapshots: &BTreeMap<u32, Snapshot>) -> Result<Vec<Problem>> {
    let name = diff.name();
    let mut run = DiffRun::new(snapshot_for(snapshots, diff.src)?, snapshot_for(snapshots, diff.dst)?);
    let mut problems = Vec::new();

    for_each_line(&diff.path, |line_no, text| {
        if let Err(e) = run.apply_line(text, &mut |_| Ok(())) {
            problems.push(Problem {
                file: name.clone(),
                message: e.at_line(&name, line_no).to_string(),
            });
        }
        Ok(())
    })?;

    let findings = run.finish();
    for asymmetry in findings.asymmetries {
        problems.push(Problem {
            file: name.clone(),
            message: format!("{name}: {asymmetry}"),
        });
    }
    for code in findings.omissions {
        problems.push(Problem {
            file: name.clone(),
            message: format!("{name}: {code}: omission detected"),
        });
    }
    Ok(problems)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(time: u32, rows: &[(u32, &str)]) -> Snapshot {
        let mut snapshot = Snapshot::new(time);
        for &(code, name) in rows {
            snapshot.names.insert(code, name.to_string());
        }
        snapshot
    }

    fn run_lines(run: &mut DiffRun, lines: &[&str]) -> Result<Vec<FwdDiff>> {
        let mut edges = Vec::new();
        for line in lines {
            run.apply_line(line, &mut |fd| {
                edges.push(fd);
                Ok(())
            })?;
        }
        Ok(edges)
    }

    fn merge_pair() -> (Snapshot, Snapshot) {
        let src = snapshot(
            2009,
            &[(110000, "北京市"), (110100, "市辖区"), (110101, "东城区"), (110103, "崇文区")],
        );
        let dst = snapshot(2010, &[(110000, "北京市"), (110100, "市辖区"), (110101, "东城区")]);
        (src, dst)
    }

    #[test]
    fn test_diff_file_stem() {
        let diff = DiffFile::from_path("diff/2009-2010.diff").unwrap();
        assert_eq!((diff.src, diff.dst), (2009, 2010));
        assert_eq!(diff.name(), "2009-2010.diff");
        assert!(matches!(
            DiffFile::from_path("diff/2009.diff"),
            Err(AreaError::InvalidFileStem(_))
        ));
    }

    #[test]
    fn test_forward_line_emits_one_edge() {
        let (src, dst) = merge_pair();
        let mut run = DiffRun::new(&src, &dst);
        let edges = run_lines(&mut run, &["-110103 崇文区>东城区"]).unwrap();
        assert_eq!(
            edges,
            vec![FwdDiff {
                time: 2010,
                code: 110103,
                internal: false,
                optional: false,
                successors: vec![110101],
                desc_id: None,
            }]
        );
    }

    #[test]
    fn test_reverse_line_normalized() {
        let src = snapshot(2009, &[(110000, "北京市"), (110100, "市辖区"), (110101, "东城区"), (110103, "崇文区")]);
        let dst = snapshot(2010, &[(110000, "北京市"), (110100, "市辖区"), (110105, "新区")]);
        let mut run = DiffRun::new(&src, &dst);
        let edges = run_lines(
            &mut run,
            &["-110101 东城区>新区", "-110103 崇文区>新区", "+110105 新区<东城区,崇文区"],
        )
        .unwrap();

        let reversed: Vec<_> = edges[2..].iter().map(|e| (e.code, e.successors.clone())).collect();
        assert_eq!(reversed, vec![(110101, vec![110105]), (110103, vec![110105])]);
        assert!(run.finish().is_clean());
    }

    #[test]
    fn test_optional_when_code_has_children() {
        let src = snapshot(2009, &[(110000, "北京市"), (110200, "县"), (110228, "密云县")]);
        let dst = snapshot(2010, &[(110000, "北京市"), (110100, "市辖区"), (110228, "密云县")]);
        let mut run = DiffRun::new(&src, &dst);
        let edges = run_lines(&mut run, &["-110200 县>.."]).unwrap();
        assert!(edges[0].optional);
        assert_eq!(edges[0].successors, vec![110000]);
    }

    #[test]
    fn test_name_checks() {
        let (src, dst) = merge_pair();
        let mut run = DiffRun::new(&src, &dst);
        assert!(matches!(
            run_lines(&mut run, &["-110103 宣武区>东城区"]),
            Err(AreaError::InvalidDeletion(110103))
        ));
        assert!(matches!(
            run_lines(&mut run, &["+110101 西城区<崇文区"]),
            Err(AreaError::InvalidAddition(110101))
        ));
        assert!(matches!(
            run_lines(&mut run, &["=110103 崇文区>."]),
            Err(AreaError::InvalidInternalChange(110103))
        ));
    }

    #[test]
    fn test_duplicate_deletion() {
        let (src, dst) = merge_pair();
        let mut run = DiffRun::new(&src, &dst);
        let err = run_lines(&mut run, &["-110103 崇文区>东城区", "-110103 崇文区>东城区"]).unwrap_err();
        assert!(matches!(err, AreaError::DuplicateDeletion(110103)));
    }

    #[test]
    fn test_empty_selectors_after_annotations() {
        let (src, dst) = merge_pair();
        let mut run = DiffRun::new(&src, &dst);
        let err = run_lines(&mut run, &["-110103 崇文区>东城区?"]).unwrap_err();
        assert!(matches!(err, AreaError::EmptySelectors(110103)));
    }

    #[test]
    fn test_omission_detected() {
        let (src, dst) = merge_pair();
        let run = DiffRun::new(&src, &dst);
        assert_eq!(run.finish().omissions, vec![110103]);
    }

    #[test]
    fn test_process_file_wraps_line_context() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("2009-2010.diff");
        std::fs::write(&path, "# merged\n-110103 崇文区>西城区\n").unwrap();

        let (src, dst) = merge_pair();
        let snapshots = BTreeMap::from([(2009, src), (2010, dst)]);
        let diff = DiffFile::from_path(&path).unwrap();

        let err = process_diff_file(&diff, &snapshots, &mut Vec::new(), |_| Ok(())).unwrap_err();
        assert_eq!(err.to_string(), "2009-2010.diff(2): 西城区@110103: not found");
    }

    #[test]
    fn test_process_file_missing_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("2008-2009.diff");
        std::fs::write(&path, "").unwrap();
        let diff = DiffFile::from_path(&path).unwrap();
        let err = process_diff_file(&diff, &BTreeMap::new(), &mut Vec::new(), |_| Ok(())).unwrap_err();
        assert!(matches!(err, AreaError::MissingSnapshot(2008)));
    }

    #[test]
    fn test_lint_collects_every_problem() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("2009-2010.diff");
        std::fs::write(&path, "-110103 崇文区>西城区\n-110103 宣武区>东城区\n*junk\n").unwrap();

        let (src, dst) = merge_pair();
        let snapshots = BTreeMap::from([(2009, src), (2010, dst)]);
        let diff = DiffFile::from_path(&path).unwrap();

        let problems = lint_diff_file(&diff, &snapshots).unwrap();
        let messages: Vec<_> = problems.iter().map(|p| p.message.as_str()).collect();
        assert_eq!(
            messages,
            vec![
                "2009-2010.diff(1): 西城区@110103: not found",
                "2009-2010.diff(2): 110103: invalid deletion",
                "2009-2010.diff(3): invalid format: unknown marker '*'",
            ]
        );
    }

    #[test]
    fn test_list_diff_files_ordered_by_destination() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["2010-2012.diff", "2009-2010.diff", "2011-2012.diff"] {
            std::fs::write(dir.path().join(name), "").unwrap();
        }
        let diffs = list_diff_files(dir.path()).unwrap();
        let pairs: Vec<_> = diffs.iter().map(|d| (d.src, d.dst)).collect();
        assert_eq!(pairs, vec![(2009, 2010), (2010, 2012), (2011, 2012)]);
    }

    fn two_merges() -> (Snapshot, Snapshot) {
        let src = snapshot(
            2009,
            &[
                (110000, "北京市"),
                (110100, "市辖区"),
                (110101, "东城区"),
                (110102, "西城区"),
                (110103, "崇文区"),
                (110104, "宣武区"),
            ],
        );
        let dst = snapshot(2010, &[(110000, "北京市"), (110100, "市辖区"), (110101, "东城区"), (110102, "西城区")]);
        (src, dst)
    }

    const DESCRIBED: &[&str] = &[
        "#![described]",
        "# 崇文区并入东城区,",
        "#  同日生效",
        "-110103 崇文区>东城区",
        "",
        "# 宣武区并入西城区",
        "-110104 宣武区>西城区",
    ];

    #[test]
    fn test_described_file_assigns_ids() {
        let (src, dst) = two_merges();
        let mut run = DiffRun::new(&src, &dst).numbering_descriptions_from(5);
        let edges = run_lines(&mut run, DESCRIBED).unwrap();

        let ids: Vec<_> = edges.iter().map(|e| e.desc_id).collect();
        assert_eq!(ids, vec![Some(5), Some(6)]);
        assert_eq!(
            run.take_descriptions(),
            vec!["崇文区并入东城区,\n同日生效".to_string(), "宣武区并入西城区".to_string()]
        );
    }

    #[test]
    fn test_description_scope_spans_until_blank_line() {
        let (src, dst) = two_merges();
        let mut run = DiffRun::new(&src, &dst);
        let edges = run_lines(
            &mut run,
            &["#![described]", "# 合并", "-110103 崇文区>东城区", "-110104 宣武区>西城区"],
        )
        .unwrap();
        assert!(edges.iter().all(|e| e.desc_id == Some(0)));

        let mut run = DiffRun::new(&src, &dst);
        let err = run_lines(&mut run, &["#![described]", "# 合并", "-110103 崇文区>东城区", "", "-110104 宣武区>西城区"])
            .unwrap_err();
        assert!(matches!(err, AreaError::NoDescription(110104)));
    }

    #[test]
    fn test_described_file_requires_description() {
        let (src, dst) = two_merges();
        let mut run = DiffRun::new(&src, &dst);
        let err = run_lines(&mut run, &["#![described]", "-110103 崇文区>东城区"]).unwrap_err();
        assert_eq!(err.to_string(), "110103: no description");

        let mut run = DiffRun::new(&src, &dst);
        let err = run_lines(&mut run, &["# ![described]", "-110103 崇文区>东城区"]).unwrap_err();
        assert!(matches!(err, AreaError::NoDescription(110103)));
    }

    #[test]
    fn test_comments_are_not_descriptions_by_default() {
        let (src, dst) = two_merges();
        let mut run = DiffRun::new(&src, &dst);
        let edges = run_lines(&mut run, &["# 合并", "-110103 崇文区>东城区"]).unwrap();
        assert_eq!(edges[0].desc_id, None);
        assert!(run.take_descriptions().is_empty());
    }

    #[test]
    fn test_process_file_numbers_descriptions_globally() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("2009-2010.diff");
        std::fs::write(&path, DESCRIBED.join("\n")).unwrap();

        let (src, dst) = two_merges();
        let snapshots = BTreeMap::from([(2009, src), (2010, dst)]);
        let diff = DiffFile::from_path(&path).unwrap();

        let mut descriptions = vec!["earlier file".to_string()];
        let mut edges = Vec::new();
        process_diff_file(&diff, &snapshots, &mut descriptions, |fd| {
            edges.push(fd.desc_id);
            Ok(())
        })
        .unwrap();
        assert_eq!(edges, vec![Some(1), Some(2)]);
        assert_eq!(descriptions.len(), 3);
        assert_eq!(descriptions[2], "宣武区并入西城区");
    }
}
