//! Selector resolution.
//!
//! A selector names a code in `table` (the snapshot on the far side of the
//! change) from the point of view of a line's own code, whose context lives
//! in `origin` (the near side). Forward lines resolve against the
//! destination snapshot, reverse lines against the source.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};

use thiserror::Error;

use crate::code::distance;
use crate::diff::line::{ChangeLine, Selector};
use crate::snapshot::SnapshotIndex;

/// Selector that does not resolve to exactly one code.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SelectError {
    #[error("{name}@{code}: not found")]
    NameNotFound { name: String, code: u32 },
    #[error("{name}@{code}: multiple records found")]
    MultipleFound { name: String, code: u32 },
    #[error("{0}: not found")]
    CodeNotFound(u32),
    #[error("..@{0}: not found")]
    ParentNotFound(u32),
}

/// Resolve `selector` for the line owning `code`.
pub fn resolve(
    selector: &Selector<'_>,
    code: u32,
    table: &SnapshotIndex,
    origin: &SnapshotIndex,
) -> Result<u32, SelectError> {
    match *selector {
        Selector::CurCode => {
            if table.name_by_code(code).is_none() {
                return Err(SelectError::CodeNotFound(code));
            }
            Ok(code)
        }
        Selector::ParentCode => {
            let parent = origin.parent_code_exact(code);
            if table.name_by_code(parent).is_none() {
                return Err(SelectError::ParentNotFound(code));
            }
            Ok(parent)
        }
        Selector::GivenName { name, parent } => resolve_name(name, parent, code, table, origin),
    }
}

fn resolve_name(
    name: &str,
    parent: Option<&str>,
    code: u32,
    table: &SnapshotIndex,
    origin: &SnapshotIndex,
) -> Result<u32, SelectError> {
    let mut min_dist = u32::MAX;
    let mut count = 0;
    let mut found = 0;

    for &candidate in table.codes_by_name(name) {
        let table_parent = table.parent_name(candidate);
        if parent.is_some() && table_parent != parent {
            continue;
        }

        let mut dist = distance(code, candidate);
        // Same group but the parent was renamed or replaced: not a close match.
        if dist == 1 && table_parent != origin.parent_name(candidate) {
            dist = 2;
        }

        match dist.cmp(&min_dist) {
            Ordering::Less => {
                min_dist = dist;
                count = 1;
                found = candidate;
            }
            Ordering::Equal => count += 1,
            Ordering::Greater => {}
        }
    }

    match count {
        0 => Err(SelectError::NameNotFound {
            name: name.to_string(),
            code,
        }),
        1 => Ok(found),
        _ => Err(SelectError::MultipleFound {
            name: name.to_string(),
            code,
        }),
    }
}

/// Resolve every selector of `line` in declared order, recording each
/// resolution in `audit`.
pub fn resolve_line(
    line: &ChangeLine<'_>,
    table: &SnapshotIndex,
    origin: &SnapshotIndex,
    audit: &mut SymmetryAudit,
) -> Result<Vec<u32>, SelectError> {
    let mut resolved = Vec::with_capacity(line.selectors.len());
    for selector in &line.selectors {
        let target = resolve(selector, line.code, table, origin)?;
        audit.record(line.fwd, line.code, target);
        resolved.push(target);
    }
    Ok(resolved)
}

/// Cross-checks that forward and reverse annotations agree within one diff file.
///
/// Codes are signed by side: a source-side code is negative, a
/// destination-side code positive. `-A > B` records `-A → B`; the matching
/// `+B < A` records `B → -A` and cancels it.
#[derive(Debug, Default)]
pub struct SymmetryAudit {
    pending: BTreeMap<i64, BTreeSet<i64>>,
}

/// A relation recorded from one side but contradicted by the other.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Asymmetry {
    /// Code whose line recorded the relation.
    pub code: i64,
    /// Peer that has lines of its own but none pointing back.
    pub peer: i64,
}

impl std::fmt::Display for Asymmetry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}: asymmetry found", self.peer, self.code)
    }
}

impl SymmetryAudit {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that the line for `code` resolved to `target`.
    pub fn record(&mut self, fwd: bool, code: u32, target: u32) {
        let (code, target) = if fwd {
            (-i64::from(code), i64::from(target))
        } else {
            (i64::from(code), -i64::from(target))
        };

        let matched = self
            .pending
            .get_mut(&target)
            .is_some_and(|peers| peers.remove(&code));
        let peers = self.pending.entry(code).or_default();
        if !matched {
            peers.insert(target);
        }
    }

    /// Pending relations whose peer recorded relations of its own.
    pub fn asymmetries(&self) -> Vec<Asymmetry> {
        let mut found = Vec::new();
        for (&code, peers) in &self.pending {
            for &peer in peers {
                if self.pending.contains_key(&peer) {
                    found.push(Asymmetry { code, peer });
                }
            }
        }
        found
    }
}
