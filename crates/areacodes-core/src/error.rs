//! Error types for timeline reconstruction.
//!
//! Everything here is fatal: downstream phases assume a fully valid history,
//! so the first error aborts the run. Dataset-quality concerns that do not
//! break the history (asymmetries, omissions, same-name changes) are logged
//! as `tracing::warn!` events instead.

use std::path::PathBuf;

use thiserror::Error;

use crate::diff::{LineError, SelectError};
use crate::snapshot::SnapshotLineError;

/// Errors that can occur while building the code timeline.
#[derive(Error, Debug)]
pub enum AreaError {
    /// A failure tied to one line of an input file.
    #[error("{file}({line}): {error}")]
    AtLine {
        file: String,
        line: usize,
        error: Box<AreaError>,
    },

    /// Malformed snapshot line.
    #[error("{0}")]
    Snapshot(#[from] SnapshotLineError),

    /// Malformed diff line.
    #[error("invalid format: {0}")]
    Line(#[from] LineError),

    /// Selector could not be resolved to exactly one code.
    #[error(transparent)]
    Select(#[from] SelectError),

    /// File stem does not follow `YYYY` (snapshots) or `YYYY-YYYY` (diffs).
    #[error("{0}: invalid file stem")]
    InvalidFileStem(String),

    /// Snapshots must be folded in strictly increasing time order.
    #[error("snapshot {time} is not newer than {previous}")]
    SnapshotOrder { time: u32, previous: u32 },

    /// A diff file refers to a snapshot year that was not loaded.
    #[error("snapshot {0} not found")]
    MissingSnapshot(u32),

    /// Internal change whose name differs between the two snapshots.
    #[error("{0}: invalid internal change")]
    InvalidInternalChange(u32),

    /// Deletion whose name does not match the source snapshot.
    #[error("{0}: invalid deletion")]
    InvalidDeletion(u32),

    /// Addition whose name does not match the destination snapshot.
    #[error("{0}: invalid addition")]
    InvalidAddition(u32),

    /// The same code is deleted twice in one diff file.
    #[error("{0}: duplicate deletion")]
    DuplicateDeletion(u32),

    /// The same code is added twice in one diff file.
    #[error("{0}: duplicate addition")]
    DuplicateAddition(u32),

    /// Change line in a described diff file with no description in scope.
    #[error("{0}: no description")]
    NoDescription(u32),

    /// Every selector of a change line was an annotation (`?`).
    #[error("{0}: empty selector list")]
    EmptySelectors(u32),

    /// A diff edge refers to a code with no history.
    #[error("{0}: area not found")]
    AreaNotFound(u32),

    /// A diff edge predates every entry of its code.
    #[error("{code}: entry not found before {time}")]
    EntryNotFound { code: u32, time: u32 },

    /// The report tree has no node to hang an entry under.
    #[error("{code}: parent node {parent} not found")]
    NodeNotFound { code: u32, parent: u32 },

    /// I/O failure on a specific path.
    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Report serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl AreaError {
    /// Attach file and 1-based line context.
    pub fn at_line(self, file: impl Into<String>, line: usize) -> Self {
        AreaError::AtLine {
            file: file.into(),
            line,
            error: Box::new(self),
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        AreaError::Io {
            path: path.into(),
            source,
        }
    }
}
