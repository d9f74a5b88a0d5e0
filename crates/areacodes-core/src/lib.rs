//! Timeline reconstruction for six-digit administrative-division codes.
//!
//! Input is a series of dated snapshots (every active code and its name in
//! one dataset year) plus hand-written diff annotations explaining how codes
//! between two consecutive snapshots relate. Output is every code's version
//! history with successor edges, rendered as a flat CSV log and a nested
//! JSON tree.
//!
//! # Phases
//!
//! Building runs three strictly sequential phases over a [`Timeline`]:
//!
//! 1. **Fold snapshots**: one entry per code whenever its name or its
//!    parent's name changes, plus a deprecation entry when it disappears.
//! 2. **Attach diffs**: every change line resolves its selectors against
//!    the far-side snapshot and becomes [`FwdDiff`] edges on the entry in
//!    effect before the change.
//! 3. **Fill implicit edges**: a version without an explicit edge into the
//!    next version simply continued as itself.
//!
//! Any malformed input, unresolvable selector or inconsistent annotation is
//! fatal ([`AreaError`]). Dataset-quality concerns that leave the history
//! intact are reported as `tracing` warnings.

pub mod code;
pub mod consts;
pub mod diff;
mod error;
pub mod files;
pub mod pipeline;
pub mod report;
pub mod scaffold;
pub mod snapshot;
pub mod timeline;

pub use code::Level;
pub use diff::{DiffFile, FwdDiff, Problem};
pub use error::AreaError;
pub use pipeline::{Layout, Progress, Summary};
pub use report::{Report, ReportNode, ReportSuccessor, Row, Status};
pub use snapshot::{Snapshot, SnapshotIndex};
pub use timeline::{Area, Entry, Successor, Timeline};

/// Result type for timeline operations.
pub type Result<T> = std::result::Result<T, AreaError>;
