//! Dated snapshot files and the per-run lookup index built from them.
//!
//! A snapshot file lists every code active in one dataset year:
//!
//! ```text
//! 110000	北京市
//! 110100	市辖区
//! 110101	东城区
//! ```
//!
//! [`Snapshot`] is the loaded file. [`SnapshotIndex`] is the bidirectional
//! lookup used by selector resolution; it is built fresh for each diff file
//! and dropped afterwards.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;

use thiserror::Error;

use crate::code::parent;
use crate::consts::ROOT_NAME;
use crate::files::{display_name, file_stem, for_each_line};
use crate::{AreaError, Result};

/// Malformed snapshot line.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SnapshotLineError {
    #[error("line too short")]
    TooShort,
    #[error("invalid code")]
    InvalidCode,
    #[error("no tab")]
    NoTab,
}

/// Split `CCCCCC\tname` into code and name.
pub fn parse_snapshot_line(line: &str) -> std::result::Result<(u32, &str), SnapshotLineError> {
    let bytes = line.as_bytes();
    if bytes.len() < 7 {
        return Err(SnapshotLineError::TooShort);
    }
    let code = parse_code(&bytes[..6]).ok_or(SnapshotLineError::InvalidCode)?;
    if bytes[6] != b'\t' {
        return Err(SnapshotLineError::NoTab);
    }
    Ok((code, &line[7..]))
}

/// Parse exactly six ASCII digits.
pub(crate) fn parse_code(digits: &[u8]) -> Option<u32> {
    if digits.len() != 6 || !digits.iter().all(u8::is_ascii_digit) {
        return None;
    }
    Some(digits.iter().fold(0, |acc, d| acc * 10 + u32::from(d - b'0')))
}

/// One dataset year: every active code and its name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
    /// Dataset year, taken from the file stem.
    pub time: u32,
    /// Names by code.
    pub names: BTreeMap<u32, String>,
}

impl Snapshot {
    /// Create an empty snapshot for `time`.
    pub fn new(time: u32) -> Self {
        Self {
            time,
            names: BTreeMap::new(),
        }
    }

    /// Load `YYYY.txt`; the stem is the snapshot time.
    pub fn load(path: &Path) -> Result<Self> {
        let stem = file_stem(path)?;
        let time = stem
            .parse()
            .map_err(|_| AreaError::InvalidFileStem(stem.to_string()))?;
        let file = display_name(path);

        let mut snapshot = Snapshot::new(time);
        for_each_line(path, |line_no, line| {
            let (code, name) =
                parse_snapshot_line(line).map_err(|e| AreaError::from(e).at_line(&file, line_no))?;
            snapshot.names.insert(code, name.to_string());
            Ok(())
        })?;
        Ok(snapshot)
    }

    /// Name of `code` in this snapshot.
    pub fn name(&self, code: u32) -> Option<&str> {
        self.names.get(&code).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// Code ↔ name lookup for one snapshot, aware of which codes have children.
#[derive(Debug, Clone)]
pub struct SnapshotIndex {
    names_by_code: HashMap<u32, String>,
    codes_by_name: HashMap<String, Vec<u32>>,
    with_children: HashSet<u32>,
}

impl Default for SnapshotIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl SnapshotIndex {
    pub fn new() -> Self {
        Self {
            names_by_code: HashMap::with_capacity(4096),
            codes_by_name: HashMap::with_capacity(4096),
            with_children: HashSet::with_capacity(512),
        }
    }

    /// Register or rename `code` and mark its resolved parent as having a child.
    pub fn insert(&mut self, code: u32, name: String) {
        if let Some(old) = self.names_by_code.get(&code) {
            if *old == name {
                return;
            }
            if let Some(codes) = self.codes_by_name.get_mut(old) {
                codes.retain(|&c| c != code);
                if codes.is_empty() {
                    self.codes_by_name.remove(old);
                }
            }
        }
        self.codes_by_name.entry(name.clone()).or_default().push(code);
        self.names_by_code.insert(code, name);
        let parent = self.parent_code_exact(code);
        self.with_children.insert(parent);
    }

    /// Name of `code`; the root name for `0`.
    pub fn name_by_code(&self, code: u32) -> Option<&str> {
        self.names_by_code
            .get(&code)
            .map(String::as_str)
            .or_else(|| (code == 0).then_some(ROOT_NAME))
    }

    /// All codes sharing `name`, in insertion order.
    pub fn codes_by_name(&self, name: &str) -> &[u32] {
        self.codes_by_name.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Nearest ancestor actually present, skipping absent tiers; `0` if none.
    pub fn parent_code_exact(&self, code: u32) -> u32 {
        let mut cur = parent(code);
        while cur != 0 && !self.names_by_code.contains_key(&cur) {
            cur = parent(cur);
        }
        cur
    }

    /// Name of the nearest present ancestor.
    pub fn parent_name(&self, code: u32) -> Option<&str> {
        self.name_by_code(self.parent_code_exact(code))
    }

    /// `true` if some inserted code resolves to `code` as its parent.
    pub fn has_children(&self, code: u32) -> bool {
        self.with_children.contains(&code)
    }

    pub fn contains(&self, code: u32) -> bool {
        self.names_by_code.contains_key(&code)
    }

    pub fn len(&self) -> usize {
        self.names_by_code.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names_by_code.is_empty()
    }
}

impl From<&Snapshot> for SnapshotIndex {
    fn from(snapshot: &Snapshot) -> Self {
        let mut index = SnapshotIndex::new();
        // BTreeMap order inserts parents before their children.
        for (&code, name) in &snapshot.names {
            index.insert(code, name.clone());
        }
        index
    }
}
