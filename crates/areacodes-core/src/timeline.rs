//! Per-code version history.
//!
//! The timeline is an arena of [`Area`]s keyed by code. Each Area owns an
//! append-only list of [`Entry`] versions; all cross-references go through
//! codes, never through pointers.
//!
//! It is built in three phases, strictly in this order:
//!
//! 1. [`Timeline::fold_snapshot`] for every snapshot, oldest first
//! 2. [`Timeline::attach`] for every diff edge
//! 3. [`Timeline::fill_implicit_successors`] once

use std::collections::{BTreeMap, BTreeSet};

use crate::diff::FwdDiff;
use crate::snapshot::Snapshot;
use crate::{AreaError, Result, code};

/// Continuation edge: the owning entry may live on as `code` from `time`.
///
/// Ordered by `(optional, time, code)` so sets stay deterministic and the
/// greatest element is the latest mandatory edge unless optional ones exist.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Successor {
    pub optional: bool,
    pub time: u32,
    pub code: u32,
    /// Description explaining the change, from a described diff file.
    pub desc_id: Option<u32>,
}

/// One version of a code's identity.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Entry {
    /// When this version took effect.
    pub time: u32,
    /// `None` marks a deprecation.
    pub name: Option<String>,
    /// Structural parent's name at `time`, if the parent existed.
    pub parent_name: Option<String>,
    pub successors: BTreeSet<Successor>,
}

impl Entry {
    pub fn new(time: u32, name: Option<String>, parent_name: Option<String>) -> Self {
        Self {
            time,
            name,
            parent_name,
            successors: BTreeSet::new(),
        }
    }

    pub fn is_deprecation(&self) -> bool {
        self.name.is_none()
    }
}

/// Full history of one code.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Area {
    /// Strictly increasing in time; the first entry is the creation.
    pub entries: Vec<Entry>,
    /// The last entry is a deprecation.
    pub deprecated: bool,
}

impl Area {
    pub fn new(entry: Entry) -> Self {
        Self {
            entries: vec![entry],
            deprecated: false,
        }
    }

    /// Name the code was created with.
    pub fn first_name(&self) -> Option<&str> {
        self.entries.first().and_then(|e| e.name.as_deref())
    }

    /// Index of the newest entry that is not the trailing deprecation.
    pub fn last_live_index(&self) -> usize {
        self.entries.len() - if self.deprecated { 2 } else { 1 }
    }

    /// Newest name in effect at some point of `[start, end)`.
    ///
    /// An open `end` takes the final entry's name, which is `None` for a
    /// deprecated Area. Otherwise the final entry of a live Area only needs
    /// to start before `end`; every other named entry must also outlive
    /// `start`.
    pub fn last_name_intersecting(&self, start: u32, end: Option<u32>) -> Option<&str> {
        let last = self.entries.len() - 1;
        let Some(end) = end else {
            return self.entries[last].name.as_deref();
        };

        for (i, cur) in self.entries.iter().enumerate().rev() {
            if i == last && !self.deprecated {
                if cur.time < end {
                    return cur.name.as_deref();
                }
                continue;
            }
            if cur.name.is_none() {
                continue;
            }
            let next_time = self.entries.get(i + 1).map(|e| e.time);
            if next_time.is_some_and(|t| t > start) && cur.time < end {
                return cur.name.as_deref();
            }
        }
        None
    }
}

/// Every code's history, in code order.
#[derive(Debug, Default)]
pub struct Timeline {
    areas: BTreeMap<u32, Area>,
    last_time: Option<u32>,
    descriptions: Vec<String>,
}

impl Timeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Phase 1: fold one snapshot into the history.
    ///
    /// Codes missing from the snapshot are deprecated; present codes gain an
    /// entry when their name or parent's name changed, which also revives a
    /// deprecated code.
    pub fn fold_snapshot(&mut self, snapshot: &Snapshot) -> Result<()> {
        let time = snapshot.time;
        if let Some(previous) = self.last_time {
            if time <= previous {
                return Err(AreaError::SnapshotOrder { time, previous });
            }
        }
        self.last_time = Some(time);

        for (code, area) in &mut self.areas {
            if !area.deprecated && !snapshot.names.contains_key(code) {
                area.entries.push(Entry::new(time, None, None));
                area.deprecated = true;
            }
        }

        for (&code, name) in &snapshot.names {
            let parent_name = snapshot.name(code::parent(code));
            match self.areas.get_mut(&code) {
                Some(area) => {
                    let changed = area.entries.last().is_none_or(|last| {
                        last.name.as_deref() != Some(name.as_str()) || last.parent_name.as_deref() != parent_name
                    });
                    if changed {
                        area.entries.push(Entry::new(
                            time,
                            Some(name.clone()),
                            parent_name.map(str::to_string),
                        ));
                        area.deprecated = false;
                    }
                }
                None => {
                    let entry = Entry::new(time, Some(name.clone()), parent_name.map(str::to_string));
                    self.areas.insert(code, Area::new(entry));
                }
            }
        }
        Ok(())
    }

    /// Phase 2: attach a diff edge to the entry in effect just before it.
    pub fn attach(&mut self, diff: &FwdDiff) -> Result<()> {
        // `..` from a province resolves to the root, which has no history.
        if diff.code == 0 {
            return Ok(());
        }
        let area = self
            .areas
            .get_mut(&diff.code)
            .ok_or(AreaError::AreaNotFound(diff.code))?;
        let entry = area
            .entries
            .iter_mut()
            .rev()
            .find(|e| e.time < diff.time)
            .ok_or(AreaError::EntryNotFound {
                code: diff.code,
                time: diff.time,
            })?;

        for &code in &diff.successors {
            entry.successors.insert(Successor {
                optional: diff.optional,
                time: diff.time,
                code,
                desc_id: diff.desc_id,
            });
        }
        Ok(())
    }

    /// Phase 3: every version without an explicit edge to the next version
    /// simply continued as itself.
    pub fn fill_implicit_successors(&mut self) {
        for (&code, area) in &mut self.areas {
            for i in 1..area.entries.len() {
                let next_time = area.entries[i].time;
                let entry = &mut area.entries[i - 1];
                if entry.successors.last().is_none_or(|s| s.time != next_time) {
                    entry.successors.insert(Successor {
                        optional: false,
                        time: next_time,
                        code,
                        desc_id: None,
                    });
                }
            }
        }
    }

    /// Install the change descriptions that successor `desc_id`s index into.
    pub fn set_descriptions(&mut self, descriptions: Vec<String>) {
        self.descriptions = descriptions;
    }

    pub fn descriptions(&self) -> &[String] {
        &self.descriptions
    }

    pub fn get(&self, code: u32) -> Option<&Area> {
        self.areas.get(&code)
    }

    /// Areas in ascending code order.
    pub fn iter(&self) -> impl Iterator<Item = (u32, &Area)> {
        self.areas.iter().map(|(&code, area)| (code, area))
    }

    pub fn len(&self) -> usize {
        self.areas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.areas.is_empty()
    }
}
