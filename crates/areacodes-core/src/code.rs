//! Geometry of the 6-digit code space.
//!
//! A code is `PPFFCC`: province, prefecture, county. Trailing zero digit
//! groups mark the tier, so parent and level are pure digit arithmetic.

use strum::Display;

/// Structural parent: county → prefecture → province → root (`0`).
pub fn parent(code: u32) -> u32 {
    if code % 100 != 0 {
        code / 100 * 100
    } else if code % 10000 != 0 {
        code / 10000 * 10000
    } else {
        0
    }
}

/// Coarse locality between two codes.
///
/// 1 when both share a prefecture grouping, 2 when they share a province,
/// 3 otherwise. Not a hierarchy distance: a province and one of its counties
/// are 2 apart, a prefecture and its counties 1.
pub fn distance(a: u32, b: u32) -> u32 {
    if a / 100 == b / 100 {
        1
    } else if a / 10000 == b / 10000 {
        2
    } else {
        3
    }
}

/// Administrative tier of a code, most senior first.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Display)]
pub enum Level {
    #[strum(serialize = "省级")]
    Province,
    #[strum(serialize = "地级")]
    Prefecture,
    #[strum(serialize = "县级")]
    County,
}

impl Level {
    /// Classify a code by its trailing zero digit groups.
    pub fn of(code: u32) -> Level {
        if code % 100 != 0 {
            Level::County
        } else if code % 10000 != 0 {
            Level::Prefecture
        } else {
            Level::Province
        }
    }

    /// `true` if `self` ranks strictly above `other`.
    pub fn is_senior_to(self, other: Level) -> bool {
        self < other
    }
}

/// Province code containing `code`.
pub fn province_of(code: u32) -> u32 {
    code / 10000 * 10000
}

/// Prefecture grouping containing `code`; equals the province code for
/// directly-administered counties.
pub fn prefecture_of(code: u32) -> u32 {
    code / 100 * 100
}
