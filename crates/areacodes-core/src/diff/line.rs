//! Diff annotation line grammar.
//!
//! ```text
//! -110105 朝阳区>#,东城区(北京市)     deletion, forward to the listed codes
//! +110119 延庆区<延庆县              addition, reverse from the listed codes
//! =110000 北京市>..                  internal change, marker picks direction
//! # comment
//! ```
//!
//! A line is a marker byte, a 6-digit code, one separator byte, the name,
//! a direction marker (`>` forward, `<` reverse) and a comma-separated
//! selector list. Selectors ending in `?` are annotations and are dropped;
//! a trailing `!` is stripped.

use thiserror::Error;

use crate::snapshot::parse_code;

/// Malformed diff line.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LineError {
    #[error("unknown marker {0:?}")]
    UnknownMarker(char),
    #[error("line too short")]
    TooShort,
    #[error("invalid code")]
    InvalidCode,
    #[error("invalid separator")]
    InvalidSeparator,
    #[error("no direction marker")]
    NoDirection,
    #[error("direction marker contradicts line marker")]
    InconsistentDirection,
    #[error("empty selector")]
    EmptySelector,
    #[error("invalid selector {0:?}")]
    InvalidSelector(String),
}

/// What a change line claims about its code.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChangeKind {
    /// `-`: the code leaves the source snapshot.
    Deletion,
    /// `+`: the code enters the destination snapshot.
    Addition,
    /// `=`: same code and name on both sides, attribute edit only.
    Internal,
}

/// Reference to a successor (forward) or predecessor (reverse) code.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Selector<'a> {
    /// A name, optionally disambiguated by its parent's name.
    GivenName {
        name: &'a str,
        parent: Option<&'a str>,
    },
    /// `.`: the line's own code.
    CurCode,
    /// `..`: the own code's nearest present parent in the origin table.
    ParentCode,
}

/// A parsed change line.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChangeLine<'a> {
    pub kind: ChangeKind,
    /// Forward (source → destination) or reverse.
    pub fwd: bool,
    pub code: u32,
    pub name: &'a str,
    /// Resolvable selectors in declared order.
    pub selectors: Vec<Selector<'a>>,
}

impl ChangeLine<'_> {
    pub fn is_internal(&self) -> bool {
        self.kind == ChangeKind::Internal
    }
}

/// One line of a diff file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Line<'a> {
    Change(ChangeLine<'a>),
    Comment(&'a str),
    Empty,
}

/// Parse one diff line.
pub fn parse_line(line: &str) -> Result<Line<'_>, LineError> {
    let Some(&marker) = line.as_bytes().first() else {
        return Ok(Line::Empty);
    };

    let (kind, mut fwd) = match marker {
        b'-' => (ChangeKind::Deletion, true),
        b'+' => (ChangeKind::Addition, false),
        b'=' => (ChangeKind::Internal, false),
        b'#' => return Ok(Line::Comment(&line[1..])),
        _ => {
            let c = line.chars().next().unwrap_or_default();
            return Err(LineError::UnknownMarker(c));
        }
    };

    if line.len() < 8 {
        return Err(LineError::TooShort);
    }
    let code = parse_code(&line.as_bytes()[1..7]).ok_or(LineError::InvalidCode)?;

    // Byte 7 separates code and name; its value is not checked.
    let rest = line.get(8..).ok_or(LineError::InvalidSeparator)?;

    let split = rest.find(['>', '<']).ok_or(LineError::NoDirection)?;
    let name = &rest[..split];
    let actual_fwd = rest.as_bytes()[split] == b'>';
    if kind == ChangeKind::Internal {
        fwd = actual_fwd;
    } else if actual_fwd != fwd {
        return Err(LineError::InconsistentDirection);
    }

    let selectors = parse_selectors(&rest[split + 1..], name)?;

    Ok(Line::Change(ChangeLine {
        kind,
        fwd,
        code,
        name,
        selectors,
    }))
}

fn parse_selectors<'a>(list: &'a str, own_name: &'a str) -> Result<Vec<Selector<'a>>, LineError> {
    let mut selectors = Vec::new();
    if list.is_empty() {
        return Ok(selectors);
    }

    for token in list.split(',') {
        if token.ends_with('?') {
            continue;
        }
        let token = token.strip_suffix('!').unwrap_or(token);

        let selector = match token {
            "" => return Err(LineError::EmptySelector),
            "." => Selector::CurCode,
            ".." => Selector::ParentCode,
            _ => parse_given_name(token, own_name)?,
        };
        selectors.push(selector);
    }
    Ok(selectors)
}

fn parse_given_name<'a>(token: &'a str, own_name: &'a str) -> Result<Selector<'a>, LineError> {
    let (mut name, parent) = match token.split_once('(') {
        Some((name, rest)) => {
            let parent = rest
                .strip_suffix(')')
                .ok_or_else(|| LineError::InvalidSelector(token.to_string()))?;
            (name, Some(parent))
        }
        None => (token, None),
    };

    if name == "#" {
        name = own_name;
    } else if name == own_name {
        tracing::warn!(name, "unnecessary repetition, use `#`");
    }
    if name.is_empty() {
        return Err(LineError::InvalidSelector(token.to_string()));
    }

    Ok(Selector::GivenName { name, parent })
}
