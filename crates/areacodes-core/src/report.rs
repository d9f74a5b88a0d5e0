//! Tabular and hierarchical reports over a finished [`Timeline`].
//!
//! Every named, live entry becomes one CSV row and one tree node. Codes are
//! visited in ascending order and each code's entries newest first, so
//! parents are always placed before the entries that hang under them:
//!
//! ```text
//! 110000 北京市                 province, at the root
//! └── 110100 市辖区             prefecture, under its province
//!     └── 110101 东城区         county, under the first prefecture node
//!                               that started no later than it did
//! ```

use std::collections::BTreeSet;
use std::io::{self, Write};

use serde::Serialize;
use strum::Display;

use crate::code::{Level, prefecture_of, province_of};
use crate::consts::{CSV_BOM, CSV_HEADER, DIRECT_PLACEHOLDER};
use crate::timeline::{Area, Entry, Timeline};
use crate::{AreaError, Result};

/// Lifecycle label of a report row.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Display)]
pub enum Status {
    #[strum(serialize = "启用")]
    Active,
    #[strum(serialize = "变更")]
    Changed,
    #[strum(serialize = "弃用")]
    Deprecated,
}

impl Status {
    pub fn of(end: Option<u32>, is_last: bool) -> Status {
        match end {
            None => Status::Active,
            Some(_) if is_last => Status::Deprecated,
            Some(_) => Status::Changed,
        }
    }
}

/// Continuation edge as written to the tree; `time` is absent when the
/// successor takes over exactly when the node ends.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ReportSuccessor {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time: Option<u32>,
    pub code: u32,
    /// Index into [`Report::descriptions`].
    #[serde(skip_serializing_if = "Option::is_none")]
    pub desc_id: Option<u32>,
}

/// One entry of one code in the hierarchical report.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ReportNode {
    pub code: u32,
    pub name: String,
    pub start: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end: Option<u32>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub successors: Vec<ReportSuccessor>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<ReportNode>,
}

/// One line of the tabular report.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Row {
    pub code: u32,
    pub province: String,
    pub prefecture: String,
    pub name: String,
    pub level: Level,
    pub status: Status,
    pub start: u32,
    pub end: Option<u32>,
    /// `(time, code)` pairs, optional edges included.
    pub successors: Vec<(u32, u32)>,
}

impl Row {
    /// `;`-joined successors; the `[time]` suffix is left off when the
    /// successor takes over exactly when the row ends.
    pub fn successor_field(&self) -> String {
        self.successors
            .iter()
            .map(|&(time, code)| {
                if self.end == Some(time) {
                    code.to_string()
                } else {
                    format!("{code}[{time}]")
                }
            })
            .collect::<Vec<_>>()
            .join(";")
    }

    /// Fields in [`CSV_HEADER`] order.
    pub fn record(&self) -> [String; 9] {
        [
            self.code.to_string(),
            self.province.clone(),
            self.prefecture.clone(),
            self.name.clone(),
            self.level.to_string(),
            self.status.to_string(),
            self.start.to_string(),
            self.end.map(|end| end.to_string()).unwrap_or_default(),
            self.successor_field(),
        ]
    }
}

/// Both reports, ready to be written.
#[derive(Debug, Default)]
pub struct Report {
    pub rows: Vec<Row>,
    /// Province nodes.
    pub tree: Vec<ReportNode>,
    /// Change descriptions, indexed by `desc_id`.
    pub descriptions: Vec<String>,
}

/// Top-level shape of the hierarchical report.
#[derive(Serialize)]
struct TreeDocument<'a> {
    items: &'a [ReportNode],
    descriptions: &'a [String],
}

impl Report {
    /// Walk `timeline` and lay out every live named entry.
    pub fn build(timeline: &Timeline) -> Result<Report> {
        let mut report = Report {
            descriptions: timeline.descriptions().to_vec(),
            ..Report::default()
        };
        for (code, area) in timeline.iter() {
            let last = area.last_live_index();
            for i in (0..=last).rev() {
                let entry = &area.entries[i];
                let Some(name) = entry.name.as_deref() else {
                    continue;
                };
                let end = area.entries.get(i + 1).map(|e| e.time);
                report.push_entry(timeline, code, name, entry, end, i == last)?;
            }
        }
        Ok(report)
    }

    fn push_entry(
        &mut self,
        timeline: &Timeline,
        code: u32,
        name: &str,
        entry: &Entry,
        end: Option<u32>,
        is_last: bool,
    ) -> Result<()> {
        let level = Level::of(code);
        let start = entry.time;

        let province_code = province_of(code);
        let province = timeline
            .get(province_code)
            .and_then(Area::first_name)
            .ok_or(AreaError::AreaNotFound(province_code))?;

        let (prefecture, anchor) = match level {
            Level::Province => ("", Anchor::Root),
            Level::Prefecture => (name, Anchor::Province(province_code)),
            Level::County => {
                let prefecture_code = prefecture_of(code);
                let prefecture_name = timeline
                    .get(prefecture_code)
                    .filter(|_| Level::of(prefecture_code) == Level::Prefecture)
                    .and_then(|area| area.last_name_intersecting(start, end));
                match prefecture_name {
                    Some(prefecture_name) => (
                        prefecture_name,
                        Anchor::Prefecture {
                            province: province_code,
                            prefecture: prefecture_code,
                            start,
                        },
                    ),
                    None => (DIRECT_PLACEHOLDER, Anchor::Province(province_code)),
                }
            }
        };

        let successors = entry
            .successors
            .iter()
            .filter(|s| !s.optional)
            .map(|s| ReportSuccessor {
                time: (end != Some(s.time)).then_some(s.time),
                code: s.code,
                desc_id: s.desc_id,
            })
            .collect();
        let node = ReportNode {
            code,
            name: name.to_string(),
            start,
            end,
            successors,
            children: Vec::new(),
        };
        children_for(&mut self.tree, code, anchor)?.push(node);

        let successors: BTreeSet<(u32, u32)> = entry.successors.iter().map(|s| (s.time, s.code)).collect();
        self.rows.push(Row {
            code,
            province: province.to_string(),
            prefecture: prefecture.to_string(),
            name: name.to_string(),
            level,
            status: Status::of(end, is_last),
            start,
            end,
            successors: successors.into_iter().collect(),
        });
        Ok(())
    }

    /// Byte-order mark, header, then one record per row. Fields are quoted
    /// only when they contain a delimiter, quote or line break.
    pub fn write_csv(&self, out: &mut impl Write) -> io::Result<()> {
        out.write_all(CSV_BOM.as_bytes())?;
        let mut writer = csv::WriterBuilder::new().has_headers(false).from_writer(out);
        writer.write_record(CSV_HEADER)?;
        for row in &self.rows {
            writer.write_record(row.record())?;
        }
        writer.flush()
    }

    /// Pretty JSON `{"items": [...], "descriptions": [...]}`.
    pub fn write_json(&self, out: &mut impl Write) -> serde_json::Result<()> {
        let document = TreeDocument {
            items: &self.tree,
            descriptions: &self.descriptions,
        };
        serde_json::to_writer_pretty(out, &document)
    }
}

/// Where a new node hangs in the tree.
#[derive(Clone, Copy, Debug)]
enum Anchor {
    Root,
    Province(u32),
    Prefecture { province: u32, prefecture: u32, start: u32 },
}

fn children_for(roots: &mut Vec<ReportNode>, code: u32, anchor: Anchor) -> Result<&mut Vec<ReportNode>> {
    let missing = |parent| AreaError::NodeNotFound { code, parent };
    match anchor {
        Anchor::Root => Ok(roots),
        Anchor::Province(province) => roots
            .iter_mut()
            .find(|n| n.code == province)
            .map(|n| &mut n.children)
            .ok_or_else(|| missing(province)),
        Anchor::Prefecture {
            province,
            prefecture,
            start,
        } => roots
            .iter_mut()
            .find(|n| n.code == province)
            .ok_or_else(|| missing(province))?
            .children
            .iter_mut()
            .find(|n| n.code == prefecture && n.start <= start)
            .map(|n| &mut n.children)
            .ok_or_else(|| missing(prefecture)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diff::FwdDiff;
    use crate::snapshot::Snapshot;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn snapshot(time: u32, rows: &[(u32, &str)]) -> Snapshot {
        let mut snapshot = Snapshot::new(time);
        for &(code, name) in rows {
            snapshot.names.insert(code, name.to_string());
        }
        snapshot
    }

    fn timeline(snapshots: &[Snapshot], diffs: &[FwdDiff]) -> Timeline {
        let mut timeline = Timeline::new();
        for s in snapshots {
            timeline.fold_snapshot(s).unwrap();
        }
        for d in diffs {
            timeline.attach(d).unwrap();
        }
        timeline.fill_implicit_successors();
        timeline
    }

    fn csv_text(report: &Report) -> String {
        let mut out = Vec::new();
        report.write_csv(&mut out).unwrap();
        String::from_utf8(out).unwrap()
    }

    /// Data lines of the written CSV, header skipped.
    fn lines(report: &Report) -> Vec<String> {
        csv_text(report).lines().skip(1).map(str::to_string).collect()
    }

    fn merged_county() -> Timeline {
        timeline(
            &[
                snapshot(2020, &[(110000, "北京市"), (110100, "市辖区"), (110101, "东城区"), (110103, "崇文区")]),
                snapshot(2021, &[(110000, "北京市"), (110100, "市辖区"), (110101, "东城区")]),
            ],
            &[FwdDiff {
                time: 2021,
                code: 110103,
                internal: false,
                optional: false,
                successors: vec![110101],
                desc_id: None,
            }],
        )
    }

    #[test]
    fn test_status_labels() {
        assert_eq!(Status::of(None, true).to_string(), "启用");
        assert_eq!(Status::of(Some(2021), true).to_string(), "弃用");
        assert_eq!(Status::of(Some(2021), false).to_string(), "变更");
    }

    #[test]
    fn test_rows_for_merged_county() {
        let report = Report::build(&merged_county()).unwrap();
        assert_eq!(
            lines(&report),
            vec![
                "110000,北京市,,北京市,省级,启用,2020,,",
                "110100,北京市,市辖区,市辖区,地级,启用,2020,,",
                "110101,北京市,市辖区,东城区,县级,启用,2020,,",
                "110103,北京市,市辖区,崇文区,县级,弃用,2020,2021,110101",
            ]
        );
    }

    #[test]
    fn test_tree_for_merged_county() {
        let report = Report::build(&merged_county()).unwrap();
        let value = serde_json::to_value(&report.tree).unwrap();
        assert_eq!(
            value,
            json!([{
                "code": 110000,
                "name": "北京市",
                "start": 2020,
                "children": [{
                    "code": 110100,
                    "name": "市辖区",
                    "start": 2020,
                    "children": [
                        {"code": 110101, "name": "东城区", "start": 2020},
                        {
                            "code": 110103,
                            "name": "崇文区",
                            "start": 2020,
                            "end": 2021,
                            "successors": [{"code": 110101}]
                        }
                    ]
                }]
            }])
        );
    }

    #[test]
    fn test_rename_rows_newest_first() {
        let t = timeline(
            &[
                snapshot(2020, &[(110000, "北京市"), (110101, "东城区")]),
                snapshot(2021, &[(110000, "北京市"), (110101, "东城新区")]),
            ],
            &[],
        );
        let report = Report::build(&t).unwrap();
        assert_eq!(
            lines(&report),
            vec![
                "110000,北京市,,北京市,省级,启用,2020,,",
                "110101,北京市,直辖,东城新区,县级,启用,2021,,",
                "110101,北京市,直辖,东城区,县级,变更,2020,2021,110101",
            ]
        );

        let children = &report.tree[0].children;
        assert_eq!(children.len(), 2);
        assert_eq!(children[0].name, "东城新区");
        assert_eq!(
            children[1].successors,
            vec![ReportSuccessor {
                time: None,
                code: 110101,
                desc_id: None
            }]
        );
    }

    #[test]
    fn test_directly_administered_county() {
        let t = timeline(&[snapshot(2020, &[(420000, "湖北省"), (429004, "仙桃市")])], &[]);
        let report = Report::build(&t).unwrap();
        assert_eq!(lines(&report)[1], "429004,湖北省,直辖,仙桃市,县级,启用,2020,,");
        assert_eq!(report.tree[0].children[0].code, 429004);
    }

    #[test]
    fn test_successor_column_formats() {
        let row = Row {
            code: 110103,
            province: "北京市".to_string(),
            prefecture: "市辖区".to_string(),
            name: "崇文区".to_string(),
            level: Level::County,
            status: Status::Deprecated,
            start: 2000,
            end: Some(2010),
            successors: vec![(2005, 110105), (2010, 110101), (2010, 110102)],
        };
        assert_eq!(row.successor_field(), "110105[2005];110101;110102");
        assert_eq!(row.record()[7], "2010");
        assert_eq!(row.record()[8], "110105[2005];110101;110102");
    }

    #[test]
    fn test_optional_successors_only_in_csv() {
        let t = timeline(
            &[
                snapshot(2020, &[(110000, "北京市"), (110200, "县"), (110228, "密云县")]),
                snapshot(2021, &[(110000, "北京市"), (110100, "市辖区"), (110228, "密云县")]),
            ],
            &[FwdDiff {
                time: 2021,
                code: 110200,
                internal: false,
                optional: true,
                successors: vec![110000],
                desc_id: None,
            }],
        );
        let report = Report::build(&t).unwrap();
        let row = report.rows.iter().find(|r| r.code == 110200).unwrap();
        assert_eq!(row.successors, vec![(2021, 110000)]);

        let node = report.tree[0].children.iter().find(|n| n.code == 110200).unwrap();
        assert!(node.successors.is_empty());
    }

    #[test]
    fn test_missing_parent_node() {
        let mut roots = Vec::new();
        let err = children_for(&mut roots, 110101, Anchor::Province(110000)).unwrap_err();
        assert_eq!(err.to_string(), "110101: parent node 110000 not found");
    }

    #[test]
    fn test_write_csv_header() {
        let text = csv_text(&Report::build(&merged_county()).unwrap());
        assert!(text.starts_with("\u{FEFF}代码,一级行政区,二级行政区,名称,级别,状态,启用时间,变更（弃用）时间,新代码\n"));
        assert_eq!(text.lines().count(), 5);
        assert!(text.ends_with("110103,北京市,市辖区,崇文区,县级,弃用,2020,2021,110101\n"));
    }

    #[test]
    fn test_write_csv_quotes_names_with_delimiters() {
        let t = timeline(
            &[snapshot(2020, &[(110000, "北京,市"), (110101, "东城\"区\"")])],
            &[],
        );
        let text = csv_text(&Report::build(&t).unwrap());
        assert_eq!(
            text.lines().skip(1).collect::<Vec<_>>(),
            vec![
                "110000,\"北京,市\",,\"北京,市\",省级,启用,2020,,",
                "110101,\"北京,市\",直辖,\"东城\"\"区\"\"\",县级,启用,2020,,",
            ]
        );

        let mut reader = csv::Reader::from_reader(text.as_bytes());
        let records: Vec<csv::StringRecord> = reader.records().collect::<std::result::Result<_, _>>().unwrap();
        assert_eq!(records.len(), 2);
        assert!(records.iter().all(|r| r.len() == 9));
        assert_eq!(&records[0][1], "北京,市");
        assert_eq!(&records[1][3], "东城\"区\"");
    }

    #[test]
    fn test_write_json_carries_descriptions() {
        let mut t = timeline(
            &[
                snapshot(2020, &[(110000, "北京市"), (110101, "东城区"), (110103, "崇文区")]),
                snapshot(2021, &[(110000, "北京市"), (110101, "东城区")]),
            ],
            &[FwdDiff {
                time: 2021,
                code: 110103,
                internal: false,
                optional: false,
                successors: vec![110101],
                desc_id: Some(0),
            }],
        );
        t.set_descriptions(vec!["崇文区并入东城区".to_string()]);
        let report = Report::build(&t).unwrap();

        let mut out = Vec::new();
        report.write_json(&mut out).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(value["descriptions"], json!(["崇文区并入东城区"]));
        assert_eq!(
            value["items"][0]["children"][1]["successors"],
            json!([{"code": 110101, "desc_id": 0}])
        );
        assert!(value["items"][0]["children"][0].get("successors").is_none());
    }
}
