//! Fixed paths, labels and headers.

/// Directory holding one `YYYY.txt` snapshot per dataset year.
pub const DATA_DIRECTORY: &str = "data";

/// Directory holding hand-authored `SRC-DST.diff` annotation files.
pub const DIFF_DIRECTORY: &str = "diff";

/// Default path of the tabular report.
pub const OUTPUT_CSV_PATH: &str = "result.csv";

/// Default path of the hierarchical report.
pub const OUTPUT_JSON_PATH: &str = "codes.json";

/// Name of the implicit root, code `0`.
pub const ROOT_NAME: &str = "中华人民共和国";

/// Prefecture column for counties with no prefecture-level ancestor.
pub const DIRECT_PLACEHOLDER: &str = "直辖";

/// UTF-8 byte-order mark written ahead of the tabular report.
pub const CSV_BOM: &str = "\u{FEFF}";

/// Header row of the tabular report.
pub const CSV_HEADER: [&str; 9] = [
    "代码",
    "一级行政区",
    "二级行政区",
    "名称",
    "级别",
    "状态",
    "启用时间",
    "变更（弃用）时间",
    "新代码",
];

/// Extension given to scaffolded diff files.
pub const DIFF_EXTENSION: &str = "diff";
