//! Cardinality report
//!
//! Turns a finished [`CardinalityIndex`] into rows and renders them as an
//! aligned plain-text table:
//!
//! ```text
//! measurement            series fields cloud2 cardinality
//! -----------            ------ ------ ------------------
//! "db0"."autogen"."cpu"  2      1      2
//! "db0"."autogen"."mem"  1      1      1
//! -----------            ------ ------ ------------------
//! total                  3      2      3
//! ```
//!
//! The combined ("cloud2") cardinality of a row is `series * fields`. It is
//! an upper bound for a field-per-column ingestion model, not a measured
//! join. The total row sums each column independently, so the combined
//! total is the sum of the per-row products.
//!
//! Names are raw bytes. Labels quote them the way Go's `%q` does, so bytes
//! that are not valid UTF-8 show up as `\xNN` escapes.

use std::fmt::Write as _;
use std::io::{self, Write};

use crate::cardinality::{CardinalityIndex, CountingMode};

const HEADER: [&str; 4] = ["measurement", "series", "fields", "cloud2 cardinality"];
const SEPARATOR: [&str; 4] = ["-----------", "------", "------", "------------------"];

// ============================================================================
// Rows
// ============================================================================

/// Counts for one (database, retention policy, measurement)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MeasurementRow {
    /// Database name
    pub database: Vec<u8>,
    /// Retention policy name
    pub retention_policy: Vec<u8>,
    /// Measurement name
    pub measurement: Vec<u8>,
    /// Distinct series keys
    pub series: u64,
    /// Distinct field names
    pub fields: u64,
}

impl MeasurementRow {
    /// `series * fields`, saturating at `u64::MAX`
    pub fn combined(&self) -> u64 {
        self.series.saturating_mul(self.fields)
    }

    /// `"db"."rp"."measurement"` with each part quoted by [`quote`]
    pub fn label(&self) -> String {
        format!(
            "{}.{}.{}",
            quote(&self.database),
            quote(&self.retention_policy),
            quote(&self.measurement)
        )
    }
}

/// Column sums over every row
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReportTotals {
    /// Sum of series counts
    pub series: u64,
    /// Sum of field counts
    pub fields: u64,
    /// Sum of per-row combined cardinalities
    pub combined: u64,
}

impl ReportTotals {
    fn add(&mut self, row: &MeasurementRow) {
        self.series = self.series.saturating_add(row.series);
        self.fields = self.fields.saturating_add(row.fields);
        self.combined = self.combined.saturating_add(row.combined());
    }
}

// ============================================================================
// Report
// ============================================================================

/// Rows and totals read once from a finished index
#[derive(Debug, Clone)]
pub struct CardinalityReport {
    rows: Vec<MeasurementRow>,
    totals: ReportTotals,
    mode: CountingMode,
}

impl CardinalityReport {
    /// Read every bucket of `index` and compute its counts
    pub fn from_index(index: &CardinalityIndex) -> Self {
        let mut totals = ReportTotals::default();
        let rows = index
            .iter()
            .map(|(db, rp, measurement, counters)| {
                let row = MeasurementRow {
                    database: db.to_vec(),
                    retention_policy: rp.to_vec(),
                    measurement: measurement.to_vec(),
                    series: counters.series.count(),
                    fields: counters.fields.count(),
                };
                totals.add(&row);
                row
            })
            .collect();

        Self {
            rows,
            totals,
            mode: index.mode(),
        }
    }

    /// Rows grouped by database, then retention policy, then measurement
    pub fn rows(&self) -> &[MeasurementRow] {
        &self.rows
    }

    /// Column totals
    pub fn totals(&self) -> ReportTotals {
        self.totals
    }

    /// True if counts come from sketches
    pub fn is_estimated(&self) -> bool {
        !self.mode.is_exact()
    }

    /// Label of the total row: `total` or `total (estimated)`
    pub fn total_label(&self) -> String {
        format!("total{}", self.mode.title_suffix())
    }

    /// Render the table to `out`
    pub fn write_table<W: Write>(&self, out: &mut W) -> io::Result<()> {
        let mut table = TableWriter::new(MIN_WIDTH, PADDING);
        table.row(HEADER.map(str::to_owned));
        table.row(SEPARATOR.map(str::to_owned));
        for row in &self.rows {
            table.row([
                row.label(),
                row.series.to_string(),
                row.fields.to_string(),
                row.combined().to_string(),
            ]);
        }
        table.row(SEPARATOR.map(str::to_owned));
        table.row([
            self.total_label(),
            self.totals.series.to_string(),
            self.totals.fields.to_string(),
            self.totals.combined.to_string(),
        ]);
        table.flush(out)
    }
}

// ============================================================================
// Quoting
// ============================================================================

/// Double-quote `name` with Go `%q` escaping.
///
/// Printable characters pass through and `"` and `\` are backslash-escaped.
/// The usual control characters use their short forms (`\n`, `\t`, ...).
/// Other non-printable characters become `\xNN`, `\uNNNN` or `\UNNNNNNNN`,
/// and each byte of an invalid UTF-8 sequence becomes `\xNN`. A character
/// counts as printable if it is neither a control character nor whitespace
/// other than a plain space.
pub fn quote(name: &[u8]) -> String {
    let mut out = String::with_capacity(name.len() + 2);
    out.push('"');

    let mut rest = name;
    while !rest.is_empty() {
        match std::str::from_utf8(rest) {
            Ok(valid) => {
                push_escaped(&mut out, valid);
                break;
            },
            Err(e) => {
                let (valid, after) = rest.split_at(e.valid_up_to());
                if let Ok(valid) = std::str::from_utf8(valid) {
                    push_escaped(&mut out, valid);
                }
                let bad = e.error_len().unwrap_or(after.len());
                for byte in &after[..bad] {
                    let _ = write!(out, "\\x{:02x}", byte);
                }
                rest = &after[bad..];
            },
        }
    }

    out.push('"');
    out
}

fn push_escaped(out: &mut String, text: &str) {
    for c in text.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\u{07}' => out.push_str("\\a"),
            '\u{08}' => out.push_str("\\b"),
            '\u{0c}' => out.push_str("\\f"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '\u{0b}' => out.push_str("\\v"),
            c if is_printable(c) => out.push(c),
            c if (c as u32) < 0x80 => {
                let _ = write!(out, "\\x{:02x}", c as u32);
            },
            c if (c as u32) < 0x10000 => {
                let _ = write!(out, "\\u{:04x}", c as u32);
            },
            c => {
                let _ = write!(out, "\\U{:08x}", c as u32);
            },
        }
    }
}

fn is_printable(c: char) -> bool {
    !c.is_control() && (c == ' ' || !c.is_whitespace())
}

// ============================================================================
// Table Writer
// ============================================================================

const MIN_WIDTH: usize = 8;
const PADDING: usize = 1;

/// Buffers rows and left-aligns every column except the last
struct TableWriter<const N: usize> {
    min_width: usize,
    padding: usize,
    rows: Vec<[String; N]>,
}

impl<const N: usize> TableWriter<N> {
    fn new(min_width: usize, padding: usize) -> Self {
        Self {
            min_width,
            padding,
            rows: Vec::new(),
        }
    }

    fn row(&mut self, cells: [String; N]) {
        self.rows.push(cells);
    }

    fn column_widths(&self) -> [usize; N] {
        let mut widths = [self.min_width; N];
        for cells in &self.rows {
            for (width, cell) in widths.iter_mut().zip(cells.iter()) {
                *width = (*width).max(cell.chars().count() + self.padding);
            }
        }
        widths
    }

    fn flush<W: Write>(self, out: &mut W) -> io::Result<()> {
        let widths = self.column_widths();
        let mut line = String::new();
        for cells in &self.rows {
            line.clear();
            for (i, cell) in cells.iter().enumerate() {
                line.push_str(cell);
                if i + 1 < N {
                    let pad = widths[i] - cell.chars().count();
                    line.extend(std::iter::repeat(' ').take(pad));
                }
            }
            line.push('\n');
            out.write_all(line.as_bytes())?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scenario_index(mode: CountingMode) -> CardinalityIndex {
        let mut index = CardinalityIndex::new(mode);
        for key in ["cpu,host=a#!~#value", "cpu,host=b#!~#value", "mem,host=a#!~#used"] {
            index.record_key("db0", "autogen", key.as_bytes());
        }
        index
    }

    fn render(report: &CardinalityReport) -> String {
        let mut out = Vec::new();
        report.write_table(&mut out).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn test_rows_and_totals() {
        let report = CardinalityReport::from_index(&scenario_index(CountingMode::Exact));
        let rows = report.rows();
        assert_eq!(rows.len(), 2);
        assert_eq!((&rows[0].measurement[..], rows[0].series, rows[0].fields), (&b"cpu"[..], 2, 1));
        assert_eq!((&rows[1].measurement[..], rows[1].series, rows[1].fields), (&b"mem"[..], 1, 1));
        assert_eq!(
            report.totals(),
            ReportTotals {
                series: 3,
                fields: 2,
                combined: 3
            }
        );
        assert!(!report.is_estimated());
    }

    #[test]
    fn test_total_of_products_not_product_of_totals() {
        let mut index = CardinalityIndex::new(CountingMode::Exact);
        index.record_key("db", "rp", b"a,t=1#!~#f1");
        index.record_key("db", "rp", b"a,t=2#!~#f2");
        index.record_key("db", "rp", b"b,t=1#!~#f1");
        index.record_key("db", "rp", b"b,t=1#!~#f2");
        index.record_key("db", "rp", b"b,t=1#!~#f3");

        let totals = CardinalityReport::from_index(&index).totals();
        // a: 2 x 2, b: 1 x 3
        assert_eq!(totals.combined, 7);
        assert_ne!(totals.combined, totals.series * totals.fields);
    }

    #[test]
    fn test_table_layout() {
        let report = CardinalityReport::from_index(&scenario_index(CountingMode::Exact));
        let expected = concat!(
            "measurement           series  fields  cloud2 cardinality\n",
            "-----------           ------  ------  ------------------\n",
            "\"db0\".\"autogen\".\"cpu\" 2       1       2\n",
            "\"db0\".\"autogen\".\"mem\" 1       1       1\n",
            "-----------           ------  ------  ------------------\n",
            "total                 3       2       3\n",
        );
        assert_eq!(render(&report), expected);
    }

    #[test]
    fn test_empty_report_renders_zero_totals() {
        let report = CardinalityReport::from_index(&CardinalityIndex::new(CountingMode::Exact));
        let expected = concat!(
            "measurement series  fields  cloud2 cardinality\n",
            "----------- ------  ------  ------------------\n",
            "----------- ------  ------  ------------------\n",
            "total       0       0       0\n",
        );
        assert_eq!(render(&report), expected);
    }

    #[test]
    fn test_estimated_total_label() {
        let report = CardinalityReport::from_index(&scenario_index(CountingMode::default()));
        assert!(report.is_estimated());
        assert_eq!(report.total_label(), "total (estimated)");
        assert!(render(&report).lines().last().unwrap().starts_with("total (estimated) "));
    }

    #[test]
    fn test_label_escapes_quotes() {
        let row = MeasurementRow {
            database: b"d\"b".to_vec(),
            retention_policy: b"rp".to_vec(),
            measurement: b"m".to_vec(),
            series: u64::MAX,
            fields: 2,
        };
        assert_eq!(row.label(), r#""d\"b"."rp"."m""#);
        assert_eq!(row.combined(), u64::MAX);
    }

    #[test]
    fn test_quote_matches_go_escaping() {
        assert_eq!(quote(b"cpu"), r#""cpu""#);
        assert_eq!(quote(br#"a\b"c"#), r#""a\\b\"c""#);
        assert_eq!(quote(b"tab\tnl\n"), r#""tab\tnl\n""#);
        assert_eq!(quote(b"del\x7f"), r#""del\x7f""#);
        assert_eq!(quote(b"nul\x00"), r#""nul\x00""#);
        assert_eq!(quote("caf\u{e9} \u{a0}".as_bytes()), "\"caf\u{e9} \\u00a0\"");
    }

    #[test]
    fn test_quote_invalid_utf8_bytes() {
        assert_eq!(quote(b"m\xff"), r#""m\xff""#);
        assert_eq!(quote(b"m\xe2\x82"), r#""m\xe2\x82""#);
        assert_eq!(quote(b"\xfeok"), r#""\xfeok""#);
    }

    #[test]
    fn test_invalid_utf8_rows_stay_distinct() {
        let mut index = CardinalityIndex::new(CountingMode::Exact);
        index.record_key("db", "rp", b"m\xff,a=1#!~#f");
        index.record_key("db", "rp", b"m\xfe,a=1#!~#g");

        let report = CardinalityReport::from_index(&index);
        let labels: Vec<String> = report.rows().iter().map(MeasurementRow::label).collect();
        assert_eq!(labels, vec![r#""db"."rp"."m\xfe""#, r#""db"."rp"."m\xff""#]);
        assert_eq!(report.totals().combined, 2);
    }
}
