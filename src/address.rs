//! A1-style cell addressing for the Sheets API.
//!
//! Coordinates are zero-based `(row, col)` pairs. Column labels use bijective
//! base-26 (`A`..`Z`, `AA`..`ZZ`, `AAA`..), rows are rendered 1-based.
//! Only plain rectangular ranges are supported: no formulas, named ranges or
//! multi-sheet references.

use std::fmt;

use regex::Regex;
use std::sync::LazyLock;

use crate::error::{Result, WorkspaceError};

static CELL_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([A-Za-z]+)([1-9][0-9]*)$").expect("Invalid cell regex"));

/// Convert a zero-based column index to its letter label (0 = A, 25 = Z, 26 = AA).
pub fn column_letters(col: u32) -> String {
    let mut letters = Vec::new();
    let mut n = col as u64 + 1;

    while n > 0 {
        n -= 1;
        letters.push((b'A' + (n % 26) as u8) as char);
        n /= 26;
    }

    letters.iter().rev().collect()
}

/// Convert a column label back to its zero-based index (A = 0, AA = 26).
///
/// Returns `None` for empty input, non-letters, or labels that overflow `u32`.
pub fn column_index(letters: &str) -> Option<u32> {
    if letters.is_empty() {
        return None;
    }

    let mut col: u64 = 0;
    for ch in letters.chars() {
        if !ch.is_ascii_alphabetic() {
            return None;
        }
        let v = (ch.to_ascii_uppercase() as u8 - b'A' + 1) as u64;
        col = col.checked_mul(26)?.checked_add(v)?;
        if col > u32::MAX as u64 + 1 {
            return None;
        }
    }

    u32::try_from(col - 1).ok()
}

/// A single zero-based cell coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct CellRef {
    pub row: u32,
    pub col: u32,
}

impl CellRef {
    pub fn new(row: u32, col: u32) -> Self {
        Self { row, col }
    }
}

impl From<(u32, u32)> for CellRef {
    fn from((row, col): (u32, u32)) -> Self {
        Self { row, col }
    }
}

impl fmt::Display for CellRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", column_letters(self.col), self.row as u64 + 1)
    }
}

/// An inclusive rectangular range. `start` is never below or right of `end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CellRange {
    start: CellRef,
    end: CellRef,
}

impl CellRange {
    /// Build a range, rejecting a start that lies below or to the right of the end.
    pub fn new(start: impl Into<CellRef>, end: impl Into<CellRef>) -> Result<Self> {
        let start = start.into();
        let end = end.into();

        if start.row > end.row || start.col > end.col {
            return Err(WorkspaceError::InvalidRange(format!(
                "start ({}, {}) is past end ({}, {})",
                start.row, start.col, end.row, end.col
            )));
        }

        Ok(Self { start, end })
    }

    pub fn start(&self) -> CellRef {
        self.start
    }

    pub fn end(&self) -> CellRef {
        self.end
    }

    /// Number of rows covered.
    pub fn height(&self) -> u32 {
        self.end.row - self.start.row + 1
    }

    /// Number of columns covered.
    pub fn width(&self) -> u32 {
        self.end.col - self.start.col + 1
    }
}

impl fmt::Display for CellRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.start, self.end)
    }
}

/// Render `((start_row, start_col), (end_row, end_col))` as `A1:E4`.
pub fn range_reference(start: impl Into<CellRef>, end: impl Into<CellRef>) -> Result<String> {
    Ok(CellRange::new(start, end)?.to_string())
}

/// Quote a sheet title for use in a range, doubling embedded single quotes.
pub fn quote_sheet_name(sheet_name: &str) -> String {
    format!("'{}'", sheet_name.replace('\'', "''"))
}

/// Sheet-qualified reference: `'Sheet1'` for the whole sheet or `'Sheet1'!A1:B2`.
pub fn sheet_reference(sheet_name: &str, range: Option<&CellRange>) -> String {
    match range {
        Some(range) => format!("{}!{}", quote_sheet_name(sheet_name), range),
        None => quote_sheet_name(sheet_name),
    }
}

/// How the last column of a write range is derived from the start cell.
///
/// `Legacy` offsets the column span from the start *row*, which only agrees
/// with `Corrected` when the start row equals the start column. It is kept so
/// callers that depend on the old ranges can opt into it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EndColumnRule {
    Legacy,
    #[default]
    Corrected,
}

/// Range covered by writing `rows` x `cols` values starting at `start`.
pub fn write_range(start: CellRef, rows: usize, cols: usize, rule: EndColumnRule) -> Result<CellRange> {
    if rows == 0 || cols == 0 {
        return Err(WorkspaceError::EmptyValues);
    }

    let span = |origin: u32, len: usize| -> Result<u32> {
        u32::try_from(len - 1)
            .ok()
            .and_then(|len| origin.checked_add(len))
            .ok_or_else(|| WorkspaceError::InvalidRange(format!("{} cells from {} overflows", len, start)))
    };

    let end_row = span(start.row, rows)?;
    let end_col = match rule {
        EndColumnRule::Legacy => span(start.row, cols)?,
        EndColumnRule::Corrected => span(start.col, cols)?,
    };

    CellRange::new(start, (end_row, end_col))
}

/// Parse a single `B3` style cell reference.
pub fn parse_cell_ref(input: &str) -> Result<CellRef> {
    let invalid = || WorkspaceError::InvalidRange(input.to_string());
    let captures = CELL_REGEX.captures(input.trim()).ok_or_else(invalid)?;

    let col = column_index(&captures[1]).ok_or_else(invalid)?;
    let row: u32 = captures[2].parse().map_err(|_| invalid())?;

    Ok(CellRef::new(row - 1, col))
}

/// Parse an `A1:C4` style range.
pub fn parse_range(input: &str) -> Result<CellRange> {
    let (start, end) = input
        .split_once(':')
        .ok_or_else(|| WorkspaceError::InvalidRange(input.to_string()))?;
    CellRange::new(parse_cell_ref(start)?, parse_cell_ref(end)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_column_letters() {
        assert_eq!(column_letters(0), "A");
        assert_eq!(column_letters(25), "Z");
        assert_eq!(column_letters(26), "AA");
        assert_eq!(column_letters(27), "AB");
        assert_eq!(column_letters(51), "AZ");
        assert_eq!(column_letters(52), "BA");
        assert_eq!(column_letters(701), "ZZ");
        assert_eq!(column_letters(702), "AAA");
        assert_eq!(column_letters(16383), "XFD");
    }

    #[test]
    fn test_column_index_inverts_letters() {
        for n in (0..20_000).chain([u32::MAX - 1, u32::MAX]) {
            assert_eq!(column_index(&column_letters(n)), Some(n), "column {}", n);
        }
    }

    #[test]
    fn test_column_index_rejects_garbage() {
        assert_eq!(column_index(""), None);
        assert_eq!(column_index("A1"), None);
        assert_eq!(column_index("ZZZZZZZZ"), None);
        assert_eq!(column_index("ab"), Some(27));
    }

    #[test]
    fn test_range_reference() {
        assert_eq!(range_reference((0, 0), (0, 0)).unwrap(), "A1:A1");
        assert_eq!(range_reference((0, 0), (3, 4)).unwrap(), "A1:E4");
        assert_eq!(range_reference((9, 26), (10, 27)).unwrap(), "AA10:AB11");
    }

    #[test]
    fn test_range_reference_rejects_inverted() {
        assert!(matches!(
            range_reference((2, 0), (1, 0)),
            Err(WorkspaceError::InvalidRange(_))
        ));
        assert!(matches!(
            range_reference((0, 3), (5, 2)),
            Err(WorkspaceError::InvalidRange(_))
        ));
    }

    #[test]
    fn test_sheet_reference() {
        let range = CellRange::new((0, 0), (1, 1)).unwrap();
        assert_eq!(sheet_reference("Sheet1", None), "'Sheet1'");
        assert_eq!(sheet_reference("My Data", Some(&range)), "'My Data'!A1:B2");
        assert_eq!(sheet_reference("Bob's", None), "'Bob''s'");
    }

    #[test]
    fn test_write_range_spans_values() {
        let range = write_range(CellRef::new(0, 0), 3, 4, EndColumnRule::Corrected).unwrap();
        assert_eq!(range.height(), 3);
        assert_eq!(range.width(), 4);
        assert_eq!(range.to_string(), "A1:D3");
    }

    #[test]
    fn test_write_range_end_column_rules_diverge_off_diagonal() {
        // Start at B5: the corrected rule spans two columns from B,
        // the legacy rule offsets from the row index (4) and lands on F.
        let start = CellRef::new(4, 1);
        let corrected = write_range(start, 2, 2, EndColumnRule::Corrected).unwrap();
        let legacy = write_range(start, 2, 2, EndColumnRule::Legacy).unwrap();

        assert_eq!(corrected.to_string(), "B5:C6");
        assert_eq!(legacy.to_string(), "B5:F6");
        assert_eq!(legacy.width(), 5);
    }

    #[test]
    fn test_write_range_rules_agree_on_diagonal() {
        let start = CellRef::new(2, 2);
        assert_eq!(
            write_range(start, 3, 2, EndColumnRule::Legacy).unwrap(),
            write_range(start, 3, 2, EndColumnRule::Corrected).unwrap()
        );
    }

    #[test]
    fn test_write_range_legacy_can_invert() {
        // Start column far right of start row: legacy end column falls before start.
        let start = CellRef::new(0, 10);
        assert!(matches!(
            write_range(start, 1, 2, EndColumnRule::Legacy),
            Err(WorkspaceError::InvalidRange(_))
        ));
        assert_eq!(
            write_range(start, 1, 2, EndColumnRule::Corrected).unwrap().to_string(),
            "K1:L1"
        );
    }

    #[test]
    fn test_write_range_rejects_empty() {
        assert!(matches!(
            write_range(CellRef::default(), 0, 3, EndColumnRule::Corrected),
            Err(WorkspaceError::EmptyValues)
        ));
    }

    #[test]
    fn test_parse_cell_ref_and_range() {
        assert_eq!(parse_cell_ref("B3").unwrap(), CellRef::new(2, 1));
        assert_eq!(parse_cell_ref(" aa10 ").unwrap(), CellRef::new(9, 26));
        assert!(parse_cell_ref("A0").is_err());
        assert!(parse_cell_ref("3B").is_err());

        let range = parse_range("A1:E4").unwrap();
        assert_eq!(range.start(), CellRef::new(0, 0));
        assert_eq!(range.end(), CellRef::new(3, 4));
        assert!(parse_range("C3:A1").is_err());
        assert!(parse_range("A1").is_err());
    }
}
