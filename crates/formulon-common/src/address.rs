//! Ranges, sheet-qualified references, and A1/R1C1 text conversions.

use std::fmt;

use crate::coord::{ARef, Anchor, column_to_letters, letters_to_column};

pub type SheetName = String;

/// `(sheet, cell)` pair, used by the dependency graph to key cross-sheet edges.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QualifiedRef {
    pub sheet: SheetName,
    pub cell: ARef,
}

impl QualifiedRef {
    pub fn new(sheet: impl Into<SheetName>, cell: ARef) -> Self {
        Self {
            sheet: sheet.into(),
            cell,
        }
    }
}

/// An inclusive rectangular range, always normalised so `start <= end`
/// componentwise (§4.2).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct CellRange {
    pub start: ARef,
    pub end: ARef,
}

/// Sentinel marking "to the sheet's used-range edge" for full-column/row ranges.
pub const FULL_SPAN: u32 = u32::MAX;

impl CellRange {
    pub fn new(a: ARef, b: ARef) -> Self {
        let start = ARef::new(a.col.min(b.col), a.row.min(b.row));
        let end = ARef::new(a.col.max(b.col), a.row.max(b.row));
        Self { start, end }
    }

    pub fn single(cell: ARef) -> Self {
        Self {
            start: cell,
            end: cell,
        }
    }

    pub fn is_full_column(&self) -> bool {
        self.end.row == FULL_SPAN
    }

    pub fn is_full_row(&self) -> bool {
        self.end.col == FULL_SPAN
    }

    pub fn width(&self) -> u32 {
        self.end.col - self.start.col + 1
    }

    pub fn height(&self) -> u32 {
        self.end.row - self.start.row + 1
    }

    /// Clamp a full-column/row range against a sheet's used extent (§4.5).
    pub fn bounded(&self, used: CellRange) -> CellRange {
        let end_row = if self.is_full_column() {
            used.end.row
        } else {
            self.end.row
        };
        let end_col = if self.is_full_row() {
            used.end.col
        } else {
            self.end.col
        };
        CellRange::new(self.start, ARef::new(end_col, end_row))
    }

    /// Row-major iteration over every cell in the range.
    pub fn iter(&self) -> impl Iterator<Item = ARef> + '_ {
        let (start, end) = (self.start, self.end);
        (start.row..=end.row)
            .flat_map(move |row| (start.col..=end.col).map(move |col| ARef::new(col, row)))
    }

    pub fn to_a1(&self, anchor_start: Anchor, anchor_end: Anchor) -> String {
        format!(
            "{}:{}",
            self.start.to_a1(anchor_start),
            self.end.to_a1(anchor_end)
        )
    }
}

/// Returns true if a sheet name needs quoting when printed (§4.2): anything
/// outside `[A-Za-z0-9_]`, or a name starting with a digit.
pub fn sheet_name_needs_quoting(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        None => return true,
        Some(c) if c.is_ascii_digit() => return true,
        _ => {}
    }
    !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Format a sheet name for use before `!`, doubling embedded apostrophes and
/// wrapping in single quotes when required.
pub fn format_sheet_name(name: &str) -> String {
    if sheet_name_needs_quoting(name) {
        format!("'{}'", name.replace('\'', "''"))
    } else {
        name.to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddressParseError {
    Invalid(String),
}

impl fmt::Display for AddressParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AddressParseError::Invalid(s) => write!(f, "invalid reference: {s}"),
        }
    }
}
impl std::error::Error for AddressParseError {}

/// Parse a bare A1 cell reference (`A1`, `$A$1`, `A$1`, `$A1`) into
/// `(ARef, Anchor)`.
pub fn parse_a1_cell(text: &str) -> Result<(ARef, Anchor), AddressParseError> {
    let bytes = text.as_bytes();
    let mut i = 0;
    let col_abs = bytes.get(i) == Some(&b'$');
    if col_abs {
        i += 1;
    }
    let col_start = i;
    while i < bytes.len() && bytes[i].is_ascii_alphabetic() {
        i += 1;
    }
    if i == col_start {
        return Err(AddressParseError::Invalid(text.to_string()));
    }
    let col_letters = text[col_start..i].to_ascii_uppercase();
    let row_abs = bytes.get(i) == Some(&b'$');
    if row_abs {
        i += 1;
    }
    let row_start = i;
    while i < bytes.len() && bytes[i].is_ascii_digit() {
        i += 1;
    }
    if i == row_start || i != bytes.len() {
        return Err(AddressParseError::Invalid(text.to_string()));
    }
    let row1: u32 = text[row_start..i]
        .parse()
        .map_err(|_| AddressParseError::Invalid(text.to_string()))?;
    if row1 == 0 {
        return Err(AddressParseError::Invalid(text.to_string()));
    }
    let col0 = letters_to_column(&col_letters).ok_or_else(|| AddressParseError::Invalid(text.to_string()))?;
    Ok((
        ARef::from_excel(col0 + 1, row1),
        Anchor::new(col_abs, row_abs),
    ))
}

/// Render an R1C1-style reference. `row_offset`/`col_offset` are relative to
/// `origin` when the corresponding anchor bit is unset.
pub fn to_r1c1(cell: ARef, anchor: Anchor, origin: ARef) -> String {
    let row_part = if anchor.row_abs {
        format!("R{}", cell.row1())
    } else {
        let delta = cell.row as i64 - origin.row as i64;
        if delta == 0 {
            "R".to_string()
        } else {
            format!("R[{delta}]")
        }
    };
    let col_part = if anchor.col_abs {
        format!("C{}", cell.col1())
    } else {
        let delta = cell.col as i64 - origin.col as i64;
        if delta == 0 {
            "C".to_string()
        } else {
            format!("C[{delta}]")
        }
    };
    format!("{row_part}{col_part}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_a1_variants() {
        let (cell, anchor) = parse_a1_cell("B7").unwrap();
        assert_eq!(cell, ARef::from_excel(2, 7));
        assert_eq!(anchor, Anchor::RELATIVE);

        let (_, anchor) = parse_a1_cell("$B$7").unwrap();
        assert_eq!(anchor, Anchor::ABSOLUTE);

        let (_, anchor) = parse_a1_cell("$B7").unwrap();
        assert_eq!(anchor, Anchor::new(true, false));

        let (_, anchor) = parse_a1_cell("B$7").unwrap();
        assert_eq!(anchor, Anchor::new(false, true));
    }

    #[test]
    fn range_normalises_start_end() {
        let r = CellRange::new(ARef::from_excel(5, 5), ARef::from_excel(1, 1));
        assert_eq!(r.start, ARef::from_excel(1, 1));
        assert_eq!(r.end, ARef::from_excel(5, 5));
    }

    #[test]
    fn range_iter_is_row_major() {
        let r = CellRange::new(ARef::from_excel(1, 1), ARef::from_excel(2, 2));
        let cells: Vec<_> = r.iter().collect();
        assert_eq!(
            cells,
            vec![
                ARef::from_excel(1, 1),
                ARef::from_excel(2, 1),
                ARef::from_excel(1, 2),
                ARef::from_excel(2, 2),
            ]
        );
    }

    #[test]
    fn sheet_quoting_rule() {
        assert!(!sheet_name_needs_quoting("Sheet1"));
        assert!(sheet_name_needs_quoting("Q1 Report"));
        assert!(sheet_name_needs_quoting("1stQuarter"));
        assert_eq!(format_sheet_name("O'Brien"), "'O''Brien'");
    }
}
