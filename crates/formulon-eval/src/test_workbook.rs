//! In-memory `Sheet`/`Workbook` test doubles, builder-style, for unit and
//! integration tests. Not part of the public evaluation API surface proper —
//! real hosts bring their own storage behind the `Sheet`/`Workbook` traits.

use std::collections::HashMap;

use formulon_common::{parse_a1_cell, ARef, CellRange, CellValue};

use crate::traits::{Sheet, Workbook};

#[derive(Default)]
pub struct TestSheet {
    name: String,
    cells: HashMap<ARef, CellValue>,
}

impl TestSheet {
    pub fn new(name: &str) -> Self {
        Self { name: name.to_string(), cells: HashMap::new() }
    }

    pub fn with_cell(mut self, at: ARef, value: CellValue) -> Self {
        self.cells.insert(at, value);
        self
    }

    /// Convenience for tests: `"B3"` style address.
    pub fn with_a1(self, a1: &str, value: CellValue) -> Self {
        let (at, _anchor) = parse_a1_cell(a1).expect("valid A1 address in test fixture");
        self.with_cell(at, value)
    }

    /// Fill a rectangular range row-major from a flat slice of values.
    pub fn with_range(mut self, start: ARef, width: u32, values: &[CellValue]) -> Self {
        for (i, v) in values.iter().enumerate() {
            let row_offset = (i as u32) / width;
            let col_offset = (i as u32) % width;
            let at = ARef::new(start.col + col_offset, start.row + row_offset);
            self.cells.insert(at, v.clone());
        }
        self
    }
}

impl Sheet for TestSheet {
    fn get(&self, at: ARef) -> CellValue {
        self.cells.get(&at).cloned().unwrap_or(CellValue::Empty)
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn used_range(&self) -> Option<CellRange> {
        let mut iter = self.cells.keys().copied();
        let first = iter.next()?;
        let (mut min_col, mut max_col) = (first.col, first.col);
        let (mut min_row, mut max_row) = (first.row, first.row);
        for at in iter {
            min_col = min_col.min(at.col);
            max_col = max_col.max(at.col);
            min_row = min_row.min(at.row);
            max_row = max_row.max(at.row);
        }
        Some(CellRange::new(ARef::new(min_col, min_row), ARef::new(max_col, max_row)))
    }

    fn iter_non_empty<'a>(&'a self) -> Box<dyn Iterator<Item = (ARef, CellValue)> + 'a> {
        Box::new(self.cells.iter().filter(|(_, v)| !matches!(v, CellValue::Empty)).map(|(k, v)| (*k, v.clone())))
    }
}

#[derive(Default)]
pub struct TestWorkbook {
    sheets: HashMap<String, TestSheet>,
    order: Vec<String>,
}

impl TestWorkbook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sheet(mut self, sheet: TestSheet) -> Self {
        let name = sheet.name.clone();
        if !self.sheets.contains_key(&name) {
            self.order.push(name.clone());
        }
        self.sheets.insert(name, sheet);
        self
    }
}

impl Workbook for TestWorkbook {
    fn sheet(&self, name: &str) -> Option<&dyn Sheet> {
        self.sheets.get(name).map(|s| s as &dyn Sheet)
    }

    fn sheet_names(&self) -> Vec<&str> {
        self.order.iter().map(|s| s.as_str()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    #[test]
    fn used_range_spans_populated_cells() {
        let sheet = TestSheet::new("Sheet1")
            .with_a1("A1", CellValue::Number(Decimal::ONE))
            .with_a1("C5", CellValue::Number(Decimal::from(2)));
        let range = sheet.used_range().unwrap();
        assert_eq!(range.start, ARef::from_excel(1, 1));
        assert_eq!(range.end, ARef::from_excel(3, 5));
    }

    #[test]
    fn workbook_looks_up_sheets_by_name() {
        let wb = TestWorkbook::new().with_sheet(TestSheet::new("Sheet1")).with_sheet(TestSheet::new("Sheet2"));
        assert!(wb.sheet("Sheet2").is_some());
        assert!(wb.sheet("Sheet3").is_none());
        assert_eq!(wb.sheet_names(), vec!["Sheet1", "Sheet2"]);
    }
}
