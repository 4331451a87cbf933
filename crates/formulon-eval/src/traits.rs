//! The `Sheet`/`Workbook` storage contracts (§3). These are external
//! collaborators — the evaluator only ever reads through them, never writes.

use formulon_common::{ARef, CellRange, CellValue};

/// A single sheet's cell storage. Immutable-value semantics: mutation, if a
/// caller needs it, happens by producing a new sheet, not through this trait.
pub trait Sheet: Send + Sync {
    fn get(&self, at: ARef) -> CellValue;
    fn name(&self) -> &str;
    fn used_range(&self) -> Option<CellRange>;
    fn iter_non_empty<'a>(&'a self) -> Box<dyn Iterator<Item = (ARef, CellValue)> + 'a>;
}

/// An ordered collection of sheets, looked up by name.
pub trait Workbook: Send + Sync {
    fn sheet(&self, name: &str) -> Option<&dyn Sheet>;
    fn sheet_names(&self) -> Vec<&str>;
}
