//! The read-only evaluation environment threaded through the tree walk (§4.5).

use formulon_common::ARef;

use crate::clock::Clock;
use crate::error::EvalError;
use crate::traits::{Sheet, Workbook};

/// Cycles not already caught by the static dependency-graph check (§4.7) are
/// still bounded at runtime by this cap on recursive formula-cache misses.
pub const MAX_RECURSION_DEPTH: u32 = 128;

pub struct Environment<'a> {
    pub sheet: &'a dyn Sheet,
    pub workbook: Option<&'a dyn Workbook>,
    pub clock: &'a dyn Clock,
    pub current_cell: Option<ARef>,
    pub recursion_depth: u32,
}

impl<'a> Environment<'a> {
    pub fn new(sheet: &'a dyn Sheet, clock: &'a dyn Clock) -> Self {
        Self {
            sheet,
            workbook: None,
            clock,
            current_cell: None,
            recursion_depth: 0,
        }
    }

    pub fn with_workbook(mut self, workbook: &'a dyn Workbook) -> Self {
        self.workbook = Some(workbook);
        self
    }

    pub fn with_current_cell(mut self, at: ARef) -> Self {
        self.current_cell = Some(at);
        self
    }

    /// Environment for descending into an uncached formula's own text:
    /// same sheet, `current_cell` updated, depth incremented and checked.
    pub fn enter_cell(&self, sheet: &'a dyn Sheet, at: ARef) -> Result<Environment<'a>, EvalError> {
        if self.recursion_depth + 1 > MAX_RECURSION_DEPTH {
            return Err(EvalError::RecursionLimit);
        }
        Ok(Environment {
            sheet,
            workbook: self.workbook,
            clock: self.clock,
            current_cell: Some(at),
            recursion_depth: self.recursion_depth + 1,
        })
    }

    /// Resolve a sheet by name through the workbook, for cross-sheet refs.
    pub fn resolve_sheet(&self, name: &str) -> Result<&'a dyn Sheet, EvalError> {
        let wb = self.workbook.ok_or(EvalError::MissingWorkbook)?;
        wb.sheet(name)
            .ok_or_else(|| EvalError::UnknownSheet(name.to_string()))
    }
}
