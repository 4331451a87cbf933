//! Sheet-evaluator façade (§4.8): the small set of entry points a host
//! actually calls — evaluate one formula, one cell, a whole sheet, or a
//! dependency-checked whole workbook.

use std::collections::HashMap;

use formulon_common::{ARef, CellRange, CellValue};

use crate::clock::Clock;
use crate::dependency::{build_workbook_graph, detect_cycles, topo_order};
use crate::environment::Environment;
use crate::error::EvalError;
use crate::interpreter::evaluate;
use crate::traits::{Sheet, Workbook};

/// Parse and evaluate `source` directly, without reading it from a cell.
pub fn evaluate_formula(
    sheet: &dyn Sheet,
    source: &str,
    clock: &dyn Clock,
    workbook: Option<&dyn Workbook>,
    current_cell: Option<ARef>,
) -> Result<CellValue, EvalError> {
    let text = source.strip_prefix('=').unwrap_or(source);
    let expr = formulon_parse::parse(&format!("={text}")).map_err(|e| EvalError::name(e.to_string()))?;
    let mut env = Environment::new(sheet, clock);
    if let Some(wb) = workbook {
        env = env.with_workbook(wb);
    }
    if let Some(at) = current_cell {
        env = env.with_current_cell(at);
    }
    normalize(evaluate(&expr, &env)?)
}

/// A non-formula cell's value passes through unchanged; a formula cell is
/// parsed (or its cache is used) and evaluated with `current_cell` set.
pub fn evaluate_cell(
    sheet: &dyn Sheet,
    at: ARef,
    clock: &dyn Clock,
    workbook: Option<&dyn Workbook>,
) -> Result<CellValue, EvalError> {
    match sheet.get(at) {
        CellValue::Formula(src, Some(cache)) => {
            let _ = src;
            normalize(*cache)
        }
        CellValue::Formula(src, None) => {
            let mut env = Environment::new(sheet, clock).with_current_cell(at);
            if let Some(wb) = workbook {
                env = env.with_workbook(wb);
            }
            let text = src.strip_prefix('=').unwrap_or(&src);
            let expr = formulon_parse::parse(&format!("={text}")).map_err(|e| EvalError::name(e.to_string()))?;
            normalize(evaluate(&expr, &env)?)
        }
        other => normalize(other),
    }
}

/// Evaluate every formula cell on `sheet`, failing fast on the first error.
pub fn evaluate_all_formulas(
    sheet: &dyn Sheet,
    clock: &dyn Clock,
    workbook: Option<&dyn Workbook>,
) -> Result<HashMap<ARef, CellValue>, EvalError> {
    let mut out = HashMap::new();
    for (at, value) in sheet.iter_non_empty() {
        if matches!(value, CellValue::Formula(..)) {
            out.insert(at, evaluate_cell(sheet, at, clock, workbook)?);
        }
    }
    Ok(out)
}

/// Build the dependency graph across `workbook`, reject cycles, then
/// evaluate `sheet`'s formulas in topological order.
pub fn evaluate_with_dependency_check(
    sheet: &dyn Sheet,
    clock: &dyn Clock,
    workbook: &dyn Workbook,
) -> Result<HashMap<ARef, CellValue>, EvalError> {
    let graph = build_workbook_graph(workbook);
    detect_cycles(&graph).map_err(|e| EvalError::CycleDetected(e.trace))?;

    let order = topo_order(&graph);
    let mut out = HashMap::new();
    for node in order {
        if node.sheet != sheet.name() {
            continue;
        }
        if matches!(sheet.get(node.cell), CellValue::Formula(..)) {
            out.insert(node.cell, evaluate_cell(sheet, node.cell, clock, Some(workbook))?);
        }
    }
    Ok(out)
}

/// Evaluate only the formulas overlapping `range`; transitive dependencies
/// outside the range are still followed (through `read_cell`'s own
/// recursion) but never appear in the returned map.
pub fn evaluate_for_range(
    sheet: &dyn Sheet,
    range: CellRange,
    clock: &dyn Clock,
    workbook: Option<&dyn Workbook>,
) -> Result<HashMap<ARef, CellValue>, EvalError> {
    let mut out = HashMap::new();
    for at in range.iter() {
        if matches!(sheet.get(at), CellValue::Formula(..)) {
            out.insert(at, evaluate_cell(sheet, at, clock, workbook)?);
        }
    }
    Ok(out)
}

/// Evaluate `source` (expected to produce an array) and report the cells it
/// would spill into starting at `anchor`. The core holds no mutable sheet
/// storage of its own (§1 Non-goals), so this returns the spill values and
/// extent for the host to write rather than writing through `&dyn Sheet`.
pub fn evaluate_array_formula(
    sheet: &dyn Sheet,
    source: &str,
    anchor: ARef,
    clock: &dyn Clock,
    workbook: Option<&dyn Workbook>,
) -> Result<(CellRange, Vec<Vec<CellValue>>), EvalError> {
    let text = source.strip_prefix('=').unwrap_or(source);
    let expr = formulon_parse::parse(&format!("={text}")).map_err(|e| EvalError::name(e.to_string()))?;
    let mut env = Environment::new(sheet, clock).with_current_cell(anchor);
    if let Some(wb) = workbook {
        env = env.with_workbook(wb);
    }
    match evaluate(&expr, &env)? {
        CellValue::Array(rows) => {
            let height = rows.len() as u32;
            let width = rows.first().map(|r| r.len()).unwrap_or(0) as u32;
            if height == 0 || width == 0 {
                return Err(EvalError::value("array formula produced an empty result"));
            }
            let end = ARef::new(anchor.col + width - 1, anchor.row + height - 1);
            Ok((CellRange::new(anchor, end), rows))
        }
        other => Ok((CellRange::single(anchor), vec![vec![other]])),
    }
}

/// Internal typed results already arrive as the right `CellValue` variant;
/// the one thing this façade enforces is that a bare array never escapes a
/// non-array-formula entry point (§4.8).
fn normalize(value: CellValue) -> Result<CellValue, EvalError> {
    match value {
        CellValue::Array(_) => Err(EvalError::value("array result at a scalar evaluation entry point")),
        other => Ok(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::test_workbook::TestSheet;
    use rust_decimal::Decimal;

    #[test]
    fn evaluate_formula_computes_a_literal_expression() {
        let sheet = TestSheet::new("Sheet1");
        let clock = FixedClock::from_date(chrono::NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());
        let result = evaluate_formula(&sheet, "=1+2", &clock, None, None).unwrap();
        assert_eq!(result, CellValue::Number(Decimal::from(3)));
    }

    #[test]
    fn evaluate_cell_passes_through_non_formula_values() {
        let sheet = TestSheet::new("Sheet1").with_a1("A1", CellValue::Number(Decimal::from(42)));
        let clock = FixedClock::from_date(chrono::NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());
        let result = evaluate_cell(&sheet, ARef::from_excel(1, 1), &clock, None).unwrap();
        assert_eq!(result, CellValue::Number(Decimal::from(42)));
    }

    #[test]
    fn array_result_is_rejected_at_a_scalar_entry_point() {
        let sheet = TestSheet::new("Sheet1")
            .with_a1("A1", CellValue::Number(Decimal::from(1)))
            .with_a1("B1", CellValue::Number(Decimal::from(2)));
        let clock = FixedClock::from_date(chrono::NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());
        let result = evaluate_formula(&sheet, "=A1:B1", &clock, None, None);
        assert!(result.is_err());
    }
}
