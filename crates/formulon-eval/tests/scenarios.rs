//! End-to-end scenarios over the whole `formulon-eval` surface: parse real
//! formula text, evaluate it against an in-memory workbook, and check the
//! documented behaviour in spec.md §4.5-§4.8 rather than a single function's
//! internals. Each scenario is grounded in a specific clause quoted in its
//! doc comment.

use chrono::NaiveDate;
use rust_decimal::Decimal;

use formulon_common::{ARef, CellRange, CellValue, ErrorKind};
use formulon_eval::facade::{evaluate_cell, evaluate_formula, evaluate_with_dependency_check};
use formulon_eval::test_workbook::{TestSheet, TestWorkbook};
use formulon_eval::{Environment, EvalError, FixedClock};

fn clock() -> FixedClock {
    FixedClock::from_date(NaiveDate::from_ymd_opt(2024, 3, 15).unwrap())
}

fn n(v: i64) -> CellValue {
    CellValue::Number(Decimal::from(v))
}

fn eval(sheet: &TestSheet, src: &str) -> Result<CellValue, EvalError> {
    evaluate_formula(sheet, src, &clock(), None, None)
}

/// §4.5 "Result type: Ok(value) or Err(EvalError)" plus standard arithmetic
/// precedence from §4.3 — a formula mixing `+`, `*`, and `^` parses and
/// evaluates left-to-right respecting precedence.
#[test]
fn arithmetic_precedence_and_exponentiation() {
    let sheet = TestSheet::new("Sheet1");
    assert_eq!(eval(&sheet, "=2+3*4").unwrap(), n(14));
    assert_eq!(eval(&sheet, "=(2+3)*4").unwrap(), n(20));
    assert_eq!(eval(&sheet, "=2^3^2").unwrap(), CellValue::Number(Decimal::from(64)));
}

/// §4.5 "Exponentiation `^`: `0^0 = 1` by convention; negative base and
/// fractional exponent ⇒ `Num`".
#[test]
fn exponentiation_edge_cases() {
    let sheet = TestSheet::new("Sheet1");
    assert_eq!(eval(&sheet, "=0^0").unwrap(), CellValue::Number(Decimal::ONE));
    let err = eval(&sheet, "=(-2)^0.5").unwrap_err();
    assert_eq!(err.to_error_kind(), ErrorKind::Num);
}

/// §4.5 Reference resolution: a formula cell with no cached value is parsed
/// and evaluated on demand, recursively, through a plain cell reference.
#[test]
fn formula_cell_resolves_through_an_uncached_reference() {
    let sheet = TestSheet::new("Sheet1")
        .with_a1("A1", n(10))
        .with_a1("B1", CellValue::Formula("=A1*2".into(), None));
    let result = eval(&sheet, "=B1+1").unwrap();
    assert_eq!(result, n(21));
}

/// §4.5 Error propagation: `IFERROR` catches any `EvalError` and substitutes
/// its fallback; a bare error cell otherwise propagates upward unchanged.
#[test]
fn iferror_catches_propagated_division_by_zero() {
    let sheet = TestSheet::new("Sheet1").with_a1("A1", n(0));
    assert_eq!(eval(&sheet, "=IFERROR(1/A1, -1)").unwrap(), n(-1));
    let bare = eval(&sheet, "=1/A1").unwrap_err();
    assert_eq!(bare.to_error_kind(), ErrorKind::Div0);
}

/// §4.5 Array broadcasting: `(1, c) × (r, c)` row broadcast, with a
/// division-by-zero in one cell poisoning the whole array result.
#[test]
fn array_broadcast_poisons_on_a_single_cell_error() {
    let sheet = TestSheet::new("Sheet1")
        .with_range(ARef::from_excel(1, 1), 2, &[n(10), n(0)])
        .with_range(ARef::from_excel(1, 2), 2, &[n(1), n(2)]);
    let result = eval(&sheet, "=SUMPRODUCT(A2:B2/A1:B1, A2:B2)");
    assert!(result.is_err());
}

/// §4.5 conditional-aggregate full-column optimisation: SUMIF over a full
/// column still terminates and only sums within the sheet's used range.
#[test]
fn sumif_over_a_full_column_stays_bounded_by_used_range() {
    let sheet = TestSheet::new("Sheet1")
        .with_range(ARef::from_excel(1, 1), 1, &[n(5), n(10), n(5)])
        .with_range(ARef::from_excel(2, 1), 1, &[n(1), n(2), n(3)]);
    let result = eval(&sheet, "=SUMIF(A:A, 5, B:B)").unwrap();
    assert_eq!(result, n(4));
}

/// §4.5 VLOOKUP approximate-mode semantics over an ascending-sorted column.
#[test]
fn vlookup_approximate_mode_finds_the_largest_entry_not_exceeding_the_key() {
    let sheet = TestSheet::new("Sheet1")
        .with_range(ARef::from_excel(1, 1), 2, &[n(1), n(100), n(5), n(500), n(10), n(1000)]);
    let result = eval(&sheet, "=VLOOKUP(7, A1:B3, 2, TRUE)").unwrap();
    assert_eq!(result, n(500));
}

/// §4.5 IRR: Newton's method converges for a simple two-flow project to the
/// textbook 10% root.
#[test]
fn irr_converges_for_a_simple_project() {
    let sheet = TestSheet::new("Sheet1").with_range(ARef::from_excel(1, 1), 1, &[n(-100), n(110)]);
    let result = eval(&sheet, "=IRR(A1:A2)").unwrap();
    let got = match result {
        CellValue::Number(d) => d,
        other => panic!("expected a number, got {other:?}"),
    };
    assert!((got - Decimal::new(10, 2)).abs() < Decimal::new(1, 4));
}

/// §4.7/§4.8 whole-workbook evaluation: cells evaluate in dependency order
/// and a cross-sheet reference resolves through the workbook.
#[test]
fn whole_workbook_evaluation_respects_cross_sheet_dependencies() {
    let sheet1 = TestSheet::new("Sheet1")
        .with_a1("A1", n(5))
        .with_a1("A2", CellValue::Formula("=A1+1".into(), None));
    let sheet2 = TestSheet::new("Sheet2").with_a1("A1", CellValue::Formula("=Sheet1!A2*10".into(), None));
    let workbook = TestWorkbook::new().with_sheet(sheet1).with_sheet(sheet2);

    let results = evaluate_with_dependency_check(workbook.sheet("Sheet2").unwrap(), &clock(), &workbook).unwrap();
    assert_eq!(results.get(&ARef::from_excel(1, 1)), Some(&n(60)));
}

/// §4.7 `detect_cycles`: a self-referencing two-cell loop across sheets must
/// be rejected before any evaluation is attempted.
#[test]
fn dependency_check_rejects_a_cross_sheet_cycle() {
    let sheet1 = TestSheet::new("Sheet1").with_a1("A1", CellValue::Formula("=Sheet2!A1+1".into(), None));
    let sheet2 = TestSheet::new("Sheet2").with_a1("A1", CellValue::Formula("=Sheet1!A1+1".into(), None));
    let workbook = TestWorkbook::new().with_sheet(sheet1).with_sheet(sheet2);

    let err = evaluate_with_dependency_check(workbook.sheet("Sheet1").unwrap(), &clock(), &workbook).unwrap_err();
    assert!(matches!(err, EvalError::CycleDetected(_)));
}

/// §4.8 `evaluate_cell`: a non-formula cell passes through unchanged; a
/// formula cell's cache (when present) is decoded rather than recomputed.
#[test]
fn evaluate_cell_prefers_a_cached_value_over_recomputation() {
    let sheet = TestSheet::new("Sheet1")
        .with_a1("A1", n(999))
        .with_a1("B1", CellValue::Formula("=A1+1".into(), Some(Box::new(n(7)))));
    assert_eq!(evaluate_cell(&sheet, ARef::from_excel(1, 1), &clock(), None).unwrap(), n(999));
    assert_eq!(evaluate_cell(&sheet, ARef::from_excel(2, 1), &clock(), None).unwrap(), n(7));
}

/// §4.5 recursion guard: a formula that (indirectly) references itself hits
/// the recursion cap rather than looping forever.
#[test]
fn self_referencing_formula_hits_the_recursion_limit() {
    let sheet = TestSheet::new("Sheet1").with_a1("A1", CellValue::Formula("=A1+1".into(), None));
    let env = Environment::new(&sheet, &clock());
    let expr = formulon_parse::parse("=A1").unwrap();
    let err = formulon_eval::evaluate(&expr, &env).unwrap_err();
    assert_eq!(err.to_error_kind(), ErrorKind::Num);
}

/// §4.8 `evaluate_array_formula`: an array-producing formula reports its
/// spill extent and values rather than writing through the read-only trait.
#[test]
fn array_formula_reports_its_spill_extent() {
    use formulon_eval::facade::evaluate_array_formula;

    let sheet = TestSheet::new("Sheet1").with_range(ARef::from_excel(1, 1), 2, &[n(1), n(2), n(3), n(4)]);
    let (range, rows) = evaluate_array_formula(&sheet, "=A1:B2", ARef::from_excel(4, 1), &clock(), None).unwrap();
    assert_eq!(range, CellRange::new(ARef::from_excel(4, 1), ARef::from_excel(5, 2)));
    assert_eq!(rows, vec![vec![n(1), n(2)], vec![n(3), n(4)]]);
}
