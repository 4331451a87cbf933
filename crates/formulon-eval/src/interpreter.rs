//! The tree-walking evaluator (§4.5): short-circuit boolean/conditional
//! nodes, reference resolution through the formula cache, arithmetic with
//! runtime array broadcasting, and the glue that hands `Call` nodes off to
//! the function registry.

use rust_decimal::Decimal;

use formulon_common::{CellValue, ErrorKind, ScalarKind};
use formulon_parse::Expr;

use crate::environment::Environment;
use crate::error::EvalError;
use crate::function_registry::REGISTRY;
use crate::traits::Sheet;

/// Evaluate a fully type-resolved expression against `env`.
pub fn evaluate(expr: &Expr, env: &Environment) -> Result<CellValue, EvalError> {
    match expr {
        Expr::Number(n) => Ok(CellValue::Number(*n)),
        Expr::Bool(b) => Ok(CellValue::Bool(*b)),
        Expr::Text(s) => Ok(CellValue::Text(s.clone())),
        Expr::Date(d) => Ok(CellValue::DateTime(d.and_hms_opt(0, 0, 0).unwrap())),
        Expr::DateTime(dt) => Ok(CellValue::DateTime(*dt)),
        Expr::Error(e) => Err(EvalError::CellError(*e)),

        Expr::PolyRef(..) | Expr::PolySheetRef(..) => {
            unreachable!("PolyRef must be resolved by formulon_parse::resolve_types before evaluation")
        }

        Expr::Ref(at, _anchor, kind) => {
            let raw = read_cell(env.sheet, *at, env)?;
            decode_scalar(raw, *kind)
        }
        Expr::SheetRef(sheet_name, at, _anchor, kind) => {
            let sheet = env.resolve_sheet(sheet_name)?;
            let inner = env.enter_cell(sheet, *at)?;
            let raw = read_cell(sheet, *at, &inner)?;
            decode_scalar(raw, *kind)
        }

        Expr::RangeRef(range) => {
            let rows = materialize_raw(env.sheet, *range, env)?;
            Ok(CellValue::Array(rows))
        }
        Expr::SheetRangeRef(sheet_name, range) => {
            let sheet = env.resolve_sheet(sheet_name)?;
            let rows = materialize_raw(sheet, *range, env)?;
            Ok(CellValue::Array(rows))
        }

        Expr::Add(l, r) => arith(ArithOp::Add, evaluate(l, env)?, evaluate(r, env)?),
        Expr::Sub(l, r) => arith(ArithOp::Sub, evaluate(l, env)?, evaluate(r, env)?),
        Expr::Mul(l, r) => arith(ArithOp::Mul, evaluate(l, env)?, evaluate(r, env)?),
        Expr::Div(l, r) => arith(ArithOp::Div, evaluate(l, env)?, evaluate(r, env)?),
        Expr::Pow(l, r) => arith(ArithOp::Pow, evaluate(l, env)?, evaluate(r, env)?),
        Expr::Neg(e) => {
            let v = evaluate(e, env)?;
            arith(ArithOp::Sub, CellValue::Number(Decimal::ZERO), v)
        }
        Expr::Percent(e) => {
            let v = evaluate(e, env)?;
            let n = coerce_number(&v)?;
            Ok(CellValue::Number(n / Decimal::ONE_HUNDRED))
        }

        Expr::Lt(l, r) => compare(env, l, r).map(|o| CellValue::Bool(o == std::cmp::Ordering::Less)),
        Expr::Lte(l, r) => compare(env, l, r).map(|o| CellValue::Bool(o != std::cmp::Ordering::Greater)),
        Expr::Gt(l, r) => compare(env, l, r).map(|o| CellValue::Bool(o == std::cmp::Ordering::Greater)),
        Expr::Gte(l, r) => compare(env, l, r).map(|o| CellValue::Bool(o != std::cmp::Ordering::Less)),
        Expr::Eq(l, r) => compare(env, l, r).map(|o| CellValue::Bool(o == std::cmp::Ordering::Equal)),
        Expr::Neq(l, r) => compare(env, l, r).map(|o| CellValue::Bool(o != std::cmp::Ordering::Equal)),

        Expr::And(l, r) => {
            if !coerce_bool(&evaluate(l, env)?)? {
                return Ok(CellValue::Bool(false));
            }
            Ok(CellValue::Bool(coerce_bool(&evaluate(r, env)?)?))
        }
        Expr::Or(l, r) => {
            if coerce_bool(&evaluate(l, env)?)? {
                return Ok(CellValue::Bool(true));
            }
            Ok(CellValue::Bool(coerce_bool(&evaluate(r, env)?)?))
        }
        Expr::Not(e) => Ok(CellValue::Bool(!coerce_bool(&evaluate(e, env)?)?)),

        Expr::If(cond, then, els) => {
            if coerce_bool(&evaluate(cond, env)?)? {
                evaluate(then, env)
            } else if let Some(e) = els {
                evaluate(e, env)
            } else {
                Ok(CellValue::Bool(false))
            }
        }

        Expr::Concat(l, r) => {
            let lt = coerce_text(&evaluate(l, env)?)?;
            let rt = coerce_text(&evaluate(r, env)?)?;
            Ok(CellValue::Text(lt + &rt))
        }

        Expr::Array(rows) => {
            let mut out = Vec::with_capacity(rows.len());
            for row in rows {
                let mut out_row = Vec::with_capacity(row.len());
                for cell in row {
                    out_row.push(evaluate(cell, env)?);
                }
                out.push(out_row);
            }
            Ok(CellValue::Array(out))
        }

        Expr::Call(name, args) => {
            let spec = REGISTRY
                .get(name.to_ascii_uppercase().as_str())
                .ok_or_else(|| EvalError::name(format!("unknown function {name}")))?;
            (spec.eval)(args, env)
        }
    }
}

/// Read a cell's stored value, descending through an uncached formula. Never
/// mutates the sheet; an uncached formula's parse result is never written back.
pub fn read_cell(sheet: &dyn Sheet, at: formulon_common::ARef, env: &Environment) -> Result<CellValue, EvalError> {
    match sheet.get(at) {
        CellValue::Formula(_, Some(cache)) => Ok(*cache),
        CellValue::Formula(src, None) => {
            let text = src.strip_prefix('=').unwrap_or(&src);
            let expr = formulon_parse::parse(&format!("={text}"))
                .map_err(|e| EvalError::failed(ErrorKind::Name, e.to_string()))?;
            let inner = env.enter_cell(sheet, at)?;
            evaluate(&expr, &inner)
        }
        other => Ok(other),
    }
}

/// Decode a raw cell value through the decoder a reference's context demands.
pub fn decode_scalar(value: CellValue, kind: ScalarKind) -> Result<CellValue, EvalError> {
    if let CellValue::Error(k) = value {
        return Err(EvalError::CellError(k));
    }
    match kind {
        ScalarKind::Number => Ok(CellValue::Number(coerce_number(&value)?)),
        ScalarKind::Text => Ok(CellValue::Text(coerce_text(&value)?)),
        ScalarKind::Logical => Ok(CellValue::Bool(coerce_bool(&value)?)),
        ScalarKind::Date => match value {
            CellValue::DateTime(_) => Ok(value),
            other => {
                let n = coerce_number(&other)?;
                let serial = rust_decimal::prelude::ToPrimitive::to_f64(&n).unwrap_or(0.0);
                Ok(CellValue::from_serial(serial))
            }
        },
        ScalarKind::Any => Ok(value),
    }
}

pub fn coerce_number(v: &CellValue) -> Result<Decimal, EvalError> {
    Ok(v.coerce_to_number()?)
}

pub fn coerce_text(v: &CellValue) -> Result<String, EvalError> {
    Ok(v.coerce_to_text()?)
}

pub fn coerce_bool(v: &CellValue) -> Result<bool, EvalError> {
    Ok(v.coerce_to_bool()?)
}

/// Materialize a local or cross-sheet range into a raw (un-decoded) 2-D grid,
/// bounding full-column/row spans against the target sheet's used range
/// first (required both for termination and for the dimension-alignment
/// rule conditional aggregates need across multiple criteria ranges, §4.5).
pub fn materialize_raw(
    sheet: &dyn Sheet,
    range: formulon_common::CellRange,
    env: &Environment,
) -> Result<Vec<Vec<CellValue>>, EvalError> {
    let used = sheet.used_range().unwrap_or(formulon_common::CellRange::single(formulon_common::ARef::new(0, 0)));
    let bounded = range.bounded(used);
    let mut rows = Vec::with_capacity(bounded.height() as usize);
    for row in bounded.start.row..=bounded.end.row {
        let mut out_row = Vec::with_capacity(bounded.width() as usize);
        for col in bounded.start.col..=bounded.end.col {
            let at = formulon_common::ARef::new(col, row);
            out_row.push(read_cell(sheet, at, env)?);
        }
        rows.push(out_row);
    }
    Ok(rows)
}

/// Resolve a `RangeRef`/`SheetRangeRef` expression into its raw grid, for use
/// by builtins that take a `Range`-kind argument.
pub fn eval_range(expr: &Expr, env: &Environment) -> Result<Vec<Vec<CellValue>>, EvalError> {
    match expr {
        Expr::RangeRef(range) => materialize_raw(env.sheet, *range, env),
        Expr::SheetRangeRef(sheet_name, range) => {
            let sheet = env.resolve_sheet(sheet_name)?;
            materialize_raw(sheet, *range, env)
        }
        other => {
            // A scalar or array literal in a range-shaped slot: evaluate and
            // wrap/flatten it to the same 2-D shape a range would produce.
            match evaluate(other, env)? {
                CellValue::Array(rows) => Ok(rows),
                scalar => Ok(vec![vec![scalar]]),
            }
        }
    }
}

/// Comparison semantics (§4.1, §4.5): numeric when both sides coerce to a
/// number, else case-insensitive text comparison; errors propagate from
/// either side before any comparison is attempted.
fn compare(env: &Environment, l: &Expr, r: &Expr) -> Result<std::cmp::Ordering, EvalError> {
    let lv = evaluate(l, env)?;
    let rv = evaluate(r, env)?;
    compare_values(&lv, &rv)
}

pub fn compare_values(lv: &CellValue, rv: &CellValue) -> Result<std::cmp::Ordering, EvalError> {
    use CellValue::*;
    match (lv, rv) {
        (Error(k), _) | (_, Error(k)) => Err(EvalError::CellError(*k)),
        (Bool(a), Bool(b)) => Ok(a.cmp(b)),
        (Empty, Empty) => Ok(std::cmp::Ordering::Equal),
        (Number(_) | Bool(_) | Empty, Number(_) | Bool(_) | Empty) => {
            let a = coerce_number(lv)?;
            let b = coerce_number(rv)?;
            Ok(a.cmp(&b))
        }
        (DateTime(a), DateTime(b)) => Ok(a.cmp(b)),
        (Number(_), DateTime(_)) | (DateTime(_), Number(_)) => {
            let a = coerce_number(lv)?;
            let b = coerce_number(rv)?;
            Ok(a.cmp(&b))
        }
        _ => {
            let a = coerce_text(lv)?.to_ascii_uppercase();
            let b = coerce_text(rv)?.to_ascii_uppercase();
            Ok(a.cmp(&b))
        }
    }
}

#[derive(Clone, Copy)]
enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
    Pow,
}

fn apply_scalar(op: ArithOp, a: Decimal, b: Decimal) -> Result<Decimal, EvalError> {
    match op {
        ArithOp::Add => Ok(a + b),
        ArithOp::Sub => Ok(a - b),
        ArithOp::Mul => Ok(a * b),
        ArithOp::Div => {
            if b.is_zero() {
                Err(EvalError::DivByZero)
            } else {
                Ok(a / b)
            }
        }
        ArithOp::Pow => power(a, b),
    }
}

/// `0^0 = 1` by convention; a negative base with a fractional exponent has no
/// real result (`Num`).
fn power(base: Decimal, exp: Decimal) -> Result<Decimal, EvalError> {
    if base.is_zero() && exp.is_zero() {
        return Ok(Decimal::ONE);
    }
    if base.is_sign_negative() && !exp.fract().is_zero() {
        return Err(EvalError::num("negative base with fractional exponent"));
    }
    if exp.fract().is_zero() && exp.abs() < Decimal::from(1_000) {
        // exact integer powers via repeated multiplication keep full decimal precision
        let n: i64 = rust_decimal::prelude::ToPrimitive::to_i64(&exp).unwrap_or(0);
        let mut result = Decimal::ONE;
        let mut b = base;
        let mut k = n.unsigned_abs();
        while k > 0 {
            if k & 1 == 1 {
                result *= b;
            }
            b *= b;
            k >>= 1;
        }
        return if n < 0 {
            if result.is_zero() {
                Err(EvalError::DivByZero)
            } else {
                Ok(Decimal::ONE / result)
            }
        } else {
            Ok(result)
        };
    }
    let bf = rust_decimal::prelude::ToPrimitive::to_f64(&base).unwrap_or(0.0);
    let ef = rust_decimal::prelude::ToPrimitive::to_f64(&exp).unwrap_or(0.0);
    Decimal::from_f64_retain(bf.powf(ef)).ok_or_else(|| EvalError::num("power overflow"))
}

fn shape(v: &CellValue) -> (usize, usize) {
    match v {
        CellValue::Array(rows) => {
            let r = rows.len();
            let c = rows.first().map(|row| row.len()).unwrap_or(0);
            (r.max(1), c.max(1))
        }
        _ => (1, 1),
    }
}

fn cell_at<'a>(v: &'a CellValue, rows: usize, cols: usize, row: usize, col: usize) -> &'a CellValue {
    match v {
        CellValue::Array(grid) => {
            let r = if rows == 1 { 0 } else { row };
            let c = if cols == 1 { 0 } else { col };
            &grid[r][c]
        }
        scalar => scalar,
    }
}

/// Arithmetic with runtime broadcasting (§4.5): plain scalar math when
/// neither side is an array; elementwise with shape broadcasting otherwise.
/// Compatible shapes: equal dims, or either dim equal to 1 on either side.
fn arith(op: ArithOp, l: CellValue, r: CellValue) -> Result<CellValue, EvalError> {
    let (lr, lc) = shape(&l);
    let (rr, rc) = shape(&r);
    if lr == 1 && lc == 1 && rr == 1 && rc == 1 {
        let a = coerce_number(&l)?;
        let b = coerce_number(&r)?;
        return Ok(CellValue::Number(apply_scalar(op, a, b)?));
    }
    let rows_compat = lr == rr || lr == 1 || rr == 1;
    let cols_compat = lc == rc || lc == 1 || rc == 1;
    if !rows_compat || !cols_compat {
        return Err(EvalError::value("incompatible dimensions"));
    }
    let out_rows = lr.max(rr);
    let out_cols = lc.max(rc);
    let mut out = Vec::with_capacity(out_rows);
    for row in 0..out_rows {
        let mut out_row = Vec::with_capacity(out_cols);
        for col in 0..out_cols {
            let a = coerce_number(cell_at(&l, lr, lc, row, col))?;
            let b = coerce_number(cell_at(&r, rr, rc, row, col))?;
            out_row.push(CellValue::Number(apply_scalar(op, a, b)?));
        }
        out.push(out_row);
    }
    Ok(CellValue::Array(out))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::test_workbook::TestSheet;
    use formulon_common::ARef;

    fn env<'a>(sheet: &'a TestSheet, clock: &'a FixedClock) -> Environment<'a> {
        Environment::new(sheet, clock)
    }

    #[test]
    fn literal_identity() {
        let sheet = TestSheet::new("Sheet1");
        let clock = FixedClock::from_date(chrono::NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());
        let e = env(&sheet, &clock);
        assert_eq!(evaluate(&Expr::Number(Decimal::from(42)), &e).unwrap(), CellValue::Number(Decimal::from(42)));
        assert_eq!(evaluate(&Expr::Bool(true), &e).unwrap(), CellValue::Bool(true));
    }

    #[test]
    fn division_by_zero() {
        let sheet = TestSheet::new("Sheet1");
        let clock = FixedClock::from_date(chrono::NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());
        let e = env(&sheet, &clock);
        let expr = Expr::Div(Box::new(Expr::Number(Decimal::ONE)), Box::new(Expr::Number(Decimal::ZERO)));
        assert_eq!(evaluate(&expr, &e).unwrap_err(), EvalError::DivByZero);
    }

    #[test]
    fn and_short_circuits_on_false() {
        let sheet = TestSheet::new("Sheet1");
        let clock = FixedClock::from_date(chrono::NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());
        let e = env(&sheet, &clock);
        // Right side would divide by zero if evaluated.
        let poison = Expr::Div(Box::new(Expr::Number(Decimal::ONE)), Box::new(Expr::Number(Decimal::ZERO)));
        let expr = Expr::And(Box::new(Expr::Bool(false)), Box::new(poison));
        assert_eq!(evaluate(&expr, &e).unwrap(), CellValue::Bool(false));
    }

    #[test]
    fn negative_base_fractional_exponent_is_num_error() {
        let sheet = TestSheet::new("Sheet1");
        let clock = FixedClock::from_date(chrono::NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());
        let e = env(&sheet, &clock);
        let expr = Expr::Pow(
            Box::new(Expr::Number(Decimal::from(-4))),
            Box::new(Expr::Number(Decimal::new(5, 1))),
        );
        assert_eq!(evaluate(&expr, &e).unwrap_err().to_error_kind(), ErrorKind::Num);
    }

    #[test]
    fn sheet_ref_requires_workbook() {
        let sheet = TestSheet::new("Sheet1");
        let clock = FixedClock::from_date(chrono::NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());
        let e = env(&sheet, &clock);
        let expr = Expr::SheetRef(
            "Other".into(),
            ARef::from_excel(1, 1),
            formulon_common::Anchor::RELATIVE,
            ScalarKind::Number,
        );
        assert_eq!(evaluate(&expr, &e).unwrap_err(), EvalError::MissingWorkbook);
    }
}
