//! Lookup & reference built-ins (§4.5): `VLOOKUP`/`XLOOKUP`/`HLOOKUP`'s match
//! modes, 1-based `INDEX`/`MATCH`, and simple shape queries.

use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;

use formulon_common::CellValue;
use formulon_parse::Expr;

use crate::environment::Environment;
use crate::error::EvalError;
use crate::function::FunctionSpec;
use crate::interpreter::{coerce_text, compare_values};

use super::util::{bool_arg, num_arg, opt_num_arg, range_arg, scalar, Criterion};

pub fn specs() -> Vec<FunctionSpec> {
    vec![
        FunctionSpec::new("VLOOKUP", vlookup),
        FunctionSpec::new("HLOOKUP", hlookup),
        FunctionSpec::new("XLOOKUP", xlookup),
        FunctionSpec::new("INDEX", index),
        FunctionSpec::new("MATCH", match_fn),
        FunctionSpec::new("TRANSPOSE", transpose),
        FunctionSpec::new("ROW", row_fn),
        FunctionSpec::new("COLUMN", column_fn),
        FunctionSpec::new("ROWS", |a, e| Ok(CellValue::Number(Decimal::from(range_arg(a, 0, e)?.len() as u64)))),
        FunctionSpec::new("COLUMNS", |a, e| {
            let grid = range_arg(a, 0, e)?;
            Ok(CellValue::Number(Decimal::from(grid.first().map(|r| r.len()).unwrap_or(0) as u64)))
        }),
    ]
}

/// `VLOOKUP`'s approximate-match mode (`range_lookup` omitted or `TRUE`)
/// requires the lookup column sorted ascending and returns the largest entry
/// less than or equal to the key (§4.5's match-mode table, mode 1 variant).
fn approximate_match(key: &CellValue, column: &[CellValue]) -> Option<usize> {
    let mut best: Option<usize> = None;
    for (i, cand) in column.iter().enumerate() {
        match compare_values(cand, key) {
            Ok(ord) if ord != std::cmp::Ordering::Greater => best = Some(i),
            _ => {}
        }
    }
    best
}

fn exact_match(key: &CellValue, column: &[CellValue]) -> Option<usize> {
    column.iter().position(|cand| compare_values(cand, key).map(|o| o == std::cmp::Ordering::Equal).unwrap_or(false))
}

fn vlookup(args: &[Expr], env: &Environment) -> Result<CellValue, EvalError> {
    let key = scalar(args, 0, env)?;
    let table = range_arg(args, 1, env)?;
    let col_index = num_arg(args, 2, env)?.to_i64().ok_or_else(|| EvalError::value("non-integer col_index"))?;
    if col_index < 1 {
        return Err(EvalError::value("col_index_num must be >= 1"));
    }
    let approximate = if args.len() > 3 { bool_arg(args, 3, env)? } else { true };
    let first_col: Vec<CellValue> = table.iter().map(|row| row.first().cloned().unwrap_or(CellValue::Empty)).collect();
    let row_idx = if approximate { approximate_match(&key, &first_col) } else { exact_match(&key, &first_col) }
        .ok_or_else(|| EvalError::na("VLOOKUP key not found"))?;
    table
        .get(row_idx)
        .and_then(|row| row.get((col_index - 1) as usize))
        .cloned()
        .ok_or_else(|| EvalError::reference("VLOOKUP col_index_num out of range"))
}

fn hlookup(args: &[Expr], env: &Environment) -> Result<CellValue, EvalError> {
    let key = scalar(args, 0, env)?;
    let table = range_arg(args, 1, env)?;
    let row_index = num_arg(args, 2, env)?.to_i64().ok_or_else(|| EvalError::value("non-integer row_index"))?;
    if row_index < 1 {
        return Err(EvalError::value("row_index_num must be >= 1"));
    }
    let approximate = if args.len() > 3 { bool_arg(args, 3, env)? } else { true };
    let first_row = table.first().cloned().unwrap_or_default();
    let col_idx = if approximate { approximate_match(&key, &first_row) } else { exact_match(&key, &first_row) }
        .ok_or_else(|| EvalError::na("HLOOKUP key not found"))?;
    table
        .get((row_index - 1) as usize)
        .and_then(|row| row.get(col_idx))
        .cloned()
        .ok_or_else(|| EvalError::reference("HLOOKUP row_index_num out of range"))
}

/// `XLOOKUP(lookup_value, lookup_array, return_array, [if_not_found], [match_mode], [search_mode])`.
/// `match_mode`: 0 exact (default), -1 next-smaller, 1 next-larger, 2 wildcard.
/// `search_mode`: 1 first-to-last (default), -1 last-to-first.
fn xlookup(args: &[Expr], env: &Environment) -> Result<CellValue, EvalError> {
    let key = scalar(args, 0, env)?;
    let lookup = range_arg(args, 1, env)?.into_iter().flatten().collect::<Vec<_>>();
    let returns = range_arg(args, 2, env)?.into_iter().flatten().collect::<Vec<_>>();
    let match_mode = opt_num_arg(args, 4, env, Decimal::ZERO)?.to_i32().unwrap_or(0);
    let search_mode = opt_num_arg(args, 5, env, Decimal::ONE)?.to_i32().unwrap_or(1);

    let indices: Vec<usize> = if search_mode == -1 { (0..lookup.len()).rev().collect() } else { (0..lookup.len()).collect() };

    let found = match match_mode {
        0 => indices.into_iter().find(|&i| compare_values(&lookup[i], &key).map(|o| o == std::cmp::Ordering::Equal).unwrap_or(false)),
        -1 => {
            let mut best: Option<usize> = None;
            for i in indices {
                if compare_values(&lookup[i], &key).map(|o| o != std::cmp::Ordering::Greater).unwrap_or(false) {
                    best = Some(match best {
                        Some(b) if compare_values(&lookup[b], &lookup[i]).unwrap_or(std::cmp::Ordering::Equal) == std::cmp::Ordering::Greater => i,
                        Some(b) => b,
                        None => i,
                    });
                }
            }
            best
        }
        1 => {
            let mut best: Option<usize> = None;
            for i in indices {
                if compare_values(&lookup[i], &key).map(|o| o != std::cmp::Ordering::Less).unwrap_or(false) {
                    best = Some(match best {
                        Some(b) if compare_values(&lookup[b], &lookup[i]).unwrap_or(std::cmp::Ordering::Equal) == std::cmp::Ordering::Less => i,
                        Some(b) => b,
                        None => i,
                    });
                }
            }
            best
        }
        2 => {
            let pattern = coerce_text(&key)?;
            let criterion = Criterion::Wildcard(pattern);
            indices.into_iter().find(|&i| criterion.matches(&lookup[i]))
        }
        _ => return Err(EvalError::value("unsupported XLOOKUP match_mode")),
    };

    match found {
        Some(i) => returns.get(i).cloned().ok_or_else(|| EvalError::reference("XLOOKUP return_array shorter than lookup_array")),
        None if args.len() > 3 => scalar(args, 3, env),
        None => Err(EvalError::na("XLOOKUP value not found")),
    }
}

fn index(args: &[Expr], env: &Environment) -> Result<CellValue, EvalError> {
    let table = range_arg(args, 0, env)?;
    let row = num_arg(args, 1, env)?.to_i64().ok_or_else(|| EvalError::value("non-integer row_num"))?;
    let col = opt_num_arg(args, 2, env, Decimal::ZERO)?.to_i64().unwrap_or(0);
    if row < 0 || col < 0 {
        return Err(EvalError::value("INDEX arguments must be >= 0"));
    }
    let single_row = table.len() == 1;
    let single_col = table.first().map(|r| r.len() == 1).unwrap_or(false);
    let (r, c) = match (row, col) {
        (0, c) if single_row => (0, c),
        (r, 0) if single_col => (r, 0),
        (r, c) => (r, c),
    };
    if r == 0 || c == 0 {
        return Err(EvalError::reference("INDEX requires row_num/col_num when the range is not a single row or column"));
    }
    table
        .get((r - 1) as usize)
        .and_then(|row_vals| row_vals.get((c - 1) as usize))
        .cloned()
        .ok_or_else(|| EvalError::reference("INDEX reference is out of range"))
}

fn match_fn(args: &[Expr], env: &Environment) -> Result<CellValue, EvalError> {
    let key = scalar(args, 0, env)?;
    let column = range_arg(args, 1, env)?.into_iter().flatten().collect::<Vec<_>>();
    let mode = opt_num_arg(args, 2, env, Decimal::ONE)?.to_i32().unwrap_or(1);
    let found = match mode {
        0 => exact_match(&key, &column),
        1 => approximate_match(&key, &column),
        -1 => {
            let mut best: Option<usize> = None;
            for (i, cand) in column.iter().enumerate() {
                if compare_values(cand, &key).map(|o| o != std::cmp::Ordering::Less).unwrap_or(false) {
                    best = Some(match best {
                        Some(b) if compare_values(&column[b], cand).unwrap_or(std::cmp::Ordering::Equal) == std::cmp::Ordering::Less => i,
                        Some(b) => b,
                        None => i,
                    });
                }
            }
            best
        }
        _ => return Err(EvalError::value("unsupported MATCH match_type")),
    };
    found.map(|i| CellValue::Number(Decimal::from((i + 1) as u64))).ok_or_else(|| EvalError::na("MATCH value not found"))
}

fn transpose(args: &[Expr], env: &Environment) -> Result<CellValue, EvalError> {
    let table = range_arg(args, 0, env)?;
    let cols = table.first().map(|r| r.len()).unwrap_or(0);
    let mut out = vec![Vec::with_capacity(table.len()); cols];
    for row in &table {
        for (c, cell) in row.iter().enumerate() {
            out[c].push(cell.clone());
        }
    }
    Ok(CellValue::Array(out))
}

fn row_fn(args: &[Expr], env: &Environment) -> Result<CellValue, EvalError> {
    match args.first() {
        None => Ok(CellValue::Number(Decimal::from(env.current_cell.map(|c| c.row1()).unwrap_or(1)))),
        Some(Expr::RangeRef(range)) => Ok(CellValue::Number(Decimal::from(range.start.row1()))),
        Some(Expr::SheetRangeRef(_, range)) => Ok(CellValue::Number(Decimal::from(range.start.row1()))),
        Some(Expr::Ref(at, ..)) => Ok(CellValue::Number(Decimal::from(at.row1()))),
        _ => Err(EvalError::value("ROW requires a reference argument")),
    }
}

fn column_fn(args: &[Expr], env: &Environment) -> Result<CellValue, EvalError> {
    match args.first() {
        None => Ok(CellValue::Number(Decimal::from(env.current_cell.map(|c| c.col1()).unwrap_or(1)))),
        Some(Expr::RangeRef(range)) => Ok(CellValue::Number(Decimal::from(range.start.col1()))),
        Some(Expr::SheetRangeRef(_, range)) => Ok(CellValue::Number(Decimal::from(range.start.col1()))),
        Some(Expr::Ref(at, ..)) => Ok(CellValue::Number(Decimal::from(at.col1()))),
        _ => Err(EvalError::value("COLUMN requires a reference argument")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::test_workbook::TestSheet;
    use formulon_common::{ARef, CellRange};

    fn env<'a>(sheet: &'a TestSheet, clock: &'a FixedClock) -> Environment<'a> {
        Environment::new(sheet, clock)
    }

    fn table_range(start: (u32, u32), end: (u32, u32)) -> Expr {
        Expr::RangeRef(CellRange::new(ARef::from_excel(start.0, start.1), ARef::from_excel(end.0, end.1)))
    }

    #[test]
    fn vlookup_exact_match_returns_na_when_missing() {
        let sheet = TestSheet::new("Sheet1")
            .with_a1("A1", CellValue::Text("apple".into()))
            .with_a1("B1", CellValue::Number(Decimal::from(1)))
            .with_a1("A2", CellValue::Text("banana".into()))
            .with_a1("B2", CellValue::Number(Decimal::from(2)));
        let clock = FixedClock::from_date(chrono::NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());
        let e = env(&sheet, &clock);
        let args = vec![Expr::Text("cherry".into()), table_range((1, 1), (2, 2)), Expr::Number(Decimal::from(2)), Expr::Bool(false)];
        assert_eq!(vlookup(&args, &e).unwrap_err().to_error_kind(), formulon_common::ErrorKind::Na);
    }

    #[test]
    fn match_exact_mode_finds_one_based_position() {
        let sheet = TestSheet::new("Sheet1")
            .with_a1("A1", CellValue::Text("x".into()))
            .with_a1("A2", CellValue::Text("y".into()))
            .with_a1("A3", CellValue::Text("z".into()));
        let clock = FixedClock::from_date(chrono::NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());
        let e = env(&sheet, &clock);
        let args = vec![Expr::Text("y".into()), table_range((1, 1), (1, 3)), Expr::Number(Decimal::ZERO)];
        assert_eq!(match_fn(&args, &e).unwrap(), CellValue::Number(Decimal::from(2)));
    }
}
