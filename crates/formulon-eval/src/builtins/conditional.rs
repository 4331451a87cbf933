//! Conditional aggregates and `SUMPRODUCT` (§4.5): criteria-filtered SUM/
//! AVERAGE/COUNT plus array broadcasting's reduction cousin.

use rust_decimal::Decimal;

use formulon_common::CellValue;
use formulon_parse::Expr;

use crate::environment::Environment;
use crate::error::EvalError;
use crate::function::FunctionSpec;

use super::util::{range_arg, scalar, Criterion};

pub fn specs() -> Vec<FunctionSpec> {
    vec![
        FunctionSpec::new("SUMIF", sumif),
        FunctionSpec::new("SUMIFS", sumifs),
        FunctionSpec::new("AVERAGEIF", averageif),
        FunctionSpec::new("AVERAGEIFS", averageifs),
        FunctionSpec::new("COUNTIF", countif),
        FunctionSpec::new("COUNTIFS", countifs),
        FunctionSpec::new("SUMPRODUCT", sumproduct),
    ]
}

fn matching_values<'a>(
    criteria_range: &'a [Vec<CellValue>],
    criterion: &Criterion,
    sum_range: &'a [Vec<CellValue>],
) -> Result<Vec<Decimal>, EvalError> {
    let crit_flat: Vec<&CellValue> = criteria_range.iter().flatten().collect();
    let sum_flat: Vec<&CellValue> = sum_range.iter().flatten().collect();
    let mut out = Vec::new();
    for (i, c) in crit_flat.iter().enumerate() {
        if criterion.matches(c) {
            let v = sum_flat.get(i).copied().unwrap_or(&CellValue::Empty);
            match v {
                CellValue::Number(n) => out.push(*n),
                CellValue::DateTime(_) => out.push(v.coerce_to_number().map_err(EvalError::from)?),
                CellValue::Error(k) => return Err(EvalError::CellError(*k)),
                _ => {}
            }
        }
    }
    Ok(out)
}

fn matching_mask(criteria_range: &[Vec<CellValue>], criterion: &Criterion) -> Vec<bool> {
    criteria_range.iter().flatten().map(|c| criterion.matches(c)).collect()
}

fn intersect_masks(masks: &[Vec<bool>]) -> Vec<bool> {
    let len = masks.first().map(|m| m.len()).unwrap_or(0);
    (0..len).map(|i| masks.iter().all(|m| m.get(i).copied().unwrap_or(false))).collect()
}

fn sumif(args: &[Expr], env: &Environment) -> Result<CellValue, EvalError> {
    let criteria_range = range_arg(args, 0, env)?;
    let criterion = Criterion::parse(&scalar(args, 1, env)?);
    let sum_range = if args.len() > 2 { range_arg(args, 2, env)? } else { criteria_range.clone() };
    let values = matching_values(&criteria_range, &criterion, &sum_range)?;
    Ok(CellValue::Number(values.into_iter().sum()))
}

fn averageif(args: &[Expr], env: &Environment) -> Result<CellValue, EvalError> {
    let criteria_range = range_arg(args, 0, env)?;
    let criterion = Criterion::parse(&scalar(args, 1, env)?);
    let avg_range = if args.len() > 2 { range_arg(args, 2, env)? } else { criteria_range.clone() };
    let values = matching_values(&criteria_range, &criterion, &avg_range)?;
    if values.is_empty() {
        return Err(EvalError::DivByZero);
    }
    let n = Decimal::from(values.len() as u64);
    Ok(CellValue::Number(values.into_iter().sum::<Decimal>() / n))
}

fn countif(args: &[Expr], env: &Environment) -> Result<CellValue, EvalError> {
    let criteria_range = range_arg(args, 0, env)?;
    let criterion = Criterion::parse(&scalar(args, 1, env)?);
    let count = matching_mask(&criteria_range, &criterion).into_iter().filter(|m| *m).count();
    Ok(CellValue::Number(Decimal::from(count as u64)))
}

/// SUMIFS(sum_range, crit_range1, crit1, [crit_range2, crit2, ...]).
fn sumifs(args: &[Expr], env: &Environment) -> Result<CellValue, EvalError> {
    let sum_range = range_arg(args, 0, env)?;
    let mask = combined_mask(args, 1, env)?;
    let sum_flat: Vec<&CellValue> = sum_range.iter().flatten().collect();
    let mut total = Decimal::ZERO;
    for (i, keep) in mask.into_iter().enumerate() {
        if !keep {
            continue;
        }
        match sum_flat.get(i) {
            Some(CellValue::Number(n)) => total += *n,
            Some(v @ CellValue::DateTime(_)) => total += v.coerce_to_number().map_err(EvalError::from)?,
            Some(CellValue::Error(k)) => return Err(EvalError::CellError(*k)),
            _ => {}
        }
    }
    Ok(CellValue::Number(total))
}

fn averageifs(args: &[Expr], env: &Environment) -> Result<CellValue, EvalError> {
    let avg_range = range_arg(args, 0, env)?;
    let mask = combined_mask(args, 1, env)?;
    let flat: Vec<&CellValue> = avg_range.iter().flatten().collect();
    let mut total = Decimal::ZERO;
    let mut count = 0u64;
    for (i, keep) in mask.into_iter().enumerate() {
        if !keep {
            continue;
        }
        match flat.get(i) {
            Some(CellValue::Number(n)) => {
                total += *n;
                count += 1;
            }
            Some(v @ CellValue::DateTime(_)) => {
                total += v.coerce_to_number().map_err(EvalError::from)?;
                count += 1;
            }
            Some(CellValue::Error(k)) => return Err(EvalError::CellError(*k)),
            _ => {}
        }
    }
    if count == 0 {
        return Err(EvalError::DivByZero);
    }
    Ok(CellValue::Number(total / Decimal::from(count)))
}

/// COUNTIFS(crit_range1, crit1, [crit_range2, crit2, ...]).
fn countifs(args: &[Expr], env: &Environment) -> Result<CellValue, EvalError> {
    let mask = combined_mask(args, 0, env)?;
    Ok(CellValue::Number(Decimal::from(mask.into_iter().filter(|m| *m).count() as u64)))
}

fn combined_mask(args: &[Expr], start: usize, env: &Environment) -> Result<Vec<bool>, EvalError> {
    let mut masks = Vec::new();
    let mut i = start;
    while i + 1 < args.len() {
        let range = range_arg(args, i, env)?;
        let criterion = Criterion::parse(&scalar(args, i + 1, env)?);
        masks.push(matching_mask(&range, &criterion));
        i += 2;
    }
    Ok(intersect_masks(&masks))
}

/// Array broadcasting's reduction cousin: elementwise product across operands
/// of compatible shape, then summed (§4.5). Booleans coerce 0/1, text to 0,
/// empties to 0 — none of these raise.
fn sumproduct(args: &[Expr], env: &Environment) -> Result<CellValue, EvalError> {
    let grids: Vec<Vec<Vec<CellValue>>> = (0..args.len()).map(|i| range_arg(args, i, env)).collect::<Result<_, _>>()?;
    if grids.is_empty() {
        return Ok(CellValue::Number(Decimal::ZERO));
    }
    let (rows, cols) = (grids[0].len(), grids[0].first().map(|r| r.len()).unwrap_or(0));
    for g in &grids {
        let gr = g.len();
        let gc = g.first().map(|r| r.len()).unwrap_or(0);
        if gr != rows || gc != cols {
            return Err(EvalError::value("SUMPRODUCT operands must share dimensions"));
        }
    }
    let mut total = Decimal::ZERO;
    for r in 0..rows {
        for c in 0..cols {
            let mut product = Decimal::ONE;
            for g in &grids {
                product *= coerce_for_sumproduct(&g[r][c])?;
            }
            total += product;
        }
    }
    Ok(CellValue::Number(total))
}

fn coerce_for_sumproduct(v: &CellValue) -> Result<Decimal, EvalError> {
    match v {
        CellValue::Number(n) => Ok(*n),
        CellValue::Bool(b) => Ok(if *b { Decimal::ONE } else { Decimal::ZERO }),
        CellValue::Text(_) | CellValue::RichText(_) | CellValue::Empty => Ok(Decimal::ZERO),
        CellValue::Error(k) => Err(EvalError::CellError(*k)),
        CellValue::DateTime(_) => v.coerce_to_number().map_err(EvalError::from),
        CellValue::Formula(..) | CellValue::Array(_) => Err(EvalError::value("unexpected nested value")),
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

    #[test]
    fn sumif_matches_exact_text_criterion() {
        let sheet = TestSheet::new("Sheet1")
            .with_a1("A1", CellValue::Text("Apple".into()))
            .with_a1("B1", CellValue::Number(Decimal::from(10)))
            .with_a1("A2", CellValue::Text("Apple".into()))
            .with_a1("B2", CellValue::Number(Decimal::from(20)))
            .with_a1("A3", CellValue::Text("Banana".into()))
            .with_a1("B3", CellValue::Number(Decimal::from(30)));
        let clock = FixedClock::from_date(chrono::NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());
        let e = env(&sheet, &clock);
        let args = vec![
            Expr::RangeRef(CellRange::new(ARef::from_excel(1, 1), ARef::from_excel(1, 3))),
            Expr::Text("Apple".into()),
            Expr::RangeRef(CellRange::new(ARef::from_excel(2, 1), ARef::from_excel(2, 3))),
        ];
        assert_eq!(sumif(&args, &e).unwrap(), CellValue::Number(Decimal::from(30)));
    }
}
