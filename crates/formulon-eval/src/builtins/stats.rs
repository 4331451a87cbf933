//! Descriptive statistics (§4.5). `AVERAGE`/`STDEV`/`VAR` use Welford's
//! online algorithm rather than a naive sum-then-divide so they stay
//! translation-invariant: shifting every input by a constant must not move
//! the computed variance.

use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;

use formulon_common::CellValue;
use formulon_parse::Expr;

use crate::environment::Environment;
use crate::error::EvalError;
use crate::function::FunctionSpec;

use super::util::{flatten_ranges, num_arg, numeric_only, range_arg};

pub fn specs() -> Vec<FunctionSpec> {
    vec![
        FunctionSpec::new("AVERAGE", average),
        FunctionSpec::new("COUNT", count),
        FunctionSpec::new("COUNTA", counta),
        FunctionSpec::new("COUNTBLANK", countblank),
        FunctionSpec::new("MIN", min),
        FunctionSpec::new("MAX", max),
        FunctionSpec::new("MEDIAN", median),
        FunctionSpec::new("MODE", mode),
        FunctionSpec::new("STDEV", stdev),
        FunctionSpec::new("VAR", var),
        FunctionSpec::new("LARGE", large),
        FunctionSpec::new("SMALL", small),
    ]
}

/// Welford's running mean/variance (Knuth TAOCP vol. 2, §4.2.2): one pass,
/// numerically stable, and `variance` is translation-invariant by construction.
struct Welford {
    n: u64,
    mean: Decimal,
    m2: Decimal,
}

impl Welford {
    fn new() -> Self {
        Self { n: 0, mean: Decimal::ZERO, m2: Decimal::ZERO }
    }

    fn push(&mut self, x: Decimal) {
        self.n += 1;
        let delta = x - self.mean;
        self.mean += delta / Decimal::from(self.n);
        let delta2 = x - self.mean;
        self.m2 += delta * delta2;
    }

    fn sample_variance(&self) -> Option<Decimal> {
        if self.n < 2 {
            None
        } else {
            Some(self.m2 / Decimal::from(self.n - 1))
        }
    }
}

fn welford_of(cells: &[CellValue]) -> Result<Welford, EvalError> {
    let nums = numeric_only(cells)?;
    let mut w = Welford::new();
    for n in nums {
        w.push(n);
    }
    Ok(w)
}

fn average(args: &[Expr], env: &Environment) -> Result<CellValue, EvalError> {
    let cells = flatten_ranges(args, 0, env)?;
    let w = welford_of(&cells)?;
    if w.n == 0 {
        return Err(EvalError::DivByZero);
    }
    Ok(CellValue::Number(w.mean))
}

fn stdev(args: &[Expr], env: &Environment) -> Result<CellValue, EvalError> {
    let cells = flatten_ranges(args, 0, env)?;
    let w = welford_of(&cells)?;
    let variance = w.sample_variance().ok_or_else(|| EvalError::value("STDEV needs at least 2 numbers"))?;
    variance.sqrt().map(CellValue::Number).ok_or_else(|| EvalError::num("negative variance"))
}

fn var(args: &[Expr], env: &Environment) -> Result<CellValue, EvalError> {
    let cells = flatten_ranges(args, 0, env)?;
    let w = welford_of(&cells)?;
    w.sample_variance().map(CellValue::Number).ok_or_else(|| EvalError::value("VAR needs at least 2 numbers"))
}

fn count(args: &[Expr], env: &Environment) -> Result<CellValue, EvalError> {
    let cells = flatten_ranges(args, 0, env)?;
    let n = cells.iter().filter(|c| matches!(c, CellValue::Number(_) | CellValue::DateTime(_))).count();
    Ok(CellValue::Number(Decimal::from(n as u64)))
}

fn counta(args: &[Expr], env: &Environment) -> Result<CellValue, EvalError> {
    let cells = flatten_ranges(args, 0, env)?;
    let n = cells.iter().filter(|c| !matches!(c, CellValue::Empty)).count();
    Ok(CellValue::Number(Decimal::from(n as u64)))
}

fn countblank(args: &[Expr], env: &Environment) -> Result<CellValue, EvalError> {
    let grid = range_arg(args, 0, env)?;
    let n = grid.iter().flatten().filter(|c| matches!(c, CellValue::Empty)).count();
    Ok(CellValue::Number(Decimal::from(n as u64)))
}

/// MIN/MAX must never special-case "first element": folding from the
/// iterator's head (not from a sentinel) keeps a range whose extreme value
/// sits in its very first cell correct without an empty-range short-circuit
/// hiding a bug in the fold itself.
fn min(args: &[Expr], env: &Environment) -> Result<CellValue, EvalError> {
    let cells = flatten_ranges(args, 0, env)?;
    let nums = numeric_only(&cells)?;
    let mut iter = nums.into_iter();
    let first = match iter.next() {
        Some(n) => n,
        None => return Ok(CellValue::Number(Decimal::ZERO)),
    };
    Ok(CellValue::Number(iter.fold(first, |acc, n| acc.min(n))))
}

fn max(args: &[Expr], env: &Environment) -> Result<CellValue, EvalError> {
    let cells = flatten_ranges(args, 0, env)?;
    let nums = numeric_only(&cells)?;
    let mut iter = nums.into_iter();
    let first = match iter.next() {
        Some(n) => n,
        None => return Ok(CellValue::Number(Decimal::ZERO)),
    };
    Ok(CellValue::Number(iter.fold(first, |acc, n| acc.max(n))))
}

fn median(args: &[Expr], env: &Environment) -> Result<CellValue, EvalError> {
    let cells = flatten_ranges(args, 0, env)?;
    let mut nums = numeric_only(&cells)?;
    if nums.is_empty() {
        return Err(EvalError::value("MEDIAN of an empty range"));
    }
    nums.sort();
    let mid = nums.len() / 2;
    let result = if nums.len() % 2 == 0 {
        (nums[mid - 1] + nums[mid]) / Decimal::TWO
    } else {
        nums[mid]
    };
    Ok(CellValue::Number(result))
}

fn mode(args: &[Expr], env: &Environment) -> Result<CellValue, EvalError> {
    let cells = flatten_ranges(args, 0, env)?;
    let nums = numeric_only(&cells)?;
    let mut counts: Vec<(Decimal, u32)> = Vec::new();
    for n in nums {
        if let Some(entry) = counts.iter_mut().find(|(v, _)| *v == n) {
            entry.1 += 1;
        } else {
            counts.push((n, 1));
        }
    }
    counts
        .into_iter()
        .max_by_key(|(_, c)| *c)
        .filter(|(_, c)| *c > 1)
        .map(|(v, _)| CellValue::Number(v))
        .ok_or_else(|| EvalError::na("no repeated value in MODE's range"))
}

fn kth(args: &[Expr], env: &Environment, from_top: bool) -> Result<CellValue, EvalError> {
    let grid = range_arg(args, 0, env)?;
    let mut nums = numeric_only(&grid.into_iter().flatten().collect::<Vec<_>>())?;
    let k = num_arg(args, 1, env)?.to_i64().ok_or_else(|| EvalError::num("non-integer k"))?;
    if k < 1 || k as usize > nums.len() {
        return Err(EvalError::num("k out of range"));
    }
    nums.sort();
    if from_top {
        nums.reverse();
    }
    Ok(CellValue::Number(nums[(k - 1) as usize]))
}

fn large(args: &[Expr], env: &Environment) -> Result<CellValue, EvalError> {
    kth(args, env, true)
}

fn small(args: &[Expr], env: &Environment) -> Result<CellValue, EvalError> {
    kth(args, env, false)
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

    fn range_arg_expr(start: (u32, u32), end: (u32, u32)) -> Expr {
        Expr::RangeRef(CellRange::new(ARef::from_excel(start.0, start.1), ARef::from_excel(end.0, end.1)))
    }

    #[test]
    fn variance_is_translation_invariant() {
        let sheet = TestSheet::new("Sheet1")
            .with_a1("A1", CellValue::Number(Decimal::from(1)))
            .with_a1("A2", CellValue::Number(Decimal::from(2)))
            .with_a1("A3", CellValue::Number(Decimal::from(3)));
        let shifted = TestSheet::new("Sheet1")
            .with_a1("A1", CellValue::Number(Decimal::from(101)))
            .with_a1("A2", CellValue::Number(Decimal::from(102)))
            .with_a1("A3", CellValue::Number(Decimal::from(103)));
        let clock = FixedClock::from_date(chrono::NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());
        let e1 = env(&sheet, &clock);
        let e2 = env(&shifted, &clock);
        let args = vec![range_arg_expr((1, 1), (1, 3))];
        assert_eq!(var(&args, &e1).unwrap(), var(&args, &e2).unwrap());
    }

    #[test]
    fn min_of_range_whose_minimum_is_the_first_cell() {
        let sheet = TestSheet::new("Sheet1")
            .with_a1("A1", CellValue::Number(Decimal::from(1)))
            .with_a1("A2", CellValue::Number(Decimal::from(5)))
            .with_a1("A3", CellValue::Number(Decimal::from(9)));
        let clock = FixedClock::from_date(chrono::NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());
        let e = env(&sheet, &clock);
        let args = vec![range_arg_expr((1, 1), (1, 3))];
        assert_eq!(min(&args, &e).unwrap(), CellValue::Number(Decimal::from(1)));
    }
}
