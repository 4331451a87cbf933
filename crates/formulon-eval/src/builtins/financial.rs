//! Time-value-of-money built-ins (§4.5). Internally computed in `f64`: these
//! are iterative/closed-form algorithms (Newton's method, compounding) where
//! `Decimal`'s exactness buys nothing and `powf`/`ln` are native to `f64`;
//! results convert back to `Decimal` at the boundary.

use rust_decimal::Decimal;
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};

use formulon_common::CellValue;
use formulon_parse::Expr;

use crate::environment::Environment;
use crate::error::EvalError;
use crate::function::FunctionSpec;

use super::util::{flatten_ranges, num_arg, numeric_only, opt_num_arg, range_arg};

pub fn specs() -> Vec<FunctionSpec> {
    vec![
        FunctionSpec::new("NPV", npv),
        FunctionSpec::new("IRR", irr),
        FunctionSpec::new("XNPV", xnpv),
        FunctionSpec::new("XIRR", xirr),
        FunctionSpec::new("PMT", pmt),
        FunctionSpec::new("FV", fv),
        FunctionSpec::new("PV", pv),
        FunctionSpec::new("NPER", nper),
        FunctionSpec::new("RATE", rate),
    ]
}

fn to_f64(d: Decimal) -> Result<f64, EvalError> {
    d.to_f64().ok_or_else(|| EvalError::num("number out of f64 range"))
}

fn from_f64(f: f64) -> Result<CellValue, EvalError> {
    if !f.is_finite() {
        return Err(EvalError::num("non-finite result"));
    }
    Decimal::from_f64(f).map(CellValue::Number).ok_or_else(|| EvalError::num("result out of Decimal range"))
}

fn npv(args: &[Expr], env: &Environment) -> Result<CellValue, EvalError> {
    let rate = to_f64(num_arg(args, 0, env)?)?;
    if rate == -1.0 {
        return Err(EvalError::DivByZero);
    }
    let cells = flatten_ranges(args, 1, env)?;
    let cashflows = numeric_only(&cells)?;
    let mut total = 0.0;
    for (i, cf) in cashflows.iter().enumerate() {
        total += to_f64(*cf)? / (1.0 + rate).powi(i as i32 + 1);
    }
    from_f64(total)
}

/// Newton's method from an initial guess of 10% (the Excel default),
/// converging when `|NPV| < 1e-7` within 100 iterations (§4.5).
fn irr(args: &[Expr], env: &Environment) -> Result<CellValue, EvalError> {
    let grid = range_arg(args, 0, env)?;
    let cashflows: Vec<f64> = numeric_only(&grid.into_iter().flatten().collect::<Vec<_>>())?
        .into_iter()
        .map(to_f64)
        .collect::<Result<_, _>>()?;
    let mut guess = opt_num_arg(args, 1, env, Decimal::new(1, 1))?.to_f64().unwrap_or(0.1);

    for _ in 0..100 {
        let (npv, dnpv) = npv_and_derivative(&cashflows, guess);
        if npv.abs() < 1e-7 {
            return from_f64(guess);
        }
        if dnpv.abs() < 1e-12 {
            break;
        }
        guess -= npv / dnpv;
    }
    Err(EvalError::num("IRR did not converge"))
}

fn npv_and_derivative(cashflows: &[f64], rate: f64) -> (f64, f64) {
    let mut npv = 0.0;
    let mut dnpv = 0.0;
    for (i, cf) in cashflows.iter().enumerate() {
        let t = i as f64;
        npv += cf / (1.0 + rate).powf(t);
        dnpv += -t * cf / (1.0 + rate).powf(t + 1.0);
    }
    (npv, dnpv)
}

fn day_fraction(dates: &[chrono::NaiveDate], i: usize) -> f64 {
    (dates[i] - dates[0]).num_days() as f64 / 365.0
}

fn date_list(args: &[Expr], i: usize, env: &Environment) -> Result<Vec<chrono::NaiveDate>, EvalError> {
    let grid = range_arg(args, i, env)?;
    grid.into_iter()
        .flatten()
        .map(|cell| match cell {
            CellValue::DateTime(dt) => Ok(dt.date()),
            other => Err(EvalError::value(format!("expected a date in range, got {other}"))),
        })
        .collect()
}

fn xnpv(args: &[Expr], env: &Environment) -> Result<CellValue, EvalError> {
    let rate = to_f64(num_arg(args, 0, env)?)?;
    let cashflows: Vec<f64> = numeric_only(&range_arg(args, 1, env)?.into_iter().flatten().collect::<Vec<_>>())?
        .into_iter()
        .map(to_f64)
        .collect::<Result<_, _>>()?;
    let dates = date_list(args, 2, env)?;
    if dates.len() != cashflows.len() {
        return Err(EvalError::value("XNPV dates and values must have equal length"));
    }
    let mut total = 0.0;
    for i in 0..cashflows.len() {
        total += cashflows[i] / (1.0 + rate).powf(day_fraction(&dates, i));
    }
    from_f64(total)
}

/// Newton's method with a bisection fallback on non-convergence (§4.5).
fn xirr(args: &[Expr], env: &Environment) -> Result<CellValue, EvalError> {
    let cashflows: Vec<f64> = numeric_only(&range_arg(args, 0, env)?.into_iter().flatten().collect::<Vec<_>>())?
        .into_iter()
        .map(to_f64)
        .collect::<Result<_, _>>()?;
    let dates = date_list(args, 1, env)?;
    if dates.len() != cashflows.len() {
        return Err(EvalError::value("XIRR dates and values must have equal length"));
    }
    let mut guess = opt_num_arg(args, 2, env, Decimal::new(1, 1))?.to_f64().unwrap_or(0.1);
    let xnpv_at = |rate: f64| -> f64 {
        cashflows.iter().enumerate().map(|(i, cf)| cf / (1.0 + rate).powf(day_fraction(&dates, i))).sum()
    };

    for _ in 0..100 {
        let f = xnpv_at(guess);
        if f.abs() < 1e-7 {
            return from_f64(guess);
        }
        let h = 1e-6;
        let df = (xnpv_at(guess + h) - f) / h;
        if df.abs() < 1e-12 {
            break;
        }
        guess -= f / df;
    }

    let (mut lo, mut hi) = (-0.9999, 10.0);
    let (mut flo, fhi) = (xnpv_at(lo), xnpv_at(hi));
    if flo.signum() == fhi.signum() {
        return Err(EvalError::num("XIRR did not converge"));
    }
    for _ in 0..200 {
        let mid = (lo + hi) / 2.0;
        let fmid = xnpv_at(mid);
        if fmid.abs() < 1e-7 {
            return from_f64(mid);
        }
        if fmid.signum() == flo.signum() {
            lo = mid;
            flo = fmid;
        } else {
            hi = mid;
        }
    }
    from_f64((lo + hi) / 2.0)
}

fn annuity_args(args: &[Expr], env: &Environment) -> Result<(f64, f64, f64, f64, bool), EvalError> {
    let rate = to_f64(num_arg(args, 0, env)?)?;
    let nper = to_f64(num_arg(args, 1, env)?)?;
    let pmt_or_pv = to_f64(num_arg(args, 2, env)?)?;
    let extra = to_f64(opt_num_arg(args, 3, env, Decimal::ZERO)?)?;
    let due = opt_num_arg(args, 4, env, Decimal::ZERO)?.to_i32().unwrap_or(0) != 0;
    Ok((rate, nper, pmt_or_pv, extra, due))
}

fn pmt(args: &[Expr], env: &Environment) -> Result<CellValue, EvalError> {
    let (rate, nper, pv, fv, due) = annuity_args(args, env)?;
    if rate == 0.0 {
        return from_f64(-(pv + fv) / nper);
    }
    let factor = (1.0 + rate).powf(nper);
    let annuity_factor = if due { (1.0 + rate) * (factor - 1.0) / rate } else { (factor - 1.0) / rate };
    from_f64(-(pv * factor + fv) / annuity_factor)
}

fn fv(args: &[Expr], env: &Environment) -> Result<CellValue, EvalError> {
    let (rate, nper, pmt, pv, due) = annuity_args(args, env)?;
    if rate == 0.0 {
        return from_f64(-(pv + pmt * nper));
    }
    let factor = (1.0 + rate).powf(nper);
    let annuity_factor = if due { (1.0 + rate) * (factor - 1.0) / rate } else { (factor - 1.0) / rate };
    from_f64(-(pv * factor + pmt * annuity_factor))
}

fn pv(args: &[Expr], env: &Environment) -> Result<CellValue, EvalError> {
    let (rate, nper, pmt, fv, due) = annuity_args(args, env)?;
    if rate == 0.0 {
        return from_f64(-(fv + pmt * nper));
    }
    let factor = (1.0 + rate).powf(nper);
    let annuity_factor = if due { (1.0 + rate) * (factor - 1.0) / rate } else { (factor - 1.0) / rate };
    from_f64(-(fv + pmt * annuity_factor) / factor)
}

fn nper(args: &[Expr], env: &Environment) -> Result<CellValue, EvalError> {
    let rate = to_f64(num_arg(args, 0, env)?)?;
    let pmt = to_f64(num_arg(args, 1, env)?)?;
    let pv = to_f64(num_arg(args, 2, env)?)?;
    let fv = to_f64(opt_num_arg(args, 3, env, Decimal::ZERO)?)?;
    let due = opt_num_arg(args, 4, env, Decimal::ZERO)?.to_i32().unwrap_or(0) != 0;
    if rate == 0.0 {
        if pmt == 0.0 {
            return Err(EvalError::num("NPER: rate and payment cannot both be zero"));
        }
        return from_f64(-(pv + fv) / pmt);
    }
    let pmt_adj = if due { pmt * (1.0 + rate) } else { pmt };
    let numerator = pmt_adj - fv * rate;
    let denominator = pv * rate + pmt_adj;
    if numerator <= 0.0 || denominator <= 0.0 {
        return Err(EvalError::num("NPER arguments admit no real solution"));
    }
    from_f64((numerator / denominator).ln() / (1.0 + rate).ln())
}

/// Newton's method over the `PV` residual; Excel's documented default guess
/// is 10% (§4.5).
fn rate(args: &[Expr], env: &Environment) -> Result<CellValue, EvalError> {
    let nper = to_f64(num_arg(args, 0, env)?)?;
    let pmt = to_f64(num_arg(args, 1, env)?)?;
    let pv = to_f64(num_arg(args, 2, env)?)?;
    let fv = to_f64(opt_num_arg(args, 3, env, Decimal::ZERO)?)?;
    let due = opt_num_arg(args, 4, env, Decimal::ZERO)?.to_i32().unwrap_or(0) != 0;
    let mut guess = to_f64(opt_num_arg(args, 5, env, Decimal::new(1, 1))?)?;

    let residual = |rate: f64| -> f64 {
        if rate == 0.0 {
            return pv + pmt * nper + fv;
        }
        let factor = (1.0 + rate).powf(nper);
        let annuity_factor = if due { (1.0 + rate) * (factor - 1.0) / rate } else { (factor - 1.0) / rate };
        pv * factor + pmt * annuity_factor + fv
    };

    for _ in 0..100 {
        let f = residual(guess);
        if f.abs() < 1e-7 {
            return from_f64(guess);
        }
        let h = 1e-6;
        let df = (residual(guess + h) - f) / h;
        if df.abs() < 1e-12 {
            break;
        }
        guess -= f / df;
    }
    Err(EvalError::num("RATE did not converge"))
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
    fn irr_of_a_simple_project_matches_known_root() {
        // -100 today, 110 in one period => IRR is exactly 10%.
        let sheet = TestSheet::new("Sheet1")
            .with_a1("A1", CellValue::Number(Decimal::from(-100)))
            .with_a1("A2", CellValue::Number(Decimal::from(110)));
        let clock = FixedClock::from_date(chrono::NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());
        let e = env(&sheet, &clock);
        let args = vec![Expr::RangeRef(CellRange::new(ARef::from_excel(1, 1), ARef::from_excel(1, 2)))];
        let result = irr(&args, &e).unwrap();
        match result {
            CellValue::Number(n) => assert!((n.to_f64().unwrap() - 0.10).abs() < 1e-6),
            _ => panic!("expected a number"),
        }
    }

    #[test]
    fn pmt_of_a_zero_rate_loan_is_linear() {
        let sheet = TestSheet::new("Sheet1");
        let clock = FixedClock::from_date(chrono::NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());
        let e = env(&sheet, &clock);
        let args = vec![Expr::Number(Decimal::ZERO), Expr::Number(Decimal::from(12)), Expr::Number(Decimal::from(1200))];
        assert_eq!(pmt(&args, &e).unwrap(), CellValue::Number(Decimal::from(-100)));
    }
}
