//! Arithmetic and rounding built-ins (§4.6). `rust_decimal`'s `maths` feature
//! supplies `sqrt`/`ln`/`exp`/`powd`; each returns `None` on a domain error,
//! which we map to the Excel `#NUM!` code.

use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;

use formulon_common::CellValue;
use formulon_parse::Expr;

use crate::environment::Environment;
use crate::error::EvalError;
use crate::function::FunctionSpec;

use super::util::{flatten_ranges, num_arg, numeric_only, opt_num_arg};

pub fn specs() -> Vec<FunctionSpec> {
    vec![
        FunctionSpec::new("SUM", sum),
        FunctionSpec::new("ABS", |a, e| Ok(CellValue::Number(num_arg(a, 0, e)?.abs()))),
        FunctionSpec::new("SQRT", sqrt),
        FunctionSpec::new("POWER", power),
        FunctionSpec::new("MOD", modulo),
        FunctionSpec::new("INT", |a, e| Ok(CellValue::Number(num_arg(a, 0, e)?.floor()))),
        FunctionSpec::new("ROUND", |a, e| round(a, e, RoundMode::Nearest)),
        FunctionSpec::new("ROUNDUP", |a, e| round(a, e, RoundMode::AwayFromZero)),
        FunctionSpec::new("ROUNDDOWN", |a, e| round(a, e, RoundMode::TowardZero)),
        FunctionSpec::new("CEILING", ceiling),
        FunctionSpec::new("FLOOR", floor),
        FunctionSpec::new("SIGN", |a, e| {
            let n = num_arg(a, 0, e)?;
            Ok(CellValue::Number(Decimal::from(if n.is_zero() { 0 } else if n.is_sign_negative() { -1 } else { 1 })))
        }),
        FunctionSpec::new("EXP", exp),
        FunctionSpec::new("LN", ln),
        FunctionSpec::new("LOG", log),
        FunctionSpec::new("LOG10", log10),
        FunctionSpec::new("PI", |_, _| Ok(CellValue::Number(Decimal::PI))),
        FunctionSpec::new("TRUNC", trunc),
    ]
}

fn sum(args: &[Expr], env: &Environment) -> Result<CellValue, EvalError> {
    let cells = flatten_ranges(args, 0, env)?;
    let nums = numeric_only(&cells)?;
    Ok(CellValue::Number(nums.into_iter().sum()))
}

fn sqrt(args: &[Expr], env: &Environment) -> Result<CellValue, EvalError> {
    let n = num_arg(args, 0, env)?;
    n.sqrt().map(CellValue::Number).ok_or_else(|| EvalError::num("sqrt of negative number"))
}

fn power(args: &[Expr], env: &Environment) -> Result<CellValue, EvalError> {
    let base = num_arg(args, 0, env)?;
    let exp = num_arg(args, 1, env)?;
    pow_decimal(base, exp)
}

pub(crate) fn pow_decimal(base: Decimal, exp: Decimal) -> Result<CellValue, EvalError> {
    if base.is_zero() && exp.is_zero() {
        return Ok(CellValue::Number(Decimal::ONE));
    }
    if base.is_sign_negative() && !exp.fract().is_zero() {
        return Err(EvalError::num("negative base with fractional exponent"));
    }
    if exp.fract().is_zero() {
        if let Some(i) = exp.to_i64() {
            return base
                .checked_powi(i)
                .map(CellValue::Number)
                .ok_or_else(|| EvalError::num("power overflow"));
        }
    }
    base.powd(exp).map(CellValue::Number).ok_or_else(|| EvalError::num("power overflow"))
}

fn modulo(args: &[Expr], env: &Environment) -> Result<CellValue, EvalError> {
    let n = num_arg(args, 0, env)?;
    let d = num_arg(args, 1, env)?;
    if d.is_zero() {
        return Err(EvalError::DivByZero);
    }
    // Excel's MOD takes the sign of the divisor.
    let r = n - d * (n / d).floor();
    Ok(CellValue::Number(r))
}

enum RoundMode {
    Nearest,
    AwayFromZero,
    TowardZero,
}

fn round(args: &[Expr], env: &Environment, mode: RoundMode) -> Result<CellValue, EvalError> {
    let n = num_arg(args, 0, env)?;
    let digits = opt_num_arg(args, 1, env, Decimal::ZERO)?.to_i32().unwrap_or(0);
    let scale = Decimal::from(10i64.pow(digits.unsigned_abs().min(18)));
    let scaled = if digits >= 0 { n * scale } else { n / scale };
    let rounded = match mode {
        RoundMode::Nearest => scaled.round(),
        RoundMode::AwayFromZero => {
            if scaled.is_sign_negative() {
                scaled.floor()
            } else {
                scaled.ceil()
            }
        }
        RoundMode::TowardZero => scaled.trunc(),
    };
    let result = if digits >= 0 { rounded / scale } else { rounded * scale };
    Ok(CellValue::Number(result))
}

fn ceiling(args: &[Expr], env: &Environment) -> Result<CellValue, EvalError> {
    let n = num_arg(args, 0, env)?;
    let sig = num_arg(args, 1, env)?;
    step_round(n, sig, true)
}

fn floor(args: &[Expr], env: &Environment) -> Result<CellValue, EvalError> {
    let n = num_arg(args, 0, env)?;
    let sig = num_arg(args, 1, env)?;
    step_round(n, sig, false)
}

fn step_round(n: Decimal, significance: Decimal, away_from_zero: bool) -> Result<CellValue, EvalError> {
    if significance.is_zero() {
        return if n.is_zero() {
            Ok(CellValue::Number(Decimal::ZERO))
        } else {
            Err(EvalError::DivByZero)
        };
    }
    let quotient = n / significance;
    let stepped = if away_from_zero {
        if quotient.is_sign_negative() {
            quotient.floor()
        } else {
            quotient.ceil()
        }
    } else if quotient.is_sign_negative() {
        quotient.ceil()
    } else {
        quotient.floor()
    };
    Ok(CellValue::Number(stepped * significance))
}

fn exp(args: &[Expr], env: &Environment) -> Result<CellValue, EvalError> {
    let n = num_arg(args, 0, env)?;
    n.exp().ok_or_else(|| EvalError::num("exp overflow")).map(CellValue::Number)
}

fn ln(args: &[Expr], env: &Environment) -> Result<CellValue, EvalError> {
    let n = num_arg(args, 0, env)?;
    if n.is_sign_negative() || n.is_zero() {
        return Err(EvalError::num("ln of non-positive number"));
    }
    n.ln().ok_or_else(|| EvalError::num("ln domain error")).map(CellValue::Number)
}

fn log(args: &[Expr], env: &Environment) -> Result<CellValue, EvalError> {
    let n = num_arg(args, 0, env)?;
    let base = opt_num_arg(args, 1, env, Decimal::TEN)?;
    if n.is_sign_negative() || n.is_zero() || base <= Decimal::ONE {
        return Err(EvalError::num("log domain error"));
    }
    let ln_n = n.ln().ok_or_else(|| EvalError::num("log domain error"))?;
    let ln_base = base.ln().ok_or_else(|| EvalError::num("log domain error"))?;
    Ok(CellValue::Number(ln_n / ln_base))
}

fn log10(args: &[Expr], env: &Environment) -> Result<CellValue, EvalError> {
    let n = num_arg(args, 0, env)?;
    if n.is_sign_negative() || n.is_zero() {
        return Err(EvalError::num("log10 of non-positive number"));
    }
    let ln_n = n.ln().ok_or_else(|| EvalError::num("log10 domain error"))?;
    let ln_10 = Decimal::TEN.ln().ok_or_else(|| EvalError::num("log10 domain error"))?;
    Ok(CellValue::Number(ln_n / ln_10))
}

fn trunc(args: &[Expr], env: &Environment) -> Result<CellValue, EvalError> {
    round(args, env, RoundMode::TowardZero)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::test_workbook::TestSheet;

    fn env<'a>(sheet: &'a TestSheet, clock: &'a FixedClock) -> Environment<'a> {
        Environment::new(sheet, clock)
    }

    #[test]
    fn mod_takes_sign_of_divisor() {
        let sheet = TestSheet::new("Sheet1");
        let clock = FixedClock::from_date(chrono::NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());
        let e = env(&sheet, &clock);
        let args = vec![Expr::Number(Decimal::from(-7)), Expr::Number(Decimal::from(3))];
        assert_eq!(modulo(&args, &e).unwrap(), CellValue::Number(Decimal::from(2)));
    }

    #[test]
    fn round_half_up() {
        let sheet = TestSheet::new("Sheet1");
        let clock = FixedClock::from_date(chrono::NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());
        let e = env(&sheet, &clock);
        let args = vec![Expr::Number(Decimal::new(2345, 3)), Expr::Number(Decimal::from(2))];
        assert_eq!(round(&args, &e, RoundMode::Nearest).unwrap(), CellValue::Number(Decimal::new(235, 2)));
    }
}
