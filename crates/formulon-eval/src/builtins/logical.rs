//! `TRUE`/`FALSE` as zero-arg calls, error-introspection (`ISERROR` family),
//! and `IFERROR` — the one place outside `If`/`And`/`Or` where the evaluator
//! treats an error as data rather than propagating it (§4.5, §7).

use formulon_common::CellValue;
use formulon_parse::Expr;

use crate::environment::Environment;
use crate::error::EvalError;
use crate::function::FunctionSpec;
use crate::interpreter::evaluate;

use super::util::scalar;

pub fn specs() -> Vec<FunctionSpec> {
    vec![
        FunctionSpec::new("TRUE", |_, _| Ok(CellValue::Bool(true))),
        FunctionSpec::new("FALSE", |_, _| Ok(CellValue::Bool(false))),
        FunctionSpec::new("IFERROR", iferror),
        FunctionSpec::new("ISERROR", |args, env| Ok(CellValue::Bool(scalar(args, 0, env).is_err()))),
        FunctionSpec::new("ISERR", is_err),
        FunctionSpec::new("ISNA", is_na),
        FunctionSpec::new("ISBLANK", |args, env| Ok(CellValue::Bool(matches!(scalar(args, 0, env), Ok(CellValue::Empty))))),
        FunctionSpec::new("ISNUMBER", |args, env| Ok(CellValue::Bool(matches!(scalar(args, 0, env), Ok(CellValue::Number(_)))))),
        FunctionSpec::new("ISTEXT", |args, env| Ok(CellValue::Bool(matches!(scalar(args, 0, env), Ok(CellValue::Text(_)))))),
        FunctionSpec::new("ISLOGICAL", |args, env| Ok(CellValue::Bool(matches!(scalar(args, 0, env), Ok(CellValue::Bool(_)))))),
    ]
}

fn iferror(args: &[Expr], env: &Environment) -> Result<CellValue, EvalError> {
    match evaluate(&args[0], env) {
        Ok(v) => Ok(v),
        Err(_) => evaluate(&args[1], env),
    }
}

fn is_err(args: &[Expr], env: &Environment) -> Result<CellValue, EvalError> {
    match scalar(args, 0, env) {
        Ok(_) => Ok(CellValue::Bool(false)),
        Err(e) => Ok(CellValue::Bool(e.is_err_not_na())),
    }
}

fn is_na(args: &[Expr], env: &Environment) -> Result<CellValue, EvalError> {
    match scalar(args, 0, env) {
        Ok(_) => Ok(CellValue::Bool(false)),
        Err(e) => Ok(CellValue::Bool(e.to_error_kind() == formulon_common::ErrorKind::Na)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::test_workbook::TestSheet;
    use rust_decimal::Decimal;

    fn env<'a>(sheet: &'a TestSheet, clock: &'a FixedClock) -> Environment<'a> {
        Environment::new(sheet, clock)
    }

    #[test]
    fn iferror_catches_div_by_zero() {
        let sheet = TestSheet::new("Sheet1");
        let clock = FixedClock::from_date(chrono::NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());
        let e = env(&sheet, &clock);
        let poison = Expr::Div(Box::new(Expr::Number(Decimal::ONE)), Box::new(Expr::Number(Decimal::ZERO)));
        let args = vec![poison, Expr::Text("fallback".into())];
        assert_eq!(iferror(&args, &e).unwrap(), CellValue::Text("fallback".into()));
    }

    #[test]
    fn iserr_is_false_for_na_but_true_for_div0() {
        let sheet = TestSheet::new("Sheet1");
        let clock = FixedClock::from_date(chrono::NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());
        let e = env(&sheet, &clock);
        let na = vec![Expr::Error(formulon_common::ErrorKind::Na)];
        assert_eq!(is_err(&na, &e).unwrap(), CellValue::Bool(false));
        let div0 = vec![Expr::Div(Box::new(Expr::Number(Decimal::ONE)), Box::new(Expr::Number(Decimal::ZERO)))];
        assert_eq!(is_err(&div0, &e).unwrap(), CellValue::Bool(true));
    }
}
