//! String built-ins (§4.5). Indices are 1-based per Excel convention and
//! operate on Unicode scalar values, not bytes.

use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;

use formulon_common::CellValue;
use formulon_parse::Expr;

use crate::environment::Environment;
use crate::error::EvalError;
use crate::function::FunctionSpec;

use super::util::{num_arg, opt_num_arg, scalar, text_arg};

pub fn specs() -> Vec<FunctionSpec> {
    vec![
        FunctionSpec::new("CONCATENATE", concatenate),
        FunctionSpec::new("LEFT", left),
        FunctionSpec::new("RIGHT", right),
        FunctionSpec::new("MID", mid),
        FunctionSpec::new("LEN", |a, e| Ok(CellValue::Number(Decimal::from(text_arg(a, 0, e)?.chars().count() as u64)))),
        FunctionSpec::new("UPPER", |a, e| Ok(CellValue::Text(text_arg(a, 0, e)?.to_uppercase()))),
        FunctionSpec::new("LOWER", |a, e| Ok(CellValue::Text(text_arg(a, 0, e)?.to_lowercase()))),
        FunctionSpec::new("TRIM", trim),
        FunctionSpec::new("SUBSTITUTE", substitute),
        FunctionSpec::new("FIND", find),
        FunctionSpec::new("SEARCH", search),
        FunctionSpec::new("TEXT", text_fn),
        FunctionSpec::new("VALUE", value_fn),
        FunctionSpec::new("REPT", rept),
    ]
}

fn concatenate(args: &[Expr], env: &Environment) -> Result<CellValue, EvalError> {
    let mut out = String::new();
    for i in 0..args.len() {
        out.push_str(&text_arg(args, i, env)?);
    }
    Ok(CellValue::Text(out))
}

fn chars_len(args: &[Expr], i: usize, env: &Environment, default: i64) -> Result<usize, EvalError> {
    let n = opt_num_arg(args, i, env, Decimal::from(default))?;
    let n = n.to_i64().unwrap_or(default).max(0);
    Ok(n as usize)
}

fn left(args: &[Expr], env: &Environment) -> Result<CellValue, EvalError> {
    let s = text_arg(args, 0, env)?;
    let n = chars_len(args, 1, env, 1)?;
    Ok(CellValue::Text(s.chars().take(n).collect()))
}

fn right(args: &[Expr], env: &Environment) -> Result<CellValue, EvalError> {
    let s = text_arg(args, 0, env)?;
    let n = chars_len(args, 1, env, 1)?;
    let total = s.chars().count();
    let skip = total.saturating_sub(n);
    Ok(CellValue::Text(s.chars().skip(skip).collect()))
}

fn mid(args: &[Expr], env: &Environment) -> Result<CellValue, EvalError> {
    let s = text_arg(args, 0, env)?;
    let start = num_arg(args, 1, env)?.to_i64().ok_or_else(|| EvalError::value("non-integer start"))?;
    let len = num_arg(args, 2, env)?.to_i64().ok_or_else(|| EvalError::value("non-integer length"))?;
    if start < 1 || len < 0 {
        return Err(EvalError::value("MID start must be >= 1, length >= 0"));
    }
    let skip = (start - 1) as usize;
    Ok(CellValue::Text(s.chars().skip(skip).take(len as usize).collect()))
}

fn trim(args: &[Expr], env: &Environment) -> Result<CellValue, EvalError> {
    let s = text_arg(args, 0, env)?;
    let collapsed = s.split_whitespace().collect::<Vec<_>>().join(" ");
    Ok(CellValue::Text(collapsed))
}

fn substitute(args: &[Expr], env: &Environment) -> Result<CellValue, EvalError> {
    let s = text_arg(args, 0, env)?;
    let old = text_arg(args, 1, env)?;
    let new = text_arg(args, 2, env)?;
    if old.is_empty() {
        return Ok(CellValue::Text(s));
    }
    if args.len() > 3 {
        let which = num_arg(args, 3, env)?.to_i64().ok_or_else(|| EvalError::value("non-integer occurrence"))?;
        if which < 1 {
            return Err(EvalError::value("SUBSTITUTE occurrence must be >= 1"));
        }
        let mut result = String::with_capacity(s.len());
        let mut remaining = s.as_str();
        let mut seen = 0i64;
        loop {
            match remaining.find(&old) {
                Some(idx) => {
                    seen += 1;
                    let (before, after) = remaining.split_at(idx);
                    result.push_str(before);
                    if seen == which {
                        result.push_str(&new);
                    } else {
                        result.push_str(&old);
                    }
                    remaining = &after[old.len()..];
                }
                None => {
                    result.push_str(remaining);
                    break;
                }
            }
        }
        Ok(CellValue::Text(result))
    } else {
        Ok(CellValue::Text(s.replace(&old, &new)))
    }
}

fn find(args: &[Expr], env: &Environment) -> Result<CellValue, EvalError> {
    let needle = text_arg(args, 0, env)?;
    let haystack = text_arg(args, 1, env)?;
    let start = chars_len(args, 2, env, 1)?.max(1);
    search_impl(&needle, &haystack, start, false)
}

fn search(args: &[Expr], env: &Environment) -> Result<CellValue, EvalError> {
    let needle = text_arg(args, 0, env)?;
    let haystack = text_arg(args, 1, env)?;
    let start = chars_len(args, 2, env, 1)?.max(1);
    search_impl(&needle, &haystack, start, true)
}

fn search_impl(needle: &str, haystack: &str, start1: usize, case_insensitive: bool) -> Result<CellValue, EvalError> {
    let hay_chars: Vec<char> = haystack.chars().collect();
    if start1 == 0 || start1 > hay_chars.len() + 1 {
        return Err(EvalError::value("start position out of range"));
    }
    let (needle_cmp, hay_cmp): (String, Vec<char>) = if case_insensitive {
        (needle.to_uppercase(), hay_chars.iter().map(|c| c.to_ascii_uppercase()).collect())
    } else {
        (needle.to_string(), hay_chars.clone())
    };
    let needle_chars: Vec<char> = needle_cmp.chars().collect();
    if needle_chars.is_empty() {
        return Ok(CellValue::Number(Decimal::from(start1 as u64)));
    }
    for offset in (start1 - 1)..=hay_cmp.len().saturating_sub(needle_chars.len()) {
        if hay_cmp[offset..].starts_with(needle_chars.as_slice()) {
            return Ok(CellValue::Number(Decimal::from((offset + 1) as u64)));
        }
    }
    Err(EvalError::na("text not found"))
}

/// A pragmatic subset of Excel's number-format mini-language: enough of the
/// common `0`, `0.00`, `#,##0.00`, `0%` patterns to format a number without
/// pulling in a full format-code parser (not in scope, §9).
fn text_fn(args: &[Expr], env: &Environment) -> Result<CellValue, EvalError> {
    let value = scalar(args, 0, env)?;
    let format = text_arg(args, 1, env)?;
    let n = value.coerce_to_number().map_err(EvalError::from)?;
    if let Some(decimals) = format.strip_suffix('%').map(|f| f.matches('0').count().saturating_sub(1)) {
        let pct = n * Decimal::ONE_HUNDRED;
        return Ok(CellValue::Text(format!("{:.*}%", decimals, pct)));
    }
    if let Some(dot) = format.find('.') {
        let decimals = format[dot + 1..].chars().filter(|c| *c == '0' || *c == '#').count();
        return Ok(CellValue::Text(format!("{n:.decimals$}")));
    }
    Ok(CellValue::Text(n.round().to_string()))
}

fn value_fn(args: &[Expr], env: &Environment) -> Result<CellValue, EvalError> {
    let s = text_arg(args, 0, env)?;
    CellValue::Text(s).coerce_to_number().map(CellValue::Number).map_err(EvalError::from)
}

fn rept(args: &[Expr], env: &Environment) -> Result<CellValue, EvalError> {
    let s = text_arg(args, 0, env)?;
    let n = num_arg(args, 1, env)?.to_i64().ok_or_else(|| EvalError::value("non-integer repeat count"))?;
    if n < 0 {
        return Err(EvalError::value("REPT count must be >= 0"));
    }
    Ok(CellValue::Text(s.repeat(n as usize)))
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
    fn mid_extracts_substring() {
        let sheet = TestSheet::new("Sheet1");
        let clock = FixedClock::from_date(chrono::NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());
        let e = env(&sheet, &clock);
        let args = vec![Expr::Text("Spreadsheet".into()), Expr::Number(Decimal::from(7)), Expr::Number(Decimal::from(5))];
        assert_eq!(mid(&args, &e).unwrap(), CellValue::Text("sheet".into()));
    }

    #[test]
    fn substitute_replaces_nth_occurrence_only() {
        let sheet = TestSheet::new("Sheet1");
        let clock = FixedClock::from_date(chrono::NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());
        let e = env(&sheet, &clock);
        let args = vec![
            Expr::Text("a-b-a-b".into()),
            Expr::Text("b".into()),
            Expr::Text("X".into()),
            Expr::Number(Decimal::from(2)),
        ];
        assert_eq!(substitute(&args, &e).unwrap(), CellValue::Text("a-b-a-X".into()));
    }

    #[test]
    fn search_is_case_insensitive_find_is_not() {
        let sheet = TestSheet::new("Sheet1");
        let clock = FixedClock::from_date(chrono::NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());
        let e = env(&sheet, &clock);
        let args = vec![Expr::Text("B".into()), Expr::Text("abc".into())];
        assert_eq!(search(&args, &e).unwrap(), CellValue::Number(Decimal::from(2)));
        assert!(find(&args, &e).is_err());
    }
}
