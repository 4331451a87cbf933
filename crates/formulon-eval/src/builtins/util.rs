//! Shared helpers for builtin implementations: argument evaluation, numeric
//! range flattening, and the SUMIF-family criteria matcher (§4.5).

use rust_decimal::Decimal;

use formulon_common::CellValue;
use formulon_parse::Expr;

use crate::environment::Environment;
use crate::error::EvalError;
use crate::interpreter::{coerce_bool, coerce_number, coerce_text, compare_values, eval_range, evaluate};

pub fn scalar(args: &[Expr], i: usize, env: &Environment) -> Result<CellValue, EvalError> {
    evaluate(&args[i], env)
}

pub fn num_arg(args: &[Expr], i: usize, env: &Environment) -> Result<Decimal, EvalError> {
    coerce_number(&scalar(args, i, env)?)
}

pub fn opt_num_arg(args: &[Expr], i: usize, env: &Environment, default: Decimal) -> Result<Decimal, EvalError> {
    if i < args.len() {
        num_arg(args, i, env)
    } else {
        Ok(default)
    }
}

pub fn text_arg(args: &[Expr], i: usize, env: &Environment) -> Result<String, EvalError> {
    coerce_text(&scalar(args, i, env)?)
}

pub fn range_arg(args: &[Expr], i: usize, env: &Environment) -> Result<Vec<Vec<CellValue>>, EvalError> {
    eval_range(&args[i], env)
}

pub fn flatten(grid: &[Vec<CellValue>]) -> impl Iterator<Item = &CellValue> {
    grid.iter().flat_map(|row| row.iter())
}

/// Flatten every variadic range argument from `start` onward into one
/// row-major sequence (used by SUM/AVERAGE/COUNT/MIN/MAX/... which take
/// `var(range())`).
pub fn flatten_ranges(args: &[Expr], start: usize, env: &Environment) -> Result<Vec<CellValue>, EvalError> {
    let mut out = Vec::new();
    for i in start..args.len() {
        let grid = range_arg(args, i, env)?;
        out.extend(grid.into_iter().flatten());
    }
    Ok(out)
}

/// Numeric cells only, per the "SUM ignores text" rule (§4.5): skip text,
/// bool, and empty cells; propagate any error cell encountered.
pub fn numeric_only(cells: &[CellValue]) -> Result<Vec<Decimal>, EvalError> {
    let mut out = Vec::with_capacity(cells.len());
    for cell in cells {
        match cell {
            CellValue::Number(n) => out.push(*n),
            CellValue::DateTime(_) => out.push(coerce_number(cell)?),
            CellValue::Error(k) => return Err(EvalError::CellError(*k)),
            CellValue::Text(_) | CellValue::RichText(_) | CellValue::Bool(_) | CellValue::Empty => {}
            CellValue::Formula(..) | CellValue::Array(_) => return Err(EvalError::value("unexpected nested value")),
        }
    }
    Ok(out)
}

/// A parsed SUMIF/COUNTIF-style criterion (§4.5).
pub enum Criterion {
    Exact(CellValue),
    Compare(CompareOp, Decimal),
    Wildcard(String),
}

#[derive(Clone, Copy)]
pub enum CompareOp {
    Gt,
    Gte,
    Lt,
    Lte,
    Neq,
}

impl Criterion {
    pub fn parse(raw: &CellValue) -> Criterion {
        let text = match raw {
            CellValue::Text(s) => s.clone(),
            CellValue::Number(_) | CellValue::Bool(_) | CellValue::DateTime(_) => return Criterion::Exact(raw.clone()),
            _ => return Criterion::Exact(raw.clone()),
        };
        let trimmed = text.trim();
        for (prefix, op) in [
            (">=", CompareOp::Gte),
            ("<=", CompareOp::Lte),
            ("<>", CompareOp::Neq),
            (">", CompareOp::Gt),
            ("<", CompareOp::Lt),
        ] {
            if let Some(rest) = trimmed.strip_prefix(prefix) {
                if let Ok(n) = rest.trim().parse::<Decimal>() {
                    return Criterion::Compare(op, n);
                }
            }
        }
        if trimmed.contains(['*', '?', '~']) {
            return Criterion::Wildcard(trimmed.to_string());
        }
        Criterion::Exact(CellValue::Text(text))
    }

    pub fn matches(&self, cell: &CellValue) -> bool {
        match self {
            Criterion::Exact(target) => exact_match(target, cell),
            Criterion::Compare(op, n) => match coerce_number(cell) {
                Ok(v) => match op {
                    CompareOp::Gt => v > *n,
                    CompareOp::Gte => v >= *n,
                    CompareOp::Lt => v < *n,
                    CompareOp::Lte => v <= *n,
                    CompareOp::Neq => v != *n,
                },
                Err(_) => false,
            },
            Criterion::Wildcard(pattern) => match coerce_text(cell) {
                Ok(text) => wildcard_match(pattern, &text),
                Err(_) => false,
            },
        }
    }
}

/// Exact match, case-insensitive text, cross-coercing number/text per §4.5.
fn exact_match(target: &CellValue, cell: &CellValue) -> bool {
    match (target, cell) {
        (CellValue::Text(t), CellValue::Text(c)) => t.eq_ignore_ascii_case(c),
        (CellValue::Number(_), CellValue::Text(c)) => coerce_number(cell).map(|n| Some(n) == coerce_number(target).ok()).unwrap_or(false)
            || coerce_text(target).map(|t| t.eq_ignore_ascii_case(c)).unwrap_or(false),
        (CellValue::Text(t), CellValue::Number(_)) => coerce_number(cell).ok() == coerce_number(target).ok()
            || coerce_text(cell).map(|c| c.eq_ignore_ascii_case(t)).unwrap_or(false),
        _ => compare_values(target, cell).map(|o| o == std::cmp::Ordering::Equal).unwrap_or(false),
    }
}

/// `*` = any run, `?` = any single char, `~` escapes a literal `* ? ~`.
fn wildcard_match(pattern: &str, text: &str) -> bool {
    let pat: Vec<char> = unescape_wildcard(pattern);
    let hay: Vec<char> = text.to_ascii_uppercase().chars().collect();
    wildcard_match_chars(&pat, &hay)
}

fn unescape_wildcard(pattern: &str) -> Vec<char> {
    let mut out = Vec::new();
    let mut chars = pattern.to_ascii_uppercase().chars().peekable();
    while let Some(c) = chars.next() {
        if c == '~' {
            if let Some(&next) = chars.peek() {
                if next == '*' || next == '?' || next == '~' {
                    out.push(next);
                    chars.next();
                    continue;
                }
            }
        }
        out.push(c);
    }
    out
}

fn wildcard_match_chars(pat: &[char], hay: &[char]) -> bool {
    match pat.first() {
        None => hay.is_empty(),
        Some('*') => {
            wildcard_match_chars(&pat[1..], hay) || (!hay.is_empty() && wildcard_match_chars(pat, &hay[1..]))
        }
        Some('?') => !hay.is_empty() && wildcard_match_chars(&pat[1..], &hay[1..]),
        Some(c) => !hay.is_empty() && hay[0] == *c && wildcard_match_chars(&pat[1..], &hay[1..]),
    }
}

pub fn bool_arg(args: &[Expr], i: usize, env: &Environment) -> Result<bool, EvalError> {
    coerce_bool(&scalar(args, i, env)?)
}
