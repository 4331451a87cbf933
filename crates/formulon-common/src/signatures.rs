//! The canonical argument-shape table for every built-in function name.
//!
//! This is the single source of truth shared by the parser (arity/shape
//! validation, `PolyRef` decoder resolution, unknown-function suggestions)
//! and the evaluator (binding an evaluator closure to each declared shape).
//! Splitting it out here, rather than duplicating it in both crates, avoids
//! `formulon-parse` depending on `formulon-eval` (or vice versa) just to
//! agree on what `VLOOKUP`'s third argument is.

use std::collections::HashMap;

use once_cell::sync::Lazy;

use crate::function::{ArgKind, ScalarKind};

/// The declared shape of one built-in function: its argument list and
/// whether it is one of the three short-circuit forms (`IF`, `AND`, `OR`).
#[derive(Clone, Debug, PartialEq)]
pub struct FunctionSignature {
    pub name: &'static str,
    pub args: Vec<ArgKind>,
    pub short_circuit: bool,
}

impl FunctionSignature {
    fn new(name: &'static str, args: Vec<ArgKind>) -> Self {
        Self {
            name,
            args,
            short_circuit: false,
        }
    }

    fn short_circuit(name: &'static str, args: Vec<ArgKind>) -> Self {
        Self {
            name,
            args,
            short_circuit: true,
        }
    }

    /// Minimum number of required (non-`Optional`, non-`Variadic`) arguments.
    pub fn min_arity(&self) -> usize {
        self.args
            .iter()
            .filter(|k| !k.is_optional() && !k.is_variadic())
            .count()
    }

    /// `None` if the signature ends in a `Variadic` slot (unbounded).
    pub fn max_arity(&self) -> Option<usize> {
        if self.args.iter().any(|k| k.is_variadic()) {
            None
        } else {
            Some(self.args.len())
        }
    }

    /// The declared kind for argument slot `i` (the `Variadic`/last-`Optional`
    /// slot repeats for any `i` past the end of `args`).
    pub fn arg_kind(&self, i: usize) -> Option<&ArgKind> {
        self.args.get(i).or_else(|| self.args.last())
    }
}

fn s(k: ScalarKind) -> ArgKind {
    ArgKind::Scalar(k)
}
fn opt(k: ArgKind) -> ArgKind {
    ArgKind::Optional(Box::new(k))
}
fn var(k: ArgKind) -> ArgKind {
    ArgKind::Variadic(Box::new(k))
}
fn num() -> ArgKind {
    s(ScalarKind::Number)
}
fn text() -> ArgKind {
    s(ScalarKind::Text)
}
fn logical() -> ArgKind {
    s(ScalarKind::Logical)
}
fn any() -> ArgKind {
    s(ScalarKind::Any)
}
fn date() -> ArgKind {
    s(ScalarKind::Date)
}
fn range() -> ArgKind {
    ArgKind::Range
}

pub static SIGNATURES: Lazy<HashMap<&'static str, FunctionSignature>> = Lazy::new(|| {
    use FunctionSignature as F;
    let list = vec![
        // --- logical / error-handling ---
        F::short_circuit("IF", vec![logical(), any(), opt(any())]),
        F::short_circuit("AND", vec![var(logical())]),
        F::short_circuit("OR", vec![var(logical())]),
        F::new("NOT", vec![logical()]),
        F::new("TRUE", vec![]),
        F::new("FALSE", vec![]),
        F::new("IFERROR", vec![any(), any()]),
        F::new("ISERROR", vec![any()]),
        F::new("ISERR", vec![any()]),
        F::new("ISNA", vec![any()]),
        F::new("ISBLANK", vec![any()]),
        F::new("ISNUMBER", vec![any()]),
        F::new("ISTEXT", vec![any()]),
        F::new("ISLOGICAL", vec![any()]),
        // --- math ---
        F::new("SUM", vec![var(range())]),
        F::new("SUMIF", vec![range(), any(), opt(range())]),
        F::new("SUMIFS", vec![range(), var(range())]),
        F::new("SUMPRODUCT", vec![var(range())]),
        F::new("ABS", vec![num()]),
        F::new("SQRT", vec![num()]),
        F::new("POWER", vec![num(), num()]),
        F::new("MOD", vec![num(), num()]),
        F::new("INT", vec![num()]),
        F::new("ROUND", vec![num(), num()]),
        F::new("ROUNDUP", vec![num(), num()]),
        F::new("ROUNDDOWN", vec![num(), num()]),
        F::new("CEILING", vec![num(), num()]),
        F::new("FLOOR", vec![num(), num()]),
        F::new("SIGN", vec![num()]),
        F::new("EXP", vec![num()]),
        F::new("LN", vec![num()]),
        F::new("LOG", vec![num(), opt(num())]),
        F::new("LOG10", vec![num()]),
        F::new("PI", vec![]),
        F::new("TRUNC", vec![num(), opt(num())]),
        // --- statistics ---
        F::new("AVERAGE", vec![var(range())]),
        F::new("AVERAGEIF", vec![range(), any(), opt(range())]),
        F::new("AVERAGEIFS", vec![range(), var(range())]),
        F::new("COUNT", vec![var(range())]),
        F::new("COUNTA", vec![var(range())]),
        F::new("COUNTBLANK", vec![range()]),
        F::new("COUNTIF", vec![range(), any()]),
        F::new("COUNTIFS", vec![var(range())]),
        F::new("MIN", vec![var(range())]),
        F::new("MAX", vec![var(range())]),
        F::new("MEDIAN", vec![var(range())]),
        F::new("MODE", vec![var(range())]),
        F::new("STDEV", vec![var(range())]),
        F::new("VAR", vec![var(range())]),
        F::new("LARGE", vec![range(), num()]),
        F::new("SMALL", vec![range(), num()]),
        // --- text ---
        F::new("CONCATENATE", vec![var(text())]),
        F::new("LEFT", vec![text(), opt(num())]),
        F::new("RIGHT", vec![text(), opt(num())]),
        F::new("MID", vec![text(), num(), num()]),
        F::new("LEN", vec![text()]),
        F::new("UPPER", vec![text()]),
        F::new("LOWER", vec![text()]),
        F::new("TRIM", vec![text()]),
        F::new("SUBSTITUTE", vec![text(), text(), text(), opt(num())]),
        F::new("FIND", vec![text(), text(), opt(num())]),
        F::new("SEARCH", vec![text(), text(), opt(num())]),
        F::new("TEXT", vec![any(), text()]),
        F::new("VALUE", vec![text()]),
        F::new("REPT", vec![text(), num()]),
        // --- date/time ---
        F::new("TODAY", vec![]),
        F::new("NOW", vec![]),
        F::new("YEAR", vec![date()]),
        F::new("MONTH", vec![date()]),
        F::new("DAY", vec![date()]),
        F::new("DATE", vec![num(), num(), num()]),
        F::new("TIME", vec![num(), num(), num()]),
        F::new("HOUR", vec![date()]),
        F::new("MINUTE", vec![date()]),
        F::new("SECOND", vec![date()]),
        F::new("WEEKDAY", vec![date(), opt(num())]),
        F::new("EOMONTH", vec![date(), num()]),
        F::new("EDATE", vec![date(), num()]),
        F::new("NETWORKDAYS", vec![date(), date(), opt(range())]),
        F::new("WORKDAY", vec![date(), num(), opt(range())]),
        F::new("DATEDIF", vec![date(), date(), text()]),
        F::new("YEARFRAC", vec![date(), date(), opt(num())]),
        // --- lookup & reference ---
        F::new(
            "VLOOKUP",
            vec![any(), range(), num(), opt(logical())],
        ),
        F::new(
            "XLOOKUP",
            vec![
                any(),
                range(),
                range(),
                opt(any()),
                opt(num()),
                opt(num()),
            ],
        ),
        F::new("HLOOKUP", vec![any(), range(), num(), opt(logical())]),
        F::new("INDEX", vec![range(), num(), opt(num())]),
        F::new("MATCH", vec![any(), range(), opt(num())]),
        F::new("TRANSPOSE", vec![range()]),
        F::new("ROW", vec![opt(range())]),
        F::new("COLUMN", vec![opt(range())]),
        F::new("ROWS", vec![range()]),
        F::new("COLUMNS", vec![range()]),
        // --- financial ---
        F::new("NPV", vec![num(), var(range())]),
        F::new("IRR", vec![range(), opt(num())]),
        F::new("XNPV", vec![num(), range(), range()]),
        F::new("XIRR", vec![range(), range(), opt(num())]),
        F::new(
            "PMT",
            vec![num(), num(), num(), opt(num()), opt(num())],
        ),
        F::new("FV", vec![num(), num(), num(), opt(num()), opt(num())]),
        F::new("PV", vec![num(), num(), num(), opt(num()), opt(num())]),
        F::new(
            "NPER",
            vec![num(), num(), num(), opt(num()), opt(num())],
        ),
        F::new(
            "RATE",
            vec![num(), num(), num(), opt(num()), opt(num()), opt(num())],
        ),
    ];
    list.into_iter().map(|sig| (sig.name, sig)).collect()
});

/// Case-insensitive signature lookup (formula function names are
/// case-insensitive per §4.3).
pub fn lookup(name: &str) -> Option<&'static FunctionSignature> {
    let upper = name.to_ascii_uppercase();
    SIGNATURES.get(upper.as_str())
}

pub fn all_names() -> Vec<&'static str> {
    SIGNATURES.keys().copied().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_is_case_insensitive() {
        assert!(lookup("sum").is_some());
        assert!(lookup("Sum").is_some());
        assert!(lookup("SUM").is_some());
    }

    #[test]
    fn if_is_short_circuit() {
        assert!(lookup("IF").unwrap().short_circuit);
        assert!(!lookup("SUM").unwrap().short_circuit);
    }

    #[test]
    fn variadic_arity_is_unbounded() {
        assert_eq!(lookup("SUM").unwrap().max_arity(), None);
        assert_eq!(lookup("MID").unwrap().max_arity(), Some(3));
        assert_eq!(lookup("MID").unwrap().min_arity(), 3);
    }
}
