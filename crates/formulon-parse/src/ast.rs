//! The typed expression AST (§3, §9).
//!
//! The source engine this was modelled on threads a runtime decoder through
//! a loosely-typed `BinaryOp { op: String, .. }`/`Function { name, args }`
//! shape. Per the redesign note in §9 ("express the AST as a tagged union
//! whose variants encode the operand types statically where they differ"),
//! every construct that has a fixed operand/result shape gets its own
//! variant instead; only `Call`'s arguments stay genuinely heterogeneous,
//! since a function's argument shapes are data (the registry), not syntax.

use chrono::{NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;

use formulon_common::{ARef, Anchor, CellRange, ErrorKind, ScalarKind, SheetName};

/// A fully parsed, not-yet-type-resolved expression. `PolyRef`/`PolySheetRef`
/// are the only non-terminal state: [`resolve_types`] walks the tree once
/// and replaces every one of them with a typed `Ref`/`SheetRef` carrying the
/// decoder its parent context demands.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    // --- literals ---
    Number(Decimal),
    Bool(bool),
    Text(String),
    Date(NaiveDate),
    DateTime(NaiveDateTime),
    Error(ErrorKind),

    // --- references: pre type-resolution ---
    /// Placeholder emitted directly by the parser; resolved away by
    /// [`resolve_types`].
    PolyRef(ARef, Anchor),
    PolySheetRef(SheetName, ARef, Anchor),

    // --- references: post type-resolution ---
    Ref(ARef, Anchor, ScalarKind),
    SheetRef(SheetName, ARef, Anchor, ScalarKind),

    // --- ranges (always decode to an Array; no decoder needed) ---
    RangeRef(CellRange),
    SheetRangeRef(SheetName, CellRange),

    // --- arithmetic ---
    Add(Box<Expr>, Box<Expr>),
    Sub(Box<Expr>, Box<Expr>),
    Mul(Box<Expr>, Box<Expr>),
    Div(Box<Expr>, Box<Expr>),
    Pow(Box<Expr>, Box<Expr>),
    Neg(Box<Expr>),
    /// Postfix `%`: divides its operand by 100.
    Percent(Box<Expr>),

    // --- comparison ---
    Lt(Box<Expr>, Box<Expr>),
    Lte(Box<Expr>, Box<Expr>),
    Gt(Box<Expr>, Box<Expr>),
    Gte(Box<Expr>, Box<Expr>),
    Eq(Box<Expr>, Box<Expr>),
    Neq(Box<Expr>, Box<Expr>),

    // --- boolean (short-circuit in the evaluator) ---
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Not(Box<Expr>),

    /// Only the chosen branch is evaluated.
    If(Box<Expr>, Box<Expr>, Option<Box<Expr>>),

    Concat(Box<Expr>, Box<Expr>),

    /// A literal array, e.g. `{1,2;3,4}`.
    Array(Vec<Vec<Expr>>),

    /// `NAME(arg1, arg2, ...)`. `name` is looked up case-insensitively in
    /// the function registry at evaluation time; the parser has already
    /// validated arity/shape against
    /// [`formulon_common::signatures::lookup`].
    Call(String, Vec<Expr>),
}

impl Expr {
    /// `RangeRef`/`SheetRangeRef` wrapped as the range location a function
    /// argument resolves to, or `None` if this expression is not a range.
    pub fn as_range_location(&self) -> Option<RangeLocation> {
        match self {
            Expr::RangeRef(r) => Some(RangeLocation::Local(*r)),
            Expr::SheetRangeRef(sheet, r) => Some(RangeLocation::CrossSheet(sheet.clone(), *r)),
            _ => None,
        }
    }

    pub fn is_range(&self) -> bool {
        matches!(self, Expr::RangeRef(_) | Expr::SheetRangeRef(..))
    }
}

/// A function argument that names a range, resolved to either a same-sheet
/// or cross-sheet location (§3, the `RangeLocation` variant).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RangeLocation {
    Local(CellRange),
    CrossSheet(SheetName, CellRange),
}

impl RangeLocation {
    pub fn range(&self) -> CellRange {
        match self {
            RangeLocation::Local(r) => *r,
            RangeLocation::CrossSheet(_, r) => *r,
        }
    }

    pub fn sheet(&self) -> Option<&str> {
        match self {
            RangeLocation::Local(_) => None,
            RangeLocation::CrossSheet(s, _) => Some(s.as_str()),
        }
    }
}

/// Resolve every `PolyRef`/`PolySheetRef` in `expr` to a typed `Ref`/`SheetRef`,
/// and promote bare single-cell refs passed where a `Range` argument is
/// declared into a 1x1 `RangeRef` (§4.3's type-resolution pass, §9's
/// `PolyRef` note).
pub fn resolve_types(expr: Expr) -> Expr {
    resolve(expr, ScalarKind::Any)
}

fn resolve(expr: Expr, expected: ScalarKind) -> Expr {
    match expr {
        Expr::PolyRef(at, anchor) => Expr::Ref(at, anchor, expected),
        Expr::PolySheetRef(sheet, at, anchor) => Expr::SheetRef(sheet, at, anchor, expected),

        Expr::Add(l, r) => bin(Expr::Add, *l, *r, ScalarKind::Number),
        Expr::Sub(l, r) => bin(Expr::Sub, *l, *r, ScalarKind::Number),
        Expr::Mul(l, r) => bin(Expr::Mul, *l, *r, ScalarKind::Number),
        Expr::Div(l, r) => bin(Expr::Div, *l, *r, ScalarKind::Number),
        Expr::Pow(l, r) => bin(Expr::Pow, *l, *r, ScalarKind::Number),
        Expr::Neg(e) => Expr::Neg(Box::new(resolve(*e, ScalarKind::Number))),
        Expr::Percent(e) => Expr::Percent(Box::new(resolve(*e, ScalarKind::Number))),

        Expr::Lt(l, r) => bin(Expr::Lt, *l, *r, ScalarKind::Any),
        Expr::Lte(l, r) => bin(Expr::Lte, *l, *r, ScalarKind::Any),
        Expr::Gt(l, r) => bin(Expr::Gt, *l, *r, ScalarKind::Any),
        Expr::Gte(l, r) => bin(Expr::Gte, *l, *r, ScalarKind::Any),
        Expr::Eq(l, r) => bin(Expr::Eq, *l, *r, ScalarKind::Any),
        Expr::Neq(l, r) => bin(Expr::Neq, *l, *r, ScalarKind::Any),

        Expr::And(l, r) => bin(Expr::And, *l, *r, ScalarKind::Logical),
        Expr::Or(l, r) => bin(Expr::Or, *l, *r, ScalarKind::Logical),
        Expr::Not(e) => Expr::Not(Box::new(resolve(*e, ScalarKind::Logical))),

        Expr::If(cond, then, els) => Expr::If(
            Box::new(resolve(*cond, ScalarKind::Logical)),
            Box::new(resolve(*then, expected)),
            els.map(|e| Box::new(resolve(*e, expected))),
        ),

        Expr::Concat(l, r) => bin(Expr::Concat, *l, *r, ScalarKind::Text),

        Expr::Array(rows) => Expr::Array(
            rows.into_iter()
                .map(|row| row.into_iter().map(|e| resolve(e, expected)).collect())
                .collect(),
        ),

        Expr::Call(name, args) => {
            let sig = formulon_common::signatures::lookup(&name);
            let resolved = args
                .into_iter()
                .enumerate()
                .map(|(i, arg)| match sig.and_then(|s| s.arg_kind(i)) {
                    Some(k) if is_range_kind(k) => promote_to_range(resolve(arg, ScalarKind::Any)),
                    Some(k) => resolve(arg, scalar_kind_of(k)),
                    None => resolve(arg, ScalarKind::Any),
                })
                .collect();
            Expr::Call(name, resolved)
        }

        // already-typed / leaf / range nodes: nothing to resolve
        other => other,
    }
}

fn bin(
    ctor: fn(Box<Expr>, Box<Expr>) -> Expr,
    l: Expr,
    r: Expr,
    expected: ScalarKind,
) -> Expr {
    ctor(Box::new(resolve(l, expected)), Box::new(resolve(r, expected)))
}

fn scalar_kind_of(kind: &formulon_common::ArgKind) -> ScalarKind {
    use formulon_common::ArgKind;
    match kind {
        ArgKind::Scalar(k) => *k,
        ArgKind::Optional(inner) | ArgKind::Variadic(inner) => scalar_kind_of(inner),
        ArgKind::Range => ScalarKind::Any,
    }
}

fn is_range_kind(kind: &formulon_common::ArgKind) -> bool {
    use formulon_common::ArgKind;
    match kind {
        ArgKind::Range => true,
        ArgKind::Optional(inner) | ArgKind::Variadic(inner) => is_range_kind(inner),
        ArgKind::Scalar(_) => false,
    }
}

/// A bare `Ref`/`SheetRef` passed where a range is expected becomes its own
/// 1x1 range (Excel allows a single cell anywhere a range argument is taken).
fn promote_to_range(expr: Expr) -> Expr {
    match expr {
        Expr::Ref(at, _, _) => Expr::RangeRef(CellRange::single(at)),
        Expr::SheetRef(sheet, at, _, _) => Expr::SheetRangeRef(sheet, CellRange::single(at)),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn poly_ref_resolves_to_arithmetic_context() {
        let expr = Expr::Add(
            Box::new(Expr::PolyRef(ARef::from_excel(1, 1), Anchor::RELATIVE)),
            Box::new(Expr::Number(Decimal::ONE)),
        );
        let resolved = resolve_types(expr);
        match resolved {
            Expr::Add(l, _) => assert_eq!(*l, Expr::Ref(ARef::from_excel(1, 1), Anchor::RELATIVE, ScalarKind::Number)),
            _ => panic!("expected Add"),
        }
    }

    #[test]
    fn poly_ref_resolves_to_logical_context_under_not() {
        let expr = Expr::Not(Box::new(Expr::PolyRef(ARef::from_excel(1, 1), Anchor::RELATIVE)));
        let resolved = resolve_types(expr);
        match resolved {
            Expr::Not(inner) => assert_eq!(
                *inner,
                Expr::Ref(ARef::from_excel(1, 1), Anchor::RELATIVE, ScalarKind::Logical)
            ),
            _ => panic!("expected Not"),
        }
    }

    #[test]
    fn single_cell_arg_promotes_to_range_for_range_slot() {
        let expr = Expr::Call(
            "SUM".to_string(),
            vec![Expr::PolyRef(ARef::from_excel(1, 1), Anchor::RELATIVE)],
        );
        let resolved = resolve_types(expr);
        match resolved {
            Expr::Call(_, args) => assert_eq!(
                args[0],
                Expr::RangeRef(CellRange::single(ARef::from_excel(1, 1)))
            ),
            _ => panic!("expected Call"),
        }
    }
}
