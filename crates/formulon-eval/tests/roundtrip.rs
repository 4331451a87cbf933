//! Property-based round-trip check for the printer/parser pair (§4.3):
//! `parse(print(e)) == e` for arithmetic expressions built from literals,
//! binary operators, and unary minus — the shapes `print_expr` inserts
//! parentheses for.

use proptest::prelude::*;
use rust_decimal::Decimal;

use formulon_parse::Expr;

fn small_int() -> impl Strategy<Value = Expr> {
    (0i64..1000).prop_map(|n| Expr::Number(Decimal::from(n)))
}

fn arith_tree() -> impl Strategy<Value = Expr> {
    let leaf = small_int();
    leaf.prop_recursive(4, 64, 4, |inner| {
        prop_oneof![
            (inner.clone(), inner.clone()).prop_map(|(l, r)| Expr::Add(Box::new(l), Box::new(r))),
            (inner.clone(), inner.clone()).prop_map(|(l, r)| Expr::Sub(Box::new(l), Box::new(r))),
            (inner.clone(), inner.clone()).prop_map(|(l, r)| Expr::Mul(Box::new(l), Box::new(r))),
            inner.clone().prop_map(|e| Expr::Neg(Box::new(e))),
        ]
    })
}

proptest! {
    /// §4.3 "Round-trip law: `parse(print(e))` yields an expression
    /// semantically equivalent to `e`" — checked here as structural equality,
    /// the stronger property, for the arithmetic subset where it holds
    /// exactly (no sheet-qualified refs or function calls with variadic
    /// argument reordering involved).
    #[test]
    fn printed_expression_reparses_to_the_same_tree(expr in arith_tree()) {
        let printed = formulon_parse::print(&expr);
        let reparsed = formulon_parse::parse(&printed).expect("printer output must be parseable");
        prop_assert_eq!(reparsed, expr);
    }
}
