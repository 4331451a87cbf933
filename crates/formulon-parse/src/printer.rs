//! Canonical printer: `Expr` -> formula text (§4.3, §6).
//!
//! Round-trip law (§8.4): `parse(print(parse(s))) == parse(s)`. Parentheses
//! are inserted only where precedence would otherwise change the parse;
//! the printer does not attempt to reproduce the original source text
//! verbatim (whitespace, exact numeric formatting of the input, etc).

use formulon_common::{format_number, format_sheet_name};

use crate::ast::Expr;

/// Print `expr` with a leading `=`.
pub fn print(expr: &Expr) -> String {
    format!("={}", print_expr(expr, 0))
}

/// Print `expr` without the leading `=`.
pub fn print_bare(expr: &Expr) -> String {
    print_expr(expr, 0)
}

/// Precedence used only to decide when to wrap a child in parentheses;
/// mirrors the levels in §4.3 (low to high).
fn precedence(expr: &Expr) -> u8 {
    match expr {
        Expr::Concat(..) => 1,
        Expr::Lt(..) | Expr::Lte(..) | Expr::Gt(..) | Expr::Gte(..) | Expr::Eq(..) | Expr::Neq(..) => 2,
        Expr::Add(..) | Expr::Sub(..) => 3,
        Expr::Mul(..) | Expr::Div(..) => 4,
        Expr::Neg(..) => 5,
        Expr::Pow(..) => 6,
        Expr::Percent(..) => 7,
        _ => 10,
    }
}

fn print_expr(expr: &Expr, parent_prec: u8) -> String {
    let (text, my_prec) = match expr {
        Expr::Number(n) => (format_number(*n), 10),
        Expr::Bool(b) => ((if *b { "TRUE" } else { "FALSE" }).to_string(), 10),
        Expr::Text(s) => (format!("\"{}\"", s.replace('"', "\"\"")), 10),
        Expr::Date(d) => (d.format("%Y-%m-%d").to_string(), 10),
        Expr::DateTime(dt) => (dt.format("%Y-%m-%d %H:%M:%S").to_string(), 10),
        Expr::Error(e) => (e.token().to_string(), 10),

        Expr::PolyRef(at, anchor) | Expr::Ref(at, anchor, _) => (at.to_a1(*anchor), 10),
        Expr::PolySheetRef(sheet, at, anchor) | Expr::SheetRef(sheet, at, anchor, _) => {
            (format!("{}!{}", format_sheet_name(sheet), at.to_a1(*anchor)), 10)
        }
        Expr::RangeRef(r) => (
            r.to_a1(formulon_common::Anchor::RELATIVE, formulon_common::Anchor::RELATIVE),
            10,
        ),
        Expr::SheetRangeRef(sheet, r) => (
            format!(
                "{}!{}",
                format_sheet_name(sheet),
                r.to_a1(formulon_common::Anchor::RELATIVE, formulon_common::Anchor::RELATIVE)
            ),
            10,
        ),

        Expr::Add(l, r) => (bin_text(l, r, "+", 3), 3),
        Expr::Sub(l, r) => (bin_text(l, r, "-", 3), 3),
        Expr::Mul(l, r) => (bin_text(l, r, "*", 4), 4),
        Expr::Div(l, r) => (bin_text(l, r, "/", 4), 4),
        // right-associative: the right operand never needs parens at equal precedence
        Expr::Pow(l, r) => (
            format!("{}^{}", print_expr(l, 7), print_expr(r, 6)),
            6,
        ),
        Expr::Neg(e) => (format!("-{}", print_expr(e, 6)), 5),
        Expr::Percent(e) => (format!("{}%", print_expr(e, 7)), 7),

        Expr::Lt(l, r) => (bin_text(l, r, "<", 3), 2),
        Expr::Lte(l, r) => (bin_text(l, r, "<=", 3), 2),
        Expr::Gt(l, r) => (bin_text(l, r, ">", 3), 2),
        Expr::Gte(l, r) => (bin_text(l, r, ">=", 3), 2),
        Expr::Eq(l, r) => (bin_text(l, r, "=", 3), 2),
        Expr::Neq(l, r) => (bin_text(l, r, "<>", 3), 2),

        Expr::And(l, r) => (format!("AND({}, {})", print_expr(l, 0), print_expr(r, 0)), 10),
        Expr::Or(l, r) => (format!("OR({}, {})", print_expr(l, 0), print_expr(r, 0)), 10),
        Expr::Not(e) => (format!("NOT({})", print_expr(e, 0)), 10),

        Expr::If(cond, then, els) => {
            let mut s = format!("IF({}, {}", print_expr(cond, 0), print_expr(then, 0));
            if let Some(e) = els {
                s.push_str(", ");
                s.push_str(&print_expr(e, 0));
            }
            s.push(')');
            (s, 10)
        }

        Expr::Concat(l, r) => (bin_text(l, r, "&", 2), 1),

        Expr::Array(rows) => {
            let rows_s: Vec<String> = rows
                .iter()
                .map(|row| {
                    row.iter()
                        .map(|e| print_expr(e, 0))
                        .collect::<Vec<_>>()
                        .join(",")
                })
                .collect();
            (format!("{{{}}}", rows_s.join(";")), 10)
        }

        Expr::Call(name, args) => {
            let args_s: Vec<String> = args.iter().map(|a| print_expr(a, 0)).collect();
            (format!("{}({})", name, args_s.join(", ")), 10)
        }
    };

    if my_prec < parent_prec {
        format!("({text})")
    } else {
        text
    }
}

fn bin_text(l: &Expr, r: &Expr, op: &str, prec: u8) -> String {
    format!("{}{op}{}", print_expr(l, prec), print_expr(r, prec + 1))
}
