//! Precedence-climbing parser producing a [`Expr`] from formula text (§4.3).

use std::fmt;

use rust_decimal::Decimal;

use formulon_common::{ARef, Anchor, CellRange, ErrorKind, FULL_SPAN};

use crate::ast::{resolve_types, Expr};
use crate::tokenizer::{Associativity, Token, TokenSubType, Tokenizer, TokenizerError};

/// The minimum accepted formula length limit (§4.3: "at least 10,000
/// characters").
pub const MAX_FORMULA_LEN: usize = 10_000;

#[derive(Debug, Clone, PartialEq)]
pub enum ParseError {
    EmptyFormula,
    UnexpectedToken(usize),
    UnbalancedParens,
    UnknownFunction(String, Vec<String>),
    InvalidReference(String),
    FormulaTooLong(usize, usize),
    BadArgCount(String, usize, usize),
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseError::EmptyFormula => write!(f, "empty formula"),
            ParseError::UnexpectedToken(pos) => write!(f, "unexpected token at position {pos}"),
            ParseError::UnbalancedParens => write!(f, "unbalanced parentheses"),
            ParseError::UnknownFunction(name, suggestions) if suggestions.is_empty() => {
                write!(f, "unknown function {name}")
            }
            ParseError::UnknownFunction(name, suggestions) => write!(
                f,
                "unknown function {name}, did you mean: {}?",
                suggestions.join(", ")
            ),
            ParseError::InvalidReference(text) => write!(f, "invalid reference '{text}'"),
            ParseError::FormulaTooLong(n, limit) => {
                write!(f, "formula length {n} exceeds limit {limit}")
            }
            ParseError::BadArgCount(name, expected, got) => write!(
                f,
                "{name} expects at least {expected} argument(s), got {got}"
            ),
        }
    }
}
impl std::error::Error for ParseError {}

impl From<TokenizerError> for ParseError {
    fn from(e: TokenizerError) -> Self {
        ParseError::UnexpectedToken(e.pos)
    }
}

/// Parse formula text (with or without a leading `=`) into a type-resolved
/// [`Expr`]. This is the crate's single public entry point.
pub fn parse(formula: &str) -> Result<Expr, ParseError> {
    if formula.is_empty() {
        return Err(ParseError::EmptyFormula);
    }
    if formula.len() > MAX_FORMULA_LEN {
        return Err(ParseError::FormulaTooLong(formula.len(), MAX_FORMULA_LEN));
    }
    let tokenizer = Tokenizer::new(formula)?;
    let mut p = Parser {
        tokens: tokenizer.items,
        pos: 0,
    };
    let expr = p.parse_top()?;
    Ok(resolve_types(expr))
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn parse_top(&mut self) -> Result<Expr, ParseError> {
        if self.tokens.is_empty() {
            return Err(ParseError::EmptyFormula);
        }
        if self.tokens[0].token_type == crate::tokenizer::TokenType::Literal {
            return Ok(Expr::Text(self.tokens[0].value.clone()));
        }
        let expr = self.parse_expr(0)?;
        if self.pos < self.tokens.len() {
            return Err(ParseError::UnexpectedToken(self.tokens[self.pos].pos));
        }
        Ok(expr)
    }

    fn parse_expr(&mut self, min_prec: u8) -> Result<Expr, ParseError> {
        let mut left = self.parse_unary()?;

        while let Some(tok) = self.peek() {
            if tok.token_type != crate::tokenizer::TokenType::OpInfix {
                break;
            }
            let (prec, assoc) = tok.get_precedence().unwrap_or((0, Associativity::Left));
            if prec < min_prec {
                break;
            }
            let op = tok.value.clone();
            self.pos += 1;
            let next_min = if assoc == Associativity::Left { prec + 1 } else { prec };
            let right = self.parse_expr(next_min)?;
            left = make_binary(&op, left, right);
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expr, ParseError> {
        if let Some(tok) = self.peek() {
            if tok.token_type == crate::tokenizer::TokenType::OpPrefix {
                let op = tok.value.clone();
                self.pos += 1;
                let expr = self.parse_unary()?;
                return Ok(if op == "-" {
                    Expr::Neg(Box::new(expr))
                } else {
                    expr
                });
            }
        }
        self.parse_postfix()
    }

    fn parse_postfix(&mut self) -> Result<Expr, ParseError> {
        let mut expr = self.parse_primary()?;
        while let Some(tok) = self.peek() {
            if tok.token_type == crate::tokenizer::TokenType::OpPostfix {
                self.pos += 1;
                expr = Expr::Percent(Box::new(expr));
            } else {
                break;
            }
        }
        Ok(expr)
    }

    fn parse_primary(&mut self) -> Result<Expr, ParseError> {
        use crate::tokenizer::TokenType;

        let tok = self
            .peek()
            .cloned()
            .ok_or(ParseError::UnexpectedToken(usize::MAX))?;

        match tok.token_type {
            TokenType::Number => {
                self.pos += 1;
                let d: Decimal = tok
                    .value
                    .parse()
                    .or_else(|_| {
                        tok.value
                            .parse::<f64>()
                            .ok()
                            .and_then(Decimal::from_f64_retain)
                            .ok_or(())
                    })
                    .map_err(|_| ParseError::InvalidReference(tok.value.clone()))?;
                Ok(Expr::Number(d))
            }
            TokenType::Text => {
                self.pos += 1;
                Ok(Expr::Text(tok.value.clone()))
            }
            TokenType::Logical => {
                self.pos += 1;
                Ok(Expr::Bool(tok.value.eq_ignore_ascii_case("TRUE")))
            }
            TokenType::ErrorLit => {
                self.pos += 1;
                let kind = ErrorKind::parse(&tok.value)
                    .ok_or_else(|| ParseError::InvalidReference(tok.value.clone()))?;
                Ok(Expr::Error(kind))
            }
            TokenType::Ref => {
                self.pos += 1;
                parse_reference(&tok.value)
            }
            TokenType::Func => {
                self.pos += 1;
                self.parse_call(&tok.value)
            }
            TokenType::Paren if tok.subtype == TokenSubType::Open => {
                self.pos += 1;
                let inner = self.parse_expr(0)?;
                match self.peek() {
                    Some(t) if t.token_type == TokenType::Paren && t.subtype == TokenSubType::Close => {
                        self.pos += 1;
                        Ok(inner)
                    }
                    _ => Err(ParseError::UnbalancedParens),
                }
            }
            TokenType::Array if tok.subtype == TokenSubType::Open => {
                self.pos += 1;
                self.parse_array()
            }
            _ => Err(ParseError::UnexpectedToken(tok.pos)),
        }
    }

    fn parse_call(&mut self, func_token_value: &str) -> Result<Expr, ParseError> {
        use crate::tokenizer::TokenType;

        let name = func_token_value[..func_token_value.len() - 1].to_string();
        let mut args = Vec::new();

        if let Some(t) = self.peek() {
            if t.token_type == TokenType::Func && t.subtype == TokenSubType::Close {
                self.pos += 1;
                return self.finish_call(name, args);
            }
        }

        loop {
            args.push(self.parse_expr(0)?);
            match self.peek() {
                Some(t) if t.token_type == TokenType::Sep => {
                    self.pos += 1;
                }
                Some(t) if t.token_type == TokenType::Func && t.subtype == TokenSubType::Close => {
                    self.pos += 1;
                    break;
                }
                Some(t) => return Err(ParseError::UnexpectedToken(t.pos)),
                None => return Err(ParseError::UnbalancedParens),
            }
        }
        self.finish_call(name, args)
    }

    fn finish_call(&self, name: String, mut args: Vec<Expr>) -> Result<Expr, ParseError> {
        let upper = name.to_ascii_uppercase();

        // IF/AND/OR/NOT get dedicated short-circuit AST variants (§3, §4.4)
        // rather than the generic `Call` every other function uses.
        match upper.as_str() {
            "IF" => {
                if args.len() < 2 || args.len() > 3 {
                    return Err(ParseError::BadArgCount(name, 2, args.len()));
                }
                let els = if args.len() == 3 { Some(Box::new(args.remove(2))) } else { None };
                let then = Box::new(args.remove(1));
                let cond = Box::new(args.remove(0));
                return Ok(Expr::If(cond, then, els));
            }
            "AND" | "OR" if !args.is_empty() => {
                let mut iter = args.into_iter();
                let mut acc = iter.next().unwrap();
                for next in iter {
                    acc = if upper == "AND" {
                        Expr::And(Box::new(acc), Box::new(next))
                    } else {
                        Expr::Or(Box::new(acc), Box::new(next))
                    };
                }
                return Ok(acc);
            }
            "NOT" if args.len() == 1 => {
                return Ok(Expr::Not(Box::new(args.remove(0))));
            }
            _ => {}
        }

        if let Some(sig) = formulon_common::signatures::lookup(&name) {
            let min = sig.min_arity();
            if args.len() < min {
                return Err(ParseError::BadArgCount(name, min, args.len()));
            }
            if let Some(max) = sig.max_arity() {
                if args.len() > max {
                    return Err(ParseError::BadArgCount(name, max, args.len()));
                }
            }
        } else {
            let known = formulon_common::signatures::all_names();
            let mut suggestions: Vec<(usize, &str)> = known
                .iter()
                .map(|&n| (levenshtein(&upper, n), n))
                .filter(|(d, _)| *d <= 2)
                .collect();
            suggestions.sort_by_key(|(d, _)| *d);
            return Err(ParseError::UnknownFunction(
                name,
                suggestions.into_iter().map(|(_, n)| n.to_string()).collect(),
            ));
        }
        Ok(Expr::Call(name, args))
    }

    fn parse_array(&mut self) -> Result<Expr, ParseError> {
        use crate::tokenizer::TokenType;

        let mut rows = Vec::new();
        if let Some(t) = self.peek() {
            if t.token_type == TokenType::Array && t.subtype == TokenSubType::Close {
                self.pos += 1;
                return Ok(Expr::Array(rows));
            }
        }
        let mut row = vec![self.parse_expr(0)?];
        loop {
            match self.peek() {
                Some(t) if t.token_type == TokenType::Sep && t.subtype == TokenSubType::Arg => {
                    self.pos += 1;
                    row.push(self.parse_expr(0)?);
                }
                Some(t) if t.token_type == TokenType::Sep && t.subtype == TokenSubType::Row => {
                    self.pos += 1;
                    rows.push(std::mem::take(&mut row));
                    row.push(self.parse_expr(0)?);
                }
                Some(t) if t.token_type == TokenType::Array && t.subtype == TokenSubType::Close => {
                    self.pos += 1;
                    rows.push(row);
                    break;
                }
                Some(t) => return Err(ParseError::UnexpectedToken(t.pos)),
                None => return Err(ParseError::UnbalancedParens),
            }
        }
        Ok(Expr::Array(rows))
    }
}

fn make_binary(op: &str, left: Expr, right: Expr) -> Expr {
    let (l, r) = (Box::new(left), Box::new(right));
    match op {
        "+" => Expr::Add(l, r),
        "-" => Expr::Sub(l, r),
        "*" => Expr::Mul(l, r),
        "/" => Expr::Div(l, r),
        "^" => Expr::Pow(l, r),
        "&" => Expr::Concat(l, r),
        "=" => Expr::Eq(l, r),
        "<>" => Expr::Neq(l, r),
        "<" => Expr::Lt(l, r),
        "<=" => Expr::Lte(l, r),
        ">" => Expr::Gt(l, r),
        ">=" => Expr::Gte(l, r),
        _ => unreachable!("unhandled infix operator {op}"),
    }
}

/// Parse a reference token's raw text (`A1`, `$A$1`, `A1:B2`, `Sheet1!A1`,
/// `'Sheet Name'!A1:B2`, `A:A`, `1:1`, or a bare function name treated as a
/// logical `AND`/`OR`/`IF` etc. is never routed here — those are `Func`
/// tokens) into a typed reference/range expression, or a special-cased
/// `IF`-less boolean keyword is not applicable.
fn parse_reference(text: &str) -> Result<Expr, ParseError> {
    let (sheet, rest) = split_sheet(text)?;

    if let Some((a, b)) = rest.split_once(':') {
        let range = parse_range_parts(a, b, text)?;
        return Ok(match sheet {
            Some(s) => Expr::SheetRangeRef(s, range),
            None => Expr::RangeRef(range),
        });
    }

    let (cell, anchor) =
        formulon_common::parse_a1_cell(rest).map_err(|_| ParseError::InvalidReference(text.to_string()))?;
    Ok(match sheet {
        Some(s) => Expr::PolySheetRef(s, cell, anchor),
        None => Expr::PolyRef(cell, anchor),
    })
}

fn split_sheet(text: &str) -> Result<(Option<String>, &str), ParseError> {
    if let Some(stripped) = text.strip_prefix('\'') {
        let end = stripped
            .find('\'')
            .ok_or_else(|| ParseError::InvalidReference(text.to_string()))?;
        // account for doubled '' escapes inside the quoted name
        let mut name_end = end;
        let bytes = stripped.as_bytes();
        while name_end + 1 < bytes.len() && bytes[name_end + 1] == b'\'' {
            name_end += 2;
            match stripped[name_end..].find('\'') {
                Some(next) => name_end += next,
                None => return Err(ParseError::InvalidReference(text.to_string())),
            }
        }
        let quoted = &stripped[..name_end];
        let name = quoted.replace("''", "'");
        let after = &stripped[name_end + 1..];
        let rest = after
            .strip_prefix('!')
            .ok_or_else(|| ParseError::InvalidReference(text.to_string()))?;
        return Ok((Some(name), rest));
    }
    match text.split_once('!') {
        Some((sheet, rest)) => Ok((Some(sheet.to_string()), rest)),
        None => Ok((None, text)),
    }
}

fn parse_range_parts(a: &str, b: &str, original: &str) -> Result<CellRange, ParseError> {
    let err = || ParseError::InvalidReference(original.to_string());

    let a_is_col_only = a.chars().all(|c| c.is_ascii_alphabetic()) && !a.is_empty();
    let b_is_col_only = b.chars().all(|c| c.is_ascii_alphabetic()) && !b.is_empty();
    if a_is_col_only && b_is_col_only {
        let col_a = formulon_common::letters_to_column(&a.to_ascii_uppercase()).ok_or_else(err)?;
        let col_b = formulon_common::letters_to_column(&b.to_ascii_uppercase()).ok_or_else(err)?;
        let (lo, hi) = (col_a.min(col_b), col_a.max(col_b));
        return Ok(CellRange::new(ARef::new(lo, 0), ARef::new(hi, FULL_SPAN)));
    }

    let a_is_row_only = a.chars().all(|c| c.is_ascii_digit()) && !a.is_empty();
    let b_is_row_only = b.chars().all(|c| c.is_ascii_digit()) && !b.is_empty();
    if a_is_row_only && b_is_row_only {
        let row_a: u32 = a.parse().map_err(|_| err())?;
        let row_b: u32 = b.parse().map_err(|_| err())?;
        let (lo, hi) = (row_a.min(row_b), row_a.max(row_b));
        return Ok(CellRange::new(
            ARef::new(0, lo.saturating_sub(1)),
            ARef::new(FULL_SPAN, hi.saturating_sub(1)),
        ));
    }

    let (start, _) = formulon_common::parse_a1_cell(a).map_err(|_| err())?;
    let (end, _) = formulon_common::parse_a1_cell(b).map_err(|_| err())?;
    Ok(CellRange::new(start, end))
}

/// Bounded Levenshtein distance, used for `UnknownFunction` suggestions
/// (§4.3: Levenshtein distance ≤ 2 against the registry).
fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0; b.len() + 1];
    for i in 1..=a.len() {
        curr[0] = i;
        for j in 1..=b.len() {
            let cost = if a[i - 1] == b[j - 1] { 0 } else { 1 };
            curr[j] = (prev[j] + 1).min(curr[j - 1] + 1).min(prev[j - 1] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b.len()]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_simple_arithmetic() {
        let expr = parse("=1+2*3").unwrap();
        assert_eq!(
            expr,
            Expr::Add(
                Box::new(Expr::Number(Decimal::ONE)),
                Box::new(Expr::Mul(
                    Box::new(Expr::Number(Decimal::TWO)),
                    Box::new(Expr::Number(Decimal::from(3)))
                ))
            )
        );
    }

    #[test]
    fn exponent_binds_tighter_than_unary_minus() {
        // -2^2 = -(2^2) = -4, per §4.3.
        let expr = parse("=-2^2").unwrap();
        assert_eq!(
            expr,
            Expr::Neg(Box::new(Expr::Pow(
                Box::new(Expr::Number(Decimal::TWO)),
                Box::new(Expr::Number(Decimal::TWO))
            )))
        );
    }

    #[test]
    fn parses_sum_over_range() {
        let expr = parse("=SUM(A1:A3)").unwrap();
        match expr {
            Expr::Call(name, args) => {
                assert_eq!(name, "SUM");
                assert_eq!(args.len(), 1);
                assert!(args[0].is_range());
            }
            _ => panic!("expected Call"),
        }
    }

    #[test]
    fn parses_quoted_sheet_name() {
        let expr = parse("='Q1 Report'!A1").unwrap();
        match expr {
            Expr::SheetRef(sheet, cell, _, _) => {
                assert_eq!(sheet, "Q1 Report");
                assert_eq!(cell, ARef::from_excel(1, 1));
            }
            other => panic!("expected SheetRef, got {other:?}"),
        }
    }

    #[test]
    fn unknown_function_suggests_close_match() {
        let err = parse("=SUMM(A1)").unwrap_err();
        match err {
            ParseError::UnknownFunction(name, suggestions) => {
                assert_eq!(name, "SUMM");
                assert!(suggestions.iter().any(|s| s == "SUM"));
            }
            other => panic!("expected UnknownFunction, got {other:?}"),
        }
    }

    #[test]
    fn rejects_unbalanced_parens() {
        assert_eq!(parse("=(1+2").unwrap_err(), ParseError::UnbalancedParens);
    }

    #[test]
    fn full_column_range_parses() {
        let expr = parse("=SUM(A:A)").unwrap();
        match expr {
            Expr::Call(_, args) => match &args[0] {
                Expr::RangeRef(r) => assert!(r.is_full_column()),
                other => panic!("expected RangeRef, got {other:?}"),
            },
            _ => panic!("expected Call"),
        }
    }

    #[test]
    fn empty_formula_is_rejected() {
        assert_eq!(parse("").unwrap_err(), ParseError::EmptyFormula);
    }
}
