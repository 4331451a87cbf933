//! Tokeniser, typed-AST parser, and canonical printer for Excel-compatible
//! formula text. See `formulon_common` for the value/address types this
//! crate's AST is built from, and `formulon_eval` for the tree-walking
//! evaluator that consumes it.

pub mod ast;
pub mod parser;
pub mod printer;
pub mod tokenizer;

pub use ast::{resolve_types, Expr, RangeLocation};
pub use parser::{parse, ParseError, MAX_FORMULA_LEN};
pub use printer::{print, print_bare};
pub use tokenizer::{Token, TokenSubType, TokenType, Tokenizer, TokenizerError};

// Re-export the shared value/address/signature types so downstream crates
// only need to depend on the one crate that matters to them.
pub use formulon_common::*;
