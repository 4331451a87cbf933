//! Meta crate that re-exports the Formulon building blocks — value model,
//! parser/printer, and evaluator — behind a single dependency.

pub use formulon_common as common;
pub use formulon_eval as eval;
pub use formulon_parse as parse;

pub use formulon_common::{ARef, CellRange, CellValue, ErrorKind, QualifiedRef};
pub use formulon_eval::{evaluate, Clock, Environment, EvalError, FixedClock, Sheet, SystemClock, Workbook};
pub use formulon_parse::{parse as parse_formula, print, Expr, ParseError};
