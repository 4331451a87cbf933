//! Core cell-value, address, and error types shared by the Formulon parser
//! and evaluator. Re-exported in full by `formulon-parse` and `formulon-eval`
//! so downstream crates only ever need to depend on the one that matters to
//! them.

pub mod address;
pub mod coord;
pub mod error;
pub mod function;
pub mod signatures;
pub mod value;

pub use address::*;
pub use coord::*;
pub use error::*;
pub use function::*;
pub use signatures::{FunctionSignature, SIGNATURES};
pub use value::*;
