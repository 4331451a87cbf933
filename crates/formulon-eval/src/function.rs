//! The executable counterpart of `formulon_common::FunctionSignature` (§4.4).
//!
//! The signature (name, argument shapes, short-circuit flag) lives in
//! `formulon-common` so the parser can validate arity without depending on
//! this crate; `FunctionSpec` just pairs that signature with the closure
//! that actually computes a result.

use formulon_common::{CellValue, FunctionSignature};
use formulon_parse::Expr;

use crate::environment::Environment;
use crate::error::EvalError;

pub type Evaluator = fn(&[Expr], &Environment) -> Result<CellValue, EvalError>;

pub struct FunctionSpec {
    pub signature: &'static FunctionSignature,
    pub eval: Evaluator,
}

impl FunctionSpec {
    pub fn new(name: &'static str, eval: Evaluator) -> Self {
        let signature = formulon_common::signatures::lookup(name)
            .unwrap_or_else(|| panic!("no signature registered for builtin {name}"));
        Self { signature, eval }
    }

    pub fn name(&self) -> &'static str {
        self.signature.name
    }
}
