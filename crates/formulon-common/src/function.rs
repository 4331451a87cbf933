//! Argument-shape descriptors shared by the parser (to decide how to parse an
//! argument) and the evaluator (to decide how to decode it). See §4.4.

/// The decoded scalar type a `Scalar`/`Optional` argument slot expects.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ScalarKind {
    Number,
    Text,
    Logical,
    Date,
    /// No coercion is forced; the function handles whatever `CellValue` arrives.
    Any,
}

/// The shape of one argument slot in a [`FunctionSpec`](crate::FunctionSpec)-like
/// descriptor: a fixed scalar, a range location, an optional slot, or a
/// variadic tail that repeats the wrapped kind.
#[derive(Clone, Debug, PartialEq)]
pub enum ArgKind {
    Scalar(ScalarKind),
    Range,
    Optional(Box<ArgKind>),
    Variadic(Box<ArgKind>),
}

impl ArgKind {
    pub fn is_range(&self) -> bool {
        matches!(self, ArgKind::Range)
    }

    pub fn is_optional(&self) -> bool {
        matches!(self, ArgKind::Optional(_))
    }

    pub fn is_variadic(&self) -> bool {
        matches!(self, ArgKind::Variadic(_))
    }
}
