//! Dynamic evaluation errors (§7). Unlike `ParseError`, every variant here is
//! catchable by `IFERROR`/`ISERROR` and carries (or derives) a canonical
//! mapping back to an Excel [`ErrorKind`] for surfacing as a `CellValue::Error`.

use std::fmt;

use formulon_common::{CellError, ErrorKind, QualifiedRef};

#[derive(Debug, Clone, PartialEq)]
pub enum EvalError {
    DivByZero,
    /// A value failed to coerce to the type a decoder or function demanded.
    CodecFailed(ErrorKind, String),
    /// A domain-specific failure (bad IRR guess, INDEX out of range, ...).
    /// `kind` is the Excel error code this surfaces as.
    EvalFailed {
        kind: ErrorKind,
        message: String,
        cause: Option<Box<EvalError>>,
    },
    MissingWorkbook,
    UnknownSheet(String),
    CycleDetected(Vec<QualifiedRef>),
    RecursionLimit,
    /// A cell already holding `CellValue::Error(kind)` was read; the kind
    /// passes through unchanged rather than being remapped.
    CellError(ErrorKind),
}

impl EvalError {
    pub fn failed(kind: ErrorKind, message: impl Into<String>) -> Self {
        EvalError::EvalFailed {
            kind,
            message: message.into(),
            cause: None,
        }
    }

    pub fn value(message: impl Into<String>) -> Self {
        Self::failed(ErrorKind::Value, message)
    }

    pub fn num(message: impl Into<String>) -> Self {
        Self::failed(ErrorKind::Num, message)
    }

    pub fn na(message: impl Into<String>) -> Self {
        Self::failed(ErrorKind::Na, message)
    }

    pub fn name(message: impl Into<String>) -> Self {
        Self::failed(ErrorKind::Name, message)
    }

    pub fn reference(message: impl Into<String>) -> Self {
        Self::failed(ErrorKind::Ref, message)
    }

    /// The Excel error code this error surfaces as when stored in a cell.
    pub fn to_error_kind(&self) -> ErrorKind {
        match self {
            EvalError::DivByZero => ErrorKind::Div0,
            EvalError::CodecFailed(kind, _) => *kind,
            EvalError::EvalFailed { kind, .. } => *kind,
            EvalError::MissingWorkbook => ErrorKind::Ref,
            EvalError::UnknownSheet(_) => ErrorKind::Ref,
            EvalError::CycleDetected(_) => ErrorKind::Ref,
            EvalError::RecursionLimit => ErrorKind::Num,
            EvalError::CellError(kind) => *kind,
        }
    }

    /// Whether `ISERR` should count this as an error (every kind but `NA`).
    pub fn is_err_not_na(&self) -> bool {
        self.to_error_kind() != ErrorKind::Na
    }
}

impl fmt::Display for EvalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EvalError::DivByZero => write!(f, "#DIV/0!"),
            EvalError::CodecFailed(_, msg) => write!(f, "#VALUE! ({msg})"),
            EvalError::EvalFailed { kind, message, .. } => write!(f, "{} ({message})", kind.token()),
            EvalError::MissingWorkbook => write!(f, "#REF! (no workbook in scope)"),
            EvalError::UnknownSheet(name) => write!(f, "#REF! (unknown sheet {name:?})"),
            EvalError::CycleDetected(trace) => write!(f, "#REF! (circular reference through {} cells)", trace.len()),
            EvalError::RecursionLimit => write!(f, "#NUM! (recursion limit exceeded)"),
            EvalError::CellError(kind) => write!(f, "{}", kind.token()),
        }
    }
}

impl std::error::Error for EvalError {}

impl From<CellError> for EvalError {
    fn from(e: CellError) -> Self {
        EvalError::CodecFailed(e.kind, e.message.unwrap_or_default())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CycleError {
    pub trace: Vec<QualifiedRef>,
}

impl fmt::Display for CycleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "circular reference: ")?;
        for (i, r) in self.trace.iter().enumerate() {
            if i > 0 {
                write!(f, " -> ")?;
            }
            write!(f, "{}!{}", r.sheet, r.cell)?;
        }
        Ok(())
    }
}

impl std::error::Error for CycleError {}
