//! Excel-faithful error codes.
//!
//! [`ErrorKind`] is the fixed set of error codes a cell can surface; [`CellError`]
//! pairs a kind with an optional human-readable explanation used in diagnostics
//! (the explanation never changes `Display`, which always renders the bare
//! Excel token so that round-tripping through text stays exact).

use std::fmt;

/// Canonical Excel error codes.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Null,
    Ref,
    Name,
    Value,
    Div0,
    Na,
    Num,
    GettingData,
}

impl ErrorKind {
    pub fn token(self) -> &'static str {
        match self {
            ErrorKind::Null => "#NULL!",
            ErrorKind::Ref => "#REF!",
            ErrorKind::Name => "#NAME?",
            ErrorKind::Value => "#VALUE!",
            ErrorKind::Div0 => "#DIV/0!",
            ErrorKind::Na => "#N/A",
            ErrorKind::Num => "#NUM!",
            ErrorKind::GettingData => "#GETTING_DATA",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Some(match s.trim() {
            "#NULL!" => ErrorKind::Null,
            "#REF!" => ErrorKind::Ref,
            "#NAME?" => ErrorKind::Name,
            "#VALUE!" => ErrorKind::Value,
            "#DIV/0!" => ErrorKind::Div0,
            "#N/A" => ErrorKind::Na,
            "#NUM!" => ErrorKind::Num,
            "#GETTING_DATA" => ErrorKind::GettingData,
            _ => return None,
        })
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

/// A cell-level error: a canonical kind plus an optional explanation.
///
/// `message` is diagnostic only — equality and `Display` are driven by `kind`
/// alone, so two errors of the same kind compare equal regardless of how they
/// were produced.
#[derive(Debug, Clone)]
pub struct CellError {
    pub kind: ErrorKind,
    pub message: Option<String>,
}

impl CellError {
    pub fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            message: None,
        }
    }

    pub fn with_message(mut self, msg: impl Into<String>) -> Self {
        self.message = Some(msg.into());
        self
    }
}

impl PartialEq for CellError {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind
    }
}
impl Eq for CellError {}

impl std::hash::Hash for CellError {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.kind.hash(state);
    }
}

impl fmt::Display for CellError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)
    }
}

impl std::error::Error for CellError {}

impl From<ErrorKind> for CellError {
    fn from(kind: ErrorKind) -> Self {
        CellError::new(kind)
    }
}
