//! The cell-value sum type and Excel-faithful coercion rules.
//!
//! Numbers are arbitrary-precision [`rust_decimal::Decimal`] rather than
//! `f64` so that financial and statistical functions do not inherit binary
//! floating-point rounding. `Decimal` caps out at 28-29 significant digits,
//! which comfortably covers every formula in the test corpus (division is
//! compared with a 1e-15 tolerance, not exact equality).

use std::fmt;

use chrono::{Duration as ChronoDuration, NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::{CellError, ErrorKind};

/// Base date for the Excel 1900 date system. Serial 1 = base + 1 day = 1900-01-01.
const EXCEL_EPOCH: NaiveDate = match NaiveDate::from_ymd_opt(1899, 12, 31) {
    Some(d) => d,
    None => unreachable!(),
};

/// Convert a `NaiveDateTime` to its Excel serial number, honouring the
/// phantom 1900-02-29 that Excel's 1900 date system carries forward.
pub fn datetime_to_serial(dt: &NaiveDateTime) -> f64 {
    let days = (dt.date() - EXCEL_EPOCH).num_days();
    let serial_days = if dt.date() >= NaiveDate::from_ymd_opt(1900, 3, 1).unwrap() {
        days + 1
    } else {
        days
    };
    let secs_in_day = dt.time().num_seconds_from_midnight() as f64;
    serial_days as f64 + secs_in_day / 86_400.0
}

/// Convert an Excel serial number back to a `NaiveDateTime`.
pub fn serial_to_datetime(serial: f64) -> NaiveDateTime {
    let days = serial.trunc() as i64;
    let frac_secs = (serial.fract() * 86_400.0).round() as i64;

    let date = if days == 60 {
        NaiveDate::from_ymd_opt(1900, 2, 28).unwrap()
    } else {
        let offset = if days < 60 { days } else { days - 1 };
        EXCEL_EPOCH + ChronoDuration::days(offset)
    };

    let time =
        NaiveTime::from_num_seconds_from_midnight_opt((frac_secs.rem_euclid(86_400)) as u32, 0)
            .unwrap();
    date.and_time(time)
}

/// The typed value a cell holds, independent of whether it arrived as a
/// literal, a stored formula result, or an evaluation output.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone)]
pub enum CellValue {
    Empty,
    Number(Decimal),
    Text(String),
    Bool(bool),
    DateTime(NaiveDateTime),
    Error(ErrorKind),
    /// A formula cell: its source text and an optional cached result.
    /// The cache is never itself `Formula`-shaped.
    Formula(String, Option<Box<CellValue>>),
    /// A 2-D array result (range reads, array formulas, SUMPRODUCT operands).
    Array(Vec<Vec<CellValue>>),
    /// Runs of formatted text; formatting is dropped and the plain
    /// concatenated content is treated as `Text` for formula purposes (§3).
    RichText(Vec<String>),
}

impl PartialEq for CellValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (CellValue::Empty, CellValue::Empty) => true,
            (CellValue::Number(a), CellValue::Number(b)) => a == b,
            (CellValue::Text(a), CellValue::Text(b)) => a == b,
            (CellValue::Bool(a), CellValue::Bool(b)) => a == b,
            (CellValue::DateTime(a), CellValue::DateTime(b)) => a == b,
            (CellValue::Error(a), CellValue::Error(b)) => a == b,
            (CellValue::Formula(a, ca), CellValue::Formula(b, cb)) => a == b && ca == cb,
            (CellValue::Array(a), CellValue::Array(b)) => a == b,
            (CellValue::RichText(a), CellValue::RichText(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Empty => write!(f, ""),
            CellValue::Number(n) => write!(f, "{n}"),
            CellValue::Text(s) => write!(f, "{s}"),
            CellValue::Bool(b) => write!(f, "{}", if *b { "TRUE" } else { "FALSE" }),
            CellValue::DateTime(dt) => write!(f, "{dt}"),
            CellValue::Error(e) => write!(f, "{e}"),
            CellValue::Formula(src, _) => write!(f, "={src}"),
            CellValue::Array(rows) => write!(f, "{rows:?}"),
            CellValue::RichText(runs) => write!(f, "{}", runs.concat()),
        }
    }
}

impl CellValue {
    pub fn error(kind: ErrorKind) -> Self {
        CellValue::Error(kind)
    }

    pub fn is_error(&self) -> bool {
        matches!(self, CellValue::Error(_))
    }

    pub fn as_error(&self) -> Option<ErrorKind> {
        match self {
            CellValue::Error(e) => Some(*e),
            _ => None,
        }
    }

    pub fn is_empty_cell(&self) -> bool {
        matches!(self, CellValue::Empty)
    }

    pub fn number(n: impl Into<Decimal>) -> Self {
        CellValue::Number(n.into())
    }

    pub fn from_serial(serial: f64) -> Self {
        let dt = serial_to_datetime(serial);
        CellValue::DateTime(dt)
    }

    pub fn as_serial(&self) -> Option<f64> {
        match self {
            CellValue::DateTime(dt) => Some(datetime_to_serial(dt)),
            CellValue::Number(n) => n.to_f64(),
            CellValue::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            _ => None,
        }
    }

    /// Coerce to a number following Excel's arithmetic-context rules (§4.1).
    pub fn coerce_to_number(&self) -> Result<Decimal, CellError> {
        match self {
            CellValue::Number(n) => Ok(*n),
            CellValue::Bool(true) => Ok(Decimal::ONE),
            CellValue::Bool(false) => Ok(Decimal::ZERO),
            CellValue::Empty => Ok(Decimal::ZERO),
            CellValue::DateTime(dt) => {
                let serial = datetime_to_serial(dt);
                Decimal::from_f64_retain(serial).ok_or_else(|| CellError::new(ErrorKind::Value))
            }
            CellValue::Text(s) => parse_number_text(s).ok_or_else(|| CellError::new(ErrorKind::Value)),
            CellValue::RichText(runs) => parse_number_text(&runs.concat()).ok_or_else(|| CellError::new(ErrorKind::Value)),
            CellValue::Error(e) => Err(CellError::new(*e)),
            CellValue::Formula(..) | CellValue::Array(_) => Err(CellError::new(ErrorKind::Value)),
        }
    }

    /// Coerce to text following Excel's display rules (§4.1).
    pub fn coerce_to_text(&self) -> Result<String, CellError> {
        match self {
            CellValue::Number(n) => Ok(format_number(*n)),
            CellValue::Text(s) => Ok(s.clone()),
            CellValue::RichText(runs) => Ok(runs.concat()),
            CellValue::Bool(b) => Ok(if *b { "TRUE".into() } else { "FALSE".into() }),
            CellValue::Empty => Ok(String::new()),
            CellValue::DateTime(dt) => Ok(dt.format("%Y-%m-%d %H:%M:%S").to_string()),
            CellValue::Error(e) => Err(CellError::new(*e)),
            CellValue::Formula(..) | CellValue::Array(_) => Err(CellError::new(ErrorKind::Value)),
        }
    }

    /// Coerce to a boolean following Excel's truthiness rules (§4.1).
    pub fn coerce_to_bool(&self) -> Result<bool, CellError> {
        match self {
            CellValue::Bool(b) => Ok(*b),
            CellValue::Number(n) => Ok(!n.is_zero()),
            CellValue::Text(s) => match s.to_ascii_uppercase().as_str() {
                "TRUE" => Ok(true),
                "FALSE" => Ok(false),
                _ => Err(CellError::new(ErrorKind::Value)),
            },
            CellValue::RichText(runs) => match runs.concat().to_ascii_uppercase().as_str() {
                "TRUE" => Ok(true),
                "FALSE" => Ok(false),
                _ => Err(CellError::new(ErrorKind::Value)),
            },
            CellValue::Empty => Ok(false),
            CellValue::DateTime(_) => Ok(true),
            CellValue::Error(e) => Err(CellError::new(*e)),
            CellValue::Formula(..) | CellValue::Array(_) => Err(CellError::new(ErrorKind::Value)),
        }
    }
}

/// Parse a decimal from text the way Excel's arithmetic coercion does:
/// locale-independent, accepting scientific notation and a leading sign.
fn parse_number_text(s: &str) -> Option<Decimal> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Ok(d) = trimmed.parse::<Decimal>() {
        return Some(d);
    }
    // rust_decimal rejects exponents; fall back through f64 for scientific notation.
    if trimmed.contains(['e', 'E']) {
        if let Ok(f) = trimmed.parse::<f64>() {
            return Decimal::from_f64_retain(f);
        }
    }
    if let Some(pct) = trimmed.strip_suffix('%') {
        if let Ok(d) = pct.trim().parse::<Decimal>() {
            return Some(d / Decimal::ONE_HUNDRED);
        }
    }
    None
}

/// Format a decimal in its shortest exact representation (no trailing zeros).
pub fn format_number(n: Decimal) -> String {
    n.normalize().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serial_roundtrip_known_dates() {
        let dt = NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        let serial = datetime_to_serial(&dt);
        assert_eq!(serial_to_datetime(serial), dt);
    }

    #[test]
    fn phantom_leap_day_is_skipped() {
        // serial 59 = 1900-02-28, serial 61 = 1900-03-01; 60 is the phantom day.
        let feb28 = serial_to_datetime(59.0).date();
        let mar1 = serial_to_datetime(61.0).date();
        assert_eq!(feb28, NaiveDate::from_ymd_opt(1900, 2, 28).unwrap());
        assert_eq!(mar1, NaiveDate::from_ymd_opt(1900, 3, 1).unwrap());
    }

    #[test]
    fn coerce_to_number_rules() {
        assert_eq!(
            CellValue::Bool(true).coerce_to_number().unwrap(),
            Decimal::ONE
        );
        assert_eq!(
            CellValue::Empty.coerce_to_number().unwrap(),
            Decimal::ZERO
        );
        assert_eq!(
            CellValue::Text("3.5e2".into()).coerce_to_number().unwrap(),
            Decimal::from_f64_retain(350.0).unwrap()
        );
        assert!(CellValue::Text("abc".into()).coerce_to_number().is_err());
    }

    #[test]
    fn coerce_to_bool_text_case_insensitive() {
        assert!(CellValue::Text("true".into()).coerce_to_bool().unwrap());
        assert!(!CellValue::Text("False".into()).coerce_to_bool().unwrap());
        assert!(CellValue::Text("yes".into()).coerce_to_bool().is_err());
    }
}
