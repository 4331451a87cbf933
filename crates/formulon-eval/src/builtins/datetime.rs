//! Date/time built-ins (§4.5). `TODAY`/`NOW` read `env.clock`, never the OS
//! clock directly, so date formulas stay deterministic under test.

use chrono::{Datelike, Duration, NaiveDate, Timelike, Weekday};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;

use formulon_common::CellValue;
use formulon_parse::Expr;

use crate::environment::Environment;
use crate::error::EvalError;
use crate::function::FunctionSpec;

use super::util::{num_arg, opt_num_arg, range_arg, scalar, text_arg};

pub fn specs() -> Vec<FunctionSpec> {
    vec![
        FunctionSpec::new("TODAY", today),
        FunctionSpec::new("NOW", now),
        FunctionSpec::new("YEAR", |a, e| Ok(CellValue::Number(Decimal::from(date_arg(a, 0, e)?.year())))),
        FunctionSpec::new("MONTH", |a, e| Ok(CellValue::Number(Decimal::from(date_arg(a, 0, e)?.month())))),
        FunctionSpec::new("DAY", |a, e| Ok(CellValue::Number(Decimal::from(date_arg(a, 0, e)?.day())))),
        FunctionSpec::new("DATE", date_fn),
        FunctionSpec::new("TIME", time_fn),
        FunctionSpec::new("HOUR", |a, e| Ok(CellValue::Number(Decimal::from(datetime_arg(a, 0, e)?.hour())))),
        FunctionSpec::new("MINUTE", |a, e| Ok(CellValue::Number(Decimal::from(datetime_arg(a, 0, e)?.minute())))),
        FunctionSpec::new("SECOND", |a, e| Ok(CellValue::Number(Decimal::from(datetime_arg(a, 0, e)?.second())))),
        FunctionSpec::new("WEEKDAY", weekday),
        FunctionSpec::new("EOMONTH", eomonth),
        FunctionSpec::new("EDATE", edate),
        FunctionSpec::new("NETWORKDAYS", networkdays),
        FunctionSpec::new("WORKDAY", workday),
        FunctionSpec::new("DATEDIF", datedif),
        FunctionSpec::new("YEARFRAC", yearfrac),
    ]
}

fn date_arg(args: &[Expr], i: usize, env: &Environment) -> Result<NaiveDate, EvalError> {
    Ok(datetime_arg(args, i, env)?.date())
}

fn datetime_arg(args: &[Expr], i: usize, env: &Environment) -> Result<chrono::NaiveDateTime, EvalError> {
    match scalar(args, i, env)? {
        CellValue::DateTime(dt) => Ok(dt),
        other => {
            let n = other.coerce_to_number().map_err(EvalError::from)?;
            let serial = n.to_f64().ok_or_else(|| EvalError::value("non-numeric date"))?;
            Ok(formulon_common::serial_to_datetime(serial))
        }
    }
}

fn today(_args: &[Expr], env: &Environment) -> Result<CellValue, EvalError> {
    Ok(CellValue::DateTime(env.clock.today().and_hms_opt(0, 0, 0).unwrap()))
}

fn now(_args: &[Expr], env: &Environment) -> Result<CellValue, EvalError> {
    Ok(CellValue::DateTime(env.clock.now()))
}

fn date_fn(args: &[Expr], env: &Environment) -> Result<CellValue, EvalError> {
    let y = num_arg(args, 0, env)?.to_i32().ok_or_else(|| EvalError::value("non-integer year"))?;
    let m = num_arg(args, 1, env)?.to_i32().ok_or_else(|| EvalError::value("non-integer month"))?;
    let d = num_arg(args, 2, env)?.to_i32().ok_or_else(|| EvalError::value("non-integer day"))?;
    let base = NaiveDate::from_ymd_opt(y, 1, 1).ok_or_else(|| EvalError::num("year out of range"))?;
    let date = base
        .checked_add_months(chrono::Months::new((m - 1).max(0) as u32))
        .and_then(|d2| d2.checked_add_signed(Duration::days((d - 1) as i64)))
        .ok_or_else(|| EvalError::num("date out of range"))?;
    Ok(CellValue::DateTime(date.and_hms_opt(0, 0, 0).unwrap()))
}

fn time_fn(args: &[Expr], env: &Environment) -> Result<CellValue, EvalError> {
    let h = num_arg(args, 0, env)?.to_i64().ok_or_else(|| EvalError::value("non-integer hour"))?;
    let m = num_arg(args, 1, env)?.to_i64().ok_or_else(|| EvalError::value("non-integer minute"))?;
    let s = num_arg(args, 2, env)?.to_i64().ok_or_else(|| EvalError::value("non-integer second"))?;
    let total_secs = h * 3600 + m * 60 + s;
    let frac = (total_secs.rem_euclid(86_400)) as f64 / 86_400.0;
    Ok(CellValue::from_serial(frac))
}

fn weekday(args: &[Expr], env: &Environment) -> Result<CellValue, EvalError> {
    let date = date_arg(args, 0, env)?;
    let mode = opt_num_arg(args, 1, env, Decimal::ONE)?.to_i32().unwrap_or(1);
    let sunday0 = date.weekday().num_days_from_sunday();
    let n = match mode {
        1 => sunday0 + 1,
        2 => date.weekday().num_days_from_monday() + 1,
        3 => date.weekday().num_days_from_monday(),
        _ => return Err(EvalError::num("unsupported WEEKDAY return_type")),
    };
    Ok(CellValue::Number(Decimal::from(n)))
}

fn eomonth(args: &[Expr], env: &Environment) -> Result<CellValue, EvalError> {
    let date = date_arg(args, 0, env)?;
    let months = num_arg(args, 1, env)?.to_i32().ok_or_else(|| EvalError::value("non-integer month offset"))?;
    let target = shift_months(date, months)?;
    let first_of_next = NaiveDate::from_ymd_opt(target.year(), target.month(), 1)
        .unwrap()
        .checked_add_months(chrono::Months::new(1))
        .ok_or_else(|| EvalError::num("date out of range"))?;
    let eom = first_of_next.pred_opt().ok_or_else(|| EvalError::num("date out of range"))?;
    Ok(CellValue::DateTime(eom.and_hms_opt(0, 0, 0).unwrap()))
}

fn edate(args: &[Expr], env: &Environment) -> Result<CellValue, EvalError> {
    let date = date_arg(args, 0, env)?;
    let months = num_arg(args, 1, env)?.to_i32().ok_or_else(|| EvalError::value("non-integer month offset"))?;
    let target = shift_months(date, months)?;
    Ok(CellValue::DateTime(target.and_hms_opt(0, 0, 0).unwrap()))
}

fn shift_months(date: NaiveDate, months: i32) -> Result<NaiveDate, EvalError> {
    if months >= 0 {
        date.checked_add_months(chrono::Months::new(months as u32))
    } else {
        date.checked_sub_months(chrono::Months::new((-months) as u32))
    }
    .ok_or_else(|| EvalError::num("date out of range"))
}

fn is_holiday(date: NaiveDate, holidays: &[NaiveDate]) -> bool {
    holidays.contains(&date)
}

fn holiday_list(args: &[Expr], i: usize, env: &Environment) -> Result<Vec<NaiveDate>, EvalError> {
    if i >= args.len() {
        return Ok(Vec::new());
    }
    let grid = range_arg(args, i, env)?;
    let mut out = Vec::new();
    for cell in grid.into_iter().flatten() {
        if let CellValue::DateTime(dt) = cell {
            out.push(dt.date());
        }
    }
    Ok(out)
}

fn networkdays(args: &[Expr], env: &Environment) -> Result<CellValue, EvalError> {
    let start = date_arg(args, 0, env)?;
    let end = date_arg(args, 1, env)?;
    let holidays = holiday_list(args, 2, env)?;
    let (lo, hi, sign) = if start <= end { (start, end, 1) } else { (end, start, -1) };
    let mut count = 0i64;
    let mut d = lo;
    while d <= hi {
        if !matches!(d.weekday(), Weekday::Sat | Weekday::Sun) && !is_holiday(d, &holidays) {
            count += 1;
        }
        d += Duration::days(1);
    }
    Ok(CellValue::Number(Decimal::from(count * sign)))
}

fn workday(args: &[Expr], env: &Environment) -> Result<CellValue, EvalError> {
    let start = date_arg(args, 0, env)?;
    let days = num_arg(args, 1, env)?.to_i64().ok_or_else(|| EvalError::value("non-integer day offset"))?;
    let holidays = holiday_list(args, 2, env)?;
    let step = if days >= 0 { 1 } else { -1 };
    let mut remaining = days.abs();
    let mut d = start;
    while remaining > 0 {
        d += Duration::days(step);
        if !matches!(d.weekday(), Weekday::Sat | Weekday::Sun) && !is_holiday(d, &holidays) {
            remaining -= 1;
        }
    }
    Ok(CellValue::DateTime(d.and_hms_opt(0, 0, 0).unwrap()))
}

fn datedif(args: &[Expr], env: &Environment) -> Result<CellValue, EvalError> {
    let start = date_arg(args, 0, env)?;
    let end = date_arg(args, 1, env)?;
    let unit = text_arg(args, 2, env)?.to_ascii_uppercase();
    if start > end {
        return Err(EvalError::num("DATEDIF start_date must be <= end_date"));
    }
    let result = match unit.as_str() {
        "Y" => years_between(start, end),
        "M" => months_between(start, end),
        "D" => (end - start).num_days(),
        "MD" => (end.day() as i64 - start.day() as i64).rem_euclid(31),
        "YM" => months_between(start, end) % 12,
        "YD" => {
            let this_year_anniversary = NaiveDate::from_ymd_opt(end.year(), start.month(), start.day());
            match this_year_anniversary {
                Some(anniv) if anniv <= end => (end - anniv).num_days(),
                _ => {
                    let prior = NaiveDate::from_ymd_opt(end.year() - 1, start.month(), start.day())
                        .ok_or_else(|| EvalError::num("invalid anniversary date"))?;
                    (end - prior).num_days()
                }
            }
        }
        _ => return Err(EvalError::value("unknown DATEDIF unit")),
    };
    Ok(CellValue::Number(Decimal::from(result)))
}

fn years_between(start: NaiveDate, end: NaiveDate) -> i64 {
    let mut years = end.year() as i64 - start.year() as i64;
    if (end.month(), end.day()) < (start.month(), start.day()) {
        years -= 1;
    }
    years
}

fn months_between(start: NaiveDate, end: NaiveDate) -> i64 {
    let mut months = (end.year() as i64 - start.year() as i64) * 12 + (end.month() as i64 - start.month() as i64);
    if end.day() < start.day() {
        months -= 1;
    }
    months
}

/// Basis 0 (US 30/360) is the only day-count convention implemented; other
/// bases fall back to actual/365 (§9 open question, resolved pragmatically).
fn yearfrac(args: &[Expr], env: &Environment) -> Result<CellValue, EvalError> {
    let start = date_arg(args, 0, env)?;
    let end = date_arg(args, 1, env)?;
    let basis = opt_num_arg(args, 2, env, Decimal::ZERO)?.to_i32().unwrap_or(0);
    let frac = if basis == 0 {
        let (y1, m1, d1) = (start.year(), start.month() as i64, start.day().min(30) as i64);
        let (y2, m2, mut d2) = (end.year(), end.month() as i64, end.day() as i64);
        if d1 == 30 && d2 == 31 {
            d2 = 30;
        }
        let days = (y2 as i64 - y1 as i64) * 360 + (m2 - m1) * 30 + (d2 - d1);
        days as f64 / 360.0
    } else {
        (end - start).num_days() as f64 / 365.0
    };
    Decimal::from_f64_retain(frac).map(CellValue::Number).ok_or_else(|| EvalError::num("YEARFRAC overflow"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::test_workbook::TestSheet;

    fn env<'a>(sheet: &'a TestSheet, clock: &'a FixedClock) -> Environment<'a> {
        Environment::new(sheet, clock)
    }

    #[test]
    fn today_reads_from_injected_clock_not_os_clock() {
        let sheet = TestSheet::new("Sheet1");
        let fixed_date = NaiveDate::from_ymd_opt(2020, 6, 15).unwrap();
        let clock = FixedClock::from_date(fixed_date);
        let e = env(&sheet, &clock);
        let result = today(&[], &e).unwrap();
        assert_eq!(result, CellValue::DateTime(fixed_date.and_hms_opt(0, 0, 0).unwrap()));
    }

    #[test]
    fn networkdays_excludes_weekends() {
        let sheet = TestSheet::new("Sheet1");
        let clock = FixedClock::from_date(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());
        let e = env(&sheet, &clock);
        // Monday 2024-01-01 through Friday 2024-01-05: 5 workdays.
        let args = vec![
            Expr::Date(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()),
            Expr::Date(NaiveDate::from_ymd_opt(2024, 1, 5).unwrap()),
        ];
        assert_eq!(networkdays(&args, &e).unwrap(), CellValue::Number(Decimal::from(5)));
    }

    #[test]
    fn datedif_year_month_day_units() {
        let sheet = TestSheet::new("Sheet1");
        let clock = FixedClock::from_date(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());
        let e = env(&sheet, &clock);
        let args = vec![
            Expr::Date(NaiveDate::from_ymd_opt(2020, 3, 1).unwrap()),
            Expr::Date(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()),
            Expr::Text("Y".into()),
        ];
        assert_eq!(datedif(&args, &e).unwrap(), CellValue::Number(Decimal::from(3)));
    }
}
