use crate::error::{AppError, Result};
use chrono::{NaiveDate, Utc};
use chrono_tz::Tz;

/// Parse a `YYYY-MM-DD` date argument
pub fn parse_date(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
        .map_err(|e| AppError::InvalidInput(format!("invalid date '{}' (expected YYYY-MM-DD): {}", s, e)))
}

/// Current calendar date on the exchange
pub fn today_in(timezone: Tz) -> NaiveDate {
    Utc::now().with_timezone(&timezone).date_naive()
}

/// Parse an inclusive `[from, to]` range, `to` defaulting to today
pub fn parse_range(from: &str, to: Option<&str>, timezone: Tz) -> Result<(NaiveDate, NaiveDate)> {
    let from = parse_date(from)?;
    let to = match to {
        Some(to) => parse_date(to)?,
        None => today_in(timezone),
    };
    if from > to {
        return Err(AppError::InvalidInput(format!(
            "--from {} is after --to {}",
            from, to
        )));
    }
    Ok((from, to))
}

/// Split a comma-separated argument, dropping blanks
pub fn split_list(s: &str) -> Vec<String> {
    s.split(',')
        .map(|part| part.trim().to_string())
        .filter(|part| !part.is_empty())
        .collect()
}
