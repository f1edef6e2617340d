use std::convert::TryFrom;

use anyhow::{anyhow, bail, Context, Result};
use chrono::{DateTime, NaiveDateTime, Utc};
use rusqlite::types::Value;

pub fn to_i64(value: u64) -> Result<i64> {
    i64::try_from(value).map_err(|_| anyhow!("value {value} exceeds SQLite INTEGER range"))
}

/// Accepts RFC 3339 as well as SQLite's `CURRENT_TIMESTAMP` layout (read as UTC).
pub fn parse_datetime(value: &str, field: &str) -> Result<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Ok(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S%.f")
        .map(|naive| naive.and_utc())
        .with_context(|| format!("failed to parse {field} '{value}'"))
}

/// Coerce a loosely typed column into a non-negative counter.
///
/// Integers, integral reals and numeric text are accepted.
pub fn coerce_count(value: &Value) -> Result<u32> {
    let wide: i64 = match value {
        Value::Integer(n) => *n,
        Value::Real(f) if f.fract() == 0.0 && f.is_finite() => *f as i64,
        Value::Real(f) => bail!("is not an integer ({f})"),
        Value::Text(text) => {
            let trimmed = text.trim();
            match trimmed.parse::<i64>() {
                Ok(n) => n,
                Err(_) => match trimmed.parse::<f64>() {
                    Ok(f) if f.fract() == 0.0 && f.is_finite() => f as i64,
                    _ => bail!("is not numeric ({text:?})"),
                },
            }
        }
        Value::Null => bail!("is missing"),
        Value::Blob(_) => bail!("is a blob"),
    };

    u32::try_from(wide).map_err(|_| anyhow!("is out of range ({wide})"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_accept_numeric_text_and_integral_reals() {
        assert_eq!(coerce_count(&Value::Integer(14)).unwrap(), 14);
        assert_eq!(coerce_count(&Value::Text(" 18 ".into())).unwrap(), 18);
        assert_eq!(coerce_count(&Value::Text("20.0".into())).unwrap(), 20);
        assert_eq!(coerce_count(&Value::Real(12.0)).unwrap(), 12);
    }

    #[test]
    fn counts_reject_garbage() {
        assert!(coerce_count(&Value::Text("abc".into())).is_err());
        assert!(coerce_count(&Value::Real(12.5)).is_err());
        assert!(coerce_count(&Value::Integer(-1)).is_err());
        assert!(coerce_count(&Value::Null).is_err());
    }

    #[test]
    fn datetimes_accept_both_layouts() {
        let a = parse_datetime("2025-03-10T08:15:00+00:00", "timestamp").unwrap();
        let b = parse_datetime("2025-03-10 08:15:00", "timestamp").unwrap();
        assert_eq!(a, b);
        assert!(parse_datetime("yesterday", "timestamp").is_err());
    }
}
