//! Wrappers for the temporal and geography scalars.
//!
//! Each wrapper holds the canonical string the server accepts for its type,
//! so encoding is a field read and decoding is a constructor call.

use crate::error::{BigQueryError, Result};

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, SecondsFormat, TimeZone, Utc};
use regex::Regex;
use std::fmt;
use std::sync::LazyLock;

static DATE_PREFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{4}-\d{1,2}-\d{1,2}").expect("static pattern"));
static EXTENDED_FRACTION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\.\d{10,}").expect("static pattern"));
static ZULU_DATETIME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(.*)T(.*)Z$").expect("static pattern"));

/// Calendar date, `YYYY-MM-DD`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct BigQueryDate {
    value: String,
}

impl BigQueryDate {
    pub fn new(value: impl Into<String>) -> Self {
        Self { value: value.into() }
    }

    /// Builds `year-month-day` without zero padding.
    pub fn from_parts(year: i32, month: u32, day: u32) -> Self {
        Self { value: format!("{year}-{month}-{day}") }
    }

    pub fn value(&self) -> &str {
        &self.value
    }
}

impl From<NaiveDate> for BigQueryDate {
    fn from(date: NaiveDate) -> Self {
        Self { value: date.format("%Y-%m-%d").to_string() }
    }
}

/// Time of day. Minutes and seconds default to zero.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TimeParts {
    pub hours: u32,
    pub minutes: u32,
    pub seconds: u32,
    pub fractional: Option<String>,
}

/// Civil time of day, `HH:MM:SS[.FFFFFF]`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct BigQueryTime {
    value: String,
}

impl BigQueryTime {
    pub fn new(value: impl Into<String>) -> Self {
        Self { value: value.into() }
    }

    /// Builds `h:m:s[.f]` without zero padding.
    pub fn from_parts(parts: &TimeParts) -> Self {
        let fractional = parts.fractional.as_ref().map(|f| format!(".{f}")).unwrap_or_default();
        Self { value: format!("{}:{}:{}{fractional}", parts.hours, parts.minutes, parts.seconds) }
    }

    pub fn value(&self) -> &str {
        &self.value
    }
}

impl From<NaiveTime> for BigQueryTime {
    fn from(time: NaiveTime) -> Self {
        Self { value: time.format("%H:%M:%S%.f").to_string() }
    }
}

/// Civil date and time, `YYYY-MM-DD[ HH:MM:SS[.FFFFFF]]`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct BigQueryDatetime {
    value: String,
}

impl BigQueryDatetime {
    /// Wraps a datetime string. A trailing-`Z` ISO string such as
    /// `2017-01-01T14:00:00Z` is rewritten to `2017-01-01 14:00:00`.
    pub fn new(value: impl AsRef<str>) -> Self {
        Self { value: ZULU_DATETIME.replace(value.as_ref(), "$1 $2").into_owned() }
    }

    pub fn from_parts(year: i32, month: u32, day: u32, time: Option<&TimeParts>) -> Self {
        let value = match time {
            Some(parts) => format!(
                "{year}-{month}-{day} {}",
                BigQueryTime::from_parts(parts).value
            ),
            None => format!("{year}-{month}-{day}"),
        };
        Self { value }
    }

    pub fn value(&self) -> &str {
        &self.value
    }
}

impl From<NaiveDateTime> for BigQueryDatetime {
    fn from(datetime: NaiveDateTime) -> Self {
        Self { value: datetime.format("%Y-%m-%d %H:%M:%S%.f").to_string() }
    }
}

/// Absolute point in time, rendered as an ISO-8601 UTC string.
///
/// Millisecond precision is used unless the instant carries sub-millisecond
/// digits, in which case microseconds (or nanoseconds) are kept.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct BigQueryTimestamp {
    value: String,
}

impl BigQueryTimestamp {
    /// Parses a timestamp literal, or epoch seconds when the string is not date-like.
    ///
    /// Strings carrying ten or more fractional digits are kept verbatim
    /// once they are known to parse, since they hold more precision than
    /// the client can represent.
    pub fn parse(value: &str) -> Result<Self> {
        let value = value.trim();
        if DATE_PREFIX.is_match(value) {
            let instant = parse_instant(value)?;
            if EXTENDED_FRACTION.is_match(value) {
                return Ok(Self { value: value.to_string() });
            }
            return Ok(Self::from(instant));
        }

        match value.parse::<f64>() {
            Ok(seconds) if !seconds.is_nan() => Self::from_seconds(seconds),
            _ => parse_instant(value).map(Self::from),
        }
    }

    /// Epoch seconds, rounded to the nearest microsecond.
    pub fn from_seconds(seconds: f64) -> Result<Self> {
        if !seconds.is_finite() {
            return Err(BigQueryError::InvalidArgument(format!(
                "TIMESTAMP seconds must be finite, got {seconds}"
            )));
        }
        let whole = seconds.trunc();
        let micros = ((seconds - whole) * 1e6 + 0.5).trunc();
        let total = whole * 1e6 + micros;
        if total.abs() >= i64::MAX as f64 {
            return Err(out_of_range(seconds));
        }
        Self::from_micros(total as i64)
    }

    /// Epoch microseconds, the default wire encoding.
    pub fn from_micros(micros: i64) -> Result<Self> {
        DateTime::from_timestamp_micros(micros)
            .map(Self::from)
            .ok_or_else(|| out_of_range(micros))
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    /// The instant, truncated to nanoseconds.
    pub fn to_datetime(&self) -> Result<DateTime<Utc>> {
        parse_instant(&self.value)
    }
}

impl<Tz: TimeZone> From<DateTime<Tz>> for BigQueryTimestamp {
    fn from(instant: DateTime<Tz>) -> Self {
        let instant = instant.with_timezone(&Utc);
        let nanos = instant.timestamp_subsec_nanos() % 1_000_000_000;
        let format = if nanos % 1_000 != 0 {
            SecondsFormat::Nanos
        } else if nanos % 1_000_000 != 0 {
            SecondsFormat::Micros
        } else {
            SecondsFormat::Millis
        };
        Self { value: instant.to_rfc3339_opts(format, true) }
    }
}

/// Well-known-text geography value.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Geography {
    value: String,
}

impl Geography {
    pub fn new(value: impl Into<String>) -> Self {
        Self { value: value.into() }
    }

    pub fn value(&self) -> &str {
        &self.value
    }
}

macro_rules! impl_display_value {
    ($($ty:ty),*) => {
        $(
            impl fmt::Display for $ty {
                fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                    f.write_str(&self.value)
                }
            }
        )*
    };
}

impl_display_value!(BigQueryDate, BigQueryDatetime, BigQueryTime, BigQueryTimestamp, Geography);

fn out_of_range(value: impl fmt::Display) -> BigQueryError {
    BigQueryError::InvalidArgument(format!("TIMESTAMP {value} is out of range"))
}

/// Accepts RFC 3339, the server's `YYYY-MM-DD HH:MM:SS[.F][+zz]` form and bare dates.
fn parse_instant(value: &str) -> Result<DateTime<Utc>> {
    if let Ok(instant) = DateTime::parse_from_rfc3339(value) {
        return Ok(instant.with_timezone(&Utc));
    }

    let normalised = value.replacen(' ', "T", 1);
    let normalised = normalised.trim_end_matches(" UTC");
    if let Ok(instant) = DateTime::parse_from_rfc3339(normalised) {
        return Ok(instant.with_timezone(&Utc));
    }
    if let Ok(instant) = DateTime::parse_from_str(normalised, "%Y-%m-%dT%H:%M:%S%.f%#z") {
        return Ok(instant.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(normalised, format) {
            return Ok(naive.and_utc());
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        return Ok(date.and_time(NaiveTime::MIN).and_utc());
    }

    Err(BigQueryError::InvalidArgument(format!(
        "Invalid TIMESTAMP value: \"{value}\""
    )))
}
