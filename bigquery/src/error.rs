use crate::table::InsertFailure;
use crate::wire::{ErrorProto, JobReference};

use core::fmt;
use std::error::Error;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, BigQueryError>;

/// Different `BigQuery` Error types
#[derive(Debug)]
pub enum BigQueryError {
    /// The server answered with a non-success HTTP status.
    Api { status: u16, message: String },
    /// Both fixed-width integer timestamps and an incompatible output format were requested.
    ConflictingOptions(String),
    Decode(String),
    IntegerCast { field: Option<String>, message: String },
    IntegerOutOfRange { field: Option<String>, value: String },
    InvalidArgument(String),
    InvalidConnectionUrl(String),
    InvalidRange(String),
    InvalidType(String),
    JobFailed { job: JobReference, errors: Vec<ErrorProto> },
    Json(serde_json::Error),
    PartialFailure { failures: Vec<InsertFailure>, inserted: usize },
    QueryTimeout { timeout_ms: u64 },
    Transport(reqwest::Error),
}

impl fmt::Display for BigQueryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BigQueryError::Api { status, message } => write!(f, "API Error ({status}): {message}"),
            BigQueryError::ConflictingOptions(msg) => write!(f, "Conflicting Options: {msg}"),
            BigQueryError::Decode(msg) => write!(f, "Decode Error: {msg}"),
            BigQueryError::IntegerCast { field, message } => match field {
                Some(field) => write!(
                    f,
                    "integerTypeCastFunction threw an error for field '{field}':\n\n  - {message}"
                ),
                None => write!(f, "integerTypeCastFunction threw an error:\n\n  - {message}"),
            },
            BigQueryError::IntegerOutOfRange { field, value } => {
                write!(f, "We attempted to return all of the numeric values, but ")?;
                if let Some(field) = field {
                    write!(f, "{field} ")?;
                }
                write!(
                    f,
                    "value {value} is out of bounds of the safe integer range (+/-{}).\n\
                     To prevent this error, decode with `IntegerWrapping::Cast`, providing an \
                     integer type cast function and optionally the field name(s) to be custom cast.",
                    crate::value::MAX_SAFE_INTEGER
                )
            }
            BigQueryError::InvalidArgument(msg) => write!(f, "Invalid Argument: {msg}"),
            BigQueryError::InvalidConnectionUrl(msg) => write!(f, "Invalid Connection URL: {msg}"),
            BigQueryError::InvalidRange(msg) => write!(f, "Invalid RANGE: {msg}"),
            BigQueryError::InvalidType(msg) => write!(f, "Invalid Type: {msg}"),
            BigQueryError::JobFailed { job, errors } => {
                write!(f, "Job {} failed", job.job_id)?;
                if let Some(first) = errors.first() {
                    write!(f, ": {}", first.message.as_deref().unwrap_or("unknown error"))?;
                }
                if errors.len() > 1 {
                    write!(f, " (and {} more error(s))", errors.len() - 1)?;
                }
                Ok(())
            }
            BigQueryError::Json(e) => write!(f, "JSON Error: {e}"),
            BigQueryError::PartialFailure { failures, inserted } => write!(
                f,
                "Partial Failure: {} row(s) failed to insert, {inserted} row(s) inserted",
                failures.len()
            ),
            BigQueryError::QueryTimeout { timeout_ms } => {
                write!(f, "The query did not complete before {timeout_ms}ms")
            }
            BigQueryError::Transport(e) => write!(f, "Transport Error: {e}"),
        }
    }
}

impl Error for BigQueryError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Json(source) => Some(source),
            Self::Transport(source) => Some(source),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for BigQueryError {
    fn from(error: serde_json::Error) -> Self {
        BigQueryError::Json(error)
    }
}

impl From<reqwest::Error> for BigQueryError {
    fn from(error: reqwest::Error) -> Self {
        BigQueryError::Transport(error)
    }
}

impl From<url::ParseError> for BigQueryError {
    fn from(error: url::ParseError) -> Self {
        BigQueryError::InvalidConnectionUrl(error.to_string())
    }
}

impl From<base64::DecodeError> for BigQueryError {
    fn from(error: base64::DecodeError) -> Self {
        BigQueryError::Decode(format!("invalid base64 BYTES value: {error}"))
    }
}

impl From<bigdecimal::ParseBigDecimalError> for BigQueryError {
    fn from(error: bigdecimal::ParseBigDecimalError) -> Self {
        BigQueryError::Decode(format!("invalid NUMERIC value: {error}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_formats_correctly() {
        let cases: Vec<(BigQueryError, &str)> = vec![
            (
                BigQueryError::IntegerOutOfRange {
                    field: Some("fave_number".into()),
                    value: "9007199254740993".into(),
                },
                "fave_number value 9007199254740993 is out of bounds",
            ),
            (
                BigQueryError::IntegerCast { field: None, message: "boom".into() },
                "integerTypeCastFunction threw an error",
            ),
            (BigQueryError::QueryTimeout { timeout_ms: 500 }, "did not complete before 500ms"),
            (BigQueryError::InvalidRange("bad".into()), "Invalid RANGE"),
            (
                BigQueryError::JobFailed {
                    job: JobReference {
                        project_id: "p".into(),
                        job_id: "job-1".into(),
                        location: None,
                    },
                    errors: vec![ErrorProto {
                        message: Some("Syntax error".into()),
                        ..Default::default()
                    }],
                },
                "Job job-1 failed: Syntax error",
            ),
        ];

        for (error, expect) in cases {
            let text = error.to_string();
            assert!(
                text.contains(expect),
                "Expected `{}` in `{}`",
                expect,
                text
            );
        }
    }

    #[test]
    fn out_of_range_suggests_cast_strategy() {
        let error = BigQueryError::IntegerOutOfRange { field: None, value: "1".into() };
        assert!(error.to_string().contains("IntegerWrapping::Cast"));
    }

    #[test]
    fn error_from_json() {
        let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let error: BigQueryError = json_err.into();

        assert!(matches!(error, BigQueryError::Json(_)));
        assert!(error.source().is_some());
    }
}
