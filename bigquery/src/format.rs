//! Output format negotiation for TIMESTAMP cells.
//!
//! The options sent with a request decide how the server renders TIMESTAMP
//! values, so the same options must drive decoding of the response.

use crate::error::{BigQueryError, Result};
use crate::value::BigQueryTimestamp;

use serde::{Deserialize, Serialize};

/// Server-side rendering of TIMESTAMP values.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TimestampOutputFormat {
    TimestampOutputFormatUnspecified,
    Float64,
    Int64,
    #[serde(rename = "ISO8601_STRING")]
    Iso8601String,
}

/// The `formatOptions` of a query or list request.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormatOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub use_int64_timestamp: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp_output_format: Option<TimestampOutputFormat>,
}

impl Default for FormatOptions {
    /// Lossless microsecond integers.
    fn default() -> Self {
        Self { use_int64_timestamp: Some(true), timestamp_output_format: None }
    }
}

/// Wire encoding of a TIMESTAMP cell under some [`FormatOptions`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TimestampEncoding {
    /// `2023-01-01T12:00:00.123456Z`
    IsoString,
    /// `1672574400.123456`
    FloatSeconds,
    /// `1672574400123456`
    Int64Micros,
}

impl FormatOptions {
    pub fn iso8601() -> Self {
        Self {
            use_int64_timestamp: None,
            timestamp_output_format: Some(TimestampOutputFormat::Iso8601String),
        }
    }

    /// Rejects integer timestamps combined with a non-integer output format.
    pub fn validate(&self) -> Result<()> {
        match (self.use_int64_timestamp, self.timestamp_output_format) {
            (Some(true), Some(format @ (TimestampOutputFormat::Float64
                | TimestampOutputFormat::Iso8601String))) => {
                Err(BigQueryError::ConflictingOptions(format!(
                    "Cannot specify both useInt64Timestamp and timestampOutputFormat {format:?}."
                )))
            }
            _ => Ok(()),
        }
    }

    pub fn timestamp_encoding(&self) -> TimestampEncoding {
        match (self.timestamp_output_format, self.use_int64_timestamp) {
            (Some(TimestampOutputFormat::Iso8601String), _) => TimestampEncoding::IsoString,
            (Some(TimestampOutputFormat::Float64), _) => TimestampEncoding::FloatSeconds,
            (Some(TimestampOutputFormat::Int64), _) => TimestampEncoding::Int64Micros,
            (_, Some(false)) => TimestampEncoding::FloatSeconds,
            _ => TimestampEncoding::Int64Micros,
        }
    }

    /// Query-string form for list endpoints.
    pub(crate) fn to_query_pairs(self) -> Vec<(String, String)> {
        let mut pairs = Vec::new();
        if let Some(int64) = self.use_int64_timestamp {
            pairs.push(("formatOptions.useInt64Timestamp".to_string(), int64.to_string()));
        }
        if let Some(format) = self.timestamp_output_format {
            let name = match format {
                TimestampOutputFormat::TimestampOutputFormatUnspecified => {
                    "TIMESTAMP_OUTPUT_FORMAT_UNSPECIFIED"
                }
                TimestampOutputFormat::Float64 => "FLOAT64",
                TimestampOutputFormat::Int64 => "INT64",
                TimestampOutputFormat::Iso8601String => "ISO8601_STRING",
            };
            pairs.push(("formatOptions.timestampOutputFormat".to_string(), name.to_string()));
        }
        pairs
    }
}

impl TimestampEncoding {
    pub fn decode(self, raw: &str) -> Result<BigQueryTimestamp> {
        match self {
            TimestampEncoding::IsoString => BigQueryTimestamp::parse(raw),
            TimestampEncoding::FloatSeconds => {
                let seconds: f64 = raw.trim().parse().map_err(|_| {
                    BigQueryError::Decode(format!("invalid float TIMESTAMP \"{raw}\""))
                })?;
                BigQueryTimestamp::from_seconds(seconds)
            }
            TimestampEncoding::Int64Micros => {
                let micros: i64 = raw.trim().parse().map_err(|_| {
                    BigQueryError::Decode(format!("invalid int64 TIMESTAMP \"{raw}\""))
                })?;
                BigQueryTimestamp::from_micros(micros)
            }
        }
    }
}
