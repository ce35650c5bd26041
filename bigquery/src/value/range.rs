use super::temporal::{BigQueryDate, BigQueryDatetime, BigQueryTimestamp};
use crate::error::{BigQueryError, Result};
use crate::types::ScalarTag;
use crate::wire::{QueryParameterValue, RangeValue};

use std::fmt;

const UNBOUNDED: &str = "UNBOUNDED";

/// One endpoint of a RANGE.
#[derive(Clone, Debug, PartialEq)]
pub enum RangeBound {
    Date(BigQueryDate),
    Datetime(BigQueryDatetime),
    Timestamp(BigQueryTimestamp),
}

impl RangeBound {
    pub fn element_type(&self) -> ScalarTag {
        match self {
            RangeBound::Date(_) => ScalarTag::Date,
            RangeBound::Datetime(_) => ScalarTag::Datetime,
            RangeBound::Timestamp(_) => ScalarTag::Timestamp,
        }
    }

    pub fn value(&self) -> &str {
        match self {
            RangeBound::Date(date) => date.value(),
            RangeBound::Datetime(datetime) => datetime.value(),
            RangeBound::Timestamp(timestamp) => timestamp.value(),
        }
    }

    /// Parses one literal bound. `UNBOUNDED` and `NULL` give `None`.
    fn parse(raw: &str, element_type: ScalarTag) -> Result<Option<Self>> {
        if raw == UNBOUNDED || raw == "NULL" {
            return Ok(None);
        }
        let bound = match element_type {
            ScalarTag::Date => RangeBound::Date(BigQueryDate::new(raw)),
            ScalarTag::Datetime => RangeBound::Datetime(BigQueryDatetime::new(raw)),
            ScalarTag::Timestamp => RangeBound::Timestamp(BigQueryTimestamp::parse(raw)?),
            other => return Err(unsupported_element(other)),
        };
        Ok(Some(bound))
    }

    /// Like [`parse`](Self::parse), but TIMESTAMP bounds arrive as epoch
    /// microseconds in query results.
    fn from_schema_value(raw: &str, element_type: ScalarTag) -> Result<Option<Self>> {
        match (element_type, raw.parse::<i64>()) {
            (ScalarTag::Timestamp, Ok(micros)) => Ok(Some(RangeBound::Timestamp(
                BigQueryTimestamp::from_micros(micros)?,
            ))),
            _ => Self::parse(raw, element_type),
        }
    }
}

impl From<BigQueryDate> for RangeBound {
    fn from(date: BigQueryDate) -> Self {
        RangeBound::Date(date)
    }
}

impl From<BigQueryDatetime> for RangeBound {
    fn from(datetime: BigQueryDatetime) -> Self {
        RangeBound::Datetime(datetime)
    }
}

impl From<BigQueryTimestamp> for RangeBound {
    fn from(timestamp: BigQueryTimestamp) -> Self {
        RangeBound::Timestamp(timestamp)
    }
}

/// A half-open interval `[start, end)` over DATE, DATETIME or TIMESTAMP.
///
/// A missing bound is unbounded on that side.
///
/// ```
/// use bigquery::{BigQueryRange, ScalarTag};
///
/// let range = BigQueryRange::parse("[2020-01-01, UNBOUNDED)", Some(ScalarTag::Date)).unwrap();
///
/// assert_eq!(range.api_value(), "[2020-01-01, UNBOUNDED)");
/// assert_eq!(range.literal_value(), "RANGE<DATE> [2020-01-01, UNBOUNDED)");
/// ```
#[derive(Clone, Debug, PartialEq)]
pub struct BigQueryRange {
    element_type: ScalarTag,
    start: Option<RangeBound>,
    end: Option<RangeBound>,
}

impl BigQueryRange {
    /// Parses a RANGE literal such as `[2020-01-01, 2020-12-31)`.
    pub fn parse(literal: &str, element_type: Option<ScalarTag>) -> Result<Self> {
        let element_type = element_type.ok_or_else(|| {
            BigQueryError::InvalidRange(
                "invalid RANGE. Element type required when using RANGE API string.".into(),
            )
        })?;
        check_element_type(element_type)?;

        let (start, end) = split_literal(literal)?;
        Ok(Self {
            element_type,
            start: RangeBound::parse(start, element_type)?,
            end: RangeBound::parse(end, element_type)?,
        })
    }

    /// Builds a range from typed bounds; the element type comes from the
    /// bounds when present and from `element_type` otherwise.
    pub fn from_bounds(
        start: Option<RangeBound>,
        end: Option<RangeBound>,
        element_type: Option<ScalarTag>,
    ) -> Result<Self> {
        if let (Some(start), Some(end)) = (&start, &end) {
            if start.element_type() != end.element_type() {
                return Err(BigQueryError::InvalidRange(
                    "upper and lower bound on a RANGE should be of the same type.".into(),
                ));
            }
        }
        let element_type = start
            .as_ref()
            .or(end.as_ref())
            .map(RangeBound::element_type)
            .or(element_type)
            .ok_or_else(|| {
                BigQueryError::InvalidRange(
                    "invalid RANGE. Element type required for an unbounded RANGE.".into(),
                )
            })?;
        check_element_type(element_type)?;

        Ok(Self { element_type, start, end })
    }

    /// Decodes a RANGE cell from a query result.
    pub fn from_schema_value(value: &str, element_type: ScalarTag) -> Result<Self> {
        check_element_type(element_type)?;
        let (start, end) = split_literal(value)?;
        Self::from_bounds(
            RangeBound::from_schema_value(start, element_type)?,
            RangeBound::from_schema_value(end, element_type)?,
            Some(element_type),
        )
    }

    pub fn element_type(&self) -> ScalarTag {
        self.element_type
    }

    pub fn start(&self) -> Option<&RangeBound> {
        self.start.as_ref()
    }

    pub fn end(&self) -> Option<&RangeBound> {
        self.end.as_ref()
    }

    /// `[start, end)` with `UNBOUNDED` for missing bounds.
    pub fn api_value(&self) -> String {
        let (start, end) = self.bound_values();
        format!("[{start}, {end})")
    }

    /// `RANGE<T> [start, end)`.
    pub fn literal_value(&self) -> String {
        format!("RANGE<{}> {}", self.element_type, self.api_value())
    }

    /// The `rangeValue` of a query parameter.
    pub fn wire_value(&self) -> RangeValue {
        let (start, end) = self.bound_values();
        RangeValue {
            start: Some(Box::new(QueryParameterValue::scalar(start))),
            end: Some(Box::new(QueryParameterValue::scalar(end))),
        }
    }

    fn bound_values(&self) -> (&str, &str) {
        (
            self.start.as_ref().map_or(UNBOUNDED, RangeBound::value),
            self.end.as_ref().map_or(UNBOUNDED, RangeBound::value),
        )
    }
}

impl fmt::Display for BigQueryRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.literal_value())
    }
}

fn split_literal(literal: &str) -> Result<(&str, &str)> {
    let mut cleaned = literal;
    if let Some(rest) = cleaned.strip_prefix('[').or_else(|| cleaned.strip_prefix('(')) {
        cleaned = rest;
    }
    if let Some(rest) = cleaned.strip_suffix(')').or_else(|| cleaned.strip_suffix(']')) {
        cleaned = rest;
    }

    let parts: Vec<&str> = cleaned.split(',').collect();
    match parts.as_slice() {
        [start, end] => Ok((start.trim(), end.trim())),
        _ => Err(BigQueryError::InvalidRange(
            "invalid RANGE. See RANGE literal format docs for more information.".into(),
        )),
    }
}

fn check_element_type(element_type: ScalarTag) -> Result<()> {
    match element_type {
        ScalarTag::Date | ScalarTag::Datetime | ScalarTag::Timestamp => Ok(()),
        other => Err(unsupported_element(other)),
    }
}

fn unsupported_element(element_type: ScalarTag) -> BigQueryError {
    BigQueryError::InvalidRange(format!(
        "invalid RANGE. Unsupported element type {element_type}; expected DATE, DATETIME or TIMESTAMP."
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literal_round_trip() {
        // Arrange
        let literal = "[2020-01-01, 2020-12-31)";

        // Act
        let range = BigQueryRange::parse(literal, Some(ScalarTag::Date)).unwrap();

        // Assert
        assert_eq!(range.api_value(), literal);
        assert_eq!(range.literal_value(), "RANGE<DATE> [2020-01-01, 2020-12-31)");
        assert_eq!(range.to_string(), range.literal_value());
    }

    #[test]
    fn unbounded_and_null_are_absent() {
        let range = BigQueryRange::parse("(NULL, UNBOUNDED]", Some(ScalarTag::Datetime)).unwrap();

        assert!(range.start().is_none());
        assert!(range.end().is_none());
        assert_eq!(range.api_value(), "[UNBOUNDED, UNBOUNDED)");
    }

    #[test]
    fn literal_requires_element_type() {
        let err = BigQueryRange::parse("[2020-01-01, 2020-12-31)", None).unwrap_err();
        assert!(err.to_string().contains("Element type required"));
    }

    #[test]
    fn malformed_literal_is_rejected() {
        for literal in ["[2020-01-01)", "[a, b, c)", ""] {
            let err = BigQueryRange::parse(literal, Some(ScalarTag::Date)).unwrap_err();
            assert!(
                err.to_string().contains("RANGE literal format"),
                "unexpected error for {literal:?}: {err}"
            );
        }
    }

    #[test]
    fn unsupported_element_type_is_rejected() {
        let err = BigQueryRange::parse("[1, 2)", Some(ScalarTag::Int64)).unwrap_err();
        assert!(matches!(err, BigQueryError::InvalidRange(_)));
    }

    #[test]
    fn bounds_infer_element_type() {
        let range = BigQueryRange::from_bounds(
            None,
            Some(BigQueryDatetime::new("2020-01-01 00:00:00").into()),
            None,
        )
        .unwrap();

        assert_eq!(range.element_type(), ScalarTag::Datetime);
        assert_eq!(range.api_value(), "[UNBOUNDED, 2020-01-01 00:00:00)");
    }

    #[test]
    fn unbounded_range_falls_back_to_hint() {
        let range = BigQueryRange::from_bounds(None, None, Some(ScalarTag::Timestamp)).unwrap();
        assert_eq!(range.literal_value(), "RANGE<TIMESTAMP> [UNBOUNDED, UNBOUNDED)");

        assert!(BigQueryRange::from_bounds(None, None, None).is_err());
    }

    #[test]
    fn mismatched_bounds_fail() {
        let err = BigQueryRange::from_bounds(
            Some(BigQueryDate::new("2020-01-01").into()),
            Some(BigQueryTimestamp::from_seconds(0.0).unwrap().into()),
            None,
        )
        .unwrap_err();

        assert!(err.to_string().contains("should be of the same type"));
    }

    #[test]
    fn wire_value_marks_unbounded() {
        let range = BigQueryRange::parse("[2020-01-01, UNBOUNDED)", Some(ScalarTag::Date)).unwrap();

        let wire = serde_json::to_value(range.wire_value()).unwrap();

        assert_eq!(
            wire,
            serde_json::json!({
                "start": { "value": "2020-01-01" },
                "end": { "value": "UNBOUNDED" }
            })
        );
    }

    #[test]
    fn schema_value_decodes_micro_timestamps() {
        let range =
            BigQueryRange::from_schema_value("[1672574400123456, UNBOUNDED)", ScalarTag::Timestamp)
                .unwrap();

        assert_eq!(range.api_value(), "[2023-01-01T12:00:00.123456Z, UNBOUNDED)");
    }
}
