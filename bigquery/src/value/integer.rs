use super::{MAX_SAFE_INTEGER, Value};
use crate::error::{BigQueryError, Result};

use std::error::Error;
use std::fmt;
use std::sync::Arc;

/// Signature of a caller-supplied integer conversion.
pub type IntegerCastFn =
    dyn Fn(&str) -> std::result::Result<Value, Box<dyn Error + Send + Sync>> + Send + Sync;

/// A custom conversion for INT64 cells, optionally limited to some fields.
///
/// ```
/// use bigquery::{IntegerTypeCast, Value};
///
/// let cast = IntegerTypeCast::new(|raw| Ok(Value::String(format!("#{raw}"))))
///     .with_fields(["user_id"]);
///
/// assert!(cast.applies_to(Some("user_id")));
/// assert!(!cast.applies_to(Some("age")));
/// ```
#[derive(Clone)]
pub struct IntegerTypeCast {
    function: Arc<IntegerCastFn>,
    fields: Option<Vec<String>>,
}

impl IntegerTypeCast {
    pub fn new<F>(function: F) -> Self
    where
        F: Fn(&str) -> std::result::Result<Value, Box<dyn Error + Send + Sync>>
            + Send
            + Sync
            + 'static,
    {
        Self { function: Arc::new(function), fields: None }
    }

    /// Restricts the conversion to the named schema fields.
    pub fn with_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fields = Some(fields.into_iter().map(Into::into).collect());
        self
    }

    pub fn fields(&self) -> Option<&[String]> {
        self.fields.as_deref()
    }

    /// Without a field list the cast applies everywhere; with one, only to
    /// values that carry a listed schema field name.
    pub fn applies_to(&self, field: Option<&str>) -> bool {
        match (&self.fields, field) {
            (None, _) => true,
            (Some(fields), Some(name)) => fields.iter().any(|f| f == name),
            (Some(_), None) => false,
        }
    }

    pub(crate) fn call(&self, raw: &str, field: Option<&str>) -> Result<Value> {
        (self.function)(raw).map_err(|e| BigQueryError::IntegerCast {
            field: field.map(str::to_string),
            message: e.to_string(),
        })
    }
}

impl fmt::Debug for IntegerTypeCast {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IntegerTypeCast")
            .field("fields", &self.fields)
            .finish_non_exhaustive()
    }
}

/// A lossless INT64 holding the raw decimal string from the wire.
///
/// Nothing is converted until [`resolve`](BigQueryInt::resolve) is called.
#[derive(Clone, Debug)]
pub struct BigQueryInt {
    value: String,
    cast: Option<IntegerTypeCast>,
    schema_field_name: Option<String>,
}

impl BigQueryInt {
    pub fn new(value: impl Into<String>) -> Self {
        Self { value: value.into(), cast: None, schema_field_name: None }
    }

    pub fn with_field_name(mut self, name: impl Into<String>) -> Self {
        self.schema_field_name = Some(name.into());
        self
    }

    pub fn with_cast(mut self, cast: IntegerTypeCast) -> Self {
        self.cast = Some(cast);
        self
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn schema_field_name(&self) -> Option<&str> {
        self.schema_field_name.as_deref()
    }

    /// Applies the cast when it covers this field, otherwise converts to
    /// `Value::Int64` within the safe-integer range.
    pub fn resolve(&self) -> Result<Value> {
        let field = self.schema_field_name.as_deref();
        match &self.cast {
            Some(cast) if cast.applies_to(field) => cast.call(&self.value, field),
            _ => decode_integer_value(&self.value, field).map(Value::Int64),
        }
    }
}

impl PartialEq for BigQueryInt {
    fn eq(&self, other: &Self) -> bool {
        self.value == other.value && self.schema_field_name == other.schema_field_name
    }
}

impl fmt::Display for BigQueryInt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.value)
    }
}

impl From<i64> for BigQueryInt {
    fn from(value: i64) -> Self {
        Self::new(value.to_string())
    }
}

/// Parses an INT64 wire string, rejecting values beyond the safe-integer range.
pub fn decode_integer_value(raw: &str, field: Option<&str>) -> Result<i64> {
    let out_of_range = || BigQueryError::IntegerOutOfRange {
        field: field.map(str::to_string),
        value: raw.to_string(),
    };
    let parsed: i128 = raw.trim().parse().map_err(|_| {
        if raw.trim().bytes().all(|b| b.is_ascii_digit() || b == b'-' || b == b'+') {
            out_of_range()
        } else {
            BigQueryError::Decode(format!("invalid INT64 value \"{raw}\""))
        }
    })?;
    if parsed.abs() > i128::from(MAX_SAFE_INTEGER) {
        return Err(out_of_range());
    }
    i64::try_from(parsed).map_err(|_| out_of_range())
}
