//! Typed values exchanged with the query engine.
//!
//! [`Value`] is the single tagged union used in both directions: query
//! parameters are built from it and decoded rows are made of it. Native Rust
//! values are converted through the [`ToValue`] trait.

mod integer;
mod range;
mod temporal;

pub use self::integer::{BigQueryInt, IntegerCastFn, IntegerTypeCast, decode_integer_value};
pub use self::range::{BigQueryRange, RangeBound};
pub use self::temporal::{
    BigQueryDate, BigQueryDatetime, BigQueryTime, BigQueryTimestamp, Geography, TimeParts,
};

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use bigdecimal::BigDecimal;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, TimeZone};

/// Largest integer a double can hold exactly, `2^53 - 1`.
pub const MAX_SAFE_INTEGER: i64 = 9_007_199_254_740_991;

/// A query parameter or result cell.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int64(i64),
    Float64(f64),
    Numeric(BigDecimal),
    String(String),
    Bytes(Vec<u8>),
    Json(serde_json::Value),
    Date(BigQueryDate),
    Datetime(BigQueryDatetime),
    Time(BigQueryTime),
    Timestamp(BigQueryTimestamp),
    Geography(Geography),
    Int(BigQueryInt),
    Range(BigQueryRange),
    Array(Vec<Value>),
    Struct(Vec<(String, Value)>),
}

impl Value {
    pub fn bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Value::Bytes(bytes.into())
    }

    /// Builds a STRUCT, keeping member order.
    pub fn structure<K, V, I>(fields: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: ToValue,
    {
        Value::Struct(
            fields.into_iter().map(|(name, value)| (name.into(), value.to_value())).collect(),
        )
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Member of a STRUCT by name.
    pub fn get(&self, name: &str) -> Option<&Value> {
        match self {
            Value::Struct(fields) => fields.iter().find(|(k, _)| k == name).map(|(_, v)| v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int64(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(values) => Some(values),
            _ => None,
        }
    }

    /// Streaming-insert JSON form: bytes as base64, decimals and wrappers
    /// as their canonical strings, composites recursively.
    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::Value as Json;

        match self {
            Value::Null => Json::Null,
            Value::Bool(b) => Json::Bool(*b),
            Value::Int64(i) => Json::from(*i),
            Value::Float64(f) => serde_json::Number::from_f64(*f)
                .map(Json::Number)
                .unwrap_or_else(|| Json::String(non_finite(*f).to_string())),
            Value::Numeric(n) => Json::String(n.to_plain_string()),
            Value::String(s) => Json::String(s.clone()),
            Value::Bytes(b) => Json::String(BASE64.encode(b)),
            Value::Json(j) => j.clone(),
            Value::Date(d) => Json::String(d.value().to_string()),
            Value::Datetime(d) => Json::String(d.value().to_string()),
            Value::Time(t) => Json::String(t.value().to_string()),
            Value::Timestamp(t) => Json::String(t.value().to_string()),
            Value::Geography(g) => Json::String(g.value().to_string()),
            Value::Int(i) => Json::String(i.value().to_string()),
            Value::Range(r) => Json::String(r.api_value()),
            Value::Array(values) => Json::Array(values.iter().map(Value::to_json).collect()),
            Value::Struct(fields) => Json::Object(
                fields.iter().map(|(name, value)| (name.clone(), value.to_json())).collect(),
            ),
        }
    }
}

fn non_finite(f: f64) -> &'static str {
    if f.is_nan() {
        "NaN"
    } else if f.is_sign_positive() {
        "Infinity"
    } else {
        "-Infinity"
    }
}

/// A trait for converting native Rust values into a [`Value`].
///
/// # Examples
///
/// ```rust
/// use bigquery::{ToValue, Value};
///
/// assert_eq!(42i32.to_value(), Value::Int64(42));
/// assert_eq!("hello".to_value(), Value::String("hello".into()));
/// assert_eq!(None::<i64>.to_value(), Value::Null);
/// ```
///
/// Used by [`SqlQueryBuilder::bind`](crate::query::SqlQueryBuilder::bind)
/// and [`QueryParams`](crate::codec::QueryParams) to build query parameters.
pub trait ToValue {
    fn to_value(self) -> Value;
}

/// Macro to implement ToValue for a type mapping to a Value variant.
macro_rules! impl_to_value {
    ($ty:ty => $variant:ident) => {
        impl ToValue for $ty {
            fn to_value(self) -> Value {
                Value::$variant(self.into())
            }
        }
    };
}

// Primitives
impl_to_value!(i8 => Int64);
impl_to_value!(i16 => Int64);
impl_to_value!(i32 => Int64);
impl_to_value!(i64 => Int64);
impl_to_value!(u16 => Int64);
impl_to_value!(u32 => Int64);
impl_to_value!(f32 => Float64);
impl_to_value!(f64 => Float64);
impl_to_value!(bool => Bool);
impl_to_value!(String => String);
impl_to_value!(&str => String);
impl_to_value!(&[u8] => Bytes);

// Wrapped scalars
impl_to_value!(BigDecimal => Numeric);
impl_to_value!(serde_json::Value => Json);
impl_to_value!(BigQueryDate => Date);
impl_to_value!(BigQueryDatetime => Datetime);
impl_to_value!(BigQueryTime => Time);
impl_to_value!(BigQueryTimestamp => Timestamp);
impl_to_value!(Geography => Geography);
impl_to_value!(BigQueryInt => Int);
impl_to_value!(BigQueryRange => Range);

// chrono
impl_to_value!(NaiveDate => Date);
impl_to_value!(NaiveDateTime => Datetime);
impl_to_value!(NaiveTime => Time);

impl<Tz: TimeZone> ToValue for DateTime<Tz> {
    fn to_value(self) -> Value {
        Value::Timestamp(self.into())
    }
}

impl ToValue for Value {
    fn to_value(self) -> Value {
        self
    }
}

impl<T: ToValue> ToValue for Option<T> {
    fn to_value(self) -> Value {
        self.map_or(Value::Null, ToValue::to_value)
    }
}

impl<T: ToValue> ToValue for Vec<T> {
    fn to_value(self) -> Value {
        Value::Array(self.into_iter().map(ToValue::to_value).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::str::FromStr;

    #[test]
    fn native_values_convert() {
        assert_eq!(7u32.to_value(), Value::Int64(7));
        assert_eq!(1.5f64.to_value(), Value::Float64(1.5));
        assert_eq!(true.to_value(), Value::Bool(true));
        assert_eq!(b"ab".as_slice().to_value(), Value::Bytes(vec![b'a', b'b']));
        assert_eq!(
            vec![Some(1), None].to_value(),
            Value::Array(vec![Value::Int64(1), Value::Null])
        );
    }

    #[test]
    fn chrono_values_normalise_to_wrappers() {
        let date = NaiveDate::from_ymd_opt(2024, 4, 8).unwrap();
        assert_eq!(date.to_value(), Value::Date(BigQueryDate::new("2024-04-08")));

        let instant = Utc.with_ymd_and_hms(2024, 4, 8, 20, 58, 24).unwrap();
        match instant.to_value() {
            Value::Timestamp(ts) => assert_eq!(ts.value(), "2024-04-08T20:58:24.000Z"),
            other => panic!("expected a TIMESTAMP, got {other:?}"),
        }
    }

    #[test]
    fn struct_members_keep_order() {
        let value = Value::structure([("b", 1), ("a", 2)]);

        assert_eq!(value.get("a"), Some(&Value::Int64(2)));
        match &value {
            Value::Struct(fields) => assert_eq!(fields[0].0, "b"),
            _ => unreachable!(),
        }
    }

    #[test]
    fn to_json_encodes_for_streaming_insert() {
        // Arrange
        let row = Value::structure([
            ("name", Value::String("Alice".into())),
            ("photo", Value::bytes(b"hi".to_vec())),
            ("balance", Value::Numeric(BigDecimal::from_str("1.50").unwrap())),
            ("born", Value::Date(BigQueryDate::new("1990-01-01"))),
            ("id", Value::Int(BigQueryInt::new("9007199254740993"))),
            ("tags", Value::Array(vec![Value::String("x".into())])),
        ]);

        // Act
        let json = row.to_json();

        // Assert
        assert_eq!(
            json,
            serde_json::json!({
                "name": "Alice",
                "photo": "aGk=",
                "balance": "1.50",
                "born": "1990-01-01",
                "id": "9007199254740993",
                "tags": ["x"]
            })
        );
    }

    #[test]
    fn non_finite_floats_become_strings() {
        assert_eq!(Value::Float64(f64::NAN).to_json(), serde_json::json!("NaN"));
        assert_eq!(Value::Float64(f64::INFINITY).to_json(), serde_json::json!("Infinity"));
    }
}
