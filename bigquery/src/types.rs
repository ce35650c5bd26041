//! Parameter type descriptors.
//!
//! A [`TypeDescriptor`] is the recursive type of a single query parameter,
//! either inferred from a [`Value`](crate::Value) or read from a caller
//! supplied [`TypeHint`]. Both are resolved in [`codec`](crate::codec).

use crate::error::{BigQueryError, Result};
use crate::wire::{QueryParameterStructType, QueryParameterType};

use std::fmt;
use std::str::FromStr;

/// The scalar type tags understood by the query engine.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ScalarTag {
    Bool,
    Bytes,
    Int64,
    Float64,
    Numeric,
    BigNumeric,
    String,
    Date,
    Datetime,
    Time,
    Timestamp,
    Geography,
    Json,
}

impl ScalarTag {
    /// Canonical wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            ScalarTag::Bool => "BOOL",
            ScalarTag::Bytes => "BYTES",
            ScalarTag::Int64 => "INT64",
            ScalarTag::Float64 => "FLOAT64",
            ScalarTag::Numeric => "NUMERIC",
            ScalarTag::BigNumeric => "BIGNUMERIC",
            ScalarTag::String => "STRING",
            ScalarTag::Date => "DATE",
            ScalarTag::Datetime => "DATETIME",
            ScalarTag::Time => "TIME",
            ScalarTag::Timestamp => "TIMESTAMP",
            ScalarTag::Geography => "GEOGRAPHY",
            ScalarTag::Json => "JSON",
        }
    }

    /// Looks up a tag by name, case-insensitively, accepting the standard SQL aliases.
    pub fn from_name(name: &str) -> Option<Self> {
        let tag = match name.trim().to_ascii_uppercase().as_str() {
            "BOOL" | "BOOLEAN" => ScalarTag::Bool,
            "BYTES" => ScalarTag::Bytes,
            "INT64" | "INT" | "INTEGER" | "SMALLINT" | "BIGINT" | "TINYINT" | "BYTEINT" => {
                ScalarTag::Int64
            }
            "FLOAT64" | "FLOAT" => ScalarTag::Float64,
            "NUMERIC" | "DECIMAL" => ScalarTag::Numeric,
            "BIGNUMERIC" | "BIGDECIMAL" => ScalarTag::BigNumeric,
            "STRING" => ScalarTag::String,
            "DATE" => ScalarTag::Date,
            "DATETIME" => ScalarTag::Datetime,
            "TIME" => ScalarTag::Time,
            "TIMESTAMP" => ScalarTag::Timestamp,
            "GEOGRAPHY" => ScalarTag::Geography,
            "JSON" => ScalarTag::Json,
            _ => return None,
        };
        Some(tag)
    }
}

impl fmt::Display for ScalarTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ScalarTag {
    type Err = BigQueryError;

    fn from_str(s: &str) -> Result<Self> {
        ScalarTag::from_name(s).ok_or_else(|| invalid_type_provided(s))
    }
}

/// One named member of a STRUCT descriptor.
#[derive(Clone, Debug, PartialEq)]
pub struct StructFieldType {
    pub name: String,
    pub descriptor: TypeDescriptor,
}

/// Recursive type of a query parameter.
#[derive(Clone, Debug, PartialEq)]
pub enum TypeDescriptor {
    Scalar(ScalarTag),
    Array(Box<TypeDescriptor>),
    Struct(Vec<StructFieldType>),
    Range(ScalarTag),
}

impl TypeDescriptor {
    /// Top level type name as sent on the wire.
    pub fn type_name(&self) -> &'static str {
        match self {
            TypeDescriptor::Scalar(tag) => tag.as_str(),
            TypeDescriptor::Array(_) => "ARRAY",
            TypeDescriptor::Struct(_) => "STRUCT",
            TypeDescriptor::Range(_) => "RANGE",
        }
    }

    pub fn to_wire(&self) -> QueryParameterType {
        let mut wire = QueryParameterType {
            r#type: self.type_name().to_string(),
            ..Default::default()
        };
        match self {
            TypeDescriptor::Scalar(_) => {}
            TypeDescriptor::Array(element) => {
                wire.array_type = Some(Box::new(element.to_wire()));
            }
            TypeDescriptor::Struct(fields) => {
                wire.struct_types = Some(
                    fields
                        .iter()
                        .map(|field| QueryParameterStructType {
                            name: Some(field.name.clone()),
                            r#type: field.descriptor.to_wire(),
                            description: None,
                        })
                        .collect(),
                );
            }
            TypeDescriptor::Range(element) => {
                wire.range_element_type = Some(Box::new(QueryParameterType {
                    r#type: element.as_str().to_string(),
                    ..Default::default()
                }));
            }
        }
        wire
    }
}

/// An explicit parameter type supplied by the caller.
///
/// Names are validated when the hint is resolved, not when it is built:
/// `"INT64"`, `"decimal"`, `"RANGE<DATE>"` and the bare composites `"ARRAY"`,
/// `"STRUCT"` and `"RANGE"` are all accepted. A bare composite only fixes
/// the kind; its inner types are inferred from the value.
#[derive(Clone, Debug, PartialEq)]
pub enum TypeHint {
    Name(String),
    Array(Box<TypeHint>),
    Struct(Vec<(String, TypeHint)>),
}

impl TypeHint {
    pub fn array(element: impl Into<TypeHint>) -> Self {
        TypeHint::Array(Box::new(element.into()))
    }

    pub fn structure<K, T, I>(fields: I) -> Self
    where
        I: IntoIterator<Item = (K, T)>,
        K: Into<String>,
        T: Into<TypeHint>,
    {
        TypeHint::Struct(
            fields.into_iter().map(|(name, hint)| (name.into(), hint.into())).collect(),
        )
    }

    /// Member hint by name, if this is a struct hint.
    pub(crate) fn field(&self, name: &str) -> Option<&TypeHint> {
        match self {
            TypeHint::Struct(fields) => fields
                .iter()
                .find(|(field, _)| field == name)
                .map(|(_, hint)| hint),
            _ => None,
        }
    }
}

impl From<&str> for TypeHint {
    fn from(name: &str) -> Self {
        TypeHint::Name(name.to_string())
    }
}

impl From<String> for TypeHint {
    fn from(name: String) -> Self {
        TypeHint::Name(name)
    }
}

impl From<ScalarTag> for TypeHint {
    fn from(tag: ScalarTag) -> Self {
        TypeHint::Name(tag.as_str().to_string())
    }
}

impl From<&TypeDescriptor> for TypeHint {
    fn from(descriptor: &TypeDescriptor) -> Self {
        match descriptor {
            TypeDescriptor::Scalar(tag) => TypeHint::from(*tag),
            TypeDescriptor::Array(element) => TypeHint::array(&**element),
            TypeDescriptor::Struct(fields) => TypeHint::Struct(
                fields.iter().map(|f| (f.name.clone(), TypeHint::from(&f.descriptor))).collect(),
            ),
            TypeDescriptor::Range(tag) => TypeHint::Name(format!("RANGE<{}>", tag.as_str())),
        }
    }
}

pub(crate) fn invalid_type_provided(name: &str) -> BigQueryError {
    BigQueryError::InvalidType(format!(
        "Invalid type provided: \"{}\"",
        name.trim().to_ascii_uppercase()
    ))
}
