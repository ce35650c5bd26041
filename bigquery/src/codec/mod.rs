//! Encoding of [`Value`]s into query parameters.
//!
//! The type of a parameter is resolved first, from the caller's
//! [`TypeHint`] when there is one and from the value otherwise, then a
//! single dispatcher walks value and descriptor together.

mod params;

pub use self::params::{ParamTypes, ParameterMode, QueryParams, build_query_params};

use crate::error::{BigQueryError, Result};
use crate::types::{ScalarTag, StructFieldType, TypeDescriptor, TypeHint, invalid_type_provided};
use crate::value::{BigQueryRange, RangeBound, Value};
use crate::wire::{QueryParameter, QueryParameterValue};

use bigdecimal::BigDecimal;
use std::collections::BTreeMap;

/// Largest scale a NUMERIC can hold.
const NUMERIC_MAX_SCALE: i64 = 9;

/// Infers the parameter type of a value.
///
/// Fails on `Null` and on empty arrays, which carry no type information.
pub fn infer_from_value(value: &Value) -> Result<TypeDescriptor> {
    let tag = match value {
        Value::Null => {
            return Err(BigQueryError::InvalidType(
                "Parameter types must be provided for null values via the 'types' field in query options."
                    .into(),
            ));
        }
        Value::Date(_) => ScalarTag::Date,
        Value::Datetime(_) => ScalarTag::Datetime,
        Value::Time(_) => ScalarTag::Time,
        Value::Timestamp(_) => ScalarTag::Timestamp,
        Value::Geography(_) => ScalarTag::Geography,
        Value::Int(_) => ScalarTag::Int64,
        Value::Range(range) => return Ok(TypeDescriptor::Range(range.element_type())),
        Value::Bytes(_) => ScalarTag::Bytes,
        Value::Numeric(decimal) => numeric_tag(decimal),
        Value::Array(items) => {
            let first = items.first().ok_or_else(|| {
                BigQueryError::InvalidType(
                    "Parameter types must be provided for empty arrays via the 'types' field in query options."
                        .into(),
                )
            })?;
            return Ok(TypeDescriptor::Array(Box::new(infer_from_value(first)?)));
        }
        Value::Bool(_) => ScalarTag::Bool,
        Value::Int64(_) => ScalarTag::Int64,
        Value::Float64(_) => ScalarTag::Float64,
        Value::Struct(fields) => {
            return fields
                .iter()
                .map(|(name, member)| {
                    Ok(StructFieldType {
                        name: name.clone(),
                        descriptor: infer_from_value(member)?,
                    })
                })
                .collect::<Result<Vec<_>>>()
                .map(TypeDescriptor::Struct);
        }
        Value::String(_) => ScalarTag::String,
        Value::Json(_) => ScalarTag::Json,
    };
    Ok(TypeDescriptor::Scalar(tag))
}

/// Reads a complete descriptor from a hint alone.
///
/// Bare `ARRAY`, `STRUCT` and `RANGE` names are rejected here since only a
/// value can complete them; [`resolve_descriptor`] accepts them.
pub fn infer_from_hint(hint: &TypeHint) -> Result<TypeDescriptor> {
    descriptor_from_hint(hint, None)
}

/// The descriptor used to encode `value`: the hint wins when present.
pub fn resolve_descriptor(value: &Value, hint: Option<&TypeHint>) -> Result<TypeDescriptor> {
    match hint {
        Some(hint) => descriptor_from_hint(hint, Some(value)),
        None => infer_from_value(value),
    }
}

fn descriptor_from_hint(hint: &TypeHint, value: Option<&Value>) -> Result<TypeDescriptor> {
    match hint {
        TypeHint::Array(element) => {
            let first = match value {
                Some(Value::Array(items)) => items.first(),
                _ => None,
            };
            Ok(TypeDescriptor::Array(Box::new(descriptor_from_hint(element, first)?)))
        }
        TypeHint::Struct(members) => {
            let mut fields = members
                .iter()
                .map(|(name, member)| {
                    let member_value = value.and_then(|v| v.get(name));
                    Ok(StructFieldType {
                        name: name.clone(),
                        descriptor: descriptor_from_hint(member, member_value)?,
                    })
                })
                .collect::<Result<Vec<_>>>()?;
            // Members present on the value but missing from the hint are inferred.
            if let Some(Value::Struct(values)) = value {
                for (name, member) in values {
                    if hint.field(name).is_none() {
                        fields.push(StructFieldType {
                            name: name.clone(),
                            descriptor: infer_from_value(member)?,
                        });
                    }
                }
            }
            Ok(TypeDescriptor::Struct(fields))
        }
        TypeHint::Name(name) => descriptor_from_name(name, value),
    }
}

fn descriptor_from_name(name: &str, value: Option<&Value>) -> Result<TypeDescriptor> {
    let upper = name.trim().to_ascii_uppercase();

    if let Some(element) = upper.strip_prefix("RANGE<").and_then(|s| s.strip_suffix('>')) {
        let tag = ScalarTag::from_name(element).ok_or_else(|| invalid_type_provided(name))?;
        return Ok(TypeDescriptor::Range(tag));
    }

    match upper.as_str() {
        "ARRAY" | "STRUCT" | "RANGE" => {
            let value = value.ok_or_else(|| {
                BigQueryError::InvalidType(format!(
                    "Type {upper} needs its inner types spelled out when no value is supplied"
                ))
            })?;
            let inferred = infer_from_value(value)?;
            if inferred.type_name() != upper {
                return Err(BigQueryError::InvalidType(format!(
                    "Provided type {upper} does not match a value of type {}",
                    inferred.type_name()
                )));
            }
            Ok(inferred)
        }
        _ => ScalarTag::from_name(&upper)
            .map(TypeDescriptor::Scalar)
            .ok_or_else(|| invalid_type_provided(name)),
    }
}

/// Encodes one value against its resolved descriptor.
pub fn encode_value(value: &Value, descriptor: &TypeDescriptor) -> Result<QueryParameterValue> {
    if let Value::Null = value {
        return Ok(match descriptor {
            TypeDescriptor::Scalar(_) => QueryParameterValue::null(),
            _ => QueryParameterValue::default(),
        });
    }

    match descriptor {
        TypeDescriptor::Array(element) => {
            let Value::Array(items) = value else {
                return Err(mismatch(value, descriptor));
            };
            let array_values = items
                .iter()
                .map(|item| encode_value(item, element))
                .collect::<Result<Vec<_>>>()?;
            Ok(QueryParameterValue { array_values: Some(array_values), ..Default::default() })
        }
        TypeDescriptor::Struct(fields) => {
            let Value::Struct(_) = value else {
                return Err(mismatch(value, descriptor));
            };
            let mut struct_values = BTreeMap::new();
            for field in fields {
                let member = value.get(&field.name).unwrap_or(&Value::Null);
                struct_values.insert(field.name.clone(), encode_value(member, &field.descriptor)?);
            }
            Ok(QueryParameterValue { struct_values: Some(struct_values), ..Default::default() })
        }
        TypeDescriptor::Range(element_type) => {
            let range = coerce_range(value, *element_type)?;
            Ok(QueryParameterValue { range_value: Some(range.wire_value()), ..Default::default() })
        }
        TypeDescriptor::Scalar(ScalarTag::Json) => {
            let encoded = match value {
                Value::Json(serde_json::Value::String(text)) => text.clone(),
                Value::Json(json) => serde_json::to_string(json)?,
                Value::String(text) => text.clone(),
                other => serde_json::to_string(&other.to_json())?,
            };
            Ok(QueryParameterValue::scalar(encoded))
        }
        TypeDescriptor::Scalar(_) => match value {
            Value::Array(_) | Value::Struct(_) | Value::Range(_) => {
                Err(mismatch(value, descriptor))
            }
            scalar => Ok(QueryParameterValue {
                value: Some(scalar.to_json()),
                ..Default::default()
            }),
        },
    }
}

/// Builds a typed query parameter from a value and an optional hint.
pub fn to_query_parameter(value: &Value, hint: Option<&TypeHint>) -> Result<QueryParameter> {
    let descriptor = resolve_descriptor(value, hint)?;
    let parameter_value = encode_value(value, &descriptor)?;
    Ok(QueryParameter { name: None, parameter_type: descriptor.to_wire(), parameter_value })
}

fn numeric_tag(decimal: &BigDecimal) -> ScalarTag {
    let (_, scale) = decimal.normalized().as_bigint_and_exponent();
    if scale > NUMERIC_MAX_SCALE {
        ScalarTag::BigNumeric
    } else {
        ScalarTag::Numeric
    }
}

/// Accepts a range, a range literal, or a `{start, end}` struct of bounds.
fn coerce_range(value: &Value, element_type: ScalarTag) -> Result<BigQueryRange> {
    match value {
        Value::Range(range) => Ok(range.clone()),
        Value::String(literal) => BigQueryRange::parse(literal, Some(element_type)),
        Value::Struct(_) => {
            let bound = |name: &str| -> Result<Option<RangeBound>> {
                match value.get(name) {
                    None | Some(Value::Null) => Ok(None),
                    Some(Value::Date(d)) => Ok(Some(d.clone().into())),
                    Some(Value::Datetime(d)) => Ok(Some(d.clone().into())),
                    Some(Value::Timestamp(t)) => Ok(Some(t.clone().into())),
                    Some(Value::String(s)) => {
                        BigQueryRange::parse(&format!("[{s}, UNBOUNDED)"), Some(element_type))
                            .map(|r| r.start().cloned())
                    }
                    Some(other) => Err(BigQueryError::InvalidRange(format!(
                        "invalid RANGE bound {other:?}"
                    ))),
                }
            };
            BigQueryRange::from_bounds(bound("start")?, bound("end")?, Some(element_type))
        }
        other => Err(mismatch(other, &TypeDescriptor::Range(element_type))),
    }
}

fn mismatch(value: &Value, descriptor: &TypeDescriptor) -> BigQueryError {
    BigQueryError::InvalidArgument(format!(
        "value {value:?} cannot be encoded as a {} parameter",
        descriptor.type_name()
    ))
}
