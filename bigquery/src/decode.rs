//! Decoding of schema-described rows into [`Value`]s.
//!
//! Every cell arrives as a string (or an array of cells, or a nested row).
//! The schema field type selects the conversion; [`DecodeOptions`] tune the
//! lossy cases: INT64 precision, JSON parsing and TIMESTAMP rendering.

use crate::error::{BigQueryError, Result};
use crate::format::FormatOptions;
use crate::schema::{CellValue, FieldType, SchemaField, TableCell, TableRow};
use crate::types::ScalarTag;
use crate::value::{
    BigQueryDate, BigQueryDatetime, BigQueryInt, BigQueryRange, BigQueryTime, Geography,
    IntegerTypeCast, Value, decode_integer_value,
};

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use bigdecimal::BigDecimal;
use std::borrow::Cow;
use std::str::FromStr;

/// How INT64 cells are surfaced.
#[derive(Clone, Debug, Default)]
pub enum IntegerWrapping {
    /// `Value::Int64`; values beyond the safe-integer range are an error.
    #[default]
    None,
    /// Lossless `Value::Int` carrying the raw decimal string.
    Wrap,
    /// The cast's result for covered fields, `Value::Int64` elsewhere.
    Cast(IntegerTypeCast),
}

#[derive(Clone, Debug, Default)]
pub struct DecodeOptions {
    pub wrap_integers: IntegerWrapping,
    pub parse_json: bool,
    /// Dotted column paths the rows were restricted to, e.g. `address.city`.
    pub selected_fields: Option<Vec<String>>,
    /// Must equal the options the rows were requested with.
    pub format_options: FormatOptions,
}

/// A decoded row: column name and value, in schema order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Row {
    columns: Vec<(String, Value)>,
}

impl Row {
    pub fn new(columns: Vec<(String, Value)>) -> Self {
        Self { columns }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.columns.iter().find(|(k, _)| k == name).map(|(_, v)| v)
    }

    pub fn columns(&self) -> &[(String, Value)] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn into_value(self) -> Value {
        Value::Struct(self.columns)
    }
}

impl IntoIterator for Row {
    type Item = (String, Value);
    type IntoIter = std::vec::IntoIter<(String, Value)>;

    fn into_iter(self) -> Self::IntoIter {
        self.columns.into_iter()
    }
}

impl From<Row> for Value {
    fn from(row: Row) -> Self {
        row.into_value()
    }
}

/// Zips every row with the schema and converts each cell.
pub fn merge_schema_with_rows(
    fields: &[SchemaField],
    rows: &[TableRow],
    options: &DecodeOptions,
) -> Result<Vec<Row>> {
    let selected = options.selected_fields.as_deref().filter(|s| !s.is_empty());
    let fields: Vec<&SchemaField> = match selected {
        Some(paths) => fields
            .iter()
            .filter(|field| paths.iter().any(|p| path_head(p).eq_ignore_ascii_case(&field.name)))
            .collect(),
        None => fields.iter().collect(),
    };

    rows.iter()
        .map(|row| {
            if row.f.len() > fields.len() {
                return Err(BigQueryError::Decode(format!(
                    "row has {} cells but the schema describes {} fields",
                    row.f.len(),
                    fields.len()
                )));
            }
            row.f
                .iter()
                .zip(&fields)
                .map(|(cell, field)| {
                    let nested = nested_options(options, selected, field);
                    let value = decode_field(field, cell, nested.as_ref().unwrap_or(options))?;
                    Ok((field.name.clone(), value))
                })
                .collect::<Result<Vec<_>>>()
                .map(Row::new)
        })
        .collect()
}

fn decode_field(field: &SchemaField, cell: &TableCell, options: &DecodeOptions) -> Result<Value> {
    if !field.is_repeated() {
        return convert_cell(field, cell.v.as_ref(), options);
    }
    match &cell.v {
        None => Ok(Value::Array(Vec::new())),
        Some(CellValue::Array(items)) => items
            .iter()
            .map(|item| convert_cell(field, item.v.as_ref(), options))
            .collect::<Result<Vec<_>>>()
            .map(Value::Array),
        Some(other) => Err(BigQueryError::Decode(format!(
            "REPEATED field {} expected an array of cells, got {other:?}",
            field.name
        ))),
    }
}

fn convert_cell(
    field: &SchemaField,
    cell: Option<&CellValue>,
    options: &DecodeOptions,
) -> Result<Value> {
    let raw = match cell {
        None => return Ok(Value::Null),
        Some(CellValue::Record(row)) => {
            if field.field_type != FieldType::Record {
                return Err(unexpected_shape(field, "a nested row"));
            }
            let rows =
                merge_schema_with_rows(field.sub_fields(), std::slice::from_ref(row), options)?;
            return Ok(rows.into_iter().next().map_or(Value::Null, Row::into_value));
        }
        Some(CellValue::Array(_)) => return Err(unexpected_shape(field, "an array")),
        Some(CellValue::String(s)) => Cow::Borrowed(s.as_str()),
        Some(CellValue::Other(json)) => Cow::Owned(json.to_string()),
    };

    convert_scalar(field, &raw, options)
}

fn convert_scalar(field: &SchemaField, raw: &str, options: &DecodeOptions) -> Result<Value> {
    let value = match &field.field_type {
        FieldType::Boolean => Value::Bool(raw.eq_ignore_ascii_case("true")),
        FieldType::Bytes => Value::Bytes(BASE64.decode(raw)?),
        FieldType::Float => Value::Float64(raw.parse().map_err(|_| {
            BigQueryError::Decode(format!("invalid FLOAT64 value \"{raw}\" in {}", field.name))
        })?),
        FieldType::Integer => match &options.wrap_integers {
            IntegerWrapping::None => Value::Int64(decode_integer_value(raw, Some(&field.name))?),
            IntegerWrapping::Wrap => Value::Int(BigQueryInt::new(raw).with_field_name(&field.name)),
            IntegerWrapping::Cast(cast) => BigQueryInt::new(raw)
                .with_field_name(&field.name)
                .with_cast(cast.clone())
                .resolve()?,
        },
        FieldType::Numeric | FieldType::BigNumeric => Value::Numeric(BigDecimal::from_str(raw)?),
        FieldType::Date => Value::Date(BigQueryDate::new(raw)),
        FieldType::Datetime => Value::Datetime(BigQueryDatetime::new(raw)),
        FieldType::Time => Value::Time(BigQueryTime::new(raw)),
        FieldType::Timestamp => {
            Value::Timestamp(options.format_options.timestamp_encoding().decode(raw)?)
        }
        FieldType::Geography => Value::Geography(Geography::new(raw)),
        FieldType::Json if options.parse_json => Value::Json(serde_json::from_str(raw)?),
        FieldType::Range => {
            let element_type = field
                .range_element_type
                .as_ref()
                .and_then(|e| ScalarTag::from_name(&e.r#type))
                .ok_or_else(|| {
                    BigQueryError::InvalidRange(format!(
                        "RANGE field {} has no usable rangeElementType",
                        field.name
                    ))
                })?;
            Value::Range(BigQueryRange::from_schema_value(raw, element_type)?)
        }
        FieldType::Record => return Err(unexpected_shape(field, "a scalar")),
        FieldType::String | FieldType::Json | FieldType::Other(_) => Value::String(raw.to_string()),
    };
    Ok(value)
}

fn unexpected_shape(field: &SchemaField, found: &str) -> BigQueryError {
    BigQueryError::Decode(format!(
        "{} field {} cannot hold {found}",
        field.field_type, field.name
    ))
}

fn path_head(path: &str) -> &str {
    path.split('.').next().unwrap_or(path)
}

/// Options for a RECORD's children when only some nested paths were selected.
fn nested_options(
    options: &DecodeOptions,
    selected: Option<&[String]>,
    field: &SchemaField,
) -> Option<DecodeOptions> {
    if field.field_type != FieldType::Record {
        return None;
    }
    let mut tails = Vec::new();
    for path in selected? {
        let mut parts = path.splitn(2, '.');
        let head = parts.next().unwrap_or_default();
        if !head.eq_ignore_ascii_case(&field.name) {
            continue;
        }
        match parts.next() {
            Some(tail) => tails.push(tail.to_string()),
            // The whole record was selected.
            None => return Some(DecodeOptions { selected_fields: None, ..options.clone() }),
        }
    }
    Some(DecodeOptions { selected_fields: Some(tails), ..options.clone() })
}
