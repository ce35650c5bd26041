//! Table schemas and the raw row representation of query results.
//!
//! Rows come back as `{"f": [{"v": ...}, ...]}` where every scalar is a
//! string, repeated fields are arrays of cells and records are nested rows.

use crate::types::ScalarTag;

use serde::{Deserialize, Serialize};
use std::fmt;

/// Column type as reported in a table schema. Legacy and standard names are
/// both accepted; unknown names are preserved.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum FieldType {
    String,
    Bytes,
    Integer,
    Float,
    Numeric,
    BigNumeric,
    Boolean,
    Timestamp,
    Date,
    Time,
    Datetime,
    Geography,
    Record,
    Json,
    Range,
    Other(String),
}

impl FieldType {
    pub fn as_str(&self) -> &str {
        match self {
            FieldType::String => "STRING",
            FieldType::Bytes => "BYTES",
            FieldType::Integer => "INTEGER",
            FieldType::Float => "FLOAT",
            FieldType::Numeric => "NUMERIC",
            FieldType::BigNumeric => "BIGNUMERIC",
            FieldType::Boolean => "BOOLEAN",
            FieldType::Timestamp => "TIMESTAMP",
            FieldType::Date => "DATE",
            FieldType::Time => "TIME",
            FieldType::Datetime => "DATETIME",
            FieldType::Geography => "GEOGRAPHY",
            FieldType::Record => "RECORD",
            FieldType::Json => "JSON",
            FieldType::Range => "RANGE",
            FieldType::Other(name) => name,
        }
    }
}

impl From<String> for FieldType {
    fn from(name: String) -> Self {
        match name.to_ascii_uppercase().as_str() {
            "STRING" => FieldType::String,
            "BYTES" => FieldType::Bytes,
            "INTEGER" | "INT64" => FieldType::Integer,
            "FLOAT" | "FLOAT64" => FieldType::Float,
            "NUMERIC" => FieldType::Numeric,
            "BIGNUMERIC" => FieldType::BigNumeric,
            "BOOLEAN" | "BOOL" => FieldType::Boolean,
            "TIMESTAMP" => FieldType::Timestamp,
            "DATE" => FieldType::Date,
            "TIME" => FieldType::Time,
            "DATETIME" => FieldType::Datetime,
            "GEOGRAPHY" => FieldType::Geography,
            "RECORD" | "STRUCT" => FieldType::Record,
            "JSON" => FieldType::Json,
            "RANGE" => FieldType::Range,
            _ => FieldType::Other(name),
        }
    }
}

impl From<&str> for FieldType {
    fn from(name: &str) -> Self {
        FieldType::from(name.to_string())
    }
}

impl From<FieldType> for String {
    fn from(field_type: FieldType) -> Self {
        field_type.as_str().to_string()
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FieldMode {
    #[default]
    Nullable,
    Required,
    Repeated,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RangeElementType {
    #[serde(rename = "type")]
    pub r#type: String,
}

/// One column of a table schema.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaField {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<FieldMode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fields: Option<Vec<SchemaField>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub range_element_type: Option<RangeElementType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl SchemaField {
    pub fn new(name: impl Into<String>, field_type: impl Into<FieldType>) -> Self {
        Self {
            name: name.into(),
            field_type: field_type.into(),
            mode: None,
            fields: None,
            range_element_type: None,
            description: None,
        }
    }

    pub fn record(name: impl Into<String>, fields: Vec<SchemaField>) -> Self {
        Self { fields: Some(fields), ..Self::new(name, FieldType::Record) }
    }

    pub fn range(name: impl Into<String>, element_type: ScalarTag) -> Self {
        Self {
            range_element_type: Some(RangeElementType {
                r#type: element_type.as_str().to_string(),
            }),
            ..Self::new(name, FieldType::Range)
        }
    }

    pub fn with_mode(mut self, mode: FieldMode) -> Self {
        self.mode = Some(mode);
        self
    }

    pub fn repeated(self) -> Self {
        self.with_mode(FieldMode::Repeated)
    }

    pub fn is_repeated(&self) -> bool {
        self.mode == Some(FieldMode::Repeated)
    }

    pub fn sub_fields(&self) -> &[SchemaField] {
        self.fields.as_deref().unwrap_or_default()
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSchema {
    #[serde(default)]
    pub fields: Vec<SchemaField>,
}

impl TableSchema {
    pub fn new(fields: Vec<SchemaField>) -> Self {
        Self { fields }
    }
}

/// A result row, one cell per schema field.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TableRow {
    #[serde(default)]
    pub f: Vec<TableCell>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TableCell {
    #[serde(default)]
    pub v: Option<CellValue>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CellValue {
    String(String),
    Array(Vec<TableCell>),
    Record(TableRow),
    /// Non-string scalars some emulators emit.
    Other(serde_json::Value),
}

impl TableCell {
    pub fn null() -> Self {
        Self { v: None }
    }

    pub fn string(value: impl Into<String>) -> Self {
        Self { v: Some(CellValue::String(value.into())) }
    }

    pub fn array(cells: Vec<TableCell>) -> Self {
        Self { v: Some(CellValue::Array(cells)) }
    }

    pub fn record(cells: Vec<TableCell>) -> Self {
        Self { v: Some(CellValue::Record(TableRow { f: cells })) }
    }
}
