use super::to_query_parameter;
use crate::error::{BigQueryError, Result};
use crate::types::TypeHint;
use crate::value::{ToValue, Value};
use crate::wire::QueryParameter;

use std::collections::HashMap;

/// Query parameters, positional (`?`) or named (`@name`).
#[derive(Clone, Debug, PartialEq)]
pub enum QueryParams {
    Positional(Vec<Value>),
    Named(Vec<(String, Value)>),
}

impl QueryParams {
    pub fn positional<T, I>(values: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: ToValue,
    {
        QueryParams::Positional(values.into_iter().map(ToValue::to_value).collect())
    }

    pub fn named<K, T, I>(values: I) -> Self
    where
        I: IntoIterator<Item = (K, T)>,
        K: Into<String>,
        T: ToValue,
    {
        QueryParams::Named(
            values.into_iter().map(|(name, value)| (name.into(), value.to_value())).collect(),
        )
    }

    pub fn len(&self) -> usize {
        match self {
            QueryParams::Positional(values) => values.len(),
            QueryParams::Named(values) => values.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn mode(&self) -> ParameterMode {
        match self {
            QueryParams::Positional(_) => ParameterMode::Positional,
            QueryParams::Named(_) => ParameterMode::Named,
        }
    }
}

/// Explicit types for [`QueryParams`]; the shape must match the params.
#[derive(Clone, Debug, PartialEq)]
pub enum ParamTypes {
    Positional(Vec<TypeHint>),
    Named(HashMap<String, TypeHint>),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ParameterMode {
    Positional,
    Named,
}

impl ParameterMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParameterMode::Positional => "positional",
            ParameterMode::Named => "named",
        }
    }
}

/// Encodes every parameter, pairing each with its provided type if any.
pub fn build_query_params(
    params: &QueryParams,
    types: Option<&ParamTypes>,
) -> Result<Vec<QueryParameter>> {
    match (params, types) {
        (QueryParams::Named(values), None) => values
            .iter()
            .map(|(name, value)| named_parameter(name, value, None))
            .collect(),
        (QueryParams::Named(values), Some(ParamTypes::Named(types))) => values
            .iter()
            .map(|(name, value)| named_parameter(name, value, types.get(name)))
            .collect(),
        (QueryParams::Positional(values), None) => values
            .iter()
            .map(|value| to_query_parameter(value, None))
            .collect(),
        (QueryParams::Positional(values), Some(ParamTypes::Positional(types))) => {
            if values.len() != types.len() {
                return Err(BigQueryError::InvalidArgument(
                    "Incorrect number of parameter types provided.".into(),
                ));
            }
            values
                .iter()
                .zip(types)
                .map(|(value, hint)| to_query_parameter(value, Some(hint)))
                .collect()
        }
        _ => Err(BigQueryError::InvalidArgument(
            "Provided types must match the value type passed to `params`".into(),
        )),
    }
}

fn named_parameter(name: &str, value: &Value, hint: Option<&TypeHint>) -> Result<QueryParameter> {
    let mut parameter = to_query_parameter(value, hint)?;
    parameter.name = Some(name.to_string());
    Ok(parameter)
}
