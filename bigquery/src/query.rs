//! Query configuration and the fluent [`SqlQueryBuilder`].
//!
//! # Overview
//!
//! A [`Query`] describes *what* to run: the SQL text, its parameters and the
//! job settings. [`QueryOptions`] describe *how* to fetch the results: page
//! size, wait timeout, pagination and decoding. [`BigQueryClient::query`]
//! takes both.
//!
//! Most callers never build a [`SqlQueryBuilder`] directly; instead, call
//! [`BigQueryClient::query_builder`] and chain `.bind()` calls to attach
//! parameters before executing the query.
//!
//! # Example
//!
//! ```no_run
//! use bigquery::ClientBuilder;
//!
//! # tokio_test::block_on(async {
//! let client = ClientBuilder::from_env().unwrap().build().unwrap();
//!
//! let rows = client
//!     .query_builder("SELECT word FROM `bigquery-public-data.samples.shakespeare` WHERE corpus = @corpus")
//!     .bind_named("corpus", "romeoandjuliet")
//!     .execute()
//!     .await
//!     .unwrap();
//!
//! assert!(!rows.is_empty());
//! # });
//! ```
//!
//! # Errors
//!
//! Returns a [`BigQueryError`] if parameter encoding or execution fails.

use crate::client::{BigQueryClient, JobCreationMode};
use crate::codec::{ParamTypes, QueryParams, infer_from_value};
use crate::decode::{DecodeOptions, IntegerWrapping, Row};
use crate::error::{BigQueryError, Result};
use crate::format::FormatOptions;
use crate::job::Job;
use crate::types::TypeHint;
use crate::value::{ToValue, Value};
use crate::wire::{DatasetReference, TableReference};

use std::collections::HashMap;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum QueryPriority {
    #[default]
    Interactive,
    Batch,
}

impl QueryPriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueryPriority::Interactive => "INTERACTIVE",
            QueryPriority::Batch => "BATCH",
        }
    }
}

/// A query and its job settings.
///
/// Every setting `jobs.query` cannot express forces the job path; see
/// [`job_only_reason`](crate::executor::job_only_reason).
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Query {
    pub query: String,
    pub params: Option<QueryParams>,
    pub types: Option<ParamTypes>,
    pub location: Option<String>,
    pub max_results: Option<u32>,
    pub default_dataset: Option<DatasetReference>,
    pub labels: Option<HashMap<String, String>>,
    /// Decimal string, as the API expects an int64.
    pub maximum_bytes_billed: Option<String>,
    pub use_query_cache: Option<bool>,
    pub job_creation_mode: Option<JobCreationMode>,
    pub reservation: Option<String>,

    pub destination: Option<TableReference>,
    pub table_definitions: Option<serde_json::Map<String, serde_json::Value>>,
    pub create_disposition: Option<String>,
    pub write_disposition: Option<String>,
    pub priority: Option<QueryPriority>,
    pub use_legacy_sql: Option<bool>,
    pub maximum_billing_tier: Option<i64>,
    pub time_partitioning: Option<serde_json::Value>,
    pub range_partitioning: Option<serde_json::Value>,
    pub clustering: Option<serde_json::Value>,
    pub destination_encryption_configuration: Option<serde_json::Value>,
    pub schema_update_options: Option<Vec<String>>,
    pub job_timeout_ms: Option<u64>,
    pub job_id: Option<String>,
    pub job_prefix: Option<String>,
    pub dry_run: bool,
    /// Extra `configuration.query` members sent verbatim on the job path.
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Query {
    pub fn new(sql: impl Into<String>) -> Self {
        Self { query: sql.into(), ..Default::default() }
    }

    pub fn params(mut self, params: QueryParams) -> Self {
        self.params = Some(params);
        self
    }

    pub fn types(mut self, types: ParamTypes) -> Self {
        self.types = Some(types);
        self
    }

    pub fn location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    pub fn max_results(mut self, max_results: u32) -> Self {
        self.max_results = Some(max_results);
        self
    }

    pub fn destination(mut self, destination: TableReference) -> Self {
        self.destination = Some(destination);
        self
    }

    pub fn priority(mut self, priority: QueryPriority) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn use_legacy_sql(mut self, legacy: bool) -> Self {
        self.use_legacy_sql = Some(legacy);
        self
    }

    pub fn job_id(mut self, job_id: impl Into<String>) -> Self {
        self.job_id = Some(job_id.into());
        self
    }

    pub fn job_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.job_prefix = Some(prefix.into());
        self
    }

    pub fn job_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.job_timeout_ms = Some(timeout_ms);
        self
    }

    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn labels(mut self, labels: HashMap<String, String>) -> Self {
        self.labels = Some(labels);
        self
    }

    pub fn job_creation_mode(mut self, mode: JobCreationMode) -> Self {
        self.job_creation_mode = Some(mode);
        self
    }

    pub fn extra(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }
}

impl From<&str> for Query {
    fn from(sql: &str) -> Self {
        Query::new(sql)
    }
}

impl From<String> for Query {
    fn from(sql: String) -> Self {
        Query::new(sql)
    }
}

/// How results are fetched and decoded.
#[derive(Clone, Debug)]
pub struct QueryOptions {
    pub location: Option<String>,
    pub max_results: Option<u32>,
    pub page_token: Option<String>,
    pub start_index: Option<u64>,
    /// Server-side wait per request. An incomplete response is then an
    /// error instead of a reason to poll.
    pub timeout_ms: Option<u64>,
    /// Follow page tokens until the last page.
    pub auto_paginate: bool,
    /// Continue from this job instead of submitting the query.
    pub job: Option<Job>,
    pub wrap_integers: IntegerWrapping,
    pub parse_json: bool,
    pub format_options: FormatOptions,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            location: None,
            max_results: None,
            page_token: None,
            start_index: None,
            timeout_ms: None,
            auto_paginate: true,
            job: None,
            wrap_integers: IntegerWrapping::None,
            parse_json: false,
            format_options: FormatOptions::default(),
        }
    }
}

impl QueryOptions {
    pub(crate) fn decode_options(&self) -> DecodeOptions {
        DecodeOptions {
            wrap_integers: self.wrap_integers.clone(),
            parse_json: self.parse_json,
            selected_fields: None,
            format_options: self.format_options,
        }
    }
}

/// Collects bound parameters for one query; see [`BigQueryClient::query_builder`].
pub struct SqlQueryBuilder<'a> {
    client: &'a BigQueryClient,
    query: Query,
    positional: Vec<Value>,
    positional_types: Vec<Option<TypeHint>>,
    named: Vec<(String, Value)>,
    named_types: HashMap<String, TypeHint>,
    options: QueryOptions,
}

impl<'a> SqlQueryBuilder<'a> {
    pub(crate) fn new(client: &'a BigQueryClient, sql: &str) -> Self {
        Self {
            client,
            query: Query::new(sql),
            positional: Vec::new(),
            positional_types: Vec::new(),
            named: Vec::new(),
            named_types: HashMap::new(),
            options: QueryOptions::default(),
        }
    }

    /// Binds the next `?` placeholder.
    pub fn bind<T: ToValue>(mut self, value: T) -> Self {
        self.positional.push(value.to_value());
        self.positional_types.push(None);
        self
    }

    /// Binds the next `?` placeholder with an explicit type, e.g. for `NULL`
    /// or an empty array.
    pub fn bind_typed<T: ToValue>(mut self, value: T, hint: impl Into<TypeHint>) -> Self {
        self.positional.push(value.to_value());
        self.positional_types.push(Some(hint.into()));
        self
    }

    /// Binds `@name`.
    pub fn bind_named<T: ToValue>(mut self, name: impl Into<String>, value: T) -> Self {
        self.named.push((name.into(), value.to_value()));
        self
    }

    /// Binds `@name` with an explicit type, e.g. for `NULL` or an empty array.
    pub fn bind_named_typed<T: ToValue>(
        mut self,
        name: impl Into<String>,
        value: T,
        hint: impl Into<TypeHint>,
    ) -> Self {
        let name = name.into();
        self.named_types.insert(name.clone(), hint.into());
        self.named.push((name, value.to_value()));
        self
    }

    pub fn location(mut self, location: impl Into<String>) -> Self {
        self.query.location = Some(location.into());
        self
    }

    pub fn options(mut self, options: QueryOptions) -> Self {
        self.options = options;
        self
    }

    fn into_query(self) -> Result<(Query, QueryOptions)> {
        let mut query = self.query;
        match (self.positional.is_empty(), self.named.is_empty()) {
            (false, true) => {
                if self.positional_types.iter().any(Option::is_some) {
                    let types = self
                        .positional
                        .iter()
                        .zip(self.positional_types)
                        .map(|(value, hint)| match hint {
                            Some(hint) => Ok(hint),
                            None => infer_from_value(value).map(|d| TypeHint::from(&d)),
                        })
                        .collect::<Result<Vec<_>>>()?;
                    query.types = Some(ParamTypes::Positional(types));
                }
                query.params = Some(QueryParams::Positional(self.positional));
            }
            (true, false) => {
                if !self.named_types.is_empty() {
                    query.types = Some(ParamTypes::Named(self.named_types));
                }
                query.params = Some(QueryParams::Named(self.named));
            }
            (false, false) => {
                return Err(BigQueryError::InvalidArgument(
                    "Cannot mix positional and named parameters in one query".into(),
                ));
            }
            (true, true) => {}
        }
        Ok((query, self.options))
    }

    pub async fn execute(self) -> Result<Vec<Row>> {
        let client = self.client;
        let (query, options) = self.into_query()?;
        Ok(client.query(query, options).await?.rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::test_utils::setup_client;
    use serde_json::json;

    fn completed(rows: serde_json::Value) -> serde_json::Value {
        json!({
            "jobComplete": true,
            "jobReference": { "projectId": "test-project", "jobId": "job-1", "location": "US" },
            "schema": { "fields": [
                { "name": "id", "type": "INTEGER" },
                { "name": "text", "type": "STRING" }
            ]},
            "rows": rows
        })
    }

    #[tokio::test]
    async fn test_sql_query_builder_bind() -> Result<()> {
        // Arrange
        let (client, transport) = setup_client(vec![Ok(completed(json!([
            { "f": [{ "v": "42" }, { "v": "world" }] }
        ])))]);

        // Act
        let rows = client
            .query_builder("SELECT ? AS id, ? AS text")
            .bind(42_i32)
            .bind("world")
            .execute()
            .await?;

        // Assert
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get("id"), Some(&Value::Int64(42)));
        assert_eq!(rows[0].get("text"), Some(&Value::String("world".into())));

        let body = transport.requests()[0].body.clone().unwrap();
        assert_eq!(body["parameterMode"], "positional");
        assert_eq!(body["queryParameters"][0]["parameterType"]["type"], "INT64");
        assert_eq!(body["queryParameters"][1]["parameterValue"]["value"], "world");
        Ok(())
    }

    #[tokio::test]
    async fn test_sql_query_builder_bind_named_typed() -> Result<()> {
        let (client, transport) = setup_client(vec![Ok(completed(json!([])))]);

        client
            .query_builder("SELECT @id AS id, @text AS text")
            .bind_named_typed("id", Value::Null, "INT64")
            .bind_named("text", "x")
            .execute()
            .await?;

        let body = transport.requests()[0].body.clone().unwrap();
        assert_eq!(body["parameterMode"], "named");
        assert_eq!(
            body["queryParameters"][0],
            json!({
                "name": "id",
                "parameterType": { "type": "INT64" },
                "parameterValue": { "value": null }
            })
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_sql_query_builder_bind_typed() -> Result<()> {
        // Arrange
        let (client, transport) = setup_client(vec![Ok(completed(json!([])))]);

        // Act
        client
            .query_builder("SELECT ? AS id, ? AS tags, ? AS text")
            .bind_typed(Value::Null, "INT64")
            .bind_typed(Vec::<String>::new(), TypeHint::array("STRING"))
            .bind("x")
            .execute()
            .await?;

        // Assert
        let body = transport.requests()[0].body.clone().unwrap();
        assert_eq!(body["parameterMode"], "positional");
        assert_eq!(
            body["queryParameters"],
            json!([
                { "parameterType": { "type": "INT64" }, "parameterValue": { "value": null } },
                {
                    "parameterType": { "type": "ARRAY", "arrayType": { "type": "STRING" } },
                    "parameterValue": { "arrayValues": [] }
                },
                { "parameterType": { "type": "STRING" }, "parameterValue": { "value": "x" } }
            ])
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_untyped_null_is_rejected() {
        let (client, transport) = setup_client(vec![]);

        let result = client.query_builder("SELECT ?").bind(Value::Null).execute().await;

        assert!(matches!(result, Err(BigQueryError::InvalidType(_))));
        assert!(transport.requests().is_empty());
    }

    #[tokio::test]
    async fn test_mixed_parameters_are_rejected() {
        let (client, transport) = setup_client(vec![]);

        let result = client
            .query_builder("SELECT ?, @b")
            .bind(1)
            .bind_named("b", 2)
            .execute()
            .await;

        assert!(matches!(result, Err(BigQueryError::InvalidArgument(_))));
        assert!(transport.requests().is_empty());
    }

    #[test]
    fn query_from_str() {
        let query: Query = "SELECT 1".into();

        assert_eq!(query.query, "SELECT 1");
        assert!(!query.dry_run);
        assert!(QueryOptions::default().auto_paginate);
    }
}
