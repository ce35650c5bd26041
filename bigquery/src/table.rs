//! Streaming inserts into, and row reads from, one table.

use crate::client::BigQueryClient;
use crate::decode::{DecodeOptions, IntegerWrapping, Row, merge_schema_with_rows};
use crate::error::{BigQueryError, Result};
use crate::format::FormatOptions;
use crate::schema::TableSchema;
use crate::transport::ApiRequest;
use crate::value::Value;
use crate::wire::{
    ErrorProto, InsertAllRequest, InsertAllResponse, InsertAllRow, TableDataList, TableResource,
};

use std::collections::BTreeSet;
use uuid::Uuid;

/// One row the server refused during an insert.
#[derive(Clone, Debug, PartialEq)]
pub struct InsertFailure {
    /// Position of the row in the request.
    pub index: usize,
    pub row: serde_json::Value,
    pub errors: Vec<ErrorProto>,
}

#[derive(Clone, Debug)]
pub struct InsertOptions {
    pub skip_invalid_rows: Option<bool>,
    pub ignore_unknown_values: Option<bool>,
    pub template_suffix: Option<String>,
    /// Attach a random `insertId` to every row for best-effort deduplication.
    pub create_insert_id: bool,
}

impl Default for InsertOptions {
    fn default() -> Self {
        Self {
            skip_invalid_rows: None,
            ignore_unknown_values: None,
            template_suffix: None,
            create_insert_id: true,
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct GetRowsOptions {
    pub max_results: Option<u32>,
    pub page_token: Option<String>,
    pub start_index: Option<u64>,
    /// Dotted column paths, e.g. `address.city`.
    pub selected_fields: Option<Vec<String>>,
    /// Skips the table lookup when set.
    pub schema: Option<TableSchema>,
    pub wrap_integers: IntegerWrapping,
    pub parse_json: bool,
    pub format_options: FormatOptions,
}

/// One page of table rows.
#[derive(Clone, Debug, Default)]
pub struct TableRows {
    pub rows: Vec<Row>,
    pub page_token: Option<String>,
    pub total_rows: Option<u64>,
}

#[derive(Clone, Debug)]
pub struct Table {
    client: BigQueryClient,
    dataset_id: String,
    table_id: String,
}

impl Table {
    pub(crate) fn new(client: BigQueryClient, dataset_id: String, table_id: String) -> Self {
        Self { client, dataset_id, table_id }
    }

    pub fn dataset_id(&self) -> &str {
        &self.dataset_id
    }

    pub fn table_id(&self) -> &str {
        &self.table_id
    }

    fn segments(&self, suffix: Option<&str>) -> Vec<String> {
        let mut segments = vec![
            "projects".to_string(),
            self.client.project_id().to_string(),
            "datasets".to_string(),
            self.dataset_id.clone(),
            "tables".to_string(),
            self.table_id.clone(),
        ];
        segments.extend(suffix.map(str::to_string));
        segments
    }

    pub async fn get_metadata(&self) -> Result<TableResource> {
        self.client.call(ApiRequest::get(self.segments(None))).await
    }

    /// Encodes `rows` and streams them in (`tabledata.insertAll`).
    ///
    /// Rows the server rejects are reported together as a
    /// [`BigQueryError::PartialFailure`]; the other rows were inserted.
    pub async fn insert_rows<I, R>(
        &self,
        rows: I,
        options: &InsertOptions,
    ) -> Result<InsertAllResponse>
    where
        I: IntoIterator<Item = R>,
        R: Into<Value>,
    {
        let rows = rows
            .into_iter()
            .map(|row| {
                let value: Value = row.into();
                let json = value.to_json();
                if !json.is_object() {
                    return Err(BigQueryError::InvalidArgument(format!(
                        "Rows must be structs, got {json}"
                    )));
                }
                Ok(InsertAllRow {
                    insert_id: options.create_insert_id.then(|| Uuid::new_v4().to_string()),
                    json,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        self.insert_raw_rows(rows, options).await
    }

    /// Sends already-encoded rows as they are.
    pub async fn insert_raw_rows(
        &self,
        rows: Vec<InsertAllRow>,
        options: &InsertOptions,
    ) -> Result<InsertAllResponse> {
        if rows.is_empty() {
            return Err(BigQueryError::InvalidArgument(
                "You must provide at least 1 row to be inserted.".into(),
            ));
        }
        let request = InsertAllRequest {
            rows,
            skip_invalid_rows: options.skip_invalid_rows,
            ignore_unknown_values: options.ignore_unknown_values,
            template_suffix: options.template_suffix.clone(),
        };
        let body = serde_json::to_value(&request)?;
        let response: InsertAllResponse = self
            .client
            .call(ApiRequest::post(self.segments(Some("insertAll")), body))
            .await?;

        let insert_errors = response.insert_errors.as_deref().unwrap_or_default();
        if insert_errors.is_empty() {
            return Ok(response);
        }

        let failures: Vec<InsertFailure> = insert_errors
            .iter()
            .map(|insert_error| InsertFailure {
                index: insert_error.index,
                row: request
                    .rows
                    .get(insert_error.index)
                    .map(|row| row.json.clone())
                    .unwrap_or_default(),
                errors: insert_error.errors.clone(),
            })
            .collect();
        let failed: BTreeSet<usize> = failures.iter().map(|f| f.index).collect();
        let inserted = request.rows.len().saturating_sub(failed.len());

        tracing::warn!(
            table = %self.table_id,
            failed = failed.len(),
            inserted,
            "Some rows were not inserted"
        );
        Err(BigQueryError::PartialFailure { failures, inserted })
    }

    /// Reads one page of rows (`tabledata.list`).
    pub async fn get_rows(&self, options: &GetRowsOptions) -> Result<TableRows> {
        options.format_options.validate()?;

        let mut request = ApiRequest::get(self.segments(Some("data")));
        if let Some(max_results) = options.max_results {
            request = request.with_query("maxResults", max_results);
        }
        if let Some(token) = &options.page_token {
            request = request.with_query("pageToken", token);
        }
        if let Some(start_index) = options.start_index {
            request = request.with_query("startIndex", start_index);
        }
        if let Some(fields) = options.selected_fields.as_ref().filter(|f| !f.is_empty()) {
            request = request.with_query("selectedFields", fields.join(","));
        }
        for (key, value) in options.format_options.to_query_pairs() {
            request = request.with_query(key, value);
        }

        let data: TableDataList = self.client.call(request).await?;
        let wire_rows = data.rows.unwrap_or_default();

        let rows = if wire_rows.is_empty() {
            Vec::new()
        } else {
            let schema = match &options.schema {
                Some(schema) => schema.clone(),
                None => {
                    tracing::debug!(table = %self.table_id, "Fetching table schema to decode rows");
                    self.get_metadata().await?.schema.unwrap_or_default()
                }
            };
            let decode = DecodeOptions {
                wrap_integers: options.wrap_integers.clone(),
                parse_json: options.parse_json,
                selected_fields: options.selected_fields.clone(),
                format_options: options.format_options,
            };
            merge_schema_with_rows(&schema.fields, &wire_rows, &decode)?
        };

        Ok(TableRows {
            rows,
            page_token: data.page_token.filter(|token| !token.is_empty()),
            total_rows: data.total_rows.and_then(|t| t.parse().ok()),
        })
    }
}
