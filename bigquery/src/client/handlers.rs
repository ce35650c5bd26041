use crate::decode::{DecodeOptions, Row, merge_schema_with_rows};
use crate::error::{BigQueryError, Result};
use crate::job::{Job, QueryResults};
use crate::schema::TableSchema;
use crate::wire::QueryResponse;

/// Accumulates the decoded pages of one query.
#[derive(Default, Debug, Clone)]
pub(crate) struct ResultsHandler {
    pub(crate) rows: Vec<Row>,
    pub(crate) schema: Option<TableSchema>,
    pub(crate) page_token: Option<String>,
    pub(crate) total_rows: Option<u64>,
    pub(crate) num_dml_affected_rows: Option<u64>,
}

impl ResultsHandler {
    /// Decodes a completed page and keeps its page token, replacing the
    /// previous one.
    ///
    /// Follow-up pages may omit the schema; their rows decode against the
    /// schema of an earlier page.
    pub(crate) fn handle(
        &mut self,
        response: QueryResponse,
        options: &DecodeOptions,
    ) -> Result<()> {
        if response.schema.is_some() {
            self.schema = response.schema;
        }
        if let Some(rows) = response.rows.as_deref().filter(|rows| !rows.is_empty()) {
            let schema = self.schema.as_ref().ok_or_else(|| {
                BigQueryError::Decode(format!("received {} rows without a schema", rows.len()))
            })?;
            let decoded = merge_schema_with_rows(&schema.fields, rows, options)?;
            self.rows.extend(decoded);
        }
        self.page_token = response.page_token.filter(|token| !token.is_empty());
        if let Some(total) = response.total_rows.and_then(|t| t.parse().ok()) {
            self.total_rows = Some(total);
        }
        if let Some(affected) = response.num_dml_affected_rows.and_then(|n| n.parse().ok()) {
            self.num_dml_affected_rows = Some(affected);
        }
        Ok(())
    }

    pub(crate) fn into_results(self, job: Option<Job>) -> QueryResults {
        QueryResults {
            rows: self.rows,
            schema: self.schema,
            job,
            page_token: self.page_token,
            total_rows: self.total_rows,
            num_dml_affected_rows: self.num_dml_affected_rows,
        }
    }
}
