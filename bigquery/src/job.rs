//! Handles to server-side jobs.
//!
//! A [`Job`] holds only its reference; every status check and result page is
//! fetched from the server.

use crate::client::BigQueryClient;
use crate::client::handlers::ResultsHandler;
use crate::decode::Row;
use crate::error::{BigQueryError, Result};
use crate::query::QueryOptions;
use crate::schema::TableSchema;
use crate::transport::ApiRequest;
use crate::wire::{JobReference, JobResource, JobStatus, QueryResponse};

use futures_util::stream::{self, Stream, TryStreamExt};
use std::time::Duration;

/// Pause between [`Job::wait`] polls when the client sets no interval.
const DEFAULT_WAIT_INTERVAL: Duration = Duration::from_millis(500);

/// Decoded rows of a query plus what is needed to fetch more.
#[derive(Clone, Debug, Default)]
pub struct QueryResults {
    pub rows: Vec<Row>,
    pub schema: Option<TableSchema>,
    /// `None` when the server answered without a job reference.
    pub job: Option<Job>,
    /// Set when pages remain; pass it back through [`QueryOptions::page_token`].
    pub page_token: Option<String>,
    pub total_rows: Option<u64>,
    pub num_dml_affected_rows: Option<u64>,
}

#[derive(Clone, Debug)]
pub struct Job {
    client: BigQueryClient,
    reference: JobReference,
}

struct PageState {
    token: Option<String>,
    finished: bool,
    /// Schema of an earlier page, for pages that omit it.
    schema: Option<TableSchema>,
    options: QueryOptions,
}

impl Job {
    pub(crate) fn new(client: BigQueryClient, reference: JobReference) -> Self {
        Self { client, reference }
    }

    pub fn id(&self) -> &str {
        &self.reference.job_id
    }

    pub fn location(&self) -> Option<&str> {
        self.reference.location.as_deref()
    }

    pub fn reference(&self) -> &JobReference {
        &self.reference
    }

    fn segments(&self, collection: &str) -> [String; 4] {
        [
            "projects".to_string(),
            self.reference.project_id.clone(),
            collection.to_string(),
            self.reference.job_id.clone(),
        ]
    }

    /// Fetches the job resource (`jobs.get`).
    pub async fn get_metadata(&self) -> Result<JobResource> {
        let mut request = ApiRequest::get(self.segments("jobs"));
        if let Some(location) = self.location() {
            request = request.with_query("location", location);
        }
        self.client.call(request).await
    }

    /// `Ok(None)` while the job runs, the resource once it is done.
    ///
    /// A job carrying `status.errorResult` is a [`BigQueryError::JobFailed`].
    pub async fn poll(&self) -> Result<Option<JobResource>> {
        let metadata = self.get_metadata().await?;
        let status = metadata.status.clone().unwrap_or_default();
        if status.error_result.is_some() {
            return Err(job_failure(self.reference.clone(), status));
        }
        if !status.is_done() {
            tracing::debug!(
                job_id = %self.reference.job_id,
                state = ?status.state,
                "Job still running"
            );
            return Ok(None);
        }
        Ok(Some(metadata))
    }

    /// Polls until the job is done.
    pub async fn wait(&self) -> Result<JobResource> {
        let interval = self.client.config().poll_interval.unwrap_or(DEFAULT_WAIT_INTERVAL);
        loop {
            if let Some(metadata) = self.poll().await? {
                return Ok(metadata);
            }
            tokio::time::sleep(interval).await;
        }
    }

    fn results_request(&self, options: &QueryOptions, page_token: Option<&str>) -> ApiRequest {
        let mut request = ApiRequest::get(self.segments("queries"));
        if let Some(location) = self.location().or(options.location.as_deref()) {
            request = request.with_query("location", location);
        }
        if let Some(max_results) = options.max_results {
            request = request.with_query("maxResults", max_results);
        }
        match page_token {
            Some(token) => request = request.with_query("pageToken", token),
            None => {
                if let Some(start_index) = options.start_index {
                    request = request.with_query("startIndex", start_index);
                }
            }
        }
        if let Some(timeout_ms) = options.timeout_ms {
            request = request.with_query("timeoutMs", timeout_ms);
        }
        for (key, value) in options.format_options.to_query_pairs() {
            request = request.with_query(key, value);
        }
        request
    }

    /// Requests one page, polling while the query is still running.
    pub(crate) async fn fetch_completed_page(
        &self,
        options: &QueryOptions,
        page_token: Option<&str>,
    ) -> Result<QueryResponse> {
        loop {
            let response: QueryResponse =
                self.client.call(self.results_request(options, page_token)).await?;
            if response.is_complete() {
                return Ok(response);
            }
            if let Some(timeout_ms) = options.timeout_ms {
                return Err(BigQueryError::QueryTimeout { timeout_ms });
            }
            tracing::debug!(
                job_id = %self.reference.job_id,
                location = ?self.reference.location,
                "Query still running, polling for results"
            );
            if let Some(interval) = self.client.config().poll_interval {
                tokio::time::sleep(interval).await;
            }
        }
    }

    /// Follows page tokens from `handler` while auto-pagination is on.
    pub(crate) async fn collect_pages(
        &self,
        mut handler: ResultsHandler,
        options: &QueryOptions,
    ) -> Result<QueryResults> {
        let decode = options.decode_options();
        while options.auto_paginate {
            let Some(token) = handler.page_token.take() else {
                break;
            };
            tracing::debug!(
                job_id = %self.reference.job_id,
                page_token = %token,
                "Fetching next page"
            );
            let response = self.fetch_completed_page(options, Some(&token)).await?;
            handler.handle(response, &decode)?;
        }
        Ok(handler.into_results(Some(self.clone())))
    }

    /// Waits for the query to finish and decodes its rows (`jobs.getQueryResults`).
    ///
    /// With [`QueryOptions::timeout_ms`] set, an unfinished query is a
    /// [`BigQueryError::QueryTimeout`] instead of another poll.
    pub async fn get_query_results(&self, options: &QueryOptions) -> Result<QueryResults> {
        options.format_options.validate()?;
        let response = self.fetch_completed_page(options, options.page_token.as_deref()).await?;
        let mut handler = ResultsHandler::default();
        handler.handle(response, &options.decode_options())?;
        self.collect_pages(handler, options).await
    }

    async fn next_page(&self, state: PageState) -> Result<Option<(Vec<Row>, PageState)>> {
        if state.finished {
            return Ok(None);
        }
        state.options.format_options.validate()?;
        let response = self.fetch_completed_page(&state.options, state.token.as_deref()).await?;
        let mut handler = ResultsHandler { schema: state.schema, ..Default::default() };
        handler.handle(response, &state.options.decode_options())?;

        let next = PageState {
            finished: handler.page_token.is_none(),
            token: handler.page_token,
            schema: handler.schema,
            options: state.options,
        };
        Ok(Some((handler.rows, next)))
    }

    /// Streams decoded rows, fetching one page at a time as they are consumed.
    pub fn rows_stream(&self, options: QueryOptions) -> impl Stream<Item = Result<Row>> + '_ {
        let state =
            PageState { token: options.page_token.clone(), finished: false, schema: None, options };
        stream::try_unfold(state, move |state| self.next_page(state))
            .map_ok(|rows| stream::iter(rows.into_iter().map(Ok::<Row, BigQueryError>)))
            .try_flatten()
    }
}

/// The structured failure of a job whose status carries an error.
pub(crate) fn job_failure(job: JobReference, status: JobStatus) -> BigQueryError {
    let errors = match status.errors {
        Some(errors) if !errors.is_empty() => errors,
        _ => status.error_result.into_iter().collect(),
    };
    BigQueryError::JobFailed { job, errors }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::ClientBuilder;
    use crate::test_utils::test_utils::{MockTransport, setup_client};
    use crate::value::Value;

    use serde_json::json;
    use std::sync::Arc;

    fn page(values: &[&str], token: Option<&str>) -> serde_json::Value {
        let rows: Vec<_> = values.iter().map(|v| json!({ "f": [{ "v": v }] })).collect();
        let mut page = json!({
            "jobComplete": true,
            "jobReference": { "projectId": "test-project", "jobId": "job-1", "location": "US" },
            "schema": { "fields": [{ "name": "n", "type": "INTEGER" }] },
            "rows": rows,
            "totalRows": "3"
        });
        if let Some(token) = token {
            page["pageToken"] = json!(token);
        }
        page
    }

    #[tokio::test]
    async fn test_get_query_results_follows_page_tokens() -> Result<()> {
        // Arrange
        let (client, transport) = setup_client(vec![
            Ok(page(&["1", "2"], Some("token-2"))),
            Ok(page(&["3"], None)),
        ]);
        let job = client.job("job-1", None);

        // Act
        let results = job.get_query_results(&QueryOptions::default()).await?;

        // Assert
        let values: Vec<_> = results.rows.iter().map(|r| r.get("n").cloned()).collect();
        assert_eq!(
            values,
            vec![Some(Value::Int64(1)), Some(Value::Int64(2)), Some(Value::Int64(3))]
        );
        assert_eq!(results.total_rows, Some(3));

        let requests = transport.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].path(), "projects/test-project/queries/job-1");
        assert_eq!(requests[0].query_value("location"), Some("US"));
        assert_eq!(requests[0].query_value("formatOptions.useInt64Timestamp"), Some("true"));
        assert_eq!(requests[0].query_value("pageToken"), None);
        assert_eq!(requests[1].query_value("pageToken"), Some("token-2"));
        Ok(())
    }

    #[tokio::test]
    async fn test_single_page_keeps_token() -> Result<()> {
        let (client, transport) = setup_client(vec![Ok(page(&["1"], Some("next")))]);
        let options =
            QueryOptions { auto_paginate: false, max_results: Some(1), ..Default::default() };

        let results = client.job("job-1", None).get_query_results(&options).await?;

        assert_eq!(results.page_token.as_deref(), Some("next"));
        assert_eq!(transport.requests().len(), 1);
        assert_eq!(transport.requests()[0].query_value("maxResults"), Some("1"));
        Ok(())
    }

    #[tokio::test]
    async fn test_incomplete_results_are_polled() -> Result<()> {
        let (client, transport) = setup_client(vec![
            Ok(json!({ "jobComplete": false })),
            Ok(page(&["7"], None)),
        ]);

        let results = client.job("job-1", None).get_query_results(&QueryOptions::default()).await?;

        assert_eq!(results.rows.len(), 1);
        assert_eq!(transport.requests().len(), 2);
        Ok(())
    }

    #[tokio::test]
    async fn test_incomplete_results_with_timeout_fail() {
        let (client, _) = setup_client(vec![Ok(json!({ "jobComplete": false }))]);
        let options = QueryOptions { timeout_ms: Some(1000), ..Default::default() };

        let err = client.job("job-1", None).get_query_results(&options).await.unwrap_err();

        assert!(matches!(err, BigQueryError::QueryTimeout { timeout_ms: 1000 }));
        assert_eq!(err.to_string(), "The query did not complete before 1000ms");
    }

    #[tokio::test]
    async fn test_rows_stream_pulls_pages_lazily() -> Result<()> {
        let (client, transport) = setup_client(vec![
            Ok(page(&["1"], Some("token-2"))),
            Ok(page(&["2", "3"], None)),
        ]);
        let job = client.job("job-1", None);

        let rows: Vec<Row> = job.rows_stream(QueryOptions::default()).try_collect().await?;

        assert_eq!(rows.len(), 3);
        assert_eq!(transport.requests()[1].query_value("pageToken"), Some("token-2"));
        Ok(())
    }

    #[tokio::test]
    async fn test_follow_up_pages_without_schema_keep_their_rows() -> Result<()> {
        // Arrange
        let mut second = page(&["2", "3"], None);
        second.as_object_mut().unwrap().remove("schema");
        let (client, _) = setup_client(vec![
            Ok(page(&["1"], Some("token-2"))),
            Ok(second.clone()),
            Ok(page(&["1"], Some("token-2"))),
            Ok(second),
        ]);
        let job = client.job("job-1", None);

        // Act
        let results = job.get_query_results(&QueryOptions::default()).await?;
        let streamed: Vec<Row> = job.rows_stream(QueryOptions::default()).try_collect().await?;

        // Assert
        assert_eq!(results.rows.len(), 3);
        assert_eq!(results.rows[2].get("n"), Some(&Value::Int64(3)));
        assert_eq!(streamed.len(), 3);
        Ok(())
    }

    #[tokio::test]
    async fn test_missing_job_complete_keeps_polling() -> Result<()> {
        let mut unconfirmed = page(&[], None);
        unconfirmed.as_object_mut().unwrap().remove("jobComplete");
        let (client, transport) = setup_client(vec![Ok(unconfirmed), Ok(page(&["7"], None))]);

        let results = client.job("job-1", None).get_query_results(&QueryOptions::default()).await?;

        assert_eq!(results.rows.len(), 1);
        assert_eq!(transport.requests().len(), 2);
        Ok(())
    }

    #[tokio::test]
    async fn test_poll_surfaces_error_result() {
        let (client, _) = setup_client(vec![Ok(json!({
            "jobReference": { "projectId": "test-project", "jobId": "job-1" },
            "status": {
                "state": "DONE",
                "errorResult": { "reason": "invalidQuery", "message": "Syntax error" }
            }
        }))]);

        let err = client.job("job-1", None).poll().await.unwrap_err();

        match err {
            BigQueryError::JobFailed { job, errors } => {
                assert_eq!(job.job_id, "job-1");
                assert_eq!(errors[0].reason.as_deref(), Some("invalidQuery"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_wait_polls_until_done() -> Result<()> {
        // Arrange
        let transport = Arc::new(MockTransport::new(vec![
            Ok(json!({ "status": { "state": "RUNNING" } })),
            Ok(json!({ "status": { "state": "DONE" } })),
        ]));
        let client = ClientBuilder::new("test-project")?
            .poll_interval(Duration::from_millis(1))
            .transport(transport.clone())
            .build()?;

        // Act
        let metadata = client.job("job-1", None).wait().await?;

        // Assert
        assert!(metadata.status.unwrap().is_done());
        assert_eq!(transport.requests().len(), 2);
        assert_eq!(transport.requests()[0].query_value("location"), None);
        Ok(())
    }
}
