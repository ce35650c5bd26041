//! Query execution.
//!
//! A query takes the single-request `jobs.query` path when nothing in it
//! needs a full job configuration, and is inserted as a job otherwise.
//! Either way an unfinished query is handed to its [`Job`] for polling, and
//! page tokens are followed through the same job.

use crate::client::BigQueryClient;
use crate::client::ClientConfig;
use crate::client::handlers::ResultsHandler;
use crate::codec::build_query_params;
use crate::error::{BigQueryError, Result};
use crate::job::{Job, QueryResults, job_failure};
use crate::query::{Query, QueryOptions, QueryPriority};
use crate::transport::ApiRequest;
use crate::wire::{
    JobConfiguration, JobConfigurationQuery, JobReference, JobResource, QueryParameter,
    QueryRequest, QueryResponse,
};

use std::env;
use uuid::Uuid;

const ALREADY_EXISTS: u16 = 409;

/// The first setting that keeps `query` off the `jobs.query` path, if any.
///
/// Configuration the client does not model (`Query::extra`) counts as such
/// a setting.
pub fn job_only_reason(query: &Query, options: &QueryOptions) -> Option<&'static str> {
    let checks = [
        (query.destination.is_some(), "destination"),
        (query.table_definitions.is_some(), "tableDefinitions"),
        (query.create_disposition.is_some(), "createDisposition"),
        (query.write_disposition.is_some(), "writeDisposition"),
        (
            query.priority.is_some_and(|p| p != QueryPriority::Interactive),
            "priority",
        ),
        (query.use_legacy_sql == Some(true), "useLegacySql"),
        (query.maximum_billing_tier.is_some(), "maximumBillingTier"),
        (query.time_partitioning.is_some(), "timePartitioning"),
        (query.range_partitioning.is_some(), "rangePartitioning"),
        (query.clustering.is_some(), "clustering"),
        (
            query.destination_encryption_configuration.is_some(),
            "destinationEncryptionConfiguration",
        ),
        (query.schema_update_options.is_some(), "schemaUpdateOptions"),
        (query.job_timeout_ms.is_some(), "jobTimeoutMs"),
        (query.job_id.is_some(), "jobId"),
        (query.job_prefix.is_some(), "jobPrefix"),
        (query.dry_run, "dryRun"),
        (options.job.is_some(), "job"),
        (!query.extra.is_empty(), "extra"),
    ];
    checks.into_iter().find(|(hit, _)| *hit).map(|(_, name)| name)
}

fn fast_path_enabled(config: &ClientConfig) -> bool {
    config.fast_path
        && !env::var("FAST_QUERY_PATH").is_ok_and(|v| v.eq_ignore_ascii_case("DISABLED"))
}

fn encode_params(query: &Query) -> Result<(Option<Vec<QueryParameter>>, Option<String>)> {
    match &query.params {
        None => Ok((None, None)),
        Some(params) => Ok((
            Some(build_query_params(params, query.types.as_ref())?),
            Some(params.mode().as_str().to_string()),
        )),
    }
}

/// The `jobs.query` body for `query`, or `None` when it needs the job path.
pub(crate) fn build_query_request(
    config: &ClientConfig,
    query: &Query,
    options: &QueryOptions,
) -> Result<Option<QueryRequest>> {
    if !fast_path_enabled(config) {
        tracing::debug!("Fast query path disabled, inserting a job");
        return Ok(None);
    }
    if let Some(reason) = job_only_reason(query, options) {
        tracing::debug!(reason, "Query needs a job, inserting one");
        return Ok(None);
    }
    options.format_options.validate()?;

    let (query_parameters, parameter_mode) = encode_params(query)?;
    Ok(Some(QueryRequest {
        query: query.query.clone(),
        query_parameters,
        parameter_mode,
        location: query
            .location
            .clone()
            .or_else(|| options.location.clone())
            .or_else(|| config.location.clone()),
        max_results: query.max_results.or(options.max_results),
        timeout_ms: options.timeout_ms,
        use_legacy_sql: false,
        request_id: Uuid::new_v4().to_string(),
        format_options: Some(options.format_options),
        default_dataset: query.default_dataset.clone(),
        labels: query.labels.clone(),
        maximum_bytes_billed: query.maximum_bytes_billed.clone(),
        use_query_cache: query.use_query_cache,
        job_creation_mode: query
            .job_creation_mode
            .or(config.job_creation_mode)
            .map(|mode| mode.as_str().to_string()),
        reservation: query.reservation.clone(),
    }))
}

/// The `jobs.insert` body for `query`.
pub(crate) fn build_job_resource(config: &ClientConfig, query: &Query) -> Result<JobResource> {
    let (query_parameters, parameter_mode) = encode_params(query)?;
    let job_id = format!(
        "{}{}",
        query.job_prefix.as_deref().unwrap_or_default(),
        query.job_id.clone().unwrap_or_else(|| Uuid::new_v4().to_string())
    );

    let configuration = JobConfigurationQuery {
        query: query.query.clone(),
        query_parameters,
        parameter_mode,
        use_legacy_sql: Some(query.use_legacy_sql.unwrap_or(false)),
        destination_table: query.destination.clone(),
        table_definitions: query.table_definitions.clone(),
        create_disposition: query.create_disposition.clone(),
        write_disposition: query.write_disposition.clone(),
        priority: query.priority.map(|p| p.as_str().to_string()),
        maximum_billing_tier: query.maximum_billing_tier,
        time_partitioning: query.time_partitioning.clone(),
        range_partitioning: query.range_partitioning.clone(),
        clustering: query.clustering.clone(),
        destination_encryption_configuration: query.destination_encryption_configuration.clone(),
        schema_update_options: query.schema_update_options.clone(),
        default_dataset: query.default_dataset.clone(),
        maximum_bytes_billed: query.maximum_bytes_billed.clone(),
        use_query_cache: query.use_query_cache,
        extra: query.extra.clone(),
    };

    Ok(JobResource {
        job_reference: Some(JobReference {
            project_id: config.project_id.clone(),
            job_id,
            location: query.location.clone().or_else(|| config.location.clone()),
        }),
        configuration: Some(JobConfiguration {
            query: Some(configuration),
            dry_run: query.dry_run.then_some(true),
            labels: query.labels.clone(),
            job_timeout_ms: query.job_timeout_ms.map(|ms| ms.to_string()),
            reservation: query.reservation.clone(),
        }),
        ..Default::default()
    })
}

/// Inserts `query` as a job and returns its handle.
///
/// A 409 for a job id the client generated means an earlier attempt already
/// created the job, so its metadata is fetched instead.
pub(crate) async fn insert_query_job(client: &BigQueryClient, query: &Query) -> Result<Job> {
    let resource = build_job_resource(client.config(), query)?;
    let reference = resource.job_reference.clone().unwrap_or_default();
    let body = serde_json::to_value(&resource)?;

    tracing::debug!(
        job_id = %reference.job_id,
        location = ?reference.location,
        "Inserting query job"
    );
    let inserted = client
        .call::<JobResource>(ApiRequest::post(
            ["projects", client.project_id(), "jobs"],
            body,
        ))
        .await;

    let metadata = match inserted {
        Ok(metadata) => metadata,
        Err(BigQueryError::Api { status: ALREADY_EXISTS, .. })
            if query.job_id.is_none() && !query.dry_run =>
        {
            tracing::debug!(job_id = %reference.job_id, "Job already exists, fetching it");
            client.job_from_reference(reference.clone()).get_metadata().await?
        }
        Err(err) => return Err(err),
    };

    // The server confirms the reference, including the location it picked.
    let confirmed = metadata.job_reference.clone().unwrap_or(reference);
    if let Some(status) = metadata.status {
        if status.error_result.is_some() {
            return Err(job_failure(confirmed, status));
        }
    }
    Ok(client.job_from_reference(confirmed))
}

/// Runs `query` to completion and decodes its rows.
pub(crate) async fn run(
    client: &BigQueryClient,
    query: Query,
    mut options: QueryOptions,
) -> Result<QueryResults> {
    options.format_options.validate()?;
    options.max_results = options.max_results.or(query.max_results);

    if let Some(job) = options.job.clone() {
        tracing::debug!(job_id = %job.id(), "Continuing from an existing job");
        return job.get_query_results(&options).await;
    }

    let Some(request) = build_query_request(client.config(), &query, &options)? else {
        let job = insert_query_job(client, &query).await?;
        if query.dry_run {
            return Ok(QueryResults { job: Some(job), ..Default::default() });
        }
        return job.get_query_results(&options).await;
    };

    tracing::debug!(
        location = ?request.location,
        request_id = %request.request_id,
        "Running query through jobs.query"
    );
    let timeout_ms = request.timeout_ms;
    let location = request.location.clone();
    let response: QueryResponse = client
        .call(ApiRequest::post(
            ["projects", client.project_id(), "queries"],
            serde_json::to_value(&request)?,
        ))
        .await?;

    let job = match (&response.job_reference, &response.query_id) {
        (Some(reference), _) => Some(client.job_from_reference(reference.clone())),
        (None, Some(query_id)) => Some(client.job(query_id.clone(), location)),
        (None, None) => None,
    };

    if response.is_complete() {
        let mut handler = ResultsHandler::default();
        handler.handle(response, &options.decode_options())?;
        return match job {
            Some(job) => job.collect_pages(handler, &options).await,
            None => Ok(handler.into_results(None)),
        };
    }

    if let Some(timeout_ms) = timeout_ms {
        return Err(BigQueryError::QueryTimeout { timeout_ms });
    }
    let job = job.ok_or_else(|| {
        BigQueryError::Decode("incomplete jobs.query response without a job reference".into())
    })?;
    tracing::debug!(job_id = %job.id(), "Query not complete, polling the job");
    options.timeout_ms = None;
    job.get_query_results(&options).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::JobCreationMode;
    use crate::codec::QueryParams;
    use crate::format::{FormatOptions, TimestampOutputFormat};
    use crate::test_utils::test_utils::setup_client;
    use crate::transport::Method;
    use crate::value::Value;
    use crate::wire::TableReference;

    use serde_json::json;

    fn job_reference() -> serde_json::Value {
        json!({ "projectId": "test-project", "jobId": "job-1", "location": "US" })
    }

    fn completed_page(values: &[&str], token: Option<&str>) -> serde_json::Value {
        let rows: Vec<_> = values.iter().map(|v| json!({ "f": [{ "v": v }] })).collect();
        let mut page = json!({
            "jobComplete": true,
            "jobReference": job_reference(),
            "schema": { "fields": [{ "name": "word", "type": "STRING" }] },
            "rows": rows
        });
        if let Some(token) = token {
            page["pageToken"] = json!(token);
        }
        page
    }

    #[test]
    fn test_destination_and_legacy_sql_force_the_job_path() {
        // Arrange
        let config = ClientConfig::new("p").unwrap();
        let options = QueryOptions::default();
        let destination = Query::new("SELECT 1").destination(TableReference {
            project_id: "p".into(),
            dataset_id: "d".into(),
            table_id: "t".into(),
        });
        let legacy = Query::new("SELECT 1").use_legacy_sql(true);

        // Act / Assert
        assert_eq!(job_only_reason(&destination, &options), Some("destination"));
        assert_eq!(job_only_reason(&legacy, &options), Some("useLegacySql"));
        assert!(build_query_request(&config, &destination, &options).unwrap().is_none());
        assert!(build_query_request(&config, &legacy, &options).unwrap().is_none());
    }

    #[test]
    fn test_job_only_settings() {
        let options = QueryOptions::default();
        let cases = [
            Query::new("q").priority(QueryPriority::Batch),
            Query::new("q").job_id("mine"),
            Query::new("q").job_timeout_ms(1000),
            Query::new("q").dry_run(true),
            Query::new("q").extra("continuous", json!(true)),
            Query { clustering: Some(json!({ "fields": ["a"] })), ..Query::new("q") },
        ];

        for query in cases {
            assert!(job_only_reason(&query, &options).is_some(), "{query:?} should need a job");
        }
        assert_eq!(
            job_only_reason(&Query::new("q").priority(QueryPriority::Interactive), &options),
            None
        );
    }

    #[test]
    fn test_query_request_shape() {
        // Arrange
        let mut config = ClientConfig::new("p").unwrap();
        config.location = Some("EU".into());
        config.job_creation_mode = Some(JobCreationMode::Optional);
        let query = Query::new("SELECT @x").params(QueryParams::named([("x", 1)]));
        let options = QueryOptions { timeout_ms: Some(5000), ..Default::default() };

        // Act
        let request = build_query_request(&config, &query, &options).unwrap().unwrap();
        let body = serde_json::to_value(&request).unwrap();

        // Assert
        assert_eq!(body["query"], "SELECT @x");
        assert_eq!(body["useLegacySql"], false);
        assert_eq!(body["location"], "EU");
        assert_eq!(body["timeoutMs"], 5000);
        assert_eq!(body["parameterMode"], "named");
        assert_eq!(body["formatOptions"], json!({ "useInt64Timestamp": true }));
        assert_eq!(body["jobCreationMode"], "JOB_CREATION_OPTIONAL");
        assert!(Uuid::parse_str(&request.request_id).is_ok());
    }

    #[test]
    fn test_request_ids_are_fresh() {
        let config = ClientConfig::new("p").unwrap();
        let query = Query::new("SELECT 1");
        let options = QueryOptions::default();

        let first = build_query_request(&config, &query, &options).unwrap().unwrap();
        let second = build_query_request(&config, &query, &options).unwrap().unwrap();

        assert_ne!(first.request_id, second.request_id);
    }

    #[test]
    fn test_disabled_fast_path_builds_no_request() {
        let mut config = ClientConfig::new("p").unwrap();
        config.fast_path = false;

        let request =
            build_query_request(&config, &Query::new("SELECT 1"), &QueryOptions::default());

        assert!(request.unwrap().is_none());
    }

    #[test]
    fn test_job_resource_shape() {
        let config = ClientConfig::new("p").unwrap();
        let query = Query::new("SELECT 1")
            .job_prefix("nightly-")
            .job_timeout_ms(60_000)
            .priority(QueryPriority::Batch)
            .location("EU");

        let resource = build_job_resource(&config, &query).unwrap();
        let body = serde_json::to_value(&resource).unwrap();

        let job_id = body["jobReference"]["jobId"].as_str().unwrap();
        assert!(job_id.starts_with("nightly-"));
        assert!(Uuid::parse_str(&job_id["nightly-".len()..]).is_ok());
        assert_eq!(body["jobReference"]["location"], "EU");
        assert_eq!(body["configuration"]["jobTimeoutMs"], "60000");
        assert_eq!(body["configuration"]["query"]["useLegacySql"], false);
        assert_eq!(body["configuration"]["query"]["priority"], "BATCH");
        assert!(body["configuration"].get("dryRun").is_none());
    }

    #[tokio::test]
    async fn test_fast_path_pagination_requests_exactly_one_more_page() -> Result<()> {
        // Arrange
        let (client, transport) = setup_client(vec![
            Ok(completed_page(&["a", "b"], Some("token-2"))),
            Ok(completed_page(&["c"], None)),
        ]);

        // Act
        let results = client.query("SELECT word FROM t", QueryOptions::default()).await?;

        // Assert
        let words: Vec<_> = results.rows.iter().map(|r| r.get("word").cloned().unwrap()).collect();
        assert_eq!(
            words,
            vec![Value::String("a".into()), Value::String("b".into()), Value::String("c".into())]
        );
        assert!(results.page_token.is_none());

        let requests = transport.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].method, Method::Post);
        assert_eq!(requests[0].path(), "projects/test-project/queries");
        assert_eq!(requests[1].method, Method::Get);
        assert_eq!(requests[1].path(), "projects/test-project/queries/job-1");
        assert_eq!(requests[1].query_value("pageToken"), Some("token-2"));
        assert_eq!(requests[1].query_value("formatOptions.useInt64Timestamp"), Some("true"));
        Ok(())
    }

    #[tokio::test]
    async fn test_fast_path_incomplete_with_timeout_is_an_error() {
        let (client, transport) = setup_client(vec![Ok(json!({
            "jobComplete": false,
            "jobReference": job_reference()
        }))]);
        let options = QueryOptions { timeout_ms: Some(250), ..Default::default() };

        let err = client.query("SELECT 1", options).await.unwrap_err();

        assert!(matches!(err, BigQueryError::QueryTimeout { timeout_ms: 250 }));
        assert_eq!(transport.requests().len(), 1);
    }

    #[tokio::test]
    async fn test_fast_path_incomplete_polls_the_job() -> Result<()> {
        let (client, transport) = setup_client(vec![
            Ok(json!({ "jobComplete": false, "jobReference": job_reference() })),
            Ok(json!({ "jobComplete": false })),
            Ok(completed_page(&["done"], None)),
        ]);

        let results = client.query("SELECT 1", QueryOptions::default()).await?;

        assert_eq!(results.rows.len(), 1);
        assert_eq!(results.job.unwrap().id(), "job-1");
        let requests = transport.requests();
        assert_eq!(requests.len(), 3);
        assert!(requests[1..].iter().all(|r| r.query_value("timeoutMs").is_none()));
        Ok(())
    }

    #[tokio::test]
    async fn test_fast_path_without_job_complete_is_treated_as_running() -> Result<()> {
        // Arrange
        let mut unconfirmed = completed_page(&["early"], None);
        unconfirmed.as_object_mut().unwrap().remove("jobComplete");
        let (client, transport) =
            setup_client(vec![Ok(unconfirmed.clone()), Ok(completed_page(&["done"], None))]);

        // Act
        let results = client.query("SELECT 1", QueryOptions::default()).await?;

        // Assert
        assert_eq!(results.rows.len(), 1);
        assert_eq!(results.rows[0].get("word"), Some(&Value::String("done".into())));
        let requests = transport.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[1].path(), "projects/test-project/queries/job-1");

        let (client, _) = setup_client(vec![Ok(unconfirmed)]);
        let options = QueryOptions { timeout_ms: Some(100), ..Default::default() };
        let err = client.query("SELECT 1", options).await.unwrap_err();
        assert!(matches!(err, BigQueryError::QueryTimeout { timeout_ms: 100 }));
        Ok(())
    }

    #[tokio::test]
    async fn test_stateless_query_without_job_reference() -> Result<()> {
        let (client, _) = setup_client(vec![Ok(json!({
            "jobComplete": true,
            "queryId": "q-123",
            "schema": { "fields": [{ "name": "n", "type": "INT64" }] },
            "rows": [{ "f": [{ "v": "1" }] }]
        }))]);

        let results = client.query("SELECT 1 AS n", QueryOptions::default()).await?;

        assert_eq!(results.rows[0].get("n"), Some(&Value::Int64(1)));
        assert_eq!(results.job.unwrap().id(), "q-123");
        Ok(())
    }

    #[tokio::test]
    async fn test_job_path_inserts_then_reads_results() -> Result<()> {
        // Arrange
        let (client, transport) = setup_client(vec![
            Ok(json!({
                "jobReference": {
                    "projectId": "test-project",
                    "jobId": "custom",
                    "location": "EU"
                },
                "status": { "state": "RUNNING" }
            })),
            Ok(completed_page(&["x"], None)),
        ]);
        let query = Query::new("SELECT word FROM t").job_id("custom");

        // Act
        let results = client.query(query, QueryOptions::default()).await?;

        // Assert
        assert_eq!(results.rows.len(), 1);
        let requests = transport.requests();
        assert_eq!(requests[0].path(), "projects/test-project/jobs");
        let body = requests[0].body.clone().unwrap();
        assert_eq!(body["jobReference"]["jobId"], "custom");
        assert_eq!(body["configuration"]["query"]["query"], "SELECT word FROM t");
        assert_eq!(requests[1].path(), "projects/test-project/queries/custom");
        assert_eq!(requests[1].query_value("location"), Some("EU"));
        Ok(())
    }

    #[tokio::test]
    async fn test_dry_run_returns_no_rows() -> Result<()> {
        let (client, transport) = setup_client(vec![Ok(json!({
            "jobReference": { "projectId": "test-project", "jobId": "dry" },
            "status": { "state": "DONE" },
            "statistics": { "totalBytesProcessed": "1024" }
        }))]);

        let results =
            client.query(Query::new("SELECT 1").dry_run(true), QueryOptions::default()).await?;

        assert!(results.rows.is_empty());
        assert_eq!(transport.requests().len(), 1);
        assert_eq!(transport.requests()[0].body.clone().unwrap()["configuration"]["dryRun"], true);
        Ok(())
    }

    #[tokio::test]
    async fn test_inserted_job_with_error_result_fails() {
        let (client, _) = setup_client(vec![Ok(json!({
            "jobReference": { "projectId": "test-project", "jobId": "bad" },
            "status": {
                "state": "DONE",
                "errorResult": { "reason": "invalidQuery", "message": "Unrecognized name: wrd" },
                "errors": [{ "reason": "invalidQuery", "message": "Unrecognized name: wrd" }]
            }
        }))]);

        let err = client.create_query_job(Query::new("SELECT wrd")).await.unwrap_err();

        assert!(matches!(err, BigQueryError::JobFailed { ref job, .. } if job.job_id == "bad"));
        assert!(err.to_string().contains("Unrecognized name: wrd"));
    }

    #[tokio::test]
    async fn test_generated_job_id_conflict_fetches_the_job() -> Result<()> {
        let (client, transport) = setup_client(vec![
            Err(BigQueryError::Api { status: 409, message: "Already Exists".into() }),
            Ok(json!({
                "jobReference": {
                    "projectId": "test-project",
                    "jobId": "existing",
                    "location": "US"
                },
                "status": { "state": "RUNNING" }
            })),
        ]);

        let job = client.create_query_job("SELECT 1").await?;

        assert_eq!(job.id(), "existing");
        let requests = transport.requests();
        assert_eq!(requests[1].method, Method::Get);
        assert!(requests[1].path().starts_with("projects/test-project/jobs/"));
        Ok(())
    }

    #[tokio::test]
    async fn test_provided_job_id_conflict_is_an_error() {
        let (client, _) = setup_client(vec![Err(BigQueryError::Api {
            status: 409,
            message: "Already Exists".into(),
        })]);

        let err =
            client.create_query_job(Query::new("SELECT 1").job_id("taken")).await.unwrap_err();

        assert!(matches!(err, BigQueryError::Api { status: 409, .. }));
    }

    #[tokio::test]
    async fn test_existing_job_handle_skips_submission() -> Result<()> {
        let (client, transport) = setup_client(vec![Ok(completed_page(&["x"], None))]);
        let options = QueryOptions { job: Some(client.job("job-1", None)), ..Default::default() };

        let results = client.query("SELECT 1", options).await?;

        assert_eq!(results.rows.len(), 1);
        assert_eq!(transport.requests()[0].method, Method::Get);
        Ok(())
    }

    #[tokio::test]
    async fn test_conflicting_format_options_fail_before_sending() {
        let (client, transport) = setup_client(vec![]);
        let options = QueryOptions {
            format_options: FormatOptions {
                use_int64_timestamp: Some(true),
                timestamp_output_format: Some(TimestampOutputFormat::Iso8601String),
            },
            ..Default::default()
        };

        let err = client.query("SELECT 1", options).await.unwrap_err();

        assert!(matches!(err, BigQueryError::ConflictingOptions(_)));
        assert!(transport.requests().is_empty());
    }

    #[tokio::test]
    async fn test_timestamps_decode_with_the_requested_format() -> Result<()> {
        let (client, _) = setup_client(vec![Ok(json!({
            "jobComplete": true,
            "jobReference": job_reference(),
            "schema": { "fields": [{ "name": "ts", "type": "TIMESTAMP" }] },
            "rows": [{ "f": [{ "v": "1672574400123456" }] }]
        }))]);

        let results = client.query("SELECT ts FROM t", QueryOptions::default()).await?;

        match results.rows[0].get("ts") {
            Some(Value::Timestamp(ts)) => assert_eq!(ts.value(), "2023-01-01T12:00:00.123456Z"),
            other => panic!("unexpected value: {other:?}"),
        }
        Ok(())
    }
}
