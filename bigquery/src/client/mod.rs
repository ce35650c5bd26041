//! Low-level REST client for BigQuery.
//!
//! [`BigQueryClient`] owns the [`ClientConfig`] and the [`Transport`] every
//! call goes through. Query execution lives in [`executor`](crate::executor);
//! the client is the handle callers hold on to.
mod builder;
pub(crate) mod handlers;
mod middleware;

pub use self::builder::{ClientBuilder, ClientConfig, JobCreationMode};
pub use self::middleware::HeaderInterceptor;

use crate::error::Result;
use crate::executor;
use crate::job::{Job, QueryResults};
use crate::query::{Query, QueryOptions, SqlQueryBuilder};
use crate::table::Table;
use crate::transport::{ApiRequest, Transport};
use crate::wire::JobReference;

use serde::de::DeserializeOwned;
use std::sync::Arc;

/// Cheap to clone; clones share the configuration and the transport.
#[derive(Clone, Debug)]
pub struct BigQueryClient {
    config: Arc<ClientConfig>,
    transport: Arc<dyn Transport>,
}

impl BigQueryClient {
    pub(crate) fn new(config: ClientConfig, transport: Arc<dyn Transport>) -> Self {
        Self { config: Arc::new(config), transport }
    }

    pub fn project_id(&self) -> &str {
        &self.config.project_id
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Sends one request and deserializes the response body.
    pub(crate) async fn call<T: DeserializeOwned>(&self, request: ApiRequest) -> Result<T> {
        let body = self.transport.send(request).await?;
        Ok(serde_json::from_value(body)?)
    }

    /// Runs a query and returns its decoded rows.
    ///
    /// Takes the single-request `jobs.query` path when the query allows it,
    /// and falls back to inserting a job otherwise. With
    /// [`QueryOptions::auto_paginate`] set, every page is fetched.
    pub async fn query(
        &self,
        query: impl Into<Query>,
        options: QueryOptions,
    ) -> Result<QueryResults> {
        executor::run(self, query.into(), options).await
    }

    /// Inserts a query job without waiting for it.
    pub async fn create_query_job(&self, query: impl Into<Query>) -> Result<Job> {
        executor::insert_query_job(self, &query.into()).await
    }

    /// Handle to an existing job. `location` defaults to the client's.
    pub fn job(&self, job_id: impl Into<String>, location: Option<String>) -> Job {
        Job::new(
            self.clone(),
            JobReference {
                project_id: self.config.project_id.clone(),
                job_id: job_id.into(),
                location: location.or_else(|| self.config.location.clone()),
            },
        )
    }

    pub(crate) fn job_from_reference(&self, reference: JobReference) -> Job {
        Job::new(self.clone(), reference)
    }

    pub fn table(&self, dataset_id: impl Into<String>, table_id: impl Into<String>) -> Table {
        Table::new(self.clone(), dataset_id.into(), table_id.into())
    }

    /// Alternative ["sqlx-like"](https://docs.rs/sqlx/latest/sqlx/) query interface.
    /// Returns a [`SqlQueryBuilder`] to `bind()` parameters and `execute()`.
    pub fn query_builder(&self, sql: &str) -> SqlQueryBuilder<'_> {
        SqlQueryBuilder::new(self, sql)
    }
}
