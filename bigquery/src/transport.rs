//! The REST seam.
//!
//! Every server round trip goes through a [`Transport`]. [`HttpTransport`]
//! is the production implementation; tests script their own.

use crate::client::HeaderInterceptor;
use crate::error::{BigQueryError, Result};

use async_trait::async_trait;
use reqwest::header::HeaderMap;
use serde::Deserialize;
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;
use url::Url;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Method::Get => f.write_str("GET"),
            Method::Post => f.write_str("POST"),
        }
    }
}

/// One REST call, relative to `{endpoint}/bigquery/v2`.
#[derive(Clone, Debug, PartialEq)]
pub struct ApiRequest {
    pub method: Method,
    /// Unescaped path segments, e.g. `["projects", "p", "queries"]`.
    pub segments: Vec<String>,
    pub query: Vec<(String, String)>,
    pub body: Option<serde_json::Value>,
}

impl ApiRequest {
    pub fn get<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            method: Method::Get,
            segments: segments.into_iter().map(Into::into).collect(),
            query: Vec::new(),
            body: None,
        }
    }

    pub fn post<I, S>(segments: I, body: serde_json::Value) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self { method: Method::Post, body: Some(body), ..Self::get(segments) }
    }

    pub fn with_query(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.query.push((key.into(), value.to_string()));
        self
    }

    /// Slash-joined path, for logging and matching.
    pub fn path(&self) -> String {
        self.segments.join("/")
    }

    pub fn query_value(&self, key: &str) -> Option<&str> {
        self.query.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str())
    }
}

#[async_trait]
pub trait Transport: Send + Sync + fmt::Debug {
    /// Sends the request and returns the decoded JSON body of a 2xx response.
    async fn send(&self, request: ApiRequest) -> Result<serde_json::Value>;
}

/// [`Transport`] over HTTPS with `reqwest`.
#[derive(Clone, Debug)]
pub struct HttpTransport {
    http: reqwest::Client,
    base_url: Url,
}

impl HttpTransport {
    /// `endpoint` is the API root, e.g. `https://bigquery.googleapis.com`.
    pub fn new(
        endpoint: &Url,
        headers: HashMap<String, String>,
        timeout: Option<Duration>,
    ) -> Result<Self> {
        let default_headers = HeaderInterceptor::new(headers).call(HeaderMap::new())?;

        let mut builder = reqwest::Client::builder()
            .default_headers(default_headers)
            .user_agent(concat!("bigquery-rs/", env!("CARGO_PKG_VERSION")));
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }

        let mut base_url = endpoint.clone();
        base_url
            .path_segments_mut()
            .map_err(|_| {
                BigQueryError::InvalidConnectionUrl(format!("{endpoint} cannot be a base URL"))
            })?
            .pop_if_empty()
            .extend(["bigquery", "v2"]);

        Ok(Self { http: builder.build()?, base_url })
    }

    fn url_for(&self, request: &ApiRequest) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| BigQueryError::InvalidConnectionUrl(self.base_url.to_string()))?
            .extend(&request.segments);
        Ok(url)
    }
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: String,
}

/// The `error.message` of a Google API error body, or the body itself.
fn api_error_message(body: &str) -> String {
    serde_json::from_str::<ErrorEnvelope>(body)
        .map(|envelope| envelope.error.message)
        .unwrap_or_else(|_| body.to_string())
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: ApiRequest) -> Result<serde_json::Value> {
        let url = self.url_for(&request)?;
        tracing::debug!(method = %request.method, path = %request.path(), "Sending request");

        let mut builder = match request.method {
            Method::Get => self.http.get(url),
            Method::Post => self.http.post(url),
        };
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BigQueryError::Api {
                status: status.as_u16(),
                message: api_error_message(&body),
            });
        }

        let text = response.text().await?;
        if text.trim().is_empty() {
            return Ok(serde_json::Value::Object(Default::default()));
        }
        Ok(serde_json::from_str(&text)?)
    }
}
