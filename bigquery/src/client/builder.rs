use super::BigQueryClient;
use crate::error::{BigQueryError, Result};
use crate::transport::{HttpTransport, Transport};

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::env;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

pub(crate) const DEFAULT_ENDPOINT: &str = "https://bigquery.googleapis.com";

/// Whether the server may answer a fast-path query without creating a job.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobCreationMode {
    #[serde(rename = "JOB_CREATION_REQUIRED")]
    Required,
    #[serde(rename = "JOB_CREATION_OPTIONAL")]
    Optional,
}

impl JobCreationMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobCreationMode::Required => "JOB_CREATION_REQUIRED",
            JobCreationMode::Optional => "JOB_CREATION_OPTIONAL",
        }
    }
}

impl FromStr for JobCreationMode {
    type Err = BigQueryError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "JOB_CREATION_REQUIRED" | "REQUIRED" => Ok(JobCreationMode::Required),
            "JOB_CREATION_OPTIONAL" | "OPTIONAL" => Ok(JobCreationMode::Optional),
            _ => Err(BigQueryError::InvalidArgument(format!(
                "Unknown job creation mode: {s}"
            ))),
        }
    }
}

/// Settings shared by every call a [`BigQueryClient`] makes.
#[derive(Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub project_id: String,
    /// Default location for queries and jobs.
    pub location: Option<String>,
    /// API root; `/bigquery/v2` is appended.
    pub endpoint: Url,
    /// Static headers, including `authorization` when a token is set.
    pub headers: HashMap<String, String>,
    pub job_creation_mode: Option<JobCreationMode>,
    /// `false` sends every query through `jobs.insert`.
    pub fast_path: bool,
    /// Pause between result polls of an incomplete job.
    pub poll_interval: Option<Duration>,
    pub request_timeout: Option<Duration>,
}

impl ClientConfig {
    pub fn new(project_id: impl Into<String>) -> Result<Self> {
        Ok(Self {
            project_id: project_id.into(),
            location: None,
            endpoint: Url::parse(DEFAULT_ENDPOINT)?,
            headers: HashMap::new(),
            job_creation_mode: None,
            fast_path: true,
            poll_interval: None,
            request_timeout: None,
        })
    }
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let header_names: Vec<&String> = self.headers.keys().collect();
        f.debug_struct("ClientConfig")
            .field("project_id", &self.project_id)
            .field("location", &self.location)
            .field("endpoint", &self.endpoint.as_str())
            .field("headers", &header_names)
            .field("job_creation_mode", &self.job_creation_mode)
            .field("fast_path", &self.fast_path)
            .field("poll_interval", &self.poll_interval)
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

/// Builder for creating [`BigQueryClient`] instances.
///
/// # Example
///
/// ```
/// use bigquery::ClientBuilder;
///
/// let client = ClientBuilder::from_connection_string(
///     "bigquery://localhost:9050/my-project?location=EU&tls=false",
/// )
/// .unwrap()
/// .build()
/// .unwrap();
///
/// assert_eq!(client.project_id(), "my-project");
/// ```
#[derive(Clone, Debug)]
pub struct ClientBuilder {
    config: ClientConfig,
    transport: Option<Arc<dyn Transport>>,
}

impl ClientBuilder {
    pub fn new(project_id: impl Into<String>) -> Result<Self> {
        Ok(Self { config: ClientConfig::new(project_id)?, transport: None })
    }

    /// Parses `bigquery://host[:port]/<project>?key=value&...`.
    ///
    /// Recognised keys: `location`, `token`, `job_creation_mode`,
    /// `fast_path`, `tls`, `poll_interval_ms`, `timeout_ms`. Any other key
    /// is sent as a static header.
    pub fn from_connection_string(connection: &str) -> Result<Self> {
        let url = Url::parse(connection)?;
        if url.scheme() != "bigquery" {
            return Err(BigQueryError::InvalidConnectionUrl(format!(
                "expected the bigquery:// scheme, got {}://",
                url.scheme()
            )));
        }
        let host = url
            .host_str()
            .ok_or_else(|| BigQueryError::InvalidConnectionUrl("missing host".into()))?;
        let project = url
            .path_segments()
            .and_then(|mut segments| segments.find(|s| !s.is_empty()))
            .ok_or_else(|| {
                BigQueryError::InvalidConnectionUrl("missing project id in path".into())
            })?
            .to_string();

        let mut builder = Self::new(project)?;
        let mut tls = true;
        for (key, value) in url.query_pairs() {
            match &*key {
                "location" => builder = builder.location(value),
                "token" => builder = builder.bearer_token(&value),
                "job_creation_mode" => builder = builder.job_creation_mode(value.parse()?),
                "fast_path" => builder = builder.fast_path(parse_flag(&key, &value)?),
                "tls" => tls = parse_flag(&key, &value)?,
                "poll_interval_ms" => {
                    let millis = parse_millis(&key, &value)?;
                    builder = builder.poll_interval(Duration::from_millis(millis))
                }
                "timeout_ms" => {
                    let millis = parse_millis(&key, &value)?;
                    builder = builder.request_timeout(Duration::from_millis(millis))
                }
                _ => builder = builder.header(key.to_string(), value),
            }
        }

        let scheme = if tls { "https" } else { "http" };
        let endpoint = match url.port() {
            Some(port) => format!("{scheme}://{host}:{port}"),
            None => format!("{scheme}://{host}"),
        };
        builder.endpoint(&endpoint)
    }

    /// Project from `GOOGLE_CLOUD_PROJECT` or `GCLOUD_PROJECT`; endpoint from
    /// `BIGQUERY_EMULATOR_HOST`; `FAST_QUERY_PATH=DISABLED` turns the fast path off.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let project = lookup("GOOGLE_CLOUD_PROJECT")
            .or_else(|| lookup("GCLOUD_PROJECT"))
            .ok_or_else(|| {
                BigQueryError::InvalidArgument(
                    "Set GOOGLE_CLOUD_PROJECT or GCLOUD_PROJECT to pick a project".into(),
                )
            })?;

        let mut builder = Self::new(project)?;
        if let Some(host) = lookup("BIGQUERY_EMULATOR_HOST") {
            let endpoint = if host.contains("://") { host } else { format!("http://{host}") };
            builder = builder.endpoint(&endpoint)?;
        }
        if lookup("FAST_QUERY_PATH").is_some_and(|v| v.eq_ignore_ascii_case("DISABLED")) {
            builder = builder.fast_path(false);
        }
        Ok(builder)
    }

    pub fn location(mut self, location: impl Into<String>) -> Self {
        self.config.location = Some(location.into());
        self
    }

    pub fn endpoint(mut self, endpoint: &str) -> Result<Self> {
        self.config.endpoint = Url::parse(endpoint)?;
        Ok(self)
    }

    pub fn bearer_token(self, token: &str) -> Self {
        self.header("authorization", format!("Bearer {token}"))
    }

    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.config.headers.insert(key.into(), value.into());
        self
    }

    pub fn job_creation_mode(mut self, mode: JobCreationMode) -> Self {
        self.config.job_creation_mode = Some(mode);
        self
    }

    pub fn fast_path(mut self, enabled: bool) -> Self {
        self.config.fast_path = enabled;
        self
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.config.poll_interval = Some(interval);
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.config.request_timeout = Some(timeout);
        self
    }

    /// Replaces the HTTP transport, e.g. with an in-memory one.
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Validates the headers and returns a ready-to-use client.
    pub fn build(self) -> Result<BigQueryClient> {
        let transport = match self.transport {
            Some(transport) => transport,
            None => Arc::new(HttpTransport::new(
                &self.config.endpoint,
                self.config.headers.clone(),
                self.config.request_timeout,
            )?),
        };
        Ok(BigQueryClient::new(self.config, transport))
    }
}

fn parse_flag(key: &str, value: &str) -> Result<bool> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "enabled" => Ok(true),
        "false" | "0" | "no" | "disabled" => Ok(false),
        _ => Err(BigQueryError::InvalidConnectionUrl(format!(
            "{key} expects a boolean, got {value}"
        ))),
    }
}

fn parse_millis(key: &str, value: &str) -> Result<u64> {
    value.parse().map_err(|_| {
        BigQueryError::InvalidConnectionUrl(format!("{key} expects milliseconds, got {value}"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_string_sets_config() {
        // Arrange
        let connection = "bigquery://localhost:9050/my-project?location=EU&token=abc\
                          &job_creation_mode=optional&fast_path=false&tls=false\
                          &poll_interval_ms=250&x-goog-user-project=billing";

        // Act
        let builder = ClientBuilder::from_connection_string(connection).unwrap();

        // Assert
        let config = builder.config();
        assert_eq!(config.project_id, "my-project");
        assert_eq!(config.location.as_deref(), Some("EU"));
        assert_eq!(config.endpoint.as_str(), "http://localhost:9050/");
        assert_eq!(config.headers.get("authorization").unwrap(), "Bearer abc");
        assert_eq!(config.headers.get("x-goog-user-project").unwrap(), "billing");
        assert_eq!(config.job_creation_mode, Some(JobCreationMode::Optional));
        assert!(!config.fast_path);
        assert_eq!(config.poll_interval, Some(Duration::from_millis(250)));
    }

    #[test]
    fn connection_string_defaults_to_tls() {
        let builder =
            ClientBuilder::from_connection_string("bigquery://bigquery.googleapis.com/p").unwrap();

        assert_eq!(builder.config().endpoint.as_str(), "https://bigquery.googleapis.com/");
        assert!(builder.config().fast_path);
    }

    #[test]
    fn invalid_connection_strings() {
        let cases = [
            "sc://localhost:15002/p",
            "bigquery://localhost:9050",
            "bigquery://localhost/p?fast_path=maybe",
            "bigquery://localhost/p?job_creation_mode=sometimes",
            "not a url",
        ];

        for connection in cases {
            assert!(
                ClientBuilder::from_connection_string(connection).is_err(),
                "expected {connection} to be rejected"
            );
        }
    }

    #[test]
    fn environment_lookup() {
        let vars = HashMap::from([
            ("GCLOUD_PROJECT", "env-project"),
            ("BIGQUERY_EMULATOR_HOST", "localhost:9050"),
            ("FAST_QUERY_PATH", "DISABLED"),
        ]);

        let builder =
            ClientBuilder::from_lookup(|key| vars.get(key).map(|v| v.to_string())).unwrap();

        assert_eq!(builder.config().project_id, "env-project");
        assert_eq!(builder.config().endpoint.as_str(), "http://localhost:9050/");
        assert!(!builder.config().fast_path);
    }

    #[test]
    fn environment_without_project_fails() {
        assert!(ClientBuilder::from_lookup(|_| None).is_err());
    }

    #[test]
    fn debug_output_hides_header_values() {
        let builder = ClientBuilder::new("p").unwrap().bearer_token("secret");
        let debug = format!("{:?}", builder.config());

        assert!(debug.contains("authorization"));
        assert!(!debug.contains("secret"));
    }
}
