use crate::error::{BigQueryError, Result};

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use std::collections::HashMap;

/// Injects static headers into every outgoing REST call.
///
/// Used by [`HttpTransport`](crate::transport::HttpTransport) to attach the
/// bearer token and any caller-supplied headers before the first request,
/// so an invalid header fails at client build time rather than mid-query.
///
/// # Notes
/// - All headers must be valid HTTP header names and values.
/// - Headers already present on the map are kept unless overwritten by name.
#[derive(Clone, Debug, Default)]
pub struct HeaderInterceptor {
    headers: HashMap<String, String>,
}

impl HeaderInterceptor {
    pub(crate) fn new(headers: HashMap<String, String>) -> Self {
        Self { headers }
    }

    pub(crate) fn call(&self, mut map: HeaderMap) -> Result<HeaderMap> {
        for (key, value) in &self.headers {
            let name = HeaderName::from_bytes(key.as_bytes()).map_err(|_| {
                BigQueryError::InvalidArgument(format!("Invalid header key: {}", key))
            })?;
            let mut header_value = HeaderValue::from_str(value).map_err(|_| {
                BigQueryError::InvalidArgument(format!("Invalid header value for {}", key))
            })?;
            if name == reqwest::header::AUTHORIZATION {
                header_value.set_sensitive(true);
            }

            map.insert(name, header_value);
        }
        Ok(map)
    }
}
