#[cfg(test)]
pub mod test_utils {
    use crate::client::{BigQueryClient, ClientBuilder};
    use crate::error::{BigQueryError, Result};
    use crate::transport::{ApiRequest, Transport};

    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    /// Replays scripted responses in order and records every request.
    #[derive(Debug, Default)]
    pub struct MockTransport {
        responses: Mutex<VecDeque<Result<serde_json::Value>>>,
        requests: Mutex<Vec<ApiRequest>>,
    }

    impl MockTransport {
        pub fn new(responses: Vec<Result<serde_json::Value>>) -> Self {
            Self { responses: Mutex::new(responses.into()), requests: Mutex::new(Vec::new()) }
        }

        pub fn requests(&self) -> Vec<ApiRequest> {
            self.requests.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Transport for MockTransport {
        async fn send(&self, request: ApiRequest) -> Result<serde_json::Value> {
            self.requests.lock().unwrap().push(request.clone());
            self.responses.lock().unwrap().pop_front().unwrap_or_else(|| {
                Err(BigQueryError::InvalidArgument(format!(
                    "no scripted response for {} {}",
                    request.method,
                    request.path()
                )))
            })
        }
    }

    pub fn setup_logging() {
        let _ = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_test_writer()
            .try_init();
    }

    /// A client for project `test-project` in location `US`, backed by a
    /// [`MockTransport`] scripted with `responses`.
    pub fn setup_client(
        responses: Vec<Result<serde_json::Value>>,
    ) -> (BigQueryClient, Arc<MockTransport>) {
        setup_logging();
        let transport = Arc::new(MockTransport::new(responses));
        let client = ClientBuilder::new("test-project")
            .expect("Failed to create builder")
            .location("US")
            .transport(transport.clone())
            .build()
            .expect("Failed to build client");
        (client, transport)
    }
}
