use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;

/// Fixed timeout applied to every batch request.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// One HTTP POST carrying a serialized batch.
#[derive(Debug, Clone)]
pub struct TransportRequest {
    pub url: String,
    pub headers: Vec<(String, String)>,
    /// JSON document, already serialized.
    pub body: Vec<u8>,
}

/// What came back from the endpoint, collapsed to what the dispatcher
/// needs to drive its state machine.
#[derive(Debug, Clone, PartialEq)]
pub enum SendOutcome {
    /// The endpoint answered. `body` is `None` when it was not JSON.
    Response { status: u16, body: Option<Value> },
    /// Network error, timeout, or any other failure before a status line.
    Failed(String),
}

impl SendOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, SendOutcome::Response { status, .. } if (200..300).contains(status))
    }
}

/// Asynchronous capability to POST a JSON batch and report the status.
///
/// Implementations must not panic and must not surface errors: every
/// failure is reported as [`SendOutcome::Failed`] so the dispatcher can
/// apply one uniform fail-safe policy. The dispatcher calls `send` from a
/// background task, never from the application's logging call.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: TransportRequest) -> SendOutcome;
}

#[cfg(feature = "http")]
pub use self::http::HttpTransport;

#[cfg(feature = "http")]
mod http {
    use super::{SendOutcome, Transport, TransportRequest, REQUEST_TIMEOUT};
    use crate::error::ShipperError;
    use async_trait::async_trait;
    use reqwest::Client;
    use std::time::Duration;

    /// [`Transport`] backed by a pooled `reqwest` client.
    #[derive(Clone)]
    pub struct HttpTransport {
        client: Client,
        timeout: Duration,
    }

    impl HttpTransport {
        /// Build a client with the fixed [`REQUEST_TIMEOUT`].
        pub fn new() -> Result<Self, ShipperError> {
            Self::with_timeout(REQUEST_TIMEOUT)
        }

        pub(crate) fn with_timeout(timeout: Duration) -> Result<Self, ShipperError> {
            let client = Client::builder().timeout(timeout).build()?;
            Ok(Self { client, timeout })
        }
    }

    #[async_trait]
    impl Transport for HttpTransport {
        async fn send(&self, request: TransportRequest) -> SendOutcome {
            let mut builder = self.client.post(&request.url).timeout(self.timeout);
            for (name, value) in &request.headers {
                builder = builder.header(name.as_str(), value.as_str());
            }

            let resp = match builder.body(request.body).send().await {
                Ok(resp) => resp,
                Err(e) if e.is_timeout() => return SendOutcome::Failed("request timed out".to_string()),
                Err(e) => return SendOutcome::Failed(e.to_string()),
            };

            let status = resp.status().as_u16();
            let body = match resp.bytes().await {
                Ok(bytes) => serde_json::from_slice(&bytes).ok(),
                Err(e) if e.is_timeout() => {
                    return SendOutcome::Failed("response body timed out".to_string())
                }
                Err(_) => None,
            };

            SendOutcome::Response { status, body }
        }
    }

}
