use crate::transport::{SendOutcome, Transport, TransportRequest};
use async_trait::async_trait;

/// A transport that accepts every batch with `200 OK` and sends nothing.
///
/// Useful for measuring the overhead of the layer and dispatcher without
/// any network I/O, and for tests that don't care about delivery.
#[derive(Clone, Default)]
pub struct NoopTransport;

#[async_trait]
impl Transport for NoopTransport {
    async fn send(&self, _request: TransportRequest) -> SendOutcome {
        SendOutcome::Response {
            status: 200,
            body: None,
        }
    }
}
