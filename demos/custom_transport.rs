use std::sync::Arc;

use async_trait::async_trait;
use tracing::{error, info};
use tracing_log_shipper::{
    init::{install, InitOptions},
    layer::{LayerOptions, ShipperLayer},
    SendOutcome, ShipperConfig, Transport, TransportRequest,
};

/// Example of shipping through a completely custom channel by implementing
/// the `Transport` trait directly. Imagine this hands the batch to some
/// in-house message bus instead of POSTing it.
struct StdoutTransport;

#[async_trait]
impl Transport for StdoutTransport {
    async fn send(&self, request: TransportRequest) -> SendOutcome {
        println!("[stdout-transport] {} <- {}", request.url, String::from_utf8_lossy(&request.body));
        SendOutcome::Response { status: 202, body: None }
    }
}

#[tokio::main]
async fn main() {
    let options = LayerOptions {
        config: Some(ShipperConfig::new(
            "bus://logs",
            Some("demo-token".to_string()),
            Some("demo".to_string()),
        )),
        passthrough_console: false,
        ..LayerOptions::default()
    };
    let layer = ShipperLayer::with_transport(options, Arc::new(StdoutTransport)).unwrap();
    let dispatcher = install(layer, &InitOptions::default()).unwrap();

    info!("custom transport example started");
    error!(request_id = "req-42", duration_ms = 1250, "simulated error sent via custom transport");
    info!("{}", r#"{"message": "cache warmed", "memory_mb": 512, "userId": "u-7"}"#);

    dispatcher.flush().await;
}
