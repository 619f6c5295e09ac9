use std::sync::Arc;
use std::time::Instant;
use tokio::time::Duration;
use tracing::error;

use tracing_log_shipper::init::{install, InitOptions};
use tracing_log_shipper::layer::{LayerOptions, ShipperLayer};
use tracing_log_shipper::noop_transport::NoopTransport;
use tracing_log_shipper::{Dispatcher, DispatcherSettings, ShipperConfig};

#[tokio::main]
async fn main() {
    let config = ShipperConfig::new(
        "http://localhost:8080/api/v1/logs",
        Some("load-test-token".to_string()),
        Some("load".to_string()),
    );

    let settings = DispatcherSettings {
        max_queue_size: 50_000,
        batch_size: 1_000,
        flush_delay: Duration::from_millis(200),
    };

    let dispatcher = Dispatcher::with_settings(config, Arc::new(NoopTransport), settings).unwrap();
    let options = LayerOptions {
        passthrough_console: false,
        ..LayerOptions::default()
    };
    let layer = ShipperLayer::with_dispatcher(dispatcher, options);
    let dispatcher = install(layer, &InitOptions::default()).unwrap();

    let n: u64 = 100_000;
    let start = Instant::now();

    for i in 0..n {
        error!(iteration = i, latency_ms = 3.5, "custom load test error");
    }

    let elapsed = start.elapsed();
    println!("custom settings: logged {} events in {:?} (~{:.0} ev/s)",
        n,
        elapsed,
        n as f64 / elapsed.as_secs_f64()
    );

    dispatcher.flush().await;
    println!("after drain: {:?}", dispatcher.stats());
}
