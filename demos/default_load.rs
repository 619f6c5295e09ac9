use std::sync::Arc;
use std::time::Instant;
use tracing::error;

use tracing_log_shipper::init::{install, InitOptions};
use tracing_log_shipper::layer::{LayerOptions, ShipperLayer};
use tracing_log_shipper::noop_transport::NoopTransport;
use tracing_log_shipper::ShipperConfig;

#[tokio::main]
async fn main() {
    let options = LayerOptions {
        config: Some(ShipperConfig::new(
            "http://localhost:8080/api/v1/logs",
            Some("load-test-token".to_string()),
            Some("load".to_string()),
        )),
        passthrough_console: false,
        ..LayerOptions::default()
    };
    let layer = ShipperLayer::with_transport(options, Arc::new(NoopTransport)).unwrap();
    let dispatcher = install(layer, &InitOptions::default()).unwrap();

    let n: u64 = 100_000;
    let start = Instant::now();

    for i in 0..n {
        error!(iteration = i, "default load test error");
    }

    let elapsed = start.elapsed();
    let stats = dispatcher.stats();
    println!("default settings: logged {} events in {:?} (~{:.0} ev/s), accepted {}, dropped {}",
        n,
        elapsed,
        n as f64 / elapsed.as_secs_f64(),
        stats.accepted,
        stats.dropped_queue_full,
    );

    dispatcher.flush().await;
    println!("after drain: {:?}", dispatcher.stats());
}
