use tracing::{info, warn};
use tracing_log_shipper::init::init_tracing;
use tracing_log_shipper::shutdown::flush_on_shutdown;
use tracing_log_shipper::ShipperConfig;

/// Ships a few records to the endpoint configured through `LOG_SHIPPER_*`.
///
/// ```text
/// LOG_SHIPPER_TOKEN=... LOG_SHIPPER_SESSION_ID=demo \
///     cargo run --example ship_to_endpoint
/// ```
#[tokio::main]
async fn main() {
    let dispatcher = match init_tracing(ShipperConfig::from_env()) {
        Ok(dispatcher) => dispatcher,
        Err(e) => {
            eprintln!("failed to initialize log shipping: {}", e);
            return;
        }
    };
    eprintln!("{}", dispatcher.status());

    // Ctrl-C still drains what is queued before exiting.
    let _signals = flush_on_shutdown(dispatcher.clone(), true);

    info!(version = env!("CARGO_PKG_VERSION"), "service started");
    warn!(cpu = 91.5, trace_id = "4bf92f3577b34da6", "cpu usage above threshold");
    info!("{}", r#"{"message": "request served", "response_time": 38, "requestId": "r-1"}"#);

    dispatcher.flush().await;
    eprintln!("{:?}", dispatcher.stats());
}
