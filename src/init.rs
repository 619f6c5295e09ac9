#[cfg(feature = "http")]
use crate::config::ShipperConfig;
use crate::dispatcher::Dispatcher;
use crate::error::ShipperError;
#[cfg(feature = "http")]
use crate::layer::LayerOptions;
use crate::layer::ShipperLayer;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

/// Subscriber-level settings applied when installing the shipper globally.
///
/// **Fields**
/// - `enable_stdout`: if `true`, a `tracing_subscriber::fmt` layer is added
///   next to the [`ShipperLayer`] so events are also printed to the console.
/// - `env_filter`: directive for that console layer; falls back to
///   `RUST_LOG`, then to `info`. It does not filter what is shipped.
#[derive(Clone, Debug, Default)]
pub struct InitOptions {
    pub enable_stdout: bool,
    pub env_filter: Option<String>,
}

/// Install a [`ShipperLayer`] over a [`Registry`] as the global default
/// subscriber and return the dispatcher handle.
///
/// Keep the handle: awaiting [`Dispatcher::flush`] before the process exits
/// is the only way to ship what is still queued.
pub fn install<W>(layer: ShipperLayer<W>, options: &InitOptions) -> Result<Dispatcher, ShipperError>
where
    W: for<'a> MakeWriter<'a> + Send + Sync + 'static,
{
    let dispatcher = layer.dispatcher().clone();

    // Both arms build a different subscriber type, hence the duplication.
    if options.enable_stdout {
        let filter = match &options.env_filter {
            Some(directive) => EnvFilter::new(directive),
            None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        };
        let fmt_layer = tracing_subscriber::fmt::layer().with_filter(filter);
        Registry::default()
            .with(layer)
            .with(fmt_layer)
            .try_init()
            .map_err(|e| ShipperError::SubscriberInit(e.to_string()))?;
    } else {
        Registry::default()
            .with(layer)
            .try_init()
            .map_err(|e| ShipperError::SubscriberInit(e.to_string()))?;
    }

    Ok(dispatcher)
}

/// Build an HTTP-backed shipper from `options` and install it globally.
#[cfg(feature = "http")]
pub fn init_tracing_with_options(
    options: LayerOptions,
    init: InitOptions,
) -> Result<Dispatcher, ShipperError> {
    let layer = ShipperLayer::new(options)?;
    install(layer, &init)
}

/// Initialize tracing with sensible defaults.
///
/// Equivalent to [`init_tracing_with_options`] with the given config and
/// default [`LayerOptions`] / [`InitOptions`]. Must be called from within
/// a Tokio runtime.
#[cfg(feature = "http")]
pub fn init_tracing(config: ShipperConfig) -> Result<Dispatcher, ShipperError> {
    let options = LayerOptions {
        config: Some(config),
        ..LayerOptions::default()
    };
    init_tracing_with_options(options, InitOptions::default())
}
