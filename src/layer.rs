use crate::config::ShipperConfig;
use crate::dispatcher::{Dispatcher, ShipperStatus};
use crate::error::ShipperError;
use crate::normalize::normalize;
use crate::record::{now_millis, Level, LogEntry};
use crate::transport::Transport;
use serde_json::{Map, Value};
use std::io::{self, Write};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::layer::{Context, Layer};
use tracing_subscriber::registry::LookupSpan;

/// Targets never shipped: this crate's own diagnostics and the HTTP stack
/// underneath the transport. Shipping them would feed the queue from the
/// act of draining it.
pub const DEFAULT_IGNORED_TARGETS: &[&str] = &[
    "tracing_log_shipper",
    "hyper",
    "hyper_util",
    "reqwest",
    "h2",
    "rustls",
    "tower",
];

/// What to do with an event whose message is not a JSON object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TextPolicy {
    /// Ship it: as a hybrid record when the event carries structured
    /// fields, as a raw `text` entry otherwise.
    #[default]
    Forward,
    /// JSON-only: drop the event entirely.
    Discard,
}

/// Options recognized by [`ShipperLayer`].
#[derive(Debug, Clone)]
pub struct LayerOptions {
    /// Connection settings; `None` resolves them from the environment.
    pub config: Option<ShipperConfig>,
    /// Print diagnostics about the shipper itself to the side channel.
    pub verbose: bool,
    /// Echo every record to the side channel.
    pub passthrough_console: bool,
    /// Echo records that could not be queued for shipping.
    pub passthrough_on_failure: bool,
    pub text_policy: TextPolicy,
    /// Most verbose level that is still shipped.
    pub min_level: tracing::Level,
    /// Target prefixes (matched on `::` boundaries) that are never shipped.
    pub ignored_targets: Vec<String>,
}

impl Default for LayerOptions {
    fn default() -> Self {
        Self {
            config: None,
            verbose: false,
            passthrough_console: true,
            passthrough_on_failure: false,
            text_policy: TextPolicy::Forward,
            min_level: tracing::Level::TRACE,
            ignored_targets: DEFAULT_IGNORED_TARGETS.iter().map(|t| t.to_string()).collect(),
        }
    }
}

/// `tracing_subscriber` layer that normalizes events and hands them to a
/// [`Dispatcher`].
///
/// `on_event` never blocks on the network and never fails: the dispatcher
/// only queues, and every error on this path turns into an optional
/// diagnostic on the side channel (stderr unless replaced with
/// [`ShipperLayer::with_writer`]).
pub struct ShipperLayer<W = fn() -> io::Stderr> {
    dispatcher: Dispatcher,
    options: LayerOptions,
    make_writer: W,
    /// Total events seen by the layer (before filtering).
    pub total_events: Arc<AtomicU64>,
    /// Accepted by the dispatcher.
    pub submitted_events: Arc<AtomicU64>,
    /// Filtered out, discarded by the text policy, or refused by the dispatcher.
    pub skipped_events: Arc<AtomicU64>,
}

impl ShipperLayer {
    /// Build a layer that ships over HTTP.
    #[cfg(feature = "http")]
    pub fn new(options: LayerOptions) -> Result<Self, ShipperError> {
        let transport = Arc::new(crate::transport::HttpTransport::new()?);
        Self::with_transport(options, transport)
    }

    /// Build a layer around any [`Transport`]. Must be called from within a
    /// Tokio runtime.
    pub fn with_transport(
        options: LayerOptions,
        transport: Arc<dyn Transport>,
    ) -> Result<Self, ShipperError> {
        let config = options.config.clone().unwrap_or_else(ShipperConfig::from_env);
        let dispatcher = Dispatcher::new(config, transport)?;
        Ok(Self::with_dispatcher(dispatcher, options))
    }

    /// Build a layer around an existing dispatcher.
    pub fn with_dispatcher(dispatcher: Dispatcher, options: LayerOptions) -> Self {
        let layer = Self {
            dispatcher,
            options,
            make_writer: io::stderr as fn() -> io::Stderr,
            total_events: Arc::new(AtomicU64::new(0)),
            submitted_events: Arc::new(AtomicU64::new(0)),
            skipped_events: Arc::new(AtomicU64::new(0)),
        };
        if !layer.dispatcher.is_enabled() {
            layer.diagnostic(&layer.dispatcher.status().to_string());
        }
        layer
    }
}

impl<W> ShipperLayer<W> {
    /// Replace the side channel used for passthrough and diagnostics.
    pub fn with_writer<W2>(self, make_writer: W2) -> ShipperLayer<W2>
    where
        W2: for<'a> MakeWriter<'a>,
    {
        ShipperLayer {
            dispatcher: self.dispatcher,
            options: self.options,
            make_writer,
            total_events: self.total_events,
            submitted_events: self.submitted_events,
            skipped_events: self.skipped_events,
        }
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn is_enabled(&self) -> bool {
        self.dispatcher.is_enabled()
    }

    pub fn status(&self) -> ShipperStatus {
        self.dispatcher.status()
    }

    fn is_ignored(&self, target: &str) -> bool {
        self.options.ignored_targets.iter().any(|ignored| {
            target
                .strip_prefix(ignored.as_str())
                .map_or(false, |rest| rest.is_empty() || rest.starts_with("::"))
        })
    }
}

impl<W> ShipperLayer<W>
where
    W: for<'a> MakeWriter<'a>,
{
    /// Write the human-readable status line to the side channel.
    pub fn print_status(&self) -> Result<(), ShipperError> {
        self.write_line(&self.status().to_string())
    }

    fn write_line(&self, line: &str) -> Result<(), ShipperError> {
        let mut writer = self.make_writer.make_writer();
        writeln!(writer, "{}", line)?;
        Ok(())
    }

    fn diagnostic(&self, message: &str) {
        if self.options.verbose {
            let _ = self.write_line(message);
        }
    }

    fn process(&self, event: &Event<'_>) -> Result<(), ShipperError> {
        let mut fields = Map::new();
        let mut message: Option<String> = None;
        event.record(&mut FieldVisitor {
            fields: &mut fields,
            message: &mut message,
        });

        let level = Level::from(event.metadata().level());
        let parsed = message
            .as_deref()
            .and_then(|m| serde_json::from_str::<Value>(m.trim()).ok());

        let entry = match parsed {
            Some(payload @ Value::Object(_)) => {
                LogEntry::json(normalize(None, Some(level.as_str()), &payload, &fields))
            }
            _ => match self.options.text_policy {
                TextPolicy::Discard => {
                    self.skipped_events.fetch_add(1, Ordering::Relaxed);
                    return Ok(());
                }
                TextPolicy::Forward => match message {
                    Some(text) if fields.is_empty() => LogEntry::text(text),
                    text => LogEntry::json(normalize(
                        text.as_deref(),
                        Some(level.as_str()),
                        &Value::Null,
                        &fields,
                    )),
                },
            },
        }
        .with_timestamp(now_millis());

        let echo = if self.options.passthrough_console || self.options.passthrough_on_failure {
            Some(entry.passthrough_value())
        } else {
            None
        };

        let submitted = if self.dispatcher.is_enabled() {
            match self.dispatcher.enqueue(entry) {
                Ok(()) => true,
                Err(e) => {
                    self.diagnostic(&format!("log shipper: {}", e));
                    false
                }
            }
        } else {
            false
        };

        let counter = if submitted {
            &self.submitted_events
        } else {
            &self.skipped_events
        };
        counter.fetch_add(1, Ordering::Relaxed);

        if let Some(echo) = echo {
            if self.options.passthrough_console || !submitted {
                self.write_line(&serde_json::to_string(&echo)?)?;
            }
        }
        Ok(())
    }
}

impl<S, W> Layer<S> for ShipperLayer<W>
where
    S: Subscriber + for<'span> LookupSpan<'span>,
    W: for<'a> MakeWriter<'a> + 'static,
{
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        self.total_events.fetch_add(1, Ordering::Relaxed);
        let meta = event.metadata();
        if *meta.level() > self.options.min_level || self.is_ignored(meta.target()) {
            self.skipped_events.fetch_add(1, Ordering::Relaxed);
            return;
        }

        if let Err(e) = self.process(event) {
            self.diagnostic(&format!("log shipper: failed to handle event: {}", e));
        }
    }
}

pub struct FieldVisitor<'a> {
    pub fields: &'a mut Map<String, Value>,
    pub message: &'a mut Option<String>,
}

impl<'a> Visit for FieldVisitor<'a> {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            *self.message = Some(value.to_string());
        } else {
            self.fields.insert(field.name().to_string(), Value::String(value.to_string()));
        }
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.fields.insert(field.name().to_string(), Value::from(value));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.fields.insert(field.name().to_string(), Value::from(value));
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        self.fields.insert(field.name().to_string(), Value::from(value));
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.fields.insert(field.name().to_string(), Value::from(value));
    }

    /// Errors keep their whole source chain, outermost first.
    fn record_error(&mut self, field: &Field, value: &(dyn std::error::Error + 'static)) {
        let mut chain = value.to_string();
        let mut source = value.source();
        while let Some(cause) = source {
            chain.push_str(": ");
            chain.push_str(&cause.to_string());
            source = cause.source();
        }
        self.fields.insert(field.name().to_string(), Value::String(chain));
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            *self.message = Some(format!("{:?}", value));
        } else {
            self.fields.insert(field.name().to_string(), Value::String(format!("{:?}", value)));
        }
    }
}
