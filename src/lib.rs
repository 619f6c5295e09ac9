//! Ship `tracing` events to a remote ingestion endpoint.
//!
//! Events are normalized into a hybrid record (message, level, metrics,
//! context, remaining fields), queued by a bounded [`Dispatcher`] and sent
//! in batches from background tasks. Endpoint failures never reach the
//! application: batches are dropped, and authorization or quota rejections
//! switch shipping off for the rest of the process.

pub mod config;
pub mod dispatcher;
pub mod env;
pub mod error;
pub mod layer;
pub mod normalize;
pub mod record;
pub mod transport;

pub mod init;
pub mod noop_transport;
pub mod shutdown;

pub use config::ShipperConfig;
pub use dispatcher::{Dispatcher, DispatcherSettings, DispatcherState, DispatcherStats, ShipperStatus};
pub use error::{EnqueueError, ShipperError};
pub use layer::{LayerOptions, ShipperLayer, TextPolicy};
pub use record::{EntryKind, EntryPayload, HybridRecord, Level, LogEntry};
pub use transport::{SendOutcome, Transport, TransportRequest};
