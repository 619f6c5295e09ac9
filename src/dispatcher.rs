//! Batching dispatcher with fail-safe lifecycle state.
//!
//! The dispatcher owns the pending queue, the batch timer, the disable
//! latches and the shutdown drain. Enqueue is synchronous and never waits
//! on the network; batches are sent from tasks spawned on the Tokio
//! runtime the dispatcher was created in.

use crate::config::ShipperConfig;
use crate::error::{EnqueueError, ShipperError};
use crate::record::LogEntry;
use crate::transport::{SendOutcome, Transport, TransportRequest};
use serde::Serialize;
use serde_json::Value;
use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, error, warn};

pub const MAX_QUEUE_SIZE: usize = 1000;
pub const BATCH_SIZE: usize = 50;
pub const FLUSH_DELAY: Duration = Duration::from_millis(100);

/// Error codes a 429 body uses for a hard history/quota limit.
const HARD_LIMIT_CODES: &[&str] = &["HISTORY_LIMIT_EXCEEDED", "QUOTA_EXCEEDED", "LOG_LIMIT_EXCEEDED"];

/// Lowercase phrases that mark a 429 as a hard limit rather than a rate limit.
const HARD_LIMIT_PHRASES: &[&str] = &["history limit", "quota exceeded"];

/// Queue and batching parameters.
///
/// Minimal thresholds are enforced by the dispatcher to avoid degenerate
/// configurations: a batch holds at least one entry, the queue holds at
/// least one batch, and the timer waits at least a millisecond.
#[derive(Clone, Debug)]
pub struct DispatcherSettings {
    pub max_queue_size: usize,
    pub batch_size: usize,
    pub flush_delay: Duration,
}

impl Default for DispatcherSettings {
    fn default() -> Self {
        Self {
            max_queue_size: MAX_QUEUE_SIZE,
            batch_size: BATCH_SIZE,
            flush_delay: FLUSH_DELAY,
        }
    }
}

impl DispatcherSettings {
    fn sanitized(self) -> Self {
        let batch_size = self.batch_size.max(1);
        Self {
            max_queue_size: self.max_queue_size.max(batch_size),
            batch_size,
            flush_delay: self.flush_delay.max(Duration::from_millis(1)),
        }
    }
}

/// Sending state as seen from outside.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatcherState {
    Active,
    /// Configuration is incomplete; cleared by [`Dispatcher::reconfigure`].
    Disabled,
    /// Rejected by the endpoint; never cleared for the life of the process.
    PermanentlyDisabled,
}

/// Snapshot of the dispatcher counters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatcherStats {
    pub accepted: u64,
    pub rejected: u64,
    /// Subset of `rejected` refused because the queue was full.
    pub dropped_queue_full: u64,
    pub batches_sent: u64,
    pub batches_failed: u64,
    pub entries_sent: u64,
}

/// Structured status for diagnostics and health endpoints.
///
/// Token and session id are only reported, masked, while enabled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ShipperStatus {
    pub enabled: bool,
    pub disabled: bool,
    pub disabled_permanently: bool,
    pub config_valid: bool,
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

impl fmt::Display for ShipperStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.enabled {
            write!(f, "log shipper: enabled")?;
            if let Some(session) = &self.session_id {
                write!(f, ", session {}", session)?;
            }
            if let Some(token) = &self.token {
                write!(f, ", token {}", token)?;
            }
            return Ok(());
        }
        let state = if self.disabled_permanently {
            "disabled permanently"
        } else {
            "disabled"
        };
        match &self.reason {
            Some(reason) => write!(f, "log shipper: {} ({})", state, reason),
            None => write!(f, "log shipper: {}", state),
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct IngestBatch<'a> {
    session_id: &'a str,
    logs: &'a [LogEntry],
}

enum BatchStep {
    /// One request was made (whatever its outcome).
    Attempted,
    Empty,
    /// Disabled in either state; nothing more will be sent.
    Halted,
}

struct State {
    queue: VecDeque<LogEntry>,
    config: ShipperConfig,
    disabled_temporarily: bool,
    disabled_permanently: bool,
    shutting_down: bool,
    reason: Option<String>,
    timer: Option<JoinHandle<()>>,
    immediate_pending: bool,
}

impl State {
    fn is_active(&self) -> bool {
        !self.disabled_temporarily && !self.disabled_permanently
    }

    fn disable_temporarily(&mut self) {
        self.disabled_temporarily = true;
        self.reason = Some(missing_reason(&self.config));
    }
}

#[derive(Default)]
struct Counters {
    accepted: AtomicU64,
    rejected: AtomicU64,
    dropped_queue_full: AtomicU64,
    batches_sent: AtomicU64,
    batches_failed: AtomicU64,
    entries_sent: AtomicU64,
}

struct Inner {
    state: Mutex<State>,
    /// Held for the duration of one batch send.
    in_flight: tokio::sync::Mutex<()>,
    transport: Arc<dyn Transport>,
    settings: DispatcherSettings,
    runtime: Handle,
    counters: Counters,
}

/// Cheaply cloneable handle to one dispatcher instance.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<Inner>,
}

impl Dispatcher {
    /// Create a dispatcher with the default queue and batch settings.
    ///
    /// Must be called from within a Tokio runtime; batch sends are spawned
    /// onto that runtime.
    pub fn new(config: ShipperConfig, transport: Arc<dyn Transport>) -> Result<Self, ShipperError> {
        Self::with_settings(config, transport, DispatcherSettings::default())
    }

    pub fn with_settings(
        config: ShipperConfig,
        transport: Arc<dyn Transport>,
        settings: DispatcherSettings,
    ) -> Result<Self, ShipperError> {
        let runtime = Handle::try_current().map_err(|_| ShipperError::NoRuntime)?;

        let state = State {
            queue: VecDeque::new(),
            config,
            disabled_temporarily: false,
            disabled_permanently: false,
            shutting_down: false,
            reason: None,
            timer: None,
            immediate_pending: false,
        };
        Ok(Self {
            inner: Arc::new(Inner {
                state: Mutex::new(state),
                in_flight: tokio::sync::Mutex::new(()),
                transport,
                settings: settings.sanitized(),
                runtime,
                counters: Counters::default(),
            }),
        })
    }

    /// Queue one entry for shipping. Never blocks.
    ///
    /// Refused when disabled in either state, or when the queue is full, in
    /// which case the new entry is the one dropped.
    pub fn enqueue(&self, mut entry: LogEntry) -> Result<(), EnqueueError> {
        let mut newly_disabled = None;
        let result = {
            let mut state = self.inner.state();
            if state.disabled_permanently {
                Err(EnqueueError::PermanentlyDisabled)
            } else {
                if !state.disabled_temporarily && !state.config.is_valid() {
                    state.disable_temporarily();
                    newly_disabled = Some(state.config.missing_fields());
                }
                if state.disabled_temporarily {
                    Err(EnqueueError::Disabled)
                } else if state.queue.len() >= self.inner.settings.max_queue_size {
                    self.inner.counters.dropped_queue_full.fetch_add(1, Ordering::Relaxed);
                    Err(EnqueueError::QueueFull)
                } else {
                    entry.stamp_if_missing();
                    state.queue.push_back(entry);
                    schedule(&self.inner, &mut state);
                    Ok(())
                }
            }
        };

        if let Some(missing) = newly_disabled {
            warn!(missing = ?missing, "log shipping disabled: configuration is incomplete");
        }

        let counter = match result {
            Ok(()) => &self.inner.counters.accepted,
            Err(_) => &self.inner.counters.rejected,
        };
        counter.fetch_add(1, Ordering::Relaxed);
        result
    }

    /// Drain the queue before shutdown.
    ///
    /// The first call latches the dispatcher into shutting-down, cancels the
    /// pending timer, waits for any in-flight batch and then sends batches
    /// until the queue is empty or the dispatcher gets disabled. Later calls
    /// return immediately.
    pub async fn flush(&self) {
        let timer = {
            let mut state = self.inner.state();
            if state.shutting_down {
                return;
            }
            state.shutting_down = true;
            state.timer.take()
        };
        if let Some(timer) = timer {
            timer.abort();
        }

        let _guard = self.inner.in_flight.lock().await;
        let mut batches = 0u64;
        loop {
            match self.inner.send_next_batch().await {
                BatchStep::Attempted => batches += 1,
                BatchStep::Empty | BatchStep::Halted => break,
            }
        }
        debug!(batches, remaining = self.queue_len(), "shutdown drain finished");
    }

    /// Install a new configuration.
    ///
    /// A valid configuration re-enables a dispatcher that was disabled for
    /// missing values. A permanent disable is never lifted.
    pub fn reconfigure(&self, config: ShipperConfig) {
        let mut state = self.inner.state();
        state.config = config;
        if state.disabled_permanently {
            return;
        }
        if state.config.is_valid() {
            state.disabled_temporarily = false;
            state.reason = None;
            if !state.queue.is_empty() {
                schedule(&self.inner, &mut state);
            }
        } else {
            state.disable_temporarily();
        }
    }

    pub fn is_enabled(&self) -> bool {
        let state = self.inner.state();
        state.is_active() && state.config.is_valid()
    }

    pub fn state(&self) -> DispatcherState {
        let state = self.inner.state();
        if state.disabled_permanently {
            DispatcherState::PermanentlyDisabled
        } else if state.disabled_temporarily || !state.config.is_valid() {
            DispatcherState::Disabled
        } else {
            DispatcherState::Active
        }
    }

    pub fn is_shutting_down(&self) -> bool {
        self.inner.state().shutting_down
    }

    pub fn queue_len(&self) -> usize {
        self.inner.state().queue.len()
    }

    pub fn status(&self) -> ShipperStatus {
        let state = self.inner.state();
        let config_valid = state.config.is_valid();
        let enabled = state.is_active() && config_valid;
        let reason = state
            .reason
            .clone()
            .or_else(|| (!config_valid).then(|| missing_reason(&state.config)));

        ShipperStatus {
            enabled,
            disabled: !enabled,
            disabled_permanently: state.disabled_permanently,
            config_valid,
            reason: if enabled { None } else { reason },
            token: enabled.then(|| state.config.masked_token()).flatten(),
            session_id: enabled.then(|| state.config.masked_session_id()).flatten(),
        }
    }

    pub(crate) fn runtime(&self) -> &Handle {
        &self.inner.runtime
    }

    pub fn stats(&self) -> DispatcherStats {
        let c = &self.inner.counters;
        DispatcherStats {
            accepted: c.accepted.load(Ordering::Relaxed),
            rejected: c.rejected.load(Ordering::Relaxed),
            dropped_queue_full: c.dropped_queue_full.load(Ordering::Relaxed),
            batches_sent: c.batches_sent.load(Ordering::Relaxed),
            batches_failed: c.batches_failed.load(Ordering::Relaxed),
            entries_sent: c.entries_sent.load(Ordering::Relaxed),
        }
    }
}

impl Inner {
    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Take up to one batch off the queue and send it. Callers must hold
    /// `in_flight`.
    async fn send_next_batch(&self) -> BatchStep {
        let (batch, url, token, session_id) = {
            let mut state = self.state();
            if !state.is_active() {
                return BatchStep::Halted;
            }
            let credentials = state.config.token.clone().zip(state.config.session_id.clone());
            let Some((token, session_id)) = credentials else {
                state.disable_temporarily();
                return BatchStep::Halted;
            };
            if state.queue.is_empty() {
                return BatchStep::Empty;
            }
            let take = state.queue.len().min(self.settings.batch_size);
            let batch: Vec<LogEntry> = state.queue.drain(..take).collect();
            (batch, state.config.endpoint.clone(), token, session_id)
        };

        let body = IngestBatch {
            session_id: &session_id,
            logs: &batch,
        };
        let body = match serde_json::to_vec(&body) {
            Ok(body) => body,
            Err(e) => {
                error!(error = %e, entries = batch.len(), "failed to serialize log batch, dropping");
                self.counters.batches_failed.fetch_add(1, Ordering::Relaxed);
                return BatchStep::Attempted;
            }
        };

        let request = TransportRequest {
            url,
            headers: vec![
                ("Authorization".to_string(), format!("Bearer {}", token)),
                ("Content-Type".to_string(), "application/json".to_string()),
            ],
            body,
        };

        let outcome = self.transport.send(request).await;
        self.apply_outcome(batch.len(), outcome);
        BatchStep::Attempted
    }

    fn apply_outcome(&self, entries: usize, outcome: SendOutcome) {
        if outcome.is_success() {
            self.counters.batches_sent.fetch_add(1, Ordering::Relaxed);
            self.counters.entries_sent.fetch_add(entries as u64, Ordering::Relaxed);
            debug!(entries, "log batch delivered");
            return;
        }

        self.counters.batches_failed.fetch_add(1, Ordering::Relaxed);
        match outcome {
            SendOutcome::Response { status, body } => match status {
                401 | 403 => {
                    self.disable_permanently(format!("authorization rejected (HTTP {})", status));
                }
                429 if is_hard_limit(body.as_ref()) => {
                    self.disable_permanently("history limit reached (HTTP 429)".to_string());
                }
                429 => warn!(entries, "rate limited by endpoint, dropping batch"),
                404 => warn!(entries, "session not found on endpoint, dropping batch"),
                _ => warn!(entries, status, "log batch rejected, dropping"),
            },
            SendOutcome::Failed(reason) => {
                warn!(entries, error = %reason, "log batch send failed, dropping");
            }
        }
    }

    fn disable_permanently(&self, reason: String) {
        let (dropped, timer) = {
            let mut state = self.state();
            state.disabled_permanently = true;
            state.reason = Some(reason.clone());
            let dropped = state.queue.len();
            state.queue.clear();
            (dropped, state.timer.take())
        };
        if let Some(timer) = timer {
            timer.abort();
        }
        error!(reason = %reason, dropped, "log shipping permanently disabled");
    }
}

/// Arm the next batch run: immediately once a full batch is waiting,
/// otherwise after the flush delay unless a timer is already pending.
fn schedule(inner: &Arc<Inner>, state: &mut State) {
    if state.shutting_down || !state.is_active() {
        return;
    }

    if state.queue.len() >= inner.settings.batch_size {
        if !state.immediate_pending {
            state.immediate_pending = true;
            let task_inner = Arc::clone(inner);
            inner.runtime.spawn(async move {
                task_inner.state().immediate_pending = false;
                run_scheduled(task_inner).await;
            });
        }
    } else if state.timer.is_none() {
        let task_inner = Arc::clone(inner);
        let delay = inner.settings.flush_delay;
        state.timer = Some(inner.runtime.spawn(async move {
            sleep(delay).await;
            {
                let mut state = task_inner.state();
                if state.shutting_down {
                    return;
                }
                state.timer = None;
            }
            run_scheduled(task_inner).await;
        }));
    }
}

/// Send one batch unless another is already in flight, then re-arm.
async fn run_scheduled(inner: Arc<Inner>) {
    let Ok(guard) = inner.in_flight.try_lock() else {
        return;
    };
    inner.send_next_batch().await;
    drop(guard);

    let mut state = inner.state();
    if !state.queue.is_empty() {
        schedule(&inner, &mut state);
    }
}

/// Distinguish a hard history/quota limit from an ordinary rate limit.
///
/// Both the error code and a substring of the message are checked; a
/// transient 429 worded like a quota message is treated as permanent.
pub fn is_hard_limit(body: Option<&Value>) -> bool {
    let Some(body) = body else {
        return false;
    };
    let code = body.get("error").and_then(Value::as_str).unwrap_or_default();
    if HARD_LIMIT_CODES.iter().any(|c| code.eq_ignore_ascii_case(c)) {
        return true;
    }
    let code = code.to_ascii_lowercase();
    let message = body
        .get("message")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_ascii_lowercase();
    HARD_LIMIT_PHRASES
        .iter()
        .any(|phrase| message.contains(phrase) || code.contains(phrase))
}

fn missing_reason(config: &ShipperConfig) -> String {
    format!("missing configuration: {}", config.missing_fields().join(", "))
}
