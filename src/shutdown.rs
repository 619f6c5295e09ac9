use crate::dispatcher::Dispatcher;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Termination signal that triggered the drain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownSignal {
    Interrupt,
    Terminate,
}

impl ShutdownSignal {
    /// Conventional exit status for a process ended by this signal.
    pub fn exit_code(&self) -> i32 {
        match self {
            ShutdownSignal::Interrupt => 130,
            ShutdownSignal::Terminate => 143,
        }
    }
}

/// Drain `dispatcher` when the process receives Ctrl-C (or SIGTERM on unix).
///
/// Installing the handler replaces the default "terminate" action of those
/// signals, so with `exit_after` the process exits with the conventional
/// status once the drain is done. Without it the host decides what happens
/// next and can await the returned handle.
pub fn flush_on_shutdown(dispatcher: Dispatcher, exit_after: bool) -> JoinHandle<Option<ShutdownSignal>> {
    let runtime = dispatcher.runtime().clone();
    runtime.spawn(async move {
        let signal = wait_for_signal().await?;
        info!(?signal, queued = dispatcher.queue_len(), "termination signal received, draining log queue");
        dispatcher.flush().await;
        if exit_after {
            std::process::exit(signal.exit_code());
        }
        Some(signal)
    })
}

#[cfg(unix)]
async fn wait_for_signal() -> Option<ShutdownSignal> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = match signal(SignalKind::terminate()) {
        Ok(stream) => stream,
        Err(e) => {
            warn!(error = %e, "cannot listen for SIGTERM, falling back to Ctrl-C only");
            return ctrl_c().await;
        }
    };

    tokio::select! {
        signal = ctrl_c() => signal,
        _ = terminate.recv() => Some(ShutdownSignal::Terminate),
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() -> Option<ShutdownSignal> {
    ctrl_c().await
}

async fn ctrl_c() -> Option<ShutdownSignal> {
    match tokio::signal::ctrl_c().await {
        Ok(()) => Some(ShutdownSignal::Interrupt),
        Err(e) => {
            warn!(error = %e, "cannot listen for Ctrl-C, shutdown drain will not run");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_follow_shell_convention() {
        assert_eq!(ShutdownSignal::Interrupt.exit_code(), 130);
        assert_eq!(ShutdownSignal::Terminate.exit_code(), 143);
    }
}
