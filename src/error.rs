/// Error type returned when building or installing the shipper.
#[derive(thiserror::Error, Debug)]
pub enum ShipperError {
    #[error("no tokio runtime available; construct the dispatcher inside a runtime")]
    NoRuntime,

    #[cfg(feature = "http")]
    #[error("failed to build http client: {0}")]
    HttpClient(#[from] reqwest::Error),

    #[error("failed to install global subscriber: {0}")]
    SubscriberInit(String),

    #[error("failed to serialize log batch: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("failed to write to side channel: {0}")]
    SideChannel(#[from] std::io::Error),
}

/// Reason a log entry was refused by [`Dispatcher::enqueue`].
///
/// [`Dispatcher::enqueue`]: crate::dispatcher::Dispatcher::enqueue
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueError {
    #[error("log shipping is disabled: configuration is incomplete")]
    Disabled,

    #[error("log shipping is permanently disabled for this process")]
    PermanentlyDisabled,

    #[error("log queue is full, dropping newest entry")]
    QueueFull,
}
