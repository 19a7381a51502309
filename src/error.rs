use thiserror::Error;

/// Errors returned when handing an event to the dispatcher.
///
/// Both variants mean the event was *not* accepted; nothing was queued.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    /// Dispatcher queue is full.
    /// Caller must retry or apply backoff.
    #[error("dispatcher at capacity")]
    Backpressure,

    /// Dispatcher has been shut down.
    #[error("dispatcher is shut down")]
    Shutdown,
}

/// Why a single delivery attempt to the collector failed.
#[derive(Debug, Error)]
pub enum DeliveryError {
    /// The collector answered with anything other than 200.
    #[error("collector responded with status {status}")]
    Status { status: u16 },

    /// The attempt exceeded the collector timeout.
    #[error("delivery timed out")]
    Timeout,

    /// Connection, DNS, TLS or protocol fault.
    #[error("transport error: {0}")]
    Transport(String),

    /// The canonical event could not be encoded.
    #[error("failed to encode event: {0}")]
    Encode(#[from] serde_json::Error),
}

impl DeliveryError {
    /// Collector response status, when the collector answered.
    pub fn status(&self) -> Option<u16> {
        match self {
            DeliveryError::Status { status } => Some(*status),
            _ => None,
        }
    }

    /// Whether another attempt could plausibly succeed.
    ///
    /// Timeouts, transport faults, 5xx and 429 are retryable. Any other
    /// status is a client-side problem, and an encode failure is permanent.
    pub fn is_retryable(&self) -> bool {
        match self {
            DeliveryError::Timeout | DeliveryError::Transport(_) => true,
            DeliveryError::Status { status } => *status >= 500 || *status == 429,
            DeliveryError::Encode(_) => false,
        }
    }
}

impl From<reqwest::Error> for DeliveryError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            DeliveryError::Timeout
        } else {
            DeliveryError::Transport(err.to_string())
        }
    }
}

/// Errors surfaced synchronously to the ingress caller.
#[derive(Debug, Error)]
pub enum IngressError {
    #[error("Invalid request method")]
    MethodNotAllowed,

    #[error("Error parsing JSON")]
    Parse(#[source] serde_json::Error),

    #[error(transparent)]
    Dispatch(#[from] DispatchError),
}

/// Invalid runtime configuration. Produced at startup; the relay never
/// starts with an invalid config.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid collector url '{url}': {reason}")]
    InvalidCollectorUrl { url: String, reason: String },

    #[error("worker count must be at least 1")]
    NoWorkers,

    #[error("queue capacity must be at least 1")]
    NoQueueCapacity,

    #[error("delivery timeout must be non-zero")]
    ZeroTimeout,
}

/// Errors from running the ingress server.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: std::net::SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("server error: {0}")]
    Serve(#[from] std::io::Error),

    #[error("failed to build http client: {0}")]
    Client(#[from] reqwest::Error),
}
