use crate::config::ConfigurationError;
use crate::resilience::ErrorClass;

/// Errors surfaced across the gateway core boundary
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// Final outcome of an engine call that failed
    #[error("{class} error from {operation} (code {code}): {message}")]
    Engine {
        class: ErrorClass,
        operation: String,
        code: i64,
        message: String,
    },

    #[error("Operation classification error: {0}")]
    Classification(String),

    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error("Invalid arguments for {operation}: {reason}")]
    InvalidArguments { operation: String, reason: String },

    #[error("Engine executor is closed")]
    ExecutorClosed,

    #[error("Engine task panicked on worker {worker}: {message}")]
    TaskPanicked { worker: usize, message: String },

    #[error("Dispatch queue is shut down")]
    QueueShutdown,

    #[error("No dispatch worker can serve {operation}: {reason}")]
    NoEligibleWorker { operation: String, reason: String },

    #[error("Engine lifecycle error: {0}")]
    Lifecycle(String),

    #[error("Timed out after {timeout_ms}ms waiting for {operation}")]
    Timeout { operation: String, timeout_ms: u64 },
}

impl GatewayError {
    /// Rejection for an operation this layer refuses to route
    pub fn unsupported(operation: &str, reason: &str) -> Self {
        GatewayError::Engine {
            class: ErrorClass::Unsupported,
            operation: operation.to_string(),
            code: crate::constants::error_codes::UNSUPPORTED_OPERATION,
            message: reason.to_string(),
        }
    }

    /// Error class to report to clients, if the error maps onto one
    pub fn class(&self) -> ErrorClass {
        match self {
            GatewayError::Engine { class, .. } => *class,
            GatewayError::InvalidArguments { .. } => ErrorClass::Validation,
            GatewayError::NoEligibleWorker { .. } => ErrorClass::Unsupported,
            GatewayError::ExecutorClosed
            | GatewayError::QueueShutdown
            | GatewayError::Timeout { .. } => ErrorClass::ReconnectRequired,
            _ => ErrorClass::Fatal,
        }
    }
}

pub type Result<T> = std::result::Result<T, GatewayError>;
