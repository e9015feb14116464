//! Error taxonomy for the Spindle engine.
//!
//! Every failure raised while serving a request ends up as a [`DispatchError`]
//! and is handed, exactly once, to the exception chain. The variants keep the
//! stage that failed distinguishable so the terminal handler can pick a
//! client-visible status:
//!
//! | Variant                        | Status                         |
//! |--------------------------------|--------------------------------|
//! | `RouteMismatch { Method }`     | 405 Method Not Allowed         |
//! | `RouteMismatch { Pattern }`    | 404 Not Found                  |
//! | `RouteMismatch { Header }`     | 400 Bad Request                |
//! | `RouteMismatch { Consumes }`   | 415 Unsupported Media Type     |
//! | `RouteMismatch { Produces }`   | 406 Not Acceptable             |
//! | `Rejected` (queue full)        | 429 Too Many Requests          |
//! | `Rejected` (shutdown/timeout)  | 503 Service Unavailable        |
//! | `Resolution` / `Handler`       | from [`ResolveError`] / [`HttpError`], else 500 |
//! | `Panic`                        | 500 Internal Server Error      |

use std::any::Any;
use std::fmt;
use std::time::Duration;

use http::StatusCode;
use thiserror::Error;

/// Boxed error used at every resolver, advice and handler boundary.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

// =============================================================================
// Route mismatch
// =============================================================================

/// The route-matching stage that rejected a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MismatchReason {
    /// The method is not accepted by a route whose pattern matches the path.
    Method,
    /// No route pattern matches the path.
    Pattern,
    /// A header predicate failed.
    Header,
    /// The request content type is not consumable.
    Consumes,
    /// None of the acceptable media types can be produced.
    Produces,
}

impl MismatchReason {
    /// How far into the matching pipeline the request got before failing.
    ///
    /// When several routes fail, the reason with the highest specificity is
    /// reported.
    pub const fn specificity(self) -> u8 {
        match self {
            Self::Pattern => 0,
            Self::Method => 1,
            Self::Header => 2,
            Self::Consumes => 3,
            Self::Produces => 4,
        }
    }

    /// The client-visible status for this mismatch.
    pub const fn status(self) -> StatusCode {
        match self {
            Self::Method => StatusCode::METHOD_NOT_ALLOWED,
            Self::Pattern => StatusCode::NOT_FOUND,
            Self::Header => StatusCode::BAD_REQUEST,
            Self::Consumes => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            Self::Produces => StatusCode::NOT_ACCEPTABLE,
        }
    }

    /// Returns the stage name.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Method => "method",
            Self::Pattern => "pattern",
            Self::Header => "header",
            Self::Consumes => "consumes",
            Self::Produces => "produces",
        }
    }
}

impl fmt::Display for MismatchReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} mismatch", self.as_str())
    }
}

// =============================================================================
// Scheduling rejection
// =============================================================================

/// Why a scheduler refused or abandoned a task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectionReason {
    /// The scheduler has been shut down.
    Shutdown,
    /// Every worker is busy and the queue is full.
    QueueFull {
        /// Number of tasks waiting at the time of rejection.
        depth: usize,
    },
    /// The task did not complete within the scheduler's timeout.
    Timeout(Duration),
    /// Any other reason reported by the pool.
    Other(String),
}

impl fmt::Display for RejectionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Shutdown => f.write_str("shutdown"),
            Self::QueueFull { depth } => write!(f, "queue depth {depth}"),
            Self::Timeout(timeout) => write!(f, "timed out after {}ms", timeout.as_millis()),
            Self::Other(reason) => f.write_str(reason),
        }
    }
}

/// A synthetic failure produced when a scheduler cannot run a task.
///
/// The display form is `rejected by scheduler '<name>': <reason>`, which is
/// also what the default exception handler writes to the response body.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("rejected by scheduler '{scheduler}': {reason}")]
pub struct Rejection {
    /// Name of the rejecting scheduler.
    pub scheduler: String,
    /// Why the task was rejected.
    pub reason: RejectionReason,
}

impl Rejection {
    /// Creates a rejection for the named scheduler.
    pub fn new(scheduler: impl Into<String>, reason: RejectionReason) -> Self {
        Self {
            scheduler: scheduler.into(),
            reason,
        }
    }

    /// Overload-class status for this rejection.
    pub fn status(&self) -> StatusCode {
        match self.reason {
            RejectionReason::Shutdown | RejectionReason::Timeout(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            RejectionReason::QueueFull { .. } | RejectionReason::Other(_) => {
                StatusCode::TOO_MANY_REQUESTS
            }
        }
    }
}

// =============================================================================
// Resolution errors
// =============================================================================

/// Errors raised by the built-in resolvers and argument extraction.
#[derive(Debug, Clone, Error)]
pub enum ResolveError {
    /// A required parameter had no value and no default.
    #[error("missing required parameter '{name}'")]
    MissingParameter {
        /// Parameter name.
        name: String,
    },

    /// A raw value could not be converted to the declared type.
    #[error("failed to convert parameter '{name}': {reason}")]
    Conversion {
        /// Parameter name.
        name: String,
        /// Conversion failure message.
        reason: String,
    },

    /// No request-entity resolver handled the payload.
    #[error("no entity resolver could read content type '{media_type}'")]
    UnsupportedMediaType {
        /// The request media type.
        media_type: String,
    },

    /// No response-entity resolver could write an acceptable media type.
    #[error("no entity resolver could write any of [{acceptable}]")]
    NotAcceptable {
        /// Comma separated acceptable media types.
        acceptable: String,
    },

    /// A resolved argument does not have the type the handler expects.
    #[error("argument {index} expected type '{expected}' but resolved to '{actual}'")]
    ArgumentType {
        /// Argument position.
        index: usize,
        /// Handler parameter type.
        expected: &'static str,
        /// Resolved value type.
        actual: &'static str,
    },

    /// A handler parameter that cannot be null received a null value.
    #[error("argument {index} resolved to null")]
    NullArgument {
        /// Argument position.
        index: usize,
    },
}

impl ResolveError {
    /// Creates a missing parameter error.
    pub fn missing(name: impl Into<String>) -> Self {
        Self::MissingParameter { name: name.into() }
    }

    /// Creates a conversion error.
    pub fn conversion(name: impl Into<String>, reason: impl fmt::Display) -> Self {
        Self::Conversion {
            name: name.into(),
            reason: reason.to_string(),
        }
    }

    /// The client-visible status for this error.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::MissingParameter { .. } | Self::Conversion { .. } | Self::NullArgument { .. } => {
                StatusCode::BAD_REQUEST
            }
            Self::UnsupportedMediaType { .. } => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            Self::NotAcceptable { .. } => StatusCode::NOT_ACCEPTABLE,
            Self::ArgumentType { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// An error that carries the status it should be answered with.
///
/// Handlers and resolvers return this to choose a status without writing a
/// custom exception handler.
#[derive(Debug, Clone, Error)]
#[error("{status}: {message}")]
pub struct HttpError {
    status: StatusCode,
    message: String,
}

impl HttpError {
    /// Creates an error with the given status and message.
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    /// Shorthand for a 400 error.
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    /// Shorthand for a 404 error.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    /// Returns the status.
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Returns the message.
    pub fn message(&self) -> &str {
        &self.message
    }
}

// =============================================================================
// Dispatch error
// =============================================================================

/// Every failure a request can run into, from routing to response writing.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// No route accepted the request.
    #[error("route mismatch: {reason}")]
    RouteMismatch {
        /// The most specific failing stage.
        reason: MismatchReason,
    },

    /// A resolver or advice failed while building arguments or writing the
    /// response.
    #[error("resolution failed: {0}")]
    Resolution(#[source] BoxError),

    /// The scheduler refused, abandoned or timed out the task.
    #[error(transparent)]
    Rejected(#[from] Rejection),

    /// The handler returned an error.
    #[error("handler failed: {0}")]
    Handler(#[source] BoxError),

    /// The handler or a resolver panicked.
    #[error("panicked: {0}")]
    Panic(String),
}

impl DispatchError {
    /// Creates a route mismatch error.
    pub fn mismatch(reason: MismatchReason) -> Self {
        Self::RouteMismatch { reason }
    }

    /// Returns the wrapped error as `E`, looking through boxed sources.
    pub fn downcast_ref<E: std::error::Error + 'static>(&self) -> Option<&E> {
        match self {
            Self::Resolution(err) | Self::Handler(err) => err.downcast_ref::<E>(),
            Self::Rejected(rejection) => (rejection as &dyn Any).downcast_ref::<E>(),
            Self::RouteMismatch { .. } | Self::Panic(_) => None,
        }
    }

    /// Returns the rejection if this error came from a scheduler.
    pub fn rejection(&self) -> Option<&Rejection> {
        match self {
            Self::Rejected(rejection) => Some(rejection),
            _ => None,
        }
    }

    /// The default client-visible status for this error.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::RouteMismatch { reason } => reason.status(),
            Self::Rejected(rejection) => rejection.status(),
            Self::Resolution(err) | Self::Handler(err) => {
                if let Some(err) = err.downcast_ref::<HttpError>() {
                    err.status()
                } else if let Some(err) = err.downcast_ref::<ResolveError>() {
                    err.status()
                } else {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            }
            Self::Panic(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Result type for dispatch stages.
pub type DispatchResult<T> = Result<T, DispatchError>;
