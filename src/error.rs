//! Error types and error handling strategy for filament.
//!
//! Error handling follows these principles:
//!
//! - Errors are explicit and typed (no stringly-typed errors)
//! - Usage errors and protocol violations are surfaced, never swallowed
//! - Timeouts are a status value ([`crate::future::FutureStatus`]), not errors
//! - Panics inside fibers are isolated and transported as [`PanicPayload`]

use core::fmt;
use std::any::Any;
use std::sync::Arc;

/// A convenience result alias for fallible runtime operations.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// The kind of error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    // === Promise / future protocol ===
    /// The handle is not attached to a shared state.
    NoState,
    /// The exclusive future was already extracted from this producer.
    FutureAlreadyRetrieved,
    /// The shared state was already made ready.
    PromiseAlreadySatisfied,
    /// Every producer-side reference was dropped before a result was set.
    BrokenPromise,
    /// The future handle is default-constructed or already consumed.
    FutureUninitialized,

    // === Fiber lifecycle ===
    /// A blocked call was failed by an interruption request.
    Interrupted,
    /// The operation would deadlock the calling fiber (e.g. self-join).
    ResourceDeadlock,
    /// The operation was invoked on a handle in the wrong state.
    InvalidArgument,
    /// The joined fiber terminated with an uncaught panic.
    FiberPanicked,

    // === Ambient ===
    /// The calling thread has no installed scheduler.
    NotInstalled,
    /// A failure supplied by user code via `set_exception`.
    User,
}

impl ErrorKind {
    /// Returns a stable lowercase name for the kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NoState => "no_state",
            Self::FutureAlreadyRetrieved => "future_already_retrieved",
            Self::PromiseAlreadySatisfied => "promise_already_satisfied",
            Self::BrokenPromise => "broken_promise",
            Self::FutureUninitialized => "future_uninitialized",
            Self::Interrupted => "interrupted",
            Self::ResourceDeadlock => "resource_deadlock",
            Self::InvalidArgument => "invalid_argument",
            Self::FiberPanicked => "fiber_panicked",
            Self::NotInstalled => "not_installed",
            Self::User => "user",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The main error type for filament operations.
///
/// Carries a kind, optional context text, and an optional source chain.
/// Errors are cheaply cloneable so a single failure can be delivered to
/// every consumer of a shared state.
#[derive(Debug, Clone)]
pub struct Error {
    kind: ErrorKind,
    context: Option<String>,
    source: Option<Arc<dyn std::error::Error + Send + Sync>>,
}

impl Error {
    /// Creates a new error with the given kind.
    #[must_use]
    pub const fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            context: None,
            source: None,
        }
    }

    /// Returns the error kind.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Returns true if this error represents an interruption.
    #[must_use]
    pub const fn is_interrupted(&self) -> bool {
        matches!(self.kind, ErrorKind::Interrupted)
    }

    /// Returns true if this error represents an abandoned producer.
    #[must_use]
    pub const fn is_broken_promise(&self) -> bool {
        matches!(self.kind, ErrorKind::BrokenPromise)
    }

    /// Adds context text to the error.
    #[must_use]
    pub fn with_context(mut self, ctx: impl Into<String>) -> Self {
        self.context = Some(ctx.into());
        self
    }

    /// Adds a source error to the chain.
    #[must_use]
    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Arc::new(source));
        self
    }

    /// Creates a user failure from an arbitrary error value.
    ///
    /// This is the type-erased failure carrier a producer hands to
    /// `set_exception`; consumers receive a clone of it from `get`.
    #[must_use]
    pub fn user(source: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::new(ErrorKind::User).with_source(source)
    }

    /// Creates an interruption error.
    #[must_use]
    pub fn interrupted() -> Self {
        Self::new(ErrorKind::Interrupted)
    }

    /// Creates a broken-promise error.
    #[must_use]
    pub fn broken_promise() -> Self {
        Self::new(ErrorKind::BrokenPromise)
    }

    /// Creates an error from a panic captured inside a fiber or task.
    #[must_use]
    pub fn panicked(payload: &PanicPayload) -> Self {
        Self::new(ErrorKind::FiberPanicked).with_context(payload.message())
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.kind.as_str())?;
        if let Some(ctx) = &self.context {
            write!(f, ": {ctx}")?;
        }
        Ok(())
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source.as_ref().map(|e| e.as_ref() as _)
    }
}

/// Error returned when a fiber cannot be spawned.
#[derive(Debug, thiserror::Error)]
pub enum SpawnError {
    /// The calling thread has no installed scheduler.
    #[error("no scheduler installed on this thread")]
    NotInstalled,
    /// The OS refused to create the carrier for the fiber stack.
    #[error("failed to allocate fiber stack")]
    Stack(#[from] std::io::Error),
}

/// A captured panic from a fiber entry function or packaged-task callable.
///
/// Only the message is retained; arbitrary payloads are reduced to their
/// string form so the payload stays `Send + Sync + Clone`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PanicPayload {
    message: String,
}

impl PanicPayload {
    /// Captures a panic payload from `catch_unwind`.
    #[must_use]
    pub fn from_any(payload: &(dyn Any + Send)) -> Self {
        let message = payload.downcast_ref::<&str>().map_or_else(
            || {
                payload
                    .downcast_ref::<String>()
                    .cloned()
                    .unwrap_or_else(|| "opaque panic payload".to_owned())
            },
            |s| (*s).to_owned(),
        );
        Self { message }
    }

    /// Creates a payload from a plain message.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// Returns the panic message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for PanicPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "panic: {}", self.message)
    }
}
