//! Top-level error types for toolvault
//!
//! Errors are flattened into a single enum and grouped by how an integrator
//! is expected to react to them (see [`ErrorKind`]).

use thiserror::Error;

use crate::interrupt::Interrupt;
use crate::store::StoreError;

/// Top-level error type for toolvault operations
///
/// - [`Error::Config`] - Fix the authorizer configuration
/// - [`Error::Interrupt`] - Ask the user to authorize, then re-invoke the call
/// - [`Error::Unauthorized`] - Raised by tool code when the downstream API
///   rejects the credential; converted into an interrupt by `protect`
/// - [`Error::NestedCall`] / [`Error::MissingContext`] - Integration bug
/// - [`Error::Store`] - Credential store failure
/// - [`Error::Tool`] - Anything else the wrapped tool failed with
#[derive(Debug, Error)]
pub enum Error {
    /// Invalid or contradictory configuration
    #[error("configuration error: {0}")]
    Config(String),

    /// Authorization is missing or insufficient
    #[error("authorization required: {0}")]
    Interrupt(Box<Interrupt>),

    /// The downstream API rejected the credential
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// A protected call was made from inside another protected call
    #[error("cannot nest tool calls that require token vault authorization")]
    NestedCall,

    /// No protected call is active, or the execution context lacks a field
    #[error("missing authorization context: {0}")]
    MissingContext(String),

    /// Credential store failure
    #[error("credential store error: {0}")]
    Store(#[from] StoreError),

    /// Error raised by the wrapped tool
    #[error("tool error: {0}")]
    Tool(Box<dyn std::error::Error + Send + Sync>),
}

/// How an [`Error`] should be handled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Fatal at construction time; never retried
    Configuration,
    /// Recoverable by user action, then re-invoking the call
    AuthorizationGap,
    /// Integrator misuse; never retried or converted
    Programming,
    /// Anything else; propagated unchanged
    Fatal,
}

impl Error {
    /// Wrap an arbitrary tool error
    pub fn tool(err: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self::Tool(err.into())
    }

    /// Signal that the downstream API rejected the credential
    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self::Unauthorized(msg.into())
    }

    /// Category of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Config(_) => ErrorKind::Configuration,
            Self::Interrupt(_) | Self::Unauthorized(_) => ErrorKind::AuthorizationGap,
            Self::NestedCall | Self::MissingContext(_) => ErrorKind::Programming,
            Self::Store(_) | Self::Tool(_) => ErrorKind::Fatal,
        }
    }

    /// Returns true if this is a configuration error
    pub fn is_config(&self) -> bool {
        matches!(self, Self::Config(_))
    }

    /// Returns true if this is an authorization interrupt
    pub fn is_interrupt(&self) -> bool {
        matches!(self, Self::Interrupt(_))
    }

    /// Returns true if this is the nested protected call error
    pub fn is_nested_call(&self) -> bool {
        matches!(self, Self::NestedCall)
    }

    /// Returns true if this error indicates integrator misuse
    pub fn is_programming(&self) -> bool {
        self.kind() == ErrorKind::Programming
    }

    /// The interrupt carried by this error, if any
    pub fn interrupt(&self) -> Option<&Interrupt> {
        match self {
            Self::Interrupt(interrupt) => Some(interrupt),
            _ => None,
        }
    }

    /// Convert into the carried interrupt, if any
    pub fn into_interrupt(self) -> Option<Interrupt> {
        match self {
            Self::Interrupt(interrupt) => Some(*interrupt),
            _ => None,
        }
    }
}

impl From<Interrupt> for Error {
    fn from(interrupt: Interrupt) -> Self {
        Self::Interrupt(Box::new(interrupt))
    }
}

/// Result type for toolvault operations
pub type Result<T> = std::result::Result<T, Error>;
