//! # Error Handling Module
//!
//! This module defines the error taxonomy for the proxy core using the
//! `thiserror` crate, along with the HTTP status mapping the presentation
//! layer uses when surfacing failures to clients.
//!
//! The taxonomy mirrors the propagation policy of the system: errors local
//! to one enrichment item are absorbed inside the enrichment module and
//! never become a `ProxyError`; errors local to one request (validation,
//! upstream failure) are surfaced to that request's caller; store failures
//! degrade to cache-less operation and are logged rather than raised.

use thiserror::Error;

/// Main result type used throughout the proxy core.
pub type ProxyResult<T> = Result<T, ProxyError>;

/// Errors surfaced to a request's caller.
#[derive(Debug, Error, Clone)]
pub enum ProxyError {
    /// Request validation failures. Raised before any network or cache
    /// access, e.g. a requested date that has not begun anywhere on Earth.
    #[error("Validation failed: {message}")]
    Validation { message: String },

    /// Upstream returned 404. A first-class outcome rather than a generic
    /// upstream error: it drives the extended negative-cache path.
    #[error("Upstream resource not found")]
    NotFound { body: Option<String> },

    /// Upstream returned a non-404 error status. The status and body are
    /// propagated verbatim and never cached.
    #[error("Upstream error ({status})")]
    Upstream { status: u16, body: String },

    /// Transport-level failure talking to the upstream API (DNS, connect,
    /// timeout). No upstream status is available.
    #[error("Network error: {message}")]
    Network { message: String },

    /// Unexpected internal failures.
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl ProxyError {
    /// Create a validation error.
    pub fn validation<S: Into<String>>(message: S) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Create a network error.
    pub fn network<S: Into<String>>(message: S) -> Self {
        Self::Network {
            message: message.into(),
        }
    }

    /// Create an internal error.
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// HTTP status code this error maps to at the presentation boundary.
    ///
    /// Upstream errors keep the upstream's own status; transport failures
    /// map to 502 since the proxy could not reach the origin at all.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Validation { .. } => 400,
            Self::NotFound { .. } => 404,
            Self::Upstream { status, .. } => *status,
            Self::Network { .. } => 502,
            Self::Internal { .. } => 500,
        }
    }

    /// Whether a response for this error may ever be written to cache.
    ///
    /// Only not-found outcomes participate in negative caching; every other
    /// error is transient from the proxy's point of view.
    pub fn is_negatively_cacheable(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}
