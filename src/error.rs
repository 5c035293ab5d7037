//! Error types for the rendering engine.
//!
//! This module provides [`EngineError`], a unified error type for all
//! engine operations, and a convenient [`Result`] type alias.
//!
//! # Example
//!
//! ```rust
//! use html2pdf_engine::{EngineError, Result};
//!
//! fn render() -> Result<Vec<u8>> {
//!     Err(EngineError::PoolExhausted)
//! }
//!
//! match render() {
//!     Ok(pdf) => println!("Rendered {} bytes", pdf.len()),
//!     Err(EngineError::PoolExhausted) => println!("No session available, retry later"),
//!     Err(e) => eprintln!("Error: {}", e),
//! }
//! ```

/// Errors that can occur while driving the browser.
///
/// Each variant corresponds to one failure class of the engine. Local
/// recovery is limited to session retirement and replacement; everything
/// else is reported to the caller through this type.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The browser executable could not be started.
    ///
    /// # Common Causes
    ///
    /// - Chrome/Chromium binary not found or not installed
    /// - Invalid `chrome_executable` path in the configuration
    /// - Insufficient permissions to execute the binary
    #[error("failed to spawn browser: {0}")]
    SpawnFailed(String),

    /// The DevTools pipe returned end-of-stream while messages were still
    /// expected.
    #[error("browser transport closed")]
    TransportClosed,

    /// The browser subprocess exited while protocols were in flight.
    ///
    /// All in-flight protocols receive this error before the supervisor
    /// rebuilds the connection and its sessions.
    #[error("browser process died")]
    BrowserDied,

    /// A protocol step rejected an inbound message, or a payload did not
    /// have the expected shape.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The browser answered a DevTools call with a JSON-RPC error object.
    #[error("devtools error {code}: {message}")]
    Rpc {
        /// JSON-RPC error code reported by the browser.
        code: i64,
        /// Human-readable error message reported by the browser.
        message: String,
    },

    /// A protocol exceeded its wall-clock budget.
    ///
    /// The session that ran the protocol retires itself afterwards; the
    /// in-flight browser state is considered unrecoverable.
    #[error("protocol timed out")]
    Timeout,

    /// No idle session became available within the checkout timeout.
    ///
    /// The pool is non-queueing by design. Callers that need queueing
    /// must supply their own queue in front of the pool.
    #[error("session pool exhausted")]
    PoolExhausted,

    /// A session was asked to run a protocol while one was already running.
    #[error("session is busy")]
    Busy,

    /// Operation attempted during pool shutdown.
    #[error("pool is shutting down")]
    ShuttingDown,

    /// Invalid configuration provided.
    ///
    /// Use [`SessionPoolConfigBuilder`](crate::SessionPoolConfigBuilder),
    /// which validates configuration at build time.
    #[error("configuration error: {0}")]
    Configuration(String),
}

/// Convenience conversion from [`String`] to [`EngineError::Configuration`].
impl From<String> for EngineError {
    fn from(msg: String) -> Self {
        EngineError::Configuration(msg)
    }
}

/// Convenience conversion from `&str` to [`EngineError::Configuration`].
impl From<&str> for EngineError {
    fn from(msg: &str) -> Self {
        EngineError::Configuration(msg.to_string())
    }
}

/// Result type alias using [`EngineError`].
pub type Result<T> = std::result::Result<T, EngineError>;

// ============================================================================
// Unit Tests
// ============================================================================
