//! Convenient imports for common usage patterns.
//!
//! This module re-exports the most commonly used types from
//! `html2pdf-engine`, allowing you to quickly get started with a single
//! import.
//!
//! # Usage
//!
//! ```rust
//! use html2pdf_engine::prelude::*;
//! ```
//!
//! This imports:
//!
//! - [`SessionPool`] - Main pool type
//! - [`SessionPoolBuilder`] - Pool builder
//! - [`SessionPoolConfig`] - Configuration struct
//! - [`SessionPoolConfigBuilder`] - Configuration builder
//! - [`EngineError`] - Error type
//! - [`Result`] - Result type alias
//! - [`SessionHandle`] - RAII checkout token
//! - [`PoolStats`] - Pool statistics
//! - [`Protocol`] / [`ProtocolOutput`] - The per-request state machine
//! - [`PrintToPdfParams`] / [`Cookie`] - Print options and cookie prelude
//! - [`print_url`] / [`print_html`] - Facade entry points
//! - [`PrintUrlRequest`] / [`PrintHtmlRequest`] / [`PdfResponse`] - Facade types
//!
//! # Example
//!
//! ```rust,ignore
//! use html2pdf_engine::prelude::*;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = SessionPoolConfigBuilder::new()
//!         .pool_size(4)
//!         .max_session_uses(500)
//!         .no_sandbox(true) // containers
//!         .build()?;
//!
//!     let pool = SessionPool::builder().config(config).build().await?;
//!
//!     let response = print_html(
//!         &pool,
//!         &PrintHtmlRequest {
//!             html: "<h1>Hello</h1>".to_string(),
//!             ..Default::default()
//!         },
//!     )
//!     .await?;
//!
//!     std::fs::write(&response.filename, &response.data)?;
//!
//!     pool.shutdown().await;
//!     Ok(())
//! }
//! ```

// Core types
pub use crate::config::{SessionPoolConfig, SessionPoolConfigBuilder};
pub use crate::error::{EngineError, Result};
pub use crate::handle::SessionHandle;
pub use crate::pool::{SessionPool, SessionPoolBuilder};
pub use crate::protocol::print::{Cookie, PrintToPdfParams};
pub use crate::protocol::{Protocol, ProtocolOutput};
pub use crate::stats::PoolStats;

// Facade
pub use crate::service::{print_html, print_url, PdfResponse, PrintHtmlRequest, PrintUrlRequest};

// Feature-gated exports
#[cfg(feature = "env-config")]
pub use crate::config::env::{chrome_path_from_env, from_env};
