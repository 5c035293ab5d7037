//! # html2pdf-engine
//!
//! Session-pooled HTML-to-PDF rendering over the Chrome DevTools pipe.
//!
//! This crate drives one long-lived headless Chromium subprocess through
//! its DevTools protocol — over the subprocess pipe, not a local TCP port —
//! and multiplexes N isolated browser targets ("sessions") over that single
//! connection. Each render request runs as a small programmable state
//! machine of DevTools calls and expected replies, correct even when the
//! browser answers out of order.
//!
//! ## Features
//!
//! - **Session Pooling**: N isolated browser contexts over one browser
//!   process; checkout/checkin with RAII return
//! - **Use-count Recycling**: targets are torn down and replaced after a
//!   configurable number of renders
//! - **Supervision**: a browser crash fails in-flight requests fast and
//!   rebuilds the whole tree automatically
//! - **Non-queueing**: pool exhaustion is an immediate, explicit error —
//!   callers own their queueing policy
//! - **On-demand Mode**: zero idle browsers; boot one per request
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │              Your Application               │
//! └─────────────────┬───────────────────────────┘
//!                   │ print_url / print_html
//!                   ▼
//! ┌─────────────────────────────────────────────┐
//! │                SessionPool                  │
//! │ ┌─────────────────────────────────────────┐ │
//! │ │  idle sessions  [S1] [S2] [S3]          │ │
//! │ └─────────────────────────────────────────┘ │
//! │ ┌─────────────────────────────────────────┐ │
//! │ │  Supervisor (restart tree on crash)     │ │
//! │ └─────────────────────────────────────────┘ │
//! └─────────────────┬───────────────────────────┘
//!                   │ protocols (call/await/output)
//!                   ▼
//! ┌─────────────────────────────────────────────┐
//! │   Connection (call ids, routing tables)     │
//! └─────────────────┬───────────────────────────┘
//!                   │ 0x00-framed JSON over pipes
//!                   ▼
//! ┌─────────────────────────────────────────────┐
//! │        Headless Chromium subprocess         │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use html2pdf_engine::prelude::*;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let pool = SessionPool::builder()
//!         .config(
//!             SessionPoolConfigBuilder::new()
//!                 .pool_size(4)
//!                 .no_sandbox(true) // containers
//!                 .build()?,
//!         )
//!         .build()
//!         .await?;
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
//!     pool.shutdown().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Custom protocols
//!
//! The facade covers printing; anything else the DevTools protocol can do
//! is reachable by composing a [`Protocol`](protocol::Protocol) from
//! `call`, `await`, and `output` steps and running it on a checked-out
//! session. See the [`protocol`] module for the step grammar and the
//! out-of-order matching rules.
//!
//! ## Feature Flags
//!
//! | Feature | Description |
//! |---------|-------------|
//! | `env-config` | Load configuration from `HTML2PDF_*` environment variables |
//!
//! ## Scope
//!
//! The crate renders documents; it does not validate HTML, convert to
//! PDF/A, write files, or queue requests. Shutdown is cooperative — a
//! force-killed host leans on kill-on-drop for the browser subprocess.

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

// ============================================================================
// Modules
// ============================================================================

pub mod config;
pub mod connection;
pub mod error;
pub mod handle;
pub mod launcher;
pub mod pool;
pub mod prelude;
pub mod protocol;
pub mod service;
pub mod session;
pub mod stats;
pub mod transport;

// Internal: tree restart choreography.
mod supervisor;

// ============================================================================
// Re-exports (Public API)
// ============================================================================

pub use config::{SessionPoolConfig, SessionPoolConfigBuilder};
pub use error::{EngineError, Result};
pub use handle::SessionHandle;
pub use launcher::{BrowserLauncher, ChromeLauncher};
pub use pool::{SessionPool, SessionPoolBuilder};
pub use protocol::{Protocol, ProtocolBuilder, ProtocolOutput};
pub use stats::PoolStats;

#[cfg(feature = "env-config")]
pub use config::env::{chrome_path_from_env, from_env};
