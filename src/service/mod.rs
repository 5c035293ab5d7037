//! PDF rendering service module.
//!
//! This module provides the **framework-agnostic facade** over the rendering
//! engine. It contains the request/response types, the facade error type,
//! and the two entry points that turn a URL or an HTML document into PDF
//! bytes without the caller ever touching protocols or sessions.
//!
//! # Module Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       html2pdf-engine crate                             │
//! │                                                                         │
//! │  ┌───────────────────────────────────────────────────────────────────┐  │
//! │  │                    service module (this module)                   │  │
//! │  │                                                                   │  │
//! │  │  ┌─────────────────────────┐  ┌─────────────────────────────────┐ │  │
//! │  │  │      types.rs           │  │          pdf.rs                 │ │  │
//! │  │  │  ┌───────────────────┐  │  │  ┌───────────────────────────┐  │ │  │
//! │  │  │  │ PrintUrlRequest   │  │  │  │ print_url()               │  │ │  │
//! │  │  │  │ PrintHtmlRequest  │  │  │  │ print_html()              │  │ │  │
//! │  │  │  │ PdfResponse       │  │  │  └───────────────────────────┘  │ │  │
//! │  │  │  │ ServiceError      │  │  │                                 │ │  │
//! │  │  │  └───────────────────┘  │  │                                 │ │  │
//! │  │  └─────────────────────────┘  └─────────────────────────────────┘ │  │
//! │  └───────────────────────────────────────────────────────────────────┘  │
//! │                                    │                                    │
//! │                                    │ checkout / run / checkin           │
//! │                                    ▼                                    │
//! │  ┌───────────────────────────────────────────────────────────────────┐  │
//! │  │   SessionPool ──▶ Session ──▶ Protocol engine ──▶ Connection      │  │
//! │  └───────────────────────────────────────────────────────────────────┘  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Design Philosophy
//!
//! The module follows a **"thin facade, thick engine"** split:
//!
//! | Layer | Responsibility | This Module? |
//! |-------|----------------|--------------|
//! | **Facade** | Request validation, data-URL assembly, checkout, result shaping | Yes |
//! | **Engine** | Session lifecycle, protocol state machines, DevTools wire traffic | No (pool / session / protocol) |
//! | **HTTP surface** | Routing, headers, status codes | No (bring your own) |
//!
//! Benefits of this split:
//!
//! - **Single source of truth** for the rendering sequence: both entry
//!   points funnel into the same internal `render()` path
//! - **Easy testing** against mock pipes, with no web framework in the way
//! - **Escape hatch preserved** - anything the facade does not cover is
//!   reachable by checking a session out yourself and running a custom
//!   [`Protocol`](crate::protocol::Protocol)
//!
//! # Public API Summary
//!
//! ## Request Types
//!
//! | Type | Purpose |
//! |------|---------|
//! | [`PrintUrlRequest`] | Parameters for URL-to-PDF rendering |
//! | [`PrintHtmlRequest`] | Parameters for HTML-to-PDF rendering |
//!
//! ## Response and Error Types
//!
//! | Type | Purpose |
//! |------|---------|
//! | [`PdfResponse`] | Rendered bytes plus the filename to report |
//! | [`ServiceError`] | Facade errors with machine-readable codes |
//!
//! ## Entry Points
//!
//! | Function | Purpose | Suspends On |
//! |----------|---------|-------------|
//! | [`print_url`] | Render the document at a URL | checkout + render |
//! | [`print_html`] | Render an inline HTML document | checkout + render |
//!
//! Both functions are async and safe to call concurrently; the pool bounds
//! how many renders are actually in flight.
//!
//! # Usage Patterns
//!
//! ## Pattern 1: The Facade (Recommended)
//!
//! ```rust,ignore
//! use html2pdf_engine::prelude::*;
//!
//! let pool = SessionPool::builder()
//!     .config(SessionPoolConfigBuilder::new().pool_size(4).build()?)
//!     .build()
//!     .await?;
//!
//! let response = print_url(
//!     &pool,
//!     &PrintUrlRequest {
//!         url: "https://example.com/invoice/42".to_string(),
//!         filename: Some("invoice-42.pdf".to_string()),
//!         ..Default::default()
//!     },
//! )
//! .await?;
//!
//! std::fs::write(&response.filename, &response.data)?;
//! ```
//!
//! ## Pattern 2: Custom Protocols
//!
//! When the printing sequence is not enough (screenshots, script
//! injection, multi-page crawls), check a session out and drive it
//! directly; the facade and custom protocols share the same pool:
//!
//! ```rust,ignore
//! use html2pdf_engine::protocol::Protocol;
//! use std::time::Duration;
//!
//! let session = pool.checkout(Duration::from_secs(1)).await?;
//! let protocol = Protocol::builder("screenshot")
//!     .counts_use(true)
//!     .timeout(Duration::from_secs(10))
//!     // call / await / output steps ...
//!     .build();
//! let output = session.run(protocol).await?;
//! ```
//!
//! # Error Handling
//!
//! Every fallible call returns [`ServiceError`]. Validation errors
//! (`InvalidUrl`, `EmptyHtml`) are raised before a session is checked out,
//! so malformed requests never consume pool capacity; everything after
//! checkout surfaces as [`ServiceError::Engine`]. See
//! [`ServiceError::error_code`] for the stable codes exposed to API
//! clients.

mod pdf;
mod types;

pub use pdf::{print_html, print_url};
pub use types::{PdfResponse, PrintHtmlRequest, PrintUrlRequest, ServiceError};
