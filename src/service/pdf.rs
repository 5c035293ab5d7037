//! Core rendering entry points (framework-agnostic).
//!
//! This module contains the rendering logic shared by every caller of the
//! facade: validate the request, check a session out of the pool, build
//! the canonical printing protocol, and hand back the rendered bytes. The
//! session goes back to the pool via RAII whether rendering succeeds or
//! fails.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                       Your Application                          │
//! └─────────────────────────┬───────────────────────────────────────┘
//!                           │ async call
//!                           ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                  This Module (pdf.rs)                           │
//! │  ┌─────────────────┐  ┌─────────────────┐                       │
//! │  │   print_url     │  │   print_html    │                       │
//! │  └────────┬────────┘  └────────┬────────┘                       │
//! │           │ validate_url       │ empty check + data URL         │
//! │           └──────────┬─────────┘                                │
//! │                      ▼                                          │
//! │              ┌──────────────┐                                   │
//! │              │   render()   │  checkout ─▶ protocol ─▶ bytes    │
//! │              └──────┬───────┘                                   │
//! └─────────────────────┼───────────────────────────────────────────┘
//!                       │
//!                       ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │             SessionPool / Protocol engine / Browser             │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Thread Safety
//!
//! Both entry points are async and safe to call from any number of tasks
//! concurrently. The pool bounds actual parallelism: at most `pool_size`
//! renders run at once, and callers beyond that wait inside `checkout`
//! up to the configured timeout before failing with `pool_exhausted`.
//!
//! # Session Lifecycle
//!
//! The checked-out session is held for the duration of one render and
//! returned automatically:
//!
//! ```text
//! ┌─────────────────┐     ┌─────────────────┐     ┌─────────────────┐
//! │  pool.checkout  │ ──▶ │  SessionHandle  │ ──▶ │  run(protocol)  │
//! │  (idle → busy)  │     │  (RAII guard)   │     │  (the render)   │
//! └─────────────────┘     └─────────────────┘     └────────┬────────┘
//!                                                          │
//!                                                          ▼
//!                         ┌─────────────────┐     ┌─────────────────┐
//!                         │  Back to Pool   │ ◀── │  Drop Handle    │
//!                         │  (or replaced)  │     │  (even on error)│
//!                         └─────────────────┘     └─────────────────┘
//! ```
//!
//! # Performance
//!
//! Typical durations for a moderately complex page on a warm pool:
//!
//! | Phase | Typical Duration | Notes |
//! |-------|------------------|-------|
//! | URL validation | < 1ms | before any pool traffic |
//! | Session checkout | < 1ms | if a session is idle |
//! | Navigation + load | 100ms - 5s | dominated by the target page |
//! | Wait-for evaluation | 0 - timeout | only when `wait_for` is set |
//! | PDF rendering | 100ms - 2s | page complexity |
//!
//! The whole render is bounded by the pool's configured `timeout`; a page
//! that blows the budget fails with `timeout` and its session is recycled.

use crate::error::EngineError;
use crate::pool::SessionPool;
use crate::protocol::print::print_protocol;

use super::types::{PdfResponse, PrintHtmlRequest, PrintUrlRequest, ServiceError};

/// Render the document at a URL to PDF.
///
/// Validates the URL, checks a session out of the pool, navigates, waits
/// for the page (and the optional `wait_for` expression), and returns the
/// rendered bytes.
///
/// # Arguments
///
/// * `pool` - The session pool to render on. The pool's `timeout` bounds
///   both the checkout wait and the render itself.
/// * `request` - Rendering parameters. See [`PrintUrlRequest`] for the
///   full field reference.
///
/// # Returns
///
/// * `Ok(PdfResponse)` - the document bytes plus the effective filename
/// * `Err(ServiceError)` - what went wrong and how to classify it
///
/// # Errors
///
/// | Error | Cause | Resolution |
/// |-------|-------|------------|
/// | [`InvalidUrl`] | URL empty or unparseable | send a schemeful URL |
/// | [`PoolExhausted`] | every session busy for the whole timeout | retry, or grow the pool |
/// | [`Timeout`] | page exceeded the render budget | raise `timeout` or simplify the page |
/// | [`Rpc`] | the browser rejected a DevTools call | check the page; often a bad URL target |
/// | [`BrowserDied`] | browser crashed mid-render | retry once; the tree restarts itself |
///
/// [`InvalidUrl`]: ServiceError::InvalidUrl
/// [`PoolExhausted`]: crate::EngineError::PoolExhausted
/// [`Timeout`]: crate::EngineError::Timeout
/// [`Rpc`]: crate::EngineError::Rpc
/// [`BrowserDied`]: crate::EngineError::BrowserDied
///
/// # Examples
///
/// ## Basic usage
///
/// ```rust,ignore
/// use html2pdf_engine::service::{print_url, PrintUrlRequest};
///
/// let response = print_url(
///     &pool,
///     &PrintUrlRequest {
///         url: "https://example.com".to_string(),
///         ..Default::default()
///     },
/// )
/// .await?;
///
/// assert!(response.data.starts_with(b"%PDF-"));
/// ```
///
/// ## With custom options
///
/// ```rust,ignore
/// use html2pdf_engine::protocol::print::PrintToPdfParams;
///
/// let response = print_url(
///     &pool,
///     &PrintUrlRequest {
///         url: "https://example.com/report".to_string(),
///         filename: Some("quarterly-report.pdf".to_string()),
///         wait_for: Some("window.chartsReady".to_string()),
///         pdf: PrintToPdfParams {
///             landscape: Some(true),
///             print_background: Some(true),
///             ..Default::default()
///         },
///         ..Default::default()
///     },
/// )
/// .await?;
/// ```
///
/// ## Error handling
///
/// ```rust,ignore
/// use html2pdf_engine::{service::ServiceError, EngineError};
///
/// match print_url(&pool, &request).await {
///     Ok(pdf) => {
///         // Success - use pdf.data
///     }
///     Err(ServiceError::InvalidUrl(msg)) => {
///         // Caller error, do not retry
///         eprintln!("bad url: {}", msg);
///     }
///     Err(ServiceError::Engine(EngineError::PoolExhausted)) => {
///         // Transient, retry after a short delay
///         tokio::time::sleep(Duration::from_millis(250)).await;
///     }
///     Err(e) => {
///         eprintln!("render failed ({}): {}", e.error_code(), e);
///     }
/// }
/// ```
pub async fn print_url(
    pool: &SessionPool,
    request: &PrintUrlRequest,
) -> Result<PdfResponse, ServiceError> {
    let url = validate_url(&request.url)?;

    log::debug!("Rendering PDF from URL {}", truncate_url(&url, 100));

    render(
        pool,
        url,
        request.wait_for.clone(),
        request.cookies.clone(),
        request.pdf.clone(),
        request.filename_or_default(),
    )
    .await
}

/// Render an inline HTML document to PDF.
///
/// Loads the provided HTML through a percent-encoded `data:` URL, which
/// needs no web server, then follows the same path as [`print_url`].
///
/// # How It Works
///
/// The HTML content becomes the navigation target itself:
///
/// ```text
/// data:text/html;charset=utf-8,<percent-encoded-html>
/// ```
///
/// The browser renders it exactly as it would a fetched page, including
/// scripts and inline styles.
///
/// # Limitations
///
/// The document has no origin, so relative resource URLs do not resolve;
/// use absolute URLs or inline base64 assets. See [`PrintHtmlRequest`]
/// for examples and the size caveats.
///
/// # Errors
///
/// | Error | Cause | Resolution |
/// |-------|-------|------------|
/// | [`EmptyHtml`] | HTML is empty or whitespace-only | send content |
/// | everything from [`print_url`] | same path after validation | same |
///
/// [`EmptyHtml`]: ServiceError::EmptyHtml
///
/// # Examples
///
/// ## Simple HTML
///
/// ```rust,ignore
/// use html2pdf_engine::service::{print_html, PrintHtmlRequest};
///
/// let response = print_html(
///     &pool,
///     &PrintHtmlRequest {
///         html: "<h1>Hello World</h1>".to_string(),
///         ..Default::default()
///     },
/// )
/// .await?;
///
/// std::fs::write("hello.pdf", &response.data)?;
/// ```
///
/// ## With embedded images
///
/// ```rust,ignore
/// use base64::Engine as _;
///
/// let logo = base64::engine::general_purpose::STANDARD
///     .encode(std::fs::read("logo.png")?);
///
/// let response = print_html(
///     &pool,
///     &PrintHtmlRequest {
///         html: format!(
///             r#"<img src="data:image/png;base64,{logo}"><h1>Company Report</h1>"#
///         ),
///         ..Default::default()
///     },
/// )
/// .await?;
/// ```
pub async fn print_html(
    pool: &SessionPool,
    request: &PrintHtmlRequest,
) -> Result<PdfResponse, ServiceError> {
    if request.html.trim().is_empty() {
        log::warn!("Empty HTML content provided");
        return Err(ServiceError::EmptyHtml);
    }

    let url = html_to_data_url(&request.html);

    log::debug!(
        "Rendering PDF from {} bytes of HTML ({} byte data url)",
        request.html.len(),
        url.len()
    );

    render(
        pool,
        url,
        request.wait_for.clone(),
        request.cookies.clone(),
        request.pdf.clone(),
        request.filename_or_default(),
    )
    .await
}

/// The shared render path: checkout, protocol, bytes.
///
/// Both entry points land here once their input is validated and turned
/// into a navigable URL. The session handle is held across the render and
/// returned on drop, success or not.
async fn render(
    pool: &SessionPool,
    url: String,
    wait_for: Option<String>,
    cookies: Vec<crate::protocol::print::Cookie>,
    pdf: crate::protocol::print::PrintToPdfParams,
    filename: String,
) -> Result<PdfResponse, ServiceError> {
    let timeout = pool.config().timeout;
    let session = pool.checkout(timeout).await?;

    let protocol = print_protocol(url, pdf, cookies, wait_for, timeout);
    let output = session.run(protocol).await?;

    let bytes = output.into_bytes().ok_or_else(|| {
        ServiceError::Engine(EngineError::Protocol(
            "print protocol produced no document bytes".to_string(),
        ))
    })?;

    log::info!(
        "Rendered {} ({} bytes) on session {}",
        filename,
        bytes.len(),
        session.worker_id()
    );

    Ok(PdfResponse::new(bytes, filename))
}

/// Validate and normalize a URL string.
///
/// Parses with the `url` crate and returns the normalized form. This
/// catches malformed input before a session is checked out, so bad
/// requests never consume pool capacity.
///
/// # Validation Rules
///
/// - the URL must not be empty or whitespace-only
/// - the URL must parse (which requires a scheme: http/https/file/data)
///
/// # Examples
///
/// ```rust,ignore
/// assert!(validate_url("https://example.com").is_ok());
/// assert!(validate_url("").is_err());
/// assert!(validate_url("example.com").is_err()); // no scheme
/// ```
fn validate_url(url: &str) -> Result<String, ServiceError> {
    if url.trim().is_empty() {
        return Err(ServiceError::InvalidUrl("url is required".to_string()));
    }

    url::Url::parse(url)
        .map(|parsed| parsed.to_string())
        .map_err(|e| ServiceError::InvalidUrl(e.to_string()))
}

/// Percent-encode an HTML document into a `data:` URL.
fn html_to_data_url(html: &str) -> String {
    format!(
        "data:text/html;charset=utf-8,{}",
        urlencoding::encode(html)
    )
}

/// Truncate a URL for log output.
///
/// Data URLs embed entire documents; logging them verbatim would flood
/// the log with page content.
fn truncate_url(url: &str, max_len: usize) -> String {
    if url.len() <= max_len {
        url.to_string()
    } else {
        format!("{}...", &url[..max_len])
    }
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_url_valid() {
        assert_eq!(
            validate_url("https://example.com").unwrap(),
            "https://example.com/"
        );
        assert!(validate_url("http://localhost:3000/report?id=1").is_ok());
        assert!(validate_url("data:text/html,<h1>Hi</h1>").is_ok());
        assert!(validate_url("file:///tmp/page.html").is_ok());
    }

    #[test]
    fn test_validate_url_invalid() {
        assert!(matches!(
            validate_url(""),
            Err(ServiceError::InvalidUrl(_))
        ));
        assert!(matches!(
            validate_url("   "),
            Err(ServiceError::InvalidUrl(_))
        ));
        assert!(matches!(
            validate_url("example.com"),
            Err(ServiceError::InvalidUrl(_))
        ));
        assert!(matches!(
            validate_url("/relative/path"),
            Err(ServiceError::InvalidUrl(_))
        ));
    }

    #[test]
    fn test_html_to_data_url() {
        let url = html_to_data_url("<h1>Hello & welcome</h1>");
        assert!(url.starts_with("data:text/html;charset=utf-8,"));
        assert!(!url.contains('<'), "Raw HTML must be percent-encoded");
        assert!(url.contains("%3Ch1%3E"));
        assert!(url.contains("%26"));
    }

    #[test]
    fn test_truncate_url() {
        assert_eq!(truncate_url("short", 10), "short");
        let long = "x".repeat(50);
        let truncated = truncate_url(&long, 10);
        assert_eq!(truncated.len(), 13);
        assert!(truncated.ends_with("..."));
    }
}
