//! Shared types for the rendering facade.
//!
//! This module defines the request/response contract of the facade. The
//! types are framework-agnostic: they serialize cleanly with serde so an
//! HTTP layer can lift them straight out of a query string or JSON body,
//! but nothing here depends on any web framework.
//!
//! # Overview
//!
//! | Type | Purpose |
//! |------|---------|
//! | [`PrintUrlRequest`] | Parameters for URL-to-PDF rendering |
//! | [`PrintHtmlRequest`] | Parameters for HTML-to-PDF rendering |
//! | [`PdfResponse`] | Successful rendering result |
//! | [`ServiceError`] | Facade error taxonomy with stable error codes |
//!
//! # Usage
//!
//! The request types are plain structs with `Default`, so partial
//! construction with struct-update syntax is the normal way to build them:
//!
//! ```rust
//! use html2pdf_engine::service::PrintUrlRequest;
//! use html2pdf_engine::protocol::print::PrintToPdfParams;
//!
//! let request = PrintUrlRequest {
//!     url: "https://example.com/report".to_string(),
//!     filename: Some("report.pdf".to_string()),
//!     pdf: PrintToPdfParams {
//!         landscape: Some(true),
//!         print_background: Some(true),
//!         ..Default::default()
//!     },
//!     ..Default::default()
//! };
//!
//! assert_eq!(request.filename_or_default(), "report.pdf");
//! ```
//!
//! # Error Handling
//!
//! All facade errors are represented by [`ServiceError`], which provides:
//!
//! - Human-readable messages via [`Display`](std::fmt::Display)
//! - Machine-readable codes via [`error_code()`](ServiceError::error_code)
//! - Transparent access to the underlying [`EngineError`] for engine
//!   failures
//!
//! ```rust
//! use html2pdf_engine::service::ServiceError;
//!
//! fn classify(err: &ServiceError) -> (&'static str, String) {
//!     (err.error_code(), err.to_string())
//! }
//!
//! let err = ServiceError::EmptyHtml;
//! assert_eq!(classify(&err), ("empty_html", "html content is empty".to_string()));
//! ```

use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::protocol::print::{Cookie, PrintToPdfParams};

/// Default output filename when the request does not name one.
const DEFAULT_FILENAME: &str = "document.pdf";

/// Request parameters for rendering a URL to PDF.
///
/// This struct represents the parameters of the URL-to-PDF entry point.
/// All fields except `url` are optional with sensible defaults.
///
/// # Required Fields
///
/// | Field | Type | Description |
/// |-------|------|-------------|
/// | `url` | `String` | The URL to render (must carry a scheme: http/https/file/data) |
///
/// # Optional Fields
///
/// | Field | Type | Default | Description |
/// |-------|------|---------|-------------|
/// | `filename` | `Option<String>` | `"document.pdf"` | Filename reported in the response |
/// | `wait_for` | `Option<String>` | none | JavaScript expression awaited before printing |
/// | `cookies` | `Vec<Cookie>` | `[]` | Cookies installed before navigation |
/// | `pdf` | `PrintToPdfParams` | browser defaults | Options forwarded to `Page.printToPDF` |
///
/// # Wait-For Behavior
///
/// `wait_for` closes the gap between "the frame stopped loading" and "the
/// page is actually done drawing". After navigation completes, the
/// expression is evaluated with promise await; rendering proceeds once it
/// resolves. Pages that render client-side set a flag when they are done:
///
/// ```javascript
/// // In the page, after all content is rendered:
/// window.renderDone = true;
///
/// // Or expose a promise that resolves on completion:
/// window.renderDone = fetchData().then(draw);
/// ```
///
/// and the request names it:
///
/// ```rust
/// # use html2pdf_engine::service::PrintUrlRequest;
/// let request = PrintUrlRequest {
///     url: "https://example.com/chart".to_string(),
///     wait_for: Some("window.renderDone".to_string()),
///     ..Default::default()
/// };
/// ```
///
/// Without `wait_for`, printing starts as soon as the frame stops
/// loading, which is correct for static documents and too early for
/// heavy single-page apps.
///
/// # Cookies
///
/// Cookies are installed via `Network.setCookie` before navigation, one
/// call per cookie. The common use is passing a session token so the
/// browser can fetch an authenticated page:
///
/// ```rust
/// # use html2pdf_engine::service::PrintUrlRequest;
/// use html2pdf_engine::protocol::print::Cookie;
///
/// let request = PrintUrlRequest {
///     url: "https://example.com/account/statement".to_string(),
///     cookies: vec![Cookie {
///         name: "session".to_string(),
///         value: "tok_123".to_string(),
///         domain: Some("example.com".to_string()),
///         path: None,
///     }],
///     ..Default::default()
/// };
/// ```
///
/// # Examples
///
/// ## Basic URL conversion
///
/// ```rust
/// use html2pdf_engine::service::PrintUrlRequest;
///
/// let request = PrintUrlRequest {
///     url: "https://example.com".to_string(),
///     ..Default::default()
/// };
///
/// assert_eq!(request.filename_or_default(), "document.pdf");
/// ```
///
/// ## Landscape report with print options
///
/// ```rust
/// use html2pdf_engine::service::PrintUrlRequest;
/// use html2pdf_engine::protocol::print::PrintToPdfParams;
///
/// let request = PrintUrlRequest {
///     url: "https://example.com/quarterly".to_string(),
///     filename: Some("quarterly-report.pdf".to_string()),
///     pdf: PrintToPdfParams {
///         landscape: Some(true),         // wide tables
///         print_background: Some(true),  // styled headers
///         margin_top: Some(0.4),
///         margin_bottom: Some(0.4),
///         ..Default::default()
///     },
///     ..Default::default()
/// };
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PrintUrlRequest {
    /// The URL to render. Must carry a scheme (http/https/file/data).
    pub url: String,
    /// Output filename reported back in the response.
    #[serde(default)]
    pub filename: Option<String>,
    /// JavaScript expression awaited before printing.
    #[serde(default)]
    pub wait_for: Option<String>,
    /// Cookies installed before navigation.
    #[serde(default)]
    pub cookies: Vec<Cookie>,
    /// Options forwarded to `Page.printToPDF`.
    #[serde(default)]
    pub pdf: PrintToPdfParams,
}

impl PrintUrlRequest {
    /// The requested filename, or `document.pdf`.
    ///
    /// # Example
    ///
    /// ```rust
    /// use html2pdf_engine::service::PrintUrlRequest;
    ///
    /// let request = PrintUrlRequest {
    ///     url: "https://example.com".to_string(),
    ///     ..Default::default()
    /// };
    /// assert_eq!(request.filename_or_default(), "document.pdf");
    /// ```
    pub fn filename_or_default(&self) -> String {
        self.filename
            .clone()
            .unwrap_or_else(|| DEFAULT_FILENAME.to_string())
    }
}

/// Request parameters for rendering inline HTML to PDF.
///
/// The HTML is loaded through a percent-encoded `data:` URL, so no web
/// server is needed; the browser renders the document exactly as if it
/// had been fetched. The remaining fields behave like
/// [`PrintUrlRequest`]'s.
///
/// # How It Works
///
/// The HTML content is converted to a data URL before navigation:
///
/// ```text
/// data:text/html;charset=utf-8,<percent-encoded-html>
/// ```
///
/// # Limitations
///
/// ## External Resources
///
/// Because the document has no origin, relative URLs do not resolve:
///
/// ```html
/// <!-- Does not resolve: relative URL -->
/// <img src="/images/logo.png">
///
/// <!-- Resolves: absolute URL -->
/// <img src="https://example.com/images/logo.png">
///
/// <!-- Resolves: inline base64 -->
/// <img src="data:image/png;base64,iVBORw0KGgo...">
/// ```
///
/// ## Size
///
/// Data URLs embed the whole document in the navigation target. Very
/// large documents (multiple megabytes) are better served from disk or a
/// local socket and rendered via [`PrintUrlRequest`].
///
/// # Examples
///
/// ## Simple HTML
///
/// ```rust
/// use html2pdf_engine::service::PrintHtmlRequest;
///
/// let request = PrintHtmlRequest {
///     html: "<h1>Hello World</h1><p>This is a test.</p>".to_string(),
///     ..Default::default()
/// };
/// ```
///
/// ## Complete document with styling
///
/// ```rust
/// use html2pdf_engine::service::PrintHtmlRequest;
/// use html2pdf_engine::protocol::print::PrintToPdfParams;
///
/// let html = r#"
/// <!DOCTYPE html>
/// <html>
/// <head>
///     <meta charset="UTF-8">
///     <style>
///         body { font-family: sans-serif; margin: 40px; }
///         th { background-color: #f5f5f5; }
///     </style>
/// </head>
/// <body>
///     <h1>Monthly Report</h1>
///     <table>
///         <tr><th>Metric</th><th>Value</th></tr>
///         <tr><td>Revenue</td><td>$50,000</td></tr>
///     </table>
/// </body>
/// </html>
/// "#;
///
/// let request = PrintHtmlRequest {
///     html: html.to_string(),
///     filename: Some("monthly-report.pdf".to_string()),
///     pdf: PrintToPdfParams {
///         print_background: Some(true), // keep the styled header row
///         ..Default::default()
///     },
///     ..Default::default()
/// };
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PrintHtmlRequest {
    /// The HTML document to render.
    pub html: String,
    /// Output filename reported back in the response.
    #[serde(default)]
    pub filename: Option<String>,
    /// JavaScript expression awaited before printing.
    #[serde(default)]
    pub wait_for: Option<String>,
    /// Cookies installed before navigation.
    #[serde(default)]
    pub cookies: Vec<Cookie>,
    /// Options forwarded to `Page.printToPDF`.
    #[serde(default)]
    pub pdf: PrintToPdfParams,
}

impl PrintHtmlRequest {
    /// The requested filename, or `document.pdf`.
    pub fn filename_or_default(&self) -> String {
        self.filename
            .clone()
            .unwrap_or_else(|| DEFAULT_FILENAME.to_string())
    }
}

/// A successfully rendered document.
///
/// Carries the raw PDF bytes plus the filename the caller asked for (or
/// the default). An HTTP layer would typically turn this into an
/// `application/pdf` body with a `Content-Disposition` built from
/// `filename`.
///
/// # Example
///
/// ```rust,ignore
/// let response = print_url(&pool, &request).await?;
///
/// assert!(response.data.starts_with(b"%PDF-"));
/// log::info!("rendered {} ({} bytes)", response.filename, response.size());
/// std::fs::write(&response.filename, &response.data)?;
/// ```
#[derive(Debug, Clone)]
pub struct PdfResponse {
    /// The raw PDF bytes.
    pub data: Vec<u8>,
    /// Filename to report to the client.
    pub filename: String,
}

impl PdfResponse {
    pub(crate) fn new(data: Vec<u8>, filename: String) -> Self {
        Self { data, filename }
    }

    /// Size of the rendered document in bytes.
    ///
    /// # Example
    ///
    /// ```rust,ignore
    /// if response.size() == 0 {
    ///     log::warn!("empty document rendered for {}", response.filename);
    /// }
    /// ```
    pub fn size(&self) -> usize {
        self.data.len()
    }
}

/// Errors surfaced by the rendering facade.
///
/// Validation failures are raised before a session is checked out; engine
/// failures pass through transparently so callers can still match on
/// [`EngineError`] variants when they need to.
///
/// # Variants and Codes
///
/// | Variant | Code | Meaning | Typical Reaction |
/// |---------|------|---------|------------------|
/// | `InvalidUrl` | `invalid_url` | URL empty or unparseable | reject the request |
/// | `EmptyHtml` | `empty_html` | HTML whitespace-only | reject the request |
/// | `Engine(PoolExhausted)` | `pool_exhausted` | no session free in time | retry with backoff |
/// | `Engine(Timeout)` | `timeout` | page exceeded its budget | raise timeout / simplify page |
/// | `Engine(_)` | `render_failed` | browser / protocol failure | retry once; the pool self-heals |
///
/// # Example
///
/// ```rust,ignore
/// match print_url(&pool, &request).await {
///     Ok(pdf) => serve(pdf),
///     Err(ServiceError::InvalidUrl(msg)) => {
///         // Caller error, no point retrying.
///         log::debug!("rejected url: {}", msg);
///     }
///     Err(ServiceError::Engine(EngineError::PoolExhausted)) => {
///         // Transient: every session was busy for the whole timeout.
///         tokio::time::sleep(Duration::from_millis(250)).await;
///     }
///     Err(e) => {
///         log::error!("render failed ({}): {}", e.error_code(), e);
///     }
/// }
/// ```
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// The request URL was empty or malformed.
    #[error("invalid url: {0}")]
    InvalidUrl(String),

    /// The request HTML was empty or whitespace-only.
    #[error("html content is empty")]
    EmptyHtml,

    /// The engine failed to render the document.
    #[error(transparent)]
    Engine(#[from] EngineError),
}

impl ServiceError {
    /// Machine-readable error code for API clients.
    ///
    /// The codes are stable strings suitable for a JSON error body or a
    /// metrics label; see the table on [`ServiceError`] for the mapping.
    ///
    /// # Example
    ///
    /// ```rust
    /// use html2pdf_engine::service::ServiceError;
    ///
    /// let err = ServiceError::InvalidUrl("no scheme".to_string());
    /// assert_eq!(err.error_code(), "invalid_url");
    /// ```
    pub fn error_code(&self) -> &'static str {
        match self {
            ServiceError::InvalidUrl(_) => "invalid_url",
            ServiceError::EmptyHtml => "empty_html",
            ServiceError::Engine(EngineError::PoolExhausted) => "pool_exhausted",
            ServiceError::Engine(EngineError::Timeout) => "timeout",
            ServiceError::Engine(_) => "render_failed",
        }
    }
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    /// Verifies filename defaulting on both request types.
    #[test]
    fn test_filename_defaults() {
        let request = PrintUrlRequest {
            url: "https://example.com".to_string(),
            ..Default::default()
        };
        assert_eq!(request.filename_or_default(), "document.pdf");

        let request = PrintHtmlRequest {
            html: "<p>hi</p>".to_string(),
            filename: Some("report.pdf".to_string()),
            ..Default::default()
        };
        assert_eq!(request.filename_or_default(), "report.pdf");
    }

    /// Verifies request deserialization with nested print options.
    #[test]
    fn test_request_deserialization() {
        let request: PrintUrlRequest = serde_json::from_str(
            r#"{
                "url": "https://example.com",
                "wait_for": "window.done",
                "pdf": {"landscape": true, "printBackground": false}
            }"#,
        )
        .unwrap();

        assert_eq!(request.url, "https://example.com");
        assert_eq!(request.wait_for.as_deref(), Some("window.done"));
        assert_eq!(request.pdf.landscape, Some(true));
        assert_eq!(request.pdf.print_background, Some(false));
        assert!(request.cookies.is_empty());
    }

    /// Verifies the machine-readable error codes.
    #[test]
    fn test_error_codes() {
        assert_eq!(
            ServiceError::InvalidUrl("x".into()).error_code(),
            "invalid_url"
        );
        assert_eq!(ServiceError::EmptyHtml.error_code(), "empty_html");
        assert_eq!(
            ServiceError::Engine(EngineError::PoolExhausted).error_code(),
            "pool_exhausted"
        );
        assert_eq!(
            ServiceError::Engine(EngineError::Timeout).error_code(),
            "timeout"
        );
        assert_eq!(
            ServiceError::Engine(EngineError::BrowserDied).error_code(),
            "render_failed"
        );
    }

    /// Verifies PdfResponse reports its size.
    #[test]
    fn test_response_size() {
        let response = PdfResponse::new(vec![1, 2, 3], "a.pdf".to_string());
        assert_eq!(response.size(), 3);
        assert_eq!(response.filename, "a.pdf");
    }
}
