//! Configuration for the session pool and browser launch.
//!
//! This module provides [`SessionPoolConfig`] and [`SessionPoolConfigBuilder`]
//! for configuring pool size, session recycling, browser launch flags, and
//! per-request deadlines.
//!
//! # Example
//!
//! ```rust
//! use std::time::Duration;
//! use html2pdf_engine::SessionPoolConfigBuilder;
//!
//! let config = SessionPoolConfigBuilder::new()
//!     .pool_size(4)
//!     .max_session_uses(500)
//!     .timeout(Duration::from_secs(10))
//!     .build()
//!     .expect("Invalid configuration");
//!
//! assert_eq!(config.pool_size, 4);
//! assert_eq!(config.max_session_uses, 500);
//! ```
//!
//! # Environment Configuration
//!
//! When the `env-config` feature is enabled, you can load configuration
//! from environment variables; see the [`env`] module.

use std::time::Duration;

/// Configuration consumed by the session pool and its browser connection.
///
/// Use [`SessionPoolConfigBuilder`] for validation and convenience.
///
/// # Fields Overview
///
/// | Field | Default | Description |
/// |-------|---------|-------------|
/// | `pool_size` | hardware threads | Number of concurrent sessions |
/// | `max_session_uses` | 1000 | Protocols per session before recycling |
/// | `on_demand` | false | Boot a browser per request, no idle sessions |
/// | `offline` | false | Emulate offline network conditions |
/// | `no_sandbox` | false | Add `--no-sandbox` to the launch flags |
/// | `discard_stderr` | true | Drop browser stderr instead of logging it |
/// | `ignore_certificate_errors` | false | Skip TLS verification in the browser |
/// | `init_timeout` | 5s | Session bootstrap deadline |
/// | `timeout` | 5s | Per-protocol deadline |
#[derive(Debug, Clone)]
pub struct SessionPoolConfig {
    /// Number of concurrent sessions (browser targets) kept by the pool.
    ///
    /// Each session renders one document at a time; this bounds the number
    /// of concurrently running protocols. Defaults to the number of
    /// hardware threads.
    pub pool_size: usize,

    /// Number of counting protocols a session runs before it is torn down
    /// and replaced with a fresh target.
    ///
    /// Recycling guards against tab-level memory growth in long-running
    /// deployments. Bootstrap and no-op protocols do not count.
    pub max_session_uses: u32,

    /// If true, the pool is empty at rest: every checkout boots a browser
    /// and one session, and every checkin tears them down again.
    ///
    /// Trades ~0.5s of per-request latency for zero idle resource use.
    pub on_demand: bool,

    /// If true, the session bootstrap emits
    /// `Network.emulateNetworkConditions(offline=true)` so pages cannot
    /// fetch external resources.
    pub offline: bool,

    /// If true, `--no-sandbox` is added to the launch flags.
    ///
    /// Required in most container environments where the kernel sandbox
    /// is unavailable.
    pub no_sandbox: bool,

    /// If true, browser stderr is routed to /dev/null; otherwise it is
    /// forwarded line-by-line to the logger at debug level.
    pub discard_stderr: bool,

    /// Extra command-line flags appended to the browser launch.
    pub chrome_args: Vec<String>,

    /// Path to the Chrome/Chromium executable.
    ///
    /// `None` auto-discovers the binary from well-known install locations.
    pub chrome_executable: Option<String>,

    /// If true, the session bootstrap emits
    /// `Security.setIgnoreCertificateErrors(ignore=true)`.
    pub ignore_certificate_errors: bool,

    /// Deadline for session bootstrap (context + target creation + attach).
    pub init_timeout: Duration,

    /// Default wall-clock deadline for each protocol.
    pub timeout: Duration,
}

impl Default for SessionPoolConfig {
    /// Production-ready default configuration.
    ///
    /// - Pool size: number of hardware threads
    /// - Session recycling: every 1000 protocols
    /// - Deadlines: 5 seconds for bootstrap and per request
    fn default() -> Self {
        Self {
            pool_size: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
            max_session_uses: 1000,
            on_demand: false,
            offline: false,
            no_sandbox: false,
            discard_stderr: true,
            chrome_args: Vec::new(),
            chrome_executable: None,
            ignore_certificate_errors: false,
            init_timeout: Duration::from_secs(5),
            timeout: Duration::from_secs(5),
        }
    }
}

/// Builder for [`SessionPoolConfig`] with validation.
///
/// Provides a fluent API for constructing validated configurations.
///
/// # Example
///
/// ```rust
/// use std::time::Duration;
/// use html2pdf_engine::SessionPoolConfigBuilder;
///
/// let config = SessionPoolConfigBuilder::new()
///     .pool_size(8)
///     .no_sandbox(true)
///     .chrome_arg("--font-render-hinting=none")
///     .init_timeout(Duration::from_secs(10))
///     .build()
///     .expect("Invalid configuration");
/// ```
///
/// # Validation
///
/// The [`build()`](Self::build) method validates:
/// - `pool_size` must be greater than 0
/// - `max_session_uses` must be greater than 0
pub struct SessionPoolConfigBuilder {
    config: SessionPoolConfig,
}

impl SessionPoolConfigBuilder {
    /// Create a new builder with default values.
    pub fn new() -> Self {
        Self {
            config: SessionPoolConfig::default(),
        }
    }

    /// Set the number of concurrent sessions (must be > 0).
    pub fn pool_size(mut self, size: usize) -> Self {
        self.config.pool_size = size;
        self
    }

    /// Set the number of protocols a session runs before recycling.
    pub fn max_session_uses(mut self, uses: u32) -> Self {
        self.config.max_session_uses = uses;
        self
    }

    /// Enable or disable on-demand mode (browser per request).
    pub fn on_demand(mut self, on_demand: bool) -> Self {
        self.config.on_demand = on_demand;
        self
    }

    /// Enable or disable offline network emulation.
    pub fn offline(mut self, offline: bool) -> Self {
        self.config.offline = offline;
        self
    }

    /// Add `--no-sandbox` to the browser launch flags.
    pub fn no_sandbox(mut self, no_sandbox: bool) -> Self {
        self.config.no_sandbox = no_sandbox;
        self
    }

    /// Route browser stderr to /dev/null (true) or to the logger (false).
    pub fn discard_stderr(mut self, discard: bool) -> Self {
        self.config.discard_stderr = discard;
        self
    }

    /// Append one extra browser launch flag.
    pub fn chrome_arg<S: Into<String>>(mut self, arg: S) -> Self {
        self.config.chrome_args.push(arg.into());
        self
    }

    /// Replace the extra browser launch flags.
    pub fn chrome_args(mut self, args: Vec<String>) -> Self {
        self.config.chrome_args = args;
        self
    }

    /// Override the Chrome/Chromium executable path.
    pub fn chrome_executable<S: Into<String>>(mut self, path: S) -> Self {
        self.config.chrome_executable = Some(path.into());
        self
    }

    /// Ignore TLS certificate errors in the browser.
    pub fn ignore_certificate_errors(mut self, ignore: bool) -> Self {
        self.config.ignore_certificate_errors = ignore;
        self
    }

    /// Set the session bootstrap deadline.
    pub fn init_timeout(mut self, timeout: Duration) -> Self {
        self.config.init_timeout = timeout;
        self
    }

    /// Set the default per-protocol deadline.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    /// Build and validate the configuration.
    ///
    /// # Errors
    ///
    /// - Returns error if `pool_size` is 0
    /// - Returns error if `max_session_uses` is 0
    ///
    /// # Example
    ///
    /// ```rust
    /// use html2pdf_engine::SessionPoolConfigBuilder;
    ///
    /// let config = SessionPoolConfigBuilder::new().pool_size(0).build();
    /// assert!(config.is_err());
    /// ```
    pub fn build(self) -> std::result::Result<SessionPoolConfig, String> {
        if self.config.pool_size == 0 {
            return Err("pool_size must be greater than 0".to_string());
        }

        if self.config.max_session_uses == 0 {
            return Err("max_session_uses must be greater than 0".to_string());
        }

        Ok(self.config)
    }
}

impl Default for SessionPoolConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Environment Configuration (feature-gated)
// ============================================================================

/// Environment-based configuration loading.
///
/// This module is only available when the `env-config` feature is enabled.
///
/// # Environment Variables
///
/// | Variable | Type | Default | Description |
/// |----------|------|---------|-------------|
/// | `HTML2PDF_POOL_SIZE` | usize | hardware threads | Concurrent sessions |
/// | `HTML2PDF_MAX_SESSION_USES` | u32 | 1000 | Protocols before recycling |
/// | `HTML2PDF_ON_DEMAND` | bool | false | Browser per request |
/// | `HTML2PDF_OFFLINE` | bool | false | Offline network emulation |
/// | `HTML2PDF_NO_SANDBOX` | bool | false | Add `--no-sandbox` |
/// | `HTML2PDF_TIMEOUT_SECONDS` | u64 | 5 | Per-protocol deadline |
/// | `HTML2PDF_INIT_TIMEOUT_SECONDS` | u64 | 5 | Bootstrap deadline |
/// | `CHROME_PATH` | String | auto | Custom Chrome binary path |
#[cfg(feature = "env-config")]
pub mod env {
    use super::*;
    use crate::error::EngineError;

    fn bool_var(name: &str) -> bool {
        dotenv::var(name)
            .map(|s| matches!(s.trim(), "1" | "true" | "yes"))
            .unwrap_or(false)
    }

    /// Load configuration from environment variables.
    ///
    /// Reads configuration with sensible defaults; also loads a `.env`
    /// file if present (via `dotenv`).
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Configuration`] if the resulting values fail
    /// builder validation.
    pub fn from_env() -> Result<SessionPoolConfig, EngineError> {
        let defaults = SessionPoolConfig::default();

        let pool_size = dotenv::var("HTML2PDF_POOL_SIZE")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.pool_size);

        let max_session_uses = dotenv::var("HTML2PDF_MAX_SESSION_USES")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.max_session_uses);

        let timeout_seconds = dotenv::var("HTML2PDF_TIMEOUT_SECONDS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.timeout.as_secs());

        let init_timeout_seconds = dotenv::var("HTML2PDF_INIT_TIMEOUT_SECONDS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.init_timeout.as_secs());

        log::info!("Loading pool configuration from environment:");
        log::info!("   - Pool size: {}", pool_size);
        log::info!("   - Max session uses: {}", max_session_uses);
        log::info!("   - Timeout: {}s", timeout_seconds);
        log::info!("   - Init timeout: {}s", init_timeout_seconds);

        let mut builder = SessionPoolConfigBuilder::new()
            .pool_size(pool_size)
            .max_session_uses(max_session_uses)
            .on_demand(bool_var("HTML2PDF_ON_DEMAND"))
            .offline(bool_var("HTML2PDF_OFFLINE"))
            .no_sandbox(bool_var("HTML2PDF_NO_SANDBOX"))
            .timeout(Duration::from_secs(timeout_seconds))
            .init_timeout(Duration::from_secs(init_timeout_seconds));

        if let Some(path) = chrome_path_from_env() {
            builder = builder.chrome_executable(path);
        }

        builder.build().map_err(EngineError::Configuration)
    }

    /// Get the Chrome path from the `CHROME_PATH` environment variable.
    ///
    /// Returns `None` if not set (auto-detection will be used).
    pub fn chrome_path_from_env() -> Option<String> {
        dotenv::var("CHROME_PATH").ok()
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
