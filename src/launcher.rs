//! Browser launcher: executable discovery and launch flag assembly.
//!
//! This module provides the [`BrowserLauncher`] trait and [`ChromeLauncher`],
//! the production implementation that spawns a headless Chrome/Chromium
//! subprocess with the DevTools pipe enabled.
//!
//! # Overview
//!
//! The launcher handles:
//! - Chrome binary path detection (or custom path)
//! - Launch flag assembly for stable headless operation
//! - An ephemeral `--user-data-dir` per browser instance
//!
//! # Example
//!
//! ```rust,ignore
//! use html2pdf_engine::{ChromeLauncher, SessionPoolConfig};
//!
//! let launcher = ChromeLauncher::new(&SessionPoolConfig::default());
//! let transport = launcher.launch()?;
//! ```

use std::path::{Path, PathBuf};

use crate::config::SessionPoolConfig;
use crate::error::{EngineError, Result};
use crate::transport::Transport;

/// Trait for launching browsers.
///
/// Abstracts browser startup so the pool can be exercised against mock
/// transports in tests, and so alternative Chromium distributions can be
/// plugged in.
///
/// # Thread Safety
///
/// This trait requires `Send + Sync` because the launcher is shared by the
/// pool's supervisor and replacement tasks.
pub trait BrowserLauncher: Send + Sync {
    /// Start one browser and return its DevTools transport.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::SpawnFailed`] if the executable cannot be
    /// started.
    fn launch(&self) -> Result<Transport>;
}

/// Launcher for Chrome/Chromium with the DevTools pipe.
///
/// Builds the launch flag set once at construction and spawns a fresh
/// subprocess (with its own temporary user data directory) on every
/// [`launch()`](BrowserLauncher::launch) call.
pub struct ChromeLauncher {
    executable: Option<PathBuf>,
    no_sandbox: bool,
    discard_stderr: bool,
    extra_args: Vec<String>,
}

impl ChromeLauncher {
    /// Create a launcher from the pool configuration.
    pub fn new(config: &SessionPoolConfig) -> Self {
        Self {
            executable: config.chrome_executable.as_ref().map(PathBuf::from),
            no_sandbox: config.no_sandbox,
            discard_stderr: config.discard_stderr,
            extra_args: config.chrome_args.clone(),
        }
    }

    fn resolve_executable(&self) -> Result<PathBuf> {
        if let Some(path) = &self.executable {
            if path.exists() {
                return Ok(path.clone());
            }
            return Err(EngineError::SpawnFailed(format!(
                "configured chrome executable not found: {}",
                path.display()
            )));
        }

        discover_chrome().ok_or_else(|| {
            EngineError::SpawnFailed(
                "no Chrome/Chromium installation found; set chrome_executable".to_string(),
            )
        })
    }

    /// Assemble the full flag list for one launch.
    ///
    /// The DevTools transport rides on the subprocess pipe, so
    /// `--remote-debugging-pipe` is always present; everything else is
    /// the hardening set plus caller extras.
    fn build_args(&self, user_data_dir: &Path) -> Vec<String> {
        let mut args: Vec<String> = vec![
            "--headless".into(),
            "--disable-gpu".into(),
            "--remote-debugging-pipe".into(),
            format!("--user-data-dir={}", user_data_dir.display()),
            // ===== Noise Reduction =====
            "--no-first-run".into(),
            "--no-default-browser-check".into(),
            "--disable-crash-reporter".into(),
            "--disable-extensions".into(),
            "--disable-sync".into(),
            // ===== Memory and Stability =====
            "--disable-dev-shm-usage".into(),
            "--disable-background-timer-throttling".into(),
            "--disable-backgrounding-occluded-windows".into(),
            "--disable-hang-monitor".into(),
            // ===== Better CDP Stability =====
            "--disable-renderer-backgrounding".into(),
            "--disable-ipc-flooding-protection".into(),
        ];

        if self.no_sandbox {
            args.push("--no-sandbox".into());
        }

        args.extend(self.extra_args.iter().cloned());
        args
    }
}

impl BrowserLauncher for ChromeLauncher {
    fn launch(&self) -> Result<Transport> {
        let executable = self.resolve_executable()?;

        let user_data_dir = tempfile::tempdir().map_err(|e| {
            EngineError::SpawnFailed(format!("failed to create user data dir: {}", e))
        })?;

        let args = self.build_args(user_data_dir.path());

        log::debug!(
            "Launching browser: {} ({} flags)",
            executable.display(),
            args.len()
        );

        Transport::spawn(&executable, &args, user_data_dir, self.discard_stderr)
    }
}

/// Search well-known install locations for a Chrome/Chromium binary.
///
/// Returns the first existing candidate, or `None` when nothing is found.
pub fn discover_chrome() -> Option<PathBuf> {
    let candidates: &[&str] = if cfg!(target_os = "macos") {
        &[
            "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
            "/Applications/Chromium.app/Contents/MacOS/Chromium",
        ]
    } else if cfg!(target_os = "windows") {
        &[
            r"C:\Program Files\Google\Chrome\Application\chrome.exe",
            r"C:\Program Files (x86)\Google\Chrome\Application\chrome.exe",
        ]
    } else {
        &[
            "/usr/bin/google-chrome-stable",
            "/usr/bin/google-chrome",
            "/usr/bin/chromium",
            "/usr/bin/chromium-browser",
            "/snap/bin/chromium",
        ]
    };

    candidates
        .iter()
        .map(PathBuf::from)
        .find(|path| path.exists())
}

// ============================================================================
// Unit Tests
// ============================================================================
