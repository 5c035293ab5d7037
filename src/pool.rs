//! Session pool with checkout/checkin lifecycle management.
//!
//! This module provides [`SessionPool`], a fixed-size set of sessions over
//! one shared browser connection. Checkout hands out an idle session (or
//! fails fast with `pool_exhausted`), checkin returns it — or, when the
//! session's use budget is exhausted or it hit a fatal error, retires it
//! and starts a replacement asynchronously.
//!
//! The pool is deliberately **non-queueing**: when no session is idle,
//! callers receive a failure after the checkout timeout rather than joining
//! an unbounded queue. Upstream callers supply their own queue.
//!
//! # Architecture
//!
//! ```text
//! SessionPool
//!   ├─ PoolInner (shared state)
//!   │   ├─ connection: shared browser connection
//!   │   ├─ idle: Vec<Session>       (ready for checkout)
//!   │   ├─ live: AtomicUsize        (all existing sessions)
//!   │   └─ idle_notify              (wakes checkout waiters)
//!   └─ supervisor task              (rebuilds the tree on browser death)
//! ```
//!
//! # On-demand variant
//!
//! With `on_demand` set, the pool is empty at rest: every checkout boots a
//! fresh browser plus one session, and checkin tears both down. This trades
//! roughly half a second of per-request latency for zero idle resource use.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::time::Duration;
//! use html2pdf_engine::{SessionPool, SessionPoolConfigBuilder};
//! use html2pdf_engine::protocol::print::ping_protocol;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let pool = SessionPool::builder()
//!         .config(SessionPoolConfigBuilder::new().pool_size(4).build()?)
//!         .build()
//!         .await?;
//!
//!     {
//!         let session = pool.checkout(Duration::from_secs(1)).await?;
//!         session.run(ping_protocol(Duration::from_secs(5))).await?;
//!     } // session returned to the pool automatically
//!
//!     pool.shutdown().await;
//!     Ok(())
//! }
//! ```

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{Notify, RwLock};

use crate::config::SessionPoolConfig;
use crate::connection::Connection;
use crate::error::{EngineError, Result};
use crate::handle::SessionHandle;
use crate::launcher::{BrowserLauncher, ChromeLauncher};
use crate::session::Session;
use crate::stats::PoolStats;
use crate::supervisor;

// ============================================================================
// PoolInner
// ============================================================================

/// Shared pool state, reachable from handles and background tasks.
pub(crate) struct PoolInner {
    config: SessionPoolConfig,
    launcher: Box<dyn BrowserLauncher>,

    /// The shared browser connection; `None` at rest in on-demand mode and
    /// briefly during a supervisor rebuild.
    connection: RwLock<Option<Arc<Connection>>>,

    /// Sessions ready for checkout.
    idle: Mutex<Vec<Session>>,

    /// Wakes checkout waiters when a session is returned or created.
    idle_notify: Notify,

    /// All sessions in existence (idle + checked out).
    live: AtomicUsize,

    shutting_down: AtomicBool,

    /// Captured so checkin can spawn async work from `Drop`.
    runtime: tokio::runtime::Handle,
}

impl PoolInner {
    pub(crate) fn config(&self) -> &SessionPoolConfig {
        &self.config
    }

    pub(crate) fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::Acquire)
    }

    pub(crate) async fn connection(&self) -> Option<Arc<Connection>> {
        self.connection.read().await.clone()
    }

    /// Open a browser and bootstrap the full complement of sessions.
    ///
    /// Used at pool start and by the supervisor after a crash. The
    /// connection is installed only once every session bootstrapped; a
    /// partial failure tears everything down again.
    pub(crate) async fn open_tree(self: &Arc<Self>) -> Result<()> {
        let transport = self.launcher.launch()?;
        let connection = Connection::open(transport);

        let mut sessions = Vec::with_capacity(self.config.pool_size);
        for _ in 0..self.config.pool_size {
            match Session::start(&connection, &self.config).await {
                Ok(session) => sessions.push(session),
                Err(e) => {
                    log::error!("Failed to bootstrap session: {}", e);
                    for session in sessions {
                        session.retire();
                    }
                    connection.close().await;
                    return Err(e);
                }
            }
        }

        *self.connection.write().await = Some(connection);

        let count = sessions.len();
        {
            let mut idle = self.idle.lock().unwrap();
            for session in sessions {
                idle.push(session);
                self.live.fetch_add(1, Ordering::AcqRel);
            }
        }

        log::info!("Session pool ready with {} sessions", count);
        self.idle_notify.notify_waiters();
        Ok(())
    }

    /// Retire every idle session and stop the connection.
    ///
    /// Called by the supervisor when the browser dies and on shutdown;
    /// checked-out sessions are already defunct and get retired on
    /// checkin.
    pub(crate) async fn drain_tree(&self) {
        let drained: Vec<Session> = std::mem::take(&mut *self.idle.lock().unwrap());
        for session in drained {
            self.live.fetch_sub(1, Ordering::AcqRel);
            session.retire();
        }

        if let Some(connection) = self.connection.write().await.take() {
            connection.close().await;
        }
    }

    /// Return a session to the pool, or retire and replace it.
    ///
    /// Runs synchronously so it can be called from `Drop`; replacement
    /// bootstrapping is spawned onto the runtime.
    pub(crate) fn checkin(self: &Arc<Self>, session: Session, on_demand: Option<Arc<Connection>>) {
        // On-demand sessions never go back: the whole browser goes away.
        if let Some(connection) = on_demand {
            log::debug!(
                "Session {}: on-demand checkin, stopping its browser",
                session.worker_id()
            );
            self.live.fetch_sub(1, Ordering::AcqRel);
            session.retire();
            self.runtime.spawn(async move { connection.close().await });
            return;
        }

        if self.is_shutting_down() {
            self.live.fetch_sub(1, Ordering::AcqRel);
            session.retire();
            return;
        }

        if session.needs_replacement() {
            log::info!(
                "Session {}: retiring on checkin (defunct: {}, uses: {})",
                session.worker_id(),
                session.is_defunct(),
                session.uses()
            );
            let home = Arc::clone(session.connection());
            self.live.fetch_sub(1, Ordering::AcqRel);
            session.retire();

            let inner = Arc::clone(self);
            self.runtime.spawn(async move {
                inner.spawn_replacement(home).await;
            });
            return;
        }

        log::trace!("Session {}: returned to pool", session.worker_id());
        self.idle.lock().unwrap().push(session);
        self.idle_notify.notify_one();
    }

    /// Bootstrap one replacement session on the current connection.
    ///
    /// `home` is the connection the retired session lived on: when the
    /// supervisor has already rebuilt the tree in the meantime, the full
    /// complement exists and no replacement is owed.
    async fn spawn_replacement(self: &Arc<Self>, home: Arc<Connection>) {
        if self.is_shutting_down() {
            return;
        }

        let Some(connection) = self.connection().await else {
            // No connection: the supervisor is rebuilding the whole tree
            // and will recreate the full complement.
            return;
        };
        if !Arc::ptr_eq(&connection, &home) {
            log::debug!("Skipping replacement: session belonged to a replaced browser");
            return;
        }
        if !connection.is_alive() {
            return;
        }

        match Session::start(&connection, &self.config).await {
            Ok(session) => {
                log::info!("Replacement session {} ready", session.worker_id());
                self.idle.lock().unwrap().push(session);
                self.live.fetch_add(1, Ordering::AcqRel);
                self.idle_notify.notify_one();
            }
            Err(e) => {
                // A dead browser is handled by the supervisor; anything
                // else just shrinks the pool until the next checkin.
                log::error!("Failed to start replacement session: {}", e);
            }
        }
    }

    fn stats(&self) -> PoolStats {
        PoolStats {
            idle: self.idle.lock().unwrap().len(),
            live: self.live.load(Ordering::Acquire),
            capacity: if self.config.on_demand {
                0
            } else {
                self.config.pool_size
            },
        }
    }
}

// ============================================================================
// SessionPool
// ============================================================================

/// A fixed-size pool of sessions over one supervised browser.
///
/// Construct with [`SessionPool::builder`]. See the module docs for the
/// lifecycle and the on-demand variant.
pub struct SessionPool {
    inner: Arc<PoolInner>,
    supervisor: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl SessionPool {
    /// Create a new builder for constructing a pool.
    pub fn builder() -> SessionPoolBuilder {
        SessionPoolBuilder {
            config: None,
            launcher: None,
        }
    }

    /// Check out a session, waiting up to `timeout` for one to free up.
    ///
    /// The returned [`SessionHandle`] checks the session back in when
    /// dropped, even across panics.
    ///
    /// # Errors
    ///
    /// - [`EngineError::PoolExhausted`] when nothing frees up in time
    /// - [`EngineError::ShuttingDown`] during shutdown
    /// - [`EngineError::SpawnFailed`] when an on-demand browser boot fails
    pub async fn checkout(&self, timeout: Duration) -> Result<SessionHandle> {
        if self.inner.is_shutting_down() {
            return Err(EngineError::ShuttingDown);
        }

        if self.inner.config.on_demand {
            return self.checkout_on_demand().await;
        }

        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if self.inner.is_shutting_down() {
                return Err(EngineError::ShuttingDown);
            }

            let session = self.inner.idle.lock().unwrap().pop();
            if let Some(session) = session {
                // A session can sour while idle (browser death marks every
                // worker defunct); skip it and let checkin retire it.
                if session.is_defunct() {
                    self.inner.checkin(session, None);
                    continue;
                }
                log::debug!("Checked out session {}", session.worker_id());
                return Ok(SessionHandle::new(session, Arc::clone(&self.inner), None));
            }

            if tokio::time::timeout_at(deadline, self.inner.idle_notify.notified())
                .await
                .is_err()
            {
                log::warn!("Checkout timed out after {:?}", timeout);
                return Err(EngineError::PoolExhausted);
            }
        }
    }

    /// Boot a dedicated browser and session for a single request.
    async fn checkout_on_demand(&self) -> Result<SessionHandle> {
        log::debug!("On-demand checkout: booting a browser");

        let transport = self.inner.launcher.launch()?;
        let connection = Connection::open(transport);

        match Session::start(&connection, &self.inner.config).await {
            Ok(session) => {
                self.inner.live.fetch_add(1, Ordering::AcqRel);
                Ok(SessionHandle::new(
                    session,
                    Arc::clone(&self.inner),
                    Some(connection),
                ))
            }
            Err(e) => {
                connection.close().await;
                Err(e)
            }
        }
    }

    /// Get a snapshot of pool statistics.
    pub fn stats(&self) -> PoolStats {
        self.inner.stats()
    }

    /// The configuration the pool was built with.
    pub fn config(&self) -> &SessionPoolConfig {
        self.inner.config()
    }

    /// Shut the pool down: retire all idle sessions and stop the browser.
    ///
    /// Checked-out sessions are retired as their handles drop. Safe to
    /// call more than once.
    pub async fn shutdown(&self) {
        if self.inner.shutting_down.swap(true, Ordering::AcqRel) {
            return;
        }

        log::info!("Shutting down session pool");
        self.inner.idle_notify.notify_waiters();

        if let Some(handle) = self.supervisor.lock().unwrap().take() {
            handle.abort();
        }

        self.inner.drain_tree().await;

        let stats = self.stats();
        log::info!(
            "Shutdown complete - idle: {}, live: {}",
            stats.idle,
            stats.live
        );
    }
}

impl Drop for SessionPool {
    /// Best-effort cleanup when the pool is dropped without an explicit
    /// shutdown. Browser subprocesses are additionally covered by
    /// kill-on-drop on the child handle.
    fn drop(&mut self) {
        if !self.inner.shutting_down.swap(true, Ordering::AcqRel) {
            log::warn!("SessionPool dropped without shutdown(), cleaning up");
            if let Some(handle) = self.supervisor.lock().unwrap().take() {
                handle.abort();
            }
            let inner = Arc::clone(&self.inner);
            self.inner.runtime.spawn(async move {
                inner.drain_tree().await;
            });
        }
    }
}

impl std::fmt::Debug for SessionPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let stats = self.stats();
        f.debug_struct("SessionPool")
            .field("idle", &stats.idle)
            .field("live", &stats.live)
            .field("capacity", &stats.capacity)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// SessionPoolBuilder
// ============================================================================

/// Builder for constructing a [`SessionPool`].
///
/// # Example
///
/// ```rust,ignore
/// let pool = SessionPool::builder()
///     .config(SessionPoolConfigBuilder::new().pool_size(4).build()?)
///     .build()
///     .await?;
/// ```
pub struct SessionPoolBuilder {
    config: Option<SessionPoolConfig>,
    launcher: Option<Box<dyn BrowserLauncher>>,
}

impl SessionPoolBuilder {
    /// Set the pool configuration (defaults to [`SessionPoolConfig::default`]).
    pub fn config(mut self, config: SessionPoolConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Override the browser launcher.
    ///
    /// Defaults to [`ChromeLauncher`]; tests substitute a launcher backed
    /// by mock pipes.
    pub fn launcher(mut self, launcher: Box<dyn BrowserLauncher>) -> Self {
        self.launcher = Some(launcher);
        self
    }

    /// Boot the browser (unless on-demand), bootstrap the sessions, and
    /// start supervision.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::SpawnFailed`] if the browser cannot start and
    /// any bootstrap error from session creation.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime context.
    pub async fn build(self) -> Result<SessionPool> {
        let config = self.config.unwrap_or_default();
        let launcher = self
            .launcher
            .unwrap_or_else(|| Box::new(ChromeLauncher::new(&config)));

        log::info!(
            "Building session pool (size {}, max uses {}, on_demand {})",
            config.pool_size,
            config.max_session_uses,
            config.on_demand
        );

        let inner = Arc::new(PoolInner {
            config,
            launcher,
            connection: RwLock::new(None),
            idle: Mutex::new(Vec::new()),
            idle_notify: Notify::new(),
            live: AtomicUsize::new(0),
            shutting_down: AtomicBool::new(false),
            runtime: tokio::runtime::Handle::current(),
        });

        let supervisor = if inner.config.on_demand {
            // Nothing resident to supervise; each checkout owns its browser.
            None
        } else {
            inner.open_tree().await?;
            Some(supervisor::spawn(Arc::clone(&inner)))
        };

        Ok(SessionPool {
            inner,
            supervisor: Mutex::new(supervisor),
        })
    }
}
