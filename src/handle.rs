//! RAII checkout token for pool sessions.
//!
//! [`SessionHandle`] wraps a checked-out session and returns it to the pool
//! when dropped. The RAII pattern guarantees the checkin happens even if
//! the caller returns early, errors out, or panics. The handle is a
//! capability, never ownership: the pool keeps the strong reference to the
//! session's resources.
//!
//! # Usage Pattern
//!
//! ```rust,ignore
//! let session = pool.checkout(Duration::from_secs(1)).await?;
//! let output = session.run(print_protocol(/* ... */)).await?;
//! // session checked back in when `session` goes out of scope
//! ```

use std::sync::Arc;

use crate::connection::Connection;
use crate::error::Result;
use crate::pool::PoolInner;
use crate::protocol::{Protocol, ProtocolOutput};
use crate::session::Session;

/// A checked-out session, returned to the pool on drop.
///
/// In on-demand mode the handle also owns the per-request browser
/// connection, which is stopped at checkin.
pub struct SessionHandle {
    /// `Option` so Drop can take the session without invalidating `self`.
    session: Option<Session>,

    /// The pool to check back into; outlives any original `SessionPool`
    /// borrow because it is the shared inner state.
    pool: Arc<PoolInner>,

    /// Present only in on-demand mode: this request's dedicated browser.
    on_demand_connection: Option<Arc<Connection>>,
}

impl SessionHandle {
    pub(crate) fn new(
        session: Session,
        pool: Arc<PoolInner>,
        on_demand_connection: Option<Arc<Connection>>,
    ) -> Self {
        Self {
            session: Some(session),
            pool,
            on_demand_connection,
        }
    }

    /// Run one protocol on the checked-out session.
    ///
    /// See [`Session::run`](crate::session::Session::run) for the error
    /// contract.
    pub async fn run(&self, protocol: Protocol) -> Result<ProtocolOutput> {
        self.session().run(protocol).await
    }

    /// The worker id of the checked-out session, for log correlation.
    pub fn worker_id(&self) -> u64 {
        self.session().worker_id()
    }

    /// The browser target id this session drives.
    pub fn target_id(&self) -> &str {
        self.session().target_id()
    }

    /// Counting-protocols completed by this session so far.
    pub fn uses(&self) -> u32 {
        self.session().uses()
    }

    fn session(&self) -> &Session {
        self.session
            .as_ref()
            .expect("session present until handle drops")
    }
}

impl Drop for SessionHandle {
    /// Check the session back in.
    ///
    /// The pool decides whether it goes back to the idle set or gets
    /// retired and replaced (use budget exhausted, fatal error, on-demand
    /// teardown, shutdown).
    fn drop(&mut self) {
        if let Some(session) = self.session.take() {
            log::trace!("SessionHandle for {} dropping", session.worker_id());
            self.pool.checkin(session, self.on_demand_connection.take());
        }
    }
}

impl std::fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.session {
            Some(session) => f
                .debug_struct("SessionHandle")
                .field("worker_id", &session.worker_id())
                .field("uses", &session.uses())
                .field("on_demand", &self.on_demand_connection.is_some())
                .finish(),
            None => f
                .debug_struct("SessionHandle")
                .field("state", &"returned")
                .finish(),
        }
    }
}
