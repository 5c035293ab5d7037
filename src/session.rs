//! Session: a worker bound to one browser target.
//!
//! Each session is an independent actor owning a mailbox of inbound
//! messages and protocol requests; concurrency across sessions is the only
//! concurrency in the engine. A session runs exactly one protocol at a
//! time to completion, counts the protocols that opt into counting, and
//! marks itself for recycling once the configured use budget is exhausted.
//!
//! # State machine
//!
//! ```text
//! idle ──run──▶ busy ──protocol-finished──▶ idle
//! busy ──inbound──▶ busy
//! idle/busy ──use-count==max & idle──▶ retired (terminal)
//! any ──connection-died──▶ retired (terminal)
//! ```

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

use serde_json::json;
use tokio::sync::{mpsc, oneshot};

use crate::config::SessionPoolConfig;
use crate::connection::{Connection, Dispatcher, SessionEvent};
use crate::error::{EngineError, Result};
use crate::protocol::print::bootstrap_protocol;
use crate::protocol::{Advance, Dispatch as _, Protocol, ProtocolOutput};

/// Worker ids, for log correlation and route scrubbing.
static NEXT_WORKER_ID: AtomicU64 = AtomicU64::new(1);

struct RunRequest {
    protocol: Protocol,
    result_tx: oneshot::Sender<Result<ProtocolOutput>>,
}

/// Flags shared between the session handle and its actor task.
struct SessionShared {
    busy: AtomicBool,
    uses: AtomicU32,
    /// Fatal error observed: protocol error, timeout, or browser death.
    defunct: AtomicBool,
    /// Use budget exhausted; destroy and replace on checkin.
    recycle: AtomicBool,
}

/// A pool worker owning one browser target.
///
/// Created by the pool, handed to callers through a checkout token. The
/// pool holds the strong reference; a checkout is a capability, never
/// ownership.
pub struct Session {
    worker_id: u64,
    target_id: String,
    session_id: String,
    browser_context_id: String,
    connection: Arc<Connection>,
    cmd_tx: mpsc::Sender<RunRequest>,
    shared: Arc<SessionShared>,
}

impl Session {
    /// Bootstrap a fresh session on `connection`.
    ///
    /// Creates an isolated browser context and target, attaches to it, and
    /// spawns the actor task. Bounded by `config.init_timeout`.
    pub async fn start(
        connection: &Arc<Connection>,
        config: &SessionPoolConfig,
    ) -> Result<Session> {
        let worker_id = NEXT_WORKER_ID.fetch_add(1, Ordering::SeqCst);
        let (mailbox_tx, mut mailbox_rx) = mpsc::unbounded_channel();

        log::debug!("Session {}: bootstrapping", worker_id);

        // The bootstrap runs through the same engine as every other
        // protocol, just with a browser-scoped dispatcher.
        let bootstrap_dispatcher = connection.dispatcher(worker_id, None, mailbox_tx.clone());
        let mut bootstrap = bootstrap_protocol(
            config.offline,
            config.ignore_certificate_errors,
            config.init_timeout,
        );

        let output = drive_protocol(&mut bootstrap, &bootstrap_dispatcher, &mut mailbox_rx)
            .await
            .map_err(|e| {
                connection.scrub(worker_id);
                e
            })?;

        let ids = output.as_json().cloned().unwrap_or(json!({}));
        let session_id = required_str(&ids, "sessionId")?;
        let target_id = required_str(&ids, "targetId")?;
        let browser_context_id = required_str(&ids, "browserContextId")?;

        connection.bind_session(session_id.clone(), worker_id, mailbox_tx.clone());

        log::info!(
            "Session {}: attached to target {} (devtools session {})",
            worker_id,
            target_id,
            session_id
        );

        let shared = Arc::new(SessionShared {
            busy: AtomicBool::new(false),
            uses: AtomicU32::new(0),
            defunct: AtomicBool::new(false),
            recycle: AtomicBool::new(false),
        });

        let (cmd_tx, cmd_rx) = mpsc::channel(1);
        let dispatcher = connection.dispatcher(worker_id, Some(session_id.clone()), mailbox_tx);

        tokio::spawn(actor_loop(
            worker_id,
            dispatcher,
            mailbox_rx,
            cmd_rx,
            Arc::clone(&shared),
            config.max_session_uses,
        ));

        Ok(Session {
            worker_id,
            target_id,
            session_id,
            browser_context_id,
            connection: Arc::clone(connection),
            cmd_tx,
            shared,
        })
    }

    /// Run one protocol to completion.
    ///
    /// # Errors
    ///
    /// - [`EngineError::Busy`] if a protocol is already running
    /// - [`EngineError::Timeout`] if the protocol's wall-clock budget elapses
    /// - [`EngineError::BrowserDied`] if the browser exits mid-flight
    /// - [`EngineError::Rpc`] / [`EngineError::Protocol`] on protocol failure
    pub async fn run(&self, protocol: Protocol) -> Result<ProtocolOutput> {
        if self.shared.defunct.load(Ordering::Acquire) {
            return Err(EngineError::BrowserDied);
        }

        if self
            .shared
            .busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(EngineError::Busy);
        }

        let (result_tx, result_rx) = oneshot::channel();
        let request = RunRequest {
            protocol,
            result_tx,
        };

        if self.cmd_tx.send(request).await.is_err() {
            self.shared.busy.store(false, Ordering::Release);
            return Err(EngineError::BrowserDied);
        }

        // The actor dropping the sender without replying means it died
        // mid-protocol; the caller still gets exactly one result.
        result_rx.await.unwrap_or(Err(EngineError::BrowserDied))
    }

    /// Worker id, unique across the process lifetime.
    pub fn worker_id(&self) -> u64 {
        self.worker_id
    }

    /// The connection this session was bootstrapped on. The pool compares
    /// it against the current connection to tell stale workers (from a
    /// crashed browser) apart from current ones.
    pub(crate) fn connection(&self) -> &Arc<Connection> {
        &self.connection
    }

    /// The browser target this session owns.
    pub fn target_id(&self) -> &str {
        &self.target_id
    }

    /// The attached DevTools session id (not this worker).
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Completed counting-protocols so far.
    pub fn uses(&self) -> u32 {
        self.shared.uses.load(Ordering::Acquire)
    }

    /// Whether the session hit a fatal error.
    pub fn is_defunct(&self) -> bool {
        self.shared.defunct.load(Ordering::Acquire)
    }

    /// Whether the pool must destroy and replace this session on checkin.
    pub fn needs_replacement(&self) -> bool {
        self.is_defunct() || self.shared.recycle.load(Ordering::Acquire)
    }

    /// Tear the session down: dispose the browser-side target and context
    /// (fire-and-forget) and scrub the connection routes.
    pub fn retire(self) {
        log::info!(
            "Session {}: retiring after {} uses",
            self.worker_id,
            self.uses()
        );

        if self.connection.is_alive() {
            // Replies route to a mailbox nobody reads; that is fine.
            let (sink, _) = mpsc::unbounded_channel();
            let dispatcher = self.connection.dispatcher(self.worker_id, None, sink);
            dispatcher.dispatch(
                "Target.closeTarget",
                Some(json!({ "targetId": self.target_id })),
            );
            dispatcher.dispatch(
                "Target.disposeBrowserContext",
                Some(json!({ "browserContextId": self.browser_context_id })),
            );
        }

        self.connection.scrub(self.worker_id);
        // Dropping self closes cmd_tx, which ends the actor loop.
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("worker_id", &self.worker_id)
            .field("target_id", &self.target_id)
            .field("uses", &self.uses())
            .field("defunct", &self.is_defunct())
            .finish_non_exhaustive()
    }
}

/// The actor: suspends on "new protocol to run" or "inbound message".
async fn actor_loop(
    worker_id: u64,
    dispatcher: Dispatcher,
    mut mailbox_rx: mpsc::UnboundedReceiver<SessionEvent>,
    mut cmd_rx: mpsc::Receiver<RunRequest>,
    shared: Arc<SessionShared>,
    max_uses: u32,
) {
    loop {
        tokio::select! {
            request = cmd_rx.recv() => {
                let Some(RunRequest { mut protocol, result_tx }) = request else {
                    log::debug!("Session {}: handle dropped, actor exiting", worker_id);
                    break;
                };

                let label = protocol.label();
                let counts = protocol.counts_use();
                log::debug!("Session {}: running {} protocol", worker_id, label);

                let outcome =
                    drive_protocol(&mut protocol, &dispatcher, &mut mailbox_rx).await;

                match &outcome {
                    Ok(_) => {
                        if counts {
                            let uses = shared.uses.fetch_add(1, Ordering::AcqRel) + 1;
                            if uses >= max_uses {
                                log::info!(
                                    "Session {}: use budget exhausted ({}/{})",
                                    worker_id,
                                    uses,
                                    max_uses
                                );
                                shared.recycle.store(true, Ordering::Release);
                            }
                        }
                    }
                    Err(e) => {
                        // The in-flight browser state is unrecoverable;
                        // the pool will replace this worker.
                        log::warn!("Session {}: {} protocol failed: {}", worker_id, label, e);
                        shared.defunct.store(true, Ordering::Release);
                    }
                }

                // Clear busy before the caller can observe the result, so a
                // prompt checkin/checkout cannot find a stale busy flag.
                shared.busy.store(false, Ordering::Release);
                let _ = result_tx.send(outcome);

                if shared.defunct.load(Ordering::Acquire) {
                    break;
                }
            }
            event = mailbox_rx.recv() => {
                match event {
                    Some(SessionEvent::Message(msg)) => {
                        // Idle sessions drop stray messages (late replies,
                        // broadcast events).
                        log::trace!(
                            "Session {}: dropping message while idle: {:?}",
                            worker_id,
                            msg.session_id()
                        );
                    }
                    Some(SessionEvent::ConnectionDied) | None => {
                        log::warn!("Session {}: connection died while idle", worker_id);
                        shared.defunct.store(true, Ordering::Release);
                        break;
                    }
                }
            }
        }
    }
}

/// Drive one protocol to its terminal state, enforcing its wall-clock
/// budget. Guarantees exactly one result.
async fn drive_protocol(
    protocol: &mut Protocol,
    dispatcher: &Dispatcher,
    mailbox_rx: &mut mpsc::UnboundedReceiver<SessionEvent>,
) -> Result<ProtocolOutput> {
    let deadline = tokio::time::Instant::now() + protocol.timeout();
    let mut advance = protocol.advance(dispatcher);

    loop {
        match advance {
            Advance::Done => {
                let mut outputs = protocol.take_outputs();
                if outputs.len() > 1 {
                    log::debug!(
                        "{}: {} outputs produced, delivering the first",
                        protocol.label(),
                        outputs.len()
                    );
                }
                return Ok(if outputs.is_empty() {
                    ProtocolOutput::Json(serde_json::Value::Null)
                } else {
                    outputs.swap_remove(0)
                });
            }
            Advance::Failed(error) => return Err(error),
            Advance::Pending => {
                match tokio::time::timeout_at(deadline, mailbox_rx.recv()).await {
                    Err(_) => {
                        log::warn!(
                            "{}: timed out after {:?}",
                            protocol.label(),
                            protocol.timeout()
                        );
                        return Err(EngineError::Timeout);
                    }
                    Ok(None) | Ok(Some(SessionEvent::ConnectionDied)) => {
                        return Err(EngineError::BrowserDied);
                    }
                    Ok(Some(SessionEvent::Message(msg))) => {
                        advance = protocol.handle_message(dispatcher, &msg);
                    }
                }
            }
        }
    }
}

fn required_str(value: &serde_json::Value, field: &str) -> Result<String> {
    value
        .get(field)
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .ok_or_else(|| EngineError::Protocol(format!("bootstrap output missing {field}")))
}

// ============================================================================
// Unit Tests
// ============================================================================
