//! Connection: one browser, one pipe, many sessions.
//!
//! The connection owns the framed transport of a single browser subprocess.
//! It assigns monotonically increasing call ids, serializes all outbound
//! writes through one writer task (the browser expects concatenated frames,
//! not interleaved bytes), and fans inbound messages out to the sessions
//! that subscribed for them:
//!
//! - a message with an `id` is a response and goes to the session that
//!   issued the call (call-id route, consumed on delivery),
//! - a message with a `sessionId` goes to the session bound to that
//!   DevTools session,
//! - a browser-scoped event (no `sessionId`) is broadcast to every bound
//!   session; unmatched copies are dropped by the protocol engine.
//!
//! The call-id counter and the routing tables are the only shared mutable
//! state in the engine; both live behind one mutex here. When the transport
//! closes, every subscribed session receives [`SessionEvent::ConnectionDied`]
//! and the `died` watch flips so the supervisor can rebuild the tree.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use serde_json::Value;
use tokio::sync::{mpsc, watch};

use crate::protocol::{CallId, CdpCall, Dispatch, InboundMessage};
use crate::transport::{BrowserProcess, Transport};

/// What a session finds in its mailbox.
#[derive(Debug)]
pub enum SessionEvent {
    /// An inbound DevTools message routed to this session.
    Message(InboundMessage),
    /// The browser exited; the current protocol cannot complete.
    ConnectionDied,
}

/// Sender half of a session's mailbox.
pub type SessionMailbox = mpsc::UnboundedSender<SessionEvent>;

enum OutboundFrame {
    Frame(Vec<u8>),
    Shutdown,
}

struct Route {
    tx: SessionMailbox,
    worker: u64,
}

#[derive(Default)]
struct Routes {
    by_call: HashMap<CallId, Route>,
    by_session: HashMap<String, Route>,
}

/// A live browser connection shared by the pool's sessions.
pub struct Connection {
    next_id: AtomicU64,
    routes: Mutex<Routes>,
    outbound: mpsc::UnboundedSender<OutboundFrame>,
    alive: AtomicBool,
    died_tx: watch::Sender<bool>,
    died_rx: watch::Receiver<bool>,
    process: Mutex<Option<BrowserProcess>>,
}

impl Connection {
    /// Take ownership of a transport and start the reader and writer tasks.
    pub fn open(transport: Transport) -> Arc<Self> {
        let (mut writer, mut reader, process) = transport.into_parts();
        let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<OutboundFrame>();
        let (died_tx, died_rx) = watch::channel(false);

        let connection = Arc::new(Self {
            // Call ids are positive and strictly increasing per connection.
            next_id: AtomicU64::new(1),
            routes: Mutex::new(Routes::default()),
            outbound: outbound_tx,
            alive: AtomicBool::new(true),
            died_tx,
            died_rx,
            process: Mutex::new(Some(process)),
        });

        // Writer task: the single owner of the browser's stdin.
        tokio::spawn(async move {
            while let Some(frame) = outbound_rx.recv().await {
                match frame {
                    OutboundFrame::Frame(bytes) => {
                        if let Err(e) = writer.send(&bytes).await {
                            log::warn!("Outbound write failed, stopping writer: {}", e);
                            break;
                        }
                    }
                    OutboundFrame::Shutdown => break,
                }
            }
            // Dropping the writer closes the browser's stdin.
        });

        // Reader task: the single owner of the browser's stdout.
        let reader_conn = Arc::clone(&connection);
        tokio::spawn(async move {
            while let Some(frame) = reader.recv().await {
                reader_conn.route_frame(&frame);
            }
            log::info!("Browser transport closed");
            reader_conn.fail_all();
        });

        connection
    }

    /// Hand out a dispatch handle for one session worker.
    ///
    /// Calls emitted through the handle are stamped with `session_id` (when
    /// present) and their responses are routed back to `mailbox`.
    pub fn dispatcher(
        self: &Arc<Self>,
        worker: u64,
        session_id: Option<String>,
        mailbox: SessionMailbox,
    ) -> Dispatcher {
        Dispatcher {
            connection: Arc::clone(self),
            worker,
            session_id,
            mailbox,
        }
    }

    /// Bind a DevTools session id to a worker's mailbox so events for that
    /// session reach it.
    pub fn bind_session(&self, session_id: String, worker: u64, mailbox: SessionMailbox) {
        let mut routes = self.routes.lock().unwrap();
        routes.by_session.insert(
            session_id,
            Route {
                tx: mailbox,
                worker,
            },
        );
    }

    /// Remove every route owned by a retiring worker.
    ///
    /// The reverse call-id association is a weak edge; scrubbing it here is
    /// what keeps retired sessions from leaking table entries.
    pub fn scrub(&self, worker: u64) {
        let mut routes = self.routes.lock().unwrap();
        routes.by_call.retain(|_, route| route.worker != worker);
        routes.by_session.retain(|_, route| route.worker != worker);
    }

    /// Whether the transport is still believed to be up.
    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    /// A watch that flips to `true` when the browser dies.
    pub fn died(&self) -> watch::Receiver<bool> {
        self.died_rx.clone()
    }

    /// Close the pipe and stop the subprocess.
    ///
    /// Closing stdin asks the browser to shut down; the process is killed
    /// if it lingers past the grace period.
    pub async fn close(&self) {
        self.alive.store(false, Ordering::Release);
        let _ = self.outbound.send(OutboundFrame::Shutdown);

        let process = self.process.lock().unwrap().take();
        if let Some(process) = process {
            process.stop().await;
        }
    }

    fn next_call_id(&self) -> CallId {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }

    fn send_call(&self, call: &CdpCall) {
        match serde_json::to_vec(call) {
            Ok(frame) => {
                if self.outbound.send(OutboundFrame::Frame(frame)).is_err() {
                    log::debug!(
                        "Dropping call {} ({}): writer already stopped",
                        call.id,
                        call.method
                    );
                }
            }
            Err(e) => log::error!("Failed to serialize call {}: {}", call.id, e),
        }
    }

    fn route_frame(&self, frame: &[u8]) {
        let message: InboundMessage = match serde_json::from_slice(frame) {
            Ok(message) => message,
            Err(e) => {
                log::warn!("Discarding unparseable frame ({} bytes): {}", frame.len(), e);
                return;
            }
        };

        match message {
            InboundMessage::Response(response) => {
                let call_id = response.id;
                let route = self.routes.lock().unwrap().by_call.remove(&call_id);
                match route {
                    Some(route) => {
                        let event = SessionEvent::Message(InboundMessage::Response(response));
                        if route.tx.send(event).is_err() {
                            log::trace!("Response {} for a mailbox that went away", call_id);
                        }
                    }
                    None => {
                        log::trace!("Response for unknown call id {}, discarding", call_id);
                    }
                }
            }
            InboundMessage::Event(event) => match event.session_id.clone() {
                Some(session_id) => {
                    let mut routes = self.routes.lock().unwrap();
                    let delivered = routes.by_session.get(&session_id).map(|route| {
                        route
                            .tx
                            .send(SessionEvent::Message(InboundMessage::Event(event.clone())))
                            .is_ok()
                    });
                    match delivered {
                        Some(true) => {}
                        Some(false) => {
                            // Lazily drop routes whose mailbox closed.
                            routes.by_session.remove(&session_id);
                        }
                        None => {
                            log::trace!(
                                "Event {} for unknown session {}, discarding",
                                event.method,
                                session_id
                            );
                        }
                    }
                }
                None => {
                    // Browser-scoped event: fan out to every bound session.
                    // Unmatched copies are dropped by the protocol engine.
                    let routes = self.routes.lock().unwrap();
                    for route in routes.by_session.values() {
                        let _ = route
                            .tx
                            .send(SessionEvent::Message(InboundMessage::Event(event.clone())));
                    }
                }
            },
        }
    }

    /// Notify every subscriber that the browser is gone and clear the
    /// routing tables.
    fn fail_all(&self) {
        self.alive.store(false, Ordering::Release);

        let mut routes = self.routes.lock().unwrap();
        for route in routes.by_call.values() {
            let _ = route.tx.send(SessionEvent::ConnectionDied);
        }
        for route in routes.by_session.values() {
            let _ = route.tx.send(SessionEvent::ConnectionDied);
        }
        routes.by_call.clear();
        routes.by_session.clear();
        drop(routes);

        let _ = self.died_tx.send(true);
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("alive", &self.is_alive())
            .field("next_id", &self.next_id.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

/// Synchronous outbound handle given to protocol `call` steps.
///
/// Dispatching hands the serialized frame to the connection's writer task
/// and registers the call id → mailbox route, so the step never suspends.
#[derive(Clone)]
pub struct Dispatcher {
    connection: Arc<Connection>,
    worker: u64,
    session_id: Option<String>,
    mailbox: SessionMailbox,
}

impl Dispatcher {
    fn dispatch_inner(
        &self,
        session_id: Option<&str>,
        method: &str,
        params: Option<Value>,
    ) -> CallId {
        // Id assignment, route registration, and handoff to the writer
        // happen under one lock so ids hit the wire in increasing order.
        let routes = &mut *self.connection.routes.lock().unwrap();

        let id = self.connection.next_call_id();
        routes.by_call.insert(
            id,
            Route {
                tx: self.mailbox.clone(),
                worker: self.worker,
            },
        );

        let call = CdpCall {
            id,
            session_id: session_id.map(str::to_string),
            method: method.to_string(),
            params,
        };

        log::trace!(
            "→ [{}] {} (session {})",
            id,
            method,
            call.session_id.as_deref().unwrap_or("-")
        );

        self.connection.send_call(&call);
        id
    }
}

impl Dispatch for Dispatcher {
    fn dispatch(&self, method: &str, params: Option<Value>) -> CallId {
        self.dispatch_inner(self.session_id.as_deref(), method, params)
    }

    fn dispatch_for(&self, session_id: &str, method: &str, params: Option<Value>) -> CallId {
        self.dispatch_inner(Some(session_id), method, params)
    }
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::Dispatch as _;
    use serde_json::json;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    /// Build a connection over duplex pipes; returns the connection plus
    /// the "browser" ends.
    fn open_mock() -> (
        Arc<Connection>,
        tokio::io::DuplexStream,
        tokio::io::DuplexStream,
    ) {
        let (browser_stdin, our_writer) = tokio::io::duplex(64 * 1024);
        let (browser_stdout, our_reader) = tokio::io::duplex(64 * 1024);

        let transport = Transport::from_pipes(our_writer, our_reader);
        (Connection::open(transport), browser_stdin, browser_stdout)
    }

    fn mailbox() -> (SessionMailbox, mpsc::UnboundedReceiver<SessionEvent>) {
        mpsc::unbounded_channel()
    }

    async fn read_frame(pipe: &mut tokio::io::DuplexStream) -> Value {
        let mut buf = Vec::new();
        loop {
            let mut byte = [0u8; 1];
            pipe.read_exact(&mut byte).await.unwrap();
            if byte[0] == 0x00 {
                break;
            }
            buf.push(byte[0]);
        }
        serde_json::from_slice(&buf).unwrap()
    }

    async fn write_frame(pipe: &mut tokio::io::DuplexStream, value: Value) {
        pipe.write_all(value.to_string().as_bytes()).await.unwrap();
        pipe.write_all(&[0x00]).await.unwrap();
        pipe.flush().await.unwrap();
    }

    /// Ids are strictly increasing, starting at 1, unique across
    /// dispatchers of the same connection.
    #[tokio::test]
    async fn test_call_ids_strictly_increasing() {
        let (connection, mut browser_stdin, _stdout) = open_mock();
        let (tx_a, _rx_a) = mailbox();
        let (tx_b, _rx_b) = mailbox();

        let dispatcher_a = connection.dispatcher(1, None, tx_a);
        let dispatcher_b = connection.dispatcher(2, Some("S2".to_string()), tx_b);

        let id1 = dispatcher_a.dispatch("Target.getTargets", None);
        let id2 = dispatcher_b.dispatch("Page.enable", None);
        let id3 = dispatcher_a.dispatch("Page.enable", None);

        assert_eq!(id1, 1);
        assert_eq!(id2, 2);
        assert_eq!(id3, 3);

        // Frames hit the wire in dispatch order with matching ids.
        assert_eq!(read_frame(&mut browser_stdin).await["id"], 1);
        let second = read_frame(&mut browser_stdin).await;
        assert_eq!(second["id"], 2);
        assert_eq!(second["sessionId"], "S2");
        assert_eq!(read_frame(&mut browser_stdin).await["id"], 3);
    }

    /// Responses are routed to the dispatching session; unknown ids are
    /// discarded without disturbing anyone.
    #[tokio::test]
    async fn test_response_routing() {
        let (connection, _stdin, mut browser_stdout) = open_mock();
        let (tx_a, mut rx_a) = mailbox();
        let (tx_b, mut rx_b) = mailbox();

        let dispatcher_a = connection.dispatcher(1, None, tx_a);
        let _dispatcher_b = connection.dispatcher(2, None, tx_b);

        let id = dispatcher_a.dispatch("Page.enable", None);

        write_frame(&mut browser_stdout, json!({"id": 999, "result": {}})).await;
        write_frame(&mut browser_stdout, json!({"id": id, "result": {"ok": true}})).await;

        match rx_a.recv().await.unwrap() {
            SessionEvent::Message(InboundMessage::Response(r)) => {
                assert_eq!(r.id, id);
                assert_eq!(r.result.unwrap()["ok"], true);
            }
            other => panic!("Expected response, got {other:?}"),
        }

        // The unknown-id reply went nowhere.
        assert!(rx_b.try_recv().is_err());
    }

    /// Session-scoped events reach only the bound session; browser-scoped
    /// events are broadcast.
    #[tokio::test]
    async fn test_event_routing_and_broadcast() {
        let (connection, _stdin, mut browser_stdout) = open_mock();
        let (tx_a, mut rx_a) = mailbox();
        let (tx_b, mut rx_b) = mailbox();

        connection.bind_session("SA".to_string(), 1, tx_a);
        connection.bind_session("SB".to_string(), 2, tx_b);

        write_frame(
            &mut browser_stdout,
            json!({"method": "Page.frameStoppedLoading", "params": {"frameId": "F"}, "sessionId": "SA"}),
        )
        .await;
        write_frame(
            &mut browser_stdout,
            json!({"method": "Target.targetCreated", "params": {}}),
        )
        .await;

        // SA gets its own event, then the broadcast.
        match rx_a.recv().await.unwrap() {
            SessionEvent::Message(InboundMessage::Event(e)) => {
                assert_eq!(e.method, "Page.frameStoppedLoading")
            }
            other => panic!("Expected event, got {other:?}"),
        }
        match rx_a.recv().await.unwrap() {
            SessionEvent::Message(InboundMessage::Event(e)) => {
                assert_eq!(e.method, "Target.targetCreated")
            }
            other => panic!("Expected broadcast, got {other:?}"),
        }

        // SB only sees the broadcast.
        match rx_b.recv().await.unwrap() {
            SessionEvent::Message(InboundMessage::Event(e)) => {
                assert_eq!(e.method, "Target.targetCreated")
            }
            other => panic!("Expected broadcast, got {other:?}"),
        }
    }

    /// Closing the browser side delivers ConnectionDied to every
    /// subscriber and flips the died watch.
    #[tokio::test]
    async fn test_connection_died() {
        let (connection, _stdin, browser_stdout) = open_mock();
        let (tx, mut rx) = mailbox();
        connection.bind_session("SA".to_string(), 1, tx);

        let mut died = connection.died();
        assert!(!*died.borrow());

        drop(browser_stdout);

        assert!(matches!(
            rx.recv().await.unwrap(),
            SessionEvent::ConnectionDied
        ));
        died.changed().await.unwrap();
        assert!(*died.borrow());
        assert!(!connection.is_alive());
    }

    /// Scrubbing a worker removes its routes; later replies for its calls
    /// are discarded.
    #[tokio::test]
    async fn test_scrub_removes_routes() {
        let (connection, _stdin, mut browser_stdout) = open_mock();
        let (tx, mut rx) = mailbox();

        let dispatcher = connection.dispatcher(7, None, tx.clone());
        let id = dispatcher.dispatch("Page.enable", None);
        connection.bind_session("S7".to_string(), 7, tx);

        connection.scrub(7);

        write_frame(&mut browser_stdout, json!({"id": id, "result": {}})).await;
        write_frame(
            &mut browser_stdout,
            json!({"method": "Page.loadEventFired", "params": {}, "sessionId": "S7"}),
        )
        .await;

        // Give the reader a beat, then confirm nothing was delivered.
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert!(rx.try_recv().is_err());
    }
}
