//! The per-request protocol state machine.
//!
//! A [`Protocol`] is a flat sequence of tagged steps — [`Step::Call`],
//! [`Step::Await`], [`Step::Output`] — plus a mutable state map. The engine
//! advances it in response to two stimuli: "drive forward" ([`Protocol::advance`])
//! and "a message arrived" ([`Protocol::handle_message`]). Steps are data,
//! not nested callbacks, which keeps the engine a pure function of
//! `(protocol, event)` and makes it trivially testable.
//!
//! # Advance algorithm
//!
//! Repeatedly inspect the head of the step list:
//!
//! 1. Empty: the protocol is done.
//! 2. `Call` head: execute it immediately (it emits zero or more DevTools
//!    calls through the [`Dispatch`] handle and updates state), continue.
//! 3. `Output` head: compute a result value from state, record it, continue.
//! 4. `Await` head: pause and return control to the session, which resumes
//!    the protocol when the next inbound message arrives.
//!
//! # Out-of-order matching
//!
//! The browser replies to outstanding calls and emits events from several
//! internal processes in an order that is not causal with respect to our
//! send order; strict FIFO matching would deadlock. When a message arrives,
//! the *maximal prefix* of consecutive `Await` steps is treated as an
//! unordered set: the message is tested against each await in order, the
//! first match is removed (the rest keep their relative order), and the
//! engine advances. A message matching none of the prefix is discarded. List
//! order only gives matchers deterministic priority when two could match
//! the same message.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{EngineError, Result};

pub mod print;

/// Call id assigned by the connection; unique and strictly increasing.
pub type CallId = u64;

// ============================================================================
// Wire messages
// ============================================================================

/// Outbound DevTools call: `{"id": N, "sessionId": S?, "method": M, "params": P?}`.
#[derive(Debug, Clone, Serialize)]
pub struct CdpCall {
    /// Call id, unique per connection.
    pub id: CallId,
    /// DevTools session the call is addressed to; browser-scoped when absent.
    #[serde(rename = "sessionId", skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    /// DevTools method, e.g. `Page.printToPDF`.
    pub method: String,
    /// Method parameters.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

/// Error payload inside a DevTools response.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CdpErrorPayload {
    /// JSON-RPC error code.
    pub code: i64,
    /// Human-readable message.
    pub message: String,
}

/// Reply to an outbound call, correlated by `id`.
#[derive(Debug, Clone, Deserialize)]
pub struct CdpResponse {
    /// The call id this response answers.
    pub id: CallId,
    /// Success payload (mutually exclusive with `error`).
    #[serde(default)]
    pub result: Option<Value>,
    /// Error payload (mutually exclusive with `result`).
    #[serde(default)]
    pub error: Option<CdpErrorPayload>,
    /// DevTools session the reply belongs to.
    #[serde(rename = "sessionId", default)]
    pub session_id: Option<String>,
}

/// Spontaneous DevTools event, distinguished from responses by the absence
/// of an `id` field.
#[derive(Debug, Clone, Deserialize)]
pub struct CdpEvent {
    /// Event method, e.g. `Page.frameStoppedLoading`.
    pub method: String,
    /// Event payload.
    #[serde(default)]
    pub params: Value,
    /// DevTools session the event belongs to; browser-scoped when absent.
    #[serde(rename = "sessionId", default)]
    pub session_id: Option<String>,
}

/// Discriminated union of inbound messages.
///
/// Serde's `untagged` picks [`CdpResponse`] when an `id` is present and
/// falls back to [`CdpEvent`] otherwise.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum InboundMessage {
    /// Reply to one of our calls.
    Response(CdpResponse),
    /// Browser-initiated event.
    Event(CdpEvent),
}

impl InboundMessage {
    /// The response payload, if this is a response.
    pub fn response(&self) -> Option<&CdpResponse> {
        match self {
            InboundMessage::Response(r) => Some(r),
            InboundMessage::Event(_) => None,
        }
    }

    /// The event payload, if this is an event.
    pub fn event(&self) -> Option<&CdpEvent> {
        match self {
            InboundMessage::Event(e) => Some(e),
            InboundMessage::Response(_) => None,
        }
    }

    /// The DevTools session id carried by the message, if any.
    pub fn session_id(&self) -> Option<&str> {
        match self {
            InboundMessage::Response(r) => r.session_id.as_deref(),
            InboundMessage::Event(e) => e.session_id.as_deref(),
        }
    }
}

// ============================================================================
// Dispatch handle
// ============================================================================

/// Outbound call sink handed to `Call` steps.
///
/// `Call` steps run to completion without suspending, so dispatching is
/// synchronous: the frame is handed to the connection's serialized writer
/// and the freshly assigned call id is returned for correlation.
pub trait Dispatch {
    /// Emit a call addressed to this protocol's DevTools session (or
    /// browser-scoped if the protocol has none yet).
    fn dispatch(&self, method: &str, params: Option<Value>) -> CallId;

    /// Emit a call addressed to an explicit DevTools session.
    ///
    /// Needed by bootstrap steps that configure a session they attached
    /// moments earlier.
    fn dispatch_for(&self, session_id: &str, method: &str, params: Option<Value>) -> CallId;
}

// ============================================================================
// Steps
// ============================================================================

/// Mutable per-protocol scratch space.
///
/// `Call` steps store call ids and cursor data here; matchers read and
/// extend it; `Output` steps compute the final value from it.
pub type ProtocolState = HashMap<String, Value>;

/// Verdict of testing one inbound message against one `Await` step.
pub enum MatchOutcome {
    /// The message is not for this await; try the next one in the prefix.
    NoMatch,
    /// The message satisfied this await (state may have been updated).
    Matched,
    /// The message was for this await but malformed or an error reply;
    /// the protocol terminates.
    Error(EngineError),
}

type CallFn = Box<dyn FnOnce(&mut ProtocolState, &dyn Dispatch) -> Result<()> + Send>;
type MatchFn = Box<dyn FnMut(&mut ProtocolState, &InboundMessage) -> MatchOutcome + Send>;
type OutputFn = Box<dyn FnOnce(&ProtocolState) -> Result<ProtocolOutput> + Send>;

/// One step of a protocol; the alphabet is `call`, `await`, `output`.
pub enum Step {
    /// Synchronously emit DevTools calls and update state.
    Call(CallFn),
    /// Pause until an inbound message satisfies the matcher.
    Await(MatchFn),
    /// Compute the value delivered to the caller.
    Output(OutputFn),
}

impl std::fmt::Debug for Step {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Step::Call(_) => f.write_str("Call"),
            Step::Await(_) => f.write_str("Await"),
            Step::Output(_) => f.write_str("Output"),
        }
    }
}

/// Value produced by an `Output` step.
#[derive(Debug, Clone, PartialEq)]
pub enum ProtocolOutput {
    /// Raw document bytes (the decoded PDF).
    Bytes(Vec<u8>),
    /// Structured data, e.g. the bootstrap result.
    Json(Value),
}

impl ProtocolOutput {
    /// The bytes payload, if this output carries bytes.
    pub fn into_bytes(self) -> Option<Vec<u8>> {
        match self {
            ProtocolOutput::Bytes(b) => Some(b),
            ProtocolOutput::Json(_) => None,
        }
    }

    /// The JSON payload, if this output carries structured data.
    pub fn as_json(&self) -> Option<&Value> {
        match self {
            ProtocolOutput::Json(v) => Some(v),
            ProtocolOutput::Bytes(_) => None,
        }
    }
}

/// Result of pushing a protocol forward.
#[derive(Debug)]
pub enum Advance {
    /// Paused at an `Await` head; feed it the next inbound message.
    Pending,
    /// All steps consumed; collect results via [`Protocol::take_outputs`].
    Done,
    /// A step failed; remaining steps were dropped.
    Failed(EngineError),
}

// ============================================================================
// Protocol
// ============================================================================

/// A client request's state machine driving the browser.
///
/// Constructed via [`Protocol::builder`]; driven by a session. Not to be
/// confused with the wire protocol itself.
pub struct Protocol {
    label: &'static str,
    steps: VecDeque<Step>,
    state: ProtocolState,
    outputs: Vec<ProtocolOutput>,
    counts_use: bool,
    timeout: Duration,
}

impl Protocol {
    /// Start building a protocol. The label shows up in logs only.
    pub fn builder(label: &'static str) -> ProtocolBuilder {
        ProtocolBuilder {
            label,
            steps: VecDeque::new(),
            counts_use: false,
            timeout: Duration::from_secs(5),
        }
    }

    /// Whether completion counts against the owning session's use budget.
    pub fn counts_use(&self) -> bool {
        self.counts_use
    }

    /// Wall-clock budget for this protocol.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Log label.
    pub fn label(&self) -> &'static str {
        self.label
    }

    /// Number of steps not yet consumed.
    pub fn steps_remaining(&self) -> usize {
        self.steps.len()
    }

    /// Drain the values produced by `Output` steps so far.
    pub fn take_outputs(&mut self) -> Vec<ProtocolOutput> {
        std::mem::take(&mut self.outputs)
    }

    /// Run `Call` and `Output` heads until the protocol pauses, finishes,
    /// or fails.
    pub fn advance(&mut self, dispatch: &dyn Dispatch) -> Advance {
        loop {
            match self.steps.pop_front() {
                None => return Advance::Done,
                Some(Step::Call(call)) => {
                    if let Err(e) = call(&mut self.state, dispatch) {
                        return self.fail(e);
                    }
                }
                Some(Step::Output(output)) => match output(&self.state) {
                    Ok(value) => self.outputs.push(value),
                    Err(e) => return self.fail(e),
                },
                Some(step @ Step::Await(_)) => {
                    self.steps.push_front(step);
                    return Advance::Pending;
                }
            }
        }
    }

    /// Feed one inbound message to the protocol.
    ///
    /// Tests the message against the maximal prefix of `Await` steps at the
    /// head of the step list. On the first match, that await is removed
    /// (the remainder keeps its order) and the engine advances. A message
    /// that matches nothing leaves the protocol unchanged.
    pub fn handle_message(
        &mut self,
        dispatch: &dyn Dispatch,
        msg: &InboundMessage,
    ) -> Advance {
        note_target_crashed(msg);

        let prefix = self
            .steps
            .iter()
            .take_while(|s| matches!(s, Step::Await(_)))
            .count();

        for index in 0..prefix {
            let Some(Step::Await(matcher)) = self.steps.get_mut(index) else {
                unreachable!("prefix contains only awaits");
            };

            match matcher(&mut self.state, msg) {
                MatchOutcome::NoMatch => continue,
                MatchOutcome::Matched => {
                    let _ = self.steps.remove(index);
                    return self.advance(dispatch);
                }
                MatchOutcome::Error(e) => return self.fail(e),
            }
        }

        log::trace!(
            "{}: message matched none of {} head awaits, discarding",
            self.label,
            prefix
        );
        Advance::Pending
    }

    fn fail(&mut self, error: EngineError) -> Advance {
        self.steps.clear();
        Advance::Failed(error)
    }
}

impl std::fmt::Debug for Protocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Protocol")
            .field("label", &self.label)
            .field("steps", &self.steps)
            .field("counts_use", &self.counts_use)
            .finish_non_exhaustive()
    }
}

/// Fluent constructor for [`Protocol`].
pub struct ProtocolBuilder {
    label: &'static str,
    steps: VecDeque<Step>,
    counts_use: bool,
    timeout: Duration,
}

impl ProtocolBuilder {
    /// Append a `call` step.
    pub fn call<F>(mut self, f: F) -> Self
    where
        F: FnOnce(&mut ProtocolState, &dyn Dispatch) -> Result<()> + Send + 'static,
    {
        self.steps.push_back(Step::Call(Box::new(f)));
        self
    }

    /// Append an `await` step with a custom matcher.
    pub fn await_match<F>(mut self, f: F) -> Self
    where
        F: FnMut(&mut ProtocolState, &InboundMessage) -> MatchOutcome + Send + 'static,
    {
        self.steps.push_back(Step::Await(Box::new(f)));
        self
    }

    /// Append an `await` step matching the response to the call whose id
    /// was stored under `tag` (see [`store_call_id`]).
    ///
    /// A JSON-RPC error reply terminates the protocol with
    /// [`EngineError::Rpc`]; a success reply stores its `result` under the
    /// same tag for later steps.
    pub fn await_response(self, tag: &'static str) -> Self {
        self.await_match(move |state, msg| {
            let Some(response) = msg.response() else {
                return MatchOutcome::NoMatch;
            };
            if call_id(state, tag) != Some(response.id) {
                return MatchOutcome::NoMatch;
            }
            if let Some(error) = &response.error {
                return MatchOutcome::Error(EngineError::Rpc {
                    code: error.code,
                    message: error.message.clone(),
                });
            }
            store_result(state, tag, response.result.clone().unwrap_or(Value::Null));
            MatchOutcome::Matched
        })
    }

    /// Append an `await` step matching an event by method name and an
    /// additional predicate over `(state, params)`.
    pub fn await_event<F>(self, method: &'static str, mut filter: F) -> Self
    where
        F: FnMut(&ProtocolState, &Value) -> bool + Send + 'static,
    {
        self.await_match(move |state, msg| {
            let Some(event) = msg.event() else {
                return MatchOutcome::NoMatch;
            };
            if event.method != method || !filter(state, &event.params) {
                return MatchOutcome::NoMatch;
            }
            MatchOutcome::Matched
        })
    }

    /// Append an `output` step.
    pub fn output<F>(mut self, f: F) -> Self
    where
        F: FnOnce(&ProtocolState) -> Result<ProtocolOutput> + Send + 'static,
    {
        self.steps.push_back(Step::Output(Box::new(f)));
        self
    }

    /// Mark whether completion counts against `max_session_uses`.
    pub fn counts_use(mut self, counts: bool) -> Self {
        self.counts_use = counts;
        self
    }

    /// Set the wall-clock budget.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Finish building.
    pub fn build(self) -> Protocol {
        Protocol {
            label: self.label,
            steps: self.steps,
            state: ProtocolState::new(),
            outputs: Vec::new(),
            counts_use: self.counts_use,
            timeout: self.timeout,
        }
    }
}

// ============================================================================
// State helpers
// ============================================================================

/// Record the call id a `call` step was assigned, keyed by tag.
pub fn store_call_id(state: &mut ProtocolState, tag: &str, id: CallId) {
    state.insert(format!("call:{tag}"), Value::from(id));
}

/// Look up a call id stored by [`store_call_id`].
pub fn call_id(state: &ProtocolState, tag: &str) -> Option<CallId> {
    state.get(&format!("call:{tag}")).and_then(Value::as_u64)
}

/// Record the result payload of a matched response, keyed by tag.
pub fn store_result(state: &mut ProtocolState, tag: &str, result: Value) {
    state.insert(format!("result:{tag}"), result);
}

/// Look up the result payload stored for a tag.
pub fn result_of<'a>(state: &'a ProtocolState, tag: &str) -> Option<&'a Value> {
    state.get(&format!("result:{tag}"))
}

/// Pull a string field out of a stored result, e.g. the `frameId` from a
/// `Page.navigate` reply.
pub fn result_str<'a>(state: &'a ProtocolState, tag: &str, field: &str) -> Option<&'a str> {
    result_of(state, tag)?.get(field)?.as_str()
}

/// `Inspector.targetCrashed` is logged loudly with operator-facing hints
/// but does not itself terminate the protocol; the ensuing timeout will.
fn note_target_crashed(msg: &InboundMessage) {
    if let Some(event) = msg.event() {
        if event.method == "Inspector.targetCrashed" {
            log::error!(
                "Browser target crashed. Common causes: insufficient shared memory \
                 (mount a larger /dev/shm or pass --disable-dev-shm-usage) or \
                 stylesheets linked from external origins that fail to load"
            );
        }
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
