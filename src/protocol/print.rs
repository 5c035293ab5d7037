//! Concrete protocols: session bootstrap, printing, and health checks.
//!
//! These are the step sequences actually shipped to the engine. The
//! canonical printing protocol is:
//!
//! ```text
//! [cookie preludes]
//! call  Page.enable
//! await response
//! call  Page.navigate(url)
//! await response (captures frameId)   ┐ unordered
//! await Page.frameStoppedLoading      ┘ await set
//! [wait-for evaluation]
//! call  Page.printToPDF(params)
//! await response (base64 data)
//! output decoded bytes
//! ```

use std::time::Duration;

use base64::engine::general_purpose::STANDARD as Base64Standard;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::EngineError;

use super::{result_of, result_str, store_call_id, Protocol, ProtocolOutput};

/// Options forwarded to `Page.printToPDF`.
///
/// All fields are optional; the browser applies its own defaults for
/// anything unset. Field names serialize in the camelCase form the
/// DevTools protocol expects.
///
/// # Example
///
/// ```rust
/// use html2pdf_engine::protocol::print::PrintToPdfParams;
///
/// let params = PrintToPdfParams {
///     landscape: Some(true),
///     print_background: Some(true),
///     ..Default::default()
/// };
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrintToPdfParams {
    /// Paper orientation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub landscape: Option<bool>,
    /// Display header and footer.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_header_footer: Option<bool>,
    /// Print background graphics.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub print_background: Option<bool>,
    /// Scale of the webpage rendering (1.0 = 100%).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scale: Option<f64>,
    /// Paper width in inches.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub paper_width: Option<f64>,
    /// Paper height in inches.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub paper_height: Option<f64>,
    /// Top margin in inches.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub margin_top: Option<f64>,
    /// Bottom margin in inches.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub margin_bottom: Option<f64>,
    /// Left margin in inches.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub margin_left: Option<f64>,
    /// Right margin in inches.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub margin_right: Option<f64>,
    /// Page ranges to print, e.g. `"1-5, 8"`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_ranges: Option<String>,
    /// HTML template for the print header.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub header_template: Option<String>,
    /// HTML template for the print footer.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub footer_template: Option<String>,
    /// Prefer CSS-defined page size over the paper_width/height values.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prefer_css_page_size: Option<bool>,
}

/// A cookie installed before navigation via `Network.setCookie`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cookie {
    /// Cookie name.
    pub name: String,
    /// Cookie value.
    pub value: String,
    /// Cookie domain.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    /// Cookie path.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

/// Build the canonical printing protocol for one document.
///
/// `wait_for`, when set, is a JavaScript expression evaluated (with promise
/// await) after the frame stops loading and before printing; pages use it
/// to signal that client-side rendering has finished.
///
/// The resulting protocol counts against the session's use budget.
pub fn print_protocol(
    url: String,
    pdf: PrintToPdfParams,
    cookies: Vec<Cookie>,
    wait_for: Option<String>,
    timeout: Duration,
) -> Protocol {
    let mut builder = Protocol::builder("print").counts_use(true).timeout(timeout);

    // Cookie preludes extend the head of the canonical sequence.
    for (index, cookie) in cookies.into_iter().enumerate() {
        let tag: &'static str = cookie_tag(index);
        builder = builder
            .call(move |state, d| {
                let params = serde_json::to_value(&cookie)
                    .map_err(|e| EngineError::Protocol(e.to_string()))?;
                store_call_id(state, tag, d.dispatch("Network.setCookie", Some(params)));
                Ok(())
            })
            .await_response(tag);
    }

    builder = builder
        .call(|state, d| {
            store_call_id(state, "page_enable", d.dispatch("Page.enable", None));
            Ok(())
        })
        .await_response("page_enable")
        .call(move |state, d| {
            let id = d.dispatch("Page.navigate", Some(json!({ "url": url })));
            store_call_id(state, "navigate", id);
            Ok(())
        })
        // The navigate reply and the frameStoppedLoading event form an
        // unordered await set; the event may overtake the reply, in which
        // case the frame id is not known yet and any frame is accepted.
        .await_response("navigate")
        .await_event("Page.frameStoppedLoading", |state, params| {
            match (result_str(state, "navigate", "frameId"), params.get("frameId")) {
                (Some(expected), Some(actual)) => actual.as_str() == Some(expected),
                _ => true,
            }
        });

    if let Some(expression) = wait_for {
        builder = builder
            .call(move |state, d| {
                let id = d.dispatch(
                    "Runtime.evaluate",
                    Some(json!({
                        "expression": expression,
                        "awaitPromise": true,
                        "returnByValue": true,
                    })),
                );
                store_call_id(state, "wait_for", id);
                Ok(())
            })
            .await_response("wait_for");
    }

    builder
        .call(move |state, d| {
            let params =
                serde_json::to_value(&pdf).map_err(|e| EngineError::Protocol(e.to_string()))?;
            store_call_id(state, "print", d.dispatch("Page.printToPDF", Some(params)));
            Ok(())
        })
        .await_response("print")
        .output(|state| {
            let data = result_str(state, "print", "data").ok_or_else(|| {
                EngineError::Protocol("printToPDF reply carried no data field".to_string())
            })?;
            let bytes = Base64Standard
                .decode(data)
                .map_err(|e| EngineError::Protocol(format!("invalid base64 payload: {}", e)))?;
            Ok(ProtocolOutput::Bytes(bytes))
        })
        .build()
}

/// Build the session bootstrap protocol.
///
/// Creates an isolated browser context, opens an `about:blank` target in
/// it, attaches with `flatten=true`, and applies the configured network
/// and security preludes to the fresh DevTools session. Outputs
/// `{browserContextId, targetId, sessionId}`. Does not count against the
/// use budget.
pub fn bootstrap_protocol(
    offline: bool,
    ignore_certificate_errors: bool,
    init_timeout: Duration,
) -> Protocol {
    let mut builder = Protocol::builder("bootstrap")
        .counts_use(false)
        .timeout(init_timeout)
        .call(|state, d| {
            let id = d.dispatch("Target.createBrowserContext", Some(json!({})));
            store_call_id(state, "create_context", id);
            Ok(())
        })
        .await_response("create_context")
        .call(|state, d| {
            let context_id = result_str(state, "create_context", "browserContextId")
                .ok_or_else(|| {
                    EngineError::Protocol("createBrowserContext reply missing id".to_string())
                })?
                .to_string();
            let id = d.dispatch(
                "Target.createTarget",
                Some(json!({ "url": "about:blank", "browserContextId": context_id })),
            );
            store_call_id(state, "create_target", id);
            Ok(())
        })
        .await_response("create_target")
        .call(|state, d| {
            let target_id = result_str(state, "create_target", "targetId")
                .ok_or_else(|| {
                    EngineError::Protocol("createTarget reply missing targetId".to_string())
                })?
                .to_string();
            let id = d.dispatch(
                "Target.attachToTarget",
                Some(json!({ "targetId": target_id, "flatten": true })),
            );
            store_call_id(state, "attach", id);
            Ok(())
        })
        .await_response("attach");

    if offline {
        builder = builder
            .call(|state, d| {
                let session_id = attached_session_id(state)?;
                let id = d.dispatch_for(
                    &session_id,
                    "Network.emulateNetworkConditions",
                    Some(json!({
                        "offline": true,
                        "latency": 0,
                        "downloadThroughput": 0,
                        "uploadThroughput": 0,
                    })),
                );
                store_call_id(state, "offline", id);
                Ok(())
            })
            .await_response("offline");
    }

    if ignore_certificate_errors {
        builder = builder
            .call(|state, d| {
                let session_id = attached_session_id(state)?;
                let id = d.dispatch_for(
                    &session_id,
                    "Security.setIgnoreCertificateErrors",
                    Some(json!({ "ignore": true })),
                );
                store_call_id(state, "ignore_certs", id);
                Ok(())
            })
            .await_response("ignore_certs");
    }

    builder
        .output(|state| {
            let context_id = result_str(state, "create_context", "browserContextId")
                .unwrap_or_default();
            let target_id = result_str(state, "create_target", "targetId").unwrap_or_default();
            let session_id = result_str(state, "attach", "sessionId").ok_or_else(|| {
                EngineError::Protocol("attachToTarget reply missing sessionId".to_string())
            })?;
            Ok(ProtocolOutput::Json(json!({
                "browserContextId": context_id,
                "targetId": target_id,
                "sessionId": session_id,
            })))
        })
        .build()
}

/// Build a trivial round-trip protocol.
///
/// Evaluates a constant expression on the target and succeeds when the
/// reply arrives. Does not count against the use budget.
pub fn ping_protocol(timeout: Duration) -> Protocol {
    Protocol::builder("ping")
        .counts_use(false)
        .timeout(timeout)
        .call(|state, d| {
            let id = d.dispatch(
                "Runtime.evaluate",
                Some(json!({ "expression": "1 + 1", "returnByValue": true })),
            );
            store_call_id(state, "eval", id);
            Ok(())
        })
        .await_response("eval")
        .output(|state| {
            Ok(ProtocolOutput::Json(
                result_of(state, "eval").cloned().unwrap_or(Value::Null),
            ))
        })
        .build()
}

fn attached_session_id(state: &super::ProtocolState) -> crate::Result<String> {
    result_str(state, "attach", "sessionId")
        .map(str::to_string)
        .ok_or_else(|| EngineError::Protocol("attachToTarget reply missing sessionId".to_string()))
}

/// Static tags for cookie prelude steps. Protocol tags are `&'static str`;
/// a handful of slots is plenty for real-world cookie counts.
fn cookie_tag(index: usize) -> &'static str {
    const TAGS: [&str; 8] = [
        "cookie0", "cookie1", "cookie2", "cookie3", "cookie4", "cookie5", "cookie6", "cookie7",
    ];
    TAGS[index % TAGS.len()]
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::super::tests::RecordingDispatch;
    use super::super::{Advance, CdpEvent, CdpResponse, InboundMessage};
    use super::*;
    use base64::Engine as _;
    use serde_json::json;

    fn response(id: u64, result: Value) -> InboundMessage {
        InboundMessage::Response(CdpResponse {
            id,
            result: Some(result),
            error: None,
            session_id: None,
        })
    }

    fn event(method: &str, params: Value) -> InboundMessage {
        InboundMessage::Event(CdpEvent {
            method: method.to_string(),
            params,
            session_id: None,
        })
    }

    /// Drives the happy printing path with the frame event overtaking the
    /// navigate reply (scenario: out-of-order browser).
    #[test]
    fn test_print_protocol_scrambled_order() {
        let dispatch = RecordingDispatch::new();
        let pdf_base64 = Base64Standard.encode(b"%PDF-1.7 fake");

        let mut protocol = print_protocol(
            "about:blank".to_string(),
            PrintToPdfParams::default(),
            Vec::new(),
            None,
            Duration::from_secs(5),
        );

        // call Page.enable, pause.
        assert!(matches!(protocol.advance(dispatch.as_ref()), Advance::Pending));
        assert!(matches!(
            protocol.handle_message(dispatch.as_ref(), &response(1, json!({}))),
            Advance::Pending
        ));

        // Now paused on the {navigate reply, frameStoppedLoading} set.
        // Deliver the event first, then the reply.
        assert!(matches!(
            protocol.handle_message(
                dispatch.as_ref(),
                &event("Page.frameStoppedLoading", json!({"frameId": "F1"}))
            ),
            Advance::Pending
        ));
        assert!(matches!(
            protocol.handle_message(dispatch.as_ref(), &response(2, json!({"frameId": "F1"}))),
            Advance::Pending
        ));

        // printToPDF reply completes the protocol.
        let adv = protocol.handle_message(
            dispatch.as_ref(),
            &response(3, json!({ "data": pdf_base64 })),
        );
        assert!(matches!(adv, Advance::Done));

        let outputs = protocol.take_outputs();
        assert_eq!(outputs.len(), 1);
        assert_eq!(
            outputs.into_iter().next().unwrap().into_bytes().unwrap(),
            b"%PDF-1.7 fake"
        );

        assert_eq!(
            dispatch.call_methods(),
            vec!["Page.enable", "Page.navigate", "Page.printToPDF"]
        );
    }

    /// A frameStoppedLoading for a different frame does not match once the
    /// frame id is known.
    #[test]
    fn test_print_protocol_foreign_frame_ignored() {
        let dispatch = RecordingDispatch::new();
        let mut protocol = print_protocol(
            "about:blank".to_string(),
            PrintToPdfParams::default(),
            Vec::new(),
            None,
            Duration::from_secs(5),
        );

        protocol.advance(dispatch.as_ref());
        protocol.handle_message(dispatch.as_ref(), &response(1, json!({})));
        protocol.handle_message(dispatch.as_ref(), &response(2, json!({"frameId": "F1"})));

        let before = protocol.steps_remaining();
        let adv = protocol.handle_message(
            dispatch.as_ref(),
            &event("Page.frameStoppedLoading", json!({"frameId": "OTHER"})),
        );
        assert!(matches!(adv, Advance::Pending));
        assert_eq!(protocol.steps_remaining(), before);
    }

    /// Cookie and wait-for preludes appear in the dispatched call order.
    #[test]
    fn test_print_protocol_preludes() {
        let dispatch = RecordingDispatch::new();
        let mut protocol = print_protocol(
            "https://example.com/".to_string(),
            PrintToPdfParams::default(),
            vec![Cookie {
                name: "auth".to_string(),
                value: "token".to_string(),
                domain: Some("example.com".to_string()),
                path: None,
            }],
            Some("window.renderDone".to_string()),
            Duration::from_secs(5),
        );

        protocol.advance(dispatch.as_ref());
        protocol.handle_message(dispatch.as_ref(), &response(1, json!({})));
        protocol.handle_message(dispatch.as_ref(), &response(2, json!({})));
        protocol.handle_message(dispatch.as_ref(), &response(3, json!({"frameId": "F"})));
        protocol.handle_message(
            dispatch.as_ref(),
            &event("Page.frameStoppedLoading", json!({"frameId": "F"})),
        );
        protocol.handle_message(dispatch.as_ref(), &response(4, json!({"result": {}})));

        assert_eq!(
            dispatch.call_methods(),
            vec![
                "Network.setCookie",
                "Page.enable",
                "Page.navigate",
                "Runtime.evaluate",
                "Page.printToPDF"
            ]
        );
    }

    /// Bootstrap drives context → target → attach and outputs the triple.
    #[test]
    fn test_bootstrap_protocol() {
        let dispatch = RecordingDispatch::new();
        let mut protocol = bootstrap_protocol(false, false, Duration::from_secs(5));

        protocol.advance(dispatch.as_ref());
        protocol.handle_message(
            dispatch.as_ref(),
            &response(1, json!({"browserContextId": "CTX"})),
        );
        protocol.handle_message(dispatch.as_ref(), &response(2, json!({"targetId": "TGT"})));
        let adv =
            protocol.handle_message(dispatch.as_ref(), &response(3, json!({"sessionId": "SES"})));
        assert!(matches!(adv, Advance::Done));

        let outputs = protocol.take_outputs();
        let value = outputs[0].as_json().unwrap();
        assert_eq!(value["browserContextId"], "CTX");
        assert_eq!(value["targetId"], "TGT");
        assert_eq!(value["sessionId"], "SES");

        assert_eq!(
            dispatch.call_methods(),
            vec![
                "Target.createBrowserContext",
                "Target.createTarget",
                "Target.attachToTarget"
            ]
        );
    }

    /// The offline and certificate preludes are addressed to the freshly
    /// attached DevTools session.
    #[test]
    fn test_bootstrap_protocol_preludes_use_session() {
        let dispatch = RecordingDispatch::new();
        let mut protocol = bootstrap_protocol(true, true, Duration::from_secs(5));

        protocol.advance(dispatch.as_ref());
        protocol.handle_message(
            dispatch.as_ref(),
            &response(1, json!({"browserContextId": "CTX"})),
        );
        protocol.handle_message(dispatch.as_ref(), &response(2, json!({"targetId": "TGT"})));
        protocol.handle_message(dispatch.as_ref(), &response(3, json!({"sessionId": "SES"})));
        protocol.handle_message(dispatch.as_ref(), &response(4, json!({})));
        let adv = protocol.handle_message(dispatch.as_ref(), &response(5, json!({})));
        assert!(matches!(adv, Advance::Done));

        let calls = dispatch.calls.lock().unwrap();
        let offline = calls
            .iter()
            .find(|(_, m, _)| m == "Network.emulateNetworkConditions")
            .expect("offline prelude dispatched");
        assert_eq!(offline.0.as_deref(), Some("SES"));
        assert_eq!(offline.2.as_ref().unwrap()["offline"], true);

        let certs = calls
            .iter()
            .find(|(_, m, _)| m == "Security.setIgnoreCertificateErrors")
            .expect("certificate prelude dispatched");
        assert_eq!(certs.0.as_deref(), Some("SES"));
    }

    /// A bad base64 payload fails the protocol instead of returning junk.
    #[test]
    fn test_print_protocol_bad_base64() {
        let dispatch = RecordingDispatch::new();
        let mut protocol = print_protocol(
            "about:blank".to_string(),
            PrintToPdfParams::default(),
            Vec::new(),
            None,
            Duration::from_secs(5),
        );

        protocol.advance(dispatch.as_ref());
        protocol.handle_message(dispatch.as_ref(), &response(1, json!({})));
        protocol.handle_message(dispatch.as_ref(), &response(2, json!({"frameId": "F"})));
        protocol.handle_message(
            dispatch.as_ref(),
            &event("Page.frameStoppedLoading", json!({"frameId": "F"})),
        );
        let adv = protocol.handle_message(
            dispatch.as_ref(),
            &response(3, json!({"data": "!!! not base64 !!!"})),
        );
        assert!(matches!(
            adv,
            Advance::Failed(crate::EngineError::Protocol(_))
        ));
    }

    /// PrintToPdfParams serializes to the camelCase fields the browser
    /// expects and omits unset options.
    #[test]
    fn test_print_params_serialization() {
        let params = PrintToPdfParams {
            landscape: Some(true),
            print_background: Some(false),
            paper_width: Some(8.27),
            ..Default::default()
        };

        let value = serde_json::to_value(&params).unwrap();
        assert_eq!(value["landscape"], true);
        assert_eq!(value["printBackground"], false);
        assert_eq!(value["paperWidth"], 8.27);
        assert!(value.get("marginTop").is_none());
        assert!(value.get("headerTemplate").is_none());
    }
}
