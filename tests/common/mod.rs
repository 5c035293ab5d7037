//! Shared test harness: a scripted DevTools peer over duplex pipes.
//!
//! `MockBrowser` speaks just enough of the DevTools protocol for the
//! engine's bootstrap and printing protocols, over the same null-byte
//! framing a real browser would use. Knobs let tests scramble reply
//! ordering, crash the "browser" mid-print, or kill every live pipe.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use serde_json::{json, Value};
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};
use tokio::sync::watch;

use html2pdf_engine::launcher::BrowserLauncher;
use html2pdf_engine::transport::Transport;
use html2pdf_engine::Result;

/// The document every successful print returns, pre-encoding.
pub const MOCK_PDF: &[u8] = b"%PDF-1.4\n%mock document\n";

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Scripted browser shared across every pipe the launcher hands out.
pub struct MockBrowser {
    /// Emit `Page.frameStoppedLoading` before the `Page.navigate` reply.
    scrambled_navigate: AtomicBool,
    /// Crash (targetCrashed + pipe close) on the next `Page.printToPDF`.
    crash_on_print: AtomicBool,
    launches: AtomicUsize,
    target_seq: AtomicU64,
    targets_created: Mutex<Vec<String>>,
    kill_switches: Mutex<Vec<watch::Sender<bool>>>,
    /// Calls observed with an id not strictly greater than the previous
    /// one on the same pipe.
    id_order_violations: AtomicUsize,
}

impl MockBrowser {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            scrambled_navigate: AtomicBool::new(false),
            crash_on_print: AtomicBool::new(false),
            launches: AtomicUsize::new(0),
            target_seq: AtomicU64::new(0),
            targets_created: Mutex::new(Vec::new()),
            kill_switches: Mutex::new(Vec::new()),
            id_order_violations: AtomicUsize::new(0),
        })
    }

    /// Deliver the frame-stopped event ahead of the navigate reply.
    pub fn scramble_navigate(self: &Arc<Self>) -> Arc<Self> {
        self.scrambled_navigate.store(true, Ordering::SeqCst);
        Arc::clone(self)
    }

    /// Arm a one-shot crash on the next print call.
    pub fn arm_crash_on_print(&self) {
        self.crash_on_print.store(true, Ordering::SeqCst);
    }

    /// How many browsers the launcher has "booted".
    pub fn launches(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }

    /// Every target id ever created, across restarts.
    pub fn targets_created(&self) -> Vec<String> {
        self.targets_created.lock().unwrap().clone()
    }

    /// Calls whose id was not strictly greater than its predecessor on
    /// the same pipe. Should always be zero.
    pub fn id_order_violations(&self) -> usize {
        self.id_order_violations.load(Ordering::SeqCst)
    }

    /// Drop every live pipe, simulating a browser crash.
    pub fn kill_all(&self) {
        for switch in self.kill_switches.lock().unwrap().iter() {
            let _ = switch.send(true);
        }
    }

    /// A launcher that boots scripted browsers from this hub.
    pub fn launcher(self: &Arc<Self>) -> Box<dyn BrowserLauncher> {
        Box::new(PipeLauncher {
            hub: Arc::clone(self),
        })
    }
}

struct PipeLauncher {
    hub: Arc<MockBrowser>,
}

impl BrowserLauncher for PipeLauncher {
    fn launch(&self) -> Result<Transport> {
        let (browser_stdin, engine_writer) = tokio::io::duplex(256 * 1024);
        let (browser_stdout, engine_reader) = tokio::io::duplex(256 * 1024);

        let (kill_tx, kill_rx) = watch::channel(false);
        self.hub.kill_switches.lock().unwrap().push(kill_tx);
        self.hub.launches.fetch_add(1, Ordering::SeqCst);

        let hub = Arc::clone(&self.hub);
        tokio::spawn(browser_loop(hub, browser_stdin, browser_stdout, kill_rx));

        Ok(Transport::from_pipes(engine_writer, engine_reader))
    }
}

async fn read_frame(pipe: &mut DuplexStream) -> Option<Value> {
    let mut buf = Vec::new();
    let mut byte = [0u8; 1];
    loop {
        if pipe.read_exact(&mut byte).await.is_err() {
            return None;
        }
        if byte[0] == 0x00 {
            return serde_json::from_slice(&buf).ok();
        }
        buf.push(byte[0]);
    }
}

async fn write_frame(pipe: &mut DuplexStream, value: Value) -> bool {
    pipe.write_all(value.to_string().as_bytes()).await.is_ok()
        && pipe.write_all(&[0x00]).await.is_ok()
        && pipe.flush().await.is_ok()
}

async fn browser_loop(
    hub: Arc<MockBrowser>,
    mut stdin: DuplexStream,
    mut stdout: DuplexStream,
    mut kill_rx: watch::Receiver<bool>,
) {
    let mut last_id = 0u64;
    loop {
        let call = tokio::select! {
            frame = read_frame(&mut stdin) => match frame {
                Some(call) => call,
                None => return,
            },
            _ = kill_rx.changed() => return,
        };

        let id = call["id"].as_u64().unwrap_or(0);
        if id <= last_id {
            hub.id_order_violations.fetch_add(1, Ordering::SeqCst);
        }
        last_id = id;
        let method = call["method"].as_str().unwrap_or("");
        let session_id = call["sessionId"].as_str().map(str::to_string);

        let reply_with = |result: Value| {
            let mut reply = json!({ "id": id, "result": result });
            if let Some(sid) = &session_id {
                reply["sessionId"] = json!(sid);
            }
            reply
        };

        match method {
            "Target.createBrowserContext" => {
                let seq = hub.target_seq.load(Ordering::SeqCst) + 1;
                if !write_frame(&mut stdout, reply_with(json!({"browserContextId": format!("ctx-{seq}")}))).await {
                    return;
                }
            }
            "Target.createTarget" => {
                let seq = hub.target_seq.fetch_add(1, Ordering::SeqCst) + 1;
                let target_id = format!("target-{seq}");
                hub.targets_created.lock().unwrap().push(target_id.clone());
                if !write_frame(&mut stdout, reply_with(json!({"targetId": target_id}))).await {
                    return;
                }
            }
            "Target.attachToTarget" => {
                let target = call["params"]["targetId"].as_str().unwrap_or("unknown");
                let reply = reply_with(json!({"sessionId": format!("sess-{target}")}));
                if !write_frame(&mut stdout, reply).await {
                    return;
                }
            }
            "Page.navigate" => {
                let event = json!({
                    "method": "Page.frameStoppedLoading",
                    "params": {"frameId": "frame-main"},
                    "sessionId": session_id.clone(),
                });
                let reply = reply_with(json!({"frameId": "frame-main"}));

                let scrambled = hub.scrambled_navigate.load(Ordering::SeqCst);
                let (first, second) = if scrambled { (event, reply) } else { (reply, event) };
                if !write_frame(&mut stdout, first).await
                    || !write_frame(&mut stdout, second).await
                {
                    return;
                }
            }
            "Page.printToPDF" => {
                if hub.crash_on_print.swap(false, Ordering::SeqCst) {
                    let crash = json!({
                        "method": "Inspector.targetCrashed",
                        "params": {},
                        "sessionId": session_id.clone(),
                    });
                    let _ = write_frame(&mut stdout, crash).await;
                    // Dropping the pipes is the browser exiting.
                    return;
                }

                use base64::Engine as _;
                let data = base64::engine::general_purpose::STANDARD.encode(MOCK_PDF);
                if !write_frame(&mut stdout, reply_with(json!({"data": data}))).await {
                    return;
                }
            }
            "Runtime.evaluate" => {
                let reply = reply_with(json!({"result": {"value": true}}));
                if !write_frame(&mut stdout, reply).await {
                    return;
                }
            }
            // Page.enable, Network.*, Security.*, Target.closeTarget,
            // Target.disposeBrowserContext: empty success.
            _ => {
                if !write_frame(&mut stdout, reply_with(json!({}))).await {
                    return;
                }
            }
        }
    }
}
