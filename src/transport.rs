//! Framed DevTools transport over the browser subprocess pipe.
//!
//! The browser is spawned with `--remote-debugging-pipe`, keeping its stdin
//! and stdout as the DevTools transport. Messages are UTF-8 JSON documents
//! delimited by a single null byte (`0x00`) — *not* newline-delimited:
//! messages may contain embedded newlines, so the reader buffers bytes until
//! it observes the sentinel.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────┐
//! │   Browser   │
//! │ (Chromium)  │
//! └──────┬──────┘
//!        │ stdin/stdout pipes
//! ┌──────▼──────────────────────┐
//! │         Transport           │
//! │  ┌─────────┐  ┌──────────┐  │
//! │  │ Writer  │  │  Reader  │  │
//! │  │ (frames)│  │ (frames) │  │
//! │  └─────────┘  └──────────┘  │
//! └──────────────┬──────────────┘
//!                │ into_parts()
//!                ▼
//!         ┌──────────────┐
//!         │  Connection  │
//!         └──────────────┘
//! ```
//!
//! A [`Transport`] can also be built from arbitrary async pipe halves via
//! [`Transport::from_pipes`], which is how the engine is tested without a
//! real browser.

use std::path::Path;
use std::time::Duration;

use tempfile::TempDir;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};

use crate::error::{EngineError, Result};

/// The frame delimiter on the DevTools pipe.
const FRAME_DELIMITER: u8 = 0x00;

/// How long to wait for the browser to exit after its pipes close before
/// sending a kill signal.
const STOP_GRACE: Duration = Duration::from_secs(3);

/// Write half of the transport: frames out to the browser's stdin.
pub struct FrameWriter {
    inner: Box<dyn AsyncWrite + Send + Unpin>,
}

impl FrameWriter {
    /// Write one JSON message terminated by a single null byte.
    pub async fn send(&mut self, frame: &[u8]) -> Result<()> {
        self.inner
            .write_all(frame)
            .await
            .map_err(|_| EngineError::TransportClosed)?;
        self.inner
            .write_all(&[FRAME_DELIMITER])
            .await
            .map_err(|_| EngineError::TransportClosed)?;
        self.inner
            .flush()
            .await
            .map_err(|_| EngineError::TransportClosed)?;
        Ok(())
    }
}

/// Read half of the transport: frames in from the browser's stdout.
pub struct FrameReader {
    inner: BufReader<Box<dyn AsyncRead + Send + Unpin>>,
}

impl FrameReader {
    /// Yield the next complete null-terminated frame.
    ///
    /// Returns `None` at end-of-stream (the browser exited). A partial
    /// frame cut off by end-of-stream is discarded.
    pub async fn recv(&mut self) -> Option<Vec<u8>> {
        let mut buf = Vec::new();

        match self.inner.read_until(FRAME_DELIMITER, &mut buf).await {
            Ok(0) => None,
            Ok(_) => {
                if buf.last() == Some(&FRAME_DELIMITER) {
                    buf.pop();
                    Some(buf)
                } else {
                    // Pipe closed mid-frame; nothing usable.
                    log::warn!(
                        "Discarding {} byte partial frame at end-of-stream",
                        buf.len()
                    );
                    None
                }
            }
            Err(e) => {
                log::warn!("Transport read error: {}", e);
                None
            }
        }
    }
}

/// Handle on the browser OS process, kept for shutdown.
///
/// Mock transports carry no process; stopping them is a no-op.
pub struct BrowserProcess {
    child: Option<Child>,
    // Held so the profile directory outlives the browser.
    _user_data_dir: Option<TempDir>,
}

impl BrowserProcess {
    /// Wait for the browser to exit; kill it if it does not within the
    /// grace period.
    ///
    /// The caller is expected to have closed the pipes (dropped the
    /// [`FrameWriter`]) first — a Chromium with a closed DevTools pipe
    /// shuts itself down.
    pub async fn stop(mut self) {
        let Some(mut child) = self.child.take() else {
            return;
        };

        match tokio::time::timeout(STOP_GRACE, child.wait()).await {
            Ok(Ok(status)) => {
                log::debug!("Browser exited with {}", status);
            }
            Ok(Err(e)) => {
                log::warn!("Failed waiting for browser exit: {}", e);
            }
            Err(_) => {
                log::warn!(
                    "Browser did not exit within {:?}, sending kill signal",
                    STOP_GRACE
                );
                if let Err(e) = child.start_kill() {
                    log::warn!("Failed to kill browser: {}", e);
                }
                let _ = child.wait().await;
            }
        }
    }
}

/// One spawned browser (or mock pipe pair) and its framed DevTools pipe.
pub struct Transport {
    writer: FrameWriter,
    reader: FrameReader,
    process: BrowserProcess,
}

impl Transport {
    /// Spawn the browser subprocess with the DevTools pipe on stdin/stdout.
    ///
    /// `discard_stderr` routes the browser's stderr to /dev/null; otherwise
    /// it is forwarded line-by-line to the logger.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::SpawnFailed`] if the executable cannot be
    /// started.
    pub fn spawn(
        executable: &Path,
        args: &[String],
        user_data_dir: TempDir,
        discard_stderr: bool,
    ) -> Result<Self> {
        let mut command = Command::new(executable);
        command
            .args(args)
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(if discard_stderr {
                std::process::Stdio::null()
            } else {
                std::process::Stdio::piped()
            })
            // Backstop: never leave a browser behind if the host dies.
            .kill_on_drop(true);

        let mut child = command
            .spawn()
            .map_err(|e| EngineError::SpawnFailed(e.to_string()))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| EngineError::SpawnFailed("browser stdin not piped".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| EngineError::SpawnFailed("browser stdout not piped".to_string()))?;

        if !discard_stderr {
            if let Some(stderr) = child.stderr.take() {
                forward_stderr(stderr);
            }
        }

        log::info!(
            "Browser spawned (pid {:?}): {}",
            child.id(),
            executable.display()
        );

        Ok(Self {
            writer: FrameWriter {
                inner: Box::new(stdin),
            },
            reader: FrameReader {
                inner: BufReader::new(Box::new(stdout)),
            },
            process: BrowserProcess {
                child: Some(child),
                _user_data_dir: Some(user_data_dir),
            },
        })
    }

    /// Build a transport over arbitrary pipe halves.
    ///
    /// Used by tests to drive the engine against a scripted peer instead
    /// of a real browser.
    pub fn from_pipes<W, R>(writer: W, reader: R) -> Self
    where
        W: AsyncWrite + Send + Unpin + 'static,
        R: AsyncRead + Send + Unpin + 'static,
    {
        Self {
            writer: FrameWriter {
                inner: Box::new(writer),
            },
            reader: FrameReader {
                inner: BufReader::new(Box::new(reader)),
            },
            process: BrowserProcess {
                child: None,
                _user_data_dir: None,
            },
        }
    }

    /// Write one frame to the browser.
    pub async fn send(&mut self, frame: &[u8]) -> Result<()> {
        self.writer.send(frame).await
    }

    /// Read the next frame from the browser; `None` at end-of-stream.
    pub async fn recv(&mut self) -> Option<Vec<u8>> {
        self.reader.recv().await
    }

    /// Close the pipes and stop the subprocess.
    pub async fn stop(self) {
        let Transport {
            writer,
            reader,
            process,
        } = self;
        drop(writer);
        drop(reader);
        process.stop().await;
    }

    /// Split into independently owned halves so sending and receiving can
    /// run in separate tasks.
    pub fn into_parts(self) -> (FrameWriter, FrameReader, BrowserProcess) {
        (self.writer, self.reader, self.process)
    }
}

/// Forward browser stderr to the logger, one line at a time.
fn forward_stderr(stderr: tokio::process::ChildStderr) {
    tokio::spawn(async move {
        let mut lines = BufReader::new(stderr).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            log::debug!(target: "chromium", "{}", line);
        }
    });
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;

    /// Verifies that a frame round-trips with the null terminator.
    #[tokio::test]
    async fn test_send_appends_delimiter() {
        let (mut our_end, their_end) = tokio::io::duplex(1024);
        let (_unused_r, unused_w) = tokio::io::duplex(16);

        let mut transport = Transport::from_pipes(their_end, unused_w);
        transport.send(br#"{"id":1,"method":"Page.enable"}"#).await.unwrap();
        drop(transport);

        let mut received = Vec::new();
        our_end.read_to_end(&mut received).await.unwrap();

        assert_eq!(received.last(), Some(&0x00));
        assert_eq!(&received[..received.len() - 1], br#"{"id":1,"method":"Page.enable"}"#);
    }

    /// Verifies that frames with embedded newlines survive intact —
    /// framing is null-delimited, not line-delimited.
    #[tokio::test]
    async fn test_recv_frame_with_embedded_newlines() {
        let (unused_r, _unused_w) = tokio::io::duplex(16);
        let (mut browser_end, our_end) = tokio::io::duplex(1024);

        let mut transport = Transport::from_pipes(unused_r, our_end);

        let frame = b"{\"method\":\"Page.frameStoppedLoading\",\n\"params\":{}}";
        browser_end.write_all(frame).await.unwrap();
        browser_end.write_all(&[0x00]).await.unwrap();
        browser_end.flush().await.unwrap();

        let received = transport.recv().await.unwrap();
        assert_eq!(received, frame);
    }

    /// Verifies that several frames written back-to-back are delivered
    /// one at a time.
    #[tokio::test]
    async fn test_recv_multiple_frames() {
        let (unused_r, _unused_w) = tokio::io::duplex(16);
        let (mut browser_end, our_end) = tokio::io::duplex(1024);

        let mut transport = Transport::from_pipes(unused_r, our_end);

        browser_end
            .write_all(b"{\"id\":1}\x00{\"id\":2}\x00{\"id\":3}\x00")
            .await
            .unwrap();
        browser_end.flush().await.unwrap();

        assert_eq!(transport.recv().await.unwrap(), b"{\"id\":1}");
        assert_eq!(transport.recv().await.unwrap(), b"{\"id\":2}");
        assert_eq!(transport.recv().await.unwrap(), b"{\"id\":3}");
    }

    /// Verifies end-of-stream yields None.
    #[tokio::test]
    async fn test_recv_end_of_stream() {
        let (unused_r, _unused_w) = tokio::io::duplex(16);
        let (browser_end, our_end) = tokio::io::duplex(1024);

        let mut transport = Transport::from_pipes(unused_r, our_end);
        drop(browser_end);

        assert!(transport.recv().await.is_none());
    }

    /// Verifies that a partial frame cut off by end-of-stream is dropped
    /// rather than delivered truncated.
    #[tokio::test]
    async fn test_recv_partial_frame_discarded() {
        let (unused_r, _unused_w) = tokio::io::duplex(16);
        let (mut browser_end, our_end) = tokio::io::duplex(1024);

        let mut transport = Transport::from_pipes(unused_r, our_end);

        browser_end.write_all(b"{\"id\":1,\"resu").await.unwrap();
        browser_end.flush().await.unwrap();
        drop(browser_end);

        assert!(transport.recv().await.is_none());
    }

    /// Verifies that stopping a mock transport is a no-op.
    #[tokio::test]
    async fn test_stop_mock_transport() {
        let (unused_r, _w) = tokio::io::duplex(16);
        let (_r, our_end) = tokio::io::duplex(16);

        let transport = Transport::from_pipes(unused_r, our_end);
        transport.stop().await;
    }
}
