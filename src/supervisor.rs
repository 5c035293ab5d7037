//! Supervision of the browser / connection / session tree.
//!
//! Three layers hang off one another: the browser process is owned by the
//! connection, and the connection is shared by the pool's sessions. A crash
//! of the browser takes down the connection, which fails every in-flight
//! protocol with `browser_died`; the supervisor then rebuilds the whole
//! tree. A failure confined to one session (protocol error, timeout) never
//! reaches this module — the pool retires and replaces that session alone
//! on checkin.

use std::sync::Arc;
use std::time::Duration;

use crate::pool::PoolInner;

/// Delay between rebuild attempts when the browser will not come back up.
const RESTART_BACKOFF: Duration = Duration::from_secs(1);

/// Spawn the supervisor task for a resident (non-on-demand) pool.
pub(crate) fn spawn(inner: Arc<PoolInner>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        supervise(inner).await;
    })
}

async fn supervise(inner: Arc<PoolInner>) {
    loop {
        let Some(connection) = inner.connection().await else {
            // Between drain and rebuild; the rebuild loop below installs
            // a new connection before we get here again.
            break;
        };

        // Park until the browser dies (or shutdown closes it, which also
        // flips the watch).
        let mut died = connection.died();
        if !*died.borrow() && died.changed().await.is_err() {
            break;
        }

        if inner.is_shutting_down() {
            break;
        }

        log::error!("Browser process died; restarting connection and all sessions");

        // Idle sessions all observed ConnectionDied and are defunct;
        // checked-out ones are retired by their handles on checkin.
        inner.drain_tree().await;

        loop {
            if inner.is_shutting_down() {
                return;
            }

            match inner.open_tree().await {
                Ok(()) => {
                    log::info!("Browser restarted, session tree rebuilt");
                    break;
                }
                Err(e) => {
                    log::error!(
                        "Failed to restart browser ({}), retrying in {:?}",
                        e,
                        RESTART_BACKOFF
                    );
                    tokio::time::sleep(RESTART_BACKOFF).await;
                }
            }
        }
    }

    log::debug!("Supervisor task exiting");
}
