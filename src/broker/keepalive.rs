//! Background heartbeat task for the cached broker session

use std::sync::Arc;
use std::time::Duration;

use log::{debug, warn};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use super::connection::{ConnectionManager, HeartbeatStatus};

/// Spawn the keep-alive loop
///
/// Polls every `poll` while healthy and waits `backoff` after an error.
pub fn spawn_keepalive(
    connections: Arc<ConnectionManager>,
    poll: Duration,
    backoff: Duration,
    mut stop: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            if *stop.borrow() {
                break;
            }

            let delay = match connections.heartbeat().await {
                Ok(HeartbeatStatus::Cleared) => {
                    debug!("Keep-alive cleared a closed broker session");
                    poll
                }
                Ok(_) => poll,
                Err(e) => {
                    warn!("Broker heartbeat failed, session cleared: {}", e);
                    backoff
                }
            };

            tokio::select! {
                () = tokio::time::sleep(delay) => {}
                changed = stop.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }
        debug!("Broker keep-alive stopped");
    })
}
