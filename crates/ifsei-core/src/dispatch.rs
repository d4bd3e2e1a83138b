// ── Command dispatcher ──
//
// Drains the command queue onto the link, one command at a time, at least
// `send_delay` apart. Pauses while the link is down; nothing is dropped
// except commands the codec cannot encode.

use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use ifsei_api::Connector;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::config::BridgeOptions;
use crate::link::{ConnectionState, Link};
use crate::queue::CommandQueue;

pub(crate) async fn dispatch_loop<C: Connector>(
    queue: Arc<CommandQueue>,
    link: Arc<Link<C>>,
    options: Arc<ArcSwap<BridgeOptions>>,
    cancel: CancellationToken,
) {
    let mut state_rx = link.subscribe();

    loop {
        // Commands stay in the queue while the link is down.
        let connected = tokio::select! {
            biased;
            () = cancel.cancelled() => false,
            r = state_rx.wait_for(ConnectionState::is_connected) => r.is_ok(),
        };
        if !connected {
            break;
        }

        let queued = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            q = queue.next() => q,
        };

        match link.send(&queued.command).await {
            Ok(()) => {
                debug!(
                    command = %queued.command,
                    queued_ms = millis(queued.enqueued_at.elapsed()),
                    "command dispatched"
                );
            }
            Err(ifsei_api::Error::Codec(reason)) => {
                error!(command = %queued.command, %reason, "cannot encode command, dropping it");
                continue;
            }
            Err(e) => {
                warn!(
                    command = %queued.command,
                    error = %e,
                    "dispatch failed, requeueing at front"
                );
                queue.requeue_front(queued);

                // Let the supervisor react before trying again; the next
                // pass waits for `Connected`.
                let changed = tokio::select! {
                    biased;
                    () = cancel.cancelled() => false,
                    r = state_rx.changed() => r.is_ok(),
                };
                if !changed {
                    break;
                }
                continue;
            }
        }

        let delay = options.load().send_delay;
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            () = tokio::time::sleep(delay) => {}
        }
    }

    debug!(pending = queue.len(), "command dispatcher stopped");
}

fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}
