//! Per-tick polling of the language client.
//!
//! The host loop calls `tick()` on a short interval. Each tick drains a
//! bounded number of connection events (diagnostics, server messages, crash
//! handling), turns accumulated notices into host messages and flushes
//! responses finished by request tasks.

use crate::Extension;
use crate::host::HostMessage;

/// Maximum number of connection events to process per tick.
const EVENT_BUDGET: usize = 32;

impl Extension {
    /// Non-blocking with respect to the manager: when a host event is still
    /// holding it (e.g. a server start), polling waits for the next tick.
    pub async fn tick(&mut self) -> Vec<HostMessage> {
        if let Ok(mut manager) = self.manager.try_lock() {
            let processed = manager.poll_events(EVENT_BUDGET).await;
            if processed > 0 {
                tracing::trace!(processed, "Language client events drained");
            }
            for notice in manager.take_notices() {
                let _ = self.outbox_tx.send(HostMessage::from_notice(notice));
            }
        }

        let mut messages = Vec::new();
        while let Ok(message) = self.outbox_rx.try_recv() {
            messages.push(message);
        }
        messages
    }
}
