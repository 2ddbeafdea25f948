//! Tokio glue: the expiry dispatcher and the periodic cleanup sweep.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use waitlist_store::Store;
use waitlist_types::ExpiryTask;

use crate::WaitlistEngine;

/// Drain payloads delivered by a [`crate::TokioScheduler`] into the
/// engine's expiry handler. Ends when every sender is dropped.
pub fn spawn_expiry_dispatcher<S>(
    engine: Arc<WaitlistEngine<S>>,
    mut tasks: mpsc::UnboundedReceiver<ExpiryTask>,
) -> JoinHandle<()>
where
    S: Store + 'static,
{
    tokio::spawn(async move {
        while let Some(task) = tasks.recv().await {
            if let Err(err) = engine.dispatch_expiry(&task) {
                tracing::warn!(
                    entry = %task.entry_id,
                    event = %task.event_id,
                    error = %err,
                    "Expiry handler failed"
                );
            }
        }
        tracing::debug!("Expiry channel closed, dispatcher stopping");
    })
}

/// Run [`WaitlistEngine::cleanup_expired_offers`] every `interval`, first
/// at once.
pub fn spawn_cleanup_sweep<S>(engine: Arc<WaitlistEngine<S>>, interval: Duration) -> JoinHandle<()>
where
    S: Store + 'static,
{
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if let Err(err) = engine.cleanup_expired_offers() {
                tracing::warn!(error = %err, "Cleanup sweep failed");
            }
        }
    })
}
