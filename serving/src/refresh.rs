use std::{sync::Arc, time::Duration};

use artifact::ArtifactStore;
use log::{debug, info};
use tokio::{
    sync::{Notify, watch},
    task::JoinHandle,
    time::{self, Instant, MissedTickBehavior},
};

use crate::gateway::{Gateway, RefreshOutcome};

/// Controls a running refresh loop.
pub struct RefreshHandle {
    trigger: Arc<Notify>,
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl RefreshHandle {
    /// Asks the loop to refresh now instead of waiting for the next tick.
    pub fn trigger(&self) {
        self.trigger.notify_one();
    }

    /// Stops the loop and waits for it, an in flight refresh is finished first.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        let _ = self.task.await;
    }
}

/// Spawns a task refreshing `gateway` every `period` or whenever it's triggered.
///
/// # Arguments
/// * `gateway` - The gateway to refresh.
/// * `period` - The time between two scheduled refreshes.
///
/// # Returns
/// A handle to trigger or stop the loop.
pub fn spawn<S: ArtifactStore + 'static>(gateway: Gateway<S>, period: Duration) -> RefreshHandle {
    let trigger = Arc::new(Notify::new());
    let (shutdown, mut stopped) = watch::channel(false);

    let notified = Arc::clone(&trigger);
    let task = tokio::spawn(async move {
        let mut ticker = time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = notified.notified() => {}
                _ = stopped.changed() => break,
            }

            // Failures are logged and emitted by the gateway itself.
            if let Ok(RefreshOutcome::Unchanged { version }) = gateway.refresh().await {
                debug!(version = version.as_str(); "model is up to date");
            }
        }

        info!("refresh loop stopped");
    });

    RefreshHandle {
        trigger,
        shutdown,
        task,
    }
}
