use std::sync::Arc;
use std::time::Duration;

use suggest_core::{SuggestionSource, SuggestionStore};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Periodically merges the refresh source into the store.
///
/// The first tick runs immediately. Ticks execute one after another inside a
/// single task, so refreshes never overlap; a tick that comes due while a
/// refresh is still running is skipped. Dropping the scheduler cancels it.
pub struct RefreshScheduler {
    token: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl RefreshScheduler {
    pub fn start(
        store: Arc<SuggestionStore>,
        source: Arc<dyn SuggestionSource>,
        period: Duration,
    ) -> Self {
        let token = CancellationToken::new();
        let cancelled = token.clone();
        let handle = tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = cancelled.cancelled() => break,
                    _ = ticker.tick() => {}
                }
                refresh_once(store.clone(), source.clone()).await;
            }
            debug!("refresh scheduler stopped");
        });

        Self {
            token,
            handle: Some(handle),
        }
    }

    /// Stops the scheduler and waits for an in-flight refresh to finish.
    pub async fn shutdown(mut self) {
        self.token.cancel();
        if let Some(handle) = self.handle.take() {
            if let Err(err) = handle.await {
                warn!("refresh task ended abnormally: {err}");
            }
        }
    }
}

impl Drop for RefreshScheduler {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

/// One tick. Failures are logged and leave the store as it was.
async fn refresh_once(store: Arc<SuggestionStore>, source: Arc<dyn SuggestionSource>) {
    let location = source.describe();
    let outcome = tokio::task::spawn_blocking(move || store.refresh_from(source.as_ref())).await;
    match outcome {
        Ok(Ok(report)) => info!(
            source = %location,
            added = report.added,
            skipped = report.skipped,
            "collection updated. New size: {} size before: {}",
            report.after,
            report.before
        ),
        Ok(Err(err)) => warn!(source = %location, "refresh failed: {err}"),
        Err(err) => warn!(source = %location, "refresh task panicked: {err}"),
    }
}
