use std::time::Duration;

use tokio::{task::JoinHandle, time::MissedTickBehavior};
use tracing::{debug, info, warn};

use super::app_state::AppState;

/// Rebuilds the default-query feed on a fixed period so the cache and the
/// breaker stay warm between requests. Returns `None` when disabled.
pub fn spawn_feed_refresher(state: &AppState) -> Option<JoinHandle<()>> {
    let period = state.settings.feed.refresh_interval_secs;
    if period == 0 {
        info!("feed refresher disabled");
        return None;
    }

    let state = state.clone();
    Some(tokio::spawn(async move {
        let query = state.feed_bounds.default_query();
        let mut interval = tokio::time::interval(Duration::from_secs(period));
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = state.shutdown.cancelled() => break,
                _ = interval.tick() => {}
            }

            let token = state.shutdown.child_token();
            match state.feed.refresh(query, &token).await {
                Ok(snapshot) => debug!(
                    version = snapshot.schedule_version,
                    status = %snapshot.feed_status,
                    "feed refreshed"
                ),
                Err(err) => warn!(error = %err, "background feed refresh failed"),
            }
        }
        debug!("feed refresher stopped");
    }))
}
