//! Background refresh of the roster and prayer timetable.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::error::ServiceResult;
use crate::server::AppState;

/// Start every poller that has what it needs configured. All of them stop
/// when `token` is cancelled.
pub fn spawn(state: Arc<AppState>, token: CancellationToken) -> JoinSet<()> {
    let mut tasks = JoinSet::new();

    if state.roster.is_some() {
        let every = state.settings.roster_poll_interval();
        let roster_state = state.clone();
        tasks.spawn(run_every("roster", every, token.clone(), move || {
            let state = roster_state.clone();
            async move { state.refresh_roster().await }
        }));
    } else {
        tracing::info!("roster poller disabled: GOOGLE_SHEET_ID or GOOGLE_API_KEY not set");
    }

    let every = state.settings.prayer_poll_interval();
    tasks.spawn(run_every("prayer", every, token, move || {
        let state = state.clone();
        async move { state.refresh_prayer_days().await }
    }));

    tasks
}

/// Call `refresh` immediately and then once per `every` until cancelled.
/// A failed refresh is logged and leaves the previous data in place; one
/// still in flight at cancellation is abandoned.
pub async fn run_every<F, Fut, T>(name: &'static str, every: Duration, token: CancellationToken, refresh: F)
where
    F: Fn() -> Fut,
    Fut: Future<Output = ServiceResult<T>>,
{
    let mut ticker = tokio::time::interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    tracing::debug!(poller = name, every_secs = every.as_secs(), "poller started");
    loop {
        tokio::select! {
            biased;
            _ = token.cancelled() => break,
            _ = ticker.tick() => {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => break,
                    result = refresh() => {
                        if let Err(err) = result {
                            tracing::warn!(poller = name, "refresh failed, keeping previous data: {err}");
                        }
                    }
                }
            }
        }
    }
    tracing::debug!(poller = name, "poller stopped");
}
