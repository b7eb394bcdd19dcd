use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use shared::protocol::WILDCARD;
use shared::types::Action;
use crate::bus::dispatch::{ping, whois, Dispatch};

/// Ticks immediately, then every `period`. After a stall the schedule
/// restarts from the late tick rather than bursting the missed probes.
fn probe_interval(period: Duration) -> Interval {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}

/// Emit `make()` on every tick until cancelled. The first probe goes out
/// immediately. Probes never touch watcher state.
async fn run_probe(
    name: String,
    make: impl Fn() -> Action,
    dispatch: Dispatch,
    period: Duration,
    cancel: CancellationToken,
) {
    let mut interval = probe_interval(period);

    loop {
        tokio::select! {
            _ = interval.tick() => {
                tracing::debug!("Sending {} probe", name);
                dispatch.dispatch(make());
            }
            _ = cancel.cancelled() => {
                tracing::debug!("{} probe stopped", name);
                break;
            }
        }
    }
}

/// Broadcast heartbeat probe to every service
pub fn spawn_heartbeat(dispatch: Dispatch, period: Duration, cancel: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(run_probe(
        "heartbeat".to_string(),
        || ping(WILDCARD),
        dispatch,
        period,
        cancel,
    ))
}

/// Identity probe addressed to one service
pub fn spawn_identity(
    handle: String,
    dispatch: Dispatch,
    period: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(run_probe(
        format!("identity({})", handle),
        move || whois(&handle),
        dispatch,
        period,
        cancel,
    ))
}
