use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration};

use crate::services::session_registry::SessionRegistry;

#[derive(Debug, Clone, Copy)]
pub(crate) struct SweepSchedule {
    pub(crate) period: Duration,
    pub(crate) retention: Duration,
}

pub(crate) fn spawn_sweeper(
    registry: SessionRegistry,
    schedule: SweepSchedule,
    shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(sweep_loop(registry, schedule, shutdown))
}

async fn sweep_loop(
    registry: SessionRegistry,
    schedule: SweepSchedule,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut tick = interval(schedule.period);
    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            _ = tick.tick() => {
                registry.sweep(schedule.retention).await;
                metrics::gauge!("exam_sessions_live").set(registry.live_count().await as f64);
            }
        }
    }
    tracing::info!("Session sweeper stopped");
}
