//! Dependency monitor loop

use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use super::messages::TopologyCommand;

/// Ask the topology actor for a dependency sweep every `period`
///
/// The ticker is reset after each sweep, so consecutive sweeps start at least
/// `period` apart however long a sweep takes. The first sweep runs right away.
pub(crate) async fn run_monitor(
    topology_tx: mpsc::Sender<TopologyCommand>,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    info!(period_ms = period.as_millis() as u64, "Dependency monitor started");

    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = shutdown.changed() => {
                debug!("run_monitor: shutdown signalled");
                break;
            }
            _ = ticker.tick() => {}
        }

        let (reply_tx, reply_rx) = oneshot::channel();
        if topology_tx
            .send(TopologyCommand::RefreshDependencies { reply: reply_tx })
            .await
            .is_err()
        {
            warn!("Topology actor gone, stopping dependency monitor");
            break;
        }

        match reply_rx.await {
            Ok(report) if report.failures.is_empty() => {
                debug!(sweep = report.sweep, changed = report.changed.len(), "run_monitor: sweep complete");
            }
            Ok(report) => {
                warn!(
                    sweep = report.sweep,
                    failures = report.failures.len(),
                    "Dependency sweep completed with failures"
                );
            }
            Err(_) => {
                warn!("Topology actor dropped sweep reply, stopping dependency monitor");
                break;
            }
        }

        ticker.reset();
    }

    info!("Dependency monitor stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::NodeId;
    use crate::topology::messages::SweepReport;
    use tokio::time::Instant;

    #[tokio::test]
    async fn test_sweeps_spaced_by_period() {
        let (topology_tx, mut topology_rx) = mpsc::channel(4);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let period = Duration::from_millis(100);
        let monitor = tokio::spawn(run_monitor(topology_tx, period, shutdown_rx));

        let mut starts = Vec::new();
        while starts.len() < 3 {
            if let Some(TopologyCommand::RefreshDependencies { reply }) = topology_rx.recv().await {
                starts.push(Instant::now());
                // Slow sweep must not shorten the gap to the next one
                tokio::time::sleep(Duration::from_millis(30)).await;
                let _ = reply.send(SweepReport {
                    sweep: starts.len() as u64,
                    ..Default::default()
                });
            }
        }

        for pair in starts.windows(2) {
            assert!(pair[1] - pair[0] >= period);
        }

        shutdown_tx.send_replace(true);
        drop(topology_rx);
        monitor.await.unwrap();
    }

    #[tokio::test]
    async fn test_continues_after_failed_sweep() {
        let (topology_tx, mut topology_rx) = mpsc::channel(4);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let monitor = tokio::spawn(run_monitor(topology_tx, Duration::from_millis(10), shutdown_rx));

        let mut sweeps = 0;
        while sweeps < 3 {
            if let Some(TopologyCommand::RefreshDependencies { reply }) = topology_rx.recv().await {
                sweeps += 1;
                let _ = reply.send(SweepReport {
                    sweep: sweeps,
                    failures: vec![(NodeId::from("ghost"), "missing".to_string())],
                    ..Default::default()
                });
            }
        }
        assert_eq!(sweeps, 3);

        shutdown_tx.send_replace(true);
        drop(topology_rx);
        monitor.await.unwrap();
    }
}
