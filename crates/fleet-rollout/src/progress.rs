//! Periodic "still working" log lines while a long step runs.

use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{info, warn};

/// A background task that logs at a fixed interval until finished.
///
/// Call [`finish`](Self::finish) on every exit path; it stops the task and
/// waits for it, so no ticker outlives the operation it reports on.
#[derive(Debug)]
pub struct ProgressTicker {
    stop: watch::Sender<bool>,
    task: JoinHandle<u32>,
}

impl ProgressTicker {
    /// A zero `every` disables ticking; the task still runs until finished.
    pub fn start(label: String, every: Duration) -> Self {
        let (stop, mut stopped) = watch::channel(false);
        let task = tokio::spawn(async move {
            let started = Instant::now();
            let mut ticks = 0u32;
            if every.is_zero() {
                let _ = stopped.changed().await;
                return ticks;
            }

            let mut interval = tokio::time::interval_at(started + every, every);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = stopped.changed() => break,
                    _ = interval.tick() => {
                        ticks += 1;
                        info!(
                            task = %label,
                            elapsed_secs = started.elapsed().as_secs(),
                            "still working"
                        );
                    }
                }
            }
            ticks
        });
        Self { stop, task }
    }

    /// Stop the ticker and join it. Returns the number of ticks logged.
    pub async fn finish(self) -> u32 {
        self.stop.send_replace(true);
        match self.task.await {
            Ok(ticks) => ticks,
            Err(e) => {
                warn!(error = %e, "progress ticker task failed");
                0
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn ticks_until_finished() {
        let ticker = ProgressTicker::start("test".to_string(), Duration::from_millis(10));
        tokio::time::sleep(Duration::from_millis(60)).await;
        let ticks = ticker.finish().await;
        assert!(ticks >= 1, "ticks = {ticks}");
    }

    #[tokio::test]
    async fn finish_before_first_tick() {
        let ticker = ProgressTicker::start("quick".to_string(), Duration::from_secs(60));
        assert_eq!(ticker.finish().await, 0);
    }

    #[tokio::test]
    async fn zero_interval_never_ticks() {
        let ticker = ProgressTicker::start("off".to_string(), Duration::ZERO);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(ticker.finish().await, 0);
    }
}
