//! Frame and countdown scheduler with an explicit start/stop lifecycle

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::debug;

/// Tick kinds emitted while running
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerTick {
    /// Render frame
    Frame,
    /// One countdown second elapsed
    Second,
}

/// Drives the session loop; stopped schedulers emit nothing
pub struct FrameScheduler {
    frame_period: Duration,
    second_period: Duration,
    task: Option<JoinHandle<()>>,
    rx: Option<mpsc::Receiver<SchedulerTick>>,
}

impl FrameScheduler {
    pub fn new(frame_rate: u32) -> Self {
        let frame_rate = frame_rate.max(1);
        Self::with_periods(
            Duration::from_micros(1_000_000 / frame_rate as u64),
            Duration::from_secs(1),
        )
    }

    pub fn with_periods(frame_period: Duration, second_period: Duration) -> Self {
        Self {
            frame_period,
            second_period,
            task: None,
            rx: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.task.is_some()
    }

    /// Spawn the ticker task; no-op if already running
    pub fn start(&mut self) -> bool {
        if self.is_running() {
            return false;
        }

        let (tx, rx) = mpsc::channel(16);
        let frame_period = self.frame_period;
        let second_period = self.second_period;

        let task = tokio::spawn(async move {
            let now = Instant::now();
            let mut frames = interval_at(now + frame_period, frame_period);
            frames.set_missed_tick_behavior(MissedTickBehavior::Skip);
            let mut seconds = interval_at(now + second_period, second_period);

            loop {
                tokio::select! {
                    _ = frames.tick() => {
                        // Frames are disposable, drop them if the consumer lags
                        if let Err(mpsc::error::TrySendError::Closed(_)) = tx.try_send(SchedulerTick::Frame) {
                            break;
                        }
                    }
                    _ = seconds.tick() => {
                        if tx.send(SchedulerTick::Second).await.is_err() {
                            break;
                        }
                    }
                }
            }
        });

        self.task = Some(task);
        self.rx = Some(rx);
        debug!("Frame scheduler started");
        true
    }

    /// Abort the ticker task and discard pending ticks
    pub fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            debug!("Frame scheduler stopped");
        }
        self.rx = None;
    }

    /// Next tick; pends forever while stopped
    pub async fn tick(&mut self) -> SchedulerTick {
        match self.rx.as_mut() {
            Some(rx) => match rx.recv().await {
                Some(tick) => tick,
                None => std::future::pending().await,
            },
            None => std::future::pending().await,
        }
    }
}

impl Drop for FrameScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::timeout;

    fn fast() -> FrameScheduler {
        FrameScheduler::with_periods(Duration::from_millis(2), Duration::from_millis(20))
    }

    #[tokio::test]
    async fn emits_frames_and_seconds_while_running() {
        let mut scheduler = fast();
        assert!(scheduler.start());
        assert!(!scheduler.start());

        let mut frames = 0;
        let mut seconds = 0;
        while seconds < 2 {
            match timeout(Duration::from_secs(2), scheduler.tick()).await.unwrap() {
                SchedulerTick::Frame => frames += 1,
                SchedulerTick::Second => seconds += 1,
            }
        }
        assert!(frames > 0);
    }

    #[tokio::test]
    async fn stopped_scheduler_is_silent() {
        let mut scheduler = fast();
        scheduler.start();
        scheduler.stop();
        assert!(!scheduler.is_running());

        let res = timeout(Duration::from_millis(60), scheduler.tick()).await;
        assert!(res.is_err());
    }

    #[test]
    fn never_started_scheduler_pends() {
        let mut scheduler = fast();
        let mut tick = tokio_test::task::spawn(scheduler.tick());
        tokio_test::assert_pending!(tick.poll());
    }

    #[tokio::test]
    async fn can_restart_after_stop() {
        let mut scheduler = fast();
        scheduler.start();
        scheduler.stop();
        assert!(scheduler.start());
        assert!(timeout(Duration::from_secs(1), scheduler.tick()).await.is_ok());
    }
}
