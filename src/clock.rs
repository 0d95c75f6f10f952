use crate::error::{ConnectorError, Result};
use chrono::{DateTime, Utc};
use log::{debug, trace};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Duration, Instant, MissedTickBehavior};

/// Interval used by [`start_work_clock`] when none is given.
pub const DEFAULT_WORK_INTERVAL: Duration = Duration::from_secs(5 * 60);

const TICK_CHANNEL_CAPACITY: usize = 16;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClockTick {
    /// Starts at 1 and keeps counting across pause/start.
    pub sequence: u64,
    pub at: DateTime<Utc>,
}

/// Publishes a [`ClockTick`] on its own broadcast channel every `interval`.
///
/// Each ticker owns its channel, so independent tickers never see each other's ticks.
pub struct ClockTicker {
    interval: Duration,
    sender: broadcast::Sender<ClockTick>,
    sequence: Arc<AtomicU64>,
    handle: Option<JoinHandle<()>>,
}

impl ClockTicker {
    pub fn new(interval: Duration) -> Result<Self> {
        if interval.is_zero() {
            return Err(ConnectorError::InvalidConfig(
                "clock interval must be greater than 0".to_string(),
            ));
        }
        let (sender, _) = broadcast::channel(TICK_CHANNEL_CAPACITY);
        Ok(Self {
            interval,
            sender,
            sequence: Arc::new(AtomicU64::new(0)),
            handle: None,
        })
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ClockTick> {
        self.sender.subscribe()
    }

    pub fn is_running(&self) -> bool {
        self.handle.is_some()
    }

    /// Starts ticking; the first tick comes one interval from now. No-op if running.
    /// Must be called from within a Tokio runtime.
    pub fn start(&mut self) {
        if self.handle.is_some() {
            return;
        }
        let period = self.interval;
        let sender = self.sender.clone();
        let sequence = Arc::clone(&self.sequence);

        debug!("Starting clock ticker every {:?}", period);
        self.handle = Some(tokio::spawn(async move {
            let mut timer = interval_at(Instant::now() + period, period);
            timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                timer.tick().await;
                let tick = ClockTick {
                    sequence: sequence.fetch_add(1, Ordering::SeqCst) + 1,
                    at: Utc::now(),
                };
                if sender.send(tick).is_err() {
                    trace!("Clock tick dropped, no subscribers");
                }
            }
        }));
    }

    /// Stops ticking. A later [`start`](Self::start) resumes with a fresh interval.
    pub fn pause(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
            debug!("Clock ticker paused");
        }
    }

    pub fn terminate(&mut self) {
        self.pause();
    }
}

impl Drop for ClockTicker {
    fn drop(&mut self) {
        self.pause();
    }
}

/// Starts a ticker for periodic background work, every 5 minutes by default.
pub fn start_work_clock(interval: Option<Duration>) -> Result<ClockTicker> {
    let mut ticker = ClockTicker::new(interval.unwrap_or(DEFAULT_WORK_INTERVAL))?;
    ticker.start();
    Ok(ticker)
}
