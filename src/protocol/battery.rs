use std::time::{Duration, Instant};

/// Interval between periodic `BATTERY_STATUS` requests.
pub const BATTERY_POLL_INTERVAL: Duration = Duration::from_secs(20);

/// Schedules the periodic battery status requests.
///
/// The poller only decides *when* a request is due; the session worker does
/// the actual write on its own thread. Polling is fire-and-forget: a failed
/// request is logged by the caller and never escalates.
#[derive(Debug)]
pub struct BatteryPoller {
    interval: Duration,
    next_due: Option<Instant>,
}

impl BatteryPoller {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            next_due: None,
        }
    }

    /// Arm the poller. The first request is due immediately.
    pub fn start(&mut self, now: Instant) {
        self.next_due = Some(now);
    }

    /// Disarm the poller. Safe to call when it was never started.
    pub fn stop(&mut self) {
        self.next_due = None;
    }

    pub fn is_running(&self) -> bool {
        self.next_due.is_some()
    }

    /// Whether a request is due now. Consuming the tick schedules the next.
    pub fn poll_due(&mut self, now: Instant) -> bool {
        match self.next_due {
            Some(due) if now >= due => {
                self.next_due = Some(now + self.interval);
                true
            }
            _ => false,
        }
    }
}
