use std::time::{Duration, Instant};

/// How long a sent request may go unanswered before its expectation is
/// dropped and reported as timed out.
pub const RESPONSE_TIMEOUT: Duration = Duration::from_secs(5);

/// The two request kinds the device answers with a correlated line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PendingKind {
    ConfigRead,
    ConfigWrite,
}

impl PendingKind {
    pub fn command_name(self) -> &'static str {
        match self {
            PendingKind::ConfigRead => "CONFIG_READ",
            PendingKind::ConfigWrite => "CONFIG_WRITE",
        }
    }
}

/// Tracks the at-most-one outstanding read and write expectation.
///
/// There is no queue: sending a second `CONFIG_READ` while one is pending
/// simply renews the expectation (and its deadline). The classifier consumes
/// an expectation at most once per matching response line.
#[derive(Debug, Default)]
pub struct PendingRequests {
    read_deadline: Option<Instant>,
    write_deadline: Option<Instant>,
}

impl PendingRequests {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn expect_read(&mut self, now: Instant) {
        self.read_deadline = Some(now + RESPONSE_TIMEOUT);
    }

    pub fn expect_write(&mut self, now: Instant) {
        self.write_deadline = Some(now + RESPONSE_TIMEOUT);
    }

    pub fn read_pending(&self) -> bool {
        self.read_deadline.is_some()
    }

    pub fn write_pending(&self) -> bool {
        self.write_deadline.is_some()
    }

    /// Consume the read expectation. Returns whether one was set.
    pub fn take_read(&mut self) -> bool {
        self.read_deadline.take().is_some()
    }

    /// Consume the write expectation. Returns whether one was set.
    pub fn take_write(&mut self) -> bool {
        self.write_deadline.take().is_some()
    }

    /// Drop every expectation whose deadline has passed and return their
    /// kinds so the caller can surface a timeout per request.
    pub fn expire(&mut self, now: Instant) -> Vec<PendingKind> {
        let mut expired = Vec::new();
        if self.read_deadline.is_some_and(|t| now >= t) {
            self.read_deadline = None;
            expired.push(PendingKind::ConfigRead);
        }
        if self.write_deadline.is_some_and(|t| now >= t) {
            self.write_deadline = None;
            expired.push(PendingKind::ConfigWrite);
        }
        expired
    }

    pub fn clear(&mut self) {
        self.read_deadline = None;
        self.write_deadline = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn take_consumes_once() {
        let mut pending = PendingRequests::new();
        let now = Instant::now();
        pending.expect_read(now);
        assert!(pending.take_read());
        assert!(!pending.take_read());
    }

    #[test]
    fn second_request_overwrites_instead_of_queueing() {
        let mut pending = PendingRequests::new();
        let now = Instant::now();
        pending.expect_read(now);
        pending.expect_read(now + Duration::from_secs(1));
        // One take satisfies both sends; there is no second slot.
        assert!(pending.take_read());
        assert!(!pending.read_pending());
    }

    #[test]
    fn read_and_write_are_independent() {
        let mut pending = PendingRequests::new();
        let now = Instant::now();
        pending.expect_read(now);
        pending.expect_write(now);
        assert!(pending.take_write());
        assert!(pending.read_pending());
    }

    #[test]
    fn expire_drops_only_overdue_expectations() {
        let mut pending = PendingRequests::new();
        let now = Instant::now();
        pending.expect_read(now);
        pending.expect_write(now + Duration::from_secs(3));

        assert!(pending.expire(now + Duration::from_secs(1)).is_empty());

        let expired = pending.expire(now + RESPONSE_TIMEOUT);
        assert_eq!(expired, vec![PendingKind::ConfigRead]);
        assert!(pending.write_pending());

        let expired = pending.expire(now + Duration::from_secs(3) + RESPONSE_TIMEOUT);
        assert_eq!(expired, vec![PendingKind::ConfigWrite]);
        assert!(!pending.read_pending() && !pending.write_pending());
    }
}
