use chrono::{DateTime, Utc};
use std::time::Instant;

/// Clocks for one inspection run.
///
/// The monotonic reading orders audit entries within a run; wall-clock
/// readings stamp verdicts so rejects can be matched against camera frames.
#[derive(Debug, Clone, Copy)]
pub struct TimeBase {
    started: Instant,
    started_at: DateTime<Utc>,
}

impl TimeBase {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            started_at: Utc::now(),
        }
    }

    /// Microseconds since the run started. Never goes backwards.
    pub fn now_us(&self) -> u64 {
        self.started.elapsed().as_micros() as u64
    }

    /// Wall-clock microseconds since the Unix epoch; zero before 1970.
    pub fn unix_us(&self) -> u64 {
        u64::try_from(self.now_utc().timestamp_micros()).unwrap_or(0)
    }

    /// Wall-clock time an item was observed.
    pub fn now_utc(&self) -> DateTime<Utc> {
        Utc::now()
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }
}

impl Default for TimeBase {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn monotonic_clock_advances() {
        let tb = TimeBase::new();
        let first = tb.now_us();
        thread::sleep(Duration::from_millis(2));
        assert!(tb.now_us() > first);
    }

    #[test]
    fn wall_clocks_agree() {
        let tb = TimeBase::new();
        let unix = tb.unix_us() as i64;
        let utc = tb.now_utc().timestamp_micros();
        assert!((utc - unix).abs() < 1_000_000);
        assert!(tb.started_at() <= tb.now_utc());
    }
}
