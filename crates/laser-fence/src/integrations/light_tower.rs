use inspect_core::{LightColor, SignalingPort};
use std::time::Duration;
use tracing::{info, warn};

/// Light tower and reject arm as seen from the log.
///
/// The physical tower is not wired to the DAQ device yet, so intents are
/// reported and counted rather than driven.
#[derive(Debug, Default)]
pub struct LoggedSignals {
    current: Option<LightColor>,
    rejects: u64,
}

impl LoggedSignals {
    pub fn current(&self) -> Option<LightColor> {
        self.current
    }

    pub fn rejects(&self) -> u64 {
        self.rejects
    }
}

impl SignalingPort for LoggedSignals {
    fn set_light(&mut self, color: LightColor) {
        if self.current != Some(color) {
            info!(color = ?color, "Light tower");
            self.current = Some(color);
        }
    }

    fn schedule_reject(&mut self, after: Duration) {
        self.rejects += 1;
        warn!(
            after_ms = after.as_millis() as u64,
            total = self.rejects,
            "Reject scheduled"
        );
    }
}
