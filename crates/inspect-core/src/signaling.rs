use std::time::Duration;

/// Light tower colours driven by the inspection loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LightColor {
    /// Line starting up.
    Yellow,
    Green,
    Red,
}

/// Downstream signalling: light tower and reject arm.
///
/// The loop only states intent. Physical timing, such as when the arm
/// actually moves, belongs to the implementation.
pub trait SignalingPort {
    fn set_light(&mut self, color: LightColor);

    /// Remove the item currently at the inspection point once it has
    /// travelled for `after`.
    fn schedule_reject(&mut self, after: Duration);
}

/// Records every intent. Useful for tests and dry runs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordingSignals {
    pub lights: Vec<LightColor>,
    pub rejects: Vec<Duration>,
}

impl SignalingPort for RecordingSignals {
    fn set_light(&mut self, color: LightColor) {
        self.lights.push(color);
    }

    fn schedule_reject(&mut self, after: Duration) {
        self.rejects.push(after);
    }
}
