use crate::classifier::QualityVerdict;
use crate::error::ParseError;
use crate::inspection::ConveyorStatus;
use crate::ramp::RampStep;
use tracing::{debug, info, warn};

/// Where the loop reports what it sees and does.
pub trait InspectionSink {
    /// Echo of an input line, before parsing.
    fn raw_line(&mut self, line: &str);
    fn parse_error(&mut self, line: &str, error: &ParseError);
    fn verdict(&mut self, verdict: &QualityVerdict);
    fn ramp_step(&mut self, step: &RampStep);
    fn conveyor_started(&mut self, status: &ConveyorStatus);
}

/// Reports everything through `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl InspectionSink for TracingSink {
    fn raw_line(&mut self, line: &str) {
        debug!(line, "Measurement received");
    }

    fn parse_error(&mut self, line: &str, error: &ParseError) {
        warn!(line, error = %error, "Skipping malformed measurement");
    }

    fn verdict(&mut self, verdict: &QualityVerdict) {
        info!(
            seq = verdict.sequence_id,
            score = verdict.score,
            passed = verdict.passed,
            observed_at = %verdict.observed_at,
            "{}",
            verdict
        );
    }

    fn ramp_step(&mut self, step: &RampStep) {
        debug!(
            index = step.index,
            raw = step.commanded_raw,
            "duty cycle = {}%",
            step.duty_cycle_pct
        );
    }

    fn conveyor_started(&mut self, status: &ConveyorStatus) {
        info!(
            completed = status.ramp.completed(),
            steps = status.ramp.steps.len(),
            current = ?status.motor_current,
            encoder = ?status.encoder_position,
            "Conveyor soft start finished"
        );
    }
}

/// Keeps everything it is given, in order.
#[derive(Debug, Clone, Default)]
pub struct RecordingSink {
    pub lines: Vec<String>,
    pub parse_errors: Vec<(String, ParseError)>,
    pub verdicts: Vec<QualityVerdict>,
    pub ramp_steps: Vec<RampStep>,
    pub conveyor_starts: Vec<ConveyorStatus>,
}

impl InspectionSink for RecordingSink {
    fn raw_line(&mut self, line: &str) {
        self.lines.push(line.to_string());
    }

    fn parse_error(&mut self, line: &str, error: &ParseError) {
        self.parse_errors.push((line.to_string(), error.clone()));
    }

    fn verdict(&mut self, verdict: &QualityVerdict) {
        self.verdicts.push(*verdict);
    }

    fn ramp_step(&mut self, step: &RampStep) {
        self.ramp_steps.push(*step);
    }

    fn conveyor_started(&mut self, status: &ConveyorStatus) {
        self.conveyor_starts.push(status.clone());
    }
}
