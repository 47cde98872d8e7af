//! Fan-out of loop events to stdout, tracing, Prometheus and the audit trail.

use crate::infra::audit::{AuditEventType, AuditLogger, ConveyorDetails, VerdictDetails};
use inspect_core::{
    ConveyorStatus, InspectionSink, ParseError, QualityVerdict, RampStep, TimeBase, TracingSink,
};
use line_io::metrics;
use serde::Serialize;
use std::io::{self, Write};
use std::sync::Arc;
use tracing::warn;

pub struct LineSink<W: Write = io::Stdout> {
    echo: W,
    tracing: TracingSink,
    audit: Option<Arc<AuditLogger>>,
    timebase: TimeBase,
}

impl LineSink<io::Stdout> {
    pub fn stdout(audit: Option<Arc<AuditLogger>>, timebase: TimeBase) -> Self {
        Self::new(io::stdout(), audit, timebase)
    }
}

impl<W: Write> LineSink<W> {
    pub fn new(echo: W, audit: Option<Arc<AuditLogger>>, timebase: TimeBase) -> Self {
        Self {
            echo,
            tracing: TracingSink,
            audit,
            timebase,
        }
    }

    #[cfg(test)]
    pub fn echo(&self) -> &W {
        &self.echo
    }

    fn audit<T: Serialize>(&self, event_type: AuditEventType, details: T) {
        let Some(logger) = &self.audit else {
            return;
        };
        let details = match serde_json::to_value(details) {
            Ok(value) => value,
            Err(e) => {
                warn!(error = %e, event = ?event_type, "Failed to encode audit details");
                return;
            }
        };
        if let Err(e) = logger.log_event(
            self.timebase.now_us(),
            self.timebase.unix_us(),
            event_type,
            details,
        ) {
            warn!(error = %e, event = ?event_type, "Failed to write audit entry");
        }
    }
}

impl<W: Write> InspectionSink for LineSink<W> {
    fn raw_line(&mut self, line: &str) {
        if let Err(e) = writeln!(self.echo, "{line}").and_then(|_| self.echo.flush()) {
            warn!(error = %e, "Failed to echo measurement");
        }
        self.tracing.raw_line(line);
    }

    fn parse_error(&mut self, line: &str, error: &ParseError) {
        self.tracing.parse_error(line, error);
        metrics::record_parse_error();
        self.audit(
            AuditEventType::ParseError,
            serde_json::json!({ "line": line, "error": error.to_string() }),
        );
    }

    fn verdict(&mut self, verdict: &QualityVerdict) {
        self.tracing.verdict(verdict);
        metrics::record_verdict(verdict);
        self.audit(AuditEventType::Verdict, VerdictDetails::from(verdict));
    }

    fn ramp_step(&mut self, step: &RampStep) {
        self.tracing.ramp_step(step);
        metrics::record_ramp_step(step);
    }

    fn conveyor_started(&mut self, status: &ConveyorStatus) {
        self.tracing.conveyor_started(status);
        metrics::record_conveyor(status);
        self.audit(AuditEventType::ConveyorStarted, ConveyorDetails::from(status));
    }
}
