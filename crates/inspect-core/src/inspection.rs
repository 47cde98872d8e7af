use crate::classifier::{QualityClassifier, QualityVerdict};
use crate::driver::{ActuatorDriver, WiringMode};
use crate::error::{InspectionError, ParseError};
use crate::feed::LineFeed;
use crate::measurement::MeasurementRecord;
use crate::ramp::{run_ramp, RampConfig, RampReport};
use crate::register::RegisterIo;
use crate::signaling::{LightColor, SignalingPort};
use crate::sink::InspectionSink;
use crate::timebase::TimeBase;
use serde::Serialize;
use std::io::BufRead;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{error, info, warn};

/// When the conveyor soft-start ramp runs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum RampPolicy {
    /// Once, while initializing.
    #[default]
    OnStart,
    /// After every processed record. Stalls ingestion for a full ramp per item.
    PerRecord,
    /// Only when [`InspectionLoop::start_conveyor`] is called.
    Manual,
}

#[derive(Clone, Debug)]
pub struct InspectionConfig {
    pub threshold: i64,
    pub wiring: WiringMode,
    pub ramp: RampConfig,
    pub ramp_policy: RampPolicy,
    /// Transit time from the inspection point to the reject arm.
    pub reject_delay: Duration,
}

impl InspectionConfig {
    pub fn new(threshold: i64) -> Self {
        Self {
            threshold,
            wiring: WiringMode::default(),
            ramp: RampConfig::default(),
            ramp_policy: RampPolicy::default(),
            reject_delay: Duration::from_millis(1500),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum LoopState {
    #[default]
    Idle,
    Initializing,
    Running,
    Draining,
    Terminated,
}

#[derive(Clone, Default, Debug, PartialEq, Eq, Serialize)]
pub struct InspectionStats {
    pub records_read: u64,
    pub processed: u64,
    pub passed: u64,
    pub failed: u64,
    pub parse_errors: u64,
    pub ramps_run: u64,
}

/// Result of a soft start, with a motor sample taken once full duty is reached.
#[derive(Clone, Debug, PartialEq)]
pub struct ConveyorStatus {
    pub ramp: RampReport,
    pub motor_current: Option<f64>,
    pub encoder_position: Option<u16>,
}

/// Reads measurements, classifies them, signals the outcome and drives the
/// conveyor. Single threaded: each record, including any ramp it triggers,
/// completes before the next line is read.
pub struct InspectionLoop<IO: RegisterIo, S: SignalingPort, K: InspectionSink> {
    io: Option<IO>,
    driver: Option<ActuatorDriver<IO>>,
    classifier: QualityClassifier,
    config: InspectionConfig,
    signals: S,
    sink: K,
    state: LoopState,
    stats: InspectionStats,
    timebase: TimeBase,
}

impl<IO: RegisterIo, S: SignalingPort, K: InspectionSink> InspectionLoop<IO, S, K> {
    /// `io` may be `None` when no device could be opened; initialization then
    /// fails with a configuration error.
    pub fn new(io: Option<IO>, config: InspectionConfig, signals: S, sink: K) -> Self {
        Self {
            io,
            driver: None,
            classifier: QualityClassifier::new(config.threshold),
            config,
            signals,
            sink,
            state: LoopState::Idle,
            stats: InspectionStats::default(),
            timebase: TimeBase::new(),
        }
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn stats(&self) -> &InspectionStats {
        &self.stats
    }

    pub fn signals(&self) -> &S {
        &self.signals
    }

    pub fn sink(&self) -> &K {
        &self.sink
    }

    pub fn driver(&self) -> Option<&ActuatorDriver<IO>> {
        self.driver.as_ref()
    }

    /// Run the whole lifecycle over `input` until end of stream or `stop`.
    ///
    /// The register device is released before this returns, whatever the outcome.
    ///
    /// `input` is read on a separate thread so `stop` is honoured while the
    /// producer is idle.
    pub fn run<R: BufRead + Send + 'static>(
        &mut self,
        input: R,
        stop: &AtomicBool,
    ) -> Result<InspectionStats, InspectionError> {
        if let Err(e) = self.initialize(stop) {
            self.terminate();
            return Err(e);
        }

        let feed = match LineFeed::spawn(input) {
            Ok(feed) => feed,
            Err(e) => {
                self.terminate();
                return Err(e.into());
            }
        };
        while let Some(line) = feed.next(stop) {
            let result = line
                .map_err(InspectionError::from)
                .and_then(|line| self.inspect_bytes(&line, stop).map(|_| ()));
            if let Err(e) = result {
                error!(error = %e, "Inspection loop terminated");
                self.terminate();
                return Err(e);
            }
        }
        if stop.load(Ordering::Relaxed) {
            info!("Stop requested, draining");
        }

        self.shutdown()
    }

    /// Open the driver, show yellow and, with [`RampPolicy::OnStart`], soft
    /// start the conveyor. Leaves the loop `Running`.
    pub fn initialize(&mut self, stop: &AtomicBool) -> Result<(), InspectionError> {
        self.expect_state(LoopState::Idle)?;
        self.state = LoopState::Initializing;
        info!(
            threshold = self.classifier.threshold(),
            wiring = ?self.config.wiring,
            ramp_policy = ?self.config.ramp_policy,
            "Initializing inspection line"
        );

        let driver = match ActuatorDriver::from_handle(self.io.take(), self.config.wiring) {
            Ok(driver) => driver,
            Err(e) => {
                self.state = LoopState::Terminated;
                error!(error = %e, "Driver initialization failed");
                return Err(e.into());
            }
        };
        self.driver = Some(driver);
        self.signals.set_light(LightColor::Yellow);

        if self.config.ramp_policy == RampPolicy::OnStart {
            self.ramp_conveyor(stop)?;
        }

        self.state = LoopState::Running;
        Ok(())
    }

    /// Soft start the conveyor now. Only valid while `Running`.
    pub fn start_conveyor(&mut self, stop: &AtomicBool) -> Result<ConveyorStatus, InspectionError> {
        self.expect_state(LoopState::Running)?;
        self.ramp_conveyor(stop)
    }

    fn ramp_conveyor(&mut self, stop: &AtomicBool) -> Result<ConveyorStatus, InspectionError> {
        let Some(driver) = self.driver.as_mut() else {
            return Err(InspectionError::InvalidState {
                expected: LoopState::Running,
                actual: self.state,
            });
        };

        let sink = &mut self.sink;
        let ramp = run_ramp(driver, &self.config.ramp, stop, |step| sink.ramp_step(step))?;
        self.stats.ramps_run += 1;

        let (motor_current, encoder_position) = if ramp.completed() {
            let current = driver.read_current()?;
            let position = if self.config.wiring.has_encoder() {
                Some(driver.read_encoder()?)
            } else {
                None
            };
            (Some(current), position)
        } else {
            (None, None)
        };

        let status = ConveyorStatus {
            ramp,
            motor_current,
            encoder_position,
        };
        self.sink.conveyor_started(&status);
        Ok(status)
    }

    /// Process one raw line. Bytes that are not UTF-8 are a malformed record
    /// like any other: reported, counted and skipped.
    pub fn inspect_bytes(
        &mut self,
        line: &[u8],
        stop: &AtomicBool,
    ) -> Result<Option<QualityVerdict>, InspectionError> {
        let e = match std::str::from_utf8(line) {
            Ok(text) => return self.inspect_line(text, stop),
            Err(e) => e,
        };
        self.expect_state(LoopState::Running)?;
        self.stats.records_read += 1;
        let shown = String::from_utf8_lossy(line);
        self.sink.raw_line(&shown);
        self.stats.parse_errors += 1;
        self.sink.parse_error(
            &shown,
            &ParseError::Encoding {
                valid_up_to: e.valid_up_to(),
            },
        );
        Ok(None)
    }

    /// Process one line of the measurement stream.
    ///
    /// Returns `Ok(None)` for a malformed line, which is reported and skipped.
    pub fn inspect_line(
        &mut self,
        line: &str,
        stop: &AtomicBool,
    ) -> Result<Option<QualityVerdict>, InspectionError> {
        self.expect_state(LoopState::Running)?;
        self.stats.records_read += 1;
        self.sink.raw_line(line);

        let record = match line.parse::<MeasurementRecord>() {
            Ok(record) => record,
            Err(e) => {
                self.stats.parse_errors += 1;
                self.sink.parse_error(line, &e);
                return Ok(None);
            }
        };

        let verdict = self.classifier.classify(&record, self.timebase.now_utc());
        self.sink.verdict(&verdict);
        self.stats.processed += 1;

        if verdict.passed {
            self.stats.passed += 1;
            self.signals.set_light(LightColor::Green);
        } else {
            self.stats.failed += 1;
            self.signals.set_light(LightColor::Red);
            self.signals.schedule_reject(self.config.reject_delay);
        }

        if self.config.ramp_policy == RampPolicy::PerRecord {
            self.ramp_conveyor(stop)?;
        }

        Ok(Some(verdict))
    }

    /// Drain, release the device and terminate.
    pub fn shutdown(&mut self) -> Result<InspectionStats, InspectionError> {
        self.state = LoopState::Draining;
        info!(
            records_read = self.stats.records_read,
            processed = self.stats.processed,
            passed = self.stats.passed,
            failed = self.stats.failed,
            parse_errors = self.stats.parse_errors,
            ramps_run = self.stats.ramps_run,
            "Measurement stream drained"
        );

        let released = match self.driver.take() {
            Some(mut driver) => driver.release(),
            None => Ok(()),
        };
        self.state = LoopState::Terminated;
        released?;
        Ok(self.stats.clone())
    }

    fn terminate(&mut self) {
        if let Some(mut driver) = self.driver.take() {
            if let Err(e) = driver.release() {
                warn!(error = %e, "Failed to release register device");
            }
        }
        self.state = LoopState::Terminated;
    }

    fn expect_state(&self, expected: LoopState) -> Result<(), InspectionError> {
        if self.state == expected {
            Ok(())
        } else {
            Err(InspectionError::InvalidState {
                expected,
                actual: self.state,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::register_sim::SimulatedRegisters;
    use crate::signaling::RecordingSignals;
    use crate::sink::RecordingSink;

    fn config(policy: RampPolicy) -> InspectionConfig {
        InspectionConfig {
            ramp: RampConfig {
                step_count: 3,
                step_interval: Duration::ZERO,
                ..RampConfig::default()
            },
            ramp_policy: policy,
            ..InspectionConfig::new(50)
        }
    }

    fn line(
        bank: &SimulatedRegisters,
        policy: RampPolicy,
    ) -> InspectionLoop<SimulatedRegisters, RecordingSignals, RecordingSink> {
        InspectionLoop::new(
            Some(bank.clone()),
            config(policy),
            RecordingSignals::default(),
            RecordingSink::default(),
        )
    }

    #[test]
    fn lifecycle_walks_through_states() {
        let bank = SimulatedRegisters::new();
        let mut inspection = line(&bank, RampPolicy::Manual);
        let stop = AtomicBool::new(false);
        assert_eq!(inspection.state(), LoopState::Idle);

        inspection.initialize(&stop).unwrap();
        assert_eq!(inspection.state(), LoopState::Running);

        inspection.inspect_line("1 100 40", &stop).unwrap();
        assert_eq!(inspection.state(), LoopState::Running);

        let stats = inspection.shutdown().unwrap();
        assert_eq!(inspection.state(), LoopState::Terminated);
        assert_eq!(stats.processed, 1);
        assert_eq!(bank.release_count(), 1);
    }

    #[test]
    fn inspecting_before_initialize_is_rejected() {
        let mut inspection = line(&SimulatedRegisters::new(), RampPolicy::Manual);
        let err = inspection
            .inspect_line("1 2 3", &AtomicBool::new(false))
            .unwrap_err();
        assert!(matches!(
            err,
            InspectionError::InvalidState {
                expected: LoopState::Running,
                actual: LoopState::Idle
            }
        ));
    }

    #[test]
    fn signals_follow_verdicts() {
        let bank = SimulatedRegisters::new();
        let mut inspection = line(&bank, RampPolicy::Manual);
        let stop = AtomicBool::new(false);
        inspection.initialize(&stop).unwrap();
        inspection.inspect_line("1 100 40", &stop).unwrap();
        inspection.inspect_line("2 100 150", &stop).unwrap();

        let signals = inspection.signals();
        assert_eq!(
            signals.lights,
            vec![LightColor::Yellow, LightColor::Red, LightColor::Green]
        );
        assert_eq!(signals.rejects, vec![Duration::from_millis(1500)]);
    }

    #[test]
    fn on_start_policy_ramps_once() {
        let bank = SimulatedRegisters::new().with_register(0, 10);
        let mut inspection = line(&bank, RampPolicy::OnStart);
        let stop = AtomicBool::new(false);
        inspection.initialize(&stop).unwrap();
        inspection.inspect_line("1 1 1", &stop).unwrap();
        inspection.inspect_line("2 1 1", &stop).unwrap();

        assert_eq!(inspection.stats().ramps_run, 1);
        let starts = &inspection.sink().conveyor_starts;
        assert_eq!(starts.len(), 1);
        assert!(starts[0].ramp.completed());
        assert!((starts[0].motor_current.unwrap() - 37.596).abs() < 1e-9);
        assert_eq!(starts[0].encoder_position, None);
    }

    #[test]
    fn per_record_policy_ramps_every_record() {
        let bank = SimulatedRegisters::new();
        let mut inspection = line(&bank, RampPolicy::PerRecord);
        let stop = AtomicBool::new(false);
        inspection.initialize(&stop).unwrap();
        inspection.inspect_line("1 1 1", &stop).unwrap();
        inspection.inspect_line("bad", &stop).unwrap();
        inspection.inspect_line("2 1 1", &stop).unwrap();

        assert_eq!(inspection.stats().ramps_run, 2);
        assert_eq!(inspection.sink().ramp_steps.len(), 6);
    }

    #[test]
    fn encoder_wiring_samples_position_after_ramp() {
        let bank = SimulatedRegisters::new().with_register(7200, 42);
        let mut inspection = InspectionLoop::new(
            Some(bank.clone()),
            InspectionConfig {
                wiring: WiringMode::EncoderPresent,
                ..config(RampPolicy::Manual)
            },
            RecordingSignals::default(),
            RecordingSink::default(),
        );
        let stop = AtomicBool::new(false);
        inspection.initialize(&stop).unwrap();
        let status = inspection.start_conveyor(&stop).unwrap();
        assert_eq!(status.encoder_position, Some(42));
        assert_eq!(bank.writes_to(7104).last(), Some(&vec![0, 0]));
    }

    #[test]
    fn missing_device_terminates_during_initialization() {
        let mut inspection: InspectionLoop<SimulatedRegisters, _, _> = InspectionLoop::new(
            None,
            config(RampPolicy::OnStart),
            RecordingSignals::default(),
            RecordingSink::default(),
        );
        let err = inspection
            .run("1 2 3\n".as_bytes(), &AtomicBool::new(false))
            .unwrap_err();
        assert!(matches!(
            err,
            InspectionError::Driver(crate::error::DriverError::Configuration(_))
        ));
        assert_eq!(inspection.state(), LoopState::Terminated);
        assert!(inspection.signals().lights.is_empty());
    }
}
