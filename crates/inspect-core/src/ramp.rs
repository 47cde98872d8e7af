//! Soft-start duty-cycle ramp for the conveyor motor.

use crate::driver::{map, raw_to_duty, ActuatorDriver};
use crate::error::DriverError;
use crate::register::RegisterIo;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Longest uninterrupted sleep while waiting out a step interval.
pub(crate) const STOP_POLL_SLICE: Duration = Duration::from_millis(50);

#[derive(Clone, Debug, PartialEq)]
pub struct RampConfig {
    pub step_count: u32,
    pub step_interval: Duration,
    /// Raw timer value of step 0.
    pub base_raw: u16,
    /// Raw decrement per step.
    pub raw_step: u16,
}

impl Default for RampConfig {
    fn default() -> Self {
        Self {
            step_count: 65,
            step_interval: Duration::from_millis(300),
            base_raw: map::PWM_FULL_SCALE,
            raw_step: 1000,
        }
    }
}

impl RampConfig {
    /// Reject ramps that are empty, flat, or would run the raw value below zero.
    pub fn validate(&self) -> Result<(), DriverError> {
        if self.step_count == 0 {
            return Err(DriverError::InvalidParameter {
                name: "ramp.step_count",
                value: 0.0,
            });
        }
        if self.raw_step == 0 {
            return Err(DriverError::InvalidParameter {
                name: "ramp.raw_step",
                value: 0.0,
            });
        }
        let span = u64::from(self.step_count - 1) * u64::from(self.raw_step);
        if span > u64::from(self.base_raw) {
            return Err(DriverError::InvalidParameter {
                name: "ramp.step_count",
                value: f64::from(self.step_count),
            });
        }
        Ok(())
    }

    /// Raw value commanded at step `index`.
    pub fn raw_at(&self, index: u32) -> u16 {
        let drop = u64::from(index) * u64::from(self.raw_step);
        u64::from(self.base_raw).saturating_sub(drop) as u16
    }

    /// Wall-clock time a full ramp blocks for.
    pub fn duration(&self) -> Duration {
        self.step_interval * self.step_count
    }
}

/// One commanded step of a ramp.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RampStep {
    pub index: u32,
    pub commanded_raw: u16,
    pub duty_cycle_pct: f64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RampOutcome {
    /// All steps ran and the terminal 100 % command was issued.
    Completed,
    /// The stop flag was raised; the motor was stopped after `completed_steps`.
    Cancelled { completed_steps: u32 },
}

#[derive(Clone, Debug, PartialEq)]
pub struct RampReport {
    pub steps: Vec<RampStep>,
    pub outcome: RampOutcome,
}

impl RampReport {
    pub fn completed(&self) -> bool {
        self.outcome == RampOutcome::Completed
    }
}

/// Drive the motor from `base_raw` toward full duty, one step per interval,
/// then command 100 % duty.
///
/// Blocks for `step_count * step_interval`. `stop` is polled between steps
/// and during each interval; when it is raised the motor is stopped and the
/// ramp returns [`RampOutcome::Cancelled`]. `on_step` sees every step after
/// it has been written.
pub fn run_ramp<IO, F>(
    driver: &mut ActuatorDriver<IO>,
    config: &RampConfig,
    stop: &AtomicBool,
    mut on_step: F,
) -> Result<RampReport, DriverError>
where
    IO: RegisterIo,
    F: FnMut(&RampStep),
{
    config.validate()?;
    debug!(
        step_count = config.step_count,
        step_interval_ms = config.step_interval.as_millis() as u64,
        "Starting duty cycle ramp"
    );

    let mut steps = Vec::with_capacity(config.step_count as usize);
    for index in 0..config.step_count {
        if stop.load(Ordering::Relaxed) {
            return cancel(driver, steps);
        }

        let fraction = raw_to_duty(config.raw_at(index));
        let commanded_raw = driver.set_duty_cycle(fraction)?;
        let step = RampStep {
            index,
            commanded_raw,
            duty_cycle_pct: fraction * 100.0,
        };
        on_step(&step);
        steps.push(step);

        if sleep_unless_stopped(config.step_interval, stop) {
            return cancel(driver, steps);
        }
    }

    driver.set_duty_cycle(1.0)?;
    info!(steps = steps.len(), "Duty cycle = 100%");
    Ok(RampReport {
        steps,
        outcome: RampOutcome::Completed,
    })
}

fn cancel<IO: RegisterIo>(
    driver: &mut ActuatorDriver<IO>,
    steps: Vec<RampStep>,
) -> Result<RampReport, DriverError> {
    driver.stop()?;
    let completed_steps = steps.len() as u32;
    info!(completed_steps, "Ramp cancelled, motor stopped");
    Ok(RampReport {
        steps,
        outcome: RampOutcome::Cancelled { completed_steps },
    })
}

/// Sleep for `interval`, waking at least every [`STOP_POLL_SLICE`] to check
/// `stop`. Returns true if the flag was raised.
fn sleep_unless_stopped(interval: Duration, stop: &AtomicBool) -> bool {
    let deadline = Instant::now() + interval;
    loop {
        if stop.load(Ordering::Relaxed) {
            return true;
        }
        let now = Instant::now();
        if now >= deadline {
            return false;
        }
        thread::sleep((deadline - now).min(STOP_POLL_SLICE));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::WiringMode;
    use crate::register_sim::SimulatedRegisters;
    use std::sync::Arc;

    fn fast(step_count: u32) -> RampConfig {
        RampConfig {
            step_count,
            step_interval: Duration::from_millis(2),
            ..RampConfig::default()
        }
    }

    #[test]
    fn canonical_ramp_is_valid_and_ends_above_zero() {
        let config = RampConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.raw_at(0), 65535);
        assert_eq!(config.raw_at(64), 1535);
        assert_eq!(config.duration(), Duration::from_millis(19_500));
    }

    #[test]
    fn rejects_ramps_that_would_go_negative() {
        let config = RampConfig {
            step_count: 67,
            ..RampConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(DriverError::InvalidParameter { .. })
        ));
        assert!(fast(0).validate().is_err());
    }

    #[test]
    fn writes_each_step_then_full_duty() {
        let bank = SimulatedRegisters::new();
        let mut driver = ActuatorDriver::new(bank.clone(), WiringMode::EncoderAbsent).unwrap();
        bank.clear_writes();

        let stop = AtomicBool::new(false);
        let mut seen = Vec::new();
        let report = run_ramp(&mut driver, &fast(5), &stop, |s| seen.push(s.index)).unwrap();

        assert!(report.completed());
        assert_eq!(seen, vec![0, 1, 2, 3, 4]);
        assert_eq!(
            bank.writes_to(7100),
            vec![
                vec![0, 65535],
                vec![0, 64535],
                vec![0, 63535],
                vec![0, 62535],
                vec![0, 61535],
                vec![0, 0],
            ]
        );
        let raws: Vec<u16> = report.steps.iter().map(|s| s.commanded_raw).collect();
        assert_eq!(raws, vec![65535, 64535, 63535, 62535, 61535]);
        assert_eq!(driver.state().duty_cycle, 1.0);
    }

    #[test]
    fn percentages_strictly_increase() {
        let mut driver =
            ActuatorDriver::new(SimulatedRegisters::new(), WiringMode::EncoderPresent).unwrap();
        let stop = AtomicBool::new(false);
        let config = RampConfig {
            step_interval: Duration::ZERO,
            ..RampConfig::default()
        };
        let report = run_ramp(&mut driver, &config, &stop, |_| {}).unwrap();
        assert_eq!(report.steps.len(), 65);
        assert!(report
            .steps
            .windows(2)
            .all(|w| w[1].duty_cycle_pct > w[0].duty_cycle_pct));
    }

    #[test]
    fn blocks_for_step_count_intervals() {
        let mut driver =
            ActuatorDriver::new(SimulatedRegisters::new(), WiringMode::EncoderAbsent).unwrap();
        let stop = AtomicBool::new(false);
        let config = RampConfig {
            step_count: 4,
            step_interval: Duration::from_millis(25),
            ..RampConfig::default()
        };
        let started = Instant::now();
        run_ramp(&mut driver, &config, &stop, |_| {}).unwrap();
        assert!(started.elapsed() >= Duration::from_millis(100));
    }

    #[test]
    fn raised_stop_flag_cancels_and_stops_motor() {
        let bank = SimulatedRegisters::new();
        let mut driver = ActuatorDriver::new(bank.clone(), WiringMode::EncoderAbsent).unwrap();
        let stop = Arc::new(AtomicBool::new(false));
        let config = RampConfig {
            step_count: 10,
            step_interval: Duration::from_secs(5),
            ..RampConfig::default()
        };

        let flag = Arc::clone(&stop);
        let raiser = thread::spawn(move || {
            thread::sleep(Duration::from_millis(30));
            flag.store(true, Ordering::Relaxed);
        });

        let started = Instant::now();
        let report = run_ramp(&mut driver, &config, &stop, |_| {}).unwrap();
        raiser.join().unwrap();

        assert_eq!(report.outcome, RampOutcome::Cancelled { completed_steps: 1 });
        assert!(started.elapsed() < Duration::from_secs(2));
        assert!(!driver.state().enabled);
        assert_eq!(bank.register(6002), Some(0));
    }

    #[test]
    fn transport_failure_mid_ramp_propagates() {
        let bank = SimulatedRegisters::new();
        let mut driver = ActuatorDriver::new(bank.clone(), WiringMode::EncoderAbsent).unwrap();
        // 7 configuration writes already happened; allow 2 ramp steps.
        let bank = bank.fail_after(9);
        let stop = AtomicBool::new(false);
        let err = run_ramp(&mut driver, &fast(5), &stop, |_| {}).unwrap_err();
        assert!(matches!(err, DriverError::Io(_)));
        assert_eq!(bank.writes_to(7100).len(), 3);
    }
}
