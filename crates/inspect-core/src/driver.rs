//! Conveyor motor driver.
//!
//! Maps motor intents onto the register interface of a DAQ device wired to a
//! brushed DC motor controller: one PWM timer for drive strength, two digital
//! lines for enable and direction, one analog line for current sense and, when
//! wired, a quadrature encoder counter.

use crate::error::DriverError;
use crate::register::RegisterIo;
use tracing::{debug, info, warn};

/// Register addresses and encodings of the device.
pub mod map {
    pub const TIMER_CLOCK_BASE: u16 = 7000;
    pub const TIMER_CLOCK_DIVISOR: u16 = 7002;
    pub const TIMER_PIN_OFFSET: u16 = 50500;
    pub const TIMER_COUNT: u16 = 50501;
    /// Timer configuration block: `[mode, value]` per timer.
    pub const TIMER_CONFIG: u16 = 7100;
    /// Timer 2 `[mode, value]` pair, the PWM channel when an encoder occupies timers 0/1.
    pub const TIMER2_CONFIG: u16 = 7104;
    pub const ENCODER_POSITION: u16 = 7200;
    /// Digital line `n` state lives at `DIGITAL_STATE_BASE + n`.
    pub const DIGITAL_STATE_BASE: u16 = 6000;
    /// Analog input `n` lives at `ANALOG_INPUT_BASE + n`.
    pub const ANALOG_INPUT_BASE: u16 = 0;

    pub const TIMER_MODE_PWM16: u16 = 0;
    pub const TIMER_MODE_QUADRATURE: u16 = 8;

    /// Raw PWM value for 0 % duty. Raw 0 is 100 %.
    pub const PWM_FULL_SCALE: u16 = 65535;
}

/// Calibrated current per raw unit on the current-sense line.
pub const CURRENT_SCALE: f64 = 3.7596;

const CURRENT_SENSE_LINE: u16 = 0;

const WIRING_WITHOUT_ENCODER: &str = "\
Motor controller -> DAQ device
IN1 -> FIO1
IN2 -> FIO0
EN  -> FIO2
GND -> GND
CS  -> AIN0
";

const WIRING_WITH_ENCODER: &str = "\
Motor controller -> DAQ device
IN1      -> EIO1
IN2      -> FIO2
EN       -> EIO0
GND      -> GND
CS       -> AIN0

Encoder1 -> FIO0
Encoder2 -> FIO2
Power    -> VS
GND      -> GND
";

/// Whether a quadrature encoder is electrically present.
///
/// Fixed for the lifetime of a driver: it decides which lines carry enable and
/// direction and which timer drives the PWM output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WiringMode {
    #[default]
    EncoderAbsent,
    EncoderPresent,
}

impl WiringMode {
    pub fn has_encoder(self) -> bool {
        matches!(self, Self::EncoderPresent)
    }

    pub fn direction_line(self) -> u16 {
        match self {
            Self::EncoderAbsent => 1,
            Self::EncoderPresent => 9,
        }
    }

    pub fn enable_line(self) -> u16 {
        match self {
            Self::EncoderAbsent => 2,
            Self::EncoderPresent => 8,
        }
    }

    /// Register taking the `[mode, raw]` pair of the PWM timer.
    pub fn duty_register(self) -> u16 {
        match self {
            Self::EncoderAbsent => map::TIMER_CONFIG,
            Self::EncoderPresent => map::TIMER2_CONFIG,
        }
    }

    /// Pin table describing how the motor controller is wired for this mode.
    pub fn wiring_description(self) -> &'static str {
        match self {
            Self::EncoderAbsent => WIRING_WITHOUT_ENCODER,
            Self::EncoderPresent => WIRING_WITH_ENCODER,
        }
    }
}

/// Last commanded motor state. Not read back from hardware.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MotorState {
    pub enabled: bool,
    pub direction_high: bool,
    /// Always within `[0, 1]`.
    pub duty_cycle: f64,
}

/// Raw timer value commanding `fraction` duty.
pub fn duty_to_raw(fraction: f64) -> u16 {
    (f64::from(map::PWM_FULL_SCALE) * (1.0 - fraction)).round() as u16
}

/// Duty fraction corresponding to a raw timer value.
pub fn raw_to_duty(raw: u16) -> f64 {
    f64::from(map::PWM_FULL_SCALE - raw) / f64::from(map::PWM_FULL_SCALE)
}

/// Owns the register device and the motor state for the lifetime of a run.
///
/// The device is released exactly once: through [`ActuatorDriver::release`]
/// or, failing that, when the driver is dropped.
pub struct ActuatorDriver<IO: RegisterIo> {
    io: IO,
    wiring: WiringMode,
    state: MotorState,
    released: bool,
}

impl<IO: RegisterIo> ActuatorDriver<IO> {
    /// Configure the device for `wiring` and raise enable and direction.
    ///
    /// Timer and clock configuration is written before anything touches the
    /// PWM value. If any write fails the device is released before returning.
    pub fn new(io: IO, wiring: WiringMode) -> Result<Self, DriverError> {
        let mut driver = Self {
            io,
            wiring,
            state: MotorState {
                enabled: false,
                direction_high: false,
                duty_cycle: 0.0,
            },
            released: false,
        };
        driver.configure()?;
        Ok(driver)
    }

    /// Like [`ActuatorDriver::new`], for a device handle that may be missing.
    pub fn from_handle(io: Option<IO>, wiring: WiringMode) -> Result<Self, DriverError> {
        match io {
            Some(io) => Self::new(io, wiring),
            None => Err(DriverError::Configuration(
                "no register device handle supplied".to_string(),
            )),
        }
    }

    fn configure(&mut self) -> Result<(), DriverError> {
        debug!(wiring = ?self.wiring, "Configuring timers and digital lines");

        self.io.write_register(map::TIMER_CLOCK_BASE, 1)?;
        self.io.write_register(map::TIMER_CLOCK_DIVISOR, 1)?;

        match self.wiring {
            WiringMode::EncoderPresent => {
                self.io.write_register(map::TIMER_COUNT, 3)?;
                self.io.write_registers(
                    map::TIMER_CONFIG,
                    &[
                        map::TIMER_MODE_QUADRATURE,
                        0,
                        map::TIMER_MODE_QUADRATURE,
                        0,
                        map::TIMER_MODE_PWM16,
                        map::PWM_FULL_SCALE,
                    ],
                )?;
            }
            WiringMode::EncoderAbsent => {
                self.io.write_register(map::TIMER_PIN_OFFSET, 0)?;
                self.io.write_register(map::TIMER_COUNT, 1)?;
                self.io.write_registers(
                    map::TIMER_CONFIG,
                    &[map::TIMER_MODE_PWM16, map::PWM_FULL_SCALE],
                )?;
            }
        }

        self.write_line(self.wiring.enable_line(), true)?;
        self.write_line(self.wiring.direction_line(), true)?;
        self.state = MotorState {
            enabled: true,
            direction_high: true,
            duty_cycle: 0.0,
        };

        info!(
            wiring = ?self.wiring,
            enable_line = self.wiring.enable_line(),
            direction_line = self.wiring.direction_line(),
            "Actuator driver ready"
        );
        Ok(())
    }

    fn write_line(&mut self, line: u16, high: bool) -> Result<(), DriverError> {
        self.io
            .write_register(map::DIGITAL_STATE_BASE + line, u16::from(high))?;
        Ok(())
    }

    /// Command `fraction` duty and return the raw timer value written.
    ///
    /// Out-of-range (or NaN) fractions are rejected before any register is
    /// touched. A stopped motor is re-enabled.
    pub fn set_duty_cycle(&mut self, fraction: f64) -> Result<u16, DriverError> {
        if !(0.0..=1.0).contains(&fraction) {
            return Err(DriverError::InvalidParameter {
                name: "duty_cycle",
                value: fraction,
            });
        }

        let raw = duty_to_raw(fraction);
        self.io.write_registers(
            self.wiring.duty_register(),
            &[map::TIMER_MODE_PWM16, raw],
        )?;
        self.state.duty_cycle = fraction;

        if !self.state.enabled {
            self.write_line(self.wiring.enable_line(), true)?;
            self.state.enabled = true;
            debug!("Motor re-enabled by duty cycle command");
        }
        Ok(raw)
    }

    /// Drop the enable line. The commanded duty cycle is kept.
    pub fn stop(&mut self) -> Result<(), DriverError> {
        self.write_line(self.wiring.enable_line(), false)?;
        self.state.enabled = false;
        Ok(())
    }

    pub fn toggle_direction(&mut self) -> Result<(), DriverError> {
        let direction_high = !self.state.direction_high;
        self.write_line(self.wiring.direction_line(), direction_high)?;
        self.state.direction_high = direction_high;
        Ok(())
    }

    /// Sample the current-sense line, scaled to amps.
    pub fn read_current(&mut self) -> Result<f64, DriverError> {
        let raw = self
            .io
            .read_register(map::ANALOG_INPUT_BASE + CURRENT_SENSE_LINE)?;
        Ok(f64::from(raw) * CURRENT_SCALE)
    }

    /// Raw quadrature position. Only valid with [`WiringMode::EncoderPresent`].
    pub fn read_encoder(&mut self) -> Result<u16, DriverError> {
        if !self.wiring.has_encoder() {
            return Err(DriverError::UnsupportedOperation(
                "cannot read the quadrature encoder when it is not wired",
            ));
        }
        Ok(self.io.read_register(map::ENCODER_POSITION)?)
    }

    pub fn state(&self) -> MotorState {
        self.state
    }

    pub fn wiring_mode(&self) -> WiringMode {
        self.wiring
    }

    pub fn wiring_description(&self) -> &'static str {
        self.wiring.wiring_description()
    }

    /// Release the register device. Later calls are no-ops.
    pub fn release(&mut self) -> Result<(), DriverError> {
        if self.released {
            return Ok(());
        }
        self.released = true;
        self.io.release()?;
        info!("Register device released");
        Ok(())
    }
}

impl<IO: RegisterIo> Drop for ActuatorDriver<IO> {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        if let Err(e) = self.io.release() {
            warn!(error = %e, "Failed to release register device on drop");
        }
    }
}
