use inspect_core::{DriverError, InspectionConfig, RampConfig, RampPolicy, WiringMode};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required argument <{0}>")]
    Missing(&'static str),
    #[error("option {0} requires a value")]
    MissingValue(&'static str),
    #[error("invalid value for {flag}: {value:?}")]
    InvalidValue { flag: &'static str, value: String },
    #[error("unexpected argument {0:?}")]
    Unexpected(String),
    #[error("invalid ramp: {0}")]
    Ramp(#[from] DriverError),
}

#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub show_help: bool,
    pub threshold: i64,
    pub modbus_addr: Option<String>,
    pub simulate: bool,
    pub wiring: WiringMode,
    /// `None` reads the measurement stream from stdin.
    pub input: Option<PathBuf>,
    pub ramp: RampConfig,
    pub ramp_per_record: bool,
    pub reject_delay: Duration,
    pub json_logs: bool,
    pub metrics_addr: Option<String>,
    pub audit_path: Option<PathBuf>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            show_help: false,
            threshold: 0,
            modbus_addr: None,
            simulate: false,
            wiring: WiringMode::EncoderAbsent,
            input: None,
            ramp: RampConfig::default(),
            ramp_per_record: false,
            reject_delay: Duration::from_millis(1500),
            json_logs: false,
            metrics_addr: None,
            audit_path: None,
        }
    }
}

fn value<'a>(args: &'a [String], i: &mut usize, flag: &'static str) -> Result<&'a str, ConfigError> {
    *i += 1;
    args.get(*i)
        .map(String::as_str)
        .ok_or(ConfigError::MissingValue(flag))
}

fn number<T: std::str::FromStr>(raw: &str, flag: &'static str) -> Result<T, ConfigError> {
    raw.parse().map_err(|_| ConfigError::InvalidValue {
        flag,
        value: raw.to_string(),
    })
}

impl RuntimeConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let args: Vec<String> = std::env::args().collect();
        Self::from_args(&args)
    }

    /// Parse process arguments. `args[0]` is the program name.
    pub fn from_args(args: &[String]) -> Result<Self, ConfigError> {
        let mut cfg = RuntimeConfig::default();
        let mut threshold: Option<i64> = None;
        let mut positional = 0;
        let mut i = 1;
        while i < args.len() {
            match args[i].as_str() {
                "--threshold" => {
                    threshold = Some(number(value(args, &mut i, "--threshold")?, "--threshold")?);
                }
                "--modbus" => {
                    cfg.modbus_addr = Some(value(args, &mut i, "--modbus")?.to_string());
                }
                "--simulate" => {
                    cfg.simulate = true;
                }
                "--encoder" => {
                    cfg.wiring = WiringMode::EncoderPresent;
                }
                "--input" => {
                    let path = value(args, &mut i, "--input")?;
                    cfg.input = (path != "-").then(|| PathBuf::from(path));
                }
                "--ramp-steps" => {
                    cfg.ramp.step_count = number(value(args, &mut i, "--ramp-steps")?, "--ramp-steps")?;
                }
                "--ramp-interval-ms" => {
                    let ms: u64 = number(
                        value(args, &mut i, "--ramp-interval-ms")?,
                        "--ramp-interval-ms",
                    )?;
                    cfg.ramp.step_interval = Duration::from_millis(ms);
                }
                "--ramp-per-record" => {
                    cfg.ramp_per_record = true;
                }
                "--reject-delay-ms" => {
                    let ms: u64 = number(
                        value(args, &mut i, "--reject-delay-ms")?,
                        "--reject-delay-ms",
                    )?;
                    cfg.reject_delay = Duration::from_millis(ms);
                }
                "--json-logs" => {
                    cfg.json_logs = true;
                }
                "--metrics-addr" => {
                    cfg.metrics_addr = Some(value(args, &mut i, "--metrics-addr")?.to_string());
                }
                "--audit-log" => {
                    cfg.audit_path = Some(PathBuf::from(value(args, &mut i, "--audit-log")?));
                }
                "--help" | "-h" => {
                    cfg.show_help = true;
                    return Ok(cfg);
                }
                flag if flag.starts_with("--") => {
                    return Err(ConfigError::Unexpected(flag.to_string()));
                }
                arg => {
                    match positional {
                        0 => threshold = Some(number(arg, "<THRESHOLD>")?),
                        1 => cfg.modbus_addr = Some(arg.to_string()),
                        _ => return Err(ConfigError::Unexpected(arg.to_string())),
                    }
                    positional += 1;
                }
            }
            i += 1;
        }

        cfg.threshold = threshold.ok_or(ConfigError::Missing("THRESHOLD"))?;
        cfg.ramp.validate()?;
        Ok(cfg)
    }

    /// True when no real device is configured or simulation was forced.
    pub fn uses_simulation(&self) -> bool {
        self.simulate || self.modbus_addr.is_none()
    }

    pub fn inspection(&self) -> InspectionConfig {
        InspectionConfig {
            threshold: self.threshold,
            wiring: self.wiring,
            ramp: self.ramp.clone(),
            ramp_policy: if self.ramp_per_record {
                RampPolicy::PerRecord
            } else {
                RampPolicy::OnStart
            },
            reject_delay: self.reject_delay,
        }
    }

    pub fn print_help() {
        println!(
            r#"laser-fence - Inline optical inspection controller

USAGE:
    laser-fence <THRESHOLD> [ADDR] [OPTIONS]

ARGS:
    <THRESHOLD>               Pass/fail threshold; items scoring above it fail
    [ADDR]                    Modbus TCP address of the DAQ device (same as --modbus)

OPTIONS:
    --threshold <N>           Pass/fail threshold (alternative to the positional form)
    --modbus <ADDR>           Connect to the DAQ device via Modbus TCP (e.g. 192.168.1.209:502)
    --simulate                Use an in-memory register bank instead of hardware
    --encoder                 Motor has a quadrature encoder wired to the device
    --input <PATH>            Read measurements from a file instead of stdin ("-" = stdin)
    --ramp-steps <N>          Soft-start ramp steps [default: 65]
    --ramp-interval-ms <MS>   Delay between ramp steps [default: 300]
    --ramp-per-record         Re-run the soft-start ramp after every item (legacy)
    --reject-delay-ms <MS>    Transit time from inspection point to reject arm [default: 1500]
    --json-logs               Output logs in JSON format (for log aggregation)
    --metrics-addr <ADDR>     Enable Prometheus metrics server on address (e.g., 0.0.0.0:9090)
    --audit-log <PATH>        Append verdicts and lifecycle events to a JSONL file
    -h, --help                Print this help message

INPUT:
    One item per line: "<sequence_id> <frame_sum_before> <frame_sum_after>".
    Lines are echoed to stdout; logs go to stderr.

ENVIRONMENT VARIABLES:
    RUST_LOG                  Set log filter (e.g., RUST_LOG=debug,inspect_core=trace)

EXAMPLES:
    # Camera pipeline feeding a real device
    lfcamapp 210 10 240 500 | laser-fence 999 192.168.1.209:502

    # Dry run against recorded measurements
    laser-fence 50 --simulate --input measurements.txt --ramp-interval-ms 0
"#
        );
    }
}
