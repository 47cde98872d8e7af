use crate::infra::audit::{AuditEventType, AuditLogger, ShutdownDetails};
use crate::integrations::{LineSink, LoggedSignals};
use crate::runtime::config::RuntimeConfig;
use crate::runtime::logging::init_tracing;
use crate::runtime::telemetry;
use inspect_core::{InspectionLoop, RegisterError, RegisterIo, SimulatedRegisters, TimeBase};
use line_io::ModbusRegisters;
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

enum LineRegisters {
    Simulated(SimulatedRegisters),
    Modbus(ModbusRegisters),
}

impl RegisterIo for LineRegisters {
    fn write_register(&mut self, address: u16, value: u16) -> Result<(), RegisterError> {
        match self {
            Self::Simulated(r) => r.write_register(address, value),
            Self::Modbus(r) => r.write_register(address, value),
        }
    }

    fn write_registers(&mut self, address: u16, values: &[u16]) -> Result<(), RegisterError> {
        match self {
            Self::Simulated(r) => r.write_registers(address, values),
            Self::Modbus(r) => r.write_registers(address, values),
        }
    }

    fn read_register(&mut self, address: u16) -> Result<u16, RegisterError> {
        match self {
            Self::Simulated(r) => r.read_register(address),
            Self::Modbus(r) => r.read_register(address),
        }
    }

    fn release(&mut self) -> Result<(), RegisterError> {
        match self {
            Self::Simulated(r) => r.release(),
            Self::Modbus(r) => r.release(),
        }
    }
}

pub fn run_from_args() -> ExitCode {
    let config = match RuntimeConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: {e}");
            eprintln!("Run with --help for usage.");
            return ExitCode::from(2);
        }
    };
    if config.show_help {
        RuntimeConfig::print_help();
        return ExitCode::SUCCESS;
    }
    run(config)
}

pub fn run(config: RuntimeConfig) -> ExitCode {
    let _log_guard = init_tracing(config.json_logs);

    telemetry::init();
    let metrics_enabled = config.metrics_addr.is_some();
    let _metrics_handle = telemetry::start_metrics_server(&config.metrics_addr);

    let timebase = TimeBase::new();

    let audit_logger = match init_audit_logger(config.audit_path.as_ref()) {
        Ok(logger) => logger,
        Err(e) => {
            error!(error = %e, "Audit logging requested but failed to initialize");
            return ExitCode::FAILURE;
        }
    };

    if let Some(ref logger) = audit_logger {
        let _ = logger.log_event(
            timebase.now_us(),
            timebase.unix_us(),
            AuditEventType::SystemStart,
            serde_json::json!({
                "version": env!("CARGO_PKG_VERSION"),
                "started_at": timebase.started_at(),
                "threshold": config.threshold,
                "simulated": config.uses_simulation(),
                "wiring": format!("{:?}", config.wiring),
                "metrics_enabled": metrics_enabled,
            }),
        );
    }

    let stop = Arc::new(AtomicBool::new(false));
    let stop_handler = Arc::clone(&stop);
    if let Err(e) = ctrlc::set_handler(move || stop_handler.store(true, Ordering::Relaxed)) {
        warn!(error = %e, "Failed to install Ctrl-C handler");
    }

    let input = match open_input(config.input.as_ref()) {
        Ok(input) => input,
        Err(e) => {
            error!(error = %e, "Failed to open measurement input");
            return ExitCode::FAILURE;
        }
    };

    debug!("\n{}", config.wiring.wiring_description());

    let registers = open_registers(&config);
    let sink = LineSink::stdout(audit_logger.clone(), timebase);
    let mut inspection =
        InspectionLoop::new(registers, config.inspection(), LoggedSignals::default(), sink);

    info!(
        threshold = config.threshold,
        ramp_steps = config.ramp.step_count,
        ramp_interval_ms = config.ramp.step_interval.as_millis() as u64,
        ramp_duration_ms = config.ramp.duration().as_millis() as u64,
        per_record_ramp = config.ramp_per_record,
        "Starting inspection line"
    );

    match inspection.run(input, &stop) {
        Ok(stats) => {
            info!(
                records_read = stats.records_read,
                processed = stats.processed,
                passed = stats.passed,
                failed = stats.failed,
                parse_errors = stats.parse_errors,
                rejects = inspection.signals().rejects(),
                light = ?inspection.signals().current(),
                "Run complete"
            );
            if let Some(ref logger) = audit_logger {
                let details = serde_json::to_value(ShutdownDetails { stats: &stats })
                    .unwrap_or_default();
                let _ = logger.log_event(
                    timebase.now_us(),
                    timebase.unix_us(),
                    AuditEventType::SystemShutdown,
                    details,
                );
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %e, state = ?inspection.state(), "Inspection line stopped");
            if let Some(ref logger) = audit_logger {
                let _ = logger.log_event(
                    timebase.now_us(),
                    timebase.unix_us(),
                    AuditEventType::FatalError,
                    serde_json::json!({
                        "error": e.to_string(),
                        "register_error": e.is_io(),
                        "processed": inspection.stats().processed,
                    }),
                );
            }
            ExitCode::FAILURE
        }
    }
}

/// `None` leaves the loop without a device; it then fails with a
/// configuration error before touching the conveyor.
fn open_registers(config: &RuntimeConfig) -> Option<LineRegisters> {
    if config.uses_simulation() {
        info!("Using simulated register bank");
        return Some(LineRegisters::Simulated(SimulatedRegisters::new()));
    }
    let addr = config.modbus_addr.as_deref()?;
    info!(addr = %addr, "Connecting to DAQ device over Modbus TCP");
    match ModbusRegisters::connect(addr) {
        Ok(registers) => {
            info!(peer = %registers.target(), "Register device ready");
            Some(LineRegisters::Modbus(registers))
        }
        Err(e) => {
            error!(error = %e, "Could not open register device");
            None
        }
    }
}

fn open_input(path: Option<&PathBuf>) -> io::Result<Box<dyn BufRead + Send>> {
    match path {
        Some(path) => {
            info!(path = %path.display(), "Reading measurements from file");
            Ok(Box::new(BufReader::new(File::open(path)?)))
        }
        None => Ok(Box::new(BufReader::new(io::stdin()))),
    }
}

fn init_audit_logger(audit_path: Option<&PathBuf>) -> io::Result<Option<Arc<AuditLogger>>> {
    let Some(path) = audit_path else {
        return Ok(None);
    };
    let logger = AuditLogger::new(path)?;
    info!(path = %path.display(), "Audit logging enabled");
    Ok(Some(Arc::new(logger)))
}
