pub mod metrics;
pub mod modbus;

pub use metrics::{init_metrics, render_metrics, serve_metrics};
pub use modbus::ModbusRegisters;
