use crate::inspection::LoopState;
use thiserror::Error;

/// Which kind of register access failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterOp {
    Read,
    Write,
}

impl std::fmt::Display for RegisterOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Read => f.write_str("read"),
            Self::Write => f.write_str("write"),
        }
    }
}

/// Failure of a single access through a [`RegisterIo`](crate::RegisterIo) capability.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegisterError {
    #[error("failed to connect to register device at {target}: {reason}")]
    Connect { target: String, reason: String },
    #[error("register {op} at address {address} failed: {reason}")]
    Transport {
        op: RegisterOp,
        address: u16,
        reason: String,
    },
    #[error("failed to disconnect from register device: {reason}")]
    Disconnect { reason: String },
    #[error("register device has already been released")]
    Released,
}

/// Errors raised by the actuator driver and the ramp built on it.
///
/// Callers are expected to branch on the variant: only `Io` is a transport
/// condition, the others are configuration or programming mistakes.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DriverError {
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("invalid parameter {name}: {value}")]
    InvalidParameter { name: &'static str, value: f64 },
    #[error("unsupported operation: {0}")]
    UnsupportedOperation(&'static str),
    #[error(transparent)]
    Io(#[from] RegisterError),
}

/// A measurement line that could not be turned into a record.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("expected 3 fields, found {found}")]
    FieldCount { found: usize },
    #[error("field {field} is not an integer: {value:?}")]
    InvalidField { field: &'static str, value: String },
    #[error("line is not valid UTF-8 (bad byte at offset {valid_up_to})")]
    Encoding { valid_up_to: usize },
}

/// Terminal failure of the inspection loop.
#[derive(Debug, Error)]
pub enum InspectionError {
    #[error(transparent)]
    Driver(#[from] DriverError),
    #[error("failed to read measurement stream: {0}")]
    Input(#[from] std::io::Error),
    #[error("operation requires state {expected:?}, loop is {actual:?}")]
    InvalidState {
        expected: LoopState,
        actual: LoopState,
    },
}

impl InspectionError {
    /// True when the failure came from the register transport.
    pub fn is_io(&self) -> bool {
        matches!(self, Self::Driver(DriverError::Io(_)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_error_names_the_access() {
        let err = RegisterError::Transport {
            op: RegisterOp::Write,
            address: 7100,
            reason: "timed out".to_string(),
        };
        assert_eq!(err.to_string(), "register write at address 7100 failed: timed out");
    }

    #[test]
    fn disconnect_error_has_no_register_address() {
        let err = RegisterError::Disconnect {
            reason: "broken pipe".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "failed to disconnect from register device: broken pipe"
        );
    }
}
