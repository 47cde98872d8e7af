//! Register access over Modbus TCP.
//!
//! The inspection loop is synchronous, so each access is driven to completion
//! on a private current-thread runtime before the call returns.

use inspect_core::{RegisterError, RegisterIo, RegisterOp};
use std::io;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::runtime::{Builder, Runtime};
use tokio::time::{error::Elapsed, timeout};
use tokio_modbus::client::Context;
use tokio_modbus::prelude::*;
use tracing::{debug, info};

const DEFAULT_IO_TIMEOUT: Duration = Duration::from_secs(2);

pub struct ModbusRegisters {
    runtime: Runtime,
    ctx: Option<Context>,
    target: SocketAddr,
    io_timeout: Duration,
}

impl ModbusRegisters {
    pub fn connect(addr: &str) -> Result<Self, RegisterError> {
        Self::connect_with_timeout(addr, DEFAULT_IO_TIMEOUT)
    }

    /// Connect to `addr` (`host:port`). Every later access is bounded by `io_timeout`.
    pub fn connect_with_timeout(addr: &str, io_timeout: Duration) -> Result<Self, RegisterError> {
        let connect_error = |reason: String| RegisterError::Connect {
            target: addr.to_string(),
            reason,
        };

        let target: SocketAddr = addr
            .parse()
            .map_err(|e: std::net::AddrParseError| connect_error(e.to_string()))?;
        let runtime = Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| connect_error(e.to_string()))?;

        let ctx = runtime
            .block_on(async { timeout(io_timeout, tcp::connect(target)).await })
            .map_err(|_| connect_error("connection timed out".to_string()))?
            .map_err(|e| connect_error(e.to_string()))?;

        info!(peer = %target, "Connected to Modbus TCP");
        Ok(Self {
            runtime,
            ctx: Some(ctx),
            target,
            io_timeout,
        })
    }

    pub fn target(&self) -> SocketAddr {
        self.target
    }
}

fn settle<T>(
    result: Result<io::Result<T>, Elapsed>,
    op: RegisterOp,
    address: u16,
) -> Result<T, RegisterError> {
    match result {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(RegisterError::Transport {
            op,
            address,
            reason: e.to_string(),
        }),
        Err(_) => Err(RegisterError::Transport {
            op,
            address,
            reason: "timed out".to_string(),
        }),
    }
}

impl RegisterIo for ModbusRegisters {
    fn write_register(&mut self, address: u16, value: u16) -> Result<(), RegisterError> {
        let io_timeout = self.io_timeout;
        let ctx = self.ctx.as_mut().ok_or(RegisterError::Released)?;
        let result = self.runtime.block_on(async move {
            timeout(io_timeout, ctx.write_single_register(address, value)).await
        });
        settle(result, RegisterOp::Write, address)
    }

    fn write_registers(&mut self, address: u16, values: &[u16]) -> Result<(), RegisterError> {
        let io_timeout = self.io_timeout;
        let ctx = self.ctx.as_mut().ok_or(RegisterError::Released)?;
        let result = self.runtime.block_on(async move {
            timeout(io_timeout, ctx.write_multiple_registers(address, values)).await
        });
        settle(result, RegisterOp::Write, address)
    }

    fn read_register(&mut self, address: u16) -> Result<u16, RegisterError> {
        let io_timeout = self.io_timeout;
        let ctx = self.ctx.as_mut().ok_or(RegisterError::Released)?;
        let result = self.runtime.block_on(async move {
            timeout(io_timeout, ctx.read_holding_registers(address, 1)).await
        });
        let words = settle(result, RegisterOp::Read, address)?;
        words
            .first()
            .copied()
            .ok_or_else(|| RegisterError::Transport {
                op: RegisterOp::Read,
                address,
                reason: "empty response".to_string(),
            })
    }

    fn release(&mut self) -> Result<(), RegisterError> {
        let Some(mut ctx) = self.ctx.take() else {
            return Ok(());
        };
        let io_timeout = self.io_timeout;
        let result = self.runtime.block_on(async {
            timeout(io_timeout, ctx.disconnect()).await
        });
        match result {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                return Err(RegisterError::Disconnect {
                    reason: e.to_string(),
                })
            }
            Err(_) => {
                return Err(RegisterError::Disconnect {
                    reason: "timed out".to_string(),
                })
            }
        }
        debug!(peer = %self.target, "Modbus connection closed");
        Ok(())
    }
}
