use crate::error::{RegisterError, RegisterOp};
use crate::register::RegisterIo;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// One write as issued through [`RegisterIo`], in issue order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterWrite {
    pub address: u16,
    pub values: Vec<u16>,
}

#[derive(Debug, Default)]
struct BankState {
    registers: HashMap<u16, u16>,
    writes: Vec<RegisterWrite>,
    accesses: usize,
    fail_after: Option<usize>,
    released: bool,
    release_count: usize,
}

/// In-memory register bank.
///
/// Clones share the same bank, so a handle kept outside the driver can
/// inspect every write after the bank has been moved in.
#[derive(Debug, Clone, Default)]
pub struct SimulatedRegisters {
    state: Arc<Mutex<BankState>>,
}

impl SimulatedRegisters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Preload a register so reads return `value`.
    pub fn with_register(self, address: u16, value: u16) -> Self {
        self.lock().registers.insert(address, value);
        self
    }

    /// Let `accesses` reads/writes succeed, then fail every access after that.
    pub fn fail_after(self, accesses: usize) -> Self {
        self.lock().fail_after = Some(accesses);
        self
    }

    pub fn register(&self, address: u16) -> Option<u16> {
        self.lock().registers.get(&address).copied()
    }

    pub fn writes(&self) -> Vec<RegisterWrite> {
        self.lock().writes.clone()
    }

    pub fn write_count(&self) -> usize {
        self.lock().writes.len()
    }

    /// Writes issued to `address`, oldest first.
    pub fn writes_to(&self, address: u16) -> Vec<Vec<u16>> {
        self.lock()
            .writes
            .iter()
            .filter(|w| w.address == address)
            .map(|w| w.values.clone())
            .collect()
    }

    pub fn clear_writes(&self) {
        self.lock().writes.clear();
    }

    pub fn release_count(&self) -> usize {
        self.lock().release_count
    }

    fn lock(&self) -> MutexGuard<'_, BankState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn admit(state: &mut BankState, op: RegisterOp, address: u16) -> Result<(), RegisterError> {
        if state.released {
            return Err(RegisterError::Released);
        }
        if let Some(limit) = state.fail_after {
            if state.accesses >= limit {
                return Err(RegisterError::Transport {
                    op,
                    address,
                    reason: "simulated transport failure".to_string(),
                });
            }
        }
        state.accesses += 1;
        Ok(())
    }
}

impl RegisterIo for SimulatedRegisters {
    fn write_register(&mut self, address: u16, value: u16) -> Result<(), RegisterError> {
        self.write_registers(address, &[value])
    }

    fn write_registers(&mut self, address: u16, values: &[u16]) -> Result<(), RegisterError> {
        let mut state = self.lock();
        Self::admit(&mut state, RegisterOp::Write, address)?;
        for (offset, value) in values.iter().enumerate() {
            state
                .registers
                .insert(address.wrapping_add(offset as u16), *value);
        }
        state.writes.push(RegisterWrite {
            address,
            values: values.to_vec(),
        });
        Ok(())
    }

    fn read_register(&mut self, address: u16) -> Result<u16, RegisterError> {
        let mut state = self.lock();
        Self::admit(&mut state, RegisterOp::Read, address)?;
        Ok(state.registers.get(&address).copied().unwrap_or(0))
    }

    fn release(&mut self) -> Result<(), RegisterError> {
        let mut state = self.lock();
        state.released = true;
        state.release_count += 1;
        Ok(())
    }
}
