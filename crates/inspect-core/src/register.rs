use crate::error::RegisterError;

/// Addressable read/write access to a device's hardware registers.
///
/// Implementations never retry: a failed access is reported once and the
/// caller decides what it means.
pub trait RegisterIo: Send {
    fn write_register(&mut self, address: u16, value: u16) -> Result<(), RegisterError>;

    /// Write consecutive registers starting at `address`.
    fn write_registers(&mut self, address: u16, values: &[u16]) -> Result<(), RegisterError>;

    fn read_register(&mut self, address: u16) -> Result<u16, RegisterError>;

    /// Close the underlying connection. Further accesses fail with
    /// [`RegisterError::Released`].
    fn release(&mut self) -> Result<(), RegisterError>;
}

impl<T: RegisterIo + ?Sized> RegisterIo for Box<T> {
    fn write_register(&mut self, address: u16, value: u16) -> Result<(), RegisterError> {
        (**self).write_register(address, value)
    }

    fn write_registers(&mut self, address: u16, values: &[u16]) -> Result<(), RegisterError> {
        (**self).write_registers(address, values)
    }

    fn read_register(&mut self, address: u16) -> Result<u16, RegisterError> {
        (**self).read_register(address)
    }

    fn release(&mut self) -> Result<(), RegisterError> {
        (**self).release()
    }
}
