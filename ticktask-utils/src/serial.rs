//! Serial output capability.

use core::fmt;

/// A transmission failure reported by the serial driver.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct IoError;

impl fmt::Display for IoError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("serial transmission failed")
    }
}

impl core::error::Error for IoError {}

/// A byte sink such as a UART transmitter.
pub trait Serial {
    /// Transmits the whole buffer, in order.
    fn write_bytes(&mut self, buffer: &[u8]) -> Result<(), IoError>;
}

impl<S: Serial + ?Sized> Serial for &mut S {
    fn write_bytes(&mut self, buffer: &[u8]) -> Result<(), IoError> {
        (**self).write_bytes(buffer)
    }
}
