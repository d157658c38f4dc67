//! Building blocks for applications on [ticktask]: peripheral capabilities, edge and
//! hold-duration detection, the shared [`System`] resources and ready-made task bodies.

#![no_std]

pub mod delay;
pub mod edge;
pub mod gpio;
pub mod mode;
pub mod serial;
pub mod system;
pub mod tasks;

use core::fmt;

pub use delay::Delay;
pub use edge::{Edge, EdgeDetector};
pub use gpio::{Gpio, Level, PinId};
pub use mode::{HoldThresholds, Mode, ModeSelector, ModeSwitch};
pub use serial::{IoError, Serial};
pub use system::{EVENT_QUEUE_CAPACITY, System};

/// Errors ending a task body.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Error {
    Kernel(ticktask::Error),
    Io(IoError),
}

impl From<ticktask::Error> for Error {
    fn from(value: ticktask::Error) -> Self {
        Error::Kernel(value)
    }
}

impl From<IoError> for Error {
    fn from(value: IoError) -> Self {
        Error::Io(value)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Kernel(err) => write!(f, "kernel error: {}", err),
            Error::Io(err) => write!(f, "serial error: {}", err),
        }
    }
}

impl core::error::Error for Error {}
