//! Digital I/O capability.

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Level {
    Low,
    High,
}

impl From<bool> for Level {
    fn from(value: bool) -> Self {
        if value { Level::High } else { Level::Low }
    }
}

impl core::ops::Not for Level {
    type Output = Level;

    fn not(self) -> Level {
        match self {
            Level::Low => Level::High,
            Level::High => Level::Low,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PinId(pub u8);

/// Access to the pins of a GPIO port.
///
/// Pins are shared by several tasks, so implementations take `&self`. Reads and writes
/// cannot fail.
pub trait Gpio {
    fn read(&self, pin: PinId) -> Level;
    fn write(&self, pin: PinId, level: Level);
}

impl<G: Gpio + ?Sized> Gpio for &G {
    fn read(&self, pin: PinId) -> Level {
        (**self).read(pin)
    }

    fn write(&self, pin: PinId, level: Level) {
        (**self).write(pin, level)
    }
}
