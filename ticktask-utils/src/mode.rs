//! Button-driven selection of one exclusive task.
//!
//! A monitor samples a button at a fixed rate and measures how long it is held. On release
//! the hold duration selects a [`Mode`], and [`ModeSwitch`] makes the matching task the only
//! one of its group that is not suspended.

use ticktask::{Kernel, Port, TaskId};

use crate::{Gpio, Level, PinId};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Mode {
    #[default]
    Off,
    ModeA,
    ModeB,
}

/// Hold durations, in samples, separating the modes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HoldThresholds {
    /// Holds shorter than this select [`Mode::Off`].
    pub mode_a: u16,
    /// Holds at least this long select [`Mode::ModeB`].
    pub mode_b: u16,
}

impl HoldThresholds {
    pub fn select(&self, held: u16) -> Mode {
        if held < self.mode_a {
            Mode::Off
        } else if held < self.mode_b {
            Mode::ModeA
        } else {
            Mode::ModeB
        }
    }
}

impl Default for HoldThresholds {
    fn default() -> Self {
        Self {
            mode_a: 20,
            mode_b: 40,
        }
    }
}

/// Measures button holds and picks a mode on each release.
#[derive(Clone, Debug)]
pub struct ModeSelector {
    thresholds: HoldThresholds,
    previous: Level,
    held: u16,
}

impl ModeSelector {
    pub fn new(thresholds: HoldThresholds) -> Self {
        Self {
            thresholds,
            previous: Level::Low,
            held: 0,
        }
    }

    /// Samples the button was seen pressed after the one that started the current hold.
    pub fn held(&self) -> u16 {
        self.held
    }

    /// Feeds one button sample (`High` = pressed). Returns the selected mode on release.
    pub fn update(&mut self, sample: Level) -> Option<Mode> {
        let selected = match (self.previous, sample) {
            (Level::High, Level::High) => {
                self.held = self.held.saturating_add(1);
                None
            }
            (Level::High, Level::Low) => {
                let mode = self.thresholds.select(self.held);
                self.held = 0;
                Some(mode)
            }
            _ => None,
        };

        self.previous = sample;
        selected
    }
}

impl Default for ModeSelector {
    fn default() -> Self {
        Self::new(HoldThresholds::default())
    }
}

/// The tasks switched by the modes, with the LED they drive.
#[derive(Clone, Debug)]
pub struct ModeSwitch {
    mode_a: TaskId,
    mode_b: TaskId,
    led: PinId,
    current: Mode,
}

impl ModeSwitch {
    /// Both tasks are expected to be suspended initially.
    pub fn new(mode_a: TaskId, mode_b: TaskId, led: PinId) -> Self {
        Self {
            mode_a,
            mode_b,
            led,
            current: Mode::Off,
        }
    }

    pub fn current(&self) -> Mode {
        self.current
    }

    /// Enters `mode`: every other task is suspended before the selected one is resumed.
    pub fn apply<P: Port, G: Gpio>(
        &mut self,
        kernel: &Kernel<P>,
        gpio: &G,
        mode: Mode,
    ) -> Result<(), ticktask::Error> {
        match mode {
            Mode::Off => {
                kernel.suspend(self.mode_a)?;
                kernel.suspend(self.mode_b)?;
                gpio.write(self.led, Level::Low);
            }
            Mode::ModeA => {
                kernel.suspend(self.mode_b)?;
                kernel.resume(self.mode_a)?;
            }
            Mode::ModeB => {
                kernel.suspend(self.mode_a)?;
                kernel.resume(self.mode_b)?;
            }
        }

        self.current = mode;
        Ok(())
    }
}
