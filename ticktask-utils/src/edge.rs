//! Transition detection on sampled digital levels.

use crate::{Level, PinId};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Edge {
    Rising,
    Falling,
}

/// Turns periodic samples of one pin into rising/falling events.
///
/// A new level is accepted once it has been sampled `debounce` times in a row; shorter
/// glitches are ignored.
#[derive(Clone, Debug)]
pub struct EdgeDetector {
    pin: PinId,
    level: Level,
    candidate: Level,
    candidate_samples: u8,
    debounce: u8,
}

impl EdgeDetector {
    /// Creates a detector assuming the pin is initially at `initial`. No debouncing.
    pub fn new(pin: PinId, initial: Level) -> Self {
        Self {
            pin,
            level: initial,
            candidate: initial,
            candidate_samples: 0,
            debounce: 1,
        }
    }

    /// Sets how many consecutive samples confirm a level change (at least 1).
    pub fn with_debounce(self, samples: u8) -> Self {
        Self {
            debounce: samples.max(1),
            ..self
        }
    }

    pub fn pin(&self) -> PinId {
        self.pin
    }

    /// The last confirmed level.
    pub fn level(&self) -> Level {
        self.level
    }

    /// Feeds one sample, returning the edge it completes, if any.
    pub fn update(&mut self, sample: Level) -> Option<Edge> {
        if sample == self.level {
            self.candidate = self.level;
            self.candidate_samples = 0;
            return None;
        }

        if sample == self.candidate {
            self.candidate_samples = self.candidate_samples.saturating_add(1);
        } else {
            self.candidate = sample;
            self.candidate_samples = 1;
        }
        if self.candidate_samples < self.debounce {
            return None;
        }

        self.level = sample;
        self.candidate_samples = 0;
        Some(match sample {
            Level::High => Edge::Rising,
            Level::Low => Edge::Falling,
        })
    }
}
