//! Wrapping tick counter.

use core::{fmt, ops::Add};

/// Kernel time in ticks.
///
/// The counter wraps modulo 2^32. Comparisons are wrap-aware: `a` is before `b` when `b` lies
/// less than half of the counter range ahead of `a`, so deadlines stay ordered across the wrap
/// as long as they are less than 2^31 ticks away.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Tick(pub u32);

impl Tick {
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> u32 {
        self.0
    }

    pub const fn wrapping_add(self, ticks: u32) -> Self {
        Self(self.0.wrapping_add(ticks))
    }

    /// Number of ticks from `earlier` to `self`.
    pub const fn ticks_since(self, earlier: Tick) -> u32 {
        self.0.wrapping_sub(earlier.0)
    }

    pub const fn is_before(self, other: Tick) -> bool {
        (self.0.wrapping_sub(other.0) as i32) < 0
    }

    pub const fn is_after(self, other: Tick) -> bool {
        other.is_before(self)
    }

    /// True once `self` is at or past `deadline`.
    pub const fn has_reached(self, deadline: Tick) -> bool {
        !self.is_before(deadline)
    }
}

impl Add<u32> for Tick {
    type Output = Tick;

    fn add(self, ticks: u32) -> Tick {
        self.wrapping_add(ticks)
    }
}

impl fmt::Display for Tick {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
