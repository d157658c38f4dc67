//! Time management, sleeping and drift-free periodic release.
//!
//! Time is the wrapping [`Tick`] counter advanced by [`Kernel::tick`]. Sleeping tasks are kept
//! in a small wakeup list checked on every tick.

use crate::{
    Error, Kernel, Port, TaskId, Tick,
    scheduler::{Switch, WaitKind},
};

/// Longest wait a single timer can express, 2^31 - 1 ticks.
pub const MAX_WAIT: u32 = i32::MAX as u32;

impl<P: Port> Kernel<P> {
    /// Retrieves current time (in ticks).
    pub fn now(&self) -> Tick {
        critical_section::with(|cs| self.state(cs).now)
    }

    /// Blocks the current task for `ticks` ticks. Sleeping for 0 ticks yields to peers.
    ///
    /// Waits of [`MAX_WAIT`] ticks or more are split into several timer waits.
    pub fn sleep(&self, ticks: u32) -> Result<(), Error> {
        if ticks == 0 {
            self.check_halted()?;
            self.yield_now();
            return self.check_halted();
        }

        let mut remaining = ticks;
        while remaining > 0 {
            let step = remaining.min(MAX_WAIT);
            self.sleep_until(self.now() + step)?;
            remaining -= step;
        }
        Ok(())
    }

    /// Blocks the current task until the specified time. Returns at once if it has passed.
    ///
    /// `time` must lie less than 2^31 ticks ahead; anything further counts as already passed.
    pub fn sleep_until(&self, time: Tick) -> Result<(), Error> {
        self.check_halted()?;

        let switch = critical_section::with(|cs| {
            let mut state = self.state(cs);
            if state.now.has_reached(time) {
                return Ok(None);
            }
            state.ensure_can_block()?;

            let id = state.current_task;
            state.arm_timer(id, time)?;
            state.block_current(WaitKind::Timer);
            Ok(Some(state.pick_switch()))
        })?;

        self.wait_blocked(switch)
    }

    /// Waits for the next release of the running task, `period` ticks after its previous one.
    ///
    /// The release instant is computed from the previous *ideal* release, never from the time
    /// of the call, so execution jitter does not accumulate as drift. If the instant has already
    /// passed (the previous cycle overran) the call returns immediately and the release moves to
    /// the latest instant of the grid at or before now. Missed releases are counted as overruns
    /// and never replayed.
    ///
    /// `period` must be in `1..=MAX_WAIT`, otherwise [`Error::InvalidPeriod`] is returned.
    pub fn release_and_wait(&self, period: u32) -> Result<(), Error> {
        if period == 0 || period > MAX_WAIT {
            return Err(Error::InvalidPeriod);
        }
        self.check_halted()?;

        let switch = critical_section::with(|cs| {
            let mut state = self.state(cs);
            state.ensure_can_block()?;

            let now = state.now;
            let id = state.current_task;
            let task = state.current_mut();
            let release = task.last_release + period;
            task.last_release = release;
            task.stats.releases += 1;

            if now.has_reached(release) {
                let late = now.ticks_since(release);
                if late > 0 {
                    // Every grid instant passed while the task was still busy is an overrun
                    task.last_release = release + late / period * period;
                    task.stats.overruns += late.div_ceil(period);
                    debug!("Task #{} released {} ticks late", id.index(), late);
                }
                return Ok(None);
            }

            state.arm_timer(id, release)?;
            state.block_current(WaitKind::Timer);
            Ok(Some(state.pick_switch()))
        })?;

        self.wait_blocked(switch)
    }

    /// [`Kernel::release_and_wait`] with the period from the task's configuration.
    pub fn wait_next_period(&self) -> Result<(), Error> {
        let period = critical_section::with(|cs| {
            let mut state = self.state(cs);
            state.current_mut().period
        });

        self.release_and_wait(period)
    }

    /// The ideal instant of the task's latest release.
    pub fn last_release(&self, id: TaskId) -> Result<Tick, Error> {
        critical_section::with(|cs| self.state(cs).task(id).map(|task| task.last_release))
    }

    fn wait_blocked(&self, switch: Option<Switch>) -> Result<(), Error> {
        if let Some(switch) = switch {
            self.switch(switch);
            self.check_halted()?;
        }

        Ok(())
    }
}
