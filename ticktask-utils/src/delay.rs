//! `embedded-hal`-compatible delay that yields CPU to other tasks instead of busy looping.
//! The precision is limited by the tick frequency of the kernel (usually order of a millisecond or more).

use ticktask::{Error, Kernel, Port};

pub struct Delay<'k, P: Port> {
    kernel: &'k Kernel<P>,
    tick_freq: u32,
}

impl<'k, P: Port> Delay<'k, P> {
    pub fn new(kernel: &'k Kernel<P>) -> Self {
        Self {
            kernel,
            tick_freq: kernel.config().tick_freq,
        }
    }

    pub fn delay_ticks(&mut self, ticks: u64) -> Result<(), Error> {
        let mut remaining = ticks;
        while remaining > 0 {
            let step = remaining.min(u32::MAX as u64);
            self.kernel.sleep(step as u32)?;
            remaining -= step;
        }
        Ok(())
    }

    fn delay_scaled(&mut self, amount: u32, per_second: u64) {
        let ticks = (amount as u64 * self.tick_freq as u64).div_ceil(per_second);
        match self.delay_ticks(ticks) {
            // A halted kernel cuts delays short
            Ok(()) | Err(Error::Halted) => {}
            Err(err) => ticktask::warn!("Delay of {} ticks failed: {}", ticks, err),
        }
    }
}

impl<P: Port> Clone for Delay<'_, P> {
    fn clone(&self) -> Self {
        Self {
            kernel: self.kernel,
            tick_freq: self.tick_freq,
        }
    }
}

impl<P: Port> embedded_hal::delay::DelayNs for Delay<'_, P> {
    fn delay_ns(&mut self, ns: u32) {
        self.delay_scaled(ns, 1_000_000_000);
    }

    fn delay_us(&mut self, us: u32) {
        self.delay_scaled(us, 1_000_000);
    }

    fn delay_ms(&mut self, ms: u32) {
        self.delay_scaled(ms, 1_000);
    }
}
