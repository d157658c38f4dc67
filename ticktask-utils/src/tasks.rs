//! Task bodies for the usual composition patterns.
//!
//! Each body loops forever and only returns by propagating an error, e.g. [`ticktask::Error::Halted`]
//! once the kernel is halted. Periodic bodies take their period from the task configuration,
//! so they must be spawned with a non-zero period.

use core::convert::Infallible;

use ticktask::{BoundedQueue, Kernel, Message, Mutex, Port};

use crate::{Edge, EdgeDetector, Error, Gpio, Level, ModeSelector, ModeSwitch, PinId, Serial};

/// Output of [`guarded_writer`]: a header, `lines` repetitions of a line and a footer.
#[derive(Clone, Debug)]
pub struct Banner {
    pub header: &'static [u8],
    pub line: &'static [u8],
    pub lines: usize,
    pub footer: &'static [u8],
    /// Ticks slept after each write
    pub line_gap: u32,
}

/// Writes a whole [`Banner`] under the serial mutex once per period.
///
/// Banners of different writers never interleave, whatever their priorities.
pub fn guarded_writer<P: Port, S: Serial>(
    kernel: &Kernel<P>,
    serial: &Mutex<S>,
    banner: &Banner,
) -> Result<Infallible, Error> {
    loop {
        {
            let mut port = serial.lock(kernel)?;
            port.write_bytes(banner.header)?;
            kernel.sleep(banner.line_gap)?;
            for _ in 0..banner.lines {
                port.write_bytes(banner.line)?;
                kernel.sleep(banner.line_gap)?;
            }
            port.write_bytes(banner.footer)?;
        }

        kernel.wait_next_period()?;
    }
}

/// Sends a copy of `item` once per period.
pub fn periodic_emitter<P: Port, T: Clone, const Q: usize>(
    kernel: &Kernel<P>,
    queue: &BoundedQueue<T, Q>,
    item: T,
) -> Result<Infallible, Error> {
    loop {
        queue.send(kernel, item.clone())?;
        kernel.wait_next_period()?;
    }
}

/// Items sent by [`edge_reporter`].
#[derive(Clone, Debug)]
pub struct EdgeReport<T> {
    pub rising: T,
    pub falling: T,
}

/// Samples a pin once per period and sends a report for every detected edge.
pub fn edge_reporter<P: Port, G: Gpio, T: Clone, const Q: usize>(
    kernel: &Kernel<P>,
    gpio: &G,
    queue: &BoundedQueue<T, Q>,
    mut detector: EdgeDetector,
    report: &EdgeReport<T>,
) -> Result<Infallible, Error> {
    loop {
        let sample = gpio.read(detector.pin());
        if let Some(edge) = detector.update(sample) {
            let item = match edge {
                Edge::Rising => report.rising.clone(),
                Edge::Falling => report.falling.clone(),
            };
            queue.send(kernel, item)?;
        }

        kernel.wait_next_period()?;
    }
}

/// Forwards every received message to the serial port, in arrival order.
pub fn serial_consumer<P: Port, S: Serial, const Q: usize>(
    kernel: &Kernel<P>,
    queue: &BoundedQueue<Message, Q>,
    serial: &Mutex<S>,
) -> Result<Infallible, Error> {
    loop {
        let message = queue.receive(kernel)?;
        serial.lock(kernel)?.write_bytes(message.as_bytes())?;
    }
}

/// Samples a button once per period and switches modes when it is released.
pub fn mode_monitor<P: Port, G: Gpio>(
    kernel: &Kernel<P>,
    gpio: &G,
    button: PinId,
    mut selector: ModeSelector,
    mut switch: ModeSwitch,
) -> Result<Infallible, Error> {
    loop {
        if let Some(mode) = selector.update(gpio.read(button)) {
            switch.apply(kernel, gpio, mode)?;
        }

        kernel.wait_next_period()?;
    }
}

/// Toggles an LED, keeping it in each state for `half_period` ticks.
pub fn blinker<P: Port, G: Gpio>(
    kernel: &Kernel<P>,
    gpio: &G,
    led: PinId,
    half_period: u32,
) -> Result<Infallible, Error> {
    loop {
        gpio.write(led, Level::High);
        kernel.release_and_wait(half_period)?;
        gpio.write(led, Level::Low);
        kernel.release_and_wait(half_period)?;
    }
}
