//! Resources shared by the tasks of an application.

use ticktask::{BoundedQueue, Message, Mutex};

/// Default capacity of the event queue.
pub const EVENT_QUEUE_CAPACITY: usize = 10;

/// The event queue feeding the serial consumer and the mutex guarding the serial port.
///
/// Create it before spawning tasks and share it with them by reference.
pub struct System<S, const Q: usize = EVENT_QUEUE_CAPACITY> {
    events: BoundedQueue<Message, Q>,
    serial: Mutex<S>,
}

impl<S, const Q: usize> System<S, Q> {
    pub const fn new(serial: S) -> Self {
        Self {
            events: BoundedQueue::new(),
            serial: Mutex::new(serial),
        }
    }

    pub fn events(&self) -> &BoundedQueue<Message, Q> {
        &self.events
    }

    pub fn serial(&self) -> &Mutex<S> {
        &self.serial
    }

    /// Gives the serial port back once no task uses the system anymore.
    pub fn into_serial(self) -> S {
        self.serial.into_inner()
    }
}
