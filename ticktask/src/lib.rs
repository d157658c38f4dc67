//! Fixed-priority preemptive multitasking kernel.
//!
//! The kernel is an owned [`Kernel`] value parameterized by a [`Port`], which performs the
//! actual context switches. On top of the scheduler it provides drift-free periodic release,
//! mutexes with priority inheritance and bounded blocking queues.

#![no_std]

#[macro_use]
mod log_wrapper;

pub mod message;
pub mod mutex;
pub mod port;
pub mod queue;
pub mod scheduler;
pub mod task;
pub mod tick;
pub mod timer;
mod wait_list;

use core::fmt;

pub use portable_atomic;

pub use message::{MESSAGE_CAPACITY, Message};
pub use mutex::{Mutex, MutexGuard, RawMutex};
pub use port::Port;
pub use queue::BoundedQueue;
pub use scheduler::{Kernel, KernelConfig, MAX_NUM_TASKS, MAX_PRIORITY};
pub use task::{TaskConfig, TaskId, TaskState, TaskStats};
pub use tick::Tick;
pub use timer::MAX_WAIT;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    TaskFull,
    InvalidPriority,
    /// A period of zero, or one too long for a single timer wait.
    InvalidPeriod,
    NotFound,
    /// The operation is not allowed in the current task state (e.g. blocking from the idle task).
    InvalidState,
    TimerFull,
    /// A mutex was released by a task that does not hold it.
    NotHolder,
    /// The calling task already holds the mutex.
    AlreadyHeld,
    QueueClosed,
    QueueFull,
    MessageTooLong,
    /// The kernel has been halted; every blocking call fails from now on.
    Halted,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            Error::TaskFull => "no free task slot",
            Error::InvalidPriority => "priority out of range",
            Error::InvalidPeriod => "period must be between 1 and 2^31 - 1 ticks",
            Error::NotFound => "no such task",
            Error::InvalidState => "operation not allowed in the current task state",
            Error::TimerFull => "no free timer slot",
            Error::NotHolder => "mutex released by a task that does not hold it",
            Error::AlreadyHeld => "mutex already held by the calling task",
            Error::QueueClosed => "queue closed",
            Error::QueueFull => "queue full",
            Error::MessageTooLong => "message exceeds its capacity",
            Error::Halted => "kernel halted",
        };
        f.write_str(msg)
    }
}

impl core::error::Error for Error {}
