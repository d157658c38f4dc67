//! Interface for architecture-dependent context switching implemented in separate crates.

use crate::TaskId;

/// Performs the context switches decided by the scheduler.
///
/// The kernel only ever calls these from the context of the running task, after it has
/// released its critical section.
pub trait Port {
    /// Transfers the processor from the running task `from` to `to`.
    ///
    /// Returns once `from` has been selected to run again.
    fn switch(&self, from: TaskId, to: TaskId);

    /// Transfers the processor from `from`, which has finished and never runs again, to `to`.
    fn exit(&self, from: TaskId, to: TaskId);
}
