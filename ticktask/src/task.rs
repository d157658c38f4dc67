//! Task identifiers, configuration and state.

/// Identifier of a task slot.
///
/// Slot #0 always belongs to the idle task.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(pub(crate) usize);

impl TaskId {
    pub const IDLE: TaskId = TaskId(0);

    pub fn index(self) -> usize {
        self.0
    }
}

#[derive(Clone, Debug)]
#[non_exhaustive]
pub struct TaskConfig {
    pub(crate) name: &'static str,
    pub(crate) priority: usize,
    pub(crate) period: u32,
}

impl TaskConfig {
    pub fn with_name(self, name: &'static str) -> Self {
        Self { name, ..self }
    }

    /// Sets task priority.
    ///
    /// Higher value means higher priority. 0 is reserved for the idle task. Default value is 1.
    pub fn with_priority(self, priority: usize) -> Self {
        Self { priority, ..self }
    }

    /// Sets the release period in ticks used by [`Kernel::wait_next_period`](crate::Kernel::wait_next_period).
    ///
    /// 0 (the default) marks an aperiodic, event-driven task.
    pub fn with_period(self, period: u32) -> Self {
        Self { period, ..self }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn priority(&self) -> usize {
        self.priority
    }

    pub fn period(&self) -> u32 {
        self.period
    }
}

impl Default for TaskConfig {
    fn default() -> Self {
        Self {
            name: "task",
            priority: 1,
            period: 0,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TaskState {
    Ready,
    Running,
    Blocked,
    /// Taken out of scheduling until resumed; consumes no scheduling slot.
    Suspended,
}

/// Runtime statistics collected per task.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TaskStats {
    /// Ticks that elapsed while the task was running.
    pub run_ticks: u64,
    /// Periodic releases requested so far.
    pub releases: u32,
    /// Releases whose ideal instant had already passed when requested.
    pub overruns: u32,
}
