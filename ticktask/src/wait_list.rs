use heapless::Vec;

use crate::{
    Error, TaskId,
    scheduler::{KernelState, MAX_NUM_TASKS},
};

/// Tasks blocked on one synchronization object.
///
/// Waiters are woken highest effective priority first, FIFO among equal priorities. Priorities
/// are looked up at wake time because inheritance may change them while a task waits.
pub(crate) struct WaitList {
    waiters: Vec<TaskId, MAX_NUM_TASKS>,
}

impl WaitList {
    pub(crate) const fn new() -> Self {
        Self {
            waiters: Vec::new(),
        }
    }

    pub(crate) fn push(&mut self, id: TaskId) -> Result<(), Error> {
        self.waiters.push(id).or(Err(Error::TaskFull))
    }

    pub(crate) fn remove(&mut self, id: TaskId) {
        self.waiters.retain(|waiter| *waiter != id);
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.waiters.is_empty()
    }

    fn position_of_highest(&self, state: &KernelState) -> Option<(usize, usize)> {
        let mut best: Option<(usize, usize)> = None;
        for (idx, id) in self.waiters.iter().enumerate() {
            let priority = state.priority_of(*id);
            match best {
                Some((_, best_priority)) if best_priority >= priority => {}
                _ => best = Some((idx, priority)),
            }
        }
        best
    }

    pub(crate) fn highest_priority(&self, state: &KernelState) -> Option<usize> {
        self.position_of_highest(state).map(|(_, priority)| priority)
    }

    pub(crate) fn pop_highest(&mut self, state: &KernelState) -> Option<TaskId> {
        let (idx, _) = self.position_of_highest(state)?;
        Some(self.waiters.remove(idx))
    }

    /// Empties the list, returning the waiters in arrival order.
    pub(crate) fn take_all(&mut self) -> Vec<TaskId, MAX_NUM_TASKS> {
        core::mem::take(&mut self.waiters)
    }
}
