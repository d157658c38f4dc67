//! Mutual exclusion with priority inheritance.
//!
//! While a task is blocked on a held mutex, the holder runs with the higher of the two
//! priorities, so a medium-priority task cannot prolong the wait of a high-priority one. The
//! holder falls back to its base priority when it releases its last mutex. Inheritance is
//! single-level: it is not propagated to the holder of another mutex the holder waits for.
//!
//! Ownership is handed directly to the highest-priority waiter on release.

use core::{
    cell::{RefCell, UnsafeCell},
    marker::PhantomData,
    ops::{Deref, DerefMut},
};

use critical_section::Mutex as CsMutex;

use crate::{Error, Kernel, Port, TaskId, scheduler::WaitKind, wait_list::WaitList};

struct MutexState {
    holder: Option<TaskId>,
    waiters: WaitList,
}

/// A binary mutex that tracks its holder but protects no data by itself.
pub struct RawMutex {
    inner: CsMutex<RefCell<MutexState>>,
}

enum Acquire {
    Granted,
    Blocked(TaskId, Option<(TaskId, TaskId)>),
}

impl RawMutex {
    pub const fn new() -> Self {
        Self {
            inner: CsMutex::new(RefCell::new(MutexState {
                holder: None,
                waiters: WaitList::new(),
            })),
        }
    }

    pub fn holder(&self) -> Option<TaskId> {
        critical_section::with(|cs| self.inner.borrow_ref(cs).holder)
    }

    pub fn is_locked(&self) -> bool {
        self.holder().is_some()
    }

    pub fn has_waiters(&self) -> bool {
        critical_section::with(|cs| !self.inner.borrow_ref(cs).waiters.is_empty())
    }

    /// Blocks the current task until it owns the mutex.
    pub fn acquire<P: Port>(&self, kernel: &Kernel<P>) -> Result<(), Error> {
        kernel.check_halted()?;

        let acquire = critical_section::with(|cs| {
            let mut mutex = self.inner.borrow_ref_mut(cs);
            let mut state = kernel.state(cs);
            let me = state.current_task;
            let holder = mutex.holder;

            match holder {
                None => {
                    mutex.holder = Some(me);
                    state.current_mut().mutexes_held += 1;
                    Ok(Acquire::Granted)
                }
                Some(holder) if holder == me => Err(Error::AlreadyHeld),
                Some(holder) => {
                    state.ensure_can_block()?;
                    mutex.waiters.push(me)?;

                    let priority = state.priority_of(me);
                    state.block_current(WaitKind::Object);
                    state.inherit_priority(holder, priority);
                    trace!(
                        "Task #{} waits for mutex held by #{}",
                        me.index(),
                        holder.index()
                    );

                    Ok(Acquire::Blocked(me, state.pick_switch()))
                }
            }
        })?;

        let Acquire::Blocked(me, switch) = acquire else {
            return Ok(());
        };
        kernel.switch(switch);

        // Ownership is handed over before the waiter is woken, unless the kernel halted
        critical_section::with(|cs| {
            let mut mutex = self.inner.borrow_ref_mut(cs);
            if mutex.holder == Some(me) {
                Ok(())
            } else {
                mutex.waiters.remove(me);
                Err(Error::Halted)
            }
        })
    }

    /// Takes the mutex if it is free. Returns whether it was taken.
    pub fn try_acquire<P: Port>(&self, kernel: &Kernel<P>) -> Result<bool, Error> {
        critical_section::with(|cs| {
            let mut mutex = self.inner.borrow_ref_mut(cs);
            let mut state = kernel.state(cs);
            let me = state.current_task;
            let holder = mutex.holder;

            match holder {
                None => {
                    mutex.holder = Some(me);
                    state.current_mut().mutexes_held += 1;
                    Ok(true)
                }
                Some(holder) if holder == me => Err(Error::AlreadyHeld),
                Some(_) => Ok(false),
            }
        })
    }

    /// Releases the mutex held by the current task.
    ///
    /// Fails with [`Error::NotHolder`], leaving the mutex untouched, if the caller does not hold it.
    pub fn release<P: Port>(&self, kernel: &Kernel<P>) -> Result<(), Error> {
        let switch = critical_section::with(|cs| {
            let mut mutex = self.inner.borrow_ref_mut(cs);
            let mut state = kernel.state(cs);
            let me = state.current_task;

            if mutex.holder != Some(me) {
                return Err(Error::NotHolder);
            }

            let task = state.current_mut();
            task.mutexes_held = task.mutexes_held.saturating_sub(1);
            state.disinherit_priority(me);

            let next_holder = mutex.waiters.pop_highest(&state);
            mutex.holder = next_holder;
            if let Some(next) = next_holder {
                if let Ok(task) = state.task_mut(next) {
                    task.mutexes_held += 1;
                }
                state.unblock(next);
                // The new holder stands in for the tasks still waiting
                if let Some(priority) = mutex.waiters.highest_priority(&state) {
                    state.inherit_priority(next, priority);
                }
                trace!("Mutex handed from #{} to #{}", me.index(), next.index());
            }

            Ok(state.pick_switch())
        })?;

        kernel.switch(switch);
        Ok(())
    }
}

impl Default for RawMutex {
    fn default() -> Self {
        Self::new()
    }
}

/// A mutex protecting a value of type `T`, released when its guard is dropped.
pub struct Mutex<T> {
    raw: RawMutex,
    data: UnsafeCell<T>,
}

// Safety: The mutex ensures only the holder accesses `T`, and holders may be on any task.
unsafe impl<T: Send> Sync for Mutex<T> {}

impl<T> Mutex<T> {
    pub const fn new(value: T) -> Self {
        Self {
            raw: RawMutex::new(),
            data: UnsafeCell::new(value),
        }
    }

    /// Blocks the current task until it owns the mutex.
    pub fn lock<'a, P: Port>(
        &'a self,
        kernel: &'a Kernel<P>,
    ) -> Result<MutexGuard<'a, P, T>, Error> {
        self.raw.acquire(kernel)?;

        Ok(MutexGuard {
            mutex: self,
            kernel,
            _not_send: PhantomData,
        })
    }

    pub fn try_lock<'a, P: Port>(
        &'a self,
        kernel: &'a Kernel<P>,
    ) -> Result<Option<MutexGuard<'a, P, T>>, Error> {
        let taken = self.raw.try_acquire(kernel)?;

        Ok(taken.then(|| MutexGuard {
            mutex: self,
            kernel,
            _not_send: PhantomData,
        }))
    }

    pub fn raw(&self) -> &RawMutex {
        &self.raw
    }

    pub fn get_mut(&mut self) -> &mut T {
        self.data.get_mut()
    }

    pub fn into_inner(self) -> T {
        self.data.into_inner()
    }
}

/// RAII guard for a locked [`Mutex`].
///
/// It must be dropped by the task that locked the mutex, hence it is `!Send`.
pub struct MutexGuard<'a, P: Port, T> {
    mutex: &'a Mutex<T>,
    kernel: &'a Kernel<P>,
    _not_send: PhantomData<*const ()>,
}

impl<P: Port, T> Deref for MutexGuard<'_, P, T> {
    type Target = T;

    fn deref(&self) -> &T {
        // Safety: The guard proves the current task holds the mutex
        unsafe { &*self.mutex.data.get() }
    }
}

impl<P: Port, T> DerefMut for MutexGuard<'_, P, T> {
    fn deref_mut(&mut self) -> &mut T {
        // Safety: The guard proves the current task holds the mutex
        unsafe { &mut *self.mutex.data.get() }
    }
}

impl<P: Port, T> Drop for MutexGuard<'_, P, T> {
    fn drop(&mut self) {
        if let Err(err) = self.mutex.raw.release(self.kernel) {
            // Lock state is inconsistent; continuing would break mutual exclusion
            panic!("mutex guard released by a task that does not hold it: {}", err);
        }
    }
}
