//! Bounded FIFO queue for passing values between tasks.
//!
//! A full queue blocks its senders and an empty one blocks its receivers. A blocked sender
//! parks its item next to the queue; the receiver that frees a slot moves the item in and wakes
//! the sender, so items keep their order and no slot can be stolen by a task that did not wait.

use core::cell::RefCell;

use critical_section::Mutex as CsMutex;
use heapless::{Deque, Vec};

use crate::{
    Error, Kernel, Port, TaskId,
    scheduler::{KernelState, MAX_NUM_TASKS, Switch, WaitKind},
    wait_list::WaitList,
};

/// An item waiting for a free slot, owned by its blocked sender.
struct Pending<T> {
    task: TaskId,
    item: T,
}

struct QueueState<T, const N: usize> {
    items: Deque<T, N>,
    pending: Vec<Pending<T>, MAX_NUM_TASKS>,
    senders: WaitList,
    receivers: WaitList,
    closed: bool,
}

impl<T, const N: usize> QueueState<T, N> {
    /// Moves the item of the highest-priority blocked sender into the queue.
    fn admit_sender(&mut self, state: &mut KernelState) {
        if self.closed || self.items.is_full() {
            return;
        }
        let Some(sender) = self.senders.pop_highest(state) else {
            return;
        };

        if let Some(idx) = self.pending.iter().position(|p| p.task == sender) {
            let pending = self.pending.remove(idx);
            self.items
                .push_back(pending.item)
                .unwrap_or_else(|_| unreachable!());
        }
        state.unblock(sender);
    }

    fn wake_receiver(&mut self, state: &mut KernelState) {
        if let Some(receiver) = self.receivers.pop_highest(state) {
            state.unblock(receiver);
        }
    }
}

enum SendStep {
    Done(Switch),
    Blocked(TaskId, Switch),
}

enum ReceiveStep<T> {
    Item(T, Switch),
    Blocked(TaskId, Switch),
}

/// A FIFO queue of at most `N` items.
pub struct BoundedQueue<T, const N: usize> {
    inner: CsMutex<RefCell<QueueState<T, N>>>,
}

impl<T, const N: usize> BoundedQueue<T, N> {
    pub const fn new() -> Self {
        assert!(N > 0, "queue capacity must be at least 1");

        Self {
            inner: CsMutex::new(RefCell::new(QueueState {
                items: Deque::new(),
                pending: Vec::new(),
                senders: WaitList::new(),
                receivers: WaitList::new(),
                closed: false,
            })),
        }
    }

    /// Appends an item, blocking the current task while the queue is full.
    ///
    /// Fails with [`Error::QueueClosed`] if the queue is or gets closed before the item is
    /// accepted; the item is dropped in that case.
    pub fn send<P: Port>(&self, kernel: &Kernel<P>, item: T) -> Result<(), Error> {
        kernel.check_halted()?;

        let step = critical_section::with(|cs| {
            let mut queue = self.inner.borrow_ref_mut(cs);
            let mut state = kernel.state(cs);
            if queue.closed {
                return Err(Error::QueueClosed);
            }

            let item = match queue.items.push_back(item) {
                Ok(()) => {
                    queue.wake_receiver(&mut state);
                    return Ok(SendStep::Done(state.pick_switch()));
                }
                Err(item) => item,
            };

            state.ensure_can_block()?;
            let me = state.current_task;
            queue
                .pending
                .push(Pending { task: me, item })
                .or(Err(Error::TaskFull))?;
            queue.senders.push(me)?;
            state.block_current(WaitKind::Object);
            trace!("Task #{} waits for queue space", me.index());

            Ok(SendStep::Blocked(me, state.pick_switch()))
        })?;

        let (me, switch) = match step {
            SendStep::Done(switch) => {
                kernel.switch(switch);
                return Ok(());
            }
            SendStep::Blocked(me, switch) => (me, switch),
        };
        kernel.switch(switch);

        // A receiver takes the parked item before waking the sender
        critical_section::with(|cs| {
            let mut queue = self.inner.borrow_ref_mut(cs);
            let Some(idx) = queue.pending.iter().position(|p| p.task == me) else {
                return Ok(());
            };
            queue.pending.remove(idx);
            queue.senders.remove(me);

            if queue.closed {
                Err(Error::QueueClosed)
            } else {
                Err(Error::Halted)
            }
        })
    }

    /// Appends an item if there is room, without blocking.
    pub fn try_send<P: Port>(&self, kernel: &Kernel<P>, item: T) -> Result<(), Error> {
        let switch = critical_section::with(|cs| {
            let mut queue = self.inner.borrow_ref_mut(cs);
            let mut state = kernel.state(cs);
            if queue.closed {
                return Err(Error::QueueClosed);
            }

            queue
                .items
                .push_back(item)
                .or(Err(Error::QueueFull))?;
            queue.wake_receiver(&mut state);
            Ok(state.pick_switch())
        })?;

        kernel.switch(switch);
        Ok(())
    }

    /// Removes the oldest item, blocking the current task while the queue is empty.
    ///
    /// Items sent before [`BoundedQueue::close`] are still delivered; once they are drained
    /// this fails with [`Error::QueueClosed`].
    pub fn receive<P: Port>(&self, kernel: &Kernel<P>) -> Result<T, Error> {
        loop {
            kernel.check_halted()?;

            let step = critical_section::with(|cs| {
                let mut queue = self.inner.borrow_ref_mut(cs);
                let mut state = kernel.state(cs);

                if let Some(item) = queue.items.pop_front() {
                    queue.admit_sender(&mut state);
                    return Ok(ReceiveStep::Item(item, state.pick_switch()));
                }
                if queue.closed {
                    return Err(Error::QueueClosed);
                }

                state.ensure_can_block()?;
                let me = state.current_task;
                queue.receivers.push(me)?;
                state.block_current(WaitKind::Object);
                Ok(ReceiveStep::Blocked(me, state.pick_switch()))
            })?;

            match step {
                ReceiveStep::Item(item, switch) => {
                    kernel.switch(switch);
                    return Ok(item);
                }
                ReceiveStep::Blocked(me, switch) => {
                    kernel.switch(switch);
                    // Another receiver may have taken the item we were woken for
                    critical_section::with(|cs| self.inner.borrow_ref_mut(cs).receivers.remove(me));
                }
            }
        }
    }

    /// Removes the oldest item if there is one, without blocking.
    pub fn try_receive<P: Port>(&self, kernel: &Kernel<P>) -> Result<Option<T>, Error> {
        let (item, switch) = critical_section::with(|cs| {
            let mut queue = self.inner.borrow_ref_mut(cs);
            let mut state = kernel.state(cs);

            match queue.items.pop_front() {
                Some(item) => {
                    queue.admit_sender(&mut state);
                    Ok((Some(item), state.pick_switch()))
                }
                None if queue.closed => Err(Error::QueueClosed),
                None => Ok((None, None)),
            }
        })?;

        kernel.switch(switch);
        Ok(item)
    }

    /// Refuses further items and wakes every blocked task.
    ///
    /// Blocked senders fail with [`Error::QueueClosed`] and their items are dropped. Items
    /// already queued stay available to receivers.
    pub fn close<P: Port>(&self, kernel: &Kernel<P>) {
        let switch = critical_section::with(|cs| {
            let mut queue = self.inner.borrow_ref_mut(cs);
            let mut state = kernel.state(cs);
            if queue.closed {
                return None;
            }
            queue.closed = true;

            for id in queue.senders.take_all() {
                state.unblock(id);
            }
            for id in queue.receivers.take_all() {
                state.unblock(id);
            }
            debug!("Queue closed with {} items left", queue.items.len());
            state.pick_switch()
        });

        kernel.switch(switch);
    }

    pub fn len(&self) -> usize {
        critical_section::with(|cs| self.inner.borrow_ref(cs).items.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_full(&self) -> bool {
        self.len() == N
    }

    pub fn is_closed(&self) -> bool {
        critical_section::with(|cs| self.inner.borrow_ref(cs).closed)
    }

    pub const fn capacity(&self) -> usize {
        N
    }
}

impl<T, const N: usize> Default for BoundedQueue<T, N> {
    fn default() -> Self {
        Self::new()
    }
}
