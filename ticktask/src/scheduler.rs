//! Fixed-priority preemptive scheduler.
//!
//! The highest-priority Ready task always runs. Tasks of equal priority run to block: there is
//! no time slicing, a preempted task resumes ahead of its peers and a task woken from a wait
//! joins the back of its priority level.

use core::{
    cell::{RefCell, RefMut},
    sync::atomic::Ordering,
};

use critical_section::{CriticalSection, Mutex};
use heapless::{Deque, Vec};
use portable_atomic::AtomicBool;

use crate::{Error, MAX_WAIT, Port, TaskConfig, TaskId, TaskState, TaskStats, Tick};

pub const MAX_NUM_TASKS: usize = 16;
pub const MAX_PRIORITY: usize = 10;
pub(crate) const IDLE_PRIORITY: usize = 0;

const QUEUE_LEN: usize = MAX_NUM_TASKS + 1;

/// A pending context switch `(from, to)`, performed after leaving the critical section.
pub(crate) type Switch = Option<(TaskId, TaskId)>;

/// What a blocked task is waiting for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum WaitKind {
    Timer,
    /// A mutex or a queue
    Object,
}

/// Task Control Block (TCB)
#[derive(Clone, Debug)]
pub(crate) struct TaskInfo {
    pub(crate) name: &'static str,
    pub(crate) base_priority: usize,
    /// Effective priority, raised above `base_priority` while inheriting
    pub(crate) priority: usize,
    pub(crate) period: u32,
    pub(crate) last_release: Tick,
    pub(crate) state: TaskState,
    pub(crate) waiting_on: Option<WaitKind>,
    pub(crate) mutexes_held: usize,
    pub(crate) stats: TaskStats,
}

impl TaskInfo {
    fn new(name: &'static str, priority: usize, period: u32, now: Tick, state: TaskState) -> Self {
        Self {
            name,
            base_priority: priority,
            priority,
            period,
            last_release: now,
            state,
            waiting_on: None,
            mutexes_held: 0,
            stats: TaskStats::default(),
        }
    }
}

#[derive(Clone, Copy, Debug)]
struct Wakeup {
    time: Tick,
    task: TaskId,
}

pub(crate) struct KernelState {
    tasks: [Option<TaskInfo>; MAX_NUM_TASKS],
    /// Ready queues for each effective priority
    queues: [Deque<TaskId, QUEUE_LEN>; MAX_PRIORITY + 1],
    /// One-shot wakeups in arming order. A task has at most one.
    timers: Vec<Wakeup, MAX_NUM_TASKS>,
    pub(crate) current_task: TaskId,
    pub(crate) now: Tick,
    started: bool,
}

impl KernelState {
    fn new(start: Tick) -> Self {
        let mut tasks = [const { None }; MAX_NUM_TASKS];
        // Reserve Task #0 for the idle task, which owns the CPU until the kernel starts
        tasks[TaskId::IDLE.index()] = Some(TaskInfo::new(
            "idle",
            IDLE_PRIORITY,
            0,
            start,
            TaskState::Running,
        ));

        Self {
            tasks,
            queues: [const { Deque::new() }; MAX_PRIORITY + 1],
            timers: Vec::new(),
            current_task: TaskId::IDLE,
            now: start,
            started: false,
        }
    }

    pub(crate) fn task(&self, id: TaskId) -> Result<&TaskInfo, Error> {
        self.tasks
            .get(id.index())
            .and_then(Option::as_ref)
            .ok_or(Error::NotFound)
    }

    pub(crate) fn task_mut(&mut self, id: TaskId) -> Result<&mut TaskInfo, Error> {
        self.tasks
            .get_mut(id.index())
            .and_then(Option::as_mut)
            .ok_or(Error::NotFound)
    }

    pub(crate) fn current_mut(&mut self) -> &mut TaskInfo {
        let id = self.current_task;
        // The running task always has a TCB
        self.task_mut(id).unwrap_or_else(|_| unreachable!())
    }

    pub(crate) fn priority_of(&self, id: TaskId) -> usize {
        self.task(id).map_or(IDLE_PRIORITY, |task| task.priority)
    }

    /// Blocking is only possible from a real task once the kernel runs.
    pub(crate) fn ensure_can_block(&self) -> Result<(), Error> {
        if self.started && self.current_task != TaskId::IDLE {
            Ok(())
        } else {
            Err(Error::InvalidState)
        }
    }

    pub(crate) fn block_current(&mut self, kind: WaitKind) {
        let task = self.current_mut();
        task.state = TaskState::Blocked;
        task.waiting_on = Some(kind);
    }

    fn make_ready(&mut self, id: TaskId) {
        let Ok(task) = self.task_mut(id) else {
            return;
        };
        task.state = TaskState::Ready;
        task.waiting_on = None;
        let priority = task.priority;

        self.queues[priority]
            .push_back(id)
            .unwrap_or_else(|_| unreachable!());
    }

    /// Makes a blocked task Ready again. Tasks in any other state are left alone.
    pub(crate) fn unblock(&mut self, id: TaskId) {
        let Ok(task) = self.task(id) else {
            return;
        };
        if task.state != TaskState::Blocked {
            return;
        }
        if task.waiting_on == Some(WaitKind::Timer) {
            self.cancel_timer(id);
        }

        self.make_ready(id);
        trace!("Task #{} is unblocked", id.index());
    }

    fn remove_from_ready(&mut self, id: TaskId, priority: usize) {
        let queue = &mut self.queues[priority];
        let mut kept = Deque::new();
        while let Some(elem) = queue.pop_front() {
            if elem != id {
                kept.push_back(elem).unwrap_or_else(|_| unreachable!());
            }
        }
        *queue = kept;
    }

    /// Changes the effective priority, moving a Ready task to its new ready queue.
    pub(crate) fn set_priority(&mut self, id: TaskId, priority: usize) {
        let Ok(task) = self.task_mut(id) else {
            return;
        };
        let old = task.priority;
        if old == priority {
            return;
        }
        task.priority = priority;

        if task.state == TaskState::Ready {
            self.remove_from_ready(id, old);
            self.queues[priority]
                .push_back(id)
                .unwrap_or_else(|_| unreachable!());
        }
    }

    /// Lends `priority` to `holder` if it is higher than the holder's current one.
    pub(crate) fn inherit_priority(&mut self, holder: TaskId, priority: usize) {
        if self.priority_of(holder) < priority {
            debug!("Task #{} inherits priority {}", holder.index(), priority);
            self.set_priority(holder, priority);
        }
    }

    /// Drops inherited priority once the task holds no mutex anymore.
    pub(crate) fn disinherit_priority(&mut self, id: TaskId) {
        let Ok(task) = self.task(id) else {
            return;
        };
        if task.mutexes_held == 0 {
            let base = task.base_priority;
            self.set_priority(id, base);
        }
    }

    pub(crate) fn arm_timer(&mut self, task: TaskId, time: Tick) -> Result<(), Error> {
        self.timers
            .push(Wakeup { time, task })
            .or(Err(Error::TimerFull))
    }

    fn cancel_timer(&mut self, task: TaskId) {
        self.timers.retain(|wakeup| wakeup.task != task);
    }

    fn highest_ready_priority(&self) -> Option<usize> {
        (0..=MAX_PRIORITY)
            .rev()
            .find(|priority| !self.queues[*priority].is_empty())
    }

    /// Selects the task that should run now and records it as current.
    ///
    /// Returns the switch to perform, or `None` when the current task keeps the CPU.
    pub(crate) fn pick_switch(&mut self) -> Switch {
        if !self.started {
            return None;
        }

        let from = self.current_task;
        let running = self
            .task(from)
            .ok()
            .filter(|task| task.state == TaskState::Running)
            .map(|task| task.priority);
        let highest = self.highest_ready_priority()?;

        if let Some(priority) = running {
            if highest <= priority {
                return None;
            }
            // A preempted task resumes ahead of its peers
            if let Ok(task) = self.task_mut(from) {
                task.state = TaskState::Ready;
            }
            self.queues[priority]
                .push_front(from)
                .unwrap_or_else(|_| unreachable!());
        }

        let to = self.queues[highest].pop_front()?;
        if let Ok(task) = self.task_mut(to) {
            task.state = TaskState::Running;
        }
        self.current_task = to;

        (to != from).then_some((from, to))
    }

    /// Advances time by one tick and wakes the tasks whose deadline has come.
    fn advance(&mut self) {
        self.now = self.now + 1;
        let now = self.now;
        let current = self.current_task;
        if let Ok(task) = self.task_mut(current) {
            task.stats.run_ticks += 1;
        }

        let mut due: Vec<TaskId, MAX_NUM_TASKS> = Vec::new();
        for wakeup in self.timers.iter().filter(|w| now.has_reached(w.time)) {
            due.push(wakeup.task).unwrap_or_else(|_| unreachable!());
        }
        if due.is_empty() {
            return;
        }
        self.timers.retain(|wakeup| !now.has_reached(wakeup.time));

        for id in due {
            if self.task(id).map(|task| task.state) == Ok(TaskState::Blocked) {
                self.make_ready(id);
                trace!("Task #{} woken at tick {}", id.index(), now.raw());
            }
        }
    }
}

#[derive(Clone, Debug)]
#[non_exhaustive]
pub struct KernelConfig {
    pub tick_freq: u32,
    pub start_tick: Tick,
}

impl KernelConfig {
    pub fn with_tick_freq(self, tick_freq: u32) -> Self {
        Self { tick_freq, ..self }
    }

    /// Sets the tick value the kernel starts counting from.
    pub fn with_start_tick(self, start_tick: Tick) -> Self {
        Self { start_tick, ..self }
    }
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            tick_freq: 1000,
            start_tick: Tick::new(0),
        }
    }
}

pub struct Kernel<P: Port> {
    port: P,
    config: KernelConfig,
    halted: AtomicBool,
    state: Mutex<RefCell<KernelState>>,
}

impl<P: Port> Kernel<P> {
    pub fn new(port: P, config: KernelConfig) -> Self {
        let state = KernelState::new(config.start_tick);

        Self {
            port,
            config,
            halted: AtomicBool::new(false),
            state: Mutex::new(RefCell::new(state)),
        }
    }

    pub fn port(&self) -> &P {
        &self.port
    }

    pub fn config(&self) -> &KernelConfig {
        &self.config
    }

    pub(crate) fn state<'cs>(&'cs self, cs: CriticalSection<'cs>) -> RefMut<'cs, KernelState> {
        self.state.borrow_ref_mut(cs)
    }

    /// Registers a new task in the Ready state.
    ///
    /// This only creates the control block; the port is responsible for preparing the execution
    /// context and calling [`Kernel::reschedule`] once the task can be switched to.
    pub fn create_task(&self, config: TaskConfig) -> Result<TaskId, Error> {
        if config.priority == IDLE_PRIORITY || config.priority > MAX_PRIORITY {
            return Err(Error::InvalidPriority);
        }
        if config.period > MAX_WAIT {
            return Err(Error::InvalidPeriod);
        }

        let id = critical_section::with(|cs| {
            let mut state = self.state(cs);

            let Some(free_idx) = state.tasks.iter().position(Option::is_none) else {
                return Err(Error::TaskFull);
            };

            let now = state.now;
            state.tasks[free_idx] = Some(TaskInfo::new(
                config.name,
                config.priority,
                config.period,
                now,
                TaskState::Ready,
            ));
            state.queues[config.priority]
                .push_back(TaskId(free_idx))
                .or(Err(Error::TaskFull))?;

            Ok(TaskId(free_idx))
        })?;

        info!(
            "Task #{} ({}) created (priority {}, period {})",
            id.index(),
            config.name,
            config.priority,
            config.period
        );

        Ok(id)
    }

    /// Removes a task that has never run, e.g. because its execution context could not be created.
    pub fn discard_task(&self, id: TaskId) -> Result<(), Error> {
        critical_section::with(|cs| {
            let mut state = self.state(cs);
            let task = state.task(id)?;
            if id == TaskId::IDLE || task.state != TaskState::Ready {
                return Err(Error::InvalidState);
            }
            let priority = task.priority;
            state.remove_from_ready(id, priority);
            state.tasks[id.index()] = None;
            Ok(())
        })?;

        debug!("Task #{} discarded", id.index());
        Ok(())
    }

    /// Starts scheduling. The caller continues as the idle task.
    pub fn start(&self) {
        let switch = critical_section::with(|cs| {
            let mut state = self.state(cs);
            if state.started {
                return None;
            }
            state.started = true;
            info!("Kernel started at tick {}", state.now.raw());
            state.pick_switch()
        });

        self.switch(switch);
    }

    /// Switches to a higher-priority task if one became Ready.
    pub fn reschedule(&self) {
        let switch = critical_section::with(|cs| self.state(cs).pick_switch());
        self.switch(switch);
    }

    pub(crate) fn switch(&self, switch: Switch) {
        if let Some((from, to)) = switch {
            trace!("Context switch: #{} -> #{}", from.index(), to.index());
            self.port.switch(from, to);
        }
    }

    /// Moves the running task behind the other Ready tasks of its priority.
    pub fn yield_now(&self) {
        let switch = critical_section::with(|cs| {
            let mut state = self.state(cs);
            if !state.started {
                return None;
            }
            let id = state.current_task;
            let task = state.current_mut();
            task.state = TaskState::Ready;
            let priority = task.priority;
            state.queues[priority]
                .push_back(id)
                .unwrap_or_else(|_| unreachable!());
            state.pick_switch()
        });

        self.switch(switch);
    }

    /// Advances the kernel time by one tick.
    ///
    /// Must be called in the context of the running task, as a tick interrupt would be.
    /// Wakes the tasks whose deadline has come and preempts the caller if one of them has a
    /// higher priority.
    pub fn tick(&self) {
        let switch = critical_section::with(|cs| {
            let mut state = self.state(cs);
            state.advance();
            state.pick_switch()
        });

        self.switch(switch);
    }

    /// Takes a task out of scheduling until [`Kernel::resume`] is called.
    ///
    /// Ready and sleeping tasks can be suspended; a task blocked on a mutex or a queue cannot
    /// (`InvalidState`). Suspending an already suspended task does nothing.
    pub fn suspend(&self, id: TaskId) -> Result<(), Error> {
        if id == TaskId::IDLE {
            return Err(Error::InvalidState);
        }

        let (switch, suspended_self) = critical_section::with(|cs| {
            let mut state = self.state(cs);
            let (run_state, waiting_on, priority) = {
                let task = state.task(id)?;
                (task.state, task.waiting_on, task.priority)
            };

            match (run_state, waiting_on) {
                (TaskState::Suspended, _) => return Ok((None, false)),
                (TaskState::Blocked, Some(WaitKind::Object)) => return Err(Error::InvalidState),
                (TaskState::Blocked, _) => state.cancel_timer(id),
                (TaskState::Ready, _) => state.remove_from_ready(id, priority),
                (TaskState::Running, _) => {}
            }

            let task = state.task_mut(id)?;
            task.state = TaskState::Suspended;
            task.waiting_on = None;

            let suspended_self = id == state.current_task;
            Ok((state.pick_switch(), suspended_self))
        })?;

        debug!("Task #{} suspended", id.index());
        self.switch(switch);

        if suspended_self {
            self.check_halted()?;
        }
        Ok(())
    }

    /// Makes a suspended task Ready again. Resuming a task that is not suspended does nothing.
    ///
    /// The periodic phase of the task restarts at the current tick.
    pub fn resume(&self, id: TaskId) -> Result<(), Error> {
        let switch = critical_section::with(|cs| {
            let mut state = self.state(cs);
            let now = state.now;
            let task = state.task_mut(id)?;
            if task.state != TaskState::Suspended {
                return Ok(None);
            }
            task.last_release = now;

            state.make_ready(id);
            debug!("Task #{} resumed", id.index());
            Ok(state.pick_switch())
        })?;

        self.switch(switch);
        Ok(())
    }

    pub fn current_task(&self) -> TaskId {
        critical_section::with(|cs| self.state(cs).current_task)
    }

    pub fn task_state(&self, id: TaskId) -> Result<TaskState, Error> {
        critical_section::with(|cs| self.state(cs).task(id).map(|task| task.state))
    }

    /// Effective priority, including any inherited one.
    pub fn task_priority(&self, id: TaskId) -> Result<usize, Error> {
        critical_section::with(|cs| self.state(cs).task(id).map(|task| task.priority))
    }

    pub fn task_name(&self, id: TaskId) -> Result<&'static str, Error> {
        critical_section::with(|cs| self.state(cs).task(id).map(|task| task.name))
    }

    pub fn task_stats(&self, id: TaskId) -> Result<TaskStats, Error> {
        critical_section::with(|cs| self.state(cs).task(id).map(|task| task.stats))
    }

    /// True while any task is Ready or a timer is armed.
    pub fn has_pending_work(&self) -> bool {
        critical_section::with(|cs| {
            let state = self.state(cs);
            !state.timers.is_empty()
                || (IDLE_PRIORITY + 1..=MAX_PRIORITY).any(|p| !state.queues[p].is_empty())
        })
    }

    /// Stops the system: every task is made Ready and each blocking call fails with
    /// [`Error::Halted`] from now on, so that task loops unwind and return.
    ///
    /// Must be called from the idle task.
    pub fn halt(&self) {
        self.halted.store(true, Ordering::SeqCst);

        let switch = critical_section::with(|cs| {
            let mut state = self.state(cs);
            // Tasks that never ran still have to be scheduled once to finish
            state.started = true;
            state.timers.clear();
            for index in 1..MAX_NUM_TASKS {
                let id = TaskId(index);
                if matches!(
                    state.task(id).map(|task| task.state),
                    Ok(TaskState::Blocked | TaskState::Suspended)
                ) {
                    state.make_ready(id);
                }
            }
            state.pick_switch()
        });

        info!("Kernel halted");
        self.switch(switch);
    }

    pub fn is_halted(&self) -> bool {
        self.halted.load(Ordering::SeqCst)
    }

    pub(crate) fn check_halted(&self) -> Result<(), Error> {
        if self.is_halted() {
            Err(Error::Halted)
        } else {
            Ok(())
        }
    }

    /// Removes the running task after its entry function returned and hands the CPU on.
    ///
    /// Called by ports; the calling context must not run task code afterwards.
    pub fn finish_current(&self) {
        let (id, switch) = critical_section::with(|cs| {
            let mut state = self.state(cs);
            let id = state.current_task;
            if id == TaskId::IDLE {
                return (id, None);
            }
            state.cancel_timer(id);
            state.tasks[id.index()] = None;
            (id, state.pick_switch())
        });

        info!("Task #{} finished", id.index());

        if let Some((from, to)) = switch {
            self.port.exit(from, to);
        }
    }
}
