//! Hosted port for [ticktask]: runs tasks on OS threads with a simulated tick.
//!
//! Every task gets its own thread, but only the thread holding the baton executes, so the
//! program behaves as if it ran on a single processor. The thread driving the [`Simulator`]
//! plays the idle task. It advances time while no task is Ready; tasks that want to model
//! computation consume ticks with [`simulate_work`], during which they may be preempted.

use std::{
    any::Any,
    fmt, io,
    panic::{self, AssertUnwindSafe},
    sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError},
    thread::{self, JoinHandle},
};

use ticktask::{Error, Kernel, KernelConfig, Port, TaskConfig, TaskId, Tick};

/// Context switching between task threads.
pub struct HostPort {
    /// Task allowed to run
    baton: Mutex<TaskId>,
    turn: Condvar,
}

impl HostPort {
    fn new() -> Self {
        Self {
            baton: Mutex::new(TaskId::IDLE),
            turn: Condvar::new(),
        }
    }

    fn baton(&self) -> MutexGuard<'_, TaskId> {
        // A task panicking elsewhere must not take the whole simulation down with it
        self.baton.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn hand_over(&self, to: TaskId) {
        *self.baton() = to;
        self.turn.notify_all();
    }

    fn wait_for_turn(&self, id: TaskId) {
        let mut baton = self.baton();
        while *baton != id {
            baton = self.turn.wait(baton).unwrap_or_else(PoisonError::into_inner);
        }
    }
}

impl Port for HostPort {
    fn switch(&self, from: TaskId, to: TaskId) {
        self.hand_over(to);
        self.wait_for_turn(from);
    }

    fn exit(&self, _from: TaskId, to: TaskId) {
        self.hand_over(to);
    }
}

#[derive(Debug)]
pub enum SpawnError {
    Kernel(Error),
    Thread(io::Error),
}

impl fmt::Display for SpawnError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SpawnError::Kernel(err) => write!(f, "cannot create task: {}", err),
            SpawnError::Thread(err) => write!(f, "cannot start task thread: {}", err),
        }
    }
}

impl std::error::Error for SpawnError {}

impl From<Error> for SpawnError {
    fn from(value: Error) -> Self {
        SpawnError::Kernel(value)
    }
}

/// Why [`Simulator::run_for`] returned.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunOutcome {
    /// The requested time has elapsed.
    Deadline,
    /// Every task waits for an event that no timer will produce.
    Quiescent,
}

type PanicPayload = Box<dyn Any + Send + 'static>;

pub struct Simulator {
    kernel: Arc<Kernel<HostPort>>,
    threads: Vec<JoinHandle<()>>,
    panics: Arc<Mutex<Vec<PanicPayload>>>,
}

impl Simulator {
    pub fn new(config: KernelConfig) -> Self {
        Self {
            kernel: Arc::new(Kernel::new(HostPort::new(), config)),
            threads: Vec::new(),
            panics: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// The kernel shared with the tasks.
    pub fn kernel(&self) -> &Arc<Kernel<HostPort>> {
        &self.kernel
    }

    /// Creates a task running `entry` on its own thread.
    ///
    /// The task ends when `entry` returns; an error it returns is logged. If the kernel is
    /// already running, the new task preempts the caller right away when its priority allows.
    pub fn spawn<F, T, E>(&mut self, config: TaskConfig, entry: F) -> Result<TaskId, SpawnError>
    where
        F: FnOnce() -> Result<T, E> + Send + 'static,
        E: fmt::Debug,
    {
        let name = config.name();
        let id = self.kernel.create_task(config)?;

        let kernel = self.kernel.clone();
        let panics = self.panics.clone();
        let spawned = thread::Builder::new()
            .name(name.into())
            .spawn(move || {
                kernel.port().wait_for_turn(id);

                match panic::catch_unwind(AssertUnwindSafe(entry)) {
                    Ok(Ok(_)) => log::debug!("Task #{} ({}) returned", id.index(), name),
                    Ok(Err(err)) => log::info!("Task #{} ({}) ended: {:?}", id.index(), name, err),
                    Err(payload) => {
                        log::error!("Task #{} ({}) panicked", id.index(), name);
                        panics
                            .lock()
                            .unwrap_or_else(PoisonError::into_inner)
                            .push(payload);
                    }
                }

                kernel.finish_current();
            });

        match spawned {
            Ok(handle) => self.threads.push(handle),
            Err(err) => {
                self.kernel.discard_task(id)?;
                return Err(SpawnError::Thread(err));
            }
        }

        self.kernel.reschedule();
        Ok(id)
    }

    pub fn now(&self) -> Tick {
        self.kernel.now()
    }

    /// Starts the kernel if needed and lets the system run for `ticks` ticks.
    ///
    /// Time may overshoot the deadline when a task simulates work past it. A panic raised by a
    /// task is propagated to the caller.
    pub fn run_for(&mut self, ticks: u32) -> RunOutcome {
        let deadline = self.kernel.now() + ticks;
        self.kernel.start();
        self.propagate_panics();

        while !self.kernel.now().has_reached(deadline) {
            if !self.kernel.has_pending_work() {
                log::debug!("Simulation quiescent at tick {}", self.kernel.now());
                return RunOutcome::Quiescent;
            }
            self.kernel.tick();
            self.propagate_panics();
        }

        RunOutcome::Deadline
    }

    /// Halts the kernel and waits until every task thread has ended.
    pub fn shutdown(&mut self) {
        if self.threads.is_empty() {
            return;
        }

        self.kernel.halt();
        for handle in self.threads.drain(..) {
            if handle.join().is_err() {
                log::warn!("Task thread ended abnormally");
            }
        }
    }

    fn propagate_panics(&self) {
        let payload = self
            .panics
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop();
        if let Some(payload) = payload {
            panic::resume_unwind(payload);
        }
    }
}

impl Drop for Simulator {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Keeps the running task busy for `ticks` ticks, as if it were computing.
///
/// Each tick may wake and switch to a higher-priority task, in which case the remaining work
/// continues once the caller is scheduled again.
pub fn simulate_work<P: Port>(kernel: &Kernel<P>, ticks: u32) -> Result<(), Error> {
    for _ in 0..ticks {
        if kernel.is_halted() {
            return Err(Error::Halted);
        }
        kernel.tick();
    }

    Ok(())
}
