// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Test of the mutex handoff and priority inheritance


use std::sync::Arc;

use ticktask::{Error, Mutex, RawMutex, TaskConfig, Tick};
use ticktask_host::simulate_work;
use ticktask_utils::{System, tasks::{Banner, guarded_writer}};

use utils::{Recorder, SharedSerial, simulator};

#[test]
fn waiter_acquires_at_the_release_tick() {
    let mut sim = simulator();
    let events = Recorder::new();
    let mutex = Arc::new(Mutex::new(0u32));

    let kernel = sim.kernel().clone();
    let (put, shared) = (events.clone(), mutex.clone());
    sim.spawn(
        TaskConfig::default().with_name("t1").with_priority(1),
        move || -> Result<(), Error> {
            let mut value = shared.lock(&kernel)?;
            simulate_work(&kernel, 5)?;
            *value += 1;
            put.push(("t1 releases", kernel.now().raw()));
            drop(value);
            put.push(("t1 continues", kernel.now().raw()));
            Ok(())
        },
    )
    .unwrap();

    let kernel = sim.kernel().clone();
    let (put, shared) = (events.clone(), mutex.clone());
    sim.spawn(
        TaskConfig::default().with_name("t2").with_priority(2),
        move || -> Result<(), Error> {
            kernel.sleep(2)?;
            put.push(("t2 waits", kernel.now().raw()));
            let mut value = shared.lock(&kernel)?;
            put.push(("t2 acquires", kernel.now().raw()));
            *value += 1;
            Ok(())
        },
    )
    .unwrap();

    sim.run_for(20);
    sim.shutdown();

    assert_eq!(
        events.snapshot(),
        [
            ("t2 waits", 2),
            ("t1 releases", 5),
            ("t2 acquires", 5),
            ("t1 continues", 5),
        ]
    );
    let mutex = Arc::into_inner(mutex).unwrap();
    assert_eq!(mutex.into_inner(), 2);
}

#[test]
fn inheritance_keeps_medium_task_out() {
    let mut sim = simulator();
    let events = Recorder::new();
    let mutex = Arc::new(RawMutex::new());

    let kernel = sim.kernel().clone();
    let (put, shared) = (events.clone(), mutex.clone());
    sim.spawn(
        TaskConfig::default().with_name("low").with_priority(1),
        move || -> Result<(), Error> {
            shared.acquire(&kernel)?;
            simulate_work(&kernel, 6)?;
            let me = kernel.current_task();
            put.push(("low priority while holding", kernel.task_priority(me)? as u32));
            shared.release(&kernel)?;
            put.push(("low priority after release", kernel.task_priority(me)? as u32));
            Ok(())
        },
    )
    .unwrap();

    let kernel = sim.kernel().clone();
    let put = events.clone();
    sim.spawn(
        TaskConfig::default().with_name("medium").with_priority(2),
        move || -> Result<(), Error> {
            kernel.sleep(2)?;
            put.push(("medium starts", kernel.now().raw()));
            simulate_work(&kernel, 4)?;
            put.push(("medium ends", kernel.now().raw()));
            Ok(())
        },
    )
    .unwrap();

    let kernel = sim.kernel().clone();
    let (put, shared) = (events.clone(), mutex.clone());
    sim.spawn(
        TaskConfig::default().with_name("high").with_priority(3),
        move || -> Result<(), Error> {
            kernel.sleep(1)?;
            shared.acquire(&kernel)?;
            put.push(("high acquires", kernel.now().raw()));
            shared.release(&kernel)?;
            Ok(())
        },
    )
    .unwrap();

    sim.run_for(30);

    assert_eq!(
        events.snapshot(),
        [
            ("low priority while holding", 3),
            ("high acquires", 6),
            ("medium starts", 6),
            ("medium ends", 10),
            ("low priority after release", 1),
        ]
    );
    assert!(!mutex.is_locked());
}

#[test]
fn only_the_holder_may_release() {
    let mut sim = simulator();
    let results = Recorder::new();
    let mutex = Arc::new(RawMutex::new());

    let kernel = sim.kernel().clone();
    let (put, shared) = (results.clone(), mutex.clone());
    let holder = sim
        .spawn(
            TaskConfig::default().with_priority(2),
            move || -> Result<(), Error> {
                shared.acquire(&kernel)?;
                put.push(shared.acquire(&kernel));
                kernel.sleep(5)?;
                shared.release(&kernel)
            },
        )
        .unwrap();

    let kernel = sim.kernel().clone();
    let (put, shared) = (results.clone(), mutex.clone());
    sim.spawn(
        TaskConfig::default().with_priority(1),
        move || -> Result<(), Error> {
            put.push(shared.release(&kernel));
            put.push(shared.try_acquire(&kernel).map(|_| ()));
            Ok(())
        },
    )
    .unwrap();

    sim.run_for(1);
    assert_eq!(mutex.holder(), Some(holder));
    assert_eq!(
        results.snapshot(),
        [Err(Error::AlreadyHeld), Err(Error::NotHolder), Ok(())]
    );

    sim.run_for(10);
    assert!(!mutex.is_locked());
}

#[test]
fn try_lock_never_blocks() {
    let mut sim = simulator();
    let results = Recorder::new();
    let mutex = Arc::new(Mutex::new(0u32));

    let kernel = sim.kernel().clone();
    let shared = mutex.clone();
    sim.spawn(
        TaskConfig::default().with_name("holder").with_priority(2),
        move || -> Result<(), Error> {
            let mut value = shared.lock(&kernel)?;
            kernel.sleep(5)?;
            *value += 1;
            Ok(())
        },
    )
    .unwrap();

    let kernel = sim.kernel().clone();
    let shared = mutex.clone();
    sim.spawn(
        TaskConfig::default().with_name("waiter").with_priority(3),
        move || -> Result<(), Error> {
            kernel.sleep(1)?;
            *shared.lock(&kernel)? += 1;
            Ok(())
        },
    )
    .unwrap();

    let kernel = sim.kernel().clone();
    let (put, shared) = (results.clone(), mutex.clone());
    sim.spawn(
        TaskConfig::default().with_name("poller").with_priority(1),
        move || -> Result<(), Error> {
            let busy = shared.try_lock(&kernel)?;
            put.push(("taken at 0", busy.is_some()));
            drop(busy);

            kernel.sleep_until(Tick::new(2))?;
            put.push(("waiters at 2", shared.raw().has_waiters()));

            kernel.sleep_until(Tick::new(10))?;
            let mut free = shared.try_lock(&kernel)?;
            put.push(("taken at 10", free.is_some()));
            if let Some(value) = free.as_mut() {
                **value += 1;
            }
            drop(free);
            put.push(("waiters at 10", shared.raw().has_waiters()));
            Ok(())
        },
    )
    .unwrap();

    sim.run_for(20);
    sim.shutdown();

    assert_eq!(
        results.snapshot(),
        [
            ("taken at 0", false),
            ("waiters at 2", true),
            ("taken at 10", true),
            ("waiters at 10", false),
        ]
    );
    let mutex = Arc::into_inner(mutex).unwrap();
    assert_eq!(mutex.into_inner(), 3);
}

#[test]
fn guarded_banners_never_interleave() {
    let mut sim = simulator();
    let serial = SharedSerial::default();
    let system = Arc::new(System::<SharedSerial>::new(serial.clone()));

    let writers = [
        (
            2,
            20,
            Banner {
                header: b"100ms Task takes mutex\n",
                line: b"Sprints100\n",
                lines: 3,
                footer: b"100ms Task gives mutex\n",
                line_gap: 1,
            },
        ),
        (
            1,
            50,
            Banner {
                header: b"500ms Task takes mutex\n",
                line: b"Sprints500\n",
                lines: 3,
                footer: b"500ms Task gives mutex\n",
                line_gap: 2,
            },
        ),
    ];

    for (priority, period, banner) in writers.clone() {
        let kernel = sim.kernel().clone();
        let system = system.clone();
        sim.spawn(
            TaskConfig::default()
                .with_priority(priority)
                .with_period(period),
            move || guarded_writer(&*kernel, system.serial(), &banner),
        )
        .unwrap();
    }

    sim.run_for(200);
    // Halting cuts the banner in progress short
    let text = serial.text();
    sim.shutdown();

    let lines: Vec<&str> = text.lines().collect();
    let mut complete = [0, 0];
    for block in lines.chunks(5) {
        let (idx, banner) = writers
            .iter()
            .enumerate()
            .map(|(idx, (_, _, banner))| (idx, banner))
            .find(|(_, banner)| banner.header.trim_ascii_end() == block[0].as_bytes())
            .expect("block does not start with a header");

        let mut expected = vec![banner.header];
        expected.extend(std::iter::repeat_n(banner.line, banner.lines));
        expected.push(banner.footer);
        for (line, expected) in block.iter().zip(expected) {
            assert_eq!(line.as_bytes(), expected.trim_ascii_end());
        }
        if block.len() == 5 {
            complete[idx] += 1;
        }
    }

    assert!(complete[0] >= 5, "{:?}", complete);
    assert!(complete[1] >= 2, "{:?}", complete);
}
