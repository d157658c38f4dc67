//! Test of several producers feeding one serial consumer


use std::sync::Arc;

use ticktask::{Error as KernelError, Message, TaskConfig};
use ticktask_host::RunOutcome;
use ticktask_utils::{
    EdgeDetector, Error, IoError, Level, PinId, System,
    tasks::{EdgeReport, edge_reporter, periodic_emitter, serial_consumer},
};

use utils::{Recorder, ScriptedGpio, SharedSerial, simulator};

fn message(text: &str) -> Message {
    Message::try_from(text).unwrap()
}

#[test]
fn every_message_is_forwarded_once_in_producer_order() {
    let mut sim = simulator();
    let serial = SharedSerial::default();
    let system = Arc::new(System::<SharedSerial>::new(serial.clone()));

    for (producer, gap) in [("A", 1), ("B", 2)] {
        let kernel = sim.kernel().clone();
        let system = system.clone();
        sim.spawn(
            TaskConfig::default().with_name(producer),
            move || -> Result<(), KernelError> {
                for n in 0..5 {
                    let text = format!("{}{}\n", producer, n);
                    system.events().send(&kernel, message(&text))?;
                    kernel.sleep(gap)?;
                }
                Ok(())
            },
        )
        .unwrap();
    }

    let kernel = sim.kernel().clone();
    let shared = system.clone();
    sim.spawn(TaskConfig::default().with_name("consumer"), move || {
        serial_consumer(&*kernel, shared.events(), shared.serial())
    })
    .unwrap();

    assert_eq!(sim.run_for(100), RunOutcome::Quiescent);
    sim.shutdown();
    assert!(system.events().is_empty());

    let system = Arc::into_inner(system).unwrap();
    let text = system.into_serial().text();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.len(), 10);
    for producer in ["A", "B"] {
        let sent: Vec<String> = (0..5).map(|n| format!("{}{}", producer, n)).collect();
        let forwarded: Vec<String> = lines
            .iter()
            .filter(|line| line.starts_with(producer))
            .map(|line| line.to_string())
            .collect();
        assert_eq!(forwarded, sent);
    }
    assert_eq!(text, serial.text());
}

#[test]
fn edges_and_periodic_messages_reach_the_serial_port() {
    let mut sim = simulator();
    let serial = SharedSerial::default();
    let system = Arc::new(System::<SharedSerial>::new(serial.clone()));
    let gpio = Arc::new(
        ScriptedGpio::new(sim.kernel().clone())
            .with_input(PinId(0), &[(25, Level::High), (62, Level::Low)])
            .with_input(PinId(1), &[(40, Level::High), (90, Level::Low)]),
    );

    for (pin, rising, falling) in [
        (0, "Button1 rising edge\n", "Button1 falling edge\n"),
        (1, "Button2 rising edge\n", "Button2 falling edge\n"),
    ] {
        let kernel = sim.kernel().clone();
        let (system, gpio) = (system.clone(), gpio.clone());
        let report = EdgeReport {
            rising: message(rising),
            falling: message(falling),
        };
        sim.spawn(TaskConfig::default().with_period(10), move || {
            let detector = EdgeDetector::new(PinId(pin), Level::Low);
            edge_reporter(&*kernel, &*gpio, system.events(), detector, &report)
        })
        .unwrap();
    }

    let kernel = sim.kernel().clone();
    let shared = system.clone();
    sim.spawn(TaskConfig::default().with_period(100), move || {
        periodic_emitter(&*kernel, shared.events(), message("Sprints100\n"))
    })
    .unwrap();

    let kernel = sim.kernel().clone();
    let shared = system.clone();
    sim.spawn(TaskConfig::default(), move || {
        serial_consumer(&*kernel, shared.events(), shared.serial())
    })
    .unwrap();

    assert_eq!(sim.run_for(105), RunOutcome::Deadline);
    assert_eq!(
        serial.text(),
        "Sprints100\n\
         Button1 rising edge\n\
         Button2 rising edge\n\
         Button1 falling edge\n\
         Button2 falling edge\n\
         Sprints100\n"
    );
}

#[test]
fn serial_failure_ends_the_consumer() {
    let mut sim = simulator();
    let serial = SharedSerial::failing_at(2);
    let system = Arc::new(System::<SharedSerial>::new(serial.clone()));
    let outcome = Recorder::new();

    let kernel = sim.kernel().clone();
    let shared = system.clone();
    sim.spawn(TaskConfig::default().with_period(5), move || {
        periodic_emitter(&*kernel, shared.events(), message("tick\n"))
    })
    .unwrap();

    let kernel = sim.kernel().clone();
    let (put, shared) = (outcome.clone(), system.clone());
    let consumer = sim
        .spawn(TaskConfig::default(), move || -> Result<(), Error> {
            let Err(err) = serial_consumer(&*kernel, shared.events(), shared.serial());
            put.push(err);
            Err(err)
        })
        .unwrap();

    sim.run_for(100);

    assert_eq!(outcome.snapshot(), [Error::Io(IoError)]);
    assert_eq!(serial.text(), "tick\ntick\n");
    assert_eq!(
        sim.kernel().task_state(consumer),
        Err(KernelError::NotFound)
    );
    // Nobody drains the queue anymore, so the emitter ends up blocked on it
    assert!(system.events().is_full());
}
