//! End-to-end runs of the master against a stub bus and real shared regions.
//!
//! Verifies:
//! 1. Startup order, offsets and one complete exchange with six joints.
//! 2. The gate holds the cycle until the supervisor flag is set.
//! 3. Cancellation at the gate, inside the cycle and during the sleep.
//! 4. Failed receives and sends are counted; the loop keeps running.
//! 5. Startup failures: nothing allocated, everything released.

mod common;

use common::{
    Event, FailAt, StubDriver, TestRegions, command_for, decode_command, feedback_for, test_config,
};
use ecat_common::fieldbus::driver::BusError;
use ecat_common::fieldbus::pdo::JOINT_PROCESS_DATA_BYTES;
use ecat_common::shm::records::{JointCommand, JointData, JointFeedback, MasterStatus, SystemState};
use ecat_master::error::ActivationError;
use ecat_master::{ConfigStage, MasterError, RunError, ShutdownController};
use ecat_shm::SharedRegion;
use std::collections::HashSet;
use std::thread;
use std::time::{Duration, Instant};

// ─── Helpers ───────────────────────────────────────────────────────

/// Open the regions the way the supervisor would, before the master starts.
fn supervisor_regions(
    regions: &TestRegions,
) -> (SharedRegion<JointData>, SharedRegion<SystemState>) {
    let joint_data = SharedRegion::<JointData>::open(&regions.joint_data).unwrap();
    let system_state = SharedRegion::<SystemState>::open(&regions.system_state).unwrap();
    (joint_data, system_state)
}

fn publish_commands(joint_data: &SharedRegion<JointData>, joints: usize) {
    let mut commands = [JointCommand::default(); ecat_common::consts::MAX_JOINTS];
    for (joint, cmd) in commands.iter_mut().enumerate().take(joints) {
        *cmd = command_for(joint);
    }
    joint_data.get().command.publish(&commands);
}

// ─── Test 1: six joints, one complete cycle ────────────────────────

#[test]
fn test_six_joints_single_cycle_end_to_end() {
    const N: usize = 6;
    let regions = TestRegions::new("e2e");
    let config = test_config(N, &regions);

    let (joint_data, system_state) = supervisor_regions(&regions);
    publish_commands(&joint_data, N);
    system_state.get().set_supervisor_enabled(true);

    let shutdown = ShutdownController::new();
    let (driver, recorder) = StubDriver::new(N as u16);
    let driver = driver.cancel_on_receive(&shutdown, 1);

    let summary = ecat_master::run(&config, Box::new(driver), &shutdown).unwrap();
    let cycle = summary.cycle.expect("cycle should have run");
    assert_eq!(cycle.stats.cycle_count, 1);

    let log = recorder.log();

    // Startup order.
    let mut expected = vec![Event::Acquire, Event::CreateDomain];
    for position in 1..=N as u16 {
        expected.extend([
            Event::Bind(position),
            Event::Map(position),
            Event::Register(position),
            Event::Sdo(position),
        ]);
    }
    expected.extend([
        Event::Activate,
        Event::SendInterval(1000),
        Event::Receive,
        Event::Send,
        Event::Deactivate,
        Event::Release,
    ]);
    assert_eq!(log.events, expected);

    // Twelve distinct offsets per joint, all inside the domain.
    assert_eq!(log.offsets.len(), N);
    let domain_size = N * JOINT_PROCESS_DATA_BYTES;
    assert_eq!(domain_size, 168);
    let mut seen = HashSet::new();
    for offsets in &log.offsets {
        assert_eq!(offsets.len(), 12);
        for &offset in offsets {
            assert!(offset < domain_size);
            assert!(seen.insert(offset), "offset {offset} registered twice");
        }
    }

    // Startup SDO: 0x6073:00 = 400 on every joint.
    assert_eq!(log.sdos.len(), N);
    assert!(
        log.sdos
            .iter()
            .all(|(_, index, sub, data)| *index == 0x6073 && *sub == 0 && data == &400u16.to_le_bytes())
    );

    // 7 × 6 feedback values reached the region.
    let feedback = joint_data.get().feedback.read(4).unwrap();
    for (joint, fb) in feedback.iter().enumerate() {
        if joint < N {
            assert_eq!(*fb, feedback_for(joint), "feedback of joint {joint}");
        } else {
            assert_eq!(*fb, JointFeedback::default());
        }
    }

    // 5 × 6 command values reached the bus in the one send.
    assert_eq!(log.sent.len(), 1);
    for (joint, offsets) in log.offsets.iter().enumerate() {
        assert_eq!(decode_command(&log.sent[0], offsets), command_for(joint));
    }

    assert_eq!(system_state.get().heartbeat(), 1);
    assert_eq!(system_state.get().master_status(), MasterStatus::Stopped);
}

// ─── Test 2: gate holds the cycle until the flag is set ────────────

#[test]
fn test_gate_opens_when_supervisor_enables() {
    let regions = TestRegions::new("gate_open");
    let config = test_config(2, &regions);
    let (_joint_data, system_state) = supervisor_regions(&regions);

    let shutdown = ShutdownController::new();
    let (driver, recorder) = StubDriver::new(2);
    let driver = driver.cancel_on_receive(&shutdown, 2);

    let supervisor = {
        let name = regions.system_state.clone();
        thread::spawn(move || {
            let state = SharedRegion::<SystemState>::open(&name).unwrap();
            let deadline = Instant::now() + Duration::from_secs(10);
            while state.get().master_status() != MasterStatus::WaitingForSupervisor {
                assert!(Instant::now() < deadline, "master never reached the gate");
                thread::sleep(Duration::from_millis(5));
            }
            // The master is blocked at the gate; no exchange yet.
            thread::sleep(Duration::from_millis(60));
            state.get().set_supervisor_enabled(true);
        })
    };

    let summary = ecat_master::run(&config, Box::new(driver), &shutdown).unwrap();
    supervisor.join().unwrap();

    assert_eq!(summary.cycle.map(|c| c.stats.cycle_count), Some(2));
    let log = recorder.log();
    assert_eq!(log.count(Event::Receive), 2);
    assert_eq!(log.count(Event::Send), 2);
    assert_eq!(system_state.get().heartbeat(), 2);
}

// ─── Test 3: cancellation ──────────────────────────────────────────

#[test]
fn test_cancel_at_gate_skips_cycle_and_tears_down() {
    let regions = TestRegions::new("gate_cancel");
    let config = test_config(3, &regions);
    let poll = config.shm.gate_poll_interval();

    let shutdown = ShutdownController::new();
    let (driver, recorder) = StubDriver::new(3);

    let canceller = {
        let shutdown = shutdown.clone();
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(100));
            shutdown.request();
            Instant::now()
        })
    };

    let summary = ecat_master::run(&config, Box::new(driver), &shutdown).unwrap();
    let returned = Instant::now();
    let requested = canceller.join().unwrap();

    assert!(!summary.entered_cycle());
    assert!(returned.duration_since(requested) <= poll + Duration::from_millis(500));

    let log = recorder.log();
    assert_eq!(log.count(Event::Receive), 0);
    assert_eq!(log.count(Event::Send), 0);
    assert_eq!(
        &log.events[log.events.len() - 2..],
        &[Event::Deactivate, Event::Release]
    );

    // Regions are detached, not removed.
    assert_eq!(regions.exist(), (true, true));
    let state = SharedRegion::<SystemState>::open(&regions.system_state).unwrap();
    assert_eq!(state.get().master_status(), MasterStatus::Stopped);
    assert_eq!(state.get().heartbeat(), 0);
}

#[test]
fn test_cancel_inside_cycle_finishes_that_cycle_only() {
    let regions = TestRegions::new("cycle_cancel");
    let config = test_config(2, &regions);
    let (_joint_data, system_state) = supervisor_regions(&regions);
    system_state.get().set_supervisor_enabled(true);

    let shutdown = ShutdownController::new();
    let (driver, recorder) = StubDriver::new(2);
    let driver = driver.cancel_on_receive(&shutdown, 3);

    let summary = ecat_master::run(&config, Box::new(driver), &shutdown).unwrap();
    assert_eq!(summary.cycle.map(|c| c.stats.cycle_count), Some(3));

    let log = recorder.log();
    assert_eq!(log.count(Event::Receive), 3);
    // The cycle that saw the request still sent.
    assert_eq!(log.count(Event::Send), 3);
    let last_send = log.events.iter().rposition(|e| *e == Event::Send);
    let deactivate = log.events.iter().position(|e| *e == Event::Deactivate);
    assert!(last_send < deactivate);
}

#[test]
fn test_cancel_during_sleep_starts_no_further_cycle() {
    let regions = TestRegions::new("sleep_cancel");
    let mut config = test_config(2, &regions);
    // Long period: the request lands while the task sleeps.
    config.bus.cycle_time_us = 100_000;
    let (_joint_data, system_state) = supervisor_regions(&regions);
    system_state.get().set_supervisor_enabled(true);

    let shutdown = ShutdownController::new();
    let (driver, recorder) = StubDriver::new(2);
    let driver = driver.cancel_after_first_send(&shutdown, Duration::from_millis(5));

    let summary = ecat_master::run(&config, Box::new(driver), &shutdown).unwrap();
    assert_eq!(summary.cycle.map(|c| c.stats.cycle_count), Some(1));

    let log = recorder.log();
    assert_eq!(log.count(Event::Receive), 1);
    assert_eq!(log.count(Event::Send), 1);
    assert_eq!(system_state.get().heartbeat(), 1);
}

// ─── Test 4: exchange failures keep the loop running ───────────────

#[test]
fn test_exchange_failures_are_counted_and_cycle_continues() {
    let regions = TestRegions::new("io_faults");
    let config = test_config(3, &regions);
    let (_joint_data, system_state) = supervisor_regions(&regions);
    system_state.get().set_supervisor_enabled(true);

    let shutdown = ShutdownController::new();
    let (driver, recorder) = StubDriver::new(3);
    let driver = driver
        .failing_at(FailAt::Receive(2))
        .failing_at(FailAt::Receive(3))
        .failing_at(FailAt::Send(3))
        .cancel_on_receive(&shutdown, 5);

    let summary = ecat_master::run(&config, Box::new(driver), &shutdown).unwrap();
    let cycle = summary.cycle.expect("cycle should have run");
    assert_eq!(cycle.stats.cycle_count, 5);
    assert_eq!(cycle.receive_failures, 2);
    assert_eq!(cycle.send_failures, 1);

    // Every cycle still sent, failed receive or not.
    let log = recorder.log();
    assert_eq!(log.count(Event::Receive), 5);
    assert_eq!(log.count(Event::Send), 5);
    assert_eq!(log.sent.len(), 5);
    assert_eq!(system_state.get().heartbeat(), 5);
}

// ─── Test 5: startup failures ──────────────────────────────────────

#[test]
fn test_acquisition_failure_creates_no_region() {
    let regions = TestRegions::new("no_bus");
    let config = test_config(6, &regions);

    let (driver, recorder) = StubDriver::new(6);
    let driver = driver.failing_at(FailAt::Acquire);

    let err = ecat_master::run(&config, Box::new(driver), &ShutdownController::new()).unwrap_err();
    assert!(matches!(
        err,
        RunError::Master(MasterError::Acquisition { index: 0, .. })
    ));

    assert_eq!(regions.exist(), (false, false));
    assert_eq!(recorder.log().events, vec![Event::Acquire]);
}

#[test]
fn test_missing_joint_is_fatal_before_activation() {
    let regions = TestRegions::new("partial");
    let config = test_config(6, &regions);

    // Only four devices answer.
    let (driver, recorder) = StubDriver::new(4);

    let err = ecat_master::run(&config, Box::new(driver), &ShutdownController::new()).unwrap_err();
    match err {
        RunError::Master(MasterError::JointConfig(e)) => {
            assert_eq!(e.joint, 4);
            assert_eq!(e.position, 5);
            assert_eq!(e.stage, ConfigStage::Bind);
        }
        other => panic!("unexpected error: {other}"),
    }

    let log = recorder.log();
    assert_eq!(log.count(Event::Activate), 0);
    assert_eq!(log.count(Event::Deactivate), 0);
    assert_eq!(log.events.last(), Some(&Event::Release));
    assert_eq!(regions.exist(), (false, false));
}

#[test]
fn test_mapping_failure_names_the_stage() {
    let regions = TestRegions::new("mapping");
    let config = test_config(3, &regions);

    let (driver, _recorder) = StubDriver::new(3);
    let driver = driver.failing_at(FailAt::Map(2));

    let err = ecat_master::run(&config, Box::new(driver), &ShutdownController::new()).unwrap_err();
    match err {
        RunError::Master(MasterError::JointConfig(e)) => {
            assert_eq!(e.joint, 1);
            assert_eq!(e.stage, ConfigStage::Mapping);
            assert!(e.to_string().contains("joint 1"));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_activation_failure_releases_bus_and_marks_stopped() {
    let regions = TestRegions::new("activate");
    let config = test_config(2, &regions);

    let (driver, recorder) = StubDriver::new(2);
    let driver = driver.failing_at(FailAt::Activate);

    let err = ecat_master::run(&config, Box::new(driver), &ShutdownController::new()).unwrap_err();
    assert!(matches!(
        err,
        RunError::Master(MasterError::Activation(ActivationError::Driver(
            BusError::Activation(_)
        )))
    ));

    let log = recorder.log();
    assert_eq!(log.count(Event::Deactivate), 0);
    assert_eq!(log.events.last(), Some(&Event::Release));

    let state = SharedRegion::<SystemState>::open(&regions.system_state).unwrap();
    assert_eq!(state.get().master_status(), MasterStatus::Stopped);
}

#[test]
fn test_strict_rt_failure_stops_before_gate() {
    let regions = TestRegions::new("strict_rt");
    let mut config = test_config(2, &regions);
    config.rt.pin_cpu = true;
    config.rt.cpu_core = 100_000;
    config.rt.strict = true;

    let (driver, recorder) = StubDriver::new(2);

    let err = ecat_master::run(&config, Box::new(driver), &ShutdownController::new()).unwrap_err();
    assert!(matches!(err, RunError::RtSetup(_)));

    let log = recorder.log();
    assert_eq!(log.count(Event::Receive), 0);
    assert_eq!(
        &log.events[log.events.len() - 2..],
        &[Event::Deactivate, Event::Release]
    );
}
