//! End-to-end scenarios against the simulated device driver.
//!
//! Each test runs a real executor on a detached thread. The test body is an
//! async task that drives the manager, plays the device side by answering
//! recorded commands, and reports its verdict back to the test thread over
//! a std mpsc channel. Every wait is bounded, so a wedged scenario fails
//! with a timeout message instead of hanging the suite.

use std::sync::mpsc;

use embassy_executor::{Executor, Spawner};
use embassy_time::{with_timeout, Duration, Timer};

use aprs_radio_control::device_driver_simulator::{
    DeviceCommand, DeviceCommandQueue, DeviceCommandQueueReceiver, DeviceResponse, DeviceResponseQueue, DeviceResponseQueueSender,
    SimulatedRxQueue, SimulatedRxQueueSender,
};
use aprs_radio_control::waveform_synth_simulator::{SynthScriptQueue, SynthScriptQueueSender};
use aprs_radio_control::{
    ArbiterConfiguration, DecodedMessage, DeviceDriver, Event, LinkStatus, Mode, RadioControlManager, SynthesisError, SystemErrorKind,
    TransmissionRequest, WaveformSynthesizer, DEFAULT_FREQUENCY_HZ, DEFAULT_IF_GAIN, DEFAULT_RF_GAIN,
};

type Outcome = Result<(), String>;
type OutcomeSender = mpsc::Sender<Outcome>;

const WAIT_BOUND: Duration = Duration::from_secs(5);

struct Rig {
    manager: RadioControlManager,
    commands: DeviceCommandQueueReceiver,
    responses: DeviceResponseQueueSender,
    rx_inject: SimulatedRxQueueSender,
    script: SynthScriptQueueSender,
}

fn build_rig(spawner: Spawner, config: ArbiterConfiguration) -> Result<Rig, String> {
    let command_queue: &'static DeviceCommandQueue = Box::leak(Box::new(DeviceCommandQueue::new()));
    let response_queue: &'static DeviceResponseQueue = Box::leak(Box::new(DeviceResponseQueue::new()));
    let rx_queue: &'static SimulatedRxQueue = Box::leak(Box::new(SimulatedRxQueue::new()));
    let script_queue: &'static SynthScriptQueue = Box::leak(Box::new(SynthScriptQueue::new()));

    let driver = DeviceDriver::with(command_queue.sender(), response_queue.receiver(), rx_queue.receiver());
    let synthesizer = WaveformSynthesizer::with(script_queue.receiver());

    let mut manager = RadioControlManager::new();
    manager
        .initialize(config, spawner, driver, synthesizer)
        .map_err(|error| format!("initialize failed: {:?}", error))?;

    Ok(Rig {
        manager,
        commands: command_queue.receiver(),
        responses: response_queue.sender(),
        rx_inject: rx_queue.sender(),
        script: script_queue.sender(),
    })
}

async fn next_command(rig: &Rig) -> Result<DeviceCommand, String> {
    with_timeout(WAIT_BOUND, rig.commands.receive())
        .await
        .map_err(|_| "timed out waiting for a device command".to_string())
}

async fn expect_command(rig: &Rig, expected: DeviceCommand) -> Result<(), String> {
    let command = next_command(rig).await?;
    if command != expected {
        return Err(format!("expected device command {:?}, got {:?}", expected, command));
    }
    Ok(())
}

async fn next_event(rig: &Rig) -> Result<Event, String> {
    with_timeout(WAIT_BOUND, rig.manager.next_event())
        .await
        .map_err(|_| "timed out waiting for an event".to_string())?
        .map_err(|error| format!("next_event failed: {:?}", error))
}

async fn expect_event(rig: &Rig, expected: Event) -> Result<(), String> {
    let event = next_event(rig).await?;
    if event != expected {
        return Err(format!("expected event {:?}, got {:?}", expected, event));
    }
    Ok(())
}

/// Consumes the receiver bring-up that happens at initialization.
async fn expect_initial_reception(rig: &Rig) -> Result<(), String> {
    expect_command(
        rig,
        DeviceCommand::StartRx {
            device_index: 0,
            frequency_hz: DEFAULT_FREQUENCY_HZ,
        },
    )
    .await?;
    expect_event(rig, Event::ReceptionStatus(LinkStatus::Active)).await
}

/// Plays the device side of one successful transmit session and checks the
/// command sequence, returning the transmitted sample count.
async fn play_transmit_session(rig: &Rig) -> Result<usize, String> {
    expect_command(rig, DeviceCommand::Reset).await?;
    expect_command(
        rig,
        DeviceCommand::InitTxSession {
            rf_gain: DEFAULT_RF_GAIN,
            if_gain: DEFAULT_IF_GAIN,
        },
    )
    .await?;
    rig.responses.send(DeviceResponse::InitTxResult(true)).await;
    expect_command(rig, DeviceCommand::SetCenterFrequency(DEFAULT_FREQUENCY_HZ)).await?;
    expect_event(rig, Event::TransmissionStatus(LinkStatus::Active)).await?;
    let sample_count = match next_command(rig).await? {
        DeviceCommand::StartTx { sample_count } => sample_count,
        other => return Err(format!("expected StartTx, got {:?}", other)),
    };
    rig.responses.send(DeviceResponse::TxCompleted).await;
    expect_command(rig, DeviceCommand::StopTxSession).await?;
    expect_event(rig, Event::TransmissionStatus(LinkStatus::Idle)).await?;
    Ok(sample_count)
}

/// Plays the device side of a successful carrier bring-up. The carrier is
/// confirmed only after it is actually keyed.
async fn play_carrier_bring_up(rig: &Rig) -> Result<(), String> {
    expect_command(rig, DeviceCommand::Reset).await?;
    expect_command(
        rig,
        DeviceCommand::InitTxSession {
            rf_gain: DEFAULT_RF_GAIN,
            if_gain: DEFAULT_IF_GAIN,
        },
    )
    .await?;
    rig.responses.send(DeviceResponse::InitTxResult(true)).await;
    expect_command(rig, DeviceCommand::SetCenterFrequency(DEFAULT_FREQUENCY_HZ)).await?;
    expect_command(rig, DeviceCommand::StartCarrier).await?;
    expect_event(rig, Event::CarrierStatus(LinkStatus::Active)).await
}

fn expect_mode(rig: &Rig, expected: Mode) -> Result<(), String> {
    let mode = rig.manager.mode().map_err(|error| format!("mode query failed: {:?}", error))?;
    if mode != expected {
        return Err(format!("expected mode {:?}, got {:?}", expected, mode));
    }
    Ok(())
}

fn run_scenario(spawn: impl FnOnce(Spawner, OutcomeSender) + Send + 'static) {
    let _ = env_logger::builder().is_test(true).try_init();
    let (outcome_sender, outcome_receiver) = mpsc::channel();
    std::thread::spawn(move || {
        let executor: &'static mut Executor = Box::leak(Box::new(Executor::new()));
        executor.run(|spawner| spawn(spawner, outcome_sender));
    });
    match outcome_receiver.recv_timeout(std::time::Duration::from_secs(30)) {
        Ok(Ok(())) => {}
        Ok(Err(message)) => panic!("{}", message),
        Err(_) => panic!("scenario did not report an outcome in time"),
    }
}

// Sample counts from the simulated synthesizer are preamble flags plus
// postamble flags plus the formatted line length, so each request has a
// recognizable transmission size.
fn simulated_sample_count(text: &str, preamble_flags: u16, postamble_flags: u16) -> usize {
    preamble_flags as usize + postamble_flags as usize + "VE2FPD>VE2FPD:".len() + text.len()
}

async fn transmission_cycle_body(spawner: Spawner) -> Outcome {
    let rig = build_rig(spawner, ArbiterConfiguration::default())?;
    expect_initial_reception(&rig).await?;
    expect_mode(&rig, Mode::Receiving)?;

    rig.manager
        .submit(TransmissionRequest::new("TEST 123!", 10, 4, 1))
        .map_err(|error| format!("submit failed: {:?}", error))?;

    expect_command(&rig, DeviceCommand::StopRx).await?;
    expect_event(&rig, Event::ReceptionStatus(LinkStatus::Idle)).await?;

    let sample_count = play_transmit_session(&rig).await?;
    if sample_count != simulated_sample_count("TEST 123!", 10, 4) {
        return Err(format!("unexpected sample count {}", sample_count));
    }

    // The restarted receiver binds to the device the request selected.
    expect_command(
        &rig,
        DeviceCommand::StartRx {
            device_index: 1,
            frequency_hz: DEFAULT_FREQUENCY_HZ,
        },
    )
    .await?;
    expect_event(&rig, Event::ReceptionStatus(LinkStatus::Active)).await?;
    expect_mode(&rig, Mode::Receiving)?;
    if rig.manager.is_transmitting() != Ok(false) {
        return Err("transmitting flag still set after the cycle".to_string());
    }
    Ok(())
}

#[embassy_executor::task]
async fn transmission_cycle_task(spawner: Spawner, outcome: OutcomeSender) {
    let _ = outcome.send(transmission_cycle_body(spawner).await);
}

#[test]
fn transmission_cycle_emits_ordered_events() {
    run_scenario(|spawner, outcome| {
        spawner.spawn(transmission_cycle_task(spawner, outcome)).ok();
    });
}

async fn carrier_body(spawner: Spawner) -> Outcome {
    let rig = build_rig(spawner, ArbiterConfiguration::default())?;
    expect_initial_reception(&rig).await?;

    rig.manager
        .submit(TransmissionRequest::new_carrier(0))
        .map_err(|error| format!("carrier submit failed: {:?}", error))?;

    expect_command(&rig, DeviceCommand::StopRx).await?;
    expect_event(&rig, Event::ReceptionStatus(LinkStatus::Idle)).await?;
    play_carrier_bring_up(&rig).await?;
    expect_mode(&rig, Mode::CarrierOnly)?;

    // A duplicate carrier request re-confirms the status without tearing
    // down or re-keying the worker.
    rig.manager
        .submit(TransmissionRequest::new_carrier(0))
        .map_err(|error| format!("duplicate carrier submit failed: {:?}", error))?;
    expect_event(&rig, Event::CarrierStatus(LinkStatus::Active)).await?;

    // A restart command is refused while the carrier holds the device.
    rig.manager
        .restart_receiver()
        .map_err(|error| format!("restart request failed: {:?}", error))?;
    Timer::after(Duration::from_millis(100)).await;
    expect_mode(&rig, Mode::CarrierOnly)?;

    // A normal request displaces the carrier; the very next device command
    // must be the carrier teardown, proving the duplicate was ignored.
    rig.manager
        .submit(TransmissionRequest::new("AFTER CARRIER", 2, 2, 0))
        .map_err(|error| format!("submit failed: {:?}", error))?;
    expect_command(&rig, DeviceCommand::StopTxSession).await?;
    expect_event(&rig, Event::CarrierStatus(LinkStatus::Idle)).await?;

    let sample_count = play_transmit_session(&rig).await?;
    if sample_count != simulated_sample_count("AFTER CARRIER", 2, 2) {
        return Err(format!("unexpected sample count {}", sample_count));
    }
    expect_command(
        &rig,
        DeviceCommand::StartRx {
            device_index: 0,
            frequency_hz: DEFAULT_FREQUENCY_HZ,
        },
    )
    .await?;
    expect_event(&rig, Event::ReceptionStatus(LinkStatus::Active)).await?;
    Ok(())
}

#[embassy_executor::task]
async fn carrier_task_body(spawner: Spawner, outcome: OutcomeSender) {
    let _ = outcome.send(carrier_body(spawner).await);
}

#[test]
fn carrier_is_idempotent_and_displaced_by_requests() {
    run_scenario(|spawner, outcome| {
        spawner.spawn(carrier_task_body(spawner, outcome)).ok();
    });
}

async fn synthesis_failure_body(spawner: Spawner) -> Outcome {
    let rig = build_rig(spawner, ArbiterConfiguration::default())?;
    expect_initial_reception(&rig).await?;

    rig.script.send(SynthesisError::Failed).await;
    rig.manager
        .submit(TransmissionRequest::new("WILL FAIL", 1, 1, 0))
        .map_err(|error| format!("submit failed: {:?}", error))?;

    expect_command(&rig, DeviceCommand::StopRx).await?;
    expect_event(&rig, Event::ReceptionStatus(LinkStatus::Idle)).await?;
    expect_event(&rig, Event::SystemError(SystemErrorKind::WaveformSynthesisFailed)).await?;

    // The hardware transmit steps are skipped entirely: the next device
    // command is the receiver coming back, not a reset.
    expect_command(
        &rig,
        DeviceCommand::StartRx {
            device_index: 0,
            frequency_hz: DEFAULT_FREQUENCY_HZ,
        },
    )
    .await?;
    expect_event(&rig, Event::ReceptionStatus(LinkStatus::Active)).await?;
    expect_mode(&rig, Mode::Receiving)?;
    Ok(())
}

#[embassy_executor::task]
async fn synthesis_failure_task(spawner: Spawner, outcome: OutcomeSender) {
    let _ = outcome.send(synthesis_failure_body(spawner).await);
}

#[test]
fn synthesis_failure_skips_transmit_and_resumes_reception() {
    run_scenario(|spawner, outcome| {
        spawner.spawn(synthesis_failure_task(spawner, outcome)).ok();
    });
}

async fn init_failure_body(spawner: Spawner) -> Outcome {
    let rig = build_rig(spawner, ArbiterConfiguration::default())?;
    expect_initial_reception(&rig).await?;

    rig.manager
        .submit(TransmissionRequest::new("NO HARDWARE", 1, 1, 0))
        .map_err(|error| format!("submit failed: {:?}", error))?;

    expect_command(&rig, DeviceCommand::StopRx).await?;
    expect_event(&rig, Event::ReceptionStatus(LinkStatus::Idle)).await?;
    expect_command(&rig, DeviceCommand::Reset).await?;
    expect_command(
        &rig,
        DeviceCommand::InitTxSession {
            rf_gain: DEFAULT_RF_GAIN,
            if_gain: DEFAULT_IF_GAIN,
        },
    )
    .await?;
    rig.responses.send(DeviceResponse::InitTxResult(false)).await;
    expect_event(&rig, Event::SystemError(SystemErrorKind::HardwareInitFailed)).await?;

    // No tuning, no transmission start: reception comes straight back.
    expect_command(
        &rig,
        DeviceCommand::StartRx {
            device_index: 0,
            frequency_hz: DEFAULT_FREQUENCY_HZ,
        },
    )
    .await?;
    expect_event(&rig, Event::ReceptionStatus(LinkStatus::Active)).await?;
    if rig.manager.is_transmitting() != Ok(false) {
        return Err("transmitting flag set after a failed initialization".to_string());
    }
    Ok(())
}

#[embassy_executor::task]
async fn init_failure_task(spawner: Spawner, outcome: OutcomeSender) {
    let _ = outcome.send(init_failure_body(spawner).await);
}

#[test]
fn hardware_init_failure_reports_error_and_resumes_reception() {
    run_scenario(|spawner, outcome| {
        spawner.spawn(init_failure_task(spawner, outcome)).ok();
    });
}

async fn fifo_order_body(spawner: Spawner) -> Outcome {
    let rig = build_rig(spawner, ArbiterConfiguration::default())?;
    expect_initial_reception(&rig).await?;

    rig.manager
        .submit(TransmissionRequest::new("FIRST", 1, 1, 0))
        .map_err(|error| format!("first submit failed: {:?}", error))?;
    rig.manager
        .submit(TransmissionRequest::new("SECOND LONGER", 1, 1, 0))
        .map_err(|error| format!("second submit failed: {:?}", error))?;

    let mut observed = Vec::new();
    for _ in 0..2 {
        expect_command(&rig, DeviceCommand::StopRx).await?;
        expect_event(&rig, Event::ReceptionStatus(LinkStatus::Idle)).await?;
        observed.push(play_transmit_session(&rig).await?);
        expect_command(
            &rig,
            DeviceCommand::StartRx {
                device_index: 0,
                frequency_hz: DEFAULT_FREQUENCY_HZ,
            },
        )
        .await?;
        expect_event(&rig, Event::ReceptionStatus(LinkStatus::Active)).await?;
    }

    let expected = vec![
        simulated_sample_count("FIRST", 1, 1),
        simulated_sample_count("SECOND LONGER", 1, 1),
    ];
    if observed != expected {
        return Err(format!("requests served out of order: {:?} vs {:?}", observed, expected));
    }
    Ok(())
}

#[embassy_executor::task]
async fn fifo_order_task(spawner: Spawner, outcome: OutcomeSender) {
    let _ = outcome.send(fifo_order_body(spawner).await);
}

#[test]
fn requests_are_served_in_submission_order() {
    run_scenario(|spawner, outcome| {
        spawner.spawn(fifo_order_task(spawner, outcome)).ok();
    });
}

async fn drain_and_forward_body(spawner: Spawner) -> Outcome {
    let listener = std::net::UdpSocket::bind("127.0.0.1:0").map_err(|error| format!("bind failed: {}", error))?;
    listener
        .set_read_timeout(Some(std::time::Duration::from_secs(5)))
        .map_err(|error| format!("set_read_timeout failed: {}", error))?;
    let forward_addr = match listener.local_addr() {
        Ok(std::net::SocketAddr::V4(addr)) => addr,
        _ => return Err("listener has no IPv4 address".to_string()),
    };

    let config = ArbiterConfiguration {
        forward_addr,
        ..Default::default()
    };
    let rig = build_rig(spawner, config)?;
    expect_initial_reception(&rig).await?;

    rig.rx_inject.send(DecodedMessage::new("VE2AAA>APRS:hello")).await;
    rig.rx_inject.send(DecodedMessage::new("VE2BBB>APRS:world")).await;
    // Let the receiver worker move both messages into the buffer.
    Timer::after(Duration::from_millis(100)).await;

    rig.manager
        .submit(TransmissionRequest::new_carrier(0))
        .map_err(|error| format!("carrier submit failed: {:?}", error))?;

    expect_command(&rig, DeviceCommand::StopRx).await?;
    expect_event(&rig, Event::ReceptionStatus(LinkStatus::Idle)).await?;
    expect_event(&rig, Event::AprsMessage(DecodedMessage::new("VE2AAA>APRS:hello"))).await?;
    expect_event(&rig, Event::AprsMessage(DecodedMessage::new("VE2BBB>APRS:world"))).await?;
    play_carrier_bring_up(&rig).await?;

    // Give the forwarder task a chance to run before blocking on the socket.
    Timer::after(Duration::from_millis(100)).await;

    let mut datagram = [0u8; 512];
    for expected in ["VE2AAA>APRS:hello", "VE2BBB>APRS:world"] {
        let (length, _) = listener
            .recv_from(&mut datagram)
            .map_err(|error| format!("no forwarded datagram: {}", error))?;
        let text = core::str::from_utf8(&datagram[..length]).map_err(|_| "forwarded datagram is not UTF-8".to_string())?;
        if text != expected {
            return Err(format!("expected forwarded {:?}, got {:?}", expected, text));
        }
    }
    Ok(())
}

#[embassy_executor::task]
async fn drain_and_forward_task(spawner: Spawner, outcome: OutcomeSender) {
    let _ = outcome.send(drain_and_forward_body(spawner).await);
}

#[test]
fn buffered_messages_are_drained_and_forwarded_once() {
    run_scenario(|spawner, outcome| {
        spawner.spawn(drain_and_forward_task(spawner, outcome)).ok();
    });
}

async fn carrier_init_failure_body(spawner: Spawner) -> Outcome {
    let rig = build_rig(spawner, ArbiterConfiguration::default())?;
    expect_initial_reception(&rig).await?;

    rig.manager
        .submit(TransmissionRequest::new_carrier(0))
        .map_err(|error| format!("carrier submit failed: {:?}", error))?;

    expect_command(&rig, DeviceCommand::StopRx).await?;
    expect_event(&rig, Event::ReceptionStatus(LinkStatus::Idle)).await?;
    expect_command(&rig, DeviceCommand::Reset).await?;
    expect_command(
        &rig,
        DeviceCommand::InitTxSession {
            rf_gain: DEFAULT_RF_GAIN,
            if_gain: DEFAULT_IF_GAIN,
        },
    )
    .await?;
    rig.responses.send(DeviceResponse::InitTxResult(false)).await;

    // No carrier is confirmed; the error is reported and reception resumes.
    expect_event(&rig, Event::SystemError(SystemErrorKind::HardwareInitFailed)).await?;
    expect_command(
        &rig,
        DeviceCommand::StartRx {
            device_index: 0,
            frequency_hz: DEFAULT_FREQUENCY_HZ,
        },
    )
    .await?;
    expect_event(&rig, Event::ReceptionStatus(LinkStatus::Active)).await?;
    expect_mode(&rig, Mode::Receiving)?;

    // The system is not wedged: a restart works and a fresh carrier request
    // is processed from scratch.
    rig.manager
        .restart_receiver()
        .map_err(|error| format!("restart request failed: {:?}", error))?;
    expect_command(&rig, DeviceCommand::StopRx).await?;
    expect_event(&rig, Event::ReceptionStatus(LinkStatus::Idle)).await?;
    expect_command(
        &rig,
        DeviceCommand::StartRx {
            device_index: 0,
            frequency_hz: DEFAULT_FREQUENCY_HZ,
        },
    )
    .await?;
    expect_event(&rig, Event::ReceptionStatus(LinkStatus::Active)).await?;

    rig.manager
        .submit(TransmissionRequest::new_carrier(0))
        .map_err(|error| format!("second carrier submit failed: {:?}", error))?;
    expect_command(&rig, DeviceCommand::StopRx).await?;
    expect_event(&rig, Event::ReceptionStatus(LinkStatus::Idle)).await?;
    play_carrier_bring_up(&rig).await?;
    expect_mode(&rig, Mode::CarrierOnly)?;
    Ok(())
}

#[embassy_executor::task]
async fn carrier_init_failure_task(spawner: Spawner, outcome: OutcomeSender) {
    let _ = outcome.send(carrier_init_failure_body(spawner).await);
}

#[test]
fn carrier_init_failure_recovers_to_receiving() {
    run_scenario(|spawner, outcome| {
        spawner.spawn(carrier_init_failure_task(spawner, outcome)).ok();
    });
}

async fn restart_receiver_body(spawner: Spawner) -> Outcome {
    let rig = build_rig(spawner, ArbiterConfiguration::default())?;
    expect_initial_reception(&rig).await?;

    rig.manager
        .restart_receiver()
        .map_err(|error| format!("restart request failed: {:?}", error))?;

    expect_command(&rig, DeviceCommand::StopRx).await?;
    expect_event(&rig, Event::ReceptionStatus(LinkStatus::Idle)).await?;
    expect_command(
        &rig,
        DeviceCommand::StartRx {
            device_index: 0,
            frequency_hz: DEFAULT_FREQUENCY_HZ,
        },
    )
    .await?;
    expect_event(&rig, Event::ReceptionStatus(LinkStatus::Active)).await?;
    expect_mode(&rig, Mode::Receiving)?;

    // Parameter changes take effect on the restarted receiver.
    rig.manager
        .set_frequency_hz(144_390_000)
        .map_err(|error| format!("set_frequency_hz failed: {:?}", error))?;
    rig.manager
        .restart_receiver()
        .map_err(|error| format!("second restart failed: {:?}", error))?;
    expect_command(&rig, DeviceCommand::StopRx).await?;
    expect_event(&rig, Event::ReceptionStatus(LinkStatus::Idle)).await?;
    expect_command(
        &rig,
        DeviceCommand::StartRx {
            device_index: 0,
            frequency_hz: 144_390_000,
        },
    )
    .await?;
    expect_event(&rig, Event::ReceptionStatus(LinkStatus::Active)).await?;
    Ok(())
}

#[embassy_executor::task]
async fn restart_receiver_task(spawner: Spawner, outcome: OutcomeSender) {
    let _ = outcome.send(restart_receiver_body(spawner).await);
}

#[test]
fn restart_receiver_replaces_the_worker() {
    run_scenario(|spawner, outcome| {
        spawner.spawn(restart_receiver_task(spawner, outcome)).ok();
    });
}
