//! # Device Driver Simulator - Scriptable Transceiver Mock
//!
//! This module provides a simulated device driver facade for testing the
//! arbitration logic without hardware. It mirrors the command surface of a
//! real half-duplex transceiver driver (reset, transmit-session bring-up,
//! frequency tuning, sample streaming, receive start/stop) but speaks to a
//! test harness through channels instead of touching a device.
//!
//! ## Architecture
//!
//! - **Command queue** (driver -> harness): every facade call is recorded as
//!   a [`DeviceCommand`], so tests can assert the exact device-level effect
//!   ordering of a request.
//! - **Response queue** (harness -> driver): the harness scripts the
//!   blocking answers: transmit-session initialization results and transmit
//!   completion.
//! - **Simulated RX queue** (harness -> driver): decoded messages the
//!   "hardware" produces while reception is active.
//!
//! The driver itself is a small bundle of channel endpoints and is `Copy`,
//! so it can be handed to the receiver and carrier worker tasks as well as
//! to the arbiter's transmit path.

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use log::{log, Level};

use crate::messages::{DecodedMessage, SampleBuffer};

/// Size of the command queue from the driver to the harness.
pub const DEVICE_COMMAND_QUEUE_SIZE: usize = 32;
pub type DeviceCommandQueue = embassy_sync::channel::Channel<CriticalSectionRawMutex, DeviceCommand, DEVICE_COMMAND_QUEUE_SIZE>;
pub type DeviceCommandQueueSender = embassy_sync::channel::Sender<'static, CriticalSectionRawMutex, DeviceCommand, DEVICE_COMMAND_QUEUE_SIZE>;
pub type DeviceCommandQueueReceiver = embassy_sync::channel::Receiver<'static, CriticalSectionRawMutex, DeviceCommand, DEVICE_COMMAND_QUEUE_SIZE>;

/// Size of the scripted response queue from the harness to the driver.
pub const DEVICE_RESPONSE_QUEUE_SIZE: usize = 8;
pub type DeviceResponseQueue = embassy_sync::channel::Channel<CriticalSectionRawMutex, DeviceResponse, DEVICE_RESPONSE_QUEUE_SIZE>;
pub type DeviceResponseQueueSender = embassy_sync::channel::Sender<'static, CriticalSectionRawMutex, DeviceResponse, DEVICE_RESPONSE_QUEUE_SIZE>;
pub type DeviceResponseQueueReceiver = embassy_sync::channel::Receiver<'static, CriticalSectionRawMutex, DeviceResponse, DEVICE_RESPONSE_QUEUE_SIZE>;

/// Size of the simulated decoded-message queue from the harness to the driver.
pub const SIMULATED_RX_QUEUE_SIZE: usize = 16;
pub type SimulatedRxQueue = embassy_sync::channel::Channel<CriticalSectionRawMutex, DecodedMessage, SIMULATED_RX_QUEUE_SIZE>;
pub type SimulatedRxQueueSender = embassy_sync::channel::Sender<'static, CriticalSectionRawMutex, DecodedMessage, SIMULATED_RX_QUEUE_SIZE>;
pub type SimulatedRxQueueReceiver = embassy_sync::channel::Receiver<'static, CriticalSectionRawMutex, DecodedMessage, SIMULATED_RX_QUEUE_SIZE>;

/// One facade call as observed by the harness, in call order.
#[derive(Clone, Copy, PartialEq)]
#[cfg_attr(feature = "std", derive(Debug))]
pub enum DeviceCommand {
    Reset,
    InitTxSession { rf_gain: f32, if_gain: f32 },
    SetCenterFrequency(u64),
    StartTx { sample_count: usize },
    StartCarrier,
    StopTxSession,
    StartRx { device_index: u8, frequency_hz: u64 },
    StopRx,
}

/// Scripted answers from the harness for the driver's blocking calls.
#[derive(Clone, Copy)]
#[cfg_attr(feature = "std", derive(Debug))]
pub enum DeviceResponse {
    /// Result of [`TxSession::initialize`].
    InitTxResult(bool),
    /// The in-flight transmission finished streaming.
    TxCompleted,
}

impl DeviceResponse {
    fn describe(&self) -> &'static str {
        match self {
            DeviceResponse::InitTxResult(_) => "init result",
            DeviceResponse::TxCompleted => "tx completed",
        }
    }
}

/// Simulated device driver facade. `Copy`, so the same instance serves the
/// arbiter, the receiver worker and the carrier worker; the arbiter's lock
/// discipline guarantees only one of them talks to it at a time.
#[derive(Clone, Copy)]
pub struct DeviceDriver {
    command_sender: DeviceCommandQueueSender,
    response_receiver: DeviceResponseQueueReceiver,
    decoded_receiver: SimulatedRxQueueReceiver,
}

impl DeviceDriver {
    pub const fn with(
        command_sender: DeviceCommandQueueSender,
        response_receiver: DeviceResponseQueueReceiver,
        decoded_receiver: SimulatedRxQueueReceiver,
    ) -> Self {
        DeviceDriver {
            command_sender,
            response_receiver,
            decoded_receiver,
        }
    }

    pub async fn reset(&self) {
        self.command_sender.send(DeviceCommand::Reset).await;
    }

    pub async fn start_rx(&self, device_index: u8, frequency_hz: u64) {
        self.command_sender
            .send(DeviceCommand::StartRx {
                device_index,
                frequency_hz,
            })
            .await;
    }

    pub async fn stop_rx(&self) {
        self.command_sender.send(DeviceCommand::StopRx).await;
    }

    /// Next decoded message produced by the simulated hardware. Pends until
    /// the harness injects one.
    pub async fn receive_decoded(&self) -> DecodedMessage {
        self.decoded_receiver.receive().await
    }

    async fn wait_for_init_result(&self) -> bool {
        loop {
            match self.response_receiver.receive().await {
                DeviceResponse::InitTxResult(ok) => return ok,
                other => {
                    log!(Level::Warn, "Unexpected device response while waiting for init result: {}", other.describe());
                }
            }
        }
    }

    async fn wait_for_tx_completed(&self) {
        loop {
            match self.response_receiver.receive().await {
                DeviceResponse::TxCompleted => return,
                other => {
                    log!(Level::Warn, "Unexpected device response while waiting for completion: {}", other.describe());
                }
            }
        }
    }
}

/// One exclusive transmit session against the simulated device.
pub struct TxSession<'a> {
    driver: &'a DeviceDriver,
}

impl<'a> TxSession<'a> {
    pub fn new(driver: &'a DeviceDriver) -> Self {
        TxSession { driver }
    }

    /// Brings up the transmit chain with the given gains. The harness scripts
    /// the result, which makes hardware-init failures testable.
    pub async fn initialize(&self, rf_gain: f32, if_gain: f32) -> bool {
        self.driver
            .command_sender
            .send(DeviceCommand::InitTxSession { rf_gain, if_gain })
            .await;
        self.driver.wait_for_init_result().await
    }

    pub async fn set_center_frequency(&self, frequency_hz: u64) {
        self.driver
            .command_sender
            .send(DeviceCommand::SetCenterFrequency(frequency_hz))
            .await;
    }

    /// Starts streaming the prepared sample buffer.
    pub async fn start(&self, samples: SampleBuffer) {
        self.driver
            .command_sender
            .send(DeviceCommand::StartTx {
                sample_count: samples.sample_count(),
            })
            .await;
    }

    /// Starts an unmodulated carrier instead of a sample stream.
    pub async fn start_carrier(&self) {
        self.driver.command_sender.send(DeviceCommand::StartCarrier).await;
    }

    /// Blocks until the hardware signals that streaming finished.
    pub async fn wait_for_completion(&self) {
        self.driver.wait_for_tx_completed().await;
    }

    /// Tears the session down. Never fails on the simulated device.
    pub async fn stop_and_wait(&self) {
        self.driver.command_sender.send(DeviceCommand::StopTxSession).await;
    }
}
