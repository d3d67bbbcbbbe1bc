//! # Device Driver Echo - Minimal Loopback Device
//!
//! The simplest possible device driver: every hardware operation succeeds,
//! a transmission "completes" after a short fixed delay, and reception
//! yields whatever is injected into its queue. Useful for demos and for
//! exercising the arbitration flow without scripting device responses.

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_time::{Duration, Timer};
use log::{log, Level};

use crate::messages::{DecodedMessage, SampleBuffer};

/// Time a simulated transmission spends "on the air".
const TX_COMPLETION_DELAY: Duration = Duration::from_millis(30);

/// Size of the injected decoded-message queue.
pub const ECHO_RX_QUEUE_SIZE: usize = 16;
pub type EchoRxQueue = embassy_sync::channel::Channel<CriticalSectionRawMutex, DecodedMessage, ECHO_RX_QUEUE_SIZE>;
pub type EchoRxQueueSender = embassy_sync::channel::Sender<'static, CriticalSectionRawMutex, DecodedMessage, ECHO_RX_QUEUE_SIZE>;
pub type EchoRxQueueReceiver = embassy_sync::channel::Receiver<'static, CriticalSectionRawMutex, DecodedMessage, ECHO_RX_QUEUE_SIZE>;

/// Loopback device driver. All operations log and succeed.
#[derive(Clone, Copy)]
pub struct DeviceDriver {
    decoded_receiver: EchoRxQueueReceiver,
}

impl DeviceDriver {
    pub const fn with(decoded_receiver: EchoRxQueueReceiver) -> Self {
        DeviceDriver { decoded_receiver }
    }

    pub async fn reset(&self) {
        log!(Level::Debug, "Echo device reset");
    }

    pub async fn start_rx(&self, device_index: u8, frequency_hz: u64) {
        log!(Level::Debug, "Echo device {} receiving at {} Hz", device_index, frequency_hz);
    }

    pub async fn stop_rx(&self) {
        log!(Level::Debug, "Echo device receive stopped");
    }

    /// Next injected decoded message. Pends until one is injected.
    pub async fn receive_decoded(&self) -> DecodedMessage {
        self.decoded_receiver.receive().await
    }
}

/// Transmit session against the echo device. Initialization always succeeds
/// and a started transmission completes after a fixed delay.
pub struct TxSession<'a> {
    #[allow(dead_code)]
    driver: &'a DeviceDriver,
}

impl<'a> TxSession<'a> {
    pub fn new(driver: &'a DeviceDriver) -> Self {
        TxSession { driver }
    }

    pub async fn initialize(&self, rf_gain: f32, if_gain: f32) -> bool {
        log!(Level::Debug, "Echo transmit session initialized (rf {} dB, if {} dB)", rf_gain, if_gain);
        true
    }

    pub async fn set_center_frequency(&self, frequency_hz: u64) {
        log!(Level::Debug, "Echo device tuned to {} Hz", frequency_hz);
    }

    pub async fn start(&self, samples: SampleBuffer) {
        log!(Level::Debug, "Echo device transmitting {} samples", samples.sample_count());
    }

    pub async fn start_carrier(&self) {
        log!(Level::Debug, "Echo device carrier keyed");
    }

    pub async fn wait_for_completion(&self) {
        Timer::after(TX_COMPLETION_DELAY).await;
    }

    pub async fn stop_and_wait(&self) {
        log!(Level::Debug, "Echo transmit session stopped");
    }
}
