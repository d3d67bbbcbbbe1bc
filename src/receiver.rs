//! # Receiver Worker
//!
//! Long-running worker that keeps the device in receive mode and moves every
//! decoded message into the received-message buffer. It owns the device's
//! receive side between `start_rx` and `stop_rx`; the arbiter guarantees it
//! is never alive while a transmit session or the carrier worker is.
//!
//! The worker stops cooperatively: the arbiter signals the control block and
//! the loop exits at the next atomic unit of work (one decoded message, or
//! immediately if it was pending on the device). The completion signal fires
//! only after `stop_rx` returned, so a true completion means the device's
//! receive side is observably released.

use embassy_futures::select::{select, Either};
use log::{log, Level};

use crate::worker::WorkerControl;
use crate::DecodedMessageQueueSender;
use crate::DeviceDriver;

/// Moves decoded messages from the device into the received-message buffer
/// until a stop is requested.
#[cfg_attr(feature = "std", embassy_executor::task(pool_size = 8))]
#[cfg_attr(feature = "embedded", embassy_executor::task(pool_size = 2))]
pub(crate) async fn receiver_task(
    driver: DeviceDriver,
    control: &'static WorkerControl,
    decoded_sender: DecodedMessageQueueSender,
    device_index: u8,
    frequency_hz: u64,
) {
    driver.start_rx(device_index, frequency_hz).await;
    log!(Level::Info, "Receiver started on device {} at {} Hz", device_index, frequency_hz);

    loop {
        match select(control.stopped(), driver.receive_decoded()).await {
            Either::First(()) => break,
            Either::Second(message) => {
                if decoded_sender.try_send(message).is_err() {
                    log!(Level::Warn, "Received-message buffer full, dropping decoded message");
                }
                if control.stop_requested() {
                    break;
                }
            }
        }
    }

    driver.stop_rx().await;
    log!(Level::Info, "Receiver stopped");
    control.notify_done();
}
