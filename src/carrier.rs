//! # Carrier Worker
//!
//! Worker that holds an unmodulated test carrier on the air until stopped.
//! It brings up its own transmit session (reset, initialize, tune), keys the
//! carrier, and tears the session down once the arbiter requests a stop.
//! Gains and frequency are read from the shared parameters at start, so the
//! carrier always reflects the operator's current settings.
//!
//! The bring-up result is reported through the control block: the arbiter
//! confirms the carrier only after a successful key-up, and a failed
//! initialization makes the worker exit immediately so the arbiter can
//! discard it and resume reception.

use log::{log, Level};

use crate::params::SharedParams;
use crate::worker::WorkerControl;
use crate::DeviceDriver;
use crate::TxSession;

/// Keys an unmodulated carrier and holds it until a stop is requested.
#[cfg_attr(feature = "std", embassy_executor::task(pool_size = 8))]
#[cfg_attr(feature = "embedded", embassy_executor::task(pool_size = 2))]
pub(crate) async fn carrier_task(driver: DeviceDriver, control: &'static WorkerControl, params: &'static SharedParams) {
    driver.reset().await;
    let session = TxSession::new(&driver);
    if !session.initialize(params.rf_gain(), params.if_gain()).await {
        log!(Level::Error, "Carrier aborted: hardware initialization failed");
        control.notify_ready(false);
        control.notify_done();
        return;
    }

    let frequency_hz = params.frequency_hz();
    session.set_center_frequency(frequency_hz).await;
    session.start_carrier().await;
    log!(Level::Info, "Carrier keyed at {} Hz", frequency_hz);
    control.notify_ready(true);

    control.stopped().await;

    session.stop_and_wait().await;
    log!(Level::Info, "Carrier released");
    control.notify_done();
}
