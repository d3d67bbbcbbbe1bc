//! # Arbiter - Exclusive Mode Management for the Half-Duplex Device
//!
//! The arbiter is the single owner of the device's operating mode. It
//! processes transmission requests strictly one at a time and drives every
//! request through the same sequence: tear down whatever currently holds the
//! device (carrier, then receiver), prepare the waveform, run the transmit
//! session, bring reception back, and drain the messages that arrived before
//! the teardown.
//!
//! ## Exclusivity
//!
//! A single async mutex guards the worker slots. The arbiter holds it for
//! the full duration of a request, including the waveform-preparation wait,
//! so no interleaving of mode changes is possible: a restart command or a
//! second request observes either the state before a request or the state
//! after it, never a half-torn-down device.
//!
//! ## Mode reporting
//!
//! The externally visible [`Mode`] is tracked in a dedicated cell updated at
//! every transition, so queries never contend with an in-flight request.

use core::cell::Cell;

use embassy_executor::Spawner;
use embassy_futures::select::{select, Either};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::mutex::Mutex;
use embassy_time::Duration;
use log::{log, Level};

use crate::carrier::carrier_task;
use crate::messages::{Event, LinkStatus, SynthesisJob, SystemErrorKind, TransmissionRequest};
use crate::params::SharedParams;
use crate::receiver::receiver_task;
use crate::worker::{acquire_control, WorkerHandle};
use crate::ArbiterConfiguration;
use crate::CommandQueueReceiver;
use crate::DecodedMessageQueueReceiver;
use crate::DecodedMessageQueueSender;
use crate::DeviceDriver;
use crate::EventQueueSender;
use crate::RequestQueueReceiver;
use crate::SynthesisJobQueueSender;
use crate::SynthesisResultQueueReceiver;
use crate::TxSession;

/// Current operating mode of the radio, as arbitrated.
#[derive(Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "std", derive(Debug))]
pub enum Mode {
    /// Neither reception nor transmission is active.
    Idle,
    /// The receiver worker owns the device.
    Receiving,
    /// A transmission request is being processed.
    Transmitting,
    /// The carrier worker holds an unmodulated carrier.
    CarrierOnly,
}

/// Externally queryable mode cell. Updated by the arbiter at every
/// transition; reads take a short critical section and never contend with
/// request processing.
pub(crate) struct ModeState {
    inner: embassy_sync::blocking_mutex::Mutex<CriticalSectionRawMutex, Cell<Mode>>,
}

impl ModeState {
    pub(crate) const fn new() -> Self {
        ModeState {
            inner: embassy_sync::blocking_mutex::Mutex::new(Cell::new(Mode::Idle)),
        }
    }

    pub(crate) fn current(&self) -> Mode {
        self.inner.lock(|cell| cell.get())
    }

    fn set(&self, mode: Mode) {
        self.inner.lock(|cell| cell.set(mode));
    }
}

/// Instructions to the arbiter that are not transmission requests.
#[derive(Clone, Copy)]
#[cfg_attr(feature = "std", derive(Debug))]
pub(crate) enum ArbiterCommand {
    /// Tear down and restart the receiver worker.
    RestartReceiver,
}

/// Handles held by the arbiter for its active workers. Guarded by the
/// exclusivity mutex; at most one of the two is populated while a transmit
/// session runs.
struct WorkerSlots {
    receiver: Option<WorkerHandle>,
    carrier: Option<WorkerHandle>,
}

/// Everything the arbiter task needs, leaked to `'static` at initialization.
pub(crate) struct ArbiterShared {
    pub(crate) spawner: Spawner,
    pub(crate) driver: DeviceDriver,
    pub(crate) params: &'static SharedParams,
    pub(crate) config: ArbiterConfiguration,
    pub(crate) mode: &'static ModeState,
    pub(crate) event_sender: EventQueueSender,
    pub(crate) decoded_sender: DecodedMessageQueueSender,
    pub(crate) decoded_receiver: DecodedMessageQueueReceiver,
    pub(crate) synth_job_sender: SynthesisJobQueueSender,
    pub(crate) synth_result_receiver: SynthesisResultQueueReceiver,
    #[cfg(feature = "std")]
    pub(crate) forward_sender: crate::ForwardQueueSender,
    slots: Mutex<CriticalSectionRawMutex, WorkerSlots>,
}

impl ArbiterShared {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        spawner: Spawner,
        driver: DeviceDriver,
        params: &'static SharedParams,
        config: ArbiterConfiguration,
        mode: &'static ModeState,
        event_sender: EventQueueSender,
        decoded_sender: DecodedMessageQueueSender,
        decoded_receiver: DecodedMessageQueueReceiver,
        synth_job_sender: SynthesisJobQueueSender,
        synth_result_receiver: SynthesisResultQueueReceiver,
        #[cfg(feature = "std")] forward_sender: crate::ForwardQueueSender,
    ) -> Self {
        ArbiterShared {
            spawner,
            driver,
            params,
            config,
            mode,
            event_sender,
            decoded_sender,
            decoded_receiver,
            synth_job_sender,
            synth_result_receiver,
            #[cfg(feature = "std")]
            forward_sender,
            slots: Mutex::new(WorkerSlots {
                receiver: None,
                carrier: None,
            }),
        }
    }

    fn emit(&self, event: Event) {
        if self.event_sender.try_send(event).is_err() {
            log!(Level::Warn, "Event queue full, dropping {} notification", event.kind_name());
        }
    }

    fn stop_timeout(&self) -> Duration {
        Duration::from_secs(self.config.worker_stop_timeout_seconds as u64)
    }

    /// Stops the receiver worker if one is active and waits for it to
    /// release the device, bounded by the configured timeout.
    async fn stop_receiver_locked(&self, slots: &mut WorkerSlots) {
        let Some(handle) = slots.receiver.take() else {
            return;
        };
        handle.request_stop();
        if !handle.await_completion(self.stop_timeout()).await {
            log!(Level::Warn, "Receiver did not stop within {} s, continuing", self.config.worker_stop_timeout_seconds);
        }
        self.mode.set(Mode::Idle);
        self.emit(Event::ReceptionStatus(LinkStatus::Idle));
    }

    /// Starts the receiver worker if none is active.
    async fn start_receiver_locked(&'static self, slots: &mut WorkerSlots) {
        if slots.receiver.is_some() {
            return;
        }
        let Some(handle) = acquire_control() else {
            self.emit(Event::SystemError(SystemErrorKind::WorkerStartFailed));
            return;
        };
        let spawn_result = self.spawner.spawn(receiver_task(
            self.driver,
            handle.control(),
            self.decoded_sender,
            self.params.device_index(),
            self.params.frequency_hz(),
        ));
        match spawn_result {
            Ok(()) => {
                slots.receiver = Some(handle);
                self.mode.set(Mode::Receiving);
                self.emit(Event::ReceptionStatus(LinkStatus::Active));
            }
            Err(_) => {
                handle.release();
                log!(Level::Error, "Failed to spawn the receiver worker");
                self.emit(Event::SystemError(SystemErrorKind::WorkerStartFailed));
            }
        }
    }

    async fn stop_carrier_locked(&self, slots: &mut WorkerSlots) {
        let Some(handle) = slots.carrier.take() else {
            return;
        };
        handle.request_stop();
        if !handle.await_completion(self.stop_timeout()).await {
            log!(Level::Warn, "Carrier worker did not stop within {} s, continuing", self.config.worker_stop_timeout_seconds);
        }
        self.mode.set(Mode::Idle);
        self.emit(Event::CarrierStatus(LinkStatus::Idle));
    }

    /// Starts the carrier worker and waits for its bring-up result. The
    /// carrier is confirmed only once it is actually keyed; a failed
    /// bring-up leaves no handle behind, so reception can resume.
    async fn start_carrier_locked(&'static self, slots: &mut WorkerSlots) {
        let Some(handle) = acquire_control() else {
            self.emit(Event::SystemError(SystemErrorKind::WorkerStartFailed));
            return;
        };
        let spawn_result = self.spawner.spawn(carrier_task(self.driver, handle.control(), self.params));
        match spawn_result {
            Ok(()) => {
                if handle.control().ready().await {
                    slots.carrier = Some(handle);
                    self.mode.set(Mode::CarrierOnly);
                    self.emit(Event::CarrierStatus(LinkStatus::Active));
                } else {
                    // The worker reported a failed bring-up and is exiting.
                    if !handle.await_completion(self.stop_timeout()).await {
                        log!(Level::Warn, "Failed carrier worker did not exit within {} s", self.config.worker_stop_timeout_seconds);
                    }
                    self.emit(Event::SystemError(SystemErrorKind::HardwareInitFailed));
                }
            }
            Err(_) => {
                handle.release();
                log!(Level::Error, "Failed to spawn the carrier worker");
                self.emit(Event::SystemError(SystemErrorKind::WorkerStartFailed));
            }
        }
    }

    /// Forwards every message the receiver decoded before it was stopped.
    /// Each message is published exactly once, in arrival order.
    fn drain_received(&self) {
        while let Ok(message) = self.decoded_receiver.try_receive() {
            log!(Level::Info, "Received message: {}", message.as_text());
            #[cfg(feature = "std")]
            if self.forward_sender.try_send(message).is_err() {
                log!(Level::Warn, "Forward queue full, dropping received message");
            }
            self.emit(Event::AprsMessage(message));
        }
    }

    /// Runs one transmit session for a prepared sample buffer.
    async fn transmit_locked(&self, samples: crate::messages::SampleBuffer) {
        self.driver.reset().await;
        let session = TxSession::new(&self.driver);
        if !session.initialize(self.params.rf_gain(), self.params.if_gain()).await {
            log!(Level::Error, "Transmit aborted: {}", SystemErrorKind::HardwareInitFailed.describe());
            self.emit(Event::SystemError(SystemErrorKind::HardwareInitFailed));
            return;
        }
        session.set_center_frequency(self.params.frequency_hz()).await;

        self.params.set_transmitting(true);
        self.emit(Event::TransmissionStatus(LinkStatus::Active));
        session.start(samples).await;
        session.wait_for_completion().await;
        session.stop_and_wait().await;
        self.params.set_transmitting(false);
        self.emit(Event::TransmissionStatus(LinkStatus::Idle));
    }

    /// Processes one transmission request end to end. The worker-slot lock is
    /// held for the whole sequence, waveform preparation included.
    async fn process_request(&'static self, request: TransmissionRequest) {
        let mut slots = self.slots.lock().await;

        // The request selects the device; subsequent session and receiver
        // starts within this cycle bind to it.
        self.params.set_device_index(request.device_index());

        if request.carrier_only() {
            if slots.carrier.is_some() {
                log!(Level::Info, "Carrier already active, confirming without restarting the worker");
                self.emit(Event::CarrierStatus(LinkStatus::Active));
                return;
            }
            self.stop_receiver_locked(&mut slots).await;
            self.drain_received();
            self.start_carrier_locked(&mut slots).await;
            // A failed bring-up leaves no carrier; reception resumes.
            if slots.carrier.is_none() {
                self.start_receiver_locked(&mut slots).await;
            }
            return;
        }

        // A normal transmission displaces an active carrier.
        self.stop_carrier_locked(&mut slots).await;
        self.stop_receiver_locked(&mut slots).await;
        self.mode.set(Mode::Transmitting);

        let job = SynthesisJob::from_request(&self.config, &request);
        self.synth_job_sender.send(job).await;
        match self.synth_result_receiver.receive().await {
            Ok(samples) => {
                log!(Level::Info, "Transmitting {} samples for \"{}\"", samples.sample_count(), request.text());
                self.transmit_locked(samples).await;
            }
            Err(error) => {
                log!(Level::Error, "Skipping transmission: {}", error.describe());
                self.emit(Event::SystemError(SystemErrorKind::WaveformSynthesisFailed));
            }
        }

        self.start_receiver_locked(&mut slots).await;
        self.drain_received();
    }

    /// Stops and restarts the receiver worker. Refused while the carrier is
    /// active, since releasing the carrier is an operator decision.
    async fn restart_receiver(&'static self) {
        let mut slots = self.slots.lock().await;
        if slots.carrier.is_some() {
            log!(Level::Warn, "Ignoring receiver restart while the carrier is active");
            return;
        }
        self.stop_receiver_locked(&mut slots).await;
        self.start_receiver_locked(&mut slots).await;
    }

    async fn handle_command(&'static self, command: ArbiterCommand) {
        match command {
            ArbiterCommand::RestartReceiver => self.restart_receiver().await,
        }
    }
}

/// Main arbitration loop. Brings up reception, then serves requests and
/// commands one at a time for the lifetime of the manager.
#[cfg_attr(feature = "std", embassy_executor::task(pool_size = 8))]
#[cfg_attr(feature = "embedded", embassy_executor::task(pool_size = 1))]
pub(crate) async fn arbiter_task(
    shared: &'static ArbiterShared,
    request_receiver: RequestQueueReceiver,
    command_receiver: CommandQueueReceiver,
) {
    {
        let mut slots = shared.slots.lock().await;
        shared.start_receiver_locked(&mut slots).await;
    }
    log!(Level::Info, "Arbiter started");

    loop {
        match select(request_receiver.receive(), command_receiver.receive()).await {
            Either::First(request) => shared.process_request(request).await,
            Either::Second(command) => shared.handle_command(command).await,
        }
    }
}
