//! # APRS Radio Control - Half-Duplex Mode Arbitration
//!
//! This library arbitrates exclusive use of a half-duplex radio device
//! between reception, packet transmission and an unmodulated test carrier.
//! It sits between an operator-facing layer (which submits transmission
//! requests and consumes status notifications) and a device driver facade
//! (which performs the actual hardware operations).
//!
//! ## Architecture
//!
//! The library is built from communicating async tasks connected by
//! channels:
//!
//! - **Arbiter**: the single owner of the device's operating mode. Serves
//!   transmission requests strictly one at a time: stop the receiver,
//!   prepare the waveform, run the transmit session, restart the receiver,
//!   publish the messages received in the meantime.
//! - **Receiver worker**: keeps the device in receive mode and buffers
//!   decoded messages until the arbiter drains them.
//! - **Carrier worker**: holds an unmodulated carrier for antenna and gain
//!   testing until the next request displaces it.
//! - **Waveform synthesis task**: turns formatted packet lines into
//!   transmit-ready sample buffers, off the arbiter's own loop.
//! - **UDP forwarder** (std only): relays every received message to a
//!   configured local endpoint.
//!
//! The device driver and the waveform synthesizer are selected at compile
//! time through features, so the worker tasks stay non-generic:
//!
//! - `device-driver-simulator`: scriptable mock driven through channels,
//!   used by the integration tests.
//! - `device-driver-echo`: minimal loopback device for demos.
//! - `waveform-synth-tone`: two-tone AFSK-style rendering.
//! - `waveform-synth-simulator`: deterministic buffers with scriptable
//!   failures.
//!
//! ## Usage
//!
//! Create a [`RadioControlManager`], call `initialize` with an executor
//! spawner, a device driver and a synthesizer, then use `submit` to request
//! transmissions and `next_event` to consume status notifications. The
//! receiver starts as part of initialization; the radio listens from the
//! first moment.

#![cfg_attr(not(feature = "std"), no_std)]

#[cfg(all(feature = "std", feature = "embedded"))]
compile_error!("The std and embedded features are mutually exclusive");

#[cfg(not(any(feature = "std", feature = "embedded")))]
compile_error!("Either the std or the embedded feature must be enabled");

#[cfg(all(feature = "device-driver-simulator", feature = "device-driver-echo"))]
compile_error!("Only one device driver feature can be enabled at a time");

#[cfg(not(any(feature = "device-driver-simulator", feature = "device-driver-echo")))]
compile_error!("One device driver feature must be enabled");

#[cfg(all(feature = "waveform-synth-tone", feature = "waveform-synth-simulator"))]
compile_error!("Only one waveform synthesizer feature can be enabled at a time");

#[cfg(not(any(feature = "waveform-synth-tone", feature = "waveform-synth-simulator")))]
compile_error!("One waveform synthesizer feature must be enabled");

mod arbiter;
mod carrier;
#[cfg(feature = "std")]
mod forwarder;
mod messages;
mod params;
mod receiver;
mod waveform;
mod worker;

#[cfg(feature = "device-driver-echo")]
pub mod device_driver_echo;
#[cfg(feature = "device-driver-simulator")]
pub mod device_driver_simulator;
#[cfg(feature = "waveform-synth-simulator")]
pub mod waveform_synth_simulator;
#[cfg(feature = "waveform-synth-tone")]
pub mod waveform_synth_tone;

pub use arbiter::Mode;
pub use messages::{
    DecodedMessage, Event, LinkStatus, SampleBuffer, SynthesisError, SynthesisJob, SystemErrorKind, TransmissionRequest,
    MAX_DECODED_MESSAGE_SIZE, MAX_REQUEST_TEXT_SIZE, WAVEFORM_BUFFER_SIZE,
};
pub use params::{SharedParams, DEFAULT_FREQUENCY_HZ, DEFAULT_IF_GAIN, DEFAULT_RF_GAIN};

#[cfg(feature = "device-driver-echo")]
pub use device_driver_echo::{DeviceDriver, TxSession};
#[cfg(feature = "device-driver-simulator")]
pub use device_driver_simulator::{DeviceDriver, TxSession};
#[cfg(feature = "waveform-synth-simulator")]
pub use waveform_synth_simulator::WaveformSynthesizer;
#[cfg(feature = "waveform-synth-tone")]
pub use waveform_synth_tone::WaveformSynthesizer;

use embassy_executor::Spawner;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;

use arbiter::{arbiter_task, ArbiterCommand, ArbiterShared, ModeState};

/// Capacity of the transmission request queue.
pub const REQUEST_QUEUE_SIZE: usize = 10;
pub type RequestQueue = embassy_sync::channel::Channel<CriticalSectionRawMutex, TransmissionRequest, REQUEST_QUEUE_SIZE>;
pub type RequestQueueSender = embassy_sync::channel::Sender<'static, CriticalSectionRawMutex, TransmissionRequest, REQUEST_QUEUE_SIZE>;
pub type RequestQueueReceiver = embassy_sync::channel::Receiver<'static, CriticalSectionRawMutex, TransmissionRequest, REQUEST_QUEUE_SIZE>;

/// Capacity of the status notification queue.
pub const EVENT_QUEUE_SIZE: usize = 32;
pub type EventQueue = embassy_sync::channel::Channel<CriticalSectionRawMutex, Event, EVENT_QUEUE_SIZE>;
pub type EventQueueSender = embassy_sync::channel::Sender<'static, CriticalSectionRawMutex, Event, EVENT_QUEUE_SIZE>;
pub type EventQueueReceiver = embassy_sync::channel::Receiver<'static, CriticalSectionRawMutex, Event, EVENT_QUEUE_SIZE>;

/// Capacity of the received-message buffer between the receiver worker and
/// the arbiter's drain step.
pub const DECODED_MESSAGE_QUEUE_SIZE: usize = 50;
pub(crate) type DecodedMessageQueue = embassy_sync::channel::Channel<CriticalSectionRawMutex, DecodedMessage, DECODED_MESSAGE_QUEUE_SIZE>;
pub(crate) type DecodedMessageQueueSender =
    embassy_sync::channel::Sender<'static, CriticalSectionRawMutex, DecodedMessage, DECODED_MESSAGE_QUEUE_SIZE>;
pub(crate) type DecodedMessageQueueReceiver =
    embassy_sync::channel::Receiver<'static, CriticalSectionRawMutex, DecodedMessage, DECODED_MESSAGE_QUEUE_SIZE>;

const SYNTHESIS_QUEUE_SIZE: usize = 2;
pub(crate) type SynthesisJobQueue = embassy_sync::channel::Channel<CriticalSectionRawMutex, SynthesisJob, SYNTHESIS_QUEUE_SIZE>;
pub(crate) type SynthesisJobQueueSender = embassy_sync::channel::Sender<'static, CriticalSectionRawMutex, SynthesisJob, SYNTHESIS_QUEUE_SIZE>;
pub(crate) type SynthesisJobQueueReceiver =
    embassy_sync::channel::Receiver<'static, CriticalSectionRawMutex, SynthesisJob, SYNTHESIS_QUEUE_SIZE>;
pub(crate) type SynthesisResultQueue =
    embassy_sync::channel::Channel<CriticalSectionRawMutex, Result<SampleBuffer, SynthesisError>, SYNTHESIS_QUEUE_SIZE>;
pub(crate) type SynthesisResultQueueSender =
    embassy_sync::channel::Sender<'static, CriticalSectionRawMutex, Result<SampleBuffer, SynthesisError>, SYNTHESIS_QUEUE_SIZE>;
pub(crate) type SynthesisResultQueueReceiver =
    embassy_sync::channel::Receiver<'static, CriticalSectionRawMutex, Result<SampleBuffer, SynthesisError>, SYNTHESIS_QUEUE_SIZE>;

#[cfg(feature = "std")]
pub(crate) const FORWARD_QUEUE_SIZE: usize = 16;
#[cfg(feature = "std")]
pub(crate) type ForwardQueue = embassy_sync::channel::Channel<CriticalSectionRawMutex, DecodedMessage, FORWARD_QUEUE_SIZE>;
#[cfg(feature = "std")]
pub(crate) type ForwardQueueSender = embassy_sync::channel::Sender<'static, CriticalSectionRawMutex, DecodedMessage, FORWARD_QUEUE_SIZE>;
#[cfg(feature = "std")]
pub(crate) type ForwardQueueReceiver =
    embassy_sync::channel::Receiver<'static, CriticalSectionRawMutex, DecodedMessage, FORWARD_QUEUE_SIZE>;

const COMMAND_QUEUE_SIZE: usize = 4;
pub(crate) type CommandQueue = embassy_sync::channel::Channel<CriticalSectionRawMutex, ArbiterCommand, COMMAND_QUEUE_SIZE>;
pub(crate) type CommandQueueSender = embassy_sync::channel::Sender<'static, CriticalSectionRawMutex, ArbiterCommand, COMMAND_QUEUE_SIZE>;
pub(crate) type CommandQueueReceiver = embassy_sync::channel::Receiver<'static, CriticalSectionRawMutex, ArbiterCommand, COMMAND_QUEUE_SIZE>;

/// Static configuration of the arbitration layer.
#[derive(Clone, Copy)]
#[cfg_attr(feature = "std", derive(Debug))]
pub struct ArbiterConfiguration {
    /// Bound in seconds on waiting for a worker to acknowledge a stop.
    pub worker_stop_timeout_seconds: u8,
    /// Source callsign placed before `>` in the formatted packet line.
    pub source_callsign: &'static str,
    /// Destination callsign placed after `>` in the formatted packet line.
    pub destination_callsign: &'static str,
    /// UDP endpoint received messages are forwarded to (std only).
    pub forward_addr: core::net::SocketAddrV4,
}

impl Default for ArbiterConfiguration {
    fn default() -> Self {
        ArbiterConfiguration {
            worker_stop_timeout_seconds: 5,
            source_callsign: "VE2FPD",
            destination_callsign: "VE2FPD",
            forward_addr: core::net::SocketAddrV4::new(core::net::Ipv4Addr::new(127, 0, 0, 1), 14581),
        }
    }
}

/// Error type for the initialize operation.
#[derive(Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "std", derive(Debug))]
pub enum InitializeError {
    AlreadyInitialized,
    TaskSpawnFailed,
}

/// Error type for the submit operation.
#[derive(Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "std", derive(Debug))]
pub enum SubmitError {
    NotInitialized,
    /// The request queue is full; the request was dropped, not queued.
    ChannelFull,
}

/// Error type for consuming status notifications.
#[derive(Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "std", derive(Debug))]
pub enum ReceiveEventError {
    NotInitialized,
}

/// Error type for the receiver restart operation.
#[derive(Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "std", derive(Debug))]
pub enum RestartReceiverError {
    NotInitialized,
    ChannelFull,
}

/// Error type for mode and parameter access.
#[derive(Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "std", derive(Debug))]
pub enum ControlError {
    NotInitialized,
}

struct ManagerEndpoints {
    request_sender: RequestQueueSender,
    command_sender: CommandQueueSender,
    event_receiver: EventQueueReceiver,
    mode: &'static ModeState,
    params: &'static SharedParams,
}

enum ManagerState {
    Uninitialized,
    Initialized(ManagerEndpoints),
}

/// Operator-facing handle to the arbitration layer.
///
/// Construct with [`RadioControlManager::new`], then call `initialize` once
/// from an executor context. All further operations are non-blocking except
/// [`RadioControlManager::next_event`], which pends until a notification is
/// available.
pub struct RadioControlManager {
    state: ManagerState,
}

impl Default for RadioControlManager {
    fn default() -> Self {
        Self::new()
    }
}

impl RadioControlManager {
    pub const fn new() -> Self {
        RadioControlManager {
            state: ManagerState::Uninitialized,
        }
    }

    /// Starts the arbitration tasks on the given spawner. The receiver
    /// worker is brought up as part of this call, so reception is active
    /// from the start.
    #[cfg(feature = "std")]
    pub fn initialize(
        &mut self,
        config: ArbiterConfiguration,
        spawner: Spawner,
        driver: DeviceDriver,
        synthesizer: WaveformSynthesizer,
    ) -> Result<(), InitializeError> {
        if matches!(self.state, ManagerState::Initialized(_)) {
            return Err(InitializeError::AlreadyInitialized);
        }

        let request_queue: &'static RequestQueue = Box::leak(Box::new(RequestQueue::new()));
        let command_queue: &'static CommandQueue = Box::leak(Box::new(CommandQueue::new()));
        let event_queue: &'static EventQueue = Box::leak(Box::new(EventQueue::new()));
        let decoded_queue: &'static DecodedMessageQueue = Box::leak(Box::new(DecodedMessageQueue::new()));
        let synth_job_queue: &'static SynthesisJobQueue = Box::leak(Box::new(SynthesisJobQueue::new()));
        let synth_result_queue: &'static SynthesisResultQueue = Box::leak(Box::new(SynthesisResultQueue::new()));
        let forward_queue: &'static ForwardQueue = Box::leak(Box::new(ForwardQueue::new()));
        let mode: &'static ModeState = Box::leak(Box::new(ModeState::new()));
        let params: &'static SharedParams = Box::leak(Box::new(SharedParams::default()));

        let shared: &'static ArbiterShared = Box::leak(Box::new(ArbiterShared::new(
            spawner,
            driver,
            params,
            config,
            mode,
            event_queue.sender(),
            decoded_queue.sender(),
            decoded_queue.receiver(),
            synth_job_queue.sender(),
            synth_result_queue.receiver(),
            forward_queue.sender(),
        )));

        spawner
            .spawn(waveform::waveform_synth_task(
                synthesizer,
                synth_job_queue.receiver(),
                synth_result_queue.sender(),
            ))
            .map_err(|_| InitializeError::TaskSpawnFailed)?;
        spawner
            .spawn(forwarder::udp_forwarder_task(config.forward_addr, forward_queue.receiver()))
            .map_err(|_| InitializeError::TaskSpawnFailed)?;
        spawner
            .spawn(arbiter_task(shared, request_queue.receiver(), command_queue.receiver()))
            .map_err(|_| InitializeError::TaskSpawnFailed)?;

        self.state = ManagerState::Initialized(ManagerEndpoints {
            request_sender: request_queue.sender(),
            command_sender: command_queue.sender(),
            event_receiver: event_queue.receiver(),
            mode,
            params,
        });
        Ok(())
    }

    /// Embedded variant of `initialize`. All state lives in statics, so at
    /// most one manager can be initialized for the lifetime of the program.
    #[cfg(feature = "embedded")]
    pub fn initialize(
        &mut self,
        config: ArbiterConfiguration,
        spawner: Spawner,
        driver: DeviceDriver,
        synthesizer: WaveformSynthesizer,
    ) -> Result<(), InitializeError> {
        if matches!(self.state, ManagerState::Initialized(_)) {
            return Err(InitializeError::AlreadyInitialized);
        }

        static REQUEST_QUEUE: RequestQueue = RequestQueue::new();
        static COMMAND_QUEUE: CommandQueue = CommandQueue::new();
        static EVENT_QUEUE: EventQueue = EventQueue::new();
        static DECODED_QUEUE: DecodedMessageQueue = DecodedMessageQueue::new();
        static SYNTH_JOB_QUEUE: SynthesisJobQueue = SynthesisJobQueue::new();
        static SYNTH_RESULT_QUEUE: SynthesisResultQueue = SynthesisResultQueue::new();
        static MODE: ModeState = ModeState::new();
        static PARAMS: static_cell::StaticCell<SharedParams> = static_cell::StaticCell::new();
        static SHARED: static_cell::StaticCell<ArbiterShared> = static_cell::StaticCell::new();

        let params = PARAMS.try_init(SharedParams::default()).ok_or(InitializeError::AlreadyInitialized)?;
        let shared = SHARED
            .try_init(ArbiterShared::new(
                spawner,
                driver,
                params,
                config,
                &MODE,
                EVENT_QUEUE.sender(),
                DECODED_QUEUE.sender(),
                DECODED_QUEUE.receiver(),
                SYNTH_JOB_QUEUE.sender(),
                SYNTH_RESULT_QUEUE.receiver(),
            ))
            .ok_or(InitializeError::AlreadyInitialized)?;

        spawner
            .spawn(waveform::waveform_synth_task(
                synthesizer,
                SYNTH_JOB_QUEUE.receiver(),
                SYNTH_RESULT_QUEUE.sender(),
            ))
            .map_err(|_| InitializeError::TaskSpawnFailed)?;
        spawner
            .spawn(arbiter_task(shared, REQUEST_QUEUE.receiver(), COMMAND_QUEUE.receiver()))
            .map_err(|_| InitializeError::TaskSpawnFailed)?;

        self.state = ManagerState::Initialized(ManagerEndpoints {
            request_sender: REQUEST_QUEUE.sender(),
            command_sender: COMMAND_QUEUE.sender(),
            event_receiver: EVENT_QUEUE.receiver(),
            mode: &MODE,
            params,
        });
        Ok(())
    }

    fn endpoints(&self) -> Option<&ManagerEndpoints> {
        match &self.state {
            ManagerState::Initialized(endpoints) => Some(endpoints),
            ManagerState::Uninitialized => None,
        }
    }

    /// Enqueues a transmission request. Requests are served in submission
    /// order; a full queue rejects the request instead of blocking.
    pub fn submit(&self, request: TransmissionRequest) -> Result<(), SubmitError> {
        let endpoints = self.endpoints().ok_or(SubmitError::NotInitialized)?;
        endpoints.request_sender.try_send(request).map_err(|_| SubmitError::ChannelFull)
    }

    /// Next status notification. Pends until one is available.
    pub async fn next_event(&self) -> Result<Event, ReceiveEventError> {
        let endpoints = self.endpoints().ok_or(ReceiveEventError::NotInitialized)?;
        Ok(endpoints.event_receiver.receive().await)
    }

    /// Asks the arbiter to stop and restart the receiver worker. Served
    /// after any request already in flight; ignored while the carrier is
    /// active.
    pub fn restart_receiver(&self) -> Result<(), RestartReceiverError> {
        let endpoints = self.endpoints().ok_or(RestartReceiverError::NotInitialized)?;
        endpoints
            .command_sender
            .try_send(ArbiterCommand::RestartReceiver)
            .map_err(|_| RestartReceiverError::ChannelFull)
    }

    /// Current arbitrated operating mode.
    pub fn mode(&self) -> Result<Mode, ControlError> {
        let endpoints = self.endpoints().ok_or(ControlError::NotInitialized)?;
        Ok(endpoints.mode.current())
    }

    pub fn frequency_hz(&self) -> Result<u64, ControlError> {
        Ok(self.endpoints().ok_or(ControlError::NotInitialized)?.params.frequency_hz())
    }

    /// Sets the center frequency used by subsequent transmit sessions and
    /// receiver starts.
    pub fn set_frequency_hz(&self, frequency_hz: u64) -> Result<(), ControlError> {
        self.endpoints()
            .ok_or(ControlError::NotInitialized)?
            .params
            .set_frequency_hz(frequency_hz);
        Ok(())
    }

    pub fn set_gains(&self, rf_gain: f32, if_gain: f32) -> Result<(), ControlError> {
        self.endpoints().ok_or(ControlError::NotInitialized)?.params.set_gains(rf_gain, if_gain);
        Ok(())
    }

    pub fn set_device_index(&self, device_index: u8) -> Result<(), ControlError> {
        self.endpoints()
            .ok_or(ControlError::NotInitialized)?
            .params
            .set_device_index(device_index);
        Ok(())
    }

    /// True while a transmit session is between start and finalization.
    pub fn is_transmitting(&self) -> Result<bool, ControlError> {
        Ok(self.endpoints().ok_or(ControlError::NotInitialized)?.params.is_transmitting())
    }
}

#[cfg(all(test, feature = "std"))]
mod tests {
    use super::*;
    use futures::executor::block_on;

    #[test]
    fn uninitialized_manager_rejects_operations() {
        let manager = RadioControlManager::new();
        assert_eq!(
            manager.submit(TransmissionRequest::new("TEST", 1, 1, 0)),
            Err(SubmitError::NotInitialized)
        );
        assert_eq!(manager.restart_receiver(), Err(RestartReceiverError::NotInitialized));
        assert_eq!(manager.mode(), Err(ControlError::NotInitialized));
        assert_eq!(manager.is_transmitting(), Err(ControlError::NotInitialized));
        assert_eq!(block_on(manager.next_event()), Err(ReceiveEventError::NotInitialized));
    }

    #[test]
    fn default_configuration_matches_station_defaults() {
        let config = ArbiterConfiguration::default();
        assert_eq!(config.worker_stop_timeout_seconds, 5);
        assert_eq!(config.source_callsign, "VE2FPD");
        assert_eq!(config.destination_callsign, "VE2FPD");
        assert_eq!(config.forward_addr.port(), 14581);
        assert!(config.forward_addr.ip().is_loopback());
    }
}
