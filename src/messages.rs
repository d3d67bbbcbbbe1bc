//! Message and buffer types moved between the arbiter, its workers and the
//! external collaborators.
//!
//! All payload-carrying types are fixed-capacity buffers with an explicit
//! length, so they can travel through channels by value on both std and
//! embedded targets. Text is expected to be ASCII (APRS payloads are); a
//! non-UTF-8 tail after truncation simply yields an empty text view.

use log::{log, Level};

use crate::ArbiterConfiguration;

/// Maximum payload text size of a transmission request in bytes.
pub const MAX_REQUEST_TEXT_SIZE: usize = 256;

/// Maximum size of a decoded received message in bytes.
pub const MAX_DECODED_MESSAGE_SIZE: usize = 256;

/// Maximum size of a formatted packet line handed to waveform synthesis
/// (payload text plus `SOURCE>DEST:` callsign framing).
pub const MAX_SYNTH_LINE_SIZE: usize = MAX_REQUEST_TEXT_SIZE + 32;

/// Capacity of a transmit-ready sample buffer in 8-bit samples.
pub const WAVEFORM_BUFFER_SIZE: usize = 8192;

fn copy_truncated(destination: &mut [u8], source: &[u8], what: &str) -> usize {
    let length = source.len().min(destination.len());
    if length < source.len() {
        log!(Level::Warn, "{} truncated from {} to {} bytes", what, source.len(), length);
    }
    destination[..length].copy_from_slice(&source[..length]);
    length
}

/// A request for exclusive use of the transmitter, consumed exactly once by
/// the arbiter. Immutable once enqueued.
#[derive(Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "std", derive(Debug))]
pub struct TransmissionRequest {
    text: [u8; MAX_REQUEST_TEXT_SIZE],
    text_length: usize,
    preamble_flags: u16,
    postamble_flags: u16,
    device_index: u8,
    carrier_only: bool,
}

impl TransmissionRequest {
    /// Creates a normal transmission request. Text longer than
    /// [`MAX_REQUEST_TEXT_SIZE`] is truncated with a warning.
    pub fn new(text: &str, preamble_flags: u16, postamble_flags: u16, device_index: u8) -> Self {
        let mut buffer = [0u8; MAX_REQUEST_TEXT_SIZE];
        let text_length = copy_truncated(&mut buffer, text.as_bytes(), "transmission request text");
        TransmissionRequest {
            text: buffer,
            text_length,
            preamble_flags,
            postamble_flags,
            device_index,
            carrier_only: false,
        }
    }

    /// Creates a carrier-only test request. Carries no payload; the arbiter
    /// starts the carrier worker instead of a transmit session.
    pub fn new_carrier(device_index: u8) -> Self {
        TransmissionRequest {
            text: [0u8; MAX_REQUEST_TEXT_SIZE],
            text_length: 0,
            preamble_flags: 0,
            postamble_flags: 0,
            device_index,
            carrier_only: true,
        }
    }

    pub fn text(&self) -> &str {
        core::str::from_utf8(&self.text[..self.text_length]).unwrap_or("")
    }

    pub fn preamble_flags(&self) -> u16 {
        self.preamble_flags
    }

    pub fn postamble_flags(&self) -> u16 {
        self.postamble_flags
    }

    pub fn device_index(&self) -> u8 {
        self.device_index
    }

    pub fn carrier_only(&self) -> bool {
        self.carrier_only
    }
}

/// A decoded text message produced by the receiver worker.
#[derive(Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "std", derive(Debug))]
pub struct DecodedMessage {
    data: [u8; MAX_DECODED_MESSAGE_SIZE],
    length: usize,
}

impl DecodedMessage {
    pub fn new(text: &str) -> Self {
        Self::new_from_bytes(text.as_bytes())
    }

    pub fn new_from_bytes(bytes: &[u8]) -> Self {
        let mut buffer = [0u8; MAX_DECODED_MESSAGE_SIZE];
        let length = copy_truncated(&mut buffer, bytes, "decoded message");
        DecodedMessage { data: buffer, length }
    }

    pub fn as_text(&self) -> &str {
        core::str::from_utf8(&self.data[..self.length]).unwrap_or("")
    }

    pub fn length(&self) -> usize {
        self.length
    }
}

/// A transmit-ready buffer of 8-bit samples produced by waveform synthesis
/// and consumed by the device transmit session.
#[derive(Clone, Copy)]
pub struct SampleBuffer {
    samples: [i8; WAVEFORM_BUFFER_SIZE],
    length: usize,
}

impl Default for SampleBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl SampleBuffer {
    pub const fn new() -> Self {
        SampleBuffer {
            samples: [0i8; WAVEFORM_BUFFER_SIZE],
            length: 0,
        }
    }

    /// Appends one sample. Returns false once the buffer is full.
    pub fn push(&mut self, sample: i8) -> bool {
        if self.length >= WAVEFORM_BUFFER_SIZE {
            return false;
        }
        self.samples[self.length] = sample;
        self.length += 1;
        true
    }

    pub fn as_samples(&self) -> &[i8] {
        &self.samples[..self.length]
    }

    pub fn sample_count(&self) -> usize {
        self.length
    }
}

/// Why waveform preparation failed. Recoverable: the arbiter skips the
/// hardware transmit steps and resumes reception.
#[derive(Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "std", derive(Debug))]
pub enum SynthesisError {
    /// The synthesizer reported a failure of its own.
    Failed,
    /// The request does not fit into [`WAVEFORM_BUFFER_SIZE`] samples.
    BufferOverflow,
}

impl SynthesisError {
    pub fn describe(&self) -> &'static str {
        match self {
            SynthesisError::Failed => "waveform synthesis failed",
            SynthesisError::BufferOverflow => "request does not fit into the sample buffer",
        }
    }
}

/// A waveform preparation job: the formatted packet line plus flag counts.
/// Built by the arbiter from a request and the configured callsigns, the way
/// the operator layer formats `SOURCE>DEST:payload` lines.
#[derive(Clone, Copy)]
#[cfg_attr(feature = "std", derive(Debug))]
pub struct SynthesisJob {
    line: [u8; MAX_SYNTH_LINE_SIZE],
    line_length: usize,
    preamble_flags: u16,
    postamble_flags: u16,
}

impl SynthesisJob {
    pub(crate) fn from_request(config: &ArbiterConfiguration, request: &TransmissionRequest) -> Self {
        let mut line = [0u8; MAX_SYNTH_LINE_SIZE];
        let mut length = 0usize;
        for part in [
            config.source_callsign.as_bytes(),
            b">",
            config.destination_callsign.as_bytes(),
            b":",
            request.text().as_bytes(),
        ] {
            let available = MAX_SYNTH_LINE_SIZE - length;
            let take = part.len().min(available);
            line[length..length + take].copy_from_slice(&part[..take]);
            length += take;
        }
        SynthesisJob {
            line,
            line_length: length,
            preamble_flags: request.preamble_flags(),
            postamble_flags: request.postamble_flags(),
        }
    }

    pub fn line(&self) -> &str {
        core::str::from_utf8(&self.line[..self.line_length]).unwrap_or("")
    }

    pub fn preamble_flags(&self) -> u16 {
        self.preamble_flags
    }

    pub fn postamble_flags(&self) -> u16 {
        self.postamble_flags
    }
}

/// Link state carried by status notifications.
#[derive(Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "std", derive(Debug))]
pub enum LinkStatus {
    Active,
    Idle,
}

/// Classified recoverable failures surfaced through [`Event::SystemError`].
#[derive(Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "std", derive(Debug))]
pub enum SystemErrorKind {
    /// Device transmit-session initialization returned failure.
    HardwareInitFailed,
    /// Waveform preparation failed; the transmit was skipped entirely.
    WaveformSynthesisFailed,
    /// A worker task could not be started.
    WorkerStartFailed,
}

impl SystemErrorKind {
    pub fn describe(&self) -> &'static str {
        match self {
            SystemErrorKind::HardwareInitFailed => "hardware initialization failed",
            SystemErrorKind::WaveformSynthesisFailed => "waveform synthesis failed",
            SystemErrorKind::WorkerStartFailed => "worker task could not be started",
        }
    }
}

/// Status notifications emitted by the arbiter. Events of the same kind are
/// causally ordered; ordering across kinds follows the processing steps of
/// one request.
#[derive(Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "std", derive(Debug))]
pub enum Event {
    ReceptionStatus(LinkStatus),
    TransmissionStatus(LinkStatus),
    CarrierStatus(LinkStatus),
    AprsMessage(DecodedMessage),
    SystemError(SystemErrorKind),
}

impl Event {
    pub fn kind_name(&self) -> &'static str {
        match self {
            Event::ReceptionStatus(_) => "reception_status",
            Event::TransmissionStatus(_) => "transmission_status",
            Event::CarrierStatus(_) => "carrier_status",
            Event::AprsMessage(_) => "aprs_message",
            Event::SystemError(_) => "system_error",
        }
    }
}

#[cfg(all(test, feature = "std"))]
mod tests {
    use super::*;

    #[test]
    fn request_keeps_text_and_flags() {
        let request = TransmissionRequest::new("TEST 123!", 10, 4, 0);
        assert_eq!(request.text(), "TEST 123!");
        assert_eq!(request.preamble_flags(), 10);
        assert_eq!(request.postamble_flags(), 4);
        assert_eq!(request.device_index(), 0);
        assert!(!request.carrier_only());
    }

    #[test]
    fn request_truncates_oversized_text() {
        let long = "x".repeat(MAX_REQUEST_TEXT_SIZE + 50);
        let request = TransmissionRequest::new(&long, 0, 0, 0);
        assert_eq!(request.text().len(), MAX_REQUEST_TEXT_SIZE);
    }

    #[test]
    fn carrier_request_has_no_payload() {
        let request = TransmissionRequest::new_carrier(2);
        assert!(request.carrier_only());
        assert_eq!(request.text(), "");
        assert_eq!(request.device_index(), 2);
    }

    #[test]
    fn synthesis_job_formats_packet_line() {
        let config = ArbiterConfiguration::default();
        let request = TransmissionRequest::new("TEST 123!", 10, 4, 0);
        let job = SynthesisJob::from_request(&config, &request);
        assert_eq!(job.line(), "VE2FPD>VE2FPD:TEST 123!");
        assert_eq!(job.preamble_flags(), 10);
        assert_eq!(job.postamble_flags(), 4);
    }

    #[test]
    fn sample_buffer_rejects_overflow() {
        let mut buffer = SampleBuffer::new();
        for _ in 0..WAVEFORM_BUFFER_SIZE {
            assert!(buffer.push(1));
        }
        assert!(!buffer.push(1));
        assert_eq!(buffer.sample_count(), WAVEFORM_BUFFER_SIZE);
    }

    #[test]
    fn event_kind_names_match_notification_contract() {
        assert_eq!(Event::ReceptionStatus(LinkStatus::Idle).kind_name(), "reception_status");
        assert_eq!(Event::TransmissionStatus(LinkStatus::Active).kind_name(), "transmission_status");
        assert_eq!(Event::CarrierStatus(LinkStatus::Active).kind_name(), "carrier_status");
        assert_eq!(Event::AprsMessage(DecodedMessage::new("hi")).kind_name(), "aprs_message");
        assert_eq!(Event::SystemError(SystemErrorKind::HardwareInitFailed).kind_name(), "system_error");
    }
}
