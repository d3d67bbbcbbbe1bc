//! # Waveform Synthesizer Simulator - Deterministic Test Synthesizer
//!
//! Produces a sample buffer whose length is a deterministic function of the
//! job (one sample per framing flag and line byte), so tests can identify
//! which request a transmission belongs to from the sample count alone.
//! A failure can be scripted through a channel: the next job consumes the
//! scripted error instead of producing samples.

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;

use crate::messages::{SampleBuffer, SynthesisError, SynthesisJob};

/// Size of the scripted-failure queue.
pub const SYNTH_SCRIPT_QUEUE_SIZE: usize = 4;
pub type SynthScriptQueue = embassy_sync::channel::Channel<CriticalSectionRawMutex, SynthesisError, SYNTH_SCRIPT_QUEUE_SIZE>;
pub type SynthScriptQueueSender = embassy_sync::channel::Sender<'static, CriticalSectionRawMutex, SynthesisError, SYNTH_SCRIPT_QUEUE_SIZE>;
pub type SynthScriptQueueReceiver = embassy_sync::channel::Receiver<'static, CriticalSectionRawMutex, SynthesisError, SYNTH_SCRIPT_QUEUE_SIZE>;

/// Deterministic synthesizer with scriptable failures.
#[derive(Clone, Copy)]
pub struct WaveformSynthesizer {
    script_receiver: SynthScriptQueueReceiver,
}

impl WaveformSynthesizer {
    pub const fn with(script_receiver: SynthScriptQueueReceiver) -> Self {
        WaveformSynthesizer { script_receiver }
    }

    pub async fn synthesize(&self, job: &SynthesisJob) -> Result<SampleBuffer, SynthesisError> {
        if let Ok(error) = self.script_receiver.try_receive() {
            return Err(error);
        }
        let mut buffer = SampleBuffer::new();
        let sample_count = job.preamble_flags() as usize + job.line().len() + job.postamble_flags() as usize;
        for _ in 0..sample_count {
            if !buffer.push(0) {
                return Err(SynthesisError::BufferOverflow);
            }
        }
        Ok(buffer)
    }
}
