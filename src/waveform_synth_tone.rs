//! # Waveform Synthesizer Tone - Two-Tone AFSK Rendering
//!
//! Renders a packet line as a phase-continuous two-tone waveform: every bit
//! of the flag framing and the line bytes selects the mark or space tone for
//! a fixed number of samples. The output is an 8-bit sample stream sized for
//! direct streaming through the device transmit session.
//!
//! The rendering is intentionally compact rather than physically faithful;
//! its job is producing a deterministic, bounded buffer whose size scales
//! with the request, which is all the arbitration layer needs.

use micromath::F32Ext;

use crate::messages::{SampleBuffer, SynthesisError, SynthesisJob};

/// Output sample rate in Hz.
const SAMPLE_RATE_HZ: f32 = 22_050.0;
/// Tone for a one bit.
const MARK_FREQUENCY_HZ: f32 = 1_200.0;
/// Tone for a zero bit.
const SPACE_FREQUENCY_HZ: f32 = 2_200.0;
/// Samples rendered per bit.
const SAMPLES_PER_BIT: usize = 2;
/// Peak amplitude of the rendered tones.
const AMPLITUDE: f32 = 100.0;
/// HDLC-style flag byte used for preamble and postamble framing.
const FLAG_BYTE: u8 = 0x7E;

/// Two-tone waveform synthesizer.
#[derive(Clone, Copy)]
#[cfg_attr(feature = "std", derive(Debug))]
pub struct WaveformSynthesizer {
    _reserved: (),
}

impl WaveformSynthesizer {
    pub const fn with() -> Self {
        WaveformSynthesizer { _reserved: () }
    }

    pub async fn synthesize(&self, job: &SynthesisJob) -> Result<SampleBuffer, SynthesisError> {
        let mut buffer = SampleBuffer::new();
        let mut phase = 0.0f32;

        for _ in 0..job.preamble_flags() {
            render_byte(&mut buffer, &mut phase, FLAG_BYTE)?;
        }
        for byte in job.line().as_bytes() {
            render_byte(&mut buffer, &mut phase, *byte)?;
        }
        for _ in 0..job.postamble_flags() {
            render_byte(&mut buffer, &mut phase, FLAG_BYTE)?;
        }

        Ok(buffer)
    }
}

fn render_byte(buffer: &mut SampleBuffer, phase: &mut f32, byte: u8) -> Result<(), SynthesisError> {
    for bit in 0..8 {
        let frequency = if byte & (1 << bit) != 0 {
            MARK_FREQUENCY_HZ
        } else {
            SPACE_FREQUENCY_HZ
        };
        let phase_step = core::f32::consts::TAU * frequency / SAMPLE_RATE_HZ;
        for _ in 0..SAMPLES_PER_BIT {
            let sample = (F32Ext::sin(*phase) * AMPLITUDE) as i8;
            if !buffer.push(sample) {
                return Err(SynthesisError::BufferOverflow);
            }
            *phase += phase_step;
            if *phase > core::f32::consts::TAU {
                *phase -= core::f32::consts::TAU;
            }
        }
    }
    Ok(())
}
