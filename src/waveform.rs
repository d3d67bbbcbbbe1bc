//! Waveform preparation dispatch.
//!
//! A single dedicated task turns formatted packet lines into transmit-ready
//! sample buffers. The arbiter hands it one job at a time and pends on the
//! result, so preparation runs off the arbiter's own loop but never
//! overlaps with itself.

use log::{log, Level};

use crate::SynthesisJobQueueReceiver;
use crate::SynthesisResultQueueSender;
use crate::WaveformSynthesizer;

/// Serves synthesis jobs for the lifetime of the manager.
#[cfg_attr(feature = "std", embassy_executor::task(pool_size = 8))]
#[cfg_attr(feature = "embedded", embassy_executor::task(pool_size = 1))]
pub(crate) async fn waveform_synth_task(
    synthesizer: WaveformSynthesizer,
    job_receiver: SynthesisJobQueueReceiver,
    result_sender: SynthesisResultQueueSender,
) {
    loop {
        let job = job_receiver.receive().await;
        let result = synthesizer.synthesize(&job).await;
        if let Err(error) = &result {
            log!(Level::Error, "Waveform preparation failed: {}", error.describe());
        }
        result_sender.send(result).await;
    }
}
