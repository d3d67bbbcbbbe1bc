//! Shared operating parameters.
//!
//! The operator layer mutates these at any time; the arbiter and the workers
//! only ever read them, and always at the point of use, so a mid-cycle change
//! takes effect on the next read rather than being cached across a transmit
//! cycle.

use core::cell::Cell;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;

/// Default center frequency in Hz (50.01 MHz).
pub const DEFAULT_FREQUENCY_HZ: u64 = 50_010_000;
/// Default RF gain in dB.
pub const DEFAULT_RF_GAIN: f32 = 14.0;
/// Default IF gain in dB.
pub const DEFAULT_IF_GAIN: f32 = 47.0;

#[derive(Clone, Copy)]
struct ParamsSnapshot {
    frequency_hz: u64,
    rf_gain: f32,
    if_gain: f32,
    device_index: u8,
    transmitting: bool,
}

/// Thread-safe holder for the operating parameters shared between the
/// arbiter and the operator-facing layer. Every accessor takes a short
/// critical section; the arbiter never blocks on it.
pub struct SharedParams {
    inner: Mutex<CriticalSectionRawMutex, Cell<ParamsSnapshot>>,
}

impl Default for SharedParams {
    fn default() -> Self {
        Self::new(DEFAULT_FREQUENCY_HZ, DEFAULT_RF_GAIN, DEFAULT_IF_GAIN, 0)
    }
}

impl SharedParams {
    pub const fn new(frequency_hz: u64, rf_gain: f32, if_gain: f32, device_index: u8) -> Self {
        SharedParams {
            inner: Mutex::new(Cell::new(ParamsSnapshot {
                frequency_hz,
                rf_gain,
                if_gain,
                device_index,
                transmitting: false,
            })),
        }
    }

    pub fn frequency_hz(&self) -> u64 {
        self.inner.lock(|cell| cell.get().frequency_hz)
    }

    pub fn set_frequency_hz(&self, frequency_hz: u64) {
        self.update(|snapshot| snapshot.frequency_hz = frequency_hz);
    }

    pub fn rf_gain(&self) -> f32 {
        self.inner.lock(|cell| cell.get().rf_gain)
    }

    pub fn if_gain(&self) -> f32 {
        self.inner.lock(|cell| cell.get().if_gain)
    }

    pub fn set_gains(&self, rf_gain: f32, if_gain: f32) {
        self.update(|snapshot| {
            snapshot.rf_gain = rf_gain;
            snapshot.if_gain = if_gain;
        });
    }

    pub fn device_index(&self) -> u8 {
        self.inner.lock(|cell| cell.get().device_index)
    }

    pub fn set_device_index(&self, device_index: u8) {
        self.update(|snapshot| snapshot.device_index = device_index);
    }

    /// True while a transmit session is between start and finalization.
    pub fn is_transmitting(&self) -> bool {
        self.inner.lock(|cell| cell.get().transmitting)
    }

    pub(crate) fn set_transmitting(&self, transmitting: bool) {
        self.update(|snapshot| snapshot.transmitting = transmitting);
    }

    fn update(&self, apply: impl FnOnce(&mut ParamsSnapshot)) {
        self.inner.lock(|cell| {
            let mut snapshot = cell.get();
            apply(&mut snapshot);
            cell.set(snapshot);
        });
    }
}

#[cfg(all(test, feature = "std"))]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_operator_defaults() {
        let params = SharedParams::default();
        assert_eq!(params.frequency_hz(), DEFAULT_FREQUENCY_HZ);
        assert_eq!(params.rf_gain(), DEFAULT_RF_GAIN);
        assert_eq!(params.if_gain(), DEFAULT_IF_GAIN);
        assert_eq!(params.device_index(), 0);
        assert!(!params.is_transmitting());
    }

    #[test]
    fn reads_observe_latest_write() {
        let params = SharedParams::default();
        params.set_frequency_hz(144_390_000);
        params.set_gains(20.0, 32.0);
        params.set_device_index(1);
        assert_eq!(params.frequency_hz(), 144_390_000);
        assert_eq!(params.rf_gain(), 20.0);
        assert_eq!(params.if_gain(), 32.0);
        assert_eq!(params.device_index(), 1);
    }

    #[test]
    fn transmitting_flag_round_trips() {
        let params = SharedParams::default();
        params.set_transmitting(true);
        assert!(params.is_transmitting());
        params.set_transmitting(false);
        assert!(!params.is_transmitting());
    }
}
