//! Per-node MAC transmit state machine.
//!
//! Simplified adhoc contention: no carrier sensing and no random backoff
//! windows, just the guarantee that a node has at most one transmission in
//! flight and observes a fixed interframe space between frames. Concurrent
//! send requests fail with [`MacError::DeviceBusy`] and the upper layer
//! decides what to do with the frame.

use crate::signal_calculations::frame_airtime;

/// Fixed interframe space observed after every transmission before the
/// device accepts the next frame. DIFS for ERP-OFDM with short slots.
const INTERFRAME_SPACE: f64 = 28e-6;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MacState {
    Idle,
    Transmitting,
    Backoff,
}

/// Error type for send requests the device cannot take.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MacError {
    /// A transmission is already outstanding (or the interframe space has
    /// not elapsed yet).
    DeviceBusy,
}

impl std::fmt::Display for MacError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MacError::DeviceBusy => write!(f, "device busy"),
        }
    }
}

impl std::error::Error for MacError {}

pub struct MacLayer {
    state: MacState,
    bit_rate_bps: f64,
}

impl MacLayer {
    pub fn new(bit_rate_bps: f64) -> Self {
        MacLayer {
            state: MacState::Idle,
            bit_rate_bps,
        }
    }

    pub fn state(&self) -> MacState {
        self.state
    }

    pub fn is_transmitting(&self) -> bool {
        self.state == MacState::Transmitting
    }

    /// Accept a frame for transmission. Returns the frame airtime in seconds;
    /// the caller schedules the completion event and must report it back via
    /// [`MacLayer::finish_transmit`].
    pub fn begin_transmit(&mut self, payload_bytes: usize) -> Result<f64, MacError> {
        match self.state {
            MacState::Idle => {
                self.state = MacState::Transmitting;
                Ok(frame_airtime(payload_bytes, self.bit_rate_bps))
            }
            MacState::Transmitting | MacState::Backoff => Err(MacError::DeviceBusy),
        }
    }

    /// The outstanding transmission finished; the device enters the
    /// interframe space. Returns its duration.
    pub fn finish_transmit(&mut self) -> f64 {
        debug_assert_eq!(self.state, MacState::Transmitting);
        self.state = MacState::Backoff;
        INTERFRAME_SPACE
    }

    /// The interframe space elapsed; the device is ready again.
    pub fn backoff_elapsed(&mut self) {
        debug_assert_eq!(self.state, MacState::Backoff);
        self.state = MacState::Idle;
    }
}
