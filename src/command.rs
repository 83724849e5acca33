//! # Remote Commands
//!
//! Decodes control payloads arriving on the subscribed topic and applies
//! them to the indicator LED. Payloads are exact byte strings; anything
//! else is carried as [`Command::Unknown`] so the caller can log it.

use embedded_hal::digital::OutputPin;
use heapless::Vec;

/// Longest unrecognized payload kept for diagnostics.
pub const MAX_COMMAND_LEN: usize = 64;

/// A control command received over the broker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    LedOn,
    LedOff,
    /// Anything that is not an exact known command, truncated to
    /// [`MAX_COMMAND_LEN`] bytes.
    Unknown(Vec<u8, MAX_COMMAND_LEN>),
}

impl Command {
    /// Decodes a raw payload. Matching is exact and case-sensitive; there is
    /// no trimming, so `b"LEDon\n"` is unknown.
    pub fn decode(payload: &[u8]) -> Self {
        match payload {
            b"LEDon" => Self::LedOn,
            b"LEDoff" => Self::LedOff,
            other => {
                let mut kept = Vec::new();
                let take = other.len().min(MAX_COMMAND_LEN);
                // Cannot fail: `take` is bounded by the capacity.
                let _ = kept.extend_from_slice(&other[..take]);
                Self::Unknown(kept)
            }
        }
    }
}

/// Driver for the indicator LED shared by remote commands and the status
/// page. Tracks the logical state so the HTTP page can render it.
pub struct LedControl<P: OutputPin> {
    pin: P,
    on: bool,
}

impl<P: OutputPin> LedControl<P> {
    /// Starts with the LED off.
    pub fn new(mut pin: P) -> Result<Self, P::Error> {
        pin.set_low()?;
        Ok(Self { pin, on: false })
    }

    /// Applies a command. Idempotent; `Unknown` is a no-op and the pin is
    /// not touched.
    pub fn apply(&mut self, command: &Command) -> Result<(), P::Error> {
        match command {
            Command::LedOn => {
                self.pin.set_high()?;
                self.on = true;
            }
            Command::LedOff => {
                self.pin.set_low()?;
                self.on = false;
            }
            Command::Unknown(payload) => {
                log::warn!("ignoring unknown command ({} bytes)", payload.len());
            }
        }
        Ok(())
    }

    /// Logical LED state, for the status page.
    pub fn is_on(&self) -> bool {
        self.on
    }
}
