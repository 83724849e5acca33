//! # Error Types
//!
//! Every failure domain of the station gets its own enum, so callers can tell
//! a fatal connectivity problem (restart the process) from a recoverable one
//! (skip the current poll cycle, keep the previous clock value).

use crate::wifi::LinkStatus;

/// Wi-Fi link bring-up failure.
///
/// Fatal: the retry budget is the only retry policy, so the caller must treat
/// this as a process-restart condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConnectivityError {
    /// The link never reached `LinkStatus::Up` within the configured number
    /// of polls. Carries the last status observed.
    RetriesExhausted(LinkStatus),
    /// The link settled on a failure code (`Fail`, `NoNet`, `BadAuth`).
    LinkFailed(LinkStatus),
}

/// The primary error enum for the broker session.
///
/// Generic over the transport error type `E`, allowing it to wrap specific
/// errors from the underlying network transport (e.g. TCP).
///
/// Any `BrokerError` invalidates the session: the recovery policy is log,
/// sleep [`crate::broker::RESTART_COOLDOWN`], then restart the process.
#[derive(Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BrokerError<E> {
    /// An error occurred in the underlying transport layer.
    Transport(E),
    /// A violation of the MQTT wire format.
    Protocol(ProtocolError),
    /// The broker refused the connection. The enclosed CONNACK reason code
    /// says why (1 = bad protocol version, 4 = bad credentials, ...).
    ConnectionRefused(u8),
    /// The session was invalidated by an earlier I/O error and must be
    /// rebuilt before further use.
    NotConnected,
    /// An operation timed out.
    Timeout,
}

impl<E> BrokerError<E> {
    /// Lifts a codec error into the session error. A plain constructor
    /// instead of a `From` impl, which would collide with the generic
    /// transport parameter.
    pub(crate) fn protocol(err: ProtocolError) -> Self {
        BrokerError::Protocol(err)
    }
}

/// Enumerates MQTT wire-format errors, shared by the codec and the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ProtocolError {
    /// An invalid packet type was received.
    InvalidPacketType(u8),
    /// The broker sent an unexpected response packet.
    InvalidResponse,
    /// The connection was closed by the broker.
    ConnectionClosed,
    /// A packet was received that was not correctly formed.
    MalformedPacket,
    /// Topic or payload exceeds what the wire format can carry.
    PayloadTooLarge,
    /// A string was not valid UTF-8.
    InvalidUtf8String,
    /// The scratch buffer is too small for the packet being encoded.
    BufferTooSmall,
}

/// Sensor transaction failure. Recoverable: the current poll cycle is
/// skipped and the next interval retries from scratch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SensorError {
    /// The device did not acknowledge the transaction.
    Nack,
    /// Timeout waiting for the conversion or the bus.
    Timeout,
    /// The device answered with a malformed or out-of-range response.
    InvalidData,
}

/// NTP exchange failure. Recoverable: startup proceeds with the previous
/// clock value and logs a warning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TimeSyncError {
    /// Host name did not resolve to any address.
    Dns,
    /// Socket-level send/receive failure.
    Network,
    /// No reply within the timeout.
    Timeout,
    /// Reply too short to contain the transmit timestamp (carries the
    /// received length).
    ShortReply(usize),
}

/// Invalid input to an altitude computation. Returned as a typed failure,
/// never silently coerced into a NaN.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum MetricError {
    /// Measured or sea-level pressure was zero or negative.
    NonPositivePressure,
}
