//! # Wi-Fi Link Supervision
//!
//! Brings the station's network link up and reports the result as a
//! [`NetworkSession`]. The underlying driver (CYW43 on the Pico W) sits
//! behind the [`NetLink`] port; this module owns the polling loop, the retry
//! budget and the success blink, and nothing hardware-specific.
//!
//! There is deliberately no retry beyond the configured bound: if the link
//! does not come up, the caller restarts the process.

use embedded_hal::digital::OutputPin;
use embedded_hal_async::delay::DelayNs;
use heapless::String;

use crate::error::ConnectivityError;

/// Link status codes as reported by the wireless driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LinkStatus {
    /// 0: link down.
    Down,
    /// 1: joining the access point.
    Join,
    /// 2: associated, no IP yet.
    NoIp,
    /// 3: link up with an address. The only success code.
    Up,
    /// -1: link failure.
    Fail,
    /// -2: SSID was not found.
    NoNet,
    /// -3: authorization failure.
    BadAuth,
}

impl LinkStatus {
    /// Maps a raw driver code. Codes outside the documented set are treated
    /// as a link failure.
    pub const fn from_code(code: i8) -> Self {
        match code {
            0 => Self::Down,
            1 => Self::Join,
            2 => Self::NoIp,
            3 => Self::Up,
            -2 => Self::NoNet,
            -3 => Self::BadAuth,
            _ => Self::Fail,
        }
    }

    pub const fn code(self) -> i8 {
        match self {
            Self::Down => 0,
            Self::Join => 1,
            Self::NoIp => 2,
            Self::Up => 3,
            Self::Fail => -1,
            Self::NoNet => -2,
            Self::BadAuth => -3,
        }
    }

    pub const fn describe(self) -> &'static str {
        match self {
            Self::Down => "link down",
            Self::Join => "link join",
            Self::NoIp => "no IP",
            Self::Up => "connected",
            Self::Fail => "link failure",
            Self::NoNet => "SSID was not found",
            Self::BadAuth => "authorization failure",
        }
    }

    /// A settled status ends the wait loop: either success (`Up`) or one of
    /// the negative failure codes.
    pub const fn is_settled(self) -> bool {
        self.code() < 0 || self.code() >= 3
    }
}

/// Port to the wireless driver.
pub trait NetLink {
    /// Starts joining the given network. Progress is observed via
    /// [`NetLink::status`].
    fn join(&mut self, ssid: &str, password: &str);

    /// Current link status.
    fn status(&mut self) -> LinkStatus;
}

/// Wi-Fi bring-up parameters.
#[derive(Debug, Clone, Copy)]
pub struct WifiConfig<'a> {
    pub ssid: &'a str,
    pub password: &'a str,
    /// Number of status polls before giving up.
    pub max_wait: u32,
    /// Delay between status polls, in milliseconds.
    pub retry_interval_ms: u32,
}

/// Lifecycle state of the network link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SessionState {
    Disconnected,
    Connecting,
    Connected,
    Failed,
}

/// The one network session of the process. Mutated only here; a `Failed`
/// state is terminal (process restart).
#[derive(Debug)]
pub struct NetworkSession {
    pub state: SessionState,
    pub ssid: String<32>,
    pub retries_remaining: u32,
}

/// Indicator blink cadence on successful connect.
const BLINK_HALF_PERIOD_MS: u32 = 250;

/// Drives the link from `Disconnected` through `Connecting` to either
/// `Connected` or `Failed`.
///
/// Polls `link.status()` every `retry_interval_ms` for up to `max_wait`
/// polls, stopping early once the status settles. On success the indicator
/// LED blinks once per unit of the numeric success code (three blinks for
/// status 3) as a visual acknowledgment.
///
/// The delay source is injected so tests can drive the loop without real
/// time passing.
pub async fn connect<L, P, D>(
    link: &mut L,
    indicator: &mut P,
    delay: &mut D,
    config: &WifiConfig<'_>,
) -> Result<NetworkSession, ConnectivityError>
where
    L: NetLink,
    P: OutputPin,
    D: DelayNs,
{
    let mut session = NetworkSession {
        state: SessionState::Connecting,
        ssid: String::try_from(config.ssid).unwrap_or_default(),
        retries_remaining: config.max_wait,
    };

    log::info!("joining '{}'", config.ssid);
    link.join(config.ssid, config.password);

    let mut status = link.status();
    while !status.is_settled() && session.retries_remaining > 0 {
        session.retries_remaining -= 1;
        log::debug!(
            "waiting for link ({}), {} polls left",
            status.describe(),
            session.retries_remaining
        );
        delay.delay_ms(config.retry_interval_ms).await;
        status = link.status();
    }

    if status != LinkStatus::Up {
        session.state = SessionState::Failed;
        log::error!("wi-fi error, connection code {}: {}", status.code(), status.describe());
        return Err(if status.is_settled() {
            ConnectivityError::LinkFailed(status)
        } else {
            ConnectivityError::RetriesExhausted(status)
        });
    }

    // Visual acknowledgment: one blink per unit of the success code.
    for _ in 0..status.code() {
        let _ = indicator.set_high();
        delay.delay_ms(BLINK_HALF_PERIOD_MS).await;
        let _ = indicator.set_low();
        delay.delay_ms(BLINK_HALF_PERIOD_MS).await;
    }

    session.state = SessionState::Connected;
    log::info!("connected to '{}'", config.ssid);
    Ok(session)
}
