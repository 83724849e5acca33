//! # NTP Time Sync
//!
//! One-shot SNTP query at startup: resolve the pool host, fire a single
//! 48-byte request over UDP and read the transmit timestamp out of the
//! reply. Failure is recoverable; the station keeps its previous clock
//! value and logs a warning.

use embassy_net::dns::DnsQueryType;
use embassy_net::udp::{PacketMetadata, UdpSocket};
use embassy_net::{IpEndpoint, Stack};
use embassy_time::{Duration, Timer};

use crate::error::TimeSyncError;

/// Seconds between the NTP epoch (1900) and the Unix epoch (1970), as a
/// signed delta to add to an NTP timestamp.
pub const NTP_UNIX_DELTA: i64 = -2_208_988_800;

const NTP_PORT: u16 = 123;
/// Local port for the exchange; the stack rejects binding to port 0.
const NTP_LOCAL_PORT: u16 = 12_345;
const NTP_PACKET_LEN: usize = 48;
/// Offset of the transmit timestamp seconds field in the reply.
const TRANSMIT_TS_OFFSET: usize = 40;

/// Builds the client request: LI=0, VN=3, Mode=3 in the first byte, the
/// rest zero.
pub fn build_request() -> [u8; NTP_PACKET_LEN] {
    let mut packet = [0u8; NTP_PACKET_LEN];
    packet[0] = 0x1B;
    packet
}

/// Extracts the big-endian transmit timestamp from a server reply.
pub fn parse_reply(reply: &[u8]) -> Result<u32, TimeSyncError> {
    if reply.len() < TRANSMIT_TS_OFFSET + 4 {
        return Err(TimeSyncError::ShortReply(reply.len()));
    }
    let mut raw = [0u8; 4];
    raw.copy_from_slice(&reply[TRANSMIT_TS_OFFSET..TRANSMIT_TS_OFFSET + 4]);
    Ok(u32::from_be_bytes(raw))
}

/// Converts a raw NTP timestamp to local Unix time with a whole-hour UTC
/// offset applied.
pub fn ntp_to_unix(raw: u32, utc_offset_hours: i32) -> i64 {
    i64::from(raw) + NTP_UNIX_DELTA + i64::from(utc_offset_hours) * 3600
}

/// Performs the full exchange: DNS lookup, request, bounded wait for the
/// reply. Returns local Unix time.
pub async fn fetch_ntp_time(
    stack: Stack<'_>,
    host: &str,
    utc_offset_hours: i32,
    timeout: Duration,
) -> Result<i64, TimeSyncError> {
    let addrs = stack
        .dns_query(host, DnsQueryType::A)
        .await
        .map_err(|_| TimeSyncError::Dns)?;
    let addr = *addrs.first().ok_or(TimeSyncError::Dns)?;

    let mut rx_meta = [PacketMetadata::EMPTY; 4];
    let mut rx_buf = [0u8; 128];
    let mut tx_meta = [PacketMetadata::EMPTY; 4];
    let mut tx_buf = [0u8; 128];
    let mut socket = UdpSocket::new(stack, &mut rx_meta, &mut rx_buf, &mut tx_meta, &mut tx_buf);
    socket.bind(NTP_LOCAL_PORT).map_err(|_| TimeSyncError::Network)?;

    let request = build_request();
    socket
        .send_to(&request, IpEndpoint::new(addr, NTP_PORT))
        .await
        .map_err(|_| TimeSyncError::Network)?;

    let mut reply = [0u8; NTP_PACKET_LEN];
    let recv_fut = socket.recv_from(&mut reply);
    let timer = Timer::after(timeout);

    let n = match futures::future::select(core::pin::pin!(recv_fut), core::pin::pin!(timer)).await
    {
        futures::future::Either::Left((Ok((n, _meta)), _)) => n,
        futures::future::Either::Left((Err(_), _)) => return Err(TimeSyncError::Network),
        futures::future::Either::Right(((), _)) => return Err(TimeSyncError::Timeout),
    };

    let raw = parse_reply(&reply[..n])?;
    let unix = ntp_to_unix(raw, utc_offset_hours);
    log::info!("time synced from {host}: unix {unix}");
    Ok(unix)
}
