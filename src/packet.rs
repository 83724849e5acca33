//! # MQTT Packet Structures and Serialization
//!
//! A deliberately small MQTT 3.1.1 codec: only the packets a QoS 0
//! telemetry client ever exchanges. The station publishes fire-and-forget
//! and subscribes to a single control topic, so there is no packet-id
//! bookkeeping beyond the SUBSCRIBE/SUBACK pair and no QoS 1/2 flow.

use heapless::Vec;

use crate::error::ProtocolError;

/// MQTT protocol level byte for version 3.1.1.
const PROTOCOL_LEVEL: u8 = 4;

/// A packet that can be encoded into a byte buffer.
///
/// Returns the total number of bytes written.
pub trait EncodePacket {
    fn encode(&self, buf: &mut [u8]) -> Result<usize, ProtocolError>;
}

/// Packets the broker can send to this client.
#[derive(Debug)]
pub enum Inbound<'a> {
    ConnAck(ConnAck),
    Publish(Publish<'a>),
    SubAck(SubAck),
    PingResp,
}

/// Decodes one inbound packet from the start of `buf`.
///
/// Returns `Ok(None)` on an empty buffer. Packets a broker never sends to a
/// QoS 0 subscriber (CONNECT, SUBSCRIBE, ...) are rejected as invalid.
pub fn decode_inbound(buf: &[u8]) -> Result<Option<Inbound<'_>>, ProtocolError> {
    if buf.is_empty() {
        return Ok(None);
    }

    let packet_type = buf[0] >> 4;
    let packet = match packet_type {
        2 => Inbound::ConnAck(ConnAck::decode(buf)?),
        3 => Inbound::Publish(Publish::decode(buf)?),
        9 => Inbound::SubAck(SubAck::decode(buf)?),
        13 => Inbound::PingResp,
        _ => return Err(ProtocolError::InvalidPacketType(packet_type)),
    };

    Ok(Some(packet))
}

// --- CONNECT Packet ---

#[derive(Debug)]
pub struct Connect<'a> {
    pub client_id: &'a str,
    pub keep_alive: u16,
    pub clean_session: bool,
}

impl<'a> Connect<'a> {
    pub fn new(client_id: &'a str, keep_alive: u16, clean_session: bool) -> Self {
        Self {
            client_id,
            keep_alive,
            clean_session,
        }
    }
}

impl EncodePacket for Connect<'_> {
    fn encode(&self, buf: &mut [u8]) -> Result<usize, ProtocolError> {
        let mut cursor = 0;
        *buf.get_mut(cursor).ok_or(ProtocolError::BufferTooSmall)? = 0x10;
        cursor += 1;

        // Reserve space for the remaining-length varint, compact afterwards.
        let remaining_len_pos = cursor;
        cursor += 4;
        let content_start = cursor;

        cursor += write_utf8_string(&mut buf[cursor..], "MQTT")?;
        *buf.get_mut(cursor).ok_or(ProtocolError::BufferTooSmall)? = PROTOCOL_LEVEL;
        cursor += 1;

        let mut flags = 0;
        if self.clean_session {
            flags |= 0x02;
        }
        *buf.get_mut(cursor).ok_or(ProtocolError::BufferTooSmall)? = flags;
        cursor += 1;

        buf.get_mut(cursor..cursor + 2)
            .ok_or(ProtocolError::BufferTooSmall)?
            .copy_from_slice(&self.keep_alive.to_be_bytes());
        cursor += 2;

        cursor += write_utf8_string(&mut buf[cursor..], self.client_id)?;

        finish_packet(buf, remaining_len_pos, content_start, cursor)
    }
}

// --- CONNACK Packet ---

#[derive(Debug)]
pub struct ConnAck {
    pub session_present: bool,
    pub reason_code: u8,
}

impl ConnAck {
    fn decode(buf: &[u8]) -> Result<Self, ProtocolError> {
        // Fixed header (2) + ack flags + reason code.
        if buf.len() < 4 {
            return Err(ProtocolError::MalformedPacket);
        }
        Ok(Self {
            session_present: (buf[2] & 0x01) != 0,
            reason_code: buf[3],
        })
    }
}

// --- PUBLISH Packet ---

/// A PUBLISH in either direction. QoS bits are parsed only to skip the
/// packet id a broker may attach; outgoing publishes are always QoS 0.
#[derive(Debug)]
pub struct Publish<'a> {
    pub topic: &'a str,
    pub payload: &'a [u8],
}

impl<'a> Publish<'a> {
    pub fn new(topic: &'a str, payload: &'a [u8]) -> Self {
        Self { topic, payload }
    }

    fn decode(buf: &'a [u8]) -> Result<Self, ProtocolError> {
        let qos_bits = (buf[0] >> 1) & 0x03;
        if qos_bits == 3 {
            return Err(ProtocolError::MalformedPacket);
        }

        let mut cursor = 1;
        let remaining_len = read_variable_byte_integer(&mut cursor, buf)?;
        let packet_end = cursor + remaining_len;
        if packet_end > buf.len() {
            return Err(ProtocolError::MalformedPacket);
        }

        let topic = read_utf8_string(&mut cursor, buf)?;

        // A downgraded-to-QoS-0 subscription never sees these, but skip the
        // packet id rather than misparse it as payload.
        if qos_bits > 0 {
            cursor += 2;
        }

        let payload = buf
            .get(cursor..packet_end)
            .ok_or(ProtocolError::MalformedPacket)?;

        Ok(Publish { topic, payload })
    }
}

impl EncodePacket for Publish<'_> {
    fn encode(&self, buf: &mut [u8]) -> Result<usize, ProtocolError> {
        let mut cursor = 0;
        // PUBLISH, QoS 0, no retain.
        *buf.get_mut(cursor).ok_or(ProtocolError::BufferTooSmall)? = 0x30;
        cursor += 1;

        let remaining_len_pos = cursor;
        cursor += 4;
        let content_start = cursor;

        cursor += write_utf8_string(&mut buf[cursor..], self.topic)?;

        let end = cursor + self.payload.len();
        buf.get_mut(cursor..end)
            .ok_or(ProtocolError::BufferTooSmall)?
            .copy_from_slice(self.payload);
        cursor = end;

        finish_packet(buf, remaining_len_pos, content_start, cursor)
    }
}

// --- SUBSCRIBE Packet ---

/// A single-topic SUBSCRIBE with requested QoS 0.
#[derive(Debug)]
pub struct Subscribe<'a> {
    pub packet_id: u16,
    pub topic: &'a str,
}

impl<'a> Subscribe<'a> {
    pub fn new(packet_id: u16, topic: &'a str) -> Self {
        Self { packet_id, topic }
    }
}

impl EncodePacket for Subscribe<'_> {
    fn encode(&self, buf: &mut [u8]) -> Result<usize, ProtocolError> {
        let mut cursor = 0;
        // SUBSCRIBE fixed header carries reserved bits 0b0010.
        *buf.get_mut(cursor).ok_or(ProtocolError::BufferTooSmall)? = 0x82;
        cursor += 1;

        let remaining_len_pos = cursor;
        cursor += 4;
        let content_start = cursor;

        buf.get_mut(cursor..cursor + 2)
            .ok_or(ProtocolError::BufferTooSmall)?
            .copy_from_slice(&self.packet_id.to_be_bytes());
        cursor += 2;

        cursor += write_utf8_string(&mut buf[cursor..], self.topic)?;
        // Requested QoS byte.
        *buf.get_mut(cursor).ok_or(ProtocolError::BufferTooSmall)? = 0x00;
        cursor += 1;

        finish_packet(buf, remaining_len_pos, content_start, cursor)
    }
}

// --- SUBACK Packet ---

#[derive(Debug)]
pub struct SubAck {
    pub packet_id: u16,
    pub reason_codes: Vec<u8, 8>,
}

impl SubAck {
    fn decode(buf: &[u8]) -> Result<Self, ProtocolError> {
        let mut cursor = 1;
        let remaining_len = read_variable_byte_integer(&mut cursor, buf)?;
        let packet_end = cursor + remaining_len;
        if packet_end > buf.len() || remaining_len < 2 {
            return Err(ProtocolError::MalformedPacket);
        }

        let packet_id = u16::from_be_bytes([buf[cursor], buf[cursor + 1]]);
        cursor += 2;

        let mut reason_codes = Vec::new();
        while cursor < packet_end {
            let _ = reason_codes.push(buf[cursor]);
            cursor += 1;
        }

        Ok(SubAck {
            packet_id,
            reason_codes,
        })
    }

    /// A SUBACK reason code of 0x80 means the broker rejected the filter.
    pub fn granted(&self) -> bool {
        !self.reason_codes.is_empty() && self.reason_codes.iter().all(|&c| c <= 2)
    }
}

// --- PINGREQ / DISCONNECT Packets ---

#[derive(Debug)]
pub struct PingReq;

impl EncodePacket for PingReq {
    fn encode(&self, buf: &mut [u8]) -> Result<usize, ProtocolError> {
        if buf.len() < 2 {
            return Err(ProtocolError::BufferTooSmall);
        }
        buf[0] = 0xC0;
        buf[1] = 0x00;
        Ok(2)
    }
}

#[derive(Debug)]
pub struct Disconnect;

impl EncodePacket for Disconnect {
    fn encode(&self, buf: &mut [u8]) -> Result<usize, ProtocolError> {
        if buf.len() < 2 {
            return Err(ProtocolError::BufferTooSmall);
        }
        buf[0] = 0xE0;
        buf[1] = 0x00;
        Ok(2)
    }
}

// --- Wire helpers ---

/// Writes the remaining-length varint into the reserved gap and compacts the
/// body over the unused reservation. Returns the final packet length.
fn finish_packet(
    buf: &mut [u8],
    remaining_len_pos: usize,
    content_start: usize,
    cursor: usize,
) -> Result<usize, ProtocolError> {
    let remaining_len = cursor - content_start;
    let len_bytes = write_variable_byte_integer(&mut buf[remaining_len_pos..], remaining_len)?;
    let header_len = remaining_len_pos + len_bytes;
    buf.copy_within(content_start..cursor, header_len);
    Ok(header_len + remaining_len)
}

/// Reads an MQTT variable-byte integer, advancing the cursor.
fn read_variable_byte_integer(cursor: &mut usize, buf: &[u8]) -> Result<usize, ProtocolError> {
    let mut multiplier = 1;
    let mut value = 0;
    let mut i = 0;
    loop {
        let encoded_byte = buf
            .get(*cursor + i)
            .ok_or(ProtocolError::MalformedPacket)?;
        value += (encoded_byte & 127) as usize * multiplier;
        if (encoded_byte & 128) == 0 {
            break;
        }
        multiplier *= 128;
        i += 1;
        if i >= 4 {
            return Err(ProtocolError::MalformedPacket);
        }
    }
    *cursor += i + 1;
    Ok(value)
}

/// Writes a variable-byte integer at the start of `buf`, returning the byte
/// count.
fn write_variable_byte_integer(buf: &mut [u8], mut val: usize) -> Result<usize, ProtocolError> {
    let mut i = 0;
    loop {
        let mut encoded_byte = (val % 128) as u8;
        val /= 128;
        if val > 0 {
            encoded_byte |= 128;
        }
        *buf.get_mut(i).ok_or(ProtocolError::BufferTooSmall)? = encoded_byte;
        i += 1;
        if val == 0 {
            break;
        }
    }
    Ok(i)
}

/// Reads a UTF-8 string prefixed with a 2-byte big-endian length.
fn read_utf8_string<'a>(cursor: &mut usize, buf: &'a [u8]) -> Result<&'a str, ProtocolError> {
    let len_bytes = buf
        .get(*cursor..*cursor + 2)
        .ok_or(ProtocolError::MalformedPacket)?;
    let len = u16::from_be_bytes([len_bytes[0], len_bytes[1]]) as usize;
    *cursor += 2;
    let s = core::str::from_utf8(
        buf.get(*cursor..*cursor + len)
            .ok_or(ProtocolError::MalformedPacket)?,
    )
    .map_err(|_| ProtocolError::InvalidUtf8String)?;
    *cursor += len;
    Ok(s)
}

/// Writes a UTF-8 string prefixed with a 2-byte big-endian length.
fn write_utf8_string(buf: &mut [u8], s: &str) -> Result<usize, ProtocolError> {
    let len = s.len();
    if len > u16::MAX as usize {
        return Err(ProtocolError::PayloadTooLarge);
    }

    let required = 2 + len;
    let slice = buf.get_mut(0..required).ok_or(ProtocolError::BufferTooSmall)?;
    slice[0..2].copy_from_slice(&(len as u16).to_be_bytes());
    slice[2..].copy_from_slice(s.as_bytes());
    Ok(required)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connect_encodes_protocol_header_and_client_id() {
        let mut buf = [0u8; 64];
        let n = Connect::new("pico-weather", 7200, true)
            .encode(&mut buf)
            .unwrap();

        assert_eq!(buf[0], 0x10);
        // Variable header: "MQTT", level 4, clean-session flag, keep-alive.
        assert_eq!(&buf[2..8], &[0x00, 0x04, b'M', b'Q', b'T', b'T']);
        assert_eq!(buf[8], PROTOCOL_LEVEL);
        assert_eq!(buf[9], 0x02);
        assert_eq!(&buf[10..12], &7200u16.to_be_bytes());
        assert_eq!(&buf[14..n], b"pico-weather");
        // Remaining length covers everything after the 2-byte fixed header.
        assert_eq!(buf[1] as usize, n - 2);
    }

    #[test]
    fn inbound_publish_decodes_topic_and_payload() {
        // PUBLISH "station/led" -> "LEDon", QoS 0, as a broker would frame it.
        let mut frame = [0u8; 32];
        let n = Publish::new("station/led", b"LEDon")
            .encode(&mut frame)
            .unwrap();

        match decode_inbound(&frame[..n]).unwrap().unwrap() {
            Inbound::Publish(p) => {
                assert_eq!(p.topic, "station/led");
                assert_eq!(p.payload, b"LEDon");
            }
            other => panic!("expected publish, got {other:?}"),
        }
    }

    #[test]
    fn subscribe_encodes_packet_id_filter_and_qos() {
        let mut buf = [0u8; 32];
        let n = Subscribe::new(1, "station/led").encode(&mut buf).unwrap();

        assert_eq!(buf[0], 0x82);
        assert_eq!(&buf[2..4], &[0x00, 0x01]);
        assert_eq!(&buf[4..6], &[0x00, 11]);
        assert_eq!(&buf[6..17], b"station/led");
        // Trailing requested-QoS byte.
        assert_eq!(buf[n - 1], 0x00);
    }

    #[test]
    fn suback_reports_rejected_filter() {
        let accepted = [0x90, 0x03, 0x00, 0x01, 0x00];
        let rejected = [0x90, 0x03, 0x00, 0x01, 0x80];

        match decode_inbound(&accepted).unwrap().unwrap() {
            Inbound::SubAck(ack) => {
                assert_eq!(ack.packet_id, 1);
                assert!(ack.granted());
            }
            other => panic!("expected suback, got {other:?}"),
        }
        match decode_inbound(&rejected).unwrap().unwrap() {
            Inbound::SubAck(ack) => assert!(!ack.granted()),
            other => panic!("expected suback, got {other:?}"),
        }
    }

    #[test]
    fn truncated_publish_is_malformed() {
        let mut frame = [0u8; 32];
        let n = Publish::new("station/led", b"LEDon")
            .encode(&mut frame)
            .unwrap();

        assert_eq!(
            decode_inbound(&frame[..n - 2]).unwrap_err(),
            ProtocolError::MalformedPacket
        );
    }

    #[test]
    fn outbound_packet_types_are_rejected_inbound() {
        let mut buf = [0u8; 32];
        let n = Connect::new("x", 60, true).encode(&mut buf).unwrap();
        assert_eq!(
            decode_inbound(&buf[..n]).unwrap_err(),
            ProtocolError::InvalidPacketType(1)
        );
    }
}
