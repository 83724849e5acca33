//! # Broker Session
//!
//! One [`BrokerSession`] exists per process. It owns the transport, the set
//! of subscribed topics and the scratch buffers for the wire codec.
//!
//! There is no reconnect logic here on purpose: any I/O error invalidates
//! the session, and the documented recovery policy is log, sleep
//! [`RESTART_COOLDOWN`], then perform a full process restart. On a device
//! this size that is simpler and more robust than trying to patch up a
//! half-dead TCP connection.

use embassy_time::{Duration, Instant};
use heapless::{String, Vec};

use crate::error::{BrokerError, ProtocolError};
use crate::packet::{Connect, Disconnect, EncodePacket, Inbound, PingReq, Publish, Subscribe, decode_inbound};
use crate::transport::BrokerTransport;

/// Maximum length of a topic string stored by the session.
pub const MAX_TOPIC_LEN: usize = 64;

/// Maximum inbound control payload copied out of the rx buffer.
pub const MAX_INBOUND_PAYLOAD: usize = 64;

/// How long to wait before restarting the process after a fatal broker
/// error.
pub const RESTART_COOLDOWN: Duration = Duration::from_secs(10);

/// Connection parameters for [`BrokerSession::connect`].
#[derive(Debug, Clone, Copy)]
pub struct BrokerOptions<'a> {
    pub client_id: &'a str,
    pub keep_alive: u16,
    pub clean_session: bool,
}

impl<'a> BrokerOptions<'a> {
    pub fn new(client_id: &'a str, keep_alive: u16) -> Self {
        Self {
            client_id,
            keep_alive,
            clean_session: true,
        }
    }
}

/// The set of topics this session has subscribed to.
///
/// Owns its strings, so callers can build topics on the stack and forget
/// them. Duplicates are ignored.
#[derive(Default)]
pub struct TopicSet<const MAX_TOPICS: usize> {
    topics: Vec<String<MAX_TOPIC_LEN>, MAX_TOPICS>,
}

impl<const MAX_TOPICS: usize> TopicSet<MAX_TOPICS> {
    pub fn new() -> Self {
        Self { topics: Vec::new() }
    }

    /// Records a topic, copying the string. Returns `false` if the set is
    /// full or the topic is too long.
    pub fn add(&mut self, topic: &str) -> bool {
        if self.contains(topic) {
            return true;
        }
        let Ok(owned) = String::try_from(topic) else {
            return false;
        };
        self.topics.push(owned).is_ok()
    }

    pub fn contains(&self, topic: &str) -> bool {
        self.topics.iter().any(|t| t.as_str() == topic)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.topics.iter().map(|s| s.as_str())
    }

    pub fn len(&self) -> usize {
        self.topics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.topics.is_empty()
    }
}

/// An inbound message copied out of the session's receive buffer, so the
/// caller can keep it past the next read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub topic: String<MAX_TOPIC_LEN>,
    pub payload: Vec<u8, MAX_INBOUND_PAYLOAD>,
}

/// An MQTT session over a [`BrokerTransport`].
///
/// `BUF` sizes the rx/tx scratch buffers; 256 bytes comfortably fits the
/// station's control and telemetry packets.
pub struct BrokerSession<T: BrokerTransport, const BUF: usize = 256> {
    transport: T,
    topics: TopicSet<4>,
    last_publish: Instant,
    next_packet_id: u16,
    connected: bool,
    rx: [u8; BUF],
    tx: [u8; BUF],
}

// Manual impl: the transport itself is not `Debug`, only its error type.
impl<T: BrokerTransport, const BUF: usize> core::fmt::Debug for BrokerSession<T, BUF> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("BrokerSession")
            .field("connected", &self.connected)
            .field("subscribed_topics", &self.topics.len())
            .field("next_packet_id", &self.next_packet_id)
            .field("last_publish", &self.last_publish)
            .finish_non_exhaustive()
    }
}

impl<T: BrokerTransport, const BUF: usize> BrokerSession<T, BUF> {
    /// Opens the MQTT connection: sends CONNECT and waits for an accepting
    /// CONNACK.
    pub async fn connect(
        transport: T,
        options: &BrokerOptions<'_>,
    ) -> Result<Self, BrokerError<T::Error>> {
        let mut session = Self {
            transport,
            topics: TopicSet::new(),
            last_publish: Instant::now(),
            next_packet_id: 0,
            connected: false,
            rx: [0u8; BUF],
            tx: [0u8; BUF],
        };

        let connect = Connect::new(options.client_id, options.keep_alive, options.clean_session);
        let len = connect.encode(&mut session.tx).map_err(BrokerError::protocol)?;
        session.transport.send(&session.tx[..len]).await?;

        let n = session.transport.recv(&mut session.rx).await?;
        match decode_inbound(&session.rx[..n]).map_err(BrokerError::protocol)? {
            Some(Inbound::ConnAck(ack)) if ack.reason_code == 0 => {
                log::info!("broker accepted connection as '{}'", options.client_id);
                session.connected = true;
                Ok(session)
            }
            Some(Inbound::ConnAck(ack)) => Err(BrokerError::ConnectionRefused(ack.reason_code)),
            _ => Err(BrokerError::Protocol(ProtocolError::InvalidResponse)),
        }
    }

    /// Subscribes to a control topic and waits for the matching SUBACK.
    pub async fn subscribe(&mut self, topic: &str) -> Result<(), BrokerError<T::Error>> {
        self.ensure_connected()?;

        self.next_packet_id = self.next_packet_id.wrapping_add(1).max(1);
        let packet_id = self.next_packet_id;

        let len = Subscribe::new(packet_id, topic)
            .encode(&mut self.tx)
            .map_err(BrokerError::protocol)?;
        if let Err(e) = self.transport.send(&self.tx[..len]).await {
            self.connected = false;
            return Err(e);
        }

        // Publishes cannot arrive before the first subscription completes,
        // so the next packet must be our SUBACK.
        let n = match self.transport.recv(&mut self.rx).await {
            Ok(n) => n,
            Err(e) => {
                self.connected = false;
                return Err(e);
            }
        };
        let inbound = match decode_inbound(&self.rx[..n]) {
            Ok(inbound) => inbound,
            Err(e) => {
                self.connected = false;
                return Err(BrokerError::Protocol(e));
            }
        };
        match inbound {
            Some(Inbound::SubAck(ack)) if ack.packet_id == packet_id && ack.granted() => {
                self.topics.add(topic);
                log::info!("subscribed to '{topic}'");
                Ok(())
            }
            _ => {
                self.connected = false;
                Err(BrokerError::Protocol(ProtocolError::InvalidResponse))
            }
        }
    }

    /// Publishes a QoS 0 message. Fire-and-forget: no acknowledgment, no
    /// queuing. If the link is down this fails fatally per the session
    /// policy.
    pub async fn publish(&mut self, topic: &str, payload: &[u8]) -> Result<(), BrokerError<T::Error>> {
        self.ensure_connected()?;

        let len = Publish::new(topic, payload)
            .encode(&mut self.tx)
            .map_err(BrokerError::protocol)?;
        if let Err(e) = self.transport.send(&self.tx[..len]).await {
            self.connected = false;
            return Err(e);
        }

        self.last_publish = Instant::now();
        Ok(())
    }

    /// Polls for one pending inbound message without blocking beyond the
    /// transport's read window.
    ///
    /// Returns `Ok(None)` when nothing is pending (read timeout) or when the
    /// packet was housekeeping (PINGRESP). Everything else that is not a
    /// PUBLISH invalidates the session.
    pub async fn check_msg(&mut self) -> Result<Option<InboundMessage>, BrokerError<T::Error>> {
        self.ensure_connected()?;

        let n = match self.transport.recv(&mut self.rx).await {
            Ok(n) => n,
            Err(BrokerError::Timeout) => return Ok(None),
            Err(e) => {
                self.connected = false;
                return Err(e);
            }
        };

        match decode_inbound(&self.rx[..n]) {
            Ok(Some(Inbound::Publish(publish))) => {
                let Ok(topic) = String::try_from(publish.topic) else {
                    log::warn!("dropping inbound message: topic too long");
                    return Ok(None);
                };
                let Ok(payload) = Vec::from_slice(publish.payload) else {
                    log::warn!("dropping inbound message: payload too large");
                    return Ok(None);
                };
                Ok(Some(InboundMessage { topic, payload }))
            }
            Ok(Some(Inbound::PingResp)) | Ok(None) => Ok(None),
            Ok(Some(_)) => {
                self.connected = false;
                Err(BrokerError::Protocol(ProtocolError::InvalidResponse))
            }
            Err(e) => {
                self.connected = false;
                Err(BrokerError::Protocol(e))
            }
        }
    }

    /// Sends a PINGREQ. The broker's PINGRESP is consumed by a later
    /// [`BrokerSession::check_msg`] as housekeeping.
    ///
    /// The stock 7200 s keep-alive outlasts the 15 s publish cadence by a
    /// wide margin, so the telemetry loop never needs this; it exists for
    /// deployments that stretch the poll interval.
    pub async fn ping(&mut self) -> Result<(), BrokerError<T::Error>> {
        self.ensure_connected()?;

        let len = PingReq.encode(&mut self.tx).map_err(BrokerError::protocol)?;
        if let Err(e) = self.transport.send(&self.tx[..len]).await {
            self.connected = false;
            return Err(e);
        }
        Ok(())
    }

    /// Sends DISCONNECT and retires the session. Best-effort: the session is
    /// marked dead even if the packet never makes it out.
    pub async fn disconnect(&mut self) -> Result<(), BrokerError<T::Error>> {
        self.ensure_connected()?;
        self.connected = false;

        let len = Disconnect.encode(&mut self.tx).map_err(BrokerError::protocol)?;
        self.transport.send(&self.tx[..len]).await
    }

    /// Topics this session is subscribed to.
    pub fn topics(&self) -> &TopicSet<4> {
        &self.topics
    }

    /// Instant of the most recent successful publish.
    pub fn last_publish_time(&self) -> Instant {
        self.last_publish
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    #[cfg(test)]
    pub(crate) fn transport(&self) -> &T {
        &self.transport
    }

    fn ensure_connected(&self) -> Result<(), BrokerError<T::Error>> {
        if self.connected {
            Ok(())
        } else {
            Err(BrokerError::NotConnected)
        }
    }
}
