//! # Broker Transport Abstraction
//!
//! The session talks to the broker through [`BrokerTransport`], which
//! abstracts the underlying byte stream so the MQTT logic stays network-stack
//! agnostic and the tests can script exchanges in memory.
//!
//! The read path carries a timeout: the station's main loop polls for
//! inbound commands every iteration, so `recv` must come back quickly when
//! the broker has nothing pending. [`TcpTransport`] races the socket read
//! against a timer for this.

use embassy_net::tcp::{Error as TcpError, TcpSocket};
use embassy_time::{Duration, Timer};
use embedded_io_async::Write;

use crate::error::{BrokerError, ProtocolError};

/// A transport for MQTT packets.
#[allow(async_fn_in_trait)]
pub trait BrokerTransport {
    /// The raw error type of the underlying stream.
    type Error: core::fmt::Debug;

    /// Sends a buffer of data over the transport.
    async fn send(&mut self, buf: &[u8]) -> Result<(), BrokerError<Self::Error>>;

    /// Receives data from the transport into a buffer.
    ///
    /// Returns the number of bytes read, `BrokerError::Timeout` when nothing
    /// arrived within the transport's read window, and
    /// `ProtocolError::ConnectionClosed` when the peer hung up.
    async fn recv(&mut self, buf: &mut [u8]) -> Result<usize, BrokerError<Self::Error>>;
}

/// TCP transport over `embassy-net`.
pub struct TcpTransport<'a> {
    socket: TcpSocket<'a>,
    read_timeout: Duration,
}

impl<'a> TcpTransport<'a> {
    /// Creates a new `TcpTransport` with the given socket and read timeout.
    ///
    /// Keep the timeout short (tens of milliseconds): it bounds how long the
    /// command poll blocks the main loop when the broker is idle.
    pub fn new(socket: TcpSocket<'a>, read_timeout: Duration) -> Self {
        Self {
            socket,
            read_timeout,
        }
    }

    async fn read_with_timeout(
        &mut self,
        buf: &mut [u8],
    ) -> Result<usize, BrokerError<TcpError>> {
        let read_fut = self.socket.read(buf);
        let timer = Timer::after(self.read_timeout);

        match futures::future::select(core::pin::pin!(read_fut), core::pin::pin!(timer)).await {
            futures::future::Either::Left((Ok(0), _)) => {
                // The peer closing the connection surfaces as a zero read.
                Err(BrokerError::Protocol(ProtocolError::ConnectionClosed))
            }
            futures::future::Either::Left((Ok(n), _)) => Ok(n),
            futures::future::Either::Left((Err(e), _)) => Err(BrokerError::Transport(e)),
            futures::future::Either::Right(((), _)) => Err(BrokerError::Timeout),
        }
    }
}

impl BrokerTransport for TcpTransport<'_> {
    type Error = TcpError;

    async fn send(&mut self, buf: &[u8]) -> Result<(), BrokerError<TcpError>> {
        self.socket
            .write_all(buf)
            .await
            .map_err(BrokerError::Transport)?;

        // Flush so small control packets are not left sitting in the stack.
        self.socket.flush().await.map_err(BrokerError::Transport)
    }

    async fn recv(&mut self, buf: &mut [u8]) -> Result<usize, BrokerError<TcpError>> {
        self.read_with_timeout(buf).await
    }
}
