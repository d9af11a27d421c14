//! Connection-oriented transport: one short-lived TCP connection per message.
//!
//! Contention is rare, so the listener keeps an accept backlog of 1 and
//! handles inbound messages one at a time (accept, read to EOF, close). A
//! requester whose connect is refused while the owner is mid-accept simply
//! retries through its rate-limited ping loop. Outbound sends treat a refused
//! or timed-out connect as "peer process gone" and skip rather than fail.

use super::{TransportError, is_soft_send_error};
use crate::constants::RECEIVE_BUFFER_LEN;
use std::io;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpSocket, TcpStream};
use tokio::sync::watch;
use tokio::time::timeout;

/// TCP side-channel endpoint.
#[derive(Debug)]
pub struct StreamTransport {
    listener: TcpListener,
    port: u16,
    connect_timeout: Duration,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
}

impl StreamTransport {
    pub(crate) async fn bind(
        address: IpAddr,
        connect_timeout: Duration,
    ) -> Result<Self, TransportError> {
        let socket = match address {
            IpAddr::V4(_) => TcpSocket::new_v4()?,
            IpAddr::V6(_) => TcpSocket::new_v6()?,
        };
        socket.bind(SocketAddr::new(address, 0))?;
        // One pending inbound connection is enough; see module docs.
        let listener = socket.listen(1)?;
        let port = listener.local_addr()?.port();
        tracing::debug!("bound stream lock channel on port {port}");
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        Ok(Self {
            listener,
            port,
            connect_timeout,
            shutdown_tx,
            shutdown_rx,
        })
    }

    pub(crate) fn port(&self) -> Option<u16> {
        (!*self.shutdown_rx.borrow()).then_some(self.port)
    }

    pub(crate) async fn send(
        &self,
        peer: SocketAddr,
        payload: &[u8],
    ) -> Result<bool, TransportError> {
        if *self.shutdown_rx.borrow() {
            return Err(TransportError::Stopped);
        }
        let mut stream = match timeout(self.connect_timeout, TcpStream::connect(peer)).await {
            Err(_) => {
                tracing::debug!(
                    "peer at {peer} did not accept within {:?}, treating as gone",
                    self.connect_timeout
                );
                return Ok(false);
            }
            Ok(Err(err)) if err.kind() == io::ErrorKind::ConnectionRefused => {
                tracing::debug!("peer at {peer} is not listening: {err}");
                return Ok(false);
            }
            Ok(Err(err)) if is_soft_send_error(&err) => {
                tracing::debug!("skipping unusable address {peer}: {err}");
                return Ok(false);
            }
            Ok(Err(err)) => return Err(err.into()),
            Ok(Ok(stream)) => stream,
        };
        stream.write_all(payload).await?;
        // Half-close so the peer's read-to-EOF completes promptly.
        stream.shutdown().await?;
        Ok(true)
    }

    pub(crate) async fn receive_one(&self) -> Result<(Vec<u8>, SocketAddr), TransportError> {
        let mut shutdown = self.shutdown_rx.clone();
        if *shutdown.borrow_and_update() {
            return Err(TransportError::Stopped);
        }
        tokio::select! {
            _ = shutdown.changed() => Err(TransportError::Stopped),
            received = self.accept_one() => match received {
                Err(_) if *self.shutdown_rx.borrow() => Err(TransportError::Stopped),
                other => other,
            }
        }
    }

    async fn accept_one(&self) -> Result<(Vec<u8>, SocketAddr), TransportError> {
        let (mut stream, source) = self.listener.accept().await?;
        let mut payload = Vec::with_capacity(RECEIVE_BUFFER_LEN);
        stream.read_to_end(&mut payload).await?;
        Ok((payload, source))
    }

    pub(crate) fn stop(&self) {
        if !self.shutdown_tx.send_replace(true) {
            tracing::debug!("stopped stream lock channel on port {}", self.port);
        }
    }
}
