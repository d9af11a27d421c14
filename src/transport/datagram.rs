//! Connectionless transport: one UDP socket, one datagram per message.

use super::{TransportError, is_soft_send_error};
use crate::constants::RECEIVE_BUFFER_LEN;
use std::net::{IpAddr, SocketAddr};
use tokio::net::UdpSocket;
use tokio::sync::watch;

/// UDP side-channel endpoint.
///
/// The socket is bound once to an ephemeral port and shared by the receive
/// loop and all senders; tokio's `UdpSocket` supports both through `&self`.
#[derive(Debug)]
pub struct DatagramTransport {
    socket: UdpSocket,
    port: u16,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
}

impl DatagramTransport {
    pub(crate) async fn bind(address: IpAddr) -> Result<Self, TransportError> {
        let socket = UdpSocket::bind((address, 0)).await?;
        let port = socket.local_addr()?.port();
        tracing::debug!("bound datagram lock channel on port {port}");
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        Ok(Self {
            socket,
            port,
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
        match self.socket.send_to(payload, peer).await {
            Ok(_) => Ok(true),
            Err(err) if is_soft_send_error(&err) => {
                tracing::debug!("skipping unusable address {peer}: {err}");
                Ok(false)
            }
            Err(err) => Err(err.into()),
        }
    }

    pub(crate) async fn receive_one(&self) -> Result<(Vec<u8>, SocketAddr), TransportError> {
        // A fresh receiver plus borrow_and_update closes the race between
        // checking the flag and parking in recv_from: a stop() in between
        // still resolves the changed() branch.
        let mut shutdown = self.shutdown_rx.clone();
        if *shutdown.borrow_and_update() {
            return Err(TransportError::Stopped);
        }
        let mut buffer = [0u8; RECEIVE_BUFFER_LEN];
        tokio::select! {
            _ = shutdown.changed() => Err(TransportError::Stopped),
            received = self.socket.recv_from(&mut buffer) => match received {
                Ok((len, source)) => Ok((buffer[..len].to_vec(), source)),
                Err(_) if *self.shutdown_rx.borrow() => Err(TransportError::Stopped),
                Err(err) => Err(err.into()),
            }
        }
    }

    pub(crate) fn stop(&self) {
        if !self.shutdown_tx.send_replace(true) {
            tracing::debug!("stopped datagram lock channel on port {}", self.port);
        }
    }
}
