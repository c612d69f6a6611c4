//! A single lazily-opened connection to one node.

use crate::error::{CacheError, CacheResult};
use crate::node::NodeAddress;
use crate::protocol::{Command, MemcacheCodec, ProtocolError, Response};
use futures::{SinkExt, StreamExt};
use std::io;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_util::codec::Framed;
use tracing::debug;

/// One TCP connection to a node, opened on first use and reopened after any
/// failure.
///
/// Requests on a connection are strictly sequential (`&mut self`). A request
/// that fails or times out closes the socket: a half-read reply can never be
/// mistaken for the answer to the next request.
#[derive(Debug)]
pub struct NodeConnection {
    address: NodeAddress,
    name: String,
    connect_timeout: Duration,
    framed: Option<Framed<TcpStream, MemcacheCodec>>,
    /// Set while a request is outstanding; still set if the caller was
    /// cancelled mid-request
    in_flight: bool,
}

impl NodeConnection {
    pub fn new(address: NodeAddress, connect_timeout: Duration) -> Self {
        let name = address.name();
        Self {
            address,
            name,
            connect_timeout,
            framed: None,
            in_flight: false,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.framed.is_some()
    }

    /// Whether the connection may go back to the pool
    pub fn is_reusable(&self) -> bool {
        !self.in_flight
    }

    /// Move the live socket into a new handle, leaving this one disconnected
    pub(crate) fn detach(&mut self) -> NodeConnection {
        NodeConnection {
            address: self.address.clone(),
            name: self.name.clone(),
            connect_timeout: self.connect_timeout,
            framed: self.framed.take(),
            in_flight: std::mem::take(&mut self.in_flight),
        }
    }

    /// Drop the socket; the next request reconnects
    pub fn close(&mut self) {
        if self.framed.take().is_some() {
            debug!(node = %self.name, "Connection closed");
        }
        self.in_flight = false;
    }

    /// Send one command and read its reply within `timeout`.
    ///
    /// Network errors, malformed replies and timeouts all close the connection
    /// and surface as [`CacheError::NodeUnavailable`].
    pub async fn request(&mut self, command: Command, timeout: Duration) -> CacheResult<Response> {
        let operation = command.name();
        self.in_flight = true;

        match tokio::time::timeout(timeout, self.exchange(command)).await {
            Ok(Ok(response)) => {
                self.in_flight = false;
                Ok(response)
            }
            Ok(Err(error)) => {
                self.close();
                Err(CacheError::node_unavailable(
                    &self.name,
                    format!("{operation} failed: {error}"),
                ))
            }
            Err(_) => {
                self.close();
                Err(CacheError::node_unavailable(
                    &self.name,
                    format!("{operation} timed out after {}ms", timeout.as_millis()),
                ))
            }
        }
    }

    async fn exchange(&mut self, command: Command) -> Result<Response, ProtocolError> {
        if self.framed.is_none() {
            self.framed = Some(self.connect().await?);
        }
        let Some(framed) = self.framed.as_mut() else {
            return Err(ProtocolError::Closed);
        };

        framed.send(command).await?;
        match framed.next().await {
            Some(result) => result,
            None => Err(ProtocolError::Closed),
        }
    }

    async fn connect(&self) -> Result<Framed<TcpStream, MemcacheCodec>, ProtocolError> {
        let target = (self.address.host.as_str(), self.address.port);
        let stream = tokio::time::timeout(self.connect_timeout, TcpStream::connect(target))
            .await
            .map_err(|_| {
                io::Error::new(
                    io::ErrorKind::TimedOut,
                    format!("connect timed out after {}ms", self.connect_timeout.as_millis()),
                )
            })??;
        stream.set_nodelay(true)?;

        debug!(node = %self.name, "Connection established");
        Ok(Framed::new(stream, MemcacheCodec::default()))
    }
}
