//! Idle-timeout-bounded connection transport
//!
//! Wraps a TCP stream so that every individual read and write runs under a
//! fresh deadline. A continuously active connection never expires; a single
//! gap longer than the idle window tears the session down.

use std::io;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;

use crate::error::ProtocolError;

/// TCP stream with a per-operation idle deadline.
pub struct IdleStream {
	stream: TcpStream,
	idle: Duration,
	peer: SocketAddr,
}

impl IdleStream {
	/// Wrap an accepted socket.
	pub fn new(stream: TcpStream, idle: Duration) -> Result<Self, ProtocolError> {
		let peer = stream.peer_addr().map_err(ProtocolError::Io)?;
		Ok(IdleStream { stream, idle, peer })
	}

	/// Connect to a server and wrap the resulting socket.
	pub async fn connect(addr: &str, idle: Duration) -> Result<Self, ProtocolError> {
		let stream = TcpStream::connect(addr).await.map_err(ProtocolError::Io)?;
		IdleStream::new(stream, idle)
	}

	/// Remote peer address, used to tag per-connection log lines.
	pub fn peer(&self) -> SocketAddr {
		self.peer
	}

	/// Read exactly `buf.len()` bytes. The deadline is reset to
	/// now + idle window before the operation starts.
	pub async fn read_exact(&mut self, buf: &mut [u8]) -> Result<(), ProtocolError> {
		match timeout(self.idle, self.stream.read_exact(buf)).await {
			Ok(Ok(_)) => Ok(()),
			Ok(Err(e)) if e.kind() == io::ErrorKind::UnexpectedEof => {
				Err(ProtocolError::Disconnected)
			}
			Ok(Err(e)) => Err(ProtocolError::Io(e)),
			Err(_) => Err(ProtocolError::Timeout),
		}
	}

	/// Write the whole buffer under a fresh deadline.
	pub async fn write_all(&mut self, buf: &[u8]) -> Result<(), ProtocolError> {
		match timeout(self.idle, self.stream.write_all(buf)).await {
			Ok(Ok(())) => Ok(()),
			Ok(Err(e)) => Err(ProtocolError::Io(e)),
			Err(_) => Err(ProtocolError::Timeout),
		}
	}
}

impl std::fmt::Debug for IdleStream {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("IdleStream").field("peer", &self.peer).field("idle", &self.idle).finish()
	}
}

// vim: ts=4
