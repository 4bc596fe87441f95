//! Packet routing and expectation filtering
//!
//! `route_conn` reads exactly one packet off the connection; `wait` layers
//! the caller's allowed-type set on top. Legal-sequence enforcement lives at
//! the call site, not inside the codec.

use super::packet::{Header, PacketType, HEADER_LEN};
use super::request::Request;
use crate::connection::IdleStream;
use crate::error::ProtocolError;

/// Upper bound on accepted body sizes. The header field is a u64, but no
/// legal body comes close; anything above this is a framing fault rather
/// than an allocation request.
pub const MAX_BODY_LEN: u64 = 64 * 1024 * 1024;

/// Read one full packet: exactly 9 header bytes, then exactly the announced
/// number of body bytes, then decode the matching variant.
pub async fn route_conn(conn: &mut IdleStream) -> Result<Request, ProtocolError> {
	let mut head = [0u8; HEADER_LEN];
	conn.read_exact(&mut head).await?;
	let header = Header::decode(&head)?;
	if header.length > MAX_BODY_LEN {
		return Err(ProtocolError::InvalidPacket { count: header.length as usize });
	}
	let mut body = vec![0u8; header.length as usize];
	if !body.is_empty() {
		conn.read_exact(&mut body).await?;
	}
	Request::decode(header.packet_type, &body)
}

/// Wait for one of the expected packet types; any other decoded type is a
/// fatal protocol violation.
pub async fn wait(
	conn: &mut IdleStream,
	expected: &[PacketType],
) -> Result<Request, ProtocolError> {
	let request = route_conn(conn).await?;
	if !expected.contains(&request.packet_type()) {
		return Err(ProtocolError::UnexpectedType { tag: request.packet_type().tag() });
	}
	Ok(request)
}

/// Wait for the acknowledgement closing a transfer step.
pub async fn expect_ack(conn: &mut IdleStream) -> Result<(), ProtocolError> {
	wait(conn, &[PacketType::Ack]).await?;
	Ok(())
}

// vim: ts=4
