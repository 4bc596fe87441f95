//! Packet types and the fixed wire header

use crate::error::ProtocolError;

/// Length of the packet type tag in the wire header
pub const TYPE_LEN: usize = 1;

/// Length of the body size field in the wire header
pub const SIZE_LEN: usize = 8;

/// Total header length
pub const HEADER_LEN: usize = TYPE_LEN + SIZE_LEN;

/// Wire packet types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PacketType {
	/// Acknowledgement
	Ack = 0,
	/// Authentication request
	Auth = 1,
	/// Authentication reply
	Reply = 2,
	Ping = 3,
	Pong = 4,
	/// File content chunk
	File = 5,
	/// Reconciliation exchange opener
	Sync = 6,
	/// Reconciliation action metadata
	Meta = 7,
	/// Graceful termination
	Bye = 8,
}

impl PacketType {
	/// Decode a wire tag byte.
	pub fn from_tag(tag: u8) -> Result<Self, ProtocolError> {
		match tag {
			0 => Ok(PacketType::Ack),
			1 => Ok(PacketType::Auth),
			2 => Ok(PacketType::Reply),
			3 => Ok(PacketType::Ping),
			4 => Ok(PacketType::Pong),
			5 => Ok(PacketType::File),
			6 => Ok(PacketType::Sync),
			7 => Ok(PacketType::Meta),
			8 => Ok(PacketType::Bye),
			_ => Err(ProtocolError::InvalidType { tag }),
		}
	}

	pub fn tag(self) -> u8 {
		self as u8
	}
}

/// Fixed-size packet header: one type byte followed by the body length as a
/// big-endian u64.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
	pub packet_type: PacketType,
	pub length: u64,
}

impl Header {
	pub fn new(packet_type: PacketType, length: u64) -> Self {
		Header { packet_type, length }
	}

	pub fn encode(&self) -> [u8; HEADER_LEN] {
		let mut buf = [0u8; HEADER_LEN];
		buf[0] = self.packet_type.tag();
		buf[TYPE_LEN..].copy_from_slice(&self.length.to_be_bytes());
		buf
	}

	pub fn decode(buf: &[u8; HEADER_LEN]) -> Result<Self, ProtocolError> {
		let packet_type = PacketType::from_tag(buf[0])?;
		let mut length = [0u8; SIZE_LEN];
		length.copy_from_slice(&buf[TYPE_LEN..]);
		Ok(Header { packet_type, length: u64::from_be_bytes(length) })
	}
}


// vim: ts=4
