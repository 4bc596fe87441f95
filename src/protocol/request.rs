//! Request model: one variant per packet type
//!
//! The sum type carries each packet's decoded body; bodies are JSON with
//! short field tags, chunk payloads travel base64-encoded inside the File
//! body. Encoding and the header/body send order live here so every caller
//! frames packets the same way.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::{Deserialize, Serialize};

use super::packet::{Header, PacketType};
use crate::connection::IdleStream;
use crate::error::ProtocolError;
use crate::types::FileState;

/// Authentication request body
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthBody {
	/// The client's server-issued identity, empty on first contact
	#[serde(rename = "cid")]
	pub client_uuid: String,

	/// Shared secret
	#[serde(rename = "tok")]
	pub token: String,
}

/// Authentication reply body
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplyBody {
	#[serde(rename = "ok")]
	pub success: bool,

	/// The (possibly freshly allocated) client identity
	#[serde(rename = "cid")]
	pub client_uuid: String,

	#[serde(rename = "msg")]
	pub message: String,
}

/// Sync exchange opener: the client's directory scopes and its latest
/// observed state per file within them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncBody {
	#[serde(rename = "dirs")]
	pub scopes: Vec<String>,

	#[serde(rename = "man")]
	pub manifest: Vec<FileState>,
}

/// What the receiver of a Meta packet is asked to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MetaAction {
	/// File content follows in File chunks, write it
	Store,
	/// Stream the named file back in File chunks
	Fetch,
	/// Delete the named path
	Remove,
	/// Exchange complete
	Done,
}

/// One reconciliation action plus the file state it concerns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetaBody {
	#[serde(rename = "act")]
	pub action: MetaAction,

	/// Absent only for `Done`
	#[serde(rename = "ent", default, skip_serializing_if = "Option::is_none")]
	pub entry: Option<FileState>,
}

/// One file content chunk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileBody {
	/// File identity the chunk belongs to
	#[serde(rename = "uid")]
	pub uuid: String,

	/// Byte offset of this chunk inside the file
	#[serde(rename = "off")]
	pub offset: u64,

	/// Final, empty chunk closing the stream
	#[serde(rename = "eof")]
	pub eof: bool,

	/// Chunk payload, base64
	#[serde(rename = "dat")]
	pub data: String,
}

impl FileBody {
	pub fn new(uuid: &str, offset: u64, eof: bool, chunk: &[u8]) -> Self {
		FileBody { uuid: uuid.to_string(), offset, eof, data: BASE64.encode(chunk) }
	}

	/// Decode the chunk payload.
	pub fn payload(&self) -> Result<Vec<u8>, ProtocolError> {
		Ok(BASE64.decode(&self.data)?)
	}
}

/// One decoded wire request.
#[derive(Debug, Clone, PartialEq)]
pub enum Request {
	Ack,
	Auth(AuthBody),
	Reply(ReplyBody),
	Ping,
	Pong,
	File(FileBody),
	Sync(SyncBody),
	Meta(MetaBody),
	Bye,
}

impl Request {
	/// Wire type tag for this variant.
	pub fn packet_type(&self) -> PacketType {
		match self {
			Request::Ack => PacketType::Ack,
			Request::Auth(_) => PacketType::Auth,
			Request::Reply(_) => PacketType::Reply,
			Request::Ping => PacketType::Ping,
			Request::Pong => PacketType::Pong,
			Request::File(_) => PacketType::File,
			Request::Sync(_) => PacketType::Sync,
			Request::Meta(_) => PacketType::Meta,
			Request::Bye => PacketType::Bye,
		}
	}

	/// Serialize the body. Ack/Ping/Pong/Bye are bodyless.
	pub fn encode_body(&self) -> Result<Vec<u8>, ProtocolError> {
		let body = match self {
			Request::Ack | Request::Ping | Request::Pong | Request::Bye => Vec::new(),
			Request::Auth(body) => serde_json::to_vec(body)?,
			Request::Reply(body) => serde_json::to_vec(body)?,
			Request::File(body) => serde_json::to_vec(body)?,
			Request::Sync(body) => serde_json::to_vec(body)?,
			Request::Meta(body) => serde_json::to_vec(body)?,
		};
		Ok(body)
	}

	/// Rebuild a request from a packet type and the body bytes read for it.
	pub fn decode(packet_type: PacketType, body: &[u8]) -> Result<Self, ProtocolError> {
		match packet_type {
			PacketType::Ack => Ok(Request::Ack),
			PacketType::Auth => Ok(Request::Auth(serde_json::from_slice(body)?)),
			PacketType::Reply => Ok(Request::Reply(serde_json::from_slice(body)?)),
			PacketType::Ping => Ok(Request::Ping),
			PacketType::Pong => Ok(Request::Pong),
			PacketType::File => Ok(Request::File(serde_json::from_slice(body)?)),
			PacketType::Sync => Ok(Request::Sync(serde_json::from_slice(body)?)),
			PacketType::Meta => Ok(Request::Meta(serde_json::from_slice(body)?)),
			PacketType::Bye => Ok(Request::Bye),
		}
	}

	/// Send header then body as one logical unit. The length field always
	/// equals the exact serialized body size.
	pub async fn send(&self, conn: &mut IdleStream) -> Result<(), ProtocolError> {
		let body = self.encode_body()?;
		let header = Header::new(self.packet_type(), body.len() as u64);
		conn.write_all(&header.encode()).await?;
		if !body.is_empty() {
			conn.write_all(&body).await?;
		}
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn roundtrip(request: Request) -> Request {
		let body = request.encode_body().unwrap();
		Request::decode(request.packet_type(), &body).unwrap()
	}

	#[test]
	fn test_bodyless_roundtrip() {
		for request in [Request::Ack, Request::Ping, Request::Pong, Request::Bye] {
			assert_eq!(request.encode_body().unwrap().len(), 0);
			assert_eq!(roundtrip(request.clone()), request);
		}
	}

	#[test]
	fn test_auth_roundtrip() {
		let request = Request::Auth(AuthBody {
			client_uuid: "3e6b0d9e-7f3e-4a4e-9b34-94c02f0e7a11".to_string(),
			token: "secret".to_string(),
		});
		assert_eq!(roundtrip(request.clone()), request);
	}

	#[test]
	fn test_reply_roundtrip() {
		let request = Request::Reply(ReplyBody {
			success: false,
			client_uuid: String::new(),
			message: "invalid token".to_string(),
		});
		assert_eq!(roundtrip(request.clone()), request);
	}

	#[test]
	fn test_file_chunk_payload() {
		let data = [0u8, 1, 2, 255, 254, 253];
		let body = FileBody::new("u1", 42, false, &data);
		let request = roundtrip(Request::File(body));
		match request {
			Request::File(body) => {
				assert_eq!(body.offset, 42);
				assert!(!body.eof);
				assert_eq!(body.payload().unwrap(), data);
			}
			other => panic!("unexpected variant: {:?}", other),
		}
	}

	#[test]
	fn test_meta_done_has_no_entry() {
		let body = Request::Meta(MetaBody { action: MetaAction::Done, entry: None })
			.encode_body()
			.unwrap();
		let request = Request::decode(PacketType::Meta, &body).unwrap();
		assert_eq!(request, Request::Meta(MetaBody { action: MetaAction::Done, entry: None }));
	}

	#[test]
	fn test_garbage_body_rejected() {
		assert!(Request::decode(PacketType::Auth, b"not json").is_err());
	}
}

// vim: ts=4
