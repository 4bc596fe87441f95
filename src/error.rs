//! Error types for HubSync operations

use std::error::Error;
use std::fmt;
use std::io;

/// Main error type for sync operations
#[derive(Debug)]
pub enum SyncError {
	/// Protocol error (nested)
	Protocol(ProtocolError),

	/// Store error (nested)
	Store(StoreError),

	/// Scanner error (nested)
	Scan(ScanError),

	/// Invalid configuration
	Config { message: String },

	/// I/O error
	Io(io::Error),
}

impl fmt::Display for SyncError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			SyncError::Protocol(e) => write!(f, "Protocol error: {}", e),
			SyncError::Store(e) => write!(f, "Store error: {}", e),
			SyncError::Scan(e) => write!(f, "Scan error: {}", e),
			SyncError::Config { message } => write!(f, "Invalid configuration: {}", message),
			SyncError::Io(e) => write!(f, "I/O error: {}", e),
		}
	}
}

impl Error for SyncError {}

impl From<ProtocolError> for SyncError {
	fn from(e: ProtocolError) -> Self {
		SyncError::Protocol(e)
	}
}

impl From<StoreError> for SyncError {
	fn from(e: StoreError) -> Self {
		SyncError::Store(e)
	}
}

impl From<ScanError> for SyncError {
	fn from(e: ScanError) -> Self {
		SyncError::Scan(e)
	}
}

impl From<io::Error> for SyncError {
	fn from(e: io::Error) -> Self {
		SyncError::Io(e)
	}
}

/// Wire protocol and transport errors
///
/// Every variant is fatal to the session it occurs on; reconnection is the
/// caller's responsibility.
#[derive(Debug)]
pub enum ProtocolError {
	/// Packet framing fault (short or oversized packet)
	InvalidPacket { count: usize },

	/// Unknown packet type byte
	InvalidType { tag: u8 },

	/// Decoded type is not legal in the current connection state
	UnexpectedType { tag: u8 },

	/// Packet body failed to parse
	BodyFormat { message: String },

	/// File transfer stream violated the chunk contract
	Transfer { message: String },

	/// Received content does not match the announced hash
	HashMismatch { expected: String, actual: String },

	/// Authentication rejected
	AuthFailed { message: String },

	/// Idle window exceeded between two operations
	Timeout,

	/// Peer closed the connection
	Disconnected,

	/// I/O error on the transport
	Io(io::Error),
}

impl fmt::Display for ProtocolError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			ProtocolError::InvalidPacket { count } => {
				write!(f, "invalid packet length: {}", count)
			}
			ProtocolError::InvalidType { tag } => write!(f, "invalid packet type: {}", tag),
			ProtocolError::UnexpectedType { tag } => {
				write!(f, "unexpected packet type: {}", tag)
			}
			ProtocolError::BodyFormat { message } => {
				write!(f, "malformed packet body: {}", message)
			}
			ProtocolError::Transfer { message } => write!(f, "transfer fault: {}", message),
			ProtocolError::HashMismatch { expected, actual } => {
				write!(f, "hash mismatch: expected {}, got {}", expected, actual)
			}
			ProtocolError::AuthFailed { message } => write!(f, "auth failed: {}", message),
			ProtocolError::Timeout => write!(f, "idle timeout exceeded"),
			ProtocolError::Disconnected => write!(f, "connection closed by peer"),
			ProtocolError::Io(e) => write!(f, "I/O error: {}", e),
		}
	}
}

impl Error for ProtocolError {}

impl From<io::Error> for ProtocolError {
	fn from(e: io::Error) -> Self {
		if e.kind() == io::ErrorKind::UnexpectedEof {
			ProtocolError::Disconnected
		} else {
			ProtocolError::Io(e)
		}
	}
}

impl From<serde_json::Error> for ProtocolError {
	fn from(e: serde_json::Error) -> Self {
		ProtocolError::BodyFormat { message: e.to_string() }
	}
}

impl From<base64::DecodeError> for ProtocolError {
	fn from(e: base64::DecodeError) -> Self {
		ProtocolError::Transfer { message: format!("invalid chunk encoding: {}", e) }
	}
}

/// Persistence errors
#[derive(Debug)]
pub enum StoreError {
	/// Underlying database failure
	Backend { source: Box<dyn Error + Send + Sync> },

	/// A stored record failed to deserialize
	Corrupted { message: String },

	/// I/O error (store file creation)
	Io(io::Error),
}

impl fmt::Display for StoreError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			StoreError::Backend { source } => write!(f, "database failure: {}", source),
			StoreError::Corrupted { message } => write!(f, "store corrupted: {}", message),
			StoreError::Io(e) => write!(f, "I/O error: {}", e),
		}
	}
}

impl Error for StoreError {}

impl From<io::Error> for StoreError {
	fn from(e: io::Error) -> Self {
		StoreError::Io(e)
	}
}

impl From<redb::DatabaseError> for StoreError {
	fn from(e: redb::DatabaseError) -> Self {
		StoreError::Backend { source: Box::new(e) }
	}
}

impl From<redb::TransactionError> for StoreError {
	fn from(e: redb::TransactionError) -> Self {
		StoreError::Backend { source: Box::new(e) }
	}
}

impl From<redb::TableError> for StoreError {
	fn from(e: redb::TableError) -> Self {
		StoreError::Backend { source: Box::new(e) }
	}
}

impl From<redb::StorageError> for StoreError {
	fn from(e: redb::StorageError) -> Self {
		StoreError::Backend { source: Box::new(e) }
	}
}

impl From<redb::CommitError> for StoreError {
	fn from(e: redb::CommitError) -> Self {
		StoreError::Backend { source: Box::new(e) }
	}
}

impl From<json5::Error> for StoreError {
	fn from(e: json5::Error) -> Self {
		StoreError::Corrupted { message: e.to_string() }
	}
}

/// Directory scanner errors
#[derive(Debug)]
pub enum ScanError {
	/// Failed to walk or read a path
	Walk { path: String, source: io::Error },

	/// Invalid exclude pattern
	Pattern { message: String },

	/// Store error while appending observed changes
	Store(StoreError),
}

impl fmt::Display for ScanError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			ScanError::Walk { path, source } => write!(f, "cannot scan {}: {}", path, source),
			ScanError::Pattern { message } => write!(f, "invalid exclude pattern: {}", message),
			ScanError::Store(e) => write!(f, "store error: {}", e),
		}
	}
}

impl Error for ScanError {}

impl From<StoreError> for ScanError {
	fn from(e: StoreError) -> Self {
		ScanError::Store(e)
	}
}

// vim: ts=4
