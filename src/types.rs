//! Core data types shared by the protocol, store and reconciliation layers.

use serde::{Deserialize, Serialize};

/// Observed state of one file system object.
///
/// One of these is appended to the change log for every observed change;
/// a deletion is a new state with `deleted` set, never a removed row.
/// `uuid` identifies the file itself and stays stable across renames.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileState {
	/// Path relative to the sync root, '/'-separated
	#[serde(rename = "pth")]
	pub path: String,

	/// BLAKE3 content hash (hex), empty for directories
	#[serde(rename = "hsh")]
	pub hash: String,

	/// Modification time, seconds since the epoch
	#[serde(rename = "ts")]
	pub timestamp: u64,

	/// Content size in bytes, 0 for directories
	#[serde(rename = "sz")]
	pub size: u64,

	#[serde(rename = "dir")]
	pub is_dir: bool,

	/// Tombstone marker
	#[serde(rename = "del")]
	pub deleted: bool,

	/// Stable file identity
	#[serde(rename = "uid")]
	pub uuid: String,
}

impl FileState {
	/// Whether two states describe the same synchronized content.
	///
	/// Directories carry no content, so only their existence and identity
	/// count; comparing directory mtimes would churn a row every time a
	/// child changes.
	pub fn same_content(&self, other: &FileState) -> bool {
		if self.path != other.path
			|| self.is_dir != other.is_dir
			|| self.deleted != other.deleted
		{
			return false;
		}
		self.is_dir
			|| (self.hash == other.hash
				&& self.size == other.size
				&& self.timestamp == other.timestamp)
	}
}

/// One row of the append-only change log: a state plus its log id.
///
/// Ids are allocated monotonically; the row with the highest id per uuid is
/// the current authoritative state of that file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
	pub id: u64,
	pub state: FileState,
}

/// Watermark: the last mutually-confirmed state of one file for one client.
///
/// Created on the first completed transfer, replaced on each later one,
/// never removed. A synchronized deletion is a watermark whose state is a
/// tombstone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncMark {
	/// Log id of the confirmed entry
	#[serde(rename = "fid")]
	pub fid: u64,

	#[serde(rename = "st")]
	pub state: FileState,
}

// vim: ts=4
