//! Persistent state, backed by a redb database
//!
//! Three tables mirror the record model: the append-only change log
//! ("entries"), the client registry ("clients" plus a counter table), and
//! the per-client watermarks ("last_sync"). Records are stored as
//! JSON5-serialized bytes. redb serializes write transactions, which gives
//! the atomic check-then-insert that identity allocation depends on.
//!
//! The store is the sole writer of record state. The reconciliation engine
//! only reads entries and watermarks and commits watermark updates after a
//! transfer is acknowledged.

use redb::{ReadableDatabase, ReadableTable, TableDefinition};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use uuid::Uuid;

use crate::error::StoreError;
use crate::reconcile::in_scope;
use crate::types::{FileEntry, FileState, SyncMark};

/// Append-only change log.
/// Key: log id (monotonic). Value: serialized FileState.
const ENTRIES_TABLE: TableDefinition<u64, &[u8]> = TableDefinition::new("entries");

/// Registered client identities on the server.
/// Key: client uuid. Value: numeric client id.
const CLIENTS_TABLE: TableDefinition<&str, u64> = TableDefinition::new("clients");

/// Per-client watermarks.
/// Key: (client id, file uuid). Value: serialized SyncMark.
const MARKS_TABLE: TableDefinition<(u64, &str), &[u8]> = TableDefinition::new("last_sync");

/// Numeric id allocation counters.
const COUNTERS_TABLE: TableDefinition<&str, u64> = TableDefinition::new("counters");

/// Node-local keys: the client's own server-issued identity.
const NODE_TABLE: TableDefinition<&str, &str> = TableDefinition::new("node");

/// The client id a client node records the server under in its own
/// watermark table.
pub const SERVER_CID: u64 = 1;

fn decode_state(bytes: &[u8]) -> Result<FileState, StoreError> {
	let text = std::str::from_utf8(bytes)
		.map_err(|e| StoreError::Corrupted { message: e.to_string() })?;
	Ok(json5::from_str(text)?)
}

fn decode_mark(bytes: &[u8]) -> Result<SyncMark, StoreError> {
	let text = std::str::from_utf8(bytes)
		.map_err(|e| StoreError::Corrupted { message: e.to_string() })?;
	Ok(json5::from_str(text)?)
}

/// Handle on the state database. One per process; clone-free, share behind
/// an `Arc`.
pub struct Store {
	db: redb::Database,
}

impl Store {
	/// Open or create the state database and make sure all tables exist.
	pub fn open(path: &Path) -> Result<Self, StoreError> {
		if let Some(parent) = path.parent() {
			if !parent.as_os_str().is_empty() {
				fs::create_dir_all(parent)?;
			}
		}
		let db = redb::Database::create(path)?;
		{
			let txn = db.begin_write()?;
			let _ = txn.open_table(ENTRIES_TABLE)?;
			let _ = txn.open_table(CLIENTS_TABLE)?;
			let _ = txn.open_table(MARKS_TABLE)?;
			let _ = txn.open_table(COUNTERS_TABLE)?;
			let _ = txn.open_table(NODE_TABLE)?;
			txn.commit()?;
		}
		Ok(Store { db })
	}

	//////////////////
	// Change log   //
	//////////////////

	/// Append one observed state to the log and return its id.
	pub fn append_entry(&self, state: &FileState) -> Result<u64, StoreError> {
		let txn = self.db.begin_write()?;
		let id;
		{
			let mut table = txn.open_table(ENTRIES_TABLE)?;
			id = match table.last()? {
				Some((key, _)) => key.value() + 1,
				None => 1,
			};
			let bytes = json5::to_string(state)?.into_bytes();
			table.insert(id, bytes.as_slice())?;
		}
		txn.commit()?;
		Ok(id)
	}

	/// All log rows in id order.
	pub fn entries(&self) -> Result<Vec<FileEntry>, StoreError> {
		let txn = self.db.begin_read()?;
		let table = txn.open_table(ENTRIES_TABLE)?;
		let mut entries = Vec::new();
		for row in table.iter()? {
			let (key, value) = row?;
			entries.push(FileEntry { id: key.value(), state: decode_state(value.value())? });
		}
		Ok(entries)
	}

	/// Latest state per file uuid, restricted to the given scopes.
	///
	/// Later log rows win: iteration runs in ascending id order and each
	/// row overwrites its predecessor for the same uuid.
	pub fn latest_entries(
		&self,
		scopes: &[String],
	) -> Result<BTreeMap<String, FileEntry>, StoreError> {
		let mut latest = BTreeMap::new();
		for entry in self.entries()? {
			if in_scope(&entry.state.path, scopes) {
				latest.insert(entry.state.uuid.clone(), entry);
			}
		}
		Ok(latest)
	}

	/// Latest log row for one file uuid.
	pub fn latest_entry(&self, uuid: &str) -> Result<Option<FileEntry>, StoreError> {
		let mut found = None;
		for entry in self.entries()? {
			if entry.state.uuid == uuid {
				found = Some(entry);
			}
		}
		Ok(found)
	}

	/////////////////////
	// Client registry //
	/////////////////////

	/// Point lookup: is this uuid a registered client?
	pub fn client_exists(&self, uuid: &str) -> Result<bool, StoreError> {
		Ok(self.client_id(uuid)?.is_some())
	}

	/// Numeric id of a registered client.
	pub fn client_id(&self, uuid: &str) -> Result<Option<u64>, StoreError> {
		let txn = self.db.begin_read()?;
		let table = txn.open_table(CLIENTS_TABLE)?;
		Ok(table.get(uuid)?.map(|guard| guard.value()))
	}

	/// Allocate a fresh client identity.
	///
	/// The collision check and the insert run inside one write
	/// transaction, so two racing registrations can never share a uuid;
	/// correctness rests on this check-then-insert unit, not on generator
	/// quality. A colliding candidate aborts the transaction and retries.
	pub fn allocate_client(&self) -> Result<String, StoreError> {
		loop {
			let candidate = Uuid::new_v4().to_string();
			let txn = self.db.begin_write()?;
			let mut inserted = false;
			{
				let mut clients = txn.open_table(CLIENTS_TABLE)?;
				if clients.get(candidate.as_str())?.is_none() {
					let mut counters = txn.open_table(COUNTERS_TABLE)?;
					let next = counters.get("client")?.map(|guard| guard.value()).unwrap_or(1);
					counters.insert("client", next + 1)?;
					clients.insert(candidate.as_str(), next)?;
					inserted = true;
				}
			}
			if inserted {
				txn.commit()?;
				return Ok(candidate);
			}
			txn.abort()?;
		}
	}

	/// The client node's own server-issued identity, if any.
	pub fn own_uuid(&self) -> Result<Option<String>, StoreError> {
		let txn = self.db.begin_read()?;
		let table = txn.open_table(NODE_TABLE)?;
		Ok(table.get("self")?.map(|guard| guard.value().to_string()))
	}

	/// Persist the client node's own identity.
	pub fn set_own_uuid(&self, uuid: &str) -> Result<(), StoreError> {
		let txn = self.db.begin_write()?;
		{
			let mut table = txn.open_table(NODE_TABLE)?;
			table.insert("self", uuid)?;
		}
		txn.commit()?;
		Ok(())
	}

	////////////////
	// Watermarks //
	////////////////

	/// All watermarks recorded for one client, keyed by file uuid.
	pub fn marks_for(&self, cid: u64) -> Result<BTreeMap<String, SyncMark>, StoreError> {
		let txn = self.db.begin_read()?;
		let table = txn.open_table(MARKS_TABLE)?;
		let mut marks = BTreeMap::new();
		for row in table.range((cid, "")..)? {
			let (key, value) = row?;
			let (row_cid, uuid) = key.value();
			if row_cid != cid {
				break;
			}
			marks.insert(uuid.to_string(), decode_mark(value.value())?);
		}
		Ok(marks)
	}

	/// Watermark for one (file, client) pair.
	pub fn mark(&self, cid: u64, uuid: &str) -> Result<Option<SyncMark>, StoreError> {
		let txn = self.db.begin_read()?;
		let table = txn.open_table(MARKS_TABLE)?;
		match table.get((cid, uuid))? {
			Some(guard) => Ok(Some(decode_mark(guard.value())?)),
			None => Ok(None),
		}
	}

	/// Record `entry` as the confirmed state of its file for `cid`.
	///
	/// Called only after the corresponding transfer was acknowledged; an
	/// unacknowledged transfer leaves the old watermark in place and the
	/// file counts as not-synced on restart.
	pub fn commit_mark(&self, cid: u64, entry: &FileEntry) -> Result<(), StoreError> {
		let mark = SyncMark { fid: entry.id, state: entry.state.clone() };
		let bytes = json5::to_string(&mark)?.into_bytes();
		let txn = self.db.begin_write()?;
		{
			let mut table = txn.open_table(MARKS_TABLE)?;
			table.insert((cid, entry.state.uuid.as_str()), bytes.as_slice())?;
		}
		txn.commit()?;
		Ok(())
	}
}


// vim: ts=4
