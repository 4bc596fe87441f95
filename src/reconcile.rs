//! Reconciliation engine
//!
//! Pure delta computation between the authoritative change log and one
//! client's watermarks, plus the merge rule deciding whether a
//! client-reported state supersedes the authoritative one. Both are
//! deterministic: the same inputs always produce the same output, and
//! applying a delta then recomputing it yields an empty delta.

use std::collections::BTreeMap;

use crate::types::{FileEntry, FileState, SyncMark};

/// What a delta step asks the peer to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeltaKind {
	/// File unknown to the peer
	Create,
	/// File known but stale on the peer
	Update,
	/// Tombstone not yet reflected on the peer
	Remove,
}

/// One step of a computed delta.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeltaItem {
	pub kind: DeltaKind,
	pub entry: FileEntry,
}

/// Whether `path` falls under one of the directory scopes. An empty scope
/// list, or the scope ".", covers the whole tree.
pub fn in_scope(path: &str, scopes: &[String]) -> bool {
	if scopes.is_empty() {
		return true;
	}
	scopes.iter().any(|scope| {
		let scope = scope.trim_end_matches('/');
		scope.is_empty()
			|| scope == "."
			|| path == scope
			|| (path.len() > scope.len()
				&& path.starts_with(scope)
				&& path.as_bytes()[scope.len()] == b'/')
	})
}

/// Compute the ordered delta converging a client's watermarks toward the
/// latest authoritative states.
///
/// `latest` is the fold of the change log (highest id per uuid wins);
/// `marks` is that client's watermark snapshot. Steps come out in
/// ascending entry-id order, so a replay of the same inputs is
/// byte-identical.
pub fn compute_delta(
	latest: &BTreeMap<String, FileEntry>,
	marks: &BTreeMap<String, SyncMark>,
) -> Vec<DeltaItem> {
	let mut delta = Vec::new();
	for (uuid, entry) in latest {
		let mark = marks.get(uuid);
		if entry.state.deleted {
			// a missing watermark row also counts as "not yet reflected":
			// the peer may hold the file from an interrupted exchange
			match mark {
				Some(mark) if mark.state.deleted => {}
				_ => delta.push(DeltaItem { kind: DeltaKind::Remove, entry: entry.clone() }),
			}
		} else {
			match mark {
				None => delta.push(DeltaItem { kind: DeltaKind::Create, entry: entry.clone() }),
				// reappearance after a synchronized delete: the peer has
				// nothing on disk, so this is a create
				Some(mark) if mark.state.deleted => {
					delta.push(DeltaItem { kind: DeltaKind::Create, entry: entry.clone() })
				}
				Some(mark) if !mark.state.same_content(&entry.state) => {
					delta.push(DeltaItem { kind: DeltaKind::Update, entry: entry.clone() })
				}
				Some(_) => {}
			}
		}
	}
	delta.sort_by_key(|item| item.entry.id);
	delta
}

/// Merge verdict for one client-reported state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
	/// The authoritative log already wins; the delta will push it back.
	KeepServer,
	/// The client's state supersedes the log and must be appended.
	TakeClient,
}

/// Decide whether a client-reported state supersedes the authoritative one.
///
/// The watermark tells which sides moved. One-sided change is taken as-is;
/// a change on both sides resolves by latest timestamp, and an exact
/// timestamp tie keeps the row already in the log (the one with the
/// ascending entry id), so every replay converges to the same winner.
pub fn merge_decision(
	server: Option<&FileEntry>,
	mark: Option<&SyncMark>,
	client: &FileState,
) -> MergeOutcome {
	let server = match server {
		// a tombstone for a file the log never saw carries no information
		None if client.deleted => return MergeOutcome::KeepServer,
		None => return MergeOutcome::TakeClient,
		Some(server) => server,
	};
	if server.state.same_content(client) {
		return MergeOutcome::KeepServer;
	}
	let server_changed = match mark {
		Some(mark) => !mark.state.same_content(&server.state),
		None => true,
	};
	let client_changed = match mark {
		Some(mark) => !mark.state.same_content(client),
		None => true,
	};
	if !client_changed {
		return MergeOutcome::KeepServer;
	}
	if !server_changed {
		return MergeOutcome::TakeClient;
	}
	if client.timestamp > server.state.timestamp {
		MergeOutcome::TakeClient
	} else {
		MergeOutcome::KeepServer
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn state(path: &str, hash: &str, ts: u64, uuid: &str) -> FileState {
		FileState {
			path: path.to_string(),
			hash: hash.to_string(),
			timestamp: ts,
			size: 1,
			is_dir: false,
			deleted: false,
			uuid: uuid.to_string(),
		}
	}

	fn entry(id: u64, state: FileState) -> FileEntry {
		FileEntry { id, state }
	}

	fn tombstone(path: &str, ts: u64, uuid: &str) -> FileState {
		FileState { deleted: true, ..state(path, "", ts, uuid) }
	}

	fn latest(entries: &[FileEntry]) -> BTreeMap<String, FileEntry> {
		let mut map = BTreeMap::new();
		for e in entries {
			map.insert(e.state.uuid.clone(), e.clone());
		}
		map
	}

	fn marks(list: &[(u64, FileState)]) -> BTreeMap<String, SyncMark> {
		let mut map = BTreeMap::new();
		for (fid, st) in list {
			map.insert(st.uuid.clone(), SyncMark { fid: *fid, state: st.clone() });
		}
		map
	}

	#[test]
	fn test_update_and_delete() {
		// log: "a" changed to h1, "b" tombstoned; the client only ever
		// confirmed "a" at h0
		let log = latest(&[
			entry(1, state("a", "h1", 1, "u-a")),
			entry(2, tombstone("b", 1, "u-b")),
		]);
		let snapshot = marks(&[(0, state("a", "h0", 0, "u-a"))]);

		let delta = compute_delta(&log, &snapshot);
		assert_eq!(delta.len(), 2);
		assert_eq!(delta[0].kind, DeltaKind::Update);
		assert_eq!(delta[0].entry.state.uuid, "u-a");
		assert_eq!(delta[0].entry.state.hash, "h1");
		assert_eq!(delta[1].kind, DeltaKind::Remove);
		assert_eq!(delta[1].entry.state.uuid, "u-b");
	}

	#[test]
	fn test_unknown_file_is_created() {
		let log = latest(&[entry(3, state("new", "h9", 5, "u-n"))]);
		let delta = compute_delta(&log, &BTreeMap::new());
		assert_eq!(delta.len(), 1);
		assert_eq!(delta[0].kind, DeltaKind::Create);
	}

	#[test]
	fn test_converged_log_yields_empty_delta() {
		let confirmed = state("a", "h1", 4, "u-a");
		let log = latest(&[entry(9, confirmed.clone())]);
		let snapshot = marks(&[(9, confirmed)]);
		assert!(compute_delta(&log, &snapshot).is_empty());
	}

	#[test]
	fn test_delta_is_deterministic_and_ordered() {
		let log = latest(&[
			entry(5, state("z", "h5", 1, "u-z")),
			entry(2, state("m", "h2", 1, "u-m")),
			entry(8, tombstone("q", 2, "u-q")),
		]);
		let first = compute_delta(&log, &BTreeMap::new());
		let second = compute_delta(&log, &BTreeMap::new());
		assert_eq!(first, second);
		let ids: Vec<u64> = first.iter().map(|item| item.entry.id).collect();
		assert_eq!(ids, vec![2, 5, 8]);
	}

	#[test]
	fn test_apply_then_recompute_is_empty() {
		let log = latest(&[
			entry(1, state("a", "h1", 1, "u-a")),
			entry(2, tombstone("b", 1, "u-b")),
		]);
		let mut snapshot = marks(&[(0, state("a", "h0", 0, "u-a"))]);
		for item in compute_delta(&log, &snapshot) {
			snapshot.insert(
				item.entry.state.uuid.clone(),
				SyncMark { fid: item.entry.id, state: item.entry.state.clone() },
			);
		}
		assert!(compute_delta(&log, &snapshot).is_empty());
	}

	#[test]
	fn test_synchronized_tombstone_stays_quiet() {
		let gone = tombstone("b", 3, "u-b");
		let log = latest(&[entry(4, gone.clone())]);
		let snapshot = marks(&[(4, gone)]);
		assert!(compute_delta(&log, &snapshot).is_empty());
	}

	#[test]
	fn test_reappearance_after_delete_is_create() {
		let log = latest(&[entry(6, state("b", "h6", 9, "u-b"))]);
		let snapshot = marks(&[(4, tombstone("b", 3, "u-b"))]);
		let delta = compute_delta(&log, &snapshot);
		assert_eq!(delta.len(), 1);
		assert_eq!(delta[0].kind, DeltaKind::Create);
	}

	#[test]
	fn test_directories_sync_on_existence_not_mtime() {
		let dir_then = FileState { is_dir: true, ..state("d", "", 1, "u-d") };
		let dir_now = FileState { is_dir: true, ..state("d", "", 7, "u-d") };
		let log = latest(&[entry(3, dir_now)]);
		let snapshot = marks(&[(3, dir_then)]);
		// same directory, only the observed mtime moved
		assert!(compute_delta(&log, &snapshot).is_empty());
	}

	#[test]
	fn test_merge_new_file_from_client() {
		let incoming = state("n", "h1", 4, "u-n");
		assert_eq!(merge_decision(None, None, &incoming), MergeOutcome::TakeClient);
	}

	#[test]
	fn test_merge_tombstone_for_unknown_file_is_noop() {
		let incoming = tombstone("n", 4, "u-n");
		assert_eq!(merge_decision(None, None, &incoming), MergeOutcome::KeepServer);
	}

	#[test]
	fn test_merge_one_sided_change() {
		let confirmed = state("a", "h0", 1, "u-a");
		let server = entry(5, confirmed.clone());
		let snapshot = SyncMark { fid: 5, state: confirmed.clone() };

		// only the client moved
		let client = state("a", "h1", 2, "u-a");
		assert_eq!(
			merge_decision(Some(&server), Some(&snapshot), &client),
			MergeOutcome::TakeClient
		);

		// only the server moved; the client still reports the watermark
		let server_moved = entry(6, state("a", "h2", 3, "u-a"));
		assert_eq!(
			merge_decision(Some(&server_moved), Some(&snapshot), &confirmed),
			MergeOutcome::KeepServer
		);
	}

	#[test]
	fn test_merge_conflict_resolves_by_latest_timestamp() {
		let confirmed = state("a", "h0", 1, "u-a");
		let snapshot = SyncMark { fid: 5, state: confirmed };
		let server = entry(6, state("a", "h-server", 10, "u-a"));

		let older = state("a", "h-client", 9, "u-a");
		assert_eq!(
			merge_decision(Some(&server), Some(&snapshot), &older),
			MergeOutcome::KeepServer
		);

		let newer = state("a", "h-client", 11, "u-a");
		assert_eq!(
			merge_decision(Some(&server), Some(&snapshot), &newer),
			MergeOutcome::TakeClient
		);
	}

	#[test]
	fn test_merge_conflict_tie_keeps_the_logged_row() {
		let snapshot = SyncMark { fid: 5, state: state("a", "h0", 1, "u-a") };
		let server = entry(6, state("a", "h-server", 10, "u-a"));
		let tied = state("a", "h-client", 10, "u-a");
		assert_eq!(
			merge_decision(Some(&server), Some(&snapshot), &tied),
			MergeOutcome::KeepServer
		);
	}

	#[test]
	fn test_in_scope() {
		let scopes = vec!["docs".to_string(), "src/net".to_string()];
		assert!(in_scope("docs/a.txt", &scopes));
		assert!(in_scope("docs", &scopes));
		assert!(in_scope("src/net/tcp.rs", &scopes));
		assert!(!in_scope("src/nets/tcp.rs", &scopes));
		assert!(!in_scope("srcx", &scopes));
		assert!(in_scope("anything", &[]));
		assert!(in_scope("anything", &[".".to_string()]));
	}
}

// vim: ts=4
