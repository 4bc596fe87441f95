//! Directory scanner
//!
//! Walks the sync root, compares what it finds against the latest logged
//! states and appends one change-log row per observed difference: a new
//! path, changed content, a rename, or a disappearance (tombstone).
//! Unchanged files produce no rows, and an unchanged file is recognized by
//! size + mtime without rehashing.

use globset::{Glob, GlobSet, GlobSetBuilder};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::error::ScanError;
use crate::logging::*;
use crate::reconcile::in_scope;
use crate::store::Store;
use crate::transfer::TMP_SUFFIX;
use crate::types::{FileEntry, FileState};
use crate::util;

#[derive(Debug, Clone, Copy)]
struct Observed {
	is_dir: bool,
	size: u64,
	mtime: u64,
}

/// Walks one sync root with a set of exclude patterns.
pub struct Scanner {
	root: PathBuf,
	exclude: GlobSet,
}

impl Scanner {
	pub fn new(root: &Path, patterns: &[String]) -> Result<Self, ScanError> {
		let mut builder = GlobSetBuilder::new();
		for pattern in patterns {
			builder.add(
				Glob::new(pattern).map_err(|e| ScanError::Pattern { message: e.to_string() })?,
			);
		}
		// internal artifacts never enter the log
		let tmp_glob = format!("**/*{}", TMP_SUFFIX);
		for pattern in [tmp_glob.as_str(), ".hubsync", ".hubsync/**"] {
			builder.add(
				Glob::new(pattern).map_err(|e| ScanError::Pattern { message: e.to_string() })?,
			);
		}
		let exclude =
			builder.build().map_err(|e| ScanError::Pattern { message: e.to_string() })?;
		Ok(Scanner { root: root.to_path_buf(), exclude })
	}

	/// Scan the given scopes and append one row per observed change.
	/// Returns the appended rows.
	pub fn scan(&self, store: &Store, scopes: &[String]) -> Result<Vec<FileEntry>, ScanError> {
		let mut observed = BTreeMap::new();
		self.walk(&self.root, &mut observed)?;
		observed.retain(|path, _| in_scope(path, scopes));

		let prev = store.latest_entries(scopes)?;
		// live states by path, newest log row wins
		let mut prev_by_path: BTreeMap<&str, &FileEntry> = BTreeMap::new();
		for entry in prev.values() {
			if entry.state.deleted {
				continue;
			}
			match prev_by_path.get(entry.state.path.as_str()) {
				Some(existing) if existing.id > entry.id => {}
				_ => {
					prev_by_path.insert(entry.state.path.as_str(), entry);
				}
			}
		}

		let mut appended = Vec::new();
		// (path, observation, hash) of paths the log does not know yet
		let mut fresh: Vec<(String, Observed, String)> = Vec::new();

		for (path, obs) in &observed {
			match prev_by_path.get(path.as_str()) {
				Some(entry) if entry.state.is_dir == obs.is_dir => {
					if obs.is_dir {
						continue; // directory existence is already logged
					}
					if obs.size == entry.state.size && obs.mtime == entry.state.timestamp {
						continue; // unchanged, skip hashing
					}
					let hash = self.hash(path)?;
					appended.push(self.append(
						store,
						FileState {
							path: path.clone(),
							hash,
							timestamp: obs.mtime,
							size: obs.size,
							is_dir: false,
							deleted: false,
							uuid: entry.state.uuid.clone(),
						},
					)?);
				}
				Some(entry) => {
					// file/directory flip: the old identity dies, a fresh
					// one takes the path
					appended.push(self.append(
						store,
						FileState {
							deleted: true,
							timestamp: util::now_secs(),
							..entry.state.clone()
						},
					)?);
					let hash = if obs.is_dir { String::new() } else { self.hash(path)? };
					fresh.push((path.clone(), *obs, hash));
				}
				None => {
					let hash = if obs.is_dir { String::new() } else { self.hash(path)? };
					fresh.push((path.clone(), *obs, hash));
				}
			}
		}

		// live rows whose path no longer exists
		let mut vanished: Vec<&FileEntry> = Vec::new();
		for (path, entry) in &prev_by_path {
			if !observed.contains_key(*path) {
				vanished.push(*entry);
			}
		}

		// a new file carrying the exact content of a vanished one is a
		// rename and keeps its identity
		for (path, obs, hash) in fresh {
			let reused = if obs.is_dir {
				None
			} else {
				vanished
					.iter()
					.position(|entry| {
						!entry.state.is_dir
							&& entry.state.hash == hash
							&& entry.state.size == obs.size
					})
					.map(|pos| vanished.remove(pos).state.uuid.clone())
			};
			let uuid = reused.unwrap_or_else(|| Uuid::new_v4().to_string());
			appended.push(self.append(
				store,
				FileState {
					path,
					hash,
					timestamp: obs.mtime,
					size: if obs.is_dir { 0 } else { obs.size },
					is_dir: obs.is_dir,
					deleted: false,
					uuid,
				},
			)?);
		}

		// everything still vanished is a deletion
		for entry in vanished {
			appended.push(self.append(
				store,
				FileState { deleted: true, timestamp: util::now_secs(), ..entry.state.clone() },
			)?);
		}

		if !appended.is_empty() {
			debug!("scan recorded {} change(s) under {}", appended.len(), self.root.display());
		}
		Ok(appended)
	}

	fn walk(&self, dir: &Path, out: &mut BTreeMap<String, Observed>) -> Result<(), ScanError> {
		let entries = fs::read_dir(dir)
			.map_err(|e| ScanError::Walk { path: dir.display().to_string(), source: e })?;
		for entry in entries {
			let entry = entry
				.map_err(|e| ScanError::Walk { path: dir.display().to_string(), source: e })?;
			let path = entry.path();
			let rel = match self.rel(&path) {
				Some(rel) => rel,
				None => continue,
			};
			if self.exclude.is_match(&rel) {
				continue;
			}
			let meta = match fs::symlink_metadata(&path) {
				Ok(meta) => meta,
				Err(e) => {
					warn!("cannot stat {}: {}", path.display(), e);
					continue;
				}
			};
			if meta.is_dir() {
				out.insert(
					rel,
					Observed { is_dir: true, size: 0, mtime: util::mtime_secs(&meta) },
				);
				self.walk(&path, out)?;
			} else if meta.is_file() {
				out.insert(
					rel,
					Observed { is_dir: false, size: meta.len(), mtime: util::mtime_secs(&meta) },
				);
			}
			// symlinks and special files are not synchronized
		}
		Ok(())
	}

	fn rel(&self, path: &Path) -> Option<String> {
		let rel = path.strip_prefix(&self.root).ok()?;
		let rel = rel.to_string_lossy().replace('\\', "/");
		if rel.is_empty() {
			None
		} else {
			Some(rel)
		}
	}

	fn hash(&self, rel: &str) -> Result<String, ScanError> {
		let full = self.root.join(rel);
		util::hash_file(&full)
			.map_err(|e| ScanError::Walk { path: full.display().to_string(), source: e })
	}

	fn append(&self, store: &Store, state: FileState) -> Result<FileEntry, ScanError> {
		let id = store.append_entry(&state)?;
		Ok(FileEntry { id, state })
	}
}


// vim: ts=4
