//! Small helpers: content hashing and wall-clock timestamps.

use std::time::{SystemTime, UNIX_EPOCH};
use std::{fs, io, path};

/// BLAKE3 hash of a byte buffer, hex-encoded.
pub fn hash_bytes(buf: &[u8]) -> String {
	hex::encode(blake3::hash(buf).as_bytes())
}

/// BLAKE3 hash of a file's contents, hex-encoded.
pub fn hash_file(path: &path::Path) -> io::Result<String> {
	let mut file = fs::File::open(path)?;
	let mut hasher = blake3::Hasher::new();
	io::copy(&mut file, &mut hasher)?;
	Ok(hex::encode(hasher.finalize().as_bytes()))
}

/// Current wall-clock time in whole seconds since the epoch.
pub fn now_secs() -> u64 {
	match SystemTime::now().duration_since(UNIX_EPOCH) {
		Ok(d) => d.as_secs(),
		Err(_) => 0,
	}
}

/// Remove a synchronized path, treating "already gone" as success.
pub fn remove_path(path: &path::Path, is_dir: bool) -> io::Result<()> {
	let result = if is_dir { fs::remove_dir_all(path) } else { fs::remove_file(path) };
	match result {
		Ok(()) => Ok(()),
		Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
		Err(e) => Err(e),
	}
}

/// Modification time of a metadata record in whole seconds since the epoch.
pub fn mtime_secs(meta: &fs::Metadata) -> u64 {
	meta.modified()
		.ok()
		.and_then(|t| t.duration_since(UNIX_EPOCH).ok())
		.map(|d| d.as_secs())
		.unwrap_or(0)
}


// vim: ts=4
