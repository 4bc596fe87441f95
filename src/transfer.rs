//! File content streaming
//!
//! Whole files travel as a sequence of File chunks capped at the configured
//! buffer size and closed by an empty eof chunk. The receiver writes into a
//! temp file next to the target, verifies the BLAKE3 hash, renames into
//! place and pins the modification time, so a torn transfer never leaves a
//! half-written file visible and a re-sent identical file lands as a no-op.

use std::path::{Path, PathBuf};
use std::time::{Duration, UNIX_EPOCH};
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use crate::connection::IdleStream;
use crate::error::{ProtocolError, SyncError};
use crate::logging::*;
use crate::protocol::{wait, FileBody, PacketType, Request};
use crate::types::FileState;

/// Suffix of in-flight transfer files; the scanner skips these.
pub const TMP_SUFFIX: &str = ".hubsync-tmp";

/// Stream one file's content to the peer as File chunks.
pub async fn send_file(
	conn: &mut IdleStream,
	root: &Path,
	state: &FileState,
	buffer_size: usize,
) -> Result<(), SyncError> {
	let path = root.join(&state.path);
	let mut file = fs::File::open(&path).await.map_err(SyncError::Io)?;
	let mut buf = vec![0u8; buffer_size];
	let mut offset = 0u64;
	loop {
		let count = file.read(&mut buf).await.map_err(SyncError::Io)?;
		if count == 0 {
			break;
		}
		Request::File(FileBody::new(&state.uuid, offset, false, &buf[..count]))
			.send(conn)
			.await?;
		offset += count as u64;
	}
	Request::File(FileBody::new(&state.uuid, offset, true, &[])).send(conn).await?;
	debug!("sent {} ({} bytes)", state.path, offset);
	Ok(())
}

/// Receive File chunks for `state` until eof, verify the content and move
/// it into place.
pub async fn recv_file(
	conn: &mut IdleStream,
	root: &Path,
	state: &FileState,
) -> Result<(), SyncError> {
	let target = root.join(&state.path);
	if let Some(parent) = target.parent() {
		fs::create_dir_all(parent).await.map_err(SyncError::Io)?;
	}
	let tmp = tmp_path(&target);
	let mut file = fs::File::create(&tmp).await.map_err(SyncError::Io)?;
	let mut hasher = blake3::Hasher::new();
	let mut received = 0u64;
	loop {
		let body = match wait(conn, &[PacketType::File]).await? {
			Request::File(body) => body,
			other => {
				return Err(
					ProtocolError::UnexpectedType { tag: other.packet_type().tag() }.into()
				)
			}
		};
		if body.uuid != state.uuid {
			return Err(ProtocolError::Transfer {
				message: format!("chunk for {} inside transfer of {}", body.uuid, state.uuid),
			}
			.into());
		}
		if body.eof {
			break;
		}
		if body.offset != received {
			return Err(ProtocolError::Transfer {
				message: format!("chunk at offset {}, expected {}", body.offset, received),
			}
			.into());
		}
		let data = body.payload().map_err(SyncError::Protocol)?;
		hasher.update(&data);
		file.write_all(&data).await.map_err(SyncError::Io)?;
		received += data.len() as u64;
	}
	file.flush().await.map_err(SyncError::Io)?;
	drop(file);

	if received != state.size {
		let _ = fs::remove_file(&tmp).await;
		return Err(ProtocolError::Transfer {
			message: format!("received {} bytes, expected {}", received, state.size),
		}
		.into());
	}
	let actual = hex::encode(hasher.finalize().as_bytes());
	if actual != state.hash {
		let _ = fs::remove_file(&tmp).await;
		return Err(
			ProtocolError::HashMismatch { expected: state.hash.clone(), actual }.into()
		);
	}
	set_mtime(&tmp, state.timestamp);
	fs::rename(&tmp, &target).await.map_err(SyncError::Io)?;
	debug!("received {} ({} bytes)", state.path, received);
	Ok(())
}

/// Pin a file's modification time so the next scan sees the synchronized
/// timestamp instead of the local write time.
fn set_mtime(path: &Path, secs: u64) {
	let mtime = UNIX_EPOCH + Duration::from_secs(secs);
	match std::fs::File::options().write(true).open(path) {
		Ok(file) => {
			if let Err(e) = file.set_modified(mtime) {
				warn!("cannot set mtime on {}: {}", path.display(), e);
			}
		}
		Err(e) => warn!("cannot reopen {} for mtime: {}", path.display(), e),
	}
}

fn tmp_path(target: &Path) -> PathBuf {
	let mut name =
		target.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
	name.push_str(TMP_SUFFIX);
	target.with_file_name(name)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_tmp_path_is_a_sibling() {
		let tmp = tmp_path(Path::new("/data/docs/a.txt"));
		assert_eq!(tmp, Path::new("/data/docs/a.txt.hubsync-tmp"));
	}
}

// vim: ts=4
