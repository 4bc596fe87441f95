//! Client role: authentication handshake, keepalive and the sync exchange
//!
//! A session connects, authenticates (registering itself on first contact),
//! then runs reconciliation exchanges. The client answers the server's Meta
//! actions one at a time and acknowledges each completed step; its own
//! change log and server watermark move together with those acks.

use std::time::Duration;
use tokio::fs;

use crate::config::Config;
use crate::connection::IdleStream;
use crate::error::{ProtocolError, SyncError};
use crate::logging::*;
use crate::protocol::{
	expect_ack, wait, AuthBody, MetaAction, PacketType, Request, SyncBody,
};
use crate::scan::Scanner;
use crate::store::{Store, SERVER_CID};
use crate::transfer;
use crate::types::{FileEntry, FileState};
use crate::util;

/// One-shot session: authenticate, run a single sync exchange, say Bye.
pub async fn run(config: &Config, store: &Store) -> Result<(), SyncError> {
	let mut conn = IdleStream::connect(&config.addr(), config.idle_timeout()).await?;
	authenticate(&mut conn, config, store).await?;
	sync_once(&mut conn, config, store).await?;
	Request::Bye.send(&mut conn).await?;
	Ok(())
}

/// Long-running session: resync every scan interval and ping in between,
/// so a healthy connection never runs into the idle window.
pub async fn watch(config: &Config, store: &Store) -> Result<(), SyncError> {
	let mut conn = IdleStream::connect(&config.addr(), config.idle_timeout()).await?;
	authenticate(&mut conn, config, store).await?;
	loop {
		sync_once(&mut conn, config, store).await?;
		let mut waited = 0u64;
		while waited < config.scan_interval_secs {
			let step = config.ping_interval_secs.min(config.scan_interval_secs - waited);
			tokio::time::sleep(Duration::from_secs(step)).await;
			Request::Ping.send(&mut conn).await?;
			wait(&mut conn, &[PacketType::Pong]).await?;
			waited += step;
		}
	}
}

/// Send Auth and handle the Reply: success persists the (possibly freshly
/// issued) identity, failure is terminal and never auto-retried.
async fn authenticate(
	conn: &mut IdleStream,
	config: &Config,
	store: &Store,
) -> Result<(), SyncError> {
	let own = store.own_uuid()?.unwrap_or_default();
	Request::Auth(AuthBody { client_uuid: own, token: config.token.clone() })
		.send(conn)
		.await?;
	let reply = match wait(conn, &[PacketType::Reply]).await? {
		Request::Reply(reply) => reply,
		other => {
			return Err(ProtocolError::UnexpectedType { tag: other.packet_type().tag() }.into())
		}
	};
	if !reply.success {
		return Err(ProtocolError::AuthFailed { message: reply.message }.into());
	}
	store.set_own_uuid(&reply.client_uuid)?;
	info!("authenticated as {}", reply.client_uuid);
	Ok(())
}

/// Scan, send the manifest, then serve the server's Meta actions until
/// Done.
async fn sync_once(conn: &mut IdleStream, config: &Config, store: &Store) -> Result<(), SyncError> {
	Scanner::new(&config.root, &config.exclude)?.scan(store, &config.directories)?;
	let manifest: Vec<FileState> = store
		.latest_entries(&config.directories)?
		.into_iter()
		.map(|(_, entry)| entry.state)
		.collect();
	info!("starting sync ({} known file(s))", manifest.len());
	Request::Sync(SyncBody { scopes: config.directories.clone(), manifest })
		.send(conn)
		.await?;

	loop {
		let meta = match wait(conn, &[PacketType::Meta]).await? {
			Request::Meta(meta) => meta,
			other => {
				return Err(
					ProtocolError::UnexpectedType { tag: other.packet_type().tag() }.into()
				)
			}
		};
		match meta.action {
			MetaAction::Done => {
				Request::Ack.send(conn).await?;
				info!("sync complete");
				return Ok(());
			}
			MetaAction::Store => {
				apply_store(conn, config, store, required(meta.entry)?).await?;
			}
			MetaAction::Fetch => {
				serve_fetch(conn, config, store, required(meta.entry)?).await?;
			}
			MetaAction::Remove => {
				apply_remove(conn, config, store, required(meta.entry)?).await?;
			}
		}
	}
}

fn required(entry: Option<FileState>) -> Result<FileState, SyncError> {
	entry.ok_or_else(|| {
		SyncError::from(ProtocolError::BodyFormat {
			message: "meta action without a file state".to_string(),
		})
	})
}

/// Store action: write the incoming state locally, acknowledge, and move
/// the log and watermark together with the ack.
async fn apply_store(
	conn: &mut IdleStream,
	config: &Config,
	store: &Store,
	state: FileState,
) -> Result<(), SyncError> {
	retire_path_owner(store, &state)?;
	// a renamed file leaves its previous location
	if let Some(prev) = store.latest_entry(&state.uuid)? {
		if !prev.state.deleted && prev.state.path != state.path {
			if let Err(e) = util::remove_path(&config.root.join(&prev.state.path), prev.state.is_dir)
			{
				warn!("cannot remove {}: {}", prev.state.path, e);
			}
		}
	}
	if state.is_dir {
		fs::create_dir_all(config.root.join(&state.path)).await.map_err(SyncError::Io)?;
	} else {
		transfer::recv_file(conn, &config.root, &state).await?;
	}
	Request::Ack.send(conn).await?;
	let entry = record_applied(store, state)?;
	store.commit_mark(SERVER_CID, &entry)?;
	Ok(())
}

/// Fetch action: the server wants this node's copy of the file. The state
/// may carry a redirected identity when the server already knew the path,
/// so the local log is reconciled the same way a store is.
async fn serve_fetch(
	conn: &mut IdleStream,
	config: &Config,
	store: &Store,
	state: FileState,
) -> Result<(), SyncError> {
	transfer::send_file(conn, &config.root, &state, config.buffer_size).await?;
	expect_ack(conn).await?;
	retire_path_owner(store, &state)?;
	let entry = record_applied(store, state)?;
	store.commit_mark(SERVER_CID, &entry)?;
	Ok(())
}

/// Remove action: drop the local path while it still belongs to the named
/// identity, acknowledge either way.
async fn apply_remove(
	conn: &mut IdleStream,
	config: &Config,
	store: &Store,
	state: FileState,
) -> Result<(), SyncError> {
	let path_taken = store.latest_entries(&[])?.values().any(|e| {
		e.state.uuid != state.uuid && !e.state.deleted && e.state.path == state.path
	});
	if !path_taken {
		if let Err(e) = util::remove_path(&config.root.join(&state.path), state.is_dir) {
			warn!("cannot remove {}: {}", state.path, e);
		}
	}
	Request::Ack.send(conn).await?;
	let entry = record_applied(store, state)?;
	store.commit_mark(SERVER_CID, &entry)?;
	Ok(())
}

/// A path belongs to one live identity; applying a state retires any other
/// local identity still holding it (log rows only, the disk write follows).
fn retire_path_owner(store: &Store, incoming: &FileState) -> Result<(), SyncError> {
	for (_, entry) in store.latest_entries(&[])? {
		if entry.state.uuid != incoming.uuid
			&& !entry.state.deleted
			&& entry.state.path == incoming.path
		{
			let tomb =
				FileState { deleted: true, timestamp: incoming.timestamp, ..entry.state };
			store.append_entry(&tomb)?;
		}
	}
	Ok(())
}

/// Record an applied state in the local log, reusing the head row when it
/// already matches. Applying an identical state twice is a no-op.
fn record_applied(store: &Store, state: FileState) -> Result<FileEntry, SyncError> {
	if let Some(head) = store.latest_entry(&state.uuid)? {
		if head.state == state {
			return Ok(head);
		}
	}
	let id = store.append_entry(&state)?;
	Ok(FileEntry { id, state })
}

// vim: ts=4
