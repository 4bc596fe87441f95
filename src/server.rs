//! Server role: accept loop and the per-connection protocol state machine
//!
//! Each accepted connection runs in its own task and walks the legal
//! packet sequence AwaitingAuth -> Established -> Closed. Connections
//! share nothing but the store; within one connection all I/O is strictly
//! request/response ordered.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tokio::fs;
use tokio::net::{TcpListener, TcpStream};

use crate::config::Config;
use crate::connection::IdleStream;
use crate::error::{ProtocolError, SyncError};
use crate::logging::*;
use crate::protocol::{
	expect_ack, wait, AuthBody, MetaAction, MetaBody, PacketType, ReplyBody, Request, SyncBody,
};
use crate::reconcile::{compute_delta, in_scope, merge_decision, DeltaKind, MergeOutcome};
use crate::scan::Scanner;
use crate::store::Store;
use crate::transfer;
use crate::types::{FileEntry, FileState};
use crate::util;

/// The authoritative server.
pub struct Server {
	config: Arc<Config>,
	store: Arc<Store>,
}

impl Server {
	pub fn new(config: Config, store: Store) -> Self {
		Server { config: Arc::new(config), store: Arc::new(store) }
	}

	/// Bind the configured address and serve until the process ends.
	pub async fn run(&self) -> Result<(), SyncError> {
		let listener = TcpListener::bind(self.config.addr()).await?;
		self.run_on(listener).await
	}

	/// Accept loop over an already-bound listener, one task per connection.
	pub async fn run_on(&self, listener: TcpListener) -> Result<(), SyncError> {
		info!("listening on {}", listener.local_addr()?);
		loop {
			let (socket, peer) = listener.accept().await?;
			let config = self.config.clone();
			let store = self.store.clone();
			tokio::spawn(async move {
				info!("[{}] connection established", peer);
				match handle_connection(socket, config, store).await {
					Ok(()) => info!("[{}] connection closed", peer),
					Err(e) => warn!("[{}] session ended: {}", peer, e),
				}
			});
		}
	}
}

/// Drive one connection through its legal packet sequences.
async fn handle_connection(
	socket: TcpStream,
	config: Arc<Config>,
	store: Arc<Store>,
) -> Result<(), SyncError> {
	let mut conn = IdleStream::new(socket, config.idle_timeout())?;

	// AwaitingAuth: nothing but Auth is legal
	let body = match wait(&mut conn, &[PacketType::Auth]).await? {
		Request::Auth(body) => body,
		other => {
			return Err(ProtocolError::UnexpectedType { tag: other.packet_type().tag() }.into())
		}
	};
	let cid = handle_auth(&mut conn, &config, &store, body).await?;

	// Established: Ping is answered in place, Sync runs the reconciliation
	// exchange, Bye closes without a response
	loop {
		match wait(&mut conn, &[PacketType::Ping, PacketType::Sync, PacketType::Bye]).await? {
			Request::Ping => Request::Pong.send(&mut conn).await?,
			Request::Sync(body) => serve_sync(&mut conn, &config, &store, cid, body).await?,
			Request::Bye => return Ok(()),
			other => {
				return Err(
					ProtocolError::UnexpectedType { tag: other.packet_type().tag() }.into()
				)
			}
		}
	}
}

/// Handle AUTH: bad token, unknown identity and store failures all answer
/// with exactly one failure Reply before the session dies; an empty uuid
/// means "register me". Returns the numeric client id on success.
async fn handle_auth(
	conn: &mut IdleStream,
	config: &Config,
	store: &Store,
	body: AuthBody,
) -> Result<u64, SyncError> {
	if !token_matches(&body.token, &config.token) {
		refuse(conn, &body.client_uuid, "invalid token").await;
		return Err(ProtocolError::AuthFailed { message: "invalid token".to_string() }.into());
	}
	let uuid = if body.client_uuid.is_empty() {
		match store.allocate_client() {
			Ok(uuid) => uuid,
			Err(e) => {
				refuse(conn, &body.client_uuid, "identity allocation failed").await;
				return Err(e.into());
			}
		}
	} else {
		body.client_uuid.clone()
	};
	match store.client_id(&uuid) {
		Ok(Some(cid)) => {
			Request::Reply(ReplyBody {
				success: true,
				client_uuid: uuid.clone(),
				message: "ok".to_string(),
			})
			.send(conn)
			.await?;
			info!("[{}] authenticated as {}", conn.peer(), uuid);
			Ok(cid)
		}
		Ok(None) => {
			refuse(conn, &body.client_uuid, "unknown client identity").await;
			Err(ProtocolError::AuthFailed { message: "unknown client identity".to_string() }
				.into())
		}
		Err(e) => {
			refuse(conn, &body.client_uuid, "identity lookup failed").await;
			Err(e.into())
		}
	}
}

/// Best-effort failure reply; the connection is closing either way.
async fn refuse(conn: &mut IdleStream, client_uuid: &str, message: &str) {
	let reply = Request::Reply(ReplyBody {
		success: false,
		client_uuid: client_uuid.to_string(),
		message: message.to_string(),
	});
	if let Err(e) = reply.send(conn).await {
		debug!("[{}] could not deliver auth refusal: {}", conn.peer(), e);
	}
}

/// Constant-time shared-secret comparison.
fn token_matches(presented: &str, expected: &str) -> bool {
	let presented = presented.as_bytes();
	let expected = expected.as_bytes();
	if presented.len() != expected.len() {
		return false;
	}
	let mut diff = 0u8;
	for (a, b) in presented.iter().zip(expected) {
		diff |= a ^ b;
	}
	diff == 0
}

/// Run one reconciliation exchange: fold the client's manifest into the
/// log, compute the delta against its watermarks and walk it in order.
/// Each transfer commits its watermark only after the closing Ack.
async fn serve_sync(
	conn: &mut IdleStream,
	config: &Config,
	store: &Store,
	cid: u64,
	body: SyncBody,
) -> Result<(), SyncError> {
	debug!("[{}] sync over {:?}", conn.peer(), body.scopes);
	// pick up server-side changes first so the delta is current
	Scanner::new(&config.root, &config.exclude)?.scan(store, &body.scopes)?;

	let mut latest = store.latest_entries(&body.scopes)?;
	let marks = store.marks_for(cid)?;

	// uuids whose current content lives on the client, not here
	let mut fetch: BTreeSet<String> = BTreeSet::new();
	let mut owners: BTreeMap<String, String> = BTreeMap::new();
	for entry in latest.values() {
		if !entry.state.deleted {
			owners.insert(entry.state.path.clone(), entry.state.uuid.clone());
		}
	}
	for state in &body.manifest {
		if !in_scope(&state.path, &body.scopes) {
			continue;
		}
		let mut state = state.clone();
		// one live identity per path: the logged one owns it
		if !state.deleted {
			if let Some(owner) = owners.get(&state.path) {
				if *owner != state.uuid {
					state.uuid = owner.clone();
				}
			}
		}
		let verdict = merge_decision(latest.get(&state.uuid), marks.get(&state.uuid), &state);
		if verdict == MergeOutcome::TakeClient {
			if !state.deleted {
				owners.insert(state.path.clone(), state.uuid.clone());
			}
			take_client_state(config, store, &mut latest, &mut fetch, state).await?;
		}
	}

	let delta = compute_delta(&latest, &marks);
	if delta.is_empty() {
		debug!("[{}] already converged", conn.peer());
	}
	let steps = delta.len();
	for item in delta {
		let entry = item.entry;
		match item.kind {
			DeltaKind::Remove => {
				Request::Meta(MetaBody {
					action: MetaAction::Remove,
					entry: Some(entry.state.clone()),
				})
				.send(conn)
				.await?;
				expect_ack(conn).await?;
			}
			DeltaKind::Create | DeltaKind::Update => {
				if entry.state.is_dir {
					Request::Meta(MetaBody {
						action: MetaAction::Store,
						entry: Some(entry.state.clone()),
					})
					.send(conn)
					.await?;
					expect_ack(conn).await?;
				} else if fetch.contains(&entry.state.uuid) {
					Request::Meta(MetaBody {
						action: MetaAction::Fetch,
						entry: Some(entry.state.clone()),
					})
					.send(conn)
					.await?;
					transfer::recv_file(conn, &config.root, &entry.state).await?;
					Request::Ack.send(conn).await?;
				} else {
					Request::Meta(MetaBody {
						action: MetaAction::Store,
						entry: Some(entry.state.clone()),
					})
					.send(conn)
					.await?;
					transfer::send_file(conn, &config.root, &entry.state, config.buffer_size)
						.await?;
					expect_ack(conn).await?;
				}
			}
		}
		// the transfer is confirmed, the watermark moves with it
		store.commit_mark(cid, &entry)?;
	}

	Request::Meta(MetaBody { action: MetaAction::Done, entry: None }).send(conn).await?;
	expect_ack(conn).await?;
	info!("[{}] sync complete, {} step(s)", conn.peer(), steps);
	Ok(())
}

/// Append a client-won state to the log and bring the server tree in line
/// with it: deletions disappear, directories are created, renamed files
/// are moved, changed files are queued for fetching.
async fn take_client_state(
	config: &Config,
	store: &Store,
	latest: &mut BTreeMap<String, FileEntry>,
	fetch: &mut BTreeSet<String>,
	state: FileState,
) -> Result<(), SyncError> {
	let prev = latest.get(&state.uuid).cloned();
	let id = store.append_entry(&state)?;
	let entry = FileEntry { id, state };
	let state = &entry.state;
	debug!("log {} <- {} (from client)", entry.id, state.path);

	if state.deleted {
		// drop the local copy unless another live file took the path over
		let path_taken = latest.values().any(|e| {
			e.state.uuid != state.uuid && !e.state.deleted && e.state.path == state.path
		});
		if !path_taken {
			if let Err(e) = util::remove_path(&config.root.join(&state.path), state.is_dir) {
				warn!("cannot remove {}: {}", state.path, e);
			}
		}
	} else if state.is_dir {
		fs::create_dir_all(config.root.join(&state.path)).await.map_err(SyncError::Io)?;
	} else {
		let renamed = match &prev {
			// pure rename: move the local copy instead of refetching
			Some(prev)
				if !prev.state.deleted
					&& !prev.state.is_dir
					&& prev.state.path != state.path
					&& prev.state.hash == state.hash
					&& prev.state.size == state.size =>
			{
				fs::rename(config.root.join(&prev.state.path), config.root.join(&state.path))
					.await
					.is_ok()
			}
			_ => false,
		};
		if !renamed {
			fetch.insert(state.uuid.clone());
			if let Some(prev) = &prev {
				if !prev.state.deleted && prev.state.path != state.path {
					let _ = util::remove_path(
						&config.root.join(&prev.state.path),
						prev.state.is_dir,
					);
				}
			}
		}
	}

	latest.insert(entry.state.uuid.clone(), entry);
	Ok(())
}


// vim: ts=4
