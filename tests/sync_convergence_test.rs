//! End-to-end synchronization tests
//!
//! Run a real server and a real client over loopback and verify the trees
//! converge: creations, deletions, empty directories, conflicts and the
//! empty-delta property on resync.

use std::fs;
use std::net::SocketAddr;
use std::path::Path;
use tempfile::TempDir;
use tokio::net::TcpListener;

use filetime::{set_file_mtime, FileTime};
use hubsync::client;
use hubsync::config::Config;
use hubsync::server::Server;
use hubsync::store::Store;

const TOKEN: &str = "test-token";

// ============================================================================
// Helper Functions
// ============================================================================

struct Fixture {
	_dir: TempDir,
	client_config: Config,
	client_store: Store,
	server_root: std::path::PathBuf,
}

async fn setup() -> Fixture {
	let dir = TempDir::new().unwrap();

	let mut server_config = Config::default();
	server_config.token = TOKEN.to_string();
	server_config.root = dir.path().join("server-root");
	server_config.store_path = dir.path().join("server-state.redb");
	fs::create_dir_all(&server_config.root).unwrap();
	let server_root = server_config.root.clone();

	let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
	let addr: SocketAddr = listener.local_addr().unwrap();
	let server_store = Store::open(&server_config.store_path).unwrap();
	tokio::spawn(async move {
		let _ = Server::new(server_config, server_store).run_on(listener).await;
	});

	let mut client_config = Config::default();
	client_config.token = TOKEN.to_string();
	client_config.host = addr.ip().to_string();
	client_config.port = addr.port();
	client_config.root = dir.path().join("client-root");
	client_config.store_path = dir.path().join("client-state.redb");
	fs::create_dir_all(&client_config.root).unwrap();
	let client_store = Store::open(&client_config.store_path).unwrap();

	Fixture { _dir: dir, client_config, client_store, server_root }
}

fn read(root: &Path, rel: &str) -> Option<Vec<u8>> {
	fs::read(root.join(rel)).ok()
}

// ============================================================================
// Convergence
// ============================================================================

#[tokio::test]
async fn test_client_tree_reaches_the_server() {
	let fx = setup().await;
	let root = &fx.client_config.root;
	fs::write(root.join("a.txt"), b"alpha").unwrap();
	fs::create_dir_all(root.join("sub")).unwrap();
	fs::write(root.join("sub/b.txt"), b"beta").unwrap();
	fs::create_dir_all(root.join("empty-dir")).unwrap();

	client::run(&fx.client_config, &fx.client_store).await.unwrap();

	assert_eq!(read(&fx.server_root, "a.txt").unwrap(), b"alpha");
	assert_eq!(read(&fx.server_root, "sub/b.txt").unwrap(), b"beta");
	// empty directory creation is tracked too
	assert!(fx.server_root.join("empty-dir").is_dir());
}

#[tokio::test]
async fn test_resync_is_an_empty_delta() {
	let fx = setup().await;
	fs::write(fx.client_config.root.join("a.txt"), b"alpha").unwrap();

	client::run(&fx.client_config, &fx.client_store).await.unwrap();
	let rows_after_first = fx.client_store.entries().unwrap().len();

	client::run(&fx.client_config, &fx.client_store).await.unwrap();
	let rows_after_second = fx.client_store.entries().unwrap().len();

	// nothing changed, so the second exchange appends nothing anywhere
	assert_eq!(rows_after_first, rows_after_second);
	assert_eq!(read(&fx.server_root, "a.txt").unwrap(), b"alpha");
}

#[tokio::test]
async fn test_server_files_reach_the_client() {
	let fx = setup().await;
	fs::write(fx.server_root.join("issued.txt"), b"from the server").unwrap();

	client::run(&fx.client_config, &fx.client_store).await.unwrap();

	assert_eq!(read(&fx.client_config.root, "issued.txt").unwrap(), b"from the server");
}

#[tokio::test]
async fn test_both_directions_in_one_exchange() {
	let fx = setup().await;
	fs::write(fx.client_config.root.join("mine.txt"), b"client side").unwrap();
	fs::write(fx.server_root.join("yours.txt"), b"server side").unwrap();

	client::run(&fx.client_config, &fx.client_store).await.unwrap();

	assert_eq!(read(&fx.server_root, "mine.txt").unwrap(), b"client side");
	assert_eq!(read(&fx.client_config.root, "yours.txt").unwrap(), b"server side");
}

#[tokio::test]
async fn test_deletion_propagates() {
	let fx = setup().await;
	let path = fx.client_config.root.join("gone.txt");
	fs::write(&path, b"here today").unwrap();

	client::run(&fx.client_config, &fx.client_store).await.unwrap();
	assert!(fx.server_root.join("gone.txt").exists());

	fs::remove_file(&path).unwrap();
	client::run(&fx.client_config, &fx.client_store).await.unwrap();
	assert!(!fx.server_root.join("gone.txt").exists());

	// the tombstone stays quiet afterwards
	client::run(&fx.client_config, &fx.client_store).await.unwrap();
	assert!(!fx.server_root.join("gone.txt").exists());
}

#[tokio::test]
async fn test_rename_propagates() {
	let fx = setup().await;
	let root = &fx.client_config.root;
	fs::write(root.join("before.txt"), b"stable content").unwrap();

	client::run(&fx.client_config, &fx.client_store).await.unwrap();
	fs::rename(root.join("before.txt"), root.join("after.txt")).unwrap();
	client::run(&fx.client_config, &fx.client_store).await.unwrap();

	assert!(!fx.server_root.join("before.txt").exists());
	assert_eq!(read(&fx.server_root, "after.txt").unwrap(), b"stable content");
}

// ============================================================================
// Conflicts
// ============================================================================

#[tokio::test]
async fn test_conflict_latest_writer_wins_client() {
	let fx = setup().await;
	let client_path = fx.client_config.root.join("c.txt");
	let server_path = fx.server_root.join("c.txt");
	fs::write(&server_path, b"older server words").unwrap();
	set_file_mtime(&server_path, FileTime::from_unix_time(1_000_000_000, 0)).unwrap();
	fs::write(&client_path, b"newer client words").unwrap();
	set_file_mtime(&client_path, FileTime::from_unix_time(2_000_000_000, 0)).unwrap();

	client::run(&fx.client_config, &fx.client_store).await.unwrap();

	assert_eq!(read(&fx.server_root, "c.txt").unwrap(), b"newer client words");
	assert_eq!(read(&fx.client_config.root, "c.txt").unwrap(), b"newer client words");
}

#[tokio::test]
async fn test_conflict_latest_writer_wins_server() {
	let fx = setup().await;
	let client_path = fx.client_config.root.join("c.txt");
	let server_path = fx.server_root.join("c.txt");
	fs::write(&server_path, b"newer server words").unwrap();
	set_file_mtime(&server_path, FileTime::from_unix_time(2_000_000_000, 0)).unwrap();
	fs::write(&client_path, b"older client words").unwrap();
	set_file_mtime(&client_path, FileTime::from_unix_time(1_000_000_000, 0)).unwrap();

	client::run(&fx.client_config, &fx.client_store).await.unwrap();

	assert_eq!(read(&fx.server_root, "c.txt").unwrap(), b"newer server words");
	assert_eq!(read(&fx.client_config.root, "c.txt").unwrap(), b"newer server words");
}

// ============================================================================
// Larger payloads
// ============================================================================

#[tokio::test]
async fn test_multi_chunk_transfer() {
	let fx = setup().await;
	// several buffer_size chunks plus a partial tail
	let payload: Vec<u8> = (0..200_000u32).map(|i| (i % 251) as u8).collect();
	fs::write(fx.client_config.root.join("big.bin"), &payload).unwrap();

	client::run(&fx.client_config, &fx.client_store).await.unwrap();

	assert_eq!(read(&fx.server_root, "big.bin").unwrap(), payload);
}

// vim: ts=4
