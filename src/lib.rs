//! # HubSync - Client/Server Directory Synchronizer
//!
//! HubSync keeps directory trees on many client machines converged with one
//! authoritative server. Peers exchange length-prefixed packets over a
//! persistent TCP connection; the server reconciles each client against an
//! append-only change log using per-client watermarks, so only the minimal
//! set of transfers runs on every sync.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use hubsync::{config::Config, server::Server, store::Store};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::load("hubsync.toml".as_ref())?;
//!     let store = Store::open(&config.store_path)?;
//!     Server::new(config, store).run().await?;
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod config;
pub mod connection;
pub mod error;
pub mod logging;
pub mod protocol;
pub mod reconcile;
pub mod scan;
pub mod server;
pub mod store;
pub mod transfer;
pub mod types;
pub mod util;

// Re-export commonly used types and functions
pub use config::Config;
pub use error::{ProtocolError, ScanError, StoreError, SyncError};
pub use types::{FileEntry, FileState, SyncMark};

// vim: ts=4
