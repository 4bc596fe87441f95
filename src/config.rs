//! Configuration for HubSync
//!
//! One `Config` struct covers both roles; the server ignores the
//! client-only knobs and vice versa. Values come from a TOML file with
//! built-in defaults for everything except the shared token, which must be
//! configured explicitly.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use std::{env, fs};

use crate::error::SyncError;

/// Unified configuration for HubSync
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
	/// Address the server binds, or the client connects to
	pub host: String,

	/// TCP port
	pub port: u16,

	/// Maximum allowed gap between two I/O operations on a connection
	pub idle_timeout_secs: u64,

	/// Keepalive ping cadence on an otherwise idle client session
	pub ping_interval_secs: u64,

	/// How often a watching client rescans and resynchronizes
	pub scan_interval_secs: u64,

	/// File transfer chunk size in bytes
	pub buffer_size: usize,

	/// Shared authentication secret
	pub token: String,

	/// Directory tree being synchronized
	pub root: PathBuf,

	/// Directory scopes inside the root ("." means the whole tree)
	pub directories: Vec<String>,

	/// Location of the redb state database
	pub store_path: PathBuf,

	/// Glob patterns excluded from scanning (e.g. "*.tmp", "target/**")
	pub exclude: Vec<String>,
}

impl Default for Config {
	fn default() -> Self {
		Config {
			host: "127.0.0.1".to_string(),
			port: 9045,
			idle_timeout_secs: 30,
			ping_interval_secs: 10,
			scan_interval_secs: 300,
			buffer_size: 64 * 1024,
			token: String::new(),
			root: PathBuf::from("."),
			directories: vec![".".to_string()],
			store_path: PathBuf::from(".hubsync/state.redb"),
			exclude: Vec::new(),
		}
	}
}

impl Config {
	/// Load configuration from a TOML file and validate it.
	pub fn load(path: &Path) -> Result<Config, SyncError> {
		let contents = fs::read_to_string(path).map_err(|e| SyncError::Config {
			message: format!("cannot read {}: {}", path.display(), e),
		})?;
		let config: Config = toml::from_str(&contents).map_err(|e| SyncError::Config {
			message: format!("cannot parse {}: {}", path.display(), e),
		})?;
		config.validate()?;
		Ok(config)
	}

	/// Load from an explicit path, or from `~/.hubsync/config.toml` when it
	/// exists, or fall back to the defaults.
	pub fn load_or_default(explicit: Option<&str>) -> Result<Config, SyncError> {
		if let Some(path) = explicit {
			return Config::load(Path::new(path));
		}
		if let Ok(home) = env::var("HOME") {
			let path = PathBuf::from(home).join(".hubsync").join("config.toml");
			if path.exists() {
				return Config::load(&path);
			}
		}
		let config = Config::default();
		config.validate()?;
		Ok(config)
	}

	/// Check the invariants the rest of the system relies on.
	pub fn validate(&self) -> Result<(), SyncError> {
		if self.token.is_empty() {
			return Err(SyncError::Config { message: "token must not be empty".to_string() });
		}
		if self.port == 0 {
			return Err(SyncError::Config { message: "port must not be 0".to_string() });
		}
		if self.idle_timeout_secs == 0 {
			return Err(SyncError::Config {
				message: "idle_timeout_secs must be positive".to_string(),
			});
		}
		if self.ping_interval_secs == 0 || self.ping_interval_secs >= self.idle_timeout_secs {
			return Err(SyncError::Config {
				message: "ping_interval_secs must be positive and below idle_timeout_secs"
					.to_string(),
			});
		}
		if self.buffer_size == 0 || self.buffer_size > 8 * 1024 * 1024 {
			return Err(SyncError::Config {
				message: "buffer_size must be between 1 byte and 8 MiB".to_string(),
			});
		}
		Ok(())
	}

	/// "host:port" form used for bind and connect.
	pub fn addr(&self) -> String {
		format!("{}:{}", self.host, self.port)
	}

	pub fn idle_timeout(&self) -> Duration {
		Duration::from_secs(self.idle_timeout_secs)
	}

	pub fn ping_interval(&self) -> Duration {
		Duration::from_secs(self.ping_interval_secs)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn valid() -> Config {
		Config { token: "secret".to_string(), ..Config::default() }
	}

	#[test]
	fn test_defaults_need_a_token() {
		assert!(Config::default().validate().is_err());
		assert!(valid().validate().is_ok());
	}

	#[test]
	fn test_ping_must_fit_inside_idle_window() {
		let mut config = valid();
		config.ping_interval_secs = config.idle_timeout_secs;
		assert!(config.validate().is_err());
	}

	#[test]
	fn test_parse_toml() {
		let config: Config = toml::from_str(
			r#"
			host = "0.0.0.0"
			port = 7000
			token = "secret"
			directories = ["docs", "src"]
			"#,
		)
		.unwrap();
		assert_eq!(config.port, 7000);
		assert_eq!(config.directories, vec!["docs".to_string(), "src".to_string()]);
		// unspecified fields keep their defaults
		assert_eq!(config.idle_timeout_secs, 30);
	}
}

// vim: ts=4
