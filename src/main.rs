use clap::{Arg, ArgAction, Command};
use std::error::Error;

use hubsync::client;
use hubsync::config::Config;
use hubsync::logging;
use hubsync::server::Server;
use hubsync::store::Store;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
	logging::init_tracing();

	let matches = Command::new("HubSync")
		.version("0.1.0")
		.about("Client/server directory synchronizer")
		.subcommand_required(true)
		.arg(
			Arg::new("config")
				.short('c')
				.long("config")
				.value_name("FILE")
				.help("Configuration file (defaults to ~/.hubsync/config.toml)"),
		)
		.subcommand(Command::new("serve").about("Run the authoritative server"))
		.subcommand(
			Command::new("sync").about("Synchronize against the server").arg(
				Arg::new("watch")
					.long("watch")
					.action(ArgAction::SetTrue)
					.help("Keep the session open and resync periodically"),
			),
		)
		.get_matches();

	let config =
		Config::load_or_default(matches.get_one::<String>("config").map(|s| s.as_str()))?;
	let store = Store::open(&config.store_path)?;

	if matches.subcommand_matches("serve").is_some() {
		Server::new(config, store).run().await?;
	} else if let Some(sub_matches) = matches.subcommand_matches("sync") {
		if sub_matches.get_flag("watch") {
			client::watch(&config, &store).await?;
		} else {
			client::run(&config, &store).await?;
		}
	}

	Ok(())
}

// vim: ts=4
