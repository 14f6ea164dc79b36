///
/// Serves the built-in commands (hello, getDate, uptime, help).
///
/// Run this example with:
/// cargo run --example basic_server -- --listen 127.0.0.1:2222
///
/// then connect with `ssh -p 2222 user@localhost`.
///
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use cmdsh::config::resolve_path;
use cmdsh::{DefaultCommandHandler, LogConfig, Server, ServerConfig};
use log::info;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = ServerConfig {
        listen_address: cli.listen,
        host_key_file: resolve_path(cli.host_key),
        authorized_keys_file: resolve_path(cli.authorized_keys),
        no_client_auth: cli.no_client_auth,
        log: LogConfig {
            file_path: cli.log_file,
            ..Default::default()
        },
        ..Default::default()
    };

    let mut server = Server::new(config, Arc::new(DefaultCommandHandler::new()))?;
    server.start().await?;
    info!("SSH server started successfully!");
    if let Some(addr) = server.local_addr() {
        info!("Connect with: ssh -p {} user@localhost", addr.port());
    }
    info!("Available commands: hello, getDate, uptime, help");

    tokio::signal::ctrl_c().await?;
    info!("Shutting down server...");
    server.stop().await;
    Ok(())
}

#[derive(clap::Parser)]
pub struct Cli {
    #[clap(long, short, default_value = "0.0.0.0:2222")]
    listen: String,

    #[clap(long, default_value = "server_key")]
    host_key: PathBuf,

    #[clap(long, default_value = "authorized_keys")]
    authorized_keys: PathBuf,

    /// Let anyone in without authentication.
    #[clap(long)]
    no_client_auth: bool,

    #[clap(long, default_value = "ssh_server.log")]
    log_file: Option<PathBuf>,
}
