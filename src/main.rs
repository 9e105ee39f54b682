//! LR Chat node
//!
//! Usage:
//!   lr-chat --role coordinator            # Run as the coordinator
//!   lr-chat --role peer                   # Join the coordinator's segment
//!   lr-chat --config chat.toml            # Run with a config file

use std::net::IpAddr;
use std::path::PathBuf;

use clap::Parser;
use tracing::info;

use lr_chat::{Config, Console, Node, Role};

#[derive(Parser)]
#[command(name = "lr-chat", version, about = "Store-and-forward broadcast chat node")]
struct Cli {
    /// Path to config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Device role (coordinator or peer)
    #[arg(short, long)]
    role: Option<Role>,

    /// Application UDP port
    #[arg(short, long)]
    port: Option<u16>,

    /// Own address, detected when omitted
    #[arg(long)]
    local_ip: Option<IpAddr>,

    #[arg(long)]
    coordinator_ip: Option<IpAddr>,

    #[arg(long)]
    broadcast_ip: Option<IpAddr>,
}

impl Cli {
    fn load_config(&self) -> anyhow::Result<Config> {
        let mut config = match &self.config {
            Some(path) => Config::from_file(path)?,
            None => Config::default(),
        };

        if let Some(role) = self.role {
            config.role = role;
        }
        if let Some(port) = self.port {
            config.network.port = port;
        }
        if let Some(ip) = self.local_ip {
            config.network.local_ip = Some(ip);
        }
        if let Some(ip) = self.coordinator_ip {
            config.network.coordinator_ip = ip;
        }
        if let Some(ip) = self.broadcast_ip {
            config.network.broadcast_ip = ip;
        }

        config.validate()?;
        Ok(config)
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "lr_chat=info".into()),
        )
        .init();

    let cli = Cli::parse();
    let config = cli.load_config()?;
    info!(role = %config.role, port = config.network.port, "Starting lr-chat {}", lr_chat::VERSION);

    let mut node = Node::new(&config, Console::stdin(), std::io::stdout())?;
    node.run().await?;

    Ok(())
}
