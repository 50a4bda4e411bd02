//! lanchat: encrypted LAN chat relay.
//!
//! ```text
//!   remote peers (ciphertext)                       operator
//!   ┌────────┐   ┌────────┐                     ┌─────────────┐
//!   │ peer A │   │ peer B │                     │ telnet      │
//!   └───┬────┘   └───┬────┘                     │ localhost   │
//!       │            │                          └──────┬──────┘
//!       ▼            ▼                                 ▼
//!   ┌──────────────────────┐   ┌──────────┐   ┌────────────────┐
//!   │ remote listener /    │──▶│ registry │◀──│ local listener │
//!   │ bridge               │◀──│  actor   │   │ (plain text)   │
//!   └──────────────────────┘   └──────────┘   └────────────────┘
//! ```
//!
//! Run one node with `--serve`; every other node dials it with
//! `--server-ip`. All nodes must share the same secret.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;

use lanchat::config::loader::load_unvalidated;
use lanchat::config::{ChatConfig, Protocol};
use lanchat::crypto::SharedSecret;
use lanchat::lifecycle::signals::spawn_signal_listener;
use lanchat::lifecycle::{ChatNode, Shutdown};
use lanchat::observability::{logging, metrics};
use lanchat::relay::ConsoleDisplay;

const DEFAULT_REMOTE_PORT: u16 = 9999;

#[derive(Parser, Debug)]
#[command(name = "lanchat")]
#[command(about = "Encrypted chat relay for the local network", long_about = None)]
struct Cli {
    /// TOML configuration file; flags override its values
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Act as server
    #[arg(long)]
    serve: bool,

    /// IP/hostname to listen for remote connections on
    #[arg(long)]
    listen_ip: Option<String>,

    /// Port to listen on for remote connections (if acting as server)
    #[arg(long)]
    port: Option<u16>,

    /// Port to listen on for local connections
    #[arg(long)]
    local_port: Option<u16>,

    /// Protocol options: tcp, ws
    #[arg(long)]
    proto: Option<Protocol>,

    /// IP of remote server to connect to (used when --serve is not set)
    #[arg(long)]
    server_ip: Option<String>,

    /// Port of remote server to connect to
    #[arg(long)]
    server_port: Option<u16>,

    /// Maximum simultaneous remote connections allowed
    #[arg(long)]
    conns: Option<usize>,

    /// Enable debug mode for verbose terminal messages
    #[arg(long)]
    debug: bool,
}

impl Cli {
    /// Apply command-line values on top of `config`.
    fn apply(&self, config: &mut ChatConfig) {
        if self.serve {
            config.mode.serve = true;
        }
        if let Some(proto) = self.proto {
            config.mode.protocol = proto;
        }
        if self.listen_ip.is_some() || self.port.is_some() {
            config.remote.bind_address = replace_parts(
                &config.remote.bind_address,
                self.listen_ip.as_deref(),
                self.port,
            );
        }
        if let Some(port) = self.local_port {
            config.local.bind_address = replace_parts(&config.local.bind_address, None, Some(port));
        }
        if let Some(ip) = &self.server_ip {
            let port = self.server_port.unwrap_or(DEFAULT_REMOTE_PORT);
            config.mode.server_address = Some(format!("{}:{}", ip, port));
        } else if let (Some(port), Some(current)) = (self.server_port, &config.mode.server_address) {
            config.mode.server_address = Some(replace_parts(current, None, Some(port)));
        }
        if let Some(conns) = self.conns {
            config.remote.max_connections = conns;
        }
        if self.debug {
            config.observability.debug = true;
        }
    }
}

/// Swap the host and/or port of a `host:port` string.
fn replace_parts(address: &str, host: Option<&str>, port: Option<u16>) -> String {
    let (old_host, old_port) = address.rsplit_once(':').unwrap_or((address, ""));
    let host = host.unwrap_or(old_host);
    match port {
        Some(port) => format!("{}:{}", host, port),
        None => format!("{}:{}", host, old_port),
    }
}

fn port_of(address: &str) -> &str {
    address.rsplit_once(':').map_or(address, |(_, port)| port)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => load_unvalidated(path)?,
        None => ChatConfig::default(),
    };
    cli.apply(&mut config);

    logging::init_logging(&config.observability);
    tracing::info!("lanchat v{} starting", env!("CARGO_PKG_VERSION"));

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let secret = match SharedSecret::from_env() {
        Some(secret) => secret?,
        None => SharedSecret::prompt()?,
    };

    let local_port = port_of(&config.local.bind_address).to_string();
    let node = match ChatNode::new(config, &secret, Arc::new(ConsoleDisplay::new())) {
        Ok(node) => node,
        Err(e) => {
            tracing::error!(error = %e, "Refusing to start");
            return Err(e.into());
        }
    };
    drop(secret);

    let node = match node.bind().await {
        Ok(node) => node,
        Err(e) => {
            tracing::error!(error = %e, "Startup failed");
            return Err(e.into());
        }
    };

    tracing::info!(
        remote = ?node.remote_addr(),
        local = ?node.local_addr(),
        server = node.is_server(),
        "Servers started"
    );
    println!("\nNow run\n\n    telnet localhost {}\n", local_port);

    let shutdown = Shutdown::new();
    spawn_signal_listener(shutdown.clone());

    node.run(shutdown).await?;
    tracing::info!("lanchat stopped");
    Ok(())
}
