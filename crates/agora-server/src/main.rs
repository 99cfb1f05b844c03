//! Agora chat server.
//!
//! Serves WebSocket clients on `ws://<host>:<port>/ws` and reads operator
//! commands (`createRoom <title> <total>`, `rooms`) from stdin.
//!
//! Run with:
//! ```not_rust
//! cargo run -p agora-server
//! cargo run -p agora-server -- --host 0.0.0.0 --port 9000 --no-admin
//! RUST_LOG=agora_room=debug cargo run -p agora-server
//! ```

use std::time::Duration;

use agora::prelude::*;
use clap::Parser;
use tokio::io::BufReader;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "agora-server")]
#[command(about = "Real-time multi-room chat server over WebSockets", long_about = None)]
struct Args {
    /// Host address to bind the server to
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    host: String,

    /// Port number to bind the server to
    #[arg(short = 'p', long, default_value_t = 8000)]
    port: u16,

    /// Request path upgraded to a WebSocket
    #[arg(long, default_value = "/ws")]
    path: String,

    /// Seconds between checks for empty rooms
    #[arg(long, default_value_t = 10)]
    idle_secs: u64,

    /// Seconds a client may stay silent before being dropped
    #[arg(long, default_value_t = 600)]
    read_timeout_secs: u64,

    /// Do not read operator commands from stdin
    #[arg(long)]
    no_admin: bool,
}

impl Args {
    fn server_config(&self) -> ServerConfig {
        let defaults = ServerConfig::default();
        ServerConfig {
            bind_addr: format!("{}:{}", self.host, self.port),
            path: self.path.clone(),
            read_timeout: Duration::from_secs(self.read_timeout_secs),
            room: RoomConfig {
                idle_timeout: Duration::from_secs(self.idle_secs.max(1)),
                ..defaults.room.clone()
            },
            ..defaults
        }
    }
}

/// Installs the global subscriber.
///
/// `RUST_LOG` wins when set; otherwise every agora crate logs at
/// `default_level`.
fn setup_logger(default_level: &str) {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                ["agora", "agora_transport", "agora_protocol", "agora_room", "agora_server"]
                    .iter()
                    .map(|target| format!("{target}={default_level}"))
                    .collect::<Vec<_>>()
                    .join(",")
                    .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

#[tokio::main]
async fn main() {
    setup_logger("info");

    let args = Args::parse();

    let server = match AgoraServerBuilder::new()
        .config(args.server_config())
        .build()
        .await
    {
        Ok(server) => server,
        Err(e) => {
            tracing::error!("Failed to start server: {}", e);
            std::process::exit(1);
        }
    };

    if !args.no_admin {
        let registry = server.registry();
        tokio::spawn(async move {
            let stdin = BufReader::new(tokio::io::stdin());
            if let Err(e) = run_admin(stdin, registry).await {
                tracing::warn!("Console stopped: {}", e);
            }
        });
    }

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for ctrl-c: {}", e);
            std::future::pending::<()>().await;
        }
    };

    if let Err(e) = server.run_until(shutdown).await {
        tracing::error!("Server error: {}", e);
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_defaults() {
        let args = Args::try_parse_from(["agora-server"]).unwrap();
        let config = args.server_config();
        assert_eq!(config.bind_addr, "127.0.0.1:8000");
        assert_eq!(config.path, "/ws");
        assert_eq!(config.read_timeout, Duration::from_secs(600));
        assert_eq!(config.room.idle_timeout, Duration::from_secs(10));
        assert_eq!(config.room.max_capacity, 16);
        assert!(!args.no_admin);
    }

    #[test]
    fn test_args_overrides() {
        let args = Args::try_parse_from([
            "agora-server",
            "-H",
            "0.0.0.0",
            "--port",
            "9000",
            "--idle-secs",
            "0",
            "--read-timeout-secs",
            "30",
            "--no-admin",
        ])
        .unwrap();
        let config = args.server_config();
        assert_eq!(config.bind_addr, "0.0.0.0:9000");
        assert_eq!(config.read_timeout, Duration::from_secs(30));
        assert_eq!(config.room.idle_timeout, Duration::from_secs(1), "interval is never zero");
        assert!(args.no_admin);
    }

    #[test]
    fn test_args_reject_bad_port() {
        assert!(Args::try_parse_from(["agora-server", "--port", "http"]).is_err());
    }
}
