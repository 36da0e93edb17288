//! CPT Server Binary
//!
//! Bootstrap layer: parse flags, init logging, bind, jalankan event loop.
//! Semua protocol logic ada di library.
//!
//! Usage:
//!   cargo run --release --bin cpt_server -- --bind 0.0.0.0:7777

use std::net::SocketAddr;
use std::process;
use std::time::Duration;

use clap::Parser;
use tracing::error;
use tracing_subscriber::EnvFilter;

use cpt::network::{Server, ServerConfig};

#[derive(Parser, Debug)]
#[command(name = "cpt_server", about = "CPT chat protocol server", version)]
struct Args {
    /// Listen address
    #[arg(short, long, default_value = "0.0.0.0:7777")]
    bind: SocketAddr,

    /// Maximum concurrent client connections
    #[arg(long, default_value_t = 1024)]
    max_clients: usize,

    /// Seconds of total inactivity before the server shuts down
    #[arg(long, default_value_t = 300)]
    idle_timeout: u64,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let config = ServerConfig {
        max_connections: args.max_clients,
        idle_timeout: Duration::from_secs(args.idle_timeout),
    };

    let mut server = match Server::bind(args.bind, config) {
        Ok(server) => server,
        Err(e) => {
            error!("cannot bind {}: {}", args.bind, e);
            process::exit(1);
        }
    };

    if let Err(e) = server.run() {
        error!("server error: {}", e);
        process::exit(1);
    }
}
