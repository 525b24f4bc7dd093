use clap::Parser;
use log::error;
use server::network::{EchoServer, ServerConfig};
use shared::{DEFAULT_HOST, DEFAULT_PORT, DEFAULT_READ_TIMEOUT_SECS};
use std::io;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server IP address to bind to
    #[arg(short = 'H', long, default_value = DEFAULT_HOST)]
    host: String,

    /// Server port to listen on
    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Seconds to wait for data on a connection before closing it
    #[arg(short = 't', long, default_value_t = DEFAULT_READ_TIMEOUT_SECS)]
    read_timeout: u64,
}

/// Parses command-line arguments, binds the listener, and serves until a
/// termination signal triggers the shutdown drain.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();
    let config = ServerConfig {
        host: args.host,
        port: args.port,
        read_timeout: Duration::from_secs(args.read_timeout),
    };

    let server = match EchoServer::bind(&config).await {
        Ok(server) => server,
        Err(e) if e.kind() == io::ErrorKind::AddrInUse => {
            error!(
                "A server is already running on {}:{}",
                config.host, config.port
            );
            return Err(e.into());
        }
        Err(e) => {
            error!("Failed to bind {}:{}: {}", config.host, config.port, e);
            return Err(e.into());
        }
    };

    server.run().await?;
    Ok(())
}
