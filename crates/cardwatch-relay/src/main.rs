use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;

use clap::Parser;

use cardwatch_relay::Directory;

#[derive(Parser)]
#[command(name = "cardwatch-relay", about = "Presence fan-out relay for the Cardwatch dashboard")]
struct Args {
    /// Port to listen on.
    #[arg(short, long, default_value_t = 4100)]
    port: u16,

    /// Address to bind.
    #[arg(long, default_value = "127.0.0.1")]
    bind: IpAddr,

    /// JSON file mapping tokens to users. Without it any token is
    /// accepted and used as the user id.
    #[arg(long)]
    users: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "cardwatch_relay=info".into()),
        )
        .init();

    let args = Args::parse();
    let directory = match &args.users {
        Some(path) => {
            let dir = Directory::load(path)?;
            tracing::info!(users = dir.len(), path = %path.display(), "Loaded token directory");
            dir
        }
        None => {
            tracing::warn!("No --users file given; accepting any token");
            Directory::open()
        }
    };

    let (_, server) = cardwatch_relay::spawn(SocketAddr::new(args.bind, args.port), directory).await?;
    server.await?;
    Ok(())
}
