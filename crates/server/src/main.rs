use clap::Parser;
use tokio::signal;

use breezedb_common::{DEFAULT_HOST, DEFAULT_PORT, MAX_CONNECTIONS};
use breezedb_server::Server;

#[derive(Parser, Debug)]
#[command(name = "breezedb-server", about = "BreezeDB: in-memory key-value store (RESP2)")]
struct Args {
    #[arg(long, default_value = DEFAULT_HOST)]
    host: String,
    #[arg(long, short, default_value_t = DEFAULT_PORT)]
    port: u16,
    #[arg(long, default_value_t = MAX_CONNECTIONS)]
    max_connections: usize,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "breezedb_server=info,breezedb_storage=info".into()),
        )
        .init();

    let args = Args::parse();
    let addr = format!("{}:{}", args.host, args.port);

    let server = Server::bind(&addr)
        .await?
        .with_max_connections(args.max_connections);

    server.run(signal::ctrl_c()).await;

    Ok(())
}
