use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use pgmimic::{ReturningCompletion, Server, ServerConfig};

/// pgmimic - PostgreSQL wire protocol server backed by SQLite
#[derive(Parser)]
#[command(
    name = "pgmimic",
    version = env!("CARGO_PKG_VERSION"),
    about = "PostgreSQL wire protocol server backed by SQLite"
)]
struct Args {
    #[arg(long, env = "PGMIMIC_HOST", default_value = "localhost", help = "Address to listen on")]
    host: String,

    #[arg(short, long, env = "PGMIMIC_PORT", default_value = "5432", help = "Port to listen on")]
    port: u16,

    #[arg(
        short,
        long,
        env = "PGMIMIC_DATABASE",
        value_name = "PATH",
        default_value = ":memory:",
        help = "SQLite database file, or :memory:"
    )]
    database: String,

    #[arg(long, default_value = "13.3", help = "server_version reported to clients")]
    server_version: String,

    #[arg(
        long,
        default_value = "deferred",
        value_parser = ["deferred", "immediate"],
        help = "When INSERT ... RETURNING sends its CommandComplete"
    )]
    returning_completion: String,

    #[arg(long, default_value = "info", help = "Log level, overridden by RUST_LOG")]
    log_level: String,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| args.log_level.clone()),
        ))
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .init();

    if let Err(e) = run(args).await {
        error!(error = %e, "server failed");
        std::process::exit(1);
    }
}

async fn run(args: Args) -> pgmimic::Result<()> {
    let returning: ReturningCompletion = args.returning_completion.parse()?;
    let config = ServerConfig::new()
        .host(args.host)
        .port(args.port)
        .database(args.database)
        .server_version(args.server_version)
        .returning_completion(returning);

    info!(version = env!("CARGO_PKG_VERSION"), "starting pgmimic");
    let server = Server::new(config).await?;

    tokio::select! {
        result = server.run() => result,
        _ = tokio::signal::ctrl_c() => {
            info!("shutting down");
            Ok(())
        }
    }
}
