use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tokio::net::TcpListener;
use tracing::{info, warn};

use gchatter::utils::{init_console_logger, init_logger};
use gchatter::{config::Config, create_router, repl, spawn_chat, AppState};

#[derive(Parser)]
#[command(name = "gchatter", version, about = "Ask questions about a CSV dataset")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Serve the HTTP API (default)
    Serve,
    /// Chat from the terminal
    Chat {
        /// CSV file to upload before the first prompt
        #[arg(short, long)]
        file: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => {
            init_logger();
            serve().await
        }
        Command::Chat { file } => {
            init_console_logger();
            let config = Config::from_env()?;
            let chat = spawn_chat(&config)?;
            repl::run(chat, file).await
        }
    }
}

async fn serve() -> anyhow::Result<()> {
    let config = Config::from_env()?;
    info!("Configuration loaded: {:?}", config.server);
    info!(endpoint = %config.analysis.url, timeout_secs = config.analysis.timeout_secs, "Analysis service");

    let chat = spawn_chat(&config)?;
    let state = AppState {
        config: config.clone(),
        chat,
    };
    let app = create_router(state);

    let ip: std::net::IpAddr = config
        .server
        .host
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid HOST {:?}: {}", config.server.host, e))?;
    let addr = SocketAddr::new(ip, config.server.port);
    info!("Server listening on {}", addr);

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| anyhow::anyhow!("Server error: {}", e))?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Shutdown signal received"),
        Err(e) => {
            warn!(error = %e, "Could not listen for shutdown signal");
            std::future::pending::<()>().await
        }
    }
}
