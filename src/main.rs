use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use screener_session::cli::{self, Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "screener_session=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Init => cli::commands::init().await,
        Commands::Login {
            email,
            password,
            remember_me,
        } => cli::commands::login(email, password, remember_me).await,
        Commands::Logout => cli::commands::logout().await,
        Commands::Refresh => cli::commands::refresh().await,
        Commands::Status { format } => cli::commands::status(format).await,
        Commands::Whoami => cli::commands::whoami().await,
        Commands::Header => cli::commands::header().await,
        Commands::Watch { interval_ms } => cli::commands::watch(interval_ms).await,
        Commands::Serve { host, port } => cli::commands::serve(host, port).await,
    }
}
