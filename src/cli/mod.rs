//! CLI interface for screener-session

pub mod commands;
mod output;

pub use output::*;

use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(name = "screener")]
#[command(author = "Krakaw")]
#[command(version)]
#[command(about = "Sign in to the stock screener backend and manage the local session", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize a new screener.toml configuration file
    Init,

    /// Log in and store the issued tokens
    Login {
        /// Account email (prompted when omitted)
        #[arg(short, long)]
        email: Option<String>,

        /// Account password (prompted when omitted)
        #[arg(short, long, env = "SCREENER_PASSWORD", hide_env_values = true)]
        password: Option<String>,

        /// Also keep the tokens in the persistent scope
        #[arg(short, long)]
        remember_me: bool,
    },

    /// Log out and clear every stored token
    Logout,

    /// Exchange the refresh token for a new token pair
    Refresh,

    /// Show the current session
    Status {
        /// Output format
        #[arg(short, long, default_value = "table")]
        format: OutputFormat,
    },

    /// Ask the backend who the current token belongs to
    Whoami,

    /// Print the Authorization header for the current session
    Header,

    /// Follow session changes made by other processes
    Watch {
        /// How often to check the session file
        #[arg(long, default_value = "500")]
        interval_ms: u64,
    },

    /// Start the development auth server
    Serve {
        /// Host to bind to (defaults to the config value)
        #[arg(long)]
        host: Option<String>,

        /// Port to listen on (defaults to the config value)
        #[arg(short, long)]
        port: Option<u16>,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    Table,
    Json,
    Yaml,
}
