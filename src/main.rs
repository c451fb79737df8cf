//! consult-cli - appointment chat and video-call signaling client
//!
//! A terminal client for the clinic's patient and doctor portals.

mod api;
mod auth;
mod calling;
mod channel;
mod chat;
mod config;
mod console;
mod error;
mod models;
mod notify;
mod participant;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use models::Role;

#[derive(Parser)]
#[command(name = "consult-cli")]
#[command(about = "Lightweight CLI client for appointment chat and video calls", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Log in with email/username and password
    Login {
        /// Email or username
        identifier: String,

        /// Password (read from stdin when omitted)
        #[arg(short, long)]
        password: Option<String>,

        /// Role to use when the server does not report one: patient or doctor
        #[arg(short, long)]
        role: Option<Role>,
    },

    /// Log out and clear the stored session
    Logout,

    /// Show current session status
    Status,

    /// Print the message history of an appointment
    Messages {
        /// Appointment ID
        appointment: String,
    },

    /// Send a single message
    Send {
        /// Appointment ID
        #[arg(short, long)]
        to: String,

        /// Message content
        message: String,

        /// Send through the REST endpoint instead of the channel
        #[arg(long)]
        rest: bool,
    },

    /// Open an interactive chat on an appointment
    Chat {
        /// Appointment ID
        appointment: String,

        /// Send typed messages through the REST endpoint
        #[arg(long)]
        rest: bool,
    },

    /// Start a video call for an appointment
    Call {
        /// Appointment ID
        appointment: String,

        /// User ID of the other participant
        #[arg(short, long)]
        peer: String,
    },

    /// Wait for incoming calls
    Listen {
        /// Answer incoming calls automatically
        #[arg(long)]
        accept: bool,
    },
}

async fn read_password() -> Result<String> {
    eprint!("Password: ");
    let mut line = String::new();
    BufReader::new(tokio::io::stdin())
        .read_line(&mut line)
        .await
        .context("Failed to read password")?;
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    match cli.command {
        Commands::Login {
            identifier,
            password,
            role,
        } => {
            let password = match password {
                Some(p) => p,
                None => read_password().await?,
            };
            auth::login(&identifier, &password, role).await?;
        }
        Commands::Logout => {
            tracing::info!("Logging out...");
            auth::logout().await?;
        }
        Commands::Status => {
            auth::status().await?;
        }
        Commands::Messages { appointment } => {
            console::print_history(&appointment).await?;
        }
        Commands::Send { to, message, rest } => {
            console::send_once(&to, &message, rest).await?;
        }
        Commands::Chat { appointment, rest } => {
            console::run_chat(&appointment, rest).await?;
        }
        Commands::Call { appointment, peer } => {
            console::run_call(&appointment, &peer).await?;
        }
        Commands::Listen { accept } => {
            console::run_listen(accept).await?;
        }
    }

    Ok(())
}
