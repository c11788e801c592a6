//! `rollcall` command-line entry point.

use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use rollcall_core::{AttendanceMode, StudentNumber};
use tracing_subscriber::EnvFilter;

mod commands;
mod config;
mod console;

use config::Config;

#[derive(Parser, Debug)]
#[command(name = "rollcall", author, version, about = "Card-read attendance coordinator")]
struct Cli {
    /// Config file (default: ./rollcall.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the reader transport and session with the console front end
    Serve,

    /// Send one card message to a running listener
    Simulate {
        /// Student number on the card
        student_number: String,
        #[arg(long, default_value = "")]
        name_kanji: String,
        #[arg(long, default_value = "")]
        name_kana: String,
        /// Listener address (default: reader.listen_addr)
        #[arg(long)]
        addr: Option<SocketAddr>,
    },

    /// List attendance logs, newest first
    Logs {
        /// Only this student's logs
        #[arg(long)]
        student: Option<StudentNumber>,
        #[arg(long, default_value_t = 0)]
        page: u32,
    },

    /// Show every active user's mode for the current operational day
    Status,

    /// Replace an attendance log with a corrected one
    EditLog {
        #[arg(long)]
        id: i64,
        #[arg(long)]
        mode: AttendanceMode,
        /// RFC 3339 timestamp (default: now)
        #[arg(long)]
        timestamp: Option<DateTime<Utc>>,
    },
}

fn init_tracing(default_level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref()).context("Failed to load configuration")?;
    init_tracing(&config.log_level);

    match cli.command {
        Commands::Serve => commands::serve(config).await,
        Commands::Simulate {
            student_number,
            name_kanji,
            name_kana,
            addr,
        } => commands::simulate(&config, addr, &student_number, &name_kanji, &name_kana).await,
        Commands::Logs { student, page } => commands::logs(&config, student, page).await,
        Commands::Status => commands::status(&config).await,
        Commands::EditLog {
            id,
            mode,
            timestamp,
        } => commands::edit_log(&config, id, mode, timestamp).await,
    }
}
