//! eid - rotating beacon token tool
//!
//! Reproduces beacon tokens and identity keys off-device from the same
//! inputs the beacon and the resolving server use.

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

mod commands;

/// eid - rotating beacon token tool
#[derive(Parser, Debug)]
#[command(name = "eid")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Log level (trace, debug, info, warn, error); `RUST_LOG` wins when set
    #[arg(long, default_value = "warn")]
    log_level: String,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Compute the token a beacon broadcasts at a given time
    Token(commands::TokenArgs),

    /// Seconds until the next token rotation
    NextRotation(commands::ScheduleArgs),

    /// Derive an identity key from one side of the key agreement
    DeriveIdentity(commands::DeriveArgs),

    /// Generate a fresh X25519 key pair
    Keypair,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&cli.log_level))
        .unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let output = match cli.command {
        Commands::Token(args) => commands::token(&args)?,
        Commands::NextRotation(args) => commands::next_rotation(&args)?,
        Commands::DeriveIdentity(args) => commands::derive_identity(&args)?,
        Commands::Keypair => commands::keypair(),
    };
    println!("{}", output.render(cli.json)?);
    Ok(())
}
