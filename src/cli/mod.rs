pub mod commands;
pub mod context;
pub mod utils;

use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};

#[derive(Parser)]
#[command(name = "backoffice")]
#[command(about = "Back-office CLI - operator sessions, impersonation and dashboard data")]
#[command(version)]
pub struct Cli {
    #[arg(long, global = true, help = "Output in human-readable text format")]
    pub text: bool,

    #[arg(long, global = true, help = "Output in JSON format")]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    #[command(about = "Operator authentication")]
    Auth {
        #[command(subcommand)]
        cmd: commands::auth::AuthCommands,
    },

    #[command(about = "Act as a client account")]
    Impersonate {
        #[command(subcommand)]
        cmd: commands::impersonate::ImpersonateCommands,
    },

    #[command(about = "Dashboard snapshot and narrow reads")]
    Dashboard {
        #[command(subcommand)]
        cmd: commands::dashboard::DashboardCommands,
    },
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub enum OutputFormat {
    Text,
    Json,
}

impl OutputFormat {
    pub fn from_cli(cli: &Cli) -> Self {
        if cli.json {
            OutputFormat::Json
        } else {
            OutputFormat::Text
        }
    }
}

pub async fn run(cli: Cli) -> anyhow::Result<()> {
    let output_format = OutputFormat::from_cli(&cli);
    let ctx = context::CliContext::from_env()?;

    let result = match cli.command {
        Commands::Auth { cmd } => commands::auth::handle(cmd, &ctx, output_format).await,
        Commands::Impersonate { cmd } => {
            commands::impersonate::handle(cmd, &ctx, output_format).await
        }
        Commands::Dashboard { cmd } => commands::dashboard::handle(cmd, &ctx, output_format).await,
    };

    // Navigation requested by the session layer, including forced logouts
    utils::output_navigation(&output_format, &ctx.navigator.take())?;
    result
}
