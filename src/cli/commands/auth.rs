use clap::Subcommand;
use serde_json::json;
use std::io::{self, BufRead, Write};

use crate::cli::context::CliContext;
use crate::cli::utils::*;
use crate::cli::OutputFormat;

#[derive(Subcommand)]
pub enum AuthCommands {
    #[command(about = "Login as operator")]
    Login {
        #[arg(help = "Email")]
        email: String,
        #[arg(long, help = "Password (will prompt if not provided)")]
        password: Option<String>,
    },

    #[command(about = "Logout and clear every stored session")]
    Logout,

    #[command(about = "Show current authentication status")]
    Status,
}

pub async fn handle(
    cmd: AuthCommands,
    ctx: &CliContext,
    output_format: OutputFormat,
) -> anyhow::Result<()> {
    match cmd {
        AuthCommands::Login { email, password } => {
            let password = match password {
                Some(password) => password,
                None => prompt_password()?,
            };

            let subject = ctx.api.login(&email, &password).await?;
            output_success(
                &output_format,
                &format!("Logged in as {} <{}>", subject.display_name, subject.email),
                Some(json!({ "user": subject })),
            )
        }
        AuthCommands::Logout => {
            ctx.session.sign_out()?;
            output_success(&output_format, "Logged out", None)
        }
        AuthCommands::Status => output_session(&output_format, &ctx.session.status()),
    }
}

fn prompt_password() -> anyhow::Result<String> {
    eprint!("Password: ");
    io::stderr().flush()?;

    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    let password = line.trim_end_matches(['\r', '\n']).to_string();
    if password.is_empty() {
        anyhow::bail!("Password is required");
    }
    Ok(password)
}
