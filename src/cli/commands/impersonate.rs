use clap::Subcommand;
use serde_json::json;

use crate::cli::context::CliContext;
use crate::cli::utils::*;
use crate::cli::OutputFormat;
use crate::session::EndOutcome;

#[derive(Subcommand)]
pub enum ImpersonateCommands {
    #[command(about = "Start acting as a client")]
    Start {
        #[arg(help = "Client (subject) ID")]
        subject_id: String,
    },

    #[command(about = "Return to the operator session")]
    Stop,

    #[command(about = "Show who is being impersonated")]
    Status,
}

pub async fn handle(
    cmd: ImpersonateCommands,
    ctx: &CliContext,
    output_format: OutputFormat,
) -> anyhow::Result<()> {
    match cmd {
        ImpersonateCommands::Start { subject_id } => {
            let subject = ctx.api.impersonate(&subject_id).await?;
            output_success(
                &output_format,
                &format!("Now acting as {} <{}>", subject.display_name, subject.email),
                Some(json!({ "subject": subject })),
            )
        }
        ImpersonateCommands::Stop => match ctx.session.end_impersonation()? {
            EndOutcome::Ended => output_success(&output_format, "Returned to operator session", None),
            EndOutcome::NotImpersonating => {
                output_notice(&output_format, "No impersonation session to end")
            }
        },
        ImpersonateCommands::Status => match ctx.session.impersonation_info() {
            Some(info) => match output_format {
                OutputFormat::Json => print_json(&json!({ "impersonation": info })),
                OutputFormat::Text => {
                    println!(
                        "Acting as {} <{}> on behalf of {} <{}>",
                        info.delegate.display_name,
                        info.delegate.email,
                        info.operator.display_name,
                        info.operator.email
                    );
                    Ok(())
                }
            },
            None => match output_format {
                OutputFormat::Json => print_json(&json!({ "impersonation": null })),
                OutputFormat::Text => {
                    println!("Not impersonating");
                    Ok(())
                }
            },
        },
    }
}
