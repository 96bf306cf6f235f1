use serde::Serialize;
use serde_json::{json, Value};

use crate::cli::OutputFormat;
use crate::session::{NavigationEvent, SessionStatus};

/// Output a success message in the appropriate format
pub fn output_success(
    output_format: &OutputFormat,
    message: &str,
    data: Option<Value>,
) -> anyhow::Result<()> {
    match output_format {
        OutputFormat::Json => {
            let mut response = json!({
                "success": true,
                "message": message
            });

            if let (Some(Value::Object(extra)), Some(target)) =
                (data, response.as_object_mut())
            {
                target.extend(extra);
            }

            println!("{}", serde_json::to_string_pretty(&response)?);
        }
        OutputFormat::Text => {
            println!("✓ {}", message);
        }
    }
    Ok(())
}

/// Output a warning that is not a failure (e.g. a no-op)
pub fn output_notice(output_format: &OutputFormat, message: &str) -> anyhow::Result<()> {
    match output_format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::to_string_pretty(&json!({ "success": true, "notice": message }))?
            );
        }
        OutputFormat::Text => {
            println!("! {}", message);
        }
    }
    Ok(())
}

/// Print any serializable value as pretty JSON
pub fn print_json<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Output the current session in the appropriate format
pub fn output_session(output_format: &OutputFormat, status: &SessionStatus) -> anyhow::Result<()> {
    match output_format {
        OutputFormat::Json => print_json(&json!({
            "scope": status.scope,
            "impersonating": status.impersonating,
            "impersonation": status.info,
        })),
        OutputFormat::Text => {
            match status.scope {
                Some(scope) => println!("Signed in: {}", scope),
                None => println!("Not signed in"),
            }
            if let Some(info) = &status.info {
                println!(
                    "Impersonating: {} <{}>",
                    info.delegate.display_name, info.delegate.email
                );
                println!(
                    "Operator: {} <{}>",
                    info.operator.display_name, info.operator.email
                );
            }
            Ok(())
        }
    }
}

/// Report where the session layer asked the UI to go
pub fn output_navigation(
    output_format: &OutputFormat,
    events: &[NavigationEvent],
) -> anyhow::Result<()> {
    if events.is_empty() {
        return Ok(());
    }

    match output_format {
        OutputFormat::Json => {
            let items: Vec<Value> = events
                .iter()
                .map(|event| match event {
                    NavigationEvent::Navigate(dest) => json!({ "navigate": dest.path() }),
                    NavigationEvent::OpenContext(dest, credential) => json!({
                        "open_context": dest.path(),
                        "scope": credential.scope,
                        "subject_id": credential.subject_id,
                    }),
                })
                .collect();
            // stderr keeps stdout a single JSON document
            eprintln!("{}", serde_json::to_string_pretty(&json!({ "navigation": items }))?);
        }
        OutputFormat::Text => {
            for event in events {
                match event {
                    NavigationEvent::Navigate(dest) => eprintln!("→ {}", dest.path()),
                    NavigationEvent::OpenContext(dest, credential) => eprintln!(
                        "→ new {} context at {} ({})",
                        credential.scope,
                        dest.path(),
                        credential.subject_id
                    ),
                }
            }
        }
    }
    Ok(())
}
