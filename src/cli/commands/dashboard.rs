use chrono::NaiveDate;
use clap::Subcommand;
use serde::de::DeserializeOwned;
use serde_json::json;
use std::time::Duration;

use crate::cli::context::CliContext;
use crate::cli::utils::*;
use crate::cli::OutputFormat;
use crate::sync::SyncPhase;
use crate::types::{Account, DashboardSnapshot, Transaction, TransactionFilters};

#[derive(Subcommand)]
pub enum DashboardCommands {
    #[command(about = "Fetch and print the dashboard snapshot")]
    Show,

    #[command(about = "Keep the dashboard snapshot fresh and print each update")]
    Watch {
        #[arg(long, help = "Refresh interval in milliseconds (defaults to configuration)")]
        interval_ms: Option<u64>,
        #[arg(long, help = "Stop after this many snapshots")]
        count: Option<usize>,
    },

    #[command(about = "List transaction history")]
    Transactions {
        #[arg(long = "type", help = "deposit, withdrawal, transfer or trade")]
        kind: Option<String>,
        #[arg(long, help = "pending, completed, failed or cancelled")]
        status: Option<String>,
        #[arg(long, help = "From date (YYYY-MM-DD)")]
        from: Option<NaiveDate>,
        #[arg(long, help = "To date (YYYY-MM-DD)")]
        to: Option<NaiveDate>,
        #[arg(long)]
        limit: Option<u32>,
        #[arg(long)]
        page: Option<u32>,
    },

    #[command(about = "Show one trading account")]
    Account {
        #[arg(help = "Account ID")]
        id: String,
    },
}

pub async fn handle(
    cmd: DashboardCommands,
    ctx: &CliContext,
    output_format: OutputFormat,
) -> anyhow::Result<()> {
    match cmd {
        DashboardCommands::Show => {
            let sync = ctx.dashboard(false);
            let result = sync.fetch_snapshot(false).await;
            sync.shutdown();
            output_snapshot(&output_format, &*result?)
        }
        DashboardCommands::Watch { interval_ms, count } => {
            let sync = ctx.dashboard(true);
            if let Some(ms) = interval_ms {
                sync.set_refresh_interval(Duration::from_millis(ms));
            }

            let mut snapshots = sync.subscribe_snapshot();
            let mut status = sync.subscribe_status();
            if let Err(e) = sync.start().await {
                eprintln!("Initial load failed: {}", e);
            }

            let mut printed = 0usize;
            if let Some(snapshot) = snapshots.borrow_and_update().clone() {
                output_snapshot(&output_format, &snapshot)?;
                printed += 1;
            }

            let outcome = loop {
                if count.is_some_and(|limit| printed >= limit) {
                    break Ok(());
                }
                if ctx.session.current_credential().is_none() {
                    break Err(anyhow::anyhow!("Session ended; login required"));
                }

                tokio::select! {
                    changed = snapshots.changed() => {
                        if changed.is_err() {
                            break Ok(());
                        }
                        let latest = snapshots.borrow_and_update().clone();
                        if let Some(snapshot) = latest {
                            output_snapshot(&output_format, &snapshot)?;
                            printed += 1;
                        }
                    }
                    changed = status.changed() => {
                        if changed.is_err() {
                            break Ok(());
                        }
                        let current = status.borrow_and_update().clone();
                        if let (SyncPhase::Failed { .. }, Some(error)) = (current.phase, current.control.error) {
                            eprintln!("Refresh failed: {}", error.message);
                        }
                    }
                    _ = tokio::signal::ctrl_c() => break Ok(()),
                }
            };

            sync.shutdown();
            outcome
        }
        DashboardCommands::Transactions {
            kind,
            status,
            from,
            to,
            limit,
            page,
        } => {
            let filters = TransactionFilters {
                kind: kind.as_deref().map(parse_label).transpose()?,
                status: status.as_deref().map(parse_label).transpose()?,
                from,
                to,
                limit,
                page,
            };

            let sync = ctx.dashboard(false);
            let result = sync.fetch_transaction_history(&filters).await;
            sync.shutdown();
            output_transactions(&output_format, &result?)
        }
        DashboardCommands::Account { id } => {
            let sync = ctx.dashboard(false);
            let result = sync.fetch_account_details(&id).await;
            sync.shutdown();
            output_account(&output_format, &result?)
        }
    }
}

fn parse_label<T: DeserializeOwned>(label: &str) -> anyhow::Result<T> {
    serde_json::from_value(json!(label.to_lowercase()))
        .map_err(|_| anyhow::anyhow!("Unknown value '{}'", label))
}

fn output_snapshot(output_format: &OutputFormat, snapshot: &DashboardSnapshot) -> anyhow::Result<()> {
    match output_format {
        OutputFormat::Json => print_json(snapshot),
        OutputFormat::Text => {
            let stats = &snapshot.stats;
            println!("Dashboard at {}", snapshot.fetched_at.format("%Y-%m-%d %H:%M:%S UTC"));
            println!("Balance: {}", stats.total_balance);
            println!(
                "Deposits: {}  Withdrawals: {}  Profit: {}",
                stats.total_deposits, stats.total_withdrawals, stats.total_profit
            );
            println!(
                "Active accounts: {}  Pending transactions: {}",
                stats.active_accounts, stats.pending_transactions
            );

            if !snapshot.recent_transactions.is_empty() {
                println!();
                print_transaction_rows(&snapshot.recent_transactions);
            }
            if !snapshot.active_accounts.is_empty() {
                println!();
                println!("{:<15} {:<12} {:>14} {:<10}", "ACCOUNT", "TYPE", "BALANCE", "STATUS");
                println!("{}", "-".repeat(54));
                for account in &snapshot.active_accounts {
                    println!(
                        "{:<15} {:<12} {:>14} {:<10}",
                        account.account_number, account.account_type, account.balance, account.status
                    );
                }
            }
            Ok(())
        }
    }
}

fn output_transactions(output_format: &OutputFormat, rows: &[Transaction]) -> anyhow::Result<()> {
    match output_format {
        OutputFormat::Json => print_json(&json!({ "transactions": rows })),
        OutputFormat::Text => {
            if rows.is_empty() {
                println!("No transactions found");
            } else {
                print_transaction_rows(rows);
            }
            Ok(())
        }
    }
}

fn output_account(output_format: &OutputFormat, account: &Account) -> anyhow::Result<()> {
    match output_format {
        OutputFormat::Json => print_json(account),
        OutputFormat::Text => {
            println!("Account: {} ({})", account.account_number, account.id);
            println!("Type: {}", account.account_type);
            println!("Balance: {} {}", account.balance, account.currency);
            if let Some(equity) = account.equity {
                println!("Equity: {} {}", equity, account.currency);
            }
            if let Some(leverage) = account.leverage {
                println!("Leverage: 1:{}", leverage);
            }
            println!("Status: {}", account.status);
            Ok(())
        }
    }
}

fn print_transaction_rows(rows: &[Transaction]) {
    println!(
        "{:<20} {:<11} {:>14} {:<5} {:<10} {}",
        "ID", "TYPE", "AMOUNT", "CCY", "STATUS", "DATE"
    );
    println!("{}", "-".repeat(80));
    for tx in rows {
        let date = tx
            .created_at
            .map(|d| d.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_default();
        println!(
            "{:<20} {:<11} {:>14} {:<5} {:<10} {}",
            tx.id,
            format!("{:?}", tx.kind).to_lowercase(),
            tx.amount,
            tx.currency,
            format!("{:?}", tx.status).to_lowercase(),
            date
        );
    }
}
