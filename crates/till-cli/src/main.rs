//! Till CLI - Daily ledger and receipt console
//!
//! Usage:
//!   till init                            Initialize database
//!   till ledger add -c sales -a 120      Record an entry
//!   till summary --start 2024-03-01      Show daily summary rows
//!   till receipts upload receipt.jpg     Upload and extract a receipt
//!   till serve --port 3000               Start web server

mod cli;
mod commands;

#[cfg(test)]
mod tests;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cli::*;
use till_core::models::{ActivityFilter, Actor, DateRange, Role};
use till_core::reconcile::{DeletePolicy, TieBreak};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging
    // Priority: RUST_LOG env var > --verbose flag > default (info)
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).compact())
        .init();

    let actor = Actor::new(
        cli.as_user.as_str(),
        if cli.admin { Role::Admin } else { Role::Worker },
    );

    match cli.command {
        Commands::Init => commands::cmd_init(&cli.db, cli.no_encrypt),
        Commands::Serve {
            port,
            host,
            no_auth,
            static_dir,
        } => {
            commands::cmd_serve(
                &cli.db,
                &host,
                port,
                no_auth,
                cli.no_encrypt,
                static_dir.as_deref(),
            )
            .await
        }
        Commands::Ledger { action } => {
            let db = commands::open_db(&cli.db, cli.no_encrypt)?;
            match action {
                None => commands::cmd_ledger_list(&db, &DateRange::unbounded()),
                Some(LedgerAction::List { start, end }) => {
                    commands::cmd_ledger_list(&db, &DateRange { start, end })
                }
                Some(LedgerAction::Add {
                    category,
                    amount,
                    date,
                    description,
                    label,
                }) => commands::cmd_ledger_add(
                    &db,
                    &actor,
                    category,
                    amount,
                    date,
                    description,
                    label,
                ),
                Some(LedgerAction::Edit { id, patch }) => {
                    commands::cmd_ledger_edit(&db, &actor, id, patch.into_patch())
                }
                Some(LedgerAction::Delete { id }) => commands::cmd_ledger_delete(&db, &actor, id),
            }
        }
        Commands::Summary { start, end } => {
            let db = commands::open_db(&cli.db, cli.no_encrypt)?;
            commands::cmd_summary(&db, &DateRange { start, end })
        }
        Commands::Row { action } => {
            let db = commands::open_db(&cli.db, cli.no_encrypt)?;
            match action {
                RowAction::Resolve { key } => commands::cmd_row_resolve(&db, &key.key()),
                RowAction::Edit {
                    key,
                    patch,
                    earliest,
                } => {
                    let tie_break = if earliest {
                        TieBreak::EarliestCreated
                    } else {
                        TieBreak::Reject
                    };
                    commands::cmd_row_edit(&db, &actor, &key.key(), &patch.into_patch(), tie_break)
                }
                RowAction::Delete {
                    key,
                    continue_on_failure,
                } => {
                    let policy = if continue_on_failure {
                        DeletePolicy::ContinueOnFailure
                    } else {
                        DeletePolicy::StopOnFirstFailure
                    };
                    commands::cmd_row_delete(&db, &actor, &key.key(), policy)
                }
            }
        }
        Commands::Receipts { action } => {
            let db = commands::open_db(&cli.db, cli.no_encrypt)?;
            match action {
                None | Some(ReceiptsAction::List) => commands::cmd_receipts_list(&db, &actor),
                Some(ReceiptsAction::Search { query }) => {
                    commands::cmd_receipts_search(&db, &actor, &query)
                }
                Some(ReceiptsAction::Upload { file }) => {
                    commands::cmd_receipts_upload(&db, &actor, &file).await
                }
                Some(ReceiptsAction::Confirm {
                    id,
                    merchant,
                    date,
                    amount,
                    category,
                    label,
                }) => commands::cmd_receipts_confirm(
                    &db,
                    &actor,
                    id,
                    commands::FormOverrides {
                        merchant,
                        date,
                        amount,
                        category,
                        label,
                    },
                ),
            }
        }
        Commands::Reimbursements { action } => {
            let db = commands::open_db(&cli.db, cli.no_encrypt)?;
            match action {
                None | Some(ReimbursementsAction::List) => {
                    commands::cmd_reimbursements_list(&db, &actor)
                }
                Some(ReimbursementsAction::Pending) => {
                    commands::cmd_reimbursements_pending(&db, &actor)
                }
                Some(ReimbursementsAction::Request {
                    amount,
                    date,
                    description,
                    notes,
                }) => commands::cmd_reimbursements_request(
                    &db,
                    &actor,
                    amount,
                    date,
                    description,
                    notes,
                ),
                Some(ReimbursementsAction::Approve { id }) => {
                    commands::cmd_reimbursements_approve(&db, &actor, id)
                }
                Some(ReimbursementsAction::Reject { id }) => {
                    commands::cmd_reimbursements_reject(&db, &actor, id)
                }
            }
        }
        Commands::Inventory { action } => {
            let db = commands::open_db(&cli.db, cli.no_encrypt)?;
            match action {
                None | Some(InventoryAction::List) => commands::cmd_inventory_list(&db),
                Some(InventoryAction::Add {
                    name,
                    quantity,
                    unit,
                }) => commands::cmd_inventory_add(&db, &actor, &name, quantity, unit.as_deref()),
                Some(InventoryAction::Set { id, quantity }) => {
                    commands::cmd_inventory_set(&db, &actor, id, quantity)
                }
                Some(InventoryAction::Remove { id }) => {
                    commands::cmd_inventory_remove(&db, &actor, id)
                }
            }
        }
        Commands::Activity {
            actor: by,
            entity_type,
            limit,
        } => {
            let db = commands::open_db(&cli.db, cli.no_encrypt)?;
            commands::cmd_activity(
                &db,
                &actor,
                &ActivityFilter {
                    actor: by,
                    entity_type,
                    limit: Some(limit),
                },
            )
        }
    }
}
