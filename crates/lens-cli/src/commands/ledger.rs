//! Metadata ledger commands.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;
use tracing::warn;

use lens_core::LensConfig;
use lens_embedding::embedding_status;
use lens_ledger::{ImportFile, MetadataLedger, validate_snapshot};

use crate::output;
use crate::services;

#[derive(Subcommand)]
pub enum LedgerCommands {
    /// Load a connection's metadata snapshot from a JSON file
    Import {
        /// Path to the snapshot file
        file: PathBuf,
    },

    /// Show what the ledger holds
    Status {
        /// Connection id (all connections when omitted)
        connection: Option<String>,
    },
}

pub async fn execute(cmd: LedgerCommands, config: &LensConfig) -> Result<()> {
    let ledger = services::ledger(config).await?;

    match cmd {
        LedgerCommands::Import { file } => cmd_import(ledger.as_ref(), &file).await,
        LedgerCommands::Status { connection } => cmd_status(ledger.as_ref(), connection).await,
    }
}

async fn cmd_import(ledger: &dyn MetadataLedger, file: &Path) -> Result<()> {
    let text = tokio::fs::read_to_string(file)
        .await
        .with_context(|| format!("Failed to read {}", file.display()))?;

    let (snapshot, docs) = ImportFile::from_json(&text)?.into_records();
    let (snapshot, mut report) = validate_snapshot(snapshot)?;

    ledger.replace_snapshot(&snapshot).await?;

    let known: HashSet<&str> = snapshot.entities.iter().map(|e| e.name.as_str()).collect();
    for chunk in &docs {
        if !known.contains(chunk.entity_name.as_str()) {
            warn!(entity = %chunk.entity_name, "Skipping documentation for unknown entity");
            continue;
        }
        ledger.upsert_doc_chunk(chunk).await?;
        report.docs += 1;
    }

    println!("{} {}", "Imported".green().bold(), snapshot.connection_id.cyan());
    output::print_import_report(&report);

    Ok(())
}

async fn cmd_status(ledger: &dyn MetadataLedger, connection: Option<String>) -> Result<()> {
    let connections = match connection {
        Some(conn) => vec![conn],
        None => ledger.connections().await?,
    };

    let mut rows = Vec::with_capacity(connections.len());
    for conn in connections {
        let snapshot = ledger.snapshot(&conn).await?;
        let status = embedding_status(ledger, &conn).await?;
        rows.push(output::LedgerRow {
            connection_id: conn,
            entities: snapshot.entities.len(),
            fields: snapshot.fields.len(),
            relationships: snapshot.relationships.len(),
            docs: status.total,
            embedded: status.embedded,
        });
    }

    output::print_ledger_table(&rows);
    Ok(())
}
