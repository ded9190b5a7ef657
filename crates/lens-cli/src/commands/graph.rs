//! Schema graph CLI commands.

use std::sync::Arc;

use anyhow::{Result, bail};
use clap::Subcommand;
use colored::Colorize;

use lens_core::LensConfig;
use lens_graph::analytics;
use lens_graph::{GraphStore, GraphSynchronizer, Neo4jGraphStore, initialize_schema};

use crate::output;
use crate::services;

#[derive(Subcommand)]
pub enum GraphCommands {
    /// Rebuild the graph projection of a connection from the ledger
    Sync {
        /// Connection id
        #[arg(required_unless_present = "all", conflicts_with = "all")]
        connection: Option<String>,

        /// Sync every connection in the ledger
        #[arg(long)]
        all: bool,
    },

    /// Show node and edge counts for a connection
    Status {
        /// Connection id
        connection: String,
    },

    /// Structural health: isolated tables, hubs, reference depth
    Analyze {
        /// Connection id
        connection: String,

        /// Degree above which a table counts as a hub
        #[arg(long)]
        hub_threshold: Option<usize>,
    },

    /// Tables reachable through foreign keys from the given tables
    Impact {
        /// Connection id
        connection: String,

        /// Starting tables
        #[arg(required = true)]
        entities: Vec<String>,
    },

    /// Shortest join path between two tables
    Path {
        /// Connection id
        connection: String,
        /// From table
        from: String,
        /// To table
        to: String,
    },

    /// Columns and neighbours of a table
    Schema {
        /// Connection id
        connection: String,
        /// Table name
        entity: String,
    },
}

pub async fn execute(cmd: GraphCommands, config: &LensConfig) -> Result<()> {
    let store = services::graph_store(config).await?;

    match cmd {
        GraphCommands::Sync { connection, all } => cmd_sync(config, store, connection, all).await,
        GraphCommands::Status { connection } => cmd_status(store.as_ref(), &connection).await,
        GraphCommands::Analyze {
            connection,
            hub_threshold,
        } => {
            let threshold = hub_threshold.unwrap_or(config.retrieval.hub_threshold);
            cmd_analyze(store.as_ref(), &connection, threshold).await
        }
        GraphCommands::Impact { connection, entities } => {
            cmd_impact(store.as_ref(), &connection, &entities).await
        }
        GraphCommands::Path { connection, from, to } => {
            cmd_path(store.as_ref(), &connection, &from, &to).await
        }
        GraphCommands::Schema { connection, entity } => {
            cmd_schema(store.as_ref(), &connection, &entity).await
        }
    }
}

async fn cmd_sync(
    config: &LensConfig,
    store: Arc<Neo4jGraphStore>,
    connection: Option<String>,
    all: bool,
) -> Result<()> {
    println!("{}", "Syncing schema graph...".bold());

    initialize_schema(store.client()).await?;

    let ledger = services::ledger(config).await?;
    let synchronizer = GraphSynchronizer::new(ledger, store);

    if !all {
        let Some(conn) = connection else {
            bail!("Pass a connection id or --all");
        };
        let report = synchronizer.sync_connection(&conn).await?;
        output::print_sync_report(&report);
        return Ok(());
    }

    let results = synchronizer.sync_all().await?;
    if results.is_empty() {
        println!("{}", "No connections in the ledger.".dimmed());
        return Ok(());
    }

    let mut failed = 0;
    for (conn, result) in results {
        match result {
            Ok(report) => output::print_sync_report(&report),
            Err(e) => {
                failed += 1;
                println!("{} {}: {}", "✗".red(), conn.cyan(), e);
            }
        }
    }

    if failed > 0 {
        bail!("{} connection(s) failed to sync", failed);
    }
    Ok(())
}

async fn cmd_status(store: &dyn GraphStore, connection: &str) -> Result<()> {
    let counts = store.counts(connection).await?;
    output::print_graph_counts(connection, &counts);
    Ok(())
}

async fn cmd_analyze(store: &dyn GraphStore, connection: &str, threshold: usize) -> Result<()> {
    let graph = store.entity_graph(connection).await?;
    if graph.entities.is_empty() {
        bail!("No graph for connection '{}'. Run: schemalens graph sync {}", connection, connection);
    }

    let report = analytics::structural_report(&graph, threshold);
    output::print_structural_report(&report);
    Ok(())
}

async fn cmd_impact(store: &dyn GraphStore, connection: &str, entities: &[String]) -> Result<()> {
    let graph = store.entity_graph(connection).await?;

    let unknown: Vec<&str> = entities
        .iter()
        .filter(|e| !graph.entities.contains(e))
        .map(String::as_str)
        .collect();
    if !unknown.is_empty() {
        bail!("Unknown table(s) in '{}': {}", connection, unknown.join(", "));
    }

    let report = analytics::impact(&graph, entities);
    output::print_impact(&report);
    Ok(())
}

async fn cmd_path(store: &dyn GraphStore, connection: &str, from: &str, to: &str) -> Result<()> {
    let graph = store.entity_graph(connection).await?;

    match analytics::join_path(&graph, from, to) {
        Some(path) => {
            println!("{} {} {} {}", "Join path".bold(), from.cyan(), "→".dimmed(), to.cyan());
            println!("  {}", path.join(" → "));
            println!("  {} hop(s)", path.len().saturating_sub(1));
        }
        None => println!("{}", format!("No path between {from} and {to}.").dimmed()),
    }
    Ok(())
}

async fn cmd_schema(store: &dyn GraphStore, connection: &str, entity: &str) -> Result<()> {
    let columns = store.entity_schema(connection, entity).await?;
    if columns.is_empty() {
        bail!("Table '{}' not found in the graph of '{}'", entity, connection);
    }

    let graph = store.entity_graph(connection).await?;
    let related = analytics::related_entities(&graph, entity);

    output::print_entity_schema(entity, &columns, &related);
    Ok(())
}
