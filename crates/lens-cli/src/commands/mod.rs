//! CLI command definitions and handlers.

pub mod ask;
pub mod collection;
pub mod embed;
pub mod graph;
pub mod ledger;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

use lens_core::LensConfig;

/// SchemaLens - schema knowledge graph and documentation retrieval
#[derive(Parser)]
#[command(name = "schemalens")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Configuration file (defaults to ./schemalens.toml when present)
    #[arg(short, long, global = true, env = "SCHEMALENS_CONFIG")]
    pub config: Option<PathBuf>,

    /// Also write logs to this file
    #[arg(long, global = true)]
    pub log: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Metadata ledger commands
    #[command(subcommand)]
    Ledger(ledger::LedgerCommands),

    /// Schema graph commands
    #[command(subcommand)]
    Graph(graph::GraphCommands),

    /// Documentation embedding commands
    #[command(subcommand)]
    Embed(embed::EmbedCommands),

    /// Vector collection administration
    #[command(subcommand)]
    Collection(collection::CollectionCommands),

    /// Ask a question about a connection's schema
    Ask(ask::AskArgs),
}

impl Cli {
    pub async fn execute(self) -> Result<()> {
        let config = LensConfig::load(self.config.as_deref())?;

        match self.command {
            Commands::Ledger(cmd) => ledger::execute(cmd, &config).await,
            Commands::Graph(cmd) => graph::execute(cmd, &config).await,
            Commands::Embed(cmd) => embed::execute(cmd, &config).await,
            Commands::Collection(cmd) => collection::execute(cmd, &config).await,
            Commands::Ask(args) => ask::execute(args, &config).await,
        }
    }
}
