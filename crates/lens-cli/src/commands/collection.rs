//! Vector collection administration.

use anyhow::{Result, bail};
use clap::Subcommand;
use colored::Colorize;

use lens_core::LensConfig;

use crate::output;
use crate::services;

#[derive(Subcommand)]
pub enum CollectionCommands {
    /// Create the collection and its connection index if missing
    Create,

    /// Create the payload index on connection_id
    Index,

    /// Delete the collection and every point in it
    Flush {
        /// Confirm deletion
        #[arg(long)]
        yes: bool,
    },

    /// Show collection details
    Info,
}

pub async fn execute(cmd: CollectionCommands, config: &LensConfig) -> Result<()> {
    let admin = services::collection_admin(config, services::vector_store(config)?);

    match cmd {
        CollectionCommands::Create => {
            admin.create().await?;
            println!("{} {}", "Collection ready:".green().bold(), admin.name().cyan());
        }
        CollectionCommands::Index => {
            admin.create_index().await?;
            println!("{} {}", "Payload index ready on".green().bold(), admin.name().cyan());
        }
        CollectionCommands::Flush { yes } => {
            if !yes {
                bail!(
                    "Flushing deletes every embedded chunk in '{}'. Pass --yes to confirm.",
                    admin.name()
                );
            }
            if admin.flush().await? {
                println!("{} {}", "Deleted collection".yellow().bold(), admin.name().cyan());
                println!("{}", "Re-embed each connection with: schemalens embed run <connection>".dimmed());
            } else {
                println!("{}", format!("Collection '{}' did not exist.", admin.name()).dimmed());
            }
        }
        CollectionCommands::Info => {
            let info = admin.info().await?;
            output::print_collection_info(&info, config.ollama.dimension);
        }
    }

    Ok(())
}
