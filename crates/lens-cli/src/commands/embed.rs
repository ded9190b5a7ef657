//! Documentation embedding commands.

use anyhow::{Result, bail};
use clap::Subcommand;
use colored::Colorize;

use lens_core::LensConfig;
use lens_embedding::EmbeddingPipeline;

use crate::output;
use crate::services;

#[derive(Subcommand)]
pub enum EmbedCommands {
    /// Embed every documentation chunk of a connection
    Run {
        /// Connection id
        connection: String,
    },

    /// Show how much of a connection's documentation is indexed
    Status {
        /// Connection id
        connection: String,
    },
}

pub async fn execute(cmd: EmbedCommands, config: &LensConfig) -> Result<()> {
    let ledger = services::ledger(config).await?;
    let vectors = services::vector_store(config)?;
    let admin = services::collection_admin(config, vectors);

    match cmd {
        EmbedCommands::Run { connection } => {
            let embedder = services::embedder(config);
            if !embedder.health_check().await.unwrap_or(false) {
                bail!("Ollama is not reachable at {}. Start it with: ollama serve", config.ollama.url);
            }

            let pipeline = EmbeddingPipeline::new(
                ledger,
                embedder,
                admin,
                config.ollama.dimension,
                config.pipeline.clone(),
            )
            .with_timeouts(config.timeouts.embed(), config.timeouts.vector());

            let spinner = output::spinner(&format!("Embedding documentation for {connection}"));
            let result = pipeline.run(&connection).await;
            spinner.finish_and_clear();

            let report = result?;
            output::print_embed_report(&report);

            if !report.is_complete() {
                bail!(
                    "{} of {} chunk(s) failed. Re-run to retry them.",
                    report.failed.len(),
                    report.failed.len() + report.succeeded.len()
                );
            }
            Ok(())
        }
        EmbedCommands::Status { connection } => {
            let status = lens_embedding::embedding_status(ledger.as_ref(), &connection).await?;
            let points = admin.count_for(&connection).await?;

            println!("{} {}", "Embedding status".bold(), connection.cyan());
            println!("{}", "─".repeat(40));
            println!("  Documented tables: {}", status.total.to_string().cyan());
            println!("  Embedded:          {}", status.embedded.to_string().cyan());
            println!("  Vector points:     {}", points.to_string().cyan());

            let state = if status.is_fully_embedded() {
                "complete".green()
            } else if status.total == 0 {
                "no documentation".yellow()
            } else {
                "incomplete".yellow()
            };
            println!("  State:             {}", state);
            println!("{}", "─".repeat(40));
            Ok(())
        }
    }
}
