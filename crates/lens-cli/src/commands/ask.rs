//! Question answering over a connection's schema.

use std::sync::Arc;

use anyhow::Result;
use clap::Args;
use colored::Colorize;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use lens_core::{LensConfig, LensError};
use lens_rag::{Answer, ChatTurn, HybridRetriever, INSUFFICIENT_CONTEXT, OllamaChat, RetrievalResult};

use crate::output;
use crate::services;

#[derive(Args)]
pub struct AskArgs {
    /// Connection id
    pub connection: String,

    /// Question (omit with --chat)
    #[arg(required_unless_present = "chat")]
    pub question: Option<String>,

    /// Keep asking from stdin, carrying the conversation forward
    #[arg(long)]
    pub chat: bool,

    /// Number of documentation chunks to retrieve
    #[arg(long)]
    pub top_k: Option<u64>,

    /// Print the full result as JSON
    #[arg(long)]
    pub json: bool,
}

pub async fn execute(args: AskArgs, config: &LensConfig) -> Result<()> {
    let retriever = build_retriever(config, args.top_k).await?;

    if let Some(question) = &args.question {
        let result = retriever.ask(question, &args.connection, &[]).await?;
        return print_result(&result, args.json);
    }

    chat_loop(&retriever, &args.connection, args.json).await
}

async fn build_retriever(config: &LensConfig, top_k: Option<u64>) -> Result<HybridRetriever> {
    let mut retrieval = config.retrieval.clone();
    if let Some(k) = top_k {
        retrieval.top_k = k;
    }

    let chat = OllamaChat::from_settings(&config.ollama, config.timeouts.llm());
    let graph = services::graph_store(config).await?;

    Ok(HybridRetriever::new(
        services::embedder(config),
        services::vector_store(config)?,
        graph,
        Arc::new(chat),
        &config.qdrant.collection,
        config.ollama.dimension,
    )
    .with_settings(retrieval, config.timeouts.clone()))
}

fn print_result(result: &RetrievalResult, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(result)?);
    } else {
        output::print_answer(result);
    }
    Ok(())
}

async fn chat_loop(retriever: &HybridRetriever, connection: &str, json: bool) -> Result<()> {
    println!("{} {} {}", "Chatting about".bold(), connection.cyan(), "(empty line to quit)".dimmed());

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();
    let mut history: Vec<ChatTurn> = Vec::new();

    loop {
        stdout.write_all(b"> ").await?;
        stdout.flush().await?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let question = line.trim();
        if question.is_empty() {
            break;
        }

        match retriever.ask(question, connection, &history).await {
            Ok(result) => {
                print_result(&result, json)?;
                let reply = match &result.answer {
                    Answer::Grounded(text) => text.clone(),
                    Answer::InsufficientContext => INSUFFICIENT_CONTEXT.to_string(),
                };
                history.push(ChatTurn::user(question));
                history.push(ChatTurn::assistant(reply));
            }
            Err(e @ LensError::NoRelevantContext(_)) => println!("{}", e.to_string().yellow()),
            Err(e) if e.is_retryable() => println!("{} {}", "Temporary failure:".yellow(), e),
            Err(e) => return Err(e.into()),
        }
    }

    Ok(())
}
