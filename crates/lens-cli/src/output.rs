//! Terminal output formatting.

use std::time::Duration;

use colored::{ColoredString, Colorize};
use indicatif::{ProgressBar, ProgressStyle};

use lens_embedding::{CollectionInfo, EmbedReport};
use lens_graph::analytics::HealthStatus;
use lens_graph::{ColumnInfo, GraphCounts, ImpactReport, OrphanReason, StructuralReport, SyncReport};
use lens_ledger::ImportReport;
use lens_rag::{Answer, RetrievalResult};

/// One line of `ledger status`.
pub struct LedgerRow {
    pub connection_id: String,
    pub entities: usize,
    pub fields: usize,
    pub relationships: usize,
    pub docs: usize,
    pub embedded: usize,
}

/// Spinner on stderr for long-running calls.
pub fn spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner().with_style(
        ProgressStyle::with_template("{spinner} {msg} [{elapsed}]")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

pub fn print_import_report(report: &ImportReport) {
    println!("  Entities:      {}", report.entities.to_string().cyan());
    println!("  Fields:        {}", report.fields.to_string().cyan());
    println!("  Relationships: {}", report.relationships.to_string().cyan());
    println!("  Docs:          {}", report.docs.to_string().cyan());

    if !report.rejected_relationships.is_empty() {
        println!("\n{} ({}):", "Rejected relationships".yellow(), report.rejected_relationships.len());
        for rel in &report.rejected_relationships {
            println!("  {} {}", "•".dimmed(), rel);
        }
    }
}

/// Print ledger connections as a table.
pub fn print_ledger_table(rows: &[LedgerRow]) {
    if rows.is_empty() {
        println!("{}", "No connections in the ledger.".dimmed());
        return;
    }

    println!(
        "{:<24} {:>8} {:>8} {:>8} {:>8} {:>10}",
        "Connection", "Tables", "Columns", "FKs", "Docs", "Embedded"
    );
    println!("{}", "-".repeat(72));

    for row in rows {
        let embedded = format!("{}/{}", row.embedded, row.docs);
        let embedded = if row.docs > 0 && row.embedded == row.docs {
            embedded.green()
        } else {
            embedded.yellow()
        };
        println!(
            "{:<24} {:>8} {:>8} {:>8} {:>8} {:>10}",
            truncate(&row.connection_id, 22),
            row.entities,
            row.fields,
            row.relationships,
            row.docs,
            embedded
        );
    }
}

pub fn print_sync_report(report: &SyncReport) {
    println!(
        "\n{} {} {}",
        "Synced".green().bold(),
        report.connection_id.cyan(),
        format!("({} ms)", report.elapsed_ms).dimmed()
    );
    println!("  Tables:             {}", report.entities);
    println!("  Columns:            {}", report.fields);
    println!("  Column references:  {}", report.field_references);
    println!("  Table references:   {}", report.entity_references);

    if !report.orphaned.is_empty() {
        println!("\n{} ({}):", "Skipped relationships".yellow(), report.orphaned.len());
        for orphan in &report.orphaned {
            let reason = match orphan.reason {
                OrphanReason::SourceUnresolved => "source column missing",
                OrphanReason::TargetUnresolved => "target column missing",
            };
            println!(
                "  {} {} -> {} {}",
                "•".dimmed(),
                orphan.source_field_id,
                orphan.target_field_id,
                format!("({reason})").dimmed()
            );
        }
    }

    if !report.skipped_fields.is_empty() {
        println!("\n{} ({}):", "Skipped columns".yellow(), report.skipped_fields.len());
        for field in &report.skipped_fields {
            println!("  {} {}", "•".dimmed(), field);
        }
    }
}

pub fn print_graph_counts(connection: &str, counts: &GraphCounts) {
    println!("{} {}", "Schema Graph Status".bold(), connection.cyan());
    println!("{}", "─".repeat(40));
    println!("  Tables:            {}", counts.entities.to_string().cyan());
    println!("  Columns:           {}", counts.fields.to_string().cyan());
    println!("  HAS_FIELD:         {}", counts.has_field.to_string().cyan());
    println!("  REFERENCES_FIELD:  {}", counts.references_field.to_string().cyan());
    println!("  REFERENCES:        {}", counts.references.to_string().cyan());
    println!("{}", "─".repeat(40));
}

fn status_colored(status: HealthStatus) -> ColoredString {
    match status {
        HealthStatus::Good => status.to_string().green().bold(),
        HealthStatus::Warning => status.to_string().yellow().bold(),
        HealthStatus::Critical => status.to_string().red().bold(),
    }
}

pub fn print_structural_report(report: &StructuralReport) {
    println!("{} {}", "Structural analysis".bold(), report.connection_id.cyan());
    println!("{}", "─".repeat(50));
    println!("  Tables:        {}", report.entities);
    println!("  Max FK depth:  {}", report.max_depth);
    println!("  Health:        {} {}", report.score, status_colored(report.status));

    if report.isolated.is_empty() {
        println!("\n{}", "No isolated tables.".dimmed());
    } else {
        println!("\n{} ({}):", "Isolated tables".yellow(), report.isolated.len());
        for name in &report.isolated {
            println!("  {} {}", "•".dimmed(), name);
        }
    }

    if report.hubs.is_empty() {
        println!("{}", "No hub tables.".dimmed());
    } else {
        println!("\n{} ({}):", "Hub tables".yellow(), report.hubs.len());
        for hub in &report.hubs {
            println!("  {} {} {}", "•".dimmed(), hub.name, format!("(degree {})", hub.degree).dimmed());
        }
    }
}

pub fn print_impact(report: &ImpactReport) {
    println!("{} {}", "Impact analysis for".bold(), report.seeds.join(", ").cyan());
    println!("{}", "─".repeat(50));

    if report.affected.is_empty() {
        println!("{}", "No dependent tables found.".dimmed());
        return;
    }

    for entity in &report.affected {
        println!(
            "  {} {} {}",
            "→".dimmed(),
            entity.name,
            format!("({} hop{})", entity.hops, if entity.hops == 1 { "" } else { "s" }).dimmed()
        );
    }
    println!(
        "\n{} tables affected, up to {} hops away.",
        report.affected.len().to_string().bold(),
        report.max_hops
    );
}

pub fn print_entity_schema(entity: &str, columns: &[ColumnInfo], related: &[String]) {
    println!("{} {}", "Table".bold(), entity.cyan().bold());
    println!();
    println!("{:<28} {:<18} {:<6} {:<4} {}", "Column", "Type", "Null", "Key", "References");
    println!("{}", "-".repeat(80));

    for col in columns {
        let key = if col.is_primary_key {
            "PK".yellow()
        } else if col.is_foreign_key {
            "FK".blue()
        } else {
            "".normal()
        };
        println!(
            "{:<28} {:<18} {:<6} {:<4} {}",
            truncate(&col.name, 26),
            truncate(&col.data_type, 16),
            if col.is_nullable { "yes" } else { "no" },
            key,
            col.references.as_deref().unwrap_or("").dimmed()
        );
    }

    if !related.is_empty() {
        println!("\n{} {}", "Related:".bold(), related.join(", "));
    }
}

pub fn print_embed_report(report: &EmbedReport) {
    let total = report.succeeded.len() + report.failed.len();
    let header = if report.is_complete() {
        "Embedding complete".green().bold()
    } else {
        "Embedding finished with failures".yellow().bold()
    };
    println!(
        "{} {} {}",
        header,
        report.connection_id.cyan(),
        format!("({} ms)", report.elapsed_ms).dimmed()
    );
    println!("  Embedded: {}/{}", report.succeeded.len(), total);

    for failure in &report.failed {
        println!("  {} {}: {}", "✗".red(), failure.entity, failure.error.dimmed());
    }
}

pub fn print_collection_info(info: &CollectionInfo, expected_dimension: usize) {
    println!("{} {}", "Collection".bold(), info.name.cyan());
    println!("{}", "─".repeat(40));

    if !info.exists {
        println!("  {}", "missing".yellow());
        println!("{}", "Create it with: schemalens collection create".dimmed());
        return;
    }

    let dimension = match info.dimension {
        Some(d) if d == expected_dimension => d.to_string().green(),
        Some(d) => format!("{d} (configured {expected_dimension})").red(),
        None => "unknown".dimmed(),
    };
    let indexed = if info.indexed_fields.is_empty() {
        "none".yellow()
    } else {
        info.indexed_fields.join(", ").normal()
    };

    println!("  Points:     {}", info.points.to_string().cyan());
    println!("  Dimension:  {}", dimension);
    println!("  Indexes:    {}", indexed);
    println!("{}", "─".repeat(40));
}

pub fn print_answer(result: &RetrievalResult) {
    match &result.answer {
        Answer::Grounded(text) => println!("{}", text),
        Answer::InsufficientContext => println!(
            "{}",
            "The retrieved documentation does not answer this question.".yellow()
        ),
    }

    if !result.hits.is_empty() {
        let sources: Vec<String> = result
            .hits
            .iter()
            .map(|h| format!("{} ({:.2})", h.entity, h.score))
            .collect();
        println!("\n{} {}", "Sources:".dimmed(), sources.join(", ").dimmed());
    }
    if !result.impact.affected.is_empty() {
        let names: Vec<&str> = result.impact.affected.iter().map(|e| e.name.as_str()).collect();
        println!("{} {}", "Downstream:".dimmed(), names.join(", ").dimmed());
    }
}

/// Truncate to `max` characters, ending with "..." when cut.
pub fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let kept: String = s.chars().take(max.saturating_sub(3)).collect();
    format!("{kept}...")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_keeps_short_strings() {
        assert_eq!(truncate("orders", 10), "orders");
    }

    #[test]
    fn test_truncate_counts_chars_not_bytes() {
        assert_eq!(truncate("pedidos_não_pagos", 10), "pedidos...");
        assert_eq!(truncate("pedidos_não_pagos", 10).chars().count(), 10);
    }
}
