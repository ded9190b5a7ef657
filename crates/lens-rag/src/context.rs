//! Prompt and context assembly.

use lens_embedding::SearchHit;

/// Reply the model is told to give when the context cannot answer the question.
pub const INSUFFICIENT_CONTEXT: &str = "INSUFFICIENT_CONTEXT";

pub const SYSTEM_PROMPT: &str = "You are a database intelligence assistant.

Answer only from the context below: the documentation of the tables and the \
foreign key relationships read from the schema graph. Do not hallucinate \
tables, columns or relationships that are not in the context.

If the context does not contain enough information to answer, reply with \
exactly INSUFFICIENT_CONTEXT and nothing else.";

const DOC_SEPARATOR: &str = "\n\n---\n\n";
const TRUNCATED: &str = "\n[truncated]";

/// Whether the model declined to answer from the given context.
pub fn is_insufficient(answer: &str) -> bool {
    answer.trim().trim_matches('.').eq_ignore_ascii_case(INSUFFICIENT_CONTEXT)
}

/// Documentation blocks followed by the relation list, within `budget` chars.
///
/// Relation lines are never cut: those that do not fit are dropped and
/// counted in an omission line. The documentation is cut to fit around them.
pub fn build_context(hits: &[SearchHit], relations: &[String], budget: usize) -> String {
    let header = "DOCUMENTATION:\n";
    let docs = hits
        .iter()
        .map(|h| h.content.as_str())
        .collect::<Vec<_>>()
        .join(DOC_SEPARATOR);

    let graph = relation_block(relations, budget.saturating_sub(header.len()));
    let reserved = if graph.is_empty() { 0 } else { graph.chars().count() + 2 };
    let room = budget.saturating_sub(reserved + header.len());

    let mut out = format!("{header}{}", truncate(&docs, room));
    if !graph.is_empty() {
        out.push_str("\n\n");
        out.push_str(&graph);
    }
    out
}

/// `GRAPH RELATIONSHIPS:` with as many whole lines as fit in `room` chars.
fn relation_block(relations: &[String], room: usize) -> String {
    const TITLE: &str = "GRAPH RELATIONSHIPS:";
    if relations.is_empty() {
        return String::new();
    }

    let mut block = TITLE.to_string();
    let mut used = TITLE.len() + 2;
    for (kept, relation) in relations.iter().enumerate() {
        let line = format!("\n- {relation}");
        let rest = relations.len() - kept - 1;
        let tail = if rest == 0 { 0 } else { omitted_line(rest).chars().count() };
        if used + line.chars().count() + tail > room {
            let note = omitted_line(relations.len() - kept);
            if kept == 0 && used + note.chars().count() > room {
                return String::new();
            }
            block.push_str(&note);
            return block;
        }
        used += line.chars().count();
        block.push_str(&line);
    }
    block
}

fn omitted_line(count: usize) -> String {
    format!("\n[{count} more relations omitted]")
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    if max_chars <= TRUNCATED.len() {
        return text.chars().take(max_chars).collect();
    }
    let keep = max_chars - TRUNCATED.len();
    let mut cut: String = text.chars().take(keep).collect();
    cut.push_str(TRUNCATED);
    cut
}
