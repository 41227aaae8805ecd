//! Folds ranked retrieval matches into a bounded context string.

use super::index::RetrievalResult;

/// Formats matches in ranked order with their source row, stopping before
/// the context exceeds `max_chars`.
pub fn build_context(result: &RetrievalResult, max_chars: usize) -> String {
    let mut context = String::new();

    for (i, scored) in result.matches.iter().enumerate() {
        let block = format!(
            "[{}] (row {}, relevance: {:.2})\n{}\n\n",
            i + 1,
            scored.document.id,
            scored.score,
            scored.document.text
        );
        if context.len() + block.len() > max_chars {
            break;
        }
        context.push_str(&block);
    }

    context.trim_end().to_string()
}
