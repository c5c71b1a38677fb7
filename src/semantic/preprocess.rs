//! Query preprocessing before embedding:
//! 1. Trim and collapse whitespace
//! 2. Reject if empty
//! 3. Truncate to `MAX_QUERY_CHARS` characters
//! 4. Optionally rewrite through the completion model (enrichment)

use crate::llm::{CompletionClient, CompletionError, CompletionRequest, Message};
use crate::matching::prompts::QUERY_ENRICHMENT_PROMPT;

/// Maximum query length in characters (not bytes, not tokens)
pub const MAX_QUERY_CHARS: usize = 4000;

/// Returns `None` if nothing but whitespace is left.
pub fn normalize_query(raw: &str) -> Option<String> {
    let collapsed = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.is_empty() {
        return None;
    }

    Some(truncate_chars(&collapsed, MAX_QUERY_CHARS))
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((byte_pos, _)) => text[..byte_pos].to_string(),
        None => text.to_string(),
    }
}

/// Asks the model to expand the query with domain keywords.
///
/// An empty answer keeps the input text. Service failures are returned
/// to the caller unchanged.
pub fn enrich_query(
    client: &dyn CompletionClient,
    query: &str,
) -> Result<String, CompletionError> {
    let request = CompletionRequest::new(vec![
        Message::system(QUERY_ENRICHMENT_PROMPT),
        Message::user(query),
    ]);

    let answer = client.complete(&request)?;
    match normalize_query(&answer) {
        Some(enriched) => Ok(enriched),
        None => {
            log::debug!("enrichment returned nothing, using query as is");
            Ok(query.to_string())
        }
    }
}
