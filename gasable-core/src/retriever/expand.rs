//! Step 2 of the pipeline (spec §4.3): query expansion. Primary path asks
//! the chat model for rewrites/translations as a strict JSON array;
//! fallback path is deterministic so expansion never blocks on the LLM.

use crate::llm::{ChatClient, ChatMessage};

const DOMAIN_SYNONYMS: &[(&[&str], &[&str])] = &[
    (&["ev", "charging"], &["electric vehicle", "OCPP", "type 2"]),
    (&["delivery", "diesel"], &["on-demand delivery", "mobile refueling"]),
];

/// Asks the chat model for up to `max_rewrites` alternate phrasings of
/// `query`, strictly as a JSON array of strings. Returns `None` on any
/// failure (disabled client, non-JSON reply, empty list) so the caller
/// falls through to [`deterministic_expand`].
pub async fn llm_expand(
    chat: &dyn ChatClient,
    model: &str,
    query: &str,
    max_rewrites: usize,
) -> Option<Vec<String>> {
    if max_rewrites == 0 {
        return None;
    }
    let prompt = format!(
        "Rewrite the following search query in up to {max_rewrites} alternate ways \
         (translations, synonyms, rephrasings). Respond with ONLY a JSON array of \
         strings, no prose, no markdown fences.\n\nQuery: {query}"
    );
    let reply = chat
        .chat(model, vec![ChatMessage::User(prompt)], None)
        .await
        .ok()?;
    let content = reply.content?;
    let rewrites: Vec<String> = serde_json::from_str(content.trim()).ok()?;
    if rewrites.is_empty() {
        return None;
    }
    Some(rewrites.into_iter().take(max_rewrites).collect())
}

/// Deterministic fallback: original query, reversed token order,
/// suffix-stripped forms, and domain-synonym augmentation.
pub fn deterministic_expand(query: &str, max_total: usize) -> Vec<String> {
    let mut out = vec![query.to_string()];

    let tokens: Vec<&str> = query.split_whitespace().collect();
    if tokens.len() > 1 {
        let reversed: Vec<&str> = tokens.iter().rev().copied().collect();
        out.push(reversed.join(" "));
    }

    let stripped: Vec<String> = tokens.iter().map(|t| strip_suffix(t)).collect();
    if stripped.iter().zip(tokens.iter()).any(|(s, t)| s != t) {
        out.push(stripped.join(" "));
    }

    let normalized = query.to_ascii_lowercase();
    let normalized_tokens: Vec<&str> = normalized.split_whitespace().collect();
    for (triggers, synonyms) in DOMAIN_SYNONYMS {
        if triggers.iter().all(|t| normalized_tokens.contains(t)) {
            out.push(synonyms.join(", "));
        }
    }

    dedupe_preserve_order(out, max_total.max(1))
}

fn strip_suffix(token: &str) -> String {
    for suffix in ["ing", "s"] {
        if let Some(stem) = token.strip_suffix(suffix) {
            if stem.len() >= 3 {
                return stem.to_string();
            }
        }
    }
    token.to_string()
}

fn dedupe_preserve_order(items: Vec<String>, max_total: usize) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    let mut out = Vec::new();
    for item in items {
        let key = item.to_ascii_lowercase();
        if seen.insert(key) {
            out.push(item);
        }
        if out.len() >= max_total {
            break;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn includes_original_first() {
        let expansions = deterministic_expand("fleet diesel delivery", 4);
        assert_eq!(expansions[0], "fleet diesel delivery");
    }

    #[test]
    fn caps_at_max_total() {
        let expansions = deterministic_expand("ev charging stations near me", 2);
        assert_eq!(expansions.len(), 2);
    }

    #[test]
    fn dedupes_case_insensitively() {
        let expansions = dedupe_preserve_order(
            vec!["Foo".to_string(), "foo".to_string(), "bar".to_string()],
            10,
        );
        assert_eq!(expansions, vec!["Foo".to_string(), "bar".to_string()]);
    }

    #[test]
    fn adds_domain_synonyms_for_ev_charging() {
        let expansions = deterministic_expand("ev charging network", 10);
        assert!(expansions.iter().any(|e| e.contains("OCPP")));
    }

    #[test]
    fn single_token_query_has_no_reversal() {
        let expansions = deterministic_expand("diesel", 10);
        assert_eq!(expansions.len(), 1);
    }
}
