//! Step 8–9 (spec §4.3): additive domain/noise/intent/overlap boosts and
//! the candidate filter applied before optional rerank and MMR.

const NOISE_MARKERS: &[&str] = &["market_analysis", "certificate", "gmail", "mail-", "incident", "audit"];
const EV_TOKENS: &[&str] = &["ev", "electric", "charging", "ocpp"];
const DELIVERY_TOKENS: &[&str] = &["delivery", "diesel", "refuel", "refueling"];

pub const NOISE_PENALTY_CAP: f64 = 0.9;

/// Tokens of 3+ chars, lowercased; used by overlap scoring and MMR's
/// Jaccard similarity alike.
pub fn tokenize(text: &str) -> std::collections::HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.len() >= 3)
        .map(|t| t.to_ascii_lowercase())
        .collect()
}

fn is_ev_intent(query_tokens: &std::collections::HashSet<String>) -> bool {
    EV_TOKENS.iter().any(|t| query_tokens.contains(*t))
}

/// Applies the boost/penalty stack to a fused `(id, score)` list in place
/// and re-sorts descending, ties broken by id. `text_by_id` supplies the
/// document text for intent/overlap scoring where known.
pub fn apply_boosts(
    mut candidates: Vec<(String, f64)>,
    query: &str,
    text_by_id: &std::collections::HashMap<String, String>,
    prefer_domain_boost: Option<&str>,
) -> Vec<(String, f64)> {
    let query_tokens = tokenize(query);
    let ev_intent = is_ev_intent(&query_tokens);

    for (id, score) in candidates.iter_mut() {
        if let Some(prefix) = prefer_domain_boost {
            if id.starts_with(prefix) {
                *score += 0.5;
            } else if prefix.starts_with("web://") && id.starts_with("web://") {
                *score += 0.25;
            }
        }

        let text = text_by_id.get(id).map(|s| s.as_str()).unwrap_or_default();
        let haystack = format!("{id} {text}").to_ascii_lowercase();
        let mut penalty: f64 = 0.0;
        for marker in NOISE_MARKERS {
            if haystack.contains(marker) {
                penalty += 0.2;
            }
        }
        *score -= penalty.min(NOISE_PENALTY_CAP);

        if ev_intent && EV_TOKENS.iter().any(|t| haystack.contains(t)) {
            *score += 0.2;
        }
        if DELIVERY_TOKENS.iter().any(|t| query_tokens.contains(*t)) && DELIVERY_TOKENS.iter().any(|t| haystack.contains(t)) {
            *score += 0.15;
        }

        let doc_tokens = tokenize(text);
        let overlap = query_tokens.intersection(&doc_tokens).count();
        if !query_tokens.is_empty() {
            *score += 0.1 * (overlap as f64 / query_tokens.len() as f64);
        }
    }

    candidates.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap().then_with(|| a.0.cmp(&b.0)));
    candidates
}

/// Drops candidates with fewer than the required query-token overlap count
/// (1 for general queries, 2 for EV-intent queries), unless doing so would
/// leave fewer than `min_pool` candidates — in which case the filter is
/// skipped entirely and the input is returned unchanged.
pub fn candidate_filter(
    candidates: Vec<(String, f64)>,
    query: &str,
    text_by_id: &std::collections::HashMap<String, String>,
    min_pool: usize,
) -> Vec<(String, f64)> {
    let query_tokens = tokenize(query);
    let threshold = if is_ev_intent(&query_tokens) { 2 } else { 1 };

    let filtered: Vec<(String, f64)> = candidates
        .iter()
        .filter(|(id, _)| {
            let text = text_by_id.get(id).map(|s| s.as_str()).unwrap_or_default();
            let doc_tokens = tokenize(text);
            query_tokens.intersection(&doc_tokens).count() >= threshold
        })
        .cloned()
        .collect();

    if filtered.len() >= min_pool {
        filtered
    } else {
        candidates
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts(pairs: &[(&str, &str)]) -> std::collections::HashMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn domain_boost_raises_preferred_prefix() {
        let candidates = vec![("doc://a".to_string(), 1.0), ("web://b".to_string(), 1.0)];
        let boosted = apply_boosts(candidates, "delivery terms", &texts(&[]), Some("doc://"));
        assert!(boosted[0].0 == "doc://a");
    }

    #[test]
    fn noise_penalty_is_capped() {
        let text_by_id = texts(&[("n1", "market_analysis certificate gmail mail- incident audit extra extra extra extra")]);
        let candidates = vec![("n1".to_string(), 1.0)];
        let boosted = apply_boosts(candidates, "unrelated", &text_by_id, None);
        assert!(boosted[0].1 >= 1.0 - NOISE_PENALTY_CAP - 1e-9);
    }

    #[test]
    fn candidate_filter_skips_when_pool_too_small() {
        let candidates = vec![("a".to_string(), 1.0), ("b".to_string(), 0.5)];
        let text_by_id = texts(&[("a", "totally unrelated text"), ("b", "also unrelated")]);
        let filtered = candidate_filter(candidates.clone(), "diesel delivery terms", &text_by_id, 2);
        assert_eq!(filtered, candidates, "filter should no-op rather than starve the pool");
    }

    #[test]
    fn candidate_filter_drops_low_overlap_when_pool_survives() {
        let candidates = vec![
            ("a".to_string(), 1.0),
            ("b".to_string(), 0.9),
            ("c".to_string(), 0.8),
        ];
        let text_by_id = texts(&[
            ("a", "diesel delivery schedule for fleets"),
            ("b", "totally unrelated text about weather"),
            ("c", "diesel delivery pricing model"),
        ]);
        let filtered = candidate_filter(candidates, "diesel delivery", &text_by_id, 1);
        assert!(!filtered.iter().any(|(id, _)| id == "b"));
    }
}
