//! Step 11 (spec §4.3): Maximal Marginal Relevance selection. Greedy
//! diversification over Jaccard similarity of 3+ char tokens — spec §8
//! invariant 3 (monotonicity in λ).

use super::boost::tokenize;
use std::collections::HashSet;

fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 0.0;
    }
    let intersection = a.intersection(b).count() as f64;
    let union = a.union(b).count() as f64;
    if union == 0.0 {
        0.0
    } else {
        intersection / union
    }
}

/// Greedily selects up to `final_k` ids from `candidates` (already sorted
/// by relevance, highest first), maximizing
/// `lambda * relevance - (1 - lambda) * max_sim(candidate, selected)`
/// at each step.
pub fn mmr_select(
    candidates: &[(String, f64)],
    text_by_id: &std::collections::HashMap<String, String>,
    lambda: f64,
    final_k: usize,
) -> Vec<String> {
    let token_sets: std::collections::HashMap<&str, HashSet<String>> = candidates
        .iter()
        .map(|(id, _)| {
            let text = text_by_id.get(id).map(|s| s.as_str()).unwrap_or_default();
            (id.as_str(), tokenize(text))
        })
        .collect();

    let max_score = candidates
        .iter()
        .map(|(_, s)| *s)
        .fold(f64::MIN, f64::max)
        .max(1e-9);

    let mut selected: Vec<String> = Vec::new();
    let mut remaining: Vec<&(String, f64)> = candidates.iter().collect();

    while selected.len() < final_k && !remaining.is_empty() {
        let mut best_idx = 0;
        let mut best_value = f64::MIN;
        for (idx, (id, relevance)) in remaining.iter().enumerate() {
            let normalized_relevance = relevance / max_score;
            let max_sim = selected
                .iter()
                .map(|s| jaccard(&token_sets[id.as_str()], &token_sets[s.as_str()]))
                .fold(0.0_f64, f64::max);
            let value = lambda * normalized_relevance - (1.0 - lambda) * max_sim;
            if value > best_value {
                best_value = value;
                best_idx = idx;
            }
        }
        let (id, _) = remaining.remove(best_idx).clone();
        selected.push(id);
    }

    selected
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts(pairs: &[(&str, &str)]) -> std::collections::HashMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn prefers_relevance_at_lambda_one() {
        let candidates = vec![("a".to_string(), 1.0), ("b".to_string(), 0.5)];
        let text_by_id = texts(&[("a", "diesel delivery fleet"), ("b", "diesel delivery fleet")]);
        let selected = mmr_select(&candidates, &text_by_id, 1.0, 2);
        assert_eq!(selected, vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn diversifies_at_lambda_zero_against_duplicates() {
        let candidates = vec![
            ("a".to_string(), 1.0),
            ("b".to_string(), 0.99),
            ("c".to_string(), 0.4),
        ];
        let text_by_id = texts(&[
            ("a", "diesel delivery fleet pricing"),
            ("b", "diesel delivery fleet pricing"),
            ("c", "completely different unrelated content here"),
        ]);
        let selected = mmr_select(&candidates, &text_by_id, 0.0, 2);
        assert_eq!(selected[0], "a");
        assert_eq!(selected[1], "c", "near-duplicate b should lose to diverse c at lambda=0");
    }

    #[test]
    fn stops_at_final_k() {
        let candidates = vec![
            ("a".to_string(), 1.0),
            ("b".to_string(), 0.9),
            ("c".to_string(), 0.8),
        ];
        let text_by_id = texts(&[("a", "x"), ("b", "y"), ("c", "z")]);
        let selected = mmr_select(&candidates, &text_by_id, 0.7, 2);
        assert_eq!(selected.len(), 2);
    }
}
