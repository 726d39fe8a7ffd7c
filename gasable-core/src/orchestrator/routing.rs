//! Rule-based intent routing (spec §4.6): lowercase keyword-bucket scoring,
//! ties (including a tie against zero matches) falling to `support`.

const BUCKETS: &[(&str, &[&str])] = &[
    ("research", &["research", "find", "analyze"]),
    ("marketing", &["email", "campaign", "draft"]),
    ("procurement", &["order", "place", "invoice"]),
];

pub const DEFAULT_AGENT: &str = "support";

/// Scores `message` against each curated keyword bucket and returns the
/// agent id of the highest-scoring bucket. A score of zero, or a tie
/// between two or more buckets, resolves to [`DEFAULT_AGENT`].
pub fn route_intent(message: &str) -> &'static str {
    let lower = message.to_ascii_lowercase();
    let scored: Vec<(&'static str, usize)> = BUCKETS
        .iter()
        .map(|(bucket, keywords)| (*bucket, keywords.iter().filter(|kw| lower.contains(**kw)).count()))
        .collect();

    let max_score = scored.iter().map(|(_, score)| *score).max().unwrap_or(0);
    if max_score == 0 {
        return DEFAULT_AGENT;
    }
    let winners: Vec<&str> = scored.iter().filter(|(_, score)| *score == max_score).map(|(b, _)| *b).collect();
    match winners.as_slice() {
        [single] => single,
        _ => DEFAULT_AGENT,
    }
}
