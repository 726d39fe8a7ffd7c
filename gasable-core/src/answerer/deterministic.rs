//! Deterministic fallback builder (spec §4.4): used when no chat client is
//! configured, or the LLM's JSON synthesis fails twice in a row. Extracts
//! overlap-scored sentences from the hits and groups them into categorical
//! sections with simple regex classifiers.

use super::{Section, StructuredAnswer};
use crate::retriever::{Language, Selected};

const CATEGORIES: &[(&str, &[&str])] = &[
    ("Services", &["service", "offer", "provide", "solution"]),
    ("Deployment", &["deploy", "install", "setup", "onboard", "integration"]),
    ("Pricing", &["price", "cost", "fee", "rate", "$"]),
    ("SLAs", &["sla", "uptime", "response time", "guarantee"]),
    ("Benefits", &["benefit", "advantage", "save", "improve", "reduce"]),
];

/// The `regex` crate has no lookaround, so sentence boundaries are found by
/// hand: split after `.`/`!`/`?` that is followed by whitespace (or end of
/// text), keeping the terminator with the sentence it closes.
fn sentences(text: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut start = 0;
    let bytes = text.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if matches!(bytes[i], b'.' | b'!' | b'?') {
            let at_boundary = i + 1 == bytes.len() || bytes[i + 1].is_ascii_whitespace();
            if at_boundary {
                let sentence = text[start..=i].trim();
                if !sentence.is_empty() {
                    out.push(sentence);
                }
                start = i + 1;
            }
        }
        i += 1;
    }
    let tail = text[start..].trim();
    if !tail.is_empty() {
        out.push(tail);
    }
    out
}

fn classify(sentence: &str) -> Option<&'static str> {
    let lower = sentence.to_ascii_lowercase();
    CATEGORIES
        .iter()
        .find(|(_, keywords)| keywords.iter().any(|k| lower.contains(k)))
        .map(|(name, _)| *name)
}

fn overlap_score(query_tokens: &std::collections::HashSet<String>, sentence: &str) -> usize {
    let sentence_tokens = crate::retriever::tokenize_for_matching(sentence);
    query_tokens.intersection(&sentence_tokens).count()
}

/// Builds a `StructuredAnswer` directly from hits with no LLM involved.
/// Returns the localized "no context available" answer when `hits` is empty.
pub fn build(query: &str, hits: &[Selected], language: Language) -> StructuredAnswer {
    if hits.is_empty() {
        return no_context_answer(language);
    }

    let query_tokens = crate::retriever::tokenize_for_matching(query);

    let mut scored_sentences: Vec<(usize, &'static str, String)> = Vec::new();
    for hit in hits {
        for sentence in sentences(&hit.text) {
            let score = overlap_score(&query_tokens, sentence);
            let category = classify(sentence).unwrap_or("Details");
            scored_sentences.push((score, category, sentence.to_string()));
        }
    }
    scored_sentences.sort_by(|a, b| b.0.cmp(&a.0));

    let mut by_category: indexmap_like::OrderedGroups = indexmap_like::OrderedGroups::new();
    for (_, category, sentence) in scored_sentences {
        by_category.push(category, sentence);
    }

    let summary: Vec<String> = by_category
        .iter()
        .flat_map(|(_, sentences)| sentences.iter().take(2).cloned())
        .take(8)
        .collect();

    let sections: Vec<Section> = by_category
        .iter()
        .take(4)
        .map(|(category, sentences)| {
            if sentences.len() > 1 {
                Section {
                    heading: category.to_string(),
                    bullets: Some(sentences.iter().take(6).map(|s| super::sanitize::truncate_chars(s, 180)).collect()),
                    paragraph: None,
                }
            } else {
                Section {
                    heading: category.to_string(),
                    bullets: None,
                    paragraph: sentences.first().map(|s| super::sanitize::truncate_chars(s, 180)),
                }
            }
        })
        .collect();

    let sources = hits
        .iter()
        .map(|h| super::Source { id: h.id.clone(), label: None })
        .collect();

    StructuredAnswer {
        title: title_for(query, language),
        summary,
        sections,
        sources,
    }
}

fn title_for(query: &str, language: Language) -> String {
    match language {
        Language::Arabic => format!("إجابة حول: {query}"),
        Language::Other => format!("Answer: {query}"),
    }
}

pub fn no_context_answer(language: Language) -> StructuredAnswer {
    StructuredAnswer {
        title: super::no_context_message(language),
        summary: Vec::new(),
        sections: Vec::new(),
        sources: Vec::new(),
    }
}

/// Minimal insertion-ordered multimap: avoids pulling in the `indexmap`
/// crate for a single grouping use site.
mod indexmap_like {
    pub struct OrderedGroups {
        order: Vec<&'static str>,
        groups: std::collections::HashMap<&'static str, Vec<String>>,
    }

    impl OrderedGroups {
        pub fn new() -> Self {
            Self { order: Vec::new(), groups: std::collections::HashMap::new() }
        }

        pub fn push(&mut self, key: &'static str, value: String) {
            if !self.groups.contains_key(key) {
                self.order.push(key);
            }
            self.groups.entry(key).or_default().push(value);
        }

        pub fn iter(&self) -> impl Iterator<Item = (&'static str, &Vec<String>)> {
            self.order.iter().map(|k| (*k, self.groups.get(k).unwrap()))
        }
    }
}
