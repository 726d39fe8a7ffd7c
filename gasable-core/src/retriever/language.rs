//! Step 1 of the pipeline (spec §4.3): bias query expansion by script.

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Arabic,
    Other,
}

/// Arabic if any character falls in the Arabic Unicode block; `Other`
/// otherwise. Mixed-script queries are treated as Arabic since the
/// downstream fallback prefers to over- rather than under-translate.
pub fn detect_language(query: &str) -> Language {
    if query.chars().any(|c| ('\u{0600}'..='\u{06FF}').contains(&c)) {
        Language::Arabic
    } else {
        Language::Other
    }
}
