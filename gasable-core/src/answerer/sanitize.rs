//! Output sanitization shared by every answer path (spec §4.4): strip HTML
//! tags and markdown image/link wrappers, drop soft hyphens and the
//! `ـ` Arabic tatweel, rejoin hyphenated line-wraps, collapse
//! whitespace, and normalize bullets to `- `.

use regex::Regex;
use std::sync::LazyLock;

static HTML_TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)<[^>]+>").unwrap());
static MD_IMAGE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"!\[([^\]]*)\]\([^)]*\)").unwrap());
static MD_LINK: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\[([^\]]*)\]\([^)]*\)").unwrap());
static HYPHEN_WRAP: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(\w)-\s*\n\s*(\w)").unwrap());
static BULLET_PREFIX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\s*[*•●▪\-]\s+").unwrap());
static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[ \t]+").unwrap());
static BLANK_LINES: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\n{3,}").unwrap());

const SOFT_HYPHEN: char = '\u{00AD}';
const TATWEEL: char = '\u{0640}';

/// Idempotent: `sanitize(sanitize(x)) == sanitize(x)` (spec §8 invariant 11).
pub fn sanitize(input: &str) -> String {
    let mut text = input.replace(SOFT_HYPHEN, "").replace(TATWEEL, "");

    // A single `replace_all` pass consumes the trailing `\w` of each match, so
    // chained wraps ("a-\nb-\nc") only collapse one link per pass. Loop to a
    // fixed point so the result is stable under re-sanitization.
    loop {
        let next = HYPHEN_WRAP.replace_all(&text, "$1$2").into_owned();
        if next == text {
            break;
        }
        text = next;
    }

    text = MD_IMAGE.replace_all(&text, "$1").into_owned();
    text = MD_LINK.replace_all(&text, "$1").into_owned();
    text = HTML_TAG.replace_all(&text, "").into_owned();

    let lines: Vec<String> = text
        .lines()
        .map(|line| {
            let collapsed = WHITESPACE.replace_all(line.trim_end(), " ");
            if BULLET_PREFIX.is_match(&collapsed) {
                format!("- {}", BULLET_PREFIX.replace(&collapsed, ""))
            } else {
                collapsed.trim().to_string()
            }
        })
        .collect();
    let joined = lines.join("\n");
    BLANK_LINES.replace_all(joined.trim(), "\n\n").into_owned()
}

/// Truncates `text` to at most `max_chars`, breaking on a char boundary and
/// appending no ellipsis (callers that need one add it themselves).
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn strips_html_tags() {
        assert_eq!(sanitize("<p>hello <b>world</b></p>"), "hello world");
    }

    #[test]
    fn strips_markdown_image_and_link_wrappers() {
        assert_eq!(sanitize("see ![alt](http://x) and [label](http://y)"), "see alt and label");
    }

    #[test]
    fn removes_soft_hyphen_and_tatweel() {
        let input = format!("deliv{SOFT_HYPHEN}ery net{TATWEEL}work");
        assert_eq!(sanitize(&input), "delivery network");
    }

    #[test]
    fn rejoins_hyphenated_line_wrap() {
        assert_eq!(sanitize("deliv-\nery schedule"), "delivery schedule");
    }

    #[test]
    fn rejoins_chained_hyphenated_line_wraps_in_one_call() {
        assert_eq!(sanitize("a-\nb-\nc"), "abc");
    }

    #[test]
    fn sanitize_is_idempotent_on_chained_hyphen_wraps() {
        let once = sanitize("a-\nb-\nc");
        assert_eq!(sanitize(&once), once);
    }

    #[test]
    fn normalizes_bullets() {
        assert_eq!(sanitize("* one\n• two\n- three"), "- one\n- two\n- three");
    }

    #[test]
    fn collapses_excess_whitespace() {
        assert_eq!(sanitize("a   b\t\tc"), "a b c");
    }

    proptest! {
        #[test]
        fn sanitize_is_idempotent(input in "(?s).{0,200}") {
            let once = sanitize(&input);
            let twice = sanitize(&once);
            prop_assert_eq!(once, twice);
        }
    }
}
