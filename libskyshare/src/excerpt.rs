//! Excerpt derivation
//!
//! Summaries come from the author's excerpt when there is one, otherwise
//! from the body with markup stripped. Trimming keeps whole words and adds
//! the continuation marker only when something was cut, so trimming text
//! that already fits returns it unchanged.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::types::Content;

pub const DEFAULT_BODY_CHARS: usize = 400;
pub const DEFAULT_DESCRIPTION_WORDS: usize = 55;
pub const DEFAULT_MORE: &str = " [...]";

static BLOCK_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)<script\b.*?</script\s*>|<style\b.*?</style\s*>|<!--.*?-->")
        .expect("BLOCK_REGEX should compile")
});

static TAG_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)<[^>]*>").expect("TAG_REGEX should compile"));

static ENTITY_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"&(#[0-9]{1,7}|#[xX][0-9a-fA-F]{1,6}|[a-zA-Z]+);")
        .expect("ENTITY_REGEX should compile")
});

/// Plain text a summary is cut from
pub fn summary_source(content: &Content) -> String {
    match content.excerpt.as_deref().map(str::trim) {
        Some(excerpt) if !excerpt.is_empty() => strip_html(excerpt),
        _ => strip_html(&content.body),
    }
}

/// Remove markup, decode common entities and collapse whitespace
pub fn strip_html(html: &str) -> String {
    let without_blocks = BLOCK_REGEX.replace_all(html, " ");
    let without_tags = TAG_REGEX.replace_all(&without_blocks, " ");
    let decoded = decode_entities(&without_tags);
    decoded.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn decode_entities(text: &str) -> String {
    ENTITY_REGEX
        .replace_all(text, |caps: &regex::Captures<'_>| {
            let entity = &caps[1];
            decode_entity(entity).unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}

fn decode_entity(entity: &str) -> Option<String> {
    if let Some(numeric) = entity.strip_prefix('#') {
        let hex = numeric
            .strip_prefix('x')
            .or_else(|| numeric.strip_prefix('X'));
        let code = match hex {
            Some(hex) => u32::from_str_radix(hex, 16).ok()?,
            None => numeric.parse::<u32>().ok()?,
        };
        return char::from_u32(code).map(String::from);
    }

    let decoded = match entity {
        "amp" => "&",
        "lt" => "<",
        "gt" => ">",
        "quot" => "\"",
        "apos" => "'",
        "nbsp" => " ",
        "hellip" => "…",
        "mdash" => "—",
        "ndash" => "–",
        "lsquo" => "‘",
        "rsquo" => "’",
        "ldquo" => "“",
        "rdquo" => "”",
        _ => return None,
    };
    Some(decoded.to_string())
}

/// Keep the first `max_words` words, appending `more` if any were dropped
pub fn trim_words(text: &str, max_words: usize, more: &str) -> String {
    let words: Vec<&str> = text.split_whitespace().collect();
    if words.len() <= max_words {
        return text.to_string();
    }

    let mut trimmed = words[..max_words].join(" ");
    trimmed.push_str(more);
    trimmed
}

/// Fit `text` into `max_chars` characters, marker included
///
/// Whole words are kept while they fit; a single word longer than the budget
/// is cut mid-word. Characters are counted as Unicode scalar values.
pub fn trim_chars(text: &str, max_chars: usize, more: &str) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }

    let more_len = more.chars().count();
    if more_len >= max_chars {
        return more.chars().take(max_chars).collect();
    }
    let budget = max_chars - more_len;

    let mut kept = String::new();
    let mut kept_len = 0;
    for word in text.split_whitespace() {
        let word_len = word.chars().count();
        let needed = if kept.is_empty() { word_len } else { word_len + 1 };
        if kept_len + needed > budget {
            break;
        }
        if !kept.is_empty() {
            kept.push(' ');
        }
        kept.push_str(word);
        kept_len += needed;
    }

    if kept.is_empty() {
        kept = text.trim_start().chars().take(budget).collect();
    }

    format!("{}{}", kept.trim_end(), more)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn content(excerpt: Option<&str>, body: &str) -> Content {
        Content {
            id: "1".to_string(),
            title: "Title".to_string(),
            excerpt: excerpt.map(str::to_string),
            body: body.to_string(),
            permalink: "https://x.test/?p=1".to_string(),
            shortlink: None,
            published_at: Utc::now(),
        }
    }

    #[test]
    fn test_summary_prefers_excerpt() {
        let c = content(Some("Author excerpt."), "<p>Body text</p>");
        assert_eq!(summary_source(&c), "Author excerpt.");
    }

    #[test]
    fn test_summary_falls_back_to_body() {
        let c = content(Some("   "), "<h1>Heading</h1>\n<p>First &amp; second</p>");
        assert_eq!(summary_source(&c), "Heading First & second");
    }

    #[test]
    fn test_strip_html_drops_scripts_and_comments() {
        let html = "<p>Visible</p><script>alert('x')</script><!-- hidden --><style>p{}</style>text";
        assert_eq!(strip_html(html), "Visible text");
    }

    #[test]
    fn test_strip_html_decodes_entities() {
        assert_eq!(strip_html("Fish &#38; chips &#x2014; &hellip;"), "Fish & chips — …");
        assert_eq!(strip_html("&unknown; stays"), "&unknown; stays");
    }

    #[test]
    fn test_trim_words_short_text_unchanged() {
        let text = "A short post about testing.";
        assert_eq!(trim_words(text, 55, DEFAULT_MORE), text);
        assert_eq!(trim_words(text, 5, DEFAULT_MORE), text);
    }

    #[test]
    fn test_trim_words_appends_marker() {
        let text = "one two three four five six";
        assert_eq!(trim_words(text, 3, DEFAULT_MORE), "one two three [...]");
    }

    #[test]
    fn test_trim_chars_short_text_unchanged() {
        let text = "A short post about testing.";
        assert_eq!(trim_chars(text, 400, DEFAULT_MORE), text);
        assert_eq!(trim_chars(text, text.chars().count(), DEFAULT_MORE), text);
    }

    #[test]
    fn test_trim_chars_keeps_whole_words() {
        let text = "alpha beta gamma delta";
        let trimmed = trim_chars(text, 18, DEFAULT_MORE);
        assert_eq!(trimmed, "alpha beta [...]");
        assert!(trimmed.chars().count() <= 18);
    }

    #[test]
    fn test_trim_chars_is_idempotent() {
        let text = "word ".repeat(200);
        let once = trim_chars(&text, 400, DEFAULT_MORE);
        assert!(once.chars().count() <= 400);
        assert!(once.ends_with(DEFAULT_MORE));
        assert_eq!(trim_chars(&once, 400, DEFAULT_MORE), once);
    }

    #[test]
    fn test_trim_chars_counts_characters_not_bytes() {
        let text = "ü".repeat(10);
        assert_eq!(trim_chars(&text, 10, DEFAULT_MORE), text);
    }

    #[test]
    fn test_trim_chars_cuts_single_long_word() {
        let text = "a".repeat(50);
        let trimmed = trim_chars(&text, 20, "…");
        assert_eq!(trimmed, format!("{}…", "a".repeat(19)));
    }

    #[test]
    fn test_trim_chars_tiny_budget() {
        assert_eq!(trim_chars("abcdefgh", 3, " [...]"), " [.");
    }
}
