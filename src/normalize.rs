//! Normalization of raw model output into briefing cards.
//!
//! The summarization model is asked for a JSON array of six cards, but what
//! actually comes back varies: fenced markdown, an object wrapping the
//! array, missing fields, wrong categories, too few or too many elements,
//! or no JSON at all. Everything that guesses at response shape lives here,
//! behind two functions:
//!
//! - [`parse_model_payload`]: strip code fences and parse to a JSON value
//! - [`normalize_cards`]: coerce any JSON value into exactly one [`Card`]
//!   per expected category, in order, padding with placeholders as needed
//!
//! `normalize_cards` never fails and never returns fewer or more cards than
//! the expected category order. Downstream code can rely on that shape
//! unconditionally.

use crate::models::{Card, Category};
use itertools::Itertools;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use tracing::debug;
use url::Url;

static URL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"https?://[^\s"'<>]+"#).expect("URL pattern is valid")
});

/// Separator between a citation's label and its URL.
const CITATION_SEPARATOR: &str = " — ";

/// Labels the model emits when it has no real source to cite.
const PLACEHOLDER_LABELS: [&str; 6] = ["top", "tech", "sports", "markets", "local", "weather"];

const MAX_BULLETS: usize = 3;
const MAX_CITATIONS: usize = 6;

/// Parse raw model text into a JSON value, tolerating markdown fences.
///
/// Models regularly wrap JSON in ```` ```json ```` fences despite being
/// told not to; those are stripped before parsing. The error is returned
/// (rather than absorbed) so the caller can distinguish a truncated
/// response, which is worth one re-ask, from plain garbage, which is not.
pub fn parse_model_payload(text: &str) -> Result<Value, serde_json::Error> {
    let cleaned = text.replace("```json", "").replace("```", "");
    serde_json::from_str(cleaned.trim())
}

/// Coerce an arbitrary JSON value into exactly one card per category.
///
/// # Arguments
///
/// * `raw` - any JSON value: an array of cards, `{"cards": [...]}`, or junk
/// * `expected` - the category order; one card is produced per entry
/// * `fallback_timestamp` - ISO-8601 stamp for cards without their own
/// * `fallback_url` - URL used when a card ends up with zero citations
///
/// # Behavior
///
/// For position `i`, the `i`-th input element (if any) is normalized:
/// missing or non-string fields get defaults (`card-<i>`, `"Untitled"`,
/// empty summary), bullets are capped at 3, and citations are formatted,
/// de-duplicated, stripped of placeholder labels, and backfilled with a
/// synthesized `"<Category> News — <fallback-url>"` entry when none
/// survive. The position's expected category always wins over whatever the
/// element claims. Positions past the end of the input become placeholder
/// cards. The result always has exactly `expected.len()` cards.
pub fn normalize_cards(
    raw: &Value,
    expected: &[Category],
    fallback_timestamp: &str,
    fallback_url: &str,
) -> Vec<Card> {
    let elements = card_elements(raw);
    expected
        .iter()
        .enumerate()
        .map(|(index, &category)| match elements.get(index) {
            Some(element) => {
                card_from_value(index, element, category, fallback_timestamp, fallback_url)
            }
            None => placeholder_card(index, category, fallback_timestamp),
        })
        .collect()
}

/// Locate the card array inside whatever shape the model returned.
fn card_elements(raw: &Value) -> &[Value] {
    if let Some(elements) = raw.as_array() {
        return elements;
    }
    if let Some(elements) = raw.get("cards").and_then(Value::as_array) {
        return elements;
    }
    &[]
}

fn card_from_value(
    index: usize,
    element: &Value,
    category: Category,
    fallback_timestamp: &str,
    fallback_url: &str,
) -> Card {
    // The element's category claim is validated against the enum but the
    // position still decides: a briefing has one card per category, in
    // order, no matter what came back.
    if let Some(claimed) = element
        .get("category")
        .and_then(scalar_string)
        .and_then(|s| Category::parse(&s))
    {
        if claimed != category {
            debug!(index, claimed = %claimed, expected = %category, "card category mismatch; using position");
        }
    }

    let summary = element
        .get("summary")
        .and_then(scalar_string)
        .unwrap_or_default();

    let mut bullets: Vec<String> = string_items(element.get("bullets"))
        .into_iter()
        .take(MAX_BULLETS)
        .collect();
    if bullets.len() == 1 {
        // Best-effort second bullet from the summary's opening sentence.
        if let Some(sentence) = first_sentence(&summary) {
            if sentence != bullets[0] {
                bullets.push(sentence);
            }
        }
    }

    let mut citations: Vec<String> = string_items(element.get("citations"))
        .into_iter()
        .map(|raw_citation| format_citation(&raw_citation))
        .unique()
        .filter(|citation| !has_placeholder_label(citation))
        .take(MAX_CITATIONS)
        .collect();
    if citations.is_empty() {
        citations.push(format!(
            "{} News{CITATION_SEPARATOR}{fallback_url}",
            category.label()
        ));
    }

    Card {
        id: element
            .get("id")
            .and_then(scalar_string)
            .unwrap_or_else(|| format!("card-{index}")),
        headline: element
            .get("headline")
            .and_then(scalar_string)
            .unwrap_or_else(|| "Untitled".to_string()),
        summary,
        bullets,
        category,
        timestamp: element
            .get("timestamp")
            .and_then(scalar_string)
            .unwrap_or_else(|| fallback_timestamp.to_string()),
        citations,
    }
}

/// A card for a position the input did not cover at all.
fn placeholder_card(index: usize, category: Category, fallback_timestamp: &str) -> Card {
    Card {
        id: format!("card-{index}"),
        headline: "Briefing unavailable".to_string(),
        summary: "No update available for this category right now.".to_string(),
        bullets: Vec::new(),
        category,
        timestamp: fallback_timestamp.to_string(),
        citations: Vec::new(),
    }
}

/// Reformat a raw citation string to `"<label> — <url>"`.
///
/// Idempotent: a string already containing the separator is returned
/// unchanged. A string with a URL gets its label from the surrounding
/// text, or from the URL's hostname (leading `www.` stripped) when no
/// text surrounds it. A string with no URL passes through untouched.
pub fn format_citation(raw: &str) -> String {
    let citation = raw.trim();
    if citation.is_empty() || citation.contains(CITATION_SEPARATOR) {
        return citation.to_string();
    }
    let Some(found) = URL_RE.find(citation) else {
        return citation.to_string();
    };
    let url = found.as_str().trim_end_matches(['.', ',', ';', ')', ']']);
    let surrounding = format!("{} {}", &citation[..found.start()], &citation[found.end()..]);
    let label = clean_label(&surrounding);
    if !label.is_empty() {
        return format!("{label}{CITATION_SEPARATOR}{url}");
    }
    match hostname_label(url) {
        Some(host) => format!("{host}{CITATION_SEPARATOR}{url}"),
        None => citation.to_string(),
    }
}

/// First sentence of `text`, ended by `.`, `!`, or `?` followed by
/// whitespace or end-of-string. Falls back to the whole trimmed text when
/// no terminator is found; `None` only for blank input.
pub fn first_sentence(text: &str) -> Option<String> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }
    for (i, c) in trimmed.char_indices() {
        if matches!(c, '.' | '!' | '?') {
            let end = i + c.len_utf8();
            let rest = &trimmed[end..];
            if rest.is_empty() || rest.starts_with(char::is_whitespace) {
                return Some(trimmed[..end].to_string());
            }
        }
    }
    Some(trimmed.to_string())
}

/// Coerce a scalar JSON value to a trimmed, non-empty string.
///
/// Objects and arrays yield `None`; stringifying them only produces noise
/// in headlines and bullets.
fn scalar_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                None
            } else {
                Some(trimmed.to_string())
            }
        }
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Coerce an optional JSON array into its scalar string members.
fn string_items(value: Option<&Value>) -> Vec<String> {
    value
        .and_then(Value::as_array)
        .map(|items| items.iter().filter_map(scalar_string).collect())
        .unwrap_or_default()
}

fn has_placeholder_label(citation: &str) -> bool {
    let label = citation
        .split(CITATION_SEPARATOR)
        .next()
        .unwrap_or(citation)
        .trim()
        .to_lowercase();
    PLACEHOLDER_LABELS.contains(&label.as_str())
}

fn clean_label(raw: &str) -> String {
    raw.trim()
        .trim_matches(|c: char| {
            matches!(
                c,
                '-' | '–' | '—' | ':' | '|' | ',' | '(' | ')' | '[' | ']' | '"' | '\''
            )
        })
        .trim()
        .to_string()
}

fn hostname_label(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let host = parsed.host_str()?;
    let host = host.strip_prefix("www.").unwrap_or(host);
    if host.is_empty() {
        None
    } else {
        Some(host.to_string())
    }
}
