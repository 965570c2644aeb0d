//! Splits free-text model output into discrete feedback items
//!
//! Layers, first one yielding at least two items wins:
//! 1. blank-line separated paragraphs
//! 2. bulleted or numbered line starts
//! 3. sentence groups of at least [`MIN_GROUP_CHARS`] characters
//!
//! Fragments shorter than [`MIN_ITEM_CHARS`] are dropped and leading markers are
//! stripped. If nothing survives, the whole response becomes one item.

use std::sync::LazyLock;

use regex::Regex;

/// Fragments shorter than this are discarded
pub const MIN_ITEM_CHARS: usize = 20;

/// Minimum length of a sentence group in the last layer
pub const MIN_GROUP_CHARS: usize = 50;

static PARAGRAPH_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n[ \t]*\n").expect("valid regex"));

static LIST_START_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^[ \t]*(?:[-•*·]|\d+[.)])[ \t]+").expect("valid regex"));

static MARKER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*(?:[-•*·]|\d+[.)])(?:\s+|$)").expect("valid regex"));

/// Strip a leading bullet or number marker and surrounding whitespace. A marker
/// must be followed by whitespace, so `3.5 seconds` keeps its number.
fn clean(fragment: &str) -> String {
    MARKER_RE.replace(fragment.trim(), "").trim().to_string()
}

fn keep(fragments: impl Iterator<Item = String>) -> Vec<String> {
    fragments
        .map(|f| clean(&f))
        .filter(|f| f.chars().count() >= MIN_ITEM_CHARS)
        .collect()
}

fn by_paragraph(text: &str) -> Vec<String> {
    keep(PARAGRAPH_RE.split(text).map(str::to_string))
}

fn by_list_marker(text: &str) -> Vec<String> {
    keep(LIST_START_RE.split(text).map(str::to_string))
}

/// Sentences end at `.`, `!`, `?` or `。` followed by whitespace or end of text
fn sentences(text: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut current = String::new();
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        current.push(c);
        let terminal = matches!(c, '.' | '!' | '?' | '。');
        if terminal && chars.peek().map_or(true, |next| next.is_whitespace()) {
            let sentence = current.trim().to_string();
            if !sentence.is_empty() {
                out.push(sentence);
            }
            current.clear();
        }
    }
    let rest = current.trim();
    if !rest.is_empty() {
        out.push(rest.to_string());
    }
    out
}

fn by_sentence_group(text: &str) -> Vec<String> {
    let mut groups: Vec<String> = Vec::new();
    let mut current = String::new();

    for sentence in sentences(text) {
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(&sentence);
        if current.chars().count() >= MIN_GROUP_CHARS {
            groups.push(std::mem::take(&mut current));
        }
    }
    if !current.is_empty() {
        // A short tail joins the previous group
        match groups.last_mut() {
            Some(last) => {
                last.push(' ');
                last.push_str(&current);
            }
            None => groups.push(current),
        }
    }
    keep(groups.into_iter())
}

/// Parse a model response into feedback item texts
///
/// Never returns an empty list for non-blank input.
pub fn parse_response(text: &str) -> Vec<String> {
    let text = text.trim();
    if text.is_empty() {
        return Vec::new();
    }

    let mut items = by_paragraph(text);
    if items.len() < 2 {
        items = by_list_marker(text);
    }
    if items.len() < 2 {
        items = by_sentence_group(text);
    }
    if items.is_empty() {
        return vec![text.to_string()];
    }
    items
}
