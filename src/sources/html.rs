//! Minimal HTML text extraction for scraped pages.
//!
//! Pages are walked with a tag regex and an open-element stack; this is
//! enough to find an element's parent and its text content on the handful of
//! pages we scrape.

use once_cell::sync::Lazy;
use regex::Regex;

static NON_CONTENT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)<script\b.*?</script\s*>|<style\b.*?</style\s*>|<!--.*?-->").unwrap()
});

static TAG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<(/?)([A-Za-z][A-Za-z0-9]*)\b[^>]*?(/?)>").unwrap());

static ANY_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]*>").unwrap());

static HREF: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)\bhref\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s>]+))"#).unwrap()
});

static BR: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)<br\s*/?>").unwrap());

static ENTITY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"&(#[0-9]+|#[xX][0-9a-fA-F]+|[A-Za-z]+);").unwrap());

const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param", "source",
    "track", "wbr",
];

/// Decode numeric and the common named entities; unknown names are left as is.
pub fn decode_entities(input: &str) -> String {
    ENTITY
        .replace_all(input, |caps: &regex::Captures| {
            let entity = &caps[1];
            let decoded = if let Some(num) = entity.strip_prefix('#') {
                let code = match num.strip_prefix('x').or_else(|| num.strip_prefix('X')) {
                    Some(hex) => u32::from_str_radix(hex, 16).ok(),
                    None => num.parse::<u32>().ok(),
                };
                code.and_then(char::from_u32)
            } else {
                match entity {
                    "amp" => Some('&'),
                    "lt" => Some('<'),
                    "gt" => Some('>'),
                    "quot" => Some('"'),
                    "apos" => Some('\''),
                    "nbsp" => Some(' '),
                    _ => None,
                }
            };
            match decoded {
                Some(c) => c.to_string(),
                None => caps[0].to_string(),
            }
        })
        .into_owned()
}

/// `<br>` to newline, other tags removed, entities decoded.
pub fn fragment_text(html: &str) -> String {
    let with_breaks = BR.replace_all(html, "\n");
    let stripped = ANY_TAG.replace_all(&with_breaks, "");
    decode_entities(&stripped)
}

/// Text content with every tag boundary treated as a separator, whitespace
/// collapsed to single spaces.
pub fn inline_text(html: &str) -> String {
    let spaced = ANY_TAG.replace_all(html, " ");
    decode_entities(&spaced)
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn is_void(name: &str) -> bool {
    VOID_ELEMENTS.contains(&name)
}

/// Byte offset where the element opened just before `from` closes.
fn element_end(html: &str, name: &str, from: usize) -> usize {
    let mut depth = 0usize;
    for caps in TAG.captures_iter(&html[from..]) {
        let Some(m) = caps.get(0) else { continue };
        if !caps[2].eq_ignore_ascii_case(name) {
            continue;
        }
        let closing = !caps[1].is_empty();
        let self_closing = !caps[3].is_empty();
        if closing {
            if depth == 0 {
                return from + m.start();
            }
            depth -= 1;
        } else if !self_closing {
            depth += 1;
        }
    }
    html.len()
}

/// For every `<a>` whose href matches `href_pattern`, the href and the text
/// of the anchor's parent element (the anchor's own text at top level).
pub fn anchor_rows(html: &str, href_pattern: &Regex) -> Vec<(String, String)> {
    let html = NON_CONTENT.replace_all(html, "");
    let html: &str = &html;

    let mut open: Vec<(String, usize)> = Vec::new();
    let mut rows = Vec::new();

    for caps in TAG.captures_iter(html) {
        let Some(m) = caps.get(0) else { continue };
        let name = caps[2].to_ascii_lowercase();

        if !caps[1].is_empty() {
            if let Some(pos) = open.iter().rposition(|(n, _)| *n == name) {
                open.truncate(pos);
            }
            continue;
        }

        if name == "a" {
            let href = HREF.captures(m.as_str()).and_then(|h| {
                h.get(1)
                    .or_else(|| h.get(2))
                    .or_else(|| h.get(3))
                    .map(|v| decode_entities(v.as_str()))
            });
            if let Some(href) = href.filter(|h| href_pattern.is_match(h)) {
                let text = match open.last() {
                    Some((parent, content_start)) => {
                        let end = element_end(html, parent, *content_start);
                        inline_text(&html[*content_start..end.max(*content_start)])
                    }
                    None => {
                        let end = element_end(html, "a", m.end());
                        inline_text(&html[m.end()..end])
                    }
                };
                rows.push((href, text));
            }
        }

        if caps[3].is_empty() && !is_void(&name) {
            open.push((name, m.end()));
        }
    }
    rows
}
