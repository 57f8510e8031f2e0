//! Timestamped lyric cues: parsing, end-time synthesis and LRC serialization.
//!
//! Two source dialects produce the same `Cue` shape:
//! - dialect A: `[mm:ss]` or `[mm:ss.f..fff]`, repeated timestamps merge into
//!   one multi-line cue
//! - dialect B: strict `[mm:ss.cc]` centiseconds, single-digit centiseconds
//!   written without their trailing zero
//!
//! Output is always `[mm:ss.cc] text`.

use once_cell::sync::Lazy;
use regex::Regex;
use std::cmp::Ordering;

use crate::models::{Cue, LyricsPayload};

/// Dialect A marker: optional 1-3 digit fraction. Three minute digits so
/// serialized times past 99 minutes read back.
static LRC_TAG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\[(\d{1,3}):(\d{2})(?:\.(\d{1,3}))?\]").unwrap());

/// Dialect B marker: leading whitespace allowed, fraction required.
static BRACKET_TAG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*\[(\d{1,3}):(\d{2})\.(\d{1,3})\]").unwrap());

/// Fence lines of a Markdown code block.
static FENCE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^```.*?$|^```$").unwrap());

/// Cues closer than this share a timestamp.
const SAME_START_EPSILON: f64 = 1e-3;

/// Minimum displayed lifetime of a cue.
const MIN_CUE_SPAN: f64 = 0.1;

/// Gap kept between a cue's end and its successor's start.
const CUE_END_MARGIN: f64 = 0.05;

/// A silence at least this long starts a new paragraph in the output.
const PARAGRAPH_GAP: f64 = 4.0;

// ============================================================================
// Parsing
// ============================================================================

/// Scale a 1-3 digit fraction to milliseconds by right-padding:
/// "5" → 500, "50" → 500, "505" → 505.
fn fraction_to_millis(frac: &str) -> Option<u32> {
    let value: u32 = frac.parse().ok()?;
    let scale = 10u32.pow(3 - frac.len().min(3) as u32);
    Some(value * scale)
}

/// Parse dialect A. Lines without a leading marker are ignored; markers with
/// no text are dropped; consecutive lines sharing a start merge.
pub fn parse_lrc(text: &str) -> Vec<Cue> {
    let mut cues: Vec<Cue> = Vec::new();
    for line in text.lines() {
        let Some(caps) = LRC_TAG.captures(line) else {
            continue;
        };
        let (Ok(mm), Ok(ss)) = (caps[1].parse::<u32>(), caps[2].parse::<u32>()) else {
            continue;
        };
        let ms = match caps.get(3) {
            Some(frac) => match fraction_to_millis(frac.as_str()) {
                Some(ms) => ms,
                None => continue,
            },
            None => 0,
        };
        let start = f64::from(mm * 60 + ss) + f64::from(ms) / 1000.0;

        let body = line[caps.get(0).map_or(0, |m| m.end())..].trim();
        if body.is_empty() {
            continue;
        }

        match cues.last_mut() {
            Some(last) if (last.start - start).abs() < SAME_START_EPSILON => {
                last.text.push('\n');
                last.text.push_str(body);
            }
            _ => cues.push(Cue::new(start, body)),
        }
    }
    finish(cues)
}

/// Parse dialect B. Single-digit centiseconds are scaled ×10.
pub fn parse_bracket_lrc(text: &str) -> Vec<Cue> {
    let mut cues: Vec<Cue> = Vec::new();
    for line in text.lines() {
        let Some(caps) = BRACKET_TAG.captures(line) else {
            continue;
        };
        let (Ok(mm), Ok(ss), Ok(cs)) = (
            caps[1].parse::<u32>(),
            caps[2].parse::<u32>(),
            caps[3].parse::<u32>(),
        ) else {
            continue;
        };
        let cs = if cs >= 10 { cs } else { cs * 10 };
        let start = f64::from(mm * 60 + ss) + f64::from(cs) / 100.0;

        let body = line[caps.get(0).map_or(0, |m| m.end())..].trim();
        if body.is_empty() {
            continue;
        }
        cues.push(Cue::new(start, body));
    }
    finish(cues)
}

/// Dialect A when it yields anything, dialect B otherwise.
pub fn parse_synced(text: &str) -> Vec<Cue> {
    let cues = parse_lrc(text);
    if cues.is_empty() {
        parse_bracket_lrc(text)
    } else {
        cues
    }
}

fn finish(mut cues: Vec<Cue>) -> Vec<Cue> {
    cues.sort_by(|a, b| a.start.partial_cmp(&b.start).unwrap_or(Ordering::Equal));
    synthesize_ends(&mut cues);
    cues
}

/// Every cue but the last ends 50ms before its successor, never sooner than
/// 100ms after its own start. The last keeps its placeholder end.
pub fn synthesize_ends(cues: &mut [Cue]) {
    for i in 1..cues.len() {
        let next_start = cues[i].start;
        let cue = &mut cues[i - 1];
        cue.end = (cue.start + MIN_CUE_SPAN).max(next_start - CUE_END_MARGIN);
    }
}

// ============================================================================
// Serialization
// ============================================================================

pub fn format_timecode(seconds: f64) -> String {
    let total_centis = (seconds * 100.0).round() as i64;
    let minutes = total_centis / 6000;
    let secs = (total_centis / 100) % 60;
    let centis = total_centis % 100;
    format!("{:02}:{:02}.{:02}", minutes, secs, centis)
}

pub fn format_lrc_time_tag(seconds: f64) -> String {
    format!("[{}]", format_timecode(seconds))
}

/// Cues to LRC text. A blank line marks every silence of 4s or more between
/// one cue's end and the next cue's start.
pub fn serialize_cues(cues: &[Cue]) -> String {
    let mut out: Vec<String> = Vec::with_capacity(cues.len());
    let mut prev_end = 0.0;
    for cue in cues {
        if cue.start - prev_end >= PARAGRAPH_GAP && !out.is_empty() {
            out.push(String::new());
        }
        let text = cue.text.replace('\n', " ");
        out.push(format!("{} {}", format_lrc_time_tag(cue.start), text.trim()));
        prev_end = cue.end;
    }
    out.join("\n")
}

/// Document body for a payload. Plain text is emitted verbatim after trimming.
pub fn serialize_payload(payload: &LyricsPayload) -> String {
    match payload {
        LyricsPayload::Plain(text) => text.trim().to_string(),
        LyricsPayload::Cues(cues) => serialize_cues(cues),
    }
}

/// Strip Markdown fence lines and surrounding whitespace.
pub fn unfence(text: &str) -> String {
    FENCE.replace_all(text, "").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_well_formed(cues: &[Cue]) {
        for pair in cues.windows(2) {
            assert!(pair[0].start <= pair[1].start);
        }
        for cue in cues {
            assert!(cue.end > cue.start, "{cue:?}");
        }
    }

    #[test]
    fn test_dialect_a_merges_shared_timestamp() {
        let cues = parse_lrc("[01:02.50]hello\n[01:02.50]world");
        assert_eq!(cues.len(), 1);
        assert_eq!(cues[0].text, "hello\nworld");
        assert!((cues[0].start - 62.5).abs() < 1e-9);
        assert!((cues[0].end - 66.5).abs() < 1e-9);
    }

    #[test]
    fn test_dialect_a_fraction_is_right_padded() {
        let cues = parse_lrc("[00:01.5]a\n[00:02.05]b\n[00:03.123]c\n[00:04]d");
        let expected = [1.5, 2.05, 3.123, 4.0];
        assert_eq!(cues.len(), expected.len());
        for (cue, want) in cues.iter().zip(expected) {
            assert!((cue.start - want).abs() < 1e-9, "{cue:?}");
        }
    }

    #[test]
    fn test_dialect_a_ignores_untagged_and_empty_lines() {
        let cues = parse_lrc("[ar:Someone]\nplain line\n[00:01.00]\n[00:02.00]  kept  \n");
        assert_eq!(cues.len(), 1);
        assert_eq!(cues[0].text, "kept");
    }

    #[test]
    fn test_dialect_b_scales_single_digit_centis() {
        let cues = parse_bracket_lrc("[00:05.3]line");
        assert_eq!(cues.len(), 1);
        assert!((cues[0].start - 5.3).abs() < 1e-9);

        let cues = parse_bracket_lrc("  [00:05.30]line");
        assert!((cues[0].start - 5.3).abs() < 1e-9);
    }

    #[test]
    fn test_dialect_b_does_not_merge() {
        let cues = parse_bracket_lrc("[00:01.00]a\n[00:01.00]b");
        assert_eq!(cues.len(), 2);
    }

    #[test]
    fn test_parse_synced_falls_back_to_dialect_b() {
        let cues = parse_synced("  [00:01.00]indented");
        assert_eq!(cues.len(), 1);
        assert_eq!(cues[0].text, "indented");
    }

    #[test]
    fn test_end_synthesis() {
        let cues = parse_lrc("[00:01.00]a\n[00:01.02]b\n[00:05.00]c");
        // a→b too close: floor of 0.1s
        assert!((cues[0].end - 1.1).abs() < 1e-9);
        // b→c: 50ms before c
        assert!((cues[1].end - 4.95).abs() < 1e-9);
        // last: placeholder
        assert!((cues[2].end - 9.0).abs() < 1e-9);
        assert_well_formed(&cues);
    }

    #[test]
    fn test_out_of_order_input_is_sorted() {
        let cues = parse_lrc("[00:10.00]late\n[00:01.00]early");
        assert_eq!(cues[0].text, "early");
        assert_well_formed(&cues);
    }

    #[test]
    fn test_serialize_format() {
        let cues = parse_lrc("[00:01.00]hello\n[00:01.00]there\n[01:02.50]world");
        assert_eq!(serialize_cues(&cues), "[00:01.00] hello there\n[01:02.50] world");
    }

    #[test]
    fn test_serialize_inserts_paragraph_breaks() {
        let cues = vec![
            Cue { start: 1.0, end: 2.0, text: "a".into() },
            Cue { start: 2.5, end: 3.0, text: "b".into() },
            Cue { start: 7.0, end: 8.0, text: "c".into() },
        ];
        assert_eq!(serialize_cues(&cues), "[00:01.00] a\n[00:02.50] b\n\n[00:07.00] c");
    }

    #[test]
    fn test_no_leading_blank_line() {
        let cues = vec![Cue::new(30.0, "late start")];
        assert_eq!(serialize_cues(&cues), "[00:30.00] late start");
    }

    #[test]
    fn test_timecode_rounding_carries() {
        assert_eq!(format_lrc_time_tag(5.996), "[00:06.00]");
        assert_eq!(format_lrc_time_tag(61.25), "[01:01.25]");
    }

    #[test]
    fn test_round_trip_preserves_starts_and_text() {
        let source = "[00:00.50]one\n[00:03.25]two\n[00:09.7]three\n[02:15.123]four";
        let first = parse_lrc(source);
        let second = parse_lrc(&serialize_cues(&first));
        assert_eq!(first.len(), second.len());
        for (a, b) in first.iter().zip(&second) {
            assert!((a.start - b.start).abs() <= 0.01, "{a:?} vs {b:?}");
            assert_eq!(a.text, b.text);
        }
    }

    #[test]
    fn test_long_recordings_round_trip() {
        let cues = vec![Cue::new(59.0, "early"), Cue::new(6000.5, "past the hour mark")];
        let text = serialize_cues(&cues);
        assert!(text.ends_with("[100:00.50] past the hour mark"), "{text}");
        let back = parse_lrc(&text);
        assert_eq!(back.len(), 2);
        assert!((back[1].start - 6000.5).abs() < 1e-9);
    }

    #[test]
    fn test_dialect_b_output_is_well_formed() {
        let cues = parse_bracket_lrc(
            "[00:12.5]third\n  [00:01.00]first\n[00:01.02]second\nno tag\n[00:20.00]\n[00:30.75]last",
        );
        let texts: Vec<&str> = cues.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(texts, vec!["first", "second", "third", "last"]);
        assert_well_formed(&cues);
        assert!((cues[1].end - 12.45).abs() < 1e-9);
    }

    #[test]
    fn test_plain_payload_is_trimmed() {
        let payload = LyricsPayload::Plain("\n  line one\nline two  \n".into());
        assert_eq!(serialize_payload(&payload), "line one\nline two");
    }

    #[test]
    fn test_unfence() {
        assert_eq!(unfence("# t\n\n```lrc\n[00:01.00] a\n```"), "# t\n\n\n[00:01.00] a");
        assert_eq!(unfence("```\n```"), "");
    }
}
