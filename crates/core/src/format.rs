use once_cell::sync::Lazy;
use regex::Regex;

/// End time used when a segment has no recognisable timestamp.
pub const NO_TIMESTAMP: &str = "00:00.000";

/// `[00:00.000 --> 00:30.000]` with an optional trailing colon.
static BRACKETED_RANGE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\[\s*[\d:.,]+\s*-->\s*[\d:.,]+\s*\]\s*:?\s*").unwrap()
});

/// `00:00.000 --> 00:30.000` with an optional trailing colon.
static BARE_RANGE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d{1,2}(?::\d{2}){1,2}(?:[.,]\d{1,3})?\s*-->\s*\d{1,2}(?::\d{2}){1,2}(?:[.,]\d{1,3})?\s*:?\s*").unwrap());

/// `[01:05]` style single stamps.
static BRACKETED_STAMP: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\[\d{1,2}(?::\d{2}){1,2}(?:[.,]\d{1,3})?\]\s*").unwrap());

static TIMESTAMP: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\d{2}:\d{2}(?::\d{2})?\.\d{3}").unwrap());

static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

fn strip_timestamp_prefix(line: &str) -> &str {
    for pattern in [&*BRACKETED_RANGE, &*BARE_RANGE, &*BRACKETED_STAMP] {
        if let Some(m) = pattern.find(line) {
            return &line[m.end()..];
        }
    }
    line
}

/// Join raw transcript lines into one clean text blob.
///
/// Timestamp prefixes are removed, blank lines dropped and whitespace collapsed.
/// An empty result means the segment carries no usable text.
pub fn clean_transcript_lines<S: AsRef<str>>(lines: &[S]) -> String {
    let cleaned: Vec<String> = lines
        .iter()
        .map(|line| strip_timestamp_prefix(line.as_ref().trim()))
        .map(|text| WHITESPACE.replace_all(text.trim(), " ").into_owned())
        .filter(|text| !text.is_empty())
        .collect();

    cleaned.join(" ")
}

/// Last `MM:SS.mmm` or `HH:MM:SS.mmm` timestamp in `line`.
pub fn last_timestamp(line: &str) -> Option<&str> {
    TIMESTAMP.find_iter(line).last().map(|m| m.as_str())
}

/// Synthetic end time for a chunk starting at line `index`.
pub fn placeholder_end_time(index: usize) -> String {
    format!("00:{:02}.000", index)
}
