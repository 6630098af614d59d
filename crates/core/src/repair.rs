//! Best-effort recovery of JSON from model replies.
//!
//! Each pass is a small pure function so it can be exercised on its own; the
//! segmentation engine chains them through [`repair_segment_payload`]. None of
//! them fail: they return their best guess and parsing happens downstream.

use once_cell::sync::Lazy;
use regex::Regex;

/// First fenced block, with or without a `json` language tag.
static FENCED_BLOCK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)```(?:json)?[ \t]*\r?\n?(.*?)\s*```").unwrap());

/// Tracks whether the scan position sits inside a JSON string literal.
#[derive(Default)]
struct StringState {
    in_string: bool,
    escaped: bool,
}

impl StringState {
    /// Advance over `ch`; true when `ch` belongs to a string literal, quotes included.
    fn step(&mut self, ch: char) -> bool {
        if self.in_string {
            if self.escaped {
                self.escaped = false;
            } else if ch == '\\' {
                self.escaped = true;
            } else if ch == '"' {
                self.in_string = false;
            }
            true
        } else if ch == '"' {
            self.in_string = true;
            true
        } else {
            false
        }
    }
}

/// Byte index of the bracket closing the one at `start`.
fn matching_close(text: &str, start: usize) -> Option<usize> {
    let mut state = StringState::default();
    let mut depth = 0usize;
    for (offset, ch) in text[start..].char_indices() {
        if state.step(ch) {
            continue;
        }
        match ch {
            '[' | '{' => depth += 1,
            ']' | '}' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(start + offset);
                }
            }
            _ => {}
        }
    }
    None
}

fn balanced_from(text: &str, start: usize) -> String {
    match matching_close(text, start) {
        Some(end) => text[start..=end].to_string(),
        None => text[start..].to_string(),
    }
}

fn next_significant(chars: &[char]) -> Option<char> {
    chars.iter().copied().find(|c| !c.is_whitespace())
}

/// Remove markdown code fences around (or inside) a reply.
pub fn strip_fences(text: &str) -> String {
    let trimmed = text.trim();

    if let Some(inner) = FENCED_BLOCK
        .captures(trimmed)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim())
        .filter(|inner| !inner.is_empty())
    {
        return inner.to_string();
    }

    // An opening fence with no closing one, or a stray closing fence.
    let mut rest = trimmed;
    if let Some(stripped) = rest.strip_prefix("```") {
        rest = stripped;
        if rest.get(..4).is_some_and(|tag| tag.eq_ignore_ascii_case("json")) {
            rest = &rest[4..];
        }
    }
    if let Some(stripped) = rest.strip_suffix("```") {
        rest = stripped;
    }
    rest.trim().to_string()
}

/// True when the `[` at `pos` is followed (after whitespace) by `{`.
fn opens_object_array(chars: &[(usize, char)], pos: usize) -> bool {
    chars[pos].1 == '['
        && chars[pos + 1..]
            .iter()
            .map(|(_, ch)| *ch)
            .find(|c| !c.is_whitespace())
            == Some('{')
}

/// Slice out the first top-level array, preferring one that holds objects.
pub fn isolate_array(text: &str) -> String {
    let chars: Vec<(usize, char)> = text.char_indices().collect();
    let first_open = chars.iter().position(|(_, ch)| *ch == '[');
    let of_objects = (0..chars.len()).find(|&pos| opens_object_array(&chars, pos));

    match of_objects.or(first_open) {
        Some(pos) => balanced_from(text, chars[pos].0),
        None => text.to_string(),
    }
}

/// Slice out the first balanced value that holds objects: an object, or an
/// array opening with one. Bracketed prose such as `[2]` is skipped unless
/// nothing better exists.
pub fn isolate_value(text: &str) -> String {
    let chars: Vec<(usize, char)> = text.char_indices().collect();
    let object_like = (0..chars.len())
        .find(|&pos| chars[pos].1 == '{' || opens_object_array(&chars, pos));

    match object_like.or_else(|| chars.iter().position(|(_, ch)| *ch == '[')) {
        Some(pos) => balanced_from(text, chars[pos].0),
        None => text.to_string(),
    }
}

/// `[1, 2,]` becomes `[1, 2]`.
pub fn drop_trailing_commas(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len());
    let mut state = StringState::default();

    for (i, &ch) in chars.iter().enumerate() {
        if !state.step(ch) && ch == ',' && matches!(next_significant(&chars[i + 1..]), Some(']' | '}')) {
            continue;
        }
        out.push(ch);
    }
    out
}

/// `{..} {..}` becomes `{..}, {..}`; same for adjacent arrays.
pub fn join_adjacent_values(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len() + 8);
    let mut state = StringState::default();

    for (i, &ch) in chars.iter().enumerate() {
        let in_string = state.step(ch);
        out.push(ch);
        if !in_string
            && matches!(ch, '}' | ']')
            && matches!(next_significant(&chars[i + 1..]), Some('{' | '['))
        {
            out.push(',');
        }
    }
    out
}

/// Fold every whitespace run into one space and trim the ends.
///
/// This also turns raw newlines inside string literals, which JSON forbids,
/// into plain spaces.
pub fn collapse_whitespace(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut pending_space = false;
    for ch in text.chars() {
        if ch.is_whitespace() {
            pending_space = true;
            continue;
        }
        if pending_space && !out.is_empty() {
            out.push(' ');
        }
        pending_space = false;
        out.push(ch);
    }
    out
}

/// Recover the JSON payload from a raw reply: strip fences, and if prose still
/// surrounds the value, cut down to the first balanced object or array.
pub fn extract_json(raw: &str) -> String {
    let stripped = strip_fences(raw);
    if stripped.starts_with(['{', '[']) {
        return stripped;
    }
    match stripped.find(['{', '[']) {
        Some(_) => isolate_value(&stripped),
        None => stripped,
    }
}

/// The full ordered repair chain for segmentation replies.
pub fn repair_segment_payload(raw: &str) -> String {
    let text = strip_fences(raw);
    let text = isolate_array(&text);
    let text = drop_trailing_commas(&text);
    let text = join_adjacent_values(&text);
    collapse_whitespace(&text)
}
