//! Context snippets attached to clarification questions

use unicode_segmentation::UnicodeSegmentation;

/// Best-effort excerpt of `goal` around `term`.
///
/// The whole goal when it fits in `max_chars`; otherwise the sentence holding
/// `term` when that fits; otherwise `window` characters either side of it.
pub fn extract_snippet(goal: &str, term: Option<&str>, max_chars: usize, window: usize) -> String {
    let goal = goal.trim();
    if goal.chars().count() <= max_chars {
        return goal.to_string();
    }

    let position = term.and_then(|t| find_case_insensitive(goal, t));

    if let Some((start, len)) = position {
        let mut offset = 0;
        for sentence in goal.split_sentence_bounds() {
            let end = offset + sentence.len();
            if start >= offset && start < end {
                let trimmed = sentence.trim();
                if trimmed.chars().count() <= max_chars {
                    return trimmed.to_string();
                }
                break;
            }
            offset = end;
        }
        return char_window(goal, start, start + len, window);
    }

    char_window(goal, 0, 0, window)
}

/// Byte offset and byte length of the first case-insensitive match
fn find_case_insensitive(haystack: &str, needle: &str) -> Option<(usize, usize)> {
    let needle: Vec<char> = needle.chars().flat_map(char::to_lowercase).collect();
    if needle.is_empty() {
        return None;
    }
    haystack
        .char_indices()
        .find_map(|(start, _)| match_len(&haystack[start..], &needle).map(|len| (start, len)))
}

/// Byte length of the prefix of `text` that lowercases to `needle`.
///
/// Reads at most `needle.len()` characters of `text`.
fn match_len(text: &str, needle: &[char]) -> Option<usize> {
    let mut matched = 0;
    for (offset, c) in text.char_indices() {
        for lower in c.to_lowercase() {
            if needle.get(matched) != Some(&lower) {
                return None;
            }
            matched += 1;
        }
        if matched == needle.len() {
            return Some(offset + c.len_utf8());
        }
    }
    None
}

/// Characters from `window` before `start` to `window` after `end` (byte offsets)
fn char_window(text: &str, start: usize, end: usize, window: usize) -> String {
    let before: Vec<usize> = text[..start].char_indices().map(|(i, _)| i).collect();
    let from = if before.len() > window {
        before[before.len() - window]
    } else {
        0
    };

    let to = text[end..]
        .char_indices()
        .nth(window)
        .map(|(i, _)| end + i)
        .unwrap_or(text.len());

    text[from..to].trim().to_string()
}
