//! Salvage typed JSON out of model output.
//!
//! Models wrap JSON in markdown fences, prose preambles, or both. The
//! parser tries the raw content, then a fence-stripped variant, then
//! each balanced JSON object/array found in the text, and deserializes
//! the first candidate that matches the target schema. Schema failure
//! means "no result" - partial data is never propagated.

use anyhow::{anyhow, Result};

/// Truncate to `max` characters with a `...` marker.
pub fn truncate_str(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    if max <= 3 {
        return s.chars().take(max).collect();
    }
    let head: String = s.chars().take(max - 3).collect();
    format!("{}...", head)
}

/// Strip an outer ```json ... ``` fence, if present.
fn strip_markdown_fences(content: &str) -> Option<String> {
    let trimmed = content.trim();
    if !trimmed.starts_with("```") {
        return None;
    }
    let without_open = trimmed.strip_prefix("```")?;
    let after_header = match without_open.find('\n') {
        Some(idx) => &without_open[idx + 1..],
        None => without_open,
    };
    let end = after_header.rfind("```")?;
    Some(after_header[..end].trim().to_string())
}

/// Return the balanced JSON value starting at `start`, honoring string
/// escapes.
fn balanced_json_from(content: &str, start: usize) -> Option<&str> {
    let mut stack: Vec<char> = Vec::new();
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in content[start..].char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => stack.push('}'),
            '[' => stack.push(']'),
            '}' | ']' => {
                if stack.pop() != Some(ch) {
                    return None;
                }
                if stack.is_empty() {
                    let end = start + offset + ch.len_utf8();
                    return Some(&content[start..end]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Deserialize `T` from model output, salvaging fenced or embedded JSON.
pub fn parse_structured<T>(content: &str) -> Result<T>
where
    T: serde::de::DeserializeOwned,
{
    let mut candidates: Vec<String> = vec![content.trim().to_string()];
    if let Some(stripped) = strip_markdown_fences(content) {
        candidates.push(stripped);
    }

    // Balanced-value salvage over both the raw and fence-stripped text.
    const MAX_SALVAGE_CANDIDATES: usize = 4;
    for source in candidates.clone() {
        let mut idx = 0;
        let mut found = 0;
        while idx < source.len() && found < MAX_SALVAGE_CANDIDATES {
            let Some(ch) = source[idx..].chars().next() else {
                break;
            };
            if ch == '{' || ch == '[' {
                if let Some(candidate) = balanced_json_from(&source, idx) {
                    idx += candidate.len();
                    candidates.push(candidate.to_string());
                    found += 1;
                    continue;
                }
            }
            idx += ch.len_utf8();
        }
    }

    let mut last_err: Option<String> = None;
    for candidate in &candidates {
        match serde_json::from_str::<T>(candidate) {
            Ok(value) => return Ok(value),
            Err(err) => last_err = Some(err.to_string()),
        }
    }

    Err(anyhow!(
        "Failed to parse structured response: {}",
        last_err.unwrap_or_else(|| "no JSON candidates found".to_string())
    ))
}

/// Truncate file contents for prompt safety, keeping beginning and end.
pub fn truncate_content(content: &str, max_chars: usize) -> String {
    if content.chars().count() <= max_chars {
        return content.to_string();
    }
    let head: String = content.chars().take(max_chars / 2).collect();
    let tail: String = {
        let reversed: String = content.chars().rev().take(max_chars / 2).collect();
        reversed.chars().rev().collect()
    };
    format!("{}\n\n... [truncated] ...\n\n{}", head, tail)
}
