// JSON salvage for model output
//
// Models wrap JSON in code fences, surround it with prose, and leave trailing
// commas. We accept all three; anything else is a ReplyError.

use serde_json::Value;

use crate::reply::ReplyError;

/// Pull the first JSON object or array out of free-form model output.
///
/// Tries, in order: the whole text, the first fenced code block, the first
/// balanced `{..}`/`[..]` span. A candidate that fails to parse gets exactly
/// one trailing-comma repair before it is abandoned.
pub fn extract_json(text: &str) -> Result<Value, ReplyError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(ReplyError::NoJson);
    }

    let mut candidates: Vec<&str> = vec![trimmed];
    if let Some(fenced) = fenced_block(trimmed) {
        candidates.push(fenced);
    }
    for source in candidates.clone() {
        if let Some(span) = balanced_span(source) {
            candidates.push(span);
        }
    }

    let mut last_error = None;
    for candidate in candidates {
        if !looks_like_json(candidate) {
            continue;
        }
        match serde_json::from_str::<Value>(candidate) {
            Ok(value) => return Ok(value),
            Err(e) => {
                let repaired = strip_trailing_commas(candidate);
                if repaired != candidate {
                    if let Ok(value) = serde_json::from_str::<Value>(&repaired) {
                        log::debug!("reply JSON needed trailing-comma repair");
                        return Ok(value);
                    }
                }
                last_error = Some(e.to_string());
            }
        }
    }

    match last_error {
        Some(e) => Err(ReplyError::Malformed(e)),
        None => Err(ReplyError::NoJson),
    }
}

fn looks_like_json(s: &str) -> bool {
    s.starts_with('{') || s.starts_with('[')
}

/// Content of the first ``` fence (language tag dropped)
fn fenced_block(text: &str) -> Option<&str> {
    let start = text.find("```")?;
    let after = &text[start + 3..];
    // Skip the info string ("json", "JSON", ...) up to the end of the line
    let body_start = after.find('\n').map(|i| i + 1).unwrap_or(0);
    let body = &after[body_start..];
    let end = body.find("```").unwrap_or(body.len());
    Some(body[..end].trim())
}

/// First balanced object/array, string-literal aware. Falls back to the last
/// closing bracket when the text is cut off mid-structure.
fn balanced_span(text: &str) -> Option<&str> {
    let start = text.find(['{', '['])?;
    let bytes = text.as_bytes();
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, &b) in bytes[start..].iter().enumerate() {
        if in_string {
            match b {
                _ if escaped => escaped = false,
                b'\\' => escaped = true,
                b'"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'{' | b'[' => depth += 1,
            b'}' | b']' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(&text[start..=start + offset]);
                }
            }
            _ => {}
        }
    }

    let close = if bytes[start] == b'{' { '}' } else { ']' };
    let end = text.rfind(close)?;
    (end > start).then(|| &text[start..=end])
}

/// Remove commas that directly precede `}` or `]` outside string literals
fn strip_trailing_commas(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len());
    let mut in_string = false;
    let mut escaped = false;

    for (i, &c) in chars.iter().enumerate() {
        if in_string {
            out.push(c);
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }
        if c == '"' {
            in_string = true;
            out.push(c);
            continue;
        }
        if c == ',' {
            let next = chars[i + 1..].iter().find(|ch| !ch.is_whitespace());
            if matches!(next, Some('}') | Some(']')) {
                continue;
            }
        }
        out.push(c);
    }
    out
}
