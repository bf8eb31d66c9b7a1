//! Entry Extractor: data rows to typed entries.

use std::collections::HashMap;
use std::sync::OnceLock;

use ledgermatch_config::ParseSettings;
use ledgermatch_io::Grid;
use regex::Regex;

use crate::amount::{is_amount, parse_amount};
use crate::error::ReconError;
use crate::model::{Amount, ColumnRoles, Entry, HeaderDecision, SkipReason, SkippedRow, Source};

/// Composite separators, highest priority first
const COMPOSITE_SEPARATORS: &[&str] = &[":", "：", "-", "(", "（", "|", " ", "\t"];
const CONTEXT_SEPARATOR: &str = " | ";
const ELLIPSIS: char = '…';

fn amount_tail() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"^([-+]?[¥￥$€£]?\s*(?:\d{1,3}(?:,\d{3})+|\d+)(?:\.\d+)?)\s*(?:元|块|角|分|(?i:yuan|rmb))?\s*[)）]?$",
        )
        .expect("amount tail pattern")
    })
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExtractionReport {
    pub entries: Vec<Entry>,
    pub skipped: Vec<SkippedRow>,
}

/// Split `name<sep>amount` at the last occurrence of the first separator
/// that yields a non-empty name and a numeric tail.
pub fn split_composite(cell: &str) -> Option<(String, Amount)> {
    let cell = cell.trim();
    COMPOSITE_SEPARATORS.iter().find_map(|sep| {
        let pos = cell.rfind(*sep)?;
        let head = cell[..pos].trim();
        let tail = cell[pos + sep.len()..].trim();
        if head.is_empty() {
            return None;
        }
        let caps = amount_tail().captures(tail)?;
        let amount = parse_amount(caps.get(1)?.as_str()).ok()?;
        Some((head.to_string(), amount))
    })
}

/// Substitute `{n}` placeholders with `values[n]` and tidy what is left.
///
/// An empty rule joins the non-empty values with `-`.
pub fn apply_rule(rule: &str, values: &[&str]) -> String {
    if rule.trim().is_empty() {
        return values
            .iter()
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
            .collect::<Vec<_>>()
            .join("-");
    }

    let mut out = String::with_capacity(rule.len());
    let mut rest = rule;
    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let digits = after.find('}').map(|close| &after[..close]);
        match digits {
            Some(d) if !d.is_empty() && d.chars().all(|c| c.is_ascii_digit()) => {
                if let Some(v) = d.parse::<usize>().ok().and_then(|i| values.get(i)) {
                    out.push_str(v.trim());
                }
                rest = &after[d.len() + 1..];
            }
            _ => {
                out.push('{');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    tidy(&out)
}

/// Strip what an empty substitution leaves behind: `()`, `[]`, doubled dashes, edge punctuation.
fn tidy(s: &str) -> String {
    let mut s = s.to_string();
    loop {
        let before = s.len();
        for empty in ["()", "（）", "[]", "【】", "--"] {
            let replacement = if empty == "--" { "-" } else { "" };
            s = s.replace(empty, replacement);
        }
        if s.len() == before {
            break;
        }
    }
    s.trim_matches(|c: char| c.is_whitespace() || matches!(c, '-' | '_' | '|' | ':' | '：'))
        .to_string()
}

/// Denoised text of every non-amount cell in a row.
pub fn context_text(row: &[String], amount_column: usize, max_chars: usize) -> String {
    let mut parts: Vec<&str> = Vec::new();
    for (i, cell) in row.iter().enumerate() {
        let cell = cell.trim();
        if i == amount_column || cell.is_empty() || cell.chars().count() == 1 || is_amount(cell) {
            continue;
        }
        if parts.last() == Some(&cell) {
            continue;
        }
        parts.push(cell);
    }
    let joined = parts.join(CONTEXT_SEPARATOR);
    if joined.chars().count() <= max_chars {
        return joined;
    }
    let mut cut: String = joined.chars().take(max_chars.saturating_sub(1)).collect();
    cut.push(ELLIPSIS);
    cut
}

/// Key under which a row's AI summary is stored: name-column values joined,
/// trimmed the same way the summarizer trims its inputs.
pub fn summary_key(row: &[String], name_columns: &[usize]) -> String {
    name_columns
        .iter()
        .map(|&c| row.get(c).map(String::as_str).unwrap_or("").trim())
        .collect::<Vec<_>>()
        .join(CONTEXT_SEPARATOR)
        .trim()
        .to_string()
}

/// Build entries from every data row below the header.
pub fn extract_entries(
    grid: &Grid,
    header: &HeaderDecision,
    roles: &ColumnRoles,
    summaries: &HashMap<String, String>,
    source: Source,
    settings: &ParseSettings,
) -> Result<ExtractionReport, ReconError> {
    let mut entries = Vec::new();
    let mut skipped = Vec::new();

    for (idx, row) in grid.rows().iter().enumerate().skip(header.data_start()) {
        if row.iter().all(|c| c.is_empty()) {
            continue;
        }
        let row_number = idx + 1;
        let amount_cell = row.get(roles.amount_column).map(String::as_str).unwrap_or("");

        let parsed = if roles.composite_mode {
            match split_composite(amount_cell) {
                Some(split) => Ok(split),
                None if amount_cell.is_empty() || is_amount(amount_cell) => Err(SkipReason::EmptyName),
                None => Err(SkipReason::BadAmount(amount_cell.to_string())),
            }
        } else {
            let values: Vec<&str> = roles
                .name_columns
                .iter()
                .map(|&c| row.get(c).map(String::as_str).unwrap_or(""))
                .collect();
            let name = apply_rule(&roles.combination_rule, &values);
            if name.is_empty() {
                Err(SkipReason::EmptyName)
            } else {
                parse_amount(amount_cell)
                    .map(|amount| (name, amount))
                    .map_err(|_| SkipReason::BadAmount(amount_cell.to_string()))
            }
        };

        let (original_name, amount) = match parsed {
            Ok(parsed) => parsed,
            Err(reason) => {
                log::warn!("{} row {} skipped: {}", source, row_number, reason);
                skipped.push(SkippedRow {
                    row: row_number,
                    reason,
                });
                continue;
            }
        };

        let context = context_text(row, roles.amount_column, settings.context_max_chars);
        let name = summaries
            .get(&summary_key(row, &roles.name_columns))
            .cloned()
            .or_else(|| (!context.is_empty()).then(|| context.clone()))
            .unwrap_or_else(|| original_name.clone());

        entries.push(Entry {
            id: format!("{}_{}", source, row_number),
            name,
            original_name,
            amount,
            source,
            context_text: context,
            original_index: idx,
            category: None,
        });
    }

    if entries.is_empty() {
        return Err(ReconError::StructureUnresolved {
            source: Some(source),
            detail: format!("no valid data rows ({} rows skipped)", skipped.len()),
        });
    }

    log::info!(
        "{}: {} entries extracted, {} rows skipped",
        source,
        entries.len(),
        skipped.len()
    );
    Ok(ExtractionReport { entries, skipped })
}
