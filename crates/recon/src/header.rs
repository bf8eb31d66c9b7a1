//! Header Locator.
//!
//! Finds the header row in the first few grid rows. A cheap heuristic
//! handles most ledgers; when a credential is present the AI gets to
//! overrule it with a confident answer, and may also declare that the
//! sheet has no header at all, in which case column names are synthesized.

use ledgermatch_ai::reply::{ColumnNamesReply, HeaderRowReply};
use ledgermatch_ai::ChatRequest;
use ledgermatch_config::ParseSettings;
use ledgermatch_io::Grid;

use crate::amount::is_amount;
use crate::assist::AiAccess;
use crate::attempt::{Attempt, AttemptChain, Floor};
use crate::model::{HeaderDecision, HeaderSource};

const HEURISTIC_CONFIDENCE: f64 = 0.7;
const AI_HEADER_FLOOR: f64 = 0.5;
const STRUCTURE_TEMPERATURE: f32 = 0.1;
const STRUCTURE_MAX_TOKENS: u32 = 600;
const CELL_PREVIEW_CHARS: usize = 30;
const NAMING_SAMPLE_ROWS: usize = 5;

#[derive(Debug, Clone, PartialEq)]
pub struct HeaderOutcome {
    pub decision: HeaderDecision,
    /// One name per grid column
    pub headers: Vec<String>,
    pub strategies: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Candidate {
    Row(usize),
    NoHeader,
}

/// Per-row cell statistics used by the heuristic and the AI prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RowStats {
    pub non_empty: usize,
    pub numeric: usize,
    pub text: usize,
}

pub fn row_stats(row: &[String]) -> RowStats {
    let mut stats = RowStats::default();
    for cell in row.iter().filter(|c| !c.is_empty()) {
        stats.non_empty += 1;
        if is_amount(cell) {
            stats.numeric += 1;
        } else {
            stats.text += 1;
        }
    }
    stats
}

/// First row with at least two filled cells, one of them non-numeric.
pub fn heuristic_header_row(grid: &Grid, scan_rows: usize) -> Option<usize> {
    grid.rows()
        .iter()
        .take(scan_rows)
        .position(|row| {
            let stats = row_stats(row);
            stats.non_empty >= 2 && stats.text >= 1
        })
}

/// Locate the header row. Never fails: AI errors fall back to the heuristic
/// or to synthesized placeholder names.
pub fn locate_header(grid: &Grid, settings: &ParseSettings, ai: &AiAccess) -> HeaderOutcome {
    let scan = settings.header_scan_rows.min(grid.height());

    let outcome = AttemptChain::new()
        .step("ai-header", Floor::Above(AI_HEADER_FLOOR), || {
            if !ai.is_available() {
                return None;
            }
            ask_header_row(grid, scan, ai)
        })
        .step("heuristic-header", Floor::None, || {
            heuristic_header_row(grid, scan).map(|row| {
                Attempt::new(Candidate::Row(row), HEURISTIC_CONFIDENCE, HeaderSource::Heuristic)
            })
        })
        .run();

    let mut strategies = outcome.tried;

    if let Some(Attempt {
        value: Candidate::Row(row),
        confidence,
        source,
    }) = outcome.winner
    {
        log::info!("header row {} ({:?}, confidence {:.2})", row + 1, source, confidence);
        return HeaderOutcome {
            decision: HeaderDecision {
                row_index: row as i64,
                confidence,
                source,
            },
            headers: grid.row(row).map(<[String]>::to_vec).unwrap_or_default(),
            strategies,
        };
    }

    strategies.push("synthesized-header".to_string());
    let headers = synthesize_headers(grid, ai);
    log::info!("no header row found; using synthesized column names {:?}", headers);
    HeaderOutcome {
        decision: HeaderDecision::synthesized(),
        headers,
        strategies,
    }
}

fn ask_header_row(
    grid: &Grid,
    scan: usize,
    ai: &AiAccess,
) -> Option<Attempt<Candidate, HeaderSource>> {
    let request = ChatRequest::new(
        "You analyse spreadsheet layouts. Reply with JSON only.",
        header_prompt(grid, scan),
    )
    .temperature(STRUCTURE_TEMPERATURE)
    .max_tokens(STRUCTURE_MAX_TOKENS);

    let reply: HeaderRowReply = match ai.ask(&request) {
        Ok(reply) => reply,
        Err(e) => {
            log::warn!("AI header detection failed, using heuristic: {}", e);
            return None;
        }
    };

    let candidate = match reply.header_row_index {
        -1 => Candidate::NoHeader,
        idx if idx >= 0 && (idx as usize) < scan => Candidate::Row(idx as usize),
        idx => {
            log::warn!("AI proposed header row {} outside the inspected rows", idx);
            return None;
        }
    };
    log::debug!("AI header answer {:?}: {}", candidate, reply.reason);
    Some(Attempt::new(candidate, reply.confidence, HeaderSource::Ai))
}

fn header_prompt(grid: &Grid, scan: usize) -> String {
    let mut prompt = String::from(
        "Below are the first rows of a ledger spreadsheet (0-based row index), \
         with per-row cell statistics.\n\n",
    );
    for (idx, row) in grid.rows().iter().take(scan).enumerate() {
        let stats = row_stats(row);
        let preview: Vec<String> = row.iter().map(|c| preview(c)).collect();
        prompt.push_str(&format!(
            "Row {}: non-empty={}, numeric={}, text={} | {}\n",
            idx,
            stats.non_empty,
            stats.numeric,
            stats.text,
            preview.join(" | ")
        ));
    }
    prompt.push_str(
        "\nWhich row is the header row holding the column titles? Titles, notes and \
         blank rows above the header are not headers. If the sheet has no header row \
         and starts directly with data, answer -1.\n\
         Return ONLY JSON: {\"headerRowIndex\": <int>, \"reason\": \"...\", \
         \"confidence\": <0..1>, \"rowType\": \"header|data|title\"}",
    );
    prompt
}

/// Column names for a sheet without a header: AI proposals where available,
/// `Column N` everywhere else.
fn synthesize_headers(grid: &Grid, ai: &AiAccess) -> Vec<String> {
    let width = grid.width();
    let mut names: Vec<String> = (1..=width).map(|n| format!("Column {}", n)).collect();

    if !ai.is_available() {
        return names;
    }

    let mut prompt = format!(
        "A ledger spreadsheet has {} columns and no header row. First data rows:\n",
        width
    );
    for row in grid
        .rows()
        .iter()
        .filter(|r| r.iter().any(|c| !c.is_empty()))
        .take(NAMING_SAMPLE_ROWS)
    {
        let cells: Vec<String> = row.iter().map(|c| preview(c)).collect();
        prompt.push_str(&format!("- {}\n", cells.join(" | ")));
    }
    prompt.push_str(&format!(
        "\nPropose a short name for each of the {} columns describing what it holds \
         (for example \"项目名称\" or \"金额\").\n\
         Return ONLY JSON: {{\"columnNames\": [\"...\", ...]}}",
        width
    ));

    let request = ChatRequest::new("You analyse spreadsheet layouts. Reply with JSON only.", prompt)
        .temperature(STRUCTURE_TEMPERATURE)
        .max_tokens(STRUCTURE_MAX_TOKENS);

    match ai.ask::<ColumnNamesReply>(&request) {
        Ok(reply) => {
            for (slot, proposed) in names.iter_mut().zip(reply.column_names) {
                let proposed = proposed.trim();
                if !proposed.is_empty() {
                    *slot = proposed.to_string();
                }
            }
        }
        Err(e) => log::warn!("AI column naming failed, using placeholders: {}", e),
    }
    names
}

fn preview(cell: &str) -> String {
    if cell.chars().count() > CELL_PREVIEW_CHARS {
        let cut: String = cell.chars().take(CELL_PREVIEW_CHARS).collect();
        format!("{}…", cut)
    } else {
        cell.to_string()
    }
}
