//! The parse stage: header, roles, optional row naming, extraction.

use std::path::Path;
use std::thread;

use ledgermatch_config::Settings;
use ledgermatch_io::{load_grid, Grid};

use crate::assist::AiAccess;
use crate::columns::resolve_roles;
use crate::error::ReconError;
use crate::extract::{extract_entries, summary_key};
use crate::header::locate_header;
use crate::model::{ParsedData, ParsedFile, Source};
use crate::summarize::summarize_rows;

/// Run the full inference pipeline over one normalized grid.
pub fn parse_grid(
    grid: &Grid,
    source: Source,
    settings: &Settings,
    ai: &AiAccess,
) -> Result<ParsedFile, ReconError> {
    let header = locate_header(grid, &settings.parse, ai);
    let mut strategies = header.strategies;

    let roles = resolve_roles(grid, &header.decision, &header.headers, &settings.parse, ai)
        .map_err(|e| e.for_source(source))?;
    strategies.extend(roles.strategies);
    let roles = roles.roles;

    let summaries = if !roles.composite_mode && roles.name_columns.len() > 1 && ai.is_available() {
        strategies.push("ai-row-summary".to_string());
        let inputs: Vec<String> = grid
            .rows()
            .iter()
            .skip(header.decision.data_start())
            .filter(|row| row.iter().any(|c| !c.is_empty()))
            .map(|row| summary_key(row, &roles.name_columns))
            .collect();
        summarize_rows(&inputs, &settings.ai.row_summary, ai)
    } else {
        Default::default()
    };

    let report = extract_entries(
        grid,
        &header.decision,
        &roles,
        &summaries,
        source,
        &settings.parse,
    )?;

    Ok(ParsedFile {
        source,
        headers: header.headers,
        header: header.decision,
        roles,
        entries: report.entries,
        skipped: report.skipped,
        strategies,
    })
}

/// Load and parse one file.
pub fn parse_file(
    path: &Path,
    source: Source,
    settings: &Settings,
    ai: &AiAccess,
) -> Result<ParsedFile, ReconError> {
    let grid = load_grid(path, &settings.parse).map_err(|e| ReconError::from(e).for_source(source))?;
    log::info!(
        "{} file {}: {} rows x {} columns",
        source,
        path.display(),
        grid.height(),
        grid.width()
    );
    parse_grid(&grid, source, settings, ai)
}

/// Parse both files concurrently. Either failure fails the stage.
pub fn parse_files(
    standard: &Path,
    check: &Path,
    settings: &Settings,
    ai: &AiAccess,
) -> Result<ParsedData, ReconError> {
    let (standard, check) = thread::scope(|scope| {
        let standard = scope.spawn(|| parse_file(standard, Source::Standard, settings, ai));
        let check = scope.spawn(|| parse_file(check, Source::Check, settings, ai));
        (joined(standard.join(), Source::Standard), joined(check.join(), Source::Check))
    });
    Ok(ParsedData {
        standard: standard?,
        check: check?,
    })
}

fn joined(
    result: thread::Result<Result<ParsedFile, ReconError>>,
    source: Source,
) -> Result<ParsedFile, ReconError> {
    result.unwrap_or_else(|_| {
        Err(ReconError::FileUnreadable {
            source: Some(source),
            detail: "parser thread panicked".to_string(),
        })
    })
}
