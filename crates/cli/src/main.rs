// LedgerMatch CLI - headless ledger reconciliation
// Drives the same workflow the interactive front end runs, one stage after another.

mod exit_codes;
mod logging;

use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{ArgAction, Parser, Subcommand};

use ledgermatch_ai::{Assistant, HttpAssistant, Offline};
use ledgermatch_config::{AIConfigStatus, AIDiagnostics, ResolvedAIConfig, Settings};
use ledgermatch_recon::messages::{status_label, user_message};
use ledgermatch_recon::model::HeaderSource;
use ledgermatch_recon::{
    parse_file, AiAccess, ErrorKind, Locale, ParsedFile, ReconError, ReconReport, Source,
    Workflow,
};

use exit_codes::{
    recon_exit_code, ReconErrorOutput, EXIT_AI_REMOTE, EXIT_AI_UNAVAILABLE, EXIT_ERROR,
    EXIT_RECON_MISMATCH, EXIT_SUCCESS, EXIT_USAGE,
};

#[derive(Parser)]
#[command(name = "ledgermatch")]
#[command(about = "Reconcile two ledgers category by category")]
#[command(long_version = long_version())]
#[command(version)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug); LEDGERMATCH_LOG applies otherwise
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    /// Settings file [default: <config dir>/ledgermatch/settings.json]
    #[arg(long, global = true, env = "LEDGERMATCH_CONFIG", value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run structure detection on one file and show what was extracted
    #[command(after_help = "\
Examples:
  ledgermatch inspect expenses.xlsx
  ledgermatch inspect bank.csv --json | jq '.entries | length'
  ledgermatch inspect ledger.csv -vv          # show every strategy attempt")]
    Inspect {
        /// Ledger file (.csv, .xlsx, .xls)
        file: PathBuf,

        /// API key (overrides keychain and LEDGERMATCH_<PROVIDER>_KEY)
        #[arg(long)]
        key: Option<String>,

        /// Print the parse result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Reconcile a standard ledger against a check ledger
    #[command(after_help = "\
Examples:
  ledgermatch run budget.xlsx actual.csv
  ledgermatch run a.csv b.csv --lang en-US --output report.json
  ledgermatch run a.csv b.csv --move check_4:Rent:Utilities --strict

Exit codes:
  0   reconciled (or finished without --strict)
  3-5 input, file, or structure problem
  10  AI disabled or no API key
  11  AI provider call failed
  12  AI reply unusable
  20  --strict and some category did not match")]
    Run {
        /// Standard (reference) ledger
        standard: PathBuf,

        /// Check ledger, compared against the standard
        check: PathBuf,

        /// API key (overrides keychain and LEDGERMATCH_<PROVIDER>_KEY)
        #[arg(long)]
        key: Option<String>,

        /// Move an entry between categories before totals are computed
        #[arg(long = "move", value_name = "ID:FROM:TO", value_parser = parse_move)]
        moves: Vec<MoveSpec>,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,

        /// Also write the JSON report to this file
        #[arg(long, short = 'o', value_name = "FILE")]
        output: Option<PathBuf>,

        /// Exit 20 unless every category matches
        #[arg(long)]
        strict: bool,

        /// Language for messages and the AI summary (zh-CN, en-US)
        #[arg(long, default_value = "zh-CN")]
        lang: Locale,
    },

    /// Show AI provider configuration and key status
    #[command(after_help = "\
Examples:
  ledgermatch doctor
  ledgermatch doctor --test           # also call GET /models with the key
  ledgermatch doctor --json")]
    Doctor {
        /// Output as JSON
        #[arg(long)]
        json: bool,

        /// Check the key against the provider
        #[arg(long)]
        test: bool,
    },
}

/// `--move ID:FROM:TO`. The id ends at the first colon, the target
/// category starts after the last one.
#[derive(Debug, Clone, PartialEq)]
struct MoveSpec {
    entry_id: String,
    from: String,
    to: String,
}

fn parse_move(s: &str) -> Result<MoveSpec, String> {
    let (entry_id, rest) = s
        .split_once(':')
        .ok_or_else(|| format!("expected ID:FROM:TO, got \"{}\"", s))?;
    let (from, to) = rest
        .rsplit_once(':')
        .ok_or_else(|| format!("expected ID:FROM:TO, got \"{}\"", s))?;

    let spec = MoveSpec {
        entry_id: entry_id.trim().to_string(),
        from: from.trim().to_string(),
        to: to.trim().to_string(),
    };
    if spec.entry_id.is_empty() || spec.from.is_empty() || spec.to.is_empty() {
        return Err(format!("empty part in \"{}\" (expected ID:FROM:TO)", s));
    }
    Ok(spec)
}

fn long_version() -> &'static str {
    if cfg!(debug_assertions) {
        concat!(
            env!("CARGO_PKG_VERSION"),
            " (", env!("GIT_COMMIT_HASH"), ")",
            "\nengine:  ledgermatch-recon ", env!("CARGO_PKG_VERSION"),
            "\nbuild:   debug",
            "\ntarget:  ", env!("TARGET"),
        )
    } else {
        concat!(
            env!("CARGO_PKG_VERSION"),
            " (", env!("GIT_COMMIT_HASH"), ")",
            "\nengine:  ledgermatch-recon ", env!("CARGO_PKG_VERSION"),
            "\nbuild:   release",
            "\ntarget:  ", env!("TARGET"),
        )
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let _logger = logging::init(cli.verbose);

    let settings = load_settings(cli.config.as_deref());

    let result = match cli.command {
        Commands::Inspect { file, key, json } => cmd_inspect(&settings, &file, key.as_deref(), json),
        Commands::Run {
            standard,
            check,
            key,
            moves,
            json,
            output,
            strict,
            lang,
        } => cmd_run(settings, RunArgs {
            standard,
            check,
            key,
            moves,
            json,
            output,
            strict,
            locale: lang,
        }),
        Commands::Doctor { json, test } => cmd_doctor(&settings, json, test),
    };

    match result {
        Ok(()) => ExitCode::from(EXIT_SUCCESS),
        Err(CliError { code, message, hint }) => {
            if !message.is_empty() {
                eprintln!("error: {}", message);
            }
            if let Some(hint) = hint {
                eprintln!("hint:  {}", hint);
            }
            ExitCode::from(code)
        }
    }
}

#[derive(Debug)]
pub struct CliError {
    pub code: u8,
    pub message: String,
    pub hint: Option<String>,
}

impl CliError {
    pub fn args(msg: impl Into<String>) -> Self {
        Self { code: EXIT_USAGE, message: msg.into(), hint: None }
    }

    pub fn io(msg: impl Into<String>) -> Self {
        Self { code: EXIT_ERROR, message: msg.into(), hint: None }
    }

    /// Error already printed (e.g. as JSON); only the exit code remains.
    pub fn silent(code: u8) -> Self {
        Self { code, message: String::new(), hint: None }
    }

    /// Create error from a pipeline/workflow error with proper exit code.
    pub fn recon(err: &ReconError, locale: Locale) -> Self {
        Self {
            code: recon_exit_code(err),
            message: format!("{}: {}", user_message(err.kind(), locale), err),
            hint: recon_hint(err.kind()),
        }
    }

    /// Add a hint to an existing error.
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}

fn recon_hint(kind: ErrorKind) -> Option<String> {
    match kind {
        ErrorKind::InputMissing => Some("pass both files and --key (or configure a key)".to_string()),
        ErrorKind::FileUnreadable => Some("supported formats: .csv, .xlsx, .xls".to_string()),
        ErrorKind::StructureUnresolved => {
            Some("run `ledgermatch inspect <file> -vv` to see which strategies were tried".to_string())
        }
        ErrorKind::RemoteCallFailed => Some("check the key and endpoint with `ledgermatch doctor --test`".to_string()),
        ErrorKind::ResponseUnparseable => None,
    }
}

// ============================================================================
// Shared setup
// ============================================================================

fn load_settings(path: Option<&Path>) -> Settings {
    match path {
        Some(path) => Settings::load_from(path),
        None => Settings::load(),
    }
}

/// Network assistant for an enabled provider, the offline stand-in otherwise.
fn assistant_for(config: &ResolvedAIConfig) -> Result<Box<dyn Assistant>, CliError> {
    if !config.provider.is_enabled() {
        return Ok(Box::new(Offline));
    }
    let assistant = HttpAssistant::from_config(config).map_err(|e| CliError {
        code: EXIT_AI_REMOTE,
        message: format!("cannot create AI client: {}", e),
        hint: None,
    })?;
    log::debug!("AI client: {} model={}", assistant.endpoint(), assistant.model());
    Ok(Box::new(assistant))
}

fn header_label(source: HeaderSource) -> &'static str {
    match source {
        HeaderSource::Heuristic => "heuristic",
        HeaderSource::Ai => "ai",
        HeaderSource::Synthesized => "synthesized",
    }
}

fn column_label(headers: &[String], idx: usize) -> String {
    match headers.get(idx).filter(|h| !h.is_empty()) {
        Some(name) => format!("[{}] \"{}\"", idx, name),
        None => format!("[{}]", idx),
    }
}

// ============================================================================
// inspect
// ============================================================================

fn cmd_inspect(settings: &Settings, file: &Path, key: Option<&str>, json: bool) -> Result<(), CliError> {
    let config = ResolvedAIConfig::resolve(&settings.ai, key);
    let assistant = assistant_for(&config)?;
    let ai = AiAccess::new(assistant.as_ref(), config.credential.as_ref());
    if !ai.is_available() {
        log::info!(
            "AI unavailable ({}); using local heuristics only",
            config.blocking_reason.as_deref().unwrap_or("no usable key")
        );
    }

    let parsed = parse_file(file, Source::Standard, settings, &ai)
        .map_err(|e| CliError::recon(&e, Locale::default()))?;

    if json {
        let output = serde_json::to_string_pretty(&parsed)
            .map_err(|e| CliError::io(format!("failed to serialize result: {}", e)))?;
        println!("{}", output);
    } else {
        print_parsed(file, &parsed);
    }
    Ok(())
}

fn print_parsed(file: &Path, parsed: &ParsedFile) {
    println!("file:       {}", file.display());
    if parsed.header.row_index < 0 {
        println!("header:     none ({})", parsed.headers.join(", "));
    } else {
        println!(
            "header:     row {} (confidence {:.2}, {})",
            parsed.header.row_index + 1,
            parsed.header.confidence,
            header_label(parsed.header.source)
        );
    }

    let roles = &parsed.roles;
    let names: Vec<String> = roles
        .name_columns
        .iter()
        .map(|&i| column_label(&parsed.headers, i))
        .collect();
    println!("name:       {} ({})", names.join(" + "), roles.source);
    if roles.name_columns.len() > 1 {
        println!("rule:       {}", roles.combination_rule);
    }
    if roles.composite_mode {
        println!("amount:     split from the name cell (composite)");
    } else {
        println!(
            "amount:     {} ({})",
            column_label(&parsed.headers, roles.amount_column),
            roles.amount_source
        );
    }
    println!("strategies: {}", parsed.strategies.join(" -> "));
    println!(
        "entries:    {} ({} rows skipped)",
        parsed.entries.len(),
        parsed.skipped.len()
    );

    if !parsed.entries.is_empty() {
        println!();
        let id_width = parsed.entries.iter().map(|e| e.id.len()).max().unwrap_or(2).max(2);
        for e in &parsed.entries {
            println!("  {:<width$}  {:>14}  {}", e.id, e.amount.to_string(), e.name, width = id_width);
        }
    }
    if !parsed.skipped.is_empty() {
        println!();
        println!("skipped:");
        for s in &parsed.skipped {
            println!("  row {}: {}", s.row, s.reason);
        }
    }
}

// ============================================================================
// run
// ============================================================================

struct RunArgs {
    standard: PathBuf,
    check: PathBuf,
    key: Option<String>,
    moves: Vec<MoveSpec>,
    json: bool,
    output: Option<PathBuf>,
    strict: bool,
    locale: Locale,
}

fn cmd_run(settings: Settings, args: RunArgs) -> Result<(), CliError> {
    let config = ResolvedAIConfig::resolve(&settings.ai, args.key.as_deref());
    let credential = match (config.status, &config.credential) {
        (AIConfigStatus::Disabled, _) | (_, None) => {
            let reason = config
                .blocking_reason
                .clone()
                .unwrap_or_else(|| "no API key".to_string());
            return Err(CliError {
                code: EXIT_AI_UNAVAILABLE,
                message: format!("classification needs an AI provider: {}", reason),
                hint: Some("run `ledgermatch doctor` to inspect the AI configuration".to_string()),
            });
        }
        (_, Some(credential)) => credential.as_str().to_string(),
    };
    if config.status == AIConfigStatus::MalformedKey {
        log::warn!("{}", config.blocking_reason.as_deref().unwrap_or("malformed API key"));
    }

    let assistant = assistant_for(&config)?;
    let mut workflow = Workflow::new(assistant.as_ref(), settings, args.locale);

    workflow.set_file(Source::Standard, args.standard.clone());
    workflow.set_file(Source::Check, args.check.clone());
    workflow.set_credential(credential);

    // Upload -> Parse -> Display
    workflow.next();
    stage_result(&workflow, args.json)?;

    // Display -> Classify -> ManualConfirm
    workflow.next();
    stage_result(&workflow, args.json)?;

    for m in &args.moves {
        let known = workflow
            .categories()
            .get(&m.from)
            .is_some_and(|c| c.standard.iter().chain(&c.check).any(|e| e.id == m.entry_id));
        if !known {
            return Err(CliError::args(format!(
                "--move {}:{}:{}: no entry \"{}\" in category \"{}\"",
                m.entry_id, m.from, m.to, m.entry_id, m.from
            ))
            .with_hint(format!(
                "categories: {}",
                workflow.categories().keys().cloned().collect::<Vec<_>>().join(", ")
            )));
        }
        workflow.move_entry(&m.entry_id, &m.from, &m.to);
    }

    // ManualConfirm -> Calculate -> Compare
    workflow.next();
    // Compare -> Summarize
    workflow.next();
    stage_result(&workflow, args.json)?;

    let report = ReconReport::from_context(workflow.context());
    let report_json = report
        .to_json()
        .map_err(|e| CliError::io(format!("failed to serialize report: {}", e)))?;

    if let Some(path) = &args.output {
        fs::write(path, &report_json)
            .map_err(|e| CliError::io(format!("cannot write {}: {}", path.display(), e)))?;
        log::info!("report written to {}", path.display());
    }

    if args.json {
        println!("{}", report_json);
    } else {
        print_report(&report);
    }

    if args.strict && !report.is_clean() {
        return Err(CliError::silent(EXIT_RECON_MISMATCH));
    }
    Ok(())
}

/// Surface the error left by the stage that just ran.
fn stage_result(workflow: &Workflow, json: bool) -> Result<(), CliError> {
    let Some(err) = workflow.error() else {
        return Ok(());
    };
    let locale = workflow.context().locale;
    let stage = workflow.stage();

    if json {
        let message = workflow.error_message().unwrap_or_else(|| err.to_string());
        ReconErrorOutput::new(err, message, Some(stage.to_string())).print(true);
        return Err(CliError::silent(recon_exit_code(err)));
    }
    let mut cli_err = CliError::recon(err, locale);
    cli_err.message = format!("{} (stage: {})", cli_err.message, stage);
    Err(cli_err)
}

fn print_report(report: &ReconReport) {
    let locale = report.locale;
    let name_width = report
        .categories
        .iter()
        .map(|c| c.name.chars().count())
        .max()
        .unwrap_or(8)
        .max(8);

    for c in &report.categories {
        let pad = name_width - c.name.chars().count();
        println!(
            "{}{}  {:>14}  {:>14}  {:>14}  {}",
            c.name,
            " ".repeat(pad),
            c.total_standard.to_string(),
            c.total_check.to_string(),
            c.difference.to_string(),
            status_label(c.status, locale)
        );
    }
    println!();
    println!(
        "total: standard {}, check {}, difference {}",
        report.totals.standard, report.totals.check, report.totals.difference
    );
    println!(
        "categories: {} match, {} mismatch, {} missing",
        report.status_counts.matched, report.status_counts.mismatched, report.status_counts.missing
    );
    if !report.summary.is_empty() {
        println!();
        println!("{}", report.summary);
    }
}

// ============================================================================
// doctor
// ============================================================================

fn cmd_doctor(settings: &Settings, json: bool, test: bool) -> Result<(), CliError> {
    let config = ResolvedAIConfig::resolve(&settings.ai, None);
    let diag = AIDiagnostics::from_resolved(&config);

    let test_result = if test && config.status.is_ready() {
        let outcome = HttpAssistant::from_config(&config).and_then(|assistant| match &config.credential {
            Some(credential) => assistant.check_connection(credential.as_str()),
            None => Err(ledgermatch_ai::AiError::MissingKey),
        });
        Some(outcome.map_err(|e| e.to_string()))
    } else {
        None
    };
    let test_label = match (&test_result, test) {
        (Some(Ok(())), _) => "ok".to_string(),
        (Some(Err(e)), _) => format!("failed: {}", e),
        (None, true) => "skipped (not ready)".to_string(),
        (None, false) => "skipped".to_string(),
    };

    if json {
        let json_output = serde_json::json!({
            "schema_version": 1,
            "status": diag.status.as_str(),
            "blocking_reason": diag.blocking_reason,
            "provider": diag.provider,
            "model": diag.model,
            "endpoint": diag.endpoint,
            "key": if diag.key_present { "present" } else { "missing" },
            "key_masked": diag.key_masked,
            "key_source": diag.key_source.as_str(),
            "keychain": if diag.keychain_available { "ok" } else { "unavailable" },
            "config_path": Settings::config_path().display().to_string(),
            "test": test_label,
        });
        let output = serde_json::to_string_pretty(&json_output)
            .map_err(|e| CliError::io(format!("failed to serialize diagnostics: {}", e)))?;
        println!("{}", output);
    } else {
        print!("{}", diag);
        println!("Test:              {}", test_label);

        match config.status {
            AIConfigStatus::Disabled => {
                println!();
                println!("AI is disabled. To enable:");
                println!("  Set ai.provider in {}", Settings::config_path().display());
            }
            AIConfigStatus::MissingKey => {
                println!();
                println!(
                    "Fix: set {} or store the key in the keychain",
                    ledgermatch_config::ai::env_var_name(config.provider_name())
                );
            }
            _ => {}
        }
    }

    match (config.status, test_result) {
        (AIConfigStatus::Disabled, _) => Err(CliError::silent(EXIT_AI_UNAVAILABLE)),
        (AIConfigStatus::MissingKey | AIConfigStatus::MalformedKey, _) => {
            Err(CliError::silent(EXIT_AI_UNAVAILABLE))
        }
        (_, Some(Err(_))) => Err(CliError::silent(EXIT_AI_REMOTE)),
        _ => Ok(()),
    }
}
