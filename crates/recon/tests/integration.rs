use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use ledgermatch_ai::{AiError, Assistant, ChatRequest};
use ledgermatch_config::{Credential, ParseSettings, Settings};
use ledgermatch_io::Grid;
use ledgermatch_recon::columns::resolve_roles;
use ledgermatch_recon::header::locate_header;
use ledgermatch_recon::{
    calculate, ingest_classification, parse_file, AiAccess, Amount, CategoryStatus, Entry,
    ErrorKind, Locale, ReconReport, Source, Stage, Workflow, UNCLASSIFIED,
};
use proptest::prelude::*;
use serde_json::json;

const KEY: &str = "sk-integration0123456789abcdefghij";

// -------------------------------------------------------------------------
// Fixtures
// -------------------------------------------------------------------------

fn write(dir: &Path, name: &str, contents: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, contents).unwrap();
    path
}

const STANDARD_CSV: &str = "\
2024年3月费用明细,
项目名称,金额
员工工资,\"¥5,000.00\"
办公室租金,3000
水电费,200
办公用品,150.50
差旅报销,800
";

const CHECK_CSV: &str = "\
名称;金额
工资发放;5000
房租;3000.00
水电;200
文具;150.5
出差;800
";

/// Scripted provider: a fixed classification, a fixed summary, and a
/// refusal for everything else (structure questions fall back locally).
struct Ledgers {
    classify_failures: AtomicUsize,
    calls: AtomicUsize,
}

impl Ledgers {
    fn new(classify_failures: usize) -> Self {
        Self {
            classify_failures: AtomicUsize::new(classify_failures),
            calls: AtomicUsize::new(0),
        }
    }
}

impl Assistant for Ledgers {
    fn complete(&self, credential: &str, request: &ChatRequest) -> Result<String, AiError> {
        assert_eq!(credential, KEY);
        self.calls.fetch_add(1, Ordering::SeqCst);
        let text = request.user_text();
        if text.contains("Group the entries") {
            if self.classify_failures.load(Ordering::SeqCst) > 0 {
                self.classify_failures.fetch_sub(1, Ordering::SeqCst);
                return Err(AiError::Timeout);
            }
            return Ok(json!({
                "categories": {
                    "人工": {"subcategories": {
                        "工资": {"standard": ["standard_3"], "check": ["check_2"]}
                    }},
                    "租金": {"standard": ["standard_4"], "check": ["check_3"]},
                    "水电": {"standard": ["standard_5"], "check": ["check_4"]},
                    "办公": {"standard": ["standard_6"], "check": ["check_5"]},
                    "差旅": {"standard": ["standard_7"], "check": ["check_6"]}
                }
            })
            .to_string());
        }
        if text.contains("Reconciliation result per category") {
            return Ok("两份账目完全一致。".to_string());
        }
        Err(AiError::Api {
            status: 503,
            message: "not scripted".into(),
        })
    }
}

// -------------------------------------------------------------------------
// End to end
// -------------------------------------------------------------------------

#[test]
fn matching_ledgers_reach_summary() {
    let dir = tempfile::tempdir().unwrap();
    let standard = write(dir.path(), "standard.csv", STANDARD_CSV);
    let check = write(dir.path(), "check.csv", CHECK_CSV);

    let assistant = Ledgers::new(0);
    let mut wf = Workflow::new(&assistant, Settings::default(), Locale::ZhCn);
    wf.set_file(Source::Standard, &standard);
    wf.set_file(Source::Check, &check);
    wf.set_credential(KEY);

    wf.next();
    assert_eq!(wf.stage(), Stage::Display, "{:?}", wf.error_message());
    let parsed = wf.parsed().unwrap();
    assert_eq!(parsed.standard.entries.len(), 5);
    assert_eq!(parsed.check.entries.len(), 5);
    assert_eq!(parsed.standard.entries[0].amount, Amount::from_cents(500000));

    wf.next();
    assert_eq!(wf.stage(), Stage::ManualConfirm);
    assert!(!wf.categories().contains_key(UNCLASSIFIED));

    wf.skip();
    assert_eq!(wf.stage(), Stage::Compare);
    wf.next();

    assert_eq!(wf.stage(), Stage::Summarize);
    assert!(wf.error().is_none());
    assert!(!wf.is_loading());
    assert_eq!(wf.summary(), "两份账目完全一致。");
    assert_eq!(wf.categories().len(), 5);
    for category in wf.categories().values() {
        assert_eq!(category.status, CategoryStatus::Match, "{}", category.name);
        assert_eq!(category.difference.to_string(), "0.00");
    }
    assert!(wf.categories().contains_key("人工/工资"));

    let report = ReconReport::from_context(wf.context());
    assert!(report.is_clean());
    assert_eq!(report.totals.standard, Amount::from_cents(915050));

    wf.restart();
    assert_eq!(wf.stage(), Stage::Upload);
    assert!(wf.parsed().is_none());
    assert!(wf.context().credential.is_some());
}

#[test]
fn classify_failure_can_be_retried_without_reparsing() {
    let dir = tempfile::tempdir().unwrap();
    let standard = write(dir.path(), "standard.csv", STANDARD_CSV);
    let check = write(dir.path(), "check.csv", CHECK_CSV);

    let assistant = Ledgers::new(1);
    let mut wf = Workflow::new(&assistant, Settings::default(), Locale::EnUs);
    wf.set_file(Source::Standard, &standard);
    wf.set_file(Source::Check, &check);
    wf.set_credential(KEY);
    wf.next();
    wf.next();

    assert_eq!(wf.stage(), Stage::Classify);
    assert_eq!(wf.error().map(|e| e.kind()), Some(ErrorKind::RemoteCallFailed));
    assert!(wf.error_message().unwrap().starts_with("API call failed"));

    // deleting the files proves the retry does not re-parse
    fs::remove_file(&standard).unwrap();
    wf.retry();
    assert_eq!(wf.stage(), Stage::ManualConfirm);
    assert!(wf.error().is_none());
    assert_eq!(wf.parsed().unwrap().standard.entries.len(), 5);
}

#[test]
fn manual_move_is_totalled_at_calculate() {
    let dir = tempfile::tempdir().unwrap();
    let standard = write(dir.path(), "standard.csv", STANDARD_CSV);
    let check = write(dir.path(), "check.csv", CHECK_CSV);

    let assistant = Ledgers::new(0);
    let mut wf = Workflow::new(&assistant, Settings::default(), Locale::EnUs);
    wf.set_file(Source::Standard, &standard);
    wf.set_file(Source::Check, &check);
    wf.set_credential(KEY);
    wf.next();
    wf.next();

    wf.move_entry("check_6", "差旅", "办公");
    wf.move_entry("check_99", "差旅", "办公");
    assert_eq!(wf.categories()["办公"].check.len(), 2);

    wf.next();
    assert_eq!(wf.stage(), Stage::Compare);
    assert_eq!(wf.categories()["办公"].status, CategoryStatus::Mismatch);
    assert_eq!(wf.categories()["办公"].difference, Amount::from_cents(80000));
    assert_eq!(wf.categories()["差旅"].status, CategoryStatus::Missing);
}

#[test]
fn missing_files_block_upload() {
    let assistant = Ledgers::new(0);
    let mut wf = Workflow::new(&assistant, Settings::default(), Locale::EnUs);
    wf.set_credential(KEY);
    wf.next();
    assert_eq!(wf.stage(), Stage::Upload);
    assert!(wf.error().is_none());
    assert_eq!(assistant.calls.load(Ordering::SeqCst), 0);
}

// -------------------------------------------------------------------------
// Structure inference
// -------------------------------------------------------------------------

struct Forbidden;

impl Assistant for Forbidden {
    fn complete(&self, _credential: &str, _request: &ChatRequest) -> Result<String, AiError> {
        panic!("no AI call expected");
    }
}

#[test]
fn keyword_headers_resolve_without_ai() {
    let grid = Grid::from_rows(&[
        vec!["项目名称", "金额"],
        vec!["工资", "5000"],
        vec!["房租", "3000"],
    ])
    .unwrap();
    let key = Credential::new(KEY);
    let ai = AiAccess::new(&Forbidden, Some(&key));
    let offline = AiAccess::offline();
    let header = locate_header(&grid, &ParseSettings::default(), &offline);
    assert_eq!(header.decision.row_index, 0);

    let outcome = resolve_roles(
        &grid,
        &header.decision,
        &header.headers,
        &ParseSettings::default(),
        &ai,
    )
    .unwrap();
    assert_eq!(outcome.roles.name_columns, vec![0]);
    assert_eq!(outcome.roles.amount_column, 1);
}

#[test]
fn single_column_composite_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = write(dir.path(), "composite.csv", "员工工资:5000.00\n房租：3000元\n备注\n");
    let parsed = parse_file(&path, Source::Standard, &Settings::default(), &AiAccess::offline())
        .unwrap();

    assert!(parsed.roles.composite_mode);
    assert_eq!(parsed.header.row_index, -1);
    assert_eq!(parsed.entries[0].name, "员工工资");
    assert_eq!(parsed.entries[0].amount, Amount::from_cents(500000));
    assert_eq!(parsed.entries[1].original_name, "房租");
    assert_eq!(parsed.skipped.len(), 1);
}

#[test]
fn unreadable_structure_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let path = write(dir.path(), "notes.csv", "备注,说明\n按月,季度\n");
    let err = parse_file(&path, Source::Check, &Settings::default(), &AiAccess::offline())
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::StructureUnresolved);
    assert!(err.to_string().starts_with("check file structure unresolved"));
}

// -------------------------------------------------------------------------
// Classification and totals
// -------------------------------------------------------------------------

fn entry(source: Source, row: usize, cents: i64) -> Entry {
    Entry {
        id: format!("{}_{}", source, row),
        name: format!("item {}", row),
        original_name: format!("item {}", row),
        amount: Amount::from_cents(cents),
        source,
        context_text: String::new(),
        original_index: row - 1,
        category: None,
    }
}

#[test]
fn non_json_reply_falls_back_to_unclassified() {
    let standard = vec![entry(Source::Standard, 2, 100), entry(Source::Standard, 3, 200)];
    let check = vec![entry(Source::Check, 2, 300)];
    let result = ingest_classification("I could not do that.", &standard, &check, Locale::EnUs);

    assert_eq!(result.categories.len(), 1);
    let bucket = &result.categories[UNCLASSIFIED];
    assert_eq!(bucket.standard.len() + bucket.check.len(), 3);
    assert_eq!(bucket.status, CategoryStatus::Mismatch);
}

#[test]
fn calculate_twice_is_stable() {
    let standard = vec![entry(Source::Standard, 2, 100), entry(Source::Standard, 3, 250)];
    let check = vec![entry(Source::Check, 2, 100), entry(Source::Check, 3, 200)];
    let reply = r#"{"categories": {"a": {"standard": ["standard_2"], "check": ["check_2"]},
                                   "b": {"standard": ["standard_3"], "check": ["check_3"]}}}"#;
    let categories = ingest_classification(reply, &standard, &check, Locale::EnUs).categories;

    let once = calculate(&categories);
    let twice = calculate(&once);
    assert_eq!(once, twice);
    assert_eq!(once["a"].status, CategoryStatus::Match);
    assert_eq!(once["b"].difference, Amount::from_cents(50));
}

proptest! {
    #[test]
    fn category_totals_sum_to_entry_totals(
        rows in prop::collection::vec((any::<bool>(), -500_000i64..500_000, 0usize..5, any::<bool>()), 1..30)
    ) {
        let mut standard = Vec::new();
        let mut check = Vec::new();
        let mut tree = serde_json::Map::new();

        for (i, (is_standard, cents, bucket, listed)) in rows.iter().enumerate() {
            let source = if *is_standard { Source::Standard } else { Source::Check };
            let e = entry(source, i + 2, *cents);
            if *listed {
                let node = tree
                    .entry(format!("c{}", bucket))
                    .or_insert_with(|| json!({"standard": [], "check": []}));
                node[source.as_str()].as_array_mut().unwrap().push(json!(e.id));
            }
            if *is_standard { standard.push(e) } else { check.push(e) }
        }

        let reply = json!({ "categories": tree }).to_string();
        let result = ingest_classification(&reply, &standard, &check, Locale::EnUs);
        prop_assert!(!result.fell_back);

        let placed: usize = result.categories.values().map(|c| c.standard.len() + c.check.len()).sum();
        prop_assert_eq!(placed, rows.len());

        let total_standard: Amount = result.categories.values().map(|c| c.total_standard).sum();
        let expected: Amount = standard.iter().map(|e| e.amount).sum();
        prop_assert_eq!(total_standard, expected);
        let total_check: Amount = result.categories.values().map(|c| c.total_check).sum();
        let expected: Amount = check.iter().map(|e| e.amount).sum();
        prop_assert_eq!(total_check, expected);
    }
}
