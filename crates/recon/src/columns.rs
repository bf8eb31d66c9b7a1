//! Column Role Resolver.
//!
//! Decides which column(s) give an entry its name and which single column
//! gives its amount. Every decision runs as an [`AttemptChain`]: keyword
//! vocabularies first, then composite-cell detection, then the AI, then
//! local statistics. The chain labels end up in [`RoleOutcome::strategies`]
//! so an unresolved file can explain what was tried.

use std::collections::HashSet;

use ledgermatch_ai::reply::{AmountColumnReply, ExistingColumnReply, NameColumnsReply};
use ledgermatch_ai::ChatRequest;
use ledgermatch_config::ParseSettings;
use ledgermatch_io::Grid;

use crate::amount::is_amount;
use crate::assist::AiAccess;
use crate::attempt::{Attempt, AttemptChain, Floor};
use crate::error::ReconError;
use crate::extract::split_composite;
use crate::model::{ColumnRoles, HeaderDecision, RoleSource};

pub const NAME_KEYWORDS: &[&str] = &[
    "name", "名称", "条目", "项目", "项目名称", "摘要", "描述", "内容", "事项", "科目", "科目名称",
    "description", "item", "subject", "memo",
];

pub const AMOUNT_KEYWORDS: &[&str] = &[
    "amount", "金额", "价值", "价格", "数额", "合计", "price", "total",
];

const AI_FLOOR: f64 = 0.3;
const STRUCTURE_TEMPERATURE: f32 = 0.1;
const STRUCTURE_MAX_TOKENS: u32 = 600;
const PROMPT_SAMPLE_ROWS: usize = 5;
const SCORING_SAMPLE_ROWS: usize = 50;
const AMOUNT_PARSE_RATIO: f64 = 0.8;
const COMPOSITE_RATIO: f64 = 0.5;

#[derive(Debug, Clone, PartialEq)]
pub struct RoleOutcome {
    pub roles: ColumnRoles,
    pub strategies: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
struct NameChoice {
    columns: Vec<usize>,
    rule: String,
    composite: bool,
}

impl NameChoice {
    fn single(column: usize) -> Self {
        Self {
            columns: vec![column],
            rule: "{0}".to_string(),
            composite: false,
        }
    }
}

// ============================================================================
// Keyword matching
// ============================================================================

/// Shorter tokens ("to", "me") sit inside too many keywords by accident
const MIN_TOKEN_CHARS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Strength {
    Exact,
    Substring,
    Token,
}

fn matches(header: &str, vocabulary: &[&str], strength: Strength) -> bool {
    let header = header.trim().to_lowercase();
    if header.is_empty() {
        return false;
    }
    match strength {
        Strength::Exact => vocabulary.iter().any(|k| header == k.to_lowercase()),
        Strength::Substring => vocabulary.iter().any(|k| header.contains(&k.to_lowercase())),
        Strength::Token => header
            .split(|c: char| c.is_whitespace() || c == '_' || c == '-' || c == '－')
            .filter(|t| t.chars().count() >= MIN_TOKEN_CHARS)
            .any(|token| {
                vocabulary.iter().any(|k| {
                    let k = k.to_lowercase();
                    token.contains(&k) || k.starts_with(token)
                })
            }),
    }
}

/// Left-most header matching the vocabulary at the strongest available
/// strength, skipping `exclude`.
pub fn keyword_column(headers: &[String], vocabulary: &[&str], exclude: Option<usize>) -> Option<usize> {
    [Strength::Exact, Strength::Substring, Strength::Token]
        .into_iter()
        .find_map(|strength| {
            headers
                .iter()
                .enumerate()
                .filter(|(i, _)| Some(*i) != exclude)
                .find(|(_, h)| matches(h, vocabulary, strength))
                .map(|(i, _)| i)
        })
}

// ============================================================================
// Resolution
// ============================================================================

/// Resolve name and amount columns for a grid whose header has been located.
pub fn resolve_roles(
    grid: &Grid,
    header: &HeaderDecision,
    headers: &[String],
    settings: &ParseSettings,
    ai: &AiAccess,
) -> Result<RoleOutcome, ReconError> {
    let width = grid.width();
    let data_start = header.data_start();
    let sample = sample_rows(grid, data_start, SCORING_SAMPLE_ROWS);

    let amount_keyword = keyword_column(headers, AMOUNT_KEYWORDS, None);
    let name_keyword = keyword_column(headers, NAME_KEYWORDS, amount_keyword);

    let name = AttemptChain::new()
        .step("name-keyword", Floor::None, || {
            // One column cannot hold a name and a separate amount
            if width < 2 {
                return None;
            }
            name_keyword.map(|col| Attempt::new(NameChoice::single(col), 1.0, RoleSource::Keyword))
        })
        .step("composite", Floor::None, || {
            if width != 1 {
                return None;
            }
            let ratio = composite_ratio(grid, data_start, 0, settings.composite_sample_rows);
            (ratio > COMPOSITE_RATIO).then(|| {
                let mut choice = NameChoice::single(0);
                choice.composite = true;
                Attempt::new(choice, ratio, RoleSource::Composite)
            })
        })
        .step("ai-name-columns", Floor::None, || {
            if !ai.is_available() {
                return None;
            }
            ask_name_columns(grid, headers, data_start, amount_keyword, ai)
        })
        .step("ai-existing-column", Floor::Above(AI_FLOOR), || {
            if !ai.is_available() {
                return None;
            }
            let (column, confidence) = ask_existing_column(grid, headers, data_start, ai)?;
            let mut choice = NameChoice::single(column);
            choice.composite = composite_ratio(grid, data_start, column, settings.composite_sample_rows)
                > COMPOSITE_RATIO;
            Some(Attempt::new(choice, confidence, RoleSource::Ai))
        })
        .step("local-score", Floor::None, || {
            best_name_column(headers, &sample, width, amount_keyword)
                .map(|(col, score)| Attempt::new(NameChoice::single(col), score, RoleSource::Heuristic))
        })
        .run();

    let mut strategies = name.tried;
    let Some(name) = name.winner else {
        return Err(ReconError::unresolved("name", headers, &strategies));
    };
    log::debug!(
        "name columns {:?} via {} (rule '{}', composite {})",
        name.value.columns,
        name.source,
        name.value.rule,
        name.value.composite
    );

    if name.value.composite {
        let column = name.value.columns[0];
        return Ok(RoleOutcome {
            roles: ColumnRoles {
                name_columns: name.value.columns,
                amount_column: column,
                combination_rule: name.value.rule,
                composite_mode: true,
                source: name.source,
                amount_source: RoleSource::Composite,
            },
            strategies,
        });
    }

    let name_columns = name.value.columns;
    let amount = AttemptChain::new()
        .step("amount-keyword", Floor::None, || {
            amount_keyword
                .filter(|col| !name_columns.contains(col))
                .map(|col| Attempt::new(col, 1.0, RoleSource::Keyword))
        })
        .step("ai-amount", Floor::Above(AI_FLOOR), || {
            if !ai.is_available() {
                return None;
            }
            ask_amount_column(grid, headers, data_start, &name_columns, ai)
        })
        .step("local-amount", Floor::None, || {
            best_amount_column(&sample, width, &name_columns)
                .map(|(col, ratio)| Attempt::new(col, ratio, RoleSource::Heuristic))
        })
        .run();

    strategies.extend(amount.tried);
    let Some(amount) = amount.winner else {
        return Err(ReconError::unresolved("amount", headers, &strategies));
    };
    log::debug!("amount column {} via {}", amount.value, amount.source);

    Ok(RoleOutcome {
        roles: ColumnRoles {
            name_columns,
            amount_column: amount.value,
            combination_rule: name.value.rule,
            composite_mode: false,
            source: name.source,
            amount_source: amount.source,
        },
        strategies,
    })
}

/// Non-empty data rows, in order, at most `limit`
fn sample_rows(grid: &Grid, data_start: usize, limit: usize) -> Vec<&[String]> {
    grid.rows()
        .iter()
        .skip(data_start)
        .filter(|row| row.iter().any(|c| !c.is_empty()))
        .take(limit)
        .map(Vec::as_slice)
        .collect()
}

/// Share of sampled non-empty cells in `column` that split as `name<sep>amount`.
pub fn composite_ratio(grid: &Grid, data_start: usize, column: usize, sample: usize) -> f64 {
    let cells: Vec<&str> = grid
        .rows()
        .iter()
        .skip(data_start)
        .map(|row| row.get(column).map(String::as_str).unwrap_or(""))
        .filter(|c| !c.is_empty())
        .take(sample)
        .collect();
    if cells.is_empty() {
        return 0.0;
    }
    let hits = cells.iter().filter(|c| split_composite(c).is_some()).count();
    hits as f64 / cells.len() as f64
}

/// Highest `text_ratio*0.4 + uniqueness*0.3 + min(avg_len/20, 1)*0.3`.
fn best_name_column(
    headers: &[String],
    sample: &[&[String]],
    width: usize,
    amount_column: Option<usize>,
) -> Option<(usize, f64)> {
    if sample.is_empty() {
        return None;
    }
    let mut best: Option<(usize, f64)> = None;

    for col in 0..width {
        if Some(col) == amount_column || headers.get(col).map_or(true, |h| h.trim().is_empty()) {
            continue;
        }
        let values: Vec<&str> = sample
            .iter()
            .map(|row| row.get(col).map(String::as_str).unwrap_or(""))
            .filter(|c| !c.is_empty())
            .collect();
        if values.is_empty() {
            continue;
        }
        let numeric = values.iter().filter(|v| is_amount(v)).count();
        if numeric == values.len() {
            continue;
        }
        let unique: HashSet<&str> = values.iter().copied().collect();
        if values.len() >= 3 && unique.len() == 1 {
            continue;
        }
        let avg_len =
            values.iter().map(|v| v.chars().count()).sum::<usize>() as f64 / values.len() as f64;
        if avg_len < 2.0 {
            continue;
        }

        let text_ratio = (values.len() - numeric) as f64 / sample.len() as f64;
        let uniqueness = unique.len() as f64 / values.len() as f64;
        let length = (avg_len / 20.0).min(1.0);
        let score = text_ratio * 0.4 + uniqueness * 0.3 + length * 0.3;
        log::debug!("column {} name score {:.3}", col, score);

        if best.map_or(true, |(_, s)| score > s) {
            best = Some((col, score));
        }
    }
    best
}

/// Right-most column whose non-empty cells mostly parse as amounts.
fn best_amount_column(sample: &[&[String]], width: usize, exclude: &[usize]) -> Option<(usize, f64)> {
    (0..width).rev().filter(|c| !exclude.contains(c)).find_map(|col| {
        let values: Vec<&str> = sample
            .iter()
            .map(|row| row.get(col).map(String::as_str).unwrap_or(""))
            .filter(|c| !c.is_empty())
            .collect();
        if values.is_empty() {
            return None;
        }
        let parsed = values.iter().filter(|v| is_amount(v)).count();
        let ratio = parsed as f64 / values.len() as f64;
        (ratio >= AMOUNT_PARSE_RATIO).then_some((col, ratio))
    })
}

// ============================================================================
// AI strategies
// ============================================================================

fn layout_prompt(grid: &Grid, headers: &[String], data_start: usize) -> String {
    let mut prompt = String::from("Columns (0-based index: header):\n");
    for (i, h) in headers.iter().enumerate() {
        prompt.push_str(&format!("{}: {}\n", i, if h.is_empty() { "<blank>" } else { h }));
    }
    prompt.push_str("\nFirst data rows:\n");
    for row in sample_rows(grid, data_start, PROMPT_SAMPLE_ROWS) {
        prompt.push_str(&format!("- {}\n", row.join(" | ")));
    }
    prompt
}

fn structure_request(user: String) -> ChatRequest {
    ChatRequest::new(
        "You analyse the columns of financial ledger spreadsheets. Reply with JSON only.",
        user,
    )
    .temperature(STRUCTURE_TEMPERATURE)
    .max_tokens(STRUCTURE_MAX_TOKENS)
}

fn has_placeholder(rule: &str) -> bool {
    let mut rest = rule;
    while let Some(open) = rest.find('{') {
        rest = &rest[open + 1..];
        if let Some(close) = rest.find('}') {
            let inner = &rest[..close];
            if !inner.is_empty() && inner.chars().all(|c| c.is_ascii_digit()) {
                return true;
            }
        }
    }
    false
}

fn default_rule(count: usize) -> String {
    (0..count).map(|i| format!("{{{}}}", i)).collect::<Vec<_>>().join("-")
}

fn ask_name_columns(
    grid: &Grid,
    headers: &[String],
    data_start: usize,
    amount_column: Option<usize>,
    ai: &AiAccess,
) -> Option<Attempt<NameChoice, RoleSource>> {
    let mut prompt = layout_prompt(grid, headers, data_start);
    prompt.push_str(
        "\nNo column is clearly the item name. Pick one or more columns whose values, \
         combined, best describe each line item. Do not pick the amount column. \
         Give a combination rule using {0}, {1}, ... for the picked columns in order, \
         for example \"{0}-{1}\".\n\
         Return ONLY JSON: {\"columnIndices\": [<int>, ...], \"combinationRule\": \"...\", \
         \"reason\": \"...\", \"confidence\": <0..1>}",
    );

    let reply: NameColumnsReply = match ai.ask(&structure_request(prompt)) {
        Ok(reply) => reply,
        Err(e) => {
            log::warn!("AI name column detection failed: {}", e);
            return None;
        }
    };

    let width = grid.width();
    let mut columns: Vec<usize> = Vec::new();
    for idx in &reply.column_indices {
        let idx = *idx;
        if idx < 0 || idx as usize >= width {
            continue;
        }
        let idx = idx as usize;
        if Some(idx) == amount_column || columns.contains(&idx) {
            continue;
        }
        columns.push(idx);
    }
    if columns.is_empty() {
        log::debug!("AI name columns {:?} unusable", reply.column_indices);
        return None;
    }

    // Placeholder positions only line up when nothing was dropped
    let rule = if columns.len() == reply.column_indices.len() && has_placeholder(&reply.combination_rule)
    {
        reply.combination_rule.clone()
    } else {
        default_rule(columns.len())
    };

    Some(Attempt::new(
        NameChoice {
            columns,
            rule,
            composite: false,
        },
        reply.confidence,
        RoleSource::Ai,
    ))
}

fn ask_existing_column(
    grid: &Grid,
    headers: &[String],
    data_start: usize,
    ai: &AiAccess,
) -> Option<(usize, f64)> {
    let mut prompt = layout_prompt(grid, headers, data_start);
    prompt.push_str(
        "\nWhich single existing column contains or implies the name of each line item, \
         even if its header does not say so (a column holding values like \"ProjectA:100\" \
         counts)?\n\
         Return ONLY JSON: {\"bestColumnIndex\": <int>, \"reason\": \"...\", \"confidence\": <0..1>}",
    );

    let reply: ExistingColumnReply = match ai.ask(&structure_request(prompt)) {
        Ok(reply) => reply,
        Err(e) => {
            log::warn!("AI column reinterpretation failed: {}", e);
            return None;
        }
    };
    let idx = reply.best_column_index;
    (idx >= 0 && (idx as usize) < grid.width()).then_some((idx as usize, reply.confidence))
}

fn ask_amount_column(
    grid: &Grid,
    headers: &[String],
    data_start: usize,
    name_columns: &[usize],
    ai: &AiAccess,
) -> Option<Attempt<usize, RoleSource>> {
    let mut prompt = layout_prompt(grid, headers, data_start);
    prompt.push_str(&format!(
        "\nColumns {:?} hold the item name. Which column holds the monetary amount?\n\
         Return ONLY JSON: {{\"amountColumnIndex\": <int>, \"reason\": \"...\", \"confidence\": <0..1>}}",
        name_columns
    ));

    let reply: AmountColumnReply = match ai.ask(&structure_request(prompt)) {
        Ok(reply) => reply,
        Err(e) => {
            log::warn!("AI amount column detection failed: {}", e);
            return None;
        }
    };
    let idx = reply.amount_column_index;
    if idx < 0 || idx as usize >= grid.width() || name_columns.contains(&(idx as usize)) {
        return None;
    }
    Some(Attempt::new(idx as usize, reply.confidence, RoleSource::Ai))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::HeaderSource;
    use crate::testing::{grid, ScriptedAssistant, KEY};
    use ledgermatch_config::Credential;

    fn header_at(row: i64) -> HeaderDecision {
        HeaderDecision {
            row_index: row,
            confidence: 0.7,
            source: HeaderSource::Heuristic,
        }
    }

    fn headers(g: &Grid, row: usize) -> Vec<String> {
        g.row(row).unwrap().to_vec()
    }

    #[test]
    fn keyword_strengths() {
        let hs: Vec<String> = ["备注说明", "费用项目", "项目"].iter().map(|s| s.to_string()).collect();
        // exact beats an earlier substring hit
        assert_eq!(keyword_column(&hs, NAME_KEYWORDS, None), Some(2));
        let hs: Vec<String> = ["Total Amount", "Cost Item"].iter().map(|s| s.to_string()).collect();
        assert_eq!(keyword_column(&hs, AMOUNT_KEYWORDS, None), Some(0));
        assert_eq!(keyword_column(&hs, NAME_KEYWORDS, Some(0)), Some(1));
        let hs: Vec<String> = ["desc_text"].iter().map(|s| s.to_string()).collect();
        assert_eq!(keyword_column(&hs, NAME_KEYWORDS, None), Some(0));
    }

    #[test]
    fn short_tokens_are_not_keywords() {
        let hs: Vec<String> = ["Pay To", "Sum"].iter().map(|s| s.to_string()).collect();
        assert_eq!(keyword_column(&hs, AMOUNT_KEYWORDS, None), None);
        assert_eq!(keyword_column(&hs, NAME_KEYWORDS, None), None);
        let hs: Vec<String> = ["It Is", "Me-De"].iter().map(|s| s.to_string()).collect();
        assert_eq!(keyword_column(&hs, NAME_KEYWORDS, None), None);
    }

    #[test]
    fn keyword_free_headers_fall_back_to_scoring() {
        let g = grid(&[&["Pay To", "Sum"], &["Alice", "100"], &["Bob", "200"]]);
        let outcome = resolve_roles(
            &g,
            &header_at(0),
            &headers(&g, 0),
            &ParseSettings::default(),
            &AiAccess::offline(),
        )
        .unwrap();
        assert_eq!(outcome.roles.name_columns, vec![0]);
        assert_eq!(outcome.roles.amount_column, 1);
    }

    #[test]
    fn keyword_headers_need_no_ai() {
        let g = grid(&[&["项目名称", "金额"], &["工资", "5000"], &["房租", "3000"]]);
        let assistant = ScriptedAssistant::new(vec![]);
        let key = Credential::new(KEY);
        let ai = AiAccess::new(&assistant, Some(&key));
        let outcome =
            resolve_roles(&g, &header_at(0), &headers(&g, 0), &ParseSettings::default(), &ai)
                .unwrap();
        assert_eq!(outcome.roles.name_columns, vec![0]);
        assert_eq!(outcome.roles.amount_column, 1);
        assert_eq!(outcome.roles.source, RoleSource::Keyword);
        assert_eq!(outcome.roles.amount_source, RoleSource::Keyword);
        assert_eq!(assistant.calls(), 0);
    }

    #[test]
    fn single_column_composite() {
        let g = grid(&[&["明细"], &["员工工资:5000.00"], &["房租：3000元"], &["备注"]]);
        let outcome = resolve_roles(
            &g,
            &header_at(0),
            &headers(&g, 0),
            &ParseSettings::default(),
            &AiAccess::offline(),
        )
        .unwrap();
        assert!(outcome.roles.composite_mode);
        assert_eq!(outcome.roles.name_columns, vec![0]);
        assert_eq!(outcome.roles.amount_column, 0);
        assert_eq!(outcome.strategies, vec!["name-keyword", "composite"]);
    }

    #[test]
    fn ai_multi_column_name() {
        let g = grid(&[
            &["部门", "类型", "金额"],
            &["销售部", "差旅", "1200"],
            &["财务部", "办公", "300"],
        ]);
        let assistant = ScriptedAssistant::new(vec![Ok(
            r#"{"columnIndices": [0, 1, 2, 9], "combinationRule": "{0}/{1}/{2}", "confidence": 0.8}"#
                .into(),
        )]);
        let key = Credential::new(KEY);
        let ai = AiAccess::new(&assistant, Some(&key));
        let outcome =
            resolve_roles(&g, &header_at(0), &headers(&g, 0), &ParseSettings::default(), &ai)
                .unwrap();
        assert_eq!(outcome.roles.name_columns, vec![0, 1]);
        assert_eq!(outcome.roles.combination_rule, "{0}-{1}");
        assert_eq!(outcome.roles.amount_column, 2);
        assert_eq!(outcome.roles.source, RoleSource::Ai);
    }

    #[test]
    fn ai_rule_kept_verbatim() {
        let g = grid(&[&["A", "B", "C"], &["x1", "y1", "10"], &["x2", "y2", "20"]]);
        let assistant = ScriptedAssistant::new(vec![
            Ok(r#"{"columnIndices": [1, 0], "combinationRule": "{0}({1})"}"#.into()),
            Ok(r#"{"amountColumnIndex": 2, "confidence": 0.9}"#.into()),
        ]);
        let key = Credential::new(KEY);
        let ai = AiAccess::new(&assistant, Some(&key));
        let outcome =
            resolve_roles(&g, &header_at(0), &headers(&g, 0), &ParseSettings::default(), &ai)
                .unwrap();
        assert_eq!(outcome.roles.name_columns, vec![1, 0]);
        assert_eq!(outcome.roles.combination_rule, "{0}({1})");
        assert_eq!(outcome.roles.amount_source, RoleSource::Ai);
    }

    #[test]
    fn low_confidence_reinterpretation_is_ignored() {
        let g = grid(&[&["A", "B"], &["工资发放", "5000"], &["办公用品", "300"]]);
        let assistant = ScriptedAssistant::new(vec![
            Ok(r#"{"columnIndices": []}"#.into()),
            Ok(r#"{"bestColumnIndex": 1, "confidence": 0.3}"#.into()),
        ]);
        let key = Credential::new(KEY);
        let ai = AiAccess::new(&assistant, Some(&key));
        let outcome =
            resolve_roles(&g, &header_at(0), &headers(&g, 0), &ParseSettings::default(), &ai)
                .unwrap();
        assert_eq!(outcome.roles.name_columns, vec![0]);
        assert_eq!(outcome.roles.source, RoleSource::Heuristic);
        assert_eq!(outcome.roles.amount_column, 1);
        assert_eq!(outcome.roles.amount_source, RoleSource::Heuristic);
        assert!(outcome.strategies.contains(&"local-score".to_string()));
    }

    #[test]
    fn local_score_skips_degenerate_columns() {
        let g = grid(&[
            &["序号", "类", "说明", "金额"],
            &["1", "A", "差旅报销北京", "100"],
            &["2", "A", "办公用品采购", "200"],
            &["3", "A", "员工培训费用", "300"],
        ]);
        let outcome = resolve_roles(
            &g,
            &header_at(0),
            &headers(&g, 0),
            &ParseSettings::default(),
            &AiAccess::offline(),
        )
        .unwrap();
        assert_eq!(outcome.roles.name_columns, vec![2]);
        assert_eq!(outcome.roles.amount_column, 3);
    }

    #[test]
    fn unresolved_amount_is_descriptive() {
        let g = grid(&[&["项目", "备注"], &["工资", "按月"], &["房租", "季度"]]);
        let err = resolve_roles(
            &g,
            &header_at(0),
            &headers(&g, 0),
            &ParseSettings::default(),
            &AiAccess::offline(),
        )
        .unwrap_err();
        let text = err.to_string();
        assert!(text.contains("no amount column found"));
        assert!(text.contains("#0 项目, #1 备注"));
        assert!(text.contains("amount-keyword, ai-amount, local-amount"));
    }
}
