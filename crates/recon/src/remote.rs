// Remote classification and summary calls.

use ledgermatch_ai::ChatRequest;

use crate::assist::AiAccess;
use crate::error::ReconError;
use crate::ingest::{ingest_classification, Classification};
use crate::messages::{status_label, Locale};
use crate::model::{CategoryMap, Entry};

const CLASSIFY_TEMPERATURE: f32 = 0.3;
const CLASSIFY_MAX_TOKENS: u32 = 2000;
const SUMMARY_TEMPERATURE: f32 = 0.2;
const SUMMARY_MAX_TOKENS: u32 = 1500;

fn classify_system(locale: Locale) -> &'static str {
    match locale {
        Locale::ZhCn => {
            "你是一个专业的财务数据分析师，擅长将财务条目按业务含义归类，以便核对两份账目。只返回JSON。"
        }
        Locale::EnUs => {
            "You are a professional financial data analyst who groups ledger entries by business meaning so two ledgers can be reconciled. Reply with JSON only."
        }
    }
}

fn summary_system(locale: Locale) -> &'static str {
    match locale {
        Locale::ZhCn => "你是一个财务审计专家，请用简洁的中文总结对账结果，指出差异和需要关注的问题。",
        Locale::EnUs => {
            "You are a financial audit expert. Summarize the reconciliation result concisely, pointing out differences and items that need attention."
        }
    }
}

fn entry_lines(prompt: &mut String, entries: &[Entry]) {
    for e in entries {
        prompt.push_str(&format!("[{}] {} | {}\n", e.id, e.name, e.amount));
    }
}

pub fn classification_prompt(standard: &[Entry], check: &[Entry]) -> String {
    let mut prompt = String::from(
        "Group the entries of two ledgers into categories of the same business meaning, \
         so that each category can be compared between the standard ledger and the \
         check ledger.\n\nStandard ledger:\n",
    );
    entry_lines(&mut prompt, standard);
    prompt.push_str("\nCheck ledger:\n");
    entry_lines(&mut prompt, check);
    prompt.push_str(
        "\nRules:\n\
         - Reference entries by their id in brackets, e.g. \"standard_2\".\n\
         - Every entry belongs to exactly one category.\n\
         - Standard entries go in \"standard\", check entries in \"check\".\n\
         - Use \"subcategories\" only where a category clearly splits further.\n\n\
         Return ONLY JSON:\n\
         {\"categories\": {\"<category>\": {\"standard\": [\"standard_2\"], \"check\": [\"check_5\"], \
         \"subcategories\": {\"<child>\": {\"standard\": [], \"check\": []}}}}}",
    );
    prompt
}

/// Classify both entry sets. Remote failures are errors; an unusable reply
/// is not (it becomes the unclassified fallback).
pub fn classify(
    ai: &AiAccess,
    standard: &[Entry],
    check: &[Entry],
    locale: Locale,
) -> Result<Classification, ReconError> {
    let request = ChatRequest::new(classify_system(locale), classification_prompt(standard, check))
        .temperature(CLASSIFY_TEMPERATURE)
        .max_tokens(CLASSIFY_MAX_TOKENS);
    let text = ai.complete(&request)?;
    Ok(ingest_classification(&text, standard, check, locale))
}

pub fn summary_prompt(categories: &CategoryMap, locale: Locale) -> String {
    let mut prompt = String::from("Reconciliation result per category:\n");
    for c in categories.values() {
        prompt.push_str(&format!(
            "- {}: standard {} ({} entries), check {} ({} entries), difference {}, {}\n",
            c.name,
            c.total_standard,
            c.standard.len(),
            c.total_check,
            c.check.len(),
            c.difference,
            status_label(c.status, locale)
        ));
    }
    prompt.push_str(
        "\nWrite a short reconciliation summary: overall result, the categories with \
         differences and their likely causes, and what to check next.",
    );
    prompt
}

pub fn summarize(ai: &AiAccess, categories: &CategoryMap, locale: Locale) -> Result<String, ReconError> {
    let request = ChatRequest::new(summary_system(locale), summary_prompt(categories, locale))
        .temperature(SUMMARY_TEMPERATURE)
        .max_tokens(SUMMARY_MAX_TOKENS);
    let text = ai.complete(&request)?;
    let text = text.trim();
    if text.is_empty() {
        return Err(ReconError::ResponseUnparseable("empty summary".to_string()));
    }
    Ok(text.to_string())
}
