//! Row-level AI naming for multi-column names.
//!
//! Unique row inputs are sent in batches, a few batches in flight at a
//! time, each under its own timeout. A failed batch only costs its rows
//! their AI name; they keep the rule-combined one.

use std::collections::{HashMap, HashSet};
use std::thread;
use std::time::Duration;

use ledgermatch_ai::reply::RowNamesReply;
use ledgermatch_ai::ChatRequest;
use ledgermatch_config::RowSummarySettings;

use crate::assist::AiAccess;

const SUMMARY_TEMPERATURE: f32 = 0.2;
const SUMMARY_MAX_TOKENS: u32 = 1200;

/// Map of row input to AI-proposed short name. Inputs the AI did not name
/// are absent.
pub fn summarize_rows(
    inputs: &[String],
    settings: &RowSummarySettings,
    ai: &AiAccess,
) -> HashMap<String, String> {
    let mut names = HashMap::new();
    if !ai.is_available() {
        return names;
    }

    let mut seen = HashSet::new();
    let unique: Vec<&str> = inputs
        .iter()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty() && seen.insert(*s))
        .take(settings.sample_cap)
        .collect();
    if unique.is_empty() {
        return names;
    }

    let batches: Vec<&[&str]> = unique.chunks(settings.batch_size.max(1)).collect();
    let timeout = Duration::from_secs(settings.batch_timeout_secs);
    log::info!(
        "summarizing {} unique rows in {} batches",
        unique.len(),
        batches.len()
    );

    for wave in batches.chunks(settings.max_concurrent_batches.max(1)) {
        let results: Vec<Option<HashMap<String, String>>> = thread::scope(|scope| {
            let handles: Vec<_> = wave
                .iter()
                .map(|batch| scope.spawn(move || summarize_batch(batch, timeout, ai)))
                .collect();
            handles
                .into_iter()
                .map(|h| h.join().unwrap_or(None))
                .collect()
        });
        for batch in results.into_iter().flatten() {
            names.extend(batch);
        }
    }

    log::info!("AI named {} of {} rows", names.len(), unique.len());
    names
}

fn summarize_batch(
    batch: &[&str],
    timeout: Duration,
    ai: &AiAccess,
) -> Option<HashMap<String, String>> {
    let mut prompt = String::from(
        "Each line below is one ledger row, with the values of its descriptive columns \
         joined by \" | \". Give each row a short, specific name (under 20 characters) \
         describing the expense or income item. Keep the language of the input.\n\n",
    );
    for input in batch {
        prompt.push_str(&format!("- {}\n", input));
    }
    prompt.push_str(
        "\nReturn ONLY JSON: {\"names\": [{\"input\": \"<row exactly as given>\", \"name\": \"...\"}]}",
    );

    let request = ChatRequest::new(
        "You name financial ledger rows concisely. Reply with JSON only.",
        prompt,
    )
    .temperature(SUMMARY_TEMPERATURE)
    .max_tokens(SUMMARY_MAX_TOKENS)
    .timeout(timeout);

    let reply: RowNamesReply = match ai.ask(&request) {
        Ok(reply) => reply,
        Err(e) => {
            log::warn!("row summary batch of {} failed, keeping rule names: {}", batch.len(), e);
            return None;
        }
    };

    // Merge by exact input; anything the model rewrote is ignored
    let wanted: HashSet<&str> = batch.iter().copied().collect();
    Some(
        reply
            .names
            .into_iter()
            .filter(|n| wanted.contains(n.input.trim()) && !n.name.trim().is_empty())
            .map(|n| (n.input.trim().to_string(), n.name.trim().to_string()))
            .collect(),
    )
}
