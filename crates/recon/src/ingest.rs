//! Classification Ingestor.
//!
//! Turns the AI's category tree into a [`CategoryMap`] over the original
//! entries. References are re-linked by entry ID; descriptions are a
//! best-effort fallback. Whatever no category claims lands in
//! [`UNCLASSIFIED`]. If the reply cannot be used at all, every entry goes
//! to [`UNCLASSIFIED`] and the caller still gets a usable map.

use std::collections::HashSet;
use std::sync::OnceLock;

use ledgermatch_ai::reply::CategoriesReply;
use ledgermatch_ai::parse_reply;
use regex::Regex;
use serde_json::{Map, Value};

use crate::amount::parse_amount;
use crate::messages::{classification_summary, fallback_summary, Locale};
use crate::model::{Amount, Category, CategoryMap, CategoryStatus, Entry, Source, UNCLASSIFIED};
use crate::totals::recompute;

fn entry_id_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(standard|check)_\d+").expect("entry id pattern"))
}

#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub categories: CategoryMap,
    pub summary: String,
    /// The reply was unusable and everything went to the unclassified bucket
    pub fell_back: bool,
}

/// Ingest an AI classification reply. Never fails.
pub fn ingest_classification(
    text: &str,
    standard: &[Entry],
    check: &[Entry],
    locale: Locale,
) -> Classification {
    match build_categories(text, standard, check) {
        Ok(categories) => {
            let summary = classification_summary(&categories, locale);
            log::info!("classification produced {} categories", categories.len());
            Classification {
                categories,
                summary,
                fell_back: false,
            }
        }
        Err(reason) => {
            log::warn!("classification reply unusable, falling back: {}", reason);
            fallback(standard, check, locale)
        }
    }
}

/// Every entry in one unreconciled bucket.
pub fn fallback(standard: &[Entry], check: &[Entry], locale: Locale) -> Classification {
    let mut bucket = Category::new(UNCLASSIFIED);
    bucket.standard = standard.to_vec();
    bucket.check = check.to_vec();
    recompute(&mut bucket);
    bucket.status = CategoryStatus::Mismatch;

    let mut categories = CategoryMap::new();
    categories.insert(UNCLASSIFIED.to_string(), bucket);
    Classification {
        categories,
        summary: fallback_summary(locale).to_string(),
        fell_back: true,
    }
}

struct Linker<'e> {
    standard: &'e [Entry],
    check: &'e [Entry],
    claimed: HashSet<&'e str>,
}

impl<'e> Linker<'e> {
    fn entries(&self, source: Source) -> &'e [Entry] {
        match source {
            Source::Standard => self.standard,
            Source::Check => self.check,
        }
    }

    /// Resolve one reference from the `source` array and claim the entry.
    fn claim(&mut self, reference: &str, source: Source) -> Option<&'e Entry> {
        let entry = match entry_id_pattern().find(reference) {
            Some(m) => self.by_id(m.as_str(), source)?,
            None => self.by_description(reference, source)?,
        };
        if !self.claimed.insert(entry.id.as_str()) {
            log::debug!("{} already claimed", entry.id);
            return None;
        }
        Some(entry)
    }

    fn by_id(&self, id: &str, source: Source) -> Option<&'e Entry> {
        let entry = self
            .standard
            .iter()
            .chain(self.check.iter())
            .find(|e| e.id == id);
        match entry {
            Some(e) if e.source == source => Some(e),
            Some(e) => {
                log::debug!("{} listed under {} but belongs to {}", id, source, e.source);
                None
            }
            None => {
                log::debug!("unknown entry id {}", id);
                None
            }
        }
    }

    /// `<name>:<amount>` or a bare description, matched by mutual containment.
    fn by_description(&self, reference: &str, source: Source) -> Option<&'e Entry> {
        let (description, amount) = split_description(reference);
        if description.is_empty() {
            return None;
        }
        let contains = |field: &str| {
            !field.is_empty() && (field.contains(description) || description.contains(field))
        };
        self.entries(source).iter().find(|e| {
            !self.claimed.contains(e.id.as_str())
                && amount.map_or(true, |a| a == e.amount)
                && (contains(&e.name) || contains(&e.original_name) || contains(&e.context_text))
        })
    }
}

fn split_description(reference: &str) -> (&str, Option<Amount>) {
    let reference = reference.trim();
    let split = reference
        .char_indices()
        .filter(|(_, c)| *c == ':' || *c == '：')
        .last();
    let Some((pos, sep)) = split else {
        return (reference, None);
    };
    let tail: String = reference[pos + sep.len_utf8()..]
        .chars()
        .filter(|c| !matches!(c, '元' | '¥' | '￥'))
        .collect();
    match parse_amount(&tail) {
        Ok(amount) => (reference[..pos].trim(), Some(amount)),
        Err(_) => (reference, None),
    }
}

fn build_categories(text: &str, standard: &[Entry], check: &[Entry]) -> Result<CategoryMap, String> {
    let reply: CategoriesReply = parse_reply(text).map_err(|e| e.to_string())?;
    let mut linker = Linker {
        standard,
        check,
        claimed: HashSet::new(),
    };
    let mut out = CategoryMap::new();
    walk(&reply.categories, None, &mut linker, &mut out)?;

    let leftovers: Vec<&Entry> = standard
        .iter()
        .chain(check.iter())
        .filter(|e| !linker.claimed.contains(e.id.as_str()))
        .collect();
    if !leftovers.is_empty() {
        log::info!("{} entries not referenced; placing them in {}", leftovers.len(), UNCLASSIFIED);
        let bucket = out
            .entry(UNCLASSIFIED.to_string())
            .or_insert_with(|| Category::new(UNCLASSIFIED));
        for entry in leftovers {
            bucket.entries_mut(entry.source).push(entry.clone());
        }
    }

    for category in out.values_mut() {
        recompute(category);
    }
    Ok(out)
}

fn walk(
    nodes: &Map<String, Value>,
    parent: Option<&str>,
    linker: &mut Linker,
    out: &mut CategoryMap,
) -> Result<(), String> {
    for (key, value) in nodes {
        let key = key.trim();
        if key.is_empty() {
            continue;
        }
        let name = match parent {
            Some(p) => format!("{}/{}", p, key),
            None => key.to_string(),
        };
        let node = value
            .as_object()
            .ok_or_else(|| format!("category '{}' is not an object", name))?;

        let subcategories = match node.get("subcategories") {
            None | Some(Value::Null) => None,
            Some(Value::Object(map)) => Some(map),
            Some(_) => return Err(format!("subcategories of '{}' is not an object", name)),
        };
        let has_lists = node.contains_key("standard") || node.contains_key("check");

        if has_lists || subcategories.map_or(true, |s| s.is_empty()) {
            out.entry(name.clone()).or_insert_with(|| Category::new(name.clone()));
            for source in [Source::Standard, Source::Check] {
                for reference in references(node, source, &name)? {
                    if let Some(entry) = linker.claim(reference, source) {
                        if let Some(category) = out.get_mut(&name) {
                            category.entries_mut(source).push(entry.clone());
                        }
                    }
                }
            }
        }

        if let Some(children) = subcategories {
            walk(children, Some(&name), linker, out)?;
        }
    }
    Ok(())
}

fn references<'v>(node: &'v Map<String, Value>, source: Source, name: &str) -> Result<Vec<&'v str>, String> {
    match node.get(source.as_str()) {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::Array(items)) => Ok(items
            .iter()
            .filter_map(|item| {
                let s = item.as_str();
                if s.is_none() {
                    log::debug!("non-string reference in '{}': {}", name, item);
                }
                s
            })
            .collect()),
        Some(_) => Err(format!("'{}'.{} is not a list", name, source)),
    }
}
