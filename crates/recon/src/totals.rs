// Per-category totals, status derivation and manual entry moves.

use crate::model::{Amount, Category, CategoryMap, CategoryStatus, Source, UNCLASSIFIED};

/// Status from membership and difference.
///
/// The unclassified bucket never counts as reconciled.
pub fn derive_status(name: &str, standard: usize, check: usize, difference: Amount) -> CategoryStatus {
    if name == UNCLASSIFIED {
        return if standard + check > 0 {
            CategoryStatus::Mismatch
        } else {
            CategoryStatus::Missing
        };
    }
    match (standard > 0, check > 0) {
        (true, true) if difference.is_zero() => CategoryStatus::Match,
        (true, true) => CategoryStatus::Mismatch,
        _ => CategoryStatus::Missing,
    }
}

/// Recompute totals, difference and status from current membership.
pub fn recompute(category: &mut Category) {
    let name = category.name.clone();
    for entry in category.standard.iter_mut().chain(category.check.iter_mut()) {
        entry.category = Some(name.clone());
    }
    category.total_standard = category.standard.iter().map(|e| e.amount).sum();
    category.total_check = category.check.iter().map(|e| e.amount).sum();
    category.difference = (category.total_standard - category.total_check).abs();
    category.status = derive_status(
        &category.name,
        category.standard.len(),
        category.check.len(),
        category.difference,
    );
}

/// The Calculate stage: a fresh map with every category recomputed.
pub fn calculate(categories: &CategoryMap) -> CategoryMap {
    let mut out = categories.clone();
    for category in out.values_mut() {
        recompute(category);
    }
    out
}

/// Move one entry between categories. Totals are left for Calculate.
///
/// Returns false, changing nothing, when `from` or the entry is unknown.
pub fn move_entry(categories: &mut CategoryMap, entry_id: &str, from: &str, to: &str) -> bool {
    if from == to {
        return categories
            .get(from)
            .is_some_and(|c| c.standard.iter().chain(c.check.iter()).any(|e| e.id == entry_id));
    }
    let Some(origin) = categories.get_mut(from) else {
        log::warn!("move of {}: no category '{}'", entry_id, from);
        return false;
    };

    let mut taken = None;
    for source in [Source::Standard, Source::Check] {
        let list = origin.entries_mut(source);
        if let Some(pos) = list.iter().position(|e| e.id == entry_id) {
            taken = Some(list.remove(pos));
            break;
        }
    }
    let Some(mut entry) = taken else {
        log::warn!("move of {}: not in category '{}'", entry_id, from);
        return false;
    };

    entry.category = Some(to.to_string());
    let source = entry.source;
    categories
        .entry(to.to_string())
        .or_insert_with(|| Category::new(to))
        .entries_mut(source)
        .push(entry);
    log::info!("moved {} from '{}' to '{}'", entry_id, from, to);
    true
}
