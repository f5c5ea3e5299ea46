//! Coverage model: weighted progress, priority ordering, and coverage merging.
//!
//! Everything here is pure. The session folds answers and oracle updates
//! into coverage through these functions.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use super::model::{Coverage, Dimension};

/// A partial coverage entry. Absent fields leave the base entry untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CoveragePatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unknowns: Option<Vec<String>>,
}

impl CoveragePatch {
    pub fn score(score: f64) -> Self {
        Self {
            score: Some(score),
            ..Default::default()
        }
    }
}

/// Per-dimension partial updates.
pub type CoverageUpdate = BTreeMap<Dimension, CoveragePatch>;

/// Weighted mean of scores, rounded to the nearest integer.
///
/// Returns 0 when the total weight is 0.
pub fn calculate_progress(coverage: &Coverage) -> u8 {
    let (weighted, total_weight) = coverage
        .iter()
        .fold((0.0_f64, 0.0_f64), |(weighted, total), (_, entry)| {
            (weighted + entry.weight * entry.score, total + entry.weight)
        });

    if total_weight <= 0.0 {
        return 0;
    }

    (weighted / total_weight).round().clamp(0.0, 100.0) as u8
}

/// Shallow-merge `updates` into a copy of `base`.
///
/// Dimensions missing from `base` are ignored; `base` is never mutated.
pub fn update_coverage(base: &Coverage, updates: &CoverageUpdate) -> Coverage {
    let mut merged = base.clone();
    for (dimension, patch) in updates {
        let Some(entry) = merged.get_mut(*dimension) else {
            continue;
        };
        if let Some(weight) = patch.weight {
            entry.weight = weight;
        }
        if let Some(score) = patch.score {
            entry.score = score;
        }
        if let Some(ref unknowns) = patch.unknowns {
            entry.unknowns = unknowns.clone();
        }
    }
    merged
}

/// Dimensions most worth asking about next, highest `weight * (100 - score)`
/// first. Ties keep canonical order.
pub fn priority_dimensions(coverage: &Coverage, limit: usize) -> Vec<Dimension> {
    let mut ranked: Vec<(Dimension, f64)> = coverage
        .iter()
        .map(|(dim, entry)| (dim, entry.weight * (100.0 - entry.score)))
        .collect();
    // sort_by is stable, so equal urgency keeps iteration order
    ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
    ranked.into_iter().take(limit).map(|(dim, _)| dim).collect()
}

/// Dimensions ordered by score, highest first (`descending`) or lowest first.
pub fn dimensions_by_score(coverage: &Coverage, descending: bool, limit: usize) -> Vec<Dimension> {
    let mut ranked: Vec<(Dimension, f64)> =
        coverage.iter().map(|(dim, entry)| (dim, entry.score)).collect();
    if descending {
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
    } else {
        ranked.sort_by(|a, b| a.1.total_cmp(&b.1));
    }
    ranked.into_iter().take(limit).map(|(dim, _)| dim).collect()
}

/// Number of slots to fill for a score: `floor(slot_count * score / 100)`.
pub fn fill_count(slot_count: usize, score: f64) -> usize {
    let ratio = (score / 100.0).clamp(0.0, 1.0);
    (slot_count as f64 * ratio).floor() as usize
}

/// Slot indices each dimension owns in the 8-column progress grid.
pub fn grid_slots(dimension: Dimension) -> &'static [usize] {
    match dimension {
        Dimension::Role => &[0, 1, 8, 9],
        Dimension::Responsibilities => &[2, 3, 10, 11],
        Dimension::Workflows => &[4, 5, 12, 13],
        Dimension::Tools => &[6, 7, 14, 15],
        Dimension::InputsOutputs => &[16, 17, 24, 25],
        Dimension::PainPoints => &[18, 19, 26, 27],
        Dimension::MetricsKpis => &[20, 21, 28, 29],
        Dimension::Compliance => &[22, 23, 30, 31],
        Dimension::Collaboration => &[32, 33, 40, 41, 48, 49],
        Dimension::AiReadiness => &[34, 35, 42, 43, 50, 51],
    }
}

/// All grid slots that should render as filled for the given coverage.
pub fn filled_slots(coverage: &Coverage) -> BTreeSet<usize> {
    coverage
        .iter()
        .flat_map(|(dim, entry)| {
            let slots = grid_slots(dim);
            slots[..fill_count(slots.len(), entry.score)].iter().copied()
        })
        .collect()
}
