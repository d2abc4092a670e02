//! Suite-level comprehensiveness scoring.
//!
//! A weighted blend of category coverage, anti-cheat presence, parameter
//! discovery, and how close the category distribution sits to the ideal
//! shares. The weights come from the run config so evolution can tune them.

use std::collections::HashMap;

use crate::types::{GeneratedTest, ScoreWeights, TestCategory};

/// Score a generated suite on a 0..=10 scale.
pub fn comprehensiveness_score(
    tests: &[GeneratedTest],
    discovered_parameters: usize,
    weights: &ScoreWeights,
) -> f64 {
    if tests.is_empty() {
        return 0.0;
    }

    let mut by_category: HashMap<TestCategory, usize> = HashMap::new();
    for test in tests {
        *by_category.entry(test.category).or_default() += 1;
    }

    // Coverage: fraction of the standard categories with at least one test.
    let covered = TestCategory::default_order()
        .iter()
        .filter(|c| by_category.contains_key(c))
        .count() as f64;
    let coverage = covered / TestCategory::default_order().len() as f64;

    // Anti-cheat coverage: saturates at two dedicated tests.
    let anti_cheat = (*by_category.get(&TestCategory::AntiCheat).unwrap_or(&0) as f64 / 2.0)
        .min(1.0);

    // Parameter discovery bonus: saturates at five discovered parameters.
    let discovery = (discovered_parameters as f64 / 5.0).min(1.0);

    // Balance: mean absolute deviation from the ideal distribution,
    // inverted so 1.0 means a perfectly balanced suite.
    let total = tests.len() as f64;
    let deviation: f64 = TestCategory::default_order()
        .iter()
        .filter(|c| c.ideal_share() > 0.0)
        .map(|c| {
            let actual = *by_category.get(c).unwrap_or(&0) as f64 / total;
            (actual - c.ideal_share()).abs()
        })
        .sum::<f64>()
        / 7.0;
    let balance = (1.0 - deviation * 2.0).max(0.0);

    let weight_sum = weights.category_count
        + weights.anti_cheat_coverage
        + weights.parameter_discovery
        + weights.balance_deviation;
    if weight_sum <= 0.0 {
        return 0.0;
    }

    let blended = (coverage * weights.category_count
        + anti_cheat * weights.anti_cheat_coverage
        + discovery * weights.parameter_discovery
        + balance * weights.balance_deviation)
        / weight_sum;

    blended * 10.0
}

/// Category balance alone, for the evolution store's sub-metric column.
pub fn category_balance(tests: &[GeneratedTest]) -> f64 {
    if tests.is_empty() {
        return 0.0;
    }
    let total = tests.len() as f64;
    let mut by_category: HashMap<TestCategory, usize> = HashMap::new();
    for test in tests {
        *by_category.entry(test.category).or_default() += 1;
    }
    let deviation: f64 = TestCategory::default_order()
        .iter()
        .filter(|c| c.ideal_share() > 0.0)
        .map(|c| {
            let actual = *by_category.get(c).unwrap_or(&0) as f64 / total;
            (actual - c.ideal_share()).abs()
        })
        .sum::<f64>()
        / 7.0;
    (1.0 - deviation * 2.0).max(0.0)
}
