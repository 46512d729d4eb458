//! Pattern-naming corrector.
//!
//! Maps unknown operator tokens to the closest entries in the operator
//! catalog, plus a table of aliases people carry over from other assertion
//! libraries.

use crate::matcher::pattern::known_operators;
use once_cell::sync::Lazy;
use std::collections::HashMap;

/// Aliases from other ecosystems mapped onto catalog operators.
static ALIASES: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    HashMap::from([
        ("gt", "greaterThan"),
        ("lt", "lessThan"),
        ("gte", "greaterThanOrEqual"),
        ("lte", "lessThanOrEqual"),
        ("substr", "contains"),
        ("substring", "contains"),
        ("beginsWith", "startsWith"),
        ("size", "arrayLength"),
        ("newer", "dateAfter"),
        ("older", "dateBefore"),
        ("pluck", "extractField"),
        ("negate", "not"),
        ("today", "dateAge:1d"),
        ("recent", "dateAge:7d"),
    ])
});

const SIMILARITY_FLOOR: f64 = 0.7;
const MAX_CANDIDATES: usize = 3;

/// Closest catalog operators for an unknown token, best first, with
/// similarity scores in `[0, 1]`.
pub fn closest_operators(token: &str) -> Vec<(&'static str, f64)> {
    let mut scored: Vec<(&'static str, f64)> = known_operators()
        .into_iter()
        .map(|op| (op, strsim::jaro_winkler(&token.to_lowercase(), &op.to_lowercase())))
        .filter(|(_, score)| *score >= SIMILARITY_FLOOR)
        .collect();
    scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    scored.truncate(MAX_CANDIDATES);
    scored
}

/// Human-readable correction for an unknown operator token, or `None` when
/// nothing in the catalog comes close.
pub fn suggest_operator(token: &str) -> Option<String> {
    if let Some(target) = ALIASES.get(token) {
        return Some(format!(
            "'{}' is not an operator; use '{}' instead",
            token, target
        ));
    }
    let candidates = closest_operators(token);
    if candidates.is_empty() {
        return None;
    }
    let rendered: Vec<String> = candidates
        .iter()
        .map(|(name, score)| format!("{} ({:.2})", name, score))
        .collect();
    Some(format!(
        "Unknown operator '{}'; closest matches: {}",
        token,
        rendered.join(", ")
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aliases_resolve_directly() {
        assert_eq!(
            suggest_operator("gt").unwrap(),
            "'gt' is not an operator; use 'greaterThan' instead"
        );
        assert!(suggest_operator("pluck").unwrap().contains("extractField"));
        assert!(suggest_operator("today").unwrap().contains("dateAge:1d"));
        assert!(suggest_operator("recent").unwrap().contains("dateAge:7d"));
        assert!(suggest_operator("negate").unwrap().contains("'not'"));
    }

    #[test]
    fn misspellings_rank_the_real_operator_first() {
        let candidates = closest_operators("aproximately");
        assert_eq!(candidates[0].0, "approximately");
        assert!(candidates[0].1 > 0.9);

        let candidates = closest_operators("startWith");
        assert_eq!(candidates[0].0, "startsWith");

        let candidates = closest_operators("arrayContanis");
        assert_eq!(candidates[0].0, "arrayContains");
    }

    #[test]
    fn suggestion_carries_scores() {
        let suggestion = suggest_operator("lenght").unwrap();
        assert!(suggestion.contains("length"), "got: {}", suggestion);
        assert!(suggestion.contains("(0."), "got: {}", suggestion);
    }

    #[test]
    fn hopeless_tokens_get_nothing() {
        assert_eq!(suggest_operator("zzzzqqqq"), None);
    }
}
