//! Error classification and suggestion aggregation.
//!
//! Turns a batch of diagnostics into an analysis block: totals by type and
//! category, a one-line summary, and a ranked suggestion list where repeated
//! issues collapse into one aggregated entry.

use crate::diagnostics::{Category, DiagnosticError, ErrorType};
use std::collections::BTreeMap;

/// Summary over one test's diagnostics.
#[derive(Debug, Clone, PartialEq)]
pub struct Analysis {
    pub total_errors: usize,
    pub errors_by_type: BTreeMap<&'static str, usize>,
    pub errors_by_category: BTreeMap<&'static str, usize>,
    pub summary: String,
    pub suggestions: Vec<String>,
}

const MAX_SUGGESTION_GROUPS: usize = 3;

/// Template text for one error. Deliberately path-free so that repeated
/// instances of the same mistake land in the same aggregation group.
fn suggestion_template(error: &DiagnosticError) -> String {
    if let Some(own) = &error.suggestion {
        return own.clone();
    }
    match error.error_type {
        ErrorType::ValueMismatch => {
            "Expected values must match exactly; use a 'match:' pattern when the value varies between runs".to_string()
        }
        ErrorType::TypeMismatch => {
            "Check field types; 'match:type:...' asserts the type without pinning the value".to_string()
        }
        ErrorType::LengthMismatch => {
            "Array lengths differ; assert with 'match:arrayLength:N' or allow extras via 'match:partial'".to_string()
        }
        ErrorType::MissingField => {
            "A required field is absent; verify the server emits it or relax the block with 'match:partial'".to_string()
        }
        ErrorType::ExtraField => {
            "The response has fields the expectation does not; list them or wrap the block in 'match:partial'".to_string()
        }
        ErrorType::PatternFailed => match error.pattern_type.as_deref() {
            Some("unknown") | None => {
                "Unknown pattern operator; check the operator catalog".to_string()
            }
            Some(op) => format!("Review the '{}' pattern's arguments and the actual value type", op),
        },
    }
}

/// Analyze a batch of diagnostics, filling in each record's suggestion.
pub fn analyze(errors: &mut [DiagnosticError]) -> Analysis {
    let mut by_type: BTreeMap<&'static str, usize> = BTreeMap::new();
    let mut by_category: BTreeMap<&'static str, usize> = BTreeMap::new();
    // (category, template) -> (count, first-seen order)
    let mut groups: BTreeMap<(Category, String), (usize, usize)> = BTreeMap::new();

    for (order, error) in errors.iter_mut().enumerate() {
        *by_type.entry(error.error_type.as_str()).or_insert(0) += 1;
        *by_category.entry(error.category.as_str()).or_insert(0) += 1;

        let template = suggestion_template(error);
        if error.suggestion.is_none() {
            error.suggestion = Some(template.clone());
        }
        let entry = groups
            .entry((error.category, template))
            .or_insert((0, order));
        entry.0 += 1;
    }

    let mut ranked: Vec<((Category, String), (usize, usize))> = groups.into_iter().collect();
    // Largest groups first; ties in first-seen order.
    ranked.sort_by(|a, b| b.1 .0.cmp(&a.1 .0).then(a.1 .1.cmp(&b.1 .1)));

    let suggestions: Vec<String> = ranked
        .into_iter()
        .take(MAX_SUGGESTION_GROUPS)
        .map(|((_, template), (count, _))| {
            if count >= 2 {
                format!("{} ({} similar issues found)", template, count)
            } else {
                template
            }
        })
        .collect();

    let summary = render_summary(errors.len(), &by_type);

    Analysis {
        total_errors: errors.len(),
        errors_by_type: by_type,
        errors_by_category: by_category,
        summary,
        suggestions,
    }
}

fn render_summary(total: usize, by_type: &BTreeMap<&'static str, usize>) -> String {
    if total == 0 {
        return "No validation errors".to_string();
    }
    let parts: Vec<String> = by_type
        .iter()
        .map(|(name, count)| format!("{} {}", count, name))
        .collect();
    format!(
        "{} validation error{}: {}",
        total,
        if total == 1 { "" } else { "s" },
        parts.join(", ")
    )
}
