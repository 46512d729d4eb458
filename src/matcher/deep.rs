//! Recursive structural matcher.
//!
//! Walks `(expected, actual)` and records every divergence as a
//! [`DiagnosticError`]; it never fails on data shape. String leaves
//! beginning with `match:` dispatch into the pattern DSL, and objects may
//! carry reserved keys (`match:partial`, `match:arrayElements`,
//! `match:extractField`, `match:crossField`) that change how the subtree is
//! compared.

use crate::diagnostics::{preview, preview_opt, DiagnosticError, ErrorType};
use crate::matcher::fields::extract_field;
use crate::matcher::pattern::{self, PatternOutcome};
use serde_json::Value;

const KEY_PARTIAL: &str = "match:partial";
const KEY_ARRAY_ELEMENTS: &str = "match:arrayElements";
const KEY_EXTRACT_FIELD: &str = "match:extractField";
const KEY_CROSS_FIELD: &str = "match:crossField";
const KEY_EXTRACT_VALUE: &str = "value";

/// Deep-match `actual` against `expected`, rooted at `response`.
pub fn deep_match(expected: &Value, actual: &Value) -> Vec<DiagnosticError> {
    let mut matcher = Matcher { errors: Vec::new() };
    matcher.compare(expected, Some(actual), "response", false);
    matcher.errors
}

/// Deep-match with an explicit root path.
pub fn deep_match_at(expected: &Value, actual: &Value, root: &str) -> Vec<DiagnosticError> {
    let mut matcher = Matcher { errors: Vec::new() };
    matcher.compare(expected, Some(actual), root, false);
    matcher.errors
}

struct Matcher {
    errors: Vec<DiagnosticError>,
}

impl Matcher {
    fn compare(&mut self, expected: &Value, actual: Option<&Value>, path: &str, partial: bool) {
        // Fast path: identical values match in any mode.
        if let Some(actual_value) = actual {
            if expected == actual_value {
                return;
            }
        }

        // Pattern-string leaves.
        if let Value::String(s) = expected {
            if let Some(body) = s.strip_prefix("match:") {
                self.apply_pattern(s, body, actual, path);
                return;
            }
        }

        // Reserved-key objects.
        if let Value::Object(map) = expected {
            if let Some(inner) = map.get(KEY_PARTIAL) {
                self.compare(inner, actual, path, true);
                return;
            }
            if let Some(template) = map.get(KEY_ARRAY_ELEMENTS) {
                self.match_array_elements(template, actual, path, partial);
                return;
            }
            if let Some(field_path) = map.get(KEY_EXTRACT_FIELD) {
                self.match_extract_field(map, field_path, actual, path, partial);
                return;
            }
            if let Some(expr) = map.get(KEY_CROSS_FIELD) {
                self.match_cross_field(map, expr, actual, path, partial);
                return;
            }
        }

        let Some(actual_value) = actual else {
            self.errors.push(DiagnosticError::new(
                ErrorType::MissingField,
                path,
                expected.clone(),
                None,
                format!("Missing field at '{}'", path),
            ));
            return;
        };

        match (expected, actual_value) {
            (Value::Array(expected_items), Value::Array(actual_items)) => {
                self.match_arrays(expected_items, actual_items, path, partial);
            }
            (Value::Object(expected_map), Value::Object(actual_map)) => {
                self.match_objects(expected_map, actual_map, path, partial);
            }
            _ => self.mismatch(expected, actual_value, path),
        }
    }

    fn apply_pattern(&mut self, full: &str, body: &str, actual: Option<&Value>, path: &str) {
        match pattern::evaluate(body, actual) {
            PatternOutcome::Pass => {}
            PatternOutcome::Fail => {
                let pattern_type = pattern::pattern_type(body);
                self.errors.push(
                    DiagnosticError::new(
                        ErrorType::PatternFailed,
                        path,
                        Value::String(full.to_string()),
                        actual.cloned(),
                        format!(
                            "Pattern '{}' did not match {} at '{}'",
                            full,
                            preview_opt(&actual.cloned()),
                            path
                        ),
                    )
                    .with_pattern_type(pattern_type),
                );
            }
            PatternOutcome::UnknownOperator => {
                let token = body
                    .strip_prefix("not:")
                    .unwrap_or(body)
                    .split(':')
                    .next()
                    .unwrap_or(body);
                let mut error = DiagnosticError::new(
                    ErrorType::PatternFailed,
                    path,
                    Value::String(full.to_string()),
                    actual.cloned(),
                    format!("Unknown pattern operator '{}' at '{}'", token, path),
                )
                .with_pattern_type("unknown");
                if let Some(suggestion) = crate::diagnostics::suggest_operator(token) {
                    error = error.with_suggestion(suggestion);
                }
                self.errors.push(error);
            }
        }
    }

    fn match_array_elements(
        &mut self,
        template: &Value,
        actual: Option<&Value>,
        path: &str,
        partial: bool,
    ) {
        match actual {
            Some(Value::Array(items)) => {
                for (i, item) in items.iter().enumerate() {
                    self.compare(template, Some(item), &format!("{}[{}]", path, i), partial);
                }
            }
            other => {
                self.errors.push(DiagnosticError::new(
                    ErrorType::TypeMismatch,
                    path,
                    Value::String("array".to_string()),
                    other.cloned(),
                    format!(
                        "Expected an array for arrayElements at '{}', got {}",
                        path,
                        preview_opt(&other.cloned())
                    ),
                ));
            }
        }
    }

    fn match_extract_field(
        &mut self,
        map: &serde_json::Map<String, Value>,
        field_path: &Value,
        actual: Option<&Value>,
        path: &str,
        partial: bool,
    ) {
        let Some(field_path) = field_path.as_str() else {
            self.errors.push(DiagnosticError::new(
                ErrorType::PatternFailed,
                path,
                field_path.clone(),
                actual.cloned(),
                format!("extractField path must be a string at '{}'", path),
            ));
            return;
        };
        let Some(expected_value) = map.get(KEY_EXTRACT_VALUE) else {
            self.errors.push(DiagnosticError::new(
                ErrorType::MissingField,
                path,
                Value::String(KEY_EXTRACT_VALUE.to_string()),
                actual.cloned(),
                format!("extractField at '{}' has no sibling 'value' to compare", path),
            ));
            return;
        };
        let extracted = actual.and_then(|a| extract_field(a, field_path));
        let child_path = format!("{}.{}", path, field_path);
        self.compare(expected_value, extracted.as_ref(), &child_path, partial);
    }

    fn match_cross_field(
        &mut self,
        map: &serde_json::Map<String, Value>,
        expr: &Value,
        actual: Option<&Value>,
        path: &str,
        partial: bool,
    ) {
        let Some(expr) = expr.as_str() else {
            self.errors.push(DiagnosticError::new(
                ErrorType::PatternFailed,
                path,
                expr.clone(),
                actual.cloned(),
                format!("crossField expression must be a string at '{}'", path),
            ));
            return;
        };
        let expr = expr.strip_prefix("crossField:").unwrap_or(expr);
        if !pattern::cross_field(expr, actual) {
            self.errors.push(
                DiagnosticError::new(
                    ErrorType::PatternFailed,
                    path,
                    Value::String(expr.to_string()),
                    actual.cloned(),
                    format!("Cross-field relation '{}' does not hold at '{}'", expr, path),
                )
                .with_pattern_type("crossField"),
            );
        }
        // Sibling keys are ordinary expectations against the same object.
        for (key, sibling_expected) in map {
            if key == KEY_CROSS_FIELD {
                continue;
            }
            let child = actual.and_then(|a| a.get(key));
            self.compare(
                sibling_expected,
                child,
                &format!("{}.{}", path, key),
                partial,
            );
        }
    }

    fn match_arrays(
        &mut self,
        expected_items: &[Value],
        actual_items: &[Value],
        path: &str,
        partial: bool,
    ) {
        if !partial && expected_items.len() != actual_items.len() {
            self.errors.push(DiagnosticError::new(
                ErrorType::LengthMismatch,
                path,
                Value::from(expected_items.len()),
                Some(Value::from(actual_items.len())),
                format!(
                    "Array at '{}' has {} elements, expected {}",
                    path,
                    actual_items.len(),
                    expected_items.len()
                ),
            ));
        }
        for (i, expected_item) in expected_items.iter().enumerate() {
            let child_path = format!("{}[{}]", path, i);
            match actual_items.get(i) {
                Some(actual_item) => {
                    self.compare(expected_item, Some(actual_item), &child_path, partial)
                }
                None => self.errors.push(DiagnosticError::new(
                    ErrorType::MissingField,
                    &child_path,
                    expected_item.clone(),
                    None,
                    format!("Missing array element at '{}'", child_path),
                )),
            }
        }
        if !partial {
            for (i, extra) in actual_items.iter().enumerate().skip(expected_items.len()) {
                let child_path = format!("{}[{}]", path, i);
                self.errors.push(DiagnosticError::new(
                    ErrorType::ExtraField,
                    &child_path,
                    Value::Null,
                    Some(extra.clone()),
                    format!("Unexpected array element at '{}'", child_path),
                ));
            }
        }
    }

    fn match_objects(
        &mut self,
        expected_map: &serde_json::Map<String, Value>,
        actual_map: &serde_json::Map<String, Value>,
        path: &str,
        partial: bool,
    ) {
        for (key, expected_value) in expected_map {
            let child_path = format!("{}.{}", path, key);
            match actual_map.get(key) {
                Some(actual_value) => {
                    self.compare(expected_value, Some(actual_value), &child_path, partial)
                }
                None => {
                    // A pattern that accepts undefined (e.g. not:exists,
                    // type:undefined) must still be evaluated.
                    self.compare(expected_value, None, &child_path, partial)
                }
            }
        }
        if !partial {
            for (key, actual_value) in actual_map {
                if !expected_map.contains_key(key) {
                    let child_path = format!("{}.{}", path, key);
                    self.errors.push(DiagnosticError::new(
                        ErrorType::ExtraField,
                        &child_path,
                        Value::Null,
                        Some(actual_value.clone()),
                        format!("Unexpected field at '{}'", child_path),
                    ));
                }
            }
        }
    }

    fn mismatch(&mut self, expected: &Value, actual: &Value, path: &str) {
        if runtime_type(expected) != runtime_type(actual) {
            self.errors.push(DiagnosticError::new(
                ErrorType::TypeMismatch,
                path,
                expected.clone(),
                Some(actual.clone()),
                format!(
                    "Type mismatch at '{}': expected {} ({}), got {} ({})",
                    path,
                    preview(expected),
                    runtime_type(expected),
                    preview(actual),
                    runtime_type(actual)
                ),
            ));
        } else {
            self.errors.push(DiagnosticError::new(
                ErrorType::ValueMismatch,
                path,
                expected.clone(),
                Some(actual.clone()),
                format!(
                    "Value mismatch at '{}': expected {}, got {}",
                    path,
                    preview(expected),
                    preview(actual)
                ),
            ));
        }
    }
}

/// Runtime type name: arrays and null share the object type.
fn runtime_type(value: &Value) -> &'static str {
    match value {
        Value::String(_) => "string",
        Value::Number(_) => "number",
        Value::Bool(_) => "boolean",
        Value::Null | Value::Object(_) | Value::Array(_) => "object",
    }
}
