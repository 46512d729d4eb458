//! Static anti-pattern detection on expected trees.
//!
//! Runs before a test executes and flags authoring mistakes that would
//! otherwise surface as confusing match failures: misspelled operators,
//! wrong separators, missing `match:` prefixes, and similar. Warnings never
//! change a test's outcome.

use crate::matcher::pattern::pattern_type;
use once_cell::sync::Lazy;
use serde_json::Value;
use std::collections::HashMap;

/// One authoring mistake found in an expected tree.
#[derive(Debug, Clone, PartialEq)]
pub struct AntiPatternWarning {
    pub path: String,
    pub found: String,
    pub suggestion: String,
}

static MISSPELLINGS: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    HashMap::from([
        ("lenght", "length"),
        ("aproximately", "approximately"),
        ("startWith", "startsWith"),
        ("endWith", "endsWith"),
        ("arrayElement", "arrayElements"),
        ("arrayLenght", "arrayLength"),
        ("stringLenght", "stringLength"),
    ])
});

const COMPARISON_TOKENS: &[&str] = &["=", "==", "!=", ">", "<", ">=", "<="];

/// Operators whose arguments are `:`-separated ranges or pairs.
const RANGE_OPERATORS: &[&str] = &[
    "between",
    "range",
    "stringLengthBetween",
    "dateBetween",
    "approximately",
];

/// Scan an expected tree for authoring mistakes.
pub fn scan_expected(expected: &Value) -> Vec<AntiPatternWarning> {
    let mut warnings = Vec::new();
    walk(expected, "response", &mut warnings);
    warnings
}

fn walk(value: &Value, path: &str, warnings: &mut Vec<AntiPatternWarning>) {
    match value {
        Value::String(s) => check_string_leaf(s, path, warnings),
        Value::Array(items) => {
            for (i, item) in items.iter().enumerate() {
                walk(item, &format!("{}[{}]", path, i), warnings);
            }
        }
        Value::Object(map) => {
            for (key, child) in map {
                check_reserved_key(key, child, path, warnings);
                walk(child, &format!("{}.{}", path, key), warnings);
            }
        }
        _ => {}
    }
}

fn warn(warnings: &mut Vec<AntiPatternWarning>, path: &str, found: &str, suggestion: String) {
    warnings.push(AntiPatternWarning {
        path: path.to_string(),
        found: found.to_string(),
        suggestion,
    });
}

fn check_reserved_key(key: &str, child: &Value, path: &str, warnings: &mut Vec<AntiPatternWarning>) {
    if key == "match:arrayElement" {
        warn(
            warnings,
            path,
            key,
            "Use 'match:arrayElements' (plural)".to_string(),
        );
    }
    if key == "match:extractField" {
        if let Some(field_path) = child.as_str() {
            if !field_path.contains('.') && !field_path.contains('[') && field_path != "*" {
                warn(
                    warnings,
                    path,
                    field_path,
                    format!(
                        "extractField path '{}' has no dot notation; a nested path like 'result.{}' is usually intended",
                        field_path, field_path
                    ),
                );
            }
        }
    }
}

fn check_string_leaf(s: &str, path: &str, warnings: &mut Vec<AntiPatternWarning>) {
    match s.strip_prefix("match:") {
        Some(body) => check_pattern_body(s, body, path, warnings),
        None => {
            // A bare string that parses as a known operator is almost always
            // a forgotten prefix.
            if pattern_type(s) != "unknown" {
                warn(
                    warnings,
                    path,
                    s,
                    format!("Add the 'match:' prefix: 'match:{}'", s),
                );
            }
        }
    }
}

fn check_pattern_body(full: &str, body: &str, path: &str, warnings: &mut Vec<AntiPatternWarning>) {
    let body_after_not = body.strip_prefix("not:").unwrap_or(body);
    let (token, arg) = match body_after_not.split_once(':') {
        Some((token, arg)) => (token, Some(arg)),
        None => (body_after_not, None),
    };

    // Singular form of arrayElements as a string operator.
    if let Some(correct) = MISSPELLINGS.get(token) {
        warn(
            warnings,
            path,
            full,
            format!("'{}' looks misspelled; use '{}'", token, correct),
        );
        return;
    }

    // Comparison symbols are not operators.
    if COMPARISON_TOKENS.contains(&token) {
        let named = match token {
            "=" | "==" => "equals",
            "!=" => "notEquals",
            ">" => "greaterThan",
            "<" => "lessThan",
            ">=" => "greaterThanOrEqual",
            "<=" => "lessThanOrEqual",
            _ => "equals",
        };
        warn(
            warnings,
            path,
            full,
            format!("'{}' is not an operator; use '{}'", token, named),
        );
        return;
    }

    // Comma instead of colon in range arguments.
    if RANGE_OPERATORS.contains(&token) {
        if let Some(arg) = arg {
            if arg.contains(',') && !arg.contains(':') {
                warn(
                    warnings,
                    path,
                    full,
                    format!(
                        "'{}' arguments are colon-separated: 'match:{}:{}'",
                        token,
                        token,
                        arg.replace(',', ":")
                    ),
                );
            }
        }
    }

    // Capitalized type names never match.
    if token == "type" {
        if let Some(arg) = arg {
            let lowered = arg.to_lowercase();
            if arg != lowered
                && matches!(
                    lowered.as_str(),
                    "string" | "number" | "boolean" | "array" | "object" | "undefined"
                )
            {
                warn(
                    warnings,
                    path,
                    full,
                    format!("Type names are lowercase: 'match:type:{}'", lowered),
                );
            }
        }
    }

    if token == "regex" {
        if let Some(arg) = arg {
            // Quoted regex matches the quotes literally.
            if (arg.starts_with('"') && arg.ends_with('"') && arg.len() >= 2)
                || (arg.starts_with('\'') && arg.ends_with('\'') && arg.len() >= 2)
            {
                warn(
                    warnings,
                    path,
                    full,
                    "Remove the quotes around the regex; they are matched literally".to_string(),
                );
            }
            // Double-escaped character classes come from JSON-in-YAML
            // copy-paste.
            if arg.contains("\\\\") {
                warn(
                    warnings,
                    path,
                    full,
                    "Regex appears double-escaped; use single backslashes like '\\d+'".to_string(),
                );
            }
        }
    }

    if token == "arrayContains" && arg.map(|a| a.is_empty()).unwrap_or(false) {
        warn(
            warnings,
            path,
            full,
            "'arrayContains:' needs a value or field:value argument".to_string(),
        );
        return;
    }

    // An argument-taking operator written without its trailing colon.
    if arg.is_none() && pattern_type(body_after_not) == "unknown" {
        let with_colon = format!("{}:", token);
        if pattern_type(&with_colon) != "unknown" {
            warn(
                warnings,
                path,
                full,
                format!("'{}' takes an argument: 'match:{}:<value>'", token, token),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn suggestions(expected: &Value) -> Vec<String> {
        scan_expected(expected)
            .into_iter()
            .map(|w| w.suggestion)
            .collect()
    }

    #[test]
    fn clean_tree_has_no_warnings() {
        let expected = json!({
            "result": {
                "tools": {"match:arrayElements": {"name": "match:type:string"}},
                "count": "match:between:1:10"
            }
        });
        assert!(scan_expected(&expected).is_empty());
    }

    #[test]
    fn singular_array_element_key() {
        let expected = json!({"tools": {"match:arrayElement": {"name": "x"}}});
        let found = suggestions(&expected);
        assert!(found.iter().any(|s| s.contains("arrayElements")), "{:?}", found);
    }

    #[test]
    fn comma_separated_range() {
        let found = suggestions(&json!({"n": "match:between:10,20"}));
        assert!(found.iter().any(|s| s.contains("match:between:10:20")), "{:?}", found);
    }

    #[test]
    fn missing_match_prefix() {
        let found = suggestions(&json!({"n": "greaterThan:5"}));
        assert!(found.iter().any(|s| s.contains("match:greaterThan:5")), "{:?}", found);
        // Ordinary strings are left alone.
        assert!(suggestions(&json!({"n": "hello world"})).is_empty());
    }

    #[test]
    fn quoted_and_double_escaped_regex() {
        let found = suggestions(&json!({"s": "match:regex:\"^ok$\""}));
        assert!(found.iter().any(|s| s.contains("quotes")), "{:?}", found);

        let found = suggestions(&json!({"s": "match:regex:\\\\d+"}));
        assert!(found.iter().any(|s| s.contains("double-escaped")), "{:?}", found);
    }

    #[test]
    fn capitalized_type_name() {
        let found = suggestions(&json!({"s": "match:type:String"}));
        assert!(found.iter().any(|s| s.contains("match:type:string")), "{:?}", found);
    }

    #[test]
    fn known_misspellings() {
        let found = suggestions(&json!({"a": "match:lenght:3"}));
        assert!(found.iter().any(|s| s.contains("'length'")), "{:?}", found);
        let found = suggestions(&json!({"a": "match:aproximately:5:1"}));
        assert!(found.iter().any(|s| s.contains("approximately")), "{:?}", found);
        let found = suggestions(&json!({"a": "match:startWith:x"}));
        assert!(found.iter().any(|s| s.contains("startsWith")), "{:?}", found);
        let found = suggestions(&json!({"a": "match:endWith:x"}));
        assert!(found.iter().any(|s| s.contains("endsWith")), "{:?}", found);
    }

    #[test]
    fn comparison_symbols_as_operators() {
        let found = suggestions(&json!({"n": "match:==:5"}));
        assert!(found.iter().any(|s| s.contains("equals")), "{:?}", found);
        let found = suggestions(&json!({"n": "match:>:5"}));
        assert!(found.iter().any(|s| s.contains("greaterThan")), "{:?}", found);
    }

    #[test]
    fn operator_without_trailing_colon() {
        let found = suggestions(&json!({"s": "match:contains"}));
        assert!(found.iter().any(|s| s.contains("match:contains:<value>")), "{:?}", found);
        // Bare operators are complete without a colon.
        assert!(suggestions(&json!({"s": "match:exists"})).is_empty());
    }

    #[test]
    fn array_contains_without_value() {
        let found = suggestions(&json!({"a": "match:arrayContains:"}));
        assert!(found.iter().any(|s| s.contains("needs a value")), "{:?}", found);
    }

    #[test]
    fn extract_field_without_dots() {
        let expected = json!({"r": {"match:extractField": "tools", "value": []}});
        let found = suggestions(&expected);
        assert!(found.iter().any(|s| s.contains("dot notation")), "{:?}", found);

        let fine = json!({"r": {"match:extractField": "tools.*.name", "value": []}});
        assert!(suggestions(&fine).is_empty());
    }

    #[test]
    fn warnings_carry_paths() {
        let expected = json!({"deep": {"nested": "match:type:Number"}});
        let warnings = scan_expected(&expected);
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].path, "response.deep.nested");
    }
}
