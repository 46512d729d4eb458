//! The pattern DSL: single-value operators dispatched by longest prefix.
//!
//! A pattern is an operator token with optional `:`-separated arguments,
//! optionally wrapped in `not:` to negate the result. Dispatch is a static
//! table scanned longest-prefix-first, so `stringLengthGreaterThanOrEqual:`
//! wins over `stringLengthGreaterThan:` wins over `stringLength:`.

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

/// Result of evaluating one pattern against one value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatternOutcome {
    Pass,
    Fail,
    /// The operator token is not in the catalog. Reported as a
    /// `pattern_failed` diagnostic with `pattern_type: "unknown"`, never a
    /// hard error.
    UnknownOperator,
}

/// Operator names with trailing-argument form, longest first.
const ARG_OPERATORS: &[&str] = &[
    "stringLengthGreaterThanOrEqual",
    "stringLengthLessThanOrEqual",
    "stringLengthGreaterThan",
    "stringLengthLessThan",
    "stringLengthBetween",
    "greaterThanOrEqual",
    "containsIgnoreCase",
    "equalsIgnoreCase",
    "lessThanOrEqual",
    "decimalPlaces",
    "approximately",
    "arrayContains",
    "divisibleBy",
    "stringLength",
    "arrayLength",
    "dateBetween",
    "greaterThan",
    "dateFormat",
    "dateEquals",
    "multipleOf",
    "crossField",
    "dateBefore",
    "startsWith",
    "notEquals",
    "dateAfter",
    "endsWith",
    "lessThan",
    "contains",
    "between",
    "dateAge",
    "equals",
    "length",
    "count",
    "range",
    "regex",
    "type",
];

/// Operators that take no argument.
const BARE_OPERATORS: &[&str] = &["stringNotEmpty", "stringEmpty", "dateValid", "exists"];

/// Full operator catalog, used by the naming corrector.
pub fn known_operators() -> Vec<&'static str> {
    let mut all: Vec<&'static str> = ARG_OPERATORS.to_vec();
    all.extend_from_slice(BARE_OPERATORS);
    all.push("not");
    all
}

/// The operator name a pattern dispatches to, after stripping `not:`.
/// Returns `"unknown"` for tokens outside the catalog.
pub fn pattern_type(pattern: &str) -> &'static str {
    let body = pattern.strip_prefix("not:").unwrap_or(pattern);
    for op in BARE_OPERATORS {
        if body == *op {
            return op;
        }
    }
    for op in ARG_OPERATORS {
        if let Some(rest) = body.strip_prefix(op) {
            if rest.starts_with(':') {
                return op;
            }
        }
    }
    "unknown"
}

/// Evaluate a pattern (without its `match:` prefix) against a value.
/// `None` models a missing field (`undefined`).
pub fn evaluate(pattern: &str, actual: Option<&Value>) -> PatternOutcome {
    let (negated, body) = match pattern.strip_prefix("not:") {
        Some(rest) => (true, rest),
        None => (false, pattern),
    };

    let result = dispatch(body, actual);
    match result {
        Some(pass) => {
            if pass != negated {
                PatternOutcome::Pass
            } else {
                PatternOutcome::Fail
            }
        }
        None => PatternOutcome::UnknownOperator,
    }
}

fn dispatch(body: &str, actual: Option<&Value>) -> Option<bool> {
    for op in BARE_OPERATORS {
        if body == *op {
            return Some(eval_bare(op, actual));
        }
    }
    for op in ARG_OPERATORS {
        if let Some(rest) = body.strip_prefix(op) {
            if let Some(arg) = rest.strip_prefix(':') {
                return Some(eval_with_arg(op, arg, actual));
            }
        }
    }
    None
}

fn eval_bare(op: &str, actual: Option<&Value>) -> bool {
    match op {
        "exists" => !matches!(actual, None | Some(Value::Null)),
        "stringEmpty" => matches!(actual, Some(Value::String(s)) if s.is_empty()),
        "stringNotEmpty" => matches!(actual, Some(Value::String(s)) if !s.is_empty()),
        "dateValid" => actual.and_then(parse_date_value).is_some(),
        _ => false,
    }
}

fn eval_with_arg(op: &str, arg: &str, actual: Option<&Value>) -> bool {
    match op {
        // String operators work on string actuals only.
        "regex" => match (Regex::new(arg), as_str(actual)) {
            (Ok(re), Some(s)) => re.is_match(s),
            _ => false,
        },
        "contains" => as_str(actual).map(|s| s.contains(arg)).unwrap_or(false),
        "startsWith" => as_str(actual).map(|s| s.starts_with(arg)).unwrap_or(false),
        "endsWith" => as_str(actual).map(|s| s.ends_with(arg)).unwrap_or(false),
        "equalsIgnoreCase" => as_str(actual)
            .map(|s| s.to_lowercase() == arg.to_lowercase())
            .unwrap_or(false),
        "containsIgnoreCase" => as_str(actual)
            .map(|s| s.to_lowercase().contains(&arg.to_lowercase()))
            .unwrap_or(false),

        "stringLength" => with_string_length(actual, arg, |len, n| len == n),
        "stringLengthGreaterThan" => with_string_length(actual, arg, |len, n| len > n),
        "stringLengthLessThan" => with_string_length(actual, arg, |len, n| len < n),
        "stringLengthGreaterThanOrEqual" => with_string_length(actual, arg, |len, n| len >= n),
        "stringLengthLessThanOrEqual" => with_string_length(actual, arg, |len, n| len <= n),
        "stringLengthBetween" => {
            let Some((min, max)) = split_two_usize(arg) else {
                return false;
            };
            match as_str(actual) {
                Some(s) => {
                    let len = s.chars().count();
                    len >= min && len <= max
                }
                None => false,
            }
        }

        "type" => type_matches(arg, actual),
        "length" => {
            let Ok(n) = arg.trim().parse::<usize>() else {
                return false;
            };
            match actual {
                Some(Value::String(s)) => s.chars().count() == n,
                Some(Value::Array(items)) => items.len() == n,
                _ => false,
            }
        }
        "count" => {
            let Ok(n) = arg.trim().parse::<usize>() else {
                return false;
            };
            match actual {
                Some(Value::Array(items)) => items.len() == n,
                Some(Value::Object(map)) => map.len() == n,
                _ => false,
            }
        }

        "greaterThan" => numeric_compare(actual, arg, |a, b| a > b),
        "lessThan" => numeric_compare(actual, arg, |a, b| a < b),
        "greaterThanOrEqual" => numeric_compare(actual, arg, |a, b| a >= b),
        "lessThanOrEqual" => numeric_compare(actual, arg, |a, b| a <= b),
        "equals" => numeric_compare(actual, arg, |a, b| a == b),
        "notEquals" => numeric_compare(actual, arg, |a, b| a != b),
        "between" | "range" => {
            let Some((min, max)) = split_two_f64(arg) else {
                return false;
            };
            match to_number(actual) {
                Some(v) => v >= min && v <= max,
                None => false,
            }
        }
        "approximately" => {
            let Some((target, tolerance)) = split_two_f64(arg) else {
                // Non-numeric tolerance fails the match rather than erroring.
                return false;
            };
            match to_number(actual) {
                Some(v) => (v - target).abs() <= tolerance,
                None => false,
            }
        }
        "multipleOf" | "divisibleBy" => {
            let Some(divisor) = parse_float_prefix(arg) else {
                return false;
            };
            if divisor == 0.0 {
                return false;
            }
            match to_number(actual) {
                Some(v) => v % divisor == 0.0,
                None => false,
            }
        }
        "decimalPlaces" => {
            let Ok(n) = arg.trim().parse::<usize>() else {
                return false;
            };
            decimal_places(actual) == Some(n)
        }

        "arrayLength" => {
            let Ok(n) = arg.trim().parse::<usize>() else {
                return false;
            };
            matches!(actual, Some(Value::Array(items)) if items.len() == n)
        }
        "arrayContains" => array_contains(arg, actual),

        "dateAfter" => date_compare(actual, arg, |a, b| a > b),
        "dateBefore" => date_compare(actual, arg, |a, b| a < b),
        "dateBetween" => {
            let Some((start, end)) = arg.split_once(':') else {
                return false;
            };
            let (Some(start), Some(end)) = (parse_date_arg(start), parse_date_arg(end)) else {
                return false;
            };
            match actual.and_then(parse_date_value) {
                Some(d) => d >= start && d <= end,
                None => false,
            }
        }
        "dateEquals" => date_compare(actual, arg, |a, b| a == b),
        "dateAge" => date_age(actual, arg),
        "dateFormat" => date_format(actual, arg),

        "crossField" => cross_field(arg, actual),

        _ => false,
    }
}

// ---------------------------------------------------------------------------
// coercion helpers

fn as_str(actual: Option<&Value>) -> Option<&str> {
    match actual {
        Some(Value::String(s)) => Some(s),
        _ => None,
    }
}

/// Numeric coercion: numbers directly; strings via a `parseFloat`-style
/// longest numeric prefix, finite results only.
fn to_number(actual: Option<&Value>) -> Option<f64> {
    match actual {
        Some(Value::Number(n)) => n.as_f64().filter(|f| f.is_finite()),
        Some(Value::String(s)) => parse_float_prefix(s),
        _ => None,
    }
}

fn parse_float_prefix(s: &str) -> Option<f64> {
    let s = s.trim();
    let bytes = s.as_bytes();
    let mut i = 0;
    if i < bytes.len() && (bytes[i] == b'+' || bytes[i] == b'-') {
        i += 1;
    }
    let mut saw_digit = false;
    while i < bytes.len() && bytes[i].is_ascii_digit() {
        i += 1;
        saw_digit = true;
    }
    if i < bytes.len() && bytes[i] == b'.' {
        i += 1;
        while i < bytes.len() && bytes[i].is_ascii_digit() {
            i += 1;
            saw_digit = true;
        }
    }
    if !saw_digit {
        return None;
    }
    if i < bytes.len() && (bytes[i] == b'e' || bytes[i] == b'E') {
        let mut j = i + 1;
        if j < bytes.len() && (bytes[j] == b'+' || bytes[j] == b'-') {
            j += 1;
        }
        let exp_start = j;
        while j < bytes.len() && bytes[j].is_ascii_digit() {
            j += 1;
        }
        if j > exp_start {
            i = j;
        }
    }
    s[..i].parse::<f64>().ok().filter(|f| f.is_finite())
}

fn numeric_compare(actual: Option<&Value>, arg: &str, cmp: fn(f64, f64) -> bool) -> bool {
    match (to_number(actual), parse_float_prefix(arg)) {
        (Some(a), Some(b)) => cmp(a, b),
        _ => false,
    }
}

fn with_string_length(actual: Option<&Value>, arg: &str, cmp: fn(usize, usize) -> bool) -> bool {
    let Ok(n) = arg.trim().parse::<usize>() else {
        return false;
    };
    match as_str(actual) {
        Some(s) => cmp(s.chars().count(), n),
        None => false,
    }
}

fn split_two_usize(arg: &str) -> Option<(usize, usize)> {
    let (a, b) = arg.split_once(':')?;
    Some((a.trim().parse().ok()?, b.trim().parse().ok()?))
}

fn split_two_f64(arg: &str) -> Option<(f64, f64)> {
    let (a, b) = arg.split_once(':')?;
    Some((parse_float_prefix(a)?, parse_float_prefix(b)?))
}

/// Runtime type semantics: arrays are also objects, and null carries the
/// object type.
fn type_matches(name: &str, actual: Option<&Value>) -> bool {
    match name {
        "string" => matches!(actual, Some(Value::String(_))),
        "number" => matches!(actual, Some(Value::Number(_))),
        "boolean" => matches!(actual, Some(Value::Bool(_))),
        "array" => matches!(actual, Some(Value::Array(_))),
        "object" => matches!(
            actual,
            Some(Value::Object(_)) | Some(Value::Array(_)) | Some(Value::Null)
        ),
        "undefined" => actual.is_none(),
        // No JSON value ever has these runtime types.
        "function" | "symbol" | "bigint" => false,
        _ => false,
    }
}

fn decimal_places(actual: Option<&Value>) -> Option<usize> {
    let repr = match actual {
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::String(s)) => {
            parse_float_prefix(s)?;
            s.trim().to_string()
        }
        _ => return None,
    };
    Some(match repr.split_once('.') {
        Some((_, fraction)) => fraction
            .chars()
            .take_while(|c| c.is_ascii_digit())
            .count(),
        None => 0,
    })
}

/// Scalar values compared stringwise for `arrayContains`.
fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null => Some("null".to_string()),
        _ => None,
    }
}

/// `arrayContains:<scalar>` matches any stringwise-equal element;
/// `arrayContains:<field>:<value>` matches any object element whose field
/// stringwise-equals the value. Empty arrays never match.
fn array_contains(arg: &str, actual: Option<&Value>) -> bool {
    let Some(Value::Array(items)) = actual else {
        return false;
    };
    match arg.split_once(':') {
        Some((field, wanted)) => items.iter().any(|item| {
            item.get(field)
                .and_then(scalar_to_string)
                .map(|s| s == wanted)
                .unwrap_or(false)
        }),
        None => items
            .iter()
            .any(|item| scalar_to_string(item).map(|s| s == arg).unwrap_or(false)),
    }
}

// ---------------------------------------------------------------------------
// dates

/// Parse a value as a date. Numbers are epoch timestamps (milliseconds when
/// the magnitude says so, else seconds). Purely-digit strings are years or
/// ids, not dates, and are rejected.
fn parse_date_value(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => parse_date_str(s),
        Value::Number(n) => epoch_to_date(n.as_f64()?),
        _ => None,
    }
}

fn epoch_to_date(n: f64) -> Option<DateTime<Utc>> {
    if !n.is_finite() {
        return None;
    }
    let millis = if n.abs() >= 1e12 { n } else { n * 1000.0 };
    Utc.timestamp_millis_opt(millis as i64).single()
}

fn parse_date_str(s: &str) -> Option<DateTime<Utc>> {
    let t = s.trim();
    if t.is_empty() || t.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    if let Ok(d) = DateTime::parse_from_rfc3339(t) {
        return Some(d.with_timezone(&Utc));
    }
    if let Ok(d) = NaiveDateTime::parse_from_str(t, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(Utc.from_utc_datetime(&d));
    }
    if let Ok(d) = NaiveDateTime::parse_from_str(t, "%Y-%m-%d %H:%M:%S%.f") {
        return Some(Utc.from_utc_datetime(&d));
    }
    if let Ok(d) = NaiveDate::parse_from_str(t, "%Y-%m-%d") {
        return Some(Utc.from_utc_datetime(&d.and_hms_opt(0, 0, 0)?));
    }
    if let Ok(d) = NaiveDate::parse_from_str(t, "%m/%d/%Y") {
        return Some(Utc.from_utc_datetime(&d.and_hms_opt(0, 0, 0)?));
    }
    if let Ok(d) = DateTime::parse_from_rfc2822(t) {
        return Some(d.with_timezone(&Utc));
    }
    None
}

/// Date argument in a pattern: an ISO string, or a digit-only epoch.
fn parse_date_arg(arg: &str) -> Option<DateTime<Utc>> {
    let t = arg.trim();
    if !t.is_empty() && t.chars().all(|c| c.is_ascii_digit() || c == '.') {
        return epoch_to_date(t.parse::<f64>().ok()?);
    }
    parse_date_str(t)
}

fn date_compare(
    actual: Option<&Value>,
    arg: &str,
    cmp: fn(DateTime<Utc>, DateTime<Utc>) -> bool,
) -> bool {
    match (actual.and_then(parse_date_value), parse_date_arg(arg)) {
        (Some(a), Some(b)) => cmp(a, b),
        _ => false,
    }
}

static DATE_AGE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d+(?:\.\d+)?)(ms|s|m|h|d)$").unwrap());

fn date_age(actual: Option<&Value>, arg: &str) -> bool {
    let Some(captures) = DATE_AGE_RE.captures(arg.trim()) else {
        return false;
    };
    let amount: f64 = captures[1].parse().unwrap_or(f64::NAN);
    if !amount.is_finite() {
        return false;
    }
    let unit_ms = match &captures[2] {
        "ms" => 1.0,
        "s" => 1000.0,
        "m" => 60_000.0,
        "h" => 3_600_000.0,
        "d" => 86_400_000.0,
        _ => return false,
    };
    let max_age_ms = amount * unit_ms;
    match actual.and_then(parse_date_value) {
        Some(d) => {
            let age_ms = (Utc::now() - d).num_milliseconds().abs() as f64;
            age_ms <= max_age_ms
        }
        None => false,
    }
}

static ISO_DATETIME_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\d{4}-\d{2}-\d{2}T\d{2}:\d{2}:\d{2}(\.\d+)?(Z|[+-]\d{2}:\d{2})?$").unwrap()
});
static ISO_DATE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{4}-\d{2}-\d{2}$").unwrap());
static ISO_TIME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d{2}:\d{2}:\d{2}(\.\d+)?$").unwrap());
static US_DATE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{1,2}/\d{1,2}/\d{4}$").unwrap());
static TIMESTAMP_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d+$").unwrap());

/// Format-shape check only, string actuals only.
fn date_format(actual: Option<&Value>, kind: &str) -> bool {
    let Some(s) = as_str(actual) else {
        return false;
    };
    match kind {
        "iso" => ISO_DATETIME_RE.is_match(s),
        "iso-date" => ISO_DATE_RE.is_match(s),
        "iso-time" => ISO_TIME_RE.is_match(s),
        "us-date" => US_DATE_RE.is_match(s),
        "timestamp" => TIMESTAMP_RE.is_match(s),
        _ => false,
    }
}

// ---------------------------------------------------------------------------
// cross-field

static CROSS_FIELD_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(.+?)\s*(<=|>=|!=|<|>|=)\s*(.+)$").unwrap());

/// `crossField:<lhs> <op> <rhs>` resolved against the current object.
/// Missing fields fail the match without producing an error.
pub fn cross_field(expr: &str, actual: Option<&Value>) -> bool {
    let Some(object) = actual else {
        return false;
    };
    let Some(captures) = CROSS_FIELD_RE.captures(expr.trim()) else {
        return false;
    };
    let lhs_path = captures[1].trim();
    let op = &captures[2].to_string();
    let rhs_path = captures[3].trim();

    let lhs = crate::matcher::fields::extract_field(object, lhs_path);
    let rhs = crate::matcher::fields::extract_field(object, rhs_path);
    let (Some(lhs), Some(rhs)) = (lhs, rhs) else {
        return false;
    };

    compare_operands(&lhs, &rhs, op)
}

fn compare_operands(lhs: &Value, rhs: &Value, op: &str) -> bool {
    // Numeric comparison when both sides coerce to finite numbers.
    if let (Some(a), Some(b)) = (to_number(Some(lhs)), to_number(Some(rhs))) {
        // Digit-only strings stay numeric unless the opposing operand is a
        // real date; both numeric here, so compare as numbers.
        if !is_datelike(lhs) && !is_datelike(rhs) {
            return apply_op(a.partial_cmp(&b), op);
        }
    }
    // Date comparison, allowing a bare year string only when the opposing
    // operand parsed as a date.
    let lhs_date = parse_date_value(lhs);
    let rhs_date = parse_date_value(rhs);
    match (lhs_date, rhs_date) {
        (Some(a), Some(b)) => return apply_op(a.partial_cmp(&b), op),
        (Some(a), None) => {
            if let Some(b) = parse_year_string(rhs) {
                return apply_op(a.partial_cmp(&b), op);
            }
        }
        (None, Some(b)) => {
            if let Some(a) = parse_year_string(lhs) {
                return apply_op(a.partial_cmp(&b), op);
            }
        }
        (None, None) => {}
    }
    // Fall back to string comparison.
    let (Some(a), Some(b)) = (scalar_to_string(lhs), scalar_to_string(rhs)) else {
        return false;
    };
    apply_op(a.partial_cmp(&b), op)
}

fn is_datelike(value: &Value) -> bool {
    parse_date_value(value).is_some()
}

/// "2023" as a year, valid only opposite a real date operand.
fn parse_year_string(value: &Value) -> Option<DateTime<Utc>> {
    let s = value.as_str()?.trim();
    if s.len() == 4 && s.chars().all(|c| c.is_ascii_digit()) {
        let year: i32 = s.parse().ok()?;
        return Some(Utc.from_utc_datetime(
            &NaiveDate::from_ymd_opt(year, 1, 1)?.and_hms_opt(0, 0, 0)?,
        ));
    }
    None
}

fn apply_op(ordering: Option<std::cmp::Ordering>, op: &str) -> bool {
    use std::cmp::Ordering::*;
    let Some(ordering) = ordering else {
        return false;
    };
    match op {
        "=" => ordering == Equal,
        "!=" => ordering != Equal,
        "<" => ordering == Less,
        "<=" => ordering != Greater,
        ">" => ordering == Greater,
        ">=" => ordering != Less,
        _ => false,
    }
}
