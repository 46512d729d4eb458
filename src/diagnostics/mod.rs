//! Structured diagnostics.
//!
//! Every divergence the matcher finds becomes a [`DiagnosticError`] record;
//! nothing in the validation path throws. The analyzer summarises a batch of
//! records, and two static analyzers inspect the expected tree itself for
//! authoring mistakes before a test ever runs.

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub mod analyzer;
pub mod antipattern;
pub mod corrector;

pub use analyzer::{analyze, Analysis};
pub use antipattern::scan_expected;
pub use corrector::suggest_operator;

/// What kind of divergence was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorType {
    ValueMismatch,
    TypeMismatch,
    LengthMismatch,
    MissingField,
    ExtraField,
    PatternFailed,
}

impl ErrorType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorType::ValueMismatch => "value_mismatch",
            ErrorType::TypeMismatch => "type_mismatch",
            ErrorType::LengthMismatch => "length_mismatch",
            ErrorType::MissingField => "missing_field",
            ErrorType::ExtraField => "extra_field",
            ErrorType::PatternFailed => "pattern_failed",
        }
    }
}

/// Grouping key for suggestion aggregation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Value,
    Type,
    Length,
    Structure,
    Pattern,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Value => "value",
            Category::Type => "type",
            Category::Length => "length",
            Category::Structure => "structure",
            Category::Pattern => "pattern",
        }
    }

    pub fn for_error_type(error_type: ErrorType) -> Self {
        match error_type {
            ErrorType::ValueMismatch => Category::Value,
            ErrorType::TypeMismatch => Category::Type,
            ErrorType::LengthMismatch => Category::Length,
            ErrorType::MissingField | ErrorType::ExtraField => Category::Structure,
            ErrorType::PatternFailed => Category::Pattern,
        }
    }
}

/// One structured failure record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiagnosticError {
    #[serde(rename = "type")]
    pub error_type: ErrorType,
    pub category: Category,
    /// Dot path to the diverging field, rooted at `response`.
    pub path: String,
    pub expected: Value,
    /// `None` when the field was absent from the actual value.
    pub actual: Option<Value>,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
    /// Operator name for `pattern_failed`, `"unknown"` for tokens outside
    /// the catalog.
    #[serde(rename = "patternType", skip_serializing_if = "Option::is_none")]
    pub pattern_type: Option<String>,
}

impl DiagnosticError {
    pub fn new(
        error_type: ErrorType,
        path: impl Into<String>,
        expected: Value,
        actual: Option<Value>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            error_type,
            category: Category::for_error_type(error_type),
            path: path.into(),
            expected,
            actual,
            message: message.into(),
            suggestion: None,
            pattern_type: None,
        }
    }

    pub fn with_pattern_type(mut self, pattern_type: impl Into<String>) -> Self {
        self.pattern_type = Some(pattern_type.into());
        self
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }
}

/// Short single-line preview of a value for failure messages.
pub fn preview(value: &Value) -> String {
    let raw = match value {
        Value::String(s) => format!("\"{}\"", s),
        other => other.to_string(),
    };
    const MAX: usize = 80;
    if raw.chars().count() > MAX {
        let truncated: String = raw.chars().take(MAX).collect();
        format!("{}...", truncated)
    } else {
        raw
    }
}

/// Preview for an optional actual, rendering absence as `undefined`.
pub fn preview_opt(value: &Option<Value>) -> String {
    match value {
        Some(v) => preview(v),
        None => "undefined".to_string(),
    }
}
