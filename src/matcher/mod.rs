//! Validation engine: the pattern DSL, path extraction, and the recursive
//! structural matcher that turns divergence into diagnostics.

pub mod deep;
pub mod fields;
pub mod pattern;

pub use deep::{deep_match, deep_match_at};
pub use fields::extract_field;
pub use pattern::{evaluate, known_operators, pattern_type, PatternOutcome};
