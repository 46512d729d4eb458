//! Test execution: one session per suite, one request/response per test.
//!
//! Failures are data. A timeout, parse failure, or structural mismatch
//! fails the test and the run moves on; only process death or startup
//! failure aborts a suite. Test-level events stream to an observer so the
//! CLI can render progress as it happens.

use crate::config::ServerConfig;
use crate::diagnostics::antipattern::AntiPatternWarning;
use crate::diagnostics::{analyze, scan_expected, Analysis, DiagnosticError, ErrorType};
use crate::matcher::deep_match;
use crate::matcher::pattern::{self, PatternOutcome};
use crate::session::Session;
use crate::suite::{TestCase, TestSuite};
use serde_json::Value;
use tracing::info;

pub mod reporter;

pub use reporter::ConsoleReporter;

/// Result of one test.
#[derive(Debug)]
pub struct TestOutcome {
    pub it: String,
    pub passed: bool,
    pub errors: Vec<DiagnosticError>,
    pub analysis: Option<Analysis>,
    pub warnings: Vec<AntiPatternWarning>,
    /// Infrastructure failure (timeout, parse error, process exit) that
    /// prevented validation.
    pub failure: Option<String>,
}

/// Result of one suite.
#[derive(Debug)]
pub struct SuiteOutcome {
    pub description: String,
    pub file_path: std::path::PathBuf,
    pub outcomes: Vec<TestOutcome>,
    /// Set when the suite could not run (to completion): startup failure or
    /// mid-suite process death.
    pub aborted: Option<String>,
}

/// Aggregate over a whole run.
#[derive(Debug, Default)]
pub struct RunSummary {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub suites: Vec<SuiteOutcome>,
}

impl RunSummary {
    pub fn all_passed(&self) -> bool {
        self.failed == 0 && self.suites.iter().all(|s| s.aborted.is_none())
    }
}

/// Test-level progress events.
pub enum RunEvent<'a> {
    SuiteStarted {
        suite: &'a TestSuite,
    },
    TestFinished {
        outcome: &'a TestOutcome,
    },
    SuiteFinished {
        outcome: &'a SuiteOutcome,
    },
    SuiteAborted {
        suite: &'a TestSuite,
        reason: &'a str,
    },
}

pub trait RunObserver {
    fn on_event(&mut self, event: RunEvent<'_>);
}

/// No-op observer for embedding.
pub struct SilentObserver;

impl RunObserver for SilentObserver {
    fn on_event(&mut self, _event: RunEvent<'_>) {}
}

pub struct TestRunner {
    config: ServerConfig,
}

impl TestRunner {
    pub fn new(config: ServerConfig) -> Self {
        Self { config }
    }

    /// Run every suite in file order against a fresh session each.
    pub async fn run(&self, suites: &[TestSuite], observer: &mut dyn RunObserver) -> RunSummary {
        let mut summary = RunSummary::default();
        for suite in suites {
            let outcome = self.run_suite(suite, observer).await;
            summary.total += suite.tests.len();
            summary.passed += outcome.outcomes.iter().filter(|o| o.passed).count();
            summary.failed += outcome.outcomes.iter().filter(|o| !o.passed).count();
            // Tests never reached still count against the run.
            summary.failed += suite.tests.len() - outcome.outcomes.len();
            summary.suites.push(outcome);
        }
        summary
    }

    async fn run_suite(&self, suite: &TestSuite, observer: &mut dyn RunObserver) -> SuiteOutcome {
        observer.on_event(RunEvent::SuiteStarted { suite });
        info!("Running suite '{}' ({} tests)", suite.description, suite.tests.len());

        let mut result = SuiteOutcome {
            description: suite.description.clone(),
            file_path: suite.file_path.clone(),
            outcomes: Vec::new(),
            aborted: None,
        };

        let session = Session::new(self.config.clone());
        if let Err(e) = session.connect().await {
            let reason = e.to_string();
            observer.on_event(RunEvent::SuiteAborted {
                suite,
                reason: &reason,
            });
            result.aborted = Some(reason);
            return result;
        }

        for test in &suite.tests {
            let (outcome, fatal) = self.run_test(&session, test).await;
            observer.on_event(RunEvent::TestFinished { outcome: &outcome });
            result.outcomes.push(outcome);
            if fatal {
                result.aborted = Some("Server process exited".to_string());
                break;
            }
        }

        let _ = session.disconnect().await;
        observer.on_event(RunEvent::SuiteFinished { outcome: &result });
        result
    }

    /// Returns the outcome and whether the failure kills the suite.
    async fn run_test(&self, session: &Session, test: &TestCase) -> (TestOutcome, bool) {
        // Each test sees only its own stderr.
        session.clear_stderr().await;

        let warnings = scan_expected(&test.expect.response);

        let response = match session.send_raw(&test.request).await {
            Ok(response) => response,
            Err(e) => {
                let fatal = e.is_suite_fatal();
                return (
                    TestOutcome {
                        it: test.it.clone(),
                        passed: false,
                        errors: Vec::new(),
                        analysis: None,
                        warnings,
                        failure: Some(e.to_string()),
                    },
                    fatal,
                );
            }
        };

        let mut errors = deep_match(&test.expect.response, &response);

        if let Some(stderr_expectation) = &test.expect.stderr {
            let stderr = session.get_stderr().await;
            check_stderr(stderr_expectation, &stderr, &mut errors);
        }

        let passed = errors.is_empty();
        let analysis = if passed {
            None
        } else {
            Some(analyze(&mut errors))
        };

        (
            TestOutcome {
                it: test.it.clone(),
                passed,
                errors,
                analysis,
                warnings,
                failure: None,
            },
            false,
        )
    }
}

/// Apply the `expect.stderr` assertion.
///
/// `toBeEmpty` requires trimmed-empty accumulated stderr; a `match:` string
/// runs through the pattern DSL; anything else must equal the output
/// exactly.
fn check_stderr(expectation: &str, stderr: &str, errors: &mut Vec<DiagnosticError>) {
    let stderr_value = Value::String(stderr.to_string());
    match expectation {
        "toBeEmpty" => {
            if !stderr.trim().is_empty() {
                errors.push(DiagnosticError::new(
                    ErrorType::ValueMismatch,
                    "stderr",
                    Value::String("toBeEmpty".to_string()),
                    Some(stderr_value),
                    "Expected empty stderr but the server wrote output",
                ));
            }
        }
        pattern_string if pattern_string.starts_with("match:") => {
            let body = &pattern_string["match:".len()..];
            if pattern::evaluate(body, Some(&stderr_value)) != PatternOutcome::Pass {
                errors.push(
                    DiagnosticError::new(
                        ErrorType::PatternFailed,
                        "stderr",
                        Value::String(pattern_string.to_string()),
                        Some(stderr_value),
                        format!("Stderr did not match pattern '{}'", pattern_string),
                    )
                    .with_pattern_type(pattern::pattern_type(body)),
                );
            }
        }
        literal => {
            if stderr != literal {
                errors.push(DiagnosticError::new(
                    ErrorType::ValueMismatch,
                    "stderr",
                    Value::String(literal.to_string()),
                    Some(stderr_value),
                    "Stderr did not equal the expected text",
                ));
            }
        }
    }
}
