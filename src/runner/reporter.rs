//! Plain-text progress and summary output.

use crate::diagnostics::preview_opt;
use crate::runner::{RunEvent, RunObserver, RunSummary};

/// Streams test results to stdout as they complete.
pub struct ConsoleReporter {
    verbose: bool,
}

impl ConsoleReporter {
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }

    /// Final run summary. Returns the process exit code.
    pub fn finish(&self, summary: &RunSummary) -> i32 {
        println!();
        let aborted: Vec<&str> = summary
            .suites
            .iter()
            .filter_map(|s| s.aborted.as_deref())
            .collect();
        if summary.all_passed() {
            println!("All tests passed ({}/{})", summary.passed, summary.total);
            0
        } else {
            println!(
                "{} of {} tests failed ({} passed)",
                summary.failed, summary.total, summary.passed
            );
            for reason in aborted {
                println!("  suite aborted: {}", reason);
            }
            1
        }
    }
}

impl RunObserver for ConsoleReporter {
    fn on_event(&mut self, event: RunEvent<'_>) {
        match event {
            RunEvent::SuiteStarted { suite } => {
                println!();
                println!("{} ({})", suite.description, suite.file_path.display());
            }
            RunEvent::TestFinished { outcome } => {
                if outcome.passed {
                    println!("  ✓ PASS {}", outcome.it);
                } else {
                    println!("  ✗ FAIL {}", outcome.it);
                    if let Some(failure) = &outcome.failure {
                        println!("      {}", failure);
                    }
                    for error in &outcome.errors {
                        println!("      {}", error.message);
                        if self.verbose {
                            println!(
                                "        expected: {}",
                                crate::diagnostics::preview(&error.expected)
                            );
                            println!("        actual:   {}", preview_opt(&error.actual));
                        }
                    }
                    if let Some(analysis) = &outcome.analysis {
                        println!("      {}", analysis.summary);
                        for suggestion in &analysis.suggestions {
                            println!("      suggestion: {}", suggestion);
                        }
                    }
                }
                for warning in &outcome.warnings {
                    println!("  ⚠ {}: {}", warning.path, warning.suggestion);
                }
            }
            RunEvent::SuiteAborted { reason, .. } => {
                println!("  suite failed to run: {}", reason);
            }
            RunEvent::SuiteFinished { .. } => {}
        }
    }
}
