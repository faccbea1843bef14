//! Sandbox report classification
//!
//! Turns the raw sandbox report into the one decision the agent loop acts on:
//! pass, retry, or stop.

use crate::types::TestReport;

/// Decision derived from one sandbox report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IterationOutcome {
    /// Tests ran and all passed; the agent succeeds with its code
    Passed,
    /// Tests ran but some failed; feed the report into refinement and loop
    RetryableFailure,
    /// Execution itself broke; not a fixable code defect, the agent fails now
    TerminalFailure(String),
}

/// Classify a sandbox report.
///
/// A non-empty top-level `error` wins over any summary contents. A summary
/// with `failed > 0` is retryable; `passed > 0` with no failures is a pass;
/// anything else (no summary, or zero counts both ways) means the run
/// produced nothing conclusive and is terminal.
#[must_use]
pub fn classify_report(report: &TestReport) -> IterationOutcome {
    if let Some(error) = report.error.as_deref() {
        if !error.is_empty() {
            return IterationOutcome::TerminalFailure(error.to_string());
        }
    }

    match &report.summary {
        Some(summary) if summary.failed > 0 => IterationOutcome::RetryableFailure,
        Some(summary) if summary.passed > 0 => IterationOutcome::Passed,
        _ => IterationOutcome::TerminalFailure("no conclusive test summary".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TestSummary;

    fn report(passed: u64, failed: u64) -> TestReport {
        TestReport {
            summary: Some(TestSummary {
                passed,
                failed,
                ..TestSummary::default()
            }),
            ..TestReport::default()
        }
    }

    #[test]
    fn all_passing_is_a_pass() {
        assert_eq!(classify_report(&report(4, 0)), IterationOutcome::Passed);
    }

    #[test]
    fn mixed_results_are_retryable() {
        // failed=2, passed=3 must continue the loop, not terminate the agent.
        assert_eq!(
            classify_report(&report(3, 2)),
            IterationOutcome::RetryableFailure
        );
    }

    #[test]
    fn error_field_wins_over_summary() {
        let mut r = report(3, 0);
        r.error = Some("container crashed".to_string());
        assert_eq!(
            classify_report(&r),
            IterationOutcome::TerminalFailure("container crashed".to_string())
        );
    }

    #[test]
    fn empty_error_field_is_ignored() {
        let mut r = report(1, 0);
        r.error = Some(String::new());
        assert_eq!(classify_report(&r), IterationOutcome::Passed);
    }

    #[test]
    fn missing_summary_is_terminal() {
        let r = TestReport::default();
        assert!(matches!(
            classify_report(&r),
            IterationOutcome::TerminalFailure(_)
        ));
    }

    #[test]
    fn zero_counts_both_ways_are_terminal() {
        assert!(matches!(
            classify_report(&report(0, 0)),
            IterationOutcome::TerminalFailure(_)
        ));
    }
}
