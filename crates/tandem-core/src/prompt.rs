//! Refinement prompt construction
//!
//! When a generated candidate fails its tests, the next generation call gets
//! a prompt that folds in the original task, the failing code, and the
//! structured failure report.

use crate::types::{InitialRequest, TestReport};

/// Build the corrective prompt for the next generation attempt.
#[must_use]
pub fn refinement_prompt(
    request: &InitialRequest,
    faulty_code: &str,
    errors: &TestReport,
) -> String {
    let error_summary =
        serde_json::to_string_pretty(errors).unwrap_or_else(|_| "<unserializable report>".into());

    format!(
        "The original task was: {task}\n\n\
         The following code was generated but failed the tests:\n\
         ```\n{code}\n```\n\n\
         The test execution failed with the following results:\n\
         {errors}\n\n\
         Based on the test errors, please provide a corrected version of the code.\n\
         Only output the raw code, without any explanations or markdown formatting.\n",
        task = request.functional_description,
        code = faulty_code,
        errors = error_summary,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TestSummary;
    use url::Url;

    #[test]
    fn prompt_folds_in_task_code_and_errors() {
        let request = InitialRequest::new(
            "Implement a FIFO queue",
            Url::parse("https://example.com/t.tar.gz").unwrap(),
            3,
        )
        .unwrap();
        let report = TestReport {
            summary: Some(TestSummary {
                passed: 1,
                failed: 2,
                ..TestSummary::default()
            }),
            ..TestReport::default()
        };

        let prompt = refinement_prompt(&request, "def pop(): pass", &report);

        assert!(prompt.contains("Implement a FIFO queue"));
        assert!(prompt.contains("def pop(): pass"));
        assert!(prompt.contains("\"failed\": 2"));
        assert!(prompt.contains("corrected version"));
    }
}
