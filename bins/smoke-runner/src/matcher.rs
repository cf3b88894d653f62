/// Outcome Matcher - Expectation Checking
///
/// **Core Responsibility:**
/// Compare one observed compile/execute outcome against a test case
/// expectation and produce a verdict.
///
/// **Critical Properties:**
/// - Knows nothing about HTTP or the compilation service
/// - Pure and total: (outcome, expectation) → verdict
///
/// **Matching Rules:**
/// - Execute: exit code must match, then either the first stdout line
///   (default) or the whole stdout sequence (`exact_match`) must match
/// - Compile-only: exit code 0 and/or empty stdout, as the expectation asks
///
/// **No Normalization:**
/// Line text is compared byte for byte. Leading and trailing whitespace is
/// significant (some toolchains emit a leading space that suites expect).

use smoke_common::types::{
    CompileOnlyExpectation, ExecuteExpectation, Expectation, FailureReason, RawOutcome, Verdict,
};

fn check_execute(observed: &RawOutcome, expected: &ExecuteExpectation) -> bool {
    if i64::from(observed.exit_code) != i64::from(expected.exit_code) {
        return false;
    }

    if expected.exact_match {
        return observed.stdout.len() == expected.stdout_lines.len()
            && observed
                .stdout
                .iter()
                .zip(&expected.stdout_lines)
                .all(|(line, want)| line.text == *want);
    }

    match expected.stdout_lines.first() {
        Some(want) => observed.stdout.first().is_some_and(|line| line.text == *want),
        None => true,
    }
}

fn check_compile_only(observed: &RawOutcome, expected: &CompileOnlyExpectation) -> bool {
    let exit_ok = !expected.must_exit_zero || observed.exit_code == 0;
    let stdout_ok = !expected.must_have_empty_stdout || observed.stdout.is_empty();
    exit_ok && stdout_ok
}

/// Classify one observed outcome.
///
/// On mismatch the reason carries the observed exit code, the full observed
/// stdout and a description of what was expected.
pub fn classify(observed: &RawOutcome, expectation: &Expectation) -> Verdict {
    let matched = match expectation {
        Expectation::Execute(expected) => check_execute(observed, expected),
        Expectation::CompileOnly(expected) => check_compile_only(observed, expected),
    };

    if matched {
        Verdict::Pass
    } else {
        Verdict::Fail {
            reason: FailureReason::OutcomeMismatch {
                expected: expectation.to_string(),
                observed_exit_code: observed.exit_code,
                observed_stdout: observed.stdout.iter().map(|l| l.text.clone()).collect(),
            },
        }
    }
}
