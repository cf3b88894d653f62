use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Language identifier as understood by the compilation service (e.g. `c++`, `fortran`)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LanguageId(String);

impl LanguageId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LanguageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for LanguageId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Filter options forwarded verbatim to a compile request.
///
/// Every option must be stated by the caller; there is no `Default`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CompileFilters {
    pub directives: bool,
    pub labels: bool,
    pub comment_only: bool,
    pub library_code: bool,
}

/// Expectation for a test that runs the compiled program
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecuteExpectation {
    pub exit_code: u32,
    pub stdout_lines: Vec<String>,
    /// Compare the whole stdout sequence instead of only the first line
    #[serde(default)]
    pub exact_match: bool,
}

impl ExecuteExpectation {
    pub fn new(exit_code: u32, stdout_lines: Vec<String>) -> Self {
        Self {
            exit_code,
            stdout_lines,
            exact_match: false,
        }
    }

    pub fn exact(mut self) -> Self {
        self.exact_match = true;
        self
    }
}

/// Expectation for a test that only compiles and inspects diagnostics
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompileOnlyExpectation {
    pub must_exit_zero: bool,
    pub must_have_empty_stdout: bool,
    pub filters: CompileFilters,
}

impl CompileOnlyExpectation {
    pub fn new(filters: CompileFilters) -> Self {
        Self {
            must_exit_zero: true,
            must_have_empty_stdout: true,
            filters,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Expectation {
    Execute(ExecuteExpectation),
    CompileOnly(CompileOnlyExpectation),
}

impl Expectation {
    pub fn requires_execution(&self) -> bool {
        matches!(self, Expectation::Execute(_))
    }
}

impl fmt::Display for Expectation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expectation::Execute(e) => {
                write!(f, "exit code {}", e.exit_code)?;
                match (e.exact_match, e.stdout_lines.first()) {
                    (true, _) => write!(f, ", stdout {:?}", e.stdout_lines),
                    (false, Some(line)) => write!(f, ", first stdout line {:?}", line),
                    (false, None) => Ok(()),
                }
            }
            Expectation::CompileOnly(e) => {
                let mut parts = Vec::new();
                if e.must_exit_zero {
                    parts.push("exit code 0");
                }
                if e.must_have_empty_stdout {
                    parts.push("empty stdout");
                }
                if parts.is_empty() {
                    f.write_str("any compile outcome")
                } else {
                    f.write_str(&parts.join(", "))
                }
            }
        }
    }
}

/// One source snippet plus what the service is expected to do with it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestCase {
    pub language: LanguageId,
    pub source_code: String,
    pub expectation: Expectation,
}

impl TestCase {
    pub fn new(language: LanguageId, source_code: impl Into<String>, expectation: Expectation) -> Self {
        Self {
            language,
            source_code: source_code.into(),
            expectation,
        }
    }
}

/// Name + version lookup for a single compiler
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompilerLookup {
    pub name: String,
    pub version: String,
}

/// Two-phase check of one named compiler: execute, then compile-only, both
/// over the same source text
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamedCheck {
    pub language: LanguageId,
    pub compiler: CompilerLookup,
    pub source_code: String,
    pub execute: ExecuteExpectation,
    pub compile: CompileOnlyExpectation,
}

impl NamedCheck {
    pub fn execute_case(&self) -> TestCase {
        TestCase::new(
            self.language.clone(),
            self.source_code.clone(),
            Expectation::Execute(self.execute.clone()),
        )
    }

    pub fn compile_case(&self) -> TestCase {
        TestCase::new(
            self.language.clone(),
            self.source_code.clone(),
            Expectation::CompileOnly(self.compile.clone()),
        )
    }
}

/// Compiler identity and capabilities as reported by the catalog
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompilerDescriptor {
    pub id: String,
    pub display_name: String,
    pub language: LanguageId,
    #[serde(default)]
    pub semver: Option<String>,
    pub supports_execution: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultLine {
    pub text: String,
}

impl From<&str> for ResultLine {
    fn from(text: &str) -> Self {
        Self {
            text: text.to_string(),
        }
    }
}

/// What the service observed for one compile or execute request.
///
/// A non-zero `exit_code` is a normal outcome, not an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawOutcome {
    pub exit_code: i32,
    pub stdout: Vec<ResultLine>,
    #[serde(default)]
    pub stderr: Vec<ResultLine>,
}

impl RawOutcome {
    pub fn stdout_texts(&self) -> Vec<&str> {
        self.stdout.iter().map(|l| l.text.as_str()).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FailureReason {
    /// The request succeeded but the outcome did not match
    OutcomeMismatch {
        expected: String,
        observed_exit_code: i32,
        observed_stdout: Vec<String>,
    },
    /// The compile/execute request itself failed
    EvaluationError { message: String },
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::OutcomeMismatch {
                observed_exit_code, ..
            } => write!(f, "outcome mismatch (exit code {})", observed_exit_code),
            FailureReason::EvaluationError { message } => {
                write!(f, "evaluation error: {}", message)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Verdict {
    Pass,
    Fail { reason: FailureReason },
}

impl Verdict {
    pub fn is_pass(&self) -> bool {
        matches!(self, Verdict::Pass)
    }
}

/// Outcome of evaluating one compiler; `observed` is `None` when the request failed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvaluationResult {
    pub compiler: CompilerDescriptor,
    pub observed: Option<RawOutcome>,
    pub verdict: Verdict,
}

/// Aggregate of one matrix or named-check run.
///
/// Built only through [`SmokeReport::from_results`], which partitions the
/// evaluated set so that `failure_count == failed.len()`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmokeReport {
    pub run_id: Uuid,
    pub suite: String,
    pub language: LanguageId,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub succeeded: Vec<EvaluationResult>,
    pub failed: Vec<EvaluationResult>,
    pub failure_count: usize,
    /// Run was cancelled or timed out before every selected compiler was evaluated
    pub incomplete: bool,
}

impl SmokeReport {
    pub fn from_results(
        suite: impl Into<String>,
        language: LanguageId,
        started_at: DateTime<Utc>,
        results: Vec<EvaluationResult>,
        incomplete: bool,
    ) -> Self {
        let (succeeded, failed): (Vec<_>, Vec<_>) =
            results.into_iter().partition(|r| r.verdict.is_pass());
        let failure_count = failed.len();

        Self {
            run_id: Uuid::new_v4(),
            suite: suite.into(),
            language,
            started_at,
            finished_at: Utc::now(),
            succeeded,
            failed,
            failure_count,
            incomplete,
        }
    }

    pub fn evaluated(&self) -> usize {
        self.succeeded.len() + self.failed.len()
    }

    /// Only a complete run with zero failures counts as a pass
    pub fn is_pass(&self) -> bool {
        self.failure_count == 0 && !self.incomplete
    }
}
