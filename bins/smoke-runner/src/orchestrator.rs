/// Smoke Test Orchestrator - Matrix Execution
///
/// **Core Responsibility:**
/// Drive one test case across every eligible compiler (matrix mode), or run
/// the execute + compile-only pair against one named compiler (two-phase mode),
/// and aggregate verdicts into a `SmokeReport`.
///
/// **Architecture:**
/// 1. Ask the catalog for compilers (fatal if unreachable)
/// 2. Filter with the `CompilerSelector`
/// 3. Fan out one evaluation per compiler, bounded by a semaphore
/// 4. Classify each outcome with the matcher
/// 5. Merge per-task results into the report once tasks complete
///
/// **Fault Isolation:**
/// A failed request or a panic during one compiler's evaluation becomes a
/// `Fail` entry with an `EvaluationError` reason. Only catalog failures abort
/// a run.
///
/// **Cancellation:**
/// The cancellation token and the optional run deadline stop collection,
/// abort in-flight evaluations, and mark the report incomplete.

use crate::config::{MatrixSuite, NamedSuite};
use crate::matcher;
use crate::selector::CompilerSelector;
use chrono::Utc;
use futures_util::FutureExt;
use smoke_common::catalog::{CatalogError, CompilerCatalog};
use smoke_common::config::DEFAULT_MAX_CONCURRENCY;
use smoke_common::types::{
    CompilerDescriptor, EvaluationResult, Expectation, FailureReason, LanguageId, NamedCheck,
    SmokeReport, TestCase, Verdict,
};
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

#[derive(Debug, Error)]
pub enum SmokeError {
    #[error("compiler catalog unavailable for {language}: {source}")]
    CatalogUnavailable {
        language: LanguageId,
        #[source]
        source: CatalogError,
    },
}

/// Reports gathered across several suites. `fatal` holds the error that
/// stopped the session early, if any; `reports` still has every finished run.
#[derive(Debug)]
pub struct SessionOutcome {
    pub reports: Vec<SmokeReport>,
    pub fatal: Option<SmokeError>,
}

pub struct SmokeOrchestrator {
    catalog: Arc<dyn CompilerCatalog>,
    max_concurrency: usize,
    run_timeout: Option<Duration>,
    cancel: CancellationToken,
}

impl SmokeOrchestrator {
    pub fn new(catalog: Arc<dyn CompilerCatalog>) -> Self {
        Self {
            catalog,
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            run_timeout: None,
            cancel: CancellationToken::new(),
        }
    }

    /// 1 gives strictly sequential evaluation
    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency.max(1);
        self
    }

    pub fn with_run_timeout(mut self, run_timeout: Option<Duration>) -> Self {
        self.run_timeout = run_timeout;
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    fn deadline(&self) -> Option<Instant> {
        self.run_timeout.map(|t| Instant::now() + t)
    }

    /// Resolves once the run is cancelled or its deadline passes
    async fn interrupted(&self, deadline: Option<Instant>) -> &'static str {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => "cancelled",
            _ = deadline_elapsed(deadline) => "deadline elapsed",
        }
    }

    /// Evaluate `test_case` against every compiler the selector accepts
    pub async fn run_matrix(
        &self,
        suite: &str,
        test_case: &TestCase,
        selector: &CompilerSelector,
    ) -> Result<SmokeReport, SmokeError> {
        let started_at = Utc::now();
        let language = test_case.language.clone();
        let deadline = self.deadline();

        let listed = tokio::select! {
            biased;
            reason = self.interrupted(deadline) => {
                warn!(suite, %language, reason, "Run stopped before compiler listing");
                return Ok(SmokeReport::from_results(suite, language, started_at, Vec::new(), true));
            }
            listed = self.catalog.list_compilers(&language) => listed,
        };
        let compilers = listed.map_err(|source| SmokeError::CatalogUnavailable {
            language: language.clone(),
            source,
        })?;

        let available = compilers.len();
        let selected: Vec<CompilerDescriptor> = compilers.into_iter().filter(|c| selector.matches(c)).collect();
        let total = selected.len();

        info!(
            suite,
            %language,
            available,
            selected = total,
            max_concurrency = self.max_concurrency,
            "Starting matrix run"
        );

        let semaphore = Arc::new(Semaphore::new(self.max_concurrency));
        let test_case = Arc::new(test_case.clone());
        let mut join_set: JoinSet<(usize, EvaluationResult)> = JoinSet::new();

        for (index, compiler) in selected.into_iter().enumerate() {
            let semaphore = semaphore.clone();
            let catalog = self.catalog.clone();
            let test_case = test_case.clone();

            join_set.spawn(async move {
                let _permit = semaphore.acquire().await;
                let result = evaluate_isolated(catalog.as_ref(), &test_case, compiler).await;
                (index, result)
            });
        }

        let mut results = Vec::with_capacity(total);
        let mut incomplete = false;

        loop {
            let next = tokio::select! {
                biased;
                reason = self.interrupted(deadline) => {
                    warn!(suite, completed = results.len(), total, reason, "Run stopped");
                    incomplete = true;
                    break;
                }
                next = join_set.join_next() => next,
            };

            match next {
                Some(Ok((index, result))) => {
                    log_result(suite, &result);
                    results.push((index, result));
                }
                Some(Err(e)) => {
                    error!(suite, error = %e, "Evaluation task did not complete");
                    incomplete = true;
                }
                None => break,
            }
        }

        // Evaluations that finished before the interruption still count
        while let Some(next) = join_set.try_join_next() {
            match next {
                Ok((index, result)) => {
                    log_result(suite, &result);
                    results.push((index, result));
                }
                Err(e) => error!(suite, error = %e, "Evaluation task did not complete"),
            }
        }

        join_set.abort_all();
        results.sort_by_key(|(index, _)| *index);

        let report = SmokeReport::from_results(
            suite,
            language,
            started_at,
            results.into_iter().map(|(_, r)| r).collect(),
            incomplete,
        );

        info!(
            suite,
            evaluated = report.evaluated(),
            succeeded = report.succeeded.len(),
            failed = report.failure_count,
            incomplete = report.incomplete,
            "Matrix run complete"
        );

        Ok(report)
    }

    /// Run named suites, then matrix suites, in order. Stops at the first fatal
    /// error or on cancellation. `on_report` sees each report as it finishes.
    pub async fn run_suites(
        &self,
        named: &[&NamedSuite],
        matrix: &[&MatrixSuite],
        mut on_report: impl FnMut(&SmokeReport),
    ) -> SessionOutcome {
        let mut reports = Vec::with_capacity(named.len() + matrix.len());

        for suite in named {
            if self.cancel.is_cancelled() {
                break;
            }
            match self.run_named_checks(&suite.name, &suite.check).await {
                Ok(report) => {
                    on_report(&report);
                    reports.push(report);
                }
                Err(e) => {
                    error!(suite = %suite.name, error = %e, "Suite aborted");
                    return SessionOutcome { reports, fatal: Some(e) };
                }
            }
        }

        for suite in matrix {
            if self.cancel.is_cancelled() {
                break;
            }
            match self.run_matrix(&suite.name, &suite.test_case(), &suite.selector()).await {
                Ok(report) => {
                    on_report(&report);
                    reports.push(report);
                }
                Err(e) => {
                    error!(suite = %suite.name, error = %e, "Suite aborted");
                    return SessionOutcome { reports, fatal: Some(e) };
                }
            }
        }

        SessionOutcome { reports, fatal: None }
    }

    /// Resolve one compiler, then run the execute check followed by the
    /// compile-only check. The first failing check stops the sequence.
    pub async fn run_named_checks(&self, suite: &str, check: &NamedCheck) -> Result<SmokeReport, SmokeError> {
        let started_at = Utc::now();
        let language = check.language.clone();
        let deadline = self.deadline();

        let found = tokio::select! {
            biased;
            reason = self.interrupted(deadline) => {
                warn!(suite, %language, reason, "Named checks stopped before compiler lookup");
                return Ok(SmokeReport::from_results(suite, language, started_at, Vec::new(), true));
            }
            found = self
                .catalog
                .find_compiler(&language, &check.compiler.name, &check.compiler.version) => found,
        };
        let compiler = found.map_err(|source| SmokeError::CatalogUnavailable {
            language: language.clone(),
            source,
        })?;

        info!(
            suite,
            compiler_id = %compiler.id,
            compiler_name = %compiler.display_name,
            "Resolved named compiler"
        );

        let mut results = Vec::with_capacity(2);
        let mut incomplete = false;

        for test_case in [check.execute_case(), check.compile_case()] {
            let result = tokio::select! {
                biased;
                reason = self.interrupted(deadline) => {
                    warn!(suite, reason, "Named checks stopped");
                    incomplete = true;
                    break;
                }
                result = evaluate_isolated(self.catalog.as_ref(), &test_case, compiler.clone()) => result,
            };

            log_result(suite, &result);
            let passed = result.verdict.is_pass();
            results.push(result);

            if !passed {
                warn!(suite, compiler_id = %compiler.id, "Named check failed, remaining checks skipped");
                break;
            }
        }

        Ok(SmokeReport::from_results(suite, language, started_at, results, incomplete))
    }
}

async fn deadline_elapsed(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

/// Submit the test case to one compiler and classify the outcome.
///
/// Request failures are folded into the result; this never returns an error.
pub async fn evaluate_compiler(
    catalog: &dyn CompilerCatalog,
    test_case: &TestCase,
    compiler: CompilerDescriptor,
) -> EvaluationResult {
    debug!(compiler_id = %compiler.id, language = %test_case.language, "Evaluating compiler");

    let observed = match &test_case.expectation {
        Expectation::Execute(_) => catalog.execute(&compiler, &test_case.source_code).await,
        Expectation::CompileOnly(expected) => {
            catalog
                .compile(&compiler, &test_case.source_code, &expected.filters)
                .await
        }
    };

    match observed {
        Ok(outcome) => {
            let verdict = matcher::classify(&outcome, &test_case.expectation);
            EvaluationResult {
                compiler,
                observed: Some(outcome),
                verdict,
            }
        }
        Err(e) => evaluation_error(compiler, e.to_string()),
    }
}

/// `evaluate_compiler` with panics converted into `EvaluationError`
async fn evaluate_isolated(
    catalog: &dyn CompilerCatalog,
    test_case: &TestCase,
    compiler: CompilerDescriptor,
) -> EvaluationResult {
    let fallback = compiler.clone();

    match AssertUnwindSafe(evaluate_compiler(catalog, test_case, compiler))
        .catch_unwind()
        .await
    {
        Ok(result) => result,
        Err(panic) => evaluation_error(fallback, format!("evaluation panicked: {}", panic_message(&*panic))),
    }
}

fn evaluation_error(compiler: CompilerDescriptor, message: String) -> EvaluationResult {
    EvaluationResult {
        compiler,
        observed: None,
        verdict: Verdict::Fail {
            reason: FailureReason::EvaluationError { message },
        },
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

fn log_result(suite: &str, result: &EvaluationResult) {
    let compiler = &result.compiler;
    match &result.verdict {
        Verdict::Pass => info!(
            suite,
            compiler_id = %compiler.id,
            compiler_name = %compiler.display_name,
            "SUCCESS"
        ),
        Verdict::Fail { reason } => warn!(
            suite,
            compiler_id = %compiler.id,
            compiler_name = %compiler.display_name,
            reason = %reason,
            "FAIL"
        ),
    }
}
