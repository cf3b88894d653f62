// Human-readable and JSON rendering of smoke reports

use smoke_common::types::{EvaluationResult, FailureReason, SmokeReport, Verdict};
use std::fmt::Write;

fn write_entry(out: &mut String, result: &EvaluationResult) {
    let compiler = &result.compiler;

    let reason = match &result.verdict {
        Verdict::Pass => {
            let _ = writeln!(out, "SUCCESS {} ({})", compiler.id, compiler.display_name);
            return;
        }
        Verdict::Fail { reason } => reason,
    };

    let _ = writeln!(out, "FAIL {} ({}) - {}", compiler.id, compiler.display_name, reason);

    if let FailureReason::OutcomeMismatch {
        expected,
        observed_exit_code,
        observed_stdout,
    } = reason
    {
        let _ = writeln!(out, "    expected:  {}", expected);
        let _ = writeln!(out, "    exit code: {}", observed_exit_code);
        let _ = writeln!(out, "    stdout:    {:?}", observed_stdout);
    }

    if let Some(observed) = &result.observed {
        if !observed.stderr.is_empty() {
            let stderr: Vec<&str> = observed.stderr.iter().map(|l| l.text.as_str()).collect();
            let _ = writeln!(out, "    stderr:    {:?}", stderr);
        }
    }
}

/// Render one report: a line per compiler, failure diagnostics, then a summary
pub fn render(report: &SmokeReport) -> String {
    let mut out = String::new();

    let _ = writeln!(out, "== {} ({}) ==", report.suite, report.language);

    for result in report.succeeded.iter().chain(&report.failed) {
        write_entry(&mut out, result);
    }

    let _ = writeln!(
        out,
        "Summary: {} evaluated, {} succeeded, {} failed",
        report.evaluated(),
        report.succeeded.len(),
        report.failure_count
    );

    if report.incomplete {
        let _ = writeln!(out, "INCOMPLETE: run stopped before every selected compiler was evaluated");
    }

    out
}

pub fn render_json(reports: &[SmokeReport]) -> serde_json::Result<String> {
    serde_json::to_string_pretty(reports)
}
