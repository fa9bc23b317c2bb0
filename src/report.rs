// Author: Lukas Bower

//! Check recording and pass/fail reporting.

use std::io::Write;

/// One named assertion with its outcome and diagnostic detail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Check {
    /// Stable name, printed on the report line.
    pub name: String,
    /// Whether the assertion held.
    pub passed: bool,
    /// Diagnostic detail, printed on failure.
    pub detail: String,
}

/// Aggregate counts over one run's checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Summary {
    /// Checks that passed.
    pub passed: usize,
    /// Checks that failed.
    pub failed: usize,
}

impl Summary {
    /// Total number of recorded checks.
    pub fn total(&self) -> usize {
        self.passed + self.failed
    }
}

/// Run-scoped recorder for check outcomes.
///
/// Checks are appended in execution order and never removed or reordered;
/// the summary is always a fold over the recorded sequence. Output goes to
/// the supplied writer one line per check, so tests capture it in a buffer.
/// Recording never fails: a sink that stops accepting bytes loses lines but
/// not bookkeeping.
pub struct CheckRunner<W: Write> {
    checks: Vec<Check>,
    writer: W,
}

impl<W: Write> CheckRunner<W> {
    /// Create a runner writing report lines to `writer`.
    pub fn new(writer: W) -> Self {
        Self {
            checks: Vec::new(),
            writer,
        }
    }

    /// Record one check and print its report line.
    pub fn check(&mut self, name: impl Into<String>, passed: bool, detail: impl Into<String>) {
        let check = Check {
            name: name.into(),
            passed,
            detail: detail.into(),
        };
        if check.passed {
            let _ = writeln!(self.writer, "  PASS  {}", check.name);
        } else if check.detail.is_empty() {
            let _ = writeln!(self.writer, "  FAIL  {}", check.name);
        } else {
            let _ = writeln!(self.writer, "  FAIL  {}  {}", check.name, check.detail);
        }
        self.checks.push(check);
    }

    /// All checks recorded so far, in execution order.
    pub fn checks(&self) -> &[Check] {
        &self.checks
    }

    /// Fold the recorded sequence into pass/fail counts.
    pub fn summary(&self) -> Summary {
        self.checks.iter().fold(
            Summary {
                passed: 0,
                failed: 0,
            },
            |mut summary, check| {
                if check.passed {
                    summary.passed += 1;
                } else {
                    summary.failed += 1;
                }
                summary
            },
        )
    }

    /// Print the summary and verdict lines, returning the summary.
    pub fn finish(&mut self) -> Summary {
        let summary = self.summary();
        let _ = writeln!(self.writer);
        let _ = writeln!(
            self.writer,
            "  {}/{} passed, {} failed",
            summary.passed,
            summary.total(),
            summary.failed
        );
        if summary.failed > 0 {
            let _ = writeln!(self.writer, "  RESULT: FAIL");
        } else {
            let _ = writeln!(self.writer, "  RESULT: PASS");
        }
        let _ = writeln!(self.writer);
        summary
    }

    /// Release the writer, e.g. to inspect captured output in tests.
    pub fn into_writer(self) -> W {
        self.writer
    }
}
