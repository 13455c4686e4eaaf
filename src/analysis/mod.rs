//! Output analysis: turns captured sandbox output into a pass/fail summary.
//!
//! The analyzer is a plain text scan. A line containing [`PASSED_MARKER`]
//! counts as a pass, otherwise a line containing [`FAILED_MARKER`] counts as
//! a failure. Every line counts towards the total, so the total measures
//! output volume rather than tests run; runners that do not print the markers
//! (pytest prints `1 passed`) report a zero success ratio.

use std::fmt;

/// Substring marking a passed test.
pub const PASSED_MARKER: &str = "Test Passed";

/// Substring marking a failed test.
pub const FAILED_MARKER: &str = "Test Failed";

/// Counts derived from one run's output.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ResultSummary {
    /// Number of output lines scanned.
    pub total: usize,
    /// Lines containing the pass marker.
    pub passed: usize,
    /// Lines containing the fail marker (and not the pass marker).
    pub failed: usize,
    /// `passed / total * 100`, or 0 when there was no output.
    pub success_ratio: f64,
}

impl ResultSummary {
    /// Return the success ratio rounded to two decimal places.
    #[must_use]
    pub fn rounded_ratio(&self) -> f64 {
        round_to_hundredths(self.success_ratio)
    }
}

impl fmt::Display for ResultSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== Test summary ===")?;
        writeln!(f, "Total tests run: {}", self.total)?;
        writeln!(f, "Tests passed: {}", self.passed)?;
        writeln!(f, "Tests failed: {}", self.failed)?;
        write!(f, "Success ratio: {:.2}%", self.success_ratio)
    }
}

/// Scan `output` line by line and count markers.
#[must_use]
pub fn analyze(output: &str) -> ResultSummary {
    let mut summary = ResultSummary::default();

    for line in output.lines() {
        if line.contains(PASSED_MARKER) {
            summary.passed += 1;
        } else if line.contains(FAILED_MARKER) {
            summary.failed += 1;
        }
        summary.total += 1;
    }

    summary.success_ratio = ratio(summary.passed, summary.total);
    tracing::debug!(
        total = summary.total,
        passed = summary.passed,
        failed = summary.failed,
        "analyzed sandbox output"
    );
    summary
}

#[expect(
    clippy::cast_precision_loss,
    clippy::float_arithmetic,
    reason = "line counts are far below the f64 mantissa and the ratio is inherently fractional"
)]
fn ratio(passed: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    passed as f64 / total as f64 * 100.0
}

#[expect(
    clippy::float_arithmetic,
    reason = "rounding a display ratio"
)]
fn round_to_hundredths(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
