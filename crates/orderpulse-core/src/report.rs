//! Check results and the aggregated stability report

use std::time::Duration;

/// Success rate (percent) at or above which the channel is judged stable
pub const STABLE_THRESHOLD: f64 = 85.0;

/// Success rate (percent) at or above which degradation is judged minor
pub const MINOR_ISSUES_THRESHOLD: f64 = 70.0;

/// Outcome of a single stability check
#[derive(Debug, Clone)]
pub struct CheckResult {
    pub name: String,
    pub passed: bool,
    /// What the check observed, printed for passing and failing checks alike
    pub detail: String,
    /// Diagnostic cause, present only on failure
    pub error: Option<String>,
    pub duration: Duration,
}

impl CheckResult {
    pub fn pass(name: &str, detail: impl Into<String>, duration: Duration) -> Self {
        Self {
            name: name.to_string(),
            passed: true,
            detail: detail.into(),
            error: None,
            duration,
        }
    }

    pub fn fail(
        name: &str,
        detail: impl Into<String>,
        error: impl Into<String>,
        duration: Duration,
    ) -> Self {
        Self {
            name: name.to_string(),
            passed: false,
            detail: detail.into(),
            error: Some(error.into()),
            duration,
        }
    }
}

/// Aggregate judgement over a probe run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Stable,
    MinorIssues,
    CriticalIssues,
}

impl Verdict {
    /// Map a success rate (percent) onto a verdict
    pub fn from_rate(rate: f64) -> Self {
        if rate >= STABLE_THRESHOLD {
            Verdict::Stable
        } else if rate >= MINOR_ISSUES_THRESHOLD {
            Verdict::MinorIssues
        } else {
            Verdict::CriticalIssues
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Verdict::Stable => "STABLE",
            Verdict::MinorIssues => "MINOR ISSUES",
            Verdict::CriticalIssues => "CRITICAL ISSUES",
        }
    }
}

/// Collection of check results for one probe run
#[derive(Debug, Default)]
pub struct StabilityReport {
    results: Vec<CheckResult>,
}

impl StabilityReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_result(&mut self, result: CheckResult) {
        self.results.push(result);
    }

    pub fn results(&self) -> &[CheckResult] {
        &self.results
    }

    pub fn total(&self) -> usize {
        self.results.len()
    }

    pub fn passed(&self) -> usize {
        self.results.iter().filter(|r| r.passed).count()
    }

    pub fn failed(&self) -> usize {
        self.results.iter().filter(|r| !r.passed).count()
    }

    /// Percentage of checks that passed. An empty run scores zero.
    pub fn success_rate(&self) -> f64 {
        if self.results.is_empty() {
            return 0.0;
        }
        100.0 * self.passed() as f64 / self.total() as f64
    }

    pub fn verdict(&self) -> Verdict {
        Verdict::from_rate(self.success_rate())
    }

    pub fn is_stable(&self) -> bool {
        self.verdict() == Verdict::Stable
    }

    pub fn print_summary(&self) {
        for result in &self.results {
            let status = if result.passed { "PASS" } else { "FAIL" };
            let status_color = if result.passed {
                "\x1b[32m"
            } else {
                "\x1b[31m"
            };
            let reset = "\x1b[0m";

            println!(
                "[{status_color}{status}{reset}] {} ({:.2}ms)",
                result.name,
                result.duration.as_secs_f64() * 1000.0
            );
            if !result.detail.is_empty() {
                println!("       {}", result.detail);
            }
        }

        let failed: Vec<_> = self.results.iter().filter(|r| !r.passed).collect();
        if !failed.is_empty() {
            println!("\nFailed checks:");
            for result in &failed {
                println!(
                    "  ✗ {} - {}",
                    result.name,
                    result.error.as_deref().unwrap_or("unknown error")
                );
            }
        }

        let verdict = self.verdict();
        let verdict_color = match verdict {
            Verdict::Stable => "\x1b[32m",
            Verdict::MinorIssues => "\x1b[33m",
            Verdict::CriticalIssues => "\x1b[31m",
        };

        println!("\n{:=<75}", "");
        println!(
            "SUMMARY: Total: {} | Passed: {} | Failed: {} | Success rate: {:.1}%",
            self.total(),
            self.passed(),
            self.failed(),
            self.success_rate()
        );
        println!(
            "VERDICT: {}{}{}",
            verdict_color,
            verdict.label(),
            "\x1b[0m"
        );
        println!("{:=<75}\n", "");
    }
}
