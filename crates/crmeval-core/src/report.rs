//! Run-level aggregation and persistence.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use uuid::Uuid;

use crate::criteria::response_length;
use crate::domain::error::{EvalError, Result};
use crate::domain::{TestResult, SUCCESS_THRESHOLD};

/// Bumped whenever the report JSON shape changes.
pub const REPORT_SCHEMA_VERSION: &str = "1.1";

/// Responses shorter than this many characters are flagged.
pub const SHORT_RESPONSE_CHARS: usize = 50;

/// Invocations slower than this are flagged.
pub const SLOW_QUERY_SECS: f64 = 5.0;

const TOP_TOOLS: usize = 3;
const MAX_RECOMMENDATIONS: usize = 3;

// ---------------------------------------------------------------------------
// Aggregates
// ---------------------------------------------------------------------------

/// Per-category aggregate. Rates are fractions in `[0, 1]`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CategoryStats {
    pub total: usize,
    pub passed: usize,
    pub pass_rate: f64,
    pub avg_score: f64,
}

/// How often one tool was called across the run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ToolCount {
    pub tool: String,
    pub count: usize,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "UPPERCASE")]
pub enum Priority {
    High,
    Medium,
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Priority::High => f.write_str("HIGH"),
            Priority::Medium => f.write_str("MEDIUM"),
        }
    }
}

/// A suggested change to the agent, derived from the diagnostics.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Recommendation {
    pub priority: Priority,
    pub issue: String,
    pub fix: String,
}

/// Behavioural health of the agent over a run, independent of scoring.
///
/// Test ids are listed in run order. Errored invocations are counted as
/// errors only, never as short or slow.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunDiagnostics {
    /// Fraction of tests where the agent called at least one tool.
    pub tool_usage_rate: f64,
    pub avg_response_length: f64,
    pub errored: Vec<String>,
    pub short_responses: Vec<String>,
    pub slow_queries: Vec<String>,
    /// Most-called tools, most frequent first.
    pub top_tools: Vec<ToolCount>,
    pub recommendations: Vec<Recommendation>,
}

impl RunDiagnostics {
    pub fn from_results(results: &[TestResult]) -> Self {
        fn ids(results: &[TestResult], pred: impl Fn(&TestResult) -> bool) -> Vec<String> {
            results
                .iter()
                .filter(|r| r.error.is_none() && pred(r))
                .map(|r| r.test_id.clone())
                .collect()
        }

        let with_tools = results.iter().filter(|r| !r.tools_used.is_empty()).count();
        let tool_usage_rate = if results.is_empty() {
            0.0
        } else {
            with_tools as f64 / results.len() as f64
        };

        let mut counts: HashMap<&str, usize> = HashMap::new();
        for tool in results.iter().flat_map(|r| r.tools_used.iter()) {
            *counts.entry(tool.as_str()).or_default() += 1;
        }
        let mut top_tools: Vec<ToolCount> = counts
            .into_iter()
            .map(|(tool, count)| ToolCount {
                tool: tool.to_string(),
                count,
            })
            .collect();
        top_tools.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.tool.cmp(&b.tool)));
        top_tools.truncate(TOP_TOOLS);

        let mut diagnostics = Self {
            tool_usage_rate,
            avg_response_length: mean(results.iter().map(|r| response_length(&r.raw_response) as f64)),
            errored: results
                .iter()
                .filter(|r| r.error.is_some())
                .map(|r| r.test_id.clone())
                .collect(),
            short_responses: ids(results, |r| {
                response_length(&r.raw_response) < SHORT_RESPONSE_CHARS
            }),
            slow_queries: ids(results, |r| r.elapsed_seconds > SLOW_QUERY_SECS),
            top_tools,
            recommendations: Vec::new(),
        };
        let avg_time = mean(results.iter().map(|r| r.elapsed_seconds));
        diagnostics.recommendations = diagnostics.recommend(avg_time);
        diagnostics
    }

    fn recommend(&self, avg_time: f64) -> Vec<Recommendation> {
        let mut recs = Vec::new();
        if self.tool_usage_rate < 0.5 {
            recs.push(Recommendation {
                priority: Priority::High,
                issue: "Low tool usage".to_string(),
                fix: format!(
                    "Only {:.0}% of queries used tools. Instruct the agent to always consult \
                     the course tools for course, price and schedule questions.",
                    self.tool_usage_rate * 100.0
                ),
            });
        }
        if !self.errored.is_empty() {
            recs.push(Recommendation {
                priority: Priority::High,
                issue: format!("{} queries failed", self.errored.len()),
                fix: "Check that the agent and its tool servers are reachable; failed: "
                    .to_string()
                    + &self.errored.join(", "),
            });
        }
        if self.short_responses.len() > 2 {
            recs.push(Recommendation {
                priority: Priority::Medium,
                issue: format!("{} responses too short", self.short_responses.len()),
                fix: "Instruct the agent to answer with at least two or three sentences of \
                      specific data."
                    .to_string(),
            });
        }
        if avg_time > 4.0 {
            recs.push(Recommendation {
                priority: Priority::Medium,
                issue: format!("Slow responses (avg {avg_time:.1}s)"),
                fix: "Lower the agent's completion token limit or trim its instructions."
                    .to_string(),
            });
        }
        recs.sort_by_key(|r| r.priority);
        recs.truncate(MAX_RECOMMENDATIONS);
        recs
    }
}

/// Terminal artifact of one run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EvaluationReport {
    pub schema_version: String,
    pub run_id: String,
    pub suite_name: String,
    pub suite_digest: String,
    pub timestamp: DateTime<Utc>,
    pub total_tests: usize,
    pub passed_tests: usize,
    pub failed_tests: usize,
    pub pass_rate: f64,
    pub average_score: f64,
    pub average_execution_time: f64,
    pub category_breakdown: BTreeMap<String, CategoryStats>,
    pub diagnostics: RunDiagnostics,
    pub results: Vec<TestResult>,
}

impl EvaluationReport {
    /// Aggregate an ordered sequence of results under a fresh run id.
    ///
    /// Fails with [`EvalError::EmptyRegistry`] rather than dividing by zero.
    pub fn build(
        suite_name: impl Into<String>,
        suite_digest: impl Into<String>,
        results: Vec<TestResult>,
    ) -> Result<Self> {
        Self::build_for_run(Uuid::new_v4().to_string(), suite_name, suite_digest, results)
    }

    /// Like [`build`](Self::build), stamping the id the run was logged under.
    pub fn build_for_run(
        run_id: impl Into<String>,
        suite_name: impl Into<String>,
        suite_digest: impl Into<String>,
        results: Vec<TestResult>,
    ) -> Result<Self> {
        if results.is_empty() {
            return Err(EvalError::EmptyRegistry);
        }

        let total_tests = results.len();
        let passed_tests = results.iter().filter(|r| r.success).count();
        let average_score = mean(results.iter().map(|r| r.score));
        let average_execution_time = mean(results.iter().map(|r| r.elapsed_seconds));

        let mut grouped: BTreeMap<&str, Vec<&TestResult>> = BTreeMap::new();
        for result in &results {
            grouped.entry(result.category.as_str()).or_default().push(result);
        }
        let category_breakdown = grouped
            .into_iter()
            .map(|(category, members)| {
                let total = members.len();
                let passed = members.iter().filter(|r| r.success).count();
                let stats = CategoryStats {
                    total,
                    passed,
                    pass_rate: passed as f64 / total as f64,
                    avg_score: mean(members.iter().map(|r| r.score)),
                };
                (category.to_string(), stats)
            })
            .collect();

        Ok(Self {
            schema_version: REPORT_SCHEMA_VERSION.to_string(),
            run_id: run_id.into(),
            suite_name: suite_name.into(),
            suite_digest: suite_digest.into(),
            timestamp: Utc::now(),
            total_tests,
            passed_tests,
            failed_tests: total_tests - passed_tests,
            pass_rate: passed_tests as f64 / total_tests as f64,
            average_score,
            average_execution_time,
            category_breakdown,
            diagnostics: RunDiagnostics::from_results(&results),
            results,
        })
    }

    /// Whether the run meets the overall 70% bar on average score.
    pub fn overall_passed(&self) -> bool {
        self.average_score >= SUCCESS_THRESHOLD
    }

    /// `evaluation_report_<YYYYmmdd_HHMMSS>_<run id prefix>.json`
    pub fn file_name(&self) -> String {
        let short: String = self.run_id.chars().take(8).collect();
        format!(
            "evaluation_report_{}_{}.json",
            self.timestamp.format("%Y%m%d_%H%M%S"),
            short
        )
    }
}

fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let (sum, count) = values.fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    if count == 0 {
        0.0
    } else {
        sum / count as f64
    }
}

// ---------------------------------------------------------------------------
// Persistence
// ---------------------------------------------------------------------------

/// Write `report` as pretty JSON into `dir`, returning the created path.
///
/// The file appears under its final name only once fully written, so a
/// failed attempt leaves nothing behind and can be retried with the same
/// report. An existing file is never overwritten. Encoding failures are
/// [`EvalError::Serialization`]; every file-system failure is
/// [`EvalError::Persistence`].
pub fn write_report_json(dir: &Path, report: &EvaluationReport) -> Result<PathBuf> {
    let json = serde_json::to_string_pretty(report)?;
    persist_atomically(dir, &report.file_name(), |file| {
        file.write_all(json.as_bytes())?;
        file.write_all(b"\n")
    })
}

/// Stage `write` into a temp file in `dir`, then move it to `dir/name`.
fn persist_atomically<F>(dir: &Path, name: &str, write: F) -> Result<PathBuf>
where
    F: FnOnce(&mut NamedTempFile) -> io::Result<()>,
{
    let path = dir.join(name);
    let failed = |source: io::Error| EvalError::Persistence {
        path: path.clone(),
        source,
    };

    fs::create_dir_all(dir).map_err(failed)?;
    let mut staged = NamedTempFile::new_in(dir).map_err(failed)?;
    write(&mut staged).map_err(failed)?;
    staged.as_file().sync_all().map_err(failed)?;
    staged
        .persist_noclobber(&path)
        .map_err(|e| failed(e.error))?;
    Ok(path)
}

/// Load a previously written report.
pub fn read_report_json(path: &Path) -> Result<EvaluationReport> {
    let raw = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&raw)?)
}

// ---------------------------------------------------------------------------
// Console rendering
// ---------------------------------------------------------------------------

fn pct(fraction: f64) -> String {
    format!("{:.1}%", fraction * 100.0)
}

/// Human-readable summary; percentages are presentation only.
pub fn render_summary(report: &EvaluationReport) -> String {
    let rule = "=".repeat(70);
    let mut out = String::new();
    out.push_str(&format!("{rule}\nEVALUATION SUMMARY: {}\n{rule}\n", report.suite_name));
    out.push_str(&format!("Run:              {}\n", report.run_id));
    out.push_str(&format!("Total tests:      {}\n", report.total_tests));
    out.push_str(&format!(
        "Passed:           {} ({})\n",
        report.passed_tests,
        pct(report.pass_rate)
    ));
    out.push_str(&format!("Failed:           {}\n", report.failed_tests));
    out.push_str(&format!("Average score:    {}\n", pct(report.average_score)));
    out.push_str(&format!(
        "Average time:     {:.2}s\n",
        report.average_execution_time
    ));

    out.push_str("\nBy category:\n");
    for (category, stats) in &report.category_breakdown {
        out.push_str(&format!(
            "  {category:<20} {}/{} passed  pass rate {}  avg score {}\n",
            stats.passed,
            stats.total,
            pct(stats.pass_rate),
            pct(stats.avg_score)
        ));
    }

    out.push_str("\nResults:\n");
    for result in &report.results {
        let mark = if result.success { "✓" } else { "✗" };
        out.push_str(&format!(
            "  {mark} {} [{}] score {} ({:.2}s)\n",
            result.test_id,
            result.category,
            pct(result.score),
            result.elapsed_seconds
        ));
        if let Some(err) = &result.error {
            out.push_str(&format!("      error: {err}\n"));
            continue;
        }
        for verdict in result.failed_verdicts() {
            out.push_str(&format!(
                "      - {}: {}\n",
                verdict.name,
                verdict.detail.as_deref().unwrap_or("failed")
            ));
        }
    }

    render_diagnostics(&mut out, &report.diagnostics);

    let status = if report.overall_passed() {
        "PASSED"
    } else {
        "FAILED"
    };
    out.push_str(&format!(
        "\nOverall: {status} (average score {} vs threshold {})\n",
        pct(report.average_score),
        pct(SUCCESS_THRESHOLD)
    ));
    out
}

fn render_diagnostics(out: &mut String, diag: &RunDiagnostics) {
    let list = |ids: &[String]| {
        if ids.is_empty() {
            "0".to_string()
        } else {
            format!("{} ({})", ids.len(), ids.join(", "))
        }
    };

    out.push_str("\nDiagnostics:\n");
    out.push_str(&format!("  Tool usage:       {}\n", pct(diag.tool_usage_rate)));
    out.push_str(&format!(
        "  Avg length:       {:.0} chars\n",
        diag.avg_response_length
    ));
    out.push_str(&format!("  Errors:           {}\n", list(&diag.errored)));
    out.push_str(&format!(
        "  Short (<{SHORT_RESPONSE_CHARS}):      {}\n",
        list(&diag.short_responses)
    ));
    out.push_str(&format!(
        "  Slow (>{SLOW_QUERY_SECS:.0}s):       {}\n",
        list(&diag.slow_queries)
    ));
    if !diag.top_tools.is_empty() {
        out.push_str("  Top tools:\n");
        for t in &diag.top_tools {
            out.push_str(&format!("    • {}: {}x\n", t.tool, t.count));
        }
    }

    out.push_str("\nRecommendations:\n");
    if diag.recommendations.is_empty() {
        out.push_str("  none\n");
    }
    for (i, rec) in diag.recommendations.iter().enumerate() {
        out.push_str(&format!("  #{} [{}] {}\n", i + 1, rec.priority, rec.issue));
        out.push_str(&format!("      {}\n", rec.fix));
    }
}

impl fmt::Display for EvaluationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&render_summary(self))
    }
}
