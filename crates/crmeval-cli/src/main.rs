//! CRM Eval - offline evaluation harness for the course-assistant agent
//!
//! The `crmeval` command sends a fixed battery of scripted queries to the
//! agent, scores each response and writes a JSON report per run.
//!
//! ## Commands
//!
//! - `run`: evaluate a live agent over HTTP
//! - `replay`: re-score previously recorded responses
//! - `list`: print the loaded test suite
//!
//! ## Exit codes
//!
//! - `0`: average score met the 70% threshold
//! - `1`: average score below the threshold
//! - `2`: fatal error (configuration, empty suite, agent channel, report I/O)

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{error, info, Level};

use crmeval_core::obs::{self, RunSpan};
use crmeval_core::{
    render_summary, write_report_json, AgentEndpointConfig, AgentInvoker, CriterionRegistry,
    EvaluationReport, Evaluator, HttpAgentInvoker, PatternSet, ReplayInvoker, RunConfig,
    TestRegistry, TestRunner,
};

const DEFAULT_SUITE: &str = include_str!("../suites/course_assistant.json");
const DEFAULT_PATTERNS: &str = include_str!("../patterns/course_assistant_uk.json");

#[derive(Parser)]
#[command(name = "crmeval")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Evaluation harness for the CRM course-assistant agent", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    /// Test suite definition (JSON). Defaults to the built-in course suite.
    #[arg(long, global = true)]
    suite: Option<PathBuf>,

    /// Behavioral pattern keyword sets (JSON). Defaults to the built-in set.
    #[arg(long, global = true)]
    patterns: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Evaluate a live agent over its HTTP chat endpoint
    Run {
        /// Agent chat endpoint [falls back to CRMEVAL_AGENT_URL]
        #[arg(long)]
        url: Option<String>,

        /// Bearer token forwarded to the agent
        #[arg(long, env = "CRMEVAL_API_KEY", hide_env_values = true)]
        api_key: Option<String>,

        /// Per-query timeout in seconds
        #[arg(long, env = "CRMEVAL_TIMEOUT_SECS", default_value_t = 60)]
        timeout_secs: u64,

        /// Pause between queries in milliseconds
        #[arg(long, default_value_t = 1000)]
        delay_ms: u64,

        /// Only run test cases of this category
        #[arg(long)]
        category: Option<String>,

        #[command(flatten)]
        output: OutputArgs,
    },

    /// Re-score recorded agent responses without contacting the agent
    Replay {
        /// Recorded responses (JSON array, {"responses": [...]} or JSON Lines)
        #[arg(short, long)]
        responses: PathBuf,

        /// Only run test cases of this category
        #[arg(long)]
        category: Option<String>,

        #[command(flatten)]
        output: OutputArgs,
    },

    /// Print the loaded test suite
    List,
}

#[derive(clap::Args)]
struct OutputArgs {
    /// Directory receiving the JSON report
    #[arg(long, env = "CRMEVAL_REPORT_DIR", default_value = "evaluation/reports")]
    report_dir: PathBuf,
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    // Setup logging
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    crmeval_core::init_tracing(cli.json, level);

    match dispatch(cli).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(1),
        Err(err) => {
            error!(error = %format!("{err:#}"), "evaluation aborted");
            eprintln!("✗ {err:#}");
            ExitCode::from(2)
        }
    }
}

/// Returns whether the run met the overall threshold.
async fn dispatch(cli: Cli) -> Result<bool> {
    let registry = load_suite(cli.suite.as_deref())?;

    match cli.command {
        Commands::List => {
            cmd_list(&registry);
            Ok(true)
        }
        Commands::Run {
            url,
            api_key,
            timeout_secs,
            delay_ms,
            category,
            output,
        } => {
            let endpoint = endpoint_config(url, api_key)?;
            let config = RunConfig::default()
                .with_timeout(Duration::from_secs(timeout_secs))
                .with_inter_test_delay(Duration::from_millis(delay_ms));
            let evaluator = load_evaluator(cli.patterns.as_deref())?;
            cmd_evaluate(
                HttpAgentInvoker::new(endpoint),
                &select(&registry, category.as_deref()),
                evaluator,
                config,
                &output.report_dir,
            )
            .await
        }
        Commands::Replay {
            responses,
            category,
            output,
        } => {
            let invoker = ReplayInvoker::from_path(&responses)
                .with_context(|| format!("Failed to load responses from {}", responses.display()))?;
            info!(recordings = invoker.len(), "loaded recorded responses");
            let evaluator = load_evaluator(cli.patterns.as_deref())?;
            cmd_evaluate(
                invoker,
                &select(&registry, category.as_deref()),
                evaluator,
                RunConfig::default(),
                &output.report_dir,
            )
            .await
        }
    }
}

/// `--url` wins over the environment; `--api-key` wins over either.
fn endpoint_config(url: Option<String>, api_key: Option<String>) -> Result<AgentEndpointConfig> {
    let mut endpoint = match url {
        Some(url) => AgentEndpointConfig::new(url),
        None => AgentEndpointConfig::from_env().context("No agent endpoint: pass --url")?,
    };
    if let Some(key) = api_key.filter(|k| !k.is_empty()) {
        endpoint = endpoint.with_api_key(key);
    }
    Ok(endpoint)
}

fn load_suite(path: Option<&Path>) -> Result<TestRegistry> {
    match path {
        Some(path) => TestRegistry::from_path(path)
            .with_context(|| format!("Failed to load suite {}", path.display())),
        None => TestRegistry::from_json_str(DEFAULT_SUITE).context("Built-in suite is invalid"),
    }
}

fn load_evaluator(path: Option<&Path>) -> Result<Evaluator> {
    let patterns = match path {
        Some(path) => PatternSet::from_path(path)
            .with_context(|| format!("Failed to load patterns {}", path.display()))?,
        None => PatternSet::from_json_str(DEFAULT_PATTERNS)
            .context("Built-in pattern set is invalid")?,
    };
    let criteria = CriterionRegistry::with_patterns(&patterns)?;
    Ok(Evaluator::new(criteria))
}

fn select(registry: &TestRegistry, category: Option<&str>) -> TestRegistry {
    match category {
        Some(category) => registry.filter_category(category),
        None => registry.clone(),
    }
}

fn cmd_list(registry: &TestRegistry) {
    println!("Suite: {} (v{})", registry.name(), registry.version());
    println!("Test cases: {}", registry.len());
    println!();
    for case in registry {
        let criteria: Vec<&str> = case
            .success_criteria
            .iter()
            .map(|c| c.name.as_str())
            .collect();
        println!("  {} [{}] {}", case.id, case.category, case.query);
        println!("      criteria: {}", criteria.join(", "));
        if !case.expected_tools.is_empty() {
            let tools: Vec<&str> = case.expected_tools.iter().map(String::as_str).collect();
            println!("      tools:    {}", tools.join(", "));
        }
    }
}

/// Run, aggregate, print and persist.
async fn cmd_evaluate<I: AgentInvoker>(
    invoker: I,
    registry: &TestRegistry,
    evaluator: Evaluator,
    config: RunConfig,
    report_dir: &Path,
) -> Result<bool> {
    let digest = registry.digest()?;
    let mut runner = TestRunner::new(invoker, evaluator, config);
    let results = runner
        .run(registry)
        .await
        .with_context(|| format!("Evaluation of suite {} failed", registry.name()))?;

    let report =
        EvaluationReport::build_for_run(runner.run_id(), registry.name(), digest, results)?;
    let _span = RunSpan::enter(&report.run_id, &report.suite_name);

    println!("{}", render_summary(&report));

    let path = write_report_json(report_dir, &report).with_context(|| {
        format!("Failed to write report into {}", report_dir.display())
    })?;
    obs::emit_report_written(&report.run_id, &path, report.average_score);
    println!("Report saved: {}", path.display());

    Ok(report.overall_passed())
}
