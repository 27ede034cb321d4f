//! CLI binary for job-failure remediation and data curation.

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use remedy_agent::feedback::{prepare_training_data, TrainingSample};
use remedy_agent::{Agent, AgentConfig, ErrorClassifier};
use remedy_curation::{CurationAgent, DataValidator, RuleSet, Severity, Table};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "remedy", version, about = "Job-failure remediation and rule-driven data curation")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Agent configuration file (TOML); environment variables override it
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply a rule set to a JSON array of records
    Curate {
        /// Rule-set file (.json or .toml)
        #[arg(short, long)]
        rules: PathBuf,

        /// Input records (JSON array of objects)
        input: PathBuf,

        /// Where to write the curated records
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Print a validation report for a JSON array of records
    Report {
        /// Input records (JSON array of objects)
        input: PathBuf,

        /// Columns that must be present
        #[arg(long = "require", value_delimiter = ',')]
        required: Vec<String>,

        /// Warn about columns whose null ratio exceeds this value
        #[arg(long, default_value = "0.1")]
        max_null_ratio: f64,
    },

    /// Lint a rule-set file
    Check {
        /// Rule-set file (.json or .toml)
        rules: PathBuf,
    },

    /// Classify an error message against the configured keyword table
    Classify {
        /// The error text
        message: String,
    },

    /// Inspect a failed run and carry out the chosen remediation
    Process {
        #[arg(long)]
        job_id: u64,

        #[arg(long)]
        run_id: u64,

        /// Attempt number of the failed run
        #[arg(long, default_value = "1")]
        attempt: u32,

        /// Error text from an earlier attempt
        #[arg(long)]
        previous_error: Option<String>,
    },

    /// List recently created jobs
    Monitor {
        /// Only jobs created within this many hours
        #[arg(long, default_value = "24")]
        hours: u64,
    },

    /// Convert labelled failures into chat-format JSONL training data
    TrainingData {
        /// JSON array of training samples
        input: PathBuf,

        /// Output JSONL file
        #[arg(short, long)]
        output: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = AgentConfig::load(cli.config.as_deref())?.with_env_overrides();

    // RUST_LOG wins, then --verbose, then the configured level
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(if cli.verbose { "debug" } else { config.log_filter() })
    });
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Curate {
            rules,
            input,
            output,
        } => cmd_curate(&rules, &input, &output)?,
        Commands::Report {
            input,
            required,
            max_null_ratio,
        } => cmd_report(&input, &required, max_null_ratio)?,
        Commands::Check { rules } => cmd_check(&rules)?,
        Commands::Classify { message } => cmd_classify(&config, &message)?,
        Commands::Process {
            job_id,
            run_id,
            attempt,
            previous_error,
        } => cmd_process(&config, job_id, run_id, attempt, previous_error.as_deref()).await?,
        Commands::Monitor { hours } => cmd_monitor(&config, hours).await?,
        Commands::TrainingData { input, output } => cmd_training_data(&input, &output)?,
    }

    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

// ---------------------------------------------------------------------------
// Curation
// ---------------------------------------------------------------------------

fn cmd_curate(rules: &Path, input: &Path, output: &Path) -> anyhow::Result<()> {
    let agent = CurationAgent::from_path(rules)?;
    for diag in agent.diagnostics() {
        tracing::warn!(lint = %diag.lint, "{}", diag.message);
    }
    let report = agent.curate_file(input, output)?;
    print_json(&report)
}

fn cmd_report(input: &Path, required: &[String], max_null_ratio: f64) -> anyhow::Result<()> {
    let table = Table::read_json(input)?;
    let validator = DataValidator::new();

    let required: Vec<&str> = required.iter().map(String::as_str).collect();
    let missing = validator.missing_columns(&table, &required);
    if !missing.is_empty() {
        anyhow::bail!("missing required columns: {}", missing.join(", "));
    }
    validator.null_ratios(&table, max_null_ratio);
    validator.duplicates(&table, None);

    print_json(&remedy_curation::report(&table))
}

fn cmd_check(path: &Path) -> anyhow::Result<()> {
    let rule_set = RuleSet::load(path)?;

    for diag in &remedy_curation::lint(&rule_set) {
        let severity = match diag.severity {
            Severity::Error => "ERROR",
            Severity::Warning => "WARN",
        };
        let location = match (diag.rule_index, diag.rule_name.as_deref()) {
            (Some(i), Some(name)) => format!(" (rule {i} '{name}')"),
            _ => String::new(),
        };
        println!("[{}] {}{}: {}", severity, diag.lint, location, diag.message);
        if let Some(fix) = &diag.fix {
            println!("        fix: {fix}");
        }
    }

    let diagnostics = remedy_curation::lint_or_raise(&rule_set)?;
    if diagnostics.is_empty() {
        println!("Rule set '{}' is valid ({} rules)", rule_set.name, rule_set.rules.len());
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Remediation
// ---------------------------------------------------------------------------

fn cmd_classify(config: &AgentConfig, message: &str) -> anyhow::Result<()> {
    config.validate()?;
    let classifier = ErrorClassifier::new(config.classifier.patterns.clone());
    print_json(&classifier.classify(message))
}

async fn cmd_process(
    config: &AgentConfig,
    job_id: u64,
    run_id: u64,
    attempt: u32,
    previous_error: Option<&str>,
) -> anyhow::Result<()> {
    let agent = Agent::from_config(config)?;
    let report = agent
        .process_failed_job(job_id, run_id, attempt, previous_error)
        .await;
    print_json(&report)?;
    if !report.success {
        std::process::exit(1);
    }
    Ok(())
}

async fn cmd_monitor(config: &AgentConfig, hours: u64) -> anyhow::Result<()> {
    let agent = Agent::from_config(config)?;
    let report = agent.monitor(hours).await;
    print_json(&report)?;
    if report.error.is_some() {
        std::process::exit(1);
    }
    Ok(())
}

fn cmd_training_data(input: &Path, output: &Path) -> anyhow::Result<()> {
    let samples: Vec<TrainingSample> = serde_json::from_str(&std::fs::read_to_string(input)?)?;
    let written = prepare_training_data(&samples, output)?;
    println!("Wrote {written} training examples to {}", output.display());
    Ok(())
}
