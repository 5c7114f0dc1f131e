//! vkcheck - run validation scenarios against a Kubernetes cluster.
//!
//! Loads a scenario (optionally applying the manifest in front of its
//! `# validation` section), polls its checks until they hold, and always runs
//! the scenario's cleanup before exiting.

mod signals;

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{error, info, warn};
use vkcheck_core::{
    ClusterConnector, HarnessConfig, KubectlConnector, KubectlSettings, LogConfig, RunnerConfig,
    Scenario, ValidationRunner, harness_config_schema, init_logging, run_preflight,
    validation_spec_schema,
};

#[derive(Parser)]
#[command(name = "vkcheck")]
#[command(author, version, about = "Validate Kubernetes test scenarios")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines on stderr
    #[arg(long, global = true)]
    json_logs: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Poll a scenario until it holds, then clean up
    Run {
        /// Scenario file (manifest followed by a `# validation` section)
        file: PathBuf,

        /// Harness configuration; its preflight checks run first
        #[arg(short, long, env = "VKCHECK_CONFIG")]
        config: Option<PathBuf>,

        /// Apply the manifest part of the scenario before validating
        #[arg(long)]
        apply: bool,

        /// Scale the scenario timeout (overrides config and environment)
        #[arg(long)]
        timeout_multiplier: Option<f64>,
    },

    /// Parse and validate a scenario without touching the cluster
    Lint {
        file: PathBuf,
    },

    /// Print the JSON schema of scenario documents
    Schema {
        /// Print the harness configuration schema instead
        #[arg(long)]
        harness: bool,
    },

    /// Check that required namespaces and target nodes exist
    Preflight {
        #[arg(short, long, env = "VKCHECK_CONFIG")]
        config: PathBuf,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let mut log_config = LogConfig::from_env("info").with_stderr();
    if cli.verbose {
        log_config = log_config.with_level("debug");
    }
    if cli.json_logs {
        log_config = log_config.with_json(true);
    }
    let _logging_guards = match init_logging(&log_config) {
        Ok(guards) => guards,
        Err(err) => {
            eprintln!("vkcheck: {err}");
            return ExitCode::FAILURE;
        }
    };

    let outcome = match cli.command {
        Commands::Run {
            file,
            config,
            apply,
            timeout_multiplier,
        } => run(&file, config.as_deref(), apply, timeout_multiplier),
        Commands::Lint { file } => lint(&file),
        Commands::Schema { harness } => schema(harness),
        Commands::Preflight { config } => preflight(&config),
    };

    outcome.unwrap_or_else(|err| {
        error!("{err:#}");
        ExitCode::FAILURE
    })
}

fn exit_code(code: i32) -> ExitCode {
    u8::try_from(code).map_or(ExitCode::FAILURE, ExitCode::from)
}

fn connector() -> Result<KubectlConnector> {
    let settings = KubectlSettings::from_env().context("Invalid kubectl settings")?;
    Ok(KubectlConnector::new(settings))
}

fn run(
    file: &Path,
    config_path: Option<&Path>,
    apply: bool,
    timeout_multiplier: Option<f64>,
) -> Result<ExitCode> {
    let scenario = Scenario::from_path(file)
        .with_context(|| format!("Failed to load scenario {}", file.display()))?;
    let mut runner_config = RunnerConfig::from_env().context("Invalid runner settings")?;
    let connector = connector()?;

    if let Some(path) = config_path {
        let harness = HarnessConfig::from_path(path)
            .with_context(|| format!("Failed to load harness config {}", path.display()))?;
        let report = run_preflight(&harness, &connector.connect()?)?;
        if !report.is_ready() {
            println!("{}", serde_json::to_string_pretty(&report)?);
            return Ok(ExitCode::FAILURE);
        }
        harness.apply_to(&mut runner_config);
    }
    if let Some(multiplier) = timeout_multiplier {
        anyhow::ensure!(
            multiplier.is_finite() && multiplier > 0.0,
            "--timeout-multiplier must be a positive number"
        );
        runner_config.timeout_multiplier = multiplier;
    }

    signals::cancel_on_shutdown(runner_config.cancellation.clone())
        .context("Failed to install shutdown signal handlers")?;

    if apply {
        if scenario.has_manifest() {
            let output = connector.connect()?.apply_manifest(&scenario.manifest)?;
            info!(file = %file.display(), "Applied manifest: {}", output.trim());
        } else {
            warn!(file = %file.display(), "--apply given but the scenario has no manifest");
        }
    }

    let runner = ValidationRunner::new(runner_config);
    match runner.run(&scenario.validation, &connector) {
        Ok(summary) => {
            println!(
                "PASSED {} in {:.1}s ({} round(s), {} deleted, {} skipped)",
                file.display(),
                summary.elapsed.as_secs_f64(),
                summary.rounds,
                summary.cleanup_deleted,
                summary.cleanup_skipped
            );
            Ok(ExitCode::SUCCESS)
        }
        Err(err) => {
            println!("FAILED {}: {err}", file.display());
            Ok(exit_code(err.exit_code()))
        }
    }
}

fn lint(file: &Path) -> Result<ExitCode> {
    let scenario = Scenario::from_path(file)
        .with_context(|| format!("Failed to load scenario {}", file.display()))?;
    let spec = &scenario.validation;
    if spec.has_no_checks() {
        warn!(file = %file.display(), "Scenario has no checks and will pass immediately");
    }
    println!(
        "OK {}: {} pod check(s), {} log check(s), {} cleanup action(s), timeout {}s",
        file.display(),
        spec.check_pods.len(),
        spec.check_logs.len(),
        spec.clean_configs.len(),
        spec.timeout_seconds
    );
    Ok(ExitCode::SUCCESS)
}

fn schema(harness: bool) -> Result<ExitCode> {
    let schema = if harness {
        harness_config_schema()
    } else {
        validation_spec_schema()
    };
    println!("{}", serde_json::to_string_pretty(&schema)?);
    Ok(ExitCode::SUCCESS)
}

fn preflight(config_path: &Path) -> Result<ExitCode> {
    let harness = HarnessConfig::from_path(config_path)
        .with_context(|| format!("Failed to load harness config {}", config_path.display()))?;
    let report = run_preflight(&harness, &connector()?.connect()?)?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(if report.is_ready() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_run() {
        let cli = Cli::try_parse_from([
            "vkcheck",
            "-v",
            "run",
            "pod.yaml",
            "--apply",
            "--timeout-multiplier",
            "2.5",
        ])
        .unwrap();
        assert!(cli.verbose);
        match cli.command {
            Commands::Run {
                file,
                apply,
                timeout_multiplier,
                ..
            } => {
                assert_eq!(file, PathBuf::from("pod.yaml"));
                assert!(apply);
                assert_eq!(timeout_multiplier, Some(2.5));
            }
            _ => panic!("expected run"),
        }
    }

    #[test]
    fn test_parse_schema_harness() {
        let cli = Cli::try_parse_from(["vkcheck", "--json-logs", "schema", "--harness"]).unwrap();
        assert!(cli.json_logs);
        assert!(matches!(cli.command, Commands::Schema { harness: true }));
    }

    #[test]
    fn test_lint_and_schema_commands() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("check.yaml");
        std::fs::write(&path, "# validation\ncheck_pods: [{name: a, namespace: b}]\n").unwrap();
        assert!(lint(&path).is_ok());
        assert!(lint(&dir.path().join("missing.yaml")).is_err());
        assert!(schema(false).is_ok());
        assert!(schema(true).is_ok());
    }
}
