//! Validation orchestrator.
//!
//! ```text
//! RUNNING ──all checks pass──▶ SUCCEEDED ─┐
//!    │  ▲                                 │
//!    │  └─recoverable: backoff, new round │
//!    ├──fatal / client error──▶ FAILED ───┼──▶ CLEANING_UP ──▶ DONE
//!    ├──budget exhausted──────▶ TIMED_OUT ┤
//!    └──cancelled─────────────▶ CANCELLED ┘
//! ```
//!
//! Each round acquires a fresh client, evaluates every check in declaration
//! order and releases the client before pausing. Cleanup runs exactly once on
//! every exit path, including unwinding out of the loop.

use std::time::{Duration, Instant};

use tracing::{debug, error, info, info_span, trace, warn};

use crate::backoff::BackoffPolicy;
use crate::cancel::{CancellationToken, Clock, SystemClock};
use crate::cleanup::CleanupOutcome;
use crate::client::{ClusterClient, ClusterConnector};
use crate::errors::{CheckError, CleanupFailure, ValidationError};
use crate::model::ValidationSpec;

/// Tunables of a validation run, passed in explicitly.
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Pause between rounds that ended in a recoverable failure.
    pub backoff: BackoffPolicy,
    /// Scales every scenario's `timeout_seconds` (slow clusters, CI).
    pub timeout_multiplier: f64,
    /// External abort signal.
    pub cancellation: CancellationToken,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            backoff: BackoffPolicy::default(),
            timeout_multiplier: 1.0,
            cancellation: CancellationToken::new(),
        }
    }
}

/// Result of a successful run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    /// Rounds evaluated, including the passing one.
    pub rounds: u32,
    pub elapsed: Duration,
    pub cleanup_deleted: usize,
    pub cleanup_skipped: usize,
}

/// Tally of one cleanup phase.
#[derive(Debug, Default)]
pub struct CleanupReport {
    pub deleted: usize,
    pub skipped: usize,
    pub failures: Vec<CleanupFailure>,
}

/// Run every cleanup action of `spec` in order over a fresh connection.
///
/// A failing action does not stop the remaining ones. No connection is opened
/// when there is nothing to clean.
pub fn run_cleanup<N: ClusterConnector>(
    spec: &ValidationSpec,
    connector: &N,
    succeeded: bool,
) -> CleanupReport {
    let mut report = CleanupReport::default();
    if spec.clean_configs.is_empty() {
        return report;
    }

    let client = match connector.connect() {
        Ok(client) => client,
        Err(error) => {
            warn!(%error, "Cannot connect for cleanup");
            report.failures.push(CleanupFailure {
                target: "cleanup connection".to_string(),
                error,
            });
            return report;
        }
    };

    for action in &spec.clean_configs {
        match action.execute(&client, succeeded) {
            Ok(CleanupOutcome::Deleted) => report.deleted += 1,
            Ok(CleanupOutcome::Skipped) => report.skipped += 1,
            Err(error) => {
                warn!(object = %action.target(), %error, "Cleanup action failed");
                report.failures.push(CleanupFailure {
                    target: action.target(),
                    error,
                });
            }
        }
    }
    report
}

/// Runs cleanup on drop unless [`CleanupGuard::finish`] already did.
struct CleanupGuard<'a, N: ClusterConnector> {
    spec: &'a ValidationSpec,
    connector: &'a N,
    done: bool,
}

impl<'a, N: ClusterConnector> CleanupGuard<'a, N> {
    fn new(spec: &'a ValidationSpec, connector: &'a N) -> Self {
        Self {
            spec,
            connector,
            done: false,
        }
    }

    fn finish(mut self, succeeded: bool) -> CleanupReport {
        self.done = true;
        run_cleanup(self.spec, self.connector, succeeded)
    }
}

impl<N: ClusterConnector> Drop for CleanupGuard<'_, N> {
    fn drop(&mut self) {
        if self.done {
            return;
        }
        error!("Polling aborted unexpectedly, running cleanup as failed");
        let report = run_cleanup(self.spec, self.connector, false);
        for failure in report.failures {
            error!(%failure, "Cleanup failed during unwind");
        }
    }
}

/// Polls a [`ValidationSpec`] until it holds, then cleans up.
#[derive(Debug, Clone)]
pub struct ValidationRunner<K: Clock = SystemClock> {
    config: RunnerConfig,
    clock: K,
}

impl ValidationRunner<SystemClock> {
    pub fn new(config: RunnerConfig) -> Self {
        Self::with_clock(config, SystemClock)
    }
}

impl<K: Clock> ValidationRunner<K> {
    pub fn with_clock(config: RunnerConfig, clock: K) -> Self {
        Self { config, clock }
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    /// Effective polling budget for `spec`.
    pub fn budget(&self, spec: &ValidationSpec) -> Duration {
        let secs = spec.timeout_seconds * self.config.timeout_multiplier;
        if secs.is_nan() || secs <= 0.0 {
            return Duration::ZERO;
        }
        Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
    }

    /// Run the validation and its cleanup phase.
    ///
    /// Fatal, timeout and cancellation outcomes are returned only after
    /// cleanup; cleanup failures are reported alongside, never instead of,
    /// the original outcome.
    pub fn run<N: ClusterConnector>(
        &self,
        spec: &ValidationSpec,
        connector: &N,
    ) -> Result<RunSummary, ValidationError> {
        let span = info_span!("validation", timeout_secs = spec.timeout_seconds);
        let _enter = span.enter();

        let start = self.clock.now();
        let guard = CleanupGuard::new(spec, connector);
        let outcome = self.poll(spec, connector, start);
        let succeeded = outcome.is_ok();

        debug!(succeeded, "Entering cleanup");
        let report = guard.finish(succeeded);
        let elapsed = self.clock.now().saturating_duration_since(start);

        match (outcome, report.failures.is_empty()) {
            (Ok(rounds), true) => {
                info!(rounds, elapsed_secs = elapsed.as_secs_f64(), "Validation succeeded");
                Ok(RunSummary {
                    rounds,
                    elapsed,
                    cleanup_deleted: report.deleted,
                    cleanup_skipped: report.skipped,
                })
            }
            (Ok(_), false) => Err(ValidationError::Cleanup {
                failures: report.failures,
                original: None,
            }),
            (Err(err), true) => Err(err),
            (Err(err), false) => Err(ValidationError::Cleanup {
                failures: report.failures,
                original: Some(Box::new(err)),
            }),
        }
    }

    fn poll<N: ClusterConnector>(
        &self,
        spec: &ValidationSpec,
        connector: &N,
        start: Instant,
    ) -> Result<u32, ValidationError> {
        let budget = self.budget(spec);
        let cancel = &self.config.cancellation;
        let mut rounds = 0u32;

        while self.clock.now().saturating_duration_since(start) < budget {
            if cancel.is_cancelled() {
                break;
            }
            rounds += 1;
            debug!(round = rounds, "Starting validation round");

            let result = {
                let client = connector.connect()?;
                evaluate_round(spec, &client)
            };

            match result {
                Ok(()) => return Ok(rounds),
                Err(CheckError::Recoverable(reason)) => {
                    let delay = self.config.backoff.delay_for(rounds);
                    debug!(
                        round = rounds,
                        %reason,
                        delay_secs = delay.as_secs_f64(),
                        "Round not satisfied yet, retrying after backoff"
                    );
                    self.clock.sleep(delay, cancel);
                }
                Err(CheckError::Fatal { title, description }) => {
                    warn!(round = rounds, %title, "Validation failed");
                    return Err(ValidationError::Fatal { title, description });
                }
                Err(CheckError::Client(err)) => {
                    warn!(round = rounds, error = %err, "Cluster client error");
                    return Err(ValidationError::Client(err));
                }
            }
        }

        if cancel.is_cancelled() {
            warn!(rounds, "Validation cancelled");
            return Err(ValidationError::Cancelled { rounds });
        }
        warn!(rounds, timeout_secs = spec.timeout_seconds, "Validation timed out");
        Err(ValidationError::Timeout {
            timeout_seconds: spec.timeout_seconds,
        })
    }
}

/// Evaluate every check once; stops at the first failure.
fn evaluate_round<C: ClusterClient>(spec: &ValidationSpec, client: &C) -> Result<(), CheckError> {
    for check in spec.checks() {
        trace!(%check, "Evaluating");
        check.evaluate(client)?;
    }
    Ok(())
}
