//! vkcheck core library.
//!
//! Polls declarative checks against a Kubernetes cluster until they hold, a
//! fatal condition is detected, or the time budget runs out, then runs the
//! scenario's conditional cleanup.

pub mod backoff;
pub mod cancel;
pub mod checks;
pub mod cleanup;
pub mod client;
pub mod config;
pub mod errors;
pub mod kubectl;
pub mod logging;
pub mod mock;
pub mod model;
pub mod orchestrator;
pub mod preflight;
pub mod scenario;
pub mod schema;

pub use backoff::BackoffPolicy;
pub use cancel::{CancellationToken, Clock, MockClock, SystemClock};
pub use checks::{Check, find_matches};
pub use cleanup::CleanupOutcome;
pub use client::{ClusterClient, ClusterConnector, Deleter, PodStatus, deleter_for};
pub use config::{ConfigSource, EnvError, EnvErrors, EnvParser, Sourced};
pub use errors::{CheckError, CleanupFailure, ClientError, ScenarioError, ValidationError};
pub use kubectl::{KubectlClient, KubectlConnector, KubectlSettings};
pub use logging::{LogConfig, LogFormat, LoggingError, LoggingGuards, init_logging};
pub use mock::{DeleteCall, MockCluster, MockConnector};
pub use model::{
    Cleanable, CleanupAction, CleanupCondition, ExpectedValue, LogCheck, Pattern, PodPhase,
    RegexOperator, ResourceCheck, ValidationSpec,
};
pub use orchestrator::{CleanupReport, RunSummary, RunnerConfig, ValidationRunner, run_cleanup};
pub use preflight::{HarnessConfig, PreflightReport, TemplateKey, run_preflight};
pub use scenario::{Scenario, split_manifest_and_validation};
pub use schema::{harness_config_schema, validation_spec_schema};
