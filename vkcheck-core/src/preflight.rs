//! Harness configuration and cluster preflight checks.
//!
//! Before any scenario runs, the cluster must expose the namespaces the
//! scenarios deploy into and the nodes they target.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::client::ClusterClient;
use crate::errors::{ClientError, ScenarioError};
use crate::orchestrator::RunnerConfig;

/// Keys a harness may provide to scenario templates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum TemplateKey {
    Annotations,
    Namespace,
    Tolerations,
}

/// Cluster-wide settings shared by every scenario of a test session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct HarnessConfig {
    /// Namespaces that must exist before scenarios run.
    #[serde(default)]
    pub required_namespaces: Vec<String>,
    /// Nodes scenarios are scheduled onto; each must be registered.
    #[serde(default)]
    pub target_nodes: Vec<String>,
    /// Scales every scenario's `timeout_seconds`. Unset leaves the
    /// environment's multiplier in effect.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_multiplier: Option<f64>,
    /// Values rendered into scenario manifests by the harness. vkcheck
    /// carries them but does not render templates.
    #[serde(default)]
    #[schemars(with = "BTreeMap<TemplateKey, serde_json::Value>")]
    pub values: BTreeMap<TemplateKey, serde_yaml_ng::Value>,
}

impl HarnessConfig {
    pub fn from_yaml_str(text: &str) -> Result<Self, ScenarioError> {
        let config: Self = serde_yaml_ng::from_str(text)?;
        if let Some(multiplier) = config.timeout_multiplier
            && (!multiplier.is_finite() || multiplier <= 0.0)
        {
            return Err(ScenarioError::InvalidHarness(format!(
                "timeout_multiplier must be a positive number, got {multiplier}"
            )));
        }
        Ok(config)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ScenarioError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ScenarioError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml_str(&text)
    }

    /// Override the runner's multiplier when this file sets one.
    pub fn apply_to(&self, config: &mut RunnerConfig) {
        if let Some(multiplier) = self.timeout_multiplier {
            debug!(multiplier, "Timeout multiplier from harness config");
            config.timeout_multiplier = multiplier;
        }
    }
}

/// What the cluster is missing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PreflightReport {
    pub missing_namespaces: Vec<String>,
    pub missing_nodes: Vec<String>,
}

impl PreflightReport {
    pub fn is_ready(&self) -> bool {
        self.missing_namespaces.is_empty() && self.missing_nodes.is_empty()
    }
}

/// Compare the cluster against `config`.
///
/// Listing failures are returned as errors; absent objects are reported, not
/// raised.
pub fn run_preflight<C: ClusterClient + ?Sized>(
    config: &HarnessConfig,
    client: &C,
) -> Result<PreflightReport, ClientError> {
    let mut report = PreflightReport::default();

    if !config.required_namespaces.is_empty() {
        let present: BTreeSet<String> = client.list_namespaces()?.into_iter().collect();
        report.missing_namespaces = missing(&config.required_namespaces, &present);
    }
    if !config.target_nodes.is_empty() {
        let present: BTreeSet<String> = client.list_nodes()?.into_iter().collect();
        report.missing_nodes = missing(&config.target_nodes, &present);
    }

    for namespace in &report.missing_namespaces {
        warn!(%namespace, "Required namespace is not present");
    }
    for node in &report.missing_nodes {
        warn!(%node, "Target node is not registered");
    }
    if report.is_ready() {
        info!(
            namespaces = config.required_namespaces.len(),
            nodes = config.target_nodes.len(),
            "Preflight passed"
        );
    }
    Ok(report)
}

fn missing(wanted: &[String], present: &BTreeSet<String>) -> Vec<String> {
    wanted
        .iter()
        .filter(|name| !present.contains(*name))
        .cloned()
        .collect()
}
