//! Scenario model: the declarative description of one validation run.
//!
//! All types deserialize strictly (`deny_unknown_fields`) so that typos in a
//! scenario are rejected at load time instead of being silently ignored.

use regex::Regex;
use schemars::JsonSchema;
use schemars::r#gen::SchemaGenerator;
use schemars::schema::Schema;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::errors::ScenarioError;

/// Default validation budget in seconds.
pub const DEFAULT_TIMEOUT_SECONDS: f64 = 60.0;

const fn default_timeout_seconds() -> f64 {
    DEFAULT_TIMEOUT_SECONDS
}

/// Pod lifecycle phase as reported by the API server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, JsonSchema)]
pub enum PodPhase {
    Pending,
    Running,
    #[default]
    Succeeded,
    Failed,
    Unknown,
}

impl PodPhase {
    pub const ALL: [PodPhase; 5] = [
        Self::Pending,
        Self::Running,
        Self::Succeeded,
        Self::Failed,
        Self::Unknown,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "Pending",
            Self::Running => "Running",
            Self::Succeeded => "Succeeded",
            Self::Failed => "Failed",
            Self::Unknown => "Unknown",
        }
    }
}

impl fmt::Display for PodPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PodPhase {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|phase| phase.as_str() == s)
            .ok_or_else(|| format!("unknown pod phase '{s}'"))
    }
}

/// Resource kinds a cleanup action can delete.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Cleanable {
    Pod,
    Namespace,
    Service,
    ConfigMap,
    Secret,
}

impl Cleanable {
    /// Whether the kind lives inside a namespace.
    pub const fn is_namespaced(self) -> bool {
        !matches!(self, Self::Namespace)
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pod => "pod",
            Self::Namespace => "namespace",
            Self::Service => "service",
            Self::ConfigMap => "config_map",
            Self::Secret => "secret",
        }
    }
}

impl fmt::Display for Cleanable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// When a cleanup action fires, relative to the run outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub enum CleanupCondition {
    #[default]
    Always,
    Never,
    OnSuccess,
    OnFailure,
}

impl CleanupCondition {
    pub const fn applies(self, succeeded: bool) -> bool {
        match self {
            Self::Always => true,
            Self::Never => false,
            Self::OnSuccess => succeeded,
            Self::OnFailure => !succeeded,
        }
    }
}

/// Operator applied to the matches of a log regex.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, JsonSchema)]
pub enum RegexOperator {
    #[default]
    Exists,
    CountAtLeast,
    CountAtMost,
    CountExactly,
    Is,
}

impl RegexOperator {
    pub const fn needs_value(self) -> bool {
        !matches!(self, Self::Exists)
    }

    pub const fn is_count(self) -> bool {
        matches!(
            self,
            Self::CountAtLeast | Self::CountAtMost | Self::CountExactly
        )
    }
}

/// Expected value of a log check: written as a string or an integer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum ExpectedValue {
    Integer(i64),
    Text(String),
}

impl ExpectedValue {
    /// Interpret the value as a match count.
    ///
    /// Integer-valued strings are accepted, negative numbers are not.
    pub fn as_count(&self) -> Option<usize> {
        match self {
            Self::Integer(n) => usize::try_from(*n).ok(),
            Self::Text(s) => s.trim().parse::<usize>().ok(),
        }
    }
}

impl fmt::Display for ExpectedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Integer(n) => write!(f, "{n}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

impl From<i64> for ExpectedValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<&str> for ExpectedValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

/// A compiled regular expression that round-trips as its source string.
#[derive(Clone)]
pub struct Pattern(Regex);

impl Pattern {
    pub fn new(source: &str) -> Result<Self, regex::Error> {
        Regex::new(source).map(Self)
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    pub fn regex(&self) -> &Regex {
        &self.0
    }
}

impl fmt::Debug for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Pattern").field(&self.as_str()).finish()
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl PartialEq for Pattern {
    fn eq(&self, other: &Self) -> bool {
        self.as_str() == other.as_str()
    }
}

impl Eq for Pattern {}

impl Serialize for Pattern {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Pattern {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let source = String::deserialize(deserializer)?;
        Pattern::new(&source).map_err(serde::de::Error::custom)
    }
}

impl JsonSchema for Pattern {
    fn is_referenceable() -> bool {
        false
    }

    fn schema_name() -> String {
        "Pattern".to_string()
    }

    fn json_schema(generator: &mut SchemaGenerator) -> Schema {
        String::json_schema(generator)
    }
}

/// Asserts the phase of a pod.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct ResourceCheck {
    /// Name of the pod.
    pub name: String,
    /// Namespace where the pod is defined.
    pub namespace: String,
    /// Phase the pod must reach for the check to pass.
    #[serde(default)]
    pub status: PodPhase,
}

/// Asserts a property of a pod's log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct LogCheck {
    /// Name of the pod.
    pub name: String,
    /// Namespace where the pod is defined.
    pub namespace: String,
    /// Regular expression applied to the log.
    pub regex: Pattern,
    /// Operation applied to the regex matches.
    #[serde(default)]
    pub operator: RegexOperator,
    /// Container name; mandatory for multi-container pods.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container: Option<String>,
    /// Value the matches are compared against. Optional for `Exists`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<ExpectedValue>,
}

/// Deletes one resource once the run is over.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct CleanupAction {
    /// Kind of object to delete.
    #[serde(rename = "type")]
    pub kind: Cleanable,
    /// Name of the object.
    pub name: String,
    /// Namespace of the object; ignored for `namespace`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    /// Outcome on which the deletion happens.
    #[serde(default)]
    pub condition: CleanupCondition,
}

impl CleanupAction {
    /// Short description used in logs and error reports.
    pub fn target(&self) -> String {
        match (&self.namespace, self.kind.is_namespaced()) {
            (Some(ns), true) => format!("{} {}/{}", self.kind, ns, self.name),
            _ => format!("{} {}", self.kind, self.name),
        }
    }
}

/// Root of a scenario: checks polled until they hold, then cleanup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct ValidationSpec {
    /// Seconds before a not-yet-successful validation is declared failed.
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: f64,
    /// Checks on pod phases, evaluated in order.
    #[serde(default)]
    pub check_pods: Vec<ResourceCheck>,
    /// Checks on pod logs, evaluated after the pod checks.
    #[serde(default)]
    pub check_logs: Vec<LogCheck>,
    /// Clean-up actions, executed in order once polling is over.
    #[serde(default)]
    pub clean_configs: Vec<CleanupAction>,
}

impl Default for ValidationSpec {
    fn default() -> Self {
        Self {
            timeout_seconds: DEFAULT_TIMEOUT_SECONDS,
            check_pods: Vec::new(),
            check_logs: Vec::new(),
            clean_configs: Vec::new(),
        }
    }
}

impl ValidationSpec {
    /// Whether the spec asserts nothing.
    pub fn has_no_checks(&self) -> bool {
        self.check_pods.is_empty() && self.check_logs.is_empty()
    }

    /// Reject values that deserialize fine but cannot be evaluated.
    pub fn validate(&self) -> Result<(), ScenarioError> {
        if !self.timeout_seconds.is_finite() || self.timeout_seconds <= 0.0 {
            return Err(ScenarioError::Invalid(format!(
                "timeout_seconds must be a positive number, got {}",
                self.timeout_seconds
            )));
        }

        for (index, check) in self.check_logs.iter().enumerate() {
            let label = format!("check_logs[{index}] ({}.{})", check.name, check.namespace);
            match (&check.value, check.operator) {
                (None, op) if op.needs_value() => {
                    return Err(ScenarioError::Invalid(format!(
                        "{label}: operator {op:?} requires a value"
                    )));
                }
                (Some(value), op) if op.is_count() && value.as_count().is_none() => {
                    return Err(ScenarioError::Invalid(format!(
                        "{label}: operator {op:?} requires a non-negative integer, got '{value}'"
                    )));
                }
                _ => {}
            }
        }

        for (index, action) in self.clean_configs.iter().enumerate() {
            if action.kind.is_namespaced() && action.namespace.is_none() {
                return Err(ScenarioError::Invalid(format!(
                    "clean_configs[{index}]: {} {} requires a namespace",
                    action.kind, action.name
                )));
            }
        }

        Ok(())
    }
}
