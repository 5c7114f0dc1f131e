//! Source tracking for configuration values.

use std::fmt;

/// Where a configuration value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSource {
    /// Built-in default.
    Default,
    /// Harness configuration file.
    File,
    /// `VKCHECK_*` (or a recognised fallback) environment variable.
    Environment,
    /// Command-line flag.
    CommandLine,
}

impl ConfigSource {
    /// Whether the value was set by the user rather than defaulted.
    pub fn is_explicit(self) -> bool {
        self != ConfigSource::Default
    }
}

impl fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Default => "default",
            Self::File => "file",
            Self::Environment => "environment",
            Self::CommandLine => "command line",
        };
        f.write_str(label)
    }
}

/// A value together with its origin.
#[derive(Debug, Clone, PartialEq)]
pub struct Sourced<T> {
    pub value: T,
    pub source: ConfigSource,
    /// Variable name when `source` is [`ConfigSource::Environment`].
    pub env_var: Option<String>,
}

impl<T> Sourced<T> {
    pub fn default_value(value: T) -> Self {
        Self {
            value,
            source: ConfigSource::Default,
            env_var: None,
        }
    }

    pub fn from_env(value: T, env_var: impl Into<String>) -> Self {
        Self {
            value,
            source: ConfigSource::Environment,
            env_var: Some(env_var.into()),
        }
    }

    pub fn with_source(value: T, source: ConfigSource) -> Self {
        Self {
            value,
            source,
            env_var: None,
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Sourced<U> {
        Sourced {
            value: f(self.value),
            source: self.source,
            env_var: self.env_var,
        }
    }

    /// Keep `self` unless `other` was set explicitly.
    pub fn or(self, other: Sourced<T>) -> Sourced<T> {
        if other.source.is_explicit() { other } else { self }
    }

    pub fn into_inner(self) -> T {
        self.value
    }
}

impl<T: fmt::Display> fmt::Display for Sourced<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.env_var {
            Some(var) => write!(f, "{} (from {var})", self.value),
            None => write!(f, "{} ({})", self.value, self.source),
        }
    }
}
