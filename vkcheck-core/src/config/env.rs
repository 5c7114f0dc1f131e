//! Reading `VKCHECK_*` settings from the process environment.
//!
//! Each getter returns a [`Sourced`] value. A malformed variable never aborts
//! parsing: the getter falls back to its default and records an [`EnvError`],
//! so every bad setting is reported together.

use super::source::Sourced;
use std::env;
use std::path::PathBuf;
use thiserror::Error;

/// Filter levels accepted for `VKCHECK_LOG_LEVEL`.
pub const LOG_LEVELS: [&str; 6] = ["trace", "debug", "info", "warn", "error", "off"];

/// A rejected environment variable.
#[derive(Debug, Error)]
pub enum EnvError {
    #[error("{var}='{value}' is not {expected}")]
    InvalidValue {
        var: String,
        expected: String,
        value: String,
    },

    #[error("{var}={value} is outside {min}..={max}")]
    OutOfRange {
        var: String,
        value: String,
        min: String,
        max: String,
    },
}

/// Every problem found while reading one configuration object.
#[derive(Debug, Error)]
#[error("{}", render_errors(.0))]
pub struct EnvErrors(pub Vec<EnvError>);

fn render_errors(errors: &[EnvError]) -> String {
    let mut out = format!("{} invalid environment setting(s)", errors.len());
    for err in errors {
        out.push_str(&format!("\n  - {err}"));
    }
    out
}

/// `on`/`off` style switch values, case-insensitive. An empty value is off.
fn parse_switch(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "" | "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Reads prefixed variables and accumulates what it rejects.
pub struct EnvParser {
    prefix: &'static str,
    errors: Vec<EnvError>,
}

impl EnvParser {
    pub fn new() -> Self {
        Self {
            prefix: "VKCHECK_",
            errors: Vec::new(),
        }
    }

    /// Rejections so far, for callers that warn instead of failing.
    pub fn errors(&self) -> &[EnvError] {
        &self.errors
    }

    /// Consume the parser, failing if anything was rejected.
    pub fn finish(self) -> Result<(), EnvErrors> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(EnvErrors(self.errors))
        }
    }

    /// Prefixed name and raw value, if the variable is set.
    fn lookup(&self, name: &str) -> (String, Option<String>) {
        let var = format!("{}{name}", self.prefix);
        let value = env::var(&var).ok();
        (var, value)
    }

    fn reject(&mut self, var: &str, expected: impl Into<String>, value: String) {
        self.errors.push(EnvError::InvalidValue {
            var: var.to_string(),
            expected: expected.into(),
            value,
        });
    }

    /// Non-empty string, else `default`.
    pub fn get_string(&mut self, name: &str, default: &str) -> Sourced<String> {
        match self.lookup(name) {
            (var, Some(value)) if !value.is_empty() => Sourced::from_env(value, var),
            _ => Sourced::default_value(default.to_string()),
        }
    }

    /// Switch such as `VKCHECK_LOG_ANSI=off`.
    pub fn get_bool(&mut self, name: &str, default: bool) -> Sourced<bool> {
        let (var, Some(value)) = self.lookup(name) else {
            return Sourced::default_value(default);
        };
        let enabled = parse_switch(&value).unwrap_or_else(|| {
            self.reject(&var, "a switch (on/off, true/false, 1/0, yes/no)", value);
            default
        });
        Sourced::from_env(enabled, var)
    }

    /// Number within `min..=max`.
    pub fn get_f64_range(&mut self, name: &str, default: f64, min: f64, max: f64) -> Sourced<f64> {
        let (var, Some(value)) = self.lookup(name) else {
            return Sourced::default_value(default);
        };
        match value.trim().parse::<f64>() {
            Ok(n) if (min..=max).contains(&n) => Sourced::from_env(n, var),
            Ok(n) => {
                self.errors.push(EnvError::OutOfRange {
                    var: var.clone(),
                    value: n.to_string(),
                    min: min.to_string(),
                    max: max.to_string(),
                });
                Sourced::from_env(default, var)
            }
            Err(_) => {
                self.reject(&var, "a number", value);
                Sourced::default_value(default)
            }
        }
    }

    /// Path with a leading `~/` expanded; unset or empty is `None`.
    pub fn get_optional_path(&mut self, name: &str) -> Sourced<Option<PathBuf>> {
        match self.lookup(name) {
            (var, Some(value)) if !value.is_empty() => {
                Sourced::from_env(Some(expand_home(&value)), var)
            }
            _ => Sourced::default_value(None),
        }
    }

    /// One of [`LOG_LEVELS`].
    pub fn get_log_level(&mut self, name: &str, default: &str) -> Sourced<String> {
        self.get_choice(name, &LOG_LEVELS, default)
    }

    /// One of a fixed set of lowercase choices, matched case-insensitively.
    pub fn get_choice(&mut self, name: &str, choices: &[&str], default: &str) -> Sourced<String> {
        let (var, Some(value)) = self.lookup(name) else {
            return Sourced::default_value(default.to_string());
        };
        let lower = value.to_ascii_lowercase();
        if choices.contains(&lower.as_str()) {
            Sourced::from_env(lower, var)
        } else {
            self.reject(&var, format!("one of {}", choices.join("/")), value);
            Sourced::from_env(default.to_string(), var)
        }
    }

    /// Set and empty reads as an explicit `None`.
    pub fn get_optional_string(&mut self, name: &str) -> Sourced<Option<String>> {
        match self.lookup(name) {
            (var, Some(value)) => Sourced::from_env(Some(value).filter(|v| !v.is_empty()), var),
            (_, None) => Sourced::default_value(None),
        }
    }

    /// Like [`get_optional_path`](Self::get_optional_path), falling back to
    /// an unprefixed variable honoured by other tools (e.g. `KUBECONFIG`).
    pub fn get_optional_path_or(&mut self, name: &str, fallback: &str) -> Sourced<Option<PathBuf>> {
        let primary = self.get_optional_path(name);
        if primary.value.is_some() {
            return primary;
        }
        match env::var(fallback) {
            // KUBECONFIG may list several files; the first one wins here.
            Ok(value) if !value.is_empty() => {
                let first = env::split_paths(&value).next().unwrap_or_default();
                Sourced::from_env(Some(expand_home(&first.to_string_lossy())), fallback)
            }
            _ => primary,
        }
    }
}

impl Default for EnvParser {
    fn default() -> Self {
        Self::new()
    }
}

fn expand_home(value: &str) -> PathBuf {
    if let Some(stripped) = value.strip_prefix("~/")
        && let Some(home) = dirs::home_dir()
    {
        return home.join(stripped);
    }
    PathBuf::from(value)
}
