//! Configuration for vkcheck.
//!
//! Every setting has a built-in default and may be overridden through a
//! `VKCHECK_*` environment variable; the CLI layers its flags on top. Parsed
//! objects are passed explicitly to the components that need them.

pub mod env;
pub mod source;

use std::time::Duration;

pub use env::{EnvError, EnvErrors, EnvParser};
pub use source::{ConfigSource, Sourced};

use crate::backoff::BackoffPolicy;
use crate::kubectl::{DEFAULT_KUBECTL, KubectlSettings};
use crate::orchestrator::RunnerConfig;

/// Accepted range for `VKCHECK_TIMEOUT_MULTIPLIER`.
pub const TIMEOUT_MULTIPLIER_RANGE: (f64, f64) = (0.01, 1000.0);

const MAX_BACKOFF_SECS: f64 = 3600.0;

impl RunnerConfig {
    /// Runner settings from `VKCHECK_TIMEOUT_MULTIPLIER`, `VKCHECK_BACKOFF_SECS`,
    /// `VKCHECK_BACKOFF_MAX_SECS` and `VKCHECK_BACKOFF_JITTER`.
    ///
    /// Without `VKCHECK_BACKOFF_MAX_SECS` the pause is fixed.
    pub fn from_env() -> Result<Self, EnvErrors> {
        let mut parser = EnvParser::new();
        let (min, max) = TIMEOUT_MULTIPLIER_RANGE;
        let multiplier = parser.get_f64_range("TIMEOUT_MULTIPLIER", 1.0, min, max);
        let base = parser.get_f64_range("BACKOFF_SECS", 1.0, 0.0, MAX_BACKOFF_SECS);
        let cap = parser.get_f64_range("BACKOFF_MAX_SECS", base.value, 0.0, MAX_BACKOFF_SECS);
        let jitter = parser.get_f64_range("BACKOFF_JITTER", 0.0, 0.0, 1.0);
        parser.finish()?;

        let base_delay = Duration::from_secs_f64(base.value);
        let backoff = if cap.source.is_explicit() {
            BackoffPolicy::exponential(base_delay, Duration::from_secs_f64(cap.value))
        } else {
            BackoffPolicy::fixed(base_delay)
        };

        Ok(Self {
            backoff: backoff.with_jitter(jitter.value),
            timeout_multiplier: multiplier.value,
            ..Self::default()
        })
    }
}

impl KubectlSettings {
    /// kubectl settings from `VKCHECK_KUBECTL`, `VKCHECK_KUBECONFIG` (falling
    /// back to `KUBECONFIG`) and `VKCHECK_CONTEXT`.
    pub fn from_env() -> Result<Self, EnvErrors> {
        let mut parser = EnvParser::new();
        let binary = parser.get_string("KUBECTL", DEFAULT_KUBECTL);
        let kubeconfig = parser.get_optional_path_or("KUBECONFIG", "KUBECONFIG");
        let context = parser.get_optional_string("CONTEXT");
        parser.finish()?;

        Ok(Self {
            binary: binary.value,
            kubeconfig: kubeconfig.value,
            context: context.value,
        })
    }
}

#[cfg(test)]
pub(crate) fn env_test_lock() -> std::sync::MutexGuard<'static, ()> {
    use std::sync::{Mutex, OnceLock};

    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    ENV_LOCK
        .get_or_init(|| Mutex::new(()))
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}
