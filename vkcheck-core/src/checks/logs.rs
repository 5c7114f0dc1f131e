//! Log content assertion.
//!
//! | Operator       | Passes when                    | Violation              |
//! |----------------|--------------------------------|------------------------|
//! | `Exists`       | at least one match             | recoverable            |
//! | `CountAtLeast` | matches >= value               | recoverable            |
//! | `CountAtMost`  | matches <= value               | fatal                  |
//! | `CountExactly` | matches == value               | below: recoverable, above: fatal |
//! | `Is`           | value appears among matches    | recoverable            |
//!
//! Logs only grow, so overshooting an upper bound is never retried.

use regex::Regex;
use tracing::trace;

use crate::client::ClusterClient;
use crate::errors::CheckError;
use crate::model::{LogCheck, RegexOperator};

/// Non-overlapping matches of `regex` in `log`.
///
/// Without capture groups each match contributes its full text; otherwise it
/// contributes the text of the first group (empty if that group did not take
/// part in the match).
pub fn find_matches(regex: &Regex, log: &str) -> Vec<String> {
    if regex.captures_len() > 1 {
        regex
            .captures_iter(log)
            .map(|caps| caps.get(1).map_or("", |m| m.as_str()).to_string())
            .collect()
    } else {
        regex
            .find_iter(log)
            .map(|m| m.as_str().to_string())
            .collect()
    }
}

impl LogCheck {
    pub fn evaluate<C: ClusterClient + ?Sized>(&self, client: &C) -> Result<(), CheckError> {
        let log = client.read_pod_log(&self.name, &self.namespace, self.container.as_deref())?;
        let matches = find_matches(self.regex.regex(), &log);
        trace!(
            pod = %self.name,
            namespace = %self.namespace,
            regex = %self.regex,
            matches = matches.len(),
            "log matches"
        );
        self.judge(&matches, &log)
    }

    /// Apply the operator to an already computed match list.
    pub fn judge(&self, matches: &[String], log: &str) -> Result<(), CheckError> {
        let found = matches.len();
        match self.operator {
            RegexOperator::Exists => {
                if found == 0 {
                    return Err(CheckError::recoverable(format!(
                        "Expression {} does not match log:\n{log}",
                        self.regex
                    )));
                }
            }
            RegexOperator::CountAtLeast => {
                let bound = self.bound()?;
                if found < bound {
                    return Err(self.too_few(found, bound, log));
                }
            }
            RegexOperator::CountAtMost => {
                let bound = self.bound()?;
                if found > bound {
                    return Err(self.too_many(found, bound, log));
                }
            }
            RegexOperator::CountExactly => {
                let bound = self.bound()?;
                if found < bound {
                    return Err(self.too_few(found, bound, log));
                }
                if found > bound {
                    return Err(self.too_many(found, bound, log));
                }
            }
            RegexOperator::Is => {
                let expected = self
                    .value
                    .as_ref()
                    .map(ToString::to_string)
                    .unwrap_or_default();
                if !matches.iter().any(|m| *m == expected) {
                    return Err(CheckError::recoverable(format!(
                        "Expression {} returned matches: {matches:?}. {expected} expected.\n{log}",
                        self.regex
                    )));
                }
            }
        }
        Ok(())
    }

    fn bound(&self) -> Result<usize, CheckError> {
        self.value
            .as_ref()
            .and_then(|value| value.as_count())
            .ok_or_else(|| {
                CheckError::fatal(
                    format!(
                        "Log check on {}.{} has no usable count",
                        self.name, self.namespace
                    ),
                    format!("operator {:?}, value {:?}", self.operator, self.value),
                )
            })
    }

    fn too_few(&self, found: usize, bound: usize, log: &str) -> CheckError {
        CheckError::recoverable(format!(
            "Expression {} not sufficiently repeated in log ({found} < {bound})\n{log}",
            self.regex
        ))
    }

    fn too_many(&self, found: usize, bound: usize, log: &str) -> CheckError {
        CheckError::fatal(
            format!(
                "Found too many occurrences of {} ({found} > {bound})",
                self.regex
            ),
            log,
        )
    }
}
