//! Assertions evaluated once per polling round.

pub mod logs;
pub mod resource;

use std::fmt;

use crate::client::ClusterClient;
use crate::errors::CheckError;
use crate::model::{LogCheck, ResourceCheck, ValidationSpec};

pub use logs::find_matches;

/// One assertion of a scenario, borrowed from its [`ValidationSpec`].
#[derive(Debug, Clone, Copy)]
pub enum Check<'a> {
    Resource(&'a ResourceCheck),
    Log(&'a LogCheck),
}

impl Check<'_> {
    pub fn evaluate<C: ClusterClient + ?Sized>(&self, client: &C) -> Result<(), CheckError> {
        match self {
            Self::Resource(check) => check.evaluate(client),
            Self::Log(check) => check.evaluate(client),
        }
    }
}

impl fmt::Display for Check<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Resource(check) => write!(
                f,
                "pod {}.{} is {}",
                check.name, check.namespace, check.status
            ),
            Self::Log(check) => write!(
                f,
                "log of {}.{} {:?} /{}/",
                check.name, check.namespace, check.operator, check.regex
            ),
        }
    }
}

impl ValidationSpec {
    /// All checks of one round: pod checks first, then log checks, each in
    /// declaration order.
    pub fn checks(&self) -> impl Iterator<Item = Check<'_>> {
        self.check_pods
            .iter()
            .map(Check::Resource)
            .chain(self.check_logs.iter().map(Check::Log))
    }
}
