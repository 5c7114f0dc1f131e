//! Pod phase assertion.

use tracing::trace;

use crate::client::{ClusterClient, PodStatus};
use crate::errors::CheckError;
use crate::model::{PodPhase, ResourceCheck};

impl ResourceCheck {
    /// Compare the live phase against the expected one.
    ///
    /// A pod that reached `Failed` when something else was expected can never
    /// recover, so that is fatal; any other mismatch is recoverable.
    pub fn evaluate<C: ClusterClient + ?Sized>(&self, client: &C) -> Result<(), CheckError> {
        let PodStatus { phase, snapshot } = client.read_pod_status(&self.name, &self.namespace)?;
        trace!(pod = %self.name, namespace = %self.namespace, %phase, expected = %self.status, "pod phase");

        if self.status != PodPhase::Failed && phase == PodPhase::Failed {
            return Err(CheckError::fatal(
                format!("Pod {}.{} failed", self.name, self.namespace),
                format!(
                    "phase: {phase} (expected {})\n{}",
                    self.status,
                    snapshot.trim_end()
                ),
            ));
        }
        if phase != self.status {
            return Err(CheckError::recoverable(format!(
                "Pod {}.{} is {phase}, waiting for {}",
                self.name, self.namespace, self.status
            )));
        }
        Ok(())
    }
}
