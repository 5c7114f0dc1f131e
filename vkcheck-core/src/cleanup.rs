//! Conditional deletion of scenario resources after polling ends.

use tracing::{debug, info};

use crate::client::{ClusterClient, Deleter, deleter_for};
use crate::errors::ClientError;
use crate::model::CleanupAction;

/// What a cleanup action did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CleanupOutcome {
    Deleted,
    Skipped,
}

impl CleanupAction {
    /// Whether this action fires for the given run outcome.
    pub fn should_run(&self, succeeded: bool) -> bool {
        self.condition.applies(succeeded)
    }

    /// Delete the target if the condition holds for `succeeded`.
    ///
    /// Deleting an object that is already gone is the client's concern; it is
    /// never a reason to poll again.
    pub fn execute<C: ClusterClient + ?Sized>(
        &self,
        client: &C,
        succeeded: bool,
    ) -> Result<CleanupOutcome, ClientError> {
        if !self.should_run(succeeded) {
            debug!(object = %self.target(), condition = ?self.condition, succeeded, "Skipping cleanup");
            return Ok(CleanupOutcome::Skipped);
        }

        match deleter_for::<C>(self.kind) {
            Deleter::Cluster(delete) => delete(client, &self.name)?,
            Deleter::Namespaced(delete) => {
                let namespace = self.namespace.as_deref().ok_or_else(|| {
                    ClientError::MalformedResponse(format!(
                        "{} {} has no namespace",
                        self.kind, self.name
                    ))
                })?;
                delete(client, &self.name, namespace)?
            }
        }
        info!(object = %self.target(), "Deleted");
        Ok(CleanupOutcome::Deleted)
    }
}
