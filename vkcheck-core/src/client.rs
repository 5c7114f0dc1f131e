//! Narrow capability interface to the cluster-management API.
//!
//! The engine never talks to the API server directly; it reads pod status and
//! logs and deletes objects through [`ClusterClient`], and acquires a client
//! for a bounded scope through [`ClusterConnector`].

use crate::errors::ClientError;
use crate::model::{Cleanable, PodPhase};

/// Observed state of a pod.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PodStatus {
    pub phase: PodPhase,
    /// The pod's `status` object as YAML (conditions, container states,
    /// reason and message), kept for failure reports.
    pub snapshot: String,
}

/// Operations the validation engine consumes from the cluster.
pub trait ClusterClient {
    fn read_pod_status(&self, name: &str, namespace: &str) -> Result<PodStatus, ClientError>;

    fn read_pod_log(
        &self,
        name: &str,
        namespace: &str,
        container: Option<&str>,
    ) -> Result<String, ClientError>;

    fn delete_pod(&self, name: &str, namespace: &str) -> Result<(), ClientError>;

    fn delete_namespace(&self, name: &str) -> Result<(), ClientError>;

    fn delete_service(&self, name: &str, namespace: &str) -> Result<(), ClientError>;

    fn delete_config_map(&self, name: &str, namespace: &str) -> Result<(), ClientError>;

    fn delete_secret(&self, name: &str, namespace: &str) -> Result<(), ClientError>;

    fn list_namespaces(&self) -> Result<Vec<String>, ClientError>;

    fn list_nodes(&self) -> Result<Vec<String>, ClientError>;
}

/// Deletion function for a namespaced kind.
pub type NamespacedDelete<C> = fn(&C, &str, &str) -> Result<(), ClientError>;

/// Statically known deletion entry point for each [`Cleanable`] kind.
pub enum Deleter<C: ?Sized> {
    Cluster(fn(&C, &str) -> Result<(), ClientError>),
    Namespaced(NamespacedDelete<C>),
}

/// Select the delete operation for a kind.
pub fn deleter_for<C: ClusterClient + ?Sized>(kind: Cleanable) -> Deleter<C> {
    match kind {
        Cleanable::Namespace => Deleter::Cluster(C::delete_namespace),
        Cleanable::Pod => Deleter::Namespaced(C::delete_pod),
        Cleanable::Service => Deleter::Namespaced(C::delete_service),
        Cleanable::ConfigMap => Deleter::Namespaced(C::delete_config_map),
        Cleanable::Secret => Deleter::Namespaced(C::delete_secret),
    }
}

/// Scoped acquisition of a cluster client.
///
/// A client is obtained at the start of every polling round and once more for
/// cleanup; it is dropped at the end of each scope and never held across a
/// backoff pause.
pub trait ClusterConnector {
    type Client: ClusterClient;

    fn connect(&self) -> Result<Self::Client, ClientError>;
}
