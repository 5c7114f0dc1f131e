//! Deterministic in-memory cluster for tests.
//!
//! Pod phases and logs are scripted as sequences: each read consumes the front
//! entry until only one remains, which then sticks. Deletions are recorded
//! rather than applied, and any operation can be made to fail.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use crate::client::{ClusterClient, ClusterConnector, PodStatus};
use crate::errors::ClientError;
use crate::model::{Cleanable, PodPhase};

type PodKey = (String, String);
type LogKey = (String, String, Option<String>);

/// A recorded delete call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteCall {
    pub kind: Cleanable,
    pub name: String,
    pub namespace: Option<String>,
}

#[derive(Debug, Default)]
struct MockState {
    phases: HashMap<PodKey, VecDeque<PodPhase>>,
    logs: HashMap<LogKey, VecDeque<String>>,
    snapshots: HashMap<PodKey, String>,
    read_failures: HashMap<PodKey, String>,
    delete_failures: HashSet<(Cleanable, String)>,
    deletions: Vec<DeleteCall>,
    phase_reads: u32,
    log_reads: u32,
    namespaces: Vec<String>,
    nodes: Vec<String>,
    list_failure: Option<String>,
}

fn next_scripted<T: Clone>(queue: &mut VecDeque<T>) -> Option<T> {
    if queue.len() > 1 {
        queue.pop_front()
    } else {
        queue.front().cloned()
    }
}

fn key(name: &str, namespace: &str) -> PodKey {
    (name.to_string(), namespace.to_string())
}

/// Shared handle to a scripted cluster.
#[derive(Debug, Clone, Default)]
pub struct MockCluster {
    state: Arc<Mutex<MockState>>,
}

impl MockCluster {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.state.lock().expect("mock cluster mutex poisoned")
    }

    /// Script the phases a pod reports on successive reads.
    pub fn script_phases(&self, name: &str, namespace: &str, phases: &[PodPhase]) -> &Self {
        self.state()
            .phases
            .insert(key(name, namespace), phases.iter().copied().collect());
        self
    }

    /// Script the log text a pod (or one of its containers) returns on successive reads.
    /// Status snapshot reported alongside the scripted phase. Without one the
    /// snapshot is just the phase line.
    pub fn script_status(&self, name: &str, namespace: &str, snapshot: &str) -> &Self {
        self.state()
            .snapshots
            .insert(key(name, namespace), snapshot.to_string());
        self
    }

    pub fn script_logs<S: AsRef<str>>(
        &self,
        name: &str,
        namespace: &str,
        container: Option<&str>,
        logs: &[S],
    ) -> &Self {
        let key = (
            name.to_string(),
            namespace.to_string(),
            container.map(str::to_string),
        );
        self.state()
            .logs
            .insert(key, logs.iter().map(|l| l.as_ref().to_string()).collect());
        self
    }

    /// Make every read of a pod fail with an API error.
    pub fn fail_reads(&self, name: &str, namespace: &str, message: &str) -> &Self {
        self.state()
            .read_failures
            .insert(key(name, namespace), message.to_string());
        self
    }

    /// Make deletion of one object fail.
    pub fn fail_delete(&self, kind: Cleanable, name: &str) -> &Self {
        self.state()
            .delete_failures
            .insert((kind, name.to_string()));
        self
    }

    pub fn set_namespaces(&self, namespaces: &[&str]) -> &Self {
        self.state().namespaces = namespaces.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn set_nodes(&self, nodes: &[&str]) -> &Self {
        self.state().nodes = nodes.iter().map(|s| s.to_string()).collect();
        self
    }

    /// Make namespace and node listing fail.
    pub fn fail_listing(&self, message: &str) -> &Self {
        self.state().list_failure = Some(message.to_string());
        self
    }

    fn check_listing(&self, state: &MockState) -> Result<(), ClientError> {
        match &state.list_failure {
            Some(message) => Err(ClientError::api("Forbidden", message.clone())),
            None => Ok(()),
        }
    }

    /// Snapshot of all delete calls received.
    pub fn deletions(&self) -> Vec<DeleteCall> {
        self.state().deletions.clone()
    }

    pub fn phase_reads(&self) -> u32 {
        self.state().phase_reads
    }

    pub fn log_reads(&self) -> u32 {
        self.state().log_reads
    }

    fn check_read(&self, state: &MockState, name: &str, namespace: &str) -> Result<(), ClientError> {
        match state.read_failures.get(&key(name, namespace)) {
            Some(message) => Err(ClientError::api("InternalError", message.clone())),
            None => Ok(()),
        }
    }

    fn record_delete(
        &self,
        kind: Cleanable,
        name: &str,
        namespace: Option<&str>,
    ) -> Result<(), ClientError> {
        let mut state = self.state();
        if state.delete_failures.contains(&(kind, name.to_string())) {
            return Err(ClientError::api(
                "Forbidden",
                format!("cannot delete {kind} {name}"),
            ));
        }
        state.deletions.push(DeleteCall {
            kind,
            name: name.to_string(),
            namespace: namespace.map(str::to_string),
        });
        Ok(())
    }
}

impl ClusterClient for MockCluster {
    fn read_pod_status(&self, name: &str, namespace: &str) -> Result<PodStatus, ClientError> {
        let mut state = self.state();
        state.phase_reads += 1;
        self.check_read(&state, name, namespace)?;
        let key = key(name, namespace);
        let phase = state
            .phases
            .get_mut(&key)
            .and_then(next_scripted)
            .ok_or_else(|| ClientError::api("NotFound", format!("pods \"{name}\" not found")))?;
        let snapshot = state
            .snapshots
            .get(&key)
            .cloned()
            .unwrap_or_else(|| format!("phase: {phase}\n"));
        Ok(PodStatus { phase, snapshot })
    }

    fn read_pod_log(
        &self,
        name: &str,
        namespace: &str,
        container: Option<&str>,
    ) -> Result<String, ClientError> {
        let mut state = self.state();
        state.log_reads += 1;
        self.check_read(&state, name, namespace)?;
        let key = (
            name.to_string(),
            namespace.to_string(),
            container.map(str::to_string),
        );
        Ok(state
            .logs
            .get_mut(&key)
            .and_then(next_scripted)
            .unwrap_or_default())
    }

    fn delete_pod(&self, name: &str, namespace: &str) -> Result<(), ClientError> {
        self.record_delete(Cleanable::Pod, name, Some(namespace))
    }

    fn delete_namespace(&self, name: &str) -> Result<(), ClientError> {
        self.record_delete(Cleanable::Namespace, name, None)
    }

    fn delete_service(&self, name: &str, namespace: &str) -> Result<(), ClientError> {
        self.record_delete(Cleanable::Service, name, Some(namespace))
    }

    fn delete_config_map(&self, name: &str, namespace: &str) -> Result<(), ClientError> {
        self.record_delete(Cleanable::ConfigMap, name, Some(namespace))
    }

    fn delete_secret(&self, name: &str, namespace: &str) -> Result<(), ClientError> {
        self.record_delete(Cleanable::Secret, name, Some(namespace))
    }

    fn list_namespaces(&self) -> Result<Vec<String>, ClientError> {
        let state = self.state();
        self.check_listing(&state)?;
        Ok(state.namespaces.clone())
    }

    fn list_nodes(&self) -> Result<Vec<String>, ClientError> {
        let state = self.state();
        self.check_listing(&state)?;
        Ok(state.nodes.clone())
    }
}

/// Hands out clients backed by one [`MockCluster`] and counts connections.
#[derive(Debug, Clone, Default)]
pub struct MockConnector {
    cluster: MockCluster,
    connections: Arc<AtomicU32>,
    refuse_after: Option<u32>,
}

impl MockConnector {
    pub fn new(cluster: MockCluster) -> Self {
        Self {
            cluster,
            connections: Arc::new(AtomicU32::new(0)),
            refuse_after: None,
        }
    }

    /// Refuse every connection after the first `n` have been handed out.
    pub fn refuse_after(mut self, n: u32) -> Self {
        self.refuse_after = Some(n);
        self
    }

    pub fn cluster(&self) -> &MockCluster {
        &self.cluster
    }

    /// Connection attempts so far, successful or not.
    pub fn connections(&self) -> u32 {
        self.connections.load(Ordering::SeqCst)
    }
}

impl ClusterConnector for MockConnector {
    type Client = MockCluster;

    fn connect(&self) -> Result<MockCluster, ClientError> {
        let previous = self.connections.fetch_add(1, Ordering::SeqCst);
        match self.refuse_after {
            Some(limit) if previous >= limit => Err(ClientError::Connect(
                "mock connector refused connection".to_string(),
            )),
            _ => Ok(self.cluster.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scripted_phases_stick_on_last_value() {
        let cluster = MockCluster::new();
        cluster.script_phases("demo", "default", &[PodPhase::Pending, PodPhase::Running]);

        let phase = |c: &MockCluster| c.read_pod_status("demo", "default").unwrap().phase;
        assert_eq!(phase(&cluster), PodPhase::Pending);
        assert_eq!(phase(&cluster), PodPhase::Running);
        assert_eq!(phase(&cluster), PodPhase::Running);
        assert_eq!(cluster.phase_reads(), 3);
    }

    #[test]
    fn test_status_snapshot_defaults_to_phase() {
        let cluster = MockCluster::new();
        cluster.script_phases("demo", "default", &[PodPhase::Failed]);
        assert_eq!(
            cluster.read_pod_status("demo", "default").unwrap().snapshot,
            "phase: Failed\n"
        );

        cluster.script_status("demo", "default", "phase: Failed\nreason: Error\n");
        let status = cluster.read_pod_status("demo", "default").unwrap();
        assert_eq!(status.phase, PodPhase::Failed);
        assert!(status.snapshot.contains("reason: Error"));
    }

    #[test]
    fn test_unknown_pod_is_not_found() {
        let cluster = MockCluster::new();
        let err = cluster.read_pod_status("ghost", "default").unwrap_err();
        assert!(err.to_string().contains("NotFound"));
    }

    #[test]
    fn test_logs_scoped_by_container() {
        let cluster = MockCluster::new();
        cluster.script_logs("demo", "default", Some("sidecar"), &["sidecar output"]);

        assert_eq!(
            cluster.read_pod_log("demo", "default", Some("sidecar")).unwrap(),
            "sidecar output"
        );
        assert_eq!(cluster.read_pod_log("demo", "default", None).unwrap(), "");
    }

    #[test]
    fn test_deletions_recorded_and_failures_injected() {
        let cluster = MockCluster::new();
        cluster.fail_delete(Cleanable::Secret, "token");

        cluster.delete_pod("demo", "default").unwrap();
        cluster.delete_namespace("scratch").unwrap();
        assert!(cluster.delete_secret("token", "default").is_err());

        let deletions = cluster.deletions();
        assert_eq!(deletions.len(), 2);
        assert_eq!(deletions[0].kind, Cleanable::Pod);
        assert_eq!(deletions[1].namespace, None);
    }

    #[test]
    fn test_connector_counts_and_refuses() {
        let connector = MockConnector::new(MockCluster::new()).refuse_after(1);
        assert!(connector.connect().is_ok());
        assert!(matches!(connector.connect(), Err(ClientError::Connect(_))));
        assert_eq!(connector.connections(), 2);
    }
}
