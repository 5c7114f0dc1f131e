//! `kubectl`-backed implementation of the cluster capability interface.
//!
//! Every operation is a blocking `kubectl` invocation. Deletions pass
//! `--ignore-not-found`, so deleting an absent object succeeds.

use std::io::Write;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::sync::OnceLock;

use regex::Regex;
use tracing::{debug, trace};

use crate::client::{ClusterClient, ClusterConnector, PodStatus};
use crate::errors::ClientError;
use crate::model::PodPhase;

/// Default kubectl binary name, resolved through `PATH`.
pub const DEFAULT_KUBECTL: &str = "kubectl";

/// How to reach the cluster through kubectl.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KubectlSettings {
    /// Binary name or path.
    pub binary: String,
    /// Explicit kubeconfig; `None` lets kubectl use in-cluster config or its defaults.
    pub kubeconfig: Option<PathBuf>,
    /// Context to select from the kubeconfig.
    pub context: Option<String>,
}

impl Default for KubectlSettings {
    fn default() -> Self {
        Self {
            binary: DEFAULT_KUBECTL.to_string(),
            kubeconfig: None,
            context: None,
        }
    }
}

/// Resolves the kubectl binary and hands out clients.
#[derive(Debug, Clone)]
pub struct KubectlConnector {
    settings: KubectlSettings,
}

impl KubectlConnector {
    pub fn new(settings: KubectlSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &KubectlSettings {
        &self.settings
    }
}

impl ClusterConnector for KubectlConnector {
    type Client = KubectlClient;

    fn connect(&self) -> Result<KubectlClient, ClientError> {
        let binary = which::which(&self.settings.binary).map_err(|e| {
            ClientError::Connect(format!("cannot locate {}: {e}", self.settings.binary))
        })?;
        if let Some(path) = &self.settings.kubeconfig
            && !path.exists()
        {
            return Err(ClientError::Connect(format!(
                "kubeconfig not found: {}",
                path.display()
            )));
        }
        trace!(binary = %binary.display(), "kubectl client acquired");
        Ok(KubectlClient {
            binary,
            kubeconfig: self.settings.kubeconfig.clone(),
            context: self.settings.context.clone(),
        })
    }
}

/// A resolved kubectl invocation context.
#[derive(Debug, Clone)]
pub struct KubectlClient {
    binary: PathBuf,
    kubeconfig: Option<PathBuf>,
    context: Option<String>,
}

impl KubectlClient {
    fn global_args(&self) -> Vec<String> {
        let mut args = Vec::new();
        if let Some(path) = &self.kubeconfig {
            args.push(format!("--kubeconfig={}", path.display()));
        }
        if let Some(context) = &self.context {
            args.push(format!("--context={context}"));
        }
        args
    }

    fn run(&self, args: &[String], stdin: Option<&str>) -> Result<String, ClientError> {
        let program = self.binary.display().to_string();
        let mut cmd = Command::new(&self.binary);
        cmd.args(self.global_args())
            .args(args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .stdin(if stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            });

        debug!(args = %args.join(" "), "Running kubectl");
        let spawn_err = |source| ClientError::Spawn {
            program: program.clone(),
            source,
        };
        let mut child = cmd.spawn().map_err(spawn_err)?;
        if let Some(input) = stdin
            && let Some(mut pipe) = child.stdin.take()
        {
            pipe.write_all(input.as_bytes()).map_err(spawn_err)?;
        }
        let output = child.wait_with_output().map_err(spawn_err)?;

        if output.status.success() {
            return Ok(String::from_utf8_lossy(&output.stdout).into_owned());
        }
        let stderr = String::from_utf8_lossy(&output.stderr);
        Err(classify_failure(
            &program,
            output.status.code().unwrap_or(-1),
            &stderr,
        ))
    }

    /// Create or update the objects of a rendered manifest.
    pub fn apply_manifest(&self, manifest: &str) -> Result<String, ClientError> {
        self.run(&strings(&["apply", "-f", "-"]), Some(manifest))
    }

    fn delete(&self, kind: &str, name: &str, namespace: Option<&str>) -> Result<(), ClientError> {
        self.run(&delete_args(kind, name, namespace), None).map(|_| ())
    }

    fn list_names(&self, resource: &str) -> Result<Vec<String>, ClientError> {
        let out = self.run(
            &strings(&["get", resource, "-o", "jsonpath={.items[*].metadata.name}"]),
            None,
        )?;
        Ok(out.split_whitespace().map(str::to_string).collect())
    }
}

impl ClusterClient for KubectlClient {
    fn read_pod_status(&self, name: &str, namespace: &str) -> Result<PodStatus, ClientError> {
        let out = self.run(
            &strings(&["get", "pod", name, "-n", namespace, "-o", "yaml"]),
            None,
        )?;
        parse_pod_status(&out)
    }

    fn read_pod_log(
        &self,
        name: &str,
        namespace: &str,
        container: Option<&str>,
    ) -> Result<String, ClientError> {
        self.run(&log_args(name, namespace, container), None)
    }

    fn delete_pod(&self, name: &str, namespace: &str) -> Result<(), ClientError> {
        self.delete("pod", name, Some(namespace))
    }

    fn delete_namespace(&self, name: &str) -> Result<(), ClientError> {
        self.delete("namespace", name, None)
    }

    fn delete_service(&self, name: &str, namespace: &str) -> Result<(), ClientError> {
        self.delete("service", name, Some(namespace))
    }

    fn delete_config_map(&self, name: &str, namespace: &str) -> Result<(), ClientError> {
        self.delete("configmap", name, Some(namespace))
    }

    fn delete_secret(&self, name: &str, namespace: &str) -> Result<(), ClientError> {
        self.delete("secret", name, Some(namespace))
    }

    fn list_namespaces(&self) -> Result<Vec<String>, ClientError> {
        self.list_names("namespaces")
    }

    fn list_nodes(&self) -> Result<Vec<String>, ClientError> {
        self.list_names("nodes")
    }
}

fn strings(args: &[&str]) -> Vec<String> {
    args.iter().map(|arg| (*arg).to_string()).collect()
}

fn log_args(name: &str, namespace: &str, container: Option<&str>) -> Vec<String> {
    let mut args = strings(&["logs", name, "-n", namespace]);
    if let Some(container) = container {
        args.push("-c".to_string());
        args.push(container.to_string());
    }
    args.push("--insecure-skip-tls-verify-backend".to_string());
    args
}

fn delete_args(kind: &str, name: &str, namespace: Option<&str>) -> Vec<String> {
    let mut args = strings(&["delete", kind, name]);
    if let Some(namespace) = namespace {
        args.push("-n".to_string());
        args.push(namespace.to_string());
    }
    args.push("--ignore-not-found".to_string());
    args.push("--wait=false".to_string());
    args
}

/// A pod without a reported phase is treated as `Unknown`.
fn parse_phase(raw: &str) -> Result<PodPhase, ClientError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(PodPhase::Unknown);
    }
    trimmed.parse().map_err(ClientError::MalformedResponse)
}

/// Extract the phase and the `status` object from `kubectl get pod -o yaml`.
fn parse_pod_status(raw: &str) -> Result<PodStatus, ClientError> {
    let pod: serde_yaml_ng::Value = serde_yaml_ng::from_str(raw)
        .map_err(|e| ClientError::MalformedResponse(format!("pod is not valid YAML: {e}")))?;
    let Some(status) = pod.get("status") else {
        return Ok(PodStatus {
            phase: PodPhase::Unknown,
            snapshot: String::new(),
        });
    };
    let phase = parse_phase(status.get("phase").and_then(|p| p.as_str()).unwrap_or(""))?;
    let snapshot = serde_yaml_ng::to_string(status)
        .map_err(|e| ClientError::MalformedResponse(e.to_string()))?;
    Ok(PodStatus { phase, snapshot })
}

fn server_error_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?m)^Error from server \(([^)]+)\):\s*(.*)$").expect("static regex is valid")
    })
}

fn classify_failure(program: &str, status: i32, stderr: &str) -> ClientError {
    if let Some(caps) = server_error_regex().captures(stderr) {
        return ClientError::api(&caps[1], caps[2].trim());
    }
    ClientError::CommandFailed {
        program: program.to_string(),
        status,
        stderr: stderr.trim().to_string(),
    }
}
