mod common;

use std::thread;
use std::time::{Duration, Instant};

use common::{init_test_logging, mock_runner, spec};
use tracing::info;
use vkcheck_core::{
    BackoffPolicy, CancellationToken, Cleanable, Clock, MockClock, MockCluster, MockConnector,
    PodPhase, RunnerConfig, ValidationError, ValidationRunner,
};

const POD_SUCCEEDS: &str = r#"
timeout_seconds: 10
check_pods:
  - {name: demo, namespace: default, status: Succeeded}
clean_configs:
  - {type: pod, name: demo, namespace: default, condition: onSuccess}
  - {type: secret, name: demo-creds, namespace: default, condition: onFailure}
  - {type: namespace, name: scratch, condition: always}
  - {type: service, name: demo, namespace: default, condition: never}
"#;

fn deleted_kinds(cluster: &MockCluster) -> Vec<Cleanable> {
    cluster.deletions().iter().map(|call| call.kind).collect()
}

#[test]
fn test_pod_reaches_expected_phase_on_second_poll() {
    init_test_logging();
    info!(test = "test_pod_reaches_expected_phase_on_second_poll", phase = "setup");

    let cluster = MockCluster::new();
    cluster.script_phases("demo", "default", &[PodPhase::Pending, PodPhase::Succeeded]);
    let connector = MockConnector::new(cluster.clone());
    let (runner, clock) = mock_runner();

    let summary = runner.run(&spec(POD_SUCCEEDS), &connector).unwrap();

    assert_eq!(summary.rounds, 2);
    assert_eq!(summary.elapsed, Duration::from_secs(1));
    assert_eq!(clock.sleeps(), vec![Duration::from_secs(1)]);
    assert_eq!(summary.cleanup_deleted, 2);
    assert_eq!(summary.cleanup_skipped, 2);
    assert_eq!(deleted_kinds(&cluster), vec![Cleanable::Pod, Cleanable::Namespace]);
}

#[test]
fn test_failed_pod_is_fatal_without_retry() {
    init_test_logging();

    let cluster = MockCluster::new();
    cluster.script_phases("demo", "default", &[PodPhase::Failed, PodPhase::Succeeded]);
    let connector = MockConnector::new(cluster.clone());
    let (runner, clock) = mock_runner();

    let err = runner.run(&spec(POD_SUCCEEDS), &connector).unwrap_err();

    match &err {
        ValidationError::Fatal { title, description } => {
            assert_eq!(title, "Pod demo.default failed");
            assert!(description.contains("Failed"));
        }
        other => panic!("expected fatal, got {other:?}"),
    }
    assert_eq!(err.exit_code(), 1);
    assert_eq!(cluster.phase_reads(), 1);
    assert!(clock.sleeps().is_empty());
    assert_eq!(deleted_kinds(&cluster), vec![Cleanable::Secret, Cleanable::Namespace]);
}

#[test]
fn test_log_overshoot_is_fatal_on_first_evaluation() {
    init_test_logging();

    let cluster = MockCluster::new();
    cluster.script_logs("job", "batch", None, &["step done\nstep done\nstep done\n"]);
    let connector = MockConnector::new(cluster.clone());
    let (runner, clock) = mock_runner();

    let scenario = spec(
        r#"
check_logs:
  - {name: job, namespace: batch, regex: "step done", operator: CountExactly, value: 2}
"#,
    );
    let err = runner.run(&scenario, &connector).unwrap_err();

    assert!(err.is_fatal());
    assert!(err.to_string().contains("Found too many occurrences of step done"));
    assert_eq!(cluster.log_reads(), 1);
    assert!(clock.sleeps().is_empty());
}

#[test]
fn test_missing_log_line_times_out() {
    init_test_logging();

    let cluster = MockCluster::new();
    cluster.script_logs("job", "batch", None, &["booting\n", "still booting\n"]);
    let connector = MockConnector::new(cluster.clone());
    let (runner, clock) = mock_runner();

    let scenario = spec(
        r#"
timeout_seconds: 2
check_logs:
  - {name: job, namespace: batch, regex: "ready"}
clean_configs:
  - {type: pod, name: job, namespace: batch}
"#,
    );
    let err = runner.run(&scenario, &connector).unwrap_err();

    assert!(err.is_timeout());
    assert_eq!(err.to_string(), "Validation failed after 2 seconds");
    assert_eq!(err.exit_code(), 2);
    assert_eq!(clock.sleeps(), vec![Duration::from_secs(1); 2]);
    assert_eq!(cluster.log_reads(), 2);
    assert_eq!(deleted_kinds(&cluster), vec![Cleanable::Pod]);
}

#[test]
fn test_empty_spec_succeeds_in_one_round() {
    init_test_logging();

    let connector = MockConnector::new(MockCluster::new());
    let (runner, clock) = mock_runner();

    let summary = runner.run(&spec(""), &connector).unwrap();

    assert_eq!(summary.rounds, 1);
    assert_eq!(summary.elapsed, Duration::ZERO);
    assert!(clock.sleeps().is_empty());
    // One round; no cleanup actions means no cleanup connection.
    assert_eq!(connector.connections(), 1);
}

#[test]
fn test_always_cleanup_runs_once_for_every_outcome() {
    init_test_logging();

    for final_phase in [PodPhase::Succeeded, PodPhase::Failed] {
        let cluster = MockCluster::new();
        cluster.script_phases("demo", "default", &[final_phase]);
        let connector = MockConnector::new(cluster.clone());
        let (runner, _clock) = mock_runner();

        let scenario = spec(
            r#"
check_pods: [{name: demo, namespace: default}]
clean_configs:
  - {type: config_map, name: settings, namespace: default, condition: always}
  - {type: service, name: demo, namespace: default, condition: never}
"#,
        );
        let _ = runner.run(&scenario, &connector);

        let deletions = cluster.deletions();
        assert_eq!(deletions.len(), 1, "{final_phase}");
        assert_eq!(deletions[0].kind, Cleanable::ConfigMap);
    }
}

#[test]
fn test_cleanup_failure_keeps_original_outcome() {
    init_test_logging();

    let cluster = MockCluster::new();
    cluster.fail_delete(Cleanable::Pod, "job");
    let connector = MockConnector::new(cluster.clone());
    let (runner, _clock) = mock_runner();

    let scenario = spec(
        r#"
timeout_seconds: 1
check_logs: [{name: job, namespace: batch, regex: never-printed}]
clean_configs:
  - {type: pod, name: job, namespace: batch}
  - {type: namespace, name: batch}
"#,
    );
    let err = runner.run(&scenario, &connector).unwrap_err();

    assert_eq!(err.exit_code(), 4);
    match &err {
        ValidationError::Cleanup { failures, original } => {
            assert_eq!(failures.len(), 1);
            assert_eq!(failures[0].target, "pod batch/job");
            assert!(original.as_deref().is_some_and(ValidationError::is_timeout));
        }
        other => panic!("expected cleanup aggregate, got {other:?}"),
    }
    assert!(err.is_timeout());
    let rendered = err.to_string();
    assert!(rendered.contains("Validation failed after 1 seconds"), "{rendered}");
    // The failing pod deletion does not stop the namespace deletion.
    assert_eq!(deleted_kinds(&cluster), vec![Cleanable::Namespace]);
}

#[test]
fn test_cleanup_failure_after_success() {
    init_test_logging();

    let cluster = MockCluster::new();
    cluster.script_phases("demo", "default", &[PodPhase::Succeeded]);
    cluster.fail_delete(Cleanable::Namespace, "scratch");
    let connector = MockConnector::new(cluster);
    let (runner, _clock) = mock_runner();

    let err = runner.run(&spec(POD_SUCCEEDS), &connector).unwrap_err();
    assert!(matches!(
        err,
        ValidationError::Cleanup { ref failures, original: None } if failures.len() == 1
    ));
}

#[test]
fn test_client_error_bypasses_retry_but_cleans_up() {
    init_test_logging();

    let cluster = MockCluster::new();
    cluster.fail_reads("demo", "default", "etcd unavailable");
    let connector = MockConnector::new(cluster.clone());
    let (runner, clock) = mock_runner();

    let err = runner.run(&spec(POD_SUCCEEDS), &connector).unwrap_err();

    assert!(matches!(err, ValidationError::Client(_)));
    assert_eq!(err.exit_code(), 3);
    assert!(clock.sleeps().is_empty());
    assert_eq!(deleted_kinds(&cluster), vec![Cleanable::Secret, Cleanable::Namespace]);
}

#[test]
fn test_deleting_absent_objects_does_not_poll_again() {
    init_test_logging();

    let cluster = MockCluster::new();
    let connector = MockConnector::new(cluster.clone());
    let (runner, _clock) = mock_runner();

    let scenario = spec(
        r#"
clean_configs:
  - {type: pod, name: never-created, namespace: default}
  - {type: pod, name: never-created, namespace: default}
"#,
    );
    let summary = runner.run(&scenario, &connector).unwrap();

    assert_eq!(summary.rounds, 1);
    assert_eq!(summary.cleanup_deleted, 2);
    assert_eq!(cluster.phase_reads() + cluster.log_reads(), 0);
}

#[test]
fn test_fatal_short_circuits_rest_of_round() {
    init_test_logging();

    let cluster = MockCluster::new();
    cluster.script_phases("demo", "default", &[PodPhase::Failed]);
    let connector = MockConnector::new(cluster.clone());
    let (runner, _clock) = mock_runner();

    let scenario = spec(
        r#"
check_pods: [{name: demo, namespace: default}]
check_logs: [{name: demo, namespace: default, regex: done}]
"#,
    );
    assert!(runner.run(&scenario, &connector).unwrap_err().is_fatal());
    assert_eq!(cluster.log_reads(), 0);
}

#[test]
fn test_recoverable_failure_restarts_every_check() {
    init_test_logging();

    let cluster = MockCluster::new();
    cluster
        .script_phases("a", "default", &[PodPhase::Running])
        .script_phases("b", "default", &[PodPhase::Pending, PodPhase::Running]);
    let connector = MockConnector::new(cluster.clone());
    let (runner, _clock) = mock_runner();

    let scenario = spec(
        r#"
check_pods:
  - {name: a, namespace: default, status: Running}
  - {name: b, namespace: default, status: Running}
"#,
    );
    let summary = runner.run(&scenario, &connector).unwrap();

    assert_eq!(summary.rounds, 2);
    // a is re-read in round two even though it passed in round one.
    assert_eq!(cluster.phase_reads(), 4);
}

#[test]
fn test_timeout_multiplier_extends_budget_but_not_message() {
    init_test_logging();

    let connector = MockConnector::new(MockCluster::new());
    let clock = MockClock::new();
    let config = RunnerConfig {
        timeout_multiplier: 3.0,
        ..Default::default()
    };
    let runner = ValidationRunner::with_clock(config, clock.clone());

    let scenario = spec("timeout_seconds: 2\ncheck_logs: [{name: p, namespace: d, regex: x}]");
    let err = runner.run(&scenario, &connector).unwrap_err();

    assert_eq!(clock.elapsed(), Duration::from_secs(6));
    assert_eq!(err.to_string(), "Validation failed after 2 seconds");
}

#[test]
fn test_exponential_backoff_between_rounds() {
    init_test_logging();

    let connector = MockConnector::new(MockCluster::new());
    let clock = MockClock::new();
    let config = RunnerConfig {
        backoff: BackoffPolicy::exponential(Duration::from_secs(1), Duration::from_secs(4)),
        ..Default::default()
    };
    let runner = ValidationRunner::with_clock(config, clock.clone());

    let scenario = spec("timeout_seconds: 12\ncheck_logs: [{name: p, namespace: d, regex: x}]");
    runner.run(&scenario, &connector).unwrap_err();

    let secs: Vec<u64> = clock.sleeps().iter().map(Duration::as_secs).collect();
    assert_eq!(secs, vec![1, 2, 4, 4, 4]);
}

/// Cancels its token the first time the runner backs off.
#[derive(Clone)]
struct CancelOnSleep {
    inner: MockClock,
    token: CancellationToken,
}

impl Clock for CancelOnSleep {
    fn now(&self) -> Instant {
        self.inner.now()
    }

    fn sleep(&self, duration: Duration, cancel: &CancellationToken) {
        self.token.cancel();
        self.inner.sleep(duration, cancel);
    }
}

#[test]
fn test_cancellation_during_backoff() {
    init_test_logging();

    let cluster = MockCluster::new();
    let connector = MockConnector::new(cluster.clone());
    let config = RunnerConfig::default();
    let clock = CancelOnSleep {
        inner: MockClock::new(),
        token: config.cancellation.clone(),
    };
    let runner = ValidationRunner::with_clock(config, clock);

    let scenario = spec(
        r#"
check_logs: [{name: p, namespace: d, regex: x}]
clean_configs: [{type: namespace, name: d, condition: onFailure}]
"#,
    );
    let err = runner.run(&scenario, &connector).unwrap_err();

    assert!(matches!(err, ValidationError::Cancelled { rounds: 1 }));
    assert_eq!(err.exit_code(), 130);
    assert_eq!(deleted_kinds(&cluster), vec![Cleanable::Namespace]);
}

#[test]
fn test_cancellation_interrupts_real_sleep() {
    init_test_logging();

    let connector = MockConnector::new(MockCluster::new());
    let config = RunnerConfig {
        backoff: BackoffPolicy::fixed(Duration::from_secs(30)),
        ..Default::default()
    };
    let token = config.cancellation.clone();
    let runner = ValidationRunner::new(config);

    let canceller = thread::spawn(move || {
        thread::sleep(Duration::from_millis(50));
        token.cancel();
    });

    let started = Instant::now();
    let scenario = spec("check_logs: [{name: p, namespace: d, regex: x}]");
    let err = runner.run(&scenario, &connector).unwrap_err();
    canceller.join().unwrap();

    assert!(matches!(err, ValidationError::Cancelled { .. }));
    assert!(started.elapsed() < Duration::from_secs(10));
}
