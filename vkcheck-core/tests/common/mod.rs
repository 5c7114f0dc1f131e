use std::sync::Once;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};
use vkcheck_core::{MockClock, RunnerConfig, ValidationRunner, ValidationSpec};

static INIT: Once = Once::new();

pub fn init_test_logging() {
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"));

        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_test_writer()
                    .with_target(true)
                    .with_file(true)
                    .with_line_number(true),
            )
            .with(filter)
            .init();
    });
}

/// Runner on virtual time with the default one-second backoff.
#[allow(dead_code)]
pub fn mock_runner() -> (ValidationRunner<MockClock>, MockClock) {
    let clock = MockClock::new();
    let runner = ValidationRunner::with_clock(RunnerConfig::default(), clock.clone());
    (runner, clock)
}

#[allow(dead_code)]
pub fn spec(yaml: &str) -> ValidationSpec {
    ValidationSpec::from_yaml_str(yaml).expect("test scenario should parse")
}
