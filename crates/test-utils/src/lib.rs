pub mod builders;
pub mod fake_dispatcher;

use std::sync::Once;
use tracing_subscriber::{EnvFilter, fmt};

use taskgrid::engine::{CoreCommand, CoreRuntime, RuntimeOptions};
use taskgrid::exec::Job;
use taskgrid::resources::worker::Worker;
use taskgrid::scheduler::build_policy;
use taskgrid::types::PolicyKind;

static INIT: Once = Once::new();

/// Initialise tracing for tests.
///
/// - Uses `with_test_writer()`, so logs are captured per-test.
/// - The Rust test harness only prints captured output for **failing** tests
///   (unless you run with `-- --nocapture`).
///
/// Enable levels with e.g.:
/// `RUST_LOG=debug cargo test`
pub fn init_tracing() {
    INIT.call_once(|| {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .with_target(true)
            .init();
    });
}

/// Run a future with a 5-second timeout.
#[allow(dead_code)]
pub async fn with_timeout<F, T>(f: F) -> T
where
    F: std::future::Future<Output = T>,
{
    tokio::time::timeout(std::time::Duration::from_secs(5), f)
        .await
        .expect("Test timed out after 5 seconds")
}

/// A core with the given policy, default options and `workers` registered.
pub fn core_with_workers(policy: PolicyKind, workers: Vec<Worker>) -> CoreRuntime {
    core_with_options(policy, RuntimeOptions::default(), workers)
}

pub fn core_with_options(
    policy: PolicyKind,
    options: RuntimeOptions,
    workers: Vec<Worker>,
) -> CoreRuntime {
    workers
        .into_iter()
        .fold(CoreRuntime::new(build_policy(policy), options), |core, w| {
            core.with_worker(w)
        })
}

/// Jobs dispatched by a batch of core commands, in emission order.
pub fn dispatched(commands: &[CoreCommand]) -> Vec<&Job> {
    commands
        .iter()
        .filter_map(|c| match c {
            CoreCommand::Dispatch(job) => Some(job),
            _ => None,
        })
        .collect()
}
