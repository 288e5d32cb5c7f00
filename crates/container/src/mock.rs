//! An in-memory `ContainerRuntime` double, used by the step runner's and task
//! executor's own test suites so end-to-end scenarios run without a real
//! `docker` binary. Shipped as a small, unconditionally public test double
//! alongside the real implementation rather than gated behind
//! `#[cfg(test)]`, so downstream crates can reuse it in their own tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use crate::error::Result;
use crate::runtime::{ContainerRuntime, RunOutcome, RunSpec};

/// A scripted response for one `run` invocation, keyed by call index.
pub type RunHandler = Box<dyn Fn(&RunSpec) -> Result<RunOutcome> + Send + Sync>;

/// Records every `run` invocation and answers them from a caller-supplied
/// handler, so tests can assert exactly how many containers would have been
/// started.
#[derive(Default)]
pub struct MockContainerRuntime {
    handler: Mutex<Option<RunHandler>>,
    run_count: AtomicUsize,
    volumes: Mutex<HashMap<String, ()>>,
}

impl MockContainerRuntime {
    /// A runtime whose every `run` call succeeds with exit code 0 and empty output.
    #[must_use]
    pub fn always_succeeds() -> Self {
        Self::with_handler(|_| {
            Ok(RunOutcome {
                exit_code: 0,
                stdout: Vec::new(),
                stderr: Vec::new(),
                timed_out: false,
                cancelled: false,
            })
        })
    }

    /// A runtime whose `run` calls are answered by `handler`.
    pub fn with_handler(
        handler: impl Fn(&RunSpec) -> Result<RunOutcome> + Send + Sync + 'static,
    ) -> Self {
        Self {
            handler: Mutex::new(Some(Box::new(handler))),
            run_count: AtomicUsize::new(0),
            volumes: Mutex::new(HashMap::new()),
        }
    }

    /// How many times [`ContainerRuntime::run`] has been called.
    #[must_use]
    pub fn run_count(&self) -> usize {
        self.run_count.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl ContainerRuntime for MockContainerRuntime {
    async fn version(&self) -> Result<String> {
        Ok("mock-runtime/0.0".to_string())
    }

    async fn image_id(&self, image: &str) -> Result<String> {
        Ok(format!("sha256:mock-{image}"))
    }

    async fn run(
        &self,
        spec: RunSpec,
        _deadline: Option<Duration>,
        _cancel: &tokio_util::sync::CancellationToken,
    ) -> Result<RunOutcome> {
        self.run_count.fetch_add(1, Ordering::SeqCst);
        let guard = self.handler.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        match guard.as_ref() {
            Some(handler) => handler(&spec),
            None => Ok(RunOutcome {
                exit_code: 0,
                stdout: Vec::new(),
                stderr: Vec::new(),
                timed_out: false,
                cancelled: false,
            }),
        }
    }

    async fn volume_create(&self, name: &str) -> Result<()> {
        self.volumes
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .insert(name.to_string(), ());
        Ok(())
    }

    async fn volume_remove(&self, name: &str) -> Result<()> {
        self.volumes
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .remove(name);
        Ok(())
    }
}
