use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::{AgentError, Artifact, Evaluator, Improver, ImproverInput};

/// Bound an agent future by a timeout and a cancellation token.
///
/// On expiry or cancellation the inner future is dropped, which cancels the
/// underlying work at its next await point; callers get an explicit error,
/// never partial output.
async fn bounded<T>(
    fut: impl Future<Output = Result<T, AgentError>>,
    timeout: Duration,
    cancel: &CancellationToken,
) -> Result<T, AgentError> {
    tokio::select! {
        biased;

        _ = cancel.cancelled() => Err(AgentError::Cancelled),
        res = tokio::time::timeout(timeout, fut) => match res {
            Ok(inner) => inner,
            Err(_) => Err(AgentError::Timeout(timeout)),
        },
    }
}

/// Wraps an [`Improver`] with enforced timeout and cancellation
#[derive(Clone)]
pub struct ImproverAdapter {
    inner: Arc<dyn Improver>,
}

impl ImproverAdapter {
    pub fn new(inner: Arc<dyn Improver>) -> Self {
        Self { inner }
    }

    pub fn name(&self) -> &str {
        self.inner.name()
    }

    pub async fn invoke(
        &self,
        input: &ImproverInput,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<Artifact, AgentError> {
        debug!(agent = self.name(), ?timeout, "Invoking improver");
        let result = bounded(self.inner.improve(input), timeout, cancel).await;
        if let Err(ref e) = result {
            warn!(agent = self.name(), error = %e, "Improver call failed");
        }
        result
    }
}

/// Wraps an [`Evaluator`] with enforced timeout and cancellation
#[derive(Clone)]
pub struct EvaluatorAdapter {
    inner: Arc<dyn Evaluator>,
}

impl EvaluatorAdapter {
    pub fn new(inner: Arc<dyn Evaluator>) -> Self {
        Self { inner }
    }

    pub fn name(&self) -> &str {
        self.inner.name()
    }

    pub async fn invoke(
        &self,
        artifact: &Artifact,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<serde_json::Value, AgentError> {
        debug!(agent = self.name(), ?timeout, "Invoking evaluator");
        let result = bounded(self.inner.evaluate(artifact), timeout, cancel).await;
        if let Err(ref e) = result {
            warn!(agent = self.name(), error = %e, "Evaluator call failed");
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct SlowImprover {
        delay: Duration,
        finished: Arc<AtomicBool>,
    }

    #[async_trait]
    impl Improver for SlowImprover {
        fn name(&self) -> &str {
            "slow"
        }

        async fn improve(&self, _input: &ImproverInput) -> Result<Artifact, AgentError> {
            tokio::time::sleep(self.delay).await;
            self.finished.store(true, Ordering::SeqCst);
            Ok(Artifact::new("done"))
        }
    }

    struct FailingEvaluator;

    #[async_trait]
    impl Evaluator for FailingEvaluator {
        fn name(&self) -> &str {
            "failing"
        }

        async fn evaluate(&self, _artifact: &Artifact) -> Result<serde_json::Value, AgentError> {
            Err(AgentError::Invocation("model connection refused".into()))
        }
    }

    fn input() -> ImproverInput {
        ImproverInput::Initial {
            task: "write a function".into(),
        }
    }

    #[tokio::test]
    async fn test_invoke_passes_through_success() {
        let adapter = ImproverAdapter::new(Arc::new(SlowImprover {
            delay: Duration::from_millis(1),
            finished: Arc::new(AtomicBool::new(false)),
        }));
        let cancel = CancellationToken::new();
        let artifact = adapter
            .invoke(&input(), Duration::from_secs(5), &cancel)
            .await
            .unwrap();
        assert_eq!(artifact.content, "done");
    }

    #[tokio::test]
    async fn test_invoke_times_out_and_abandons_work() {
        let finished = Arc::new(AtomicBool::new(false));
        let adapter = ImproverAdapter::new(Arc::new(SlowImprover {
            delay: Duration::from_secs(30),
            finished: finished.clone(),
        }));
        let cancel = CancellationToken::new();
        let result = adapter
            .invoke(&input(), Duration::from_millis(20), &cancel)
            .await;
        assert!(matches!(result, Err(AgentError::Timeout(_))));
        // The inner future was dropped, so the agent never completed
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!finished.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_invoke_honors_cancellation() {
        let adapter = ImproverAdapter::new(Arc::new(SlowImprover {
            delay: Duration::from_secs(30),
            finished: Arc::new(AtomicBool::new(false)),
        }));
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            token.cancel();
        });
        let result = adapter.invoke(&input(), Duration::from_secs(30), &cancel).await;
        assert!(matches!(result, Err(AgentError::Cancelled)));
    }

    #[tokio::test]
    async fn test_invoke_surfaces_invocation_error() {
        let adapter = EvaluatorAdapter::new(Arc::new(FailingEvaluator));
        let cancel = CancellationToken::new();
        let result = adapter
            .invoke(&Artifact::new("x"), Duration::from_secs(5), &cancel)
            .await;
        assert!(matches!(result, Err(AgentError::Invocation(_))));
    }

    #[tokio::test]
    async fn test_pre_cancelled_token_short_circuits() {
        let finished = Arc::new(AtomicBool::new(false));
        let adapter = ImproverAdapter::new(Arc::new(SlowImprover {
            delay: Duration::from_secs(30),
            finished: finished.clone(),
        }));
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = adapter.invoke(&input(), Duration::from_secs(30), &cancel).await;
        assert!(matches!(result, Err(AgentError::Cancelled)));
    }
}
