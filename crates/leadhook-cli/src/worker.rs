//! Background retry worker task.

use std::time::Duration;

use leadhook_server::service::ServiceState;
use leadhook_webhook::RetryConfig;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::TRACING_TARGET_WORKER;

/// Spawns the retry worker on the runtime; it stops once `cancel` fires.
pub fn spawn(
    state: &ServiceState,
    config: RetryConfig,
    cancel: CancellationToken,
) -> leadhook_server::Result<JoinHandle<()>> {
    let worker = state.retry_worker(config)?;

    Ok(tokio::spawn(async move {
        // Failures are logged by the worker itself.
        let _ = worker.run(cancel).await;
    }))
}

/// Waits up to `timeout` for the worker to finish its current batch.
pub async fn join(handle: JoinHandle<()>, timeout: Duration) {
    match tokio::time::timeout(timeout, handle).await {
        Ok(Ok(())) => {
            tracing::debug!(target: TRACING_TARGET_WORKER, "Retry worker joined");
        }
        Ok(Err(err)) => {
            tracing::error!(
                target: TRACING_TARGET_WORKER,
                error = %err,
                "Retry worker task panicked"
            );
        }
        Err(_) => {
            tracing::warn!(
                target: TRACING_TARGET_WORKER,
                timeout_secs = timeout.as_secs(),
                "Retry worker did not stop in time; leased deliveries will be reclaimed"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use leadhook_webhook::DeliveryConfig;

    use super::*;

    #[tokio::test]
    async fn worker_stops_on_cancel() -> anyhow::Result<()> {
        let state = ServiceState::in_memory(&DeliveryConfig::default())?;
        let cancel = CancellationToken::new();
        let handle = spawn(&state, RetryConfig::default(), cancel.clone())?;

        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(5), handle).await??;
        Ok(())
    }
}
