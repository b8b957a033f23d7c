use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    Ready,
    /// The timeout elapsed before the predicate held.
    NotReady,
    Cancelled,
}

/// Poll `predicate` immediately and then every `interval` until it holds,
/// `timeout` elapses, or `cancel` fires.
pub async fn await_condition<F, Fut>(
    mut predicate: F,
    interval: Duration,
    timeout: Duration,
    cancel: &CancellationToken,
) -> WaitOutcome
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = Instant::now() + timeout;
    loop {
        if cancel.is_cancelled() {
            return WaitOutcome::Cancelled;
        }
        if predicate().await {
            return WaitOutcome::Ready;
        }
        let now = Instant::now();
        if now >= deadline {
            return WaitOutcome::NotReady;
        }
        let pause = interval.min(deadline - now);
        tokio::select! {
            _ = cancel.cancelled() => return WaitOutcome::Cancelled,
            _ = tokio::time::sleep(pause) => {}
        }
    }
}
