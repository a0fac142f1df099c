//! Run-wide interruption: the chain timeout and external cancellation

use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::result::SkipReason;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterruptReason {
    Timeout,
    Cancelled,
}

impl From<InterruptReason> for SkipReason {
    fn from(reason: InterruptReason) -> Self {
        match reason {
            InterruptReason::Timeout => SkipReason::ChainTimeout,
            InterruptReason::Cancelled => SkipReason::ChainCancelled,
        }
    }
}

/// Everything that can stop a run between or during steps
#[derive(Debug, Clone)]
pub struct RunInterrupt {
    deadline: Option<Instant>,
    token: CancellationToken,
}

impl RunInterrupt {
    /// Start the chain clock now
    pub fn new(timeout: Option<Duration>, token: CancellationToken) -> Self {
        Self {
            deadline: timeout.map(|t| Instant::now() + t),
            token,
        }
    }

    /// Never fires unless `token` is cancelled
    pub fn cancellable(token: CancellationToken) -> Self {
        Self::new(None, token)
    }

    /// Non-blocking check; cancellation wins over an expired deadline
    pub fn check(&self) -> Option<InterruptReason> {
        if self.token.is_cancelled() {
            return Some(InterruptReason::Cancelled);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Some(InterruptReason::Timeout),
            _ => None,
        }
    }

    /// Resolves once the run must stop
    pub async fn wait(&self) -> InterruptReason {
        let deadline = async {
            match self.deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            biased;
            _ = self.token.cancelled() => InterruptReason::Cancelled,
            _ = deadline => InterruptReason::Timeout,
        }
    }

    /// Sleep for `duration` unless interrupted first
    pub async fn sleep(&self, duration: Duration) -> Result<(), InterruptReason> {
        tokio::select! {
            biased;
            reason = self.wait() => Err(reason),
            _ = tokio::time::sleep(duration) => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_deadline_fires() {
        let interrupt = RunInterrupt::new(Some(Duration::from_millis(500)), CancellationToken::new());
        assert_eq!(interrupt.check(), None);

        assert_eq!(interrupt.wait().await, InterruptReason::Timeout);
        assert_eq!(interrupt.check(), Some(InterruptReason::Timeout));
    }

    #[tokio::test(start_paused = true)]
    async fn test_sleep_interrupted_by_deadline() {
        let interrupt = RunInterrupt::new(Some(Duration::from_millis(300)), CancellationToken::new());
        let start = Instant::now();

        let result = interrupt.sleep(Duration::from_secs(10)).await;
        assert_eq!(result, Err(InterruptReason::Timeout));
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_sleep_completes_without_interrupt() {
        let interrupt = RunInterrupt::cancellable(CancellationToken::new());
        assert_eq!(interrupt.sleep(Duration::from_secs(2)).await, Ok(()));
    }

    #[tokio::test]
    async fn test_cancellation() {
        let token = CancellationToken::new();
        let interrupt = RunInterrupt::new(Some(Duration::from_secs(60)), token.clone());

        token.cancel();
        assert_eq!(interrupt.check(), Some(InterruptReason::Cancelled));
        assert_eq!(interrupt.wait().await, InterruptReason::Cancelled);
    }
}
