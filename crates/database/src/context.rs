use crate::error::DbError;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;

/// Per-request call context carried into every store method.
///
/// A context with a deadline aborts any store call still running when the
/// deadline passes, and refuses to start one once it has passed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RequestContext {
    deadline: Option<Instant>,
}

impl RequestContext {
    /// A context without a deadline.
    pub fn background() -> Self {
        Self::default()
    }

    pub fn with_deadline(deadline: Instant) -> Self {
        Self {
            deadline: Some(deadline),
        }
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self::with_deadline(Instant::now() + timeout)
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn is_expired(&self) -> bool {
        self.deadline.is_some_and(|deadline| Instant::now() >= deadline)
    }

    /// Drives one store operation under this context's deadline.
    pub async fn run<T, F>(&self, operation: &'static str, fut: F) -> Result<T, DbError>
    where
        F: Future<Output = Result<T, DbError>>,
    {
        let Some(deadline) = self.deadline else {
            return fut.await;
        };

        if Instant::now() >= deadline {
            return Err(DbError::Cancelled { operation });
        }

        match tokio::time::timeout_at(deadline, fut).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(operation, "Store call exceeded the request deadline.");
                Err(DbError::Cancelled { operation })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn background_context_runs_to_completion() {
        let ctx = RequestContext::background();
        let value = ctx.run("noop", async { Ok::<_, DbError>(7) }).await.unwrap();
        assert_eq!(value, 7);
        assert!(!ctx.is_expired());
    }

    #[tokio::test]
    async fn expired_deadline_fails_before_running() {
        let ctx = RequestContext::with_timeout(Duration::ZERO);
        let result = ctx.run("history", async { Ok::<_, DbError>(()) }).await;
        assert!(matches!(result, Err(DbError::Cancelled { operation: "history" })));
    }

    #[tokio::test]
    async fn slow_call_is_cut_off_at_the_deadline() {
        let ctx = RequestContext::with_timeout(Duration::from_millis(20));
        let result = ctx
            .run("paired_rates", async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok::<_, DbError>(())
            })
            .await;
        assert!(matches!(result, Err(DbError::Cancelled { .. })));
    }
}
