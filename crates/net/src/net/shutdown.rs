use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

use crate::error::{NetError, NetResult};

/// One-way shutdown flag. Every clone observes the same trigger.
#[derive(Debug, Clone)]
pub struct Shutdown {
    tx: Arc<watch::Sender<bool>>,
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_triggered(&self) -> bool {
        *self.tx.borrow()
    }

    pub async fn triggered(&self) {
        let mut rx = self.tx.subscribe();
        let _ = rx.wait_for(|triggered| *triggered).await;
    }

    /// Runs `fut` until it completes, the flag trips (`Shutdown`) or `limit` elapses (`Timeout`).
    pub async fn guard<T, F>(&self, limit: Option<Duration>, fut: F) -> NetResult<T>
    where
        F: Future<Output = NetResult<T>>,
    {
        if self.is_triggered() {
            return Err(NetError::Shutdown);
        }

        let bounded = async {
            match limit {
                Some(limit) => tokio::time::timeout(limit, fut)
                    .await
                    .map_err(|_| NetError::Timeout)?,
                None => fut.await,
            }
        };

        tokio::select! {
            biased;
            _ = self.triggered() => Err(NetError::Shutdown),
            result = bounded => result,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn trigger_wakes_pending_guard() {
        let shutdown = Shutdown::new();
        let waiter = shutdown.clone();

        let task = tokio::spawn(async move {
            waiter
                .guard(None, std::future::pending::<NetResult<()>>())
                .await
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        shutdown.trigger();

        let result = task.await.unwrap();
        assert!(matches!(result, Err(NetError::Shutdown)));
    }

    #[tokio::test]
    async fn guard_times_out() {
        let shutdown = Shutdown::new();
        let result = shutdown
            .guard(
                Some(Duration::from_millis(10)),
                std::future::pending::<NetResult<()>>(),
            )
            .await;
        assert!(matches!(result, Err(NetError::Timeout)));
    }

    #[tokio::test]
    async fn guard_passes_through_results() {
        let shutdown = Shutdown::new();
        let value = shutdown.guard(None, async { Ok(7) }).await.unwrap();
        assert_eq!(value, 7);

        shutdown.trigger();
        assert!(matches!(
            shutdown.guard(None, async { Ok(7) }).await,
            Err(NetError::Shutdown)
        ));
    }
}
