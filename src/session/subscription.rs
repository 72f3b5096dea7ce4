use std::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Handle on the task listening to auth changes.
///
/// Releasing cancels the listener; only the first release does anything.
/// Dropping the handle releases it.
pub struct Subscription {
    cancel: CancellationToken,
    listener: Mutex<Option<JoinHandle<()>>>,
}

impl Subscription {
    pub(crate) fn new(cancel: CancellationToken, listener: JoinHandle<()>) -> Self {
        Self {
            cancel,
            listener: Mutex::new(Some(listener)),
        }
    }

    fn take(&self) -> Option<JoinHandle<()>> {
        let handle = match self.listener.lock() {
            Ok(mut lock) => lock.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if handle.is_some() {
            self.cancel.cancel();
        }
        handle
    }

    /// Returns whether this call was the one that released the subscription.
    pub fn release(&self) -> bool {
        self.take().is_some()
    }

    /// Releases and waits for the listener to finish.
    pub async fn shutdown(&self) {
        if let Some(handle) = self.take() {
            let r = handle.await;
            tracing::debug!("session listener stopped: {:?}", r);
        }
    }

    /// False once released, or once the listener has stopped on its own
    /// (e.g. the auth change channel closed).
    pub fn is_active(&self) -> bool {
        if self.cancel.is_cancelled() {
            return false;
        }
        let lock = self.listener.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        lock.as_ref().is_some_and(|handle| !handle.is_finished())
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn finished_listener_is_not_active() {
        let cancel = CancellationToken::new();
        let listener = tokio::spawn(async {});
        let subscription = Subscription::new(cancel, listener);
        let stopped = tokio::time::timeout(std::time::Duration::from_secs(1), async {
            while subscription.is_active() {
                tokio::task::yield_now().await;
            }
        })
        .await;
        assert!(stopped.is_ok());
        assert!(subscription.release());
    }

    #[tokio::test]
    async fn release_is_idempotent() {
        let cancel = CancellationToken::new();
        let listener = tokio::spawn(cancel.clone().cancelled_owned());
        let subscription = Subscription::new(cancel, listener);
        assert!(subscription.is_active());
        assert!(subscription.release());
        assert!(!subscription.release());
        assert!(!subscription.is_active());
        subscription.shutdown().await;
    }
}
