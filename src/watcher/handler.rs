//! Batch handlers receiving flushed change sets.

use std::future::Future;
use std::path::PathBuf;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Receives one batch of workspace-relative paths per quiet period.
///
/// Batches are delivered one at a time, in order, with paths sorted and
/// free of duplicates. The token is cancelled when the watcher closes.
#[async_trait]
pub trait BatchHandler: Send + Sync + 'static {
    async fn handle(&self, cancel: &CancellationToken, paths: Vec<PathBuf>);
}

#[async_trait]
impl BatchHandler for mpsc::Sender<Vec<PathBuf>> {
    async fn handle(&self, _cancel: &CancellationToken, paths: Vec<PathBuf>) {
        if self.send(paths).await.is_err() {
            tracing::warn!("Batch receiver dropped");
        }
    }
}

#[async_trait]
impl BatchHandler for mpsc::UnboundedSender<Vec<PathBuf>> {
    async fn handle(&self, _cancel: &CancellationToken, paths: Vec<PathBuf>) {
        if self.send(paths).is_err() {
            tracing::warn!("Batch receiver dropped");
        }
    }
}

/// Adapts an async closure into a [`BatchHandler`].
pub struct FnHandler<F>(pub F);

#[async_trait]
impl<F, Fut> BatchHandler for FnHandler<F>
where
    F: Fn(CancellationToken, Vec<PathBuf>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    async fn handle(&self, cancel: &CancellationToken, paths: Vec<PathBuf>) {
        (self.0)(cancel.clone(), paths).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_sender_handler() {
        let (tx, mut rx) = mpsc::channel(1);
        let cancel = CancellationToken::new();

        tx.handle(&cancel, vec![PathBuf::from("a.go")]).await;
        assert_eq!(rx.recv().await.unwrap(), vec![PathBuf::from("a.go")]);
    }

    #[tokio::test]
    async fn test_unbounded_sender_handler_with_dropped_receiver() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        // Must not panic.
        tx.handle(&CancellationToken::new(), vec![PathBuf::from("a.go")])
            .await;
    }

    #[tokio::test]
    async fn test_fn_handler() {
        let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let handler = FnHandler(move |_cancel: CancellationToken, paths: Vec<PathBuf>| {
            let sink = Arc::clone(&sink);
            async move {
                sink.lock().extend(paths);
            }
        });

        handler
            .handle(&CancellationToken::new(), vec![PathBuf::from("x.py")])
            .await;
        assert_eq!(*seen.lock(), vec![PathBuf::from("x.py")]);
    }
}
