use tokio::sync::oneshot;

/// Single-assignment result slot for one crawl.
///
/// The first call to [`Completion::settle`] delivers the value to the waiting
/// handler; every later call is dropped and reports `false`. Several events can
/// race to finish a run (spawn error, wait error, exit, timeout), and only one
/// of them may produce the HTTP response.
pub struct Completion<T> {
    tx: Option<oneshot::Sender<T>>,
}

impl<T> Completion<T> {
    pub fn new() -> (Self, oneshot::Receiver<T>) {
        let (tx, rx) = oneshot::channel();
        (Self { tx: Some(tx) }, rx)
    }

    pub fn settle(&mut self, value: T) -> bool {
        match self.tx.take() {
            Some(tx) => tx.send(value).is_ok(),
            None => false,
        }
    }

    pub fn is_settled(&self) -> bool {
        self.tx.is_none()
    }

    // never resolves once settled
    pub async fn abandoned(&mut self) {
        match self.tx.as_mut() {
            Some(tx) => tx.closed().await,
            None => std::future::pending().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn only_first_settle_is_delivered() {
        let (mut completion, rx) = Completion::new();

        // spawn "error" followed by a late "close"
        assert!(completion.settle("error"));
        assert!(!completion.settle("close"));
        assert!(completion.is_settled());

        assert_eq!(rx.await.unwrap(), "error");
    }

    #[tokio::test]
    async fn settle_after_receiver_dropped_reports_false() {
        let (mut completion, rx) = Completion::<u8>::new();
        drop(rx);

        completion.abandoned().await;
        assert!(!completion.settle(1));
    }

    #[tokio::test]
    async fn abandoned_pending_while_receiver_alive() {
        let (mut completion, _rx) = Completion::<u8>::new();

        let waited = tokio::time::timeout(
            std::time::Duration::from_millis(50),
            completion.abandoned(),
        )
        .await;
        assert!(waited.is_err());
    }
}
