use std::time::Duration;

use tokio::{sync::mpsc::Receiver, time::timeout};

use super::{ReceiveTimeoutError, TimeoutReceiver};

impl<T> TimeoutReceiver<T> for Receiver<T>
where
    T: Send + Sync,
{
    async fn recv_timeout(&mut self, duration: Duration) -> Result<T, ReceiveTimeoutError> {
        match timeout(duration, self.recv()).await {
            Ok(Some(value)) => Ok(value),
            Ok(None) => Err(ReceiveTimeoutError::Closed),
            Err(_) => Err(ReceiveTimeoutError::Timeout),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::sync::mpsc::channel;

    use crate::sync::{ReceiveTimeoutError, TimeoutReceiver};

    #[tokio::test]
    async fn test_recv_timeout() {
        let (tx, mut rx) = channel::<u32>(1);
        let result = rx.recv_timeout(Duration::from_millis(10)).await;
        assert_eq!(result, Err(ReceiveTimeoutError::Timeout));

        tx.send(7).await.unwrap();
        assert_eq!(rx.recv_timeout(Duration::from_millis(10)).await, Ok(7));

        drop(tx);
        let result = rx.recv_timeout(Duration::from_millis(10)).await;
        assert_eq!(result, Err(ReceiveTimeoutError::Closed));
    }
}
