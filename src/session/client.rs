use thiserror::Error;
use tokio::sync::mpsc::{channel, error::SendTimeoutError, Receiver, Sender};

use crate::{
    constants::CLIENT_TIMEOUT,
    device::{Channel, Sample},
    sync::{ReceiveTimeoutError, TimeoutReceiver},
};

use super::{
    command::SessionCommand,
    status::{DownloadReport, SessionStatus},
    SessionError,
};

/// Possible errors for a session client
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("service encountered an error processing the request: {0}")]
    ServiceError(Box<dyn std::error::Error + Send + Sync>),
    #[error("session manager no longer exists")]
    ChannelClosed,
    #[error(transparent)]
    Session(#[from] SessionError),
}

/// A client for a running [super::SessionManager]
#[derive(Debug, Clone)]
pub struct SessionClient {
    tx: Sender<SessionCommand>,
}

impl From<Sender<SessionCommand>> for SessionClient {
    fn from(tx: Sender<SessionCommand>) -> Self {
        SessionClient::new(tx)
    }
}

impl SessionClient {
    pub fn new(tx: Sender<SessionCommand>) -> Self {
        Self { tx }
    }

    /// Send the given command to the session manager. This method uses a
    /// timeout to detect potential deadlocks.
    async fn send(&self, cmd: SessionCommand) -> Result<(), ClientError> {
        let result = self.tx.send_timeout(cmd, CLIENT_TIMEOUT).await;
        let Err(err) = result else {
            return Ok(());
        };
        match err {
            SendTimeoutError::Timeout(ref cmd) => {
                log::error!("POSSIBLE DEADLOCK: timed out after {CLIENT_TIMEOUT:?} sending command to session manager: {cmd:?}");
                Err(ClientError::ServiceError(err.into()))
            }
            SendTimeoutError::Closed(_) => Err(ClientError::ChannelClosed),
        }
    }

    /// Use the given receiver to wait for a response from the session manager.
    /// This method uses a timeout to detect potential deadlocks.
    async fn recv<T>(mut rx: Receiver<T>) -> Option<T>
    where
        T: Send + Sync,
    {
        let result = rx.recv_timeout(CLIENT_TIMEOUT).await;
        let Err(err) = result else {
            return result.ok();
        };
        match err {
            ReceiveTimeoutError::Timeout => {
                log::error!("POSSIBLE DEADLOCK: timed out after {CLIENT_TIMEOUT:?} waiting for response from session manager");
                None
            }
            ReceiveTimeoutError::Closed => None,
        }
    }

    /// Wait for the reply to a request and unwrap its session result
    async fn reply<T>(rx: Receiver<Result<T, SessionError>>) -> Result<T, ClientError>
    where
        T: Send + Sync,
    {
        match Self::recv(rx).await {
            Some(result) => Ok(result?),
            None => Err(ClientError::ChannelClosed),
        }
    }

    /// Connect to the device. Waits until the attempt succeeds, fails or
    /// hits the configured connect timeout.
    pub async fn connect(&self) -> Result<(), ClientError> {
        let (tx, mut rx) = channel(1);
        self.send(SessionCommand::Connect(tx)).await?;
        match rx.recv().await {
            Some(result) => Ok(result?),
            None => Err(ClientError::ChannelClosed),
        }
    }

    /// Stop any stream and disconnect from the device
    pub async fn disconnect(&self) -> Result<(), ClientError> {
        let (tx, rx) = channel(1);
        self.send(SessionCommand::Disconnect(tx)).await?;
        Self::reply(rx).await
    }

    /// Start streaming the given channel
    pub async fn start_stream(&self, channel: Channel) -> Result<(), ClientError> {
        let (tx, rx) = reply_channel();
        self.send(SessionCommand::StartStream(channel, tx)).await?;
        Self::reply(rx).await
    }

    /// Stop the active stream. Does nothing if no stream is active.
    pub async fn stop_stream(&self) -> Result<(), ClientError> {
        let (tx, rx) = reply_channel();
        self.send(SessionCommand::StopStream(tx)).await?;
        Self::reply(rx).await
    }

    /// Start logging the given channel to device flash
    pub async fn start_logging(&self, channel: Channel) -> Result<(), ClientError> {
        let (tx, rx) = reply_channel();
        self.send(SessionCommand::StartLogging(channel, tx)).await?;
        Self::reply(rx).await
    }

    /// Stop logging and download the log into the sample buffer. Progress in
    /// [0, 1] is sent to `progress` while the download runs. Waits until the
    /// device log has been cleared.
    pub async fn stop_and_download(
        &self,
        progress: Sender<f64>,
    ) -> Result<DownloadReport, ClientError> {
        let (tx, mut rx) = channel(1);
        self.send(SessionCommand::StopAndDownload(progress, tx))
            .await?;
        match rx.recv().await {
            Some(result) => Ok(result?),
            None => Err(ClientError::ChannelClosed),
        }
    }

    /// Abandon a running download. Returns false if no download was running.
    pub async fn abort_download(&self) -> Result<bool, ClientError> {
        let (tx, rx) = reply_channel();
        self.send(SessionCommand::AbortDownload(tx)).await?;
        Self::reply(rx).await
    }

    /// Export the sample buffer as CSV. Returns the name of the exported
    /// file.
    pub async fn export(&self, label: Option<String>) -> Result<String, ClientError> {
        let (tx, rx) = reply_channel();
        self.send(SessionCommand::Export(label, tx)).await?;
        Self::reply(rx).await
    }

    /// Get a snapshot of the session state
    pub async fn get_status(&self) -> Result<SessionStatus, ClientError> {
        let (tx, rx) = channel(1);
        self.send(SessionCommand::GetStatus(tx)).await?;
        if let Some(status) = Self::recv(rx).await {
            return Ok(status);
        }
        Err(ClientError::ChannelClosed)
    }

    /// Get a copy of all buffered samples
    pub async fn get_samples(&self) -> Result<Vec<Sample>, ClientError> {
        let (tx, rx) = channel(1);
        self.send(SessionCommand::GetSamples(tx)).await?;
        if let Some(samples) = Self::recv(rx).await {
            return Ok(samples);
        }
        Err(ClientError::ChannelClosed)
    }

    /// Stop the session manager
    pub async fn stop(&self) -> Result<(), ClientError> {
        self.send(SessionCommand::Stop).await
    }
}

fn reply_channel<T>() -> (Sender<Result<T, SessionError>>, Receiver<Result<T, SessionError>>) {
    channel(1)
}
