use tokio::sync::mpsc;

use crate::device::{Channel, DeviceError, Sample};

use super::{
    status::{DownloadReport, SessionStatus},
    SessionError,
};

pub type Reply<T> = mpsc::Sender<Result<T, SessionError>>;

/// SessionManager commands define all the different ways to interact with a
/// [super::SessionManager] over a channel. Requests come from a
/// [super::SessionClient]; completions are posted by the worker tasks the
/// manager spawns, tagged with the generation of the session they belong to.
#[derive(Debug)]
pub enum SessionCommand {
    Connect(Reply<()>),
    Disconnect(Reply<()>),
    StartStream(Channel, Reply<()>),
    StopStream(Reply<()>),
    StartLogging(Channel, Reply<()>),
    StopAndDownload(mpsc::Sender<f64>, Reply<DownloadReport>),
    AbortDownload(Reply<bool>),
    Export(Option<String>, Reply<String>),
    GetStatus(mpsc::Sender<SessionStatus>),
    GetSamples(mpsc::Sender<Vec<Sample>>),
    ConnectFinished(Result<(), SessionError>, Reply<()>),
    StreamDelivery(u64, Result<Sample, DeviceError>),
    StreamFailed(u64, DeviceError),
    DownloadProgress(u64, f64),
    DownloadFinished(u64, Result<Vec<Sample>, DeviceError>),
    CleanupFinished(u64, Result<(), SessionError>),
    Stop,
}
