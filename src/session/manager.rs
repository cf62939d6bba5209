use std::{error::Error, sync::Arc};

use tokio::{sync::mpsc, task::JoinHandle};

use crate::{
    config::SessionConfig,
    constants::BUFFER_SIZE,
    device::{AccelerometerRange, Channel, ConnectionState, Device, DeviceError, Sample},
};

use super::{
    buffer::SampleBuffer,
    client::SessionClient,
    command::{Reply, SessionCommand},
    export::{self, ExportSink},
    logging::LogSession,
    scale::{ChannelScale, DisplayPoint},
    sink::StatusSink,
    status::{DownloadReport, SessionStatus, Telemetry},
    stream::{Disposition, StreamSession},
    supervisor::{ConnectionSupervisor, TelemetryReading},
    SessionError,
};

/// A log download waiting for its cleanup to finish
#[derive(Debug)]
struct PendingDownload {
    reply: Reply<DownloadReport>,
    progress: mpsc::Sender<f64>,
    samples: usize,
    task: JoinHandle<()>,
}

/// The [SessionManager] owns all session state for a single device. It runs
/// as a single task processing [SessionCommand] messages; device completions
/// are sent back to it as commands so that state is only ever changed from
/// this task.
pub struct SessionManager<D: Device> {
    config: SessionConfig,
    supervisor: ConnectionSupervisor<D>,
    status_sink: Arc<dyn StatusSink>,
    export_sink: Arc<dyn ExportSink>,
    tx: mpsc::Sender<SessionCommand>,
    rx: mpsc::Receiver<SessionCommand>,
    telemetry_tx: mpsc::Sender<TelemetryReading>,
    telemetry_rx: mpsc::Receiver<TelemetryReading>,
    stream: StreamSession,
    log: LogSession,
    buffer: SampleBuffer,
    telemetry: Telemetry,
    last_point: Option<DisplayPoint>,
    connecting: bool,
    download: Option<PendingDownload>,
}

impl<D: Device> SessionManager<D> {
    /// Create a new session manager for the given device. Must be called
    /// from within a tokio runtime.
    pub fn new(
        device: &Arc<D>,
        config: SessionConfig,
        status_sink: Arc<dyn StatusSink>,
        export_sink: Arc<dyn ExportSink>,
    ) -> Self {
        let (tx, rx) = mpsc::channel(BUFFER_SIZE);
        let (telemetry_tx, telemetry_rx) = mpsc::channel(8);
        let supervisor = ConnectionSupervisor::new(device, config.connect_timeout())
            .with_request_timeout(config.request_timeout());
        Self {
            config,
            supervisor,
            status_sink,
            export_sink,
            tx,
            rx,
            telemetry_tx,
            telemetry_rx,
            stream: StreamSession::new(),
            log: LogSession::new(),
            buffer: SampleBuffer::new(),
            telemetry: Telemetry::default(),
            last_point: None,
            connecting: false,
            download: None,
        }
    }

    /// Return a client to communicate with the manager while it is running
    pub fn client(&self) -> SessionClient {
        SessionClient::new(self.tx.clone())
    }

    /// Return the supervisor of the device connection, e.g. to observe
    /// connection state changes
    pub fn supervisor(&self) -> ConnectionSupervisor<D> {
        self.supervisor.clone()
    }

    /// Process commands until a stop command is received
    pub async fn run(&mut self) -> Result<(), Box<dyn Error + Send + Sync>> {
        log::debug!("Starting session manager");
        let sink = self.status_sink.clone();
        let subscription = self.supervisor.observe(move |state| sink.connection(state));

        loop {
            tokio::select! {
                cmd = self.rx.recv() => {
                    let Some(cmd) = cmd else {
                        log::debug!("All session clients are gone");
                        break;
                    };
                    if matches!(cmd, SessionCommand::Stop) {
                        break;
                    }
                    self.handle_command(cmd).await;
                }
                Some(reading) = self.telemetry_rx.recv() => {
                    self.handle_telemetry(reading);
                }
            }
        }

        log::debug!("Stopping session manager");
        subscription.cancel();
        self.stop_stream().await;
        if let Some(download) = self.download.take() {
            download.task.abort();
        }
        log::debug!("Session manager stopped");

        Ok(())
    }

    async fn handle_command(&mut self, cmd: SessionCommand) {
        log::trace!("Received command: {cmd:?}");
        match cmd {
            SessionCommand::Connect(reply) => self.connect(reply).await,
            SessionCommand::ConnectFinished(result, reply) => {
                self.connect_finished(result, reply).await
            }
            SessionCommand::Disconnect(reply) => {
                let result = self.disconnect().await;
                respond(reply, result).await;
            }
            SessionCommand::StartStream(channel, reply) => {
                let result = self.start_stream(channel).await;
                respond(reply, result).await;
            }
            SessionCommand::StopStream(reply) => {
                self.stop_stream().await;
                respond(reply, Ok(())).await;
            }
            SessionCommand::StreamDelivery(generation, Ok(sample)) => {
                self.handle_sample(generation, sample)
            }
            SessionCommand::StreamDelivery(generation, Err(e))
            | SessionCommand::StreamFailed(generation, e) => self.stream_failed(generation, e),
            SessionCommand::StartLogging(channel, reply) => {
                let result = self.start_logging(channel).await;
                respond(reply, result).await;
            }
            SessionCommand::StopAndDownload(progress, reply) => {
                self.stop_and_download(progress, reply).await
            }
            SessionCommand::DownloadProgress(generation, fraction) => {
                self.download_progress(generation, fraction)
            }
            SessionCommand::DownloadFinished(generation, result) => {
                self.download_finished(generation, result).await
            }
            SessionCommand::CleanupFinished(generation, result) => {
                self.cleanup_finished(generation, result).await
            }
            SessionCommand::AbortDownload(reply) => {
                let aborted = self.abort_download().await;
                respond(reply, Ok(aborted)).await;
            }
            SessionCommand::Export(label, reply) => {
                let result = self.export(label);
                respond(reply, result).await;
            }
            SessionCommand::GetStatus(reply) => {
                if let Err(e) = reply.send(self.status()).await {
                    log::error!("Failed to send status: {e:?}");
                }
            }
            SessionCommand::GetSamples(reply) => {
                if reply.send(self.buffer.samples().to_vec()).await.is_err() {
                    log::error!("Failed to send samples");
                }
            }
            SessionCommand::Stop => (),
        }
    }

    async fn connect(&mut self, reply: Reply<()>) {
        if self.connecting {
            respond(reply, Err(SessionError::Busy("connection attempt in progress"))).await;
            return;
        }
        if self.log.is_transferring() {
            respond(reply, Err(SessionError::Busy("log download in progress"))).await;
            return;
        }

        self.connecting = true;
        self.status_sink.status("Connecting...");
        let supervisor = self.supervisor.clone();
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let result = supervisor.connect().await;
            if let Err(e) = tx.send(SessionCommand::ConnectFinished(result, reply)).await {
                log::error!("Failed to report connection result: {e:?}");
            }
        });
    }

    async fn connect_finished(&mut self, result: Result<(), SessionError>, reply: Reply<()>) {
        self.connecting = false;
        match &result {
            Ok(()) => {
                log::info!("We are connected");
                self.status_sink.status("Connected!");
                if let Err(e) = self.supervisor.handshake(self.telemetry_tx.clone()) {
                    log::warn!("Unable to complete connection handshake: {e}");
                }
            }
            Err(e) => {
                log::error!("Unable to connect: {e}");
                self.status_sink.alert("Error", &e.to_string());
            }
        }
        respond(reply, result).await;
    }

    async fn disconnect(&mut self) -> Result<(), SessionError> {
        if self.log.is_transferring() {
            return Err(SessionError::Busy("log download in progress"));
        }
        self.stop_stream().await;

        self.status_sink.status("Disconnecting...");
        if let Err(e) = self.supervisor.disconnect().await {
            log::error!("Unable to disconnect: {e}");
            self.status_sink.alert("Error", &e.to_string());
            return Err(e);
        }
        self.status_sink.status("Disconnected!");
        Ok(())
    }

    fn handle_telemetry(&mut self, reading: TelemetryReading) {
        match reading {
            TelemetryReading::Battery(Ok(level)) => {
                self.telemetry.battery = Some(level);
                self.status_sink.status(&format!("Battery: {level}%"));
            }
            TelemetryReading::Battery(Err(e)) => {
                log::warn!("Unable to read battery level: {e}");
                self.status_sink.status("Battery: unavailable");
            }
            TelemetryReading::Temperature(Ok(celsius)) => {
                log::debug!("Got the temperature");
                self.telemetry.temperature = Some(celsius);
                self.status_sink
                    .status(&format!("Temperature: {celsius:.1}°C"));
            }
            TelemetryReading::Temperature(Err(e)) => {
                log::warn!("Unable to read temperature: {e}");
                self.status_sink.status("Temperature: unavailable");
            }
        }
    }

    /// Borrow the device for a new session and check it can start one
    fn session_device(&self) -> Result<Arc<D>, SessionError> {
        let device = self.supervisor.device()?;
        if device.state() != ConnectionState::Connected {
            return Err(SessionError::NotConnected);
        }
        Ok(device)
    }

    /// Apply the session settings to the device and resolve the display
    /// scale for the channel
    async fn configure_session(
        &self,
        device: &Arc<D>,
        channel: Channel,
    ) -> Result<ChannelScale, SessionError> {
        let mode = device.set_fusion_mode(self.config.fusion_mode);
        self.supervisor.request("fusion mode", mode).await?;

        let range = match channel {
            Channel::LinearAcceleration => device.accelerometer_range(),
            _ => AccelerometerRange::default(),
        };
        Ok(ChannelScale::for_channel(channel, range))
    }

    /// Drop the samples of the previous session
    fn reset_buffer(&mut self) {
        self.buffer.clear();
        self.last_point = None;
    }

    async fn start_stream(&mut self, channel: Channel) -> Result<(), SessionError> {
        if self.stream.is_active() {
            return Err(SessionError::AlreadyActive);
        }
        if !self.log.is_idle() {
            return Err(SessionError::Busy("logging session in progress"));
        }
        let device = self.session_device()?;
        let scale = self.configure_session(&device, channel).await?;
        let generation = self.stream.start(scale)?;
        self.reset_buffer();

        log::info!("Starting {channel} stream");
        self.status_sink.status(&format!("Streaming {channel}"));
        tokio::spawn(forward_stream(device, channel, generation, self.tx.clone()));
        Ok(())
    }

    fn handle_sample(&mut self, generation: u64, sample: Sample) {
        match self.stream.accept(generation, &sample) {
            Disposition::Accepted(point) => {
                self.buffer.append(sample);
                self.plot(point);
            }
            Disposition::Stale => {
                log::trace!("Dropping sample of a stopped stream");
            }
            Disposition::Mismatched(channel) => {
                let expected = self.stream.channel().unwrap_or(channel);
                let err = SessionError::ChannelMismatch(channel, expected);
                log::warn!("Dropping sample: {err}");
            }
        }
    }

    fn stream_failed(&mut self, generation: u64, error: DeviceError) {
        let Some(channel) = self.stream.fail(generation) else {
            log::debug!("Ignoring failure of a stopped stream: {error}");
            return;
        };

        let err = SessionError::StreamDelivery(error.to_string());
        log::error!("{channel} stream failed: {err}");
        self.status_sink.alert("Error", &err.to_string());

        // Recovery is up to the caller; the device is reset exactly once
        match self.supervisor.device() {
            Ok(device) => {
                tokio::spawn(async move {
                    if let Err(e) = device.reset().await {
                        log::error!("Unable to reset device: {e}");
                    }
                });
            }
            Err(e) => log::warn!("Unable to reset device: {e}"),
        }
    }

    async fn stop_stream(&mut self) {
        let Some(channel) = self.stream.stop() else {
            return;
        };
        log::info!("Stopping {channel} stream");
        if let Ok(device) = self.supervisor.device() {
            // Notifications may never have been established
            let stop = device.stop_notifications(channel);
            if let Err(e) = self.supervisor.request("stop notifications", stop).await {
                log::debug!("Unable to stop {channel} notifications: {e}");
            }
        }
        self.status_sink.status("Stream stopped");
    }

    async fn start_logging(&mut self, channel: Channel) -> Result<(), SessionError> {
        if !self.log.is_idle() {
            return Err(SessionError::AlreadyActive);
        }
        if self.stream.is_active() {
            return Err(SessionError::Busy("stream in progress"));
        }
        let device = self.session_device()?;
        let scale = self.configure_session(&device, channel).await?;
        let start = device.start_logging(channel);
        self.supervisor.request("start logging", start).await?;
        // Keep the previous samples until the device has accepted the session
        self.log.start(scale)?;
        self.reset_buffer();

        log::info!("Logging {channel}");
        self.status_sink.status(&format!("Logging {channel}"));
        Ok(())
    }

    async fn stop_and_download(&mut self, progress: mpsc::Sender<f64>, reply: Reply<DownloadReport>) {
        let (generation, channel) = match self.log.begin_download() {
            Ok(download) => download,
            Err(e) => {
                respond(reply, Err(e)).await;
                return;
            }
        };
        let device = match self.supervisor.device() {
            Ok(device) => device,
            Err(e) => {
                self.log.fail_download(generation);
                respond(reply, Err(e)).await;
                return;
            }
        };

        log::info!("Downloading {channel} log");
        self.status_sink.status("Downloading...");
        let task = tokio::spawn(download_log(device, channel, generation, self.tx.clone()));
        self.download = Some(PendingDownload {
            reply,
            progress,
            samples: 0,
            task,
        });
    }

    fn download_progress(&mut self, generation: u64, fraction: f64) {
        let Some(fraction) = self.log.update_progress(generation, fraction) else {
            return;
        };
        self.status_sink.progress(fraction);
        if let Some(download) = self.download.as_ref() {
            if download.progress.try_send(fraction).is_err() {
                log::trace!("Progress receiver is full or gone");
            }
        }
    }

    async fn download_finished(
        &mut self,
        generation: u64,
        result: Result<Vec<Sample>, DeviceError>,
    ) {
        let samples = match result {
            Ok(samples) => samples,
            Err(e) => {
                if !self.log.fail_download(generation) {
                    return;
                }
                let err = SessionError::LogDownload(e.to_string());
                log::error!("{err}");
                self.status_sink.alert("Error", &err.to_string());
                if let Some(download) = self.download.take() {
                    respond(download.reply, Err(err)).await;
                }
                return;
            }
        };
        if !self.log.finish_download(generation) {
            log::debug!("Ignoring download of an aborted log session");
            return;
        }

        let scale = self.log.scale();
        let mut count = 0;
        for sample in samples {
            let Some(point) = scale.and_then(|s| s.project(&sample.value)) else {
                log::warn!("Dropping {} sample found in log", sample.channel());
                continue;
            };
            self.buffer.append(sample);
            self.plot(point);
            count += 1;
        }
        log::info!("Downloaded {count} samples");
        if let Some(download) = self.download.as_mut() {
            download.samples = count;
        }

        // The device only erases its flash while disconnected
        self.status_sink.status("Clearing Log...");
        let supervisor = self.supervisor.clone();
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let result = supervisor.cycle_connection().await;
            if let Err(e) = tx.send(SessionCommand::CleanupFinished(generation, result)).await {
                log::error!("Failed to report log cleanup: {e:?}");
            }
        });
    }

    async fn cleanup_finished(&mut self, generation: u64, result: Result<(), SessionError>) {
        if !self.log.finish_cleanup(generation) {
            return;
        }
        let cleanup_error = match result {
            Ok(()) => None,
            Err(e) => {
                let err = SessionError::Cleanup(e.to_string());
                log::error!("{err}");
                self.status_sink.alert("Error", &err.to_string());
                Some(err.to_string())
            }
        };

        self.status_sink.status("Log downloaded");
        if let Some(download) = self.download.take() {
            let report = DownloadReport {
                samples: download.samples,
                cleanup_error,
            };
            respond(download.reply, Ok(report)).await;
        }
    }

    async fn abort_download(&mut self) -> bool {
        if !self.log.abort_download() {
            return false;
        }
        log::info!("Aborting log download");
        if let Some(download) = self.download.take() {
            download.task.abort();
            let err = SessionError::LogDownload("download aborted".to_string());
            respond(download.reply, Err(err)).await;
        }
        self.status_sink.status("Download aborted");
        true
    }

    fn export(&self, label: Option<String>) -> Result<String, SessionError> {
        let label = label.unwrap_or_else(|| self.config.export.label.clone());
        match export::export(&self.buffer, &label, self.export_sink.as_ref()) {
            Ok(name) => {
                self.status_sink.status(&format!("Exported {name}"));
                Ok(name)
            }
            Err(e) => {
                log::error!("Unable to export samples: {e}");
                self.status_sink.alert("Error", &e.to_string());
                Err(e)
            }
        }
    }

    fn plot(&mut self, point: DisplayPoint) {
        self.last_point = Some(point);
        self.status_sink.plot(point);
    }

    fn status(&self) -> SessionStatus {
        SessionStatus {
            connection: self.supervisor.state(),
            stream: self.stream.state(),
            stream_channel: self.stream.channel(),
            log: self.log.state(),
            log_channel: self.log.channel(),
            progress: self.log.progress(),
            samples: self.buffer.len(),
            telemetry: self.telemetry,
            last_point: self.last_point,
        }
    }
}

async fn respond<T: Send>(reply: Reply<T>, result: Result<T, SessionError>) {
    if reply.send(result).await.is_err() {
        log::debug!("Client went away before receiving a reply");
    }
}

/// Establish notifications for the channel and forward every delivery to the
/// manager, tagged with the stream generation
async fn forward_stream<D: Device>(
    device: Arc<D>,
    channel: Channel,
    generation: u64,
    tx: mpsc::Sender<SessionCommand>,
) {
    let (sample_tx, mut sample_rx) = mpsc::channel(BUFFER_SIZE);
    let started = device.start_notifications(channel, sample_tx).await;
    drop(device);
    if let Err(e) = started {
        log::error!("Unable to start {channel} notifications: {e}");
        let _ = tx.send(SessionCommand::StreamFailed(generation, e)).await;
        return;
    }

    loop {
        let Some(delivery) = sample_rx.recv().await else {
            // The device dropped the notifications without being asked to.
            // Stale after an explicit stop, a failure otherwise.
            log::debug!("{channel} notifications ended");
            let ended = DeviceError::from("notifications ended");
            let _ = tx.send(SessionCommand::StreamFailed(generation, ended)).await;
            return;
        };
        let failed = delivery.is_err();
        if tx
            .send(SessionCommand::StreamDelivery(generation, delivery))
            .await
            .is_err()
        {
            break;
        }
        if failed {
            break;
        }
    }
    log::debug!("Stopped forwarding {channel} notifications");
}

/// Download the log of the channel, forwarding progress to the manager
/// before the final result
async fn download_log<D: Device>(
    device: Arc<D>,
    channel: Channel,
    generation: u64,
    tx: mpsc::Sender<SessionCommand>,
) {
    let (progress_tx, mut progress_rx) = mpsc::channel(64);
    let download = device.download_log_and_stop_logging(channel, true, progress_tx);
    tokio::pin!(download);

    let result = loop {
        tokio::select! {
            biased;
            Some(fraction) = progress_rx.recv() => {
                let _ = tx.send(SessionCommand::DownloadProgress(generation, fraction)).await;
            }
            result = &mut download => break result,
        }
    };
    while let Ok(fraction) = progress_rx.try_recv() {
        let _ = tx
            .send(SessionCommand::DownloadProgress(generation, fraction))
            .await;
    }

    if let Err(e) = tx
        .send(SessionCommand::DownloadFinished(generation, result))
        .await
    {
        log::error!("Failed to report log download: {e:?}");
    }
}
