use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex, MutexGuard,
    },
    time::{Duration, Instant, SystemTime},
};

use tokio::{
    sync::{broadcast, mpsc},
    task::JoinHandle,
};

use crate::{
    config::{FaultPlan, SimulatorConfig},
    device::{
        AccelerometerRange, Channel, ConnectionState, Device, DeviceError, FusionMode, LedColor,
        Sample, SampleSender, SampleValue,
    },
};

use super::motion;

const STATE_CHANNEL_SIZE: usize = 64;

/// Live notification subscription for one channel
#[derive(Debug)]
struct Stream {
    tx: SampleSender,
    delivered: Arc<AtomicUsize>,
    task: Option<JoinHandle<()>>,
}

impl Stream {
    fn stop(self) {
        if let Some(task) = self.task {
            task.abort();
        }
    }
}

#[derive(Debug)]
struct Logging {
    channel: Channel,
    started: Instant,
    started_at: SystemTime,
}

#[derive(Debug)]
struct Inner {
    state: ConnectionState,
    faults: FaultPlan,
    fusion_mode: FusionMode,
    streams: HashMap<Channel, Stream>,
    logging: Option<Logging>,
    flash: Vec<Sample>,
    erase_pending: bool,
    resets: usize,
    led_flashes: Vec<(LedColor, u8)>,
}

/// A software wearable that behaves like a sensor-fusion capable BLE device.
/// It generates live and logged samples and can inject failures at every
/// step of a session.
#[derive(Debug)]
pub struct SimulatedDevice {
    config: SimulatorConfig,
    state_tx: broadcast::Sender<ConnectionState>,
    inner: Mutex<Inner>,
}

impl SimulatedDevice {
    pub fn new(config: SimulatorConfig) -> Self {
        let (state_tx, _) = broadcast::channel(STATE_CHANNEL_SIZE);
        let inner = Inner {
            state: ConnectionState::Disconnected,
            faults: config.faults.clone(),
            fusion_mode: FusionMode::default(),
            streams: HashMap::new(),
            logging: None,
            flash: Vec::new(),
            erase_pending: false,
            resets: 0,
            led_flashes: Vec::new(),
        };
        Self {
            config,
            state_tx,
            inner: Mutex::new(inner),
        }
    }

    fn inner(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Hang forever when requests are configured to stall
    async fn stall(&self, request: &str) {
        let stalled = self.inner().faults.stall_requests;
        if stalled {
            log::debug!("Stalling {request} request");
            std::future::pending::<()>().await;
        }
    }

    fn set_state(&self, inner: &mut Inner, state: ConnectionState) {
        if inner.state == state {
            return;
        }
        log::debug!("Simulated device state: {} -> {}", inner.state, state);
        inner.state = state;
        // Nobody listening is not an error
        let _ = self.state_tx.send(state);
    }

    /// Replace the failures injected from now on
    pub fn set_faults(&self, faults: FaultPlan) {
        self.inner().faults = faults;
    }

    pub fn faults(&self) -> FaultPlan {
        self.inner().faults.clone()
    }

    /// Number of resets issued to the device
    pub fn reset_count(&self) -> usize {
        self.inner().resets
    }

    /// Every LED flash command received, in order
    pub fn led_flashes(&self) -> Vec<(LedColor, u8)> {
        self.inner().led_flashes.clone()
    }

    pub fn fusion_mode(&self) -> FusionMode {
        self.inner().fusion_mode
    }

    /// Number of samples held in flash memory
    pub fn flash_len(&self) -> usize {
        self.inner().flash.len()
    }

    pub fn is_streaming(&self, channel: Channel) -> bool {
        self.inner().streams.contains_key(&channel)
    }

    pub fn logging_channel(&self) -> Option<Channel> {
        self.inner().logging.as_ref().map(|l| l.channel)
    }

    /// Deliver a sample captured now. It goes to the live stream of its
    /// channel if there is one, otherwise into flash if the channel is being
    /// logged. Returns false if the sample was dropped.
    pub fn push_sample(&self, value: SampleValue) -> bool {
        self.push(Sample::now(value))
    }

    /// Deliver the given sample, see [SimulatedDevice::push_sample]
    pub fn push(&self, sample: Sample) -> bool {
        let channel = sample.channel();
        let mut inner = self.inner();
        let error_after = inner.faults.stream_error_after;
        if let Some(stream) = inner.streams.get(&channel) {
            return try_deliver(&stream.tx, &stream.delivered, error_after, sample);
        }
        match inner.logging.as_ref() {
            Some(logging) if logging.channel == channel => {
                inner.flash.push(sample);
                true
            }
            _ => false,
        }
    }

    /// Fail the live stream of the given channel
    pub fn push_error(&self, channel: Channel, message: &str) -> bool {
        let inner = self.inner();
        let Some(stream) = inner.streams.get(&channel) else {
            return false;
        };
        stream.tx.try_send(Err(message.into())).is_ok()
    }

    /// Spawn a task generating samples at the configured notification rate
    fn spawn_generator(
        &self,
        channel: Channel,
        tx: SampleSender,
        delivered: Arc<AtomicUsize>,
        error_after: Option<usize>,
    ) -> Option<JoinHandle<()>> {
        let rate = self.config.sample_rate_hz;
        if rate <= 0.0 || !rate.is_finite() {
            return None;
        }
        let Ok(period) = Duration::try_from_secs_f64(1.0 / rate) else {
            log::warn!("Sample rate of {rate}Hz is too low, not generating samples");
            return None;
        };
        let range = self.config.accelerometer_range;
        let task = tokio::spawn(async move {
            let started = Instant::now();
            let mut interval = tokio::time::interval(period);
            loop {
                interval.tick().await;
                let t = started.elapsed().as_secs_f64();
                let sample = Sample::now(motion::value_at(channel, t, range));
                if !deliver(&tx, &delivered, error_after, sample).await {
                    break;
                }
            }
            log::debug!("Sample generator for {channel} stopped");
        });
        Some(task)
    }
}

/// Returns the error that should replace the next sample, if any
fn injected_error(delivered: &AtomicUsize, error_after: Option<usize>) -> Option<DeviceError> {
    let count = delivered.fetch_add(1, Ordering::SeqCst);
    match error_after {
        Some(limit) if count >= limit => Some("notification link lost".into()),
        _ => None,
    }
}

async fn deliver(
    tx: &SampleSender,
    delivered: &AtomicUsize,
    error_after: Option<usize>,
    sample: Sample,
) -> bool {
    if let Some(err) = injected_error(delivered, error_after) {
        let _ = tx.send(Err(err)).await;
        return false;
    }
    tx.send(Ok(sample)).await.is_ok()
}

fn try_deliver(
    tx: &SampleSender,
    delivered: &AtomicUsize,
    error_after: Option<usize>,
    sample: Sample,
) -> bool {
    if let Some(err) = injected_error(delivered, error_after) {
        let _ = tx.try_send(Err(err));
        return false;
    }
    tx.try_send(Ok(sample)).is_ok()
}

impl Device for SimulatedDevice {
    fn state(&self) -> ConnectionState {
        self.inner().state
    }

    fn state_changes(&self) -> broadcast::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }

    fn accelerometer_range(&self) -> AccelerometerRange {
        self.config.accelerometer_range
    }

    async fn connect(&self) -> Result<(), DeviceError> {
        {
            let mut inner = self.inner();
            if inner.state == ConnectionState::Connected {
                return Ok(());
            }
            self.set_state(&mut inner, ConnectionState::Connecting);
        }

        tokio::time::sleep(Duration::from_millis(self.config.connect_delay_ms)).await;

        let mut inner = self.inner();
        if inner.faults.fail_connect {
            self.set_state(&mut inner, ConnectionState::Disconnected);
            return Err("connection attempt failed".into());
        }
        self.set_state(&mut inner, ConnectionState::Connected);
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), DeviceError> {
        self.stall("disconnect").await;
        let mut inner = self.inner();
        if inner.faults.fail_disconnect {
            return Err("disconnect request failed".into());
        }
        if inner.state == ConnectionState::Disconnected {
            return Ok(());
        }
        self.set_state(&mut inner, ConnectionState::Disconnecting);

        // Live notifications end with the connection, logging does not
        for (_, stream) in inner.streams.drain() {
            stream.stop();
        }
        if inner.erase_pending {
            log::debug!("Erasing {} logged samples", inner.flash.len());
            inner.flash.clear();
            inner.erase_pending = false;
        }

        self.set_state(&mut inner, ConnectionState::Disconnected);
        Ok(())
    }

    async fn read_battery(&self) -> Result<u8, DeviceError> {
        tokio::task::yield_now().await;
        let inner = self.inner();
        if inner.state != ConnectionState::Connected {
            return Err(DeviceError::NotConnected);
        }
        if inner.faults.fail_battery {
            return Err("battery read failed".into());
        }
        Ok(self.config.battery)
    }

    async fn read_temperature(&self) -> Result<f64, DeviceError> {
        tokio::task::yield_now().await;
        let inner = self.inner();
        if inner.state != ConnectionState::Connected {
            return Err(DeviceError::NotConnected);
        }
        if inner.faults.fail_temperature {
            return Err("thermistor read failed".into());
        }
        Ok(self.config.temperature)
    }

    async fn flash_led(&self, color: LedColor, flashes: u8) -> Result<(), DeviceError> {
        let mut inner = self.inner();
        if inner.state != ConnectionState::Connected {
            return Err(DeviceError::NotConnected);
        }
        inner.led_flashes.push((color, flashes));
        Ok(())
    }

    async fn reset(&self) -> Result<(), DeviceError> {
        let mut inner = self.inner();
        log::info!("Resetting simulated device");
        inner.resets += 1;
        for (_, stream) in inner.streams.drain() {
            stream.stop();
        }
        inner.logging = None;
        self.set_state(&mut inner, ConnectionState::Disconnected);
        Ok(())
    }

    async fn set_fusion_mode(&self, mode: FusionMode) -> Result<(), DeviceError> {
        self.stall("fusion mode").await;
        let mut inner = self.inner();
        if inner.state != ConnectionState::Connected {
            return Err(DeviceError::NotConnected);
        }
        inner.fusion_mode = mode;
        Ok(())
    }

    async fn start_notifications(
        &self,
        channel: Channel,
        tx: SampleSender,
    ) -> Result<(), DeviceError> {
        let mut inner = self.inner();
        if inner.state != ConnectionState::Connected {
            return Err(DeviceError::NotConnected);
        }
        if inner.faults.fail_stream_start {
            return Err("failed to enable notifications".into());
        }
        if let Some(previous) = inner.streams.remove(&channel) {
            previous.stop();
        }

        let delivered = Arc::new(AtomicUsize::new(0));
        let error_after = inner.faults.stream_error_after;
        let task = self.spawn_generator(channel, tx.clone(), delivered.clone(), error_after);
        inner.streams.insert(
            channel,
            Stream {
                tx,
                delivered,
                task,
            },
        );
        Ok(())
    }

    async fn stop_notifications(&self, channel: Channel) -> Result<(), DeviceError> {
        self.stall("stop notifications").await;
        let mut inner = self.inner();
        if inner.faults.ignore_stop {
            log::debug!("Ignoring request to stop {channel} notifications");
            return Ok(());
        }
        if let Some(stream) = inner.streams.remove(&channel) {
            stream.stop();
        }
        Ok(())
    }

    async fn start_logging(&self, channel: Channel) -> Result<(), DeviceError> {
        let mut inner = self.inner();
        if inner.state != ConnectionState::Connected {
            return Err(DeviceError::NotConnected);
        }
        if inner.faults.fail_log_start {
            return Err("failed to start logging".into());
        }
        inner.logging = Some(Logging {
            channel,
            started: Instant::now(),
            started_at: SystemTime::now(),
        });
        Ok(())
    }

    async fn download_log_and_stop_logging(
        &self,
        channel: Channel,
        erase: bool,
        progress: mpsc::Sender<f64>,
    ) -> Result<Vec<Sample>, DeviceError> {
        let (samples, fail) = {
            let mut inner = self.inner();
            if inner.state != ConnectionState::Connected {
                return Err(DeviceError::NotConnected);
            }
            let logging = match inner.logging.take() {
                Some(logging) if logging.channel == channel => logging,
                other => {
                    inner.logging = other;
                    return Err(format!("{channel} is not being logged").into());
                }
            };

            // Fill in what the device would have logged while we were away
            if self.config.log_rate_hz > 0.0 && self.config.log_rate_hz.is_finite() {
                let count = (logging.started.elapsed().as_secs_f64() * self.config.log_rate_hz)
                    .floor() as usize;
                let range = self.config.accelerometer_range;
                for i in 0..count {
                    let t = i as f64 / self.config.log_rate_hz;
                    let Some(timestamp) = Duration::try_from_secs_f64(t)
                        .ok()
                        .and_then(|offset| logging.started_at.checked_add(offset))
                    else {
                        break;
                    };
                    let value = motion::value_at(channel, t, range);
                    inner.flash.push(Sample::new(timestamp, value));
                }
            }

            let samples: Vec<Sample> = inner
                .flash
                .iter()
                .filter(|s| s.channel() == channel)
                .copied()
                .collect();
            (samples, inner.faults.fail_download)
        };

        let steps = self.config.download_steps.max(1);
        for step in 0..=steps {
            if fail && step * 2 > steps {
                return Err("log download interrupted".into());
            }
            let _ = progress.send(step as f64 / steps as f64).await;
            tokio::task::yield_now().await;
        }

        if erase {
            self.inner().erase_pending = true;
        }
        Ok(samples)
    }
}
