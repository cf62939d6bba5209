use std::{
    future::Future,
    sync::{Arc, Mutex, MutexGuard, Weak},
    time::Duration,
};

use tokio::sync::{
    broadcast::{self, error::RecvError, error::TryRecvError},
    mpsc,
};

use crate::{
    constants::{DEFAULT_REQUEST_TIMEOUT_SECS, LED_FLASH_COUNT},
    device::{ConnectionState, Device, DeviceError, LedColor},
};

use super::{ConnectionError, SessionError};

type Observer = Arc<dyn Fn(ConnectionState) + Send + Sync>;

/// Telemetry read after a successful connection
#[derive(Debug, Clone, PartialEq)]
pub enum TelemetryReading {
    Battery(Result<u8, DeviceError>),
    Temperature(Result<f64, DeviceError>),
}

#[derive(Default)]
struct Registry {
    observers: Vec<(u64, Observer)>,
    next_id: u64,
    revoked: bool,
}

/// Control messages for the task delivering state changes to observers
#[derive(Debug)]
enum Control {
    Suspend(mpsc::Sender<()>),
    Resume(mpsc::Sender<()>),
}

/// Handle to a registered connection state observer
#[derive(Debug)]
pub struct Subscription {
    id: u64,
    registry: Weak<Mutex<Registry>>,
}

impl Subscription {
    fn revoked() -> Self {
        Self {
            id: 0,
            registry: Weak::new(),
        }
    }

    /// Returns true while the observer is still being notified
    pub fn is_active(&self) -> bool {
        let Some(registry) = self.registry.upgrade() else {
            return false;
        };
        let registry = lock(&registry);
        registry.observers.iter().any(|(id, _)| *id == self.id)
    }

    /// Stop notifying the observer
    pub fn cancel(self) {
        let Some(registry) = self.registry.upgrade() else {
            return;
        };
        lock(&registry).observers.retain(|(id, _)| *id != self.id);
    }
}

fn lock(registry: &Mutex<Registry>) -> MutexGuard<'_, Registry> {
    registry.lock().unwrap_or_else(|e| e.into_inner())
}

/// The [ConnectionSupervisor] is the only owner of the device connection. It
/// connects and disconnects the device and delivers every connection state
/// transition to registered observers. Delivery can be suspended while the
/// connection is cycled on purpose.
pub struct ConnectionSupervisor<D: Device> {
    device: Weak<D>,
    registry: Arc<Mutex<Registry>>,
    control: mpsc::Sender<Control>,
    connect_timeout: Duration,
    request_timeout: Duration,
}

impl<D: Device> Clone for ConnectionSupervisor<D> {
    fn clone(&self) -> Self {
        Self {
            device: self.device.clone(),
            registry: self.registry.clone(),
            control: self.control.clone(),
            connect_timeout: self.connect_timeout,
            request_timeout: self.request_timeout,
        }
    }
}

impl<D: Device> std::fmt::Debug for ConnectionSupervisor<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionSupervisor")
            .field("connect_timeout", &self.connect_timeout)
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

impl<D: Device> ConnectionSupervisor<D> {
    /// Supervise the given device. Must be called from within a tokio runtime.
    pub fn new(device: &Arc<D>, connect_timeout: Duration) -> Self {
        let registry = Arc::new(Mutex::new(Registry::default()));
        let (control, control_rx) = mpsc::channel(8);
        let weak = Arc::downgrade(device);

        let states = device.state_changes();
        let initial = device.state();
        tokio::spawn(deliver_states(
            states,
            control_rx,
            registry.clone(),
            weak.clone(),
            initial,
        ));

        Self {
            device: weak,
            registry,
            control,
            connect_timeout,
            request_timeout: Duration::from_secs_f64(DEFAULT_REQUEST_TIMEOUT_SECS),
        }
    }

    /// Bound every device request other than connecting by the given timeout
    pub fn with_request_timeout(mut self, request_timeout: Duration) -> Self {
        self.request_timeout = request_timeout;
        self
    }

    /// Borrow the device, failing if the application already released it
    pub fn device(&self) -> Result<Arc<D>, SessionError> {
        self.device.upgrade().ok_or(SessionError::DeviceReleased)
    }

    /// Current connection state, or [None] if the device was released
    pub fn state(&self) -> Option<ConnectionState> {
        self.device.upgrade().map(|d| d.state())
    }

    pub fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }

    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    /// Await a device request, giving up after the request timeout
    pub async fn request<T, F>(&self, name: &'static str, request: F) -> Result<T, SessionError>
    where
        F: Future<Output = Result<T, DeviceError>>,
    {
        match tokio::time::timeout(self.request_timeout, request).await {
            Ok(result) => Ok(result?),
            Err(_) => {
                log::warn!("Device did not answer the {name} request");
                Err(SessionError::RequestTimeout(name, self.request_timeout))
            }
        }
    }

    /// Register a callback invoked on every connection state transition. If
    /// the device was already released the returned subscription is inert.
    /// Callbacks run on the delivery task and must not block.
    pub fn observe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(ConnectionState) + Send + Sync + 'static,
    {
        if self.device.strong_count() == 0 {
            return Subscription::revoked();
        }
        let mut registry = lock(&self.registry);
        if registry.revoked {
            return Subscription::revoked();
        }
        registry.next_id += 1;
        let id = registry.next_id;
        registry.observers.push((id, Arc::new(callback)));
        Subscription {
            id,
            registry: Arc::downgrade(&self.registry),
        }
    }

    /// Stop notifying the given subscription
    pub fn cancel(&self, subscription: Subscription) {
        subscription.cancel();
    }

    /// Number of registered observers
    pub fn observer_count(&self) -> usize {
        lock(&self.registry).observers.len()
    }

    /// Connect to the device, giving up after the connect timeout
    pub async fn connect(&self) -> Result<(), SessionError> {
        let device = self.device()?;
        log::debug!("Connecting with a timeout of {:?}", self.connect_timeout);
        match tokio::time::timeout(self.connect_timeout, device.connect()).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(ConnectionError::Transport(e).into()),
            Err(_) => Err(ConnectionError::Timeout(self.connect_timeout).into()),
        }
    }

    /// Acknowledge a new connection on the device and read its telemetry.
    /// All three requests run independently; readings are sent to `tx` as
    /// they complete.
    pub fn handshake(&self, tx: mpsc::Sender<TelemetryReading>) -> Result<(), SessionError> {
        let device = self.device()?;

        let led = device.clone();
        tokio::spawn(async move {
            if let Err(e) = led.flash_led(LedColor::Green, LED_FLASH_COUNT).await {
                log::warn!("Unable to flash device LED: {e}");
            }
        });

        let battery = device.clone();
        let battery_tx = tx.clone();
        tokio::spawn(async move {
            let reading = battery.read_battery().await;
            drop(battery);
            let _ = battery_tx.send(TelemetryReading::Battery(reading)).await;
        });

        tokio::spawn(async move {
            let reading = device.read_temperature().await;
            drop(device);
            let _ = tx.send(TelemetryReading::Temperature(reading)).await;
        });

        Ok(())
    }

    /// Flash the LED and disconnect from the device
    pub async fn disconnect(&self) -> Result<(), SessionError> {
        let device = self.device()?;
        let flash = device.flash_led(LedColor::Red, LED_FLASH_COUNT);
        if let Err(e) = self.request("LED flash", flash).await {
            log::debug!("Unable to flash device LED: {e}");
        }
        self.disconnect_device(&device).await
    }

    /// Suspend delivery of state transitions to observers
    pub async fn suspend(&self) {
        self.control_request(Control::Suspend).await;
    }

    /// Resume delivery. Transitions that happened while suspended are dropped;
    /// if the device ended up in a different state than observers last saw,
    /// that state is delivered once.
    pub async fn resume(&self) {
        self.control_request(Control::Resume).await;
    }

    async fn control_request(&self, request: fn(mpsc::Sender<()>) -> Control) {
        let (tx, mut rx) = mpsc::channel(1);
        if self.control.send(request(tx)).await.is_err() {
            log::debug!("State delivery task has stopped");
            return;
        }
        rx.recv().await;
    }

    /// Drop and re-establish the connection without observers seeing it.
    /// Used to make the device erase its flash after a log download.
    pub async fn cycle_connection(&self) -> Result<(), SessionError> {
        self.suspend().await;
        let result = self.reconnect().await;
        self.resume().await;
        result
    }

    async fn reconnect(&self) -> Result<(), SessionError> {
        {
            let device = self.device()?;
            self.disconnect_device(&device).await?;
        }
        self.connect().await
    }

    async fn disconnect_device(&self, device: &D) -> Result<(), SessionError> {
        match tokio::time::timeout(self.request_timeout, device.disconnect()).await {
            Ok(result) => Ok(result.map_err(ConnectionError::Transport)?),
            Err(_) => {
                log::warn!("Device did not answer the disconnect request");
                Err(SessionError::RequestTimeout("disconnect", self.request_timeout))
            }
        }
    }
}

/// Deliver state transitions from the device to all observers until the
/// device is dropped or every supervisor handle is gone.
async fn deliver_states<D: Device>(
    mut states: broadcast::Receiver<ConnectionState>,
    mut control: mpsc::Receiver<Control>,
    registry: Arc<Mutex<Registry>>,
    device: Weak<D>,
    initial: ConnectionState,
) {
    let mut suspended = false;
    let mut last_delivered = initial;

    loop {
        tokio::select! {
            biased;

            request = control.recv() => {
                let Some(request) = request else {
                    break;
                };
                match request {
                    Control::Suspend(ack) => {
                        // Transitions queued before the request still count
                        while let Ok(state) = states.try_recv() {
                            if !suspended {
                                last_delivered = state;
                                notify(&registry, state);
                            }
                        }
                        log::debug!("Suspending connection state delivery");
                        suspended = true;
                        let _ = ack.send(()).await;
                    }
                    Control::Resume(ack) => {
                        // Drop everything that queued up while suspended
                        let closed = loop {
                            match states.try_recv() {
                                Ok(_) | Err(TryRecvError::Lagged(_)) => continue,
                                Err(TryRecvError::Empty) => break false,
                                Err(TryRecvError::Closed) => break true,
                            }
                        };
                        suspended = false;
                        log::debug!("Resuming connection state delivery");
                        if let Some(current) = device.upgrade().map(|d| d.state()) {
                            if current != last_delivered {
                                last_delivered = current;
                                notify(&registry, current);
                            }
                        }
                        let _ = ack.send(()).await;
                        if closed {
                            revoke(&registry);
                            break;
                        }
                    }
                }
            }

            state = states.recv() => {
                match state {
                    Ok(state) => {
                        if suspended {
                            log::trace!("Suppressed connection state: {state}");
                            continue;
                        }
                        last_delivered = state;
                        notify(&registry, state);
                    }
                    Err(RecvError::Lagged(count)) => {
                        log::warn!("Missed {count} connection state changes");
                    }
                    Err(RecvError::Closed) => {
                        log::debug!("Device released, revoking state observers");
                        revoke(&registry);
                        break;
                    }
                }
            }
        }
    }
}

fn notify(registry: &Mutex<Registry>, state: ConnectionState) {
    // Call observers without holding the lock so they may cancel themselves
    let observers: Vec<Observer> = lock(registry)
        .observers
        .iter()
        .map(|(_, observer)| observer.clone())
        .collect();
    for observer in observers {
        observer(state);
    }
}

fn revoke(registry: &Mutex<Registry>) {
    let mut registry = lock(registry);
    registry.revoked = true;
    registry.observers.clear();
}
