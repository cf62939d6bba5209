use std::{
    error::Error,
    sync::{Arc, Mutex},
    time::Duration,
};

use tokio::sync::mpsc::channel;

use crate::{
    config::{FaultPlan, SimulatorConfig},
    device::{ConnectionState, Device, LedColor},
    drivers::simulated::SimulatedDevice,
};

use super::{
    supervisor::{ConnectionSupervisor, TelemetryReading},
    ConnectionError, SessionError,
};

fn device() -> Arc<SimulatedDevice> {
    Arc::new(SimulatedDevice::new(SimulatorConfig {
        sample_rate_hz: 0.0,
        log_rate_hz: 0.0,
        connect_delay_ms: 0,
        ..Default::default()
    }))
}

fn recorder() -> (
    Arc<Mutex<Vec<ConnectionState>>>,
    impl Fn(ConnectionState) + Send + Sync + 'static,
) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let observer = {
        let seen = seen.clone();
        move |state| seen.lock().unwrap().push(state)
    };
    (seen, observer)
}

async fn settle() {
    tokio::time::sleep(Duration::from_millis(20)).await;
}

#[tokio::test]
async fn test_observers_see_transitions() -> Result<(), Box<dyn Error>> {
    let device = device();
    let supervisor = ConnectionSupervisor::new(&device, Duration::from_secs(1));
    let (seen, observer) = recorder();
    let subscription = supervisor.observe(observer);
    assert!(subscription.is_active());

    supervisor.connect().await?;
    supervisor.disconnect().await?;
    settle().await;

    assert_eq!(
        *seen.lock().unwrap(),
        vec![
            ConnectionState::Connecting,
            ConnectionState::Connected,
            ConnectionState::Disconnecting,
            ConnectionState::Disconnected,
        ]
    );
    assert!(device.led_flashes().contains(&(LedColor::Red, 3)));
    Ok(())
}

#[tokio::test]
async fn test_cancelled_observer_is_not_called() -> Result<(), Box<dyn Error>> {
    let device = device();
    let supervisor = ConnectionSupervisor::new(&device, Duration::from_secs(1));
    let (seen, observer) = recorder();
    let subscription = supervisor.observe(observer);
    assert_eq!(supervisor.observer_count(), 1);

    supervisor.cancel(subscription);
    assert_eq!(supervisor.observer_count(), 0);

    supervisor.connect().await?;
    settle().await;
    assert!(seen.lock().unwrap().is_empty());
    Ok(())
}

#[tokio::test]
async fn test_released_device_revokes_observers() -> Result<(), Box<dyn Error>> {
    let device = device();
    let supervisor = ConnectionSupervisor::new(&device, Duration::from_secs(1));
    let (_, observer) = recorder();
    let subscription = supervisor.observe(observer);

    drop(device);
    settle().await;

    assert!(!subscription.is_active());
    assert_eq!(supervisor.state(), None);
    assert!(matches!(
        supervisor.connect().await,
        Err(SessionError::DeviceReleased)
    ));

    let (_, observer) = recorder();
    let late = supervisor.observe(observer);
    assert!(!late.is_active());
    Ok(())
}

#[tokio::test]
async fn test_cycle_connection_is_silent() -> Result<(), Box<dyn Error>> {
    let device = device();
    let supervisor = ConnectionSupervisor::new(&device, Duration::from_secs(1));
    let (seen, observer) = recorder();
    let _subscription = supervisor.observe(observer);

    supervisor.connect().await?;
    settle().await;
    supervisor.cycle_connection().await?;
    settle().await;

    assert_eq!(
        *seen.lock().unwrap(),
        vec![ConnectionState::Connecting, ConnectionState::Connected]
    );
    assert_eq!(device.state(), ConnectionState::Connected);
    Ok(())
}

#[tokio::test]
async fn test_resume_delivers_changed_state() -> Result<(), Box<dyn Error>> {
    let device = device();
    let supervisor = ConnectionSupervisor::new(&device, Duration::from_secs(1));
    let (seen, observer) = recorder();
    let _subscription = supervisor.observe(observer);

    supervisor.connect().await?;
    settle().await;

    supervisor.suspend().await;
    device.disconnect().await?;
    settle().await;
    supervisor.resume().await;

    assert_eq!(
        *seen.lock().unwrap(),
        vec![
            ConnectionState::Connecting,
            ConnectionState::Connected,
            ConnectionState::Disconnected,
        ]
    );
    Ok(())
}

#[tokio::test]
async fn test_connect_timeout() -> Result<(), Box<dyn Error>> {
    let device = Arc::new(SimulatedDevice::new(SimulatorConfig {
        connect_delay_ms: 1000,
        ..Default::default()
    }));
    let supervisor = ConnectionSupervisor::new(&device, Duration::from_millis(20));

    let result = supervisor.connect().await;
    assert!(matches!(
        result,
        Err(SessionError::Connection(ConnectionError::Timeout(_)))
    ));
    Ok(())
}

#[tokio::test]
async fn test_handshake_readings_are_independent() -> Result<(), Box<dyn Error>> {
    let device = device();
    device.set_faults(FaultPlan {
        fail_temperature: true,
        ..Default::default()
    });
    let supervisor = ConnectionSupervisor::new(&device, Duration::from_secs(1));
    supervisor.connect().await?;

    let (tx, mut rx) = channel(4);
    supervisor.handshake(tx)?;

    let mut readings = vec![rx.recv().await, rx.recv().await];
    readings.sort_by_key(|r| matches!(r, Some(TelemetryReading::Temperature(_))));
    assert_eq!(readings[0], Some(TelemetryReading::Battery(Ok(87))));
    assert!(matches!(
        readings[1],
        Some(TelemetryReading::Temperature(Err(_)))
    ));
    assert!(device.led_flashes().contains(&(LedColor::Green, 3)));
    Ok(())
}

#[tokio::test]
async fn test_stalled_disconnect_times_out() -> Result<(), Box<dyn Error>> {
    let device = device();
    let supervisor = ConnectionSupervisor::new(&device, Duration::from_secs(1))
        .with_request_timeout(Duration::from_millis(30));
    assert_eq!(supervisor.request_timeout(), Duration::from_millis(30));
    supervisor.connect().await?;
    device.set_faults(FaultPlan {
        stall_requests: true,
        ..Default::default()
    });

    let result = supervisor.disconnect().await;
    assert!(matches!(
        result,
        Err(SessionError::RequestTimeout("disconnect", _))
    ));
    assert!(matches!(
        supervisor.cycle_connection().await,
        Err(SessionError::RequestTimeout("disconnect", _))
    ));
    assert_eq!(device.state(), ConnectionState::Connected);
    Ok(())
}
