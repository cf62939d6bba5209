use std::{error::Error, time::Duration};

use tokio::sync::mpsc::channel;

use crate::{
    config::{FaultPlan, SimulatorConfig},
    device::{Channel, ConnectionState, Device, SampleValue},
};

use super::SimulatedDevice;

fn quiet_config() -> SimulatorConfig {
    SimulatorConfig {
        sample_rate_hz: 0.0,
        log_rate_hz: 0.0,
        connect_delay_ms: 0,
        download_steps: 4,
        ..Default::default()
    }
}

#[tokio::test]
async fn test_connect_emits_transitions() -> Result<(), Box<dyn Error>> {
    let device = SimulatedDevice::new(quiet_config());
    let mut states = device.state_changes();

    device.connect().await?;
    assert_eq!(device.state(), ConnectionState::Connected);
    assert_eq!(states.recv().await?, ConnectionState::Connecting);
    assert_eq!(states.recv().await?, ConnectionState::Connected);

    device.disconnect().await?;
    assert_eq!(states.recv().await?, ConnectionState::Disconnecting);
    assert_eq!(states.recv().await?, ConnectionState::Disconnected);

    Ok(())
}

#[tokio::test]
async fn test_stream_error_after_limit() -> Result<(), Box<dyn Error>> {
    let mut config = quiet_config();
    config.faults = FaultPlan {
        stream_error_after: Some(2),
        ..Default::default()
    };
    let device = SimulatedDevice::new(config);
    device.connect().await?;

    let (tx, mut rx) = channel(8);
    device.start_notifications(Channel::Gravity, tx).await?;
    let value = SampleValue::Gravity {
        x: 0.0,
        y: 0.0,
        z: 1.0,
    };
    assert!(device.push_sample(value));
    assert!(device.push_sample(value));
    assert!(!device.push_sample(value));

    assert!(rx.recv().await.unwrap().is_ok());
    assert!(rx.recv().await.unwrap().is_ok());
    assert!(rx.recv().await.unwrap().is_err());

    Ok(())
}

#[tokio::test]
async fn test_download_and_erase() -> Result<(), Box<dyn Error>> {
    let device = SimulatedDevice::new(quiet_config());
    device.connect().await?;
    device.start_logging(Channel::EulerAngle).await?;
    for yaw in [0.0, 90.0, 180.0] {
        let value = SampleValue::EulerAngle {
            pitch: 0.0,
            roll: 0.0,
            yaw,
        };
        assert!(device.push_sample(value));
    }
    assert_eq!(device.flash_len(), 3);

    let (tx, mut rx) = channel(16);
    let samples = device
        .download_log_and_stop_logging(Channel::EulerAngle, true, tx)
        .await?;
    assert_eq!(samples.len(), 3);
    assert_eq!(device.logging_channel(), None);

    let mut progress = Vec::new();
    while let Ok(value) = rx.try_recv() {
        progress.push(value);
    }
    assert_eq!(progress, vec![0.0, 0.25, 0.5, 0.75, 1.0]);

    // Flash is only erased once the connection drops
    assert_eq!(device.flash_len(), 3);
    device.disconnect().await?;
    assert_eq!(device.flash_len(), 0);

    Ok(())
}

#[tokio::test]
async fn test_failed_download_keeps_flash() -> Result<(), Box<dyn Error>> {
    let device = SimulatedDevice::new(quiet_config());
    device.connect().await?;
    device.start_logging(Channel::Quaternion).await?;
    device.push_sample(SampleValue::Quaternion {
        x: 0.0,
        y: 0.0,
        z: 0.0,
        w: 1.0,
    });
    device.set_faults(FaultPlan {
        fail_download: true,
        ..Default::default()
    });

    let (tx, _rx) = channel(16);
    let result = device
        .download_log_and_stop_logging(Channel::Quaternion, true, tx)
        .await;
    assert!(result.is_err());

    device.disconnect().await?;
    assert_eq!(device.flash_len(), 1);

    Ok(())
}

#[tokio::test]
async fn test_unrepresentable_rates_generate_nothing() -> Result<(), Box<dyn Error>> {
    for rate in [f64::INFINITY, f64::NAN, 1.0e-300] {
        let mut config = quiet_config();
        config.sample_rate_hz = rate;
        config.log_rate_hz = rate;
        let device = SimulatedDevice::new(config);
        device.connect().await?;

        let (tx, mut rx) = channel(8);
        device.start_notifications(Channel::Gravity, tx).await?;
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(rx.try_recv().is_err());
        device.stop_notifications(Channel::Gravity).await?;

        device.start_logging(Channel::Gravity).await?;
        let (progress, _progress_rx) = channel(16);
        let samples = device
            .download_log_and_stop_logging(Channel::Gravity, false, progress)
            .await?;
        assert!(samples.is_empty());
    }
    Ok(())
}

#[tokio::test]
async fn test_stalled_requests_never_answer() -> Result<(), Box<dyn Error>> {
    let device = SimulatedDevice::new(quiet_config());
    device.connect().await?;
    device.set_faults(FaultPlan {
        stall_requests: true,
        ..Default::default()
    });

    let wait = Duration::from_millis(20);
    assert!(tokio::time::timeout(wait, device.disconnect()).await.is_err());
    assert!(tokio::time::timeout(wait, device.set_fusion_mode(Default::default()))
        .await
        .is_err());
    assert!(tokio::time::timeout(wait, device.stop_notifications(Channel::Gravity))
        .await
        .is_err());
    assert_eq!(device.state(), ConnectionState::Connected);
    Ok(())
}
