use std::{error::Error, io::Write, time::Duration};

use clap::Args;
use tabled::settings::{Panel, Style};
use tabled::{Table, Tabled};
use tokio::sync::mpsc;

use crate::{
    device::Channel,
    session::{SessionClient, SessionStatus},
};

#[derive(Args, Debug, Clone)]
pub struct CaptureArgs {
    /// Sensor-fusion output to capture. Defaults to the configured channel.
    #[arg(short, long)]
    pub channel: Option<Channel>,
    /// How long to capture for, in seconds
    #[arg(short, long, default_value = "5", value_parser = parse_seconds)]
    pub seconds: Duration,
    /// Export the captured samples as CSV
    #[arg(short, long, action)]
    pub export: bool,
    /// Prefix of the exported file name. Defaults to the configured label.
    #[arg(long)]
    pub label: Option<String>,
}

fn parse_seconds(arg: &str) -> Result<Duration, String> {
    let secs: f64 = arg.parse().map_err(|e| format!("{e}"))?;
    Duration::try_from_secs_f64(secs).map_err(|_| format!("{arg} is not a valid duration"))
}

#[derive(Tabled)]
struct StatusRow {
    #[tabled(rename = "Connection")]
    connection: String,
    #[tabled(rename = "Battery")]
    battery: String,
    #[tabled(rename = "Temperature")]
    temperature: String,
    #[tabled(rename = "Stream")]
    stream: String,
    #[tabled(rename = "Log")]
    log: String,
    #[tabled(rename = "Samples")]
    samples: usize,
}

impl From<&SessionStatus> for StatusRow {
    fn from(status: &SessionStatus) -> Self {
        let channel = |c: Option<Channel>| c.map(|c| format!(" ({c})")).unwrap_or_default();
        Self {
            connection: status
                .connection
                .map(|c| c.to_string())
                .unwrap_or_else(|| "Released".to_string()),
            battery: status
                .telemetry
                .battery
                .map(|b| format!("{b}%"))
                .unwrap_or_else(|| "-".to_string()),
            temperature: status
                .telemetry
                .temperature
                .map(|t| format!("{t:.1}°C"))
                .unwrap_or_else(|| "-".to_string()),
            stream: format!("{:?}{}", status.stream, channel(status.stream_channel)),
            log: format!("{:?}{}", status.log, channel(status.log_channel)),
            samples: status.samples,
        }
    }
}

pub async fn handle_stream(
    client: &SessionClient,
    capture: CaptureArgs,
    default_channel: Channel,
) -> Result<(), Box<dyn Error>> {
    let channel = capture.channel.unwrap_or(default_channel);
    client.connect().await?;
    client.start_stream(channel).await?;
    println!("Streaming {channel} for {:?}", capture.seconds);

    tokio::time::sleep(capture.seconds).await;
    client.stop_stream().await?;

    let status = client.get_status().await?;
    println!("Collected {} {channel} samples", status.samples);
    finish(client, capture).await
}

pub async fn handle_log(
    client: &SessionClient,
    capture: CaptureArgs,
    default_channel: Channel,
) -> Result<(), Box<dyn Error>> {
    let channel = capture.channel.unwrap_or(default_channel);
    client.connect().await?;
    client.start_logging(channel).await?;
    println!("Logging {channel} for {:?}", capture.seconds);
    tokio::time::sleep(capture.seconds).await;

    // The manager drops the progress sender once the download is done
    let (tx, mut rx) = mpsc::channel(64);
    let printer = tokio::spawn(async move {
        while let Some(fraction) = rx.recv().await {
            print!("\rDownloading: {:>3.0}%", fraction * 100.0);
            let _ = std::io::stdout().flush();
        }
        println!();
    });
    let result = client.stop_and_download(tx).await;
    printer.await?;

    let report = result?;
    println!("Downloaded {} {channel} samples", report.samples);
    if let Some(err) = report.cleanup_error {
        println!("Warning: {err}");
    }
    finish(client, capture).await
}

/// Export if requested and disconnect
async fn finish(client: &SessionClient, capture: CaptureArgs) -> Result<(), Box<dyn Error>> {
    if capture.export {
        let name = client.export(capture.label).await?;
        println!("Exported samples to: {name}");
    }
    client.disconnect().await?;
    Ok(())
}

pub async fn handle_status(client: &SessionClient, json: bool) -> Result<(), Box<dyn Error>> {
    client.connect().await?;

    // Telemetry is read in the background after connecting
    let mut status = client.get_status().await?;
    for _ in 0..20 {
        if status.telemetry.battery.is_some() && status.telemetry.temperature.is_some() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
        status = client.get_status().await?;
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&status)?);
    } else {
        let mut table = Table::new(vec![StatusRow::from(&status)]);
        table
            .with(Style::modern_rounded())
            .with(Panel::header("Device Status"));
        println!("{table}");
    }

    client.disconnect().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_seconds() {
        assert_eq!(parse_seconds("5"), Ok(Duration::from_secs(5)));
        assert_eq!(parse_seconds("0.25"), Ok(Duration::from_millis(250)));
        for arg in ["inf", "NaN", "-1", "1e300", "soon"] {
            assert!(parse_seconds(arg).is_err(), "{arg} was accepted");
        }
    }

    #[test]
    fn test_capture_args_reject_bad_seconds() {
        use clap::Parser;

        #[derive(Parser)]
        struct Cli {
            #[command(flatten)]
            capture: CaptureArgs,
        }

        let cli = Cli::try_parse_from(["fusionlink"]).unwrap();
        assert_eq!(cli.capture.seconds, Duration::from_secs(5));
        let cli = Cli::try_parse_from(["fusionlink", "--seconds", "1.5"]).unwrap();
        assert_eq!(cli.capture.seconds, Duration::from_millis(1500));
        assert!(Cli::try_parse_from(["fusionlink", "--seconds", "inf"]).is_err());
    }
}
