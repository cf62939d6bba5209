pub mod session;

use std::{error::Error, io, path::PathBuf, sync::Arc};

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use session::{handle_log, handle_status, handle_stream, CaptureArgs};

use crate::{
    config::SessionConfig,
    constants::APP_NAME,
    drivers::simulated::SimulatedDevice,
    session::{export::FileExportSink, LogStatusSink, SessionManager},
};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to the config file to use instead of searching for one
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,
    #[command(subcommand)]
    pub cmd: Commands,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Stream a sensor-fusion output live from the device
    Stream(CaptureArgs),
    /// Log a sensor-fusion output to device flash, then download it
    Log(CaptureArgs),
    /// Connect to the device and display its status
    Status {
        /// Print the status as JSON
        #[arg(long, action)]
        json: bool,
    },
    /// Generate shell completions
    Completions { shell: Shell },
}

pub async fn main_cli(args: Args) -> Result<(), Box<dyn Error>> {
    if let Commands::Completions { shell } = args.cmd {
        let mut cmd = Args::command();
        clap_complete::generate(shell, &mut cmd, APP_NAME, &mut io::stdout());
        return Ok(());
    }

    let config = SessionConfig::load(args.config)?;
    let default_channel = config.channel;
    let device = Arc::new(SimulatedDevice::new(config.simulator.clone()));
    let export_sink = Arc::new(FileExportSink::new(config.export.directory()));
    log::debug!("Exporting to {:?}", export_sink.directory());

    let mut manager = SessionManager::new(&device, config, Arc::new(LogStatusSink), export_sink);
    let client = manager.client();
    let task = tokio::spawn(async move {
        if let Err(e) = manager.run().await {
            log::error!("Error running session manager: {e}");
        }
    });

    let result = match args.cmd {
        Commands::Stream(capture) => handle_stream(&client, capture, default_channel).await,
        Commands::Log(capture) => handle_log(&client, capture, default_channel).await,
        Commands::Status { json } => handle_status(&client, json).await,
        Commands::Completions { .. } => Ok(()),
    };

    client.stop().await?;
    task.await?;
    result
}
