use std::{
    fs, io,
    path::{Path, PathBuf},
};

use chrono::{DateTime, Local, TimeZone};

use crate::constants::EXPORT_DATE_FORMAT;

use super::{buffer::SampleBuffer, SessionError};

/// Destination for exported sample data. Implementations hand the file to
/// whatever saves or shares it.
pub trait ExportSink: Send + Sync {
    fn deliver(&self, name: &str, bytes: &[u8]) -> io::Result<()>;
}

/// [ExportSink] writing files into a local directory
#[derive(Debug, Clone)]
pub struct FileExportSink {
    directory: PathBuf,
}

impl FileExportSink {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Full path an export with the given name is written to
    pub fn path_for(&self, name: &str) -> PathBuf {
        self.directory.join(name)
    }
}

impl ExportSink for FileExportSink {
    fn deliver(&self, name: &str, bytes: &[u8]) -> io::Result<()> {
        fs::create_dir_all(&self.directory)?;
        let path = self.path_for(name);

        // Write next to the target and rename so readers never see a
        // partial file
        let partial = self.directory.join(format!(".{name}.partial"));
        fs::write(&partial, bytes)?;
        if let Err(e) = fs::rename(&partial, &path) {
            let _ = fs::remove_file(&partial);
            return Err(e);
        }
        log::info!("Exported {} bytes to {path:?}", bytes.len());
        Ok(())
    }
}

/// File name for an export created at the given time,
/// e.g. "SensorFusion_10_14_2026-09_30_05.csv"
pub fn export_name<Tz>(label: &str, time: &DateTime<Tz>) -> String
where
    Tz: TimeZone,
    Tz::Offset: std::fmt::Display,
{
    format!("{label}_{}.csv", time.format(EXPORT_DATE_FORMAT))
}

/// Serialize the buffer and hand it to the sink under a time-stamped name.
/// Returns the name of the exported file.
pub fn export(
    buffer: &SampleBuffer,
    label: &str,
    sink: &dyn ExportSink,
) -> Result<String, SessionError> {
    let name = export_name(label, &Local::now());
    let bytes = buffer.serialize();
    log::debug!("Exporting {} samples as {name}", buffer.len());
    sink.deliver(&name, &bytes)?;
    Ok(name)
}
