//! Log rotation for captured child process output.
//!
//! Writers never touch the file directly. Every chunk is sent over a channel to a background task
//! that owns the file, so any number of output pumps can share one log without locking. When the
//! file would grow past its maximum size the task:
//! 1. Renames the current log file to the `.old` extension, replacing any previous backup
//! 2. Creates a new empty log file
//! 3. Continues writing to the new file

use std::{
    io::{self, Write},
    path::{Path, PathBuf},
};
use tokio::{
    fs::{remove_file, rename, File, OpenOptions},
    io::AsyncWriteExt,
    sync::mpsc::{self, UnboundedReceiver, UnboundedSender},
    task::JoinHandle,
};

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// The default maximum size of a log file before it is rotated: 10 MiB.
pub const DEFAULT_LOG_MAX_SIZE: u64 = 10 * 1024 * 1024;

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// A log file that is rotated once it reaches a maximum size.
///
/// # Example
///
/// ```no_run
/// use std::io::Write;
/// use visorutils::RotatingLog;
///
/// #[tokio::main]
/// async fn main() -> std::io::Result<()> {
///     let log = RotatingLog::new("dnsmasq.log").await?;
///     let mut writer = log.get_sync_writer();
///     writer.write_all(b"started\n")?;
///     drop(writer);
///     log.close().await;
///     Ok(())
/// }
/// ```
pub struct RotatingLog {
    /// Path to the current log file
    path: PathBuf,

    /// Maximum size in bytes before rotation
    max_size: u64,

    /// Channel feeding the background writer
    tx: UnboundedSender<Vec<u8>>,

    /// Background task owning the file
    background_task: JoinHandle<()>,
}

/// A sync writer that sends all written data to a [`RotatingLog`].
#[derive(Clone)]
pub struct SyncChannelWriter {
    tx: UnboundedSender<Vec<u8>>,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl RotatingLog {
    /// Opens a rotating log with [`DEFAULT_LOG_MAX_SIZE`].
    pub async fn new(path: impl AsRef<Path>) -> io::Result<Self> {
        Self::with_max_size(path, DEFAULT_LOG_MAX_SIZE).await
    }

    /// Opens (or creates) the log file at `path` in append mode.
    ///
    /// ## Errors
    ///
    /// Will return an error if the file cannot be opened or its metadata cannot be read.
    pub async fn with_max_size(path: impl AsRef<Path>, max_size: u64) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        let current_size = file.metadata().await?.len();
        let (tx, rx) = mpsc::unbounded_channel();

        let background_task = tokio::spawn(handle_channel_data(
            rx,
            file,
            path.clone(),
            max_size,
            current_size,
        ));

        Ok(Self {
            path,
            max_size,
            tx,
            background_task,
        })
    }

    /// Get a sync writer that implements `std::io::Write`.
    pub fn get_sync_writer(&self) -> SyncChannelWriter {
        SyncChannelWriter {
            tx: self.tx.clone(),
        }
    }

    /// The path of the active log file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The size at which the log is rotated.
    pub fn max_size(&self) -> u64 {
        self.max_size
    }

    /// Waits until every writer has been dropped and all queued data is on disk.
    pub async fn close(self) {
        drop(self.tx);
        if let Err(e) = self.background_task.await {
            tracing::error!("log writer task failed: {}", e);
        }
    }
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Moves the current log aside as `.old` and opens a fresh file at `path`.
async fn do_rotation(file: File, path: &Path) -> io::Result<File> {
    file.sync_all().await?;
    drop(file);

    let backup_path = path.with_extension("old");
    if backup_path.exists() {
        remove_file(&backup_path).await?;
    }

    rename(path, &backup_path).await?;

    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await
}

/// Background task that owns the file and drains the channel.
async fn handle_channel_data(
    mut rx: UnboundedReceiver<Vec<u8>>,
    mut file: File,
    path: PathBuf,
    max_size: u64,
    mut current_size: u64,
) {
    while let Some(data) = rx.recv().await {
        let data_len = data.len() as u64;

        if current_size > 0 && current_size + data_len > max_size {
            let rotating = match file.try_clone().await {
                Ok(handle) => handle,
                Err(e) => {
                    tracing::error!("failed to clone file handle for rotation: {}", e);
                    continue;
                }
            };

            match do_rotation(rotating, &path).await {
                Ok(new_file) => {
                    file = new_file;
                    current_size = 0;
                }
                Err(e) => tracing::error!("failed to rotate log file: {}", e),
            }
        }

        match file.write_all(&data).await {
            Ok(()) => current_size += data_len,
            Err(e) => tracing::error!("failed to write to log file: {}", e),
        }
    }

    if let Err(e) = file.flush().await {
        tracing::error!("failed to flush log file: {}", e);
    }
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

impl Write for SyncChannelWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.tx
            .send(buf.to_vec())
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "log writer task has stopped"))?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------
