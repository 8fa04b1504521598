use std::{
    fmt::{self, Display},
    os::unix::fs::{FileTypeExt, PermissionsExt},
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use tokio::{
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
    net::{UnixListener, UnixStream},
    sync::watch,
};

use crate::{DhcpvisorError, DhcpvisorResult};

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// How long a connected client gets to send its command.
const CONTROL_READ_TIMEOUT: Duration = Duration::from_secs(5);

/// Pause after a failed accept before trying again.
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(100);

/// Reply to a command that was accepted.
pub const CONTROL_REPLY_OK: &str = "OK";

/// Prefix of the reply to a command that was refused.
pub const CONTROL_REPLY_ERR: &str = "ERR";

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// Requests that the daemon exit. Cloned into every place that may ask for it.
#[derive(Debug, Clone)]
pub struct ExitHandle {
    tx: Arc<watch::Sender<bool>>,
}

/// Observes exit requests made through an [`ExitHandle`].
#[derive(Debug, Clone)]
pub struct ExitSignal {
    rx: watch::Receiver<bool>,
}

/// A command accepted on the control socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlCommand {
    /// Stop the managed service and exit.
    Exit,

    /// Anything else.
    Unknown(String),
}

/// The administrative control channel.
///
/// Listens on a Unix socket for one-line commands. Each connection carries a single command and
/// gets a single-line reply.
#[derive(Debug)]
pub struct ControlServer {
    listener: UnixListener,
    path: PathBuf,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl ExitHandle {
    /// Asks the daemon to exit. Asking more than once has no further effect.
    pub fn request_exit(&self) {
        self.tx.send_replace(true);
    }

    /// A signal that observes requests made through this handle.
    pub fn subscribe(&self) -> ExitSignal {
        ExitSignal {
            rx: self.tx.subscribe(),
        }
    }
}

impl ExitSignal {
    /// Whether exit has been requested.
    pub fn is_requested(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once exit has been requested. Cancel safe.
    pub async fn requested(&mut self) {
        loop {
            if *self.rx.borrow_and_update() {
                return;
            }

            // All handles are gone, so exit can never be requested
            if self.rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}

impl ControlServer {
    /// Binds the control socket at `path`.
    ///
    /// A socket left behind by an earlier run is replaced. Any other kind of file at `path` is an
    /// error. The socket is only accessible to its owner.
    pub async fn bind(path: impl AsRef<Path>) -> DhcpvisorResult<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        match tokio::fs::symlink_metadata(&path).await {
            Ok(metadata) if metadata.file_type().is_socket() => {
                tracing::debug!(path = %path.display(), "removing stale control socket");
                tokio::fs::remove_file(&path).await?;
            }
            Ok(_) => {
                return Err(DhcpvisorError::ControlChannel(format!(
                    "{} exists and is not a socket",
                    path.display()
                )));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        let listener = UnixListener::bind(&path).map_err(|e| {
            DhcpvisorError::ControlChannel(format!(
                "failed to bind control socket {}: {}",
                path.display(),
                e
            ))
        })?;

        tokio::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o600)).await?;
        tracing::info!(path = %path.display(), "control channel listening");

        Ok(Self { listener, path })
    }

    /// The socket path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Serves commands until exit is requested, then removes the socket.
    ///
    /// Each connection is handled on its own task, so a client that stalls only holds up itself.
    pub async fn serve(self, exit: ExitHandle) {
        let mut requested = exit.subscribe();

        loop {
            let accepted = tokio::select! {
                biased;
                _ = requested.requested() => break,
                accepted = self.listener.accept() => accepted,
            };

            let stream = match accepted {
                Ok((stream, _)) => stream,
                Err(e) => {
                    tracing::warn!("failed to accept control connection: {}", e);
                    tokio::time::sleep(ACCEPT_ERROR_BACKOFF).await;
                    continue;
                }
            };

            tokio::spawn(serve_connection(stream, exit.clone()));
        }

        if let Err(e) = tokio::fs::remove_file(&self.path).await {
            tracing::debug!(path = %self.path.display(), "failed to remove control socket: {}", e);
        }
    }
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Creates a connected exit handle and signal.
pub fn exit_channel() -> (ExitHandle, ExitSignal) {
    let (tx, rx) = watch::channel(false);
    (ExitHandle { tx: Arc::new(tx) }, ExitSignal { rx })
}

/// Sends `command` to the control socket at `path` and returns the reply line.
pub async fn send_command(path: impl AsRef<Path>, command: &ControlCommand) -> DhcpvisorResult<String> {
    let path = path.as_ref();
    let mut stream = UnixStream::connect(path).await.map_err(|e| {
        DhcpvisorError::ControlChannel(format!("failed to connect to {}: {}", path.display(), e))
    })?;

    stream.write_all(format!("{}\n", command).as_bytes()).await?;
    stream.flush().await?;

    let mut reply = String::new();
    BufReader::new(stream).read_line(&mut reply).await?;

    Ok(reply.trim_end().to_string())
}

async fn serve_connection(stream: UnixStream, exit: ExitHandle) {
    match handle_connection(stream).await {
        Ok(ControlCommand::Exit) => {
            tracing::info!("exit requested over the control channel");
            exit.request_exit();
        }
        Ok(ControlCommand::Unknown(command)) => {
            tracing::warn!(command = %command, "ignoring unknown control command");
        }
        Err(e) => tracing::warn!("control connection failed: {}", e),
    }
}

async fn handle_connection(stream: UnixStream) -> DhcpvisorResult<ControlCommand> {
    let (reader, mut writer) = stream.into_split();
    let mut line = String::new();

    tokio::time::timeout(
        CONTROL_READ_TIMEOUT,
        BufReader::new(reader).read_line(&mut line),
    )
    .await
    .map_err(|_| DhcpvisorError::ControlChannel("timed out waiting for a command".to_string()))??;

    let command = ControlCommand::from(line.as_str());
    let reply = match &command {
        ControlCommand::Exit => format!("{}\n", CONTROL_REPLY_OK),
        ControlCommand::Unknown(word) => {
            format!("{} unknown command: {}\n", CONTROL_REPLY_ERR, word)
        }
    };

    writer.write_all(reply.as_bytes()).await?;
    writer.flush().await?;

    Ok(command)
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

impl From<&str> for ControlCommand {
    fn from(line: &str) -> Self {
        match line.trim() {
            "exit" => ControlCommand::Exit,
            other => ControlCommand::Unknown(other.to_string()),
        }
    }
}

impl Display for ControlCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControlCommand::Exit => write!(f, "exit"),
            ControlCommand::Unknown(command) => write!(f, "{}", command),
        }
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn test_control_command_parsing() {
        assert_eq!(ControlCommand::from("exit\n"), ControlCommand::Exit);
        assert_eq!(ControlCommand::from("  exit  "), ControlCommand::Exit);
        assert_eq!(
            ControlCommand::from("reload\n"),
            ControlCommand::Unknown("reload".into())
        );
    }

    #[tokio::test]
    async fn test_exit_signal_resolves_after_request() {
        let (handle, mut signal) = exit_channel();
        assert!(!signal.is_requested());

        let waiter = tokio::spawn(async move {
            signal.requested().await;
            signal.is_requested()
        });

        handle.request_exit();
        handle.request_exit();
        assert!(waiter.await.unwrap());
    }

    #[tokio::test]
    async fn test_exit_command_is_acknowledged() -> anyhow::Result<()> {
        let temp_dir = TempDir::new()?;
        let path = temp_dir.path().join("ctl").join("dhcpvisord.ctl");

        let (handle, mut signal) = exit_channel();
        let server = ControlServer::bind(&path).await?;
        let serving = tokio::spawn(server.serve(handle));

        let reply = send_command(&path, &ControlCommand::Unknown("status".into())).await?;
        assert_eq!(reply, "ERR unknown command: status");
        assert!(!signal.is_requested());

        let reply = send_command(&path, &ControlCommand::Exit).await?;
        assert_eq!(reply, "OK");

        tokio::time::timeout(Duration::from_secs(5), signal.requested()).await?;
        serving.await?;
        assert!(!path.exists());
        Ok(())
    }

    #[tokio::test]
    async fn test_idle_client_does_not_hold_up_exit() -> anyhow::Result<()> {
        let temp_dir = TempDir::new()?;
        let path = temp_dir.path().join("dhcpvisord.ctl");

        let (handle, mut signal) = exit_channel();
        let server = ControlServer::bind(&path).await?;
        let serving = tokio::spawn(server.serve(handle));

        let _idle = UnixStream::connect(&path).await?;

        let reply = tokio::time::timeout(
            Duration::from_secs(1),
            send_command(&path, &ControlCommand::Exit),
        )
        .await??;
        assert_eq!(reply, CONTROL_REPLY_OK);

        tokio::time::timeout(Duration::from_secs(1), signal.requested()).await?;
        tokio::time::timeout(Duration::from_secs(1), serving).await??;
        assert!(!path.exists());
        Ok(())
    }

    #[tokio::test]
    async fn test_serve_stops_on_exit_from_elsewhere() -> anyhow::Result<()> {
        let temp_dir = TempDir::new()?;
        let path = temp_dir.path().join("dhcpvisord.ctl");

        let (handle, _signal) = exit_channel();
        let server = ControlServer::bind(&path).await?;
        let serving = tokio::spawn(server.serve(handle.clone()));

        handle.request_exit();
        tokio::time::timeout(Duration::from_secs(1), serving).await??;
        assert!(!path.exists());
        Ok(())
    }

    #[tokio::test]
    async fn test_bind_replaces_stale_socket_only() -> anyhow::Result<()> {
        let temp_dir = TempDir::new()?;
        let path = temp_dir.path().join("dhcpvisord.ctl");

        drop(ControlServer::bind(&path).await?);
        assert!(path.exists());

        let server = ControlServer::bind(&path).await?;
        let mode = std::fs::metadata(server.path())?.permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
        drop(server);

        let regular = temp_dir.path().join("not-a-socket");
        std::fs::write(&regular, "data")?;
        assert!(matches!(
            ControlServer::bind(&regular).await,
            Err(DhcpvisorError::ControlChannel(_))
        ));
        Ok(())
    }
}
