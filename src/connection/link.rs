// Device link capabilities: acquisition, command invocation and shells

use std::future::Future;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

/// Capacity of the channels backing output streams and shell input
pub const STREAM_CHANNEL_CAPACITY: usize = 64;

/// Device link error types
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LinkError {
    /// Nothing selected, no device attached, or the filter matched none
    #[error("No device selected")]
    NoDeviceSelected,

    #[error("Device authentication failed: {0}")]
    Authentication(String),

    #[error("Transport error: {0}")]
    Transport(String),
}

impl From<std::io::Error> for LinkError {
    fn from(err: std::io::Error) -> Self {
        LinkError::Transport(err.to_string())
    }
}

/// Hands out links to a user-selected, authenticated device
pub trait DeviceLinkProvider: Send + Sync {
    type Link: DeviceLink;

    fn acquire(&self) -> impl Future<Output = Result<Self::Link, LinkError>> + Send;

    /// Starts logging device arrivals and removals until the guard is dropped
    fn watch(&self) -> Option<DeviceWatcher> {
        None
    }
}

/// Command execution on an acquired device
pub trait DeviceLink: Send + Sync + 'static {
    fn serial(&self) -> &str;

    /// Runs `command` in a non-interactive shell; the stream ends with the process
    /// and `OutputStream::finish` reports how it exited
    fn invoke(
        &self,
        command: &str,
    ) -> impl Future<Output = Result<OutputStream, LinkError>> + Send;

    /// Starts an interactive shell, or `program` with an attached stdin
    fn spawn_shell(
        &self,
        program: Option<&str>,
    ) -> impl Future<Output = Result<ShellProcess, LinkError>> + Send;
}

/// Exit status sender paired with an `OutputStream`
pub type ExitSender = oneshot::Sender<Result<(), LinkError>>;

/// Decoded text output of a device process
#[derive(Debug)]
pub struct OutputStream {
    rx: mpsc::Receiver<String>,
    exit: Option<oneshot::Receiver<Result<(), LinkError>>>,
}

impl OutputStream {
    /// Stream plus the sender feeding it; the stream ends when every sender is dropped
    pub fn channel(capacity: usize) -> (mpsc::Sender<String>, Self) {
        let (tx, rx) = mpsc::channel(capacity);
        (tx, Self { rx, exit: None })
    }

    /// Like `channel`, for a process whose exit status is reported separately
    pub fn with_exit(capacity: usize) -> (mpsc::Sender<String>, ExitSender, Self) {
        let (tx, rx) = mpsc::channel(capacity);
        let (exit_tx, exit_rx) = oneshot::channel();
        (
            tx,
            exit_tx,
            Self {
                rx,
                exit: Some(exit_rx),
            },
        )
    }

    pub async fn next_chunk(&mut self) -> Option<String> {
        self.rx.recv().await
    }

    /// Waits for the process to exit; unread output is discarded
    pub async fn finish(self) -> Result<(), LinkError> {
        let Self { rx, exit } = self;
        drop(rx);

        match exit {
            None => Ok(()),
            Some(exit) => exit.await.unwrap_or_else(|_| {
                Err(LinkError::Transport(
                    "device process ended without a status".to_string(),
                ))
            }),
        }
    }

    pub async fn read_to_string(mut self) -> String {
        let mut text = String::new();
        while let Some(chunk) = self.next_chunk().await {
            text.push_str(&chunk);
        }
        text
    }
}

/// Writer for a device process's stdin; clones share the same process
#[derive(Debug, Clone)]
pub struct ShellInput {
    tx: mpsc::Sender<Vec<u8>>,
}

impl ShellInput {
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<Vec<u8>>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }

    pub async fn write(&self, bytes: &[u8]) -> Result<(), LinkError> {
        self.tx
            .send(bytes.to_vec())
            .await
            .map_err(|_| LinkError::Transport("shell input closed".to_string()))
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// An interactive process on the device
#[derive(Debug)]
pub struct ShellProcess {
    pub input: ShellInput,
    pub output: OutputStream,
}

/// Scoped device watcher; the background task stops when this is dropped
#[derive(Debug)]
pub struct DeviceWatcher {
    task: JoinHandle<()>,
}

impl DeviceWatcher {
    pub fn new(task: JoinHandle<()>) -> Self {
        Self { task }
    }
}

impl Drop for DeviceWatcher {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_output_stream_reads_until_senders_drop() {
        let (tx, stream) = OutputStream::channel(4);
        tokio::spawn(async move {
            tx.send("Starting tone app\n".to_string()).await.unwrap();
            tx.send("Press ^C to exit.\n".to_string()).await.unwrap();
        });

        assert_eq!(
            stream.read_to_string().await,
            "Starting tone app\nPress ^C to exit.\n"
        );
    }

    #[tokio::test]
    async fn test_finish_reports_exit_status() {
        let (tx, stream) = OutputStream::channel(4);
        drop(tx);
        assert_eq!(stream.finish().await, Ok(()));

        let (tx, exit_tx, stream) = OutputStream::with_exit(4);
        tokio::spawn(async move {
            let _ = tx.send("error: closed\n".to_string()).await;
            let _ = exit_tx.send(Err(LinkError::Transport("error: closed".to_string())));
        });
        assert_eq!(
            stream.finish().await,
            Err(LinkError::Transport("error: closed".to_string()))
        );

        // Producer gone before reporting
        let (_, exit_tx, stream) = OutputStream::with_exit(4);
        drop(exit_tx);
        assert!(matches!(stream.finish().await, Err(LinkError::Transport(_))));
    }

    #[tokio::test]
    async fn test_shell_input_reports_closed_process() {
        let (input, mut rx) = ShellInput::channel(4);
        input.write(b"v\n").await.unwrap();
        assert_eq!(rx.recv().await, Some(b"v\n".to_vec()));

        drop(rx);
        assert!(input.is_closed());
        assert!(matches!(
            input.write(b"b\n").await,
            Err(LinkError::Transport(_))
        ));
    }

    #[tokio::test]
    async fn test_watcher_aborts_task_on_drop() {
        let (alive_tx, alive_rx) = tokio::sync::oneshot::channel::<()>();
        let task = tokio::spawn(async move {
            let _alive = alive_tx;
            std::future::pending::<()>().await;
        });
        let watcher = DeviceWatcher::new(task);

        drop(watcher);
        // The sender is only dropped when the task is torn down
        assert!(alive_rx.await.is_err());
    }
}
