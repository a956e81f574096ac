// Devices via le client `adb` en ligne de commande

use crate::config::DeviceConfig;
use crate::connection::link::{
    DeviceLink, DeviceLinkProvider, DeviceWatcher, LinkError, OutputStream, ShellInput,
    ShellProcess, STREAM_CHANNEL_CAPACITY,
};
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;
use tokio::sync::mpsc;

/// One line of `adb devices -l`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdbDevice {
    pub serial: String,
    /// `device`, `unauthorized`, `offline`, `no permissions`, ...
    pub state: String,
    pub product: Option<String>,
    pub model: Option<String>,
}

impl AdbDevice {
    pub fn is_ready(&self) -> bool {
        self.state == "device"
    }
}

/// Parse the output of `adb devices [-l]` (or a `track-devices` frame)
pub fn parse_device_list(text: &str) -> Vec<AdbDevice> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter(|line| !line.starts_with("List of devices") && !line.starts_with('*'))
        .filter_map(|line| {
            let mut tokens = line.split_whitespace();
            let serial = tokens.next()?.to_string();
            let mut state = tokens.next()?.to_string();
            let rest: Vec<&str> = tokens.collect();

            if state == "no" && rest.first() == Some(&"permissions") {
                state = "no permissions".to_string();
            }

            let mut device = AdbDevice {
                serial,
                state,
                product: None,
                model: None,
            };
            for (key, value) in rest.iter().filter_map(|token| token.split_once(':')) {
                match key {
                    "product" => device.product = Some(value.to_string()),
                    "model" => device.model = Some(value.to_string()),
                    _ => {}
                }
            }

            Some(device)
        })
        .collect()
}

/// Pick the device to bind, preferring ready devices among those matching the filters
pub fn select_device(
    devices: &[AdbDevice],
    serial: Option<&str>,
    model: Option<&str>,
) -> Result<AdbDevice, LinkError> {
    let candidates: Vec<&AdbDevice> = devices
        .iter()
        .filter(|d| serial.is_none_or(|s| d.serial == s))
        .filter(|d| model.is_none_or(|m| d.model.as_deref() == Some(m)))
        .collect();

    if let Some(ready) = candidates.iter().find(|d| d.is_ready()) {
        return Ok((*ready).clone());
    }

    match candidates.first() {
        None => Err(LinkError::NoDeviceSelected),
        Some(device) if device.state == "unauthorized" => Err(LinkError::Authentication(format!(
            "{} has not authorized this computer, accept the USB debugging prompt on the device",
            device.serial
        ))),
        Some(device) if device.state == "no permissions" => Err(LinkError::Authentication(
            format!("insufficient USB permissions for {}", device.serial),
        )),
        Some(device) => Err(LinkError::Transport(format!(
            "{} is {}",
            device.serial, device.state
        ))),
    }
}

/// Length prefix of an adb host protocol frame (4 hex digits)
fn parse_frame_length(header: &[u8; 4]) -> Option<usize> {
    let text = std::str::from_utf8(header).ok()?;
    usize::from_str_radix(text, 16).ok()
}

/// (added, removed) serials between two snapshots
fn diff_devices(previous: &BTreeSet<String>, next: &BTreeSet<String>) -> (Vec<String>, Vec<String>) {
    let added = next.difference(previous).cloned().collect();
    let removed = previous.difference(next).cloned().collect();
    (added, removed)
}

/// Incremental UTF-8 decoding of process output; never splits a code point
#[derive(Debug, Default)]
struct Utf8ChunkDecoder {
    pending: Vec<u8>,
}

impl Utf8ChunkDecoder {
    fn push(&mut self, bytes: &[u8]) -> Option<String> {
        self.pending.extend_from_slice(bytes);

        let mut text = String::new();
        let mut consumed = 0;
        loop {
            let rest = &self.pending[consumed..];
            match std::str::from_utf8(rest) {
                Ok(valid) => {
                    text.push_str(valid);
                    consumed = self.pending.len();
                    break;
                }
                Err(e) => {
                    text.push_str(&String::from_utf8_lossy(&rest[..e.valid_up_to()]));
                    match e.error_len() {
                        Some(invalid) => {
                            text.push(char::REPLACEMENT_CHARACTER);
                            consumed += e.valid_up_to() + invalid;
                        }
                        // Truncated sequence at the end: keep it for the next chunk
                        None => {
                            consumed += e.valid_up_to();
                            break;
                        }
                    }
                }
            }
        }

        self.pending.drain(..consumed);
        if text.is_empty() { None } else { Some(text) }
    }

    fn finish(self) -> Option<String> {
        if self.pending.is_empty() {
            None
        } else {
            Some(String::from_utf8_lossy(&self.pending).into_owned())
        }
    }
}

async fn read_stderr<R: AsyncRead + Unpin>(mut reader: R) -> String {
    let mut bytes = Vec::new();
    if let Err(e) = reader.read_to_end(&mut bytes).await {
        tracing::warn!("Failed to read adb stderr: {}", e);
    }
    String::from_utf8_lossy(&bytes).trim().to_string()
}

async fn pump_output<R: AsyncRead + Unpin>(mut reader: R, tx: mpsc::Sender<String>) {
    let mut decoder = Utf8ChunkDecoder::default();
    let mut buf = [0u8; 4096];

    loop {
        match reader.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => {
                if let Some(text) = decoder.push(&buf[..n]) {
                    if tx.send(text).await.is_err() {
                        return;
                    }
                }
            }
            Err(e) => {
                tracing::warn!("Failed to read device output: {}", e);
                break;
            }
        }
    }

    if let Some(text) = decoder.finish() {
        let _ = tx.send(text).await;
    }
}

/// Acquires devices through `adb devices -l`
#[derive(Debug, Clone)]
pub struct AdbCliProvider {
    adb_path: PathBuf,
    serial: Option<String>,
    model: Option<String>,
}

impl AdbCliProvider {
    pub fn new(config: &DeviceConfig) -> Self {
        Self {
            adb_path: config.adb_path.clone(),
            serial: config.serial.clone(),
            model: config.model.clone(),
        }
    }

    async fn list_devices(&self) -> Result<Vec<AdbDevice>, LinkError> {
        let output = Command::new(&self.adb_path)
            .args(["devices", "-l"])
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| {
                LinkError::Transport(format!(
                    "failed to run {}: {}",
                    self.adb_path.display(),
                    e
                ))
            })?;

        if !output.status.success() {
            return Err(LinkError::Transport(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }

        Ok(parse_device_list(&String::from_utf8_lossy(&output.stdout)))
    }
}

impl DeviceLinkProvider for AdbCliProvider {
    type Link = AdbCliLink;

    async fn acquire(&self) -> Result<AdbCliLink, LinkError> {
        let devices = self.list_devices().await?;
        tracing::debug!(count = devices.len(), "Listed adb devices");

        let device = select_device(&devices, self.serial.as_deref(), self.model.as_deref())?;
        tracing::info!(
            serial = %device.serial,
            model = device.model.as_deref().unwrap_or("unknown"),
            "Selected device"
        );

        Ok(AdbCliLink {
            adb_path: self.adb_path.clone(),
            serial: device.serial,
        })
    }

    fn watch(&self) -> Option<DeviceWatcher> {
        let adb_path = self.adb_path.clone();
        Some(DeviceWatcher::new(tokio::spawn(track_devices(adb_path))))
    }
}

/// Follows `adb track-devices` and logs arrivals and removals
async fn track_devices(adb_path: PathBuf) {
    let child = Command::new(&adb_path)
        .arg("track-devices")
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .spawn();

    let mut child = match child {
        Ok(child) => child,
        Err(e) => {
            tracing::warn!("Device watcher unavailable: {}", e);
            return;
        }
    };
    let Some(mut stdout) = child.stdout.take() else {
        return;
    };

    let mut known: BTreeSet<String> = BTreeSet::new();
    loop {
        let mut header = [0u8; 4];
        if stdout.read_exact(&mut header).await.is_err() {
            break;
        }
        let Some(length) = parse_frame_length(&header) else {
            tracing::warn!("Unexpected frame from adb track-devices");
            break;
        };

        let mut payload = vec![0u8; length];
        if stdout.read_exact(&mut payload).await.is_err() {
            break;
        }

        let current: BTreeSet<String> = parse_device_list(&String::from_utf8_lossy(&payload))
            .into_iter()
            .filter(|d| d.is_ready())
            .map(|d| d.serial)
            .collect();

        let (added, removed) = diff_devices(&known, &current);
        for serial in added {
            tracing::info!("Device added: {}", serial);
        }
        for serial in removed {
            tracing::info!("Device removed: {}", serial);
        }
        known = current;
    }

    tracing::debug!("Device watcher stopped");
}

/// A device reachable through `adb -s <serial>`
#[derive(Debug, Clone)]
pub struct AdbCliLink {
    adb_path: PathBuf,
    serial: String,
}

impl AdbCliLink {
    fn shell_command(&self) -> Command {
        let mut command = Command::new(&self.adb_path);
        command
            .arg("-s")
            .arg(&self.serial)
            .arg("shell")
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true);
        command
    }
}

impl DeviceLink for AdbCliLink {
    fn serial(&self) -> &str {
        &self.serial
    }

    async fn invoke(&self, command: &str) -> Result<OutputStream, LinkError> {
        tracing::debug!(serial = %self.serial, "adb shell {}", command);

        let mut child = self
            .shell_command()
            .arg(command)
            .stdin(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| LinkError::Transport("adb stdout unavailable".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| LinkError::Transport("adb stderr unavailable".to_string()))?;

        let (tx, exit_tx, stream) = OutputStream::with_exit(STREAM_CHANNEL_CAPACITY);
        tokio::spawn(async move {
            let ((), errors) = tokio::join!(pump_output(stdout, tx), read_stderr(stderr));

            let exit = match child.wait().await {
                Ok(status) if status.success() => Ok(()),
                Ok(status) => {
                    tracing::warn!("adb shell exited with {}", status);
                    Err(LinkError::Transport(if errors.is_empty() {
                        format!("adb shell exited with {}", status)
                    } else {
                        errors
                    }))
                }
                Err(e) => Err(LinkError::from(e)),
            };
            let _ = exit_tx.send(exit);
        });

        Ok(stream)
    }

    async fn spawn_shell(&self, program: Option<&str>) -> Result<ShellProcess, LinkError> {
        let mut command = self.shell_command();
        if let Some(program) = program {
            command.arg(program);
        }

        let mut child = command.stdin(Stdio::piped()).spawn()?;
        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| LinkError::Transport("adb stdin unavailable".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| LinkError::Transport("adb stdout unavailable".to_string()))?;

        let (input, mut input_rx) = ShellInput::channel(STREAM_CHANNEL_CAPACITY);
        tokio::spawn(async move {
            while let Some(bytes) = input_rx.recv().await {
                if stdin.write_all(&bytes).await.is_err() || stdin.flush().await.is_err() {
                    tracing::warn!("Device shell stdin closed");
                    break;
                }
            }
            // Dropping stdin sends EOF to the remote shell
        });

        let (tx, output) = OutputStream::channel(STREAM_CHANNEL_CAPACITY);
        tokio::spawn(async move {
            pump_output(stdout, tx).await;
            let _ = child.wait().await;
            tracing::debug!("Device shell exited");
        });

        Ok(ShellProcess { input, output })
    }
}
