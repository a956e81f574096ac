// Device session - connection state machine and sequence delivery

use crate::config::{PlaybackConfig, ProtocolConfig};
use crate::connection::link::{
    DeviceLink, DeviceLinkProvider, DeviceWatcher, LinkError, ShellInput, ShellProcess,
};
use crate::connection::reconnect::ReconnectionStrategy;
use crate::connection::status::{SessionPhase, SessionView};
use crate::messaging::notification::{Notification, NotificationCategory, Notifier};
use crate::tone::{CommandEncoder, CommandEncoding, ToneSequence};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// Session error types
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error("No device selected")]
    NoDeviceSelected,

    #[error("Device authentication failed: {0}")]
    Authentication(String),

    #[error("Failed to acquire device: {0}")]
    Acquisition(String),

    #[error("Device already connected")]
    DuplicateConnectRequest,

    #[error("A sequence is already being sent")]
    SendWhileBusy,

    #[error("No device connected")]
    SendWhileDisconnected,

    #[error("Failed to send sequence: {0}")]
    TransportWrite(String),

    /// The session was disposed while the operation was in flight
    #[error("Session disposed")]
    Disposed,
}

impl From<LinkError> for SessionError {
    fn from(err: LinkError) -> Self {
        match err {
            LinkError::NoDeviceSelected => SessionError::NoDeviceSelected,
            LinkError::Authentication(msg) => SessionError::Authentication(msg),
            LinkError::Transport(msg) => SessionError::Acquisition(msg),
        }
    }
}

/// Outcome of an accepted send
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendReport {
    pub encoding: CommandEncoding,
    pub pair_count: usize,
    pub duration_ms: u64,
    /// Command written to the device (empty for a no-op send)
    pub command: String,
}

impl SendReport {
    fn empty(encoding: CommandEncoding) -> Self {
        Self {
            encoding,
            pair_count: 0,
            duration_ms: 0,
            command: String::new(),
        }
    }
}

/// Transport error for writes attempted after dispose; `send` reports it as `Disposed`
fn disposed() -> LinkError {
    LinkError::Transport("session disposed".to_string())
}

/// Tone app kept alive between line-protocol sends
struct ToneApp {
    input: ShellInput,
    drain: JoinHandle<()>,
}

impl Drop for ToneApp {
    fn drop(&mut self) {
        self.drain.abort();
    }
}

struct SessionState<L> {
    phase: SessionPhase,
    /// Bumped on every dispose; continuations holding an older value are stale
    generation: u64,
    link: Option<Arc<L>>,
    tone_app: Option<ToneApp>,
    watcher: Option<DeviceWatcher>,
}

/// Owns the single device link and serializes connect/send requests
///
/// The state lock is only taken between suspension points, so concurrent
/// calls on the same session observe each other's transitions.
pub struct DeviceSession<P: DeviceLinkProvider> {
    provider: P,
    encoder: CommandEncoder,
    protocol: ProtocolConfig,
    tick: Duration,
    notifier: Arc<dyn Notifier>,
    state: Mutex<SessionState<P::Link>>,
    view: Arc<watch::Sender<SessionView>>,
}

impl<P: DeviceLinkProvider> DeviceSession<P> {
    pub fn new(
        provider: P,
        protocol: &ProtocolConfig,
        playback: &PlaybackConfig,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let (view, _) = watch::channel(SessionView::default());

        Self {
            provider,
            encoder: protocol.encoder(),
            protocol: protocol.clone(),
            tick: Duration::from_millis(playback.progress_tick_ms.max(1)),
            notifier,
            state: Mutex::new(SessionState {
                phase: SessionPhase::Disconnected,
                generation: 0,
                link: None,
                tone_app: None,
                watcher: None,
            }),
            view: Arc::new(view),
        }
    }

    pub fn phase(&self) -> SessionPhase {
        self.state.lock().phase
    }

    /// Current snapshot of the observable state
    pub fn view(&self) -> SessionView {
        self.view.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionView> {
        self.view.subscribe()
    }

    /// The bound link, for terminal access
    pub fn link(&self) -> Option<Arc<P::Link>> {
        self.state.lock().link.clone()
    }

    /// Starts the provider's device watcher if it has one; released on dispose
    pub fn start_watching(&self) -> bool {
        let mut state = self.state.lock();
        if state.watcher.is_none() {
            state.watcher = self.provider.watch();
        }
        state.watcher.is_some()
    }

    fn set_phase(&self, state: &mut SessionState<P::Link>, phase: SessionPhase) {
        tracing::debug!(from = %state.phase, to = %phase, "Session transition");
        state.phase = phase;
        self.view.send_modify(|view| view.phase = phase);
    }

    fn notify(&self, notification: Notification) {
        self.notifier.notify(notification);
    }

    fn append_output(&self, chunk: &str) {
        self.view.send_modify(|view| view.last_output.push_str(chunk));
    }

    /// Acquires a device link; rejected unless the session is disconnected
    pub async fn connect(&self) -> Result<(), SessionError> {
        let generation = {
            let mut state = self.state.lock();
            if state.phase != SessionPhase::Disconnected {
                drop(state);
                self.notify(Notification::warning(
                    NotificationCategory::Device,
                    "Device already connected",
                ));
                return Err(SessionError::DuplicateConnectRequest);
            }
            self.set_phase(&mut state, SessionPhase::Connecting);
            state.generation
        };

        let result = self.provider.acquire().await;

        let mut state = self.state.lock();
        if state.generation != generation {
            tracing::debug!("Discarding acquisition result of a disposed session");
            return Err(SessionError::Disposed);
        }

        match result {
            Ok(link) => {
                let serial = link.serial().to_string();
                state.link = Some(Arc::new(link));
                self.set_phase(&mut state, SessionPhase::Connected);
                self.view
                    .send_modify(|view| view.serial = Some(serial.clone()));
                drop(state);

                self.notify(Notification::info(
                    NotificationCategory::Device,
                    format!("Connected to {}", serial),
                ));
                Ok(())
            }
            Err(err) => {
                self.set_phase(&mut state, SessionPhase::Disconnected);
                drop(state);

                let err = SessionError::from(err);
                let notification = match &err {
                    SessionError::NoDeviceSelected => {
                        Notification::warning(NotificationCategory::Device, "No device selected")
                    }
                    other => Notification::error(NotificationCategory::Device, other.to_string()),
                };
                self.notify(notification);
                Err(err)
            }
        }
    }

    /// Connects, waiting with backoff while no device is available
    pub async fn connect_with_retry(
        &self,
        strategy: &mut ReconnectionStrategy,
    ) -> Result<(), SessionError> {
        loop {
            match self.connect().await {
                Ok(()) => {
                    strategy.reset();
                    return Ok(());
                }
                Err(SessionError::NoDeviceSelected) => match strategy.next_delay() {
                    Some(delay) => {
                        tracing::info!(
                            attempt = strategy.current_attempt(),
                            "No device yet, retrying in {:?}",
                            delay
                        );
                        tokio::time::sleep(delay).await;
                    }
                    None => return Err(SessionError::NoDeviceSelected),
                },
                Err(err) => return Err(err),
            }
        }
    }

    /// Writes `sequence` to the device and resolves once it has had time to play
    pub async fn send(
        &self,
        sequence: &ToneSequence,
        encoding: CommandEncoding,
    ) -> Result<SendReport, SessionError> {
        let total_ms = sequence.total_duration_ms();

        let (generation, link) = {
            let mut state = self.state.lock();
            match state.phase {
                SessionPhase::Connected => {}
                SessionPhase::Sending => {
                    tracing::warn!("Send rejected: a sequence is already playing");
                    return Err(SessionError::SendWhileBusy);
                }
                SessionPhase::Disconnected | SessionPhase::Connecting => {
                    tracing::warn!("Send rejected: no device connected");
                    return Err(SessionError::SendWhileDisconnected);
                }
            }

            if sequence.is_empty() {
                tracing::debug!("Empty sequence, nothing to send");
                return Ok(SendReport::empty(encoding));
            }

            let Some(link) = state.link.clone() else {
                return Err(SessionError::SendWhileDisconnected);
            };

            self.set_phase(&mut state, SessionPhase::Sending);
            self.view.send_modify(|view| {
                view.elapsed_ms = 0;
                view.total_ms = total_ms;
            });
            (state.generation, link)
        };

        let command = self.encoder.encode(sequence, encoding);
        tracing::info!(
            pairs = sequence.len(),
            duration_ms = total_ms,
            %encoding,
            "Sending sequence"
        );

        let written = match encoding {
            CommandEncoding::BroadcastIntent => {
                self.write_broadcast(&link, &command, generation).await
            }
            CommandEncoding::LineProtocol => {
                self.write_line_protocol(&link, &command, generation).await
            }
        };

        if let Err(err) = written {
            let mut state = self.state.lock();
            if state.generation != generation {
                return Err(SessionError::Disposed);
            }
            self.set_phase(&mut state, SessionPhase::Connected);
            drop(state);

            self.notify(Notification::error(
                NotificationCategory::Playback,
                format!("Failed to send sequence: {}", err),
            ));
            return Err(SessionError::TransportWrite(err.to_string()));
        }

        self.wait_for_playback(total_ms, generation).await?;

        let mut state = self.state.lock();
        if state.generation != generation {
            return Err(SessionError::Disposed);
        }
        self.set_phase(&mut state, SessionPhase::Connected);

        Ok(SendReport {
            encoding,
            pair_count: sequence.len(),
            duration_ms: total_ms,
            command,
        })
    }

    fn is_current(&self, generation: u64) -> bool {
        self.state.lock().generation == generation
    }

    /// Fails once the session has been disposed; nothing may reach the device after that
    fn ensure_current(&self, generation: u64) -> Result<(), LinkError> {
        if self.is_current(generation) {
            Ok(())
        } else {
            Err(disposed())
        }
    }

    async fn write_broadcast(
        &self,
        link: &P::Link,
        command: &str,
        generation: u64,
    ) -> Result<(), LinkError> {
        self.ensure_current(generation)?;
        self.view.send_modify(|view| view.last_output.clear());

        let mut output = link.invoke(command).await?;
        while let Some(chunk) = output.next_chunk().await {
            self.ensure_current(generation)?;
            self.append_output(&chunk);
        }
        output.finish().await
    }

    async fn write_line_protocol(
        &self,
        link: &P::Link,
        script: &str,
        generation: u64,
    ) -> Result<(), LinkError> {
        let existing = {
            let state = self.state.lock();
            state
                .tone_app
                .as_ref()
                .map(|app| app.input.clone())
                .filter(|input| !input.is_closed())
        };

        let input = match existing {
            Some(input) => input,
            None => self.start_tone_app(link, generation).await?,
        };

        self.ensure_current(generation)?;
        input.write(script.as_bytes()).await
    }

    /// Spawns the tone app and waits for its ready marker
    async fn start_tone_app(
        &self,
        link: &P::Link,
        generation: u64,
    ) -> Result<ShellInput, LinkError> {
        tracing::info!("Starting tone app {}", self.protocol.tone_app_path);
        let ShellProcess { input, mut output } =
            link.spawn_shell(Some(&self.protocol.tone_app_path)).await?;

        let marker = self.protocol.ready_marker.as_str();
        let timeout = Duration::from_millis(self.protocol.ready_timeout_ms);
        let mut seen = String::new();

        let ready = tokio::time::timeout(timeout, async {
            while let Some(chunk) = output.next_chunk().await {
                seen.push_str(&chunk);
                self.append_output(&chunk);
                if seen.contains(marker) {
                    return true;
                }
            }
            false
        })
        .await;

        match ready {
            Ok(true) => {}
            Ok(false) => {
                return Err(LinkError::Transport(
                    "tone app exited before it was ready".to_string(),
                ));
            }
            Err(_) => {
                return Err(LinkError::Transport(format!(
                    "tone app not ready after {} ms",
                    self.protocol.ready_timeout_ms
                )));
            }
        }
        tracing::debug!("Tone app ready");

        let view = Arc::clone(&self.view);
        let drain = tokio::spawn(async move {
            while let Some(chunk) = output.next_chunk().await {
                view.send_modify(|view| view.last_output.push_str(&chunk));
            }
            tracing::debug!("Tone app output closed");
        });

        let mut state = self.state.lock();
        if state.generation != generation {
            // Session disposée pendant le démarrage: fermer l'input arrête la tone app
            drain.abort();
            return Err(disposed());
        }
        state.tone_app = Some(ToneApp {
            input: input.clone(),
            drain,
        });

        Ok(input)
    }

    /// Client-side playback estimate: publishes progress until `total_ms` elapsed
    async fn wait_for_playback(
        &self,
        total_ms: u64,
        generation: u64,
    ) -> Result<(), SessionError> {
        let started = Instant::now();
        let deadline = started + Duration::from_millis(total_ms);

        loop {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            tokio::time::sleep(self.tick.min(deadline - now)).await;

            if !self.is_current(generation) {
                return Err(SessionError::Disposed);
            }
            let elapsed_ms = (started.elapsed().as_millis() as u64).min(total_ms);
            self.view.send_modify(|view| view.elapsed_ms = elapsed_ms);
        }

        self.view.send_modify(|view| view.elapsed_ms = total_ms);
        Ok(())
    }

    /// Releases the link, tone app and watcher; returns whether a link was bound
    fn release(&self) -> bool {
        let (link, tone_app, watcher) = {
            let mut state = self.state.lock();
            state.generation = state.generation.wrapping_add(1);
            if state.phase != SessionPhase::Disconnected {
                self.set_phase(&mut state, SessionPhase::Disconnected);
            }
            self.view.send_modify(|view| {
                view.serial = None;
                view.elapsed_ms = 0;
            });
            (state.link.take(), state.tone_app.take(), state.watcher.take())
        };

        // Dropped outside the lock: closing the tone app ends its stdin
        drop(tone_app);
        drop(watcher);
        link.is_some()
    }

    /// User-initiated disconnect
    pub fn disconnect(&self) {
        if self.release() {
            self.notify(Notification::info(
                NotificationCategory::Device,
                "Device disconnected",
            ));
        }
    }

    /// Unconditional teardown; in-flight operations resolve with `Disposed`
    pub fn dispose(&self) {
        self.release();
    }
}

impl<P: DeviceLinkProvider> Drop for DeviceSession<P> {
    fn drop(&mut self) {
        self.release();
    }
}
