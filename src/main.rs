use adbeeper::config::{AppConfig, ConfigError};
use adbeeper::connection::{
    AdbCliProvider, DeviceSession, LinkError, ReconnectionStrategy, SessionError, SessionView,
};
use adbeeper::messaging::{
    ChannelNotifier, NOTIFICATION_TARGET, Notification, NotificationFeed, Notifier,
};
use adbeeper::midi::{DemoLibrary, MidiError};
use adbeeper::tone::CommandEncoding;
use adbeeper::ui::{MidiSelection, render_ascii, run_terminal};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::BufReader;
use tracing_subscriber::EnvFilter;

const NOTIFICATION_RINGBUFFER_CAPACITY: usize = 64;
const NOTIFICATION_HISTORY: usize = 32;
const PROGRESS_BAR_WIDTH: usize = 30;

/// Play MIDI files as tone sequences on an Android device over adb
#[derive(Parser)]
#[command(name = "adbeeper")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    /// Configuration file (RON)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Only use the device with this serial
    #[arg(short, long, global = true)]
    serial: Option<String>,

    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Where the notes come from; the Mario theme when neither is given
#[derive(Args)]
struct Source {
    /// MIDI file
    file: Option<PathBuf>,

    /// Demo file from the library (the configured default when no name is given)
    #[arg(long, conflicts_with = "file")]
    demo: Option<Option<String>>,

    /// Track to play instead of the first one with notes
    #[arg(short, long)]
    track: Option<usize>,
}

#[derive(Subcommand)]
enum Commands {
    /// Send a tone sequence to the device and wait for it to play
    Play {
        #[command(flatten)]
        source: Source,

        /// `line` or `broadcast` (defaults to the configured encoding)
        #[arg(short, long)]
        encoding: Option<CommandEncoding>,

        /// Keep retrying until a device shows up
        #[arg(short, long)]
        wait: bool,
    },
    /// Print the (frequency, duration) pairs of a sequence
    Sequence {
        #[command(flatten)]
        source: Source,

        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
    /// Print the device command for a sequence
    Encode {
        #[command(flatten)]
        source: Source,

        #[arg(short, long)]
        encoding: Option<CommandEncoding>,
    },
    /// Draw the notes of a MIDI file
    Show {
        #[command(flatten)]
        source: Source,

        #[arg(long, default_value_t = 100)]
        width: usize,

        #[arg(long, default_value_t = 24)]
        height: usize,
    },
    /// Open an interactive shell on the device
    Shell {
        #[arg(short, long)]
        wait: bool,
    },
    /// List the demo files
    Demos,
    /// Print the effective configuration
    ShowConfig,
}

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Midi(#[from] MidiError),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Link(#[from] LinkError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

fn init_logging(verbose: bool) {
    // Notifications are printed by the front end, keep them out of the log
    let default_filter = if verbose {
        "debug".to_string()
    } else {
        format!("warn,{}=off", NOTIFICATION_TARGET)
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn print_notifications(feed: &mut NotificationFeed) {
    for notification in feed.update() {
        eprintln!("{}", format_notification(&notification));
    }
}

fn format_notification(notification: &Notification) -> String {
    let time = chrono::DateTime::from_timestamp_millis(notification.timestamp as i64)
        .map(|utc| utc.with_timezone(&chrono::Local).format("%H:%M:%S").to_string())
        .unwrap_or_default();

    format!("[{}] {}: {}", time, notification.level, notification.message)
}

fn draw_progress(view: &SessionView) {
    let filled = ((view.progress() * PROGRESS_BAR_WIDTH as f32).round() as usize)
        .min(PROGRESS_BAR_WIDTH);
    let bar = format!(
        "{}{}",
        "#".repeat(filled),
        " ".repeat(PROGRESS_BAR_WIDTH - filled)
    );

    eprint!(
        "\r{:<10} [{}] {:>6} / {} ms",
        view.phase.to_string(),
        bar,
        view.elapsed_ms,
        view.total_ms
    );
}

/// Front-end state shared by every command
struct Frontend {
    config: AppConfig,
    notifier: Arc<dyn Notifier>,
    feed: NotificationFeed,
}

impl Frontend {
    fn new(config: AppConfig) -> Self {
        let (notifier, consumer) = ChannelNotifier::channel(NOTIFICATION_RINGBUFFER_CAPACITY);

        Self {
            config,
            notifier: Arc::new(notifier),
            feed: NotificationFeed::new(consumer, NOTIFICATION_HISTORY),
        }
    }

    fn library(&self) -> DemoLibrary {
        DemoLibrary::new(&self.config.library.demo_dir)
    }

    fn load(&mut self, source: &Source) -> Result<MidiSelection, CliError> {
        let result = self.try_load(source);
        print_notifications(&mut self.feed);
        result
    }

    fn try_load(&self, source: &Source) -> Result<MidiSelection, CliError> {
        let mut selection = MidiSelection::new(Arc::clone(&self.notifier));

        if let Some(path) = &source.file {
            let bytes = std::fs::read(path)?;
            let name = path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string());
            selection.on_file_dropped(&name, &bytes)?;
        } else if let Some(demo) = &source.demo {
            let name = demo
                .clone()
                .unwrap_or_else(|| self.config.library.default_demo.clone());
            selection.load_demo(&self.library(), &name)?;
        }

        if let Some(track) = source.track {
            selection.select_track(track)?;
        }

        Ok(selection)
    }

    fn session(&self) -> DeviceSession<AdbCliProvider> {
        let session = DeviceSession::new(
            AdbCliProvider::new(&self.config.device),
            &self.config.protocol,
            &self.config.playback,
            Arc::clone(&self.notifier),
        );
        session.start_watching();
        session
    }

    async fn connect(
        &mut self,
        session: &DeviceSession<AdbCliProvider>,
        wait: bool,
    ) -> Result<(), CliError> {
        let result = if wait {
            let mut strategy = ReconnectionStrategy::from_config(&self.config.device);
            session.connect_with_retry(&mut strategy).await
        } else {
            session.connect().await
        };
        print_notifications(&mut self.feed);
        Ok(result?)
    }

    async fn play(
        &mut self,
        source: &Source,
        encoding: Option<CommandEncoding>,
        wait: bool,
    ) -> Result<(), CliError> {
        let selection = self.load(source)?;
        let encoding = encoding.unwrap_or(self.config.playback.encoding);

        let session = self.session();
        self.connect(&session, wait).await?;

        let mut view_rx = session.subscribe();
        let send = session.send(selection.sequence(), encoding);
        tokio::pin!(send);

        let result = loop {
            tokio::select! {
                result = &mut send => break result,
                changed = view_rx.changed() => {
                    if changed.is_ok() {
                        let view = view_rx.borrow_and_update().clone();
                        draw_progress(&view);
                    }
                }
            }
        };
        eprintln!();
        print_notifications(&mut self.feed);

        let report = result?;
        let output = session.view().last_output;
        if !output.trim().is_empty() {
            println!("{}", output.trim_end());
        }
        println!(
            "Sent {} tones ({} ms) using the {} encoding",
            report.pair_count, report.duration_ms, report.encoding
        );

        session.disconnect();
        print_notifications(&mut self.feed);
        Ok(())
    }

    async fn shell(&mut self, wait: bool) -> Result<(), CliError> {
        let session = self.session();
        self.connect(&session, wait).await?;

        let link = session.link().ok_or(LinkError::NoDeviceSelected)?;
        run_terminal(
            &*link,
            BufReader::new(tokio::io::stdin()),
            tokio::io::stdout(),
        )
        .await?;

        session.disconnect();
        print_notifications(&mut self.feed);
        Ok(())
    }
}

async fn run(cli: Cli) -> Result<(), CliError> {
    let mut config = AppConfig::load_or_default(cli.config.as_deref())?;
    if cli.serial.is_some() {
        config.device.serial = cli.serial;
    }

    let mut frontend = Frontend::new(config);

    match cli.command {
        Commands::Play {
            source,
            encoding,
            wait,
        } => frontend.play(&source, encoding, wait).await?,
        Commands::Sequence { source, json } => {
            let selection = frontend.load(&source)?;
            if json {
                println!("{}", serde_json::to_string_pretty(selection.sequence())?);
            } else {
                for pair in selection.sequence() {
                    println!("{}\t{}", pair.frequency_hz, pair.duration_ms);
                }
            }
        }
        Commands::Encode { source, encoding } => {
            let selection = frontend.load(&source)?;
            let encoding = encoding.unwrap_or(frontend.config.playback.encoding);
            let encoder = frontend.config.protocol.encoder();
            print!("{}", encoder.encode(selection.sequence(), encoding));
            if encoding == CommandEncoding::BroadcastIntent {
                println!();
            }
        }
        Commands::Show {
            source,
            width,
            height,
        } => {
            let selection = frontend.load(&source)?;
            let file = selection.file().ok_or(MidiError::NoFileLoaded)?;

            for (index, label) in selection.track_labels().iter().enumerate() {
                let marker = if selection.selected_track() == Some(index) {
                    '*'
                } else {
                    ' '
                };
                println!("{} {}", marker, label);
            }
            println!("{:.2} s, {} notes", file.duration, file.note_count());
            println!(
                "{}",
                render_ascii(file, width, height, selection.selected_track(), None)
            );
        }
        Commands::Shell { wait } => frontend.shell(wait).await?,
        Commands::Demos => {
            let library = frontend.library();
            let demos = library.list();
            if demos.is_empty() {
                println!("No demo files in {}", library.dir().display());
            }
            for name in demos {
                let marker = if name == frontend.config.library.default_demo {
                    '*'
                } else {
                    ' '
                };
                println!("{} {}", marker, name);
            }
        }
        Commands::ShowConfig => {
            if let Some(path) = AppConfig::default_path() {
                println!("// {}", path.display());
            }
            println!("{}", frontend.config.to_ron_string()?);
        }
    }

    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("ERROR: failed to start runtime: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let result = runtime.block_on(run(cli));
    // A pending read on stdin would otherwise keep the process alive
    runtime.shutdown_timeout(Duration::from_millis(100));

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("ERROR: {}", e);
            ExitCode::FAILURE
        }
    }
}
