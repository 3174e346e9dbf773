pub mod commands;
pub mod picker;
pub mod player;

use std::future::Future;
use std::io;
use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use msconv_core::{
    aggregate, default_variants, load_msconv_config_or_default, parse_variants, MsconvConfig,
    ProcessRecord, ProcessSupervisor, PublishRequest, StopOutcome, StreamCatalog,
    StreamCatalogEntry, SupervisorTimings, TailOutcome, TranscodeBackend,
};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

use crate::commands::{DiscoveryArgs, ListArgs, PlayArgs, PublishArgs, StopArgs};
use crate::player::{playback_url, Player};

pub type Result<T> = std::result::Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("config error: {0}")]
    Config(#[from] msconv_core::ConfigError),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("invalid variants: {0}")]
    Variant(#[from] msconv_core::VariantError),
    #[error(transparent)]
    Transcode(#[from] msconv_core::TranscodeError),
    #[error(transparent)]
    Supervisor(#[from] msconv_core::SupervisorError),
    #[error(transparent)]
    Discovery(#[from] msconv_core::DiscoveryError),
    #[error("stream '{0}' is already active")]
    AlreadyActive(String),
    #[error("exactly one input source must be given")]
    InputSelection,
    #[error("either --stream-key or -l is required")]
    MissingStreamKey,
    #[error("no active streams found")]
    NoStreams,
    #[error("playback failed: {0}")]
    Playback(String),
    #[error("invalid option: {0}")]
    InvalidOption(String),
    #[error("interrupted")]
    Interrupted,
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Multi-stream converter control interface", long_about = None)]
pub struct Cli {
    /// Path to msconv.toml; built-in defaults are used when it is missing
    #[arg(long, default_value = "configs/msconv.toml")]
    pub config: PathBuf,
    /// Override for paths.pids_dir
    #[arg(long)]
    pub pids_dir: Option<PathBuf>,
    /// Override for paths.logs_dir
    #[arg(long)]
    pub logs_dir: Option<PathBuf>,
    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
    /// Debug logging on stderr
    #[arg(long)]
    pub verbose: bool,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Publish a stream, transcoding it into variants unless -o is given
    Publish(PublishArgs),
    /// Stop a published stream
    Stop(StopArgs),
    /// Show locally supervised streams
    Status,
    /// List active streams on the media servers
    List(ListArgs),
    /// Play a stream with an external player
    Play(PlayArgs),
}

/// Installs the stderr subscriber. `RUST_LOG` wins unless `verbose` is set.
pub fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("msconv_core=debug,msconvctl=debug")
    } else {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("msconv_core=warn,msconvctl=warn"))
    };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();
}

pub async fn run(cli: Cli) -> Result<()> {
    let context = AppContext::new(&cli)?;

    match &cli.command {
        Commands::Publish(args) => {
            let report = context.publish(args, ctrl_c()).await?;
            render(&report, cli.format)?;
        }
        Commands::Stop(args) => {
            let report = context.stop(args)?;
            if !matches!(report.outcome, StopOutcome::Signalled { .. }) {
                eprintln!("warning: {}", report.display());
            }
            render(&report, cli.format)?;
        }
        Commands::Status => {
            let records = context.status()?;
            render(&records, cli.format)?;
        }
        Commands::List(args) => {
            let listing = context.list(&args.discovery, ctrl_c()).await?;
            render(&listing, cli.format)?;
        }
        Commands::Play(args) => {
            let request = context.play(args, ctrl_c()).await?;
            let Some(request) = request else {
                eprintln!("No stream selected.");
                return Ok(());
            };
            render(&request, cli.format)?;
            return Err(request.player.exec(&request.url));
        }
    }

    Ok(())
}

/// Resolves on Ctrl-C; never resolves when the handler cannot be installed.
async fn ctrl_c() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        error!(%error, "failed to install Ctrl+C handler");
        std::future::pending::<()>().await;
    }
}

fn render<T>(value: &T, format: OutputFormat) -> Result<()>
where
    T: Serialize + DisplayFallback,
{
    match format {
        OutputFormat::Text => {
            println!("{}", value.display());
            Ok(())
        }
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(value)?;
            println!("{}", json);
            Ok(())
        }
    }
}

trait DisplayFallback {
    fn display(&self) -> String;
}

#[derive(Debug)]
pub struct AppContext {
    config: MsconvConfig,
    supervisor: ProcessSupervisor,
    format: OutputFormat,
}

impl AppContext {
    pub fn new(cli: &Cli) -> Result<Self> {
        let config = load_msconv_config_or_default(&cli.config)?;
        let pids_dir = cli.pids_dir.clone().unwrap_or_else(|| config.pids_dir());
        let logs_dir = cli.logs_dir.clone().unwrap_or_else(|| config.logs_dir());
        debug!(
            config = %cli.config.display(),
            pids_dir = %pids_dir.display(),
            logs_dir = %logs_dir.display(),
            "context ready"
        );
        let supervisor = ProcessSupervisor::new(pids_dir, logs_dir)
            .with_timings(SupervisorTimings::from(&config.supervisor));
        Ok(Self {
            config,
            supervisor,
            format: cli.format,
        })
    }

    /// Synthesizes the transcoder command, starts it and follows its log until
    /// the stream stops or `cancel` resolves.
    pub async fn publish<C>(&self, args: &PublishArgs, cancel: C) -> Result<PublishReport>
    where
        C: Future<Output = ()>,
    {
        let stream_key = args.stream_key.trim();
        if stream_key.is_empty() {
            return Err(AppError::MissingStreamKey);
        }
        if self.supervisor.is_active(stream_key) {
            return Err(AppError::AlreadyActive(stream_key.to_string()));
        }

        let source = args.input_source()?;
        let variants = match &args.variants {
            Some(spec) => parse_variants(spec)?,
            None => default_variants(),
        };
        let output_base_url = args
            .output_url
            .as_deref()
            .unwrap_or(&self.config.publish.output_url);
        let request = PublishRequest {
            stream_key,
            source: &source,
            variants: &variants,
            output_base_url,
            passthrough_only: args.original,
            audio_enabled: !args.no_audio,
        };
        let command = TranscodeBackend::from_config(&self.config.ffmpeg)
            .synthesize(&request)
            .await?;

        let json = self.format == OutputFormat::Json;
        if json {
            eprintln!("{command}");
        } else {
            println!("Starting stream '{stream_key}' ({} input)", source.kind);
            println!("{command}");
        }

        let pid = self.supervisor.start(stream_key, &command)?;
        let log_file = self.supervisor.log_file(stream_key);
        info!(stream_key, pid, log = %log_file.display(), "following transcoder log");
        let sink = move |line: String| {
            if json {
                eprintln!("{line}");
            } else {
                println!("{line}");
            }
        };
        let outcome = self.supervisor.tail_log(stream_key, sink, cancel).await?;

        let stopped = match outcome {
            TailOutcome::Finished => None,
            TailOutcome::Interrupted(outcome) => Some(outcome),
        };
        Ok(PublishReport {
            stream_key: stream_key.to_string(),
            pid,
            command,
            log_file,
            stopped,
        })
    }

    pub fn stop(&self, args: &StopArgs) -> Result<StopReport> {
        let outcome = self.supervisor.stop(&args.stream_key)?;
        Ok(StopReport {
            stream_key: args.stream_key.clone(),
            outcome,
        })
    }

    pub fn status(&self) -> Result<Vec<ProcessRecord>> {
        Ok(self.supervisor.records()?)
    }

    /// Queries the selected sources. Fails only when every source failed.
    pub async fn list<C>(&self, args: &DiscoveryArgs, cancel: C) -> Result<StreamListing>
    where
        C: Future<Output = ()>,
    {
        let sources = args.sources(&self.config.discovery)?;
        let result = tokio::select! {
            result = aggregate(&sources) => result,
            _ = cancel => return Err(AppError::Interrupted),
        };

        for failure in &result.failures {
            eprintln!("warning: {failure}");
        }
        if !sources.is_empty() && result.failures.len() == sources.len() {
            if let Some(failure) = result.failures.into_iter().next() {
                return Err(failure.into());
            }
        }
        Ok(StreamListing::from(result.catalog))
    }

    /// Resolves what to play. `Ok(None)` means the operator cancelled the picker.
    pub async fn play<C>(&self, args: &PlayArgs, cancel: C) -> Result<Option<PlayRequest>>
    where
        C: Future<Output = ()>,
    {
        let player = match args.player {
            Some(player) => player,
            None => Player::from_config(&self.config.playback.player)?,
        };

        let stream_key = if args.do_list {
            let listing = self.list(&args.discovery, cancel).await?;
            if listing.streams.is_empty() {
                return Err(AppError::NoStreams);
            }
            let choices: Vec<String> = listing.streams.iter().map(describe_entry).collect();
            let stdin = io::stdin();
            match picker::pick(&choices, stdin.lock(), io::stdout())? {
                Some(index) => listing.streams[index].base_key.clone(),
                None => return Ok(None),
            }
        } else {
            args.stream_key
                .clone()
                .filter(|key| !key.is_empty())
                .ok_or(AppError::MissingStreamKey)?
        };

        let host = args
            .media_host_rtsp
            .as_deref()
            .unwrap_or(&self.config.playback.host);
        let port = args.media_rtsp_port.unwrap_or(self.config.playback.rtsp_port);
        let url = playback_url(host, port, &stream_key, &args.variant, args.original);
        Ok(Some(PlayRequest {
            stream_key,
            url,
            player,
        }))
    }
}

#[derive(Debug, Serialize)]
pub struct PublishReport {
    pub stream_key: String,
    pub pid: i32,
    pub command: String,
    pub log_file: PathBuf,
    /// Present when the stream was stopped because publishing was interrupted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stopped: Option<StopOutcome>,
}

impl DisplayFallback for PublishReport {
    fn display(&self) -> String {
        match &self.stopped {
            None => format!("Stream '{}' ended (pid {})", self.stream_key, self.pid),
            Some(outcome) => format!(
                "Interrupted: {}",
                describe_stop(&self.stream_key, outcome)
            ),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct StopReport {
    pub stream_key: String,
    #[serde(flatten)]
    pub outcome: StopOutcome,
}

impl DisplayFallback for StopReport {
    fn display(&self) -> String {
        describe_stop(&self.stream_key, &self.outcome)
    }
}

fn describe_stop(stream_key: &str, outcome: &StopOutcome) -> String {
    match outcome {
        StopOutcome::Signalled { pid } => format!("Stopped stream '{stream_key}' (pid {pid})"),
        StopOutcome::Vanished { pid } => {
            format!("Stream '{stream_key}' was not running (pid {pid}); marker removed")
        }
        StopOutcome::SignalFailed { pid: Some(pid), reason } => {
            format!("Could not signal stream '{stream_key}' (pid {pid}): {reason}; marker removed")
        }
        StopOutcome::SignalFailed { pid: None, reason } => {
            format!("Could not signal stream '{stream_key}': {reason}; marker removed")
        }
    }
}

impl DisplayFallback for Vec<ProcessRecord> {
    fn display(&self) -> String {
        if self.is_empty() {
            return "No supervised streams.".to_string();
        }
        let mut lines = Vec::new();
        for record in self {
            let since = record
                .started_at
                .map(|at| at.format("%Y-%m-%d %H:%M:%S UTC").to_string())
                .unwrap_or_else(|| "-".to_string());
            lines.push(format!(
                "{:15} pid={} since={}",
                record.stream_key, record.pid, since
            ));
        }
        lines.join("\n")
    }
}

#[derive(Debug, Serialize)]
pub struct StreamListing {
    pub streams: Vec<StreamCatalogEntry>,
}

impl From<StreamCatalog> for StreamListing {
    fn from(catalog: StreamCatalog) -> Self {
        Self {
            streams: catalog.into_values().collect(),
        }
    }
}

impl DisplayFallback for StreamListing {
    fn display(&self) -> String {
        if self.streams.is_empty() {
            return "No active streams found.".to_string();
        }
        let mut lines = vec!["Available streams:".to_string()];
        for entry in &self.streams {
            lines.push(format!("  • {}", describe_entry(entry)));
        }
        lines.join("\n")
    }
}

fn describe_entry(entry: &StreamCatalogEntry) -> String {
    let status = if entry.live { "LIVE" } else { "AVAILABLE" };
    let variants: Vec<&str> = entry.variants.iter().map(String::as_str).collect();
    let mut line = format!(
        "{:15} [{status}]  variants: [{}]",
        entry.base_key,
        variants.join(", ")
    );
    if !entry.readers.is_empty() {
        let viewers: Vec<String> = variants
            .iter()
            .map(|variant| {
                let count = entry.readers.get(*variant).copied().unwrap_or(0);
                format!("{variant}: {count} viewers")
            })
            .collect();
        line.push_str(&format!("  ({})", viewers.join(", ")));
    }
    line
}

#[derive(Debug, Serialize)]
pub struct PlayRequest {
    pub stream_key: String,
    pub url: String,
    #[serde(serialize_with = "serialize_player")]
    pub player: Player,
}

fn serialize_player<S>(player: &Player, serializer: S) -> std::result::Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.serialize_str(player.binary())
}

impl DisplayFallback for PlayRequest {
    fn display(&self) -> String {
        format!("Playing {} with {}...", self.url, self.player.binary())
    }
}
