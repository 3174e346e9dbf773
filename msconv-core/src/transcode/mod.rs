pub mod probe;

use std::fmt;
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, warn};

use crate::config::FfmpegSection;
use crate::model::{InputSource, Variant};

pub use self::probe::{
    AudioProbe, CommandExecutor, FfprobeAudioProbe, ProbeFailure, SystemCommandExecutor,
};

#[derive(Debug, Error)]
pub enum TranscodeError {
    #[error("unsupported input kind: {0}")]
    UnsupportedInputKind(String),
}

/// Everything needed to synthesize one publish command.
#[derive(Debug, Clone)]
pub struct PublishRequest<'a> {
    pub stream_key: &'a str,
    pub source: &'a InputSource,
    pub variants: &'a [Variant],
    pub output_base_url: &'a str,
    pub passthrough_only: bool,
    pub audio_enabled: bool,
}

/// The transcoder backends msconv knows how to drive.
#[derive(Debug)]
pub enum TranscodeBackend {
    Ffmpeg(FfmpegBackend),
}

impl TranscodeBackend {
    pub fn from_config(config: &FfmpegSection) -> Self {
        TranscodeBackend::Ffmpeg(FfmpegBackend::from_config(config))
    }

    pub async fn synthesize(&self, request: &PublishRequest<'_>) -> Result<String, TranscodeError> {
        match self {
            TranscodeBackend::Ffmpeg(backend) => backend.build_command(request).await,
        }
    }
}

pub struct FfmpegBackend {
    binary: String,
    log_level: Option<String>,
    probe: Arc<dyn AudioProbe>,
}

impl fmt::Debug for FfmpegBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FfmpegBackend")
            .field("binary", &self.binary)
            .field("log_level", &self.log_level)
            .finish()
    }
}

impl FfmpegBackend {
    pub fn new(
        binary: impl Into<String>,
        log_level: Option<String>,
        probe: Arc<dyn AudioProbe>,
    ) -> Self {
        Self {
            binary: binary.into(),
            log_level,
            probe,
        }
    }

    pub fn from_config(config: &FfmpegSection) -> Self {
        let probe = FfprobeAudioProbe::new(&config.ffprobe, config.probe_timeout(), None);
        Self::new(&config.binary, config.log_level.clone(), Arc::new(probe))
    }

    pub async fn build_command(&self, request: &PublishRequest<'_>) -> Result<String, TranscodeError> {
        let args = self.build_args(request).await?;
        let mut parts = Vec::with_capacity(args.len() + 1);
        parts.push(shell_quote(&self.binary));
        parts.extend(args.iter().map(|arg| shell_quote(arg)));
        Ok(parts.join(" "))
    }

    /// Argument vector without the binary, unquoted.
    pub async fn build_args(&self, request: &PublishRequest<'_>) -> Result<Vec<String>, TranscodeError> {
        let mut args = self.base_args();
        args.extend(request.source.input_args());

        if request.passthrough_only {
            args.extend(["-c", "copy", "-f", "flv"].map(String::from));
            args.push(format!("{}/{}", request.output_base_url, request.stream_key));
            return Ok(args);
        }

        let has_audio = request.audio_enabled && self.detect_audio(request.source).await;
        args.push("-filter_complex".to_string());
        args.push(filter_graph(request.variants));
        for (index, variant) in request.variants.iter().enumerate() {
            args.extend(variant_mapping(
                index,
                variant,
                request.output_base_url,
                request.stream_key,
                has_audio,
            ));
        }
        Ok(args)
    }

    async fn detect_audio(&self, source: &InputSource) -> bool {
        let input = source.input_args().pop().unwrap_or_default();
        match self.probe.has_audio(&input).await {
            Ok(found) => {
                debug!(input = %input, found, "audio probe finished");
                found
            }
            Err(error) => {
                warn!(input = %input, %error, "audio probe failed, publishing without audio");
                false
            }
        }
    }

    fn base_args(&self) -> Vec<String> {
        match &self.log_level {
            Some(level) => vec![
                "-hide_banner".to_string(),
                "-loglevel".to_string(),
                level.clone(),
            ],
            None => Vec::new(),
        }
    }
}

/// `[0:v]split=N[v0]..[vN-1]; [v0]scale=W:H[v0out]; ...`
pub fn filter_graph(variants: &[Variant]) -> String {
    let split_labels: String = (0..variants.len()).map(|i| format!("[v{i}]")).collect();
    let scales: Vec<String> = variants
        .iter()
        .enumerate()
        .map(|(i, v)| format!("[v{i}]scale={}:{}[v{i}out]", v.width, v.height))
        .collect();
    format!(
        "[0:v]split={}{}; {}",
        variants.len(),
        split_labels,
        scales.join("; ")
    )
}

fn variant_mapping(
    index: usize,
    variant: &Variant,
    base_url: &str,
    stream_key: &str,
    has_audio: bool,
) -> Vec<String> {
    let mut args = vec!["-map".to_string(), format!("[v{index}out]")];
    if has_audio {
        args.push("-map".to_string());
        args.push("0:a".to_string());
        args.push("-c:a".to_string());
        args.push(variant.audio_codec.clone());
        args.push("-b:a".to_string());
        args.push(format!("{}k", variant.audio_bitrate_kbps));
    } else {
        args.push("-an".to_string());
    }
    args.push("-c:v".to_string());
    args.push(variant.video_codec.clone());
    args.push("-preset".to_string());
    args.push(variant.preset.clone());
    args.push("-crf".to_string());
    args.push(variant.crf.to_string());
    args.push("-b:v".to_string());
    args.push(format!("{}k", variant.bitrate_kbps));
    args.push("-maxrate".to_string());
    args.push(format!("{}k", variant.bitrate_kbps));
    args.push("-bufsize".to_string());
    args.push(format!("{}k", variant.buffer_size_kbps()));
    args.push("-f".to_string());
    args.push("flv".to_string());
    args.push(format!("{base_url}/{stream_key}_{}", variant.label));
    args
}

/// Single-quotes an argument unless it only holds shell-safe characters.
pub fn shell_quote(arg: &str) -> String {
    let safe = !arg.is_empty()
        && arg
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "_./:=@%+,-".contains(c));
    if safe {
        arg.to_string()
    } else {
        format!("'{}'", arg.replace('\'', r"'\''"))
    }
}
