use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use serde::Serialize;
use thiserror::Error;
use tracing::warn;
use url::Url;

use crate::transcode::TranscodeError;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum VariantError {
    #[error("invalid {field} in variant '{spec}'")]
    InvalidField { field: &'static str, spec: String },
    #[error("variant list is empty")]
    Empty,
    #[error("duplicate variant label '{0}'")]
    DuplicateLabel(String),
}

/// One output rendition of a transcoded stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Variant {
    pub label: String,
    pub bitrate_kbps: u32,
    pub width: u32,
    pub height: u32,
    pub video_codec: String,
    pub audio_codec: String,
    pub audio_bitrate_kbps: u32,
    pub preset: String,
    pub crf: u8,
}

impl Variant {
    /// Builds a variant with the stock codec profile (libx264/aac, 128k audio, fast, crf 23).
    pub fn new(label: impl Into<String>, bitrate_kbps: u32, width: u32, height: u32) -> Self {
        Self {
            label: label.into(),
            bitrate_kbps,
            width,
            height,
            video_codec: "libx264".to_string(),
            audio_codec: "aac".to_string(),
            audio_bitrate_kbps: 128,
            preset: "fast".to_string(),
            crf: 23,
        }
    }

    /// Rate-control buffer, twice the target bitrate.
    pub fn buffer_size_kbps(&self) -> u32 {
        self.bitrate_kbps.saturating_mul(2)
    }
}

pub fn default_variants() -> Vec<Variant> {
    vec![
        Variant::new("1080p", 4000, 1920, 1080),
        Variant::new("720p", 2500, 1280, 720),
        Variant::new("480p", 1200, 854, 480),
        Variant::new("360p", 600, 640, 360),
    ]
}

/// Parses `label:bitrate:width:height[,...]`.
///
/// Entries with fewer than four fields are skipped. The bitrate may carry a
/// trailing `k`. Labels must be unique since they name the publish targets.
pub fn parse_variants(spec: &str) -> Result<Vec<Variant>, VariantError> {
    let mut variants = Vec::new();
    let mut labels = HashSet::new();
    for entry in spec.split(',') {
        let entry = entry.trim();
        let parts: Vec<&str> = entry.split(':').collect();
        if parts.len() < 4 {
            if !entry.is_empty() {
                warn!(variant = entry, "skipping variant with fewer than four fields");
            }
            continue;
        }
        let label = parts[0].trim();
        if label.is_empty() {
            return Err(VariantError::InvalidField {
                field: "label",
                spec: entry.to_string(),
            });
        }
        let bitrate = parse_positive(parts[1].trim().trim_end_matches(['k', 'K']), "bitrate", entry)?;
        let width = parse_positive(parts[2], "width", entry)?;
        let height = parse_positive(parts[3], "height", entry)?;
        if !labels.insert(label.to_string()) {
            return Err(VariantError::DuplicateLabel(label.to_string()));
        }
        variants.push(Variant::new(label, bitrate, width, height));
    }
    if variants.is_empty() {
        return Err(VariantError::Empty);
    }
    Ok(variants)
}

fn parse_positive(raw: &str, field: &'static str, entry: &str) -> Result<u32, VariantError> {
    match raw.trim().parse::<u32>() {
        Ok(value) if value > 0 => Ok(value),
        _ => Err(VariantError::InvalidField {
            field,
            spec: entry.to_string(),
        }),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum InputKind {
    File,
    Device,
    Rtmp,
    Rtsp,
    Udp,
    Http,
}

impl InputKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            InputKind::File => "file",
            InputKind::Device => "device",
            InputKind::Rtmp => "rtmp",
            InputKind::Rtsp => "rtsp",
            InputKind::Udp => "udp",
            InputKind::Http => "http",
        }
    }
}

impl fmt::Display for InputKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InputKind {
    type Err = TranscodeError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "file" => Ok(InputKind::File),
            "device" => Ok(InputKind::Device),
            "rtmp" => Ok(InputKind::Rtmp),
            "rtsp" => Ok(InputKind::Rtsp),
            "udp" => Ok(InputKind::Udp),
            "http" => Ok(InputKind::Http),
            other => Err(TranscodeError::UnsupportedInputKind(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InputSource {
    pub kind: InputKind,
    pub locator: String,
    /// Only honoured for [`InputKind::File`].
    pub loop_file: bool,
}

impl InputSource {
    pub fn new(kind: InputKind, locator: impl Into<String>) -> Self {
        Self {
            kind,
            locator: locator.into(),
            loop_file: false,
        }
    }

    pub fn file(path: impl Into<String>, loop_file: bool) -> Self {
        Self {
            kind: InputKind::File,
            locator: path.into(),
            loop_file,
        }
    }

    /// Infers the source kind from a URL scheme, device path or plain file path.
    pub fn from_url(raw: &str) -> Result<Self, TranscodeError> {
        let raw = raw.trim();
        if raw.starts_with("/dev/") || (!raw.is_empty() && raw.chars().all(|c| c.is_ascii_digit()))
        {
            return Ok(Self::new(InputKind::Device, raw));
        }
        let url = match Url::parse(raw) {
            Ok(url) => url,
            Err(_) => return Ok(Self::file(raw, true)),
        };
        match url.scheme() {
            "rtmp" | "rtmps" => Ok(Self::new(InputKind::Rtmp, raw)),
            "rtsp" | "rtsps" => Ok(Self::new(InputKind::Rtsp, raw)),
            "http" | "https" => Ok(Self::new(InputKind::Http, raw)),
            "udp" => udp_locator(raw)
                .map(|locator| Self::new(InputKind::Udp, locator))
                .ok_or_else(|| TranscodeError::UnsupportedInputKind(raw.to_string())),
            "file" => Ok(Self::file(url.path(), true)),
            other => Err(TranscodeError::UnsupportedInputKind(other.to_string())),
        }
    }

    /// Input arguments for the transcoder, in order.
    pub fn input_args(&self) -> Vec<String> {
        match self.kind {
            InputKind::File => {
                let mut args = vec!["-re".to_string()];
                if self.loop_file {
                    args.push("-stream_loop".to_string());
                    args.push("-1".to_string());
                }
                args.push("-i".to_string());
                args.push(self.locator.clone());
                args
            }
            InputKind::Device => {
                let node = if !self.locator.is_empty()
                    && self.locator.chars().all(|c| c.is_ascii_digit())
                {
                    format!("/dev/video{}", self.locator)
                } else {
                    self.locator.clone()
                };
                vec!["-f".into(), "v4l2".into(), "-i".into(), node]
            }
            InputKind::Rtmp | InputKind::Rtsp | InputKind::Http => {
                vec!["-i".to_string(), self.locator.clone()]
            }
            InputKind::Udp => {
                let target = if self.locator.starts_with("udp://") {
                    self.locator.clone()
                } else {
                    format!("udp://{}", self.locator)
                };
                vec!["-f".into(), "mpegts".into(), "-i".into(), target]
            }
        }
    }
}

/// `udp://host:port` minus the scheme; `None` for the `udp:` forms without an authority.
fn udp_locator(raw: &str) -> Option<&str> {
    const PREFIX: &str = "udp://";
    let scheme = raw.get(..PREFIX.len())?;
    if !scheme.eq_ignore_ascii_case(PREFIX) {
        return None;
    }
    let locator = &raw[PREFIX.len()..];
    (!locator.is_empty()).then_some(locator)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_ladder_has_four_rungs() {
        let ladder = default_variants();
        let labels: Vec<_> = ladder.iter().map(|v| v.label.as_str()).collect();
        assert_eq!(labels, ["1080p", "720p", "480p", "360p"]);
        assert_eq!(ladder[0].buffer_size_kbps(), 8000);
        assert_eq!(ladder[3].width, 640);
    }

    #[test]
    fn parse_variants_accepts_k_suffix_and_plain_numbers() {
        let variants = parse_variants("hi:4000k:1920:1080, lo:800:640:360").unwrap();
        assert_eq!(variants.len(), 2);
        assert_eq!(variants[0].bitrate_kbps, 4000);
        assert_eq!(variants[1].label, "lo");
        assert_eq!(variants[1].bitrate_kbps, 800);
        assert_eq!(variants[1].crf, 23);
    }

    #[test]
    fn parse_variants_skips_short_entries() {
        let variants = parse_variants("broken:1000,ok:1000k:640:360").unwrap();
        assert_eq!(variants.len(), 1);
        assert_eq!(variants[0].label, "ok");
    }

    #[test]
    fn parse_variants_rejects_bad_input() {
        assert_eq!(parse_variants("x:1:2"), Err(VariantError::Empty));
        assert!(matches!(
            parse_variants("a:fast:640:360"),
            Err(VariantError::InvalidField { field: "bitrate", .. })
        ));
        assert!(matches!(
            parse_variants("a:100k:0:360"),
            Err(VariantError::InvalidField { field: "width", .. })
        ));
        assert_eq!(
            parse_variants("a:100k:640:360,a:200k:320:180"),
            Err(VariantError::DuplicateLabel("a".into()))
        );
    }

    #[test]
    fn file_input_loops_only_when_requested() {
        assert_eq!(
            InputSource::file("/v/a.mp4", true).input_args(),
            ["-re", "-stream_loop", "-1", "-i", "/v/a.mp4"]
        );
        assert_eq!(
            InputSource::file("/v/a.mp4", false).input_args(),
            ["-re", "-i", "/v/a.mp4"]
        );
    }

    #[test]
    fn device_numeric_locator_maps_to_video_node() {
        let args = InputSource::new(InputKind::Device, "0").input_args();
        assert_eq!(args, ["-f", "v4l2", "-i", "/dev/video0"]);
        let args = InputSource::new(InputKind::Device, "/dev/video2").input_args();
        assert_eq!(args[3], "/dev/video2");
    }

    #[test]
    fn network_inputs() {
        let rtsp = InputSource::new(InputKind::Rtsp, "rtsp://cam/1").input_args();
        assert_eq!(rtsp, ["-i", "rtsp://cam/1"]);
        let udp = InputSource::new(InputKind::Udp, "127.0.0.1:1234").input_args();
        assert_eq!(udp, ["-f", "mpegts", "-i", "udp://127.0.0.1:1234"]);
    }

    #[test]
    fn input_kind_parsing() {
        assert_eq!("RTMP".parse::<InputKind>().unwrap(), InputKind::Rtmp);
        assert!(matches!(
            "srt".parse::<InputKind>(),
            Err(TranscodeError::UnsupportedInputKind(kind)) if kind == "srt"
        ));
    }

    #[test]
    fn from_url_infers_kind() {
        assert_eq!(
            InputSource::from_url("rtmp://host/live/x").unwrap().kind,
            InputKind::Rtmp
        );
        assert_eq!(
            InputSource::from_url("https://cdn/x.m3u8").unwrap().kind,
            InputKind::Http
        );
        let udp = InputSource::from_url("udp://0.0.0.0:5000").unwrap();
        assert_eq!(udp.kind, InputKind::Udp);
        assert_eq!(udp.locator, "0.0.0.0:5000");
        assert_eq!(InputSource::from_url("2").unwrap().kind, InputKind::Device);
        let file = InputSource::from_url("/media/clip.mp4").unwrap();
        assert_eq!(file.kind, InputKind::File);
        assert!(file.loop_file);
        assert!(matches!(
            InputSource::from_url("srt://host:9000"),
            Err(TranscodeError::UnsupportedInputKind(_))
        ));
    }

    #[test]
    fn from_url_udp_requires_authority() {
        let upper = InputSource::from_url("UDP://239.0.0.1:1234").unwrap();
        assert_eq!(upper.kind, InputKind::Udp);
        assert_eq!(upper.locator, "239.0.0.1:1234");
        for raw in ["udp:x", "udp:", "udp:/abc"] {
            assert!(
                matches!(
                    InputSource::from_url(raw),
                    Err(TranscodeError::UnsupportedInputKind(ref got)) if got == raw
                ),
                "{raw} should be rejected"
            );
        }
    }
}
