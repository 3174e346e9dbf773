use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read msconv config {}: {source}", path.display())]
    Io { source: io::Error, path: PathBuf },
    #[error("invalid msconv config {}: {source}", path.display())]
    Parse {
        source: toml::de::Error,
        path: PathBuf,
    },
}

pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct MsconvConfig {
    pub paths: PathsSection,
    pub ffmpeg: FfmpegSection,
    pub publish: PublishSection,
    pub supervisor: SupervisorSection,
    pub discovery: DiscoverySection,
    pub playback: PlaybackSection,
}

impl MsconvConfig {
    /// Resolves a relative path against `paths.base_dir`.
    pub fn resolve_path<P: AsRef<Path>>(&self, candidate: P) -> PathBuf {
        let path = candidate.as_ref();
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            Path::new(&self.paths.base_dir).join(path)
        }
    }

    pub fn pids_dir(&self) -> PathBuf {
        self.resolve_path(&self.paths.pids_dir)
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.resolve_path(&self.paths.logs_dir)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PathsSection {
    pub base_dir: String,
    pub pids_dir: String,
    pub logs_dir: String,
}

impl Default for PathsSection {
    fn default() -> Self {
        Self {
            base_dir: ".".to_string(),
            pids_dir: "pids".to_string(),
            logs_dir: "logs/ffmpeg".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FfmpegSection {
    pub binary: String,
    pub ffprobe: String,
    pub log_level: Option<String>,
    pub probe_timeout_seconds: u64,
}

impl FfmpegSection {
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_seconds)
    }
}

impl Default for FfmpegSection {
    fn default() -> Self {
        Self {
            binary: "ffmpeg".to_string(),
            ffprobe: "ffprobe".to_string(),
            log_level: None,
            probe_timeout_seconds: 5,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PublishSection {
    pub output_url: String,
}

impl Default for PublishSection {
    fn default() -> Self {
        Self {
            output_url: "rtmp://localhost:1935/live".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SupervisorSection {
    pub poll_interval_ms: u64,
    pub log_retry_ms: u64,
    pub log_wait_ms: u64,
}

impl Default for SupervisorSection {
    fn default() -> Self {
        Self {
            poll_interval_ms: 1000,
            log_retry_ms: 1000,
            log_wait_ms: 500,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DiscoverySection {
    pub nginx_host: String,
    pub nginx_stat_port: u16,
    pub mediamtx_host: String,
    pub mediamtx_api_port: u16,
    pub timeout_seconds: u64,
}

impl DiscoverySection {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

impl Default for DiscoverySection {
    fn default() -> Self {
        Self {
            nginx_host: "localhost".to_string(),
            nginx_stat_port: 8080,
            mediamtx_host: "localhost".to_string(),
            mediamtx_api_port: 9997,
            timeout_seconds: 5,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PlaybackSection {
    pub host: String,
    pub rtsp_port: u16,
    pub player: String,
}

impl Default for PlaybackSection {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            rtsp_port: 8554,
            player: "vlc".to_string(),
        }
    }
}

pub fn load_msconv_config<P: AsRef<Path>>(path: P) -> ConfigResult<MsconvConfig> {
    load_toml(path)
}

/// Like [`load_msconv_config`], but a missing file yields the built-in defaults.
pub fn load_msconv_config_or_default<P: AsRef<Path>>(path: P) -> ConfigResult<MsconvConfig> {
    let path = path.as_ref();
    if !path.exists() {
        return Ok(MsconvConfig::default());
    }
    load_toml(path)
}

fn load_toml<T, P>(path: P) -> ConfigResult<T>
where
    T: DeserializeOwned,
    P: AsRef<Path>,
{
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        source,
        path: path.to_path_buf(),
    })?;
    toml::from_str(&content).map_err(|source| ConfigError::Parse {
        source,
        path: path.to_path_buf(),
    })
}
