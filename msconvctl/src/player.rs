use std::os::unix::process::CommandExt;
use std::process::Command;

use clap::ValueEnum;
use tracing::info;

use crate::{AppError, Result};

/// External viewers msconvctl knows how to launch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Player {
    Vlc,
    Ffplay,
}

impl Player {
    /// Parses the `[playback] player` config value.
    pub fn from_config(name: &str) -> Result<Self> {
        <Self as ValueEnum>::from_str(name, true)
            .map_err(|_| AppError::InvalidOption(format!("unknown player '{name}'")))
    }

    pub fn binary(&self) -> &'static str {
        match self {
            Player::Vlc => "vlc",
            Player::Ffplay => "ffplay",
        }
    }

    /// Replaces the current process with the player. Only returns on failure.
    pub fn exec(&self, url: &str) -> AppError {
        exec_binary(self.binary(), url)
    }
}

fn exec_binary(binary: &str, url: &str) -> AppError {
    info!(player = binary, url, "launching player");
    let err = Command::new(binary).arg(url).exec();
    AppError::Playback(format!("could not launch {binary}: {err}"))
}

/// `rtsp://host:port/key`, suffixed with `_variant` unless the original is requested
/// or no variant was given.
pub fn playback_url(host: &str, port: u16, stream_key: &str, variant: &str, original: bool) -> String {
    if original || variant.is_empty() {
        format!("rtsp://{host}:{port}/{stream_key}")
    } else {
        format!("rtsp://{host}:{port}/{stream_key}_{variant}")
    }
}
