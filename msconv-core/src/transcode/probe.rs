use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::process::Command;
use tracing::debug;

#[derive(Debug, Error)]
pub enum ProbeFailure {
    #[error("probe timed out after {0:?}")]
    Timeout(Duration),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("probe exited with status {status:?}: {stderr}")]
    Exit { status: Option<i32>, stderr: String },
}

#[async_trait::async_trait]
pub trait CommandExecutor: Send + Sync {
    async fn run(&self, command: &mut Command) -> std::io::Result<std::process::Output>;
}

#[derive(Debug, Default)]
pub struct SystemCommandExecutor;

#[async_trait::async_trait]
impl CommandExecutor for SystemCommandExecutor {
    async fn run(&self, command: &mut Command) -> std::io::Result<std::process::Output> {
        command.output().await
    }
}

/// Answers whether an input carries at least one audio stream.
#[async_trait::async_trait]
pub trait AudioProbe: Send + Sync {
    async fn has_audio(&self, input: &str) -> Result<bool, ProbeFailure>;
}

pub struct FfprobeAudioProbe {
    ffprobe: PathBuf,
    timeout: Duration,
    executor: Arc<dyn CommandExecutor>,
}

impl fmt::Debug for FfprobeAudioProbe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FfprobeAudioProbe")
            .field("ffprobe", &self.ffprobe)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl FfprobeAudioProbe {
    pub fn new(
        ffprobe: impl Into<PathBuf>,
        timeout: Duration,
        executor: Option<Arc<dyn CommandExecutor>>,
    ) -> Self {
        let executor = executor.unwrap_or_else(|| Arc::new(SystemCommandExecutor));
        Self {
            ffprobe: ffprobe.into(),
            timeout,
            executor,
        }
    }
}

#[async_trait::async_trait]
impl AudioProbe for FfprobeAudioProbe {
    async fn has_audio(&self, input: &str) -> Result<bool, ProbeFailure> {
        let mut command = Command::new(&self.ffprobe);
        command
            .arg("-v")
            .arg("error")
            .arg("-select_streams")
            .arg("a")
            .arg("-show_entries")
            .arg("stream=index")
            .arg("-of")
            .arg("csv=p=0")
            .arg(input)
            .kill_on_drop(true);
        let output = tokio::time::timeout(self.timeout, self.executor.run(&mut command))
            .await
            .map_err(|_| ProbeFailure::Timeout(self.timeout))??;
        if !output.status.success() {
            return Err(ProbeFailure::Exit {
                status: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        let stdout = String::from_utf8_lossy(&output.stdout);
        debug!(input, streams = %stdout.trim(), "ffprobe audio streams");
        Ok(!stdout.trim().is_empty())
    }
}
