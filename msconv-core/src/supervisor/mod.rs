mod tail;

use std::fs::{self, File};
use std::future::Future;
use std::io;
use std::os::unix::process::CommandExt;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::Duration;

use chrono::{DateTime, Utc};
use nix::errno::Errno;
use nix::sys::signal::{killpg, Signal};
use nix::unistd::{getpgid, Pid};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::SupervisorSection;

#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("no active stream found for '{0}'")]
    NoActiveStream(String),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

pub type SupervisorResult<T> = std::result::Result<T, SupervisorError>;

/// On-disk claim that a stream's transcoder is running.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProcessRecord {
    pub stream_key: String,
    pub pid: i32,
    pub started_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum StopOutcome {
    Signalled { pid: i32 },
    Vanished { pid: i32 },
    SignalFailed { pid: Option<i32>, reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TailOutcome {
    /// The marker disappeared; someone else stopped the stream.
    Finished,
    /// The caller cancelled and the stream was stopped on its behalf.
    Interrupted(StopOutcome),
}

#[derive(Debug, Clone)]
pub struct SupervisorTimings {
    pub poll_interval: Duration,
    pub log_retry: Duration,
    pub log_wait: Duration,
}

impl Default for SupervisorTimings {
    fn default() -> Self {
        Self::from(&SupervisorSection::default())
    }
}

impl From<&SupervisorSection> for SupervisorTimings {
    fn from(section: &SupervisorSection) -> Self {
        Self {
            poll_interval: Duration::from_millis(section.poll_interval_ms),
            log_retry: Duration::from_millis(section.log_retry_ms),
            log_wait: Duration::from_millis(section.log_wait_ms),
        }
    }
}

/// Starts, tracks and stops detached transcoder processes through pid marker files.
///
/// The marker is the only coordination between invocations. Two invocations
/// racing to start or stop the same key are not guarded against.
#[derive(Debug, Clone)]
pub struct ProcessSupervisor {
    pids_dir: PathBuf,
    logs_dir: PathBuf,
    timings: SupervisorTimings,
}

impl ProcessSupervisor {
    pub fn new(pids_dir: impl Into<PathBuf>, logs_dir: impl Into<PathBuf>) -> Self {
        Self {
            pids_dir: pids_dir.into(),
            logs_dir: logs_dir.into(),
            timings: SupervisorTimings::default(),
        }
    }

    pub fn with_timings(mut self, timings: SupervisorTimings) -> Self {
        self.timings = timings;
        self
    }

    pub fn pid_file(&self, stream_key: &str) -> PathBuf {
        self.pids_dir.join(format!("{stream_key}.pid"))
    }

    pub fn log_file(&self, stream_key: &str) -> PathBuf {
        self.logs_dir.join(format!("{stream_key}.log"))
    }

    /// Launches `command` through `sh -c` in its own process group and records its pid.
    ///
    /// The log file is truncated. Callers check [`Self::is_active`] first.
    pub fn start(&self, stream_key: &str, command: &str) -> SupervisorResult<i32> {
        fs::create_dir_all(&self.logs_dir)?;
        fs::create_dir_all(&self.pids_dir)?;
        let log = File::create(self.log_file(stream_key))?;
        let log_err = log.try_clone()?;

        let child = Command::new("sh")
            .arg("-c")
            .arg(command)
            .stdin(Stdio::null())
            .stdout(log)
            .stderr(log_err)
            .process_group(0)
            .spawn()?;
        let pid = i32::try_from(child.id())
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "pid out of range"))?;

        fs::write(self.pid_file(stream_key), pid.to_string())?;
        info!(stream_key, pid, "transcoder started");
        Ok(pid)
    }

    pub fn is_active(&self, stream_key: &str) -> bool {
        self.pid_file(stream_key).exists()
    }

    /// Signals the recorded process group and removes the marker.
    ///
    /// The marker goes away even when the signal could not be delivered.
    pub fn stop(&self, stream_key: &str) -> SupervisorResult<StopOutcome> {
        let pid_file = self.pid_file(stream_key);
        let contents = match fs::read_to_string(&pid_file) {
            Ok(contents) => contents,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return Err(SupervisorError::NoActiveStream(stream_key.to_string()))
            }
            Err(err) => return Err(err.into()),
        };

        let outcome = match contents.trim().parse::<i32>() {
            Ok(pid) if pid > 0 => terminate_group(pid),
            _ => StopOutcome::SignalFailed {
                pid: None,
                reason: format!("unreadable pid marker '{}'", contents.trim()),
            },
        };

        remove_marker(&pid_file)?;
        match &outcome {
            StopOutcome::Signalled { pid } => info!(stream_key, pid, "sent SIGTERM to process group"),
            StopOutcome::Vanished { pid } => warn!(stream_key, pid, "no process with recorded pid"),
            StopOutcome::SignalFailed { pid, reason } => {
                warn!(stream_key, ?pid, reason = %reason, "failed to signal process group")
            }
        }
        Ok(outcome)
    }

    /// Lists the markers currently on disk, sorted by stream key.
    pub fn records(&self) -> SupervisorResult<Vec<ProcessRecord>> {
        let entries = match fs::read_dir(&self.pids_dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };
        let mut records = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if path.extension().map(|ext| ext != "pid").unwrap_or(true) {
                continue;
            }
            let Some(stream_key) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            match read_record(&path, stream_key) {
                Ok(record) => records.push(record),
                Err(error) => {
                    warn!(path = %path.display(), %error, "skipping unreadable pid marker")
                }
            }
        }
        records.sort_by(|a, b| a.stream_key.cmp(&b.stream_key));
        Ok(records)
    }

    /// Streams new log lines into `sink` until the marker disappears.
    ///
    /// When `cancel` resolves first the stream is stopped before returning.
    pub async fn tail_log<S, C>(
        &self,
        stream_key: &str,
        sink: S,
        cancel: C,
    ) -> SupervisorResult<TailOutcome>
    where
        S: FnMut(String) + Send + 'static,
        C: Future<Output = ()>,
    {
        let log_file = self.log_file(stream_key);
        let reader = tokio::spawn(tail::follow(log_file, self.timings.clone(), sink));
        let outcome = self.wait_for_exit(stream_key, cancel).await;
        reader.abort();
        outcome
    }

    async fn wait_for_exit<C>(&self, stream_key: &str, cancel: C) -> SupervisorResult<TailOutcome>
    where
        C: Future<Output = ()>,
    {
        tokio::pin!(cancel);
        while self.is_active(stream_key) {
            tokio::select! {
                _ = &mut cancel => {
                    info!(stream_key, "interrupted, stopping stream");
                    return match self.stop(stream_key) {
                        Ok(outcome) => Ok(TailOutcome::Interrupted(outcome)),
                        Err(SupervisorError::NoActiveStream(_)) => Ok(TailOutcome::Finished),
                        Err(err) => Err(err),
                    };
                }
                _ = tokio::time::sleep(self.timings.poll_interval) => {}
            }
        }
        debug!(stream_key, "pid marker removed");
        Ok(TailOutcome::Finished)
    }
}

fn terminate_group(pid: i32) -> StopOutcome {
    let result = getpgid(Some(Pid::from_raw(pid))).and_then(|pgid| killpg(pgid, Signal::SIGTERM));
    match result {
        Ok(()) => StopOutcome::Signalled { pid },
        Err(Errno::ESRCH) => StopOutcome::Vanished { pid },
        Err(errno) => StopOutcome::SignalFailed {
            pid: Some(pid),
            reason: errno.desc().to_string(),
        },
    }
}

fn remove_marker(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Err(err) if err.kind() != io::ErrorKind::NotFound => Err(err),
        _ => Ok(()),
    }
}

fn read_record(path: &Path, stream_key: &str) -> io::Result<ProcessRecord> {
    let contents = fs::read_to_string(path)?;
    let pid = contents
        .trim()
        .parse::<i32>()
        .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))?;
    let started_at = fs::metadata(path)
        .and_then(|meta| meta.modified())
        .ok()
        .map(DateTime::<Utc>::from);
    Ok(ProcessRecord {
        stream_key: stream_key.to_string(),
        pid,
        started_at,
    })
}
