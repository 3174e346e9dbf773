use std::io;
use std::path::{Path, PathBuf};

use tokio::fs::File;
use tokio::io::AsyncReadExt;
use tracing::warn;

use super::SupervisorTimings;

/// Follows `path` from its beginning, handing each complete line to `sink`.
///
/// `\n`, `\r` and `\r\n` all end a line, so ffmpeg's in-place progress
/// updates come through one by one. Waits for the file to appear. A trailing
/// partial line is held back until its terminator arrives. Runs until aborted.
pub(super) async fn follow<S>(path: PathBuf, timings: SupervisorTimings, mut sink: S)
where
    S: FnMut(String) + Send + 'static,
{
    if let Err(error) = follow_inner(&path, &timings, &mut sink).await {
        warn!(path = %path.display(), %error, "log tail stopped");
    }
}

async fn follow_inner<S>(path: &Path, timings: &SupervisorTimings, sink: &mut S) -> io::Result<()>
where
    S: FnMut(String),
{
    let mut file = loop {
        match File::open(path).await {
            Ok(file) => break file,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                tokio::time::sleep(timings.log_wait).await
            }
            Err(err) => return Err(err),
        }
    };

    let mut chunk = vec![0u8; 8 * 1024];
    let mut lines = LineSplitter::default();
    loop {
        let read = file.read(&mut chunk).await?;
        if read == 0 {
            tokio::time::sleep(timings.log_retry).await;
            continue;
        }
        lines.feed(&chunk[..read], &mut *sink);
    }
}

/// Incremental line splitter; only the unterminated tail is buffered.
#[derive(Debug, Default)]
struct LineSplitter {
    pending: Vec<u8>,
    after_cr: bool,
}

impl LineSplitter {
    fn feed<S>(&mut self, bytes: &[u8], sink: &mut S)
    where
        S: FnMut(String),
    {
        for &byte in bytes {
            match byte {
                b'\n' if self.after_cr => self.after_cr = false,
                b'\r' | b'\n' => {
                    self.after_cr = byte == b'\r';
                    sink(String::from_utf8_lossy(&self.pending).into_owned());
                    self.pending.clear();
                }
                _ => {
                    self.after_cr = false;
                    self.pending.push(byte);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    fn fast() -> SupervisorTimings {
        SupervisorTimings {
            poll_interval: Duration::from_millis(10),
            log_retry: Duration::from_millis(10),
            log_wait: Duration::from_millis(10),
        }
    }

    async fn wait_for_lines(lines: &Arc<Mutex<Vec<String>>>, count: usize) {
        for _ in 0..200 {
            if lines.lock().unwrap().len() >= count {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    #[tokio::test]
    async fn waits_for_file_and_holds_partial_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("late.log");
        let lines = Arc::new(Mutex::new(Vec::new()));
        let sink_lines = lines.clone();
        let task = tokio::spawn(follow(path.clone(), fast(), move |line| {
            sink_lines.lock().unwrap().push(line)
        }));

        tokio::time::sleep(Duration::from_millis(50)).await;
        std::fs::write(&path, "frame=1\nframe=").unwrap();
        wait_for_lines(&lines, 1).await;
        assert_eq!(*lines.lock().unwrap(), ["frame=1"]);

        let mut file = std::fs::OpenOptions::new().append(true).open(&path).unwrap();
        std::io::Write::write_all(&mut file, b"2\r\n").unwrap();
        wait_for_lines(&lines, 2).await;
        assert_eq!(*lines.lock().unwrap(), ["frame=1", "frame=2"]);
        task.abort();
    }

    fn split(chunks: &[&str]) -> Vec<String> {
        let mut lines = Vec::new();
        let mut splitter = LineSplitter::default();
        for chunk in chunks {
            splitter.feed(chunk.as_bytes(), &mut |line: String| lines.push(line));
        }
        lines
    }

    #[test]
    fn carriage_returns_end_lines() {
        assert_eq!(split(&["a\rb\rc\n"]), ["a", "b", "c"]);
        assert_eq!(split(&["x\r\ny\n\nz"]), ["x", "y", ""]);
        assert_eq!(split(&["x\r", "\ny\r"]), ["x", "y"]);
    }

    #[test]
    fn only_the_unterminated_tail_is_buffered() {
        let mut splitter = LineSplitter::default();
        let mut count = 0;
        for _ in 0..1000 {
            splitter.feed(b"frame=1 fps=25\r", &mut |_: String| count += 1);
        }
        splitter.feed(b"frame=", &mut |_: String| count += 1);
        assert_eq!(count, 1000);
        assert_eq!(splitter.pending, b"frame=");
    }

    #[tokio::test]
    async fn progress_updates_are_emitted_as_they_arrive() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("progress.log");
        std::fs::write(&path, "banner\nframe=1 fps=25\rframe=2 fps=25\rframe=3 fps=25\r").unwrap();
        let lines = Arc::new(Mutex::new(Vec::new()));
        let sink_lines = lines.clone();
        let task = tokio::spawn(follow(path, fast(), move |line| {
            sink_lines.lock().unwrap().push(line)
        }));

        wait_for_lines(&lines, 4).await;
        task.abort();
        assert_eq!(
            *lines.lock().unwrap(),
            ["banner", "frame=1 fps=25", "frame=2 fps=25", "frame=3 fps=25"]
        );
    }
}
