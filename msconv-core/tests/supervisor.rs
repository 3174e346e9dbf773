use std::fs;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use msconv_core::supervisor::{
    ProcessSupervisor, StopOutcome, SupervisorError, SupervisorTimings, TailOutcome,
};
use tempfile::TempDir;

fn fast_supervisor(dir: &TempDir) -> ProcessSupervisor {
    ProcessSupervisor::new(dir.path().join("pids"), dir.path().join("logs/ffmpeg")).with_timings(
        SupervisorTimings {
            poll_interval: Duration::from_millis(20),
            log_retry: Duration::from_millis(20),
            log_wait: Duration::from_millis(20),
        },
    )
}

#[test]
fn start_then_stop_round_trip() {
    let dir = TempDir::new().unwrap();
    let supervisor = fast_supervisor(&dir);

    let pid = supervisor.start("demo", "sleep 30").unwrap();
    assert!(pid > 0);
    assert!(supervisor.is_active("demo"));
    let recorded = fs::read_to_string(supervisor.pid_file("demo")).unwrap();
    assert_eq!(recorded.trim(), pid.to_string());
    assert!(supervisor.log_file("demo").exists());

    let outcome = supervisor.stop("demo").unwrap();
    assert_eq!(outcome, StopOutcome::Signalled { pid });
    assert!(!supervisor.is_active("demo"));

    let err = supervisor.stop("demo").unwrap_err();
    assert!(matches!(err, SupervisorError::NoActiveStream(_)));
}

#[test]
fn start_truncates_previous_log() {
    let dir = TempDir::new().unwrap();
    let supervisor = fast_supervisor(&dir);
    fs::create_dir_all(dir.path().join("logs/ffmpeg")).unwrap();
    fs::write(supervisor.log_file("demo"), "stale output\n").unwrap();

    supervisor.start("demo", "sleep 30").unwrap();
    let log = fs::read_to_string(supervisor.log_file("demo")).unwrap();
    assert!(!log.contains("stale output"));
    supervisor.stop("demo").unwrap();
}

#[test]
fn stale_marker_reports_vanished_process() {
    let dir = TempDir::new().unwrap();
    let supervisor = fast_supervisor(&dir);
    fs::create_dir_all(dir.path().join("pids")).unwrap();
    // Far above any default pid_max.
    fs::write(supervisor.pid_file("stale"), "99999999").unwrap();

    assert!(supervisor.is_active("stale"));
    let outcome = supervisor.stop("stale").unwrap();
    assert_eq!(outcome, StopOutcome::Vanished { pid: 99999999 });
    assert!(!supervisor.is_active("stale"));
}

#[tokio::test]
async fn tail_finishes_when_marker_is_removed() {
    let dir = TempDir::new().unwrap();
    let supervisor = fast_supervisor(&dir);
    supervisor
        .start("tail", "echo first; echo second; sleep 30")
        .unwrap();

    let lines = Arc::new(Mutex::new(Vec::new()));
    let sink_lines = lines.clone();
    let stopper = supervisor.clone();
    let tail = tokio::spawn(async move {
        let supervisor = stopper;
        supervisor
            .tail_log(
                "tail",
                move |line| sink_lines.lock().unwrap().push(line),
                std::future::pending::<()>(),
            )
            .await
    });

    for _ in 0..100 {
        if lines.lock().unwrap().len() >= 2 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    supervisor.stop("tail").unwrap();

    let outcome = tokio::time::timeout(Duration::from_secs(5), tail)
        .await
        .expect("tail should end once the marker is gone")
        .unwrap()
        .unwrap();
    assert_eq!(outcome, TailOutcome::Finished);
    assert_eq!(*lines.lock().unwrap(), ["first", "second"]);
}

#[tokio::test]
async fn interrupting_tail_stops_the_process_group() {
    let dir = TempDir::new().unwrap();
    let supervisor = fast_supervisor(&dir);
    let pid = supervisor
        .start(
            "grp",
            "trap 'echo terminated; exit 0' TERM; while true; do sleep 0.05; done",
        )
        .unwrap();

    let (cancel_tx, cancel_rx) = tokio::sync::oneshot::channel::<()>();
    let worker = supervisor.clone();
    let tail = tokio::spawn(async move {
        worker
            .tail_log("grp", |_| {}, async move {
                let _ = cancel_rx.await;
            })
            .await
    });

    tokio::time::sleep(Duration::from_millis(100)).await;
    cancel_tx.send(()).unwrap();
    let outcome = tail.await.unwrap().unwrap();
    assert_eq!(outcome, TailOutcome::Interrupted(StopOutcome::Signalled { pid }));
    assert!(!supervisor.is_active("grp"));

    let mut log = String::new();
    for _ in 0..100 {
        log = fs::read_to_string(supervisor.log_file("grp")).unwrap();
        if log.contains("terminated") {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(log.contains("terminated"));
}
