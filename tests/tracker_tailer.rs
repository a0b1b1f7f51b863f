// tests/tracker_tailer.rs

mod common;
use crate::common::init_tracing;

use std::error::Error;
use std::io::Write;
use std::time::Duration;

use tempfile::tempdir;
use tokio::sync::mpsc;
use tokio::time::{sleep, timeout};

use plotfarm::tracker::{spawn_tailer, TailEvent, TailerOptions};

type TestResult = Result<(), Box<dyn Error>>;

fn fast_options() -> TailerOptions {
    TailerOptions {
        poll_interval: Duration::from_millis(20),
        retry_backoff: Duration::from_millis(10),
        max_retries: 2,
    }
}

async fn next_event(rx: &mut mpsc::Receiver<TailEvent>) -> TailEvent {
    timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting for tail event")
        .expect("tail channel closed")
}

fn line(id: u32, text: &str, live: bool) -> TailEvent {
    TailEvent::Line {
        id,
        text: text.to_string(),
        live,
    }
}

#[tokio::test]
async fn replays_existing_lines_then_follows_live() -> TestResult {
    init_tracing();
    let dir = tempdir()?;
    let path = dir.path().join("100.log");
    let mut file = std::fs::File::create(&path)?;
    writeln!(file, "Starting phase 1/4: Forward Propagation")?;
    writeln!(file, "Computing table 2\r")?;
    file.flush()?;

    let (tx, mut rx) = mpsc::channel(16);
    let handle = spawn_tailer(100, path.clone(), fast_options(), tx);

    assert_eq!(next_event(&mut rx).await, line(100, "Starting phase 1/4: Forward Propagation", false));
    assert_eq!(next_event(&mut rx).await, line(100, "Computing table 2", false));

    // Let the reader hit end-of-stream before appending.
    sleep(Duration::from_millis(150)).await;
    writeln!(file, "Computing table 3")?;
    file.flush()?;

    assert_eq!(next_event(&mut rx).await, line(100, "Computing table 3", true));

    handle.abort();
    Ok(())
}

#[tokio::test]
async fn partial_lines_are_joined() -> TestResult {
    let dir = tempdir()?;
    let path = dir.path().join("7.log");
    let mut file = std::fs::File::create(&path)?;

    let (tx, mut rx) = mpsc::channel(16);
    let handle = spawn_tailer(7, path.clone(), fast_options(), tx);

    sleep(Duration::from_millis(100)).await;
    write!(file, "Computing ta")?;
    file.flush()?;
    sleep(Duration::from_millis(100)).await;
    writeln!(file, "ble 5")?;
    file.flush()?;

    assert_eq!(next_event(&mut rx).await, line(7, "Computing table 5", true));

    handle.abort();
    Ok(())
}

#[tokio::test]
async fn missing_stream_closes_after_retries() -> TestResult {
    init_tracing();
    let dir = tempdir()?;
    let path = dir.path().join("does-not-exist.log");

    let (tx, mut rx) = mpsc::channel(16);
    let handle = spawn_tailer(55, path, fast_options(), tx);

    assert_eq!(next_event(&mut rx).await, TailEvent::Closed { id: 55 });
    timeout(Duration::from_secs(5), handle).await??;
    Ok(())
}

#[tokio::test]
async fn tailer_stops_when_receiver_is_gone() -> TestResult {
    let dir = tempdir()?;
    let path = dir.path().join("1.log");
    let mut file = std::fs::File::create(&path)?;
    writeln!(file, "ID: abc")?;

    let (tx, rx) = mpsc::channel(16);
    drop(rx);
    let handle = spawn_tailer(1, path, fast_options(), tx);

    timeout(Duration::from_secs(5), handle).await??;
    Ok(())
}
