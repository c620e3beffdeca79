//! Log tail follower.
//!
//! Follows the game log by byte offset. The follower tolerates the file
//! not existing yet (the game creates it on launch), partial writes (a
//! line is processed only once its newline arrives), and rotation or
//! truncation (a shrinking file reopens from offset zero).

use std::io::SeekFrom;
use std::path::PathBuf;

use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, AsyncSeekExt, BufReader};
use tokio::sync::{mpsc, watch};
use tokio::time::{Duration, sleep};

use crate::game_log;
use crate::tracker::TrackerEvent;

/// Follow `path`, sending every recognized log event to `tx`.
///
/// `start_byte: None` starts at the current end of file (skip history);
/// `Some(offset)` resumes from a known position, e.g. after a startup scan.
/// Returns when the shutdown flag flips or the receiver goes away.
pub async fn follow_log(
    path: PathBuf,
    start_byte: Option<u64>,
    poll_interval: Duration,
    tx: mpsc::Sender<TrackerEvent>,
    mut shutdown: watch::Receiver<bool>,
) -> std::io::Result<()> {
    let mut resume_at = start_byte;

    loop {
        if *shutdown.borrow() {
            return Ok(());
        }

        let file = match File::open(&path).await {
            Ok(file) => file,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "log file not present yet");
                if wait_or_shutdown(poll_interval, &mut shutdown).await {
                    return Ok(());
                }
                continue;
            }
            Err(err) => return Err(err),
        };

        let len = file.metadata().await?.len();
        // A resume offset past the end means the file was rotated while we
        // were away; start over from the top of the new file.
        let mut offset = resume_at.take().unwrap_or(len).min(len);

        let mut reader = BufReader::new(file);
        reader.seek(SeekFrom::Start(offset)).await?;
        tracing::info!(path = %path.display(), offset, "following log file");

        let mut line = String::new();
        loop {
            if *shutdown.borrow() {
                return Ok(());
            }

            match reader.read_line(&mut line).await {
                Ok(0) => {
                    // No new data. Re-stat by path: a shorter file means
                    // rotation/truncation, a missing file means re-create.
                    match tokio::fs::metadata(&path).await {
                        Ok(meta) if meta.len() < offset => {
                            tracing::info!(path = %path.display(), "log file rotated, reopening");
                            resume_at = Some(0);
                            break;
                        }
                        Ok(_) => {}
                        Err(_) => {
                            resume_at = Some(0);
                            break;
                        }
                    }
                    if wait_or_shutdown(poll_interval, &mut shutdown).await {
                        return Ok(());
                    }
                }
                Ok(n) => {
                    offset += n as u64;
                    if !line.ends_with('\n') {
                        // Partial line: the writer hasn't finished it yet.
                        // Keep the buffer; the next read appends the rest.
                        continue;
                    }
                    if let Some(event) = game_log::parse_line(line.trim_end()) {
                        if tx.send(TrackerEvent::Log(event)).await.is_err() {
                            return Ok(());
                        }
                    }
                    line.clear();
                }
                Err(err) => {
                    tracing::warn!(%err, "error reading log file, reopening");
                    resume_at = Some(offset);
                    break;
                }
            }
        }
    }
}

/// Sleep one poll interval; true when shutdown fired instead.
async fn wait_or_shutdown(poll_interval: Duration, shutdown: &mut watch::Receiver<bool>) -> bool {
    tokio::select! {
        _ = sleep(poll_interval) => false,
        // A dropped sender counts as shutdown.
        changed = shutdown.changed() => changed.is_err() || *shutdown.borrow(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game_log::LogEvent;
    use std::io::Write;
    use tokio::time::timeout;

    const POLL: Duration = Duration::from_millis(20);
    const WAIT: Duration = Duration::from_secs(5);

    fn temp_path(tag: &str) -> PathBuf {
        std::env::temp_dir().join(format!("tacmap-tail-test-{tag}-{}.log", std::process::id()))
    }

    async fn recv_log(rx: &mut mpsc::Receiver<TrackerEvent>) -> LogEvent {
        match timeout(WAIT, rx.recv()).await.unwrap().unwrap() {
            TrackerEvent::Log(event) => event,
            other => panic!("expected log event, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_follow_picks_up_appended_lines() {
        let path = temp_path("append");
        std::fs::write(&path, "old|GameStarted\n").unwrap();

        let (tx, mut rx) = mpsc::channel(16);
        let (stop_tx, stop_rx) = watch::channel(false);
        let handle = tokio::spawn(follow_log(path.clone(), None, POLL, tx, stop_rx));

        // Started at EOF: the existing line is skipped.
        sleep(POLL * 3).await;
        let mut file = std::fs::OpenOptions::new().append(true).open(&path).unwrap();
        writeln!(file, "ts|app|UserMatchOver").unwrap();

        assert_eq!(recv_log(&mut rx).await, LogEvent::MatchEnded);

        stop_tx.send(true).unwrap();
        timeout(WAIT, handle).await.unwrap().unwrap().unwrap();
        let _ = std::fs::remove_file(path);
    }

    #[tokio::test]
    async fn test_partial_line_emitted_once_complete() {
        let path = temp_path("partial");
        std::fs::write(&path, "").unwrap();

        let (tx, mut rx) = mpsc::channel(16);
        let (stop_tx, stop_rx) = watch::channel(false);
        let handle = tokio::spawn(follow_log(path.clone(), Some(0), POLL, tx, stop_rx));

        let mut file = std::fs::OpenOptions::new().append(true).open(&path).unwrap();
        write!(file, "ts|app|Game").unwrap();
        file.flush().unwrap();
        sleep(POLL * 3).await;
        writeln!(file, "Started").unwrap();

        assert_eq!(recv_log(&mut rx).await, LogEvent::MatchStarted);
        // Exactly one event for the split line.
        sleep(POLL * 3).await;
        assert!(rx.try_recv().is_err());

        stop_tx.send(true).unwrap();
        timeout(WAIT, handle).await.unwrap().unwrap().unwrap();
        let _ = std::fs::remove_file(path);
    }

    #[tokio::test]
    async fn test_truncated_file_reopens_from_start() {
        let path = temp_path("truncate");
        // Longer than the replacement so the length regression is visible.
        std::fs::write(&path, "2024-12-05 14:30:40|  application|GameStarted\n").unwrap();

        let (tx, mut rx) = mpsc::channel(16);
        let (stop_tx, stop_rx) = watch::channel(false);
        let handle = tokio::spawn(follow_log(path.clone(), Some(0), POLL, tx, stop_rx));
        assert_eq!(recv_log(&mut rx).await, LogEvent::MatchStarted);

        // Rotate: replace with a shorter file.
        std::fs::write(&path, "ts|app|UserMatchOver\n").unwrap();
        assert_eq!(recv_log(&mut rx).await, LogEvent::MatchEnded);

        stop_tx.send(true).unwrap();
        timeout(WAIT, handle).await.unwrap().unwrap().unwrap();
        let _ = std::fs::remove_file(path);
    }

    #[tokio::test]
    async fn test_missing_file_waits_then_follows() {
        let path = temp_path("missing");
        let _ = std::fs::remove_file(&path);

        let (tx, mut rx) = mpsc::channel(16);
        let (stop_tx, stop_rx) = watch::channel(false);
        let handle = tokio::spawn(follow_log(path.clone(), Some(0), POLL, tx, stop_rx));

        sleep(POLL * 3).await;
        std::fs::write(&path, "ts|app|GameStarted\n").unwrap();

        assert_eq!(recv_log(&mut rx).await, LogEvent::MatchStarted);

        stop_tx.send(true).unwrap();
        timeout(WAIT, handle).await.unwrap().unwrap().unwrap();
        let _ = std::fs::remove_file(path);
    }
}
