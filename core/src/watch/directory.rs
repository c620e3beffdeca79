//! Screenshot directory watcher.
//!
//! Wraps a native filesystem watcher and pushes parsed poses straight into
//! the pipeline's event queue. The notify callback runs on the watcher's
//! own thread, so it must never block: it uses `try_send` and drops the
//! sample when the queue is full: a lost position sample is harmless,
//! a stalled watcher thread is not.

use std::path::Path;

use notify::event::{EventKind, ModifyKind};
use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

use crate::screenshot;
use crate::tracker::TrackerEvent;

/// Keeps the underlying watcher alive; dropping this stops the stream.
pub struct ScreenshotWatcher {
    _watcher: RecommendedWatcher,
}

impl ScreenshotWatcher {
    /// Watch `dir` (non-recursively) and forward every new screenshot's
    /// parsed pose to `tx`.
    pub fn spawn(dir: &Path, tx: mpsc::Sender<TrackerEvent>) -> notify::Result<Self> {
        // The game may write via create or via temp-file rename, and some
        // platforms report both for one file; dedup consecutive repeats.
        let mut last_seen: Option<String> = None;

        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            let event = match res {
                Ok(event) => event,
                Err(err) => {
                    tracing::warn!(%err, "screenshot watcher error");
                    return;
                }
            };
            if !is_arrival(&event.kind) {
                return;
            }
            for path in &event.paths {
                let Some(name) = path.to_str() else { continue };
                if last_seen.as_deref() == Some(name) {
                    continue;
                }
                match screenshot::parse_screenshot_name(name) {
                    Ok(raw) => {
                        last_seen = Some(name.to_string());
                        tracing::debug!(file = %path.display(), "screenshot position captured");
                        if tx.try_send(TrackerEvent::Screenshot(raw)).is_err() {
                            tracing::trace!("event queue full, screenshot sample dropped");
                        }
                    }
                    Err(_) => {
                        // Not every file in the folder is a pose screenshot.
                        tracing::trace!(file = %path.display(), "ignoring non-screenshot file");
                    }
                }
            }
        })?;

        watcher.watch(dir, RecursiveMode::NonRecursive)?;
        tracing::info!(dir = %dir.display(), "watching screenshot directory");

        Ok(Self { _watcher: watcher })
    }
}

fn is_arrival(kind: &EventKind) -> bool {
    matches!(
        kind,
        EventKind::Create(_) | EventKind::Modify(ModifyKind::Name(_))
    )
}
