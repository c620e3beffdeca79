//! The tracking pipeline: watchers -> queue -> tracker -> broadcast.
//!
//! One consumer task owns the [`PositionTracker`]; the map registry is the
//! only shared state, read per-event by the consumer and written by the
//! calibration methods on [`Pipeline`]. Every calibration mutation is
//! persisted before it returns.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::{RwLock, broadcast, mpsc, watch};
use tokio::task::JoinHandle;

use super::directory::ScreenshotWatcher;
use super::tail;
use crate::config::AppConfig;
use crate::events::TrackerSignal;
use crate::map::store::{self, StoreError};
use crate::map::{CalibrationError, MapRegistry, Position3D};
use crate::reader;
use crate::tracker::{PositionTracker, TrackerEvent};

/// Bounded merged event queue. Position samples arrive a few per second at
/// most; a full queue means the consumer is wedged, and dropping is safer
/// than blocking a watcher.
const EVENT_QUEUE_CAPACITY: usize = 256;
const SIGNAL_CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("failed to watch screenshot directory: {0}")]
    Watch(#[from] notify::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// A running tracking pipeline.
pub struct Pipeline {
    registry: Arc<RwLock<MapRegistry>>,
    maps_dir: PathBuf,
    signal_tx: broadcast::Sender<TrackerSignal>,
    shutdown_tx: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
    // Keeps the native watcher registered for the pipeline's lifetime.
    _screenshot_watcher: Option<ScreenshotWatcher>,
}

impl Pipeline {
    /// Load the map store, optionally catch up on the existing log, and
    /// start the watchers and consumer.
    pub async fn start(config: &AppConfig, maps_dir: PathBuf) -> Result<Self, PipelineError> {
        let mut registry = MapRegistry::new(config.fit, config.floor_resolve);
        for map in store::load_maps(&maps_dir)? {
            registry.insert_map(map);
        }
        tracing::info!(maps = registry.len(), "map store loaded");

        let (event_tx, event_rx) = mpsc::channel(EVENT_QUEUE_CAPACITY);
        let (signal_tx, _) = broadcast::channel(SIGNAL_CHANNEL_CAPACITY);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let mut tracker = PositionTracker::new();
        let log_path = (!config.log_file.is_empty()).then(|| PathBuf::from(&config.log_file));

        // Catch up on history before going live so the tracker knows about
        // an already-running raid. Signals from replay are not published;
        // subscribers only see live state from here on.
        let mut tail_start = None;
        if let Some(path) = &log_path {
            if config.scan_existing_log && path.exists() {
                let (events, end) = reader::scan_log_file(path)?;
                let count = events.len();
                for event in events {
                    tracker.handle_event(TrackerEvent::Log(event), &mut registry);
                }
                tail_start = Some(end);
                tracing::info!(
                    events = count,
                    state = ?tracker.state(),
                    "caught up on existing log"
                );
            }
        }

        let registry = Arc::new(RwLock::new(registry));
        let mut tasks = Vec::new();

        let screenshot_watcher = if config.screenshot_directory.is_empty() {
            tracing::warn!("no screenshot directory configured, position tracking disabled");
            None
        } else {
            Some(ScreenshotWatcher::spawn(
                std::path::Path::new(&config.screenshot_directory),
                event_tx.clone(),
            )?)
        };

        match log_path {
            Some(path) => {
                let poll = Duration::from_millis(config.poll_interval_ms.max(50));
                let tx = event_tx.clone();
                let shutdown = shutdown_rx.clone();
                tasks.push(tokio::spawn(async move {
                    if let Err(err) = tail::follow_log(path, tail_start, poll, tx, shutdown).await {
                        tracing::error!(%err, "log follower stopped");
                    }
                }));
            }
            None => tracing::warn!("no log file configured, raid lifecycle disabled"),
        }

        tasks.push(tokio::spawn(run_consumer(
            event_rx,
            tracker,
            Arc::clone(&registry),
            signal_tx.clone(),
            shutdown_rx,
        )));

        Ok(Self {
            registry,
            maps_dir,
            signal_tx,
            shutdown_tx,
            tasks,
            _screenshot_watcher: screenshot_watcher,
        })
    }

    /// Subscribe to tracker signals. Slow subscribers lag and lose the
    /// oldest signals rather than backpressuring the pipeline.
    pub fn subscribe(&self) -> broadcast::Receiver<TrackerSignal> {
        self.signal_tx.subscribe()
    }

    pub fn registry(&self) -> Arc<RwLock<MapRegistry>> {
        Arc::clone(&self.registry)
    }

    // ── Calibration control interface ──────────────────────────────────

    pub async fn add_calibration_point(
        &self,
        map_id: &str,
        layer_id: i32,
        game_position: Position3D,
        map_pixel: (f64, f64),
    ) -> Result<u32, CalibrationError> {
        let mut registry = self.registry.write().await;
        let point_id = registry.add_calibration_point(map_id, layer_id, game_position, map_pixel)?;
        self.persist(&registry, map_id)?;
        Ok(point_id)
    }

    pub async fn remove_calibration_point(
        &self,
        map_id: &str,
        layer_id: i32,
        point_id: u32,
    ) -> Result<(), CalibrationError> {
        let mut registry = self.registry.write().await;
        registry.remove_calibration_point(map_id, layer_id, point_id)?;
        self.persist(&registry, map_id)?;
        Ok(())
    }

    pub async fn set_height_bounds(
        &self,
        map_id: &str,
        layer_id: i32,
        min: f64,
        max: f64,
    ) -> Result<(), CalibrationError> {
        let mut registry = self.registry.write().await;
        registry.set_height_bounds(map_id, layer_id, min, max)?;
        self.persist(&registry, map_id)?;
        Ok(())
    }

    fn persist(&self, registry: &MapRegistry, map_id: &str) -> Result<(), StoreError> {
        if let Some(config) = registry.map(map_id) {
            store::save_map(&self.maps_dir, config)?;
        }
        Ok(())
    }

    /// Stop watching, drain the queue, and close any in-flight session.
    pub async fn shutdown(mut self) {
        let _ = self.shutdown_tx.send(true);
        // Dropping the watcher stops the screenshot feed immediately.
        self._screenshot_watcher = None;
        for mut task in self.tasks.drain(..) {
            if tokio::time::timeout(Duration::from_secs(2), &mut task)
                .await
                .is_err()
            {
                tracing::warn!("pipeline task did not stop in time, aborting");
                task.abort();
            }
        }
        tracing::info!("pipeline stopped");
    }
}

/// Consumer loop: pull merged events, drive the tracker, publish signals.
async fn run_consumer(
    mut event_rx: mpsc::Receiver<TrackerEvent>,
    mut tracker: PositionTracker,
    registry: Arc<RwLock<MapRegistry>>,
    signal_tx: broadcast::Sender<TrackerSignal>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        let event = tokio::select! {
            changed = shutdown.changed() => {
                // A dropped sender counts as shutdown.
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
                continue;
            }
            event = event_rx.recv() => match event {
                Some(event) => event,
                None => break,
            },
        };

        let signals = {
            let mut registry = registry.write().await;
            tracker.handle_event(event, &mut registry)
        };
        publish(&signal_tx, signals);
    }

    // No dangling raid session on shutdown.
    publish(&signal_tx, tracker.close_session());
}

fn publish(signal_tx: &broadcast::Sender<TrackerSignal>, signals: Vec<TrackerSignal>) {
    for signal in signals {
        // Err just means nobody is subscribed right now.
        let _ = signal_tx.send(signal);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::map::{MapConfig, MapLayer};
    use crate::screenshot::{RawPosition, Rotation};
    use tokio::time::timeout;

    const WAIT: Duration = Duration::from_secs(5);

    fn calibrated_registry() -> MapRegistry {
        let mut config = MapConfig::new("bigmap", "Customs");
        let mut layer = MapLayer::new(0, "Ground", "g.png");
        layer.height_min = Some(-10.0);
        layer.height_max = Some(10.0);
        config.add_layer(layer);
        let mut registry = MapRegistry::default();
        registry.insert_map(config);
        for ((x, z), (px, py)) in [
            ((100.0, 100.0), (1000.0, 1000.0)),
            ((200.0, 100.0), (900.0, 1000.0)),
            ((100.0, 200.0), (1000.0, 900.0)),
        ] {
            registry
                .add_calibration_point("bigmap", 0, Position3D::new(x, 0.0, z), (px, py))
                .unwrap();
        }
        registry
    }

    fn screenshot_event(x: f64, y: f64, z: f64) -> TrackerEvent {
        TrackerEvent::Screenshot(RawPosition {
            captured_at: chrono::Local::now().naive_local(),
            position: Position3D::new(x, y, z),
            rotation: Rotation {
                x: 0.0,
                y: 0.0,
                z: 0.0,
                w: 1.0,
            },
            sequence: 0,
        })
    }

    #[tokio::test]
    async fn test_consumer_resolves_and_publishes() {
        let registry = Arc::new(RwLock::new(calibrated_registry()));
        let (event_tx, event_rx) = mpsc::channel(16);
        let (signal_tx, mut signal_rx) = broadcast::channel(16);
        let (stop_tx, stop_rx) = watch::channel(false);

        let consumer = tokio::spawn(run_consumer(
            event_rx,
            PositionTracker::new(),
            Arc::clone(&registry),
            signal_tx,
            stop_rx,
        ));

        event_tx
            .send(TrackerEvent::Log(crate::game_log::LogEvent::MatchCreated {
                location: Some("bigmap".to_string()),
                short_id: None,
                online: true,
            }))
            .await
            .unwrap();
        event_tx.send(screenshot_event(100.0, 0.0, 100.0)).await.unwrap();

        let started = timeout(WAIT, signal_rx.recv()).await.unwrap().unwrap();
        assert!(matches!(started, TrackerSignal::RaidStarted { .. }));

        let updated = timeout(WAIT, signal_rx.recv()).await.unwrap().unwrap();
        let TrackerSignal::PositionUpdated(update) = updated else {
            panic!("expected position update, got {updated:?}");
        };
        assert!((update.map_pixel.0 - 1000.0).abs() < 1e-6);
        assert!((update.map_pixel.1 - 1000.0).abs() < 1e-6);

        // Shutdown closes the in-flight session.
        stop_tx.send(true).unwrap();
        let ended = timeout(WAIT, signal_rx.recv()).await.unwrap().unwrap();
        assert!(matches!(ended, TrackerSignal::RaidEnded { .. }));
        timeout(WAIT, consumer).await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_consumer_stops_when_producers_drop() {
        let registry = Arc::new(RwLock::new(MapRegistry::default()));
        let (event_tx, event_rx) = mpsc::channel::<TrackerEvent>(4);
        let (signal_tx, _keep) = broadcast::channel(16);
        let (_stop_tx, stop_rx) = watch::channel(false);

        let consumer = tokio::spawn(run_consumer(
            event_rx,
            PositionTracker::new(),
            registry,
            signal_tx,
            stop_rx,
        ));

        drop(event_tx);
        timeout(WAIT, consumer).await.unwrap().unwrap();
    }
}
