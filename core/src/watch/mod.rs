//! Filesystem watchers and the tracking pipeline.
//!
//! Two independent sources feed one bounded queue: the screenshot
//! directory watcher and the log tail follower. A single consumer task
//! drives the [`PositionTracker`](crate::tracker::PositionTracker) and
//! publishes signals on a broadcast channel. Watchers never block and
//! never render; rendering is a downstream subscriber.

mod directory;
mod pipeline;
mod tail;

pub use directory::ScreenshotWatcher;
pub use pipeline::{Pipeline, PipelineError};
pub use tail::follow_log;
