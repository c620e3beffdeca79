//! Raid-session state machine.
//!
//! The tracker owns the one piece of "current raid" state in the process:
//! an `Option<RaidSession>`. It consumes the merged event stream (log
//! events and screenshot poses), drives the session lifecycle, and emits
//! [`TrackerSignal`]s:
//!
//! - `Idle`: no session. Position samples are dropped.
//! - `RaidPending`: match announced, map not yet known. Samples dropped.
//! - `RaidActive`: map known; samples resolve through the map registry.
//!
//! Malformed or unexpected input never fails the tracker; anomalies are
//! logged and the stream continues.

use chrono::NaiveDateTime;
use serde::Serialize;

use crate::events::{PositionUpdate, TrackerSignal};
use crate::game_log::LogEvent;
use crate::map::MapRegistry;
use crate::screenshot::RawPosition;

/// One raid, bounded by match-created and match-ended log events.
#[derive(Debug, Clone, Serialize)]
pub struct RaidSession {
    /// Process-local monotonic id.
    pub session_id: u64,
    /// Six-character raid id from the match announcement, when present.
    pub short_id: Option<String>,
    pub map_id: Option<String>,
    pub server_address: Option<String>,
    pub online: bool,
    /// Matchmaking queue duration, seconds.
    pub queue_secs: Option<f64>,
    pub created_at: NaiveDateTime,
    /// When the raid itself began (match-started), not when it was created.
    pub started_at: Option<NaiveDateTime>,
    pub ended_at: Option<NaiveDateTime>,
}

/// Observable tracker state, mostly for tests and status display.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackerState {
    Idle,
    RaidPending,
    RaidActive,
}

/// Input to the tracker: events from both watchers, merged by arrival time.
#[derive(Debug, Clone)]
pub enum TrackerEvent {
    Log(LogEvent),
    Screenshot(RawPosition),
}

#[derive(Debug, Default)]
pub struct PositionTracker {
    session: Option<RaidSession>,
    /// Map seen loading before any match was announced. The game loads the
    /// scene bundle first, so this is the common path for online raids.
    map_hint: Option<String>,
    next_session_id: u64,
}

impl PositionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> TrackerState {
        match &self.session {
            None => TrackerState::Idle,
            Some(s) if s.map_id.is_some() => TrackerState::RaidActive,
            Some(_) => TrackerState::RaidPending,
        }
    }

    pub fn session(&self) -> Option<&RaidSession> {
        self.session.as_ref()
    }

    /// Advance the state machine with one event.
    ///
    /// The registry is borrowed only for screenshot resolution; lifecycle
    /// events never touch it.
    pub fn handle_event(
        &mut self,
        event: TrackerEvent,
        registry: &mut MapRegistry,
    ) -> Vec<TrackerSignal> {
        match event {
            TrackerEvent::Log(log_event) => self.handle_log(log_event),
            TrackerEvent::Screenshot(raw) => self.handle_screenshot(raw, registry),
        }
    }

    /// Force-close any active session, e.g. on shutdown.
    pub fn close_session(&mut self) -> Vec<TrackerSignal> {
        self.map_hint = None;
        match self.session.take() {
            Some(mut session) => {
                session.ended_at = Some(now());
                tracing::info!(session_id = session.session_id, "raid session closed");
                vec![TrackerSignal::RaidEnded {
                    session_id: session.session_id,
                }]
            }
            None => Vec::new(),
        }
    }

    fn handle_log(&mut self, event: LogEvent) -> Vec<TrackerSignal> {
        let mut signals = Vec::new();

        match event {
            LogEvent::MapLoaded { map_id } => {
                match &mut self.session {
                    Some(session) => {
                        if session.map_id.as_deref() != Some(map_id.as_str()) {
                            tracing::info!(
                                session_id = session.session_id,
                                %map_id,
                                "map resolved for session"
                            );
                            session.map_id = Some(map_id.clone());
                            signals.push(TrackerSignal::MapResolved {
                                session_id: session.session_id,
                                map_id,
                            });
                        }
                    }
                    None => {
                        // Scene loads before the match is announced; hold the
                        // map until the next match-created.
                        tracing::debug!(%map_id, "map loaded with no active session, holding as hint");
                        self.map_hint = Some(map_id);
                    }
                }
            }

            LogEvent::MatchCreated {
                location,
                short_id,
                online,
            } => {
                if let Some(prev) = self.session.take() {
                    // Missed end-event; recover by force-closing.
                    tracing::warn!(
                        stale_session = prev.session_id,
                        "match created while a session was active, closing previous"
                    );
                    signals.push(TrackerSignal::RaidEnded {
                        session_id: prev.session_id,
                    });
                }

                let map_id = location.or_else(|| self.map_hint.take());
                let session_id = self.next_session_id;
                self.next_session_id += 1;

                tracing::info!(session_id, map_id = ?map_id, online, "raid session opened");
                self.session = Some(RaidSession {
                    session_id,
                    short_id,
                    map_id: map_id.clone(),
                    server_address: None,
                    online,
                    queue_secs: None,
                    created_at: now(),
                    started_at: None,
                    ended_at: None,
                });
                signals.push(TrackerSignal::RaidStarted { session_id, map_id });
            }

            LogEvent::MatchingCompleted { queue_secs } => {
                if let Some(session) = &mut self.session {
                    session.queue_secs = Some(queue_secs);
                }
            }

            LogEvent::MatchStarted => {
                if let Some(session) = &mut self.session {
                    session.started_at = Some(now());
                } else {
                    tracing::debug!("match started with no session, ignoring");
                }
            }

            LogEvent::MatchEnded => {
                self.map_hint = None;
                match self.session.take() {
                    Some(mut session) => {
                        session.ended_at = Some(now());
                        tracing::info!(session_id = session.session_id, "raid session ended");
                        signals.push(TrackerSignal::RaidEnded {
                            session_id: session.session_id,
                        });
                    }
                    None => tracing::debug!("match ended with no session, ignoring"),
                }
            }

            LogEvent::ServerAddress { address } => {
                if let Some(session) = &mut self.session
                    && session.server_address.is_none()
                {
                    tracing::debug!(session_id = session.session_id, %address, "raid server address");
                    session.server_address = Some(address);
                }
            }
        }

        signals
    }

    fn handle_screenshot(
        &mut self,
        raw: RawPosition,
        registry: &mut MapRegistry,
    ) -> Vec<TrackerSignal> {
        let Some(session) = &self.session else {
            tracing::trace!("position sample outside a raid, dropped");
            return Vec::new();
        };
        let Some(map_id) = session.map_id.clone() else {
            // Deliberately dropped rather than queued: replaying stale
            // samples after the map resolves would show old positions.
            tracing::trace!(
                session_id = session.session_id,
                "position sample before map known, dropped"
            );
            return Vec::new();
        };

        match registry.resolve(&map_id, raw.position.y) {
            Some(resolved) => {
                let map_pixel = resolved.transform.apply(raw.position.x, raw.position.z);
                vec![TrackerSignal::PositionUpdated(PositionUpdate {
                    game_position: raw.position,
                    yaw_rad: raw.rotation.yaw_radians(),
                    map_id,
                    layer_id: resolved.layer_id,
                    map_pixel,
                })]
            }
            None => {
                // Expected steady state for uncalibrated floors.
                tracing::trace!(%map_id, height = raw.position.y, "no calibrated floor, sample dropped");
                Vec::new()
            }
        }
    }
}

fn now() -> NaiveDateTime {
    chrono::Local::now().naive_local()
}
