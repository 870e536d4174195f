//! # Navigation Executor
//!
//! Drives a single [`crate::path::TrackSegment`] to completion (or failure/cancellation)
//! through a [`crate::services::FollowerService`], grounded on
//! `navigation_manager.py`'s `NavigationManager`. The Python original latches on two
//! `asyncio.Event`s (`track_complete`/`track_failed`) set by an async state-update
//! callback; this crate has no async runtime, so the same "callback sets a latch the
//! waiter blocks on" idiom is expressed as a background poller thread forwarding
//! terminal events down an `mpsc` channel that `execute` blocks on with a timeout.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use crate::path::TrackSegment;
use crate::services::{FollowerService, ServiceError};
use comms_if::wire::{FollowerTerminalStatus, SetTrackRequest};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use thiserror::Error;

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum NavExecError {
    #[error("follower service error: {0}")]
    Service(#[from] ServiceError),

    #[error("follower rejected the track: {reason}")]
    Rejected { reason: String },

    #[error("track did not complete within {0:?}")]
    Timeout(Duration),

    #[error("track was cancelled")]
    Cancelled,

    #[error("follower reported failure")]
    Failed,
}

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Drives one segment at a time through a [`FollowerService`]. Owns a background
/// monitor thread for the lifetime of the executor, so it is built once by the
/// orchestrator and reused across segments.
pub struct NavExecutor {
    follower: Arc<Mutex<Box<dyn FollowerService>>>,
    monitor: Option<JoinHandle<()>>,
    shutdown: Arc<Mutex<bool>>,
    events_rx: mpsc::Receiver<TerminalEvent>,
    /// Serializes `execute`/`cancel` so only one track is ever in flight, mirroring
    /// the Python original's single `current_track` invariant.
    in_flight: Mutex<()>,
    max_speed: f64,
    track_load_wait: Duration,
}

#[derive(Debug, Clone, Copy)]
struct TerminalEvent {
    status: FollowerTerminalStatus,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl NavExecutor {
    /// Spawn the background monitor thread and wrap `follower` for shared access. The
    /// monitor thread lives until `shutdown` is called or the executor is dropped.
    ///
    /// `track_load_wait` defaults to 1 second (matching
    /// `navigation_manager.py::execute_track`'s post-start settle sleep); use
    /// [`NavExecutor::with_track_load_wait`] to override it from configuration.
    pub fn spawn_monitor(follower: Box<dyn FollowerService>, max_speed: f64) -> Self {
        Self::spawn_monitor_with_wait(follower, max_speed, Duration::from_secs(1))
    }

    /// As [`NavExecutor::spawn_monitor`], but with an explicit track-load settle wait
    /// (spec.md §6's configurable "track-load wait").
    pub fn spawn_monitor_with_wait(
        follower: Box<dyn FollowerService>,
        max_speed: f64,
        track_load_wait: Duration,
    ) -> Self {
        let follower = Arc::new(Mutex::new(follower));
        let shutdown = Arc::new(Mutex::new(false));
        let (tx, rx) = mpsc::channel();

        let monitor_follower = follower.clone();
        let monitor_shutdown = shutdown.clone();
        let handle = std::thread::spawn(move || {
            loop {
                if *monitor_shutdown.lock().unwrap() {
                    return;
                }

                let state = {
                    let mut follower = monitor_follower.lock().unwrap();
                    follower.recv_state()
                };

                match state {
                    Ok(Some(state)) => {
                        if let Some(status) = state.terminal_status {
                            log::info!("follower reported terminal status {:?}", status);
                            if tx.send(TerminalEvent { status }).is_err() {
                                return;
                            }
                        }
                    }
                    Ok(None) => {}
                    Err(e) => {
                        log::warn!("error polling follower state: {}", e);
                    }
                }
            }
        });

        Self {
            follower,
            monitor: Some(handle),
            shutdown,
            events_rx: rx,
            in_flight: Mutex::new(()),
            max_speed,
            track_load_wait,
        }
    }

    /// Hand `segment` to the follower and block until it reports a terminal status or
    /// `timeout` elapses. Settles for 1 second after acceptance before returning, per
    /// `navigation_manager.py::execute_track`'s post-start settle sleep.
    pub fn execute(&self, segment: &TrackSegment, timeout: Duration) -> Result<(), NavExecError> {
        let _guard = self.in_flight.lock().unwrap();

        // Clear any terminal event the monitor forwarded after a prior `execute`
        // already gave up on it (late Complete/Cancelled from a timed-out or
        // cancelled track), mirroring `navigation_manager.py::execute_track`'s
        // `track_complete.clear()`/`track_failed.clear()` before starting.
        while self.events_rx.try_recv().is_ok() {}

        if segment.is_empty() {
            log::warn!("executing an empty track segment, nothing to do");
            return Ok(());
        }

        let waypoints = segment
            .waypoints
            .iter()
            .map(|w| {
                let t = w.pose.translation;
                [t.x, t.y, t.z]
            })
            .collect();

        let request = SetTrackRequest {
            waypoints,
            max_speed: self.max_speed,
        };

        {
            let mut follower = self.follower.lock().unwrap();
            let ack = follower.set_track(request)?;
            if let comms_if::wire::FollowerAck::Rejected { reason } = ack {
                return Err(NavExecError::Rejected { reason });
            }
            follower.start()?;
        }

        std::thread::sleep(self.track_load_wait);

        let deadline = Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                self.cancel()?;
                return Err(NavExecError::Timeout(timeout));
            }

            match self.events_rx.recv_timeout(remaining) {
                Ok(event) => {
                    return match event.status {
                        FollowerTerminalStatus::Complete => Ok(()),
                        FollowerTerminalStatus::Cancelled => Err(NavExecError::Cancelled),
                        FollowerTerminalStatus::Failed | FollowerTerminalStatus::Aborted => {
                            Err(NavExecError::Failed)
                        }
                    };
                }
                Err(RecvTimeoutError::Timeout) => {
                    self.cancel()?;
                    return Err(NavExecError::Timeout(timeout));
                }
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(NavExecError::Failed);
                }
            }
        }
    }

    /// Request the follower abandon the current track. Swallows transport errors on
    /// cancellation itself (nothing useful to do with them at this point) but still
    /// surfaces them to the caller so logging can happen at the call site.
    pub fn cancel(&self) -> Result<(), NavExecError> {
        let mut follower = self.follower.lock().unwrap();
        follower.cancel()?;
        Ok(())
    }

    /// Signal the monitor thread to exit and join it. Idempotent.
    pub fn shutdown(&mut self) {
        *self.shutdown.lock().unwrap() = true;
        if let Some(handle) = self.monitor.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for NavExecutor {
    fn drop(&mut self) {
        self.shutdown();
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use crate::path::{SegmentKind, Waypoint};
    use crate::pose::Pose;
    use crate::services::mock::MockFollowerService;
    use chrono::Utc;
    use comms_if::wire::FollowerState;
    use nalgebra::{UnitQuaternion, Vector3};

    fn segment() -> TrackSegment {
        TrackSegment::new(
            SegmentKind::Straight,
            vec![Waypoint {
                pose: Pose::new(
                    Vector3::new(1.0, 0.0, 0.0),
                    UnitQuaternion::identity(),
                    "world",
                    "robot",
                ),
            }],
        )
    }

    #[test]
    fn execute_returns_ok_on_complete_status() {
        let (follower, handle) = MockFollowerService::new();
        handle.push_state(FollowerState {
            timestamp: Utc::now(),
            current_waypoint: 1,
            cross_track_error: 0.0,
            terminal_status: Some(FollowerTerminalStatus::Complete),
        });

        let mut executor = NavExecutor::spawn_monitor(Box::new(follower), 1.0);
        let result = executor.execute(&segment(), Duration::from_secs(2));
        assert!(result.is_ok());
        executor.shutdown();
    }

    #[test]
    fn execute_returns_failed_on_failed_status() {
        let (follower, handle) = MockFollowerService::new();
        handle.push_state(FollowerState {
            timestamp: Utc::now(),
            current_waypoint: 0,
            cross_track_error: 5.0,
            terminal_status: Some(FollowerTerminalStatus::Failed),
        });

        let mut executor = NavExecutor::spawn_monitor(Box::new(follower), 1.0);
        let result = executor.execute(&segment(), Duration::from_secs(2));
        assert!(matches!(result, Err(NavExecError::Failed)));
        executor.shutdown();
    }

    #[test]
    fn execute_times_out_and_cancels_when_no_terminal_status_arrives() {
        let (follower, handle) = MockFollowerService::new();
        let mut executor = NavExecutor::spawn_monitor(Box::new(follower), 1.0);

        let result = executor.execute(&segment(), Duration::from_millis(100));
        assert!(matches!(result, Err(NavExecError::Timeout(_))));
        assert_eq!(handle.cancel_call_count(), 1);
        executor.shutdown();
    }

    /// Regression: a terminal event forwarded by the monitor *after* a prior `execute`
    /// already timed out must not be silently consumed by the next `execute` call.
    #[test]
    fn stale_terminal_event_from_a_prior_timeout_does_not_leak_into_the_next_execute() {
        let (follower, handle) = MockFollowerService::new();
        let mut executor = NavExecutor::spawn_monitor(Box::new(follower), 1.0);

        // First execute times out with no terminal status ever reported.
        let first = executor.execute(&segment(), Duration::from_millis(100));
        assert!(matches!(first, Err(NavExecError::Timeout(_))));

        // A terminal status arrives late, after the first execute already gave up.
        // Give the background monitor time to pick it up and forward it down the
        // channel before the next execute() call.
        handle.push_state(FollowerState {
            timestamp: Utc::now(),
            current_waypoint: 1,
            cross_track_error: 0.0,
            terminal_status: Some(FollowerTerminalStatus::Complete),
        });
        std::thread::sleep(Duration::from_millis(50));

        // The next execute must not see the stale Complete event; with nothing new
        // queued it should time out on its own terms.
        let second = executor.execute(&segment(), Duration::from_millis(100));
        assert!(matches!(second, Err(NavExecError::Timeout(_))));

        executor.shutdown();
    }

    #[test]
    fn empty_segment_is_a_no_op() {
        let (follower, _handle) = MockFollowerService::new();
        let mut executor = NavExecutor::spawn_monitor(Box::new(follower), 1.0);
        let empty = TrackSegment::new(SegmentKind::Straight, vec![]);
        assert!(executor.execute(&empty, Duration::from_secs(1)).is_ok());
        executor.shutdown();
    }
}
