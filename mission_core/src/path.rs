//! # Track segment
//!
//! The output of the [`crate::planner`] and the input to the
//! [`crate::nav_exec::NavExecutor`]: an ordered sequence of waypoints. Opaque to
//! everything except the planner that builds it and the executor that hands it to the
//! follower.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use crate::pose::Pose;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// What kind of motion a [`TrackSegment`] represents, used by the row-end-maneuver
/// sequence check (Testable Property 9) and for logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SegmentKind {
    Straight,
    Turn,
}

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// A single waypoint in a [`TrackSegment`]: a pose in the world frame.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Waypoint {
    pub pose: Pose,
}

/// A geometrically spaced sequence of waypoints for the follower to drive along.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackSegment {
    pub kind: SegmentKind,
    pub waypoints: Vec<Waypoint>,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl TrackSegment {
    pub fn new(kind: SegmentKind, waypoints: Vec<Waypoint>) -> Self {
        Self { kind, waypoints }
    }

    pub fn is_empty(&self) -> bool {
        self.waypoints.is_empty()
    }

    pub fn last(&self) -> Option<&Waypoint> {
        self.waypoints.last()
    }
}
