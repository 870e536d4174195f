//! # Wire protocol
//!
//! Message payloads exchanged between the mission core and its external services: the
//! state estimation filter, the path follower, the CAN gateway and the tool modules.
//!
//! These are plain serde structures sent as JSON bodies over the request-reply sockets
//! provided by [`crate::net`].

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use chrono::{DateTime, Utc, serde::ts_milliseconds};
use serde::{Serialize, Deserialize};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// State estimate published by the localisation filter.
#[derive(Debug, Serialize, Deserialize, Clone, Copy)]
pub struct FilterStateMsg {
    #[serde(with = "ts_milliseconds")]
    pub timestamp: DateTime<Utc>,

    /// Position in the filter's local ENU frame, metres.
    pub position_enu: [f64; 3],

    /// Orientation as a unit quaternion (x, y, z, w), in the filter's local ENU frame.
    pub orientation_enu: [f64; 4],

    /// Trace of the position covariance block, m^2. Used as the convergence metric.
    pub position_covariance_trace: f64,

    /// True once the filter reports it has converged on a fix.
    pub converged: bool,
}

/// A 2D body-frame velocity command, as sent to the path follower's wiggle override and
/// by the follower itself to the drive equipment.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, Default)]
pub struct Twist2d {
    /// Forward linear velocity, m/s.
    pub linear: f64,

    /// Yaw angular velocity, rad/s.
    pub angular: f64,
}

/// Request to the path follower asking it to track a new path.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SetTrackRequest {
    /// Waypoints of the track to follow, in the navigation frame, as (x, y, heading_rad) triples.
    pub waypoints: Vec<[f64; 3]>,

    /// Maximum linear speed to use while tracking, m/s.
    pub max_speed: f64,
}

/// Reply to a [`SetTrackRequest`] or a cancel request.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub enum FollowerAck {
    Accepted,
    Rejected { reason: String },
}

/// Unsolicited state published periodically by the follower while a track is active.
#[derive(Debug, Serialize, Deserialize, Clone, Copy)]
pub struct FollowerState {
    #[serde(with = "ts_milliseconds")]
    pub timestamp: DateTime<Utc>,

    /// Index of the waypoint currently being tracked towards.
    pub current_waypoint: usize,

    /// Cross-track error, metres.
    pub cross_track_error: f64,

    /// Terminal status of the current track, if it has ended.
    pub terminal_status: Option<FollowerTerminalStatus>,
}

/// Terminal outcomes reported by the follower when a track finishes.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum FollowerTerminalStatus {
    Complete,
    Failed,
    Aborted,
    Cancelled,
}

/// A raw CAN frame exchanged with the CAN gateway service.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct CanMessage {
    pub arbitration_id: u32,
    pub data: Vec<u8>,
}

/// Command sent to a tool module's control equipment (drill, auger, etc).
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ControlToolsCmd {
    /// Name of the module the command targets, as registered in the module registry.
    pub module_name: String,

    /// Opaque, module-specific command payload, forwarded verbatim to the equipment.
    pub payload: serde_json::Value,
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn filter_state_msg_round_trips_through_json() {
        let msg = FilterStateMsg {
            timestamp: Utc::now(),
            position_enu: [1.0, 2.0, 3.0],
            orientation_enu: [0.0, 0.0, 0.0, 1.0],
            position_covariance_trace: 0.05,
            converged: true,
        };

        let json = serde_json::to_string(&msg).unwrap();
        let back: FilterStateMsg = serde_json::from_str(&json).unwrap();

        assert_eq!(back.position_enu, msg.position_enu);
        assert_eq!(back.converged, msg.converged);
    }

    #[test]
    fn follower_terminal_status_distinguishes_outcomes() {
        assert_ne!(FollowerTerminalStatus::Complete, FollowerTerminalStatus::Failed);
        assert_eq!(FollowerTerminalStatus::Cancelled, FollowerTerminalStatus::Cancelled);
    }
}
