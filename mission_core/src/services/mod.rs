//! # External service seams
//!
//! The mission core depends only on these traits (spec.md §9's "duck-typed service
//! clients, modeled as interfaces"); concrete transports are injected by the
//! orchestrator at startup. `zmq` is the only concrete transport shipped here, gated
//! behind the `zmq-transport` feature and grounded on the teacher's
//! `mech_client`/`perloc_client` request-reply pattern over `comms_if::net`. An
//! in-memory mock transport lives in [`mock`], grounded on the teacher's
//! `sim_client.rs` — a fake service used for development/testing of the same shape.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

pub mod mock;

#[cfg(feature = "zmq-transport")]
pub mod zmq_transport;

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use comms_if::wire::{CanMessage, ControlToolsCmd, FilterStateMsg, FollowerAck, FollowerState, SetTrackRequest, Twist2d};
use thiserror::Error;

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Transport-level failure from any of the external services. Per spec.md §7,
/// `ServiceUnavailable`/`Timeout` is never surfaced past the state machine: callers
/// convert this into a domain event (track failure, non-convergence, vision not
/// found) rather than propagating it.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("request to {service} timed out")]
    Timeout { service: &'static str },

    #[error("{service} is unavailable: {reason}")]
    Unavailable { service: &'static str, reason: String },
}

// ---------------------------------------------------------------------------
// TRAITS
// ---------------------------------------------------------------------------

/// The localisation filter: read-only from the core's perspective (spec.md §5).
pub trait FilterService: Send {
    /// Fetch the latest filter state, blocking up to the service's configured timeout.
    fn get_state(&mut self) -> Result<FilterStateMsg, ServiceError>;
}

/// The track follower: a single-writer-of-state service that only the
/// [`crate::nav_exec::NavExecutor`] talks to.
pub trait FollowerService: Send {
    fn set_track(&mut self, request: SetTrackRequest) -> Result<FollowerAck, ServiceError>;

    fn start(&mut self) -> Result<(), ServiceError>;

    fn cancel(&mut self) -> Result<(), ServiceError>;

    /// Block until the next state message, or the service's own receive timeout
    /// elapses (in which case `Ok(None)` is returned so the caller can re-poll a
    /// shutdown flag rather than blocking forever).
    fn recv_state(&mut self) -> Result<Option<FollowerState>, ServiceError>;
}

/// The CAN bus: a shared, serialized writer — only one command in flight at a time.
pub trait CanBus: Send {
    fn send_twist(&mut self, twist: Twist2d) -> Result<(), ServiceError>;

    fn send_can(&mut self, message: CanMessage) -> Result<(), ServiceError>;

    fn control_tools(&mut self, command: ControlToolsCmd) -> Result<(), ServiceError>;
}

/// A camera stream, consumed by concrete [`crate::vision::VisionGate`] implementations.
/// Out of scope beyond this interface: stereo depth math and YOLO inference are
/// external collaborators.
pub trait Camera: Send {
    fn recv_frame(&mut self) -> Result<Vec<u8>, ServiceError>;
}
