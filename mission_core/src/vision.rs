//! # Vision Gate
//!
//! Optional hole-refinement and tool-alignment verification, grounded on
//! `original_source/amiga_platform/vision/vision_system.py`'s `detect_hole_forward`
//! and alignment-check shape, reduced to the interface-only contract spec.md §4.6
//! specifies: stereo depth and YOLO inference are external collaborators, out of
//! scope here.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use crate::pose::Pose;
use std::time::Duration;

// ---------------------------------------------------------------------------
// TRAITS
// ---------------------------------------------------------------------------

/// Consumed by the orchestrator between the approach segment and the final segment of
/// a hole cycle. Treated as optional: when absent (or when [`NoVision`] is used as a
/// stand-in), the orchestrator skips detection and alignment verification without
/// error, falling back to the planned hole pose (spec.md §4.6).
pub trait VisionGate: Send {
    /// Search for the hole around `search_center` within `search_radius`, blocking up
    /// to `timeout`. `Ok(None)` means "not found" — not an error, a domain event that
    /// tells the caller to fall back to the planned pose.
    fn detect_hole(
        &mut self,
        search_center: Pose,
        search_radius: f64,
        timeout: Duration,
    ) -> Result<Option<Pose>, VisionError>;

    /// Verify the tool is aligned with the target hole to within `tolerance` (metres).
    fn verify_alignment(&mut self, tolerance: f64) -> Result<bool, VisionError>;
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum VisionError {
    #[error("vision detection timed out")]
    Timeout,

    #[error("vision system unavailable: {0}")]
    Unavailable(String),
}

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// No-op stand-in used when vision is disabled by configuration. Always reports "not
/// found" and "aligned", which is exactly the behaviour the orchestrator wants when
/// there is no vision system to consult: fall back to the planned pose, proceed.
pub struct NoVision;

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl VisionGate for NoVision {
    fn detect_hole(
        &mut self,
        _search_center: Pose,
        _search_radius: f64,
        _timeout: Duration,
    ) -> Result<Option<Pose>, VisionError> {
        Ok(None)
    }

    fn verify_alignment(&mut self, _tolerance: f64) -> Result<bool, VisionError> {
        Ok(true)
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use nalgebra::{UnitQuaternion, Vector3};

    #[test]
    fn no_vision_always_reports_not_found_and_aligned() {
        let mut vision = NoVision;
        let pose = Pose::new(Vector3::zeros(), UnitQuaternion::identity(), "world", "hole");

        assert!(vision
            .detect_hole(pose, 1.0, Duration::from_millis(10))
            .unwrap()
            .is_none());
        assert!(vision.verify_alignment(0.05).unwrap());
    }
}
