//! # Pose & Transform Kernel
//!
//! SE(3) poses carrying named frames, so that composing two poses whose inner frames
//! don't match is a `Result`, not a silent bug. Every other component in this crate
//! consumes only [`Pose`]; no raw matrix math leaks past this module.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use nalgebra::{Isometry3, Translation3, UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use thiserror::Error;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// A symbolic label on a [`Pose`], such as `"world"`, `"robot"`, `"hole"`, `"tool"`.
pub type Frame = Cow<'static, str>;

/// A rigid SE(3) transform `frame_a_from_b`: translation plus rotation, with the two
/// frame labels carried as metadata so composition can be checked.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Pose {
    pub translation: Vector3<f64>,
    pub rotation: UnitQuaternion<f64>,
    pub frame_a: Frame,
    pub frame_b: Frame,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum PoseError {
    #[error("cannot compose pose {a_from_b:?} with {c_from_d:?}: inner frames don't match")]
    FrameMismatch {
        a_from_b: (Frame, Frame),
        c_from_d: (Frame, Frame),
    },
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Pose {
    /// Build a pose from an explicit translation and rotation.
    pub fn new(
        translation: Vector3<f64>,
        rotation: UnitQuaternion<f64>,
        frame_a: impl Into<Frame>,
        frame_b: impl Into<Frame>,
    ) -> Self {
        Self {
            translation,
            rotation,
            frame_a: frame_a.into(),
            frame_b: frame_b.into(),
        }
    }

    /// Identity pose: `frame_a` and `frame_b` coincide.
    pub fn identity(frame: impl Into<Frame>) -> Self {
        let frame = frame.into();
        Self {
            translation: Vector3::zeros(),
            rotation: UnitQuaternion::identity(),
            frame_a: frame.clone(),
            frame_b: frame,
        }
    }

    /// A pure translation, zero rotation.
    pub fn translation(
        translation: Vector3<f64>,
        frame_a: impl Into<Frame>,
        frame_b: impl Into<Frame>,
    ) -> Self {
        Self::new(translation, UnitQuaternion::identity(), frame_a, frame_b)
    }

    /// A pure rotation about Z by `theta_rad`, zero translation.
    pub fn rz(
        theta_rad: f64,
        frame_a: impl Into<Frame>,
        frame_b: impl Into<Frame>,
    ) -> Self {
        Self::new(
            Vector3::zeros(),
            UnitQuaternion::from_euler_angles(0.0, 0.0, theta_rad),
            frame_a,
            frame_b,
        )
    }

    /// The yaw (rotation about Z) of this pose, in radians.
    pub fn heading(&self) -> f64 {
        self.rotation.euler_angles().2
    }

    /// This pose as an `Isometry3`, discarding the frame labels.
    pub fn as_isometry(&self) -> Isometry3<f64> {
        Isometry3::from_parts(Translation3::from(self.translation), self.rotation)
    }

    /// Compose `self` (`a_from_b`) with `other` (`b_from_c`) to produce `a_from_c`.
    ///
    /// Errors if `self.frame_b != other.frame_a`.
    pub fn compose(&self, other: &Pose) -> Result<Pose, PoseError> {
        if self.frame_b != other.frame_a {
            return Err(PoseError::FrameMismatch {
                a_from_b: (self.frame_a.clone(), self.frame_b.clone()),
                c_from_d: (other.frame_a.clone(), other.frame_b.clone()),
            });
        }

        let composed = self.as_isometry() * other.as_isometry();

        Ok(Pose {
            translation: composed.translation.vector,
            rotation: composed.rotation,
            frame_a: self.frame_a.clone(),
            frame_b: other.frame_b.clone(),
        })
    }

    /// The inverse of this pose: `b_from_a`.
    pub fn inverse(&self) -> Pose {
        let inv = self.as_isometry().inverse();
        Pose {
            translation: inv.translation.vector,
            rotation: inv.rotation,
            frame_a: self.frame_b.clone(),
            frame_b: self.frame_a.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// FUNCTIONS
// ---------------------------------------------------------------------------

/// Convert an ENU vector to NWU: `NWU_X = ENU_Y`, `NWU_Y = -ENU_X`, `NWU_Z = ENU_Z`.
pub fn enu_to_nwu(enu: Vector3<f64>) -> Vector3<f64> {
    Vector3::new(enu.y, -enu.x, enu.z)
}

/// Convert an NWU vector to ENU, the inverse of [`enu_to_nwu`].
pub fn nwu_to_enu(nwu: Vector3<f64>) -> Vector3<f64> {
    Vector3::new(-nwu.y, nwu.x, nwu.z)
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use std::f64::consts::FRAC_PI_2;

    #[test]
    fn compose_matches_matrix_composition() {
        let world_from_robot = Pose::translation(Vector3::new(1.0, 0.0, 0.0), "world", "robot");
        let robot_from_tool = Pose::rz(FRAC_PI_2, "robot", "tool");

        let world_from_tool = world_from_robot.compose(&robot_from_tool).unwrap();

        assert_eq!(world_from_tool.frame_a, Cow::Borrowed("world"));
        assert_eq!(world_from_tool.frame_b, Cow::Borrowed("tool"));
        assert!((world_from_tool.translation - Vector3::new(1.0, 0.0, 0.0)).norm() < 1e-9);
    }

    #[test]
    fn compose_rejects_frame_mismatch() {
        let a = Pose::identity("world");
        let b = Pose::identity("robot");

        assert!(a.compose(&b).is_err());
    }

    #[test]
    fn inverse_swaps_frames() {
        let p = Pose::translation(Vector3::new(2.0, 3.0, 0.0), "world", "robot");
        let inv = p.inverse();

        assert_eq!(inv.frame_a, Cow::Borrowed("robot"));
        assert_eq!(inv.frame_b, Cow::Borrowed("world"));

        let round_trip = p.compose(&inv).unwrap();
        assert!(round_trip.translation.norm() < 1e-9);
    }

    #[test]
    fn enu_nwu_round_trip() {
        let enu = Vector3::new(3.0, -2.0, 5.0);
        let round_trip = nwu_to_enu(enu_to_nwu(enu));

        assert!((round_trip - enu).norm() < 1e-9);
    }

    #[test]
    fn enu_to_nwu_matches_exact_formula() {
        let enu = Vector3::new(10.0, 4.0, 1.0);
        let nwu = enu_to_nwu(enu);

        assert_eq!(nwu.x, enu.y);
        assert_eq!(nwu.y, -enu.x);
        assert_eq!(nwu.z, enu.z);
    }
}
