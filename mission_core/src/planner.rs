//! # Path Planner
//!
//! Pure geometric interpolation of track segments — no cost map, no A*. This is a
//! deliberate departure from the teacher repository's `auto::nav::path_planner`
//! (which computes feasibility-checked Ackermann paths over a grid map): spec.md's
//! Non-goals explicitly exclude a dynamically-feasible planner, so only the teacher's
//! error-enum and parameter-struct idiom is carried over, not its A* machinery.
//!
//! Grounded on `amiga_platform/navigation/coordinate_transforms.py`'s
//! `transform_holes_to_robot_targets` for the tool-offset composition, and on
//! `main.py`'s `_execute_row_end_maneuver`/`path_planner.plan_row_end_maneuver` for the
//! four-phase U-turn sequencing.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use crate::path::{SegmentKind, TrackSegment, Waypoint};
use crate::pose::{Pose, PoseError};
use nalgebra::{UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Direction of the row-end U-turn, taken from mission configuration.
///
/// Authoritative over any CSV-inferred approach heading at the row-end waypoint (see
/// `DESIGN.md`'s Open Question decision on `turn_direction`).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub enum TurnDirection {
    Left,
    Right,
}

impl TurnDirection {
    fn sign(self) -> f64 {
        match self {
            TurnDirection::Left => 1.0,
            TurnDirection::Right => -1.0,
        }
    }
}

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Tuning parameters for [`PathPlanner`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlannerConfig {
    /// Spacing between interpolated waypoints along a straight segment, metres.
    pub waypoint_spacing_m: f64,

    /// Distance driven straight into the headland buffer before turning, metres.
    pub headland_buffer_m: f64,

    /// Sideways distance driven between the row-end's two turns, metres.
    pub row_spacing_m: f64,

    /// Magnitude of each of the row-end maneuver's two in-place turns, radians.
    pub turn_angle_rad: f64,

    /// Direction of the row-end U-turn.
    pub turn_direction: TurnDirection,
}

/// Builds geometric [`TrackSegment`]s: point-to-point travel, vision-stabilising
/// approach segments, and the four-phase row-end U-turn.
pub struct PathPlanner {
    config: PlannerConfig,
    robot_from_tool: Pose,

    /// 0 when idle, 1..=4 mid-maneuver; advanced by [`PathPlanner::plan_row_end_maneuver`].
    row_end_phase: u8,

    /// The maneuver's running end pose, chained across phases 2-4.
    row_end_pose: Option<Pose>,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl PathPlanner {
    pub fn new(robot_from_tool: Pose, config: PlannerConfig) -> Self {
        Self {
            config,
            robot_from_tool,
            row_end_phase: 0,
            row_end_pose: None,
        }
    }

    /// Straight-line interpolated waypoints from `start` to `goal`, preceded by an
    /// in-place turn so the robot faces `goal` before translating.
    pub fn plan_segment(&self, start: Pose, goal: Pose) -> TrackSegment {
        let heading = heading_towards(start.translation, goal.translation);

        let turn_waypoint = Waypoint {
            pose: with_heading(start, heading),
        };

        let mut waypoints = vec![turn_waypoint];
        waypoints.extend(interpolate(
            start.translation,
            goal.translation,
            heading,
            self.config.waypoint_spacing_m,
            &start.frame_a,
            &start.frame_b,
        ));

        TrackSegment::new(SegmentKind::Straight, waypoints)
    }

    /// A segment ending `offset_m` short of `goal` along the current→goal line, with
    /// heading held at `current`'s heading so vision has a stable approach frame.
    ///
    /// Falls back to [`PathPlanner::plan_segment`] (direct to `goal`) when the current
    /// distance to `goal` is at or below `offset_m`, or when the offset would place the
    /// approach point behind the robot.
    pub fn plan_approach_segment(&self, current: Pose, goal: Pose, offset_m: f64) -> TrackSegment {
        let delta = goal.translation - current.translation;
        let distance = delta.norm();

        if distance <= offset_m {
            log::warn!(
                "approach offset {:.3}m >= distance {:.3}m to goal, planning direct segment",
                offset_m,
                distance
            );
            return self.plan_segment(current, goal);
        }

        let scale = (distance - offset_m) / distance;
        if scale < 0.0 {
            log::warn!("approach point would fall behind the robot, planning direct segment");
            return self.plan_segment(current, goal);
        }

        let approach_position = current.translation + delta * scale;
        let heading = current.heading();

        let mut waypoints = vec![Waypoint { pose: current }];
        waypoints.extend(interpolate(
            current.translation,
            approach_position,
            heading,
            self.config.waypoint_spacing_m,
            &current.frame_a,
            &current.frame_b,
        ));

        TrackSegment::new(SegmentKind::Straight, waypoints)
    }

    /// Advance the row-end U-turn by one phase: (1) straight into the headland buffer,
    /// (2) in-place turn, (3) straight by the row spacing, (4) second in-place turn.
    /// Returns `None` once phase 4 has been returned, and resets the phase counter.
    pub fn plan_row_end_maneuver(&mut self, current: Pose) -> Option<TrackSegment> {
        let phase = self.row_end_phase + 1;
        if phase > 4 {
            self.row_end_phase = 0;
            self.row_end_pose = None;
            return None;
        }

        let pose = if phase == 1 {
            current
        } else {
            self.row_end_pose.unwrap_or(current)
        };

        let (segment, next_pose) = match phase {
            1 => {
                let end = translate_forward(pose, self.config.headland_buffer_m);
                let mut waypoints = vec![Waypoint { pose }];
                waypoints.extend(interpolate(
                    pose.translation,
                    end.translation,
                    pose.heading(),
                    self.config.waypoint_spacing_m,
                    &pose.frame_a,
                    &pose.frame_b,
                ));
                (TrackSegment::new(SegmentKind::Straight, waypoints), end)
            }
            2 => {
                let end = rotate_in_place(pose, self.config.turn_direction.sign() * self.config.turn_angle_rad);
                (TrackSegment::new(SegmentKind::Turn, vec![Waypoint { pose: end }]), end)
            }
            3 => {
                let end = translate_forward(pose, self.config.row_spacing_m);
                let mut waypoints = vec![Waypoint { pose }];
                waypoints.extend(interpolate(
                    pose.translation,
                    end.translation,
                    pose.heading(),
                    self.config.waypoint_spacing_m,
                    &pose.frame_a,
                    &pose.frame_b,
                ));
                (TrackSegment::new(SegmentKind::Straight, waypoints), end)
            }
            4 => {
                let end = rotate_in_place(pose, self.config.turn_direction.sign() * self.config.turn_angle_rad);
                (TrackSegment::new(SegmentKind::Turn, vec![Waypoint { pose: end }]), end)
            }
            _ => unreachable!("phase is bounded to 1..=4 above"),
        };

        self.row_end_phase = phase;
        self.row_end_pose = Some(next_pose);
        Some(segment)
    }

    /// The robot navigation target for a hole pose: composes `world_from_hole` with
    /// the inverse of `robot_from_tool`, so that when the robot reaches the returned
    /// pose the tool frame coincides with the hole.
    pub fn hole_to_robot_target(&self, world_from_hole: Pose) -> Result<Pose, PoseError> {
        let tool_from_robot = self.robot_from_tool.inverse();

        // At the target pose the tool frame coincides with the hole frame, so the
        // inverse offset is reinterpreted as hole_from_robot.
        let hole_from_robot = Pose::new(
            tool_from_robot.translation,
            tool_from_robot.rotation,
            "hole",
            "robot",
        );

        world_from_hole.compose(&hole_from_robot)
    }
}

// ---------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ---------------------------------------------------------------------------

fn heading_towards(from: Vector3<f64>, to: Vector3<f64>) -> f64 {
    let delta = to - from;
    delta.y.atan2(delta.x)
}

fn with_heading(pose: Pose, heading_rad: f64) -> Pose {
    Pose::new(
        pose.translation,
        UnitQuaternion::from_euler_angles(0.0, 0.0, heading_rad),
        pose.frame_a,
        pose.frame_b,
    )
}

fn translate_forward(pose: Pose, distance_m: f64) -> Pose {
    let heading = pose.heading();
    let direction = Vector3::new(heading.cos(), heading.sin(), 0.0);
    Pose::new(
        pose.translation + direction * distance_m,
        pose.rotation,
        pose.frame_a,
        pose.frame_b,
    )
}

fn rotate_in_place(pose: Pose, delta_heading_rad: f64) -> Pose {
    with_heading(pose, pose.heading() + delta_heading_rad)
}

/// Interpolate waypoints strictly after `start`, up to and including `end`, at
/// `spacing` intervals, all sharing `heading`.
fn interpolate(
    start: Vector3<f64>,
    end: Vector3<f64>,
    heading: f64,
    spacing: f64,
    frame_a: &crate::pose::Frame,
    frame_b: &crate::pose::Frame,
) -> Vec<Waypoint> {
    let delta = end - start;
    let distance = delta.norm();

    if distance < 1e-9 {
        return vec![Waypoint {
            pose: Pose::new(
                end,
                UnitQuaternion::from_euler_angles(0.0, 0.0, heading),
                frame_a.clone(),
                frame_b.clone(),
            ),
        }];
    }

    let direction = delta / distance;
    let num_points = (distance / spacing).ceil() as usize;

    (1..=num_points)
        .map(|i| {
            let d = (i as f64 * spacing).min(distance);
            Waypoint {
                pose: Pose::new(
                    start + direction * d,
                    UnitQuaternion::from_euler_angles(0.0, 0.0, heading),
                    frame_a.clone(),
                    frame_b.clone(),
                ),
            }
        })
        .collect()
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    fn config() -> PlannerConfig {
        PlannerConfig {
            waypoint_spacing_m: 0.5,
            headland_buffer_m: 2.0,
            row_spacing_m: 6.0,
            turn_angle_rad: std::f64::consts::FRAC_PI_2,
            turn_direction: TurnDirection::Left,
        }
    }

    fn planner() -> PathPlanner {
        PathPlanner::new(Pose::identity("robot"), config())
    }

    #[test]
    fn approach_segment_ends_offset_short_of_goal() {
        let planner = planner();
        let current = Pose::identity("world");
        let goal = Pose::translation(Vector3::new(5.0, 0.0, 0.0), "world", "hole");

        let segment = planner.plan_approach_segment(current, goal, 1.2);
        let last = segment.last().unwrap();

        assert!((last.pose.translation - Vector3::new(3.8, 0.0, 0.0)).norm() < 1e-3);
        assert_eq!(last.pose.heading(), 0.0);
    }

    #[test]
    fn approach_segment_falls_back_to_direct_when_within_offset() {
        let planner = planner();
        let current = Pose::identity("world");
        let goal = Pose::translation(Vector3::new(1.0, 0.0, 0.0), "world", "hole");

        let segment = planner.plan_approach_segment(current, goal, 1.2);
        let last = segment.last().unwrap();

        assert!((last.pose.translation - goal.translation).norm() < 1e-6);
    }

    #[test]
    fn row_end_sequence_is_straight_turn_straight_turn_then_none() {
        let mut planner = planner();
        let current = Pose::identity("world");

        let kinds: Vec<SegmentKind> = (0..4)
            .map(|_| planner.plan_row_end_maneuver(current).unwrap().kind)
            .collect();

        assert_eq!(
            kinds,
            vec![
                SegmentKind::Straight,
                SegmentKind::Turn,
                SegmentKind::Straight,
                SegmentKind::Turn
            ]
        );

        assert!(planner.plan_row_end_maneuver(current).is_none());

        // Counter has reset: a sixth call starts a fresh sequence.
        assert_eq!(
            planner.plan_row_end_maneuver(current).unwrap().kind,
            SegmentKind::Straight
        );
    }

    #[test]
    fn hole_to_robot_target_composes_tool_offset() {
        let robot_from_tool = Pose::translation(Vector3::new(0.25, 0.0, 0.0), "robot", "tool");
        let planner = PathPlanner::new(robot_from_tool, config());

        let world_from_hole = Pose::translation(Vector3::new(10.0, 2.0, 0.0), "world", "hole");
        let target = planner.hole_to_robot_target(world_from_hole).unwrap();

        assert_eq!(target.frame_a, std::borrow::Cow::Borrowed("world"));
        assert_eq!(target.frame_b, std::borrow::Cow::Borrowed("robot"));
        assert!((target.translation - Vector3::new(9.75, 2.0, 0.0)).norm() < 1e-9);
    }
}
