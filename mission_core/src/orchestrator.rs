//! # Mission Orchestrator
//!
//! Wires every other component into the main loop, grounded on
//! `original_source/main.py`'s `XStemNavigator`. Owns every service and component
//! instance as a plain field (teacher Design Note: "replaced by an explicit
//! Orchestrator value that owns all service handles" rather than a process-wide
//! singleton registry).

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use crate::filter_health::FilterHealthMonitor;
use crate::module::{Module, ModuleContext};
use crate::nav_exec::NavExecutor;
use crate::params::MissionConfig;
use crate::path::TrackSegment;
use crate::pattern::BlastPattern;
use crate::planner::PathPlanner;
use crate::pose::Pose;
use crate::services::{CanBus, FilterService};
use crate::state_machine::MissionStateMachine;
use crate::vision::VisionGate;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Only the `Fatal` error class is allowed to propagate out of the orchestrator
/// (spec.md §7): bad input aborts setup, service/module errors are converted into
/// domain events and consumed by the state machine.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("setup failed: {0}")]
    Setup(String),

    #[error("module {0} failed verify_ready, aborting setup")]
    ModuleNotReady(String),

    #[error("pattern store error: {0}")]
    Pattern(#[from] crate::pattern::PatternError),
}

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Thread-safe shutdown flag, set from a signal handler in `main.rs` (SIGINT/SIGTERM)
/// and polled by the main loop at each state boundary (spec.md §5's cancellation
/// model).
#[derive(Clone)]
pub struct ShutdownSignal(Arc<AtomicBool>);

impl ShutdownSignal {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }

    pub fn request(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_requested(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

impl Default for ShutdownSignal {
    fn default() -> Self {
        Self::new()
    }
}

/// Everything the mission needs for one run, owned outright. Built once by `main.rs`
/// and handed services constructed from `config` (concrete transports, live or mock).
pub struct Orchestrator {
    config: MissionConfig,
    pattern: BlastPattern,
    state_machine: MissionStateMachine,
    planner: PathPlanner,
    nav_executor: NavExecutor,
    filter_monitor: FilterHealthMonitor,
    module: Box<dyn Module>,
    vision: Box<dyn VisionGate>,
    filter: Box<dyn FilterService>,
    can: Box<dyn CanBus>,
    shutdown: ShutdownSignal,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

#[allow(clippy::too_many_arguments)]
impl Orchestrator {
    pub fn new(
        config: MissionConfig,
        pattern: BlastPattern,
        planner: PathPlanner,
        nav_executor: NavExecutor,
        filter_monitor: FilterHealthMonitor,
        module: Box<dyn Module>,
        vision: Box<dyn VisionGate>,
        filter: Box<dyn FilterService>,
        can: Box<dyn CanBus>,
        shutdown: ShutdownSignal,
    ) -> Self {
        Self {
            config,
            pattern,
            state_machine: MissionStateMachine::new(),
            planner,
            nav_executor,
            filter_monitor,
            module,
            vision,
            filter,
            can,
            shutdown,
        }
    }

    /// Initialize the module, verify it's ready, and ensure the filter has converged
    /// before the main loop starts (wiggling if it hasn't), mirroring
    /// `XStemNavigator.setup`.
    pub fn setup(&mut self) -> Result<(), OrchestratorError> {
        log::info!("initializing mission...");

        {
            let mut ctx = ModuleContext {
                hole_pose: Pose::identity("world"),
                robot_pose: Pose::identity("world"),
                hole_index: 0,
                can: self.can.as_mut(),
                filter: self.filter.as_mut(),
                vision: Some(self.vision.as_mut()),
                module_config: self.config.tool.module_config.clone(),
            };
            self.module
                .initialize(&mut ctx)
                .map_err(|e| OrchestratorError::Setup(e.to_string()))?;
        }

        if !self
            .module
            .verify_ready()
            .map_err(|e| OrchestratorError::Setup(e.to_string()))?
        {
            return Err(OrchestratorError::ModuleNotReady(self.module.module_name().to_string()));
        }

        if !self.filter_monitor.check_convergence(self.filter.as_mut()) {
            log::warn!("filter not converged, attempting IMU wiggle...");
            self.filter_monitor.imu_wiggle(self.can.as_mut(), self.filter.as_mut());
        }

        log::info!("initialization complete");
        Ok(())
    }

    /// Main navigation loop: repeatedly take the next pending hole, drive it to
    /// completion (or exhaust its retries), handle row-end maneuvers at echelon
    /// boundaries, and stop at a terminal state or a shutdown request.
    pub fn run(&mut self) -> Result<(), OrchestratorError> {
        log::info!("starting navigation...");
        self.state_machine.start();

        while !self.shutdown.is_requested() && !self.state_machine.is_terminal() {
            if self.pattern.is_complete() {
                log::info!("all holes completed");
                self.state_machine.start_return();
                self.state_machine.mission_complete();
                break;
            }

            let hole_index = match self.pattern.next_pending() {
                Some(hole) => hole.index,
                None => {
                    log::warn!("no pending hole but pattern not complete, stopping");
                    self.state_machine.abort();
                    break;
                }
            };

            self.run_hole_with_retries(hole_index)?;

            if self.shutdown.is_requested() {
                break;
            }

            let is_complete = self.pattern.is_complete();
            let is_echelon_end = self.pattern.is_echelon_end(hole_index);
            self.state_machine.pattern_updated(is_complete, is_echelon_end);

            if is_complete {
                self.state_machine.mission_complete();
            } else if is_echelon_end {
                log::info!("echelon end at hole {}, executing row-end maneuver", hole_index);
                self.run_row_end_maneuver();
                self.state_machine.echelon_turn_complete();
            }
        }

        self.shutdown_mission();
        Ok(())
    }

    /// Drive one hole to a terminal per-hole status, retrying in place up to
    /// `error_recovery_max_retries` times on track failure/timeout before giving up
    /// (Testable Property / Scenario S4).
    fn run_hole_with_retries(&mut self, hole_index: usize) -> Result<(), OrchestratorError> {
        let max_retries = self.config.navigation.error_recovery_max_retries;

        loop {
            self.pattern.mark_in_progress(hole_index)?;
            self.state_machine.goal_set();

            match self.run_hole_cycle(hole_index) {
                Ok(measurements) => {
                    self.pattern.mark_completed(hole_index, measurements)?;
                    log::info!(
                        "hole {} completed ({:.1}% mission progress)",
                        hole_index,
                        self.pattern.progress_percentage()
                    );
                    self.autosave_pattern();
                    return Ok(());
                }
                Err(reason) => {
                    let attempts = self.pattern.get(hole_index).map(|h| h.attempts).unwrap_or(0);
                    self.state_machine.enter_recovery();

                    if attempts >= max_retries {
                        log::error!("hole {} failed after {} attempts: {}", hole_index, attempts, reason);
                        self.pattern.mark_failed(hole_index, reason)?;
                        self.state_machine.skip_hole();
                        self.autosave_pattern();
                        return Ok(());
                    }

                    log::warn!("hole {} attempt {} failed, retrying: {}", hole_index, attempts, reason);
                    self.state_machine.retry();
                    std::thread::sleep(Duration::from_secs_f64(self.config.navigation.retry_delay_s));
                }
            }

            if self.shutdown.is_requested() {
                self.pattern.mark_skipped(hole_index, "shutdown requested mid-retry")?;
                self.autosave_pattern();
                return Ok(());
            }
        }
    }

    /// Persist the pattern store to `self.config.mission.state_path` after every hole
    /// outcome, so a crash or shutdown mid-mission can resume from the last completed
    /// hole (spec.md §4.8's `save`/`load` round-trip, exercised at every hole boundary
    /// rather than only at shutdown).
    fn autosave_pattern(&self) {
        let path = &self.config.mission.state_path;
        match std::fs::File::create(path) {
            Ok(file) => {
                if let Err(e) = self.pattern.save(file) {
                    log::warn!("could not save mission state to {}: {}", path, e);
                }
            }
            Err(e) => log::warn!("could not open mission state file {}: {}", path, e),
        }
    }

    /// One pass at a hole: approach, optional vision refinement, final approach,
    /// module execution. Returns the module's measurements on success, or a reason
    /// string on any failure along the way.
    fn run_hole_cycle(&mut self, hole_index: usize) -> Result<Option<serde_json::Value>, String> {
        let hole = self.pattern.get(hole_index).ok_or("hole vanished mid-cycle")?;
        let planned_hole_pose = hole.position;
        let planned_robot_target = self
            .planner
            .hole_to_robot_target(planned_hole_pose)
            .map_err(|e| e.to_string())?;

        let current_pose = self.current_pose()?;
        let approach_offset = self.config.navigation.approach_offset_m;

        self.state_machine.path_plotted();
        let approach = self
            .planner
            .plan_approach_segment(current_pose, planned_robot_target, approach_offset);
        self.state_machine.approaching_stop();
        self.execute_track(&approach)?;

        self.state_machine.stopped();
        let final_target = if self.config.vision.enabled {
            let timeout = Duration::from_secs_f64(self.config.vision.detection_timeout_s);
            match self
                .vision
                .detect_hole(planned_hole_pose, self.config.vision.search_radius_m, timeout)
            {
                Ok(Some(refined)) => {
                    log::info!("hole {} refined by vision", hole_index);
                    self.state_machine.hole_detected();
                    self.state_machine.coordinates_converted();
                    self.planner.hole_to_robot_target(refined).map_err(|e| e.to_string())?
                }
                Ok(None) => {
                    log::info!("hole {} not found by vision, using planned position", hole_index);
                    planned_robot_target
                }
                Err(e) => {
                    log::warn!("vision error at hole {}, using planned position: {}", hole_index, e);
                    planned_robot_target
                }
            }
        } else {
            planned_robot_target
        };

        self.state_machine.path_plotted();
        let current_pose = self.current_pose()?;
        let final_segment = self.planner.plan_segment(current_pose, final_target);
        self.execute_track(&final_segment)?;

        self.state_machine.ready_for_module();
        let mut ctx = ModuleContext {
            hole_pose: final_target,
            robot_pose: current_pose,
            hole_index,
            can: self.can.as_mut(),
            filter: self.filter.as_mut(),
            vision: Some(self.vision.as_mut()),
            module_config: self.config.tool.module_config.clone(),
        };
        let result = self.module.execute(&mut ctx);
        self.state_machine.module_complete();

        if result.success {
            Ok(result.measurements)
        } else {
            Err(result.error.unwrap_or_else(|| "module reported failure".to_string()))
        }
    }

    fn execute_track(&mut self, segment: &TrackSegment) -> Result<(), String> {
        let timeout = Duration::from_secs_f64(self.config.navigation.track_timeout_s);
        self.nav_executor.execute(segment, timeout).map_err(|e| {
            self.state_machine.segment_timeout_detected();
            e.to_string()
        })
    }

    /// Fetch the robot's current pose from the filter, converting both its position
    /// and yaw from the wire protocol's ENU convention into the NWU frame every other
    /// component in this crate works in (the vector conversion is a plain -90° Z
    /// rotation, per [`crate::pose::enu_to_nwu`]; yaw follows the same rotation).
    fn current_pose(&mut self) -> Result<Pose, String> {
        let state = self.filter.get_state().map_err(|e| e.to_string())?;
        let translation_enu = nalgebra::Vector3::new(
            state.position_enu[0],
            state.position_enu[1],
            state.position_enu[2],
        );
        let orientation_enu = nalgebra::UnitQuaternion::from_quaternion(nalgebra::Quaternion::new(
            state.orientation_enu[3],
            state.orientation_enu[0],
            state.orientation_enu[1],
            state.orientation_enu[2],
        ));
        let (roll, pitch, yaw_enu) = orientation_enu.euler_angles();
        let yaw_nwu = yaw_enu - std::f64::consts::FRAC_PI_2;
        let rotation = nalgebra::UnitQuaternion::from_euler_angles(roll, pitch, yaw_nwu);

        Ok(Pose::new(crate::pose::enu_to_nwu(translation_enu), rotation, "world", "robot"))
    }

    /// Execute the 4-segment U-turn at an echelon boundary, grounded on
    /// `_execute_row_end_maneuver`. Stops after the first failed segment rather than
    /// retrying (row-end segments are short and re-planned from scratch next cycle).
    fn run_row_end_maneuver(&mut self) {
        log::info!("executing row-end maneuver (up to 4 segments)");
        let mut segment_idx = 0;
        loop {
            let current = match self.current_pose() {
                Ok(pose) => pose,
                Err(e) => {
                    log::error!("could not fetch current pose for row-end segment: {}", e);
                    break;
                }
            };

            // Drive the planner all the way to `None` (its 5th call) so its phase
            // counter resets here rather than being left at 4, which would make the
            // *next* echelon end's maneuver return no segments at all.
            let segment = match self.planner.plan_row_end_maneuver(current) {
                Some(segment) => segment,
                None => break,
            };

            segment_idx += 1;
            log::info!("row-end segment {}/4", segment_idx);
            if let Err(e) = self.execute_track(&segment) {
                log::error!("row-end segment {} failed: {}", segment_idx, e);
                break;
            }
        }
        log::info!("row-end maneuver complete");
    }

    /// Clean shutdown: stop the module (must not fail), then stop the executor's
    /// monitor thread.
    fn shutdown_mission(&mut self) {
        log::info!("shutting down...");
        self.shutdown.request();
        self.module.shutdown();
        self.nav_executor.shutdown();
        log::info!("shutdown complete");
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

/// End-to-end scenarios wiring the full `Orchestrator` against the in-memory mock
/// services, mirroring spec.md §8's literal scenarios (S1 happy path, S2 row-end
/// turn, S4 track timeout -> retry -> fail).
#[cfg(test)]
mod test {
    use super::*;
    use crate::module::NullModule;
    use crate::params::{
        MissionParams, NavigationParams, ThresholdsParams, ToolParams, VisionParams, WaypointParams,
    };
    use crate::planner::{PlannerConfig, TurnDirection};
    use crate::services::mock::{MockCanBus, MockFilterService, MockFollowerHandle, MockFollowerService};
    use crate::vision::NoVision;
    use chrono::Utc;
    use comms_if::wire::{FollowerState, FollowerTerminalStatus};
    use nalgebra::{UnitQuaternion, Vector3};
    use std::collections::HashMap;

    /// A minimal but fully-populated [`MissionConfig`], close to instantaneous: short
    /// track timeout so a stalled follower doesn't make the test suite slow, vision
    /// disabled so `run_hole_cycle` only exercises the approach + final segments.
    fn test_config(state_path: &str, track_timeout_s: f64, error_recovery_max_retries: u32) -> MissionConfig {
        MissionConfig {
            services: HashMap::new(),
            waypoints: WaypointParams {
                csv_path: "unused.csv".to_string(),
                last_row_waypoint_index: 1,
                turn_direction: "left".to_string(),
                row_spacing_m: 6.0,
                headland_buffer_m: 2.0,
            },
            tool: ToolParams {
                module_type: "none".to_string(),
                offset_x: 0.0,
                offset_y: 0.0,
                offset_z: 0.0,
                module_config: serde_json::Value::Null,
            },
            vision: VisionParams {
                enabled: false,
                search_radius_m: 1.0,
                detection_timeout_s: 1.0,
                min_confidence: 0.7,
                forward_camera: None,
                downward_camera: None,
            },
            navigation: NavigationParams {
                approach_offset_m: 1.2,
                error_recovery_max_retries,
                filter_convergence_retries: 3,
                can_recovery_delay_s: 0.1,
                track_timeout_s,
                track_load_wait_s: 0.01,
                retry_delay_s: 0.01,
                max_speed_mps: 1.0,
                wiggle_duration_s: 0.1,
                wiggle_angular_velocity: 0.3,
                convergence_timeout_s: 0.1,
                wiggle_check_rate_hz: 50.0,
            },
            thresholds: ThresholdsParams {
                positioning_accuracy_m: 0.05,
                heading_accuracy_deg: 10.0,
                alignment_tolerance_m: 0.02,
            },
            mission: MissionParams {
                mission_name: "test-mission".to_string(),
                state_path: state_path.to_string(),
            },
        }
    }

    fn test_planner() -> PathPlanner {
        let robot_from_tool = Pose::new(Vector3::zeros(), UnitQuaternion::identity(), "robot", "tool");
        PathPlanner::new(
            robot_from_tool,
            PlannerConfig {
                waypoint_spacing_m: 0.5,
                headland_buffer_m: 2.0,
                row_spacing_m: 6.0,
                turn_angle_rad: std::f64::consts::FRAC_PI_2,
                turn_direction: TurnDirection::Left,
            },
        )
    }

    fn holes_along_x(n: usize) -> Vec<Pose> {
        (1..=n)
            .map(|i| Pose::translation(Vector3::new(i as f64, 0.0, 0.0), "world", "hole"))
            .collect()
    }

    fn complete_state() -> FollowerState {
        FollowerState {
            timestamp: Utc::now(),
            current_waypoint: 0,
            cross_track_error: 0.0,
            terminal_status: Some(FollowerTerminalStatus::Complete),
        }
    }

    /// Build an `Orchestrator` over mock services, returning handles the test can use
    /// to drive the follower and inspect what was sent.
    fn build(
        config: MissionConfig,
        pattern: BlastPattern,
    ) -> (Orchestrator, MockFollowerHandle) {
        let (filter, filter_handle) = MockFilterService::new();
        filter_handle.push_converged(true);

        let (follower, follower_handle) = MockFollowerService::new();
        let (can, _can_handle) = MockCanBus::new();

        let nav_executor = NavExecutor::spawn_monitor_with_wait(
            Box::new(follower),
            config.navigation.max_speed_mps,
            Duration::from_secs_f64(config.navigation.track_load_wait_s),
        );
        let filter_monitor = FilterHealthMonitor::new(crate::filter_health::FilterHealthConfig {
            convergence_timeout: Duration::from_secs_f64(config.navigation.convergence_timeout_s),
            wiggle_duration: Duration::from_secs_f64(config.navigation.wiggle_duration_s),
            wiggle_angular_velocity: config.navigation.wiggle_angular_velocity,
            wiggle_max_attempts: config.navigation.filter_convergence_retries,
            wiggle_publish_hz: config.navigation.wiggle_check_rate_hz,
        });

        let orchestrator = Orchestrator::new(
            config,
            pattern,
            test_planner(),
            nav_executor,
            filter_monitor,
            Box::new(NullModule),
            Box::new(NoVision),
            Box::new(filter),
            Box::new(can),
            ShutdownSignal::new(),
        );

        (orchestrator, follower_handle)
    }

    /// Scenario S1: four holes, no echelon end, vision disabled. Every hole should
    /// complete and the mission should reach a terminal COMPLETE state.
    #[test]
    fn s1_happy_path_completes_every_hole_with_no_row_end() {
        let state_path = std::env::temp_dir().join("mission_core_test_s1.json");
        let state_path = state_path.to_str().unwrap();

        let config = test_config(state_path, 5.0, 3);
        let pattern = BlastPattern::new(holes_along_x(4), 7, "s1");
        let (mut orchestrator, follower_handle) = build(config, pattern);

        // Two segments (approach + final) per hole, four holes, all complete cleanly.
        for _ in 0..8 {
            follower_handle.push_state(complete_state());
        }

        orchestrator.setup().unwrap();
        orchestrator.run().unwrap();

        let saved = std::fs::File::open(state_path).unwrap();
        let loaded = BlastPattern::load(saved).unwrap();
        let stats = loaded.stats();
        assert_eq!(stats.completed, 4);
        assert_eq!(stats.failed, 0);
        assert_eq!(stats.pending, 0);

        std::fs::remove_file(state_path).ok();
    }

    /// Scenario S2: an echelon end mid-mission triggers the four-segment row-end
    /// maneuver before navigation resumes toward the next hole.
    #[test]
    fn s2_echelon_end_runs_row_end_maneuver_then_continues() {
        let state_path = std::env::temp_dir().join("mission_core_test_s2.json");
        let state_path = state_path.to_str().unwrap();

        // last_row_index=1 -> echelon ends at hole 1 (mid-mission) and hole 3 (final).
        let config = test_config(state_path, 5.0, 3);
        let pattern = BlastPattern::new(holes_along_x(4), 1, "s2");
        let (mut orchestrator, follower_handle) = build(config, pattern);

        // 4 holes * 2 segments + 1 row-end maneuver (4 segments) after hole 1.
        for _ in 0..12 {
            follower_handle.push_state(complete_state());
        }

        orchestrator.setup().unwrap();
        orchestrator.run().unwrap();

        assert_eq!(follower_handle.set_track_call_count(), 12);

        let saved = std::fs::File::open(state_path).unwrap();
        let loaded = BlastPattern::load(saved).unwrap();
        assert_eq!(loaded.stats().completed, 4);

        std::fs::remove_file(state_path).ok();
    }

    /// Regression: a mission with two *non-final* echelon ends must run the full
    /// four-segment row-end maneuver both times, not just the first. Before this was
    /// fixed, `PathPlanner`'s row-end phase counter was left at 4 after the first
    /// maneuver (the loop called `plan_row_end_maneuver` exactly four times and never
    /// a fifth, so the phase never reset), making every maneuver after the first
    /// return zero segments.
    #[test]
    fn echelon_end_row_end_maneuver_runs_in_full_on_every_occurrence() {
        let state_path = std::env::temp_dir().join("mission_core_test_s2b.json");
        let state_path = state_path.to_str().unwrap();

        // last_row_index=1 -> echelon ends at holes 1, 3, 5; hole 5 is also the final
        // hole, so it completes the mission without triggering a third maneuver.
        let config = test_config(state_path, 5.0, 3);
        let pattern = BlastPattern::new(holes_along_x(6), 1, "s2b");
        let (mut orchestrator, follower_handle) = build(config, pattern);

        // 6 holes * 2 segments + 2 row-end maneuvers (4 segments each) after holes 1 and 3.
        for _ in 0..20 {
            follower_handle.push_state(complete_state());
        }

        orchestrator.setup().unwrap();
        orchestrator.run().unwrap();

        assert_eq!(follower_handle.set_track_call_count(), 20);

        let saved = std::fs::File::open(state_path).unwrap();
        let loaded = BlastPattern::load(saved).unwrap();
        assert_eq!(loaded.stats().completed, 6);

        std::fs::remove_file(state_path).ok();
    }

    /// Scenario S4: the follower never reports a terminal status, so every attempt at
    /// the hole times out. After `error_recovery_max_retries` attempts the hole is
    /// marked FAILED rather than retried forever, and the mission still ends COMPLETE
    /// (every hole reached a terminal per-hole status).
    #[test]
    fn s4_track_timeout_retries_then_marks_hole_failed() {
        let state_path = std::env::temp_dir().join("mission_core_test_s4.json");
        let state_path = state_path.to_str().unwrap();

        // Short timeout, no follower events queued: every execute() call times out.
        let config = test_config(state_path, 0.05, 2);
        let pattern = BlastPattern::new(holes_along_x(1), 7, "s4");
        let (mut orchestrator, follower_handle) = build(config, pattern);

        orchestrator.setup().unwrap();
        orchestrator.run().unwrap();

        // attempts 1 and 2, both against the approach segment; both cancelled on timeout.
        assert_eq!(follower_handle.set_track_call_count(), 2);
        assert_eq!(follower_handle.cancel_call_count(), 2);

        let saved = std::fs::File::open(state_path).unwrap();
        let loaded = BlastPattern::load(saved).unwrap();
        let hole = loaded.get(0).unwrap();
        assert_eq!(hole.status, crate::pattern::HoleStatus::Failed);
        assert_eq!(hole.attempts, 2);
        assert_eq!(loaded.stats().failed, 1);

        std::fs::remove_file(state_path).ok();
    }
}
