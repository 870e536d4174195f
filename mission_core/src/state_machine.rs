//! # Mission State Machine
//!
//! Explicit hierarchical state for one mission run, grounded on
//! `original_source/amiga_platform/core/state_machine.py`'s `NavState`/
//! `NavigationStateMachine`. The Python original carries a block of "legacy
//! compatibility" aliases for a gradual migration that has long since finished; per
//! SPEC_FULL.md those are dropped, not carried over.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Navigation states aligned with the mission flowchart:
///
/// `Idle` → `Initializing` → `Planning` → `PlottingPath` → `FollowingPath` →
/// `Stopping` → `Detecting` → `Converting` → `ModulePhase` → `UpdatingPattern` →
/// (pattern complete? `Returning` → `Complete` : echelon end? `EchelonTurn` →
/// `Planning` : `Planning`)
///
/// Error path: `SegmentTimeout` → `Recovering` → (retry/skip → `Planning` | abort →
/// `Failed`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NavState {
    Idle,
    Initializing,

    Planning,
    PlottingPath,
    FollowingPath,
    Stopping,
    Detecting,
    Converting,

    ModulePhase,
    UpdatingPattern,

    EchelonTurn,
    Returning,

    SegmentTimeout,
    Recovering,

    Complete,
    Failed,
    EmergencyStop,
}

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

pub struct MissionStateMachine {
    current: NavState,
    previous: NavState,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl MissionStateMachine {
    pub fn new() -> Self {
        Self {
            current: NavState::Idle,
            previous: NavState::Idle,
        }
    }

    pub fn current_state(&self) -> NavState {
        self.current
    }

    pub fn previous_state(&self) -> NavState {
        self.previous
    }

    pub fn is_state(&self, state: NavState) -> bool {
        self.current == state
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.current, NavState::Complete | NavState::Failed | NavState::EmergencyStop)
    }

    fn transition(&mut self, new_state: NavState) {
        if new_state != self.current {
            log::info!("[STATE] {:?} -> {:?}", self.current, new_state);
            self.previous = self.current;
            self.current = new_state;
        }
    }

    // -- Convenience transitions (flowchart-aligned) --

    pub fn start(&mut self) {
        self.transition(NavState::Planning);
    }

    pub fn initialize(&mut self) {
        self.transition(NavState::Initializing);
    }

    pub fn initialization_complete(&mut self) {
        self.transition(NavState::Planning);
    }

    pub fn goal_set(&mut self) {
        self.transition(NavState::PlottingPath);
    }

    pub fn path_plotted(&mut self) {
        self.transition(NavState::FollowingPath);
    }

    pub fn approaching_stop(&mut self) {
        self.transition(NavState::Stopping);
    }

    pub fn stopped(&mut self) {
        self.transition(NavState::Detecting);
    }

    pub fn hole_detected(&mut self) {
        self.transition(NavState::Converting);
    }

    pub fn coordinates_converted(&mut self) {
        self.transition(NavState::PlottingPath);
    }

    pub fn ready_for_module(&mut self) {
        self.transition(NavState::ModulePhase);
    }

    pub fn module_complete(&mut self) {
        self.transition(NavState::UpdatingPattern);
    }

    /// Decision point after a hole's record is updated: mission complete wins over
    /// echelon end, which wins over continuing to the next hole.
    pub fn pattern_updated(&mut self, is_complete: bool, is_echelon_end: bool) {
        if is_complete {
            self.transition(NavState::Returning);
        } else if is_echelon_end {
            self.transition(NavState::EchelonTurn);
        } else {
            self.transition(NavState::Planning);
        }
    }

    pub fn echelon_turn_complete(&mut self) {
        self.transition(NavState::Planning);
    }

    pub fn segment_timeout_detected(&mut self) {
        self.transition(NavState::SegmentTimeout);
    }

    pub fn enter_recovery(&mut self) {
        self.transition(NavState::Recovering);
    }

    pub fn retry(&mut self) {
        self.transition(NavState::Planning);
    }

    pub fn skip_hole(&mut self) {
        self.transition(NavState::Planning);
    }

    pub fn abort(&mut self) {
        self.transition(NavState::Failed);
    }

    pub fn emergency_stop(&mut self) {
        self.transition(NavState::EmergencyStop);
    }

    pub fn start_return(&mut self) {
        self.transition(NavState::Returning);
    }

    pub fn mission_complete(&mut self) {
        self.transition(NavState::Complete);
    }

    pub fn shutdown(&mut self) {
        self.transition(NavState::Complete);
    }
}

impl Default for MissionStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn full_happy_path_cycle_reaches_complete() {
        let mut sm = MissionStateMachine::new();
        sm.initialize();
        assert_eq!(sm.current_state(), NavState::Initializing);
        sm.initialization_complete();
        sm.goal_set();
        sm.path_plotted();
        sm.approaching_stop();
        sm.stopped();
        sm.hole_detected();
        sm.coordinates_converted();
        assert_eq!(sm.current_state(), NavState::PlottingPath);
        sm.path_plotted();
        sm.ready_for_module();
        sm.module_complete();
        assert_eq!(sm.current_state(), NavState::UpdatingPattern);
        sm.pattern_updated(true, false);
        assert_eq!(sm.current_state(), NavState::Returning);
        sm.mission_complete();
        assert!(sm.is_terminal());
    }

    #[test]
    fn pattern_updated_prefers_echelon_turn_over_planning_when_not_complete() {
        let mut sm = MissionStateMachine::new();
        sm.pattern_updated(false, true);
        assert_eq!(sm.current_state(), NavState::EchelonTurn);
        sm.echelon_turn_complete();
        assert_eq!(sm.current_state(), NavState::Planning);
    }

    #[test]
    fn pattern_updated_continues_planning_when_neither_complete_nor_echelon_end() {
        let mut sm = MissionStateMachine::new();
        sm.pattern_updated(false, false);
        assert_eq!(sm.current_state(), NavState::Planning);
    }

    #[test]
    fn recovery_path_can_retry_or_abort() {
        let mut sm = MissionStateMachine::new();
        sm.segment_timeout_detected();
        sm.enter_recovery();
        assert_eq!(sm.current_state(), NavState::Recovering);
        sm.abort();
        assert_eq!(sm.current_state(), NavState::Failed);
        assert!(sm.is_terminal());
    }

    #[test]
    fn transition_to_same_state_does_not_update_previous() {
        let mut sm = MissionStateMachine::new();
        sm.start();
        let previous_before = sm.previous_state();
        sm.transition(NavState::Planning);
        assert_eq!(sm.previous_state(), previous_before);
    }
}
