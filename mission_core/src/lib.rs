//! # Mission core
//!
//! The hierarchical state machine, resumable blast-pattern store, path planner,
//! navigation executor, filter-health monitor, and module abstraction that drive an
//! autonomous field robot through a sequence of holes. See `SPEC_FULL.md` at the
//! workspace root for the full requirements this crate implements.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

pub mod coords;
pub mod filter_health;
pub mod module;
pub mod nav_exec;
pub mod orchestrator;
pub mod params;
pub mod path;
pub mod pattern;
pub mod planner;
pub mod pose;
pub mod services;
pub mod state_machine;
pub mod vision;
