//! # Mission configuration
//!
//! Typed, validated parameters loaded via [`util::params::load`], grounded on
//! `original_source/core/config.py`'s Pydantic `XStemConfig` tree. TOML replaces
//! YAML as the on-disk format (the teacher's `util::params` loader is TOML-based);
//! field names and defaults otherwise mirror the Python original directly.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Connection details for one external service (filter, follower, CAN bus, camera).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceParams {
    pub name: String,
    #[serde(default = "default_host")]
    pub host: String,
    pub port: u16,
}

fn default_host() -> String {
    "localhost".to_string()
}

/// Waypoint CSV loading and row-end maneuver geometry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WaypointParams {
    pub csv_path: String,
    pub last_row_waypoint_index: usize,
    #[serde(default = "default_turn_direction")]
    pub turn_direction: String,
    #[serde(default = "default_row_spacing_m")]
    pub row_spacing_m: f64,
    #[serde(default = "default_headland_buffer_m")]
    pub headland_buffer_m: f64,
}

fn default_turn_direction() -> String {
    "left".to_string()
}
fn default_row_spacing_m() -> f64 {
    6.0
}
fn default_headland_buffer_m() -> f64 {
    2.0
}

/// Tool offset and module-specific knobs, passed through to `Module::execute` as
/// `module_config`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolParams {
    #[serde(default = "default_tool_type")]
    pub module_type: String,
    #[serde(default)]
    pub offset_x: f64,
    #[serde(default)]
    pub offset_y: f64,
    #[serde(default)]
    pub offset_z: f64,
    #[serde(default)]
    pub module_config: serde_json::Value,
}

fn default_tool_type() -> String {
    "none".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CameraParams {
    pub service_name: String,
    pub role: String,
    pub offset_x: f64,
    pub offset_y: f64,
    pub offset_z: f64,
    #[serde(default)]
    pub pitch_deg: f64,
}

/// Vision gate behaviour. `enabled = false` makes the orchestrator construct
/// [`crate::vision::NoVision`] instead of a real gate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VisionParams {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_search_radius_m")]
    pub search_radius_m: f64,
    #[serde(default = "default_detection_timeout_s")]
    pub detection_timeout_s: f64,
    #[serde(default = "default_min_confidence")]
    pub min_confidence: f64,
    pub forward_camera: Option<CameraParams>,
    pub downward_camera: Option<CameraParams>,
}

fn default_true() -> bool {
    true
}
fn default_search_radius_m() -> f64 {
    1.0
}
fn default_detection_timeout_s() -> f64 {
    10.0
}
fn default_min_confidence() -> f64 {
    0.7
}

/// Navigation executor and filter-health tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NavigationParams {
    #[serde(default = "default_approach_offset_m")]
    pub approach_offset_m: f64,
    #[serde(default = "default_error_recovery_max_retries")]
    pub error_recovery_max_retries: u32,
    #[serde(default = "default_filter_convergence_retries")]
    pub filter_convergence_retries: u32,
    #[serde(default = "default_can_recovery_delay_s")]
    pub can_recovery_delay_s: f64,
    #[serde(default = "default_track_timeout_s")]
    pub track_timeout_s: f64,
    #[serde(default = "default_track_load_wait_s")]
    pub track_load_wait_s: f64,
    #[serde(default = "default_retry_delay_s")]
    pub retry_delay_s: f64,
    #[serde(default = "default_max_speed_mps")]
    pub max_speed_mps: f64,
    #[serde(default = "default_wiggle_duration_s")]
    pub wiggle_duration_s: f64,
    #[serde(default = "default_wiggle_angular_velocity")]
    pub wiggle_angular_velocity: f64,
    #[serde(default = "default_convergence_timeout_s")]
    pub convergence_timeout_s: f64,
    #[serde(default = "default_wiggle_check_rate_hz")]
    pub wiggle_check_rate_hz: f64,
}

fn default_approach_offset_m() -> f64 {
    1.2
}
fn default_error_recovery_max_retries() -> u32 {
    3
}
fn default_filter_convergence_retries() -> u32 {
    3
}
fn default_can_recovery_delay_s() -> f64 {
    0.5
}
fn default_track_timeout_s() -> f64 {
    60.0
}
fn default_track_load_wait_s() -> f64 {
    1.0
}
fn default_retry_delay_s() -> f64 {
    1.0
}
fn default_max_speed_mps() -> f64 {
    1.5
}
fn default_wiggle_duration_s() -> f64 {
    4.0
}
fn default_wiggle_angular_velocity() -> f64 {
    0.5
}
fn default_convergence_timeout_s() -> f64 {
    2.0
}
fn default_wiggle_check_rate_hz() -> f64 {
    20.0
}

/// Detection and control thresholds shared across modules.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThresholdsParams {
    #[serde(default = "default_positioning_accuracy_m")]
    pub positioning_accuracy_m: f64,
    #[serde(default = "default_heading_accuracy_deg")]
    pub heading_accuracy_deg: f64,
    #[serde(default = "default_alignment_tolerance_m")]
    pub alignment_tolerance_m: f64,
}

fn default_positioning_accuracy_m() -> f64 {
    0.05
}
fn default_heading_accuracy_deg() -> f64 {
    10.0
}
fn default_alignment_tolerance_m() -> f64 {
    0.02
}

/// Mission-level identity, used by the blast pattern store's resume files.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MissionParams {
    #[serde(default = "default_mission_name")]
    pub mission_name: String,
    #[serde(default = "default_state_path")]
    pub state_path: String,
}

fn default_mission_name() -> String {
    "mission".to_string()
}
fn default_state_path() -> String {
    "mission_state.json".to_string()
}

/// Root configuration, loaded once at startup via `util::params::load`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MissionConfig {
    pub services: HashMap<String, ServiceParams>,
    pub waypoints: WaypointParams,
    pub tool: ToolParams,
    pub vision: VisionParams,
    pub navigation: NavigationParams,
    pub thresholds: ThresholdsParams,
    pub mission: MissionParams,
}
