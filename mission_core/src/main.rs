//! # Mission Core Executable
//!
//! Drives an autonomous field robot through a resumable blast pattern: loads the
//! mission configuration and waypoint table, wires up the external service
//! transports (live ZeroMQ or in-memory mock), and runs the orchestrator's main
//! loop to completion or shutdown.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use color_eyre::{eyre::WrapErr, Result};
use log::{info, warn};
use structopt::StructOpt;

// Internal
use mission_core::coords::load_waypoints_csv;
use mission_core::filter_health::{FilterHealthConfig, FilterHealthMonitor};
use mission_core::module::ModuleRegistry;
use mission_core::nav_exec::NavExecutor;
use mission_core::orchestrator::{Orchestrator, ShutdownSignal};
use mission_core::params::MissionConfig;
use mission_core::pattern::BlastPattern;
use mission_core::planner::{PathPlanner, PlannerConfig, TurnDirection};
use mission_core::pose::Pose;
use mission_core::services::{CanBus, FilterService, FollowerService};
use mission_core::vision::{NoVision, VisionGate};
use nalgebra::{UnitQuaternion, Vector3};
use std::fs::File;
use std::time::Duration;
use util::{
    host,
    logger::{logger_init, LevelFilter},
    session::Session,
};

// ---------------------------------------------------------------------------
// CLI
// ---------------------------------------------------------------------------

#[derive(Debug, StructOpt)]
#[structopt(name = "mission_core", about = "Autonomous blast pattern mission core")]
struct Opt {
    /// Path to the mission configuration TOML file.
    #[structopt(long, default_value = "mission_core.toml")]
    config: String,
}

// ---------------------------------------------------------------------------
// MAIN
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    color_eyre::install()?;

    // ---- EARLY INITIALISATION ----

    let session = Session::new("mission_core", "sessions").wrap_err("Failed to create the session")?;

    logger_init(LevelFilter::Trace, &session)
        .map_err(|e| color_eyre::eyre::eyre!("Failed to initialise logging: {:?}", e))?;

    info!("Mission Core Executable\n");
    info!("Running on: {:#?}", host::get_uname().wrap_err("Failed to get host information")?);
    info!("Session directory: {:?}\n", session.session_root);

    let opt = Opt::from_args();

    // ---- LOAD PARAMETERS ----

    let config: MissionConfig = util::params::load(&opt.config).wrap_err("Failed to load mission configuration")?;

    info!("Parameters loaded from {}", opt.config);

    // ---- SHUTDOWN SIGNAL ----

    let shutdown = ShutdownSignal::new();
    {
        let shutdown = shutdown.clone();
        ctrlc::set_handler(move || {
            warn!("shutdown signal received, requesting graceful stop...");
            shutdown.request();
        })
        .wrap_err("Failed to install signal handler")?;
    }

    // ---- PATTERN STORE ----

    let pattern = load_or_build_pattern(&config).wrap_err("Failed to load or build the blast pattern")?;

    // ---- SERVICES ----

    let (filter, follower, can) = build_services(&config).wrap_err("Failed to initialise external services")?;

    // ---- COMPONENTS ----

    let planner_config = PlannerConfig {
        waypoint_spacing_m: 0.25,
        headland_buffer_m: config.waypoints.headland_buffer_m,
        row_spacing_m: config.waypoints.row_spacing_m,
        turn_angle_rad: std::f64::consts::PI,
        turn_direction: match config.waypoints.turn_direction.as_str() {
            "right" => TurnDirection::Right,
            _ => TurnDirection::Left,
        },
    };
    let robot_from_tool = Pose::new(
        Vector3::new(config.tool.offset_x, config.tool.offset_y, config.tool.offset_z),
        UnitQuaternion::identity(),
        "robot",
        "tool",
    );
    let planner = PathPlanner::new(robot_from_tool, planner_config);

    let nav_executor = NavExecutor::spawn_monitor_with_wait(
        follower,
        config.navigation.max_speed_mps,
        Duration::from_secs_f64(config.navigation.track_load_wait_s),
    );

    let filter_monitor = FilterHealthMonitor::new(FilterHealthConfig {
        convergence_timeout: Duration::from_secs_f64(config.navigation.convergence_timeout_s),
        wiggle_duration: Duration::from_secs_f64(config.navigation.wiggle_duration_s),
        wiggle_angular_velocity: config.navigation.wiggle_angular_velocity,
        wiggle_max_attempts: config.navigation.filter_convergence_retries,
        wiggle_publish_hz: config.navigation.wiggle_check_rate_hz,
    });

    let mut registry = ModuleRegistry::new();
    register_modules(&mut registry);
    let module = registry.get(&config.tool.module_type);

    // Vision is modelled as optional throughout the core (spec.md §4.6); a real
    // gate is wired in by forks of this executable that have a camera transport.
    let vision: Box<dyn VisionGate> = Box::new(NoVision);

    let mut orchestrator = Orchestrator::new(
        config, pattern, planner, nav_executor, filter_monitor, module, vision, filter, can, shutdown,
    );

    // ---- RUN ----

    orchestrator.setup().wrap_err("Mission setup failed")?;
    orchestrator.run().wrap_err("Mission run failed")?;

    info!("mission core exiting");
    Ok(())
}

// ---------------------------------------------------------------------------
// HELPERS
// ---------------------------------------------------------------------------

/// Register known tool modules. Only [`mission_core::module::NullModule`] ships
/// here; site-specific modules are expected to register themselves before this
/// call in a fork of this executable.
fn register_modules(_registry: &mut ModuleRegistry) {}

/// Load a saved snapshot from `config.mission.state_path` if one exists, otherwise
/// build a fresh pattern from the waypoint CSV (spec.md §4.8's resume contract).
fn load_or_build_pattern(config: &MissionConfig) -> Result<BlastPattern> {
    if let Ok(file) = File::open(&config.mission.state_path) {
        info!("resuming mission state from {}", config.mission.state_path);
        return BlastPattern::load(file).wrap_err("Failed to parse saved mission state");
    }

    info!("no saved mission state found, building a fresh pattern from {}", config.waypoints.csv_path);
    let file = File::open(&config.waypoints.csv_path).wrap_err("Failed to open waypoint CSV")?;
    let poses = load_waypoints_csv(file, config.waypoints.last_row_waypoint_index)
        .wrap_err("Failed to parse waypoint CSV")?;

    let holes: Vec<Pose> = poses.into_iter().map(|(_, pose)| pose).collect();
    Ok(BlastPattern::new(holes, config.waypoints.last_row_waypoint_index, config.mission.mission_name.clone()))
}

type Services = (Box<dyn FilterService>, Box<dyn FollowerService>, Box<dyn CanBus>);

#[cfg(feature = "zmq-transport")]
fn build_services(config: &MissionConfig) -> Result<Services> {
    use comms_if::net::{zmq, SocketOptions};
    use mission_core::services::zmq_transport::{ZmqCanBus, ZmqFilterService, ZmqFollowerService};

    fn endpoint(config: &MissionConfig, service: &str) -> Result<String> {
        let params = config
            .services
            .get(service)
            .ok_or_else(|| color_eyre::eyre::eyre!("no service configuration for {:?}", service))?;
        Ok(format!("tcp://{}:{}", params.host, params.port))
    }

    let ctx = zmq::Context::new();

    let filter: Box<dyn FilterService> = Box::new(
        ZmqFilterService::new(&ctx, &endpoint(config, "filter")?, SocketOptions::default())
            .wrap_err("Failed to connect to filter service")?,
    );

    let follower: Box<dyn FollowerService> = Box::new(
        ZmqFollowerService::new(
            &ctx,
            &endpoint(config, "follower_control")?,
            SocketOptions::default(),
            &endpoint(config, "follower_state")?,
            SocketOptions::default(),
        )
        .wrap_err("Failed to connect to follower service")?,
    );

    let can: Box<dyn CanBus> = Box::new(
        ZmqCanBus::new(&ctx, &endpoint(config, "can")?, SocketOptions::default())
            .wrap_err("Failed to connect to CAN bus service")?,
    );

    Ok((filter, follower, can))
}

#[cfg(not(feature = "zmq-transport"))]
fn build_services(_config: &MissionConfig) -> Result<Services> {
    use mission_core::services::mock::{MockCanBus, MockFilterService, MockFollowerService};

    warn!("zmq-transport feature disabled, using in-memory mock services");

    let (filter, _filter_handle) = MockFilterService::new();
    let (follower, _follower_handle) = MockFollowerService::new();
    let (can, _can_handle) = MockCanBus::new();

    Ok((Box::new(filter), Box::new(follower), Box::new(can)))
}
