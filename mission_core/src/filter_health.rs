//! # Filter Health Monitor
//!
//! Observes localisation convergence and executes the IMU wiggle recovery routine,
//! grounded on `hardware/filter_utils.py`'s `check_filter_convergence`/`imu_wiggle`.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use crate::services::{CanBus, FilterService};
use comms_if::wire::Twist2d;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Tuning parameters for [`FilterHealthMonitor`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct FilterHealthConfig {
    pub convergence_timeout: Duration,
    pub wiggle_duration: Duration,
    pub wiggle_angular_velocity: f64,
    pub wiggle_max_attempts: u32,
    /// Cooperative publish rate for wiggle twist commands, per spec.md §4.4.
    pub wiggle_publish_hz: f64,
}

/// Observes filter convergence via [`FilterService`] and, when needed, drives the
/// robot through an alternating-yaw wiggle via [`CanBus`] to help the filter converge.
pub struct FilterHealthMonitor {
    config: FilterHealthConfig,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl FilterHealthMonitor {
    pub fn new(config: FilterHealthConfig) -> Self {
        Self { config }
    }

    /// Issue a single state request; `true` iff the filter reports converged within
    /// `self.config.convergence_timeout`. Transport errors and timeouts both return
    /// `false` and are logged, never propagated (spec.md §7: `ServiceUnavailable` /
    /// `Timeout` never surfaces past the state machine).
    pub fn check_convergence(&self, filter: &mut dyn FilterService) -> bool {
        let started = Instant::now();
        match filter.get_state() {
            Ok(state) => {
                let elapsed = started.elapsed();
                if elapsed > self.config.convergence_timeout {
                    log::warn!(
                        "filter state request took {:?}, exceeding the {:?} convergence timeout",
                        elapsed,
                        self.config.convergence_timeout
                    );
                    return false;
                }
                if state.converged {
                    log::info!("filter has converged");
                } else {
                    log::warn!("filter has not converged");
                }
                state.converged
            }
            Err(e) => {
                log::warn!("error checking filter convergence: {}", e);
                false
            }
        }
    }

    /// Repeatedly drive an alternating left/right/left/right angular-velocity pattern
    /// (each a quarter of `wiggle_duration`) at [`WIGGLE_PUBLISH_HZ`], stopping and
    /// re-checking convergence after each full cycle. Returns `true` on the first
    /// attempt that converges, `false` after `wiggle_max_attempts`.
    ///
    /// Safety invariant: every exit path issues a zero-velocity command first.
    pub fn imu_wiggle(&self, can: &mut dyn CanBus, filter: &mut dyn FilterService) -> bool {
        log::info!("starting IMU wiggle to help filter converge");

        if self.check_convergence(filter) {
            log::info!("filter already converged, no wiggle needed");
            return self.stop_and_return(can, true);
        }

        for attempt in 1..=self.config.wiggle_max_attempts {
            log::info!(
                "wiggle attempt {}/{} - duration {:?}, angular vel +/-{} rad/s",
                attempt,
                self.config.wiggle_max_attempts,
                self.config.wiggle_duration,
                self.config.wiggle_angular_velocity
            );

            let quarter = self.config.wiggle_duration / 4;
            let directions = [
                self.config.wiggle_angular_velocity,
                -self.config.wiggle_angular_velocity,
                self.config.wiggle_angular_velocity,
                -self.config.wiggle_angular_velocity,
            ];

            for angular in directions {
                self.hold_twist(can, angular, quarter);
            }

            // Stop the robot between attempts, then let the filter settle.
            if let Err(e) = can.send_twist(Twist2d { linear: 0.0, angular: 0.0 }) {
                log::warn!("error sending stop twist: {}", e);
            }
            std::thread::sleep(Duration::from_millis(500));

            if self.check_convergence(filter) {
                log::info!("filter converged after {} wiggle attempt(s)", attempt);
                return self.stop_and_return(can, true);
            }

            log::warn!("filter still diverged after attempt {}/{}", attempt, self.config.wiggle_max_attempts);
        }

        log::error!("filter did not converge after {} wiggle attempts", self.config.wiggle_max_attempts);
        self.stop_and_return(can, false)
    }

    /// Single choke point for every `imu_wiggle` exit: unconditionally sends a
    /// zero-velocity command before returning `result` (Testable Property 6).
    fn stop_and_return(&self, can: &mut dyn CanBus, result: bool) -> bool {
        if let Err(e) = can.send_twist(Twist2d { linear: 0.0, angular: 0.0 }) {
            log::warn!("error sending final stop twist: {}", e);
        }
        result
    }

    fn hold_twist(&self, can: &mut dyn CanBus, angular_velocity: f64, duration: Duration) {
        let twist = Twist2d { linear: 0.0, angular: angular_velocity };
        let publish_period = Duration::from_secs_f64(1.0 / self.config.wiggle_publish_hz);
        let end = Instant::now() + duration;

        while Instant::now() < end {
            if let Err(e) = can.send_twist(twist) {
                log::warn!("error sending wiggle twist: {}", e);
            }
            std::thread::sleep(publish_period);
        }
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use crate::services::mock::{MockCanBus, MockFilterService};

    fn config() -> FilterHealthConfig {
        FilterHealthConfig {
            convergence_timeout: Duration::from_millis(50),
            wiggle_duration: Duration::from_millis(40),
            wiggle_angular_velocity: 0.3,
            wiggle_max_attempts: 3,
            wiggle_publish_hz: 200.0,
        }
    }

    #[test]
    fn check_convergence_reflects_filter_state() {
        let (mut filter, handle) = MockFilterService::new();
        handle.push_converged(true);

        let monitor = FilterHealthMonitor::new(config());
        assert!(monitor.check_convergence(&mut filter));
    }

    #[test]
    fn wiggle_exits_early_if_already_converged_and_still_stops() {
        let (mut filter, filter_handle) = MockFilterService::new();
        filter_handle.push_converged(true);
        let (mut can, can_handle) = MockCanBus::new();

        let monitor = FilterHealthMonitor::new(config());
        assert!(monitor.imu_wiggle(&mut can, &mut filter));

        let last = can_handle.last_twist().unwrap();
        assert_eq!(last.angular, 0.0);
        assert_eq!(last.linear, 0.0);
    }

    #[test]
    fn wiggle_converges_on_second_attempt() {
        let (mut filter, filter_handle) = MockFilterService::new();
        filter_handle.push_converged(false); // initial check
        filter_handle.push_converged(false); // after attempt 1
        filter_handle.push_converged(true); // after attempt 2
        let (mut can, can_handle) = MockCanBus::new();

        let monitor = FilterHealthMonitor::new(config());
        assert!(monitor.imu_wiggle(&mut can, &mut filter));
        assert_eq!(can_handle.last_twist().unwrap().angular, 0.0);
    }

    #[test]
    fn wiggle_gives_up_after_max_attempts_but_still_stops() {
        let (mut filter, filter_handle) = MockFilterService::new();
        filter_handle.push_converged(false);
        let (mut can, can_handle) = MockCanBus::new();

        let monitor = FilterHealthMonitor::new(config());
        assert!(!monitor.imu_wiggle(&mut can, &mut filter));

        let last = can_handle.last_twist().unwrap();
        assert_eq!(last.angular, 0.0);
    }
}
