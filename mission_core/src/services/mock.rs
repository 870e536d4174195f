//! # In-memory mock services
//!
//! Fakes of the external service traits used by unit and scenario tests, playing the
//! same role the teacher's `sim_client.rs` plays for `rov_exec`: a stand-in service for
//! development and testing rather than a live socket. Each mock is paired with a
//! `Handle` the test keeps to drive its behaviour (queue a filter reading, push a
//! terminal follower event, inspect sent twists) without touching the mock the
//! component under test actually owns.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use super::{CanBus, Camera, FilterService, FollowerService, ServiceError};
use chrono::Utc;
use comms_if::wire::{CanMessage, ControlToolsCmd, FilterStateMsg, FollowerAck, FollowerState, SetTrackRequest, Twist2d};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

// ---------------------------------------------------------------------------
// FILTER
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct MockFilterHandle {
    readings: Arc<Mutex<VecDeque<FilterStateMsg>>>,
}

impl MockFilterHandle {
    /// Queue a reading to be returned by the next `get_state` call. Once the queue is
    /// empty, the most recently queued reading repeats.
    pub fn push_converged(&self, converged: bool) {
        let mut readings = self.readings.lock().unwrap();
        readings.push_back(FilterStateMsg {
            timestamp: Utc::now(),
            position_enu: [0.0; 3],
            orientation_enu: [0.0, 0.0, 0.0, 1.0],
            position_covariance_trace: if converged { 0.01 } else { 10.0 },
            converged,
        });
    }
}

pub struct MockFilterService {
    readings: Arc<Mutex<VecDeque<FilterStateMsg>>>,
    last: FilterStateMsg,
}

impl MockFilterService {
    pub fn new() -> (Self, MockFilterHandle) {
        let readings = Arc::new(Mutex::new(VecDeque::new()));
        let last = FilterStateMsg {
            timestamp: Utc::now(),
            position_enu: [0.0; 3],
            orientation_enu: [0.0, 0.0, 0.0, 1.0],
            position_covariance_trace: 10.0,
            converged: false,
        };
        (
            Self {
                readings: readings.clone(),
                last,
            },
            MockFilterHandle { readings },
        )
    }
}

impl FilterService for MockFilterService {
    fn get_state(&mut self) -> Result<FilterStateMsg, ServiceError> {
        let mut readings = self.readings.lock().unwrap();
        if let Some(next) = readings.pop_front() {
            self.last = next;
        }
        Ok(self.last)
    }
}

// ---------------------------------------------------------------------------
// FOLLOWER
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct MockFollowerHandle {
    events: Arc<Mutex<VecDeque<FollowerState>>>,
    set_track_calls: Arc<Mutex<u32>>,
    cancel_calls: Arc<Mutex<u32>>,
}

impl MockFollowerHandle {
    pub fn push_state(&self, state: FollowerState) {
        self.events.lock().unwrap().push_back(state);
    }

    pub fn set_track_call_count(&self) -> u32 {
        *self.set_track_calls.lock().unwrap()
    }

    pub fn cancel_call_count(&self) -> u32 {
        *self.cancel_calls.lock().unwrap()
    }
}

pub struct MockFollowerService {
    events: Arc<Mutex<VecDeque<FollowerState>>>,
    set_track_calls: Arc<Mutex<u32>>,
    cancel_calls: Arc<Mutex<u32>>,
    /// How long `recv_state` blocks before reporting "nothing yet" when the event
    /// queue is empty, so the monitor thread doesn't busy-spin.
    poll_interval: Duration,
}

impl MockFollowerService {
    pub fn new() -> (Self, MockFollowerHandle) {
        let events = Arc::new(Mutex::new(VecDeque::new()));
        let set_track_calls = Arc::new(Mutex::new(0));
        let cancel_calls = Arc::new(Mutex::new(0));

        (
            Self {
                events: events.clone(),
                set_track_calls: set_track_calls.clone(),
                cancel_calls: cancel_calls.clone(),
                poll_interval: Duration::from_millis(10),
            },
            MockFollowerHandle {
                events,
                set_track_calls,
                cancel_calls,
            },
        )
    }
}

impl FollowerService for MockFollowerService {
    fn set_track(&mut self, _request: SetTrackRequest) -> Result<FollowerAck, ServiceError> {
        *self.set_track_calls.lock().unwrap() += 1;
        Ok(FollowerAck::Accepted)
    }

    fn start(&mut self) -> Result<(), ServiceError> {
        Ok(())
    }

    fn cancel(&mut self) -> Result<(), ServiceError> {
        *self.cancel_calls.lock().unwrap() += 1;
        Ok(())
    }

    fn recv_state(&mut self) -> Result<Option<FollowerState>, ServiceError> {
        if let Some(state) = self.events.lock().unwrap().pop_front() {
            return Ok(Some(state));
        }
        std::thread::sleep(self.poll_interval);
        Ok(None)
    }
}

// ---------------------------------------------------------------------------
// CAN BUS
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct MockCanBusHandle {
    twists: Arc<Mutex<Vec<Twist2d>>>,
}

impl MockCanBusHandle {
    pub fn twists(&self) -> Vec<Twist2d> {
        self.twists.lock().unwrap().clone()
    }

    pub fn last_twist(&self) -> Option<Twist2d> {
        self.twists.lock().unwrap().last().copied()
    }
}

pub struct MockCanBus {
    twists: Arc<Mutex<Vec<Twist2d>>>,
}

impl MockCanBus {
    pub fn new() -> (Self, MockCanBusHandle) {
        let twists = Arc::new(Mutex::new(Vec::new()));
        (Self { twists: twists.clone() }, MockCanBusHandle { twists })
    }
}

impl CanBus for MockCanBus {
    fn send_twist(&mut self, twist: Twist2d) -> Result<(), ServiceError> {
        self.twists.lock().unwrap().push(twist);
        Ok(())
    }

    fn send_can(&mut self, _message: CanMessage) -> Result<(), ServiceError> {
        Ok(())
    }

    fn control_tools(&mut self, _command: ControlToolsCmd) -> Result<(), ServiceError> {
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// CAMERA
// ---------------------------------------------------------------------------

pub struct MockCamera;

impl Camera for MockCamera {
    fn recv_frame(&mut self) -> Result<Vec<u8>, ServiceError> {
        Ok(Vec::new())
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn filter_mock_repeats_last_reading_once_queue_drains() {
        let (mut filter, handle) = MockFilterService::new();
        handle.push_converged(true);

        assert!(filter.get_state().unwrap().converged);
        assert!(filter.get_state().unwrap().converged);
    }

    #[test]
    fn can_bus_mock_records_twists_in_order() {
        let (mut can, handle) = MockCanBus::new();
        can.send_twist(Twist2d { linear: 0.0, angular: 0.3 }).unwrap();
        can.send_twist(Twist2d { linear: 0.0, angular: 0.0 }).unwrap();

        assert_eq!(handle.twists().len(), 2);
        assert_eq!(handle.last_twist().unwrap().angular, 0.0);
    }
}
