//! # ZeroMQ-backed service adapters
//!
//! Concrete implementations of the service traits over `comms_if::net::MonitoredSocket`
//! REQ sockets, grounded on the teacher's `mech_client::MechClient` (request-reply,
//! `connected()` gate, JSON serialisation over the wire, `RCVTIMEO`/`SNDTIMEO` as the
//! "await a reply or a timeout" idiom). Gated behind the `zmq-transport` feature.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use super::{CanBus, FilterService, FollowerService, ServiceError};
use comms_if::net::{zmq, MonitoredSocket, MonitoredSocketError, SocketOptions};
use comms_if::wire::{CanMessage, ControlToolsCmd, FilterStateMsg, FollowerAck, FollowerState, SetTrackRequest, Twist2d};
use thiserror::Error;

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ZmqServiceError {
    #[error("could not create socket: {0}")]
    Socket(#[from] MonitoredSocketError),

    #[error("not connected to the service")]
    NotConnected,

    #[error("send error: {0}")]
    Send(zmq::Error),

    #[error("receive error: {0}")]
    Recv(zmq::Error),

    #[error("serialisation error: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl ZmqServiceError {
    fn into_service_error(self, service: &'static str) -> ServiceError {
        match self {
            ZmqServiceError::Recv(e) if e == zmq::Error::EAGAIN => ServiceError::Timeout { service },
            other => ServiceError::Unavailable {
                service,
                reason: other.to_string(),
            },
        }
    }
}

// ---------------------------------------------------------------------------
// REQUEST/REPLY HELPER
// ---------------------------------------------------------------------------

fn request_reply<Req: serde::Serialize, Resp: serde::de::DeserializeOwned>(
    socket: &mut MonitoredSocket,
    request: &Req,
) -> Result<Resp, ZmqServiceError> {
    if !socket.connected() {
        return Err(ZmqServiceError::NotConnected);
    }

    let payload = serde_json::to_string(request)?;
    socket.send(&payload, 0).map_err(ZmqServiceError::Send)?;

    let msg = socket.recv_msg(0).map_err(ZmqServiceError::Recv)?;
    let text = msg.as_str().unwrap_or("");
    Ok(serde_json::from_str(text)?)
}

// ---------------------------------------------------------------------------
// FILTER
// ---------------------------------------------------------------------------

pub struct ZmqFilterService {
    socket: MonitoredSocket,
}

impl ZmqFilterService {
    pub fn new(ctx: &zmq::Context, endpoint: &str, options: SocketOptions) -> Result<Self, ZmqServiceError> {
        Ok(Self {
            socket: MonitoredSocket::new(ctx, zmq::REQ, options, endpoint)?,
        })
    }
}

impl FilterService for ZmqFilterService {
    fn get_state(&mut self) -> Result<FilterStateMsg, ServiceError> {
        request_reply(&mut self.socket, &"get_state")
            .map_err(|e| e.into_service_error("filter"))
    }
}

// ---------------------------------------------------------------------------
// FOLLOWER
// ---------------------------------------------------------------------------

pub struct ZmqFollowerService {
    control_socket: MonitoredSocket,
    state_socket: MonitoredSocket,
}

impl ZmqFollowerService {
    pub fn new(
        ctx: &zmq::Context,
        control_endpoint: &str,
        control_options: SocketOptions,
        state_endpoint: &str,
        state_options: SocketOptions,
    ) -> Result<Self, ZmqServiceError> {
        Ok(Self {
            control_socket: MonitoredSocket::new(ctx, zmq::REQ, control_options, control_endpoint)?,
            state_socket: MonitoredSocket::new(ctx, zmq::REQ, state_options, state_endpoint)?,
        })
    }
}

impl FollowerService for ZmqFollowerService {
    fn set_track(&mut self, request: SetTrackRequest) -> Result<FollowerAck, ServiceError> {
        request_reply(&mut self.control_socket, &request)
            .map_err(|e| e.into_service_error("follower"))
    }

    fn start(&mut self) -> Result<(), ServiceError> {
        let _: FollowerAck = request_reply(&mut self.control_socket, &"start")
            .map_err(|e| e.into_service_error("follower"))?;
        Ok(())
    }

    fn cancel(&mut self) -> Result<(), ServiceError> {
        match request_reply::<_, FollowerAck>(&mut self.control_socket, &"cancel") {
            Ok(_) => Ok(()),
            Err(e) => {
                log::warn!("error cancelling track, swallowing: {}", e);
                Ok(())
            }
        }
    }

    fn recv_state(&mut self) -> Result<Option<FollowerState>, ServiceError> {
        match request_reply(&mut self.state_socket, &"get_state") {
            Ok(state) => Ok(Some(state)),
            Err(ZmqServiceError::Recv(e)) if e == zmq::Error::EAGAIN => Ok(None),
            Err(e) => Err(e.into_service_error("follower")),
        }
    }
}

// ---------------------------------------------------------------------------
// CAN BUS
// ---------------------------------------------------------------------------

pub struct ZmqCanBus {
    socket: MonitoredSocket,
}

impl ZmqCanBus {
    pub fn new(ctx: &zmq::Context, endpoint: &str, options: SocketOptions) -> Result<Self, ZmqServiceError> {
        Ok(Self {
            socket: MonitoredSocket::new(ctx, zmq::REQ, options, endpoint)?,
        })
    }
}

impl CanBus for ZmqCanBus {
    fn send_twist(&mut self, twist: Twist2d) -> Result<(), ServiceError> {
        request_reply::<_, FollowerAck>(&mut self.socket, &twist)
            .map(|_| ())
            .map_err(|e| e.into_service_error("canbus"))
    }

    fn send_can(&mut self, message: CanMessage) -> Result<(), ServiceError> {
        request_reply::<_, FollowerAck>(&mut self.socket, &message)
            .map(|_| ())
            .map_err(|e| e.into_service_error("canbus"))
    }

    fn control_tools(&mut self, command: ControlToolsCmd) -> Result<(), ServiceError> {
        request_reply::<_, FollowerAck>(&mut self.socket, &command)
            .map(|_| ())
            .map_err(|e| e.into_service_error("canbus"))
    }
}
