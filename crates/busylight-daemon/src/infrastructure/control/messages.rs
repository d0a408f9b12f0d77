//! JSON messages for the WebSocket control surface.
//!
//! Every message is a JSON object whose `"type"` field names the variant
//! (`#[serde(tag = "type")]`):
//!
//! ```json
//! {"type":"ListDevices"}
//! {"type":"RequestState","device":"desk","state":"warning","pattern":"blink"}
//! {"type":"Devices","ids":["desk","door"]}
//! ```

use serde::{Deserialize, Serialize};

use crate::application::scheduler::{ScheduleStatus, StateRequest};
use crate::application::service::{ServiceError, ServiceHandle};
use crate::application::session::DeviceInfo;

// ── Client → daemon ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ControlRequest {
    /// Logical ids of every managed device.
    ListDevices,

    /// Put a device into a named state.  Answered with `Accepted` as soon as
    /// the request is queued; invalid requests are logged by the daemon.
    RequestState {
        device: String,
        state: String,
        #[serde(default = "default_pattern")]
        pattern: String,
        /// Auto-off delay; `0` keeps the state until replaced.
        #[serde(default)]
        duration_ms: u64,
        #[serde(default = "default_audio")]
        audio: String,
    },

    /// Session snapshot for one device.
    Describe { device: String },

    /// Every active scheduled program.
    Schedules,
}

fn default_pattern() -> String {
    "steady".to_string()
}

fn default_audio() -> String {
    "audible".to_string()
}

// ── Daemon → client ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ControlReply {
    Devices { ids: Vec<String> },
    Accepted,
    /// `info` is `null` for an unknown device.
    Device { info: Option<DeviceInfo> },
    Schedules { schedules: Vec<ScheduleStatus> },
    Error { message: String },
}

impl ControlReply {
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }
}

impl ControlRequest {
    /// The scheduler request carried by a `RequestState` message.
    pub fn into_state_request(self) -> Option<StateRequest> {
        match self {
            Self::RequestState {
                device,
                state,
                pattern,
                duration_ms,
                audio,
            } => Some(
                StateRequest::new(device, state)
                    .with_pattern(pattern)
                    .with_duration_ms(duration_ms)
                    .with_audio(audio),
            ),
            _ => None,
        }
    }
}

/// Runs one request against the service and builds the reply.
pub async fn dispatch(request: ControlRequest, handle: &ServiceHandle) -> ControlReply {
    let result: Result<ControlReply, ServiceError> = match request {
        ControlRequest::ListDevices => handle
            .list_device_ids()
            .await
            .map(|ids| ControlReply::Devices { ids }),
        ControlRequest::Describe { device } => handle
            .describe(&device)
            .await
            .map(|info| ControlReply::Device { info }),
        ControlRequest::Schedules => handle
            .schedules()
            .await
            .map(|schedules| ControlReply::Schedules { schedules }),
        request @ ControlRequest::RequestState { .. } => match request.into_state_request() {
            Some(state) => handle.request_state(state).map(|()| ControlReply::Accepted),
            None => Ok(ControlReply::error("unsupported request")),
        },
    };
    result.unwrap_or_else(|e| ControlReply::error(e.to_string()))
}

// ── Tests ─────────────────────────────────────────────────────────────────────
