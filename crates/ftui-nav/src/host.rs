#![forbid(unsafe_code)]

//! Host window phases and requests routed back to the host.

use serde_json::Value;

use crate::controller::ControllerId;

/// Lifecycle phase of the host window owning the root containers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HostPhase {
    #[default]
    Uncreated,
    Created,
    Started,
    Resumed,
    Paused,
    Stopped,
    Destroyed,
}

impl HostPhase {
    /// Whether controllers can reach a host context.
    #[must_use]
    pub fn is_context_available(self) -> bool {
        !matches!(self, Self::Uncreated | Self::Destroyed)
    }

    /// Whether views may report attached.
    #[must_use]
    pub fn is_started(self) -> bool {
        matches!(self, Self::Started | Self::Resumed | Self::Paused)
    }
}

/// Work a controller asked the host to perform.
///
/// Requests issued before the controller is on a router are held and
/// released once it gets one. The host drains them with
/// [`Navigator::drain_host_requests`](crate::Navigator::drain_host_requests).
#[derive(Debug, Clone, PartialEq)]
pub enum HostRequest {
    RequestPermissions {
        controller: ControllerId,
        permissions: Vec<String>,
        request_code: i32,
    },
    StartForResult {
        controller: ControllerId,
        intent: Value,
        request_code: i32,
    },
}

impl HostRequest {
    #[must_use]
    pub fn controller(&self) -> &ControllerId {
        match self {
            Self::RequestPermissions { controller, .. } | Self::StartForResult { controller, .. } => {
                controller
            }
        }
    }
}
