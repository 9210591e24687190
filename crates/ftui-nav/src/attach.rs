#![forbid(unsafe_code)]

//! Attach/detach detection for a controller's view.
//!
//! A view counts as attached only while it is in a window *and* the host is
//! started. The tracker turns raw observations (window membership changes,
//! host start/stop) into at most one signal each, so a controller never sees
//! two attaches or two detaches in a row.
//!
//! ```text
//!                 view in window + host started
//!   ViewDetached ───────────────────────────────▶ Attached
//!        ▲  ▲                                     │    │
//!        │  └──────── view left window ───────────┘    │ host stopped
//!        │                                             ▼
//!        └──── view left window (DetachedAfterStop) ── HostStopped
//! ```
//!
//! # Invariants
//!
//! - `Attached` is reported only from a non-attached state.
//! - A window detach following a host stop reports `DetachedAfterStop`
//!   instead of a second plain detach.

/// Last state reported to the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReportedState {
    #[default]
    ViewDetached,
    HostStopped,
    Attached,
}

/// Signal produced by the tracker for the owning controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachSignal {
    Attached,
    Detached { from_host_stop: bool },
    /// The view left its window after the host had already stopped.
    DetachedAfterStop,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct AttachTracker {
    in_window: bool,
    host_stopped: bool,
    reported: ReportedState,
}

impl AttachTracker {
    #[must_use]
    pub fn new(host_started: bool) -> Self {
        Self {
            in_window: false,
            host_stopped: !host_started,
            reported: ReportedState::ViewDetached,
        }
    }

    #[must_use]
    pub fn in_window(&self) -> bool {
        self.in_window
    }

    #[must_use]
    pub fn reported(&self) -> ReportedState {
        self.reported
    }

    pub fn view_attached(&mut self) -> Option<AttachSignal> {
        if self.in_window {
            return None;
        }
        self.in_window = true;
        self.report_attached()
    }

    pub fn view_detached(&mut self) -> Option<AttachSignal> {
        if !self.in_window {
            return None;
        }
        self.in_window = false;
        Some(self.report_detached(false))
    }

    pub fn host_started(&mut self) -> Option<AttachSignal> {
        self.host_stopped = false;
        self.report_attached()
    }

    pub fn host_stopped(&mut self) -> Option<AttachSignal> {
        self.host_stopped = true;
        Some(self.report_detached(true))
    }

    fn report_attached(&mut self) -> Option<AttachSignal> {
        if self.in_window && !self.host_stopped && self.reported != ReportedState::Attached {
            self.reported = ReportedState::Attached;
            Some(AttachSignal::Attached)
        } else {
            None
        }
    }

    fn report_detached(&mut self, for_host: bool) -> AttachSignal {
        let was_stopped = self.reported == ReportedState::HostStopped;
        self.reported = if for_host {
            ReportedState::HostStopped
        } else {
            ReportedState::ViewDetached
        };
        if was_stopped && !for_host {
            AttachSignal::DetachedAfterStop
        } else {
            AttachSignal::Detached {
                from_host_stop: for_host,
            }
        }
    }
}
