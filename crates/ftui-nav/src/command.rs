#![forbid(unsafe_code)]

//! Navigation requested from inside hooks and listeners.
//!
//! Hooks run while the navigator is mid-operation, so they cannot mutate
//! stacks directly. They enqueue commands instead; the navigator drains the
//! queue before the outermost public call returns, in FIFO order, and each
//! command runs through the normal interruption protocol.
//!
//! # Failure Modes
//!
//! - Draining more than `max_pending_commands` commands in one operation
//!   aborts with [`NavError::CommandOverflow`](crate::NavError::CommandOverflow)
//!   (a listener that pushes on every change would otherwise never settle).

use std::collections::VecDeque;
use std::fmt;

use crate::change::ChangeHandler;
use crate::controller::{ControllerId, RetainViewMode};
use crate::entry::NavigationEntry;
use crate::router::RouterId;

pub(crate) enum NavCommand {
    SetRoot {
        router: RouterId,
        entry: NavigationEntry,
    },
    Push {
        router: RouterId,
        entry: NavigationEntry,
    },
    ReplaceTop {
        router: RouterId,
        entry: NavigationEntry,
    },
    PopCurrent {
        router: RouterId,
    },
    Pop {
        router: RouterId,
        controller: ControllerId,
    },
    PopToTag {
        router: RouterId,
        tag: String,
    },
    PopToRoot {
        router: RouterId,
    },
    SetBackstack {
        router: RouterId,
        entries: Vec<NavigationEntry>,
        handler: Option<Box<dyn ChangeHandler>>,
    },
    Rebind {
        router: RouterId,
    },
    RetainMode {
        controller: ControllerId,
        mode: RetainViewMode,
    },
}

impl fmt::Debug for NavCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SetRoot { router, entry } => write!(f, "SetRoot({router}, {})", entry.controller()),
            Self::Push { router, entry } => write!(f, "Push({router}, {})", entry.controller()),
            Self::ReplaceTop { router, entry } => {
                write!(f, "ReplaceTop({router}, {})", entry.controller())
            }
            Self::PopCurrent { router } => write!(f, "PopCurrent({router})"),
            Self::Pop { router, controller } => write!(f, "Pop({router}, {controller})"),
            Self::PopToTag { router, tag } => write!(f, "PopToTag({router}, {tag})"),
            Self::PopToRoot { router } => write!(f, "PopToRoot({router})"),
            Self::SetBackstack { router, entries, .. } => {
                write!(f, "SetBackstack({router}, {} entries)", entries.len())
            }
            Self::Rebind { router } => write!(f, "Rebind({router})"),
            Self::RetainMode { controller, mode } => write!(f, "RetainMode({controller}, {mode:?})"),
        }
    }
}

/// FIFO of navigation commands issued during an operation.
#[derive(Debug, Default)]
pub struct CommandQueue {
    queue: VecDeque<NavCommand>,
}

impl CommandQueue {
    #[must_use]
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn set_root(&mut self, router: RouterId, entry: NavigationEntry) {
        self.queue.push_back(NavCommand::SetRoot { router, entry });
    }

    pub fn push_controller(&mut self, router: RouterId, entry: NavigationEntry) {
        self.queue.push_back(NavCommand::Push { router, entry });
    }

    pub fn replace_top_controller(&mut self, router: RouterId, entry: NavigationEntry) {
        self.queue.push_back(NavCommand::ReplaceTop { router, entry });
    }

    pub fn pop_current_controller(&mut self, router: RouterId) {
        self.queue.push_back(NavCommand::PopCurrent { router });
    }

    pub fn pop_controller(&mut self, router: RouterId, controller: ControllerId) {
        self.queue.push_back(NavCommand::Pop { router, controller });
    }

    pub fn pop_to_tag(&mut self, router: RouterId, tag: impl Into<String>) {
        self.queue.push_back(NavCommand::PopToTag {
            router,
            tag: tag.into(),
        });
    }

    pub fn pop_to_root(&mut self, router: RouterId) {
        self.queue.push_back(NavCommand::PopToRoot { router });
    }

    pub fn set_backstack(
        &mut self,
        router: RouterId,
        entries: Vec<NavigationEntry>,
        handler: Option<Box<dyn ChangeHandler>>,
    ) {
        self.queue.push_back(NavCommand::SetBackstack {
            router,
            entries,
            handler,
        });
    }

    pub fn rebind_if_needed(&mut self, router: RouterId) {
        self.queue.push_back(NavCommand::Rebind { router });
    }

    pub(crate) fn enqueue(&mut self, command: NavCommand) {
        self.queue.push_back(command);
    }

    pub(crate) fn next(&mut self) -> Option<NavCommand> {
        self.queue.pop_front()
    }

    pub(crate) fn clear(&mut self) {
        self.queue.clear();
    }
}
