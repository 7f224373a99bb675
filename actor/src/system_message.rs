// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # System messages
//!
//! Control traffic between cells. System messages bypass the user queue, are processed as a
//! strict priority class and may be stashed while the receiving cell is suspended.
//!

use crate::{ActorRef, Error};

/// Lifecycle and supervision traffic exchanged between cells.
#[derive(Debug, Clone)]
pub enum SystemMessage {
    /// Instantiates the actor. Carries the initialization failure when creation must fail.
    Create {
        /// Failure to report instead of creating the actor.
        failure: Option<Error>,
    },
    /// Replaces a failed instance with a fresh one.
    Recreate {
        /// Failure that caused the restart.
        cause: Error,
    },
    /// Stops user message processing of the cell and its children.
    Suspend,
    /// Undoes one `Suspend`.
    Resume {
        /// Set when the resume answers a failure of this cell.
        caused_by_failure: Option<Error>,
    },
    /// Stops the actor.
    Terminate,
    /// Sent by a started child to its parent.
    Supervise {
        /// The child asking for supervision.
        child: ActorRef,
    },
    /// Registers `watcher` for the termination of `watchee`.
    Watch {
        /// Watched actor.
        watchee: ActorRef,
        /// Watching actor.
        watcher: ActorRef,
    },
    /// Removes a registration made by `Watch`.
    Unwatch {
        /// Watched actor.
        watchee: ActorRef,
        /// Watching actor.
        watcher: ActorRef,
    },
    /// Reports the failure of a child to its parent.
    Failed {
        /// The failed child.
        child: ActorRef,
        /// What went wrong.
        cause: Error,
        /// Incarnation of the child that failed.
        uid: u64,
    },
    /// Tells a watcher (or the parent) that an actor terminated.
    DeathWatchNotification {
        /// The terminated actor.
        actor: ActorRef,
        /// False if the actor did not exist when watched.
        existence_confirmed: bool,
        /// True if the hosting worker is gone.
        address_terminated: bool,
    },
    /// Placeholder that carries no transition.
    NoMessage,
}

impl SystemMessage {
    /// Must wait while the cell is suspended after its own failure.
    pub fn stash_when_failed(&self) -> bool {
        matches!(self, SystemMessage::Failed { .. })
    }

    /// Must wait while the cell is waiting for children to terminate.
    pub fn stash_when_waiting_for_children(&self) -> bool {
        matches!(
            self,
            SystemMessage::Failed { .. }
                | SystemMessage::Suspend
                | SystemMessage::Resume { .. }
                | SystemMessage::Recreate { .. }
        )
    }

    /// Short name used in logs and dead letters.
    pub fn kind(&self) -> &'static str {
        match self {
            SystemMessage::Create { .. } => "Create",
            SystemMessage::Recreate { .. } => "Recreate",
            SystemMessage::Suspend => "Suspend",
            SystemMessage::Resume { .. } => "Resume",
            SystemMessage::Terminate => "Terminate",
            SystemMessage::Supervise { .. } => "Supervise",
            SystemMessage::Watch { .. } => "Watch",
            SystemMessage::Unwatch { .. } => "Unwatch",
            SystemMessage::Failed { .. } => "Failed",
            SystemMessage::DeathWatchNotification { .. } => {
                "DeathWatchNotification"
            }
            SystemMessage::NoMessage => "NoMessage",
        }
    }
}

/// Restrictiveness of a cell with respect to system messages. Each state stashes a superset
/// of what the previous one stashes, so the ordering tells whether a transition relaxed the
/// cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SuspensionState {
    /// Nothing is stashed.
    Active,
    /// Stash-when-failed messages are stashed.
    Suspended,
    /// Stash-when-waiting messages are stashed.
    SuspendedWaitingForChildren,
}

impl SuspensionState {
    /// Whether `message` must be stashed in this state.
    pub fn should_stash(&self, message: &SystemMessage) -> bool {
        match self {
            SuspensionState::Active => false,
            SuspensionState::Suspended => message.stash_when_failed(),
            SuspensionState::SuspendedWaitingForChildren => {
                message.stash_when_waiting_for_children()
            }
        }
    }
}

#[cfg(test)]
mod tests {

    use super::*;

    #[test]
    fn test_stash_classification() {
        let failed = SystemMessage::Failed {
            child: ActorRef::nobody(),
            cause: Error::Functional("boom".to_owned()),
            uid: 1,
        };
        let resume = SystemMessage::Resume {
            caused_by_failure: None,
        };

        assert!(!SuspensionState::Active.should_stash(&failed));
        assert!(SuspensionState::Suspended.should_stash(&failed));
        assert!(!SuspensionState::Suspended.should_stash(&resume));
        assert!(
            SuspensionState::SuspendedWaitingForChildren.should_stash(&resume)
        );
        assert!(
            SuspensionState::SuspendedWaitingForChildren
                .should_stash(&SystemMessage::Suspend)
        );
        assert!(
            !SuspensionState::SuspendedWaitingForChildren
                .should_stash(&SystemMessage::Terminate)
        );
    }

    #[test]
    fn test_states_are_ordered_by_restrictiveness() {
        assert!(SuspensionState::Active < SuspensionState::Suspended);
        assert!(
            SuspensionState::Suspended
                < SuspensionState::SuspendedWaitingForChildren
        );
    }
}
