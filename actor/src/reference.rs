// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Actor references
//!
//! An [`ActorRef`] is the only way to talk to an actor. Local references hold the cell
//! directly, remote references hold a globalized path and go through the router, and
//! `Nobody` stands for a path that did not resolve. Every variant accepts `tell` and none of
//! them ever reports a delivery failure to the caller.
//!

use crate::{
    ActorPath, Error,
    cell::{ActorCell, Lifecycle},
    dead_letter::{DeadLetterReason, DeadLetters},
    mailbox::MailboxStatus,
    message::{AnyMessage, Envelope},
    system::SystemRef,
    system_message::SystemMessage,
};

use tracing::warn;

use std::{
    any::Any,
    fmt::{Debug, Formatter},
    hash::{Hash, Hasher},
    sync::Arc,
};

/// Handle to an actor, wherever it lives.
#[derive(Clone)]
pub enum ActorRef {
    /// Actor hosted by this worker.
    Local(LocalActorRef),
    /// Actor hosted by another worker.
    Remote(RemoteActorRef),
    /// Nothing lives at the path. Everything sent here is a dead letter.
    Nobody(NobodyRef),
}

impl ActorRef {
    /// Placeholder reference not bound to any worker.
    pub fn nobody() -> Self {
        ActorRef::Nobody(NobodyRef {
            path: ActorPath::from("/deadLetters"),
            dead_letters: None,
        })
    }

    /// Sends a message, fire-and-forget.
    ///
    /// # Arguments
    ///
    /// * `message` - Any `Send + Sync` value. An [`AnyMessage`] is passed through unchanged.
    /// * `sender` - Reference the recipient sees as sender, `None` outside of actors.
    ///
    /// A message for another worker must be of a type registered in the codec; string
    /// literals arrive there as `String`. Anything else ends up in the dead letters.
    ///
    pub fn tell<M>(&self, message: M, sender: Option<ActorRef>)
    where
        M: Any + Send + Sync,
    {
        let message = AnyMessage::new(message);
        match self {
            ActorRef::Local(local) => local.tell(message, sender),
            ActorRef::Remote(remote) => remote.tell(message, sender),
            ActorRef::Nobody(nobody) => nobody.tell(message, sender),
        }
    }

    /// Path of the referenced actor.
    pub fn path(&self) -> &ActorPath {
        match self {
            ActorRef::Local(local) => local.path(),
            ActorRef::Remote(remote) => &remote.path,
            ActorRef::Nobody(nobody) => &nobody.path,
        }
    }

    /// Reference to the parent.
    pub fn parent(&self) -> ActorRef {
        match self {
            ActorRef::Local(local) => local.parent(),
            ActorRef::Remote(remote) => ActorRef::Remote(RemoteActorRef {
                path: remote.path.parent(),
                system: remote.system.clone(),
            }),
            ActorRef::Nobody(nobody) => ActorRef::Nobody(NobodyRef {
                path: nobody.path.parent(),
                dead_letters: nobody.dead_letters.clone(),
            }),
        }
    }

    /// Reference to a descendant, one name per level.
    pub fn child(&self, names: &[&str]) -> ActorRef {
        match self {
            ActorRef::Local(local) => local.child(names),
            ActorRef::Remote(remote) => {
                let path = names
                    .iter()
                    .fold(remote.path.without_uid(), |path, name| {
                        path.child(name)
                    });
                ActorRef::Remote(RemoteActorRef {
                    path,
                    system: remote.system.clone(),
                })
            }
            ActorRef::Nobody(nobody) => {
                let path = names
                    .iter()
                    .fold(nobody.path.without_uid(), |path, name| {
                        path.child(name)
                    });
                ActorRef::Nobody(NobodyRef {
                    path,
                    dead_letters: nobody.dead_letters.clone(),
                })
            }
        }
    }

    /// The local variant, if any.
    pub fn as_local(&self) -> Option<&LocalActorRef> {
        match self {
            ActorRef::Local(local) => Some(local),
            _ => None,
        }
    }

    /// True for actors hosted by this worker.
    pub fn is_local(&self) -> bool {
        matches!(self, ActorRef::Local(_))
    }

    /// True for actors hosted by another worker.
    pub fn is_remote(&self) -> bool {
        matches!(self, ActorRef::Remote(_))
    }

    /// True for unresolvable references.
    pub fn is_nobody(&self) -> bool {
        matches!(self, ActorRef::Nobody(_))
    }

    /// True if the referenced actor is known to be gone.
    pub fn is_terminated(&self) -> bool {
        match self {
            ActorRef::Local(local) => local.is_terminated(),
            ActorRef::Remote(_) => false,
            ActorRef::Nobody(_) => true,
        }
    }

    pub(crate) fn send_system_message(&self, message: SystemMessage) {
        match self {
            ActorRef::Local(local) => local.send_system_message(message),
            ActorRef::Remote(remote) => remote.send_system_message(message),
            ActorRef::Nobody(nobody) => nobody.send_system_message(message),
        }
    }
}

impl PartialEq for ActorRef {
    fn eq(&self, other: &Self) -> bool {
        self.path() == other.path()
    }
}

impl Eq for ActorRef {}

impl Hash for ActorRef {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.path().hash(state);
    }
}

impl Debug for ActorRef {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ActorRef::Local(_) => write!(f, "Local({})", self.path()),
            ActorRef::Remote(_) => write!(f, "Remote({})", self.path()),
            ActorRef::Nobody(_) => write!(f, "Nobody({})", self.path()),
        }
    }
}

impl From<LocalActorRef> for ActorRef {
    fn from(local: LocalActorRef) -> Self {
        ActorRef::Local(local)
    }
}

/// Direct handle to a cell of this worker.
#[derive(Clone)]
pub struct LocalActorRef {
    cell: Arc<ActorCell>,
}

impl LocalActorRef {
    pub(crate) fn new(cell: Arc<ActorCell>) -> Self {
        Self { cell }
    }

    pub(crate) fn cell(&self) -> &Arc<ActorCell> {
        &self.cell
    }

    /// Path of the actor, including the uid of this incarnation.
    pub fn path(&self) -> &ActorPath {
        self.cell.path()
    }

    /// Enqueues a message, or turns it into a dead letter if the actor is gone.
    pub fn tell(&self, message: AnyMessage, sender: Option<ActorRef>) {
        let envelope = Envelope::new(message, sender, self.path().clone());
        self.cell.send_message(envelope);
    }

    /// Reference to the parent. The root guardian is its own parent.
    pub fn parent(&self) -> ActorRef {
        match self.cell.parent() {
            Some(parent) => parent.clone(),
            None => ActorRef::Local(self.clone()),
        }
    }

    /// Walks the children containers. Absent children yield `Nobody`.
    pub fn child(&self, names: &[&str]) -> ActorRef {
        let mut current = self.clone();
        for name in names {
            match current.cell.child_ref(name) {
                Some(child) => current = child,
                None => {
                    let path = names
                        .iter()
                        .fold(self.path().without_uid(), |path, name| {
                            path.child(name)
                        });
                    return ActorRef::Nobody(NobodyRef {
                        path,
                        dead_letters: Some(
                            self.cell.system().dead_letter_channel().clone(),
                        ),
                    });
                }
            }
        }
        ActorRef::Local(current)
    }

    /// Attaches the cell to the dispatcher and enqueues its creation. Idempotent.
    pub fn start(&self) {
        self.cell.start();
    }

    /// Suspends user message processing of the actor and its children.
    pub fn suspend(&self) {
        self.send_system_message(SystemMessage::Suspend);
    }

    /// Undoes one suspension. `cause` is set when answering a failure of the actor.
    pub fn resume(&self, cause: Option<Error>) {
        self.send_system_message(SystemMessage::Resume {
            caused_by_failure: cause,
        });
    }

    /// Replaces the instance of a failed actor with a fresh one.
    pub fn restart(&self, cause: Error) {
        self.send_system_message(SystemMessage::Recreate { cause });
    }

    /// Stops the actor and its children. Irreversible.
    pub fn stop(&self) {
        self.send_system_message(SystemMessage::Terminate);
    }

    /// Lifecycle state of the cell.
    pub fn lifecycle(&self) -> Lifecycle {
        self.cell.lifecycle()
    }

    /// True once the cell terminated.
    pub fn is_terminated(&self) -> bool {
        self.cell.is_terminated()
    }

    /// Number of user messages waiting in the mailbox.
    pub fn pending_messages(&self) -> usize {
        self.cell.number_of_messages()
    }

    /// Status word of the mailbox.
    pub fn mailbox_status(&self) -> MailboxStatus {
        self.cell.mailbox_status()
    }

    pub(crate) fn send_system_message(&self, message: SystemMessage) {
        self.cell.send_system_message(message);
    }
}

impl Debug for LocalActorRef {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "LocalActorRef({})", self.path())
    }
}

/// Handle to an actor of another worker.
#[derive(Clone)]
pub struct RemoteActorRef {
    path: ActorPath,
    system: SystemRef,
}

impl RemoteActorRef {
    pub(crate) fn new(path: ActorPath, system: SystemRef) -> Self {
        Self { path, system }
    }

    /// Globalized path of the actor.
    pub fn path(&self) -> &ActorPath {
        &self.path
    }

    /// Hands the message to the router.
    pub fn tell(&self, message: AnyMessage, sender: Option<ActorRef>) {
        self.system.router().send_tell(
            &self.system,
            &self.path,
            message,
            sender,
        );
    }

    pub(crate) fn send_system_message(&self, message: SystemMessage) {
        match message {
            SystemMessage::Watch { .. }
            | SystemMessage::Unwatch { .. }
            | SystemMessage::DeathWatchNotification { .. } => {
                self.system.router().send_system(
                    &self.system,
                    &self.path,
                    message,
                );
            }
            other => {
                warn!(
                    "System message {} cannot be sent to remote actor {}.",
                    other.kind(),
                    self.path
                );
                self.system.dead_letter_channel().system_message(
                    other,
                    &self.path,
                    DeadLetterReason::Unsupported,
                );
            }
        }
    }
}

/// Reference to a path nothing lives at.
#[derive(Clone)]
pub struct NobodyRef {
    path: ActorPath,
    dead_letters: Option<DeadLetters>,
}

impl NobodyRef {
    pub(crate) fn new(path: ActorPath, dead_letters: DeadLetters) -> Self {
        Self {
            path,
            dead_letters: Some(dead_letters),
        }
    }

    /// The unresolved path.
    pub fn path(&self) -> &ActorPath {
        &self.path
    }

    fn tell(&self, message: AnyMessage, sender: Option<ActorRef>) {
        if let Some(dead_letters) = &self.dead_letters {
            let envelope = Envelope::new(message, sender, self.path.clone());
            dead_letters.envelope(&envelope, DeadLetterReason::NoSuchActor);
        }
    }

    fn send_system_message(&self, message: SystemMessage) {
        if let Some(dead_letters) = &self.dead_letters {
            dead_letters.system_message(
                message,
                &self.path,
                DeadLetterReason::NoSuchActor,
            );
        }
    }
}

#[cfg(test)]
mod tests {

    use super::*;

    #[test]
    fn test_nobody_is_inert() {
        let nobody = ActorRef::nobody();
        nobody.tell(1u32, None);
        nobody.send_system_message(SystemMessage::Terminate);
        assert!(nobody.is_nobody());
        assert!(nobody.is_terminated());
        assert_eq!(nobody.path(), &ActorPath::from("/deadLetters"));
    }

    #[test]
    fn test_nobody_paths() {
        let nobody = ActorRef::nobody();
        let child = nobody.child(&["a", "b"]);
        assert_eq!(child.path(), &ActorPath::from("/deadLetters/a/b"));
        assert_eq!(child.parent().path(), &ActorPath::from("/deadLetters/a"));
        assert_eq!(child, ActorRef::nobody().child(&["a", "b"]));
    }
}
