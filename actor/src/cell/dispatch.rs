// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! Message dispatch: scheduler turns, the system message priority class with its stash, and
//! delivery of user messages.

use super::{ActorCell, panic_message};
use crate::{
    Error,
    dead_letter::DeadLetterReason,
    message::{ActorIdentity, Envelope, Identify, Kill, PoisonPill, Terminated},
    system_message::{SuspensionState, SystemMessage},
};

use futures::FutureExt;

use tracing::{debug, error};

use std::{collections::VecDeque, panic::AssertUnwindSafe, sync::Arc};

impl ActorCell {
    /// One scheduler turn: system messages, at most one user message, system messages.
    pub(crate) async fn run_turn(self: &Arc<Self>) {
        self.process_all_system_messages().await;
        let envelope = self.mailbox().dequeue();
        if let Some(envelope) = envelope {
            self.invoke(envelope).await;
            self.process_all_system_messages().await;
        }
    }

    async fn process_all_system_messages(self: &Arc<Self>) {
        loop {
            let batch = self.mailbox().drain_system();
            if batch.is_empty() || self.is_terminated() {
                break;
            }
            self.invoke_all(batch).await;
        }
    }

    fn suspension_state(&self) -> SuspensionState {
        if self.state().children.is_waiting_for_children() {
            SuspensionState::SuspendedWaitingForChildren
        } else if self.mailbox().is_suspended() {
            SuspensionState::Suspended
        } else {
            SuspensionState::Active
        }
    }

    /// Processes a batch of system messages.
    ///
    /// Each message is checked against the state of the cell at that point. Messages the
    /// state does not admit are stashed. When a message leaves the cell in a less
    /// restrictive state, the stash is put back in front of the rest of the batch in
    /// arrival order. Once the cell terminated, the rest of the batch is dead.
    async fn invoke_all(self: &Arc<Self>, mut todo: VecDeque<SystemMessage>) {
        let mut current = self.suspension_state();
        while let Some(message) = todo.pop_front() {
            if current.should_stash(&message) {
                debug!(
                    "Actor {} stashes {} while {:?}.",
                    self.path,
                    message.kind(),
                    current
                );
                self.state().stash.push_back(message);
            } else {
                self.system_invoke(message).await;
            }

            if self.is_terminated() {
                let stashed: Vec<SystemMessage> =
                    self.state().stash.drain(..).collect();
                for message in stashed.into_iter().chain(todo.drain(..)) {
                    self.system.dead_letter_channel().system_message(
                        message,
                        &self.path,
                        DeadLetterReason::Terminated,
                    );
                }
                return;
            }

            let next = self.suspension_state();
            if next < current {
                let stashed: Vec<SystemMessage> =
                    self.state().stash.drain(..).collect();
                for message in stashed.into_iter().rev() {
                    todo.push_front(message);
                }
            }
            current = next;
        }
    }

    async fn system_invoke(self: &Arc<Self>, message: SystemMessage) {
        let result = match message {
            SystemMessage::Failed { child, cause, uid } => {
                self.handle_failure(child, cause, uid);
                Ok(())
            }
            SystemMessage::DeathWatchNotification {
                actor,
                existence_confirmed,
                address_terminated,
            } => {
                self.watched_actor_terminated(
                    actor,
                    existence_confirmed,
                    address_terminated,
                )
                .await
            }
            SystemMessage::Create { failure } => self.create(failure).await,
            SystemMessage::Watch { watchee, watcher } => {
                self.add_watcher(watchee, watcher);
                Ok(())
            }
            SystemMessage::Unwatch { watchee, watcher } => {
                self.remove_watcher(watchee, watcher);
                Ok(())
            }
            SystemMessage::Recreate { cause } => {
                self.fault_recreate(cause).await;
                Ok(())
            }
            SystemMessage::Suspend => {
                self.fault_suspend();
                Ok(())
            }
            SystemMessage::Resume { caused_by_failure } => {
                self.fault_resume(caused_by_failure).await;
                Ok(())
            }
            SystemMessage::Terminate => {
                self.terminate().await;
                Ok(())
            }
            SystemMessage::Supervise { child } => {
                self.supervise(child);
                Ok(())
            }
            SystemMessage::NoMessage => Ok(()),
        };
        if let Err(error) = result {
            self.handle_invoke_failure(error, None);
        }
    }

    /// Delivers one user message. `PoisonPill`, `Kill` and `Identify` are handled here,
    /// `Terminated` only reaches the actor while the watch is still registered.
    async fn invoke(self: &Arc<Self>, envelope: Envelope) {
        if envelope.message.is::<PoisonPill>() {
            debug!("Actor {} received a poison pill.", self.path);
            self.send_system_message(SystemMessage::Terminate);
            return;
        }
        if envelope.message.is::<Kill>() {
            self.handle_invoke_failure(Error::ActorKilled(self.path.clone()), None);
            return;
        }
        if let Some(Identify(correlation)) = envelope.message.downcast_ref::<Identify>() {
            if let Some(sender) = &envelope.sender {
                sender.tell(
                    ActorIdentity {
                        correlation: *correlation,
                        subject: Some(self.self_ref()),
                    },
                    Some(self.self_ref()),
                );
            }
            return;
        }
        if let Some(terminated) = envelope.message.downcast_ref::<Terminated>() {
            let queued = {
                let mut state = self.state();
                let before = state.terminated_queued.len();
                let actor = terminated.actor.path();
                state.terminated_queued.retain(|path| !path.same_actor(actor));
                before != state.terminated_queued.len()
            };
            if !queued {
                debug!(
                    "Actor {} dropped Terminated({}) after unwatch.",
                    self.path,
                    terminated.actor.path()
                );
                return;
            }
        }

        self.cancel_receive_timeout();
        let Some(mut incarnation) = self.take_incarnation() else {
            self.system
                .dead_letter_channel()
                .envelope(&envelope, DeadLetterReason::NotInitialized);
            return;
        };
        let result = AssertUnwindSafe(incarnation.receive(&envelope))
            .catch_unwind()
            .await;
        self.put_incarnation(incarnation);

        let failure = match result {
            Ok(Ok(())) => None,
            Ok(Err(error)) => Some(error),
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                error!("Actor {} panicked: {}", self.path, message);
                Some(Error::Panicked(message))
            }
        };
        if let Some(failure) = failure {
            self.state().failed_message = Some(envelope.message);
            self.handle_invoke_failure(failure, None);
        }
        self.check_receive_timeout();
    }
}
