// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! Failure handling and lifecycle transitions.

use super::{ActorCell, FailedState, panic_message};
use crate::{
    ActorPath, ActorRef, Error,
    children::SuspendReason,
    supervision::{Directive, StrategyKind, SupervisorStrategy},
    system_message::SystemMessage,
};

use futures::{Future, FutureExt};

use tracing::{debug, error, warn};

use std::{panic::AssertUnwindSafe, sync::Arc};

/// Runs a hook, turning a panic into `Error::Panicked`.
async fn guarded<F>(hook: F) -> Result<(), Error>
where
    F: Future<Output = Result<(), Error>>,
{
    match AssertUnwindSafe(hook).catch_unwind().await {
        Ok(result) => result,
        Err(panic) => Err(Error::Panicked(panic_message(panic.as_ref()))),
    }
}

impl ActorCell {
    /// Instantiates the actor and runs `pre_start`.
    pub(super) async fn create(
        self: &Arc<Self>,
        failure: Option<Error>,
    ) -> Result<(), Error> {
        if let Some(failure) = failure {
            return Err(failure);
        }
        let mut incarnation = self.props.produce(self.clone())?;
        if let Err(error) = guarded(incarnation.pre_start()).await {
            return Err(Error::Initialization(
                self.path.clone(),
                error.to_string(),
            ));
        }
        self.put_incarnation(incarnation);
        self.state().created = true;
        debug!("Actor {} is started.", self.path);
        self.check_receive_timeout();
        Ok(())
    }

    /// Suspends the cell, marks it failed and reports the failure to the parent. A cell
    /// that already failed only logs. `except` is a child that must not be suspended again.
    pub(super) fn handle_invoke_failure(
        self: &Arc<Self>,
        cause: Error,
        except: Option<&ActorPath>,
    ) {
        if cause.is_fatal() {
            self.system.fatal(&self.path, &cause);
            return;
        }
        let already_failed = {
            let mut state = self.state();
            if state.failed == FailedState::Healthy {
                state.failed = FailedState::Failed(
                    except.cloned().unwrap_or_else(|| self.path.clone()),
                );
                false
            } else {
                true
            }
        };
        if already_failed {
            error!(
                "Actor {} failed again before being handled: {}",
                self.path, cause
            );
            return;
        }

        self.mailbox().suspend();
        self.suspend_children(except);
        match &self.parent {
            Some(parent) => {
                debug!("Actor {} failed: {}", self.path, cause);
                parent.send_system_message(SystemMessage::Failed {
                    child: self.self_ref(),
                    cause,
                    uid: self.path.uid(),
                });
            }
            None => {
                error!(
                    "Root guardian {} failed: {}. Stopping the worker.",
                    self.path, cause
                );
                self.send_system_message(SystemMessage::Terminate);
            }
        }
    }

    /// Parent side of `Failed`: applies the supervisor strategy of the instance.
    pub(super) fn handle_failure(
        self: &Arc<Self>,
        child: ActorRef,
        cause: Error,
        uid: u64,
    ) {
        let known = {
            let state = self.state();
            state
                .children
                .get(&child.path().key())
                .map(|record| record.child.path().uid())
        };
        match known {
            Some(current) if current == uid => {}
            Some(current) => {
                debug!(
                    "Dropping Failed({}) from old child {} (uid={} != {}).",
                    cause,
                    child.path(),
                    uid,
                    current
                );
                return;
            }
            None => {
                debug!(
                    "Dropping Failed({}) from unknown child {}.",
                    cause,
                    child.path()
                );
                return;
            }
        }

        let strategy = self.strategy();
        let directive = strategy.decide(&cause);
        error!(
            "Child {} of {} failed: {}. Directive: {:?}.",
            child.path(),
            self.path,
            cause,
            directive
        );
        match directive {
            Directive::Resume => {
                child.send_system_message(SystemMessage::Resume {
                    caused_by_failure: Some(cause),
                });
            }
            Directive::Restart => {
                self.process_failure(&strategy, true, &child, cause)
            }
            Directive::Stop => {
                self.process_failure(&strategy, false, &child, cause)
            }
            Directive::Escalate => {
                self.handle_invoke_failure(cause, Some(child.path()));
            }
        }
    }

    fn strategy(&self) -> SupervisorStrategy {
        super::lock(&self.incarnation)
            .as_ref()
            .map(|incarnation| incarnation.supervisor_strategy())
            .unwrap_or_default()
    }

    fn process_failure(
        self: &Arc<Self>,
        strategy: &SupervisorStrategy,
        restart: bool,
        child: &ActorRef,
        cause: Error,
    ) {
        let max_retries = strategy.max_retries();
        let within = strategy.within();
        match strategy.kind() {
            StrategyKind::OneForOne => {
                let permitted = restart && {
                    let mut state = self.state();
                    state
                        .children
                        .get_by_path_mut(child.path())
                        .map(|record| {
                            record
                                .stats
                                .request_restart_permission(max_retries, within)
                        })
                        .unwrap_or(false)
                };
                if permitted {
                    child.send_system_message(SystemMessage::Recreate { cause });
                } else {
                    self.stop_ref(child);
                }
            }
            StrategyKind::AllForOne => {
                let (siblings, permitted) = {
                    let mut state = self.state();
                    let permitted = restart
                        && state.children.records_mut().all(|record| {
                            record
                                .stats
                                .request_restart_permission(max_retries, within)
                        });
                    (state.children.children(), permitted)
                };
                for sibling in siblings {
                    let sibling = ActorRef::Local(sibling);
                    if permitted {
                        if !sibling.path().same_actor(child.path()) {
                            sibling.send_system_message(SystemMessage::Suspend);
                        }
                        sibling.send_system_message(SystemMessage::Recreate {
                            cause: cause.clone(),
                        });
                    } else {
                        self.stop_ref(&sibling);
                    }
                }
            }
        }
    }

    pub(super) fn supervise(self: &Arc<Self>, child: ActorRef) {
        let state = self.state();
        if state.children.is_terminating() {
            return;
        }
        if state.children.get_by_path(child.path()).is_some() {
            debug!("Actor {} now supervising {}.", self.path, child.path());
        } else {
            error!(
                "Actor {} received Supervise from unregistered child {}.",
                self.path,
                child.path()
            );
        }
    }

    pub(super) fn fault_suspend(self: &Arc<Self>) {
        self.mailbox().suspend();
        self.suspend_children(None);
    }

    pub(super) async fn fault_resume(
        self: &Arc<Self>,
        caused_by_failure: Option<Error>,
    ) {
        if !self.has_incarnation() {
            if let Some(cause) = &caused_by_failure {
                warn!(
                    "Actor {} has no instance, changing Resume into Create after {}.",
                    self.path, cause
                );
            }
            self.fault_create().await;
            return;
        }
        let fatally = self.state().failed == FailedState::Fatally;
        match caused_by_failure {
            Some(cause) if fatally => {
                warn!(
                    "Actor {} failed fatally, changing Resume into Restart after {}.",
                    self.path, cause
                );
                self.fault_recreate(cause).await;
            }
            caused_by_failure => self.resume_all(caused_by_failure),
        }
    }

    /// Undoes one suspension of the cell and its children.
    fn resume_all(self: &Arc<Self>, caused_by_failure: Option<Error>) {
        let perpetrator = {
            let mut state = self.state();
            let perpetrator = match &state.failed {
                FailedState::Failed(path) => Some(path.clone()),
                _ => None,
            };
            if caused_by_failure.is_some() {
                state.failed = FailedState::Healthy;
            }
            perpetrator
        };
        self.mailbox().resume();
        self.resume_children(caused_by_failure, perpetrator);
    }

    pub(super) async fn fault_recreate(self: &Arc<Self>, cause: Error) {
        let Some(mut incarnation) = self.take_incarnation() else {
            warn!(
                "Actor {} has no instance, changing Recreate into Create after {}.",
                self.path, cause
            );
            self.fault_create().await;
            return;
        };
        if !self.state().children.is_normal() {
            self.put_incarnation(incarnation);
            self.resume_all(None);
            return;
        }

        let (message, fatally) = {
            let mut state = self.state();
            (
                state.failed_message.take(),
                state.failed == FailedState::Fatally,
            )
        };
        if !fatally {
            if let Err(error) =
                guarded(incarnation.pre_restart(&cause, message.as_ref())).await
            {
                error!("Actor {} failed in pre_restart: {}", self.path, error);
            }
        }
        drop(incarnation);
        self.state().created = false;
        if !self.mailbox().is_suspended() {
            error!("Actor {} restarts without being suspended.", self.path);
        }

        let waiting = self
            .state()
            .children
            .set_termination_reason(SuspendReason::Recreation(cause.clone()));
        if waiting {
            self.sync_waiting_for_children();
            debug!("Actor {} waits for its children to restart.", self.path);
        } else {
            self.finish_recreate(cause).await;
        }
    }

    pub(super) async fn finish_recreate(self: &Arc<Self>, cause: Error) {
        let survivors = self.children_refs();
        {
            let mut state = self.state();
            state.failed = FailedState::Healthy;
        }
        self.mailbox().resume();

        let mut incarnation = match self.props.produce(self.clone()) {
            Ok(incarnation) => incarnation,
            Err(error) => {
                self.handle_invoke_failure(error, None);
                return;
            }
        };
        let result = guarded(incarnation.post_restart(&cause)).await;
        self.put_incarnation(incarnation);
        self.state().created = true;
        match result {
            Ok(()) => {
                debug!("Actor {} restarted after {}.", self.path, cause);
                self.check_receive_timeout();
                for child in survivors {
                    child.restart(cause.clone());
                }
            }
            Err(error) => {
                self.handle_invoke_failure(
                    Error::Initialization(self.path.clone(), error.to_string()),
                    None,
                );
                self.state().failed = FailedState::Fatally;
            }
        }
    }

    pub(super) async fn fault_create(self: &Arc<Self>) {
        self.cancel_receive_timeout();
        for child in self.children_refs() {
            self.stop_ref(&ActorRef::Local(child));
        }
        let waiting = self
            .state()
            .children
            .set_termination_reason(SuspendReason::Creation);
        if waiting {
            self.sync_waiting_for_children();
        } else {
            self.finish_create().await;
        }
    }

    pub(super) async fn finish_create(self: &Arc<Self>) {
        self.mailbox().resume();
        self.state().failed = FailedState::Healthy;
        if let Err(error) = self.create(None).await {
            self.handle_invoke_failure(error, None);
        }
    }

    /// Stops the children, then the cell once the last child is gone.
    pub(super) async fn terminate(self: &Arc<Self>) {
        self.cancel_receive_timeout();
        self.unwatch_watched_actors();
        for child in self.children_refs() {
            self.stop_ref(&ActorRef::Local(child));
        }
        let (was_terminating, waiting) = {
            let mut state = self.state();
            let was_terminating = state.children.is_terminating();
            let waiting = state
                .children
                .set_termination_reason(SuspendReason::Termination);
            (was_terminating, waiting)
        };
        self.sync_waiting_for_children();
        if waiting {
            if !was_terminating {
                self.mailbox().suspend();
                let mut state = self.state();
                if state.failed == FailedState::Healthy {
                    state.failed = FailedState::Failed(self.path.clone());
                }
                debug!(
                    "Actor {} is stopping, waiting for {} children.",
                    self.path,
                    state.children.len()
                );
            }
        } else {
            self.state().children.set_terminated();
            self.finish_terminate().await;
        }
    }

    pub(super) async fn finish_terminate(self: &Arc<Self>) {
        if let Some(mut incarnation) = self.take_incarnation() {
            if let Err(error) = guarded(incarnation.post_stop()).await {
                error!("Actor {} failed in post_stop: {}", self.path, error);
            }
        }
        self.state().created = false;

        let (user, system) = self.mailbox().close();
        let dead_letters = self.system.dead_letter_channel();
        for envelope in &user {
            dead_letters.envelope(
                envelope,
                crate::dead_letter::DeadLetterReason::Terminated,
            );
        }
        let stashed: Vec<SystemMessage> = self.state().stash.drain(..).collect();
        for message in system.into_iter().chain(stashed) {
            dead_letters.system_message(
                message,
                &self.path,
                crate::dead_letter::DeadLetterReason::Terminated,
            );
        }

        if let Some(parent) = &self.parent {
            parent.send_system_message(SystemMessage::DeathWatchNotification {
                actor: self.self_ref(),
                existence_confirmed: true,
                address_terminated: false,
            });
        }
        self.tell_watchers_we_died();
        self.unwatch_watched_actors();
        debug!("Actor {} is terminated.", self.path);

        if self.parent.is_none() {
            self.system.root_terminated();
        }
    }

    /// Parent side of a child termination.
    pub(super) async fn handle_child_terminated(
        self: &Arc<Self>,
        child: &ActorRef,
    ) -> Result<(), Error> {
        let reason = self.state().children.remove(child.path())?;
        self.sync_waiting_for_children();
        match reason {
            Some(SuspendReason::Recreation(cause)) => {
                self.finish_recreate(cause).await
            }
            Some(SuspendReason::Creation) => self.finish_create().await,
            Some(SuspendReason::Termination) => self.finish_terminate().await,
            Some(SuspendReason::UserRequest) | None => {}
        }
        Ok(())
    }

    fn suspend_children(&self, except: Option<&ActorPath>) {
        for child in self.children_refs() {
            if except.is_some_and(|path| child.path().same_actor(path)) {
                continue;
            }
            child.suspend();
        }
    }

    fn resume_children(
        &self,
        caused_by_failure: Option<Error>,
        perpetrator: Option<ActorPath>,
    ) {
        for child in self.children_refs() {
            let cause = match &perpetrator {
                Some(path) if child.path().same_actor(path) => {
                    caused_by_failure.clone()
                }
                _ => None,
            };
            child.resume(cause);
        }
    }
}
