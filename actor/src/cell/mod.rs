// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Actor cell
//!
//! The cell is the runtime half of an actor. It owns the mailbox, the live instance, the
//! children container and the death-watch sets, and it implements the lifecycle state
//! machine driven by system messages:
//!
//! ```text
//! Uninitialized -> Running <-> Suspended -> Restarting -> Running
//!                                        \-> Terminating -> Terminated
//! ```
//!
//! The code is split by concern: message dispatch in `dispatch`, failure handling and
//! lifecycle transitions in `fault`, watch bookkeeping in `death_watch`.
//!
//! Locks are short-lived and never held across an await. The instance is taken out of its
//! slot while one of its handlers runs and put back afterwards.
//!

mod death_watch;
mod dispatch;
mod fault;

use crate::{
    ActorPath, ActorRef, Error,
    actor::{Incarnation, Props},
    children::ChildrenContainer,
    dead_letter::DeadLetterReason,
    mailbox::{Mailbox, MailboxStatus},
    message::{AnyMessage, Envelope, ReceiveTimeout},
    path::validate_name,
    reference::LocalActorRef,
    system::SystemRef,
    system_message::SystemMessage,
};

use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;

use tracing::{debug, warn};

use std::{
    any::Any,
    collections::VecDeque,
    sync::{
        Arc, Mutex, MutexGuard, PoisonError,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

/// Observable lifecycle state of a cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    /// Started but the instance does not exist yet, or its creation failed.
    Uninitialized,
    /// Processing user messages.
    Running,
    /// User messages wait until every suspension is undone.
    Suspended,
    /// Waiting for children to stop before a fresh instance is created.
    Restarting,
    /// Waiting for children to stop before terminating.
    Terminating,
    /// Gone for good.
    Terminated,
}

/// Failure bookkeeping of a cell.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum FailedState {
    Healthy,
    /// Failed, `perpetrator` is this cell or the child whose failure was escalated.
    Failed(ActorPath),
    /// The restart hooks failed too, the next restart skips `pre_restart`.
    Fatally,
}

pub(crate) struct CellState {
    pub(crate) children: ChildrenContainer,
    pub(crate) watching: Vec<ActorRef>,
    pub(crate) watched_by: Vec<ActorRef>,
    pub(crate) terminated_queued: Vec<ActorPath>,
    pub(crate) failed: FailedState,
    pub(crate) stash: VecDeque<SystemMessage>,
    pub(crate) failed_message: Option<AnyMessage>,
    pub(crate) receive_timeout: Option<Duration>,
    pub(crate) timer: Option<CancellationToken>,
    pub(crate) created: bool,
    pub(crate) anonymous: u64,
}

/// Runtime state of one actor.
pub(crate) struct ActorCell {
    path: ActorPath,
    parent: Option<ActorRef>,
    system: SystemRef,
    props: Props,
    mailbox: Mutex<Mailbox>,
    scheduled: AtomicBool,
    started: AtomicBool,
    state: Mutex<CellState>,
    incarnation: Mutex<Option<Box<dyn Incarnation>>>,
}

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Text of a panic payload.
pub(crate) fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_owned()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_owned()
    }
}

impl ActorCell {
    pub(crate) fn new(
        path: ActorPath,
        parent: Option<ActorRef>,
        system: SystemRef,
        props: Props,
    ) -> Arc<Self> {
        let receive_timeout = system.config().default_receive_timeout;
        Arc::new(Self {
            path,
            parent,
            system,
            props,
            mailbox: Mutex::new(Mailbox::new()),
            scheduled: AtomicBool::new(false),
            started: AtomicBool::new(false),
            state: Mutex::new(CellState {
                children: ChildrenContainer::new(),
                watching: Vec::new(),
                watched_by: Vec::new(),
                terminated_queued: Vec::new(),
                failed: FailedState::Healthy,
                stash: VecDeque::new(),
                failed_message: None,
                receive_timeout,
                timer: None,
                created: false,
                anonymous: 0,
            }),
            incarnation: Mutex::new(None),
        })
    }

    pub(crate) fn path(&self) -> &ActorPath {
        &self.path
    }

    pub(crate) fn parent(&self) -> Option<&ActorRef> {
        self.parent.as_ref()
    }

    pub(crate) fn system(&self) -> &SystemRef {
        &self.system
    }

    pub(crate) fn self_ref(self: &Arc<Self>) -> ActorRef {
        ActorRef::Local(LocalActorRef::new(self.clone()))
    }

    pub(crate) fn state(&self) -> MutexGuard<'_, CellState> {
        lock(&self.state)
    }

    pub(crate) fn mailbox(&self) -> MutexGuard<'_, Mailbox> {
        lock(&self.mailbox)
    }

    /// Enqueues `Create`, asks the parent for supervision and schedules the cell.
    pub(crate) fn start(self: &Arc<Self>) {
        if self.started.swap(true, Ordering::SeqCst) {
            return;
        }
        let rejected = self
            .mailbox()
            .system_enqueue(SystemMessage::Create { failure: None })
            .err();
        if rejected.is_some() {
            return;
        }
        if let Some(parent) = &self.parent {
            parent.send_system_message(SystemMessage::Supervise {
                child: self.self_ref(),
            });
        }
        self.system.dispatcher().schedule(self);
    }

    /// Enqueues a user message. A closed mailbox turns it into a dead letter.
    pub(crate) fn send_message(self: &Arc<Self>, envelope: Envelope) {
        let rejected = self.mailbox().enqueue(envelope).err();
        match rejected {
            Some(envelope) => self
                .system
                .dead_letter_channel()
                .envelope(&envelope, DeadLetterReason::Terminated),
            None => self.schedule(),
        }
    }

    /// Enqueues a system message. A closed mailbox hands it to the dead letters.
    pub(crate) fn send_system_message(self: &Arc<Self>, message: SystemMessage) {
        let rejected = self.mailbox().system_enqueue(message).err();
        match rejected {
            Some(message) => self.system.dead_letter_channel().system_message(
                message,
                &self.path,
                DeadLetterReason::Terminated,
            ),
            None => self.schedule(),
        }
    }

    fn schedule(self: &Arc<Self>) {
        if self.started.load(Ordering::SeqCst) {
            self.system.dispatcher().schedule(self);
        }
    }

    /// Claims the cell for the run queue. False if it is queued already.
    pub(crate) fn try_claim(&self) -> bool {
        !self.scheduled.swap(true, Ordering::SeqCst)
    }

    /// Releases the claim taken by `try_claim`. True if the cell still has work.
    pub(crate) fn release(&self) -> bool {
        self.scheduled.store(false, Ordering::SeqCst);
        self.mailbox().can_be_scheduled()
    }

    pub(crate) fn is_terminated(&self) -> bool {
        self.mailbox().is_closed()
    }

    pub(crate) fn number_of_messages(&self) -> usize {
        self.mailbox().number_of_messages()
    }

    pub(crate) fn mailbox_status(&self) -> MailboxStatus {
        self.mailbox().status()
    }

    pub(crate) fn lifecycle(&self) -> Lifecycle {
        let (closed, suspended) = {
            let mailbox = self.mailbox();
            (mailbox.is_closed(), mailbox.is_suspended())
        };
        if closed {
            return Lifecycle::Terminated;
        }
        let state = self.state();
        if state.children.is_terminating() {
            Lifecycle::Terminating
        } else if state.children.is_waiting_for_children() {
            Lifecycle::Restarting
        } else if !state.created {
            Lifecycle::Uninitialized
        } else if suspended {
            Lifecycle::Suspended
        } else {
            Lifecycle::Running
        }
    }

    /// Mirrors the children container into the mailbox status word.
    pub(crate) fn sync_waiting_for_children(&self) {
        let waiting = self.state().children.is_waiting_for_children();
        self.mailbox().set_waiting_for_children(waiting);
    }

    pub(crate) fn child_ref(&self, name: &str) -> Option<LocalActorRef> {
        self.state().children.get(name).map(|record| record.child.clone())
    }

    pub(crate) fn children_refs(&self) -> Vec<LocalActorRef> {
        self.state().children.children()
    }

    pub(crate) fn spawn_child(
        self: &Arc<Self>,
        props: Props,
        name: &str,
    ) -> Result<LocalActorRef, Error> {
        validate_name(name)?;
        self.make_child(props, name)
    }

    pub(crate) fn spawn_anonymous_child(
        self: &Arc<Self>,
        props: Props,
    ) -> Result<LocalActorRef, Error> {
        let name = {
            let mut state = self.state();
            state.anonymous += 1;
            format!("${}", state.anonymous)
        };
        self.make_child(props, &name)
    }

    fn make_child(
        self: &Arc<Self>,
        props: Props,
        name: &str,
    ) -> Result<LocalActorRef, Error> {
        let uid = self.system.next_uid();
        let path = self.path.child(name).with_uid(uid);
        let cell = ActorCell::new(
            path,
            Some(self.self_ref()),
            self.system.clone(),
            props,
        );
        let child = LocalActorRef::new(cell);
        self.state().children.insert(child.clone())?;
        child.start();
        debug!("Child {} of type {} spawned.", child.path(), child.cell().props.actor_type());
        Ok(child)
    }

    /// Stops `target`. Children are marked as dying first so that the cell knows it has to
    /// wait for them.
    pub(crate) fn stop_ref(self: &Arc<Self>, target: &ActorRef) {
        if target.path().same_actor(&self.path) {
            self.send_system_message(SystemMessage::Terminate);
            return;
        }
        let is_child = self.state().children.shall_die(target.path());
        if is_child {
            self.sync_waiting_for_children();
        }
        target.send_system_message(SystemMessage::Terminate);
    }

    pub(crate) fn set_receive_timeout(self: &Arc<Self>, timeout: Option<Duration>) {
        self.state().receive_timeout = timeout;
        if timeout.is_none() {
            self.cancel_receive_timeout();
        }
    }

    pub(crate) fn receive_timeout(&self) -> Option<Duration> {
        self.state().receive_timeout
    }

    pub(crate) fn cancel_receive_timeout(&self) {
        let timer = self.state().timer.take();
        if let Some(timer) = timer {
            timer.cancel();
        }
    }

    /// Arms the receive timeout timer, replacing a pending one.
    pub(crate) fn check_receive_timeout(self: &Arc<Self>) {
        self.cancel_receive_timeout();
        let Some(timeout) = self.receive_timeout() else {
            return;
        };
        let Ok(handle) = Handle::try_current() else {
            warn!(
                "No async runtime available, receive timeout of {} not armed.",
                self.path
            );
            return;
        };
        let token = CancellationToken::new();
        self.state().timer = Some(token.clone());
        let target = LocalActorRef::new(self.clone());
        handle.spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = tokio::time::sleep(timeout) => {
                    target.tell(AnyMessage::new(ReceiveTimeout), None);
                }
            }
        });
    }

    fn take_incarnation(&self) -> Option<Box<dyn Incarnation>> {
        lock(&self.incarnation).take()
    }

    fn put_incarnation(&self, incarnation: Box<dyn Incarnation>) {
        *lock(&self.incarnation) = Some(incarnation);
    }

    fn has_incarnation(&self) -> bool {
        lock(&self.incarnation).is_some()
    }
}
