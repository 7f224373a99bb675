// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Actor
//!
//! The `actor` module provides the [`Actor`] trait, the [`ActorContext`] handed to every
//! handler and hook, the handler stack used by `become`/`unbecome`, and [`Props`], the
//! recipe a cell uses to build a fresh instance on creation and on every restart.
//!

use crate::{
    ActorPath, ActorRef, Error,
    cell::ActorCell,
    message::{AnyMessage, Envelope},
    reference::LocalActorRef,
    supervision::SupervisorStrategy,
    system::SystemRef,
};

use async_trait::async_trait;

use std::{
    any::type_name,
    fmt::{Debug, Formatter},
    panic::AssertUnwindSafe,
    sync::Arc,
    time::Duration,
};

/// Actor execution context.
///
/// The `ActorContext` is the interface through which an actor interacts with the runtime:
/// spawning and stopping children, watching other actors, replying to the sender of the
/// current message and switching behavior. A new context is built for every incarnation,
/// so the handler stack starts over after a restart.
///
/// # Type Parameters
///
/// * `A` - The actor type that owns this context.
///
/// # Examples
///
/// ```ignore
/// use worker_actors::*;
/// use async_trait::async_trait;
///
/// #[async_trait]
/// impl Actor for Manager {
///     async fn receive(
///         &mut self,
///         ctx: &mut ActorContext<Self>,
///         message: &AnyMessage,
///     ) -> Result<(), Error> {
///         if let Some(job) = message.downcast_ref::<Job>() {
///             let worker = ctx.spawn_anonymous(Props::new(|_| Ok(Worker)))?;
///             ctx.watch(&worker);
///             worker.tell(job.clone(), Some(ctx.self_ref()));
///         }
///         Ok(())
///     }
/// }
/// ```
pub struct ActorContext<A: Actor> {
    /// The cell hosting the actor.
    cell: Arc<ActorCell>,
    /// Handler stack, never empty. The top element handles the next message.
    behaviors: Vec<Behavior<A>>,
    /// Sender of the message being processed.
    sender: Option<ActorRef>,
}

impl<A: Actor> ActorContext<A> {
    pub(crate) fn new(cell: Arc<ActorCell>) -> Self {
        Self {
            cell,
            behaviors: vec![Behavior::Initial],
            sender: None,
        }
    }

    /// Reference to this actor.
    pub fn self_ref(&self) -> ActorRef {
        ActorRef::Local(LocalActorRef::new(self.cell.clone()))
    }

    /// Path of this actor, including the uid of the current incarnation.
    pub fn path(&self) -> &ActorPath {
        self.cell.path()
    }

    /// Reference to the supervising actor. The root guardian is its own parent.
    pub fn parent(&self) -> ActorRef {
        LocalActorRef::new(self.cell.clone()).parent()
    }

    /// Sender of the message being processed, `None` outside of `receive` or when the
    /// message was sent from outside any actor.
    pub fn sender(&self) -> Option<&ActorRef> {
        self.sender.as_ref()
    }

    /// The actor system hosting this actor.
    pub fn system(&self) -> &SystemRef {
        self.cell.system()
    }

    /// Creates and starts a child actor.
    ///
    /// # Arguments
    ///
    /// * `props` - Recipe of the child.
    /// * `name` - Name of the child, unique among its siblings.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidName` for names that are not valid path segments,
    /// `Error::Exists` if a sibling has the same name and `Error::Create` while this
    /// actor is stopping.
    ///
    pub fn spawn(&self, props: Props, name: &str) -> Result<ActorRef, Error> {
        self.cell.spawn_child(props, name).map(ActorRef::Local)
    }

    /// Creates and starts a child actor with a generated `$<n>` name.
    ///
    /// # Errors
    ///
    /// Returns `Error::Create` while this actor is stopping.
    ///
    pub fn spawn_anonymous(&self, props: Props) -> Result<ActorRef, Error> {
        self.cell.spawn_anonymous_child(props).map(ActorRef::Local)
    }

    /// The child named `name`, if any.
    pub fn child(&self, name: &str) -> Option<ActorRef> {
        self.cell.child_ref(name).map(ActorRef::Local)
    }

    /// Every child, ordered by name.
    pub fn children(&self) -> Vec<ActorRef> {
        self.cell
            .children_refs()
            .into_iter()
            .map(ActorRef::Local)
            .collect()
    }

    /// Stops `target`: this actor, one of its children or any other local actor.
    /// Stopping is asynchronous, the target terminates after its children did.
    pub fn stop(&self, target: &ActorRef) {
        self.cell.stop_ref(target);
    }

    /// Registers for the termination of `target`. Idempotent.
    ///
    /// A [`crate::Terminated`] message is delivered once `target` terminates, right away
    /// if it is already gone.
    ///
    pub fn watch(&self, target: &ActorRef) -> ActorRef {
        self.cell.watch(target);
        target.clone()
    }

    /// Undoes [`ActorContext::watch`]. A `Terminated` queued but not yet delivered for
    /// `target` is discarded. Idempotent.
    pub fn unwatch(&self, target: &ActorRef) {
        self.cell.unwatch(target);
    }

    /// Sets the idle time after which a [`crate::ReceiveTimeout`] is delivered. `None`
    /// disables it.
    pub fn set_receive_timeout(&self, timeout: Option<Duration>) {
        self.cell.set_receive_timeout(timeout);
    }

    /// Current receive timeout.
    pub fn receive_timeout(&self) -> Option<Duration> {
        self.cell.receive_timeout()
    }

    /// Switches the handler of the next messages.
    ///
    /// # Arguments
    ///
    /// * `receive` - The new handler.
    /// * `discard_old` - Replace the current handler when true, push on top of it when false.
    ///
    pub fn become_behavior(
        &mut self,
        receive: impl Receive<A>,
        discard_old: bool,
    ) {
        let behavior = Behavior::Custom(Arc::new(receive));
        if discard_old && !self.behaviors.is_empty() {
            self.behaviors.pop();
        }
        self.behaviors.push(behavior);
    }

    /// Goes back to the previous handler. The last handler is never popped.
    pub fn unbecome(&mut self) {
        if self.behaviors.len() > 1 {
            self.behaviors.pop();
        }
    }

    /// Number of handlers on the stack.
    pub fn behavior_depth(&self) -> usize {
        self.behaviors.len()
    }

    fn current_behavior(&self) -> Behavior<A> {
        self.behaviors.last().cloned().unwrap_or(Behavior::Initial)
    }
}

/// Defines the behavior of an actor.
///
/// An actor processes one message at a time. `receive` is called with every user message
/// the actor did not leave to the runtime (`PoisonPill`, `Kill` and `Identify` are handled
/// by the cell). Returning an error or panicking fails the actor: it is suspended together
/// with its children and its parent decides what happens next using its
/// [`SupervisorStrategy`].
///
/// # Lifecycle
///
/// - `pre_start` runs once the instance has been created.
/// - `pre_restart` runs on the failed instance before it is replaced. By default it stops
///   every child and calls `post_stop`.
/// - `post_restart` runs on the fresh instance. By default it calls `pre_start`.
/// - `post_stop` runs once the actor and all its children stopped.
///
/// # Examples
///
/// ```ignore
/// use worker_actors::*;
/// use async_trait::async_trait;
///
/// struct Counter { count: u64 }
///
/// #[async_trait]
/// impl Actor for Counter {
///     async fn receive(
///         &mut self,
///         ctx: &mut ActorContext<Self>,
///         message: &AnyMessage,
///     ) -> Result<(), Error> {
///         if message.is::<Increment>() {
///             self.count += 1;
///         } else if message.is::<Get>() {
///             if let Some(sender) = ctx.sender() {
///                 sender.tell(self.count, Some(ctx.self_ref()));
///             }
///         }
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait Actor: Send + Sync + Sized + 'static {
    /// Handles one user message.
    async fn receive(
        &mut self,
        ctx: &mut ActorContext<Self>,
        message: &AnyMessage,
    ) -> Result<(), Error>;

    /// Called after the instance has been created, before any message.
    async fn pre_start(
        &mut self,
        _ctx: &mut ActorContext<Self>,
    ) -> Result<(), Error> {
        Ok(())
    }

    /// Called once the actor and all its children stopped.
    async fn post_stop(
        &mut self,
        _ctx: &mut ActorContext<Self>,
    ) -> Result<(), Error> {
        Ok(())
    }

    /// Called on the failed instance before it is replaced.
    ///
    /// # Arguments
    ///
    /// * `cause` - Why the actor is restarted.
    /// * `message` - The message being processed when the actor failed, if any.
    ///
    async fn pre_restart(
        &mut self,
        ctx: &mut ActorContext<Self>,
        _cause: &Error,
        _message: Option<&AnyMessage>,
    ) -> Result<(), Error> {
        for child in ctx.children() {
            ctx.stop(&child);
        }
        self.post_stop(ctx).await
    }

    /// Called on the fresh instance after a restart.
    async fn post_restart(
        &mut self,
        ctx: &mut ActorContext<Self>,
        _cause: &Error,
    ) -> Result<(), Error> {
        self.pre_start(ctx).await
    }

    /// Strategy applied to the failures of the children of this actor.
    fn supervisor_strategy(&self) -> SupervisorStrategy {
        SupervisorStrategy::default()
    }
}

/// A handler that replaces [`Actor::receive`] once pushed with
/// [`ActorContext::become_behavior`].
#[async_trait]
pub trait Receive<A: Actor>: Send + Sync + 'static {
    /// Handles one user message on behalf of `actor`.
    async fn receive(
        &self,
        actor: &mut A,
        ctx: &mut ActorContext<A>,
        message: &AnyMessage,
    ) -> Result<(), Error>;
}

/// Element of the handler stack.
pub enum Behavior<A: Actor> {
    /// [`Actor::receive`].
    Initial,
    /// A handler pushed with `become`.
    Custom(Arc<dyn Receive<A>>),
}

impl<A: Actor> Clone for Behavior<A> {
    fn clone(&self) -> Self {
        match self {
            Behavior::Initial => Behavior::Initial,
            Behavior::Custom(receive) => Behavior::Custom(receive.clone()),
        }
    }
}

impl<A: Actor> Debug for Behavior<A> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Behavior::Initial => write!(f, "Initial"),
            Behavior::Custom(_) => write!(f, "Custom"),
        }
    }
}

/// Type-erased live instance of an actor, as seen by its cell.
#[async_trait]
pub(crate) trait Incarnation: Send {
    async fn pre_start(&mut self) -> Result<(), Error>;
    async fn receive(&mut self, envelope: &Envelope) -> Result<(), Error>;
    async fn pre_restart(
        &mut self,
        cause: &Error,
        message: Option<&AnyMessage>,
    ) -> Result<(), Error>;
    async fn post_restart(&mut self, cause: &Error) -> Result<(), Error>;
    async fn post_stop(&mut self) -> Result<(), Error>;
    fn supervisor_strategy(&self) -> SupervisorStrategy;
}

struct Instance<A: Actor> {
    actor: A,
    ctx: ActorContext<A>,
}

#[async_trait]
impl<A: Actor> Incarnation for Instance<A> {
    async fn pre_start(&mut self) -> Result<(), Error> {
        self.actor.pre_start(&mut self.ctx).await
    }

    async fn receive(&mut self, envelope: &Envelope) -> Result<(), Error> {
        self.ctx.sender = envelope.sender.clone();
        let result = match self.ctx.current_behavior() {
            Behavior::Initial => {
                self.actor.receive(&mut self.ctx, &envelope.message).await
            }
            Behavior::Custom(receive) => {
                receive
                    .receive(&mut self.actor, &mut self.ctx, &envelope.message)
                    .await
            }
        };
        self.ctx.sender = None;
        result
    }

    async fn pre_restart(
        &mut self,
        cause: &Error,
        message: Option<&AnyMessage>,
    ) -> Result<(), Error> {
        self.actor.pre_restart(&mut self.ctx, cause, message).await
    }

    async fn post_restart(&mut self, cause: &Error) -> Result<(), Error> {
        self.actor.post_restart(&mut self.ctx, cause).await
    }

    async fn post_stop(&mut self) -> Result<(), Error> {
        self.actor.post_stop(&mut self.ctx).await
    }

    fn supervisor_strategy(&self) -> SupervisorStrategy {
        self.actor.supervisor_strategy()
    }
}

type Factory =
    dyn Fn(Arc<ActorCell>) -> Result<Box<dyn Incarnation>, Error> + Send + Sync;

/// Recipe of an actor.
///
/// The cell calls the factory once on creation and again on every restart, so each
/// incarnation starts from a fresh value. The factory receives the context of the new
/// incarnation, which lets the constructor capture its own reference or spawn children.
///
/// # Examples
///
/// ```ignore
/// let props = Props::new(|ctx: &mut ActorContext<Counter>| {
///     ctx.set_receive_timeout(Some(Duration::from_secs(5)));
///     Ok(Counter { count: 0 })
/// });
/// let counter = system.spawn(props, "counter")?;
/// ```
#[derive(Clone)]
pub struct Props {
    factory: Arc<Factory>,
    actor_type: &'static str,
}

impl Props {
    /// Props built from a factory function.
    pub fn new<A, F>(factory: F) -> Self
    where
        A: Actor,
        F: Fn(&mut ActorContext<A>) -> Result<A, Error> + Send + Sync + 'static,
    {
        let factory = move |cell: Arc<ActorCell>| {
            let mut ctx = ActorContext::new(cell);
            let actor = factory(&mut ctx)?;
            Ok(Box::new(Instance { actor, ctx }) as Box<dyn Incarnation>)
        };
        Self {
            factory: Arc::new(factory),
            actor_type: type_name::<A>(),
        }
    }

    /// Props cloning `actor` for every incarnation.
    pub fn from_clone<A>(actor: A) -> Self
    where
        A: Actor + Clone,
    {
        Self::new(move |_ctx| Ok(actor.clone()))
    }

    /// Rust type name of the actor.
    pub fn actor_type(&self) -> &'static str {
        self.actor_type
    }

    /// Builds a fresh incarnation bound to `cell`. Factory errors and panics become
    /// `Error::Initialization`.
    pub(crate) fn produce(
        &self,
        cell: Arc<ActorCell>,
    ) -> Result<Box<dyn Incarnation>, Error> {
        let path = cell.path().clone();
        match std::panic::catch_unwind(AssertUnwindSafe(|| (self.factory)(cell)))
        {
            Ok(Ok(incarnation)) => Ok(incarnation),
            Ok(Err(error)) => {
                Err(Error::Initialization(path, error.to_string()))
            }
            Err(panic) => Err(Error::Initialization(
                path,
                crate::cell::panic_message(panic.as_ref()),
            )),
        }
    }
}

impl Debug for Props {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "Props({})", self.actor_type)
    }
}
