// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Worker actors
//!
//! The concurrency core of an actor runtime for single-threaded cooperative workers. Each
//! worker hosts a tree of actors below its root guardian; actors are addressed by path,
//! talk only through fire-and-forget messages and are scheduled by the worker one message
//! at a time. Workers of the same actor system exchange messages and death-watch traffic
//! through a [`Transport`].
//!
//! ## Overview
//!
//! In response to a message, an actor can:
//! - Update its private state
//! - Create, watch and stop child actors
//! - Send messages to any actor it has a reference to
//! - Replace its behavior for the next message
//!
//! Failures never unwind past the actor. A failing actor is suspended together with its
//! children and its parent decides, through its [`SupervisorStrategy`], whether to resume,
//! restart or stop it, or to escalate the failure further up.
//!
//! ## Getting started
//!
//! ```ignore
//! use actor::{Actor, ActorContext, ActorSystem, AnyMessage, Error, Props, SystemConfig};
//! use async_trait::async_trait;
//! use tokio_util::sync::CancellationToken;
//!
//! struct Counter {
//!     value: u64,
//! }
//!
//! #[async_trait]
//! impl Actor for Counter {
//!     async fn receive(
//!         &mut self,
//!         ctx: &mut ActorContext<Self>,
//!         message: &AnyMessage,
//!     ) -> Result<(), Error> {
//!         if let Some(n) = message.downcast_ref::<u64>() {
//!             self.value += n;
//!             if let Some(sender) = ctx.sender() {
//!                 sender.tell(self.value, Some(ctx.self_ref()));
//!             }
//!         }
//!         Ok(())
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Error> {
//!     let token = CancellationToken::new();
//!     let (system, mut runner) = ActorSystem::create(SystemConfig::default(), token.clone());
//!
//!     let counter = system.spawn(Props::new(|_| Ok(Counter { value: 0 })), "counter")?;
//!     counter.tell(5u64, None);
//!
//!     token.cancel();
//!     runner.run().await;
//!     Ok(())
//! }
//! ```
//!
//! ## API organization
//!
//! - **Actors**: [`Actor`], [`ActorContext`], [`Props`], [`Receive`], [`Behavior`]
//! - **References and addressing**: [`ActorRef`], [`ActorPath`], [`WorkerAddress`]
//! - **Messages**: [`AnyMessage`] and the built-in messages ([`PoisonPill`], [`Kill`],
//!   [`Identify`], [`Terminated`], [`ReceiveTimeout`])
//! - **Supervision**: [`SupervisorStrategy`], [`Directive`]
//! - **Workers**: [`ActorSystem`], [`SystemRef`], [`SystemRunner`], [`SystemConfig`]
//! - **Wire**: [`Codec`], [`Transport`], [`LocalHub`]
//! - **Observability**: [`DeadLetter`], [`Sink`], [`Subscriber`]
//!

mod actor;
mod cell;
mod children;
mod codec;
mod config;
mod dead_letter;
mod dispatcher;
mod error;
mod mailbox;
mod message;
mod path;
mod reference;
mod router;
mod sink;
mod supervision;
mod system;
mod system_message;
mod transport;

//
// Actors
//

/// Behavior and lifecycle hooks of an actor.
pub use actor::Actor;

/// Services available to an actor while it processes a message.
pub use actor::ActorContext;

/// A behavior pushed on the behavior stack of an actor.
pub use actor::Behavior;

/// Recipe used to create, and recreate, an actor instance.
pub use actor::Props;

/// Message handler that can replace [`Actor::receive`].
pub use actor::Receive;

/// Lifecycle state of an actor cell.
pub use cell::Lifecycle;

//
// References and addressing
//

/// Hierarchical path identifying an actor.
pub use path::ActorPath;

/// Address of the worker hosting a path.
pub use path::WorkerAddress;

/// Handle to an actor, wherever it lives.
pub use reference::ActorRef;

/// Handle to an actor of this worker.
pub use reference::LocalActorRef;

/// Handle to a path nothing lives at.
pub use reference::NobodyRef;

/// Handle to an actor of another worker.
pub use reference::RemoteActorRef;

//
// Messages
//

/// Type-erased user message.
pub use message::AnyMessage;

/// Answer to [`Identify`].
pub use message::ActorIdentity;

/// Asks an actor for its reference.
pub use message::Identify;

/// Makes an actor fail with [`Error::ActorKilled`].
pub use message::Kill;

/// Stops an actor once the messages before it are processed.
pub use message::PoisonPill;

/// Delivered after an actor stayed idle for its receive timeout.
pub use message::ReceiveTimeout;

/// Delivered to the watchers of an actor once it terminated.
pub use message::Terminated;

/// Status of a mailbox.
pub use mailbox::MailboxStatus;

//
// Errors and supervision
//

/// Error type of the runtime.
pub use error::Error;

/// Answer of a supervisor to a failure.
pub use supervision::Directive;

/// Maps an error to a directive.
pub use supervision::Decider;

/// Scope of a directive.
pub use supervision::StrategyKind;

/// Failure handling policy of a parent.
pub use supervision::SupervisorStrategy;

/// Built-in deciders.
pub use supervision::{default_decider, escalating_decider, stopping_decider};

//
// Workers
//

/// Entry point to create workers.
pub use system::ActorSystem;

/// Step-by-step construction of a worker.
pub use system::SystemBuilder;

/// Reference to a worker.
pub use system::SystemRef;

/// Drives a worker.
pub use system::SystemRunner;

/// Worker settings.
pub use config::SystemConfig;

//
// Wire
//

/// Type-tagged message codec.
pub use codec::{
    Codec, CodecBuilder, CodecContext, DecodeFn, EncodeFn, EncodedValue,
    PathResolver, decode_path, decode_serde, encode_path, encode_serde,
};

/// Frames exchanged between workers and the channel carrying them.
pub use transport::{
    EnvelopeKind, InboundFrames, LocalHub, Transport, TransportEnvelope,
};

//
// Observability
//

/// Messages that could not be delivered.
pub use dead_letter::{DeadLetter, DeadLetterReason};

/// Event sinks fed from broadcast channels.
pub use sink::{Event, Sink, Subscriber};
