// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Errors module
//!
//! Every failure in the runtime is expressed through [`Error`]. The type is serializable
//! because failure causes travel inside `Failed` system messages and may cross a worker
//! boundary.
//!

use crate::ActorPath;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error type for the actor system.
#[derive(Clone, Debug, Error, PartialEq, Serialize, Deserialize)]
pub enum Error {
    /// An error occurred while sending a message to an actor.
    #[error("An error occurred while sending a message to actor: {0}.")]
    Send(String),
    /// An error occurred while creating an actor.
    #[error("An error occurred while creating an actor: {0}.")]
    Create(String),
    /// The actor name is already taken by a sibling.
    #[error("Actor {0} exists.")]
    Exists(ActorPath),
    /// The actor name is not a valid path segment.
    #[error("Invalid actor name '{0}'.")]
    InvalidName(String),
    /// An error occurred while starting the actor system.
    #[error("An error occurred while starting the actor system: {0}.")]
    Start(String),
    /// The actor factory or the `pre_start` hook failed.
    #[error("Actor {0} failed to initialize: {1}")]
    Initialization(ActorPath, String),
    /// The actor received a `Kill` message.
    #[error("Actor {0} was killed.")]
    ActorKilled(ActorPath),
    /// A watched actor terminated and the watcher could not cope with it.
    #[error("Watched actor {0} terminated.")]
    DeathPact(ActorPath),
    /// A handler panicked while processing a message.
    #[error("Handler panicked: {0}")]
    Panicked(String),
    /// A value could not be encoded or decoded.
    #[error("Codec error: {0}")]
    Codec(String),
    /// A frame could not be handed to the transport.
    #[error("Transport error: {0}")]
    Transport(String),
    /// A broken runtime invariant. Terminates the worker.
    #[error("Fatal error: {0}")]
    Fatal(String),
    /// Error that does not compromise the operation of the system.
    #[error("Error: {0}")]
    Functional(String),
}

impl Error {
    /// True for errors that must stop the worker instead of being supervised.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::Fatal(_))
    }
}

impl From<bincode::Error> for Error {
    fn from(error: bincode::Error) -> Self {
        Error::Codec(error.to_string())
    }
}
