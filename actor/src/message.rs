// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Messages
//!
//! User messages are type-erased into [`AnyMessage`] so that a single mailbox can carry any
//! payload and the codec can pick the right serializer from the runtime type. This module
//! also defines the records the cell handles on behalf of every actor.
//!

use crate::{ActorPath, ActorRef};

use serde::{Deserialize, Serialize};

use std::any::{Any, TypeId};
use std::fmt::{Debug, Formatter};

/// Owned, type-erased message.
pub struct AnyMessage {
    value: Box<dyn Any + Send + Sync>,
    type_name: &'static str,
}

impl AnyMessage {
    /// Wraps a value. Wrapping an `AnyMessage` returns it unchanged.
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        let type_name = std::any::type_name::<T>();
        let boxed: Box<dyn Any + Send + Sync> = Box::new(value);
        match boxed.downcast::<AnyMessage>() {
            Ok(inner) => *inner,
            Err(value) => Self { value, type_name },
        }
    }

    /// True if the payload is a `T`.
    pub fn is<T: Any>(&self) -> bool {
        self.value.is::<T>()
    }

    /// Borrows the payload as a `T`.
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.value.downcast_ref::<T>()
    }

    /// Takes the payload out as a `T`, or gives the message back.
    pub fn downcast<T: Any>(self) -> Result<T, AnyMessage> {
        let type_name = self.type_name;
        self.value
            .downcast::<T>()
            .map(|value| *value)
            .map_err(|value| AnyMessage { value, type_name })
    }

    /// Rust type name of the payload, for diagnostics.
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Runtime type of the payload.
    pub fn payload_type_id(&self) -> TypeId {
        Any::type_id(&*self.value)
    }
}

impl Debug for AnyMessage {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "AnyMessage({})", self.type_name)
    }
}

/// A message in flight: created per send, consumed on enqueue.
#[derive(Debug)]
pub struct Envelope {
    /// The payload.
    pub message: AnyMessage,
    /// Who sent it, `None` when sent from outside any actor.
    pub sender: Option<ActorRef>,
    /// Where it is going.
    pub recipient: ActorPath,
}

impl Envelope {
    /// Creates an envelope.
    pub fn new(
        message: AnyMessage,
        sender: Option<ActorRef>,
        recipient: ActorPath,
    ) -> Self {
        Self {
            message,
            sender,
            recipient,
        }
    }
}

/// Stops the receiving actor once it is dequeued, after the messages queued before it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoisonPill;

/// Makes the receiving actor fail with [`crate::Error::ActorKilled`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Kill;

/// Asks an actor for its reference. Answered by the runtime with an [`ActorIdentity`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identify(pub u64);

/// Answer to [`Identify`]. `subject` is `None` when nobody lives at the target path.
#[derive(Debug, Clone, PartialEq)]
pub struct ActorIdentity {
    /// Correlation id copied from the `Identify` request.
    pub correlation: u64,
    /// The live reference.
    pub subject: Option<ActorRef>,
}

/// Delivered to watchers once a watched actor has terminated.
#[derive(Debug, Clone, PartialEq)]
pub struct Terminated {
    /// The actor that terminated.
    pub actor: ActorRef,
    /// False when the actor was already gone or never existed at watch time.
    pub existence_confirmed: bool,
    /// True when the notification stems from the loss of the hosting worker.
    pub address_terminated: bool,
}

/// Sent to an actor that stayed idle for longer than its receive timeout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiveTimeout;

#[cfg(test)]
mod tests {

    use super::*;

    #[test]
    fn test_downcast() {
        let msg = AnyMessage::new(42u32);
        assert!(msg.is::<u32>());
        assert!(!msg.is::<i32>());
        assert_eq!(msg.downcast_ref::<u32>(), Some(&42));
        assert_eq!(msg.type_name(), "u32");
        let msg = msg.downcast::<i64>().unwrap_err();
        assert_eq!(msg.downcast::<u32>().unwrap(), 42);
    }

    #[test]
    fn test_wrapping_is_idempotent() {
        let msg = AnyMessage::new(AnyMessage::new("ping".to_owned()));
        assert!(msg.is::<String>());
        assert_eq!(msg.payload_type_id(), TypeId::of::<String>());
    }
}
