// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Dead letters
//!
//! Messages that cannot be delivered end up here: sends to closed mailboxes, to paths that
//! do not resolve, to stale incarnations, and frames the router could not encode or decode.
//! Every dead letter is logged and published on a broadcast channel that can be drained with
//! a [`crate::Sink`].
//!

use crate::{
    ActorPath, Event,
    message::Envelope,
    system_message::SystemMessage,
};

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use tracing::{debug, warn};

/// Why a message could not be delivered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeadLetterReason {
    /// The recipient terminated.
    Terminated,
    /// Nothing lives at the recipient path, or the uid is stale.
    NoSuchActor,
    /// The recipient has no instance to handle the message.
    NotInitialized,
    /// The message could not be encoded or decoded.
    Codec(String),
    /// The transport refused the frame.
    Transport(String),
    /// Remote references only carry death-watch system messages.
    Unsupported,
}

/// An undeliverable message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeadLetter {
    /// Type name of the user message, or kind of the system message.
    pub message: String,
    /// Sender of the message, if known.
    pub sender: Option<ActorPath>,
    /// Intended recipient.
    pub recipient: ActorPath,
    /// Why it was not delivered.
    pub reason: DeadLetterReason,
}

impl Event for DeadLetter {}

/// Publishing side of the dead-letter channel.
#[derive(Debug, Clone)]
pub(crate) struct DeadLetters {
    sender: broadcast::Sender<DeadLetter>,
    log: bool,
}

impl DeadLetters {
    /// Channel keeping at most `capacity` letters for slow subscribers.
    pub fn new(capacity: usize, log: bool) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender, log }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DeadLetter> {
        self.sender.subscribe()
    }

    /// Logs and publishes a dead letter. Nobody listening is fine.
    pub fn publish(&self, letter: DeadLetter) {
        if self.log {
            warn!(
                "Dead letter: {} from {:?} to {} ({:?}).",
                letter.message,
                letter.sender.as_ref().map(|p| p.to_string()),
                letter.recipient,
                letter.reason
            );
        }
        let _ = self.sender.send(letter);
    }

    /// Publishes an undelivered user message.
    pub fn envelope(&self, envelope: &Envelope, reason: DeadLetterReason) {
        self.publish(DeadLetter {
            message: envelope.message.type_name().to_owned(),
            sender: envelope.sender.as_ref().map(|s| s.path().clone()),
            recipient: envelope.recipient.clone(),
            reason,
        });
    }

    /// Handles a system message that reached a dead recipient.
    ///
    /// A `Watch` on the dead recipient is answered right away with a notification whose
    /// `existence_confirmed` is false. `Unwatch` is dropped silently.
    pub fn system_message(
        &self,
        message: SystemMessage,
        recipient: &ActorPath,
        reason: DeadLetterReason,
    ) {
        match message {
            SystemMessage::Watch { watchee, watcher } => {
                if watchee.path().same_actor(recipient)
                    && !watcher.path().same_actor(recipient)
                {
                    debug!(
                        "Watch of {} by {} on a dead actor, notifying.",
                        recipient,
                        watcher.path()
                    );
                    watcher.send_system_message(
                        SystemMessage::DeathWatchNotification {
                            actor: watchee,
                            existence_confirmed: false,
                            address_terminated: false,
                        },
                    );
                }
            }
            SystemMessage::Unwatch { .. } => {}
            other => {
                debug!(
                    "System message {} to {} is a dead letter.",
                    other.kind(),
                    recipient
                );
                let _ = self.sender.send(DeadLetter {
                    message: other.kind().to_owned(),
                    sender: None,
                    recipient: recipient.clone(),
                    reason,
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {

    use super::*;
    use crate::message::AnyMessage;

    use tracing_test::traced_test;

    #[tokio::test]
    #[traced_test]
    async fn test_publish_dead_letter() {
        let dead_letters = DeadLetters::new(8, true);
        let mut receiver = dead_letters.subscribe();
        let envelope = Envelope::new(
            AnyMessage::new("hello".to_owned()),
            None,
            ActorPath::from("/user/gone"),
        );
        dead_letters.envelope(&envelope, DeadLetterReason::Terminated);

        let letter = receiver.recv().await.unwrap();
        assert_eq!(letter.recipient, ActorPath::from("/user/gone"));
        assert_eq!(letter.reason, DeadLetterReason::Terminated);
        assert!(letter.message.contains("String"));
        assert!(logs_contain("Dead letter"));
    }

    #[tokio::test]
    async fn test_system_dead_letter() {
        let dead_letters = DeadLetters::new(0, false);
        let mut receiver = dead_letters.subscribe();
        dead_letters.system_message(
            SystemMessage::Terminate,
            &ActorPath::from("/user/gone"),
            DeadLetterReason::NoSuchActor,
        );
        dead_letters.system_message(
            SystemMessage::Unwatch {
                watchee: crate::ActorRef::nobody(),
                watcher: crate::ActorRef::nobody(),
            },
            &ActorPath::from("/user/gone"),
            DeadLetterReason::NoSuchActor,
        );
        let letter = receiver.recv().await.unwrap();
        assert_eq!(letter.message, "Terminate");
        assert!(receiver.try_recv().is_err());
    }
}
