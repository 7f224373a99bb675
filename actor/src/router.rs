// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Router
//!
//! Bridges references and the transport. Outbound, it turns a message for a remote path
//! into a frame; inbound, it turns a frame back into a local delivery. Nothing that goes
//! wrong on either side reaches the sender: failures end up in the dead letters.
//!

use crate::{
    ActorPath, ActorRef, Error,
    codec::EncodedValue,
    dead_letter::{DeadLetter, DeadLetterReason},
    message::AnyMessage,
    system::SystemRef,
    system_message::SystemMessage,
    transport::{DeathWatchFlags, EnvelopeKind, Transport, TransportEnvelope},
};

use tracing::{debug, warn};

use std::sync::Arc;

pub(crate) struct Router {
    transport: Option<Arc<dyn Transport>>,
}

impl Router {
    pub fn new(transport: Option<Arc<dyn Transport>>) -> Self {
        Self { transport }
    }

    /// Sends a user message to a remote actor.
    pub fn send_tell(
        &self,
        system: &SystemRef,
        recipient: &ActorPath,
        message: AnyMessage,
        sender: Option<ActorRef>,
    ) {
        let sender_path = sender
            .filter(|sender| !sender.is_nobody())
            .map(|sender| sender.path().globalize(system.address()));
        let type_name = message.type_name();
        let encoded = system.with_codec_context(|codec, ctx| codec.encode(&message, ctx));
        let result = encoded.and_then(|message| {
            self.forward(TransportEnvelope {
                kind: EnvelopeKind::Tell,
                sender: sender_path.clone(),
                receiver: recipient.clone(),
                message,
            })
        });
        if let Err(error) = result {
            system.dead_letter_channel().publish(DeadLetter {
                message: type_name.to_owned(),
                sender: sender_path,
                recipient: recipient.clone(),
                reason: reason_of(error),
            });
        }
    }

    /// Sends a death-watch system message to a remote actor.
    pub fn send_system(
        &self,
        system: &SystemRef,
        recipient: &ActorPath,
        message: SystemMessage,
    ) {
        let address = system.address();
        let envelope = match &message {
            SystemMessage::Watch { watcher, .. } => unit_frame(
                EnvelopeKind::Watch,
                watcher.path().globalize(address),
                recipient,
            ),
            SystemMessage::Unwatch { watcher, .. } => unit_frame(
                EnvelopeKind::Unwatch,
                watcher.path().globalize(address),
                recipient,
            ),
            SystemMessage::DeathWatchNotification {
                actor,
                existence_confirmed,
                address_terminated,
            } => bincode::serialize(&DeathWatchFlags {
                existence_confirmed: *existence_confirmed,
                address_terminated: *address_terminated,
            })
            .map_err(Error::from)
            .map(|payload| TransportEnvelope {
                kind: EnvelopeKind::DeathWatchNotification,
                sender: Some(actor.path().globalize(address)),
                receiver: recipient.clone(),
                message: EncodedValue {
                    tag: "death-watch".to_owned(),
                    payload,
                },
            }),
            other => Err(Error::Send(format!(
                "{} cannot cross workers",
                other.kind()
            ))),
        };
        if let Err(error) = envelope.and_then(|envelope| self.forward(envelope)) {
            system.dead_letter_channel().system_message(
                message,
                recipient,
                reason_of(error),
            );
        }
    }

    fn forward(&self, envelope: TransportEnvelope) -> Result<(), Error> {
        let transport = self.transport.as_ref().ok_or_else(|| {
            Error::Transport("worker is not connected".to_owned())
        })?;
        let frame = envelope.to_bytes()?;
        transport.send(envelope.receiver.address(), frame)
    }

    /// Delivers a frame received from another worker.
    pub fn receive(&self, system: &SystemRef, frame: &[u8]) {
        let envelope = match TransportEnvelope::from_bytes(frame) {
            Ok(envelope) => envelope,
            Err(error) => {
                warn!("Dropping undecodable frame: {}", error);
                return;
            }
        };
        let recipient = system.resolve_local(&envelope.receiver);
        let sender = envelope.sender.as_ref().map(|path| system.resolve(path));
        debug!(
            "Frame {:?} from {:?} to {}.",
            envelope.kind,
            envelope.sender,
            envelope.receiver
        );

        match envelope.kind {
            EnvelopeKind::Tell => {
                let decoded = system.with_codec_context(|codec, ctx| {
                    codec.decode(&envelope.message, ctx)
                });
                match decoded {
                    Ok(message) => recipient.tell(message, sender),
                    Err(error) => {
                        system.dead_letter_channel().publish(DeadLetter {
                            message: envelope.message.tag.clone(),
                            sender: envelope.sender.clone(),
                            recipient: envelope.receiver.clone(),
                            reason: reason_of(error),
                        })
                    }
                }
            }
            EnvelopeKind::Watch | EnvelopeKind::Unwatch => {
                let Some(watcher) = sender else {
                    warn!("Dropping {:?} frame without sender.", envelope.kind);
                    return;
                };
                let message = if envelope.kind == EnvelopeKind::Watch {
                    SystemMessage::Watch {
                        watchee: recipient.clone(),
                        watcher,
                    }
                } else {
                    SystemMessage::Unwatch {
                        watchee: recipient.clone(),
                        watcher,
                    }
                };
                recipient.send_system_message(message);
            }
            EnvelopeKind::DeathWatchNotification => {
                let Some(actor) = sender else {
                    warn!("Dropping death watch frame without sender.");
                    return;
                };
                match bincode::deserialize::<DeathWatchFlags>(
                    &envelope.message.payload,
                ) {
                    Ok(flags) => recipient.send_system_message(
                        SystemMessage::DeathWatchNotification {
                            actor,
                            existence_confirmed: flags.existence_confirmed,
                            address_terminated: flags.address_terminated,
                        },
                    ),
                    Err(error) => {
                        warn!("Dropping malformed death watch frame: {}", error)
                    }
                }
            }
        }
    }
}

fn unit_frame(
    kind: EnvelopeKind,
    sender: ActorPath,
    recipient: &ActorPath,
) -> Result<TransportEnvelope, Error> {
    Ok(TransportEnvelope {
        kind,
        sender: Some(sender),
        receiver: recipient.clone(),
        message: EncodedValue {
            tag: "unit".to_owned(),
            payload: bincode::serialize(&())?,
        },
    })
}

fn reason_of(error: Error) -> DeadLetterReason {
    match error {
        Error::Codec(reason) => DeadLetterReason::Codec(reason),
        Error::Transport(reason) => DeadLetterReason::Transport(reason),
        _ => DeadLetterReason::Unsupported,
    }
}
