// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! Event sink and subscriber pattern.
//!
//! The runtime publishes observable events, such as dead letters, on broadcast channels. A
//! [`Sink`] drains one such channel in its own task and hands every event to a
//! [`Subscriber`].

use async_trait::async_trait;
use serde::{Serialize, de::DeserializeOwned};
use tokio::sync::broadcast::{Receiver as EventReceiver, error::RecvError};

use tracing::debug;

use std::fmt::Debug;

/// Values published by the runtime on its broadcast channels.
pub trait Event:
    Serialize + DeserializeOwned + Debug + Clone + Send + Sync + 'static
{
}

/// A sink that receives events from a channel and notifies a subscriber.
///
/// # Type Parameters
///
/// * `E` - The event type that this sink will process.
///
pub struct Sink<E: Event> {
    /// The subscriber that will be notified of events.
    subscriber: Box<dyn Subscriber<E>>,
    /// The broadcast receiver of the events.
    event_receiver: EventReceiver<E>,
}

impl<E: Event> Sink<E> {
    /// Creates a new Sink with the given event receiver and subscriber.
    ///
    /// # Arguments
    ///
    /// * `event_receiver` - Broadcast receiver, e.g. from [`crate::SystemRef::dead_letters`].
    /// * `subscriber` - Implementation of the Subscriber trait that will process events.
    ///
    pub fn new(
        event_receiver: EventReceiver<E>,
        subscriber: impl Subscriber<E>,
    ) -> Self {
        Sink {
            subscriber: Box::new(subscriber),
            event_receiver,
        }
    }

    /// Runs the event processing loop until the channel is closed. Events missed while
    /// lagging behind are skipped.
    pub async fn run(&mut self) {
        loop {
            match self.event_receiver.recv().await {
                Ok(event) => {
                    debug!(
                        "Received event: {:?}. Notify to the subscriber.",
                        event
                    );
                    self.subscriber.notify(event).await;
                }
                Err(RecvError::Closed) => break,
                Err(RecvError::Lagged(skipped)) => {
                    debug!("Sink lagged behind, {} events skipped.", skipped);
                    continue;
                }
            }
        }
    }
}

/// Receives the events drained by a [`Sink`].
///
/// # Type Parameters
///
/// * `E` - The event type this subscriber can process.
///
#[async_trait]
pub trait Subscriber<E: Event>: Send + Sync + 'static {
    /// Called for every event received by the sink.
    async fn notify(&self, event: E);
}

#[cfg(test)]
mod tests {

    use super::*;
    use crate::{ActorPath, DeadLetter, DeadLetterReason};

    use tokio::sync::{Mutex, broadcast};

    use std::sync::Arc;

    #[derive(Clone, Default)]
    struct Collector {
        events: Arc<Mutex<Vec<DeadLetter>>>,
    }

    #[async_trait]
    impl Subscriber<DeadLetter> for Collector {
        async fn notify(&self, event: DeadLetter) {
            self.events.lock().await.push(event);
        }
    }

    fn letter(name: &str) -> DeadLetter {
        DeadLetter {
            message: "u32".to_owned(),
            sender: None,
            recipient: ActorPath::from("/user") / name,
            reason: DeadLetterReason::NoSuchActor,
        }
    }

    #[tokio::test]
    async fn test_sink_drains_until_closed() {
        let (sender, receiver) = broadcast::channel(8);
        let collector = Collector::default();
        let mut sink = Sink::new(receiver, collector.clone());

        sender.send(letter("a")).unwrap();
        sender.send(letter("b")).unwrap();
        drop(sender);
        sink.run().await;

        let events = collector.events.lock().await;
        assert_eq!(events.len(), 2);
        assert_eq!(events[1].recipient, ActorPath::from("/user/b"));
    }

    #[tokio::test]
    async fn test_sink_skips_lagged_events() {
        let (sender, receiver) = broadcast::channel(2);
        let collector = Collector::default();
        let mut sink = Sink::new(receiver, collector.clone());

        for name in ["a", "b", "c", "d"] {
            sender.send(letter(name)).unwrap();
        }
        drop(sender);
        sink.run().await;

        let events = collector.events.lock().await;
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].recipient, ActorPath::from("/user/c"));
    }
}
