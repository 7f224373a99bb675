// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Mailbox
//!
//! Per-cell queues. User messages wait in a FIFO queue gated by the status word, system
//! messages in a separate queue that the cell drains as a priority class.
//!

use crate::{message::Envelope, system_message::SystemMessage};

use std::collections::VecDeque;

/// Status word of a mailbox.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MailboxStatus {
    /// User messages are processed.
    Open,
    /// At least one suspension is pending.
    Suspended,
    /// Suspended while the cell waits for children to terminate.
    SuspendedWaitingForChildren,
    /// The cell terminated. Nothing is accepted anymore.
    Closed,
}

/// Queues owned by one cell.
#[derive(Debug, Default)]
pub struct Mailbox {
    user: VecDeque<Envelope>,
    system: VecDeque<SystemMessage>,
    suspend_count: u32,
    waiting_for_children: bool,
    closed: bool,
}

impl Mailbox {
    /// Creates an open, empty mailbox.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current status word.
    pub fn status(&self) -> MailboxStatus {
        if self.closed {
            MailboxStatus::Closed
        } else if self.waiting_for_children {
            MailboxStatus::SuspendedWaitingForChildren
        } else if self.suspend_count > 0 {
            MailboxStatus::Suspended
        } else {
            MailboxStatus::Open
        }
    }

    /// Appends a user message. A closed mailbox gives the envelope back.
    pub fn enqueue(&mut self, envelope: Envelope) -> Result<(), Envelope> {
        if self.closed {
            Err(envelope)
        } else {
            self.user.push_back(envelope);
            Ok(())
        }
    }

    /// Appends a system message. A closed mailbox gives the message back.
    pub fn system_enqueue(
        &mut self,
        message: SystemMessage,
    ) -> Result<(), SystemMessage> {
        if self.closed {
            Err(message)
        } else {
            self.system.push_back(message);
            Ok(())
        }
    }

    /// Next user message, if user processing is allowed.
    pub fn dequeue(&mut self) -> Option<Envelope> {
        if self.should_process_message() {
            self.user.pop_front()
        } else {
            None
        }
    }

    /// Takes every pending system message, oldest first.
    pub fn drain_system(&mut self) -> VecDeque<SystemMessage> {
        std::mem::take(&mut self.system)
    }

    /// True if system messages are pending.
    pub fn has_system_messages(&self) -> bool {
        !self.system.is_empty()
    }

    /// True if user messages are pending, processable or not.
    pub fn has_messages(&self) -> bool {
        !self.user.is_empty()
    }

    /// Number of pending user messages.
    pub fn number_of_messages(&self) -> usize {
        self.user.len()
    }

    /// True if a user message may be processed now.
    pub fn should_process_message(&self) -> bool {
        !self.closed && self.suspend_count == 0
    }

    /// True if the cell has work for a scheduler turn.
    pub fn can_be_scheduled(&self) -> bool {
        self.has_system_messages()
            || (self.should_process_message() && self.has_messages())
    }

    /// Adds one suspension.
    pub fn suspend(&mut self) {
        self.suspend_count = self.suspend_count.saturating_add(1);
    }

    /// Removes one suspension. Returns true when the mailbox became processable.
    pub fn resume(&mut self) -> bool {
        self.suspend_count = self.suspend_count.saturating_sub(1);
        self.suspend_count == 0
    }

    /// True while at least one suspension is pending.
    pub fn is_suspended(&self) -> bool {
        self.suspend_count > 0
    }

    /// Marks whether the cell waits for children to terminate.
    pub fn set_waiting_for_children(&mut self, waiting: bool) {
        self.waiting_for_children = waiting;
    }

    /// True once closed.
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Closes the mailbox. Returns the user and system messages left behind.
    pub fn close(&mut self) -> (Vec<Envelope>, Vec<SystemMessage>) {
        self.closed = true;
        (self.user.drain(..).collect(), self.system.drain(..).collect())
    }
}
