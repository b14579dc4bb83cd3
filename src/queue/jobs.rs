// Queue state machine: FIFO of pending questions plus Idle/Draining state

use serde::Serialize;
use std::collections::VecDeque;

use crate::models::Message;

/// An enqueued user question awaiting its analysis call.
#[derive(Debug, Clone)]
pub struct PendingRequest {
    pub message: Message,
}

impl PendingRequest {
    pub fn question(&self) -> &str {
        &self.message.content
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueState {
    #[default]
    Idle,
    Draining,
}

/// The head of the FIFO stays queued while its call is in flight and is
/// removed only when that call settles.
#[derive(Debug, Default)]
pub struct MessageQueue {
    pending: VecDeque<PendingRequest>,
    state: QueueState,
    in_flight: bool,
}

impl MessageQueue {
    pub fn push(&mut self, request: PendingRequest) {
        self.pending.push_back(request);
    }

    /// Marks the head as dispatched. `None` while a call is already in
    /// flight or the FIFO is empty.
    pub fn start_next(&mut self) -> Option<&PendingRequest> {
        if self.in_flight {
            return None;
        }
        let head = self.pending.front()?;
        self.in_flight = true;
        self.state = QueueState::Draining;
        Some(head)
    }

    /// Removes the settled head. Stays `Draining` while more work is queued.
    pub fn settle(&mut self) -> Option<PendingRequest> {
        if !self.in_flight {
            return None;
        }
        self.in_flight = false;
        let settled = self.pending.pop_front();
        if self.pending.is_empty() {
            self.state = QueueState::Idle;
        }
        settled
    }

    pub fn clear(&mut self) {
        self.pending.clear();
        self.in_flight = false;
        self.state = QueueState::Idle;
    }

    pub fn state(&self) -> QueueState {
        self.state
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight
    }
}
