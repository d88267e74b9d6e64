//! Run-scoped state: item slots and the in-order flush cursor.
//!
//! [`AggregationRun`] is a plain state machine with no I/O. The driver feeds
//! it fetch completions one at a time and forwards whatever it hands back
//! from [`AggregationRun::mark_received`] to the consumer.

use thiserror::Error;

use crate::types::{Container, ItemRecord};

/// Lifecycle of one item slot
///
/// Only `Pending -> Received -> Flushed` and `Pending -> Failed` are legal.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SlotState {
    /// Fetch not issued or not yet resolved
    Pending,
    /// Payload received, waiting for every predecessor to be delivered
    Received,
    /// Delivered to the consumer
    Flushed,
    /// Fetch failed; blocks delivery of every later slot
    Failed,
}

/// Tracking record for one position of the container's item list
#[derive(Clone, Debug)]
pub struct ItemSlot {
    /// Index into the container's item ids
    pub position: usize,
    /// Item id, copied from the container
    pub id: String,
    /// Current state
    pub state: SlotState,
    /// Payload, present once received
    pub payload: Option<ItemRecord>,
}

/// An item handed to the consumer by a flush
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReadyItem {
    /// Slot position
    pub position: usize,
    /// Item id from the container
    pub id: String,
    /// Item text
    pub text: String,
}

/// Illegal operation on a run
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RunStateError {
    /// A container was already accepted for this run
    #[error("container already received")]
    ContainerAlreadySet,

    /// Slot operation before the container arrived
    #[error("no container received yet")]
    NoContainer,

    /// Position outside the slot list
    #[error("position {position} out of range (len {len})")]
    OutOfRange {
        /// Requested position
        position: usize,
        /// Number of slots
        len: usize,
    },

    /// Transition not allowed from the slot's current state
    #[error("slot {position} cannot go from {from:?} to {to:?}")]
    IllegalTransition {
        /// Slot position
        position: usize,
        /// Current state
        from: SlotState,
        /// Requested state
        to: SlotState,
    },
}

/// All state of one container load
#[derive(Debug, Default)]
pub struct AggregationRun {
    container: Option<Container>,
    slots: Vec<ItemSlot>,
    flush_cursor: usize,
    terminated: bool,
}

impl AggregationRun {
    /// Create an empty run waiting for its container
    pub fn new() -> Self {
        Self::default()
    }

    /// Accept the container and allocate one pending slot per item id
    pub fn accept_container(&mut self, container: Container) -> Result<(), RunStateError> {
        if self.container.is_some() {
            return Err(RunStateError::ContainerAlreadySet);
        }
        self.slots = container
            .item_ids
            .iter()
            .enumerate()
            .map(|(position, id)| ItemSlot {
                position,
                id: id.clone(),
                state: SlotState::Pending,
                payload: None,
            })
            .collect();
        self.container = Some(container);
        Ok(())
    }

    /// All slots in position order
    pub fn slots(&self) -> &[ItemSlot] {
        &self.slots
    }

    /// Index of the next slot eligible for delivery
    pub fn flush_cursor(&self) -> usize {
        self.flush_cursor
    }

    /// Whether the run stopped early because of a failure
    pub fn is_terminated(&self) -> bool {
        self.terminated
    }

    /// Stop the run; no further fetches should be issued for it
    pub fn terminate(&mut self) {
        self.terminated = true;
    }

    /// Record a received payload and deliver whatever became contiguous
    ///
    /// Returns the newly delivered items in position order; empty when the
    /// slot sits behind a gap or a failed slot.
    pub fn mark_received(
        &mut self,
        position: usize,
        payload: ItemRecord,
    ) -> Result<Vec<ReadyItem>, RunStateError> {
        let slot = self.slot_mut(position)?;
        if slot.state != SlotState::Pending {
            return Err(RunStateError::IllegalTransition {
                position,
                from: slot.state,
                to: SlotState::Received,
            });
        }
        slot.state = SlotState::Received;
        slot.payload = Some(payload);
        Ok(self.flush())
    }

    /// Record a failed fetch
    pub fn mark_failed(&mut self, position: usize) -> Result<(), RunStateError> {
        let slot = self.slot_mut(position)?;
        if slot.state != SlotState::Pending {
            return Err(RunStateError::IllegalTransition {
                position,
                from: slot.state,
                to: SlotState::Failed,
            });
        }
        slot.state = SlotState::Failed;
        Ok(())
    }

    /// Deliver contiguous received slots from the flush cursor forward
    ///
    /// Stops at the first pending slot or at a failed slot. A failed slot is
    /// never passed, so nothing after it is ever delivered.
    fn flush(&mut self) -> Vec<ReadyItem> {
        let mut ready = Vec::new();
        while let Some(slot) = self.slots.get_mut(self.flush_cursor) {
            if slot.state != SlotState::Received {
                break;
            }
            let Some(payload) = slot.payload.as_ref() else {
                break;
            };
            ready.push(ReadyItem {
                position: slot.position,
                id: slot.id.clone(),
                text: payload.text.clone(),
            });
            slot.state = SlotState::Flushed;
            self.flush_cursor += 1;
        }
        ready
    }

    /// Number of delivered items
    pub fn delivered(&self) -> usize {
        self.count(SlotState::Flushed)
    }

    /// Number of items received but held back behind a failed slot
    pub fn buffered(&self) -> usize {
        self.count(SlotState::Received)
    }

    /// Positions of failed slots, ascending
    pub fn failed_positions(&self) -> Vec<usize> {
        self.slots
            .iter()
            .filter(|s| s.state == SlotState::Failed)
            .map(|s| s.position)
            .collect()
    }

    /// Whether every item was delivered
    pub fn is_complete(&self) -> bool {
        self.container.is_some() && self.flush_cursor == self.slots.len()
    }

    /// Whether no further progress is possible
    ///
    /// True once the container is in and either the run was terminated or no
    /// slot is still pending.
    pub fn is_settled(&self) -> bool {
        self.container.is_some()
            && (self.terminated || self.slots.iter().all(|s| s.state != SlotState::Pending))
    }

    fn count(&self, state: SlotState) -> usize {
        self.slots.iter().filter(|s| s.state == state).count()
    }

    fn slot_mut(&mut self, position: usize) -> Result<&mut ItemSlot, RunStateError> {
        if self.container.is_none() {
            return Err(RunStateError::NoContainer);
        }
        let len = self.slots.len();
        self.slots
            .get_mut(position)
            .ok_or(RunStateError::OutOfRange { position, len })
    }
}
