use std::collections::VecDeque;
use std::sync::Mutex;

use tracing::warn;

use crate::error::{DnnError, Result};
use crate::operand::Operand;
use crate::runtime::lock;
use crate::runtime::task::LastLevelTask;

/// Reusable execution context: private operand copies plus the unit bound
/// to it while an inference runs.
#[derive(Debug)]
pub(crate) struct RequestSlot {
    pub(crate) operands: Vec<Operand>,
    pub(crate) lltask: Option<LastLevelTask>,
}

impl RequestSlot {
    pub(crate) fn new(templates: &[Operand]) -> Self {
        Self {
            operands: templates.iter().map(Operand::descriptor).collect(),
            lltask: None,
        }
    }

    /// Drop every buffer and the task binding; descriptors are kept.
    pub(crate) fn reset(&mut self) {
        for operand in &mut self.operands {
            operand.release();
        }
        self.lltask = None;
    }
}

/// Fixed-size free list of request slots. Never grows and never blocks.
#[derive(Debug)]
pub(crate) struct RequestPool {
    slots: Mutex<VecDeque<RequestSlot>>,
    capacity: usize,
}

impl RequestPool {
    pub(crate) fn new(templates: &[Operand], capacity: usize) -> Self {
        let slots = (0..capacity).map(|_| RequestSlot::new(templates)).collect();
        Self {
            slots: Mutex::new(slots),
            capacity,
        }
    }

    pub(crate) fn capacity(&self) -> usize {
        self.capacity
    }

    pub(crate) fn acquire(&self) -> Result<RequestSlot> {
        lock(&self.slots).pop_front().ok_or_else(|| {
            warn!(nireq = self.capacity, "all request slots are in use");
            DnnError::NoRequestSlot
        })
    }

    pub(crate) fn release(&self, mut slot: RequestSlot) {
        slot.reset();
        lock(&self.slots).push_back(slot);
    }

    pub(crate) fn free_count(&self) -> usize {
        lock(&self.slots).len()
    }

    pub(crate) fn drain(&self) -> Vec<RequestSlot> {
        lock(&self.slots).drain(..).collect()
    }
}
