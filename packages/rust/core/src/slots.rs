//! Per-paragraph generation slots.
//!
//! At most one attempt per paragraph runs at a time. Waiters queue on a
//! fair `tokio` mutex, so attempts run in the order they were scheduled.
//! Entries are dropped from the map once nobody holds or awaits them.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use studyqa_shared::ParagraphId;

#[derive(Default)]
pub(crate) struct GenerationSlots {
    slots: Mutex<HashMap<ParagraphId, Arc<AsyncMutex<()>>>>,
}

impl GenerationSlots {
    /// Wait until the paragraph's slot is free and take it.
    pub(crate) async fn acquire(&self, id: ParagraphId) -> SlotGuard<'_> {
        let slot = {
            let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
            Arc::clone(slots.entry(id).or_default())
        };
        let guard = slot.lock_owned().await;
        SlotGuard {
            slots: self,
            id,
            guard: Some(guard),
        }
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.slots.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

/// Holds a paragraph's slot; releases it on drop.
pub(crate) struct SlotGuard<'a> {
    slots: &'a GenerationSlots,
    id: ParagraphId,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for SlotGuard<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());
        let mut slots = self.slots.slots.lock().unwrap_or_else(|e| e.into_inner());
        // Only the map's own reference left: no holder, no waiter.
        if slots
            .get(&self.id)
            .is_some_and(|slot| Arc::strong_count(slot) == 1)
        {
            slots.remove(&self.id);
        }
    }
}
