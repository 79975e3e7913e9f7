//! Arena holding every future of a runtime, addressed by [`FutureId`].
//!
//! Continuations refer to their derived future by id rather than by handle,
//! so a future never owns a reference back into its own runtime.
use std::fmt;

use crate::state::{ErasedSlot, Slot, Status};

/// Arena index of a future.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct FutureId(usize);

impl FutureId {
    pub fn from_index(index: usize) -> Self {
        FutureId(index)
    }

    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for FutureId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "future#{}", self.0)
    }
}

#[derive(Default)]
pub(crate) struct FutureArena {
    slots: Vec<Box<dyn ErasedSlot>>,
}

impl FutureArena {
    pub fn new() -> Self {
        Self { slots: Vec::new() }
    }

    pub fn alloc<T: Clone + 'static, E: Clone + 'static>(&mut self) -> FutureId {
        let id = FutureId::from_index(self.slots.len());
        self.slots.push(Box::new(Slot::<T, E>::new()));
        id
    }

    pub fn get<T: 'static, E: 'static>(&self, id: FutureId) -> Option<&Slot<T, E>> {
        self.slots
            .get(id.index())
            .and_then(|slot| slot.as_any().downcast_ref())
    }

    pub fn get_mut<T: 'static, E: 'static>(&mut self, id: FutureId) -> Option<&mut Slot<T, E>> {
        self.slots
            .get_mut(id.index())
            .and_then(|slot| slot.as_any_mut().downcast_mut())
    }

    pub fn status(&self, id: FutureId) -> Option<Status> {
        self.slots.get(id.index()).map(|slot| slot.status())
    }

    pub fn waiting(&self, id: FutureId) -> usize {
        self.slots.get(id.index()).map_or(0, |slot| slot.waiting())
    }

    pub fn unhandled_rejections(&self) -> Vec<FutureId> {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.is_unhandled_rejection())
            .map(|(index, _)| FutureId::from_index(index))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

impl fmt::Debug for FutureArena {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FutureArena")
            .field("futures", &self.slots.len())
            .finish()
    }
}
