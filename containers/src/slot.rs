use derivative::Derivative;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;

/// Generational index into a [`super::arena::SlotArena`]
///
/// Slots are plain integers and never own the data they point at; a slot
/// whose generation no longer matches the arena's resolves to nothing.
#[derive(Derivative)]
#[derivative(Debug, PartialEq, Eq, Hash)]
pub struct Slot<T> {
    id: usize,
    generation: usize,
    #[derivative(
        Debug = "ignore",
        PartialEq = "ignore",
        Hash = "ignore",
    )]
    _marker: PhantomData<T>,
}

impl<T> Clone for Slot<T> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            generation: self.generation,
            _marker: Default::default(),
        }
    }
}

impl<T> Slot<T> {
    pub fn new(id: usize, generation: usize) -> Self {
        Self {
            id,
            generation,
            _marker: Default::default(),
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn generation(&self) -> usize {
        self.generation
    }
}
