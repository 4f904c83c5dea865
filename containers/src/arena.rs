use crate::error::ContainerErrors;
use crate::slot::Slot;

struct SlotUnion<T> {
    slot: Slot<T>,
    data: Option<T>,
}

/// Sparse generational arena
///
/// Freed slots are recycled with a bumped generation, so outstanding [`Slot`]
/// handles to removed entries go stale instead of aliasing the new occupant.
pub struct SlotArena<T: 'static> {
    data: Vec<SlotUnion<T>>,
    free_list: Vec<Slot<T>>,
}

impl<T: 'static> SlotArena<T> {
    pub fn new() -> Self {
        Self {
            data: Vec::new(),
            free_list: Vec::new(),
        }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: Vec::with_capacity(capacity),
            free_list: Vec::new(),
        }
    }

    pub fn insert(&mut self, element: T) -> Slot<T> {
        let next_free_slot = self.free_list.pop().unwrap_or_else(|| {
            let slot = Slot::new(self.data.len(), 0);
            self.data.push(SlotUnion {
                slot: slot.clone(),
                data: None,
            });
            slot
        });
        self.data
            .get_mut(next_free_slot.id())
            .as_mut()
            .unwrap()
            .data = Some(element);
        next_free_slot
    }

    pub fn is_valid(&self, slot: &Slot<T>) -> bool {
        self.data
            .get(slot.id())
            .map(|union| union.slot == *slot && union.data.is_some())
            .unwrap_or(false)
    }

    pub fn get(&self, slot: &Slot<T>) -> Option<&T> {
        self.data
            .get(slot.id())
            .filter(|union| union.slot == *slot)
            .and_then(|union| union.data.as_ref())
    }

    pub fn get_mut(&mut self, slot: &Slot<T>) -> Option<&mut T> {
        self.data
            .get_mut(slot.id())
            .filter(|union| union.slot == *slot)
            .and_then(|union| union.data.as_mut())
    }

    pub fn remove(&mut self, slot: Slot<T>) -> anyhow::Result<T> {
        self.data
            .get_mut(slot.id())
            .filter(|union| union.slot == slot && union.data.is_some())
            .map(|union| {
                union.slot = Slot::new(slot.id(), slot.generation() + 1);
                self.free_list.push(union.slot.clone());
                Ok(union.data.take().unwrap())
            })
            .unwrap_or(Err(anyhow::Error::from(ContainerErrors::NonexistentSlot)))
    }

    /// Number of occupied slots
    pub fn len(&self) -> usize {
        self.data.iter().filter(|union| union.data.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops every entry and invalidates all outstanding slots
    pub fn clear(&mut self) {
        self.data.clear();
        self.free_list.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = (Slot<T>, &T)> {
        self.data
            .iter()
            .filter_map(|union| union.data.as_ref().map(|data| (union.slot.clone(), data)))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (Slot<T>, &mut T)> {
        self.data
            .iter_mut()
            .filter_map(|union| union.data.as_mut().map(|data| (union.slot.clone(), data)))
    }
}

impl<T: 'static> Default for SlotArena<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_and_get() {
        let mut arena: SlotArena<u32> = SlotArena::new();
        let a = arena.insert(1);
        let b = arena.insert(2);
        assert_eq!(arena.get(&a), Some(&1));
        assert_eq!(arena.get(&b), Some(&2));
        assert_eq!(arena.len(), 2);
    }

    #[test]
    fn removed_slots_go_stale() {
        let mut arena: SlotArena<u32> = SlotArena::new();
        let a = arena.insert(1);
        assert_eq!(arena.remove(a.clone()).unwrap(), 1);
        assert!(!arena.is_valid(&a));
        assert_eq!(arena.get(&a), None);

        // The freed slot is recycled under a new generation
        let b = arena.insert(2);
        assert_eq!(b.id(), a.id());
        assert_ne!(b.generation(), a.generation());
        assert_eq!(arena.get(&a), None);
        assert_eq!(arena.get(&b), Some(&2));
    }

    #[test]
    fn double_remove_fails() {
        let mut arena: SlotArena<u32> = SlotArena::new();
        let a = arena.insert(1);
        arena.remove(a.clone()).unwrap();
        assert!(arena.remove(a).is_err());
    }

    #[test]
    fn clear_invalidates_everything() {
        let mut arena: SlotArena<u32> = SlotArena::new();
        let a = arena.insert(1);
        let b = arena.insert(2);
        arena.clear();
        assert!(arena.is_empty());
        assert_eq!(arena.get(&a), None);
        assert_eq!(arena.get(&b), None);
    }

    #[test]
    fn iter_skips_vacant() {
        let mut arena: SlotArena<u32> = SlotArena::new();
        let _a = arena.insert(1);
        let b = arena.insert(2);
        let _c = arena.insert(3);
        arena.remove(b).unwrap();
        let mut seen: Vec<u32> = arena.iter().map(|(_, v)| *v).collect();
        seen.sort();
        assert_eq!(seen, vec![1, 3]);
    }
}
