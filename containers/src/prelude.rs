pub use super::arena::SlotArena;
pub use super::error;
pub use super::slot::Slot;
pub use dashmap;
