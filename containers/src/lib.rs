pub mod arena;
pub mod error;
pub mod prelude;
pub mod slot;

pub use dashmap;
