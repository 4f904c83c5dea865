//! Package-aware, reference-counted resource cache
//!
//! Assets ship grouped into packages, and a package may depend on other
//! packages; an asset cannot be decoded until its whole dependency closure is
//! resident. [`cache::ResourceCache`] loads packages lazily, shares resident
//! packages between callers, keeps a package alive while any of its assets or
//! any dependent package is in use, and evicts it only after a grace period
//! once it becomes fully unreferenced.

pub mod cache;
pub mod config;
pub mod delay;
pub mod error;
pub mod fetch;
pub mod handle;
pub mod key;
pub mod manifest;
pub mod prelude;
