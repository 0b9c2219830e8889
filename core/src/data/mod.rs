//! Persistent run data: the object store, its on-disk layout, and settings.

pub mod layout;
pub mod settings;
pub mod store;

pub use store::ObjectStore;
