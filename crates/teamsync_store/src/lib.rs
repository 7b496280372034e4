//! # teamsync store
//!
//! The local entity store used by the sync engine.
//!
//! The engine only relies on the [`LocalStore`] contract: read everything,
//! upsert a complete set, clear. Durability is the implementation's concern.
//!
//! ## Available Stores
//!
//! - [`InMemoryStore`] - For testing and ephemeral dashboards
//! - [`FileStore`] - A JSON snapshot replaced atomically on every write
//!
//! ## Example
//!
//! ```rust
//! use teamsync_model::EntitySet;
//! use teamsync_store::{InMemoryStore, LocalStore};
//!
//! let store = InMemoryStore::new();
//! store.bulk_upsert(&EntitySet::new()).unwrap();
//! assert!(store.read_all().unwrap().is_empty());
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod file;
mod memory;
mod store;

pub use error::{StoreError, StoreResult};
pub use file::FileStore;
pub use memory::InMemoryStore;
pub use store::LocalStore;
