//! # teamsync model
//!
//! Data model shared by the teamsync store and sync engine.
//!
//! This crate provides:
//! - Remote records (`Member`, `Task`, `TimeEntry`) keyed by a stable [`ExternalId`]
//! - Local copies carrying derived fields and an `updated_at_ms` stamp
//! - [`EntitySet`], the complete local state, and [`RemoteBatch`], one fetch result
//! - [`SyncParameters`] and [`DateRange`], the immutable inputs of a sync attempt
//! - [`PendingOperation`], a write deferred while offline
//!
//! This is a pure data crate with no I/O operations.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod entity;
mod entity_set;
mod error;
mod operation;
mod params;

pub use entity::{
    ExternalId, LocalMember, LocalTask, LocalTimeEntry, Member, MemberDerived, MemberStatus, Task,
    TaskDerived, TaskStatus, TimeEntry,
};
pub use entity_set::{EntitySet, RemoteBatch};
pub use error::{ModelError, ModelResult};
pub use operation::{OperationId, OperationPayload, PendingOperation};
pub use params::{DateRange, EntityFilter, SyncParameters, DAY_MS};
