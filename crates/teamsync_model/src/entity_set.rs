//! The complete local entity state and the shape of a remote fetch.

use crate::entity::{ExternalId, LocalMember, LocalTask, LocalTimeEntry, Member, Task, TimeEntry};
use crate::error::{ModelError, ModelResult};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// All locally cached entities.
///
/// Maps are ordered by [`ExternalId`] so iteration and serialization are
/// deterministic: two equal sets always serialize to identical bytes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntitySet {
    /// Members by id.
    #[serde(default)]
    pub members: BTreeMap<ExternalId, LocalMember>,
    /// Tasks by id.
    #[serde(default)]
    pub tasks: BTreeMap<ExternalId, LocalTask>,
    /// Time entries by id.
    #[serde(default)]
    pub time_entries: BTreeMap<ExternalId, LocalTimeEntry>,
}

impl EntitySet {
    /// Creates an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of records across all kinds.
    pub fn len(&self) -> usize {
        self.members.len() + self.tasks.len() + self.time_entries.len()
    }

    /// Returns true if no records are cached.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Looks up a member.
    pub fn member(&self, id: &ExternalId) -> Option<&LocalMember> {
        self.members.get(id)
    }

    /// Looks up a task.
    pub fn task(&self, id: &ExternalId) -> Option<&LocalTask> {
        self.tasks.get(id)
    }

    /// Iterates the time entries tracked by one member.
    pub fn entries_for_member<'a>(
        &'a self,
        member_id: &'a ExternalId,
    ) -> impl Iterator<Item = &'a LocalTimeEntry> + 'a {
        self.time_entries
            .values()
            .filter(move |e| &e.record.member_id == member_id)
    }

    /// Overlays every record of `other` onto `self`, replacing by id.
    pub fn upsert_all(&mut self, other: &EntitySet) {
        for (id, member) in &other.members {
            self.members.insert(id.clone(), member.clone());
        }
        for (id, task) in &other.tasks {
            self.tasks.insert(id.clone(), task.clone());
        }
        for (id, entry) in &other.time_entries {
            self.time_entries.insert(id.clone(), entry.clone());
        }
    }

    /// Serializes the set to its canonical JSON form.
    pub fn to_canonical_json(&self) -> ModelResult<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| ModelError::Serialization(e.to_string()))
    }

    /// Returns the lowercase hex SHA-256 of the canonical JSON form.
    pub fn digest(&self) -> ModelResult<String> {
        let bytes = self.to_canonical_json()?;
        let hash = Sha256::digest(&bytes);
        Ok(hash.iter().map(|b| format!("{b:02x}")).collect())
    }
}

/// Records returned by one round of remote calls, as received.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteBatch {
    /// Members.
    #[serde(default)]
    pub members: Vec<Member>,
    /// Tasks.
    #[serde(default)]
    pub tasks: Vec<Task>,
    /// Time entries.
    #[serde(default)]
    pub time_entries: Vec<TimeEntry>,
}

impl RemoteBatch {
    /// Creates an empty batch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of records in the batch.
    pub fn len(&self) -> usize {
        self.members.len() + self.tasks.len() + self.time_entries.len()
    }

    /// Returns true if the batch carries no records.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
