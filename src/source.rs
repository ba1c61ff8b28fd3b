use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

use crate::types::{Id, Pointer, TimeStamp, VersionNumber};

/// Globally unique `(scope, label, value)` triple: at any time at most one entity holds a given lease.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Lease {
    pub scope: String,
    pub label: String,
    pub value: String,
}

impl Lease {
    pub fn new(scope: impl Into<String>, label: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            scope: scope.into(),
            label: label.into(),
            value: value.into(),
        }
    }
}

impl Display for Lease {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {}, {})", self.scope, self.label, self.value)
    }
}

/// Non-unique `(label, value)` pair, used as a secondary index.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Tag {
    pub label: String,
    pub value: String,
}

impl Tag {
    pub fn new(label: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            value: value.into(),
        }
    }
}

impl Display for Tag {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.label, self.value)
    }
}

/// One state transition of one entity, along with the lease and tag changes it brings.
///
/// Deletions are always applied before insertions.
#[derive(Debug, Clone, PartialEq)]
pub struct Message<D> {
    pub id: Id,
    pub entity_id: Id,
    pub expected_previous_version: VersionNumber,
    pub delta: D,
    pub add_leases: Vec<Lease>,
    pub delete_leases: Vec<Lease>,
    pub add_tags: Vec<Tag>,
    pub delete_tags: Vec<Tag>,
}

impl<D> Message<D> {
    pub fn new(entity_id: Id, expected_previous_version: VersionNumber, delta: D) -> Self {
        Self {
            id: Id::new(),
            entity_id,
            expected_previous_version,
            delta,
            add_leases: vec![],
            delete_leases: vec![],
            add_tags: vec![],
            delete_tags: vec![],
        }
    }

    /// The version the entity reaches once this message is committed.
    pub const fn entity_version(&self) -> VersionNumber {
        self.expected_previous_version.next()
    }

    pub const fn entity_pointer(&self) -> Pointer {
        Pointer::new(self.entity_id, self.entity_version())
    }
}

/// An atomically committed batch of messages.
#[derive(Debug, Clone, PartialEq)]
pub struct Source<D, A> {
    pub id: Id,
    pub time_stamp: TimeStamp,
    pub agent_signature: A,
    pub messages: Vec<Message<D>>,
}

impl<D, A> Source<D, A> {
    pub fn entity_pointers(&self) -> Vec<Pointer> {
        self.messages.iter().map(Message::entity_pointer).collect()
    }
}

/// The actor committing a source.
#[derive(Debug, Clone, PartialEq)]
pub struct Agent<A> {
    pub time_stamp: TimeStamp,
    pub signature: A,
}

/// Data read from one committed message, along with where it comes from.
#[derive(Debug, Clone, PartialEq)]
pub struct AnnotatedMessageData<T> {
    pub source_id: Id,
    pub source_time_stamp: TimeStamp,
    pub message_id: Id,
    pub entity_id: Id,
    pub entity_version: VersionNumber,
    pub data: T,
}

impl<T> AnnotatedMessageData<T> {
    pub const fn entity_pointer(&self) -> Pointer {
        Pointer::new(self.entity_id, self.entity_version)
    }
}

/// Data read from one committed source, along with the entity states it produced.
#[derive(Debug, Clone, PartialEq)]
pub struct AnnotatedSourceData<T> {
    pub source_id: Id,
    pub source_time_stamp: TimeStamp,
    pub entity_pointers: Vec<Pointer>,
    pub data: T,
}
