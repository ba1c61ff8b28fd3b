use std::fmt::{Display, Formatter};

use crate::envelope::EnvelopeHeaders;
use crate::source::Lease;
use crate::types::{Id, VersionNumber};

#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Optimistic concurrency conflict. The caller should reload the involved entities and retry.
    #[error("optimistic concurrency conflict: {0}")]
    Conflict(Conflict),
    /// Write attempted on a read-only session.
    #[error("write rejected: the session is read-only")]
    ReadOnly,
    #[error("entity {entity_id} cannot be committed at the reserved version 0")]
    ReservedVersion { entity_id: Id },
    #[error("entity {0} is not known to this transaction")]
    UnknownEntity(Id),
    #[error("entity {0} is already known to this transaction")]
    ExistingEntity(Id),
    #[error("entity {0} has no pending message to attach leases or tags to")]
    NoPendingMessage(Id),
    #[error("no type resolver accepted headers {0}")]
    ResolutionFailed(EnvelopeHeaders),
    #[error("failed to serialize payload of type {type_name}")]
    SerializationFailed {
        type_name: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to deserialize payload of type {type_name}")]
    DeserializationFailed {
        type_name: String,
        #[source]
        source: serde_json::Error,
    },
    /// The entity has no committed state: its version is still zero.
    #[error("entity {0} was never constructed")]
    NotConstructed(Id),
    #[error("operation cancelled")]
    Cancelled,
    /// Transport or backend error raised by a store adapter.
    #[error(transparent)]
    Backend(Box<dyn std::error::Error + Send + Sync>),
}

impl Error {
    /// Whether this error is an expected commit rejection, which commit paths turn into a `false`
    /// outcome instead of propagating.
    pub const fn is_rejection(&self) -> bool {
        matches!(
            self,
            Self::Conflict(_) | Self::ReadOnly | Self::ReservedVersion { .. } | Self::Backend(_)
        )
    }
}

impl From<Conflict> for Error {
    fn from(value: Conflict) -> Self {
        Self::Conflict(value)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Conflict {
    /// The version is already committed for the entity.
    Version { entity_id: Id, version: VersionNumber },
    /// Two messages of the same source claim the same expected previous version.
    DuplicateInBatch {
        entity_id: Id,
        expected_previous_version: VersionNumber,
    },
    /// The lease is already held.
    Lease(Lease),
    /// A source with the same id is already committed.
    Source(Id),
}

impl Display for Conflict {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Version { entity_id, version } => {
                write!(f, "entity {} already has version {}", entity_id, version)
            }
            Self::DuplicateInBatch {
                entity_id,
                expected_previous_version,
            } => write!(
                f,
                "entity {} is appended twice after version {} in the same source",
                entity_id, expected_previous_version
            ),
            Self::Lease(lease) => write!(f, "lease {} is already held", lease),
            Self::Source(source_id) => write!(f, "source {} is already committed", source_id),
        }
    }
}
