use crate::envelope::Envelope;
use crate::source::{Lease, Tag};
use crate::types::{Id, Pointer, TimeStamp, VersionNumber};

/// Anything the memory store keeps, in write order.
pub trait Record: Send + Sync + 'static {
    fn sequence(&self) -> u64;

    fn source_id(&self) -> Id;

    fn source_time_stamp(&self) -> TimeStamp;
}

/// A record written for one entity version.
pub trait EntityRecord: Record {
    fn entity_id(&self) -> Id;

    fn entity_version(&self) -> VersionNumber;
}

#[derive(Debug, Clone)]
pub struct SourceRecord {
    pub(crate) sequence: u64,
    pub(crate) source_id: Id,
    pub(crate) source_time_stamp: TimeStamp,
    pub(crate) agent_signature: Envelope,
    pub(crate) entity_pointers: Vec<Pointer>,
}

#[derive(Debug, Clone)]
pub struct MessageRecord {
    pub(crate) sequence: u64,
    pub(crate) source_id: Id,
    pub(crate) source_time_stamp: TimeStamp,
    pub(crate) message_id: Id,
    pub(crate) entity_id: Id,
    pub(crate) entity_version: VersionNumber,
    pub(crate) delta: Envelope,
}

#[derive(Debug, Clone)]
pub struct LeaseRecord {
    pub(crate) sequence: u64,
    pub(crate) source_id: Id,
    pub(crate) source_time_stamp: TimeStamp,
    pub(crate) message_id: Id,
    pub(crate) entity_id: Id,
    pub(crate) entity_version: VersionNumber,
    pub(crate) lease: Lease,
}

#[derive(Debug, Clone)]
pub struct TagRecord {
    pub(crate) sequence: u64,
    pub(crate) source_id: Id,
    pub(crate) source_time_stamp: TimeStamp,
    pub(crate) message_id: Id,
    pub(crate) entity_id: Id,
    pub(crate) entity_version: VersionNumber,
    pub(crate) tag: Tag,
}

impl SourceRecord {
    pub(crate) fn entity_ids(&self) -> impl Iterator<Item = Id> + '_ {
        self.entity_pointers.iter().map(|pointer| pointer.id)
    }
}

macro_rules! impl_record {
    ($($record:ty),+) => {
        $(
            impl Record for $record {
                fn sequence(&self) -> u64 {
                    self.sequence
                }

                fn source_id(&self) -> Id {
                    self.source_id
                }

                fn source_time_stamp(&self) -> TimeStamp {
                    self.source_time_stamp
                }
            }
        )+
    };
}

macro_rules! impl_entity_record {
    ($($record:ty),+) => {
        $(
            impl EntityRecord for $record {
                fn entity_id(&self) -> Id {
                    self.entity_id
                }

                fn entity_version(&self) -> VersionNumber {
                    self.entity_version
                }
            }
        )+
    };
}

impl_record!(SourceRecord, MessageRecord, LeaseRecord, TagRecord);
impl_entity_record!(MessageRecord, LeaseRecord, TagRecord);
