//! Queries the engine itself relies on, plus a handful of general purpose ones.

use std::sync::Arc;

use crate::envelope::Polymorphic;
use crate::query::{
    EntityFilterBuilder, FilterBuilder, LeaseDataFilterBuilder, LeaseDataQuery, LeaseDataSortBuilder,
    MessageDataFilterBuilder, MessageDataQuery, MessageDataSortBuilder, Query, SourceDataFilterBuilder,
    SourceDataQuery, SourceDataSortBuilder, TagDataFilterBuilder, TagDataQuery, TagDataSortBuilder,
};
use crate::types::{Id, TimeStamp, VersionNumber};

/// Everything written by one source, optionally restricted to one entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetSourceQuery {
    pub source_id: Id,
    pub entity_id: Option<Id>,
}

impl GetSourceQuery {
    fn entity_filter<B: EntityFilterBuilder>(&self, builder: &B) -> B::Filter {
        match self.entity_id {
            Some(entity_id) => builder.and(vec![
                builder.entity_id_in(&[entity_id]),
                builder.source_id_in(&[self.source_id]),
            ]),
            None => builder.source_id_in(&[self.source_id]),
        }
    }
}

impl Query for GetSourceQuery {}

impl SourceDataQuery for GetSourceQuery {
    fn source_data_filter<B: SourceDataFilterBuilder>(&self, builder: &B) -> B::Filter {
        builder.source_id_in(&[self.source_id])
    }
}

impl MessageDataQuery for GetSourceQuery {
    fn message_data_filter<B: MessageDataFilterBuilder>(&self, builder: &B) -> B::Filter {
        self.entity_filter(builder)
    }
}

impl LeaseDataQuery for GetSourceQuery {
    fn lease_data_filter<B: LeaseDataFilterBuilder>(&self, builder: &B) -> B::Filter {
        self.entity_filter(builder)
    }
}

impl TagDataQuery for GetSourceQuery {
    fn tag_data_filter<B: TagDataFilterBuilder>(&self, builder: &B) -> B::Filter {
        self.entity_filter(builder)
    }
}

/// The deltas of one entity committed after a known version, in version order. Used to replay an
/// entity on top of a snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetDeltasQuery {
    pub entity_id: Id,
    pub after: VersionNumber,
    pub up_to: Option<VersionNumber>,
}

impl Query for GetDeltasQuery {}

impl MessageDataQuery for GetDeltasQuery {
    fn message_data_filter<B: MessageDataFilterBuilder>(&self, builder: &B) -> B::Filter {
        let mut filters = vec![
            builder.entity_id_in(&[self.entity_id]),
            builder.entity_version_gte(self.after.next()),
        ];

        if let Some(up_to) = self.up_to {
            filters.push(builder.entity_version_lte(up_to));
        }

        builder.and(filters)
    }

    fn message_data_sort<B: MessageDataSortBuilder>(&self, builder: &B) -> Option<B::Sort> {
        Some(builder.entity_version(true))
    }
}

/// Everything about a set of entities.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntityIdQuery {
    pub entity_ids: Vec<Id>,
    pub skip: Option<usize>,
    pub take: Option<usize>,
}

impl EntityIdQuery {
    pub fn new(entity_ids: impl IntoIterator<Item = Id>) -> Self {
        Self {
            entity_ids: entity_ids.into_iter().collect(),
            ..Self::default()
        }
    }
}

impl Query for EntityIdQuery {
    fn skip(&self) -> Option<usize> {
        self.skip
    }

    fn take(&self) -> Option<usize> {
        self.take
    }
}

impl SourceDataQuery for EntityIdQuery {
    fn source_data_filter<B: SourceDataFilterBuilder>(&self, builder: &B) -> B::Filter {
        builder.entity_ids_in(&self.entity_ids)
    }
}

impl MessageDataQuery for EntityIdQuery {
    fn message_data_filter<B: MessageDataFilterBuilder>(&self, builder: &B) -> B::Filter {
        builder.entity_id_in(&self.entity_ids)
    }

    fn message_data_sort<B: MessageDataSortBuilder>(&self, builder: &B) -> Option<B::Sort> {
        Some(builder.combine(vec![builder.entity_id(true), builder.entity_version(true)]))
    }
}

impl LeaseDataQuery for EntityIdQuery {
    fn lease_data_filter<B: LeaseDataFilterBuilder>(&self, builder: &B) -> B::Filter {
        builder.entity_id_in(&self.entity_ids)
    }
}

impl TagDataQuery for EntityIdQuery {
    fn tag_data_filter<B: TagDataFilterBuilder>(&self, builder: &B) -> B::Filter {
        builder.entity_id_in(&self.entity_ids)
    }
}

/// Records of entity versions within an inclusive range, across every entity unless restricted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VersionRangeQuery {
    pub entity_id: Option<Id>,
    pub gte: Option<VersionNumber>,
    pub lte: Option<VersionNumber>,
    pub skip: Option<usize>,
    pub take: Option<usize>,
}

impl VersionRangeQuery {
    fn filter<B: EntityFilterBuilder>(&self, builder: &B) -> B::Filter {
        let filters = [
            self.entity_id.map(|entity_id| builder.entity_id_in(&[entity_id])),
            self.gte.map(|gte| builder.entity_version_gte(gte)),
            self.lte.map(|lte| builder.entity_version_lte(lte)),
        ];

        builder.and(filters.into_iter().flatten().collect())
    }
}

impl Query for VersionRangeQuery {
    fn skip(&self) -> Option<usize> {
        self.skip
    }

    fn take(&self) -> Option<usize> {
        self.take
    }
}

impl MessageDataQuery for VersionRangeQuery {
    fn message_data_filter<B: MessageDataFilterBuilder>(&self, builder: &B) -> B::Filter {
        self.filter(builder)
    }

    fn message_data_sort<B: MessageDataSortBuilder>(&self, builder: &B) -> Option<B::Sort> {
        Some(builder.combine(vec![builder.entity_id(true), builder.entity_version(true)]))
    }
}

impl LeaseDataQuery for VersionRangeQuery {
    fn lease_data_filter<B: LeaseDataFilterBuilder>(&self, builder: &B) -> B::Filter {
        self.filter(builder)
    }
}

impl TagDataQuery for VersionRangeQuery {
    fn tag_data_filter<B: TagDataFilterBuilder>(&self, builder: &B) -> B::Filter {
        self.filter(builder)
    }
}

/// Records of sources committed within an inclusive time range, oldest first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TimeStampRangeQuery {
    pub gte: Option<TimeStamp>,
    pub lte: Option<TimeStamp>,
    pub skip: Option<usize>,
    pub take: Option<usize>,
}

impl TimeStampRangeQuery {
    fn filter<B: FilterBuilder>(&self, builder: &B) -> B::Filter {
        let filters = [
            self.gte.map(|gte| builder.source_time_stamp_gte(gte)),
            self.lte.map(|lte| builder.source_time_stamp_lte(lte)),
        ];

        builder.and(filters.into_iter().flatten().collect())
    }
}

impl Query for TimeStampRangeQuery {
    fn skip(&self) -> Option<usize> {
        self.skip
    }

    fn take(&self) -> Option<usize> {
        self.take
    }
}

impl SourceDataQuery for TimeStampRangeQuery {
    fn source_data_filter<B: SourceDataFilterBuilder>(&self, builder: &B) -> B::Filter {
        self.filter(builder)
    }

    fn source_data_sort<B: SourceDataSortBuilder>(&self, builder: &B) -> Option<B::Sort> {
        Some(builder.source_time_stamp(true))
    }
}

impl MessageDataQuery for TimeStampRangeQuery {
    fn message_data_filter<B: MessageDataFilterBuilder>(&self, builder: &B) -> B::Filter {
        self.filter(builder)
    }

    fn message_data_sort<B: MessageDataSortBuilder>(&self, builder: &B) -> Option<B::Sort> {
        Some(builder.source_time_stamp(true))
    }
}

impl LeaseDataQuery for TimeStampRangeQuery {
    fn lease_data_filter<B: LeaseDataFilterBuilder>(&self, builder: &B) -> B::Filter {
        self.filter(builder)
    }

    fn lease_data_sort<B: LeaseDataSortBuilder>(&self, builder: &B) -> Option<B::Sort> {
        Some(builder.source_time_stamp(true))
    }
}

impl TagDataQuery for TimeStampRangeQuery {
    fn tag_data_filter<B: TagDataFilterBuilder>(&self, builder: &B) -> B::Filter {
        self.filter(builder)
    }

    fn tag_data_sort<B: TagDataSortBuilder>(&self, builder: &B) -> Option<B::Sort> {
        Some(builder.source_time_stamp(true))
    }
}

/// Deltas, or agent signatures, that resolve to `T` and satisfy a predicate.
pub struct PayloadMatchQuery<T> {
    predicate: Arc<dyn Fn(&T) -> bool + Send + Sync>,
    pub skip: Option<usize>,
    pub take: Option<usize>,
}

impl<T> PayloadMatchQuery<T> {
    pub fn new(predicate: impl Fn(&T) -> bool + Send + Sync + 'static) -> Self {
        Self {
            predicate: Arc::new(predicate),
            skip: None,
            take: None,
        }
    }
}

impl<T> Clone for PayloadMatchQuery<T> {
    fn clone(&self) -> Self {
        Self {
            predicate: Arc::clone(&self.predicate),
            skip: self.skip,
            take: self.take,
        }
    }
}

impl<T> Query for PayloadMatchQuery<T> {
    fn skip(&self) -> Option<usize> {
        self.skip
    }

    fn take(&self) -> Option<usize> {
        self.take
    }
}

impl<T: Polymorphic> SourceDataQuery for PayloadMatchQuery<T> {
    fn source_data_filter<B: SourceDataFilterBuilder>(&self, builder: &B) -> B::Filter {
        let predicate = Arc::clone(&self.predicate);
        builder.agent_signature_matches(move |signature: &T| predicate(signature))
    }
}

impl<T: Polymorphic> MessageDataQuery for PayloadMatchQuery<T> {
    fn message_data_filter<B: MessageDataFilterBuilder>(&self, builder: &B) -> B::Filter {
        let predicate = Arc::clone(&self.predicate);
        builder.delta_matches(move |delta: &T| predicate(delta))
    }

    fn message_data_sort<B: MessageDataSortBuilder>(&self, builder: &B) -> Option<B::Sort> {
        Some(builder.combine(vec![
            builder.entity_id(true),
            builder.entity_version(true),
            builder.delta_type(true),
        ]))
    }
}

/// Leases matching every field that is set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LeaseMatchQuery {
    pub entity_id: Option<Id>,
    pub scope: Option<String>,
    pub label: Option<String>,
    pub value: Option<String>,
}

impl Query for LeaseMatchQuery {}

impl LeaseDataQuery for LeaseMatchQuery {
    fn lease_data_filter<B: LeaseDataFilterBuilder>(&self, builder: &B) -> B::Filter {
        let filters = [
            self.entity_id.map(|entity_id| builder.entity_id_in(&[entity_id])),
            self.scope.as_deref().map(|scope| builder.lease_scope_eq(scope)),
            self.label.as_deref().map(|label| builder.lease_label_eq(label)),
            self.value.as_deref().map(|value| builder.lease_value_eq(value)),
        ];

        builder.and(filters.into_iter().flatten().collect())
    }

    fn lease_data_sort<B: LeaseDataSortBuilder>(&self, builder: &B) -> Option<B::Sort> {
        Some(builder.combine(vec![
            builder.lease_scope(true),
            builder.lease_label(true),
            builder.lease_value(true),
        ]))
    }
}

/// Tags matching every field that is set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagMatchQuery {
    pub entity_id: Option<Id>,
    pub label: Option<String>,
    pub value: Option<String>,
}

impl Query for TagMatchQuery {}

impl TagDataQuery for TagMatchQuery {
    fn tag_data_filter<B: TagDataFilterBuilder>(&self, builder: &B) -> B::Filter {
        let filters = [
            self.entity_id.map(|entity_id| builder.entity_id_in(&[entity_id])),
            self.label.as_deref().map(|label| builder.tag_label_eq(label)),
            self.value.as_deref().map(|value| builder.tag_value_eq(value)),
        ];

        builder.and(filters.into_iter().flatten().collect())
    }

    fn tag_data_sort<B: TagDataSortBuilder>(&self, builder: &B) -> Option<B::Sort> {
        Some(builder.combine(vec![
            builder.entity_id(true),
            builder.entity_version(true),
            builder.tag_label(true),
            builder.tag_value(true),
        ]))
    }
}
