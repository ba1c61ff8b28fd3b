use std::cmp::Ordering;
use std::collections::HashSet;
use std::marker::PhantomData;
use std::sync::Arc;

use crate::envelope::{EnvelopeService, Polymorphic};
use crate::query::{
    EntityFilterBuilder, EntitySortBuilder, FilterBuilder, LeaseDataFilterBuilder, LeaseDataSortBuilder,
    MessageDataFilterBuilder, MessageDataSortBuilder, Query, SortBuilder, SourceDataFilterBuilder,
    SourceDataSortBuilder, TagDataFilterBuilder, TagDataSortBuilder,
};
use crate::store::memory::record::{EntityRecord, LeaseRecord, MessageRecord, Record, SourceRecord, TagRecord};
use crate::types::{Id, TimeStamp, VersionNumber};

pub type MemoryFilter<R> = Arc<dyn Fn(&R) -> bool + Send + Sync>;

/// A list of keys, the first taking precedence.
pub type MemorySort<R> = Vec<SortKey<R>>;

pub struct SortKey<R> {
    ascending: bool,
    compare: Arc<dyn Fn(&R, &R) -> Ordering + Send + Sync>,
}

impl<R> SortKey<R> {
    fn new(ascending: bool, compare: impl Fn(&R, &R) -> Ordering + Send + Sync + 'static) -> Self {
        Self {
            ascending,
            compare: Arc::new(compare),
        }
    }

    fn by<K: Ord>(ascending: bool, key: impl Fn(&R) -> K + Send + Sync + 'static) -> Vec<Self> {
        vec![Self::new(ascending, move |left, right| key(left).cmp(&key(right)))]
    }

    fn compare(&self, left: &R, right: &R) -> Ordering {
        let ordering = (self.compare)(left, right);

        if self.ascending {
            ordering
        } else {
            ordering.reverse()
        }
    }
}

/// Builds in-memory predicates over the records of one facet.
pub struct MemoryFilterBuilder<R> {
    envelopes: Arc<EnvelopeService>,
    _record: PhantomData<fn(&R)>,
}

impl<R> MemoryFilterBuilder<R> {
    pub fn new(envelopes: Arc<EnvelopeService>) -> Self {
        Self {
            envelopes,
            _record: PhantomData,
        }
    }

    fn filter(&self, predicate: impl Fn(&R) -> bool + Send + Sync + 'static) -> MemoryFilter<R> {
        Arc::new(predicate)
    }
}

/// Builds in-memory comparators over the records of one facet.
pub struct MemorySortBuilder<R> {
    _record: PhantomData<fn(&R)>,
}

impl<R> MemorySortBuilder<R> {
    pub fn new() -> Self {
        Self { _record: PhantomData }
    }
}

impl<R> Default for MemorySortBuilder<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: Record> FilterBuilder for MemoryFilterBuilder<R> {
    type Filter = MemoryFilter<R>;

    fn and(&self, filters: Vec<Self::Filter>) -> Self::Filter {
        self.filter(move |record| filters.iter().all(|filter| filter(record)))
    }

    fn or(&self, filters: Vec<Self::Filter>) -> Self::Filter {
        self.filter(move |record| filters.iter().any(|filter| filter(record)))
    }

    fn not(&self, filter: Self::Filter) -> Self::Filter {
        self.filter(move |record| !filter(record))
    }

    fn source_id_in(&self, source_ids: &[Id]) -> Self::Filter {
        let source_ids: HashSet<Id> = source_ids.iter().copied().collect();
        self.filter(move |record| source_ids.contains(&record.source_id()))
    }

    fn source_time_stamp_gte(&self, time_stamp: TimeStamp) -> Self::Filter {
        self.filter(move |record| record.source_time_stamp() >= time_stamp)
    }

    fn source_time_stamp_lte(&self, time_stamp: TimeStamp) -> Self::Filter {
        self.filter(move |record| record.source_time_stamp() <= time_stamp)
    }
}

impl<R: EntityRecord> EntityFilterBuilder for MemoryFilterBuilder<R> {
    fn entity_id_in(&self, entity_ids: &[Id]) -> Self::Filter {
        let entity_ids: HashSet<Id> = entity_ids.iter().copied().collect();
        self.filter(move |record| entity_ids.contains(&record.entity_id()))
    }

    fn entity_version_gte(&self, version: VersionNumber) -> Self::Filter {
        self.filter(move |record| record.entity_version() >= version)
    }

    fn entity_version_lte(&self, version: VersionNumber) -> Self::Filter {
        self.filter(move |record| record.entity_version() <= version)
    }
}

fn type_names(type_names: &[&str]) -> HashSet<String> {
    type_names.iter().map(|type_name| type_name.to_string()).collect()
}

impl SourceDataFilterBuilder for MemoryFilterBuilder<SourceRecord> {
    fn entity_ids_in(&self, entity_ids: &[Id]) -> Self::Filter {
        let entity_ids: HashSet<Id> = entity_ids.iter().copied().collect();
        self.filter(move |record| record.entity_ids().any(|entity_id| entity_ids.contains(&entity_id)))
    }

    fn agent_signature_type_in(&self, names: &[&str]) -> Self::Filter {
        let names = type_names(names);
        self.filter(move |record| {
            record
                .agent_signature
                .headers
                .type_name()
                .map_or(false, |type_name| names.contains(type_name))
        })
    }

    fn agent_signature_matches<A, F>(&self, predicate: F) -> Self::Filter
    where
        A: Polymorphic,
        F: Fn(&A) -> bool + Send + Sync + 'static,
    {
        let envelopes = Arc::clone(&self.envelopes);
        self.filter(move |record| {
            envelopes
                .try_reconstruct::<A>(&record.agent_signature)
                .map_or(false, |signature| predicate(&signature))
        })
    }
}

impl MessageDataFilterBuilder for MemoryFilterBuilder<MessageRecord> {
    fn delta_type_in(&self, names: &[&str]) -> Self::Filter {
        let names = type_names(names);
        self.filter(move |record| {
            record
                .delta
                .headers
                .type_name()
                .map_or(false, |type_name| names.contains(type_name))
        })
    }

    fn delta_matches<D, F>(&self, predicate: F) -> Self::Filter
    where
        D: Polymorphic,
        F: Fn(&D) -> bool + Send + Sync + 'static,
    {
        let envelopes = Arc::clone(&self.envelopes);
        self.filter(move |record| {
            envelopes
                .try_reconstruct::<D>(&record.delta)
                .map_or(false, |delta| predicate(&delta))
        })
    }
}

impl LeaseDataFilterBuilder for MemoryFilterBuilder<LeaseRecord> {
    fn lease_scope_eq(&self, scope: &str) -> Self::Filter {
        let scope = scope.to_string();
        self.filter(move |record| record.lease.scope == scope)
    }

    fn lease_label_eq(&self, label: &str) -> Self::Filter {
        let label = label.to_string();
        self.filter(move |record| record.lease.label == label)
    }

    fn lease_value_eq(&self, value: &str) -> Self::Filter {
        let value = value.to_string();
        self.filter(move |record| record.lease.value == value)
    }
}

impl TagDataFilterBuilder for MemoryFilterBuilder<TagRecord> {
    fn tag_label_eq(&self, label: &str) -> Self::Filter {
        let label = label.to_string();
        self.filter(move |record| record.tag.label == label)
    }

    fn tag_value_eq(&self, value: &str) -> Self::Filter {
        let value = value.to_string();
        self.filter(move |record| record.tag.value == value)
    }
}

impl<R: Record> SortBuilder for MemorySortBuilder<R> {
    type Sort = MemorySort<R>;

    fn combine(&self, sorts: Vec<Self::Sort>) -> Self::Sort {
        sorts.into_iter().flatten().collect()
    }

    fn sequence(&self, ascending: bool) -> Self::Sort {
        SortKey::by(ascending, |record: &R| record.sequence())
    }

    fn source_time_stamp(&self, ascending: bool) -> Self::Sort {
        SortKey::by(ascending, |record: &R| record.source_time_stamp())
    }

    fn source_id(&self, ascending: bool) -> Self::Sort {
        SortKey::by(ascending, |record: &R| record.source_id())
    }
}

impl<R: EntityRecord> EntitySortBuilder for MemorySortBuilder<R> {
    fn entity_id(&self, ascending: bool) -> Self::Sort {
        SortKey::by(ascending, |record: &R| record.entity_id())
    }

    fn entity_version(&self, ascending: bool) -> Self::Sort {
        SortKey::by(ascending, |record: &R| record.entity_version())
    }
}

impl SourceDataSortBuilder for MemorySortBuilder<SourceRecord> {
    fn agent_signature_type(&self, ascending: bool) -> Self::Sort {
        SortKey::by(ascending, |record: &SourceRecord| {
            record.agent_signature.headers.type_name().map(str::to_string)
        })
    }
}

impl MessageDataSortBuilder for MemorySortBuilder<MessageRecord> {
    fn delta_type(&self, ascending: bool) -> Self::Sort {
        SortKey::by(ascending, |record: &MessageRecord| {
            record.delta.headers.type_name().map(str::to_string)
        })
    }
}

impl LeaseDataSortBuilder for MemorySortBuilder<LeaseRecord> {
    fn lease_scope(&self, ascending: bool) -> Self::Sort {
        SortKey::by(ascending, |record: &LeaseRecord| record.lease.scope.clone())
    }

    fn lease_label(&self, ascending: bool) -> Self::Sort {
        SortKey::by(ascending, |record: &LeaseRecord| record.lease.label.clone())
    }

    fn lease_value(&self, ascending: bool) -> Self::Sort {
        SortKey::by(ascending, |record: &LeaseRecord| record.lease.value.clone())
    }
}

impl TagDataSortBuilder for MemorySortBuilder<TagRecord> {
    fn tag_label(&self, ascending: bool) -> Self::Sort {
        SortKey::by(ascending, |record: &TagRecord| record.tag.label.clone())
    }

    fn tag_value(&self, ascending: bool) -> Self::Sort {
        SortKey::by(ascending, |record: &TagRecord| record.tag.value.clone())
    }
}

/// Filters and sorts the records. Records comparing equal on every key keep their write order, in
/// the direction of the first key, so that reversing every key reverses the whole result.
pub fn select<'a, R: Record>(
    records: &'a [R],
    filter: &MemoryFilter<R>,
    sort: Option<MemorySort<R>>,
) -> Vec<&'a R> {
    let mut selected: Vec<&R> = records.iter().filter(|record| filter(*record)).collect();
    let sort = sort.unwrap_or_default();
    let ascending = sort.first().map_or(true, |key| key.ascending);

    selected.sort_by(|left, right| {
        sort.iter()
            .map(|key| key.compare(left, right))
            .find(|ordering| ordering.is_ne())
            .unwrap_or_else(|| {
                let ordering = left.sequence().cmp(&right.sequence());
                if ascending {
                    ordering
                } else {
                    ordering.reverse()
                }
            })
    });

    selected
}

/// Applies the query skip and take.
pub fn paginate<T, Q: Query + ?Sized>(items: impl IntoIterator<Item = T>, query: &Q) -> Vec<T> {
    items
        .into_iter()
        .skip(query.skip().unwrap_or(0))
        .take(query.take().unwrap_or(usize::MAX))
        .collect()
}

/// Keeps the first occurrence of every id.
pub fn distinct(ids: impl IntoIterator<Item = Id>) -> Vec<Id> {
    let mut seen: HashSet<Id> = HashSet::new();
    ids.into_iter().filter(|id| seen.insert(*id)).collect()
}
