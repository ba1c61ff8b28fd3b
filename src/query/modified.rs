use std::any::Any;

use typed_builder::TypedBuilder;

use crate::query::{
    EntitySortBuilder, FilterBuilder, LeaseDataFilterBuilder, LeaseDataQuery, LeaseDataSortBuilder,
    MessageDataFilterBuilder, MessageDataQuery, MessageDataSortBuilder, Query, SortBuilder, SourceDataFilterBuilder,
    SourceDataQuery, SourceDataSortBuilder, TagDataFilterBuilder, TagDataQuery, TagDataSortBuilder,
};

/// How [`QueryExt::modify`] transforms a query.
#[derive(TypedBuilder, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ModifiedQueryOptions {
    /// Negates the filter: the modified query returns the complement of the original one.
    #[builder(default)]
    pub invert_filter: bool,
    /// Flips every sort key, so that the backend traverses results in the exact opposite order.
    #[builder(default)]
    pub reverse_sort: bool,
    #[builder(default, setter(strip_option))]
    pub replace_skip: Option<usize>,
    #[builder(default, setter(strip_option))]
    pub replace_take: Option<usize>,
}

/// A query derived from another one, which is borrowed and never mutated.
#[derive(Debug)]
pub struct ModifiedQuery<'a, Q> {
    query: &'a Q,
    options: ModifiedQueryOptions,
}

impl<'a, Q> ModifiedQuery<'a, Q> {
    pub fn new(query: &'a Q, options: ModifiedQueryOptions) -> Self {
        Self { query, options }
    }

    pub fn original(&self) -> &'a Q {
        self.query
    }

    pub const fn modified_options(&self) -> &ModifiedQueryOptions {
        &self.options
    }

    fn filter<B, F>(&self, builder: &B, filter: F) -> B::Filter
    where
        B: FilterBuilder,
        F: FnOnce(&B) -> B::Filter,
    {
        let filter = filter(builder);

        if self.options.invert_filter {
            builder.not(filter)
        } else {
            filter
        }
    }

    fn reversed_sort<B, F>(&self, builder: &B, sort: F) -> Option<B::Sort>
    where
        B: SortBuilder,
        F: FnOnce(&ReverseSortBuilder<'_, B>) -> Option<B::Sort>,
    {
        // Unsorted queries come in write order: reversing them means reading backwards.
        Some(sort(&ReverseSortBuilder(builder)).unwrap_or_else(|| builder.sequence(false)))
    }
}

impl<Q: Query> Query for ModifiedQuery<'_, Q> {
    fn skip(&self) -> Option<usize> {
        self.options.replace_skip.or_else(|| self.query.skip())
    }

    fn take(&self) -> Option<usize> {
        self.options.replace_take.or_else(|| self.query.take())
    }

    fn options(&self) -> Option<&(dyn Any + Send + Sync)> {
        self.query.options()
    }
}

impl<Q: SourceDataQuery> SourceDataQuery for ModifiedQuery<'_, Q> {
    fn source_data_filter<B: SourceDataFilterBuilder>(&self, builder: &B) -> B::Filter {
        self.filter(builder, |builder| self.query.source_data_filter(builder))
    }

    fn source_data_sort<B: SourceDataSortBuilder>(&self, builder: &B) -> Option<B::Sort> {
        if self.options.reverse_sort {
            self.reversed_sort(builder, |reversed| self.query.source_data_sort(reversed))
        } else {
            self.query.source_data_sort(builder)
        }
    }
}

impl<Q: MessageDataQuery> MessageDataQuery for ModifiedQuery<'_, Q> {
    fn message_data_filter<B: MessageDataFilterBuilder>(&self, builder: &B) -> B::Filter {
        self.filter(builder, |builder| self.query.message_data_filter(builder))
    }

    fn message_data_sort<B: MessageDataSortBuilder>(&self, builder: &B) -> Option<B::Sort> {
        if self.options.reverse_sort {
            self.reversed_sort(builder, |reversed| self.query.message_data_sort(reversed))
        } else {
            self.query.message_data_sort(builder)
        }
    }
}

impl<Q: LeaseDataQuery> LeaseDataQuery for ModifiedQuery<'_, Q> {
    fn lease_data_filter<B: LeaseDataFilterBuilder>(&self, builder: &B) -> B::Filter {
        self.filter(builder, |builder| self.query.lease_data_filter(builder))
    }

    fn lease_data_sort<B: LeaseDataSortBuilder>(&self, builder: &B) -> Option<B::Sort> {
        if self.options.reverse_sort {
            self.reversed_sort(builder, |reversed| self.query.lease_data_sort(reversed))
        } else {
            self.query.lease_data_sort(builder)
        }
    }
}

impl<Q: TagDataQuery> TagDataQuery for ModifiedQuery<'_, Q> {
    fn tag_data_filter<B: TagDataFilterBuilder>(&self, builder: &B) -> B::Filter {
        self.filter(builder, |builder| self.query.tag_data_filter(builder))
    }

    fn tag_data_sort<B: TagDataSortBuilder>(&self, builder: &B) -> Option<B::Sort> {
        if self.options.reverse_sort {
            self.reversed_sort(builder, |reversed| self.query.tag_data_sort(reversed))
        } else {
            self.query.tag_data_sort(builder)
        }
    }
}

/// Extension adding [`QueryExt::modify`] to every [`Query`].
pub trait QueryExt: Query + Sized {
    fn modify(&self, options: ModifiedQueryOptions) -> ModifiedQuery<'_, Self> {
        ModifiedQuery::new(self, options)
    }
}

impl<Q: Query> QueryExt for Q {}

/// Wraps a sort builder, flipping the direction of every key it builds.
pub struct ReverseSortBuilder<'a, B>(&'a B);

impl<B: SortBuilder> SortBuilder for ReverseSortBuilder<'_, B> {
    type Sort = B::Sort;

    fn combine(&self, sorts: Vec<Self::Sort>) -> Self::Sort {
        self.0.combine(sorts)
    }

    fn sequence(&self, ascending: bool) -> Self::Sort {
        self.0.sequence(!ascending)
    }

    fn source_time_stamp(&self, ascending: bool) -> Self::Sort {
        self.0.source_time_stamp(!ascending)
    }

    fn source_id(&self, ascending: bool) -> Self::Sort {
        self.0.source_id(!ascending)
    }
}

impl<B: EntitySortBuilder> EntitySortBuilder for ReverseSortBuilder<'_, B> {
    fn entity_id(&self, ascending: bool) -> Self::Sort {
        self.0.entity_id(!ascending)
    }

    fn entity_version(&self, ascending: bool) -> Self::Sort {
        self.0.entity_version(!ascending)
    }
}

impl<B: SourceDataSortBuilder> SourceDataSortBuilder for ReverseSortBuilder<'_, B> {
    fn agent_signature_type(&self, ascending: bool) -> Self::Sort {
        self.0.agent_signature_type(!ascending)
    }
}

impl<B: MessageDataSortBuilder> MessageDataSortBuilder for ReverseSortBuilder<'_, B> {
    fn delta_type(&self, ascending: bool) -> Self::Sort {
        self.0.delta_type(!ascending)
    }
}

impl<B: LeaseDataSortBuilder> LeaseDataSortBuilder for ReverseSortBuilder<'_, B> {
    fn lease_scope(&self, ascending: bool) -> Self::Sort {
        self.0.lease_scope(!ascending)
    }

    fn lease_label(&self, ascending: bool) -> Self::Sort {
        self.0.lease_label(!ascending)
    }

    fn lease_value(&self, ascending: bool) -> Self::Sort {
        self.0.lease_value(!ascending)
    }
}

impl<B: TagDataSortBuilder> TagDataSortBuilder for ReverseSortBuilder<'_, B> {
    fn tag_label(&self, ascending: bool) -> Self::Sort {
        self.0.tag_label(!ascending)
    }

    fn tag_value(&self, ascending: bool) -> Self::Sort {
        self.0.tag_value(!ascending)
    }
}
