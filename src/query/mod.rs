//! Backend-agnostic filter and sort algebra.
//!
//! A query never builds a backend representation by itself: the backend hands it a builder, and the
//! query expresses its logical filter and sort through the builder methods. The same query runs
//! unmodified on every backend implementing the builder traits.
//!
//! Every query is evaluated as: filter, then sort, then skip, then take.

use std::any::Any;

use crate::envelope::Polymorphic;
use crate::types::{Id, TimeStamp, VersionNumber};

pub use modified::*;

mod modified;
pub mod standard;

/// Logical operators and source-level predicates, shared by every facet.
pub trait FilterBuilder {
    type Filter;

    /// Matches when every filter matches. An empty list matches everything.
    fn and(&self, filters: Vec<Self::Filter>) -> Self::Filter;

    /// Matches when any filter matches. An empty list matches nothing.
    fn or(&self, filters: Vec<Self::Filter>) -> Self::Filter;

    fn not(&self, filter: Self::Filter) -> Self::Filter;

    fn source_id_in(&self, source_ids: &[Id]) -> Self::Filter;

    fn source_time_stamp_gte(&self, time_stamp: TimeStamp) -> Self::Filter;

    fn source_time_stamp_lte(&self, time_stamp: TimeStamp) -> Self::Filter;
}

/// Predicates over records that belong to one entity version.
pub trait EntityFilterBuilder: FilterBuilder {
    fn entity_id_in(&self, entity_ids: &[Id]) -> Self::Filter;

    fn entity_version_gte(&self, version: VersionNumber) -> Self::Filter;

    fn entity_version_lte(&self, version: VersionNumber) -> Self::Filter;
}

pub trait SourceDataFilterBuilder: FilterBuilder {
    /// Matches sources with at least one message for any of the entities.
    fn entity_ids_in(&self, entity_ids: &[Id]) -> Self::Filter;

    fn agent_signature_type_in(&self, type_names: &[&str]) -> Self::Filter;

    /// Matches sources whose agent signature resolves to `A` and satisfies the predicate.
    fn agent_signature_matches<A, F>(&self, predicate: F) -> Self::Filter
    where
        A: Polymorphic,
        F: Fn(&A) -> bool + Send + Sync + 'static;
}

pub trait MessageDataFilterBuilder: EntityFilterBuilder {
    fn delta_type_in(&self, type_names: &[&str]) -> Self::Filter;

    /// Matches messages whose delta resolves to `D` and satisfies the predicate.
    fn delta_matches<D, F>(&self, predicate: F) -> Self::Filter
    where
        D: Polymorphic,
        F: Fn(&D) -> bool + Send + Sync + 'static;
}

pub trait LeaseDataFilterBuilder: EntityFilterBuilder {
    fn lease_scope_eq(&self, scope: &str) -> Self::Filter;

    fn lease_label_eq(&self, label: &str) -> Self::Filter;

    fn lease_value_eq(&self, value: &str) -> Self::Filter;
}

pub trait TagDataFilterBuilder: EntityFilterBuilder {
    fn tag_label_eq(&self, label: &str) -> Self::Filter;

    fn tag_value_eq(&self, value: &str) -> Self::Filter;
}

/// Sort keys shared by every facet. The first key of a combined sort takes precedence.
pub trait SortBuilder {
    type Sort;

    fn combine(&self, sorts: Vec<Self::Sort>) -> Self::Sort;

    /// The order records were written in by the backend.
    fn sequence(&self, ascending: bool) -> Self::Sort;

    fn source_time_stamp(&self, ascending: bool) -> Self::Sort;

    fn source_id(&self, ascending: bool) -> Self::Sort;
}

pub trait EntitySortBuilder: SortBuilder {
    fn entity_id(&self, ascending: bool) -> Self::Sort;

    fn entity_version(&self, ascending: bool) -> Self::Sort;
}

pub trait SourceDataSortBuilder: SortBuilder {
    fn agent_signature_type(&self, ascending: bool) -> Self::Sort;
}

pub trait MessageDataSortBuilder: EntitySortBuilder {
    fn delta_type(&self, ascending: bool) -> Self::Sort;
}

pub trait LeaseDataSortBuilder: EntitySortBuilder {
    fn lease_scope(&self, ascending: bool) -> Self::Sort;

    fn lease_label(&self, ascending: bool) -> Self::Sort;

    fn lease_value(&self, ascending: bool) -> Self::Sort;
}

pub trait TagDataSortBuilder: EntitySortBuilder {
    fn tag_label(&self, ascending: bool) -> Self::Sort;

    fn tag_value(&self, ascending: bool) -> Self::Sort;
}

/// Pagination and backend passthrough options, common to every query.
pub trait Query {
    fn skip(&self) -> Option<usize> {
        None
    }

    fn take(&self) -> Option<usize> {
        None
    }

    /// Backend specific options. Backends ignore options they do not recognize.
    fn options(&self) -> Option<&(dyn Any + Send + Sync)> {
        None
    }
}

/// A query over committed sources and their agent signatures.
pub trait SourceDataQuery: Query {
    fn source_data_filter<B: SourceDataFilterBuilder>(&self, builder: &B) -> B::Filter;

    /// Defaults to the backend write order.
    fn source_data_sort<B: SourceDataSortBuilder>(&self, _builder: &B) -> Option<B::Sort> {
        None
    }
}

/// A query over committed messages and their deltas.
pub trait MessageDataQuery: Query {
    fn message_data_filter<B: MessageDataFilterBuilder>(&self, builder: &B) -> B::Filter;

    fn message_data_sort<B: MessageDataSortBuilder>(&self, _builder: &B) -> Option<B::Sort> {
        None
    }
}

/// A query over the leases currently held.
pub trait LeaseDataQuery: Query {
    fn lease_data_filter<B: LeaseDataFilterBuilder>(&self, builder: &B) -> B::Filter;

    fn lease_data_sort<B: LeaseDataSortBuilder>(&self, _builder: &B) -> Option<B::Sort> {
        None
    }
}

/// A query over the tags currently held.
pub trait TagDataQuery: Query {
    fn tag_data_filter<B: TagDataFilterBuilder>(&self, builder: &B) -> B::Filter;

    fn tag_data_sort<B: TagDataSortBuilder>(&self, _builder: &B) -> Option<B::Sort> {
        None
    }
}
