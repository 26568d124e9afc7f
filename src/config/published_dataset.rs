// SPDX-License-Identifier: Apache-2.0 OR MIT

//! `PublishedDataSet` and `FieldMetaData` (spec.md §3), built with the
//! allocate-then-populate builder described in §4.1: the field count is
//! fixed at construction and slots are addressed by index thereafter.

use crate::types::{BuiltInType, NodeId, ValueRank, ATTRIBUTE_ID_VALUE};

/// Origin of the values in a `PublishedDataSet`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataSetSourceType {
    DataItems,
    CustomSource,
    Events,
}

/// Publisher-side target of a field: the node whose Value attribute is read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedVariable {
    pub node_id: NodeId,
    pub attribute_id: u32,
    pub numeric_range: Option<String>,
}

impl PublishedVariable {
    pub fn new(node_id: NodeId) -> Self {
        PublishedVariable {
            node_id,
            attribute_id: ATTRIBUTE_ID_VALUE,
            numeric_range: None,
        }
    }
}

/// Per-field metadata, direction-specific via `target`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldMetaData {
    pub built_in_type: BuiltInType,
    pub value_rank: ValueRank,
    pub array_dimensions: Option<Vec<u32>>,
    pub target: FieldDirection,
}

/// The publisher-side or subscriber-side sub-object of a `FieldMetaData`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldDirection {
    Published(PublishedVariable),
    /// Populated once the metadata is reused on a `DataSetReader`
    /// (`FieldTarget`, defined in `config::dataset_reader`).
    Consumed(crate::config::dataset_reader::FieldTarget),
}

impl FieldMetaData {
    pub fn published(
        built_in_type: BuiltInType,
        value_rank: ValueRank,
        node_id: NodeId,
    ) -> Self {
        FieldMetaData {
            built_in_type,
            value_rank,
            array_dimensions: None,
            target: FieldDirection::Published(PublishedVariable::new(node_id)),
        }
    }
}

/// An ordered, fixed-length set of typed fields exchanged as a unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedDataSet {
    pub source_type: DataSetSourceType,
    fields: Vec<FieldMetaData>,
}

impl PublishedDataSet {
    pub fn fields(&self) -> &[FieldMetaData] {
        &self.fields
    }

    pub fn field_count(&self) -> usize {
        self.fields.len()
    }
}

/// Allocate-then-populate builder for a `PublishedDataSet` (spec.md §4.1).
pub struct PublishedDataSetBuilder {
    source_type: DataSetSourceType,
    fields: Vec<Option<FieldMetaData>>,
}

impl PublishedDataSetBuilder {
    /// Allocate a dataset with `field_count` slots, all unset.
    pub fn new(source_type: DataSetSourceType, field_count: usize) -> Self {
        PublishedDataSetBuilder {
            source_type,
            fields: vec![None; field_count],
        }
    }

    /// Populate one previously-allocated slot. Returns `false` (rather than
    /// panicking) when `index` is out of range, matching the allocator
    /// failure convention of spec.md §4.1/§7.
    pub fn set_field(&mut self, index: usize, metadata: FieldMetaData) -> bool {
        match self.fields.get_mut(index) {
            Some(slot) => {
                *slot = Some(metadata);
                true
            }
            None => false,
        }
    }

    /// Freeze the builder. Returns `None` if any slot was never populated.
    pub fn build(self) -> Option<PublishedDataSet> {
        let fields: Option<Vec<FieldMetaData>> = self.fields.into_iter().collect();
        fields.map(|fields| PublishedDataSet {
            source_type: self.source_type,
            fields,
        })
    }
}
