// SPDX-License-Identifier: Apache-2.0 OR MIT

//! `DataSetReader` and `FieldTarget` (spec.md §3).

use crate::config::published_dataset::FieldMetaData;
use crate::types::{NodeId, ATTRIBUTE_ID_VALUE};
use std::time::Duration;

/// Subscriber-side target of a field: the node whose Value attribute is
/// written with the received value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldTarget {
    pub node_id: NodeId,
    pub attribute_id: u32,
    pub source_numeric_range: Option<String>,
    pub target_numeric_range: Option<String>,
}

impl FieldTarget {
    pub fn new(node_id: NodeId) -> Self {
        FieldTarget {
            node_id,
            attribute_id: ATTRIBUTE_ID_VALUE,
            source_numeric_range: None,
            target_numeric_range: None,
        }
    }
}

/// How a `DataSetReader`'s received values are delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceptionType {
    TargetVariables,
    Mirror,
}

/// A subscriber-side participant matching datagrams against a WriterId and
/// dispatching their fields into target variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataSetReader {
    /// `0` acts as a wildcard matching any WriterId (spec.md §4.4 step 3).
    pub data_set_writer_id: u16,
    pub receive_timeout: Duration,
    pub reception_type: ReceptionType,
    fields: Vec<FieldMetaData>,
}

impl DataSetReader {
    pub fn fields(&self) -> &[FieldMetaData] {
        &self.fields
    }

    /// Default receive timeout: 2x the peer's publishing interval
    /// (spec.md §5).
    pub fn default_timeout(publishing_interval: Duration) -> Duration {
        publishing_interval * 2
    }
}

/// Allocate-then-populate builder for a `DataSetReader`.
pub struct DataSetReaderBuilder {
    data_set_writer_id: u16,
    receive_timeout: Duration,
    reception_type: ReceptionType,
    fields: Vec<Option<FieldMetaData>>,
}

impl DataSetReaderBuilder {
    pub fn new(
        data_set_writer_id: u16,
        receive_timeout: Duration,
        reception_type: ReceptionType,
        field_count: usize,
    ) -> Self {
        DataSetReaderBuilder {
            data_set_writer_id,
            receive_timeout,
            reception_type,
            fields: vec![None; field_count],
        }
    }

    pub fn set_field(&mut self, index: usize, metadata: FieldMetaData) -> bool {
        match self.fields.get_mut(index) {
            Some(slot) => {
                *slot = Some(metadata);
                true
            }
            None => false,
        }
    }

    pub fn build(self) -> Option<DataSetReader> {
        let fields: Option<Vec<FieldMetaData>> = self.fields.into_iter().collect();
        fields.map(|fields| DataSetReader {
            data_set_writer_id: self.data_set_writer_id,
            receive_timeout: self.receive_timeout,
            reception_type: self.reception_type,
            fields,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::published_dataset::FieldMetaData;
    use crate::types::{BuiltInType, ValueRank};

    #[test]
    fn wildcard_writer_id_is_zero() {
        let mut builder =
            DataSetReaderBuilder::new(0, Duration::from_millis(100), ReceptionType::TargetVariables, 1);
        builder.set_field(
            0,
            FieldMetaData {
                built_in_type: BuiltInType::Boolean,
                value_rank: ValueRank::Scalar,
                array_dimensions: None,
                target: crate::config::published_dataset::FieldDirection::Consumed(
                    FieldTarget::new(NodeId::new("ns=1;s=X")),
                ),
            },
        );
        let reader = builder.build().expect("populated");
        assert_eq!(reader.data_set_writer_id, 0);
        assert_eq!(reader.fields().len(), 1);
    }

    #[test]
    fn default_timeout_doubles_publishing_interval() {
        assert_eq!(
            DataSetReader::default_timeout(Duration::from_millis(50)),
            Duration::from_millis(100)
        );
    }
}
