// SPDX-License-Identifier: Apache-2.0 OR MIT

//! PubSub configuration & dataset layer (spec.md §3, §4.1).
//!
//! An immutable description of connections, writer/reader groups, datasets
//! and field metadata, built through a two-phase
//! builder-then-frozen-config pattern (spec.md §9): a mutable
//! [`PubSubConfigurationBuilder`] allocates fixed-length arrays up front and
//! is populated by index, then [`PubSubConfigurationBuilder::build`] checks
//! cross-references and freezes the result into an immutable
//! [`PubSubConfiguration`] addressed by stable, monotonic indices.

pub mod connection;
pub mod dataset_reader;
pub mod dataset_writer;
pub mod publisher_id;
pub mod published_dataset;
pub mod reader_group;
pub mod security;
pub mod writer_group;

pub use connection::{BrokerCredentials, ConnectionGroups, ConnectionRole, PubSubConnection};
pub use dataset_reader::{DataSetReader, DataSetReaderBuilder, FieldTarget, ReceptionType};
pub use dataset_writer::{DataSetIndex, DataSetWriter, DataSetWriterOptions};
pub use publisher_id::PublisherId;
pub use published_dataset::{
    DataSetSourceType, FieldDirection, FieldMetaData, PublishedDataSet, PublishedDataSetBuilder,
    PublishedVariable,
};
pub use reader_group::{ReaderGroup, ReaderGroupBuilder};
pub use security::{KeySnapshotView, SecurityKeyManager, SecurityKeyServices, SymmetricKey};
pub use writer_group::{MessageEncoding, SecurityMode, WriterGroup, WriterGroupBuilder};

use crate::error::Error;

/// Root, immutable configuration object handed to both schedulers.
///
/// Owns two ordered sequences of connections (publisher-role and
/// subscriber-role) and one ordered sequence of `PublishedDataSet`s.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PubSubConfiguration {
    publisher_connections: Vec<PubSubConnection>,
    subscriber_connections: Vec<PubSubConnection>,
    published_data_sets: Vec<PublishedDataSet>,
}

impl PubSubConfiguration {
    pub fn publisher_connections(&self) -> &[PubSubConnection] {
        &self.publisher_connections
    }

    pub fn subscriber_connections(&self) -> &[PubSubConnection] {
        &self.subscriber_connections
    }

    pub fn published_data_sets(&self) -> &[PublishedDataSet] {
        &self.published_data_sets
    }

    pub fn data_set(&self, index: DataSetIndex) -> Option<&PublishedDataSet> {
        self.published_data_sets.get(index.0)
    }
}

/// Monotonic "allocate then populate" builder for a [`PubSubConfiguration`].
///
/// Connections and datasets are appended (monotonic push): once an
/// accessor returns a non-sentinel reference, that reference is stable for
/// the lifetime of the root configuration (spec.md §4.1's key contract).
#[derive(Debug, Default)]
pub struct PubSubConfigurationBuilder {
    publisher_connections: Vec<PubSubConnection>,
    subscriber_connections: Vec<PubSubConnection>,
    published_data_sets: Vec<PublishedDataSet>,
}

impl PubSubConfigurationBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a `PublishedDataSet`, returning its stable index.
    pub fn add_data_set(&mut self, data_set: PublishedDataSet) -> DataSetIndex {
        self.published_data_sets.push(data_set);
        DataSetIndex(self.published_data_sets.len() - 1)
    }

    pub fn add_publisher_connection(&mut self, connection: PubSubConnection) -> Result<(), Error> {
        if connection.role() != ConnectionRole::Publisher {
            return Err(Error::Configuration(
                "add_publisher_connection requires a Publisher-role connection".into(),
            ));
        }
        self.publisher_connections.push(connection);
        Ok(())
    }

    pub fn add_subscriber_connection(
        &mut self,
        connection: PubSubConnection,
    ) -> Result<(), Error> {
        if connection.role() != ConnectionRole::Subscriber {
            return Err(Error::Configuration(
                "add_subscriber_connection requires a Subscriber-role connection".into(),
            ));
        }
        self.subscriber_connections.push(connection);
        Ok(())
    }

    /// Freeze the builder: validates every connection and the
    /// "every `DataSetWriter` in a publisher connection references exactly
    /// one `PublishedDataSet` in this root" invariant of spec.md §3.
    pub fn build(self) -> Result<PubSubConfiguration, Error> {
        for connection in self
            .publisher_connections
            .iter()
            .chain(self.subscriber_connections.iter())
        {
            connection.validate()?;
        }

        for connection in &self.publisher_connections {
            for group in connection.groups.writer_groups() {
                for writer in group.writers() {
                    if writer.data_set.0 >= self.published_data_sets.len() {
                        return Err(Error::Configuration(format!(
                            "DataSetWriter {} references unknown PublishedDataSet {}",
                            writer.writer_id, writer.data_set.0
                        )));
                    }
                    let declared = &self.published_data_sets[writer.data_set.0];
                    if declared.field_count() == 0 {
                        return Err(Error::Configuration(
                            "PublishedDataSet referenced by a writer has no fields".into(),
                        ));
                    }
                    if group.fixed_size_buffer
                        && declared.source_type != DataSetSourceType::DataItems
                    {
                        return Err(Error::Configuration(format!(
                            "WriterGroup {} has fixed_size_buffer set but DataSetWriter {} \
                             publishes a non-DataItems dataset whose encoded size cannot be proven constant",
                            group.group_id, writer.writer_id
                        )));
                    }
                }
            }
        }

        Ok(PubSubConfiguration {
            publisher_connections: self.publisher_connections,
            subscriber_connections: self.subscriber_connections,
            published_data_sets: self.published_data_sets,
        })
    }
}

/// Seam for an external configuration adapter (e.g. the XML loader of
/// spec.md §1/§6), out of scope for this crate. No implementation ships
/// here; this trait only marks where one plugs in, mirroring the
/// pluggable-loader shape of `hdds::dds::qos::loaders`.
pub trait ConfigurationLoader {
    type Error;

    fn load(&self) -> Result<PubSubConfiguration, Self::Error>;
}
