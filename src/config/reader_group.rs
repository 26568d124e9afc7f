// SPDX-License-Identifier: Apache-2.0 OR MIT

//! `ReaderGroup` (spec.md §3): mirrors `WriterGroup`.

use crate::config::dataset_reader::DataSetReader;
use crate::config::publisher_id::PublisherId;
use crate::config::writer_group::SecurityMode;
use crate::uadp::content_mask::UadpNetworkMessageContentMask;

/// A subscriber-side grouping of `DataSetReader`s sharing matching and
/// security settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReaderGroup {
    pub group_id: u16,
    pub group_version: u32,
    pub expected_publisher_id: PublisherId,
    pub security_mode: SecurityMode,
    pub mqtt_topic: Option<String>,
    pub content_mask: UadpNetworkMessageContentMask,
    pub security_key_services: Vec<usize>,
    /// Identifier passed to `sub_signature_check_failed` (spec.md §6/§8 S3).
    pub security_group_id: Option<String>,
    readers: Vec<DataSetReader>,
}

impl ReaderGroup {
    pub fn readers(&self) -> &[DataSetReader] {
        &self.readers
    }
}

/// Allocate-then-populate builder for a `ReaderGroup`.
pub struct ReaderGroupBuilder {
    group_id: u16,
    group_version: u32,
    expected_publisher_id: PublisherId,
    security_mode: SecurityMode,
    mqtt_topic: Option<String>,
    content_mask: UadpNetworkMessageContentMask,
    security_key_services: Vec<usize>,
    security_group_id: Option<String>,
    readers: Vec<Option<DataSetReader>>,
}

impl ReaderGroupBuilder {
    pub fn new(
        group_id: u16,
        group_version: u32,
        expected_publisher_id: PublisherId,
        reader_count: usize,
    ) -> Self {
        ReaderGroupBuilder {
            group_id,
            group_version,
            expected_publisher_id,
            security_mode: SecurityMode::None,
            mqtt_topic: None,
            content_mask: UadpNetworkMessageContentMask::minimal(),
            security_key_services: Vec::new(),
            security_group_id: None,
            readers: vec![None; reader_count],
        }
    }

    pub fn security_mode(mut self, mode: SecurityMode) -> Self {
        self.security_mode = mode;
        self
    }

    pub fn security_group_id(mut self, id: impl Into<String>) -> Self {
        self.security_group_id = Some(id.into());
        self
    }

    pub fn set_reader(&mut self, index: usize, reader: DataSetReader) -> bool {
        match self.readers.get_mut(index) {
            Some(slot) => {
                *slot = Some(reader);
                true
            }
            None => false,
        }
    }

    pub fn build(self) -> Result<ReaderGroup, crate::error::Error> {
        use crate::error::Error;

        if self.group_id == 0 {
            return Err(Error::Configuration("ReaderGroup.group_id must be non-zero".into()));
        }
        if self.group_version == 0 {
            return Err(Error::Configuration(
                "ReaderGroup.group_version must be non-zero".into(),
            ));
        }
        let readers: Option<Vec<DataSetReader>> = self.readers.into_iter().collect();
        let readers = readers.ok_or_else(|| {
            Error::Configuration("ReaderGroup has unpopulated reader slots".into())
        })?;

        Ok(ReaderGroup {
            group_id: self.group_id,
            group_version: self.group_version,
            expected_publisher_id: self.expected_publisher_id,
            security_mode: self.security_mode,
            mqtt_topic: self.mqtt_topic,
            content_mask: self.content_mask,
            security_key_services: self.security_key_services,
            security_group_id: self.security_group_id,
            readers,
        })
    }
}
