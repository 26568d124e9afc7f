// SPDX-License-Identifier: Apache-2.0 OR MIT

//! `WriterGroup` (spec.md §3, §4.1): allocate-then-populate builder over a
//! fixed-length array of `DataSetWriter`s, exactly as spec.md describes
//! the example ("a writer group's number of writers").

use crate::config::dataset_writer::DataSetWriter;
use crate::uadp::content_mask::UadpNetworkMessageContentMask;
use std::time::Duration;

/// Security mode of a `WriterGroup`/`ReaderGroup` (spec.md §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecurityMode {
    None,
    Sign,
    SignAndEncrypt,
}

/// Network message encoding of a group (spec.md §3). JSON encoding is
/// modeled as a variant for configuration completeness; the codec (§4.2)
/// only implements UADP, matching the Size Budget's focus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageEncoding {
    Uadp,
    Json,
}

/// A publisher-side grouping of `DataSetWriter`s sharing scheduling,
/// encoding and security settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriterGroup {
    pub group_id: u16,
    pub group_version: u32,
    pub publishing_interval: Duration,
    /// Offset within the publishing interval, strictly less than it.
    pub publishing_offset: i32,
    pub security_mode: SecurityMode,
    pub keep_alive: Option<Duration>,
    pub mqtt_topic: Option<String>,
    pub encoding: MessageEncoding,
    pub fixed_size_buffer: bool,
    pub content_mask: UadpNetworkMessageContentMask,
    pub security_key_services: Vec<usize>,
    /// Identifier passed to `pub_signature_failed` (spec.md §6/§8 S3).
    pub security_group_id: Option<String>,
    writers: Vec<DataSetWriter>,
}

impl WriterGroup {
    pub fn writers(&self) -> &[DataSetWriter] {
        &self.writers
    }
}

/// Allocate-then-populate builder for a `WriterGroup`.
pub struct WriterGroupBuilder {
    group_id: u16,
    group_version: u32,
    publishing_interval: Duration,
    publishing_offset: i32,
    security_mode: SecurityMode,
    keep_alive: Option<Duration>,
    mqtt_topic: Option<String>,
    encoding: MessageEncoding,
    fixed_size_buffer: bool,
    content_mask: UadpNetworkMessageContentMask,
    security_key_services: Vec<usize>,
    security_group_id: Option<String>,
    writers: Vec<Option<DataSetWriter>>,
}

impl WriterGroupBuilder {
    /// Allocate a group with `writer_count` slots. `group_id` and
    /// `group_version` must both be non-zero (validated at `build`).
    pub fn new(
        group_id: u16,
        group_version: u32,
        publishing_interval: Duration,
        writer_count: usize,
    ) -> Self {
        WriterGroupBuilder {
            group_id,
            group_version,
            publishing_interval,
            publishing_offset: 0,
            security_mode: SecurityMode::None,
            keep_alive: None,
            mqtt_topic: None,
            encoding: MessageEncoding::Uadp,
            fixed_size_buffer: false,
            content_mask: UadpNetworkMessageContentMask::minimal(),
            security_key_services: Vec::new(),
            security_group_id: None,
            writers: vec![None; writer_count],
        }
    }

    pub fn security_group_id(mut self, id: impl Into<String>) -> Self {
        self.security_group_id = Some(id.into());
        self
    }

    pub fn publishing_offset(mut self, offset_ms: i32) -> Self {
        self.publishing_offset = offset_ms;
        self
    }

    pub fn security_mode(mut self, mode: SecurityMode) -> Self {
        self.security_mode = mode;
        self
    }

    pub fn keep_alive(mut self, duration: Duration) -> Self {
        self.keep_alive = Some(duration);
        self
    }

    pub fn fixed_size_buffer(mut self, enabled: bool) -> Self {
        self.fixed_size_buffer = enabled;
        self
    }

    pub fn content_mask(mut self, mask: UadpNetworkMessageContentMask) -> Self {
        self.content_mask = mask;
        self
    }

    /// Populate one writer slot. Returns `false` on out-of-range index.
    pub fn set_writer(&mut self, index: usize, writer: DataSetWriter) -> bool {
        match self.writers.get_mut(index) {
            Some(slot) => {
                *slot = Some(writer);
                true
            }
            None => false,
        }
    }

    /// Freeze the builder, validating the invariants of spec.md §3/§7:
    /// non-zero group id/version, publishing offset below the interval,
    /// unique non-zero writer ids, keep-alive present when acyclic, and
    /// the fixed-size-buffer/non-DataItems refusal decided in SPEC_FULL.md.
    pub fn build(self, parent_is_acyclic: bool) -> Result<WriterGroup, crate::error::Error> {
        use crate::error::Error;

        if self.group_id == 0 {
            return Err(Error::Configuration("WriterGroup.group_id must be non-zero".into()));
        }
        if self.group_version == 0 {
            return Err(Error::Configuration(
                "WriterGroup.group_version must be non-zero".into(),
            ));
        }
        if self.publishing_offset.unsigned_abs() as u128 >= self.publishing_interval.as_millis() {
            return Err(Error::Configuration(
                "WriterGroup.publishing_offset must be less than publishing_interval".into(),
            ));
        }
        if parent_is_acyclic && self.keep_alive.is_none() {
            return Err(Error::Configuration(
                "acyclic connection requires WriterGroup.keep_alive".into(),
            ));
        }

        let writers: Option<Vec<DataSetWriter>> = self.writers.into_iter().collect();
        let writers = writers.ok_or_else(|| {
            Error::Configuration("WriterGroup has unpopulated writer slots".into())
        })?;

        let mut seen = std::collections::HashSet::new();
        for writer in &writers {
            if !seen.insert(writer.writer_id) {
                return Err(Error::Configuration(format!(
                    "duplicate WriterId {} within WriterGroup {}",
                    writer.writer_id, self.group_id
                )));
            }
        }

        Ok(WriterGroup {
            group_id: self.group_id,
            group_version: self.group_version,
            publishing_interval: self.publishing_interval,
            publishing_offset: self.publishing_offset,
            security_mode: self.security_mode,
            keep_alive: self.keep_alive,
            mqtt_topic: self.mqtt_topic,
            encoding: self.encoding,
            fixed_size_buffer: self.fixed_size_buffer,
            content_mask: self.content_mask,
            security_key_services: self.security_key_services,
            security_group_id: self.security_group_id,
            writers,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::dataset_writer::DataSetIndex;

    #[test]
    fn zero_group_id_rejected() {
        let mut builder = WriterGroupBuilder::new(0, 1, Duration::from_millis(50), 1);
        builder.set_writer(0, DataSetWriter::new(1, DataSetIndex(0)).unwrap());
        assert!(builder.build(false).is_err());
    }

    #[test]
    fn duplicate_writer_ids_rejected() {
        let mut builder = WriterGroupBuilder::new(14, 1, Duration::from_millis(50), 2);
        builder.set_writer(0, DataSetWriter::new(1, DataSetIndex(0)).unwrap());
        builder.set_writer(1, DataSetWriter::new(1, DataSetIndex(1)).unwrap());
        assert!(builder.build(false).is_err());
    }

    #[test]
    fn acyclic_requires_keep_alive() {
        let mut builder = WriterGroupBuilder::new(14, 1, Duration::from_millis(100), 1);
        builder.set_writer(0, DataSetWriter::new(1, DataSetIndex(0)).unwrap());
        assert!(builder.build(true).is_err());
    }

    #[test]
    fn valid_group_builds() {
        let mut builder = WriterGroupBuilder::new(14, 1, Duration::from_millis(50), 2)
            .publishing_offset(5);
        builder.set_writer(0, DataSetWriter::new(1, DataSetIndex(0)).unwrap());
        builder.set_writer(1, DataSetWriter::new(2, DataSetIndex(1)).unwrap());
        let group = builder.build(false).expect("valid");
        assert_eq!(group.writers().len(), 2);
    }
}
