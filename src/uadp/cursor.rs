// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Bounds-checked little-endian read/write cursors for the UADP codec.
//!
//! Grounded on `hdds::core::ser::cursor` (`CursorMut`/`Cursor`): the same
//! macro-generated primitive accessors, minus CDR2 alignment padding,
//! which UADP's packed wire format does not use.

use super::{SerError, SerResult};

macro_rules! impl_write_le {
    ($name:ident, $type:ty, $size:expr) => {
        pub fn $name(&mut self, value: $type) -> SerResult<()> {
            if self.offset + $size > self.buffer.len() {
                return Err(SerError::WriteFailed {
                    offset: self.offset,
                    reason: "buffer too small".into(),
                });
            }
            let bytes = value.to_le_bytes();
            self.buffer[self.offset..self.offset + $size].copy_from_slice(&bytes);
            self.offset += $size;
            Ok(())
        }
    };
}

macro_rules! impl_read_le {
    ($name:ident, $type:ty, $size:expr) => {
        pub fn $name(&mut self) -> SerResult<$type> {
            if self.offset + $size > self.buffer.len() {
                return Err(SerError::ReadFailed {
                    offset: self.offset,
                    reason: "unexpected end of buffer".into(),
                });
            }
            let mut bytes = [0u8; $size];
            bytes.copy_from_slice(&self.buffer[self.offset..self.offset + $size]);
            self.offset += $size;
            Ok(<$type>::from_le_bytes(bytes))
        }
    };
}

/// Mutable cursor for writing (bounds-checked, zero-copy).
pub struct CursorMut<'a> {
    buffer: &'a mut [u8],
    offset: usize,
}

impl<'a> CursorMut<'a> {
    pub fn new(buffer: &'a mut [u8]) -> Self {
        Self { buffer, offset: 0 }
    }

    impl_write_le!(write_u8, u8, 1);
    impl_write_le!(write_u16_le, u16, 2);
    impl_write_le!(write_u32_le, u32, 4);
    impl_write_le!(write_u64_le, u64, 8);

    pub fn write_i8(&mut self, value: i8) -> SerResult<()> {
        self.write_u8(value as u8)
    }

    pub fn write_i16_le(&mut self, value: i16) -> SerResult<()> {
        self.write_bytes(&value.to_le_bytes())
    }

    pub fn write_i32_le(&mut self, value: i32) -> SerResult<()> {
        self.write_bytes(&value.to_le_bytes())
    }

    pub fn write_i64_le(&mut self, value: i64) -> SerResult<()> {
        self.write_bytes(&value.to_le_bytes())
    }

    pub fn write_f32_le(&mut self, value: f32) -> SerResult<()> {
        self.write_u32_le(value.to_bits())
    }

    pub fn write_f64_le(&mut self, value: f64) -> SerResult<()> {
        self.write_u64_le(value.to_bits())
    }

    /// Length-prefixed (`u32` length) byte string, UADP's string encoding.
    pub fn write_string(&mut self, value: &str) -> SerResult<()> {
        self.write_u32_le(value.len() as u32)?;
        self.write_bytes(value.as_bytes())
    }

    pub fn write_byte_string(&mut self, value: &[u8]) -> SerResult<()> {
        self.write_u32_le(value.len() as u32)?;
        self.write_bytes(value)
    }

    pub fn write_bytes(&mut self, data: &[u8]) -> SerResult<()> {
        if self.offset + data.len() > self.buffer.len() {
            return Err(SerError::WriteFailed {
                offset: self.offset,
                reason: "buffer too small".into(),
            });
        }
        self.buffer[self.offset..self.offset + data.len()].copy_from_slice(data);
        self.offset += data.len();
        Ok(())
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn remaining(&self) -> usize {
        self.buffer.len().saturating_sub(self.offset)
    }
}

/// Immutable cursor for reading (bounds-checked, zero-copy).
pub struct Cursor<'a> {
    buffer: &'a [u8],
    offset: usize,
}

impl<'a> Cursor<'a> {
    pub fn new(buffer: &'a [u8]) -> Self {
        Self { buffer, offset: 0 }
    }

    impl_read_le!(read_u8, u8, 1);
    impl_read_le!(read_u16_le, u16, 2);
    impl_read_le!(read_u32_le, u32, 4);
    impl_read_le!(read_u64_le, u64, 8);

    pub fn read_i8(&mut self) -> SerResult<i8> {
        Ok(self.read_u8()? as i8)
    }

    pub fn read_i16_le(&mut self) -> SerResult<i16> {
        let mut buf = [0u8; 2];
        buf.copy_from_slice(self.read_bytes(2)?);
        Ok(i16::from_le_bytes(buf))
    }

    pub fn read_i32_le(&mut self) -> SerResult<i32> {
        let mut buf = [0u8; 4];
        buf.copy_from_slice(self.read_bytes(4)?);
        Ok(i32::from_le_bytes(buf))
    }

    pub fn read_i64_le(&mut self) -> SerResult<i64> {
        let mut buf = [0u8; 8];
        buf.copy_from_slice(self.read_bytes(8)?);
        Ok(i64::from_le_bytes(buf))
    }

    pub fn read_f32_le(&mut self) -> SerResult<f32> {
        Ok(f32::from_bits(self.read_u32_le()?))
    }

    pub fn read_f64_le(&mut self) -> SerResult<f64> {
        Ok(f64::from_bits(self.read_u64_le()?))
    }

    pub fn read_string(&mut self) -> SerResult<String> {
        let len = self.read_u32_le()? as usize;
        let bytes = self.read_bytes(len)?;
        String::from_utf8(bytes.to_vec())
            .map_err(|_| SerError::InvalidData { reason: "string is not valid UTF-8".into() })
    }

    pub fn read_byte_string(&mut self) -> SerResult<Vec<u8>> {
        let len = self.read_u32_le()? as usize;
        Ok(self.read_bytes(len)?.to_vec())
    }

    pub fn read_bytes(&mut self, len: usize) -> SerResult<&'a [u8]> {
        if self.offset + len > self.buffer.len() {
            return Err(SerError::ReadFailed {
                offset: self.offset,
                reason: "unexpected end of buffer".into(),
            });
        }
        let slice = &self.buffer[self.offset..self.offset + len];
        self.offset += len;
        Ok(slice)
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn remaining(&self) -> usize {
        self.buffer.len().saturating_sub(self.offset)
    }

    pub fn is_eof(&self) -> bool {
        self.offset >= self.buffer.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_primitives() {
        let mut buffer = [0u8; 64];
        let mut writer = CursorMut::new(&mut buffer);
        writer.write_u8(0xAB).unwrap();
        writer.write_u16_le(0x1234).unwrap();
        writer.write_u32_le(0x1122_3344).unwrap();
        writer.write_i32_le(-7).unwrap();
        writer.write_f64_le(2.5).unwrap();
        writer.write_string("hi").unwrap();
        let written = writer.offset();

        let mut reader = Cursor::new(&buffer[..written]);
        assert_eq!(reader.read_u8().unwrap(), 0xAB);
        assert_eq!(reader.read_u16_le().unwrap(), 0x1234);
        assert_eq!(reader.read_u32_le().unwrap(), 0x1122_3344);
        assert_eq!(reader.read_i32_le().unwrap(), -7);
        assert_eq!(reader.read_f64_le().unwrap(), 2.5);
        assert_eq!(reader.read_string().unwrap(), "hi");
        assert!(reader.is_eof());
    }

    #[test]
    fn write_overflow_reports_offset() {
        let mut buffer = [0u8; 1];
        let mut cursor = CursorMut::new(&mut buffer);
        cursor.write_u8(1).unwrap();
        let err = cursor.write_u8(2).unwrap_err();
        match err {
            SerError::WriteFailed { offset, .. } => assert_eq!(offset, 1),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn read_overflow_reports_offset() {
        let buffer = [0u8; 1];
        let mut cursor = Cursor::new(&buffer);
        cursor.read_u8().unwrap();
        let err = cursor.read_u8().unwrap_err();
        match err {
            SerError::ReadFailed { offset, .. } => assert_eq!(offset, 1),
            other => panic!("unexpected error {other:?}"),
        }
    }
}
