//! Byte-order aware cursor helpers shared by the ADF reader and writer

use byteorder::{BigEndian, LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Cursor, Read, Seek, SeekFrom, Write};

use crate::error::{Error, Result};

/// Byte order of an ADF file, chosen by the header magic
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Endian {
    #[default]
    Little,
    Big,
}

/// Round `value` up to the next multiple of `align` (0 and 1 mean unaligned)
pub fn align_up(value: u64, align: u64) -> u64 {
    if align <= 1 {
        return value;
    }
    value.div_ceil(align) * align
}

/// Reader over an in-memory buffer
pub struct AdfReader<'a> {
    cursor: Cursor<&'a [u8]>,
    endian: Endian,
}

impl<'a> AdfReader<'a> {
    pub fn new(data: &'a [u8], endian: Endian) -> Self {
        Self {
            cursor: Cursor::new(data),
            endian,
        }
    }

    pub fn endian(&self) -> Endian {
        self.endian
    }

    pub fn len(&self) -> u64 {
        self.cursor.get_ref().len() as u64
    }

    pub fn position(&self) -> u64 {
        self.cursor.position()
    }

    pub fn seek(&mut self, position: u64) -> Result<()> {
        self.cursor.seek(SeekFrom::Start(position))?;
        Ok(())
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.cursor.read_u8()?)
    }

    pub fn read_i8(&mut self) -> Result<i8> {
        Ok(self.cursor.read_i8()?)
    }

    pub fn read_u16(&mut self) -> Result<u16> {
        Ok(match self.endian {
            Endian::Little => self.cursor.read_u16::<LittleEndian>()?,
            Endian::Big => self.cursor.read_u16::<BigEndian>()?,
        })
    }

    pub fn read_i16(&mut self) -> Result<i16> {
        Ok(match self.endian {
            Endian::Little => self.cursor.read_i16::<LittleEndian>()?,
            Endian::Big => self.cursor.read_i16::<BigEndian>()?,
        })
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        Ok(match self.endian {
            Endian::Little => self.cursor.read_u32::<LittleEndian>()?,
            Endian::Big => self.cursor.read_u32::<BigEndian>()?,
        })
    }

    pub fn read_i32(&mut self) -> Result<i32> {
        Ok(match self.endian {
            Endian::Little => self.cursor.read_i32::<LittleEndian>()?,
            Endian::Big => self.cursor.read_i32::<BigEndian>()?,
        })
    }

    pub fn read_u64(&mut self) -> Result<u64> {
        Ok(match self.endian {
            Endian::Little => self.cursor.read_u64::<LittleEndian>()?,
            Endian::Big => self.cursor.read_u64::<BigEndian>()?,
        })
    }

    pub fn read_i64(&mut self) -> Result<i64> {
        Ok(match self.endian {
            Endian::Little => self.cursor.read_i64::<LittleEndian>()?,
            Endian::Big => self.cursor.read_i64::<BigEndian>()?,
        })
    }

    pub fn read_f32(&mut self) -> Result<f32> {
        Ok(match self.endian {
            Endian::Little => self.cursor.read_f32::<LittleEndian>()?,
            Endian::Big => self.cursor.read_f32::<BigEndian>()?,
        })
    }

    pub fn read_f64(&mut self) -> Result<f64> {
        Ok(match self.endian {
            Endian::Little => self.cursor.read_f64::<LittleEndian>()?,
            Endian::Big => self.cursor.read_f64::<BigEndian>()?,
        })
    }

    pub fn read_bytes(&mut self, count: usize) -> Result<Vec<u8>> {
        let mut bytes = vec![0u8; count];
        self.cursor.read_exact(&mut bytes)?;
        Ok(bytes)
    }

    /// Read a null-terminated string; the terminator must be present
    pub fn read_cstring(&mut self) -> Result<String> {
        let data = *self.cursor.get_ref();
        let start = self.cursor.position() as usize;
        if start > data.len() {
            return Err(Error::InvalidAdf(format!(
                "string offset {} exceeds data length {}",
                start,
                data.len()
            )));
        }

        let end = data[start..]
            .iter()
            .position(|&b| b == 0)
            .map(|p| start + p)
            .ok_or_else(|| Error::InvalidAdf(format!("unterminated string at {}", start)))?;

        let value = std::str::from_utf8(&data[start..end])
            .map_err(|e| Error::InvalidAdf(format!("string at {} is not UTF-8: {}", start, e)))?
            .to_string();
        self.cursor.seek(SeekFrom::Start(end as u64 + 1))?;
        Ok(value)
    }

    /// Read a null-terminated string at `position` without moving the cursor
    pub fn read_cstring_at(&mut self, position: u64) -> Result<String> {
        let saved = self.cursor.position();
        self.seek(position)?;
        let value = self.read_cstring();
        self.seek(saved)?;
        value
    }
}

/// Writer into a growable buffer, with random-access patching
pub struct AdfWriter {
    cursor: Cursor<Vec<u8>>,
    endian: Endian,
}

impl AdfWriter {
    pub fn new(endian: Endian) -> Self {
        Self {
            cursor: Cursor::new(Vec::new()),
            endian,
        }
    }

    /// Wrap a pre-sized zeroed buffer (used for instance bodies)
    pub fn with_len(len: usize, endian: Endian) -> Self {
        Self {
            cursor: Cursor::new(vec![0u8; len]),
            endian,
        }
    }

    pub fn endian(&self) -> Endian {
        self.endian
    }

    pub fn position(&self) -> u64 {
        self.cursor.position()
    }

    pub fn seek(&mut self, position: u64) -> Result<()> {
        self.cursor.seek(SeekFrom::Start(position))?;
        Ok(())
    }

    /// Zero-pad up to the next multiple of `align`
    pub fn align(&mut self, align: u64) -> Result<()> {
        let position = self.cursor.position();
        let target = align_up(position, align);
        if target > position {
            self.write_bytes(&vec![0u8; (target - position) as usize])?;
        }
        Ok(())
    }

    pub fn write_u8(&mut self, value: u8) -> Result<()> {
        Ok(self.cursor.write_u8(value)?)
    }

    pub fn write_i8(&mut self, value: i8) -> Result<()> {
        Ok(self.cursor.write_i8(value)?)
    }

    pub fn write_u16(&mut self, value: u16) -> Result<()> {
        Ok(match self.endian {
            Endian::Little => self.cursor.write_u16::<LittleEndian>(value)?,
            Endian::Big => self.cursor.write_u16::<BigEndian>(value)?,
        })
    }

    pub fn write_i16(&mut self, value: i16) -> Result<()> {
        Ok(match self.endian {
            Endian::Little => self.cursor.write_i16::<LittleEndian>(value)?,
            Endian::Big => self.cursor.write_i16::<BigEndian>(value)?,
        })
    }

    pub fn write_u32(&mut self, value: u32) -> Result<()> {
        Ok(match self.endian {
            Endian::Little => self.cursor.write_u32::<LittleEndian>(value)?,
            Endian::Big => self.cursor.write_u32::<BigEndian>(value)?,
        })
    }

    pub fn write_i32(&mut self, value: i32) -> Result<()> {
        Ok(match self.endian {
            Endian::Little => self.cursor.write_i32::<LittleEndian>(value)?,
            Endian::Big => self.cursor.write_i32::<BigEndian>(value)?,
        })
    }

    pub fn write_u64(&mut self, value: u64) -> Result<()> {
        Ok(match self.endian {
            Endian::Little => self.cursor.write_u64::<LittleEndian>(value)?,
            Endian::Big => self.cursor.write_u64::<BigEndian>(value)?,
        })
    }

    pub fn write_i64(&mut self, value: i64) -> Result<()> {
        Ok(match self.endian {
            Endian::Little => self.cursor.write_i64::<LittleEndian>(value)?,
            Endian::Big => self.cursor.write_i64::<BigEndian>(value)?,
        })
    }

    pub fn write_f32(&mut self, value: f32) -> Result<()> {
        Ok(match self.endian {
            Endian::Little => self.cursor.write_f32::<LittleEndian>(value)?,
            Endian::Big => self.cursor.write_f32::<BigEndian>(value)?,
        })
    }

    pub fn write_f64(&mut self, value: f64) -> Result<()> {
        Ok(match self.endian {
            Endian::Little => self.cursor.write_f64::<LittleEndian>(value)?,
            Endian::Big => self.cursor.write_f64::<BigEndian>(value)?,
        })
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        self.cursor.write_all(bytes)?;
        Ok(())
    }

    /// Write `value` followed by a null terminator
    pub fn write_cstring(&mut self, value: &str) -> Result<()> {
        self.write_bytes(value.as_bytes())?;
        self.write_u8(0)
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.cursor.into_inner()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_align_up() {
        assert_eq!(align_up(0, 16), 0);
        assert_eq!(align_up(1, 16), 16);
        assert_eq!(align_up(16, 16), 16);
        assert_eq!(align_up(17, 8), 24);
        assert_eq!(align_up(5, 0), 5);
        assert_eq!(align_up(5, 1), 5);
    }

    #[test]
    fn test_endian_round_values() {
        let mut writer = AdfWriter::new(Endian::Big);
        writer.write_u32(0x01020304).unwrap();
        writer.write_u16(0x0506).unwrap();
        let bytes = writer.into_inner();
        assert_eq!(bytes, vec![1, 2, 3, 4, 5, 6]);

        let mut reader = AdfReader::new(&bytes, Endian::Big);
        assert_eq!(reader.read_u32().unwrap(), 0x01020304);
        let mut reader = AdfReader::new(&bytes, Endian::Little);
        assert_eq!(reader.read_u32().unwrap(), 0x04030201);
    }

    #[test]
    fn test_cstring_requires_terminator() {
        let data = b"abc\0def";
        let mut reader = AdfReader::new(data, Endian::Little);
        assert_eq!(reader.read_cstring().unwrap(), "abc");
        assert_eq!(reader.position(), 4);
        assert!(matches!(reader.read_cstring(), Err(Error::InvalidAdf(_))));
        assert_eq!(reader.read_cstring_at(0).unwrap(), "abc");
    }

    #[test]
    fn test_writer_align_and_patch() {
        let mut writer = AdfWriter::new(Endian::Little);
        writer.write_u8(7).unwrap();
        writer.align(8).unwrap();
        assert_eq!(writer.position(), 8);
        writer.seek(0).unwrap();
        writer.write_u8(9).unwrap();
        let data = writer.into_inner();
        assert_eq!(data.len(), 8);
        assert_eq!(data[0], 9);
    }
}
