//! ADF file header parsing and writing

use byteorder::{LittleEndian, ReadBytesExt};
use std::io::Cursor;

use crate::adf::io::{AdfReader, AdfWriter, Endian};
use crate::error::{Error, Result};

/// `"ADF "` read as a little-endian u32
pub const ADF_MAGIC: u32 = 0x4144_4620;

/// The only supported format version
pub const ADF_VERSION: u32 = 4;

/// ADF file header containing section offsets and counts
///
/// All offsets are relative to the header's own position in the stream.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AdfHeader {
    pub endian: Endian,
    pub version: u32,

    pub instance_count: u32,
    pub instance_offset: u32,
    pub type_count: u32,
    pub type_offset: u32,
    pub string_hash_count: u32,
    pub string_hash_offset: u32,
    pub name_count: u32,
    pub name_offset: u32,

    /// Bytes from the header start to the end of the last section
    pub total_size: u32,

    pub comment: String,
}

impl AdfHeader {
    /// Fixed bytes before the comment
    pub const FIXED_SIZE: u64 = 0x40;

    /// Read the magic at the start of `data` and work out the byte order
    pub fn detect_endian(data: &[u8]) -> Result<Endian> {
        let mut cursor = Cursor::new(data);
        let magic = cursor.read_u32::<LittleEndian>()?;
        if magic == ADF_MAGIC {
            Ok(Endian::Little)
        } else if magic == ADF_MAGIC.swap_bytes() {
            Ok(Endian::Big)
        } else {
            Err(Error::BadSignature(magic))
        }
    }

    /// Parse a header located at `base` within `data`
    pub fn parse(data: &[u8], base: u64) -> Result<Self> {
        let fixed_end = base.saturating_add(Self::FIXED_SIZE);
        if fixed_end > data.len() as u64 {
            return Err(Error::TruncatedStream {
                required: fixed_end,
                available: data.len() as u64,
            });
        }
        let endian = Self::detect_endian(&data[base as usize..])?;
        let mut reader = AdfReader::new(data, endian);
        reader.seek(base + 4)?;

        let version = reader.read_u32()?;
        if version != ADF_VERSION {
            return Err(Error::UnsupportedVersion(version));
        }

        let instance_count = reader.read_u32()?;
        let instance_offset = reader.read_u32()?;
        let type_count = reader.read_u32()?;
        let type_offset = reader.read_u32()?;
        let string_hash_count = reader.read_u32()?;
        let string_hash_offset = reader.read_u32()?;
        let name_count = reader.read_u32()?;
        let name_offset = reader.read_u32()?;
        let total_size = reader.read_u32()?;

        // Five reserved words, always zero in valid files
        for i in 0..5 {
            let reserved = reader.read_u32()?;
            if reserved != 0 {
                return Err(Error::InvalidAdf(format!(
                    "reserved header field {} is {:#x}, expected 0",
                    i, reserved
                )));
            }
        }

        let comment = reader.read_cstring()?;

        let required = base + total_size as u64;
        if required > data.len() as u64 {
            return Err(Error::TruncatedStream {
                required,
                available: data.len() as u64,
            });
        }

        Ok(AdfHeader {
            endian,
            version,
            instance_count,
            instance_offset,
            type_count,
            type_offset,
            string_hash_count,
            string_hash_offset,
            name_count,
            name_offset,
            total_size,
            comment,
        })
    }

    /// Write the header at the writer's current position
    pub fn write(&self, writer: &mut AdfWriter) -> Result<()> {
        writer.write_u32(ADF_MAGIC)?;
        writer.write_u32(self.version)?;
        writer.write_u32(self.instance_count)?;
        writer.write_u32(self.instance_offset)?;
        writer.write_u32(self.type_count)?;
        writer.write_u32(self.type_offset)?;
        writer.write_u32(self.string_hash_count)?;
        writer.write_u32(self.string_hash_offset)?;
        writer.write_u32(self.name_count)?;
        writer.write_u32(self.name_offset)?;
        writer.write_u32(self.total_size)?;
        for _ in 0..5 {
            writer.write_u32(0)?;
        }
        writer.write_cstring(&self.comment)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(endian: Endian) -> Vec<u8> {
        let header = AdfHeader {
            endian,
            version: ADF_VERSION,
            total_size: 0x48,
            comment: "hello".into(),
            ..Default::default()
        };
        let mut writer = AdfWriter::new(endian);
        header.write(&mut writer).unwrap();
        writer.align(8).unwrap();
        writer.into_inner()
    }

    #[test]
    fn test_parse_both_byte_orders() {
        for endian in [Endian::Little, Endian::Big] {
            let data = sample(endian);
            let header = AdfHeader::parse(&data, 0).unwrap();
            assert_eq!(header.endian, endian);
            assert_eq!(header.comment, "hello");
        }
        assert_eq!(&sample(Endian::Little)[0..4], b" FDA");
        assert_eq!(&sample(Endian::Big)[0..4], b"ADF ");
    }

    #[test]
    fn test_bad_signature() {
        let mut data = sample(Endian::Little);
        data[0..4].copy_from_slice(b"RIFF");
        assert!(matches!(AdfHeader::parse(&data, 0), Err(Error::BadSignature(_))));
    }

    #[test]
    fn test_short_header() {
        let data = sample(Endian::Little);
        assert!(matches!(
            AdfHeader::parse(&data[..0x20], 0),
            Err(Error::TruncatedStream { required: 0x40, .. })
        ));
    }

    #[test]
    fn test_bad_version() {
        let mut data = sample(Endian::Little);
        data[4] = 3;
        assert!(matches!(
            AdfHeader::parse(&data, 0),
            Err(Error::UnsupportedVersion(3))
        ));
    }

    #[test]
    fn test_reserved_must_be_zero() {
        let mut data = sample(Endian::Little);
        data[0x30] = 1;
        assert!(matches!(AdfHeader::parse(&data, 0), Err(Error::InvalidAdf(_))));
    }

    #[test]
    fn test_truncated() {
        let mut data = sample(Endian::Little);
        data[0x28] = 0xFF;
        assert!(matches!(
            AdfHeader::parse(&data, 0),
            Err(Error::TruncatedStream { .. })
        ));
    }

    #[test]
    fn test_parse_at_base_offset() {
        let mut data = vec![0xEEu8; 16];
        data.extend(sample(Endian::Little));
        let header = AdfHeader::parse(&data, 16).unwrap();
        assert_eq!(header.total_size, 0x48);
    }
}
