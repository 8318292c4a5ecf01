//! Chunked binary reader.

use crate::error::{CoreError, Result};
use crate::io::format::{
    FloatWidth, ProductInfo, StreamHeader, CHUNK_END_SENTINEL, FORMAT_VERSION, MAGIC_1, MAGIC_2,
    MIN_FORMAT_VERSION, NULL_STRING_LENGTH,
};
use crate::io::migration;
use std::io::{Read, Seek, SeekFrom};

/// Input a [`LoadStream`] can read from and skip through.
pub trait ReadSeek: Read + Seek {}

impl<T: Read + Seek> ReadSeek for T {}

#[derive(Debug, Clone, Copy)]
struct OpenChunk {
    id: u32,
    end: u64,
}

/// Reads what a [`SaveStream`](crate::io::SaveStream) wrote.
///
/// Every value is read inside the chunk that holds it. [`LoadStream::close_chunk`]
/// skips whatever the caller did not consume, so newer writers can append
/// fields to a chunk without breaking older readers.
pub struct LoadStream<'a> {
    input: Box<dyn ReadSeek + 'a>,
    header: StreamHeader,
    chunks: Vec<OpenChunk>,
}

impl<'a> LoadStream<'a> {
    /// Read and validate the stream header.
    pub fn new(input: impl ReadSeek + 'a) -> Result<Self> {
        let mut stream = Self {
            input: Box::new(input),
            header: StreamHeader::default(),
            chunks: Vec::new(),
        };
        stream.header = stream.read_header()?;
        if stream.needs_float_conversion() {
            tracing::warn!(
                float_width = stream.header.float_width.bytes(),
                "Stream stores single-precision values; they are widened on read"
            );
        }
        for step in migration::pending_migrations(stream.header.format_version) {
            tracing::debug!(since = step.since, step = step.description, "Applying stream migration");
        }
        Ok(stream)
    }

    fn read_header(&mut self) -> Result<StreamHeader> {
        let magic_1 = self.read_u32()?;
        let magic_2 = self.read_u32()?;
        if magic_1 != MAGIC_1 || magic_2 != MAGIC_2 {
            return Err(CoreError::format("not a datavis stream (bad magic)", 0));
        }
        let format_version = self.read_u32()?;
        if format_version > FORMAT_VERSION {
            return Err(CoreError::UnsupportedVersion {
                found: format_version,
                supported: FORMAT_VERSION,
            });
        }
        if format_version < MIN_FORMAT_VERSION {
            return Err(CoreError::format(
                format!("format version {format_version} predates the oldest readable version"),
                8,
            ));
        }
        let width = self.read_u32()?;
        let float_width = FloatWidth::from_bytes(width)
            .ok_or_else(|| CoreError::format(format!("invalid float width {width}"), 12))?;
        let name = self.read_string()?;
        let (major, minor, revision) = if migration::has_version_triple(format_version) {
            (self.read_u32()?, self.read_u32()?, self.read_u32()?)
        } else {
            (0, 0, 0)
        };
        let version_string = self.read_string()?;
        Ok(StreamHeader {
            format_version,
            float_width,
            product: ProductInfo {
                name,
                major,
                minor,
                revision,
                version_string,
            },
        })
    }

    pub fn header(&self) -> &StreamHeader {
        &self.header
    }

    pub fn format_version(&self) -> u32 {
        self.header.format_version
    }

    pub fn float_width(&self) -> FloatWidth {
        self.header.float_width
    }

    /// Whether stored floats differ in width from `f64`.
    pub fn needs_float_conversion(&self) -> bool {
        migration::needs_float_conversion(self.header.float_width)
    }

    pub fn position(&mut self) -> Result<u64> {
        Ok(self.input.stream_position()?)
    }

    pub fn seek(&mut self, position: u64) -> Result<()> {
        self.input.seek(SeekFrom::Start(position))?;
        Ok(())
    }

    /// Total length of the underlying stream.
    pub fn stream_len(&mut self) -> Result<u64> {
        let current = self.position()?;
        let len = self.input.seek(SeekFrom::End(0))?;
        self.seek(current)?;
        Ok(len)
    }

    /// Number of chunks currently open.
    pub fn chunk_depth(&self) -> usize {
        self.chunks.len()
    }

    /// Whether the innermost open chunk (or the stream) has no more data.
    pub fn at_end(&mut self) -> Result<bool> {
        let position = self.position()?;
        let end = match self.chunks.last() {
            Some(chunk) => chunk.end,
            None => self.stream_len()?,
        };
        Ok(position >= end)
    }

    pub fn read_bytes(&mut self, buffer: &mut [u8]) -> Result<()> {
        if let Err(err) = self.input.read_exact(buffer) {
            if err.kind() == std::io::ErrorKind::UnexpectedEof {
                let position = self.position().unwrap_or(0);
                return Err(CoreError::format("unexpected end of stream", position));
            }
            return Err(err.into());
        }
        Ok(())
    }

    fn read_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut buffer = [0u8; N];
        self.read_bytes(&mut buffer)?;
        Ok(buffer)
    }

    /// Open the next chunk, whatever its id. Returns the id.
    pub fn open_chunk(&mut self) -> Result<u32> {
        let id = self.read_u32()?;
        let length = self.read_u32()?;
        let start = self.position()?;
        self.chunks.push(OpenChunk {
            id,
            end: start + u64::from(length),
        });
        Ok(id)
    }

    /// Open the next chunk and require it to have the given id.
    pub fn expect_chunk(&mut self, id: u32) -> Result<()> {
        let position = self.position()?;
        let found = self.open_chunk()?;
        if found != id {
            return Err(CoreError::UnexpectedChunk {
                expected: id,
                found,
                position,
            });
        }
        Ok(())
    }

    /// Open a chunk whose id lies in `base..=base + max_version`.
    /// Returns the version encoded in the id.
    pub fn expect_chunk_range(&mut self, base: u32, max_version: u32) -> Result<u32> {
        let position = self.position()?;
        let found = self.open_chunk()?;
        match found.checked_sub(base) {
            Some(version) if version <= max_version => Ok(version),
            _ => Err(CoreError::UnexpectedChunk {
                expected: base,
                found,
                position,
            }),
        }
    }

    /// Unread payload bytes of the innermost open chunk.
    pub fn remaining_in_chunk(&mut self) -> Result<u64> {
        let chunk = self.innermost()?;
        Ok(chunk.end.saturating_sub(self.position()?))
    }

    fn innermost(&self) -> Result<OpenChunk> {
        self.chunks
            .last()
            .copied()
            .ok_or_else(|| CoreError::Stream("no chunk is open".into()))
    }

    /// Reject a length prefix that runs past the open chunk or the stream end.
    fn check_available(&mut self, length: u64, position: u64) -> Result<()> {
        let available = if self.chunks.is_empty() {
            self.stream_len()?.saturating_sub(self.position()?)
        } else {
            self.remaining_in_chunk()?
        };
        if length > available {
            return Err(CoreError::format(
                format!("length {length} exceeds the {available} bytes left"),
                position,
            ));
        }
        Ok(())
    }

    /// Close the innermost chunk, skipping unread payload and checking the sentinel.
    pub fn close_chunk(&mut self) -> Result<()> {
        let chunk = self.innermost()?;
        let position = self.position()?;
        if position > chunk.end {
            return Err(CoreError::ReadPastChunkEnd {
                chunk_id: chunk.id,
                position,
                end: chunk.end,
            });
        }
        self.chunks.pop();
        if position < chunk.end {
            tracing::trace!(
                chunk_id = chunk.id,
                skipped = chunk.end - position,
                "Skipping unread chunk payload"
            );
            self.seek(chunk.end)?;
        }
        let sentinel = self.read_u32()?;
        if sentinel != CHUNK_END_SENTINEL {
            return Err(CoreError::format(
                format!("missing end marker of chunk 0x{:X}", chunk.id),
                chunk.end,
            ));
        }
        Ok(())
    }

    /// Skip the next chunk entirely. Returns its id.
    pub fn skip_chunk(&mut self) -> Result<u32> {
        let id = self.open_chunk()?;
        self.close_chunk()?;
        Ok(id)
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.read_array::<1>()?[0])
    }

    pub fn read_bool(&mut self) -> Result<bool> {
        Ok(self.read_u8()? != 0)
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        Ok(u32::from_be_bytes(self.read_array()?))
    }

    pub fn read_i32(&mut self) -> Result<i32> {
        Ok(i32::from_be_bytes(self.read_array()?))
    }

    pub fn read_u64(&mut self) -> Result<u64> {
        Ok(u64::from_be_bytes(self.read_array()?))
    }

    pub fn read_i64(&mut self) -> Result<i64> {
        Ok(i64::from_be_bytes(self.read_array()?))
    }

    pub fn read_size(&mut self) -> Result<usize> {
        let position = self.position()?;
        let value = self.read_u64()?;
        usize::try_from(value)
            .map_err(|_| CoreError::format(format!("size {value} does not fit in memory"), position))
    }

    pub fn read_f32(&mut self) -> Result<f32> {
        Ok(f32::from_be_bytes(self.read_array()?))
    }

    pub fn read_f64(&mut self) -> Result<f64> {
        Ok(f64::from_be_bytes(self.read_array()?))
    }

    /// A floating-point value stored at the stream's float width.
    pub fn read_float(&mut self) -> Result<f64> {
        match self.header.float_width {
            FloatWidth::Single => Ok(f64::from(self.read_f32()?)),
            FloatWidth::Double => self.read_f64(),
        }
    }

    pub fn read_string(&mut self) -> Result<String> {
        Ok(self.read_optional_string()?.unwrap_or_default())
    }

    /// A string, or `None` for the null marker.
    pub fn read_optional_string(&mut self) -> Result<Option<String>> {
        let position = self.position()?;
        let length = self.read_u32()?;
        if length == NULL_STRING_LENGTH {
            return Ok(None);
        }
        if length % 2 != 0 {
            return Err(CoreError::format(
                format!("odd UTF-16 string length {length}"),
                position,
            ));
        }
        self.check_available(u64::from(length), position)?;
        let mut bytes = vec![0u8; length as usize];
        self.read_bytes(&mut bytes)?;
        let units: Vec<u16> = bytes
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect();
        String::from_utf16(&units)
            .map(Some)
            .map_err(|_| CoreError::format("invalid UTF-16 string", position))
    }

    pub fn read_byte_array(&mut self) -> Result<Vec<u8>> {
        let position = self.position()?;
        let length = self.read_u32()?;
        self.check_available(u64::from(length), position)?;
        let mut bytes = vec![0u8; length as usize];
        self.read_bytes(&mut bytes)?;
        Ok(bytes)
    }

    /// An id written by [`SaveStream::write_pointer`](crate::io::SaveStream::write_pointer).
    pub fn read_pointer(&mut self) -> Result<u64> {
        self.read_u64()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::SaveStream;
    use std::io::Cursor;

    fn write(header: StreamHeader, body: impl FnOnce(&mut SaveStream<'_>)) -> Vec<u8> {
        let mut buffer = Cursor::new(Vec::new());
        {
            let mut out = SaveStream::new(&mut buffer, header).unwrap();
            body(&mut out);
            out.close().unwrap();
        }
        buffer.into_inner()
    }

    #[test]
    fn test_header_round_trip() {
        let bytes = write(StreamHeader::default(), |_| {});
        let stream = LoadStream::new(Cursor::new(bytes)).unwrap();
        assert_eq!(stream.header(), &StreamHeader::default());
        assert!(!stream.needs_float_conversion());
    }

    #[test]
    fn test_bad_magic_is_rejected() {
        let mut bytes = write(StreamHeader::default(), |_| {});
        bytes[0] ^= 0xFF;
        let err = LoadStream::new(Cursor::new(bytes)).err().unwrap();
        assert!(matches!(err, CoreError::Format { position: 0, .. }));
    }

    #[test]
    fn test_newer_version_is_rejected() {
        let mut bytes = write(StreamHeader::default(), |_| {});
        bytes[8..12].copy_from_slice(&(FORMAT_VERSION + 1).to_be_bytes());
        let err = LoadStream::new(Cursor::new(bytes)).err().unwrap();
        assert!(matches!(err, CoreError::UnsupportedVersion { .. }));
    }

    #[test]
    fn test_invalid_float_width_is_rejected() {
        let mut bytes = write(StreamHeader::default(), |_| {});
        bytes[12..16].copy_from_slice(&2u32.to_be_bytes());
        assert!(LoadStream::new(Cursor::new(bytes)).is_err());
    }

    #[test]
    fn test_unknown_chunk_is_skipped() {
        let bytes = write(StreamHeader::default(), |out| {
            out.begin_chunk(0x99).unwrap();
            out.begin_chunk(0x98).unwrap();
            out.write_string("nested payload").unwrap();
            out.end_chunk().unwrap();
            out.end_chunk().unwrap();
            out.begin_chunk(0x01).unwrap();
            out.write_i64(-5).unwrap();
            out.end_chunk().unwrap();
        });
        let mut stream = LoadStream::new(Cursor::new(bytes)).unwrap();
        assert_eq!(stream.skip_chunk().unwrap(), 0x99);
        stream.expect_chunk(0x01).unwrap();
        assert_eq!(stream.read_i64().unwrap(), -5);
        stream.close_chunk().unwrap();
        assert!(stream.at_end().unwrap());
    }

    #[test]
    fn test_reading_past_chunk_end_fails() {
        let bytes = write(StreamHeader::default(), |out| {
            out.begin_chunk(0x01).unwrap();
            out.write_u8(1).unwrap();
            out.end_chunk().unwrap();
        });
        let mut stream = LoadStream::new(Cursor::new(bytes)).unwrap();
        stream.expect_chunk(0x01).unwrap();
        stream.read_u32().unwrap();
        let err = stream.close_chunk().unwrap_err();
        assert!(matches!(err, CoreError::ReadPastChunkEnd { chunk_id: 0x01, .. }));
    }

    #[test]
    fn test_unexpected_chunk_reports_ids() {
        let bytes = write(StreamHeader::default(), |out| {
            out.begin_chunk(0x10).unwrap();
            out.end_chunk().unwrap();
        });
        let mut stream = LoadStream::new(Cursor::new(bytes)).unwrap();
        match stream.expect_chunk(0x20).unwrap_err() {
            CoreError::UnexpectedChunk { expected, found, .. } => {
                assert_eq!((expected, found), (0x20, 0x10));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_chunk_range_returns_version() {
        let bytes = write(StreamHeader::default(), |out| {
            out.begin_chunk(0x202).unwrap();
            out.end_chunk().unwrap();
            out.begin_chunk(0x205).unwrap();
            out.end_chunk().unwrap();
        });
        let mut stream = LoadStream::new(Cursor::new(bytes)).unwrap();
        assert_eq!(stream.expect_chunk_range(0x200, 2).unwrap(), 2);
        stream.close_chunk().unwrap();
        assert!(stream.expect_chunk_range(0x200, 2).is_err());
    }

    #[test]
    fn test_single_precision_floats_are_widened() {
        let header = StreamHeader::new(FloatWidth::Single, ProductInfo::default());
        let bytes = write(header, |out| {
            out.begin_chunk(0x01).unwrap();
            out.write_float(1.5).unwrap();
            out.write_float(0.1).unwrap();
            out.end_chunk().unwrap();
        });
        let mut stream = LoadStream::new(Cursor::new(bytes)).unwrap();
        assert!(stream.needs_float_conversion());
        stream.expect_chunk(0x01).unwrap();
        assert_eq!(stream.read_float().unwrap(), 1.5);
        assert_eq!(stream.read_float().unwrap(), f64::from(0.1f32));
        stream.close_chunk().unwrap();
    }

    #[test]
    fn test_strings_and_byte_arrays() {
        let bytes = write(StreamHeader::default(), |out| {
            out.write_string("Grüße 🌍").unwrap();
            out.write_optional_string(None).unwrap();
            out.write_string("").unwrap();
            out.write_byte_array(&[1, 2, 3]).unwrap();
        });
        let mut stream = LoadStream::new(Cursor::new(bytes)).unwrap();
        assert_eq!(stream.read_string().unwrap(), "Grüße 🌍");
        assert_eq!(stream.read_optional_string().unwrap(), None);
        assert_eq!(stream.read_optional_string().unwrap(), Some(String::new()));
        assert_eq!(stream.read_byte_array().unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn test_truncated_stream_is_format_error() {
        let mut bytes = write(StreamHeader::default(), |out| {
            out.begin_chunk(0x01).unwrap();
            out.write_u64(42).unwrap();
            out.end_chunk().unwrap();
        });
        bytes.truncate(bytes.len() - 8);
        let mut stream = LoadStream::new(Cursor::new(bytes)).unwrap();
        stream.expect_chunk(0x01).unwrap();
        assert!(matches!(stream.read_u64(), Err(CoreError::Format { .. })));
    }

    #[test]
    fn test_oversized_length_prefix_is_rejected() {
        let bytes = write(StreamHeader::default(), |out| {
            out.begin_chunk(0x01).unwrap();
            out.write_u32(0xFFFF_FFF0).unwrap();
            out.write_u32(0x7FFF_FFF0).unwrap();
            out.end_chunk().unwrap();
            out.write_u32(0xFFFF_FF00).unwrap();
        });
        let mut stream = LoadStream::new(Cursor::new(bytes)).unwrap();
        stream.expect_chunk(0x01).unwrap();
        assert!(matches!(stream.read_byte_array(), Err(CoreError::Format { .. })));
        // The rejected length was consumed; the next one is read as a string length.
        assert!(matches!(stream.read_optional_string(), Err(CoreError::Format { .. })));
        stream.close_chunk().unwrap();
        // Outside any chunk the stream end is the bound.
        assert!(matches!(stream.read_byte_array(), Err(CoreError::Format { .. })));
    }
}
