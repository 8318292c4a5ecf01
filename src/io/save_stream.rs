//! Chunked binary writer.

use crate::error::{CoreError, Result};
use crate::io::format::{
    FloatWidth, StreamHeader, CHUNK_END_SENTINEL, MAGIC_1, MAGIC_2, NULL_STRING_LENGTH,
};
use crate::io::migration;
use crate::oo::object::object_addr;
use std::collections::HashMap;
use std::io::{Seek, SeekFrom, Write};

/// Output a [`SaveStream`] can write to and patch.
pub trait WriteSeek: Write + Seek {}

impl<T: Write + Seek> WriteSeek for T {}

/// Writes the stream header, nested chunks and primitive values.
///
/// Every chunk opened with [`SaveStream::begin_chunk`] must be closed with
/// [`SaveStream::end_chunk`] before [`SaveStream::close`]. The length of a
/// chunk is back-patched when it ends, so the output must be seekable.
pub struct SaveStream<'a> {
    output: Box<dyn WriteSeek + 'a>,
    header: StreamHeader,
    /// Id and payload start of every open chunk, innermost last.
    chunks: Vec<(u32, u64)>,
    pointers: HashMap<usize, u64>,
    closed: bool,
}

impl<'a> SaveStream<'a> {
    /// Start a stream and write its header.
    pub fn new(output: impl WriteSeek + 'a, header: StreamHeader) -> Result<Self> {
        let mut stream = Self {
            output: Box::new(output),
            header,
            chunks: Vec::new(),
            pointers: HashMap::new(),
            closed: false,
        };
        stream.write_header()?;
        Ok(stream)
    }

    fn write_header(&mut self) -> Result<()> {
        let header = self.header.clone();
        self.write_u32(MAGIC_1)?;
        self.write_u32(MAGIC_2)?;
        self.write_u32(header.format_version)?;
        self.write_u32(header.float_width.bytes())?;
        self.write_string(&header.product.name)?;
        if migration::has_version_triple(header.format_version) {
            self.write_u32(header.product.major)?;
            self.write_u32(header.product.minor)?;
            self.write_u32(header.product.revision)?;
        }
        self.write_string(&header.product.version_string)?;
        tracing::trace!(
            format_version = header.format_version,
            float_width = header.float_width.bytes(),
            "Wrote stream header"
        );
        Ok(())
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

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Number of chunks currently open.
    pub fn chunk_depth(&self) -> usize {
        self.chunks.len()
    }

    pub fn position(&mut self) -> Result<u64> {
        Ok(self.output.stream_position()?)
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            return Err(CoreError::Stream("write to a closed stream".into()));
        }
        Ok(())
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        self.ensure_open()?;
        self.output.write_all(bytes)?;
        Ok(())
    }

    /// Open a chunk: writes the id and a length placeholder.
    pub fn begin_chunk(&mut self, id: u32) -> Result<()> {
        self.write_u32(id)?;
        self.write_u32(0)?;
        let start = self.position()?;
        self.chunks.push((id, start));
        Ok(())
    }

    /// Close the innermost chunk, patching its length and writing the sentinel.
    pub fn end_chunk(&mut self) -> Result<()> {
        self.ensure_open()?;
        let (id, start) = self
            .chunks
            .pop()
            .ok_or_else(|| CoreError::Stream("end_chunk() without matching begin_chunk()".into()))?;
        let end = self.position()?;
        let length = u32::try_from(end - start).map_err(|_| {
            CoreError::Stream(format!("chunk 0x{id:X} exceeds the maximum chunk size"))
        })?;
        self.write_u32(CHUNK_END_SENTINEL)?;
        self.output.seek(SeekFrom::Start(start - 4))?;
        self.output.write_all(&length.to_be_bytes())?;
        self.output.seek(SeekFrom::Start(end + 4))?;
        tracing::trace!(chunk_id = id, length, "Closed chunk");
        Ok(())
    }

    pub fn write_u8(&mut self, value: u8) -> Result<()> {
        self.write_bytes(&[value])
    }

    pub fn write_bool(&mut self, value: bool) -> Result<()> {
        self.write_u8(u8::from(value))
    }

    pub fn write_u32(&mut self, value: u32) -> Result<()> {
        self.write_bytes(&value.to_be_bytes())
    }

    pub fn write_i32(&mut self, value: i32) -> Result<()> {
        self.write_bytes(&value.to_be_bytes())
    }

    pub fn write_u64(&mut self, value: u64) -> Result<()> {
        self.write_bytes(&value.to_be_bytes())
    }

    pub fn write_i64(&mut self, value: i64) -> Result<()> {
        self.write_bytes(&value.to_be_bytes())
    }

    /// Sizes and counts are always stored as u64.
    pub fn write_size(&mut self, value: usize) -> Result<()> {
        self.write_u64(value as u64)
    }

    pub fn write_f32(&mut self, value: f32) -> Result<()> {
        self.write_bytes(&value.to_be_bytes())
    }

    pub fn write_f64(&mut self, value: f64) -> Result<()> {
        self.write_bytes(&value.to_be_bytes())
    }

    /// A floating-point value at the stream's float width.
    pub fn write_float(&mut self, value: f64) -> Result<()> {
        match self.header.float_width {
            FloatWidth::Single => self.write_f32(value as f32),
            FloatWidth::Double => self.write_f64(value),
        }
    }

    pub fn write_string(&mut self, value: &str) -> Result<()> {
        self.write_optional_string(Some(value))
    }

    /// A string, or the null marker for `None`.
    pub fn write_optional_string(&mut self, value: Option<&str>) -> Result<()> {
        let Some(value) = value else {
            return self.write_u32(NULL_STRING_LENGTH);
        };
        let bytes: Vec<u8> = value.encode_utf16().flat_map(u16::to_be_bytes).collect();
        let length = u32::try_from(bytes.len())
            .ok()
            .filter(|len| *len != NULL_STRING_LENGTH)
            .ok_or_else(|| CoreError::Stream("string too long for stream".into()))?;
        self.write_u32(length)?;
        self.write_bytes(&bytes)
    }

    pub fn write_byte_array(&mut self, bytes: &[u8]) -> Result<()> {
        let length = u32::try_from(bytes.len())
            .map_err(|_| CoreError::Stream("byte array too long for stream".into()))?;
        self.write_u32(length)?;
        self.write_bytes(bytes)
    }

    /// Assign an id to `object` without writing anything.
    /// Returns the id and whether it was newly assigned.
    pub fn register_pointer<T: ?Sized>(&mut self, object: &T) -> (u64, bool) {
        let next = self.pointers.len() as u64 + 1;
        match self.pointers.entry(object_addr(object)) {
            std::collections::hash_map::Entry::Occupied(entry) => (*entry.get(), false),
            std::collections::hash_map::Entry::Vacant(entry) => (*entry.insert(next), true),
        }
    }

    /// Id previously assigned to `object`.
    pub fn pointer_id<T: ?Sized>(&self, object: &T) -> Option<u64> {
        self.pointers.get(&object_addr(object)).copied()
    }

    /// Write the id of `object` (0 for `None`), assigning one on first use.
    /// Returns the id and whether it was newly assigned.
    pub fn write_pointer<T: ?Sized>(&mut self, object: Option<&T>) -> Result<(u64, bool)> {
        let (id, is_new) = match object {
            Some(object) => self.register_pointer(object),
            None => (0, false),
        };
        self.write_u64(id)?;
        Ok((id, is_new))
    }

    /// Finish the stream. Fails if chunks are still open.
    pub fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        if let Some((id, _)) = self.chunks.last() {
            return Err(CoreError::Stream(format!(
                "stream closed with {} open chunk(s), innermost 0x{id:X}",
                self.chunks.len()
            )));
        }
        self.output.flush()?;
        self.closed = true;
        Ok(())
    }
}

impl Drop for SaveStream<'_> {
    fn drop(&mut self) {
        if !self.closed {
            tracing::warn!(
                open_chunks = self.chunks.len(),
                "Save stream dropped without being closed"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn stream(buffer: &mut Cursor<Vec<u8>>) -> SaveStream<'_> {
        SaveStream::new(buffer, StreamHeader::default()).unwrap()
    }

    #[test]
    fn test_header_starts_with_magic() {
        let mut buffer = Cursor::new(Vec::new());
        stream(&mut buffer).close().unwrap();
        let bytes = buffer.into_inner();
        assert_eq!(&bytes[0..4], &MAGIC_1.to_be_bytes());
        assert_eq!(&bytes[4..8], &MAGIC_2.to_be_bytes());
        assert_eq!(&bytes[12..16], &8u32.to_be_bytes());
    }

    #[test]
    fn test_chunk_length_is_back_patched() {
        let mut buffer = Cursor::new(Vec::new());
        let header_len;
        {
            let mut out = stream(&mut buffer);
            header_len = out.position().unwrap() as usize;
            out.begin_chunk(0x42).unwrap();
            out.write_u32(7).unwrap();
            out.write_u8(1).unwrap();
            out.end_chunk().unwrap();
            out.close().unwrap();
        }
        let bytes = buffer.into_inner();
        let chunk = &bytes[header_len..];
        assert_eq!(&chunk[0..4], &0x42u32.to_be_bytes());
        assert_eq!(&chunk[4..8], &5u32.to_be_bytes());
        assert_eq!(&chunk[13..17], &CHUNK_END_SENTINEL.to_be_bytes());
        assert_eq!(chunk.len(), 17);
    }

    #[test]
    fn test_strings_are_utf16_big_endian() {
        let mut buffer = Cursor::new(Vec::new());
        let start;
        {
            let mut out = stream(&mut buffer);
            start = out.position().unwrap() as usize;
            out.write_string("Hé").unwrap();
            out.write_optional_string(None).unwrap();
            out.close().unwrap();
        }
        let bytes = buffer.into_inner();
        assert_eq!(&bytes[start..start + 8], &[0, 0, 0, 4, 0, b'H', 0, 0xE9]);
        assert_eq!(&bytes[start + 8..], &[0xFF; 4]);
    }

    #[test]
    fn test_unbalanced_chunks_are_errors() {
        let mut buffer = Cursor::new(Vec::new());
        let mut out = stream(&mut buffer);
        assert!(matches!(out.end_chunk(), Err(CoreError::Stream(_))));
        out.begin_chunk(1).unwrap();
        assert!(matches!(out.close(), Err(CoreError::Stream(_))));
        out.end_chunk().unwrap();
        out.close().unwrap();
        assert!(out.write_u8(0).is_err());
    }

    #[test]
    fn test_pointer_ids_are_dense() {
        let mut buffer = Cursor::new(Vec::new());
        let mut out = stream(&mut buffer);
        let (a, b) = (1u32, 2u32);
        assert_eq!(out.write_pointer(Some(&a)).unwrap(), (1, true));
        assert_eq!(out.write_pointer(Some(&b)).unwrap(), (2, true));
        assert_eq!(out.write_pointer(Some(&a)).unwrap(), (1, false));
        assert_eq!(out.write_pointer::<u32>(None).unwrap(), (0, false));
        assert_eq!(out.pointer_id(&b), Some(2));
        out.close().unwrap();
    }
}
