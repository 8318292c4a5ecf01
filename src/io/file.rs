//! Session files on disk.
//!
//! A session file holds one root object inside a [`ROOT_CHUNK`], followed by
//! the object data and table written by [`ObjectSaveStream`].

use crate::error::{CoreError, Result, ResultExt};
use crate::io::format::StreamHeader;
use crate::io::load_stream::LoadStream;
use crate::io::object_stream::{ObjectLoadStream, ObjectSaveStream};
use crate::io::save_stream::SaveStream;
use crate::oo::ref_target::TargetRef;
use serde::Serialize;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

/// Chunk holding the id of the root object.
pub const ROOT_CHUNK: u32 = 0x01;

/// Bytes after the last top-level chunk holding the object table offset.
const FOOTER_LEN: u64 = 8;

/// Position and size of a top-level chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ChunkInfo {
    pub id: u32,
    /// Offset of the chunk id in the file.
    pub offset: u64,
    /// Payload length, excluding id, length and end marker.
    pub length: u64,
}

/// Write `root` and everything it references to `path`.
///
/// The data goes to a temporary file next to `path` first, which is renamed
/// over `path` only after everything was written and synced.
pub fn save_to_file(path: impl AsRef<Path>, root: &TargetRef, header: StreamHeader) -> Result<()> {
    let path = path.as_ref();
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create directory {}", dir.display()))?;

    let temp = tempfile::NamedTempFile::new_in(dir)
        .with_context(|| format!("Failed to create temporary file in {}", dir.display()))?;
    let mut writer = BufWriter::new(temp);
    {
        let mut out = ObjectSaveStream::new(SaveStream::new(&mut writer, header)?);
        out.stream().begin_chunk(ROOT_CHUNK)?;
        out.save_object(Some(root))?;
        out.stream().end_chunk()?;
        out.close()?;
        tracing::debug!(objects = out.object_count(), path = %path.display(), "Saved session");
    }
    writer.flush()?;
    let temp = writer.into_inner().map_err(|e| CoreError::Io(e.into_error()))?;
    temp.as_file().sync_all()?;
    temp.persist(path)
        .map_err(|e| CoreError::Io(e.error))
        .with_context(|| format!("Failed to replace {}", path.display()))?;
    Ok(())
}

/// Read the root object stored in `path`.
pub fn load_from_file(path: impl AsRef<Path>) -> Result<TargetRef> {
    let path = path.as_ref();
    let file = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    let mut input = ObjectLoadStream::new(LoadStream::new(BufReader::new(file))?)?;
    input.stream().expect_chunk(ROOT_CHUNK)?;
    let root = input.load_object()?;
    input.stream().close_chunk()?;
    input.close()?;
    let root = root.ok_or_else(|| {
        CoreError::format("session file has no root object", 0)
    })?;
    tracing::debug!(objects = input.object_count(), path = %path.display(), "Loaded session");
    Ok(root)
}

/// Read only the stream header of `path`.
pub fn read_header(path: impl AsRef<Path>) -> Result<StreamHeader> {
    let path = path.as_ref();
    let file = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    let stream = LoadStream::new(BufReader::new(file))?;
    Ok(stream.header().clone())
}

/// List the top-level chunks of `path` by skipping over them.
pub fn list_chunks(path: impl AsRef<Path>) -> Result<Vec<ChunkInfo>> {
    let path = path.as_ref();
    let file = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    let mut stream = LoadStream::new(BufReader::new(file))?;
    let len = stream.stream_len()?;
    let mut chunks = Vec::new();
    loop {
        let offset = stream.position()?;
        if offset + FOOTER_LEN >= len {
            break;
        }
        let id = stream.open_chunk()?;
        let length = stream.remaining_in_chunk()?;
        stream.close_chunk()?;
        chunks.push(ChunkInfo { id, offset, length });
    }
    Ok(chunks)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{AttributeDataObject, DataCollection};
    use crate::oo::OORef;

    fn sample() -> TargetRef {
        let collection = OORef::new(DataCollection::new());
        collection.add_attribute("Timestep", 42, None);
        TargetRef::from(collection.into_data_object())
    }

    #[test]
    fn test_save_and_load_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.dvs");
        save_to_file(&path, &sample(), StreamHeader::default()).unwrap();

        let loaded = load_from_file(&path).unwrap();
        let collection = loaded.downcast::<DataCollection>().unwrap();
        assert_eq!(
            collection.get_attribute_value("Timestep").and_then(|v| v.as_int()),
            Some(42)
        );
        assert_eq!(collection.get_objects_of::<AttributeDataObject>().len(), 1);
    }

    #[test]
    fn test_save_replaces_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.dvs");
        std::fs::write(&path, b"garbage").unwrap();
        assert!(load_from_file(&path).is_err());

        save_to_file(&path, &sample(), StreamHeader::default()).unwrap();
        assert!(load_from_file(&path).is_ok());
        // Only the session file remains; the temporary file was renamed.
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_list_chunks_stops_at_footer() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.dvs");
        save_to_file(&path, &sample(), StreamHeader::default()).unwrap();

        let chunks = list_chunks(&path).unwrap();
        assert_eq!(chunks.first().map(|c| c.id), Some(ROOT_CHUNK));
        assert_eq!(chunks.first().map(|c| c.length), Some(8));
        assert_eq!(chunks.last().map(|c| c.id), Some(0x200));
        // Collection plus one attribute.
        assert_eq!(chunks.iter().filter(|c| c.id == 0x100).count(), 2);

        let header = read_header(&path).unwrap();
        assert_eq!(header, StreamHeader::default());
    }
}
