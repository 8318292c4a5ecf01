//! Binary session streams.
//!
//! [`SaveStream`] and [`LoadStream`] implement the chunked wire format;
//! [`ObjectSaveStream`] and [`ObjectLoadStream`] store whole object graphs on
//! top of it. The [`file`] helpers wrap both for session files on disk.

pub mod file;
pub mod format;
pub mod load_stream;
pub mod migration;
pub mod object_stream;
pub mod save_stream;

pub use file::{list_chunks, load_from_file, read_header, save_to_file, ChunkInfo, ROOT_CHUNK};
pub use format::{FloatWidth, ProductInfo, StreamHeader, FORMAT_VERSION, MIN_FORMAT_VERSION};
pub use load_stream::{LoadStream, ReadSeek};
pub use object_stream::{ObjectLoadStream, ObjectSaveStream};
pub use save_stream::{SaveStream, WriteSeek};
