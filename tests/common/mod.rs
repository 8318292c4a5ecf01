//! Common test utilities and helpers

#![allow(dead_code)] // Test utilities may not all be used in every test file

pub mod builders;

use datavis_core::io::{LoadStream, ObjectLoadStream, ObjectSaveStream, SaveStream, StreamHeader};
use datavis_core::oo::TargetRef;
use std::io::Cursor;

/// Chunk used by in-memory round trips to hold the root object id
pub const ROOT_CHUNK: u32 = 0x01;

/// Assert two floats are approximately equal
pub fn assert_float_eq(a: f64, b: f64, epsilon: f64) {
    assert!(
        (a - b).abs() < epsilon,
        "Expected {} to be approximately equal to {} (epsilon: {})",
        a,
        b,
        epsilon
    );
}

/// Write `root` to an in-memory object stream
pub fn save_to_bytes(root: &TargetRef, header: StreamHeader) -> Vec<u8> {
    let mut buffer = Cursor::new(Vec::new());
    {
        let stream = SaveStream::new(&mut buffer, header).expect("stream header");
        let mut out = ObjectSaveStream::new(stream);
        out.stream().begin_chunk(ROOT_CHUNK).unwrap();
        out.save_object(Some(root)).unwrap();
        out.stream().end_chunk().unwrap();
        out.close().unwrap();
    }
    buffer.into_inner()
}

/// Read back what [`save_to_bytes`] wrote
pub fn load_from_bytes(bytes: Vec<u8>) -> TargetRef {
    let stream = LoadStream::new(Cursor::new(bytes)).expect("stream header");
    let mut input = ObjectLoadStream::new(stream).expect("object table");
    input.stream().expect_chunk(ROOT_CHUNK).unwrap();
    let root = input.load_object().unwrap().expect("root object");
    input.stream().close_chunk().unwrap();
    input.close().unwrap();
    root
}
