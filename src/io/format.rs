//! Constants and header layout of the binary stream format.
//!
//! ```text
//! offset  size  field
//! 0       4     magic 0x0FACC5AB
//! 4       4     magic 0x0AFCCA5B
//! 8       4     format version
//! 12      4     float width (4 or 8)
//! 16      ..    product name (string)
//! ..      12    product version major/minor/revision (format >= 30003)
//! ..      ..    product version string
//! ..      ..    body: [u32 id][u32 length][payload][u32 0x0FFFFFFF] ...
//! ```
//!
//! All integers are big-endian. Strings are a u32 byte length followed by
//! UTF-16BE code units; a length of `0xFFFFFFFF` encodes a null string.

use serde::{Deserialize, Serialize};

pub const MAGIC_1: u32 = 0x0FAC_C5AB;
pub const MAGIC_2: u32 = 0x0AFC_CA5B;

/// Format version written by this build. Readers accept anything up to it.
pub const FORMAT_VERSION: u32 = 30008;

/// Oldest format version this build can read.
pub const MIN_FORMAT_VERSION: u32 = 30000;

/// Trailer written after every chunk payload.
pub const CHUNK_END_SENTINEL: u32 = 0x0FFF_FFFF;

/// String length marking a null string.
pub const NULL_STRING_LENGTH: u32 = 0xFFFF_FFFF;

/// Width of floating-point values stored in a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FloatWidth {
    Single,
    #[default]
    Double,
}

impl FloatWidth {
    pub fn bytes(self) -> u32 {
        match self {
            FloatWidth::Single => 4,
            FloatWidth::Double => 8,
        }
    }

    pub fn from_bytes(bytes: u32) -> Option<Self> {
        match bytes {
            4 => Some(FloatWidth::Single),
            8 => Some(FloatWidth::Double),
            _ => None,
        }
    }
}

/// Product that wrote a stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductInfo {
    pub name: String,
    pub major: u32,
    pub minor: u32,
    pub revision: u32,
    pub version_string: String,
}

impl Default for ProductInfo {
    fn default() -> Self {
        Self {
            name: env!("CARGO_PKG_NAME").to_string(),
            major: env!("CARGO_PKG_VERSION_MAJOR").parse().unwrap_or(0),
            minor: env!("CARGO_PKG_VERSION_MINOR").parse().unwrap_or(0),
            revision: env!("CARGO_PKG_VERSION_PATCH").parse().unwrap_or(0),
            version_string: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Decoded stream header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamHeader {
    pub format_version: u32,
    pub float_width: FloatWidth,
    pub product: ProductInfo,
}

impl StreamHeader {
    pub fn new(float_width: FloatWidth, product: ProductInfo) -> Self {
        Self {
            format_version: FORMAT_VERSION,
            float_width,
            product,
        }
    }
}

impl Default for StreamHeader {
    fn default() -> Self {
        Self::new(FloatWidth::default(), ProductInfo::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_float_width_bytes() {
        assert_eq!(FloatWidth::from_bytes(4), Some(FloatWidth::Single));
        assert_eq!(FloatWidth::from_bytes(8), Some(FloatWidth::Double));
        assert_eq!(FloatWidth::from_bytes(2), None);
        assert_eq!(FloatWidth::Single.bytes(), 4);
    }

    #[test]
    fn test_default_header_uses_current_version() {
        let header = StreamHeader::default();
        assert_eq!(header.format_version, FORMAT_VERSION);
        assert_eq!(header.float_width, FloatWidth::Double);
        assert_eq!(header.product.name, env!("CARGO_PKG_NAME"));
    }
}
