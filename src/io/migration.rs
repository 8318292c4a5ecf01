//! Version-dependent decoding steps.
//!
//! Readers never branch on raw version numbers; they ask this module which
//! layout applies to the stream they are reading.

use crate::io::format::FloatWidth;
use crate::oo::class::ObjectClass;

/// The header carries a numeric product version triple.
pub const PRODUCT_VERSION_TRIPLE_SINCE: u32 = 30003;

/// Property containers store their element count in a separate chunk.
pub const CONTAINER_CHUNK_SINCE: u32 = 30004;

/// Object tables store field names next to reference lists.
pub const NAMED_FIELDS_SINCE: u32 = 30006;

/// A documented change of the stream layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Migration {
    pub since: u32,
    pub description: &'static str,
}

/// Layout changes, oldest first.
pub const MIGRATIONS: &[Migration] = &[
    Migration {
        since: PRODUCT_VERSION_TRIPLE_SINCE,
        description: "header stores the product version as three integers",
    },
    Migration {
        since: CONTAINER_CHUNK_SINCE,
        description: "property containers store their element count",
    },
    Migration {
        since: NAMED_FIELDS_SINCE,
        description: "reference fields are stored by name",
    },
];

/// Steps a reader applies to upgrade a stream of `format_version`.
pub fn pending_migrations(format_version: u32) -> impl Iterator<Item = &'static Migration> {
    MIGRATIONS.iter().filter(move |m| m.since > format_version)
}

pub fn has_version_triple(format_version: u32) -> bool {
    format_version >= PRODUCT_VERSION_TRIPLE_SINCE
}

pub fn has_container_chunk(format_version: u32) -> bool {
    format_version >= CONTAINER_CHUNK_SINCE
}

pub fn has_named_fields(format_version: u32) -> bool {
    format_version >= NAMED_FIELDS_SINCE
}

/// Whether values stored at `stored` width must be converted on read.
///
/// Values are always decoded at their stored width and then widened to
/// `f64`, so single-precision files load without loss beyond what was
/// already lost when writing them.
pub fn needs_float_conversion(stored: FloatWidth) -> bool {
    stored != FloatWidth::Double
}

/// Identifier given to a container that was saved without one.
pub fn default_container_identifier(class: &ObjectClass) -> String {
    class.display_name().to_lowercase().replace(' ', "_")
}
