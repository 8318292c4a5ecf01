//! Reference field descriptors.
//!
//! Classes declare their reference fields as `static` [`FieldDescriptor`]s.
//! The descriptor flags drive generic behaviour: cloning, serialization,
//! change propagation and copy-on-write accounting.

use std::fmt;
use std::ops::BitOr;

/// Behaviour flags of a reference field.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct FieldFlags(u32);

impl FieldFlags {
    pub const NONE: FieldFlags = FieldFlags(0);
    /// Holds an ordered list of references instead of a single one.
    pub const VECTOR: FieldFlags = FieldFlags(1 << 0);
    /// Non-owning reference; does not keep the target alive.
    pub const WEAK_REF: FieldFlags = FieldFlags(1 << 1);
    /// Clones share the target instead of copying it, even in deep copies.
    pub const NEVER_CLONE_TARGET: FieldFlags = FieldFlags(1 << 2);
    /// Clones leave this field empty.
    pub const NO_CLONE: FieldFlags = FieldFlags(1 << 3);
    /// Not written to session streams.
    pub const DONT_SAVE: FieldFlags = FieldFlags(1 << 4);
    /// Payload sub-object held through a data reference.
    pub const DATA_OBJECT: FieldFlags = FieldFlags(1 << 5);
    /// Changes of the target are not propagated through this field.
    pub const NO_CHANGE_MESSAGE: FieldFlags = FieldFlags(1 << 6);

    pub const fn union(self, other: FieldFlags) -> FieldFlags {
        FieldFlags(self.0 | other.0)
    }

    pub const fn contains(self, other: FieldFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn bits(self) -> u32 {
        self.0
    }
}

impl BitOr for FieldFlags {
    type Output = FieldFlags;

    fn bitor(self, rhs: FieldFlags) -> FieldFlags {
        self.union(rhs)
    }
}

impl fmt::Debug for FieldFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const NAMES: [(FieldFlags, &str); 7] = [
            (FieldFlags::VECTOR, "VECTOR"),
            (FieldFlags::WEAK_REF, "WEAK_REF"),
            (FieldFlags::NEVER_CLONE_TARGET, "NEVER_CLONE_TARGET"),
            (FieldFlags::NO_CLONE, "NO_CLONE"),
            (FieldFlags::DONT_SAVE, "DONT_SAVE"),
            (FieldFlags::DATA_OBJECT, "DATA_OBJECT"),
            (FieldFlags::NO_CHANGE_MESSAGE, "NO_CHANGE_MESSAGE"),
        ];
        let names: Vec<&str> = NAMES
            .iter()
            .filter(|(flag, _)| self.contains(*flag))
            .map(|(_, name)| *name)
            .collect();
        if names.is_empty() {
            write!(f, "NONE")
        } else {
            write!(f, "{}", names.join(" | "))
        }
    }
}

/// Static description of one reference field of a class.
pub struct FieldDescriptor {
    name: &'static str,
    display_name: &'static str,
    flags: FieldFlags,
}

impl FieldDescriptor {
    pub const fn new(name: &'static str, display_name: &'static str, flags: FieldFlags) -> Self {
        Self {
            name,
            display_name,
            flags,
        }
    }

    /// Stable name, used as the key in session streams.
    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn display_name(&self) -> &'static str {
        self.display_name
    }

    pub fn flags(&self) -> FieldFlags {
        self.flags
    }

    pub fn is_vector(&self) -> bool {
        self.flags.contains(FieldFlags::VECTOR)
    }

    pub fn is_weak(&self) -> bool {
        self.flags.contains(FieldFlags::WEAK_REF)
    }

    pub fn is_data_object(&self) -> bool {
        self.flags.contains(FieldFlags::DATA_OBJECT)
    }
}

impl fmt::Debug for FieldDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldDescriptor")
            .field("name", &self.name)
            .field("flags", &self.flags)
            .finish()
    }
}
