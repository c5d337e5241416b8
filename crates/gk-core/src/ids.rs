//! Typed integer handles into the kernel's arenas.
//!
//! Objects, classes and modules are never referenced by pointer; every
//! cross-reference (parent links, dependency edges, rank levels) stores one of
//! these handles and indexes the owning `Vec` with `.index()`.

use std::fmt;

/// Generate a handle type around a primitive integer.
macro_rules! handle {
    ($(#[$attr:meta])* $vis:vis struct $name:ident($inner:ty) => $label:literal;) => {
        $(#[$attr])*
        #[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
        #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
        $vis struct $name(pub $inner);

        impl $name {
            /// Position of the handle in its owning arena.
            #[inline(always)]
            pub fn index(self) -> usize {
                self.0 as usize
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($label, ":{}"), self.0)
            }
        }

        impl TryFrom<usize> for $name {
            type Error = std::num::TryFromIntError;
            fn try_from(n: usize) -> Result<$name, Self::Error> {
                <$inner>::try_from(n).map($name)
            }
        }
    };
}

handle! {
    /// Handle of a simulation object in the `ObjectStore` arena.
    pub struct ObjectId(u32) => "object";
}

handle! {
    /// Handle of a registered object class.
    pub struct ClassId(u16) => "class";
}

handle! {
    /// Handle of a registered module (delta-mode plugin).
    pub struct ModuleId(u16) => "module";
}
