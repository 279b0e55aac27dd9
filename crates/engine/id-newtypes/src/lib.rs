mod bitset;
mod range;

pub use bitset::BitSet;
pub use range::IdRange;

/// Defines a u16/u32-backed id newtype with the conversions the arenas rely
/// on: `From<usize>` (panics past the backing range, which means the arena
/// outgrew its address space during construction), `usize: From<Id>` and
/// `Index`/`IndexMut` into `Vec<Record>`.
#[macro_export]
macro_rules! make_id {
    ($(#[$attr:meta])* $vis:vis struct $name:ident($repr:ty)) => {
        $(#[$attr])*
        #[derive(PartialEq, Eq, PartialOrd, Ord, Hash, Clone, Copy, serde::Serialize, serde::Deserialize)]
        $vis struct $name($repr);

        impl From<usize> for $name {
            fn from(value: usize) -> Self {
                Self(<$repr>::try_from(value).expect(concat!(stringify!($name), " out of range")))
            }
        }

        impl From<$name> for usize {
            fn from(id: $name) -> usize {
                id.0 as usize
            }
        }

        impl std::fmt::Debug for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, concat!(stringify!($name), "#{}"), self.0)
            }
        }
    };
}

/// Implements `Index`/`IndexMut` over a field of the given store type, so
/// records are only ever reached through their typed id.
#[macro_export]
macro_rules! impl_index {
    ($store:ident. $field:ident [ $id:ty ] => $record:ty) => {
        impl std::ops::Index<$id> for $store {
            type Output = $record;
            fn index(&self, id: $id) -> &Self::Output {
                &self.$field[usize::from(id)]
            }
        }

        impl std::ops::IndexMut<$id> for $store {
            fn index_mut(&mut self, id: $id) -> &mut Self::Output {
                &mut self.$field[usize::from(id)]
            }
        }

        impl std::ops::Index<$crate::IdRange<$id>> for $store {
            type Output = [$record];
            fn index(&self, range: $crate::IdRange<$id>) -> &Self::Output {
                &self.$field[range.as_usize_range()]
            }
        }
    };
}
