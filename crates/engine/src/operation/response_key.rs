use lasso2::Rodeo;

/// Interned response keys of one operation. Stored as a `u16`, which bounds
/// an operation at 65k distinct keys, plenty for anything handwritten or
/// generated.
pub(crate) struct ResponseKeys(Rodeo<ResponseKey>);

impl Default for ResponseKeys {
    fn default() -> Self {
        ResponseKeys(Rodeo::new())
    }
}

/// The key under which a field appears in the response object: its alias,
/// or its name when not aliased.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ResponseKey(u16);

impl ResponseKeys {
    pub fn get_or_intern(&mut self, s: &str) -> ResponseKey {
        self.0.get_or_intern(s)
    }
}

impl std::ops::Index<ResponseKey> for ResponseKeys {
    type Output = str;

    fn index(&self, key: ResponseKey) -> &Self::Output {
        self.0.resolve(&key)
    }
}

unsafe impl lasso2::Key for ResponseKey {
    fn into_usize(self) -> usize {
        self.0 as usize
    }

    fn try_from_usize(id: usize) -> Option<Self> {
        u16::try_from(id).ok().map(ResponseKey)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interning_deduplicates() {
        let mut keys = ResponseKeys::default();
        let a = keys.get_or_intern("user");
        let b = keys.get_or_intern("posts");
        let c = keys.get_or_intern("user");
        assert_eq!(a, c);
        assert_ne!(a, b);
        assert_eq!(&keys[a], "user");
        assert_eq!(&keys[b], "posts");
    }
}
