#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct BitSet<Id> {
    inner: fixedbitset::FixedBitSet,
    _phantom: std::marker::PhantomData<Id>,
}

impl<Id> Default for BitSet<Id> {
    fn default() -> Self {
        Self {
            inner: fixedbitset::FixedBitSet::new(),
            _phantom: std::marker::PhantomData,
        }
    }
}

impl<Id> BitSet<Id>
where
    Id: Copy + Into<usize>,
{
    pub fn with_capacity(n: usize) -> Self {
        Self {
            inner: fixedbitset::FixedBitSet::with_capacity(n),
            _phantom: std::marker::PhantomData,
        }
    }

    pub fn set(&mut self, id: Id, value: bool) {
        self.inner.set(id.into(), value)
    }

    pub fn put(&mut self, id: Id) -> bool {
        self.inner.put(id.into())
    }

    pub fn push(&mut self, value: bool) {
        self.inner.grow(self.inner.len() + 1);
        self.inner.set(self.inner.len() - 1, value);
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn ones(&self) -> impl Iterator<Item = Id> + '_
    where
        Id: From<usize>,
    {
        self.inner.ones().map(Id::from)
    }
}

impl<Id> std::ops::Index<Id> for BitSet<Id>
where
    Id: Copy + Into<usize>,
{
    type Output = bool;
    fn index(&self, id: Id) -> &Self::Output {
        &self.inner[id.into()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_and_index() {
        let mut bitset = BitSet::<usize>::with_capacity(129);
        bitset.set(100, true);
        assert!(!bitset[99]);
        assert!(bitset[100]);
        assert!(!bitset[101]);
    }

    #[test]
    fn push_grows() {
        let mut bitset = BitSet::<usize>::default();
        bitset.push(true);
        bitset.push(false);
        assert_eq!(bitset.len(), 2);
        assert!(bitset[0]);
        assert!(!bitset[1]);
    }
}
