use std::ops::Range;

/// A contiguous range of ids into an arena `Vec`. Records created together
/// (a selection set's fields, a field's arguments) are pushed contiguously
/// and referenced with one of these instead of a `Vec<Id>`.
#[derive(PartialEq, Eq, PartialOrd, Ord, Hash, Clone, Copy, serde::Serialize, serde::Deserialize)]
pub struct IdRange<Id> {
    pub start: Id,
    pub end: Id,
}

impl<Id: Copy + Into<usize> + From<usize>> IdRange<Id> {
    pub fn empty() -> Self {
        Self {
            start: Id::from(0),
            end: Id::from(0),
        }
    }

    pub fn len(&self) -> usize {
        self.end.into() - self.start.into()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn as_usize_range(&self) -> Range<usize> {
        self.start.into()..self.end.into()
    }

    pub fn iter(&self) -> impl ExactSizeIterator<Item = Id> + '_ {
        self.as_usize_range().map(Id::from)
    }

    pub fn get(&self, i: usize) -> Option<Id> {
        let index = self.start.into() + i;
        (index < self.end.into()).then(|| Id::from(index))
    }
}

impl<Id: Copy + Into<usize> + From<usize>> From<Range<usize>> for IdRange<Id> {
    fn from(range: Range<usize>) -> Self {
        Self {
            start: Id::from(range.start),
            end: Id::from(range.end),
        }
    }
}

impl<Id: Copy + Into<usize> + From<usize>> Default for IdRange<Id> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<Id: std::fmt::Debug> std::fmt::Debug for IdRange<Id> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{:?}..{:?}]", self.start, self.end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    crate::make_id!(pub struct DummyId(u16));

    #[test]
    fn range_iteration() {
        let range = IdRange::<DummyId>::from(2..5);
        assert_eq!(range.len(), 3);
        let ids: Vec<usize> = range.iter().map(usize::from).collect();
        assert_eq!(ids, vec![2, 3, 4]);
    }

    #[test]
    fn empty_range() {
        let range = IdRange::<DummyId>::empty();
        assert!(range.is_empty());
        assert_eq!(range.iter().count(), 0);
        assert_eq!(range.get(0), None);
    }
}
