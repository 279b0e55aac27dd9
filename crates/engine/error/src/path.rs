/// Path from the response root down to the value an error applies to, as
/// mandated by the GraphQL response format: response keys for object
/// fields, indices for list positions.
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Clone, Default)]
pub struct ErrorPath(Vec<ErrorPathSegment>);

impl ErrorPath {
    pub fn push(&mut self, segment: impl Into<ErrorPathSegment>) {
        self.0.push(segment.into());
    }

    pub fn iter(&self) -> impl Iterator<Item = &ErrorPathSegment> {
        self.0.iter()
    }
}

impl std::ops::Deref for ErrorPath {
    type Target = [ErrorPathSegment];
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Clone)]
pub enum ErrorPathSegment {
    Field(Box<str>),
    Index(usize),
}

impl From<&str> for ErrorPathSegment {
    fn from(name: &str) -> Self {
        ErrorPathSegment::Field(name.into())
    }
}

impl From<String> for ErrorPathSegment {
    fn from(name: String) -> Self {
        ErrorPathSegment::Field(name.into_boxed_str())
    }
}

impl From<usize> for ErrorPathSegment {
    fn from(index: usize) -> Self {
        ErrorPathSegment::Index(index)
    }
}

impl<S: Into<ErrorPathSegment>> FromIterator<S> for ErrorPath {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        ErrorPath(iter.into_iter().map(Into::into).collect())
    }
}

impl From<Vec<ErrorPathSegment>> for ErrorPath {
    fn from(segments: Vec<ErrorPathSegment>) -> Self {
        ErrorPath(segments)
    }
}

impl serde::Serialize for ErrorPath {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeSeq;

        let mut seq = serializer.serialize_seq(Some(self.0.len()))?;
        for segment in &self.0 {
            match segment {
                ErrorPathSegment::Field(name) => seq.serialize_element(name)?,
                ErrorPathSegment::Index(index) => seq.serialize_element(index)?,
            }
        }
        seq.end()
    }
}
