//! The outcome of executing an operation: the data tree plus every error
//! collected along the way, serializing to the standard GraphQL response
//! format.

use std::sync::Mutex;

use engine_error::{ErrorPath, ErrorPathSegment, GraphqlError};

pub struct Response {
    /// `None` when a null propagated all the way to the root, or when the
    /// request failed before producing any data.
    pub data: Option<serde_json::Value>,
    pub errors: Vec<GraphqlError>,
}

impl Response {
    pub(crate) fn cancelled() -> Self {
        Response {
            data: None,
            errors: vec![GraphqlError::request_cancelled()],
        }
    }

    pub(crate) fn request_error(error: impl Into<GraphqlError>) -> Self {
        Response {
            data: None,
            errors: vec![error.into()],
        }
    }
}

impl serde::Serialize for Response {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeMap;

        let mut map = serializer.serialize_map(None)?;
        map.serialize_entry("data", &self.data)?;
        if !self.errors.is_empty() {
            map.serialize_entry("errors", &self.errors)?;
        }
        map.end()
    }
}

impl std::fmt::Debug for Response {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Response")
            .field("data", &self.data)
            .field("errors", &self.errors)
            .finish()
    }
}

/// Errors recorded while fields execute concurrently. Collection order is
/// completion order; a failing field records exactly one entry no matter how
/// far its null propagates.
#[derive(Default)]
pub(crate) struct ErrorCollector(Mutex<Vec<GraphqlError>>);

impl ErrorCollector {
    pub(crate) fn push(&self, error: GraphqlError) {
        self.0.lock().unwrap_or_else(|err| err.into_inner()).push(error);
    }

    pub(crate) fn into_errors(self) -> Vec<GraphqlError> {
        self.0.into_inner().unwrap_or_else(|err| err.into_inner())
    }
}

/// Where in the response tree execution currently is. Cloned per field, so
/// concurrent branches each extend their own copy.
#[derive(Clone, Default)]
pub(crate) struct ResponsePath(Vec<ErrorPathSegment>);

impl ResponsePath {
    pub(crate) fn root() -> Self {
        Self::default()
    }

    pub(crate) fn child(&self, key: &str) -> Self {
        let mut segments = self.0.clone();
        segments.push(ErrorPathSegment::Field(key.into()));
        ResponsePath(segments)
    }

    pub(crate) fn index(&self, index: usize) -> Self {
        let mut segments = self.0.clone();
        segments.push(ErrorPathSegment::Index(index));
        ResponsePath(segments)
    }
}

impl From<&ResponsePath> for ErrorPath {
    fn from(path: &ResponsePath) -> Self {
        ErrorPath::from(path.0.clone())
    }
}

impl From<ResponsePath> for ErrorPath {
    fn from(path: ResponsePath) -> Self {
        ErrorPath::from(path.0)
    }
}

#[cfg(test)]
mod tests {
    use engine_error::ErrorCode;
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn serializes_data_and_errors() {
        let response = Response {
            data: Some(serde_json::json!({"me": null})),
            errors: vec![
                GraphqlError::new("boom", ErrorCode::FieldError).with_path(ErrorPath::from_iter(["me"])),
            ],
        };
        assert_eq!(
            serde_json::to_value(&response).unwrap(),
            serde_json::json!({
                "data": {"me": null},
                "errors": [{
                    "message": "boom",
                    "path": ["me"],
                    "extensions": {"code": "FIELD_ERROR"}
                }]
            })
        );
    }

    #[test]
    fn errors_are_omitted_when_empty() {
        let response = Response {
            data: Some(serde_json::json!({"ok": true})),
            errors: Vec::new(),
        };
        assert_eq!(
            serde_json::to_value(&response).unwrap(),
            serde_json::json!({"data": {"ok": true}})
        );
    }
}
