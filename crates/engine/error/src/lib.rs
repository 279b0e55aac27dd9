mod code;
mod path;

use std::borrow::Cow;

pub use code::*;
pub use path::*;

pub type GraphqlResult<T> = Result<T, GraphqlError>;

/// A GraphQL response error: what ends up in the `errors` array of the
/// response. Field resolution failures, loader failures and contract
/// violations are all converted into this shape; they never cross the
/// request boundary as panics or opaque error types.
#[derive(Debug, Clone, PartialEq)]
pub struct GraphqlError {
    pub message: Cow<'static, str>,
    pub code: ErrorCode,
    pub path: Option<ErrorPath>,
    // Serialized as a map, but kept as a Vec for efficiency.
    pub extensions: Vec<(Cow<'static, str>, serde_json::Value)>,
}

impl GraphqlError {
    pub fn new(message: impl Into<Cow<'static, str>>, code: ErrorCode) -> Self {
        GraphqlError {
            message: message.into(),
            code,
            path: None,
            extensions: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_path(mut self, path: impl Into<ErrorPath>) -> Self {
        self.path = Some(path.into());
        self
    }

    #[must_use]
    pub fn with_extension(mut self, key: impl Into<Cow<'static, str>>, value: impl Into<serde_json::Value>) -> Self {
        self.extensions.push((key.into(), value.into()));
        self
    }

    // ------------- //
    // Common errors //
    // ------------- //

    pub fn internal_server_error() -> Self {
        GraphqlError::new("Internal server error", ErrorCode::InternalServerError)
    }

    pub fn request_cancelled() -> Self {
        GraphqlError::new("Request cancelled", ErrorCode::RequestCancelled)
    }

    pub fn invalid_resolver_value() -> Self {
        GraphqlError::new(
            "Resolver returned a value incompatible with the field type",
            ErrorCode::InvalidResolverValue,
        )
    }
}

impl std::fmt::Display for GraphqlError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.message.fmt(f)
    }
}

impl std::error::Error for GraphqlError {}

impl serde::Serialize for GraphqlError {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeMap;

        let mut map = serializer.serialize_map(None)?;
        map.serialize_entry("message", &self.message)?;
        if let Some(path) = &self.path {
            map.serialize_entry("path", path)?;
        }
        // The error code is always exposed through extensions, alongside
        // whatever the resolver attached.
        map.serialize_entry(
            "extensions",
            &SerializableExtensions {
                code: self.code,
                extensions: &self.extensions,
            },
        )?;
        map.end()
    }
}

struct SerializableExtensions<'a> {
    code: ErrorCode,
    extensions: &'a [(Cow<'static, str>, serde_json::Value)],
}

impl serde::Serialize for SerializableExtensions<'_> {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeMap;

        let mut map = serializer.serialize_map(None)?;
        for (key, value) in self.extensions {
            map.serialize_entry(key, value)?;
        }
        map.serialize_entry("code", &self.code)?;
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn serializes_to_the_wire_shape() {
        let error = GraphqlError::new("Boom", ErrorCode::FieldError)
            .with_path(ErrorPath::from_iter([
                ErrorPathSegment::Field("user".into()),
                ErrorPathSegment::Index(3),
            ]))
            .with_extension("hint", "retry");

        assert_eq!(
            serde_json::to_value(&error).unwrap(),
            serde_json::json!({
                "message": "Boom",
                "path": ["user", 3],
                "extensions": {"hint": "retry", "code": "FIELD_ERROR"}
            })
        );
    }

    #[test]
    fn code_is_always_present() {
        let error = GraphqlError::request_cancelled();
        assert_eq!(
            serde_json::to_value(&error).unwrap(),
            serde_json::json!({
                "message": "Request cancelled",
                "extensions": {"code": "REQUEST_CANCELLED"}
            })
        );
    }
}
