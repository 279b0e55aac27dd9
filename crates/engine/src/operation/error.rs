use engine_error::{ErrorCode, GraphqlError};

use super::OperationType;

/// Why a document could not be turned into an [`OperationPlan`](super::OperationPlan).
///
/// Compilation assumes a validated document; these are the errors it cannot
/// help but notice while walking it.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CompileError {
    #[error("operation `{0}` not found in the document")]
    OperationNotFound(String),
    #[error("the document contains multiple operations, an operation name is required")]
    MissingOperationName,
    #[error("the schema does not define a {0} root")]
    RootTypeUndefined(OperationType),
    #[error("unknown fragment `{0}`")]
    UnknownFragment(String),
    #[error("fragment cycle through `{0}`")]
    FragmentCycle(String),
    #[error("unknown type `{0}` in type condition")]
    UnknownTypeCondition(String),
    #[error("type condition on `{0}`, which cannot have a selection set")]
    InvalidTypeCondition(String),
    #[error("unknown field `{field}` on type `{ty}`")]
    UnknownField { ty: String, field: String },
    #[error("fields under key `{key}` cannot be merged: {reason}")]
    FieldMergeConflict { key: String, reason: String },
    #[error("field `{field}` of type `{ty}` requires a selection set")]
    MissingSubselection { ty: String, field: String },
    #[error("field `{field}` of leaf type `{ty}` cannot have a selection set")]
    UnexpectedSubselection { ty: String, field: String },
}

impl From<CompileError> for GraphqlError {
    fn from(err: CompileError) -> Self {
        GraphqlError::new(err.to_string(), ErrorCode::OperationPlanningError)
    }
}
