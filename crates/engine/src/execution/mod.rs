//! Concurrent execution of an [`OperationPlan`](crate::operation::OperationPlan):
//! sibling fields in flight together, mutations strictly in order, nulls
//! propagating to the nearest nullable ancestor.

mod coordinator;

use tokio_util::sync::CancellationToken;

pub(crate) use coordinator::OperationExecutor;

use crate::operation::{OperationPlan, Variables};
use crate::resolver::{LoaderRegistry, RequestServices};
use crate::response::ErrorCollector;
use crate::schema::Schema;

/// Borrowed, request-scoped state shared by every field execution. Cheap to
/// copy into each spawned branch.
#[derive(Clone, Copy)]
pub(crate) struct ExecutionContext<'ctx> {
    pub schema: &'ctx Schema,
    pub plan: &'ctx OperationPlan,
    pub variables: &'ctx Variables,
    pub root_value: &'ctx serde_json::Value,
    pub services: &'ctx RequestServices,
    pub loaders: &'ctx LoaderRegistry,
    pub errors: &'ctx ErrorCollector,
    pub cancellation: &'ctx CancellationToken,
}
