//! A GraphQL execution engine: compiles parsed operations into reusable
//! plans and executes them concurrently over user-provided resolvers, with
//! request-scoped batching through [`dataloader`].
//!
//! Parsing is delegated to `async-graphql-parser`; document validation and
//! variable coercion are expected to have happened upstream.

mod engine;
mod execution;

pub mod operation;
pub mod resolver;
pub mod response;
pub mod schema;

pub use engine::{Engine, ExecuteRequest, PrepareError};
pub use engine_error::{ErrorCode, ErrorPath, ErrorPathSegment, GraphqlError, GraphqlResult};
pub use operation::{CompileError, OperationPlan, OperationType, Variables};
pub use response::Response;
