use std::sync::{Arc, Mutex};

use engine_error::{ErrorCode, GraphqlError};
use fxhash::FxHashMap;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::execution::{ExecutionContext, OperationExecutor};
use crate::operation::{CompileError, OperationPlan, OperationType, Variables};
use crate::resolver::{LoaderRegistry, RequestServices};
use crate::response::{ErrorCollector, Response};
use crate::schema::Schema;

/// Why [`Engine::prepare`] rejected a request before execution.
#[derive(Debug, thiserror::Error)]
pub enum PrepareError {
    #[error("invalid GraphQL document: {0}")]
    Parse(#[from] async_graphql_parser::Error),
    #[error(transparent)]
    Compile(#[from] CompileError),
}

impl From<PrepareError> for GraphqlError {
    fn from(err: PrepareError) -> Self {
        match err {
            PrepareError::Parse(_) => GraphqlError::new(err.to_string(), ErrorCode::BadRequest),
            PrepareError::Compile(err) => err.into(),
        }
    }
}

/// Everything specific to one execution of a plan.
pub struct ExecuteRequest {
    pub variables: Variables,
    pub services: RequestServices,
    /// What root field resolvers see as their parent value.
    pub root_value: serde_json::Value,
    /// Cancel it to abort the request; the response then carries a single
    /// `REQUEST_CANCELLED` error.
    pub cancellation: CancellationToken,
}

impl Default for ExecuteRequest {
    fn default() -> Self {
        ExecuteRequest {
            variables: Variables::new(),
            services: RequestServices::new(),
            root_value: serde_json::Value::Null,
            cancellation: CancellationToken::new(),
        }
    }
}

/// The entry point: owns the schema and a cache of compiled plans, executes
/// operations against them.
pub struct Engine {
    schema: Arc<Schema>,
    plan_cache: Mutex<FxHashMap<PlanCacheKey, Arc<OperationPlan>>>,
}

type PlanCacheKey = (String, Option<String>);

impl Engine {
    pub fn new(schema: Schema) -> Self {
        Engine {
            schema: Arc::new(schema),
            plan_cache: Mutex::new(FxHashMap::default()),
        }
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Parses and compiles the operation, or returns the cached plan for the
    /// same `(document, operation name)` pair. Plans hold no variable
    /// values, so reuse across requests is sound.
    pub fn prepare(&self, query: &str, operation_name: Option<&str>) -> Result<Arc<OperationPlan>, PrepareError> {
        let key = (query.to_string(), operation_name.map(str::to_string));
        if let Some(plan) = self.plan_cache.lock().unwrap_or_else(|err| err.into_inner()).get(&key) {
            return Ok(Arc::clone(plan));
        }

        let document = async_graphql_parser::parse_query(query)?;
        let plan = Arc::new(OperationPlan::compile(&self.schema, &document, operation_name)?);
        self.plan_cache
            .lock()
            .unwrap_or_else(|err| err.into_inner())
            .insert(key, Arc::clone(&plan));
        Ok(plan)
    }

    /// Convenience for the common case: prepare and execute in one call.
    pub async fn execute_query(&self, query: &str, operation_name: Option<&str>, request: ExecuteRequest) -> Response {
        match self.prepare(query, operation_name) {
            Ok(plan) => self.execute(&plan, request).await,
            Err(error) => Response::request_error(error),
        }
    }

    pub async fn execute(&self, plan: &OperationPlan, request: ExecuteRequest) -> Response {
        if plan.ty() == OperationType::Subscription {
            return Response::request_error(GraphqlError::new(
                "Subscriptions cannot be executed as a request/response operation",
                ErrorCode::BadRequest,
            ));
        }

        let span = tracing::info_span!(
            "graphql",
            operation_name = plan.name().unwrap_or_default(),
            operation_type = %plan.ty(),
        );
        let ExecuteRequest {
            variables,
            services,
            root_value,
            cancellation,
        } = request;

        let execution = async {
            let errors = ErrorCollector::default();
            let loaders = LoaderRegistry::new();
            let executor = OperationExecutor::new(ExecutionContext {
                schema: &self.schema,
                plan,
                variables: &variables,
                root_value: &root_value,
                services: &services,
                loaders: &loaders,
                errors: &errors,
                cancellation: &cancellation,
            });
            let data = executor.execute().await;
            let errors = errors.into_errors();
            tracing::debug!(error_count = errors.len(), "operation executed");
            Response { data, errors }
        };

        async {
            tokio::select! {
                // Dropping the execution future aborts all in-flight fields.
                _ = cancellation.cancelled() => {
                    tracing::debug!("operation cancelled");
                    Response::cancelled()
                }
                response = execution => response,
            }
        }
        .instrument(span)
        .await
    }
}
