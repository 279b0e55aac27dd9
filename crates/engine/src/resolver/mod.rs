//! The resolver seam: how schema authors plug data fetching into fields.
//!
//! Each field resolves through an onion of [`Middleware`] layers around a
//! terminal [`Resolver`]. The layering is fixed at schema build time,
//! schema-wide middleware outermost, and shared by every execution of the
//! field.

mod services;

use std::sync::Arc;

use engine_error::GraphqlResult;
use tokio_util::sync::CancellationToken;

pub use services::{LoaderRegistry, RequestServices};

use crate::schema::Schema;

/// Spawner suitable for [`dataloader::DataLoader`] instances created inside
/// resolvers running on a tokio runtime.
pub fn tokio_spawner(fut: futures_util::future::BoxFuture<'static, ()>) {
    tokio::spawn(fut);
}

/// Everything a resolver gets to see for one field execution.
pub struct FieldContext<'ctx> {
    pub(crate) schema: &'ctx Schema,
    pub(crate) field_name: &'ctx str,
    pub(crate) response_key: &'ctx str,
    pub(crate) parent_value: &'ctx serde_json::Value,
    pub(crate) arguments: serde_json::Map<String, serde_json::Value>,
    pub(crate) services: &'ctx RequestServices,
    pub(crate) loaders: &'ctx LoaderRegistry,
    pub(crate) cancellation: &'ctx CancellationToken,
}

impl<'ctx> FieldContext<'ctx> {
    pub fn schema(&self) -> &'ctx Schema {
        self.schema
    }

    /// The schema name of the field being resolved.
    pub fn field_name(&self) -> &'ctx str {
        self.field_name
    }

    /// The key under which the value will appear in the response, i.e. the
    /// alias if the operation used one.
    pub fn response_key(&self) -> &'ctx str {
        self.response_key
    }

    /// The value the parent resolver produced. The root value for fields on
    /// the operation root.
    pub fn parent_value(&self) -> &'ctx serde_json::Value {
        self.parent_value
    }

    /// Coerced arguments: variables substituted, defaults applied.
    pub fn arguments(&self) -> &serde_json::Map<String, serde_json::Value> {
        &self.arguments
    }

    /// Middlewares may rewrite arguments before the resolver sees them.
    pub fn arguments_mut(&mut self) -> &mut serde_json::Map<String, serde_json::Value> {
        &mut self.arguments
    }

    pub fn argument(&self, name: &str) -> Option<&serde_json::Value> {
        self.arguments.get(name)
    }

    /// A request-scoped service registered on [`ExecuteRequest`](crate::ExecuteRequest).
    pub fn service<T: Send + Sync + 'static>(&self) -> Option<&'ctx T> {
        self.services.get::<T>()
    }

    /// Request-scoped [`dataloader`] instances, keyed by loader type.
    pub fn loaders(&self) -> &'ctx LoaderRegistry {
        self.loaders
    }

    /// Cancelled when the request is aborted; long-running resolvers should
    /// check it cooperatively.
    pub fn cancellation(&self) -> &'ctx CancellationToken {
        self.cancellation
    }
}

/// Terminal producer of a field's value.
///
/// The returned value is not coerced: it must structurally match the field
/// type (an object/array/scalar as the type demands), otherwise execution
/// records an `INVALID_RESOLVER_VALUE` error for the field.
#[async_trait::async_trait]
pub trait Resolver: Send + Sync {
    async fn resolve(&self, ctx: &FieldContext<'_>) -> GraphqlResult<serde_json::Value>;
}

/// A layer around field resolution. Call `next.run(ctx).await` to proceed,
/// or short-circuit with a value or an error.
#[async_trait::async_trait]
pub trait Middleware: Send + Sync {
    async fn invoke(&self, ctx: &mut FieldContext<'_>, next: Next<'_>) -> GraphqlResult<serde_json::Value>;
}

/// The remainder of a field's pipeline.
pub struct Next<'a> {
    middlewares: &'a [Arc<dyn Middleware>],
    resolver: &'a dyn Resolver,
}

impl Next<'_> {
    pub async fn run(self, ctx: &mut FieldContext<'_>) -> GraphqlResult<serde_json::Value> {
        match self.middlewares.split_first() {
            Some((middleware, rest)) => {
                middleware
                    .invoke(
                        ctx,
                        Next {
                            middlewares: rest,
                            resolver: self.resolver,
                        },
                    )
                    .await
            }
            None => self.resolver.resolve(ctx).await,
        }
    }
}

/// A field's composed pipeline, built once at schema construction.
#[derive(Clone)]
pub(crate) struct ResolverPipeline {
    middlewares: Arc<[Arc<dyn Middleware>]>,
    resolver: Arc<dyn Resolver>,
}

impl ResolverPipeline {
    pub(crate) fn new(middlewares: Vec<Arc<dyn Middleware>>, resolver: Arc<dyn Resolver>) -> Self {
        ResolverPipeline {
            middlewares: middlewares.into(),
            resolver,
        }
    }

    pub(crate) async fn invoke(&self, ctx: &mut FieldContext<'_>) -> GraphqlResult<serde_json::Value> {
        Next {
            middlewares: &self.middlewares,
            resolver: self.resolver.as_ref(),
        }
        .run(ctx)
        .await
    }
}

/// Default resolver for fields without a registered one: reads the property
/// named after the field from the parent object, `null` if absent.
pub struct PropertyResolver;

#[async_trait::async_trait]
impl Resolver for PropertyResolver {
    async fn resolve(&self, ctx: &FieldContext<'_>) -> GraphqlResult<serde_json::Value> {
        Ok(ctx
            .parent_value()
            .as_object()
            .and_then(|parent| parent.get(ctx.field_name()))
            .cloned()
            .unwrap_or(serde_json::Value::Null))
    }
}

/// Adapter for plain synchronous closures, the common case for computed
/// fields and tests.
pub struct FnResolver<F>(F);

impl<F> FnResolver<F>
where
    F: Fn(&FieldContext<'_>) -> GraphqlResult<serde_json::Value> + Send + Sync,
{
    pub fn new(f: F) -> Self {
        FnResolver(f)
    }
}

#[async_trait::async_trait]
impl<F> Resolver for FnResolver<F>
where
    F: Fn(&FieldContext<'_>) -> GraphqlResult<serde_json::Value> + Send + Sync,
{
    async fn resolve(&self, ctx: &FieldContext<'_>) -> GraphqlResult<serde_json::Value> {
        (self.0)(ctx)
    }
}
