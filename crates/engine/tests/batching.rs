//! Batch loading through the engine: concurrent sibling resolvers sharing a
//! request-scoped loader coalesce into single batches.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use dataloader::{DataLoader, Loader};
use engine::resolver::{tokio_spawner, FieldContext, FnResolver, Resolver};
use engine::schema::{SchemaBuilder, Type};
use engine::{Engine, ErrorCode, ExecuteRequest, GraphqlError, GraphqlResult};
use pretty_assertions::assert_eq;
use serde_json::json;

#[derive(Clone)]
struct BatchLog(Arc<Mutex<Vec<Vec<u64>>>>);

struct NameLoader {
    log: BatchLog,
}

#[async_trait::async_trait]
impl Loader<u64> for NameLoader {
    type Value = String;
    type Error = String;

    async fn load(&self, keys: &[u64]) -> Result<HashMap<u64, String>, String> {
        self.log.0.lock().unwrap().push(keys.to_vec());
        Ok(keys.iter().map(|&id| (id, format!("user-{id}"))).collect())
    }
}

/// Resolves `User.name` by batch-loading it from the parent's id.
struct BatchedName;

#[async_trait::async_trait]
impl Resolver for BatchedName {
    async fn resolve(&self, ctx: &FieldContext<'_>) -> GraphqlResult<serde_json::Value> {
        let id = ctx
            .parent_value()
            .get("id")
            .and_then(serde_json::Value::as_u64)
            .ok_or_else(GraphqlError::invalid_resolver_value)?;
        let log = ctx.service::<BatchLog>().cloned().unwrap_or_else(|| BatchLog(Default::default()));
        let loader = ctx
            .loaders()
            .get_or_create(|| DataLoader::new(NameLoader { log }, tokio_spawner));
        let name = loader
            .load_one(id)
            .await
            .map_err(|err| GraphqlError::new(err, ErrorCode::LoaderError))?;
        Ok(name.map(serde_json::Value::String).unwrap_or(serde_json::Value::Null))
    }
}

fn engine_with(users: serde_json::Value) -> Engine {
    let mut builder = SchemaBuilder::new();
    builder.object("User", |obj| {
        obj.field("id", Type::named("Int").required(), |_| {})
            .field("name", Type::named("String"), |f| {
                f.resolver(BatchedName);
            });
    });
    builder.object("Query", |obj| {
        obj.field("users", Type::named("User").required().list().required(), |f| {
            let users = users.clone();
            f.resolver(FnResolver::new(move |_ctx: &FieldContext<'_>| Ok(users.clone())));
        });
    });
    Engine::new(builder.build().unwrap())
}

fn request_with_log(log: &BatchLog) -> ExecuteRequest {
    let mut request = ExecuteRequest::default();
    request.services.insert(log.clone());
    request
}

#[tokio::test]
async fn concurrent_name_resolvers_coalesce_into_one_deduplicated_batch() {
    let engine = engine_with(json!([{"id": 1}, {"id": 2}, {"id": 2}, {"id": 3}, {"id": 1}]));
    let log = BatchLog(Default::default());

    let response = engine
        .execute_query("query { users { name } }", None, request_with_log(&log))
        .await;

    assert_eq!(response.errors, vec![]);
    assert_eq!(
        response.data,
        Some(json!({"users": [
            {"name": "user-1"},
            {"name": "user-2"},
            {"name": "user-2"},
            {"name": "user-3"},
            {"name": "user-1"},
        ]}))
    );

    // One dispatch, keys deduplicated in first-request order.
    let batches = log.0.lock().unwrap();
    assert_eq!(*batches, vec![vec![1, 2, 3]]);
}

#[tokio::test]
async fn loader_failure_fails_each_waiting_field() {
    struct FailingLoader;

    #[async_trait::async_trait]
    impl Loader<u64> for FailingLoader {
        type Value = String;
        type Error = String;

        async fn load(&self, _keys: &[u64]) -> Result<HashMap<u64, String>, String> {
            Err("store unreachable".to_string())
        }
    }

    struct FailingName;

    #[async_trait::async_trait]
    impl Resolver for FailingName {
        async fn resolve(&self, ctx: &FieldContext<'_>) -> GraphqlResult<serde_json::Value> {
            let id = ctx
                .parent_value()
                .get("id")
                .and_then(serde_json::Value::as_u64)
                .ok_or_else(GraphqlError::invalid_resolver_value)?;
            let loader = ctx
                .loaders()
                .get_or_create(|| DataLoader::new(FailingLoader, tokio_spawner));
            let name = loader
                .load_one(id)
                .await
                .map_err(|err| GraphqlError::new(err, ErrorCode::LoaderError))?;
            Ok(name.map(serde_json::Value::String).unwrap_or(serde_json::Value::Null))
        }
    }

    let mut builder = SchemaBuilder::new();
    builder.object("User", |obj| {
        obj.field("id", Type::named("Int").required(), |_| {})
            .field("name", Type::named("String"), |f| {
                f.resolver(FailingName);
            });
    });
    builder.object("Query", |obj| {
        obj.field("users", Type::named("User").required().list().required(), |f| {
            f.resolver(FnResolver::new(|_ctx: &FieldContext<'_>| {
                Ok(json!([{"id": 1}, {"id": 2}]))
            }));
        });
    });
    let engine = Engine::new(builder.build().unwrap());

    let response = engine
        .execute_query("query { users { name } }", None, ExecuteRequest::default())
        .await;

    // `name` is nullable, so both failures stay local to their element.
    assert_eq!(
        response.data,
        Some(json!({"users": [{"name": null}, {"name": null}]}))
    );
    assert_eq!(response.errors.len(), 2);
    for error in &response.errors {
        assert_eq!(error.code, ErrorCode::LoaderError);
        assert_eq!(error.message, "store unreachable");
    }
}

#[tokio::test]
async fn missing_keys_resolve_to_null_not_an_error() {
    struct SparseLoader;

    #[async_trait::async_trait]
    impl Loader<u64> for SparseLoader {
        type Value = String;
        type Error = String;

        async fn load(&self, keys: &[u64]) -> Result<HashMap<u64, String>, String> {
            Ok(keys
                .iter()
                .filter(|&&id| id != 2)
                .map(|&id| (id, format!("user-{id}")))
                .collect())
        }
    }

    struct SparseName;

    #[async_trait::async_trait]
    impl Resolver for SparseName {
        async fn resolve(&self, ctx: &FieldContext<'_>) -> GraphqlResult<serde_json::Value> {
            let id = ctx
                .parent_value()
                .get("id")
                .and_then(serde_json::Value::as_u64)
                .ok_or_else(GraphqlError::invalid_resolver_value)?;
            let loader = ctx
                .loaders()
                .get_or_create(|| DataLoader::new(SparseLoader, tokio_spawner));
            let name = loader
                .load_one(id)
                .await
                .map_err(|err| GraphqlError::new(err, ErrorCode::LoaderError))?;
            Ok(name.map(serde_json::Value::String).unwrap_or(serde_json::Value::Null))
        }
    }

    let mut builder = SchemaBuilder::new();
    builder.object("User", |obj| {
        obj.field("id", Type::named("Int").required(), |_| {})
            .field("name", Type::named("String"), |f| {
                f.resolver(SparseName);
            });
    });
    builder.object("Query", |obj| {
        obj.field("users", Type::named("User").required().list().required(), |f| {
            f.resolver(FnResolver::new(|_ctx: &FieldContext<'_>| {
                Ok(json!([{"id": 1}, {"id": 2}]))
            }));
        });
    });
    let engine = Engine::new(builder.build().unwrap());

    let response = engine
        .execute_query("query { users { name } }", None, ExecuteRequest::default())
        .await;

    assert_eq!(response.errors, vec![]);
    assert_eq!(
        response.data,
        Some(json!({"users": [{"name": "user-1"}, {"name": null}]}))
    );
}
