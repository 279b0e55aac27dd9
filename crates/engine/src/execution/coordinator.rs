use engine_error::{ErrorCode, GraphqlError};
use engine_id_newtypes::BitSet;
use futures_util::future::{join_all, BoxFuture};

use super::ExecutionContext;
use crate::operation::{
    ArgumentValue, FieldId, FieldRecord, OperationType, ResponseKey, SelectionSetId, Variables,
};
use crate::resolver::FieldContext;
use crate::response::ResponsePath;
use crate::schema::{CompositeTypeId, FieldDefinitionRecord, ObjectDefinitionId, TypeDefinitionId, TypeRecord};

/// A field failed and its own type forbids null: the null bubbles up until a
/// nullable ancestor absorbs it. The error itself was already recorded at
/// the failure site.
pub(crate) struct Propagation;

type FieldOutcome = (ResponseKey, Result<serde_json::Value, Propagation>);

pub(crate) struct OperationExecutor<'ctx> {
    ctx: ExecutionContext<'ctx>,
    /// `@skip`/`@include` conditions evaluated once against this request's
    /// variables, for every field of the plan.
    included: BitSet<FieldId>,
}

impl<'ctx> OperationExecutor<'ctx> {
    pub(crate) fn new(ctx: ExecutionContext<'ctx>) -> Self {
        let plan = ctx.plan;
        let mut included = BitSet::with_capacity(plan.field_count());
        for id in plan.field_ids() {
            included.set(id, plan.is_included(&plan[id], ctx.variables));
        }
        OperationExecutor { ctx, included }
    }

    /// Runs the whole operation. `None` means a null propagated all the way
    /// to the response root.
    pub(crate) async fn execute(&self) -> Option<serde_json::Value> {
        let root = self.ctx.plan.root_selection_set_id;
        let result = match self.ctx.plan.ty() {
            OperationType::Mutation => {
                self.resolve_object_serially(root, self.ctx.root_value, ResponsePath::root())
                    .await
            }
            _ => self.resolve_object(root, self.ctx.root_value, ResponsePath::root()).await,
        };
        result.ok()
    }

    /// Resolves one selection set concurrently against its parent value.
    fn resolve_object<'f>(
        &'f self,
        set_id: SelectionSetId,
        parent: &'f serde_json::Value,
        path: ResponsePath,
    ) -> BoxFuture<'f, Result<serde_json::Value, Propagation>> {
        Box::pin(async move {
            let plan = self.ctx.plan;
            let set = &plan[set_id];
            let included: Vec<FieldId> = set.field_ids.iter().filter(|id| self.included[*id]).collect();

            let results = self.resolve_field_chain(set.object_id, &included, parent, &path).await;
            let mut object = serde_json::Map::with_capacity(results.len());
            for (key, result) in results {
                object.insert(plan.response_key_str(key).to_string(), result?);
            }
            Ok(serde_json::Value::Object(object))
        })
    }

    /// Mutation root semantics: one field at a time, in document order, each
    /// only starting once the previous one fully completed. A propagating
    /// failure aborts the fields that did not start yet.
    async fn resolve_object_serially(
        &self,
        set_id: SelectionSetId,
        parent: &serde_json::Value,
        path: ResponsePath,
    ) -> Result<serde_json::Value, Propagation> {
        let plan = self.ctx.plan;
        let set = &plan[set_id];
        let mut object = serde_json::Map::new();
        for field_id in set.field_ids.iter() {
            if !self.included[field_id] {
                continue;
            }
            let (key, result) = self.resolve_field(set.object_id, field_id, parent, &path).await;
            object.insert(plan.response_key_str(key).to_string(), result?);
        }
        Ok(serde_json::Value::Object(object))
    }

    /// Fields up to the first serial field run concurrently. The serial
    /// field does not wait for them, but everything after it only starts
    /// once it completed.
    fn resolve_field_chain<'f>(
        &'f self,
        object_id: ObjectDefinitionId,
        field_ids: &'f [FieldId],
        parent: &'f serde_json::Value,
        path: &'f ResponsePath,
    ) -> BoxFuture<'f, Vec<FieldOutcome>> {
        Box::pin(async move {
            let serial_at = field_ids.iter().position(|id| {
                self.ctx.plan[*id]
                    .definition_id
                    .is_some_and(|definition_id| self.ctx.schema[definition_id].serial)
            });
            let Some(serial_at) = serial_at else {
                return join_all(
                    field_ids
                        .iter()
                        .map(|id| self.resolve_field(object_id, *id, parent, path)),
                )
                .await;
            };

            let (concurrent, rest) = field_ids.split_at(serial_at);
            let (serial_id, rest) = (rest[0], &rest[1..]);
            let (mut results, tail) = futures_util::join!(
                join_all(
                    concurrent
                        .iter()
                        .map(|id| self.resolve_field(object_id, *id, parent, path)),
                ),
                async move {
                    let serial = self.resolve_field(object_id, serial_id, parent, path).await;
                    let mut tail = vec![serial];
                    tail.extend(self.resolve_field_chain(object_id, rest, parent, path).await);
                    tail
                }
            );
            results.extend(tail);
            results
        })
    }

    async fn resolve_field(
        &self,
        object_id: ObjectDefinitionId,
        field_id: FieldId,
        parent: &serde_json::Value,
        path: &ResponsePath,
    ) -> FieldOutcome {
        let plan = self.ctx.plan;
        let field = &plan[field_id];
        let response_key = field.response_key;

        if self.ctx.cancellation.is_cancelled() {
            return (response_key, Err(Propagation));
        }

        let Some(definition_id) = field.definition_id else {
            // `__typename` reflects the concrete type the selection set was
            // compiled for.
            let name = self.ctx.schema.object_name(object_id);
            return (response_key, Ok(serde_json::Value::String(name.to_string())));
        };
        let definition = &self.ctx.schema[definition_id];
        let field_name = self.ctx.schema.field_name(definition_id);
        let field_path = path.child(plan.response_key_str(response_key));

        let resolved = match &definition.pipeline {
            Some(pipeline) => {
                let mut field_ctx = FieldContext {
                    schema: self.ctx.schema,
                    field_name,
                    response_key: plan.response_key_str(response_key),
                    parent_value: parent,
                    arguments: self.build_arguments(field, definition),
                    services: self.ctx.services,
                    loaders: self.ctx.loaders,
                    cancellation: self.ctx.cancellation,
                };
                pipeline.invoke(&mut field_ctx).await
            }
            // No resolver and no middleware: plain property access.
            None => Ok(parent
                .as_object()
                .and_then(|object| object.get(field_name))
                .cloned()
                .unwrap_or(serde_json::Value::Null)),
        };

        let completed = match resolved {
            Ok(value) => self.complete_value(field_id, definition.ty, value, field_path).await,
            Err(error) => {
                tracing::debug!(field = field_name, "resolver failed: {error}");
                self.fail(definition.ty.wrapping.is_required(), error.with_path(&field_path))
            }
        };
        (response_key, completed)
    }

    /// Completes a resolved value against the field type, outermost wrapper
    /// first: list layers fan out concurrently, composite types recurse into
    /// the matching child selection set, leaves pass through untouched.
    fn complete_value<'f>(
        &'f self,
        field_id: FieldId,
        ty: TypeRecord,
        value: serde_json::Value,
        path: ResponsePath,
    ) -> BoxFuture<'f, Result<serde_json::Value, Propagation>> {
        Box::pin(async move {
            let wrapping = ty.wrapping;

            if value.is_null() {
                if wrapping.is_required() {
                    return self.fail(
                        true,
                        GraphqlError::new(
                            "Cannot return null for non-nullable field",
                            ErrorCode::NullConstraintViolation,
                        )
                        .with_path(&path),
                    );
                }
                return Ok(serde_json::Value::Null);
            }

            if wrapping.is_list() {
                let serde_json::Value::Array(items) = value else {
                    return self.invalid_resolver_value(ty, &path);
                };
                let element_ty = TypeRecord {
                    definition_id: ty.definition_id,
                    wrapping: wrapping.unwrap_list(),
                };
                let results = join_all(
                    items
                        .into_iter()
                        .enumerate()
                        .map(|(i, item)| self.complete_value(field_id, element_ty, item, path.index(i))),
                )
                .await;

                let mut list = Vec::with_capacity(results.len());
                for result in results {
                    match result {
                        Ok(item) => list.push(item),
                        // The element recorded its error already; its null
                        // lands on this list or keeps climbing.
                        Err(Propagation) => {
                            return if wrapping.is_required() {
                                Err(Propagation)
                            } else {
                                Ok(serde_json::Value::Null)
                            };
                        }
                    }
                }
                return Ok(serde_json::Value::Array(list));
            }

            if CompositeTypeId::maybe_from(ty.definition_id).is_none() {
                // Leaf: scalars and enums are passed through uncoerced.
                return Ok(value);
            }

            let Some(object) = value.as_object() else {
                return self.invalid_resolver_value(ty, &path);
            };
            let field = &self.ctx.plan[field_id];
            let object_id = match ty.definition_id {
                TypeDefinitionId::Object(id) => id,
                // Abstract type: the resolved object discriminates itself
                // through its `__typename` property.
                _ => {
                    let resolved = object
                        .get("__typename")
                        .and_then(serde_json::Value::as_str)
                        .and_then(|name| match self.ctx.schema.type_definition_by_name(name) {
                            Some(TypeDefinitionId::Object(id)) => Some(id),
                            _ => None,
                        });
                    match resolved {
                        Some(id) => id,
                        None => {
                            tracing::warn!(
                                ty = self.ctx.schema.definition_name(ty.definition_id),
                                "value resolved for an abstract field carries no usable __typename"
                            );
                            return self.fail(
                                wrapping.is_required(),
                                GraphqlError::invalid_resolver_value().with_path(&path),
                            );
                        }
                    }
                }
            };
            let Some(child_set_id) = field.child_for(object_id) else {
                tracing::warn!(
                    ty = self.ctx.schema.definition_name(ty.definition_id),
                    concrete = self.ctx.schema.object_name(object_id),
                    "__typename resolved to a type that is not possible here"
                );
                return self.fail(
                    wrapping.is_required(),
                    GraphqlError::invalid_resolver_value().with_path(&path),
                );
            };

            match self.resolve_object(child_set_id, &value, path).await {
                Ok(object) => Ok(object),
                Err(Propagation) => {
                    if wrapping.is_required() {
                        Err(Propagation)
                    } else {
                        Ok(serde_json::Value::Null)
                    }
                }
            }
        })
    }

    /// Records the error and converts the failure into either a null or a
    /// propagation, depending on what the field type allows.
    fn fail(&self, required: bool, error: GraphqlError) -> Result<serde_json::Value, Propagation> {
        self.ctx.errors.push(error);
        if required {
            Err(Propagation)
        } else {
            Ok(serde_json::Value::Null)
        }
    }

    fn invalid_resolver_value(&self, ty: TypeRecord, path: &ResponsePath) -> Result<serde_json::Value, Propagation> {
        tracing::warn!(
            ty = ty.wrapping.type_display(self.ctx.schema.definition_name(ty.definition_id)),
            "resolver returned a structurally incompatible value"
        );
        self.fail(
            ty.wrapping.is_required(),
            GraphqlError::invalid_resolver_value().with_path(path),
        )
    }

    /// Coerces plan arguments into the concrete values the resolver sees:
    /// variables substituted, unprovided arguments falling back to their
    /// defaults, arguments without value or default omitted entirely.
    fn build_arguments(
        &self,
        field: &FieldRecord,
        definition: &FieldDefinitionRecord,
    ) -> serde_json::Map<String, serde_json::Value> {
        let schema = self.ctx.schema;
        let mut arguments = serde_json::Map::new();
        for argument in &self.ctx.plan[field.argument_ids] {
            let input = &schema[argument.input_value_id];
            let value = match &argument.value {
                ArgumentValue::Const(value) => Some(value.clone()),
                ArgumentValue::Variable(variable) => self
                    .ctx
                    .variables
                    .get(variable)
                    .cloned()
                    .or_else(|| input.default_value.clone()),
                ArgumentValue::Template(template) => Some(resolve_template(template, self.ctx.variables)),
            };
            if let Some(value) = value {
                arguments.insert(schema[input.name_id].clone(), value);
            }
        }
        for input_value_id in definition.argument_ids.iter() {
            let input = &schema[input_value_id];
            let name = &schema[input.name_id];
            if !arguments.contains_key(name) {
                if let Some(default) = &input.default_value {
                    arguments.insert(name.clone(), default.clone());
                }
            }
        }
        arguments
    }
}

/// Substitutes variables nested inside an argument literal.
fn resolve_template(value: &async_graphql_value::Value, variables: &Variables) -> serde_json::Value {
    use async_graphql_value::Value as Ast;

    match value {
        Ast::Variable(name) => variables
            .get(name.as_str())
            .cloned()
            .unwrap_or(serde_json::Value::Null),
        Ast::Null => serde_json::Value::Null,
        Ast::Number(number) => serde_json::Value::Number(number.clone()),
        Ast::String(s) => serde_json::Value::String(s.clone()),
        Ast::Boolean(b) => serde_json::Value::Bool(*b),
        Ast::Enum(name) => serde_json::Value::String(name.to_string()),
        Ast::Binary(bytes) => serde_json::Value::Array(bytes.iter().map(|b| serde_json::Value::from(*b)).collect()),
        Ast::List(items) => serde_json::Value::Array(items.iter().map(|item| resolve_template(item, variables)).collect()),
        Ast::Object(fields) => serde_json::Value::Object(
            fields
                .iter()
                .map(|(name, value)| (name.to_string(), resolve_template(value, variables)))
                .collect(),
        ),
    }
}
