use std::collections::HashMap;

use async_graphql_parser::types::{
    Directive, DocumentOperations, ExecutableDocument, FragmentDefinition, OperationDefinition, Selection,
    SelectionSet,
};
use async_graphql_parser::Positioned;
use async_graphql_value::{Name, Value};
use engine_id_newtypes::IdRange;
use indexmap::map::Entry;
use indexmap::IndexMap;

use super::{
    ArgumentId, ArgumentRecord, ArgumentValue, CompileError, ConditionId, ConditionRecord, FieldRecord,
    OperationPlan, OperationType, ResponseKeys, SelectionSetId, SelectionSetRecord,
};
use crate::schema::{CompositeTypeId, FieldDefinitionId, InputValueDefinitionId, ObjectDefinitionId, Schema};

pub(super) fn compile(
    schema: &Schema,
    document: &ExecutableDocument,
    operation_name: Option<&str>,
) -> Result<OperationPlan, CompileError> {
    let (name, operation) = select_operation(document, operation_name)?;
    let ty = match operation.ty {
        async_graphql_parser::types::OperationType::Query => OperationType::Query,
        async_graphql_parser::types::OperationType::Mutation => OperationType::Mutation,
        async_graphql_parser::types::OperationType::Subscription => OperationType::Subscription,
    };
    let root_object_id = match ty {
        OperationType::Query => schema.query_root_id(),
        OperationType::Mutation => schema
            .mutation_root_id()
            .ok_or(CompileError::RootTypeUndefined(ty))?,
        OperationType::Subscription => schema
            .subscription_root_id()
            .ok_or(CompileError::RootTypeUndefined(ty))?,
    };

    let mut compiler = Compiler {
        schema,
        fragments: &document.fragments,
        response_keys: ResponseKeys::default(),
        selection_sets: Vec::new(),
        fields: Vec::new(),
        arguments: Vec::new(),
        conditions: Vec::new(),
    };
    let root_selection_set_id =
        compiler.compile_selection_set(root_object_id, &[(Vec::new(), &operation.selection_set.node)])?;

    Ok(OperationPlan {
        ty,
        name,
        root_selection_set_id,
        response_keys: compiler.response_keys,
        selection_sets: compiler.selection_sets,
        fields: compiler.fields,
        arguments: compiler.arguments,
        conditions: compiler.conditions,
    })
}

fn select_operation<'doc>(
    document: &'doc ExecutableDocument,
    operation_name: Option<&str>,
) -> Result<(Option<String>, &'doc OperationDefinition), CompileError> {
    match (&document.operations, operation_name) {
        (DocumentOperations::Single(operation), None) => Ok((None, &operation.node)),
        (DocumentOperations::Single(_), Some(name)) => Err(CompileError::OperationNotFound(name.to_string())),
        (DocumentOperations::Multiple(operations), Some(name)) => operations
            .iter()
            .find(|(candidate, _)| candidate.as_str() == name)
            .map(|(candidate, operation)| (Some(candidate.to_string()), &operation.node))
            .ok_or_else(|| CompileError::OperationNotFound(name.to_string())),
        (DocumentOperations::Multiple(operations), None) => {
            let mut operations = operations.iter();
            match (operations.next(), operations.next()) {
                (Some((name, operation)), None) => Ok((Some(name.to_string()), &operation.node)),
                _ => Err(CompileError::MissingOperationName),
            }
        }
    }
}

struct Compiler<'a> {
    schema: &'a Schema,
    fragments: &'a HashMap<Name, Positioned<FragmentDefinition>>,
    response_keys: ResponseKeys,
    selection_sets: Vec<SelectionSetRecord>,
    fields: Vec<FieldRecord>,
    arguments: Vec<ArgumentRecord>,
    conditions: Vec<ConditionRecord>,
}

/// A selection set to collect, together with the `@skip`/`@include`
/// conditions accumulated on the path that reached it. Fields inside only
/// exist when those conditions hold.
type ConditionedSet<'doc> = (Vec<ConditionRecord>, &'doc SelectionSet);

/// One response key's worth of merged field occurrences, before records are
/// written to the arenas.
struct CollectedField<'doc> {
    field_name: &'doc str,
    definition_id: Option<FieldDefinitionId>,
    arguments: &'doc [(Positioned<Name>, Positioned<Value>)],
    /// `None` once any occurrence is unconditionally included.
    condition_sets: Option<Vec<Vec<ConditionRecord>>>,
    selection_sets: Vec<ConditionedSet<'doc>>,
}

impl<'doc> Compiler<'doc> {
    /// CollectFields over one or more selection sets against a concrete
    /// object type, then recursively over the merged children. Fields of one
    /// selection set end up contiguous in the arena, in order of first
    /// appearance.
    fn compile_selection_set(
        &mut self,
        object_id: ObjectDefinitionId,
        selection_sets: &[ConditionedSet<'doc>],
    ) -> Result<SelectionSetId, CompileError> {
        let mut collected: IndexMap<&str, CollectedField<'doc>> = IndexMap::new();
        let mut fragment_stack = Vec::new();
        for (path_conditions, selection_set) in selection_sets {
            self.collect_into(object_id, selection_set, path_conditions, &mut fragment_stack, &mut collected)?;
        }

        // Children are compiled before the parent records are appended, so
        // each selection set owns a contiguous id range.
        let mut records = Vec::with_capacity(collected.len());
        for (response_key, field) in collected {
            records.push(self.build_field(response_key, field)?);
        }

        let start = self.fields.len();
        self.fields.extend(records);
        let field_ids = IdRange::from(start..self.fields.len());

        let id = SelectionSetId::from(self.selection_sets.len());
        self.selection_sets.push(SelectionSetRecord { object_id, field_ids });
        Ok(id)
    }

    fn collect_into(
        &mut self,
        object_id: ObjectDefinitionId,
        selection_set: &'doc SelectionSet,
        path_conditions: &[ConditionRecord],
        fragment_stack: &mut Vec<&'doc str>,
        out: &mut IndexMap<&'doc str, CollectedField<'doc>>,
    ) -> Result<(), CompileError> {
        for item in &selection_set.items {
            match &item.node {
                Selection::Field(field) => {
                    let field = &field.node;
                    let Some(own_conditions) = parse_conditions(&field.directives) else {
                        continue;
                    };
                    let field_name = field.name.node.as_str();
                    let response_key = field
                        .alias
                        .as_ref()
                        .map(|alias| alias.node.as_str())
                        .unwrap_or(field_name);

                    let definition_id = if field_name == "__typename" {
                        None
                    } else {
                        Some(
                            self.schema
                                .find_field(CompositeTypeId::Object(object_id), field_name)
                                .ok_or_else(|| CompileError::UnknownField {
                                    ty: self.schema.object_name(object_id).to_string(),
                                    field: field_name.to_string(),
                                })?,
                        )
                    };

                    let occurrence: Vec<ConditionRecord> = path_conditions
                        .iter()
                        .cloned()
                        .chain(own_conditions)
                        .collect();
                    // The sub-selection keeps this occurrence's conditions:
                    // fields under an excluded occurrence must not leak into
                    // the merged result through an included one.
                    let child_set = (!field.selection_set.node.items.is_empty())
                        .then(|| (occurrence.clone(), &field.selection_set.node));

                    match out.entry(response_key) {
                        Entry::Occupied(mut entry) => {
                            let existing = entry.get_mut();
                            if existing.field_name != field_name {
                                return Err(CompileError::FieldMergeConflict {
                                    key: response_key.to_string(),
                                    reason: format!("`{}` and `{field_name}` are different fields", existing.field_name),
                                });
                            }
                            if !arguments_equal(existing.arguments, &field.arguments) {
                                return Err(CompileError::FieldMergeConflict {
                                    key: response_key.to_string(),
                                    reason: "occurrences have differing arguments".to_string(),
                                });
                            }
                            if occurrence.is_empty() {
                                existing.condition_sets = None;
                            } else if let Some(sets) = &mut existing.condition_sets {
                                sets.push(occurrence);
                            }
                            existing.selection_sets.extend(child_set);
                        }
                        Entry::Vacant(entry) => {
                            entry.insert(CollectedField {
                                field_name,
                                definition_id,
                                arguments: &field.arguments,
                                condition_sets: if occurrence.is_empty() {
                                    None
                                } else {
                                    Some(vec![occurrence])
                                },
                                selection_sets: child_set.into_iter().collect(),
                            });
                        }
                    }
                }
                Selection::FragmentSpread(spread) => {
                    let spread = &spread.node;
                    let Some(own_conditions) = parse_conditions(&spread.directives) else {
                        continue;
                    };
                    let fragment_name = spread.fragment_name.node.as_str();
                    if fragment_stack.contains(&fragment_name) {
                        return Err(CompileError::FragmentCycle(fragment_name.to_string()));
                    }
                    let fragment = self
                        .fragments
                        .get(&spread.fragment_name.node)
                        .ok_or_else(|| CompileError::UnknownFragment(fragment_name.to_string()))?;

                    if !self.type_condition_matches(object_id, fragment.node.type_condition.node.on.node.as_str())? {
                        continue;
                    }
                    let nested: Vec<ConditionRecord> =
                        path_conditions.iter().cloned().chain(own_conditions).collect();
                    fragment_stack.push(fragment_name);
                    self.collect_into(
                        object_id,
                        &fragment.node.selection_set.node,
                        &nested,
                        fragment_stack,
                        out,
                    )?;
                    fragment_stack.pop();
                }
                Selection::InlineFragment(fragment) => {
                    let fragment = &fragment.node;
                    let Some(own_conditions) = parse_conditions(&fragment.directives) else {
                        continue;
                    };
                    if let Some(condition) = &fragment.type_condition {
                        if !self.type_condition_matches(object_id, condition.node.on.node.as_str())? {
                            continue;
                        }
                    }
                    let nested: Vec<ConditionRecord> =
                        path_conditions.iter().cloned().chain(own_conditions).collect();
                    self.collect_into(object_id, &fragment.selection_set.node, &nested, fragment_stack, out)?;
                }
            }
        }
        Ok(())
    }

    fn type_condition_matches(&self, object_id: ObjectDefinitionId, condition: &str) -> Result<bool, CompileError> {
        let definition_id = self
            .schema
            .type_definition_by_name(condition)
            .ok_or_else(|| CompileError::UnknownTypeCondition(condition.to_string()))?;
        if !definition_id.is_composite() {
            return Err(CompileError::InvalidTypeCondition(condition.to_string()));
        }
        Ok(self.schema.object_satisfies(object_id, definition_id))
    }

    fn build_field(&mut self, response_key: &str, collected: CollectedField<'doc>) -> Result<FieldRecord, CompileError> {
        let response_key = self.response_keys.get_or_intern(response_key);
        let condition_sets = match collected.condition_sets {
            None => Vec::new(),
            Some(sets) => sets
                .into_iter()
                .map(|set| {
                    let start = self.conditions.len();
                    self.conditions.extend(set);
                    IdRange::<ConditionId>::from(start..self.conditions.len())
                })
                .collect(),
        };

        let Some(definition_id) = collected.definition_id else {
            return Ok(FieldRecord {
                response_key,
                definition_id: None,
                argument_ids: IdRange::empty(),
                condition_sets,
                children: Vec::new(),
            });
        };

        let definition = &self.schema[definition_id];
        let field_type_id = definition.ty.definition_id;
        let argument_ids = self.compile_arguments(definition.argument_ids, collected.arguments);

        let children = match CompositeTypeId::maybe_from(field_type_id) {
            Some(composite_id) => {
                if collected.selection_sets.is_empty() {
                    return Err(CompileError::MissingSubselection {
                        ty: self.schema.definition_name(field_type_id).to_string(),
                        field: collected.field_name.to_string(),
                    });
                }
                // One selection set per possible concrete type; abstract
                // types are resolved at runtime via `__typename`.
                let mut children = Vec::new();
                for object_id in self.schema.possible_type_ids(composite_id) {
                    let set_id = self.compile_selection_set(object_id, &collected.selection_sets)?;
                    children.push((object_id, set_id));
                }
                children
            }
            None => {
                if !collected.selection_sets.is_empty() {
                    return Err(CompileError::UnexpectedSubselection {
                        ty: self.schema.definition_name(field_type_id).to_string(),
                        field: collected.field_name.to_string(),
                    });
                }
                Vec::new()
            }
        };

        Ok(FieldRecord {
            response_key,
            definition_id: Some(definition_id),
            argument_ids,
            condition_sets,
            children,
        })
    }

    /// Arguments are stored against their definition; unknown argument names
    /// are validation's to reject and are skipped here.
    fn compile_arguments(
        &mut self,
        argument_definition_ids: IdRange<InputValueDefinitionId>,
        ast_arguments: &[(Positioned<Name>, Positioned<Value>)],
    ) -> IdRange<ArgumentId> {
        let start = self.arguments.len();
        for input_value_id in argument_definition_ids.iter() {
            let name = &self.schema[self.schema[input_value_id].name_id];
            let Some((_, value)) = ast_arguments.iter().find(|(n, _)| n.node.as_str() == name) else {
                continue;
            };
            let value = match &value.node {
                Value::Variable(variable) => ArgumentValue::Variable(variable.to_string()),
                value => match value.clone().into_const() {
                    Some(const_value) => match const_value.into_json() {
                        Ok(json) => ArgumentValue::Const(json),
                        Err(_) => ArgumentValue::Template(value.clone()),
                    },
                    // Variables nested somewhere inside the literal.
                    None => ArgumentValue::Template(value.clone()),
                },
            };
            self.arguments.push(ArgumentRecord { input_value_id, value });
        }
        IdRange::from(start..self.arguments.len())
    }
}

/// Extracts `@skip`/`@include` conditions. `None` means the element is
/// statically excluded; constant directives never make it into the plan.
fn parse_conditions(directives: &[Positioned<Directive>]) -> Option<Vec<ConditionRecord>> {
    let mut conditions = Vec::new();
    for directive in directives {
        let negated = match directive.node.name.node.as_str() {
            "skip" => true,
            "include" => false,
            _ => continue,
        };
        match directive.node.get_argument("if").map(|arg| &arg.node) {
            Some(Value::Boolean(value)) => {
                if *value == negated {
                    return None;
                }
            }
            Some(Value::Variable(variable)) => conditions.push(ConditionRecord {
                variable: variable.to_string(),
                negated,
            }),
            // Anything else is malformed; validation's to reject.
            _ => {}
        }
    }
    Some(conditions)
}

fn arguments_equal(a: &[(Positioned<Name>, Positioned<Value>)], b: &[(Positioned<Name>, Positioned<Value>)]) -> bool {
    a.len() == b.len()
        && a.iter().all(|(name, value)| {
            b.iter()
                .find(|(candidate, _)| candidate.node == name.node)
                .is_some_and(|(_, other)| other.node == value.node)
        })
}

#[cfg(test)]
mod tests {
    use async_graphql_parser::parse_query;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::operation::Variables;
    use crate::schema::{SchemaBuilder, Type};

    fn test_schema() -> Schema {
        let mut builder = SchemaBuilder::new();
        builder.interface("Node", |iface| {
            iface.field("id", Type::named("ID").required(), |_| {});
        });
        builder.object("User", |obj| {
            obj.implements("Node")
                .field("id", Type::named("ID").required(), |_| {})
                .field("name", Type::named("String"), |_| {})
                .field("friends", Type::named("User").list(), |_| {});
        });
        builder.object("Bot", |obj| {
            obj.implements("Node")
                .field("id", Type::named("ID").required(), |_| {})
                .field("owner", Type::named("User"), |_| {});
        });
        builder.union("Actor", &["User", "Bot"]);
        builder.object("Query", |obj| {
            obj.field("me", Type::named("User"), |_| {})
                .field("node", Type::named("Node"), |f| {
                    f.argument("id", Type::named("ID").required());
                })
                .field("actor", Type::named("Actor"), |_| {});
        });
        builder.object("Mutation", |obj| {
            obj.field("rename", Type::named("User"), |f| {
                f.argument("name", Type::named("String").required());
            });
        });
        builder.build().unwrap()
    }

    fn plan(query: &str) -> OperationPlan {
        try_plan(query).unwrap()
    }

    fn try_plan(query: &str) -> Result<OperationPlan, CompileError> {
        let schema = test_schema();
        let document = parse_query(query).unwrap();
        OperationPlan::compile(&schema, &document, None)
    }

    fn root_keys(plan: &OperationPlan) -> Vec<String> {
        plan[plan.root_selection_set_id]
            .field_ids
            .iter()
            .map(|id| plan.response_key_str(plan[id].response_key).to_string())
            .collect()
    }

    #[test]
    fn merges_duplicate_fields_in_first_appearance_order() {
        let plan = plan(
            r#"
            query {
                me { name }
                actor { __typename }
                me { friends { id } }
            }
            "#,
        );
        assert_eq!(root_keys(&plan), vec!["me", "actor"]);

        // The two `me` occurrences share one field with merged children.
        let me = &plan[plan[plan.root_selection_set_id].field_ids.get(0).unwrap()];
        let (_, child_set) = me.children[0];
        let child_keys: Vec<&str> = plan[child_set]
            .field_ids
            .iter()
            .map(|id| plan.response_key_str(plan[id].response_key))
            .collect();
        assert_eq!(child_keys, vec!["name", "friends"]);
    }

    #[test]
    fn aliases_are_distinct_response_keys() {
        let plan = plan("query { a: me { id } b: me { id } }");
        assert_eq!(root_keys(&plan), vec!["a", "b"]);
    }

    #[test]
    fn rejects_different_fields_under_one_key() {
        let err = try_plan("query { name: me { id } name: actor { __typename } }").unwrap_err();
        assert!(matches!(err, CompileError::FieldMergeConflict { key, .. } if key == "name"));
    }

    #[test]
    fn rejects_merging_with_differing_arguments() {
        let err = try_plan(r#"query { node(id: "1") { id } node(id: "2") { id } }"#).unwrap_err();
        assert!(matches!(err, CompileError::FieldMergeConflict { key, .. } if key == "node"));
    }

    #[test]
    fn accepts_merging_with_identical_arguments() {
        let plan = plan(r#"query { node(id: "1") { id } node(id: "1") { __typename } }"#);
        assert_eq!(root_keys(&plan), vec!["node"]);
    }

    #[test]
    fn detects_fragment_cycles() {
        let err = try_plan(
            r#"
            query { me { ...A } }
            fragment A on User { ...B }
            fragment B on User { ...A }
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, CompileError::FragmentCycle(name) if name == "A"));
    }

    #[test]
    fn rejects_unknown_fragments() {
        let err = try_plan("query { me { ...Missing } }").unwrap_err();
        assert!(matches!(err, CompileError::UnknownFragment(name) if name == "Missing"));
    }

    #[test]
    fn rejects_unknown_fields() {
        let err = try_plan("query { me { age } }").unwrap_err();
        assert!(matches!(
            err,
            CompileError::UnknownField { ty, field } if ty == "User" && field == "age"
        ));
    }

    #[test]
    fn constant_directives_are_folded_at_compile_time() {
        let plan = plan(
            r#"
            query {
                me @include(if: false) { id }
                actor @include(if: true) { __typename }
            }
            "#,
        );
        assert_eq!(root_keys(&plan), vec!["actor"]);
        // The surviving field carries no runtime condition.
        let actor = &plan[plan[plan.root_selection_set_id].field_ids.get(0).unwrap()];
        assert!(actor.condition_sets.is_empty());
    }

    #[test]
    fn variable_directives_stay_lazy() {
        let plan = plan("query($withName: Boolean!) { me { id name @include(if: $withName) } }");
        let me = &plan[plan[plan.root_selection_set_id].field_ids.get(0).unwrap()];
        let (_, child_set) = me.children[0];
        let name_field = &plan[plan[child_set].field_ids.get(1).unwrap()];

        let included: Variables = [("withName", true)].into_iter().collect();
        let excluded: Variables = [("withName", false)].into_iter().collect();
        assert!(plan.is_included(name_field, &included));
        assert!(!plan.is_included(name_field, &excluded));
        assert!(!plan.is_included(name_field, &Variables::new()));
    }

    #[test]
    fn skip_on_a_fragment_spread_conditions_its_fields() {
        let plan = plan(
            r#"
            query($hide: Boolean!) { me { id ...Extra @skip(if: $hide) } }
            fragment Extra on User { name }
            "#,
        );
        let me = &plan[plan[plan.root_selection_set_id].field_ids.get(0).unwrap()];
        let (_, child_set) = me.children[0];
        let name_field = &plan[plan[child_set].field_ids.get(1).unwrap()];

        let hidden: Variables = [("hide", true)].into_iter().collect();
        let shown: Variables = [("hide", false)].into_iter().collect();
        assert!(!plan.is_included(name_field, &hidden));
        assert!(plan.is_included(name_field, &shown));
    }

    #[test]
    fn included_by_any_unconditional_occurrence() {
        let plan = plan("query($v: Boolean!) { me { name @include(if: $v) name } }");
        let me = &plan[plan[plan.root_selection_set_id].field_ids.get(0).unwrap()];
        let (_, child_set) = me.children[0];
        let name_field = &plan[plan[child_set].field_ids.get(0).unwrap()];
        assert!(name_field.condition_sets.is_empty());
        assert!(plan.is_included(name_field, &Variables::new()));
    }

    #[test]
    fn conditional_occurrences_keep_conditions_on_their_subselections() {
        let plan = plan("query($v: Boolean!) { me { id } me @include(if: $v) { name } }");
        let me = &plan[plan[plan.root_selection_set_id].field_ids.get(0).unwrap()];
        // The unconditional occurrence keeps `me` itself unconditional.
        assert!(me.condition_sets.is_empty());

        // `name` only exists under the conditional occurrence.
        let (_, child_set) = me.children[0];
        let name_field = &plan[plan[child_set].field_ids.get(1).unwrap()];
        let shown: Variables = [("v", true)].into_iter().collect();
        let hidden: Variables = [("v", false)].into_iter().collect();
        assert!(plan.is_included(name_field, &shown));
        assert!(!plan.is_included(name_field, &hidden));
        assert!(!plan.is_included(name_field, &Variables::new()));
    }

    #[test]
    fn abstract_fields_get_one_selection_set_per_concrete_type() {
        let plan = plan(
            r#"
            query {
                actor {
                    __typename
                    ... on User { name }
                    ... on Bot { owner { id } }
                    ... on Node { id }
                }
            }
            "#,
        );
        let actor = &plan[plan[plan.root_selection_set_id].field_ids.get(0).unwrap()];
        assert_eq!(actor.children.len(), 2);

        let schema = test_schema();
        for (object_id, set_id) in &actor.children {
            let keys: Vec<&str> = plan[*set_id]
                .field_ids
                .iter()
                .map(|id| plan.response_key_str(plan[id].response_key))
                .collect();
            match schema.object_name(*object_id) {
                // `... on Node` applies to both implementors.
                "User" => assert_eq!(keys, vec!["__typename", "name", "id"]),
                "Bot" => assert_eq!(keys, vec!["__typename", "owner", "id"]),
                other => unreachable!("unexpected concrete type {other}"),
            }
        }
    }

    #[test]
    fn selects_the_named_operation() {
        let schema = test_schema();
        let document = parse_query("query A { me { id } } query B { actor { __typename } }").unwrap();

        let plan = OperationPlan::compile(&schema, &document, Some("B")).unwrap();
        assert_eq!(plan.name(), Some("B"));
        assert_eq!(root_keys(&plan), vec!["actor"]);

        let err = OperationPlan::compile(&schema, &document, Some("C")).unwrap_err();
        assert!(matches!(err, CompileError::OperationNotFound(name) if name == "C"));

        let err = OperationPlan::compile(&schema, &document, None).unwrap_err();
        assert!(matches!(err, CompileError::MissingOperationName));
    }

    #[test]
    fn requires_a_selection_set_on_composite_fields() {
        let err = try_plan("query { me }").unwrap_err();
        assert!(matches!(err, CompileError::MissingSubselection { field, .. } if field == "me"));
    }

    #[test]
    fn mutation_operations_use_the_mutation_root() {
        let plan = plan(r#"mutation { rename(name: "x") { id } }"#);
        assert_eq!(plan.ty(), OperationType::Mutation);
        assert_eq!(root_keys(&plan), vec!["rename"]);
    }
}
