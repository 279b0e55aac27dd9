//! Compilation of a parsed GraphQL document into an [`OperationPlan`]: the
//! flattened, merged, schema-resolved form of one operation that execution
//! walks without ever touching the AST again.
//!
//! A plan holds no variable values. `@skip`/`@include` conditions referring
//! to variables are kept as predicates and evaluated per execution, so one
//! plan is reusable across requests.

mod compile;
mod error;
mod response_key;
mod variables;

use async_graphql_parser::types::ExecutableDocument;
use engine_id_newtypes::{impl_index, make_id, IdRange};

pub use error::CompileError;
pub use response_key::ResponseKey;
pub use variables::Variables;

pub(crate) use response_key::ResponseKeys;

use crate::schema::{FieldDefinitionId, InputValueDefinitionId, ObjectDefinitionId, Schema};

make_id!(pub struct FieldId(u16));
make_id!(pub struct SelectionSetId(u16));
make_id!(pub struct ArgumentId(u16));
make_id!(pub struct ConditionId(u16));

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationType {
    Query,
    Mutation,
    Subscription,
}

impl std::fmt::Display for OperationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            OperationType::Query => "query",
            OperationType::Mutation => "mutation",
            OperationType::Subscription => "subscription",
        })
    }
}

/// A compiled operation, immutable once built. Selection sets, fields,
/// arguments and inclusion conditions live in flat arenas; field merging and
/// abstract-type flattening already happened, so every selection set is
/// relative to one concrete object type.
pub struct OperationPlan {
    pub(crate) ty: OperationType,
    pub(crate) name: Option<String>,
    pub(crate) root_selection_set_id: SelectionSetId,
    pub(crate) response_keys: ResponseKeys,
    pub(crate) selection_sets: Vec<SelectionSetRecord>,
    pub(crate) fields: Vec<FieldRecord>,
    pub(crate) arguments: Vec<ArgumentRecord>,
    pub(crate) conditions: Vec<ConditionRecord>,
}

impl std::fmt::Debug for OperationPlan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OperationPlan")
            .field("ty", &self.ty)
            .field("name", &self.name)
            .field("selection_sets", &self.selection_sets.len())
            .field("fields", &self.fields.len())
            .finish_non_exhaustive()
    }
}

impl_index!(OperationPlan.selection_sets[SelectionSetId] => SelectionSetRecord);
impl_index!(OperationPlan.fields[FieldId] => FieldRecord);
impl_index!(OperationPlan.arguments[ArgumentId] => ArgumentRecord);
impl_index!(OperationPlan.conditions[ConditionId] => ConditionRecord);

impl OperationPlan {
    /// Compiles one operation of a parsed document against the schema. The
    /// document is expected to have passed validation; errors reported here
    /// are limited to what compilation cannot proceed through.
    pub fn compile(
        schema: &Schema,
        document: &ExecutableDocument,
        operation_name: Option<&str>,
    ) -> Result<Self, CompileError> {
        compile::compile(schema, document, operation_name)
    }

    pub fn ty(&self) -> OperationType {
        self.ty
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub(crate) fn response_key_str(&self, key: ResponseKey) -> &str {
        &self.response_keys[key]
    }

    pub(crate) fn field_count(&self) -> usize {
        self.fields.len()
    }

    pub(crate) fn field_ids(&self) -> impl ExactSizeIterator<Item = FieldId> {
        (0..self.fields.len()).map(FieldId::from)
    }

    /// Evaluates a field's `@skip`/`@include` conditions against this
    /// request's variables.
    pub(crate) fn is_included(&self, field: &FieldRecord, variables: &Variables) -> bool {
        if field.condition_sets.is_empty() {
            return true;
        }
        // One entry per occurrence of the field in the document; including
        // any occurrence includes the field.
        field.condition_sets.iter().any(|set| {
            self[*set].iter().all(|condition| {
                let value = variables
                    .get(&condition.variable)
                    .and_then(serde_json::Value::as_bool)
                    .unwrap_or(false);
                value != condition.negated
            })
        })
    }
}

/// Fields collected for one concrete object type, merged by response key, in
/// document order of first appearance.
pub struct SelectionSetRecord {
    pub object_id: ObjectDefinitionId,
    pub field_ids: IdRange<FieldId>,
}

pub struct FieldRecord {
    pub response_key: ResponseKey,
    /// `None` for the meta field `__typename`.
    pub definition_id: Option<FieldDefinitionId>,
    pub argument_ids: IdRange<ArgumentId>,
    /// Disjunction of conjunctions: the field is included if any occurrence's
    /// conditions all hold. Empty means unconditionally included.
    pub condition_sets: Vec<IdRange<ConditionId>>,
    /// Child selection set per possible concrete type. Empty for leaves.
    pub children: Vec<(ObjectDefinitionId, SelectionSetId)>,
}

impl FieldRecord {
    pub(crate) fn child_for(&self, object_id: ObjectDefinitionId) -> Option<SelectionSetId> {
        self.children
            .iter()
            .find(|(candidate, _)| *candidate == object_id)
            .map(|(_, id)| *id)
    }
}

pub struct ArgumentRecord {
    pub input_value_id: InputValueDefinitionId,
    pub value: ArgumentValue,
}

pub enum ArgumentValue {
    /// Fully constant literal, converted at compile time.
    Const(serde_json::Value),
    /// The whole argument is a single variable.
    Variable(String),
    /// A literal with variables nested inside; substituted per request.
    Template(async_graphql_value::Value),
}

/// One `@skip`/`@include` predicate over a boolean variable. `negated` for
/// `@skip`.
#[derive(Clone)]
pub struct ConditionRecord {
    pub variable: String,
    pub negated: bool,
}
