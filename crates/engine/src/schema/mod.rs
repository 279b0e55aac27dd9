//! The type system the engine compiles operations against and executes
//! resolvers from. Definitions live in flat arenas indexed by typed ids;
//! everything referring to a definition holds an id, never a reference.

mod builder;
mod ids;
mod wrapping;

use engine_id_newtypes::{impl_index, IdRange};
use fxhash::FxHashMap;

pub use builder::{SchemaBuilder, SchemaError, Type};
pub use ids::*;
pub use wrapping::Wrapping;

use crate::resolver::ResolverPipeline;

pub struct Schema {
    pub(crate) strings: Vec<String>,
    pub(crate) type_definitions: FxHashMap<String, TypeDefinitionId>,
    pub(crate) objects: Vec<ObjectDefinitionRecord>,
    pub(crate) interfaces: Vec<InterfaceDefinitionRecord>,
    pub(crate) unions: Vec<UnionDefinitionRecord>,
    pub(crate) scalars: Vec<ScalarDefinitionRecord>,
    pub(crate) enums: Vec<EnumDefinitionRecord>,
    pub(crate) input_objects: Vec<InputObjectDefinitionRecord>,
    pub(crate) fields: Vec<FieldDefinitionRecord>,
    pub(crate) input_values: Vec<InputValueDefinitionRecord>,
    pub(crate) query_root_id: ObjectDefinitionId,
    pub(crate) mutation_root_id: Option<ObjectDefinitionId>,
    pub(crate) subscription_root_id: Option<ObjectDefinitionId>,
}

impl_index!(Schema.strings[StringId] => String);
impl_index!(Schema.objects[ObjectDefinitionId] => ObjectDefinitionRecord);
impl_index!(Schema.interfaces[InterfaceDefinitionId] => InterfaceDefinitionRecord);
impl_index!(Schema.unions[UnionDefinitionId] => UnionDefinitionRecord);
impl_index!(Schema.scalars[ScalarDefinitionId] => ScalarDefinitionRecord);
impl_index!(Schema.enums[EnumDefinitionId] => EnumDefinitionRecord);
impl_index!(Schema.input_objects[InputObjectDefinitionId] => InputObjectDefinitionRecord);
impl_index!(Schema.fields[FieldDefinitionId] => FieldDefinitionRecord);
impl_index!(Schema.input_values[InputValueDefinitionId] => InputValueDefinitionRecord);

pub struct ObjectDefinitionRecord {
    pub name_id: StringId,
    pub interface_ids: Vec<InterfaceDefinitionId>,
    pub field_ids: IdRange<FieldDefinitionId>,
}

pub struct InterfaceDefinitionRecord {
    pub name_id: StringId,
    pub field_ids: IdRange<FieldDefinitionId>,
    /// Objects implementing this interface, in declaration order.
    pub possible_type_ids: Vec<ObjectDefinitionId>,
}

pub struct UnionDefinitionRecord {
    pub name_id: StringId,
    pub possible_type_ids: Vec<ObjectDefinitionId>,
}

pub struct ScalarDefinitionRecord {
    pub name_id: StringId,
}

pub struct EnumDefinitionRecord {
    pub name_id: StringId,
    pub value_ids: Vec<StringId>,
}

pub struct InputObjectDefinitionRecord {
    pub name_id: StringId,
    pub input_field_ids: IdRange<InputValueDefinitionId>,
}

pub struct FieldDefinitionRecord {
    pub name_id: StringId,
    pub ty: TypeRecord,
    pub argument_ids: IdRange<InputValueDefinitionId>,
    /// A serial field holds back the start of any selection-set sibling that
    /// comes after it until it completed.
    pub serial: bool,
    pub(crate) pipeline: Option<ResolverPipeline>,
}

pub struct InputValueDefinitionRecord {
    pub name_id: StringId,
    pub ty: TypeRecord,
    pub default_value: Option<serde_json::Value>,
}

/// A use of a named type, i.e. the definition plus its wrapping.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct TypeRecord {
    pub definition_id: TypeDefinitionId,
    pub wrapping: Wrapping,
}

impl std::fmt::Debug for TypeRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TypeRecord")
            .field("definition_id", &self.definition_id)
            .field("wrapping", &self.wrapping)
            .finish()
    }
}

impl Schema {
    pub fn builder() -> SchemaBuilder {
        SchemaBuilder::new()
    }

    pub fn query_root_id(&self) -> ObjectDefinitionId {
        self.query_root_id
    }

    pub fn mutation_root_id(&self) -> Option<ObjectDefinitionId> {
        self.mutation_root_id
    }

    pub fn subscription_root_id(&self) -> Option<ObjectDefinitionId> {
        self.subscription_root_id
    }

    pub fn type_definition_by_name(&self, name: &str) -> Option<TypeDefinitionId> {
        self.type_definitions.get(name).copied()
    }

    pub fn definition_name(&self, id: TypeDefinitionId) -> &str {
        let name_id = match id {
            TypeDefinitionId::Scalar(id) => self[id].name_id,
            TypeDefinitionId::Object(id) => self[id].name_id,
            TypeDefinitionId::Interface(id) => self[id].name_id,
            TypeDefinitionId::Union(id) => self[id].name_id,
            TypeDefinitionId::Enum(id) => self[id].name_id,
            TypeDefinitionId::InputObject(id) => self[id].name_id,
        };
        &self[name_id]
    }

    pub fn object_name(&self, id: ObjectDefinitionId) -> &str {
        &self[self[id].name_id]
    }

    pub fn field_name(&self, id: FieldDefinitionId) -> &str {
        &self[self[id].name_id]
    }

    /// Looks a field up by name on an object or interface. Unions expose no
    /// fields besides the meta field `__typename`, which never reaches this.
    pub(crate) fn find_field(&self, composite_id: CompositeTypeId, name: &str) -> Option<FieldDefinitionId> {
        let field_ids = match composite_id {
            CompositeTypeId::Object(id) => self[id].field_ids,
            CompositeTypeId::Interface(id) => self[id].field_ids,
            CompositeTypeId::Union(_) => IdRange::empty(),
        };
        let found = field_ids.iter().find(|id| self.field_name(*id) == name);
        found
    }

    /// The concrete object types a value of this type may take at runtime.
    pub(crate) fn possible_type_ids(&self, composite_id: CompositeTypeId) -> Vec<ObjectDefinitionId> {
        match composite_id {
            CompositeTypeId::Object(id) => vec![id],
            CompositeTypeId::Interface(id) => self[id].possible_type_ids.clone(),
            CompositeTypeId::Union(id) => self[id].possible_type_ids.clone(),
        }
    }

    /// Whether a value of concrete type `object_id` matches the given type
    /// condition.
    pub(crate) fn object_satisfies(&self, object_id: ObjectDefinitionId, condition: TypeDefinitionId) -> bool {
        match condition {
            TypeDefinitionId::Object(id) => id == object_id,
            TypeDefinitionId::Interface(id) => self[object_id].interface_ids.contains(&id),
            TypeDefinitionId::Union(id) => self[id].possible_type_ids.contains(&object_id),
            _ => false,
        }
    }
}
