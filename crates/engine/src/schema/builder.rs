use std::sync::Arc;

use engine_id_newtypes::IdRange;
use fxhash::FxHashMap;
use indexmap::IndexMap;

use super::{
    CompositeTypeId, EnumDefinitionRecord, FieldDefinitionRecord, InputObjectDefinitionRecord,
    InputValueDefinitionRecord, InterfaceDefinitionRecord, ObjectDefinitionRecord, ScalarDefinitionRecord, Schema,
    StringId, TypeDefinitionId, TypeRecord, UnionDefinitionRecord, Wrapping,
};
use crate::resolver::{Middleware, PropertyResolver, Resolver, ResolverPipeline};

/// A reference to a named type with its wrapping, built innermost-out:
/// `Type::named("User").required().list().required()` is `[User!]!`.
#[derive(Clone, Debug)]
pub struct Type {
    name: String,
    wrapping: Wrapping,
}

impl Type {
    pub fn named(name: impl Into<String>) -> Self {
        Type {
            name: name.into(),
            wrapping: Wrapping::nullable(),
        }
    }

    #[must_use]
    pub fn required(mut self) -> Self {
        self.wrapping = self.wrapping.require_outermost();
        self
    }

    #[must_use]
    pub fn list(mut self) -> Self {
        self.wrapping = self.wrapping.wrap_list();
        self
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    #[error("duplicate type name `{0}`")]
    DuplicateTypeName(String),
    #[error("duplicate field `{field}` on type `{ty}`")]
    DuplicateFieldName { ty: String, field: String },
    #[error("duplicate argument `{argument}` on `{ty}.{field}`")]
    DuplicateArgumentName { ty: String, field: String, argument: String },
    #[error("`{ty}.{field}` references unknown type `{referenced}`")]
    UnknownType { ty: String, field: String, referenced: String },
    #[error("`{ty}.{field}` uses input type `{referenced}` in output position")]
    InputTypeInOutputPosition { ty: String, field: String, referenced: String },
    #[error("`{ty}.{field}` uses output type `{referenced}` in input position")]
    OutputTypeInInputPosition { ty: String, field: String, referenced: String },
    #[error("object `{ty}` implements unknown interface `{interface}`")]
    UnknownInterface { ty: String, interface: String },
    #[error("union `{ty}` member `{member}` is not an object type")]
    InvalidUnionMember { ty: String, member: String },
    #[error("the schema does not define a `Query` object type")]
    MissingQueryRoot,
}

enum TypeDraft {
    Object(ObjectDraft),
    Interface(InterfaceDraft),
    Union(Vec<String>),
    Scalar,
    Enum(Vec<String>),
    InputObject(Vec<InputValueDraft>),
}

#[derive(Default)]
struct ObjectDraft {
    implements: Vec<String>,
    fields: Vec<FieldDraft>,
}

#[derive(Default)]
struct InterfaceDraft {
    fields: Vec<FieldDraft>,
}

struct FieldDraft {
    name: String,
    ty: Type,
    arguments: Vec<InputValueDraft>,
    serial: bool,
    resolver: Option<Arc<dyn Resolver>>,
    middlewares: Vec<Arc<dyn Middleware>>,
}

struct InputValueDraft {
    name: String,
    ty: Type,
    default_value: Option<serde_json::Value>,
}

/// Programmatic, code-first schema construction. Types may reference each
/// other by name in any order; all names are resolved in [`build`](Self::build).
pub struct SchemaBuilder {
    types: IndexMap<String, TypeDraft>,
    schema_middlewares: Vec<Arc<dyn Middleware>>,
    errors: Vec<SchemaError>,
}

impl Default for SchemaBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl SchemaBuilder {
    pub fn new() -> Self {
        let mut builder = SchemaBuilder {
            types: IndexMap::new(),
            schema_middlewares: Vec::new(),
            errors: Vec::new(),
        };
        for scalar in ["ID", "String", "Int", "Float", "Boolean"] {
            builder.types.insert(scalar.to_string(), TypeDraft::Scalar);
        }
        builder
    }

    fn insert(&mut self, name: &str, draft: TypeDraft) {
        if self.types.insert(name.to_string(), draft).is_some() {
            self.errors.push(SchemaError::DuplicateTypeName(name.to_string()));
        }
    }

    /// Middleware applied to every field of the schema, outermost in each
    /// field's pipeline, in registration order.
    pub fn middleware(&mut self, middleware: impl Middleware + 'static) -> &mut Self {
        self.schema_middlewares.push(Arc::new(middleware));
        self
    }

    pub fn object(&mut self, name: &str, configure: impl FnOnce(&mut ObjectBuilder<'_>)) -> &mut Self {
        let mut draft = ObjectDraft::default();
        configure(&mut ObjectBuilder { draft: &mut draft });
        self.insert(name, TypeDraft::Object(draft));
        self
    }

    pub fn interface(&mut self, name: &str, configure: impl FnOnce(&mut InterfaceBuilder<'_>)) -> &mut Self {
        let mut draft = InterfaceDraft::default();
        configure(&mut InterfaceBuilder { draft: &mut draft });
        self.insert(name, TypeDraft::Interface(draft));
        self
    }

    pub fn union(&mut self, name: &str, members: &[&str]) -> &mut Self {
        self.insert(name, TypeDraft::Union(members.iter().map(|m| m.to_string()).collect()));
        self
    }

    pub fn scalar(&mut self, name: &str) -> &mut Self {
        self.insert(name, TypeDraft::Scalar);
        self
    }

    pub fn enum_type(&mut self, name: &str, values: &[&str]) -> &mut Self {
        self.insert(name, TypeDraft::Enum(values.iter().map(|v| v.to_string()).collect()));
        self
    }

    pub fn input_object(&mut self, name: &str, configure: impl FnOnce(&mut InputObjectBuilder<'_>)) -> &mut Self {
        let mut fields = Vec::new();
        configure(&mut InputObjectBuilder { fields: &mut fields });
        self.insert(name, TypeDraft::InputObject(fields));
        self
    }

    pub fn build(self) -> Result<Schema, SchemaError> {
        Builder::new(self).finish()
    }
}

pub struct ObjectBuilder<'a> {
    draft: &'a mut ObjectDraft,
}

impl ObjectBuilder<'_> {
    pub fn implements(&mut self, interface: &str) -> &mut Self {
        self.draft.implements.push(interface.to_string());
        self
    }

    pub fn field(&mut self, name: &str, ty: Type, configure: impl FnOnce(&mut FieldBuilder<'_>)) -> &mut Self {
        self.draft.fields.push(new_field(name, ty, configure));
        self
    }
}

pub struct InterfaceBuilder<'a> {
    draft: &'a mut InterfaceDraft,
}

impl InterfaceBuilder<'_> {
    pub fn field(&mut self, name: &str, ty: Type, configure: impl FnOnce(&mut FieldBuilder<'_>)) -> &mut Self {
        self.draft.fields.push(new_field(name, ty, configure));
        self
    }
}

fn new_field(name: &str, ty: Type, configure: impl FnOnce(&mut FieldBuilder<'_>)) -> FieldDraft {
    let mut draft = FieldDraft {
        name: name.to_string(),
        ty,
        arguments: Vec::new(),
        serial: false,
        resolver: None,
        middlewares: Vec::new(),
    };
    configure(&mut FieldBuilder { draft: &mut draft });
    draft
}

pub struct FieldBuilder<'a> {
    draft: &'a mut FieldDraft,
}

impl FieldBuilder<'_> {
    pub fn argument(&mut self, name: &str, ty: Type) -> &mut Self {
        self.draft.arguments.push(InputValueDraft {
            name: name.to_string(),
            ty,
            default_value: None,
        });
        self
    }

    pub fn argument_with_default(&mut self, name: &str, ty: Type, default: serde_json::Value) -> &mut Self {
        self.draft.arguments.push(InputValueDraft {
            name: name.to_string(),
            ty,
            default_value: Some(default),
        });
        self
    }

    pub fn resolver(&mut self, resolver: impl Resolver + 'static) -> &mut Self {
        self.draft.resolver = Some(Arc::new(resolver));
        self
    }

    pub fn middleware(&mut self, middleware: impl Middleware + 'static) -> &mut Self {
        self.draft.middlewares.push(Arc::new(middleware));
        self
    }

    /// Marks the field serial: within its selection set, later siblings only
    /// start once this field completed.
    pub fn serial(&mut self) -> &mut Self {
        self.draft.serial = true;
        self
    }
}

pub struct InputObjectBuilder<'a> {
    fields: &'a mut Vec<InputValueDraft>,
}

impl InputObjectBuilder<'_> {
    pub fn field(&mut self, name: &str, ty: Type) -> &mut Self {
        self.fields.push(InputValueDraft {
            name: name.to_string(),
            ty,
            default_value: None,
        });
        self
    }

    pub fn field_with_default(&mut self, name: &str, ty: Type, default: serde_json::Value) -> &mut Self {
        self.fields.push(InputValueDraft {
            name: name.to_string(),
            ty,
            default_value: Some(default),
        });
        self
    }
}

/// Second phase: name resolution and arena construction.
struct Builder {
    drafts: IndexMap<String, TypeDraft>,
    schema_middlewares: Vec<Arc<dyn Middleware>>,
    errors: Vec<SchemaError>,
    strings: Vec<String>,
    string_ids: FxHashMap<String, StringId>,
    type_definitions: FxHashMap<String, TypeDefinitionId>,
}

impl Builder {
    fn new(builder: SchemaBuilder) -> Self {
        Builder {
            drafts: builder.types,
            schema_middlewares: builder.schema_middlewares,
            errors: builder.errors,
            strings: Vec::new(),
            string_ids: FxHashMap::default(),
            type_definitions: FxHashMap::default(),
        }
    }

    fn intern(&mut self, name: &str) -> StringId {
        if let Some(id) = self.string_ids.get(name) {
            return *id;
        }
        let id = StringId::from(self.strings.len());
        self.strings.push(name.to_string());
        self.string_ids.insert(name.to_string(), id);
        id
    }

    fn finish(mut self) -> Result<Schema, SchemaError> {
        // First pass: assign an id per kind in declaration order so that
        // type references resolve regardless of ordering.
        let mut counts = [0usize; 6];
        for (name, draft) in &self.drafts {
            let id = match draft {
                TypeDraft::Object(_) => {
                    counts[0] += 1;
                    TypeDefinitionId::Object((counts[0] - 1).into())
                }
                TypeDraft::Interface(_) => {
                    counts[1] += 1;
                    TypeDefinitionId::Interface((counts[1] - 1).into())
                }
                TypeDraft::Union(_) => {
                    counts[2] += 1;
                    TypeDefinitionId::Union((counts[2] - 1).into())
                }
                TypeDraft::Scalar => {
                    counts[3] += 1;
                    TypeDefinitionId::Scalar((counts[3] - 1).into())
                }
                TypeDraft::Enum(_) => {
                    counts[4] += 1;
                    TypeDefinitionId::Enum((counts[4] - 1).into())
                }
                TypeDraft::InputObject(_) => {
                    counts[5] += 1;
                    TypeDefinitionId::InputObject((counts[5] - 1).into())
                }
            };
            self.type_definitions.insert(name.clone(), id);
        }

        let mut objects = Vec::new();
        let mut interfaces = Vec::new();
        let mut unions = Vec::new();
        let mut scalars = Vec::new();
        let mut enums = Vec::new();
        let mut input_objects = Vec::new();
        let mut fields: Vec<FieldDefinitionRecord> = Vec::new();
        let mut input_values: Vec<InputValueDefinitionRecord> = Vec::new();

        let drafts = std::mem::take(&mut self.drafts);
        for (type_name, draft) in &drafts {
            let name_id = self.intern(type_name);
            match draft {
                TypeDraft::Object(object) => {
                    let mut interface_ids = Vec::with_capacity(object.implements.len());
                    for interface in &object.implements {
                        match self.type_definitions.get(interface) {
                            Some(TypeDefinitionId::Interface(id)) => interface_ids.push(*id),
                            _ => self.errors.push(SchemaError::UnknownInterface {
                                ty: type_name.clone(),
                                interface: interface.clone(),
                            }),
                        }
                    }
                    let field_ids = self.build_fields(type_name, &object.fields, &mut fields, &mut input_values);
                    objects.push(ObjectDefinitionRecord {
                        name_id,
                        interface_ids,
                        field_ids,
                    });
                }
                TypeDraft::Interface(interface) => {
                    let field_ids = self.build_fields(type_name, &interface.fields, &mut fields, &mut input_values);
                    interfaces.push(InterfaceDefinitionRecord {
                        name_id,
                        field_ids,
                        possible_type_ids: Vec::new(),
                    });
                }
                TypeDraft::Union(members) => {
                    let mut possible_type_ids = Vec::with_capacity(members.len());
                    for member in members {
                        match self.type_definitions.get(member) {
                            Some(TypeDefinitionId::Object(id)) => possible_type_ids.push(*id),
                            _ => self.errors.push(SchemaError::InvalidUnionMember {
                                ty: type_name.clone(),
                                member: member.clone(),
                            }),
                        }
                    }
                    unions.push(UnionDefinitionRecord {
                        name_id,
                        possible_type_ids,
                    });
                }
                TypeDraft::Scalar => scalars.push(ScalarDefinitionRecord { name_id }),
                TypeDraft::Enum(values) => {
                    let value_ids = values.iter().map(|value| self.intern(value)).collect();
                    enums.push(EnumDefinitionRecord { name_id, value_ids });
                }
                TypeDraft::InputObject(drafts) => {
                    let input_field_ids = self.build_input_values(type_name, "<input>", drafts, &mut input_values);
                    input_objects.push(InputObjectDefinitionRecord {
                        name_id,
                        input_field_ids,
                    });
                }
            }
        }

        // Objects were all assigned ids above, so interface membership can
        // only be filled in now.
        for (object_id, record) in objects.iter().enumerate() {
            for interface_id in record.interface_ids.clone() {
                interfaces[usize::from(interface_id)]
                    .possible_type_ids
                    .push(object_id.into());
            }
        }

        let query_root_id = match self.type_definitions.get("Query") {
            Some(TypeDefinitionId::Object(id)) => *id,
            _ => {
                self.errors.push(SchemaError::MissingQueryRoot);
                0usize.into()
            }
        };
        let mutation_root_id = match self.type_definitions.get("Mutation") {
            Some(TypeDefinitionId::Object(id)) => Some(*id),
            _ => None,
        };
        let subscription_root_id = match self.type_definitions.get("Subscription") {
            Some(TypeDefinitionId::Object(id)) => Some(*id),
            _ => None,
        };

        if let Some(error) = self.errors.into_iter().next() {
            return Err(error);
        }

        Ok(Schema {
            strings: self.strings,
            type_definitions: self.type_definitions,
            objects,
            interfaces,
            unions,
            scalars,
            enums,
            input_objects,
            fields,
            input_values,
            query_root_id,
            mutation_root_id,
            subscription_root_id,
        })
    }

    fn resolve_type(&mut self, ty: &Type, parent: &str, field: &str, output_position: bool) -> Option<TypeRecord> {
        let Some(definition_id) = self.type_definitions.get(&ty.name).copied() else {
            self.errors.push(SchemaError::UnknownType {
                ty: parent.to_string(),
                field: field.to_string(),
                referenced: ty.name.clone(),
            });
            return None;
        };
        match definition_id {
            TypeDefinitionId::InputObject(_) if output_position => {
                self.errors.push(SchemaError::InputTypeInOutputPosition {
                    ty: parent.to_string(),
                    field: field.to_string(),
                    referenced: ty.name.clone(),
                });
                None
            }
            id if !output_position && CompositeTypeId::maybe_from(id).is_some() => {
                self.errors.push(SchemaError::OutputTypeInInputPosition {
                    ty: parent.to_string(),
                    field: field.to_string(),
                    referenced: ty.name.clone(),
                });
                None
            }
            _ => Some(TypeRecord {
                definition_id,
                wrapping: ty.wrapping,
            }),
        }
    }

    fn build_fields(
        &mut self,
        type_name: &str,
        drafts: &[FieldDraft],
        fields: &mut Vec<FieldDefinitionRecord>,
        input_values: &mut Vec<InputValueDefinitionRecord>,
    ) -> IdRange<super::FieldDefinitionId> {
        let start = fields.len();
        for (i, draft) in drafts.iter().enumerate() {
            if drafts[..i].iter().any(|other| other.name == draft.name) {
                self.errors.push(SchemaError::DuplicateFieldName {
                    ty: type_name.to_string(),
                    field: draft.name.clone(),
                });
                continue;
            }
            let Some(ty) = self.resolve_type(&draft.ty, type_name, &draft.name, true) else {
                continue;
            };
            let argument_ids = self.build_input_values(type_name, &draft.name, &draft.arguments, input_values);
            let name_id = self.intern(&draft.name);
            fields.push(FieldDefinitionRecord {
                name_id,
                ty,
                argument_ids,
                serial: draft.serial,
                pipeline: self.build_pipeline(draft),
            });
        }
        IdRange::from(start..fields.len())
    }

    /// Composes the field's pipeline once: schema middleware, then field
    /// middleware, then the resolver. Fields with neither get no pipeline
    /// and take the executor's property fast path.
    fn build_pipeline(&self, draft: &FieldDraft) -> Option<ResolverPipeline> {
        if draft.resolver.is_none() && draft.middlewares.is_empty() && self.schema_middlewares.is_empty() {
            return None;
        }
        let middlewares = self
            .schema_middlewares
            .iter()
            .chain(&draft.middlewares)
            .cloned()
            .collect();
        let resolver = draft
            .resolver
            .clone()
            .unwrap_or_else(|| Arc::new(PropertyResolver) as Arc<dyn Resolver>);
        Some(ResolverPipeline::new(middlewares, resolver))
    }

    fn build_input_values(
        &mut self,
        type_name: &str,
        field_name: &str,
        drafts: &[InputValueDraft],
        input_values: &mut Vec<InputValueDefinitionRecord>,
    ) -> IdRange<super::InputValueDefinitionId> {
        let start = input_values.len();
        for (i, draft) in drafts.iter().enumerate() {
            if drafts[..i].iter().any(|other| other.name == draft.name) {
                self.errors.push(SchemaError::DuplicateArgumentName {
                    ty: type_name.to_string(),
                    field: field_name.to_string(),
                    argument: draft.name.clone(),
                });
                continue;
            }
            let Some(ty) = self.resolve_type(&draft.ty, type_name, &draft.name, false) else {
                continue;
            };
            let name_id = self.intern(&draft.name);
            input_values.push(InputValueDefinitionRecord {
                name_id,
                ty,
                default_value: draft.default_value.clone(),
            });
        }
        IdRange::from(start..input_values.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_a_minimal_schema() {
        let mut builder = SchemaBuilder::new();
        builder.object("Query", |obj| {
            obj.field("hello", Type::named("String").required(), |_| {});
        });
        let schema = builder.build().unwrap();

        let query = schema.query_root_id();
        assert_eq!(schema.object_name(query), "Query");
        let field_id = schema
            .find_field(CompositeTypeId::Object(query), "hello")
            .unwrap();
        assert!(schema[field_id].ty.wrapping.is_required());
    }

    #[test]
    fn rejects_duplicate_types() {
        let mut builder = SchemaBuilder::new();
        builder.object("Query", |obj| {
            obj.field("a", Type::named("String"), |_| {});
        });
        builder.object("Query", |obj| {
            obj.field("b", Type::named("String"), |_| {});
        });
        assert!(matches!(builder.build(), Err(SchemaError::DuplicateTypeName(name)) if name == "Query"));
    }

    #[test]
    fn rejects_unknown_field_type() {
        let mut builder = SchemaBuilder::new();
        builder.object("Query", |obj| {
            obj.field("user", Type::named("User"), |_| {});
        });
        assert!(matches!(
            builder.build(),
            Err(SchemaError::UnknownType { referenced, .. }) if referenced == "User"
        ));
    }

    #[test]
    fn requires_a_query_root() {
        let mut builder = SchemaBuilder::new();
        builder.object("Mutation", |obj| {
            obj.field("noop", Type::named("Boolean"), |_| {});
        });
        assert!(matches!(builder.build(), Err(SchemaError::MissingQueryRoot)));
    }

    #[test]
    fn interfaces_track_their_implementors() {
        let mut builder = SchemaBuilder::new();
        builder.interface("Node", |iface| {
            iface.field("id", Type::named("ID").required(), |_| {});
        });
        builder.object("User", |obj| {
            obj.implements("Node")
                .field("id", Type::named("ID").required(), |_| {});
        });
        builder.object("Post", |obj| {
            obj.implements("Node")
                .field("id", Type::named("ID").required(), |_| {});
        });
        builder.object("Query", |obj| {
            obj.field("node", Type::named("Node"), |_| {});
        });
        let schema = builder.build().unwrap();

        let Some(TypeDefinitionId::Interface(node)) = schema.type_definition_by_name("Node") else {
            unreachable!("Node is an interface");
        };
        let names: Vec<&str> = schema[node]
            .possible_type_ids
            .iter()
            .map(|id| schema.object_name(*id))
            .collect();
        assert_eq!(names, vec!["User", "Post"]);
    }
}
