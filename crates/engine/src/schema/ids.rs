use engine_id_newtypes::make_id;

make_id!(pub struct ObjectDefinitionId(u32));
make_id!(pub struct InterfaceDefinitionId(u32));
make_id!(pub struct UnionDefinitionId(u32));
make_id!(pub struct ScalarDefinitionId(u32));
make_id!(pub struct EnumDefinitionId(u32));
make_id!(pub struct InputObjectDefinitionId(u32));
make_id!(pub struct FieldDefinitionId(u32));
make_id!(pub struct InputValueDefinitionId(u32));
make_id!(pub struct StringId(u32));

/// Id of any named type in the schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeDefinitionId {
    Scalar(ScalarDefinitionId),
    Object(ObjectDefinitionId),
    Interface(InterfaceDefinitionId),
    Union(UnionDefinitionId),
    Enum(EnumDefinitionId),
    InputObject(InputObjectDefinitionId),
}

impl TypeDefinitionId {
    pub fn is_composite(self) -> bool {
        CompositeTypeId::maybe_from(self).is_some()
    }

    pub fn is_leaf(self) -> bool {
        matches!(self, TypeDefinitionId::Scalar(_) | TypeDefinitionId::Enum(_))
    }
}

/// Types that can carry a selection set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompositeTypeId {
    Object(ObjectDefinitionId),
    Interface(InterfaceDefinitionId),
    Union(UnionDefinitionId),
}

impl CompositeTypeId {
    pub fn maybe_from(id: TypeDefinitionId) -> Option<Self> {
        match id {
            TypeDefinitionId::Object(id) => Some(CompositeTypeId::Object(id)),
            TypeDefinitionId::Interface(id) => Some(CompositeTypeId::Interface(id)),
            TypeDefinitionId::Union(id) => Some(CompositeTypeId::Union(id)),
            _ => None,
        }
    }
}

impl From<CompositeTypeId> for TypeDefinitionId {
    fn from(id: CompositeTypeId) -> Self {
        match id {
            CompositeTypeId::Object(id) => TypeDefinitionId::Object(id),
            CompositeTypeId::Interface(id) => TypeDefinitionId::Interface(id),
            CompositeTypeId::Union(id) => TypeDefinitionId::Union(id),
        }
    }
}
