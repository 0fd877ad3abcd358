//! Staging records kept in the module arena until the module is baked.

use crate::{
    assembly::ILGenerator,
    builder::{
        ConstantValue, EventId, FieldId, GenericParamId, HasSignature, HasToken, Bakeable,
        MethodId, MethodTarget, ParamId, PropertyId, TypeId,
    },
    metadata::{
        customattributes::CustomAttributeBuilder,
        method::EncodedMethodBody,
        signatures::{
            encode_field_signature, encode_method_signature, encode_property_signature,
            SignatureField, SignatureMethod, SignatureProperty, TypeHandle, TypeResolver,
        },
        tables::{
            attributes::{MethodAttributes, MethodImplAttributes, TypeAttributes},
            TableId,
        },
        token::PendingId,
    },
    Result,
};

/// A `DeclSecurity` entry: action plus serialized permission set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SecurityEntry {
    pub action: u16,
    pub permission_set: Vec<u8>,
}

/// Attributes and security shared by every entity that can carry them.
#[derive(Debug, Clone, Default)]
pub(crate) struct Decorations {
    pub attributes: Vec<CustomAttributeBuilder>,
    pub marshal: Option<Vec<u8>>,
    pub constant: Option<ConstantValue>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BakeState {
    Open,
    Baking,
    Baked,
}

#[derive(Debug, Clone)]
pub(crate) struct TypeEntry {
    pub namespace: String,
    pub name: String,
    pub flags: u32,
    pub parent: Option<TypeHandle>,
    pub enclosing: Option<TypeId>,
    pub interfaces: Vec<TypeHandle>,
    pub fields: Vec<FieldId>,
    pub methods: Vec<MethodId>,
    pub properties: Vec<PropertyId>,
    pub events: Vec<EventId>,
    pub generic_params: Vec<GenericParamId>,
    pub layout: Option<(u16, u32)>,
    pub overrides: Vec<(MethodTarget, MethodTarget)>,
    pub security: Vec<SecurityEntry>,
    pub decorations: Decorations,
    pub is_enum: bool,
    pub state: BakeState,
}

impl TypeEntry {
    pub fn new(namespace: String, name: String, flags: u32, parent: Option<TypeHandle>) -> Self {
        TypeEntry {
            namespace,
            name,
            flags,
            parent,
            enclosing: None,
            interfaces: Vec::new(),
            fields: Vec::new(),
            methods: Vec::new(),
            properties: Vec::new(),
            events: Vec::new(),
            generic_params: Vec::new(),
            layout: None,
            overrides: Vec::new(),
            security: Vec::new(),
            decorations: Decorations::default(),
            is_enum: false,
            state: BakeState::Open,
        }
    }

    pub fn is_interface(&self) -> bool {
        self.flags & TypeAttributes::INTERFACE != 0
    }

    pub fn is_static_class(&self) -> bool {
        let both = TypeAttributes::ABSTRACT | TypeAttributes::SEALED;
        self.flags & both == both
    }

    pub fn full_name(&self) -> String {
        if self.namespace.is_empty() {
            self.name.clone()
        } else {
            format!("{}.{}", self.namespace, self.name)
        }
    }
}

impl Bakeable for TypeEntry {
    fn is_baked(&self) -> bool {
        self.state == BakeState::Baked
    }

    fn describe(&self) -> String {
        format!("type {}", self.full_name())
    }
}

/// Body of a method while it is staged.
#[derive(Debug, Clone)]
pub(crate) enum MethodBodyState {
    /// No body yet (abstract, extern or not written)
    Empty,
    /// IL is being generated
    Generating(Box<ILGenerator>),
    /// A complete body supplied by the caller
    Raw(Vec<u8>),
    /// Finished and encoded, waiting for layout
    Encoded(EncodedMethodBody),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct PInvokeEntry {
    pub flags: u16,
    pub entry_point: String,
    pub module_ref: u32,
}

#[derive(Debug, Clone)]
pub(crate) struct MethodEntry {
    pub owner: Option<TypeId>,
    pub name: String,
    pub flags: u16,
    pub impl_flags: u16,
    pub signature: SignatureMethod,
    pub signature_blob: u32,
    pub params: Vec<ParamId>,
    pub generic_params: Vec<GenericParamId>,
    pub body: MethodBodyState,
    pub pinvoke: Option<PInvokeEntry>,
    pub security: Vec<SecurityEntry>,
    pub decorations: Decorations,
    pub token: Option<PendingId>,
    pub baked: bool,
}

impl MethodEntry {
    pub fn is_constructor(&self) -> bool {
        self.name == ".ctor"
    }

    pub fn is_static(&self) -> bool {
        self.flags & MethodAttributes::STATIC != 0
    }

    /// Abstract, P/Invoke, runtime-implemented and internal calls carry no IL.
    pub fn accepts_body(&self) -> bool {
        self.flags & (MethodAttributes::ABSTRACT | MethodAttributes::PINVOKE_IMPL) == 0
            && self.impl_flags & MethodImplAttributes::CODE_TYPE_MASK
                != MethodImplAttributes::RUNTIME
            && self.impl_flags & MethodImplAttributes::INTERNAL_CALL == 0
    }
}

impl HasToken for MethodEntry {
    fn table(&self) -> TableId {
        TableId::MethodDef
    }

    fn token_slot(&mut self) -> &mut Option<PendingId> {
        &mut self.token
    }
}

impl HasSignature for MethodEntry {
    fn signature_blob(&self, resolver: &mut dyn TypeResolver) -> Result<Vec<u8>> {
        encode_method_signature(&self.signature, resolver)
    }
}

impl Bakeable for MethodEntry {
    fn is_baked(&self) -> bool {
        self.baked
    }

    fn describe(&self) -> String {
        format!("method {}", self.name)
    }
}

#[derive(Debug, Clone)]
pub(crate) struct FieldEntry {
    pub owner: Option<TypeId>,
    pub name: String,
    pub flags: u16,
    pub signature: SignatureField,
    pub signature_blob: u32,
    pub offset: Option<u32>,
    pub rva: Option<u32>,
    pub decorations: Decorations,
    pub token: Option<PendingId>,
}

impl HasToken for FieldEntry {
    fn table(&self) -> TableId {
        TableId::Field
    }

    fn token_slot(&mut self) -> &mut Option<PendingId> {
        &mut self.token
    }
}

impl HasSignature for FieldEntry {
    fn signature_blob(&self, resolver: &mut dyn TypeResolver) -> Result<Vec<u8>> {
        encode_field_signature(&self.signature, resolver)
    }
}

#[derive(Debug, Clone)]
pub(crate) struct ParamEntry {
    pub method: MethodId,
    pub sequence: u16,
    pub flags: u16,
    pub name: String,
    pub decorations: Decorations,
    pub token: Option<PendingId>,
}

impl HasToken for ParamEntry {
    fn table(&self) -> TableId {
        TableId::Param
    }

    fn token_slot(&mut self) -> &mut Option<PendingId> {
        &mut self.token
    }
}

#[derive(Debug, Clone)]
pub(crate) struct PropertyEntry {
    pub owner: TypeId,
    pub name: String,
    pub flags: u16,
    pub signature: SignatureProperty,
    pub getter: Option<MethodId>,
    pub setter: Option<MethodId>,
    pub others: Vec<MethodId>,
    pub decorations: Decorations,
    pub token: Option<PendingId>,
}

impl HasToken for PropertyEntry {
    fn table(&self) -> TableId {
        TableId::Property
    }

    fn token_slot(&mut self) -> &mut Option<PendingId> {
        &mut self.token
    }
}

impl HasSignature for PropertyEntry {
    fn signature_blob(&self, resolver: &mut dyn TypeResolver) -> Result<Vec<u8>> {
        encode_property_signature(&self.signature, resolver)
    }
}

#[derive(Debug, Clone)]
pub(crate) struct EventEntry {
    pub owner: TypeId,
    pub name: String,
    pub flags: u16,
    pub event_type: TypeHandle,
    pub add_on: Option<MethodId>,
    pub remove_on: Option<MethodId>,
    pub raise: Option<MethodId>,
    pub others: Vec<MethodId>,
    pub decorations: Decorations,
    pub token: Option<PendingId>,
}

impl HasToken for EventEntry {
    fn table(&self) -> TableId {
        TableId::Event
    }

    fn token_slot(&mut self) -> &mut Option<PendingId> {
        &mut self.token
    }
}

/// The type or method that declares a generic parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum GenericOwner {
    Type(TypeId),
    Method(MethodId),
}

#[derive(Debug, Clone)]
pub(crate) struct GenericParamEntry {
    pub owner: GenericOwner,
    pub number: u16,
    pub name: String,
    pub flags: u16,
    pub base_constraint: Option<TypeHandle>,
    pub interface_constraints: Vec<TypeHandle>,
    pub decorations: Decorations,
    pub token: Option<PendingId>,
}

impl HasToken for GenericParamEntry {
    fn table(&self) -> TableId {
        TableId::GenericParam
    }

    fn token_slot(&mut self) -> &mut Option<PendingId> {
        &mut self.token
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{builder::TokenTable, metadata::signatures::TypeSignature};

    fn field() -> FieldEntry {
        FieldEntry {
            owner: None,
            name: "count".to_string(),
            flags: 0,
            signature: SignatureField::new(TypeSignature::I4),
            signature_blob: 0,
            offset: None,
            rva: None,
            decorations: Decorations::default(),
            token: None,
        }
    }

    #[test]
    fn token_is_allocated_once() -> Result<()> {
        let mut tokens = TokenTable::new();
        let mut entry = field();
        let first = entry.token_ref(&mut tokens)?;
        let second = entry.token_ref(&mut tokens)?;
        assert_eq!(first, second);
        assert_eq!(tokens.len(), 1);
        assert_eq!(entry.table(), TableId::Field);
        Ok(())
    }

    #[test]
    fn static_class_detection() {
        let entry = TypeEntry::new(
            "N".to_string(),
            "Helpers".to_string(),
            TypeAttributes::ABSTRACT | TypeAttributes::SEALED,
            None,
        );
        assert!(entry.is_static_class());
        assert!(!entry.is_interface());
        assert!(entry.ensure_open().is_ok());
    }
}
