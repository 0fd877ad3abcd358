//! The module under construction.
//!
//! [`ModuleBuilder`] owns every staged entity in flat arenas indexed by the typed ids of
//! [`crate::builder::ids`]. Types get their `TypeDef` row at definition time; members get a
//! pending token on first reference and a row when the module bakes. Reference rows are
//! handed out immediately through the module's [`MetadataScope`].

use log::debug;
use sha1::{Digest, Sha1};
use uguid::Guid;

use crate::{
    assembly::OpCode,
    builder::{
        entities::{
            BakeState, FieldEntry, MethodBodyState, MethodEntry, ParamEntry, PropertyEntry,
            TypeEntry, EventEntry, GenericParamEntry, Decorations,
        },
        identity::AssemblyRefInfo,
        scope::MetadataScope,
        Bakeable, BuilderConfig, EventId, FieldId, FieldTarget, GenericParamId, HasToken,
        MethodId, MethodTarget, ParamId, PropertyId, TokenTable, TypeId,
    },
    metadata::{
        customattributes::CustomAttributeBuilder,
        method::{EncodedMethodBody, MethodBodyEncoder},
        signatures::{
            encode_field_signature, encode_local_var_signature, encode_member_signature,
            encode_method_signature, encode_method_spec_signature, MemberSignature,
            SignatureField, SignatureMethod, SignatureMethodSpec, TypeHandle, TypeName,
            TypeResolver, TypeSignature,
        },
        tables::{
            attributes::{FieldAttributes, MethodAttributes, TypeAttributes},
            CodedIndexType, TableId,
        },
        token::{Token, TokenRef},
    },
    assembly::ILGenerator,
    utils::ByteBuffer,
    Error, Result,
};

macro_rules! arena_accessors {
    ($($field:ident: $entry:ty, $id:ty => $get:ident, $get_mut:ident;)*) => {
        $(
            pub(crate) fn $get(&self, id: $id) -> Result<&$entry> {
                self.$field.get(id.index()).ok_or_else(|| {
                    Error::InvalidState(format!("{} does not belong to module {}", id, self.name))
                })
            }

            pub(crate) fn $get_mut(&mut self, id: $id) -> Result<&mut $entry> {
                let name = &self.name;
                self.$field.get_mut(id.index()).ok_or_else(|| {
                    Error::InvalidState(format!("{} does not belong to module {}", id, name))
                })
            }
        )*
    };
}

/// A module being defined.
///
/// # Examples
///
/// ```rust
/// use dotemit::assembly::OpCode;
/// use dotemit::builder::{BuilderConfig, ModuleBuilder};
/// use dotemit::metadata::signatures::{SignatureMethod, TypeSignature};
/// use dotemit::metadata::tables::attributes::{MethodAttributes, TypeAttributes};
///
/// let mut module = ModuleBuilder::new("Calc.dll", BuilderConfig::default())?;
/// let calc = module.define_type("Demo", "Calc", TypeAttributes::PUBLIC, None)?;
/// let add = module.define_method(
///     calc,
///     "Add",
///     MethodAttributes::PUBLIC | MethodAttributes::HIDE_BY_SIG,
///     SignatureMethod::instance(TypeSignature::I4, vec![TypeSignature::I4, TypeSignature::I4]),
/// )?;
///
/// let mut il = module.il_generator(add)?;
/// il.emit_ldarg(1)?;
/// il.emit_ldarg(2)?;
/// il.emit(OpCode::ADD)?;
/// il.emit(OpCode::RET)?;
///
/// let emitted = module.bake()?;
/// assert_eq!(emitted.tables.type_def.len(), 2);
/// # Ok::<(), dotemit::Error>(())
/// ```
#[derive(Debug, Clone)]
pub struct ModuleBuilder {
    pub(crate) name: String,
    pub(crate) config: BuilderConfig,
    pub(crate) mvid: Guid,
    pub(crate) scope: MetadataScope,
    pub(crate) tokens: TokenTable,
    pub(crate) types: Vec<TypeEntry>,
    pub(crate) methods: Vec<MethodEntry>,
    pub(crate) fields: Vec<FieldEntry>,
    pub(crate) params: Vec<ParamEntry>,
    pub(crate) properties: Vec<PropertyEntry>,
    pub(crate) events: Vec<EventEntry>,
    pub(crate) generic_params: Vec<GenericParamEntry>,
    pub(crate) global_methods: Vec<MethodId>,
    pub(crate) global_fields: Vec<FieldId>,
    pub(crate) attributes: Vec<CustomAttributeBuilder>,
    pub(crate) field_data: ByteBuffer,
    pub(crate) data_types: Vec<(usize, TypeId)>,
    pub(crate) entry_point: Option<MethodId>,
    pub(crate) baked: bool,
}

impl Bakeable for ModuleBuilder {
    fn is_baked(&self) -> bool {
        self.baked
    }

    fn describe(&self) -> String {
        format!("module {}", self.name)
    }
}

impl ModuleBuilder {
    /// Create an empty module named `name`, referencing `mscorlib` as its core library.
    ///
    /// The module version id is derived from the name, so identical input yields identical
    /// output.
    ///
    /// # Errors
    /// Returns an error if `name` cannot be stored in the `#Strings` heap.
    pub fn new(name: impl Into<String>, config: BuilderConfig) -> Result<Self> {
        let name = name.into();
        let mut scope = MetadataScope::new(AssemblyRefInfo::mscorlib());
        scope.strings.add(&name)?;

        let mut hasher = Sha1::new();
        hasher.update(name.as_bytes());
        let digest = hasher.finalize();
        let mut bytes = [0u8; 16];
        bytes.copy_from_slice(&digest[..16]);
        let mvid = Guid::from_bytes(bytes);
        scope.guids.add(mvid);

        debug!("Created module {} ({})", name, mvid);
        Ok(ModuleBuilder {
            name,
            config,
            mvid,
            scope,
            tokens: TokenTable::new(),
            types: Vec::new(),
            methods: Vec::new(),
            fields: Vec::new(),
            params: Vec::new(),
            properties: Vec::new(),
            events: Vec::new(),
            generic_params: Vec::new(),
            global_methods: Vec::new(),
            global_fields: Vec::new(),
            attributes: Vec::new(),
            field_data: ByteBuffer::new(),
            data_types: Vec::new(),
            entry_point: None,
            baked: false,
        })
    }

    /// The module name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The module version id.
    #[must_use]
    pub fn mvid(&self) -> Guid {
        self.mvid
    }

    /// The configuration the module was created with.
    #[must_use]
    pub fn config(&self) -> &BuilderConfig {
        &self.config
    }

    /// Number of types defined so far, excluding `<Module>`.
    #[must_use]
    pub fn type_count(&self) -> usize {
        self.types.len()
    }

    /// Use `info` instead of `mscorlib` for core library type references.
    ///
    /// # Errors
    /// Returns [`Error::InvalidState`] once a core library type was referenced.
    pub fn set_core_library(&mut self, info: AssemblyRefInfo) -> Result<()> {
        self.ensure_open()?;
        self.scope.set_core_library(info)
    }

    arena_accessors! {
        types: TypeEntry, TypeId => type_entry, type_entry_mut;
        methods: MethodEntry, MethodId => method_entry, method_entry_mut;
        fields: FieldEntry, FieldId => field_entry, field_entry_mut;
        params: ParamEntry, ParamId => param_entry, param_entry_mut;
        properties: PropertyEntry, PropertyId => property_entry, property_entry_mut;
        events: EventEntry, EventId => event_entry, event_entry_mut;
        generic_params: GenericParamEntry, GenericParamId => generic_param_entry, generic_param_entry_mut;
    }

    /// A type that may still change.
    pub(crate) fn open_type(&mut self, id: TypeId) -> Result<&mut TypeEntry> {
        self.ensure_open()?;
        let entry = self.type_entry_mut(id)?;
        entry.ensure_open()?;
        Ok(entry)
    }

    /// A method that may still change.
    pub(crate) fn open_method(&mut self, id: MethodId) -> Result<&mut MethodEntry> {
        self.ensure_open()?;
        let entry = self.method_entry_mut(id)?;
        entry.ensure_open()?;
        Ok(entry)
    }

    /// A field whose owner may still change.
    pub(crate) fn open_field(&mut self, id: FieldId) -> Result<&mut FieldEntry> {
        self.ensure_open()?;
        if let Some(owner) = self.field_entry(id)?.owner {
            self.type_entry(owner)?.ensure_open()?;
        }
        self.field_entry_mut(id)
    }

    // ----- references -----

    /// The `TypeRef` of `namespace.name` in `scope` (a `Module`, `ModuleRef`, `AssemblyRef`
    /// or enclosing `TypeRef` token).
    ///
    /// # Errors
    /// Returns [`Error::InvalidCodedIndex`] if `scope` cannot be a resolution scope.
    pub fn import_type(&mut self, scope: Token, namespace: &str, name: &str) -> Result<Token> {
        self.ensure_open()?;
        CodedIndexType::ResolutionScope.encode(scope)?;
        self.scope.type_ref(scope, namespace, name)
    }

    /// The `AssemblyRef` of `info`, deduplicated by simple name.
    ///
    /// # Errors
    /// Returns an error if a name cannot be stored.
    pub fn assembly_ref(&mut self, info: &AssemblyRefInfo) -> Result<Token> {
        self.ensure_open()?;
        self.scope.assembly_ref(info)
    }

    /// The `ModuleRef` of the native or managed module `name`.
    ///
    /// # Errors
    /// Returns an error if the name cannot be stored.
    pub fn module_ref(&mut self, name: &str) -> Result<Token> {
        self.ensure_open()?;
        self.scope.module_ref(name)
    }

    /// The `TypeSpec` of a constructed type.
    ///
    /// # Errors
    /// Returns an error if the signature cannot be encoded.
    pub fn type_spec(&mut self, signature: &TypeSignature) -> Result<Token> {
        self.ensure_open()?;
        self.scope.type_spec(signature)
    }

    /// Resolve `handle` to a `TypeDef`, `TypeRef` or `TypeSpec` token.
    ///
    /// # Errors
    /// Returns [`Error::TypeLoad`] for ids of another module.
    pub fn type_token(&mut self, handle: impl Into<TypeHandle>) -> Result<Token> {
        self.scope.resolve_type(&handle.into())
    }

    /// The `MemberRef` of `name` on `parent`.
    ///
    /// # Errors
    /// Returns an error if the parent or the signature cannot be resolved.
    pub fn member_ref(
        &mut self,
        parent: impl Into<TypeHandle>,
        name: &str,
        signature: &MemberSignature,
    ) -> Result<Token> {
        self.ensure_open()?;
        let parent = self.scope.resolve_type(&parent.into())?;
        let blob = encode_member_signature(signature, &mut self.scope)?;
        self.scope.member_ref(TokenRef::Real(parent), name, &blob)
    }

    /// The `MethodSpec` instantiating the generic `method` with `generic_args`.
    ///
    /// # Errors
    /// Returns [`Error::NotSupported`] if a defined method's generic arity differs from the
    /// number of arguments.
    pub fn method_spec(
        &mut self,
        method: impl Into<MethodTarget>,
        generic_args: Vec<TypeSignature>,
    ) -> Result<Token> {
        self.ensure_open()?;
        let method = method.into();
        let arity = match &method {
            MethodTarget::Defined(id) => Some(self.method_entry(*id)?.signature.generic_param_count),
            MethodTarget::External { signature, .. } => Some(signature.generic_param_count),
            MethodTarget::Token(_) => None,
        };
        if let Some(arity) = arity {
            if arity as usize != generic_args.len() {
                return Err(Error::NotSupported(format!(
                    "Method has {} generic parameters, {} arguments given",
                    arity,
                    generic_args.len()
                )));
            }
        }

        let (token, _) = self.method_target_token(&method)?;
        let blob =
            encode_method_spec_signature(&SignatureMethodSpec { generic_args }, &mut self.scope)?;
        self.scope.method_spec(token, &blob)
    }

    /// The `StandAloneSig` describing a `calli` call site.
    ///
    /// # Errors
    /// Returns an error if the signature cannot be encoded.
    pub fn call_site_signature(&mut self, signature: &SignatureMethod) -> Result<Token> {
        self.ensure_open()?;
        let blob = encode_method_signature(signature, &mut self.scope)?;
        self.scope.stand_alone_sig(&blob)
    }

    /// The `#US` token of a string literal, as used by `ldstr`.
    ///
    /// # Errors
    /// Returns [`Error::HeapFull`] once the heap outgrows 24-bit offsets.
    pub fn user_string(&mut self, value: &str) -> Result<Token> {
        let index = self.scope.user_strings.add(value)?;
        if index > 0x00FF_FFFF {
            return Err(Error::HeapFull("#US"));
        }
        Ok(Token::from_parts(TableId::UserString, index))
    }

    /// The token IL uses for `method`; pending until the module bakes.
    ///
    /// # Errors
    /// Returns [`Error::InvalidState`] for an id of another module.
    pub fn method_token(&mut self, method: MethodId) -> Result<TokenRef> {
        let entry = self
            .methods
            .get_mut(method.index())
            .ok_or_else(|| Error::InvalidState(format!("{} is not defined", method)))?;
        entry.token_ref(&mut self.tokens)
    }

    /// The token IL uses for `field`; pending until the module bakes.
    ///
    /// # Errors
    /// Returns [`Error::InvalidState`] for an id of another module.
    pub fn field_token(&mut self, field: FieldId) -> Result<TokenRef> {
        let entry = self
            .fields
            .get_mut(field.index())
            .ok_or_else(|| Error::InvalidState(format!("{} is not defined", field)))?;
        entry.token_ref(&mut self.tokens)
    }

    /// The real token a reference ended up as.
    ///
    /// # Errors
    /// Returns [`Error::UnresolvedToken`] for pending tokens before baking.
    pub fn resolve_token(&self, token: TokenRef) -> Result<Token> {
        self.tokens.resolve_ref(token)
    }

    /// Token and, where known, signature of a method reference.
    pub(crate) fn method_target_token(
        &mut self,
        target: &MethodTarget,
    ) -> Result<(TokenRef, Option<SignatureMethod>)> {
        match target {
            MethodTarget::Defined(id) => {
                let signature = self.method_entry(*id)?.signature.clone();
                Ok((self.method_token(*id)?, Some(signature)))
            }
            MethodTarget::External {
                parent,
                name,
                signature,
            } => {
                let parent = self.scope.resolve_type(parent)?;
                let blob = encode_method_signature(signature, &mut self.scope)?;
                let token = self.scope.member_ref(TokenRef::Real(parent), name, &blob)?;
                Ok((TokenRef::Real(token), Some(signature.clone())))
            }
            MethodTarget::Token(token) => {
                if ![TableId::MethodDef, TableId::MemberRef, TableId::MethodSpec]
                    .iter()
                    .any(|table| token.is_table(*table))
                {
                    return Err(Error::NotSupported(format!("{} is not a method", token)));
                }
                Ok((TokenRef::Real(*token), None))
            }
        }
    }

    pub(crate) fn field_target_token(&mut self, target: &FieldTarget) -> Result<TokenRef> {
        match target {
            FieldTarget::Defined(id) => self.field_token(*id),
            FieldTarget::External {
                parent,
                name,
                signature,
            } => {
                let parent = self.scope.resolve_type(parent)?;
                let blob = encode_field_signature(signature, &mut self.scope)?;
                Ok(TokenRef::Real(self.scope.member_ref(
                    TokenRef::Real(parent),
                    name,
                    &blob,
                )?))
            }
            FieldTarget::Token(token) => {
                if !token.is_table(TableId::Field) && !token.is_table(TableId::MemberRef) {
                    return Err(Error::NotSupported(format!("{} is not a field", token)));
                }
                Ok(TokenRef::Real(*token))
            }
        }
    }

    // ----- types -----

    /// Define a top-level type.
    ///
    /// Classes without an explicit `parent` derive from `System.Object`; interfaces have none.
    ///
    /// # Errors
    /// Returns [`Error::InvalidState`] for a duplicate name and [`Error::AlreadyBaked`] after
    /// the module was baked.
    pub fn define_type(
        &mut self,
        namespace: &str,
        name: &str,
        flags: u32,
        parent: Option<TypeHandle>,
    ) -> Result<TypeId> {
        self.ensure_open()?;
        if flags & TypeAttributes::VISIBILITY_MASK > TypeAttributes::PUBLIC {
            return Err(Error::NotSupported(format!(
                "Top-level type {} cannot use nested visibility",
                name
            )));
        }
        if self
            .types
            .iter()
            .any(|t| t.enclosing.is_none() && t.namespace == namespace && t.name == name)
        {
            return Err(Error::InvalidState(format!(
                "Duplicate type name {}.{}",
                namespace, name
            )));
        }
        self.push_type(namespace, name, flags, parent, None)
    }

    /// Define a type nested in `enclosing`.
    ///
    /// `PUBLIC` and `NOT_PUBLIC` visibility map to their nested counterparts.
    ///
    /// # Errors
    /// Returns [`Error::AlreadyBaked`] if `enclosing` was already created.
    pub fn define_nested_type(
        &mut self,
        enclosing: TypeId,
        name: &str,
        flags: u32,
        parent: Option<TypeHandle>,
    ) -> Result<TypeId> {
        self.open_type(enclosing)?;
        let visibility = match flags & TypeAttributes::VISIBILITY_MASK {
            TypeAttributes::PUBLIC => TypeAttributes::NESTED_PUBLIC,
            TypeAttributes::NOT_PUBLIC => TypeAttributes::NESTED_PRIVATE,
            nested => nested,
        };
        if self
            .types
            .iter()
            .any(|t| t.enclosing == Some(enclosing) && t.name == name)
        {
            return Err(Error::InvalidState(format!(
                "Duplicate nested type name {}",
                name
            )));
        }
        let flags = (flags & !TypeAttributes::VISIBILITY_MASK) | visibility;
        self.push_type("", name, flags, parent, Some(enclosing))
    }

    /// Define an enum with the given integral `underlying` type.
    ///
    /// The enum receives its `value__` instance field immediately; members are added with
    /// [`ModuleBuilder::define_literal`].
    ///
    /// # Errors
    /// Returns [`Error::NotSupported`] if `underlying` is not an integral primitive.
    pub fn define_enum(
        &mut self,
        namespace: &str,
        name: &str,
        visibility: u32,
        underlying: TypeSignature,
    ) -> Result<TypeId> {
        let integral = matches!(
            underlying,
            TypeSignature::Boolean
                | TypeSignature::Char
                | TypeSignature::I1
                | TypeSignature::U1
                | TypeSignature::I2
                | TypeSignature::U2
                | TypeSignature::I4
                | TypeSignature::U4
                | TypeSignature::I8
                | TypeSignature::U8
                | TypeSignature::I
                | TypeSignature::U
        );
        if !integral {
            return Err(Error::NotSupported(format!(
                "{:?} cannot be the underlying type of an enum",
                underlying
            )));
        }

        let flags = (visibility & TypeAttributes::VISIBILITY_MASK) | TypeAttributes::SEALED;
        let parent = TypeHandle::Named(TypeName::core("System", "Enum"));
        let id = self.define_type(namespace, name, flags, Some(parent))?;
        self.type_entry_mut(id)?.is_enum = true;
        self.define_field(
            id,
            "value__",
            underlying,
            FieldAttributes::PUBLIC | FieldAttributes::SPECIAL_NAME | FieldAttributes::RT_SPECIAL_NAME,
        )?;
        Ok(id)
    }

    fn push_type(
        &mut self,
        namespace: &str,
        name: &str,
        flags: u32,
        parent: Option<TypeHandle>,
        enclosing: Option<TypeId>,
    ) -> Result<TypeId> {
        if name.is_empty() {
            return Err(Error::NotSupported("Type name must not be empty".to_string()));
        }
        self.scope.strings.add(namespace)?;
        self.scope.strings.add(name)?;

        let parent = match parent {
            Some(parent) => Some(parent),
            None if flags & TypeAttributes::INTERFACE != 0 => None,
            None => Some(TypeHandle::Named(TypeName::core("System", "Object"))),
        };
        if let Some(TypeHandle::Defined(parent)) = &parent {
            if self.type_entry(*parent)?.is_interface() {
                return Err(Error::TypeLoad(format!(
                    "{} cannot derive from an interface",
                    name
                )));
            }
        }

        let id = TypeId::from_index(self.types.len());
        let mut entry = TypeEntry::new(namespace.to_string(), name.to_string(), flags, parent);
        entry.enclosing = enclosing;
        debug!("Defined {} as {}", entry.full_name(), id);
        self.types.push(entry);
        self.scope.type_count = self.types.len();
        Ok(id)
    }

    /// Change the base type of `ty`.
    ///
    /// # Errors
    /// Returns [`Error::AlreadyBaked`] once `ty` was created.
    pub fn set_parent(&mut self, ty: TypeId, parent: Option<TypeHandle>) -> Result<()> {
        if parent == Some(TypeHandle::Defined(ty)) {
            return Err(Error::TypeLoad("A type cannot derive from itself".to_string()));
        }
        self.open_type(ty)?.parent = parent;
        Ok(())
    }

    // ----- global members -----

    /// Define a static method on `<Module>`.
    ///
    /// # Errors
    /// Returns an error if the signature cannot be encoded.
    pub fn define_global_method(
        &mut self,
        name: &str,
        flags: u16,
        mut signature: SignatureMethod,
    ) -> Result<MethodId> {
        self.ensure_open()?;
        if flags & (MethodAttributes::VIRTUAL | MethodAttributes::ABSTRACT) != 0 {
            return Err(Error::NotSupported(format!(
                "Global method {} cannot be virtual or abstract",
                name
            )));
        }
        signature.has_this = false;
        let id = self.push_method(None, name, flags | MethodAttributes::STATIC, signature)?;
        self.global_methods.push(id);
        Ok(id)
    }

    /// Define a static field on `<Module>` initialized with `data`.
    ///
    /// The field's type is a sealed value type of exactly `data.len()` bytes, shared by every
    /// data field of that size.
    ///
    /// # Errors
    /// Returns [`Error::NotSupported`] for empty data.
    pub fn define_initialized_data(&mut self, name: &str, data: &[u8], flags: u16) -> Result<FieldId> {
        self.ensure_open()?;
        if data.is_empty() {
            return Err(Error::NotSupported(
                "Initialized data must not be empty".to_string(),
            ));
        }
        let data_type = self.data_type(data.len())?;

        self.field_data.align(8);
        let rva = u32::try_from(self.field_data.len())
            .map_err(|_| Error::HeapFull("field data"))?;
        self.field_data.write_bytes(data);

        let field = self.push_field(
            None,
            name,
            TypeSignature::ValueType(TypeHandle::Defined(data_type)),
            (flags & !FieldAttributes::LITERAL) | FieldAttributes::STATIC | FieldAttributes::HAS_FIELD_RVA,
        )?;
        self.field_entry_mut(field)?.rva = Some(rva);
        self.global_fields.push(field);
        Ok(field)
    }

    /// Define a zero-filled static field of `size` bytes on `<Module>`.
    ///
    /// # Errors
    /// See [`ModuleBuilder::define_initialized_data`].
    pub fn define_uninitialized_data(&mut self, name: &str, size: usize, flags: u16) -> Result<FieldId> {
        self.define_initialized_data(name, &vec![0u8; size], flags)
    }

    fn data_type(&mut self, size: usize) -> Result<TypeId> {
        if let Some((_, id)) = self.data_types.iter().find(|(s, _)| *s == size) {
            return Ok(*id);
        }
        let class_size = u32::try_from(size).map_err(|_| Error::HeapFull("field data"))?;
        let id = self.push_type(
            "",
            &format!("__StaticArrayInitTypeSize={}", size),
            TypeAttributes::NOT_PUBLIC | TypeAttributes::EXPLICIT_LAYOUT | TypeAttributes::SEALED,
            Some(TypeHandle::Named(TypeName::core("System", "ValueType"))),
            None,
        )?;
        self.type_entry_mut(id)?.layout = Some((1, class_size));
        self.data_types.push((size, id));
        Ok(id)
    }

    /// Mark `method` as the entry point of the image.
    ///
    /// # Errors
    /// Returns [`Error::NotSupported`] for instance methods.
    pub fn set_entry_point(&mut self, method: MethodId) -> Result<()> {
        self.ensure_open()?;
        if !self.method_entry(method)?.is_static() {
            return Err(Error::NotSupported(
                "The entry point must be a static method".to_string(),
            ));
        }
        self.entry_point = Some(method);
        Ok(())
    }

    pub(crate) fn push_method(
        &mut self,
        owner: Option<TypeId>,
        name: &str,
        flags: u16,
        signature: SignatureMethod,
    ) -> Result<MethodId> {
        if name.is_empty() {
            return Err(Error::NotSupported("Method name must not be empty".to_string()));
        }
        self.scope.strings.add(name)?;
        let blob = encode_method_signature(&signature, &mut self.scope)?;
        let signature_blob = self.scope.blobs.add(&blob)?;

        let id = MethodId::from_index(self.methods.len());
        self.methods.push(MethodEntry {
            owner,
            name: name.to_string(),
            flags,
            impl_flags: 0,
            signature,
            signature_blob,
            params: Vec::new(),
            generic_params: Vec::new(),
            body: MethodBodyState::Empty,
            pinvoke: None,
            security: Vec::new(),
            decorations: Decorations::default(),
            token: None,
            baked: false,
        });
        if let Some(owner) = owner {
            self.type_entry_mut(owner)?.methods.push(id);
        }
        Ok(id)
    }

    pub(crate) fn push_field(
        &mut self,
        owner: Option<TypeId>,
        name: &str,
        field_type: TypeSignature,
        flags: u16,
    ) -> Result<FieldId> {
        if name.is_empty() {
            return Err(Error::NotSupported("Field name must not be empty".to_string()));
        }
        self.scope.strings.add(name)?;
        let signature = SignatureField::new(field_type);
        let blob = encode_field_signature(&signature, &mut self.scope)?;
        let signature_blob = self.scope.blobs.add(&blob)?;

        let id = FieldId::from_index(self.fields.len());
        self.fields.push(FieldEntry {
            owner,
            name: name.to_string(),
            flags,
            signature,
            signature_blob,
            offset: None,
            rva: None,
            decorations: Decorations::default(),
            token: None,
        });
        if let Some(owner) = owner {
            self.type_entry_mut(owner)?.fields.push(id);
        }
        Ok(id)
    }

    // ----- creation -----

    /// Validate and freeze `ty`, finishing the bodies of its methods.
    ///
    /// The enclosing type and an in-module base type are created first. A class without an
    /// instance constructor receives a parameterless one when the configuration asks for it.
    /// Creating a type twice returns the same token. A type whose creation failed stays open
    /// and can be created again.
    ///
    /// # Errors
    /// Returns [`Error::TypeLoad`] for circular inheritance, an enum without `value__`, or a
    /// base type without an accessible parameterless constructor when one must be synthesized.
    pub fn create_type(&mut self, ty: TypeId) -> Result<Token> {
        self.ensure_open()?;
        let token = self.scope.type_def(ty.index())?;
        match self.type_entry(ty)?.state {
            BakeState::Baked => return Ok(token),
            BakeState::Baking => {
                return Err(Error::TypeLoad(format!(
                    "Circular type hierarchy involving {}",
                    self.types[ty.index()].full_name()
                )));
            }
            BakeState::Open => {}
        }
        self.types[ty.index()].state = BakeState::Baking;
        if let Err(error) = self.create_type_members(ty) {
            self.types[ty.index()].state = BakeState::Open;
            return Err(error);
        }

        self.types[ty.index()].state = BakeState::Baked;
        debug!("Created type {} as {}", self.types[ty.index()].full_name(), token);
        Ok(token)
    }

    /// Create the dependencies of `ty` and finish its methods.
    fn create_type_members(&mut self, ty: TypeId) -> Result<()> {
        if let Some(enclosing) = self.types[ty.index()].enclosing {
            self.create_type(enclosing)?;
        }
        if let Some(TypeHandle::Defined(parent)) = self.types[ty.index()].parent {
            self.create_type(parent)?;
        }

        if self.is_enum(ty) {
            let has_value = self.types[ty.index()].fields.iter().any(|field| {
                let field = &self.fields[field.index()];
                field.name == "value__" && field.flags & FieldAttributes::STATIC == 0
            });
            if !has_value {
                return Err(Error::TypeLoad(format!(
                    "Enum {} has no value__ field",
                    self.types[ty.index()].full_name()
                )));
            }
        }

        if self.needs_default_constructor(ty) {
            self.synthesize_default_constructor(ty)?;
        }

        for method in self.types[ty.index()].methods.clone() {
            self.finish_method(method)?;
        }
        Ok(())
    }

    fn is_core(handle: &Option<TypeHandle>, name: &str) -> bool {
        matches!(handle, Some(TypeHandle::Named(n)) if n.assembly.is_none() && n.namespace == "System" && n.name == name)
    }

    pub(crate) fn is_enum(&self, ty: TypeId) -> bool {
        let entry = &self.types[ty.index()];
        entry.is_enum || Self::is_core(&entry.parent, "Enum")
    }

    pub(crate) fn is_value_type(&self, ty: TypeId) -> bool {
        let entry = &self.types[ty.index()];
        self.is_enum(ty) || Self::is_core(&entry.parent, "ValueType")
    }

    fn needs_default_constructor(&self, ty: TypeId) -> bool {
        let entry = &self.types[ty.index()];
        self.config.synthesize_default_constructors
            && entry.parent.is_some()
            && !entry.is_interface()
            && !entry.is_static_class()
            && !self.is_value_type(ty)
            && !entry
                .methods
                .iter()
                .any(|method| self.methods[method.index()].is_constructor())
    }

    fn synthesize_default_constructor(&mut self, ty: TypeId) -> Result<MethodId> {
        let access = if self.types[ty.index()].flags & TypeAttributes::ABSTRACT != 0 {
            MethodAttributes::FAMILY
        } else {
            MethodAttributes::PUBLIC
        };
        debug!(
            "Synthesizing default constructor for {}",
            self.types[ty.index()].full_name()
        );
        self.define_default_constructor(ty, access | MethodAttributes::HIDE_BY_SIG)
    }

    /// The parameterless constructor of `ty`'s base type.
    pub(crate) fn parent_constructor(&mut self, ty: TypeId) -> Result<MethodTarget> {
        let entry = self.type_entry(ty)?;
        let Some(parent) = entry.parent.clone() else {
            return Err(Error::TypeLoad(format!(
                "{} has no base type to construct",
                entry.full_name()
            )));
        };

        match parent {
            TypeHandle::Defined(parent) => {
                let find = |module: &ModuleBuilder| {
                    module.types[parent.index()].methods.iter().copied().find(|m| {
                        let method = &module.methods[m.index()];
                        method.is_constructor()
                            && method.signature.params.is_empty()
                            && method.flags & MethodAttributes::MEMBER_ACCESS_MASK
                                != MethodAttributes::PRIVATE
                    })
                };
                if let Some(ctor) = find(self) {
                    return Ok(MethodTarget::Defined(ctor));
                }
                if self.types[parent.index()].state == BakeState::Open
                    && self.needs_default_constructor(parent)
                {
                    return Ok(MethodTarget::Defined(
                        self.synthesize_default_constructor(parent)?,
                    ));
                }
                Err(Error::TypeLoad(format!(
                    "{} has no accessible parameterless constructor",
                    self.types[parent.index()].full_name()
                )))
            }
            other => Ok(MethodTarget::external(
                other,
                ".ctor",
                SignatureMethod::instance(TypeSignature::Void, Vec::new()),
            )),
        }
    }

    /// Emit `ldarg.0; call <base .ctor>; ret` into `ctor`.
    pub(crate) fn emit_base_constructor_call(&mut self, ctor: MethodId, base: MethodTarget) -> Result<()> {
        let mut il = self.il_generator(ctor)?;
        il.emit(OpCode::LDARG_0)?;
        il.emit_call(OpCode::CALL, base)?;
        il.emit(OpCode::RET)
    }

    /// Finish and encode the body of `method`, then freeze it.
    pub(crate) fn finish_method(&mut self, method: MethodId) -> Result<()> {
        let entry = self.method_entry_mut(method)?;
        if entry.baked {
            return Ok(());
        }
        let body = std::mem::replace(&mut entry.body, MethodBodyState::Empty);
        let body = match body {
            MethodBodyState::Generating(generator) => {
                match self.encode_body(generator.as_ref().clone()) {
                    Ok(encoded) => MethodBodyState::Encoded(encoded),
                    Err(error) => {
                        self.methods[method.index()].body = MethodBodyState::Generating(generator);
                        return Err(error);
                    }
                }
            }
            MethodBodyState::Empty if self.methods[method.index()].accepts_body() => {
                return Err(Error::InvalidState(format!(
                    "{} has no body",
                    self.methods[method.index()].describe()
                )));
            }
            other => other,
        };

        let entry = &mut self.methods[method.index()];
        entry.body = body;
        entry.baked = true;
        Ok(())
    }

    fn encode_body(&mut self, generator: ILGenerator) -> Result<EncodedMethodBody> {
        let finished = generator.finish()?;
        let local_signature = match finished.local_signature() {
            Some(locals) => {
                let blob = encode_local_var_signature(&locals, &mut self.scope)?;
                self.scope.stand_alone_sig(&blob)?.value()
            }
            None => 0,
        };

        let mut encoded = MethodBodyEncoder::new(&finished.code)
            .max_stack(self.config.max_stack_override.unwrap_or(finished.max_stack))
            .local_var_sig_token(local_signature)
            .init_locals(self.config.init_locals)
            .force_fat(self.config.force_fat_headers)
            .exception_handlers(finished.exception_handlers)
            .encode()?;

        let code_offset = encoded.code_offset;
        encoded.pending_tokens.extend(
            finished
                .pending_tokens
                .iter()
                .map(|(offset, pending)| (code_offset + *offset as usize, *pending)),
        );
        Ok(encoded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn module() -> Result<ModuleBuilder> {
        ModuleBuilder::new("Test.dll", BuilderConfig::default())
    }

    #[test]
    fn mvid_is_deterministic() -> Result<()> {
        assert_eq!(module()?.mvid(), module()?.mvid());
        assert_ne!(
            module()?.mvid(),
            ModuleBuilder::new("Other.dll", BuilderConfig::default())?.mvid()
        );
        Ok(())
    }

    #[test]
    fn type_rows_start_after_module() -> Result<()> {
        let mut module = module()?;
        let first = module.define_type("N", "A", TypeAttributes::PUBLIC, None)?;
        let second = module.define_type("N", "B", TypeAttributes::PUBLIC, None)?;
        assert_eq!(module.type_token(first)?, Token::new(0x0200_0002));
        assert_eq!(module.type_token(second)?, Token::new(0x0200_0003));
        Ok(())
    }

    #[test]
    fn duplicate_type_names_are_rejected() -> Result<()> {
        let mut module = module()?;
        module.define_type("N", "A", TypeAttributes::PUBLIC, None)?;
        assert!(matches!(
            module.define_type("N", "A", TypeAttributes::PUBLIC, None),
            Err(Error::InvalidState(_))
        ));
        module.define_type("M", "A", TypeAttributes::PUBLIC, None)?;
        Ok(())
    }

    #[test]
    fn nested_visibility_is_mapped() -> Result<()> {
        let mut module = module()?;
        let outer = module.define_type("N", "Outer", TypeAttributes::PUBLIC, None)?;
        let inner = module.define_nested_type(outer, "Inner", TypeAttributes::PUBLIC, None)?;
        let entry = module.type_entry(inner)?;
        assert_eq!(
            entry.flags & TypeAttributes::VISIBILITY_MASK,
            TypeAttributes::NESTED_PUBLIC
        );
        assert_eq!(entry.enclosing, Some(outer));
        assert!(entry.namespace.is_empty());
        Ok(())
    }

    #[test]
    fn circular_inheritance_fails() -> Result<()> {
        let mut module = module()?;
        let a = module.define_type("N", "A", TypeAttributes::PUBLIC, None)?;
        let b = module.define_type("N", "B", TypeAttributes::PUBLIC, Some(a.into()))?;
        module.set_parent(a, Some(b.into()))?;
        assert!(matches!(module.create_type(a), Err(Error::TypeLoad(_))));
        Ok(())
    }

    #[test]
    fn create_type_is_idempotent() -> Result<()> {
        let mut module = module()?;
        let ty = module.define_type("N", "A", TypeAttributes::PUBLIC, None)?;
        let first = module.create_type(ty)?;
        assert_eq!(module.create_type(ty)?, first);
        assert_eq!(module.type_entry(ty)?.methods.len(), 1);
        assert!(matches!(
            module.define_field(ty, "late", TypeSignature::I4, FieldAttributes::PUBLIC),
            Err(Error::AlreadyBaked(_))
        ));
        Ok(())
    }

    #[test]
    fn enum_without_value_field_fails() -> Result<()> {
        let mut module = module()?;
        let parent = TypeHandle::Named(TypeName::core("System", "Enum"));
        let ty = module.define_type("N", "Color", TypeAttributes::SEALED, Some(parent))?;
        assert!(matches!(module.create_type(ty), Err(Error::TypeLoad(_))));
        Ok(())
    }

    #[test]
    fn missing_parent_constructor_fails() -> Result<()> {
        let mut module = module()?;
        let base = module.define_type("N", "Base", TypeAttributes::PUBLIC, None)?;
        let ctor = module.define_constructor(
            base,
            MethodAttributes::PUBLIC,
            vec![TypeSignature::I4],
        )?;
        // tiny header, `ret`
        module.set_method_body(ctor, vec![0x06, 0x2A])?;
        let derived = module.define_type("N", "Derived", TypeAttributes::PUBLIC, Some(base.into()))?;
        assert!(matches!(
            module.create_type(derived),
            Err(Error::TypeLoad(_))
        ));
        Ok(())
    }

    #[test]
    fn methods_without_body_fail() -> Result<()> {
        let mut module = module()?;
        let ty = module.define_type("N", "A", TypeAttributes::PUBLIC, None)?;
        module.define_method(
            ty,
            "Run",
            MethodAttributes::PUBLIC,
            SignatureMethod::instance(TypeSignature::Void, Vec::new()),
        )?;
        assert!(matches!(
            module.create_type(ty),
            Err(Error::InvalidState(_))
        ));
        Ok(())
    }

    #[test]
    fn user_strings_use_table_0x70() -> Result<()> {
        let mut module = module()?;
        let token = module.user_string("hello")?;
        assert_eq!(token.table(), 0x70);
        assert_eq!(module.user_string("hello")?, token);
        Ok(())
    }

    #[test]
    fn initialized_data_shares_layout_types() -> Result<()> {
        let mut module = module()?;
        let a = module.define_initialized_data("a", &[1, 2, 3, 4], FieldAttributes::ASSEMBLY)?;
        let b = module.define_initialized_data("b", &[5, 6, 7, 8], FieldAttributes::ASSEMBLY)?;
        assert_eq!(module.type_count(), 1);
        assert_eq!(module.field_entry(a)?.rva, Some(0));
        assert_eq!(module.field_entry(b)?.rva, Some(8));
        assert_eq!(module.field_data.len(), 12);
        Ok(())
    }
}
