//! Members of defined types: methods, constructors, fields, properties, events, parameters and
//! generic parameters, plus everything that decorates them.
//!
//! Every operation checks that the module and the owning type are still open. Custom
//! attributes recognized as pseudo-attributes change flags and structural rows instead of
//! being stored (see [`PseudoAttribute`]).

use log::{debug, trace};

use crate::{
    builder::{
        entities::{
            Decorations, EventEntry, GenericOwner, GenericParamEntry, MethodBodyState,
            PInvokeEntry, ParamEntry, PropertyEntry, SecurityEntry,
        },
        AttributeTarget, Bakeable, ConstantValue, EventId, FieldId, GenericParamId, MethodId,
        MethodTarget, ModuleBuilder, ParamId, PropertyId, SemanticsOwner, TypeId,
    },
    metadata::{
        customattributes::{CustomAttributeBuilder, MarshalSpec, PseudoAttribute},
        method::MethodBody,
        signatures::{
            encode_method_signature, SignatureMethod, SignatureParameter, SignatureProperty,
            TypeHandle, TypeSignature,
        },
        tables::attributes::{
            EventAttributes, FieldAttributes, MethodAttributes, MethodImplAttributes,
            ParamAttributes, PropertyAttributes, TypeAttributes,
        },
    },
    Error, Result,
};

impl ModuleBuilder {
    fn ensure_owner_open(&self, owner: Option<TypeId>) -> Result<()> {
        self.ensure_open()?;
        if let Some(owner) = owner {
            self.type_entry(owner)?.ensure_open()?;
        }
        Ok(())
    }

    fn method_owner(&self, method: MethodId) -> Result<Option<TypeId>> {
        Ok(self.method_entry(method)?.owner)
    }

    fn generic_owner_type(&self, owner: GenericOwner) -> Result<Option<TypeId>> {
        match owner {
            GenericOwner::Type(ty) => Ok(Some(ty)),
            GenericOwner::Method(method) => self.method_owner(method),
        }
    }

    // ----- methods -----

    /// Define a method on `ty`.
    ///
    /// The `this` flag of `signature` follows `MethodAttributes::STATIC`.
    ///
    /// # Errors
    /// Returns [`Error::InvalidState`] for an abstract method on a concrete class and
    /// [`Error::AlreadyBaked`] once `ty` was created.
    pub fn define_method(
        &mut self,
        ty: TypeId,
        name: &str,
        flags: u16,
        mut signature: SignatureMethod,
    ) -> Result<MethodId> {
        let entry = self.open_type(ty)?;
        if flags & MethodAttributes::ABSTRACT != 0
            && entry.flags & (TypeAttributes::ABSTRACT | TypeAttributes::INTERFACE) == 0
        {
            return Err(Error::InvalidState(format!(
                "Abstract method {} on non-abstract type {}",
                name,
                entry.full_name()
            )));
        }
        signature.has_this = flags & MethodAttributes::STATIC == 0;
        self.push_method(Some(ty), name, flags, signature)
    }

    /// Define an instance constructor taking `params`.
    ///
    /// # Errors
    /// See [`ModuleBuilder::define_method`].
    pub fn define_constructor(
        &mut self,
        ty: TypeId,
        flags: u16,
        params: Vec<TypeSignature>,
    ) -> Result<MethodId> {
        let flags = (flags & !MethodAttributes::STATIC)
            | MethodAttributes::SPECIAL_NAME
            | MethodAttributes::RT_SPECIAL_NAME;
        self.define_method(
            ty,
            ".ctor",
            flags,
            SignatureMethod::instance(TypeSignature::Void, params),
        )
    }

    /// Define a parameterless constructor that only calls the base type's one.
    ///
    /// # Errors
    /// Returns [`Error::TypeLoad`] if the base type has no accessible parameterless constructor.
    pub fn define_default_constructor(&mut self, ty: TypeId, flags: u16) -> Result<MethodId> {
        self.open_type(ty)?;
        let base = self.parent_constructor(ty)?;
        let ctor = self.define_constructor(ty, flags, Vec::new())?;
        self.emit_base_constructor_call(ctor, base)?;
        Ok(ctor)
    }

    /// Define the static constructor `.cctor` of `ty`.
    ///
    /// # Errors
    /// Returns [`Error::InvalidState`] if `ty` already has one.
    pub fn define_type_initializer(&mut self, ty: TypeId) -> Result<MethodId> {
        self.open_type(ty)?;
        let exists = self.types[ty.index()]
            .methods
            .iter()
            .any(|method| self.methods[method.index()].name == ".cctor");
        if exists {
            return Err(Error::InvalidState(format!(
                "{} already has a type initializer",
                self.types[ty.index()].full_name()
            )));
        }
        self.push_method(
            Some(ty),
            ".cctor",
            MethodAttributes::PRIVATE
                | MethodAttributes::STATIC
                | MethodAttributes::SPECIAL_NAME
                | MethodAttributes::RT_SPECIAL_NAME
                | MethodAttributes::HIDE_BY_SIG,
            SignatureMethod::static_method(TypeSignature::Void, Vec::new()),
        )
    }

    /// Define a static method implemented in the native `library`.
    ///
    /// `entry_point` defaults to `name`.
    ///
    /// # Errors
    /// See [`ModuleBuilder::define_method`].
    #[allow(clippy::too_many_arguments)]
    pub fn define_pinvoke_method(
        &mut self,
        ty: TypeId,
        name: &str,
        library: &str,
        entry_point: Option<&str>,
        flags: u16,
        signature: SignatureMethod,
        pinvoke_flags: u16,
    ) -> Result<MethodId> {
        self.open_type(ty)?;
        let module_ref = self.scope.module_ref(library)?.row();
        let entry_point = entry_point.unwrap_or(name).to_string();
        self.scope.strings.add(&entry_point)?;

        let method = self.define_method(
            ty,
            name,
            flags | MethodAttributes::STATIC | MethodAttributes::PINVOKE_IMPL,
            signature,
        )?;
        let entry = &mut self.methods[method.index()];
        entry.impl_flags |= MethodImplAttributes::PRESERVE_SIG;
        entry.pinvoke = Some(PInvokeEntry {
            flags: pinvoke_flags,
            entry_point,
            module_ref,
        });
        Ok(method)
    }

    /// Make `method` generic over `names`.
    ///
    /// # Errors
    /// Returns [`Error::InvalidState`] if the method already has generic parameters.
    pub fn define_method_generic_parameters(
        &mut self,
        method: MethodId,
        names: &[&str],
    ) -> Result<Vec<GenericParamId>> {
        self.ensure_owner_open(self.method_owner(method)?)?;
        self.open_method(method)?;
        if !self.methods[method.index()].generic_params.is_empty() {
            return Err(Error::InvalidState(format!(
                "{} already has generic parameters",
                self.methods[method.index()].describe()
            )));
        }

        let mut signature = self.methods[method.index()].signature.clone();
        signature.generic_param_count = names.len() as u32;
        let blob = encode_method_signature(&signature, &mut self.scope)?;
        let signature_blob = self.scope.blobs.add(&blob)?;

        let ids = self.push_generic_params(GenericOwner::Method(method), names)?;
        let entry = &mut self.methods[method.index()];
        entry.signature = signature;
        entry.signature_blob = signature_blob;
        entry.generic_params = ids.clone();
        Ok(ids)
    }

    /// Name and attribute a parameter; `position` 0 is the return value.
    ///
    /// # Errors
    /// Returns [`Error::NotSupported`] for a position past the last parameter and
    /// [`Error::InvalidState`] if the position was already defined.
    pub fn define_parameter(
        &mut self,
        method: MethodId,
        position: u16,
        flags: u16,
        name: &str,
    ) -> Result<ParamId> {
        self.ensure_owner_open(self.method_owner(method)?)?;
        self.open_method(method)?;
        let entry = self.method_entry(method)?;
        if usize::from(position) > entry.signature.params.len() {
            return Err(Error::NotSupported(format!(
                "{} has no parameter {}",
                entry.describe(),
                position
            )));
        }
        let taken = entry
            .params
            .iter()
            .any(|param| self.params[param.index()].sequence == position);
        if taken {
            return Err(Error::InvalidState(format!(
                "Parameter {} of {} is already defined",
                position,
                self.methods[method.index()].describe()
            )));
        }

        self.scope.strings.add(name)?;
        let id = ParamId::from_index(self.params.len());
        self.params.push(ParamEntry {
            method,
            sequence: position,
            flags,
            name: name.to_string(),
            decorations: Decorations::default(),
            token: None,
        });
        self.methods[method.index()].params.push(id);
        Ok(id)
    }

    fn open_param(&mut self, param: ParamId) -> Result<&mut ParamEntry> {
        let method = self.param_entry(param)?.method;
        self.ensure_owner_open(self.method_owner(method)?)?;
        self.method_entry(method)?.ensure_open()?;
        self.param_entry_mut(param)
    }

    fn param_type(&self, param: ParamId) -> Result<SignatureParameter> {
        let entry = self.param_entry(param)?;
        let signature = &self.method_entry(entry.method)?.signature;
        match entry.sequence {
            0 => Ok(signature.return_type.clone()),
            n => signature
                .params
                .get(usize::from(n) - 1)
                .cloned()
                .ok_or_else(|| Error::InvalidState(format!("Parameter {} does not exist", n))),
        }
    }

    /// Give a parameter a default value.
    ///
    /// # Errors
    /// Returns [`Error::NotSupported`] if the value does not fit the parameter type.
    pub fn set_parameter_constant(&mut self, param: ParamId, value: ConstantValue) -> Result<()> {
        value.check_assignable(&self.param_type(param)?.base)?;
        let entry = self.open_param(param)?;
        entry.flags |= ParamAttributes::HAS_DEFAULT;
        entry.decorations.constant = Some(value);
        Ok(())
    }

    /// Attach a marshalling descriptor to a parameter.
    ///
    /// # Errors
    /// Returns an error if the descriptor cannot be encoded.
    pub fn set_parameter_marshal(&mut self, param: ParamId, spec: &MarshalSpec) -> Result<()> {
        let blob = spec.encode()?;
        let entry = self.open_param(param)?;
        entry.flags |= ParamAttributes::HAS_FIELD_MARSHAL;
        entry.decorations.marshal = Some(blob);
        Ok(())
    }

    /// Replace the `MethodImplAttributes` of `method`.
    ///
    /// # Errors
    /// Returns [`Error::AlreadyBaked`] once the method was created.
    pub fn set_implementation_flags(&mut self, method: MethodId, flags: u16) -> Result<()> {
        self.ensure_owner_open(self.method_owner(method)?)?;
        self.open_method(method)?.impl_flags = flags;
        Ok(())
    }

    /// Use `body`, a complete encoded method body starting with its header, for `method`.
    ///
    /// Token operands inside the body are taken as they are.
    ///
    /// # Errors
    /// Returns [`Error::InvalidState`] if IL is being generated for the method or the method
    /// cannot have a body, and [`Error::Malformed`] if `body` does not parse.
    pub fn set_method_body(&mut self, method: MethodId, body: Vec<u8>) -> Result<()> {
        self.ensure_owner_open(self.method_owner(method)?)?;
        let entry = self.open_method(method)?;
        if matches!(entry.body, MethodBodyState::Generating(_)) {
            return Err(Error::InvalidState(format!(
                "{} already has an IL generator",
                entry.describe()
            )));
        }
        if !entry.accepts_body() {
            return Err(Error::InvalidState(format!(
                "{} cannot have a body",
                entry.describe()
            )));
        }
        MethodBody::parse(&body)?;
        trace!("Raw body of {} bytes for {}", body.len(), entry.describe());
        entry.body = MethodBodyState::Raw(body);
        Ok(())
    }

    // ----- type level -----

    /// Record that `ty` implements `interface`.
    ///
    /// # Errors
    /// Returns [`Error::TypeLoad`] if a defined `interface` is not an interface.
    pub fn add_interface_implementation(
        &mut self,
        ty: TypeId,
        interface: impl Into<TypeHandle>,
    ) -> Result<()> {
        let interface = interface.into();
        if let TypeHandle::Defined(id) = &interface {
            let target = self.type_entry(*id)?;
            if !target.is_interface() {
                return Err(Error::TypeLoad(format!(
                    "{} is not an interface",
                    target.full_name()
                )));
            }
        }
        let entry = self.open_type(ty)?;
        if !entry.interfaces.contains(&interface) {
            entry.interfaces.push(interface);
        }
        Ok(())
    }

    /// Make `body` the implementation of `declaration` in `ty` (a `MethodImpl` row).
    ///
    /// # Errors
    /// Returns [`Error::InvalidState`] if a defined `body` belongs to another type.
    pub fn define_method_override(
        &mut self,
        ty: TypeId,
        body: impl Into<MethodTarget>,
        declaration: impl Into<MethodTarget>,
    ) -> Result<()> {
        let body = body.into();
        if let MethodTarget::Defined(method) = &body {
            if self.method_entry(*method)?.owner != Some(ty) {
                return Err(Error::InvalidState(format!(
                    "{} is not declared on the overriding type",
                    self.methods[method.index()].describe()
                )));
            }
        }
        self.open_type(ty)?.overrides.push((body, declaration.into()));
        Ok(())
    }

    /// Set field alignment and total size of `ty` (a `ClassLayout` row).
    ///
    /// # Errors
    /// Returns [`Error::NotSupported`] unless `packing` is 0 or a power of two up to 128.
    pub fn set_class_layout(&mut self, ty: TypeId, packing: u16, size: u32) -> Result<()> {
        if packing != 0 && (!packing.is_power_of_two() || packing > 128) {
            return Err(Error::NotSupported(format!(
                "Invalid packing size {}",
                packing
            )));
        }
        self.open_type(ty)?.layout = Some((packing, size));
        Ok(())
    }

    /// Attach a declarative security permission set to a type or method.
    ///
    /// # Errors
    /// Returns [`Error::NotSupported`] for other targets.
    pub fn add_declarative_security(
        &mut self,
        target: impl Into<AttributeTarget>,
        action: u16,
        permission_set: Vec<u8>,
    ) -> Result<()> {
        let security = SecurityEntry {
            action,
            permission_set,
        };
        match target.into() {
            AttributeTarget::Type(ty) => {
                let entry = self.open_type(ty)?;
                entry.flags |= TypeAttributes::HAS_SECURITY;
                entry.security.push(security);
            }
            AttributeTarget::Method(method) => {
                self.ensure_owner_open(self.method_owner(method)?)?;
                let entry = self.open_method(method)?;
                entry.flags |= MethodAttributes::HAS_SECURITY;
                entry.security.push(security);
            }
            other => {
                return Err(Error::NotSupported(format!(
                    "Declarative security cannot be applied to {:?}",
                    other
                )));
            }
        }
        Ok(())
    }

    // ----- fields -----

    /// Define a field on `ty`.
    ///
    /// # Errors
    /// Returns [`Error::AlreadyBaked`] once `ty` was created.
    pub fn define_field(
        &mut self,
        ty: TypeId,
        name: &str,
        field_type: TypeSignature,
        flags: u16,
    ) -> Result<FieldId> {
        self.open_type(ty)?;
        self.push_field(Some(ty), name, field_type, flags)
    }

    /// Define a public constant field, such as an enum member.
    ///
    /// # Errors
    /// Returns [`Error::NotSupported`] if `value` does not fit `field_type`.
    pub fn define_literal(
        &mut self,
        ty: TypeId,
        name: &str,
        field_type: TypeSignature,
        value: ConstantValue,
    ) -> Result<FieldId> {
        value.check_assignable(&field_type)?;
        let field = self.define_field(
            ty,
            name,
            field_type,
            FieldAttributes::PUBLIC
                | FieldAttributes::STATIC
                | FieldAttributes::LITERAL
                | FieldAttributes::HAS_DEFAULT,
        )?;
        self.fields[field.index()].decorations.constant = Some(value);
        Ok(field)
    }

    /// Place `field` at a fixed byte offset (a `FieldLayout` row).
    ///
    /// # Errors
    /// Returns [`Error::NotSupported`] for static fields.
    pub fn set_field_offset(&mut self, field: FieldId, offset: u32) -> Result<()> {
        let entry = self.open_field(field)?;
        if entry.flags & FieldAttributes::STATIC != 0 {
            return Err(Error::NotSupported(format!(
                "Static field {} cannot have an offset",
                entry.name
            )));
        }
        entry.offset = Some(offset);
        Ok(())
    }

    /// Give `field` a default value.
    ///
    /// # Errors
    /// Returns [`Error::NotSupported`] if the value does not fit the field type.
    pub fn set_field_constant(&mut self, field: FieldId, value: ConstantValue) -> Result<()> {
        let entry = self.open_field(field)?;
        value.check_assignable(&entry.signature.base)?;
        entry.flags |= FieldAttributes::HAS_DEFAULT;
        entry.decorations.constant = Some(value);
        Ok(())
    }

    /// Attach a marshalling descriptor to `field`.
    ///
    /// # Errors
    /// Returns an error if the descriptor cannot be encoded.
    pub fn set_field_marshal(&mut self, field: FieldId, spec: &MarshalSpec) -> Result<()> {
        let blob = spec.encode()?;
        let entry = self.open_field(field)?;
        entry.flags |= FieldAttributes::HAS_FIELD_MARSHAL;
        entry.decorations.marshal = Some(blob);
        Ok(())
    }

    // ----- properties and events -----

    /// Define a property of `property_type`, indexed by `params`.
    ///
    /// # Errors
    /// Returns [`Error::AlreadyBaked`] once `ty` was created.
    pub fn define_property(
        &mut self,
        ty: TypeId,
        name: &str,
        flags: u16,
        property_type: TypeSignature,
        params: Vec<TypeSignature>,
    ) -> Result<PropertyId> {
        self.open_type(ty)?;
        self.scope.strings.add(name)?;
        let id = PropertyId::from_index(self.properties.len());
        self.properties.push(PropertyEntry {
            owner: ty,
            name: name.to_string(),
            flags,
            signature: SignatureProperty {
                has_this: true,
                modifiers: Vec::new(),
                base: property_type,
                params: params.into_iter().map(SignatureParameter::new).collect(),
            },
            getter: None,
            setter: None,
            others: Vec::new(),
            decorations: Decorations::default(),
            token: None,
        });
        self.types[ty.index()].properties.push(id);
        Ok(id)
    }

    /// Define an event whose handlers are of `event_type`.
    ///
    /// # Errors
    /// Returns [`Error::AlreadyBaked`] once `ty` was created.
    pub fn define_event(
        &mut self,
        ty: TypeId,
        name: &str,
        flags: u16,
        event_type: impl Into<TypeHandle>,
    ) -> Result<EventId> {
        self.open_type(ty)?;
        self.scope.strings.add(name)?;
        let id = EventId::from_index(self.events.len());
        self.events.push(EventEntry {
            owner: ty,
            name: name.to_string(),
            flags,
            event_type: event_type.into(),
            add_on: None,
            remove_on: None,
            raise: None,
            others: Vec::new(),
            decorations: Decorations::default(),
            token: None,
        });
        self.types[ty.index()].events.push(id);
        Ok(id)
    }

    fn accessor(&self, owner: TypeId, method: MethodId) -> Result<MethodId> {
        self.ensure_owner_open(Some(owner))?;
        if self.method_entry(method)?.owner != Some(owner) {
            return Err(Error::InvalidState(format!(
                "{} is not declared on {}",
                self.methods[method.index()].describe(),
                self.types[owner.index()].full_name()
            )));
        }
        Ok(method)
    }

    fn set_property_accessor(
        &mut self,
        property: PropertyId,
        method: MethodId,
        getter: bool,
    ) -> Result<()> {
        let owner = self.property_entry(property)?.owner;
        let method = self.accessor(owner, method)?;
        let has_this = !self.methods[method.index()].is_static();
        let entry = &mut self.properties[property.index()];
        entry.signature.has_this = has_this;
        if getter {
            entry.getter = Some(method);
        } else {
            entry.setter = Some(method);
        }
        Ok(())
    }

    /// Make `method` the getter of `property`.
    ///
    /// # Errors
    /// Returns [`Error::InvalidState`] if the method is declared on another type.
    pub fn set_get_method(&mut self, property: PropertyId, method: MethodId) -> Result<()> {
        self.set_property_accessor(property, method, true)
    }

    /// Make `method` the setter of `property`.
    ///
    /// # Errors
    /// Returns [`Error::InvalidState`] if the method is declared on another type.
    pub fn set_set_method(&mut self, property: PropertyId, method: MethodId) -> Result<()> {
        self.set_property_accessor(property, method, false)
    }

    fn event_accessor(&mut self, event: EventId, method: MethodId) -> Result<&mut EventEntry> {
        let owner = self.event_entry(event)?.owner;
        self.accessor(owner, method)?;
        self.event_entry_mut(event)
    }

    /// Make `method` the `add` accessor of `event`.
    ///
    /// # Errors
    /// Returns [`Error::InvalidState`] if the method is declared on another type.
    pub fn set_add_on_method(&mut self, event: EventId, method: MethodId) -> Result<()> {
        self.event_accessor(event, method)?.add_on = Some(method);
        Ok(())
    }

    /// Make `method` the `remove` accessor of `event`.
    ///
    /// # Errors
    /// Returns [`Error::InvalidState`] if the method is declared on another type.
    pub fn set_remove_on_method(&mut self, event: EventId, method: MethodId) -> Result<()> {
        self.event_accessor(event, method)?.remove_on = Some(method);
        Ok(())
    }

    /// Make `method` the `raise` accessor of `event`.
    ///
    /// # Errors
    /// Returns [`Error::InvalidState`] if the method is declared on another type.
    pub fn set_raise_method(&mut self, event: EventId, method: MethodId) -> Result<()> {
        self.event_accessor(event, method)?.raise = Some(method);
        Ok(())
    }

    /// Add `method` to the other accessors of a property or event.
    ///
    /// # Errors
    /// Returns [`Error::InvalidState`] if the method is declared on another type.
    pub fn add_other_method(
        &mut self,
        owner: impl Into<SemanticsOwner>,
        method: MethodId,
    ) -> Result<()> {
        match owner.into() {
            SemanticsOwner::Property(property) => {
                let ty = self.property_entry(property)?.owner;
                self.accessor(ty, method)?;
                self.properties[property.index()].others.push(method);
            }
            SemanticsOwner::Event(event) => {
                self.event_accessor(event, method)?.others.push(method);
            }
        }
        Ok(())
    }

    /// Give `property` a default value.
    ///
    /// # Errors
    /// Returns [`Error::NotSupported`] if the value does not fit the property type.
    pub fn set_property_constant(
        &mut self,
        property: PropertyId,
        value: ConstantValue,
    ) -> Result<()> {
        let owner = self.property_entry(property)?.owner;
        self.ensure_owner_open(Some(owner))?;
        let entry = &mut self.properties[property.index()];
        value.check_assignable(&entry.signature.base)?;
        entry.flags |= PropertyAttributes::HAS_DEFAULT;
        entry.decorations.constant = Some(value);
        Ok(())
    }

    // ----- generic parameters -----

    /// Make `ty` generic over `names`.
    ///
    /// # Errors
    /// Returns [`Error::InvalidState`] if the type already has generic parameters.
    pub fn define_generic_parameters(
        &mut self,
        ty: TypeId,
        names: &[&str],
    ) -> Result<Vec<GenericParamId>> {
        let entry = self.open_type(ty)?;
        if !entry.generic_params.is_empty() {
            return Err(Error::InvalidState(format!(
                "{} already has generic parameters",
                entry.full_name()
            )));
        }
        let ids = self.push_generic_params(GenericOwner::Type(ty), names)?;
        self.types[ty.index()].generic_params = ids.clone();
        Ok(ids)
    }

    fn push_generic_params(
        &mut self,
        owner: GenericOwner,
        names: &[&str],
    ) -> Result<Vec<GenericParamId>> {
        if names.is_empty() {
            return Err(Error::NotSupported(
                "At least one generic parameter is required".to_string(),
            ));
        }
        let mut ids = Vec::with_capacity(names.len());
        for (number, name) in names.iter().enumerate() {
            let number = u16::try_from(number).map_err(|_| {
                Error::NotSupported("Too many generic parameters".to_string())
            })?;
            self.scope.strings.add(name)?;
            ids.push(GenericParamId::from_index(self.generic_params.len()));
            self.generic_params.push(GenericParamEntry {
                owner,
                number,
                name: (*name).to_string(),
                flags: 0,
                base_constraint: None,
                interface_constraints: Vec::new(),
                decorations: Decorations::default(),
                token: None,
            });
        }
        Ok(ids)
    }

    fn open_generic_param(&mut self, param: GenericParamId) -> Result<&mut GenericParamEntry> {
        let owner = self.generic_param_entry(param)?.owner;
        self.ensure_owner_open(self.generic_owner_type(owner)?)?;
        self.generic_param_entry_mut(param)
    }

    /// Set variance and special constraint flags of a generic parameter.
    ///
    /// # Errors
    /// Returns [`Error::AlreadyBaked`] once the owner was created.
    pub fn set_generic_parameter_attributes(
        &mut self,
        param: GenericParamId,
        flags: u16,
    ) -> Result<()> {
        self.open_generic_param(param)?.flags = flags;
        Ok(())
    }

    /// Require type arguments of `param` to derive from `base`.
    ///
    /// # Errors
    /// Returns [`Error::AlreadyBaked`] once the owner was created.
    pub fn set_base_type_constraint(
        &mut self,
        param: GenericParamId,
        base: Option<TypeHandle>,
    ) -> Result<()> {
        self.open_generic_param(param)?.base_constraint = base;
        Ok(())
    }

    /// Require type arguments of `param` to implement `interfaces`.
    ///
    /// # Errors
    /// Returns [`Error::AlreadyBaked`] once the owner was created.
    pub fn set_interface_constraints(
        &mut self,
        param: GenericParamId,
        interfaces: Vec<TypeHandle>,
    ) -> Result<()> {
        self.open_generic_param(param)?.interface_constraints = interfaces;
        Ok(())
    }

    // ----- custom attributes -----

    /// Apply `attribute` to `target`.
    ///
    /// Pseudo-attributes such as `StructLayout`, `DllImport` or `MarshalAs` set flags and
    /// structural rows instead of producing a `CustomAttribute` row.
    ///
    /// # Errors
    /// Returns [`Error::NotSupported`] if the constructor is not a `.ctor` or a pseudo-attribute
    /// does not apply to `target`, and [`Error::AlreadyBaked`] once the target's owner was
    /// created.
    pub fn set_custom_attribute(
        &mut self,
        target: impl Into<AttributeTarget>,
        attribute: CustomAttributeBuilder,
    ) -> Result<()> {
        let target = target.into();
        self.ensure_target_open(target)?;
        self.check_attribute_constructor(attribute.constructor())?;
        attribute.blob()?;

        if let Some(pseudo) = self.recognize_pseudo(&attribute)? {
            debug!("Applying pseudo-attribute {:?} to {:?}", pseudo, target);
            return self.apply_pseudo(target, pseudo);
        }

        let decorations = match target {
            AttributeTarget::Module => {
                self.attributes.push(attribute);
                return Ok(());
            }
            AttributeTarget::Type(ty) => &mut self.type_entry_mut(ty)?.decorations,
            AttributeTarget::Method(method) => &mut self.method_entry_mut(method)?.decorations,
            AttributeTarget::Field(field) => &mut self.field_entry_mut(field)?.decorations,
            AttributeTarget::Param(param) => &mut self.param_entry_mut(param)?.decorations,
            AttributeTarget::Property(property) => {
                &mut self.property_entry_mut(property)?.decorations
            }
            AttributeTarget::Event(event) => &mut self.event_entry_mut(event)?.decorations,
            AttributeTarget::GenericParam(param) => {
                &mut self.generic_param_entry_mut(param)?.decorations
            }
        };
        decorations.attributes.push(attribute);
        Ok(())
    }

    fn ensure_target_open(&self, target: AttributeTarget) -> Result<()> {
        match target {
            AttributeTarget::Module => self.ensure_open(),
            AttributeTarget::Type(ty) => self.ensure_owner_open(Some(ty)),
            AttributeTarget::Method(method) => {
                self.ensure_owner_open(self.method_owner(method)?)?;
                self.method_entry(method)?.ensure_open()
            }
            AttributeTarget::Field(field) => {
                self.ensure_owner_open(self.field_entry(field)?.owner)
            }
            AttributeTarget::Param(param) => {
                let method = self.param_entry(param)?.method;
                self.ensure_owner_open(self.method_owner(method)?)?;
                self.method_entry(method)?.ensure_open()
            }
            AttributeTarget::Property(property) => {
                self.ensure_owner_open(Some(self.property_entry(property)?.owner))
            }
            AttributeTarget::Event(event) => {
                self.ensure_owner_open(Some(self.event_entry(event)?.owner))
            }
            AttributeTarget::GenericParam(param) => {
                let owner = self.generic_param_entry(param)?.owner;
                self.ensure_owner_open(self.generic_owner_type(owner)?)
            }
        }
    }

    fn check_attribute_constructor(&self, constructor: &MethodTarget) -> Result<()> {
        let is_ctor = match constructor {
            MethodTarget::Defined(method) => self.method_entry(*method)?.is_constructor(),
            MethodTarget::External { name, .. } => name == ".ctor",
            MethodTarget::Token(_) => true,
        };
        if is_ctor {
            Ok(())
        } else {
            Err(Error::NotSupported(
                "Custom attributes must be constructed through a .ctor".to_string(),
            ))
        }
    }

    fn recognize_pseudo(&self, attribute: &CustomAttributeBuilder) -> Result<Option<PseudoAttribute>> {
        let Some(value) = attribute.value() else {
            return Ok(None);
        };
        match attribute.constructor() {
            MethodTarget::External {
                parent: TypeHandle::Named(name),
                ..
            } => PseudoAttribute::recognize(&name.namespace, &name.name, value),
            MethodTarget::Defined(method) => match self.method_entry(*method)?.owner {
                Some(owner) => {
                    let owner = self.type_entry(owner)?;
                    PseudoAttribute::recognize(&owner.namespace, &owner.name, value)
                }
                None => Ok(None),
            },
            _ => Ok(None),
        }
    }

    fn apply_pseudo(&mut self, target: AttributeTarget, pseudo: PseudoAttribute) -> Result<()> {
        match (target, pseudo) {
            (
                AttributeTarget::Type(ty),
                PseudoAttribute::StructLayout {
                    layout,
                    string_format,
                    pack,
                    size,
                },
            ) => {
                let entry = self.type_entry_mut(ty)?;
                entry.flags &= !(TypeAttributes::LAYOUT_MASK | TypeAttributes::STRING_FORMAT_MASK);
                entry.flags |= layout | string_format;
                if pack.is_some() || size.is_some() {
                    entry.layout = Some((pack.unwrap_or(0), size.unwrap_or(0)));
                }
            }
            (AttributeTarget::Type(ty), PseudoAttribute::SpecialName) => {
                self.type_entry_mut(ty)?.flags |= TypeAttributes::SPECIAL_NAME;
            }
            (AttributeTarget::Type(ty), PseudoAttribute::Serializable) => {
                self.type_entry_mut(ty)?.flags |= TypeAttributes::SERIALIZABLE;
            }
            (AttributeTarget::Type(ty), PseudoAttribute::ComImport) => {
                self.type_entry_mut(ty)?.flags |= TypeAttributes::IMPORT;
            }
            (
                AttributeTarget::Method(method),
                PseudoAttribute::DllImport {
                    library,
                    entry_point,
                    flags,
                    preserve_sig,
                },
            ) => {
                let entry = self.method_entry(method)?;
                if !matches!(entry.body, MethodBodyState::Empty) {
                    return Err(Error::InvalidState(format!(
                        "{} already has a body",
                        entry.describe()
                    )));
                }
                let entry_point = entry_point.unwrap_or_else(|| entry.name.clone());
                self.scope.strings.add(&entry_point)?;
                let module_ref = self.scope.module_ref(&library)?.row();

                let entry = self.method_entry_mut(method)?;
                entry.flags |= MethodAttributes::PINVOKE_IMPL;
                if preserve_sig {
                    entry.impl_flags |= MethodImplAttributes::PRESERVE_SIG;
                }
                entry.pinvoke = Some(PInvokeEntry {
                    flags,
                    entry_point,
                    module_ref,
                });
            }
            (AttributeTarget::Method(method), pseudo @ PseudoAttribute::MethodImpl(_))
            | (AttributeTarget::Method(method), pseudo @ PseudoAttribute::PreserveSig) => {
                let bits = pseudo.method_impl_flags().unwrap_or(0);
                self.method_entry_mut(method)?.impl_flags |= bits;
            }
            (AttributeTarget::Method(method), PseudoAttribute::SpecialName) => {
                self.method_entry_mut(method)?.flags |= MethodAttributes::SPECIAL_NAME;
            }
            (AttributeTarget::Field(field), PseudoAttribute::FieldOffset(offset)) => {
                self.set_field_offset(field, offset)?;
            }
            (AttributeTarget::Field(field), PseudoAttribute::MarshalAs(spec)) => {
                self.set_field_marshal(field, &spec)?;
            }
            (AttributeTarget::Field(field), PseudoAttribute::NonSerialized) => {
                self.field_entry_mut(field)?.flags |= FieldAttributes::NOT_SERIALIZED;
            }
            (AttributeTarget::Field(field), PseudoAttribute::SpecialName) => {
                self.field_entry_mut(field)?.flags |= FieldAttributes::SPECIAL_NAME;
            }
            (AttributeTarget::Param(param), PseudoAttribute::MarshalAs(spec)) => {
                self.set_parameter_marshal(param, &spec)?;
            }
            (AttributeTarget::Param(param), PseudoAttribute::In) => {
                self.param_entry_mut(param)?.flags |= ParamAttributes::IN;
            }
            (AttributeTarget::Param(param), PseudoAttribute::Out) => {
                self.param_entry_mut(param)?.flags |= ParamAttributes::OUT;
            }
            (AttributeTarget::Param(param), PseudoAttribute::Optional) => {
                self.param_entry_mut(param)?.flags |= ParamAttributes::OPTIONAL;
            }
            (AttributeTarget::Property(property), PseudoAttribute::SpecialName) => {
                self.property_entry_mut(property)?.flags |= PropertyAttributes::SPECIAL_NAME;
            }
            (AttributeTarget::Event(event), PseudoAttribute::SpecialName) => {
                self.event_entry_mut(event)?.flags |= EventAttributes::SPECIAL_NAME;
            }
            (target, pseudo) => {
                return Err(Error::NotSupported(format!(
                    "{:?} cannot be applied to {:?}",
                    pseudo, target
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        builder::BuilderConfig,
        metadata::{
            customattributes::{CustomAttributeArgument, CustomAttributeType, NATIVE_TYPE},
            signatures::TypeName,
        },
    };

    fn module() -> Result<ModuleBuilder> {
        ModuleBuilder::new("Members.dll", BuilderConfig::default())
    }

    fn interop_ctor(name: &str, params: Vec<TypeSignature>) -> MethodTarget {
        MethodTarget::external(
            TypeName::core("System.Runtime.InteropServices", name),
            ".ctor",
            SignatureMethod::instance(TypeSignature::Void, params),
        )
    }

    #[test]
    fn abstract_methods_need_abstract_types() -> Result<()> {
        let mut module = module()?;
        let concrete = module.define_type("N", "C", TypeAttributes::PUBLIC, None)?;
        let sig = SignatureMethod::instance(TypeSignature::Void, Vec::new());
        assert!(matches!(
            module.define_method(
                concrete,
                "Run",
                MethodAttributes::PUBLIC | MethodAttributes::ABSTRACT | MethodAttributes::VIRTUAL,
                sig.clone()
            ),
            Err(Error::InvalidState(_))
        ));

        let abstract_type = module.define_type(
            "N",
            "A",
            TypeAttributes::PUBLIC | TypeAttributes::ABSTRACT,
            None,
        )?;
        let method = module.define_method(
            abstract_type,
            "Run",
            MethodAttributes::PUBLIC | MethodAttributes::ABSTRACT | MethodAttributes::VIRTUAL,
            sig,
        )?;
        assert!(!module.method_entry(method)?.accepts_body());
        assert!(module.il_generator(method).is_err());
        Ok(())
    }

    #[test]
    fn static_flag_drives_has_this() -> Result<()> {
        let mut module = module()?;
        let ty = module.define_type("N", "C", TypeAttributes::PUBLIC, None)?;
        let method = module.define_method(
            ty,
            "Create",
            MethodAttributes::PUBLIC | MethodAttributes::STATIC,
            SignatureMethod::instance(TypeSignature::Object, Vec::new()),
        )?;
        assert!(!module.method_entry(method)?.signature.has_this);
        Ok(())
    }

    #[test]
    fn type_initializer_is_unique() -> Result<()> {
        let mut module = module()?;
        let ty = module.define_type("N", "C", TypeAttributes::PUBLIC, None)?;
        let cctor = module.define_type_initializer(ty)?;
        assert!(module.method_entry(cctor)?.is_static());
        assert!(matches!(
            module.define_type_initializer(ty),
            Err(Error::InvalidState(_))
        ));
        Ok(())
    }

    #[test]
    fn parameters_are_bounded_and_unique() -> Result<()> {
        let mut module = module()?;
        let ty = module.define_type("N", "C", TypeAttributes::PUBLIC, None)?;
        let method = module.define_method(
            ty,
            "Add",
            MethodAttributes::PUBLIC,
            SignatureMethod::instance(TypeSignature::I4, vec![TypeSignature::I4]),
        )?;
        let param = module.define_parameter(method, 1, ParamAttributes::OPTIONAL, "a")?;
        assert!(matches!(
            module.define_parameter(method, 1, 0, "b"),
            Err(Error::InvalidState(_))
        ));
        assert!(matches!(
            module.define_parameter(method, 2, 0, "c"),
            Err(Error::NotSupported(_))
        ));

        module.set_parameter_constant(param, ConstantValue::I4(5))?;
        assert!(module
            .set_parameter_constant(param, ConstantValue::String("x".to_string()))
            .is_err());
        assert_ne!(
            module.param_entry(param)?.flags & ParamAttributes::HAS_DEFAULT,
            0
        );
        Ok(())
    }

    #[test]
    fn raw_bodies_are_validated() -> Result<()> {
        let mut module = module()?;
        let ty = module.define_type("N", "C", TypeAttributes::PUBLIC, None)?;
        let method = module.define_method(
            ty,
            "Run",
            MethodAttributes::PUBLIC,
            SignatureMethod::instance(TypeSignature::Void, Vec::new()),
        )?;
        // tiny header announcing 4 code bytes, only one present
        assert!(module.set_method_body(method, vec![0x12, 0x2A]).is_err());
        module.set_method_body(method, vec![0x06, 0x2A])?;
        assert!(matches!(
            module.il_generator(method),
            Err(Error::InvalidState(_))
        ));
        Ok(())
    }

    #[test]
    fn generic_method_signature_is_updated() -> Result<()> {
        let mut module = module()?;
        let ty = module.define_type("N", "C", TypeAttributes::PUBLIC, None)?;
        let method = module.define_method(
            ty,
            "Id",
            MethodAttributes::PUBLIC | MethodAttributes::STATIC,
            SignatureMethod::static_method(
                TypeSignature::GenericParamMethod(0),
                vec![TypeSignature::GenericParamMethod(0)],
            ),
        )?;
        let before = module.method_entry(method)?.signature_blob;
        let params = module.define_method_generic_parameters(method, &["T"])?;
        assert_eq!(params.len(), 1);
        let entry = module.method_entry(method)?;
        assert_eq!(entry.signature.generic_param_count, 1);
        assert_ne!(entry.signature_blob, before);
        assert_eq!(
            module.scope.blobs.get(entry.signature_blob)?,
            &[0x10, 0x01, 0x01, 0x1E, 0x00, 0x1E, 0x00]
        );
        Ok(())
    }

    #[test]
    fn accessors_must_share_the_declaring_type() -> Result<()> {
        let mut module = module()?;
        let a = module.define_type("N", "A", TypeAttributes::PUBLIC, None)?;
        let b = module.define_type("N", "B", TypeAttributes::PUBLIC, None)?;
        let property = module.define_property(a, "Value", 0, TypeSignature::I4, Vec::new())?;
        let foreign = module.define_method(
            b,
            "get_Value",
            MethodAttributes::PUBLIC | MethodAttributes::STATIC,
            SignatureMethod::static_method(TypeSignature::I4, Vec::new()),
        )?;
        assert!(matches!(
            module.set_get_method(property, foreign),
            Err(Error::InvalidState(_))
        ));

        let getter = module.define_method(
            a,
            "get_Value",
            MethodAttributes::PUBLIC | MethodAttributes::STATIC,
            SignatureMethod::static_method(TypeSignature::I4, Vec::new()),
        )?;
        module.set_get_method(property, getter)?;
        let entry = module.property_entry(property)?;
        assert_eq!(entry.getter, Some(getter));
        assert!(!entry.signature.has_this);
        Ok(())
    }

    #[test]
    fn struct_layout_is_pseudo() -> Result<()> {
        let mut module = module()?;
        let ty = module.define_type("N", "S", TypeAttributes::PUBLIC, None)?;
        let attribute = CustomAttributeBuilder::new(
            interop_ctor(
                "StructLayoutAttribute",
                vec![TypeSignature::core_value_type(
                    "System.Runtime.InteropServices",
                    "LayoutKind",
                )],
            ),
            vec![CustomAttributeType::I4],
            vec![CustomAttributeArgument::I4(2)],
        )?
        .named_field("Pack", CustomAttributeArgument::I4(4))?
        .named_field("Size", CustomAttributeArgument::I4(16))?;
        module.set_custom_attribute(ty, attribute)?;

        let entry = module.type_entry(ty)?;
        assert_eq!(
            entry.flags & TypeAttributes::LAYOUT_MASK,
            TypeAttributes::EXPLICIT_LAYOUT
        );
        assert_eq!(entry.layout, Some((4, 16)));
        assert!(entry.decorations.attributes.is_empty());
        Ok(())
    }

    #[test]
    fn dll_import_creates_impl_map() -> Result<()> {
        let mut module = module()?;
        let ty = module.define_type("N", "Native", TypeAttributes::PUBLIC, None)?;
        let method = module.define_method(
            ty,
            "GetTickCount",
            MethodAttributes::PUBLIC | MethodAttributes::STATIC,
            SignatureMethod::static_method(TypeSignature::U4, Vec::new()),
        )?;
        let attribute = CustomAttributeBuilder::new(
            interop_ctor("DllImportAttribute", vec![TypeSignature::String]),
            vec![CustomAttributeType::String],
            vec![CustomAttributeArgument::string("kernel32.dll")],
        )?;
        module.set_custom_attribute(method, attribute)?;

        let entry = module.method_entry(method)?;
        assert_ne!(entry.flags & MethodAttributes::PINVOKE_IMPL, 0);
        assert_ne!(entry.impl_flags & MethodImplAttributes::PRESERVE_SIG, 0);
        let pinvoke = entry.pinvoke.as_ref().map(|p| (p.entry_point.clone(), p.module_ref));
        assert_eq!(pinvoke, Some(("GetTickCount".to_string(), 1)));
        assert!(!entry.accepts_body());
        Ok(())
    }

    #[test]
    fn pseudo_attributes_reject_wrong_targets() -> Result<()> {
        let mut module = module()?;
        let ty = module.define_type("N", "C", TypeAttributes::PUBLIC, None)?;
        let attribute = CustomAttributeBuilder::new(
            interop_ctor("FieldOffsetAttribute", vec![TypeSignature::I4]),
            vec![CustomAttributeType::I4],
            vec![CustomAttributeArgument::I4(8)],
        )?;
        assert!(matches!(
            module.set_custom_attribute(ty, attribute),
            Err(Error::NotSupported(_))
        ));
        Ok(())
    }

    #[test]
    fn marshal_as_on_field() -> Result<()> {
        let mut module = module()?;
        let ty = module.define_type("N", "S", TypeAttributes::PUBLIC, None)?;
        let field = module.define_field(ty, "name", TypeSignature::String, FieldAttributes::PUBLIC)?;
        let attribute = CustomAttributeBuilder::new(
            interop_ctor(
                "MarshalAsAttribute",
                vec![TypeSignature::core_value_type(
                    "System.Runtime.InteropServices",
                    "UnmanagedType",
                )],
            ),
            vec![CustomAttributeType::I4],
            vec![CustomAttributeArgument::I4(i32::from(NATIVE_TYPE::LPWSTR))],
        )?;
        module.set_custom_attribute(field, attribute)?;
        let entry = module.field_entry(field)?;
        assert_ne!(entry.flags & FieldAttributes::HAS_FIELD_MARSHAL, 0);
        assert_eq!(entry.decorations.marshal, Some(vec![NATIVE_TYPE::LPWSTR]));
        Ok(())
    }

    #[test]
    fn ordinary_attributes_are_stored() -> Result<()> {
        let mut module = module()?;
        let ty = module.define_type("N", "C", TypeAttributes::PUBLIC, None)?;
        let ctor = MethodTarget::external(
            TypeName::core("System", "ObsoleteAttribute"),
            ".ctor",
            SignatureMethod::instance(TypeSignature::Void, Vec::new()),
        );
        module.set_custom_attribute(ty, CustomAttributeBuilder::new(ctor.clone(), Vec::new(), Vec::new())?)?;
        module.set_custom_attribute(AttributeTarget::Module, CustomAttributeBuilder::from_blob(ctor, vec![1, 0, 0, 0]))?;
        assert_eq!(module.type_entry(ty)?.decorations.attributes.len(), 1);
        assert_eq!(module.attributes.len(), 1);

        let not_ctor = MethodTarget::external(
            TypeName::core("System", "ObsoleteAttribute"),
            "Create",
            SignatureMethod::instance(TypeSignature::Void, Vec::new()),
        );
        assert!(module
            .set_custom_attribute(ty, CustomAttributeBuilder::from_blob(not_ctor, vec![1, 0, 0, 0]))
            .is_err());
        Ok(())
    }

    #[test]
    fn class_layout_packing_is_checked() -> Result<()> {
        let mut module = module()?;
        let ty = module.define_type("N", "S", TypeAttributes::PUBLIC, None)?;
        assert!(module.set_class_layout(ty, 3, 0).is_err());
        assert!(module.set_class_layout(ty, 256, 0).is_err());
        module.set_class_layout(ty, 8, 32)?;
        assert_eq!(module.type_entry(ty)?.layout, Some((8, 32)));
        Ok(())
    }

    #[test]
    fn interface_implementation_requires_interface() -> Result<()> {
        let mut module = module()?;
        let class = module.define_type("N", "C", TypeAttributes::PUBLIC, None)?;
        let other = module.define_type("N", "D", TypeAttributes::PUBLIC, None)?;
        assert!(matches!(
            module.add_interface_implementation(class, other),
            Err(Error::TypeLoad(_))
        ));
        let interface = module.define_type(
            "N",
            "I",
            TypeAttributes::PUBLIC | TypeAttributes::INTERFACE | TypeAttributes::ABSTRACT,
            None,
        )?;
        module.add_interface_implementation(class, interface)?;
        module.add_interface_implementation(class, interface)?;
        assert_eq!(module.type_entry(class)?.interfaces.len(), 1);
        assert_eq!(module.type_entry(interface)?.parent, None);
        Ok(())
    }

    #[test]
    fn security_sets_flags() -> Result<()> {
        let mut module = module()?;
        let ty = module.define_type("N", "C", TypeAttributes::PUBLIC, None)?;
        module.add_declarative_security(ty, 2, vec![0x2E, 0x00])?;
        assert_ne!(
            module.type_entry(ty)?.flags & TypeAttributes::HAS_SECURITY,
            0
        );
        let field = module.define_field(ty, "f", TypeSignature::I4, 0)?;
        assert!(module.add_declarative_security(field, 2, Vec::new()).is_err());
        Ok(())
    }
}
