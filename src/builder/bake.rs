//! Freezing a module into tables, heaps and a patched IL stream.
//!
//! Baking runs in fixed phases, each completing before the next starts:
//!
//! 1. Every type is created and every method body finished and encoded
//! 2. `Field`, `MethodDef` and `Param` rows are assigned, `<Module>` members first, then each
//!    type's members contiguously; pending tokens of these entities are registered
//! 3. `Property`/`Event` rows with their maps and `MethodSemantics` are written per type
//! 4. `GenericParam` rows are assigned in owner order, followed by their constraints
//! 5. Method bodies are laid out in `MethodDef` order and their pending token offsets queued
//! 6. All remaining rows are written, resolving references into `TypeRef`, `MemberRef` and
//!    friends as needed
//! 7. Placeholders in the IL stream are patched and the tables sorted

use log::{debug, trace};

use crate::{
    builder::{
        assembly::AssemblyManifest,
        entities::{Decorations, GenericOwner, MethodBodyState},
        scope::MetadataScope,
        Bakeable, EmittedModule, GenericParamId, HasSignature, HasToken, MethodId,
        ModuleBuilder, TokenTable, TypeId,
    },
    metadata::{
        customattributes::CustomAttributeBuilder,
        signatures::TypeResolver,
        tables::{
            attributes::{MethodSemanticsAttributes, TypeAttributes},
            rows::{
                AssemblyRow, ClassLayoutRow, ConstantRow, CustomAttributeRow, DeclSecurityRow,
                EventMapRow, EventRow, ExportedTypeRow, FieldLayoutRow, FieldMarshalRow,
                FieldRow, FieldRvaRow, FileRow, GenericParamConstraintRow, GenericParamRow,
                ImplMapRow, InterfaceImplRow, ManifestResourceRow, MethodDefRow, MethodImplRow,
                MethodSemanticsRow, ModuleRow, NestedClassRow, ParamRow, PropertyMapRow,
                PropertyRow, TypeDefRow,
            },
            CodedIndex, CodedIndexType, MetadataTables, TableId,
        },
        token::{Token, TokenRef},
    },
    utils::ByteBuffer,
    Error, Result,
};

/// Rows assigned to arena entities, indexed like the arenas.
struct RowMap {
    fields: Vec<u32>,
    methods: Vec<u32>,
    params: Vec<u32>,
    properties: Vec<u32>,
    events: Vec<u32>,
    generic_params: Vec<u32>,
    method_order: Vec<MethodId>,
}

impl RowMap {
    fn new(module: &ModuleBuilder) -> Self {
        RowMap {
            fields: vec![0; module.fields.len()],
            methods: vec![0; module.methods.len()],
            params: vec![0; module.params.len()],
            properties: vec![0; module.properties.len()],
            events: vec![0; module.events.len()],
            generic_params: vec![0; module.generic_params.len()],
            method_order: Vec::with_capacity(module.methods.len()),
        }
    }
}

fn next_row(len: usize) -> Result<u32> {
    match u32::try_from(len + 1) {
        Ok(row) if row <= 0x00FF_FFFF => Ok(row),
        _ => Err(Error::NotSupported(
            "A metadata table exceeds 2^24 rows".to_string(),
        )),
    }
}

/// Register the real token of `entry`, allocating its pending id if nothing referenced it yet.
fn bind(tokens: &mut TokenTable, entry: &mut impl HasToken, token: Token) -> Result<()> {
    match entry.token_ref(tokens)? {
        TokenRef::Pending(pending) => tokens.register(pending, token),
        TokenRef::Real(_) => Ok(()),
    }
}

/// `Constant` and `FieldMarshal` rows of one field, parameter or property.
fn push_decorations(
    scope: &mut MetadataScope,
    tables: &mut MetadataTables,
    decorations: &Decorations,
    parent: CodedIndex,
) -> Result<()> {
    if let Some(constant) = &decorations.constant {
        tables.constant.push(ConstantRow {
            base: constant.element_type(),
            parent,
            value: scope.blobs.add(&constant.to_bytes()?)?,
        });
    }
    if let Some(native_type) = &decorations.marshal {
        tables.field_marshal.push(FieldMarshalRow {
            parent,
            native_type: scope.blobs.add(native_type)?,
        });
    }
    Ok(())
}

/// A `TypeDefOrRef` coded index for `token`.
fn type_def_or_ref(token: Token) -> Result<CodedIndex> {
    CodedIndexType::TypeDefOrRef.encode(token)?;
    CodedIndex::try_from(token)
}

impl ModuleBuilder {
    /// Freeze the module and produce its tables, heaps and IL.
    ///
    /// Every type not yet created is created first. Afterwards the module and everything in
    /// it is immutable. A failed bake leaves the module open, and baking again reports the
    /// same error until its cause is fixed.
    ///
    /// # Errors
    /// Returns [`Error::TypeLoad`] for structurally invalid types, [`Error::InvalidState`] for
    /// methods that need a body but have none, and [`Error::UnresolvedToken`] if a pending
    /// token was never assigned a row.
    pub fn bake(&mut self) -> Result<EmittedModule> {
        self.bake_with_manifest(None)
    }

    pub(crate) fn bake_with_manifest(
        &mut self,
        manifest: Option<&AssemblyManifest>,
    ) -> Result<EmittedModule> {
        self.ensure_open()?;
        debug!(
            "Baking module {} ({} types, {} methods)",
            self.name,
            self.types.len(),
            self.methods.len()
        );

        for index in 0..self.types.len() {
            self.create_type(TypeId::from_index(index))?;
        }
        for method in self.global_methods.clone() {
            self.finish_method(method)?;
        }

        let checkpoint = self.tokens.checkpoint();
        match self.write_tables(manifest) {
            Ok(emitted) => Ok(emitted),
            Err(error) => {
                self.tokens.rollback(checkpoint);
                Err(error)
            }
        }
    }

    /// Assign every row and patch the IL stream; marks the module baked on success.
    fn write_tables(&mut self, manifest: Option<&AssemblyManifest>) -> Result<EmittedModule> {
        let mut tables = MetadataTables::default();
        let mut rows = RowMap::new(self);
        let lists = self.write_members(&mut tables, &mut rows)?;
        self.write_properties_and_events(&mut tables, &mut rows)?;
        self.write_generic_params(&mut tables, &mut rows)?;
        let il = self.layout_bodies(&mut tables, &rows)?;

        self.write_type_defs(&mut tables, &lists)?;
        self.write_type_relations(&mut tables)?;
        self.write_member_details(&mut tables, &rows)?;
        self.write_module_row(&mut tables)?;
        let resources = match manifest {
            Some(manifest) => self.write_manifest(&mut tables, manifest)?,
            None => Vec::new(),
        };
        self.write_custom_attributes(&mut tables, &rows, manifest)?;
        self.scope.write_rows(&mut tables, &self.tokens)?;

        let unresolved = self.tokens.unresolved()?;
        if let Some(first) = unresolved.first() {
            return Err(Error::UnresolvedToken(format!(
                "{} pending tokens never received a row, first {}",
                unresolved.len(),
                first
            )));
        }
        let mut il = il.into_inner();
        self.tokens.apply_fixups(&mut il)?;
        tables.sort();

        let entry_point = self
            .entry_point
            .map(|method| Token::from_parts(TableId::MethodDef, rows.methods[method.index()]));
        self.baked = true;
        debug!(
            "Baked module {}: {} TypeDef, {} MethodDef, {} bytes of IL",
            self.name,
            tables.type_def.len(),
            tables.method_def.len(),
            il.len()
        );

        Ok(EmittedModule {
            tables,
            strings: self.scope.strings.as_bytes().to_vec(),
            user_strings: self.scope.user_strings.as_bytes().to_vec(),
            guids: self.scope.guids.to_bytes(),
            blobs: self.scope.blobs.as_bytes().to_vec(),
            il,
            field_data: self.field_data.as_slice().to_vec(),
            resources,
            entry_point,
        })
    }

    /// `Field`, `MethodDef` and `Param` rows; returns the field and method list of every
    /// `TypeDef` row, `<Module>` first.
    fn write_members(
        &mut self,
        tables: &mut MetadataTables,
        rows: &mut RowMap,
    ) -> Result<Vec<(u32, u32)>> {
        let mut owners = vec![(self.global_fields.clone(), self.global_methods.clone())];
        owners.extend(
            self.types
                .iter()
                .map(|entry| (entry.fields.clone(), entry.methods.clone())),
        );

        let mut lists = Vec::with_capacity(owners.len());
        for (fields, methods) in owners {
            lists.push((next_row(tables.field.len())?, next_row(tables.method_def.len())?));

            for field in fields {
                let row = next_row(tables.field.len())?;
                let entry = &self.fields[field.index()];
                tables.field.push(FieldRow {
                    flags: entry.flags,
                    name: self.scope.strings.add(&entry.name)?,
                    signature: entry.signature_blob,
                });
                rows.fields[field.index()] = row;
                bind(
                    &mut self.tokens,
                    &mut self.fields[field.index()],
                    Token::from_parts(TableId::Field, row),
                )?;
            }

            for method in methods {
                let row = next_row(tables.method_def.len())?;
                let entry = &self.methods[method.index()];
                tables.method_def.push(MethodDefRow {
                    rva: 0,
                    impl_flags: entry.impl_flags,
                    flags: entry.flags,
                    name: self.scope.strings.add(&entry.name)?,
                    signature: entry.signature_blob,
                    param_list: next_row(tables.param.len())?,
                });

                let mut params = entry.params.clone();
                params.sort_by_key(|param| self.params[param.index()].sequence);
                for param in params {
                    let param_row = next_row(tables.param.len())?;
                    let entry = &self.params[param.index()];
                    tables.param.push(ParamRow {
                        flags: entry.flags,
                        sequence: entry.sequence,
                        name: self.scope.strings.add(&entry.name)?,
                    });
                    rows.params[param.index()] = param_row;
                    bind(
                        &mut self.tokens,
                        &mut self.params[param.index()],
                        Token::from_parts(TableId::Param, param_row),
                    )?;
                }

                rows.methods[method.index()] = row;
                rows.method_order.push(method);
                bind(
                    &mut self.tokens,
                    &mut self.methods[method.index()],
                    Token::from_parts(TableId::MethodDef, row),
                )?;
            }
        }

        debug!(
            "Assigned {} fields, {} methods, {} params",
            tables.field.len(),
            tables.method_def.len(),
            tables.param.len()
        );
        Ok(lists)
    }

    fn write_properties_and_events(
        &mut self,
        tables: &mut MetadataTables,
        rows: &mut RowMap,
    ) -> Result<()> {
        for index in 0..self.types.len() {
            let parent = self.scope.type_def(index)?.row();

            let properties = self.types[index].properties.clone();
            if !properties.is_empty() {
                tables.property_map.push(PropertyMapRow {
                    parent,
                    property_list: next_row(tables.property.len())?,
                });
            }
            for property in properties {
                let row = next_row(tables.property.len())?;
                let entry = &self.properties[property.index()];
                let signature = entry.signature_blob(&mut self.scope)?;
                tables.property.push(PropertyRow {
                    flags: entry.flags,
                    name: self.scope.strings.add(&entry.name)?,
                    signature: self.scope.blobs.add(&signature)?,
                });

                let association = CodedIndex::new(TableId::Property, row);
                let accessors = entry
                    .setter
                    .map(|m| (MethodSemanticsAttributes::SETTER, m))
                    .into_iter()
                    .chain(entry.getter.map(|m| (MethodSemanticsAttributes::GETTER, m)))
                    .chain(
                        entry
                            .others
                            .iter()
                            .map(|m| (MethodSemanticsAttributes::OTHER, *m)),
                    );
                for (semantics, method) in accessors {
                    tables.method_semantics.push(MethodSemanticsRow {
                        semantics,
                        method: rows.methods[method.index()],
                        association,
                    });
                }

                rows.properties[property.index()] = row;
                bind(
                    &mut self.tokens,
                    &mut self.properties[property.index()],
                    Token::from_parts(TableId::Property, row),
                )?;
            }

            let events = self.types[index].events.clone();
            if !events.is_empty() {
                tables.event_map.push(EventMapRow {
                    parent,
                    event_list: next_row(tables.event.len())?,
                });
            }
            for event in events {
                let row = next_row(tables.event.len())?;
                let entry = &self.events[event.index()];
                let event_type = type_def_or_ref(self.scope.resolve_type(&entry.event_type)?)?;
                tables.event.push(EventRow {
                    flags: entry.flags,
                    name: self.scope.strings.add(&entry.name)?,
                    event_type,
                });

                let association = CodedIndex::new(TableId::Event, row);
                let accessors = entry
                    .add_on
                    .map(|m| (MethodSemanticsAttributes::ADD_ON, m))
                    .into_iter()
                    .chain(entry.remove_on.map(|m| (MethodSemanticsAttributes::REMOVE_ON, m)))
                    .chain(entry.raise.map(|m| (MethodSemanticsAttributes::FIRE, m)))
                    .chain(
                        entry
                            .others
                            .iter()
                            .map(|m| (MethodSemanticsAttributes::OTHER, *m)),
                    );
                for (semantics, method) in accessors {
                    tables.method_semantics.push(MethodSemanticsRow {
                        semantics,
                        method: rows.methods[method.index()],
                        association,
                    });
                }

                rows.events[event.index()] = row;
                bind(
                    &mut self.tokens,
                    &mut self.events[event.index()],
                    Token::from_parts(TableId::Event, row),
                )?;
            }
        }
        Ok(())
    }

    /// `GenericParam` rows ordered by owner and number, then their constraints.
    fn write_generic_params(&mut self, tables: &mut MetadataTables, rows: &mut RowMap) -> Result<()> {
        let mut order = Vec::with_capacity(self.generic_params.len());
        for (index, entry) in self.generic_params.iter().enumerate() {
            let owner = match entry.owner {
                GenericOwner::Type(ty) => self.scope.type_def(ty.index())?,
                GenericOwner::Method(method) => {
                    Token::from_parts(TableId::MethodDef, rows.methods[method.index()])
                }
            };
            let key = CodedIndexType::TypeOrMethodDef.encode(owner)?;
            order.push((key, entry.number, GenericParamId::from_index(index), owner));
        }
        order.sort_by_key(|(key, number, _, _)| (*key, *number));

        for (_, number, param, owner) in &order {
            let row = next_row(tables.generic_param.len())?;
            let entry = &self.generic_params[param.index()];
            tables.generic_param.push(GenericParamRow {
                number: *number,
                flags: entry.flags,
                owner: CodedIndex::try_from(*owner)?,
                name: self.scope.strings.add(&entry.name)?,
            });
            rows.generic_params[param.index()] = row;
            bind(
                &mut self.tokens,
                &mut self.generic_params[param.index()],
                Token::from_parts(TableId::GenericParam, row),
            )?;
        }

        for (_, _, param, _) in &order {
            let row = rows.generic_params[param.index()];
            let entry = &self.generic_params[param.index()];
            for constraint in entry
                .base_constraint
                .iter()
                .chain(entry.interface_constraints.iter())
            {
                let constraint = type_def_or_ref(self.scope.resolve_type(constraint)?)?;
                tables
                    .generic_param_constraint
                    .push(GenericParamConstraintRow { owner: row, constraint });
            }
        }
        Ok(())
    }

    /// Concatenate the method bodies in `MethodDef` order and queue their token fixups.
    ///
    /// The stream starts with four reserved bytes so that no body sits at offset 0, which
    /// `MethodDef.rva` uses for "no body". Fat headers and raw bodies are 4-byte aligned.
    fn layout_bodies(&mut self, tables: &mut MetadataTables, rows: &RowMap) -> Result<ByteBuffer> {
        let mut il = ByteBuffer::new();
        il.write_u32(0);

        for method in &rows.method_order {
            let entry = &self.methods[method.index()];
            let start = match &entry.body {
                MethodBodyState::Encoded(body) => {
                    if body.is_fat {
                        il.align(4);
                    }
                    let start = il.len();
                    il.write_bytes(&body.bytes);
                    for (offset, pending) in &body.pending_tokens {
                        self.tokens.queue_fixup(start + offset, *pending);
                    }
                    trace!(
                        "{} at {:#x}: {} bytes, {} fixups",
                        entry.describe(),
                        start,
                        body.bytes.len(),
                        body.pending_tokens.len()
                    );
                    start
                }
                MethodBodyState::Raw(bytes) => {
                    il.align(4);
                    let start = il.len();
                    il.write_bytes(bytes);
                    start
                }
                MethodBodyState::Empty => continue,
                MethodBodyState::Generating(_) => {
                    return Err(Error::InvalidState(format!(
                        "{} is still generating IL",
                        entry.describe()
                    )));
                }
            };

            let row = rows.methods[method.index()] as usize;
            let rva = u32::try_from(start).map_err(|_| Error::HeapFull("IL"))?;
            if let Some(def) = tables.method_def.get_mut(row - 1) {
                def.rva = rva;
            }
        }
        Ok(il)
    }

    fn write_type_defs(&mut self, tables: &mut MetadataTables, lists: &[(u32, u32)]) -> Result<()> {
        let Some((&(field_list, method_list), type_lists)) = lists.split_first() else {
            return Err(Error::InvalidState("Missing <Module> member lists".to_string()));
        };
        tables.type_def.push(TypeDefRow {
            flags: 0,
            type_name: self.scope.strings.add("<Module>")?,
            type_namespace: 0,
            extends: CodedIndex::null(CodedIndexType::TypeDefOrRef),
            field_list,
            method_list,
        });

        for (entry, &(field_list, method_list)) in self.types.iter().zip(type_lists) {
            let extends = match &entry.parent {
                Some(parent) => type_def_or_ref(self.scope.resolve_type(parent)?)?,
                None => CodedIndex::null(CodedIndexType::TypeDefOrRef),
            };
            tables.type_def.push(TypeDefRow {
                flags: entry.flags,
                type_name: self.scope.strings.add(&entry.name)?,
                type_namespace: self.scope.strings.add(&entry.namespace)?,
                extends,
                field_list,
                method_list,
            });
        }
        Ok(())
    }

    /// `InterfaceImpl`, `NestedClass`, `ClassLayout`, type level `DeclSecurity` and
    /// `MethodImpl`.
    fn write_type_relations(&mut self, tables: &mut MetadataTables) -> Result<()> {
        let mut overrides = Vec::new();
        for (index, entry) in self.types.iter().enumerate() {
            let row = self.scope.type_def(index)?.row();
            for interface in &entry.interfaces {
                tables.interface_impl.push(InterfaceImplRow {
                    class: row,
                    interface: type_def_or_ref(self.scope.resolve_type(interface)?)?,
                });
            }
            if let Some(enclosing) = entry.enclosing {
                tables.nested_class.push(NestedClassRow {
                    nested_class: row,
                    enclosing_class: self.scope.type_def(enclosing.index())?.row(),
                });
            }
            if let Some((packing_size, class_size)) = entry.layout {
                tables.class_layout.push(ClassLayoutRow {
                    packing_size,
                    class_size,
                    parent: row,
                });
            }
            for security in &entry.security {
                tables.decl_security.push(DeclSecurityRow {
                    action: security.action,
                    parent: CodedIndex::new(TableId::TypeDef, row),
                    permission_set: self.scope.blobs.add(&security.permission_set)?,
                });
            }
            for (body, declaration) in &entry.overrides {
                overrides.push((row, body.clone(), declaration.clone()));
            }
        }

        for (class, body, declaration) in overrides {
            let (body, _) = self.method_target_token(&body)?;
            let (declaration, _) = self.method_target_token(&declaration)?;
            let body = self.tokens.resolve_ref(body)?;
            let declaration = self.tokens.resolve_ref(declaration)?;
            CodedIndexType::MethodDefOrRef.encode(body)?;
            CodedIndexType::MethodDefOrRef.encode(declaration)?;
            tables.method_impl.push(MethodImplRow {
                class,
                method_body: CodedIndex::try_from(body)?,
                method_declaration: CodedIndex::try_from(declaration)?,
            });
        }
        Ok(())
    }

    /// `FieldLayout`, `FieldRVA`, `Constant`, `FieldMarshal`, `ImplMap` and method level
    /// `DeclSecurity`.
    fn write_member_details(&mut self, tables: &mut MetadataTables, rows: &RowMap) -> Result<()> {
        for (index, entry) in self.fields.iter().enumerate() {
            let row = rows.fields[index];
            if let Some(field_offset) = entry.offset {
                tables.field_layout.push(FieldLayoutRow {
                    field_offset,
                    field: row,
                });
            }
            if let Some(rva) = entry.rva {
                tables.field_rva.push(FieldRvaRow { rva, field: row });
            }
            push_decorations(
                &mut self.scope,
                tables,
                &entry.decorations,
                CodedIndex::new(TableId::Field, row),
            )?;
        }

        for (index, entry) in self.params.iter().enumerate() {
            let parent = CodedIndex::new(TableId::Param, rows.params[index]);
            push_decorations(&mut self.scope, tables, &entry.decorations, parent)?;
        }

        for (index, entry) in self.properties.iter().enumerate() {
            let parent = CodedIndex::new(TableId::Property, rows.properties[index]);
            push_decorations(&mut self.scope, tables, &entry.decorations, parent)?;
        }

        for (index, entry) in self.methods.iter().enumerate() {
            let row = rows.methods[index];
            if let Some(pinvoke) = &entry.pinvoke {
                tables.impl_map.push(ImplMapRow {
                    mapping_flags: pinvoke.flags,
                    member_forwarded: CodedIndex::new(TableId::MethodDef, row),
                    import_name: self.scope.strings.add(&pinvoke.entry_point)?,
                    import_scope: pinvoke.module_ref,
                });
            }
            for security in &entry.security {
                tables.decl_security.push(DeclSecurityRow {
                    action: security.action,
                    parent: CodedIndex::new(TableId::MethodDef, row),
                    permission_set: self.scope.blobs.add(&security.permission_set)?,
                });
            }
        }
        Ok(())
    }

    fn write_module_row(&mut self, tables: &mut MetadataTables) -> Result<()> {
        tables.module.push(ModuleRow {
            generation: 0,
            name: self.scope.strings.add(&self.name)?,
            mvid: self.scope.guids.add(self.mvid),
            enc_id: 0,
            enc_base_id: 0,
        });
        Ok(())
    }

    /// `Assembly`, `File`, `ExportedType` and `ManifestResource` rows; returns the resource
    /// stream.
    fn write_manifest(
        &mut self,
        tables: &mut MetadataTables,
        manifest: &AssemblyManifest,
    ) -> Result<Vec<u8>> {
        let name = &manifest.name;
        tables.assembly.push(AssemblyRow {
            hash_alg_id: name.hash_algorithm,
            major_version: name.version.major,
            minor_version: name.version.minor,
            build_number: name.version.build,
            revision_number: name.version.revision,
            flags: name.row_flags(),
            public_key: self.scope.blobs.add(&name.public_key)?,
            name: self.scope.strings.add(&name.name)?,
            culture: self.scope.strings.add(name.culture.as_deref().unwrap_or(""))?,
        });

        for security in &manifest.security {
            tables.decl_security.push(DeclSecurityRow {
                action: security.action,
                parent: CodedIndex::new(TableId::Assembly, 1),
                permission_set: self.scope.blobs.add(&security.permission_set)?,
            });
        }

        for file in &manifest.files {
            tables.file.push(FileRow {
                flags: file.flags,
                name: self.scope.strings.add(&file.name)?,
                hash_value: self.scope.blobs.add(&file.hash)?,
            });
        }

        for forwarder in &manifest.forwarders {
            let scope = self.scope.assembly_ref(&forwarder.assembly)?;
            tables.exported_type.push(ExportedTypeRow {
                flags: TypeAttributes::FORWARDER,
                type_def_id: 0,
                type_name: self.scope.strings.add(&forwarder.name)?,
                type_namespace: self.scope.strings.add(&forwarder.namespace)?,
                implementation: CodedIndex::try_from(scope)?,
            });
        }

        let mut resources = ByteBuffer::new();
        for resource in &manifest.resources {
            let offset = u32::try_from(resources.len()).map_err(|_| Error::HeapFull("resources"))?;
            let length =
                u32::try_from(resource.data.len()).map_err(|_| Error::HeapFull("resources"))?;
            resources.write_u32(length);
            resources.write_bytes(&resource.data);
            tables.manifest_resource.push(ManifestResourceRow {
                offset,
                flags: resource.flags,
                name: self.scope.strings.add(&resource.name)?,
                implementation: CodedIndex::null(CodedIndexType::Implementation),
            });
        }
        Ok(resources.into_inner())
    }

    fn write_custom_attributes(
        &mut self,
        tables: &mut MetadataTables,
        rows: &RowMap,
        manifest: Option<&AssemblyManifest>,
    ) -> Result<()> {
        let mut staged: Vec<(CodedIndex, CustomAttributeBuilder)> = Vec::new();
        let mut stage = |parent: CodedIndex, decorations: &[CustomAttributeBuilder]| {
            staged.extend(decorations.iter().map(|a| (parent, a.clone())));
        };

        if let Some(manifest) = manifest {
            stage(CodedIndex::new(TableId::Assembly, 1), &manifest.attributes);
        }
        stage(CodedIndex::new(TableId::Module, 1), &self.attributes);
        for (index, entry) in self.types.iter().enumerate() {
            let row = self.scope.type_def(index)?.row();
            stage(CodedIndex::new(TableId::TypeDef, row), &entry.decorations.attributes);
        }
        for (index, entry) in self.methods.iter().enumerate() {
            let parent = CodedIndex::new(TableId::MethodDef, rows.methods[index]);
            stage(parent, &entry.decorations.attributes);
        }
        for (index, entry) in self.fields.iter().enumerate() {
            let parent = CodedIndex::new(TableId::Field, rows.fields[index]);
            stage(parent, &entry.decorations.attributes);
        }
        for (index, entry) in self.params.iter().enumerate() {
            let parent = CodedIndex::new(TableId::Param, rows.params[index]);
            stage(parent, &entry.decorations.attributes);
        }
        for (index, entry) in self.properties.iter().enumerate() {
            let parent = CodedIndex::new(TableId::Property, rows.properties[index]);
            stage(parent, &entry.decorations.attributes);
        }
        for (index, entry) in self.events.iter().enumerate() {
            let parent = CodedIndex::new(TableId::Event, rows.events[index]);
            stage(parent, &entry.decorations.attributes);
        }
        for (index, entry) in self.generic_params.iter().enumerate() {
            let parent = CodedIndex::new(TableId::GenericParam, rows.generic_params[index]);
            stage(parent, &entry.decorations.attributes);
        }

        for (parent, attribute) in staged {
            let (constructor, _) = self.method_target_token(attribute.constructor())?;
            let constructor = self.tokens.resolve_ref(constructor)?;
            CodedIndexType::CustomAttributeType.encode(constructor)?;
            tables.custom_attribute.push(CustomAttributeRow {
                parent,
                constructor: CodedIndex::try_from(constructor)?,
                value: self.scope.blobs.add(&attribute.blob()?)?,
            });
        }
        debug!("Wrote {} custom attributes", tables.custom_attribute.len());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        assembly::OpCode,
        builder::{BuilderConfig, MethodTarget},
        metadata::{
            signatures::{SignatureMethod, TypeName, TypeSignature},
            tables::attributes::MethodAttributes,
        },
    };

    const STATIC: u16 = MethodAttributes::PUBLIC | MethodAttributes::STATIC;

    fn module() -> Result<ModuleBuilder> {
        ModuleBuilder::new("Bake.dll", BuilderConfig::default())
    }

    fn emit_all(module: &mut ModuleBuilder, method: MethodId, ops: &[OpCode]) -> Result<()> {
        let mut il = module.il_generator(method)?;
        for op in ops {
            il.emit(*op)?;
        }
        Ok(())
    }

    fn binary(module: &mut ModuleBuilder, ty: TypeId, name: &str, flags: u16) -> Result<MethodId> {
        let signature =
            SignatureMethod::static_method(TypeSignature::I4, vec![TypeSignature::I4; 2]);
        module.define_method(ty, name, flags, signature)
    }

    #[test]
    fn static_and_instance_add() -> Result<()> {
        let mut module = module()?;
        let calc = module.define_type("Calc", "Math", TypeAttributes::PUBLIC, None)?;
        let add = binary(&mut module, calc, "Add", STATIC)?;
        emit_all(
            &mut module,
            add,
            &[OpCode::LDARG_0, OpCode::LDARG_1, OpCode::ADD, OpCode::RET],
        )?;
        let instance = binary(&mut module, calc, "AddInstance", MethodAttributes::PUBLIC)?;
        emit_all(
            &mut module,
            instance,
            &[OpCode::LDARG_1, OpCode::LDARG_2, OpCode::ADD, OpCode::RET],
        )?;

        let emitted = module.bake()?;
        assert_eq!(emitted.tables.method_def[0].rva, 4);
        assert_eq!(emitted.method_body(1)?, &[0x12, 0x02, 0x03, 0x58, 0x2A]);
        assert_eq!(emitted.method_code(2)?, &[0x03, 0x04, 0x58, 0x2A]);
        Ok(())
    }

    #[test]
    fn forward_calls_are_patched() -> Result<()> {
        let mut module = module()?;
        let ty = module.define_type("App", "Program", TypeAttributes::PUBLIC, None)?;
        let void = || SignatureMethod::static_method(TypeSignature::Void, Vec::new());
        let caller = module.define_method(ty, "Main", STATIC, void())?;
        let callee = module.define_method(ty, "Run", STATIC, void())?;

        {
            let mut il = module.il_generator(caller)?;
            il.emit_call(OpCode::CALL, callee)?;
            il.emit(OpCode::RET)?;
        }
        emit_all(&mut module, callee, &[OpCode::RET])?;
        module.set_entry_point(caller)?;

        let emitted = module.bake()?;
        assert_eq!(
            emitted.method_code(1)?,
            &[0x28, 0x02, 0x00, 0x00, 0x06, 0x2A]
        );
        assert_eq!(emitted.entry_point, Some(Token::new(0x0600_0001)));
        assert!(!emitted.il.windows(4).any(|w| w == (-1i32).to_le_bytes()));
        Ok(())
    }

    #[test]
    fn default_constructor_calls_object() -> Result<()> {
        let mut module = module()?;
        module.define_type("App", "Widget", TypeAttributes::PUBLIC, None)?;

        let emitted = module.bake()?;
        assert_eq!(emitted.tables.method_def.len(), 1);
        assert_eq!(emitted.tables.member_ref.len(), 1);
        assert_eq!(
            emitted.method_code(1)?,
            &[0x02, 0x28, 0x01, 0x00, 0x00, 0x0A, 0x2A]
        );
        Ok(())
    }

    #[test]
    fn members_are_contiguous_per_type() -> Result<()> {
        let mut module = module()?;
        let first = module.define_type("N", "First", TypeAttributes::PUBLIC, None)?;
        let second = module.define_type("N", "Second", TypeAttributes::PUBLIC, None)?;
        module.define_field(second, "b", TypeSignature::I4, 0)?;
        module.define_field(first, "a", TypeSignature::I4, 0)?;

        let getter_flags =
            MethodAttributes::PUBLIC | MethodAttributes::SPECIAL_NAME | MethodAttributes::HIDE_BY_SIG;
        for (ty, name) in [(second, "Q"), (first, "P")] {
            let property = module.define_property(ty, name, 0, TypeSignature::I4, Vec::new())?;
            let getter = module.define_method(
                ty,
                &format!("get_{}", name),
                getter_flags,
                SignatureMethod::instance(TypeSignature::I4, Vec::new()),
            )?;
            {
                let mut il = module.il_generator(getter)?;
                il.emit_ldc_i4(0)?;
                il.emit(OpCode::RET)?;
            }
            module.set_get_method(property, getter)?;
        }

        let emitted = module.bake()?;
        let tables = &emitted.tables;
        assert_eq!(tables.type_def[1].field_list, 1);
        assert_eq!(tables.type_def[2].field_list, 2);
        assert_eq!(tables.property_map.len(), 2);
        assert_eq!(
            (tables.property_map[0].parent, tables.property_map[0].property_list),
            (2, 1)
        );
        assert_eq!(
            (tables.property_map[1].parent, tables.property_map[1].property_list),
            (3, 2)
        );
        assert_eq!(tables.method_semantics.len(), 2);
        assert!(tables
            .method_semantics
            .iter()
            .all(|row| row.semantics == MethodSemanticsAttributes::GETTER));
        Ok(())
    }

    #[test]
    fn nested_and_generic_rows() -> Result<()> {
        let mut module = module()?;
        let outer = module.define_type("N", "Outer", TypeAttributes::PUBLIC, None)?;
        let inner = module.define_nested_type(outer, "Inner", TypeAttributes::PUBLIC, None)?;
        module.define_generic_parameters(inner, &["T"])?;
        module.define_generic_parameters(outer, &["U", "V"])?;

        let emitted = module.bake()?;
        let tables = &emitted.tables;
        assert_eq!(tables.nested_class.len(), 1);
        assert_eq!(
            (tables.nested_class[0].nested_class, tables.nested_class[0].enclosing_class),
            (3, 2)
        );
        assert_eq!(tables.generic_param.len(), 3);
        assert_eq!(tables.generic_param[0].owner, CodedIndex::new(TableId::TypeDef, 2));
        assert_eq!(tables.generic_param[1].number, 1);
        assert_eq!(tables.generic_param[2].owner, CodedIndex::new(TableId::TypeDef, 3));
        Ok(())
    }

    #[test]
    fn attributes_reference_their_constructor() -> Result<()> {
        let mut module = module()?;
        let ty = module.define_type("N", "Marked", TypeAttributes::PUBLIC, None)?;
        let ctor = MethodTarget::external(
            TypeName::core("System", "ObsoleteAttribute"),
            ".ctor",
            SignatureMethod::instance(TypeSignature::Void, Vec::new()),
        );
        module.set_custom_attribute(ty, CustomAttributeBuilder::new(ctor, Vec::new(), Vec::new())?)?;

        let emitted = module.bake()?;
        let row = &emitted.tables.custom_attribute[0];
        assert_eq!(row.parent, CodedIndex::new(TableId::TypeDef, 2));
        assert_eq!(row.constructor.tag, TableId::MemberRef);
        Ok(())
    }

    #[test]
    fn missing_body_is_rejected() -> Result<()> {
        let mut module = module()?;
        let ty = module.define_type("N", "Broken", TypeAttributes::PUBLIC, None)?;
        binary(&mut module, ty, "Add", STATIC)?;
        assert!(matches!(module.bake(), Err(Error::InvalidState(_))));
        Ok(())
    }

    #[test]
    fn failed_creation_repeats_its_error() -> Result<()> {
        let mut module = module()?;
        let ty = module.define_type("N", "T", TypeAttributes::PUBLIC, None)?;
        let method = module.define_method(
            ty,
            "Loop",
            STATIC,
            SignatureMethod::static_method(TypeSignature::Void, Vec::new()),
        )?;
        let label = {
            let mut il = module.il_generator(method)?;
            let label = il.define_label()?;
            il.emit_branch(OpCode::BR, label)?;
            label
        };

        assert!(matches!(module.create_type(ty), Err(Error::InvalidBranch(_))));
        assert!(matches!(module.create_type(ty), Err(Error::InvalidBranch(_))));
        assert!(matches!(module.bake(), Err(Error::InvalidBranch(_))));

        {
            let mut il = module.il_generator(method)?;
            il.mark_label(label)?;
            il.emit(OpCode::RET)?;
        }
        let emitted = module.bake()?;
        assert_eq!(emitted.method_code(1)?, &[0x38, 0x00, 0x00, 0x00, 0x00, 0x2A]);
        Ok(())
    }

    #[test]
    fn failed_bake_can_be_repeated() -> Result<()> {
        let mut module = module()?;
        let ty = module.define_type("N", "T", TypeAttributes::PUBLIC, None)?;
        let add = binary(&mut module, ty, "Add", STATIC)?;
        emit_all(
            &mut module,
            add,
            &[OpCode::LDARG_0, OpCode::LDARG_1, OpCode::ADD, OpCode::RET],
        )?;
        module.add_interface_implementation(ty, Token::new(0x0600_0001))?;

        assert!(matches!(module.bake(), Err(Error::InvalidCodedIndex)));
        assert!(matches!(module.bake(), Err(Error::InvalidCodedIndex)));
        assert!(module.tokens.fixups().is_empty());
        Ok(())
    }

    #[test]
    fn baking_is_deterministic_and_final() -> Result<()> {
        let build = || -> Result<ModuleBuilder> {
            let mut module = module()?;
            let ty = module.define_type("N", "Program", TypeAttributes::PUBLIC, None)?;
            let add = binary(&mut module, ty, "Add", STATIC)?;
            emit_all(
                &mut module,
                add,
                &[OpCode::LDARG_0, OpCode::LDARG_1, OpCode::ADD, OpCode::RET],
            )?;
            Ok(module)
        };

        let mut first = build()?;
        let mut second = build()?;
        assert_eq!(first.bake()?, second.bake()?);
        assert!(matches!(first.bake(), Err(Error::AlreadyBaked(_))));
        Ok(())
    }
}
