use crate::metadata::{
    tables::{rows::*, CodedIndexType, TableId},
    token::Token,
};

/// The finalized rows of every table emitted for one module.
///
/// Row `n` of a table is at index `n - 1` of its vector. Tables whose order is mandated by
/// ECMA-335 II.22 are put into that order by [`MetadataTables::sort`], which the module bake
/// calls once every coded index has been resolved.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MetadataTables {
    /// `Module` rows (exactly one)
    pub module: Vec<ModuleRow>,
    /// `TypeRef` rows
    pub type_ref: Vec<TypeRefRow>,
    /// `TypeDef` rows, `<Module>` first
    pub type_def: Vec<TypeDefRow>,
    /// `Field` rows
    pub field: Vec<FieldRow>,
    /// `MethodDef` rows
    pub method_def: Vec<MethodDefRow>,
    /// `Param` rows
    pub param: Vec<ParamRow>,
    /// `InterfaceImpl` rows
    pub interface_impl: Vec<InterfaceImplRow>,
    /// `MemberRef` rows
    pub member_ref: Vec<MemberRefRow>,
    /// `Constant` rows
    pub constant: Vec<ConstantRow>,
    /// `CustomAttribute` rows
    pub custom_attribute: Vec<CustomAttributeRow>,
    /// `FieldMarshal` rows
    pub field_marshal: Vec<FieldMarshalRow>,
    /// `DeclSecurity` rows
    pub decl_security: Vec<DeclSecurityRow>,
    /// `ClassLayout` rows
    pub class_layout: Vec<ClassLayoutRow>,
    /// `FieldLayout` rows
    pub field_layout: Vec<FieldLayoutRow>,
    /// `StandAloneSig` rows
    pub stand_alone_sig: Vec<StandAloneSigRow>,
    /// `EventMap` rows
    pub event_map: Vec<EventMapRow>,
    /// `Event` rows
    pub event: Vec<EventRow>,
    /// `PropertyMap` rows
    pub property_map: Vec<PropertyMapRow>,
    /// `Property` rows
    pub property: Vec<PropertyRow>,
    /// `MethodSemantics` rows
    pub method_semantics: Vec<MethodSemanticsRow>,
    /// `MethodImpl` rows
    pub method_impl: Vec<MethodImplRow>,
    /// `ModuleRef` rows
    pub module_ref: Vec<ModuleRefRow>,
    /// `TypeSpec` rows
    pub type_spec: Vec<TypeSpecRow>,
    /// `ImplMap` rows
    pub impl_map: Vec<ImplMapRow>,
    /// `FieldRVA` rows
    pub field_rva: Vec<FieldRvaRow>,
    /// `Assembly` rows (zero or one)
    pub assembly: Vec<AssemblyRow>,
    /// `AssemblyRef` rows
    pub assembly_ref: Vec<AssemblyRefRow>,
    /// `File` rows
    pub file: Vec<FileRow>,
    /// `ExportedType` rows
    pub exported_type: Vec<ExportedTypeRow>,
    /// `ManifestResource` rows
    pub manifest_resource: Vec<ManifestResourceRow>,
    /// `NestedClass` rows
    pub nested_class: Vec<NestedClassRow>,
    /// `GenericParam` rows
    pub generic_param: Vec<GenericParamRow>,
    /// `MethodSpec` rows
    pub method_spec: Vec<MethodSpecRow>,
    /// `GenericParamConstraint` rows
    pub generic_param_constraint: Vec<GenericParamConstraintRow>,
}

impl MetadataTables {
    /// Number of rows in `table`.
    #[must_use]
    pub fn row_count(&self, table: TableId) -> usize {
        match table {
            TableId::Module => self.module.len(),
            TableId::TypeRef => self.type_ref.len(),
            TableId::TypeDef => self.type_def.len(),
            TableId::Field => self.field.len(),
            TableId::MethodDef => self.method_def.len(),
            TableId::Param => self.param.len(),
            TableId::InterfaceImpl => self.interface_impl.len(),
            TableId::MemberRef => self.member_ref.len(),
            TableId::Constant => self.constant.len(),
            TableId::CustomAttribute => self.custom_attribute.len(),
            TableId::FieldMarshal => self.field_marshal.len(),
            TableId::DeclSecurity => self.decl_security.len(),
            TableId::ClassLayout => self.class_layout.len(),
            TableId::FieldLayout => self.field_layout.len(),
            TableId::StandAloneSig => self.stand_alone_sig.len(),
            TableId::EventMap => self.event_map.len(),
            TableId::Event => self.event.len(),
            TableId::PropertyMap => self.property_map.len(),
            TableId::Property => self.property.len(),
            TableId::MethodSemantics => self.method_semantics.len(),
            TableId::MethodImpl => self.method_impl.len(),
            TableId::ModuleRef => self.module_ref.len(),
            TableId::TypeSpec => self.type_spec.len(),
            TableId::ImplMap => self.impl_map.len(),
            TableId::FieldRVA => self.field_rva.len(),
            TableId::Assembly => self.assembly.len(),
            TableId::AssemblyRef => self.assembly_ref.len(),
            TableId::File => self.file.len(),
            TableId::ExportedType => self.exported_type.len(),
            TableId::ManifestResource => self.manifest_resource.len(),
            TableId::NestedClass => self.nested_class.len(),
            TableId::GenericParam => self.generic_param.len(),
            TableId::MethodSpec => self.method_spec.len(),
            TableId::GenericParamConstraint => self.generic_param_constraint.len(),
            TableId::UserString => 0,
        }
    }

    /// Returns `true` if `token` names an existing row.
    ///
    /// User string tokens are not rows and always return `false`.
    #[must_use]
    pub fn contains(&self, token: Token) -> bool {
        match TableId::from_token(token) {
            Some(table) => token.row() >= 1 && token.row() as usize <= self.row_count(table),
            None => false,
        }
    }

    /// Stable-sorts every table whose order ECMA-335 II.22 mandates.
    ///
    /// `GenericParam` is not touched here: its rows are referenced by other tables, so the
    /// module assigns them in sorted order before anything points at them.
    pub fn sort(&mut self) {
        let key = |kind: CodedIndexType, index: &crate::metadata::tables::CodedIndex| {
            index.encode(kind).unwrap_or(u32::MAX)
        };

        self.interface_impl.sort_by_key(|row| {
            (row.class, key(CodedIndexType::TypeDefOrRef, &row.interface))
        });
        self.constant
            .sort_by_key(|row| key(CodedIndexType::HasConstant, &row.parent));
        self.custom_attribute
            .sort_by_key(|row| key(CodedIndexType::HasCustomAttribute, &row.parent));
        self.field_marshal
            .sort_by_key(|row| key(CodedIndexType::HasFieldMarshal, &row.parent));
        self.decl_security
            .sort_by_key(|row| key(CodedIndexType::HasDeclSecurity, &row.parent));
        self.class_layout.sort_by_key(|row| row.parent);
        self.field_layout.sort_by_key(|row| row.field);
        self.method_semantics
            .sort_by_key(|row| key(CodedIndexType::HasSemantics, &row.association));
        self.method_impl.sort_by_key(|row| row.class);
        self.impl_map
            .sort_by_key(|row| key(CodedIndexType::MemberForwarded, &row.member_forwarded));
        self.field_rva.sort_by_key(|row| row.field);
        self.nested_class.sort_by_key(|row| row.nested_class);
        self.generic_param_constraint.sort_by_key(|row| row.owner);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::tables::CodedIndex;

    #[test]
    fn contains_checks_row_range() {
        let mut tables = MetadataTables::default();
        tables.type_def.push(TypeDefRow {
            flags: 0,
            type_name: 1,
            type_namespace: 0,
            extends: CodedIndex::null(CodedIndexType::TypeDefOrRef),
            field_list: 1,
            method_list: 1,
        });

        assert!(tables.contains(Token::new(0x0200_0001)));
        assert!(!tables.contains(Token::new(0x0200_0002)));
        assert!(!tables.contains(Token::new(0x0200_0000)));
        assert!(!tables.contains(Token::new(0x7000_0001)));
    }

    #[test]
    fn sort_orders_by_encoded_parent() {
        let mut tables = MetadataTables::default();
        let ctor = CodedIndex::new(TableId::MemberRef, 1);
        // TypeDef row 2 encodes as (2 << 5) | 3, MethodDef row 1 as (1 << 5) | 0
        tables.custom_attribute.push(CustomAttributeRow {
            parent: CodedIndex::new(TableId::TypeDef, 2),
            constructor: ctor,
            value: 1,
        });
        tables.custom_attribute.push(CustomAttributeRow {
            parent: CodedIndex::new(TableId::MethodDef, 1),
            constructor: ctor,
            value: 2,
        });
        tables.custom_attribute.push(CustomAttributeRow {
            parent: CodedIndex::new(TableId::TypeDef, 2),
            constructor: ctor,
            value: 3,
        });

        tables.sort();
        let values: Vec<u32> = tables.custom_attribute.iter().map(|row| row.value).collect();
        assert_eq!(values, vec![2, 1, 3]);
    }
}
