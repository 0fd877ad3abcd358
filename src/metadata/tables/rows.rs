//! Finalized row layouts, one struct per emitted table.
//!
//! Rows hold heap indices, row indices and [`CodedIndex`] values exactly as they will appear in
//! the `#~` stream. Widths of heap and coded index columns depend on the final table sizes and are
//! left to the image writer; rows store the full 32-bit values.

use crate::metadata::tables::CodedIndex;

/// `Module` (0x00)
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ModuleRow {
    /// Reserved, always zero
    pub generation: u16,
    /// `#Strings` index of the module name
    pub name: u32,
    /// `#GUID` index of the module version id
    pub mvid: u32,
    /// `#GUID` index, reserved
    pub enc_id: u32,
    /// `#GUID` index, reserved
    pub enc_base_id: u32,
}

/// `TypeRef` (0x01)
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TypeRefRow {
    /// `ResolutionScope` coded index
    pub resolution_scope: CodedIndex,
    /// `#Strings` index of the name
    pub type_name: u32,
    /// `#Strings` index of the namespace
    pub type_namespace: u32,
}

/// `TypeDef` (0x02)
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TypeDefRow {
    /// `TypeAttributes` bitmask
    pub flags: u32,
    /// `#Strings` index of the name
    pub type_name: u32,
    /// `#Strings` index of the namespace
    pub type_namespace: u32,
    /// `TypeDefOrRef` coded index of the base type (null for interfaces and `<Module>`)
    pub extends: CodedIndex,
    /// First `Field` row owned by this type
    pub field_list: u32,
    /// First `MethodDef` row owned by this type
    pub method_list: u32,
}

/// `Field` (0x04)
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FieldRow {
    /// `FieldAttributes` bitmask
    pub flags: u16,
    /// `#Strings` index of the name
    pub name: u32,
    /// `#Blob` index of the field signature
    pub signature: u32,
}

/// `MethodDef` (0x06)
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MethodDefRow {
    /// Offset of the method body in the emitted IL stream, 0 when there is no body
    pub rva: u32,
    /// `MethodImplAttributes` bitmask
    pub impl_flags: u16,
    /// `MethodAttributes` bitmask
    pub flags: u16,
    /// `#Strings` index of the name
    pub name: u32,
    /// `#Blob` index of the method signature
    pub signature: u32,
    /// First `Param` row owned by this method
    pub param_list: u32,
}

/// `Param` (0x08)
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParamRow {
    /// `ParamAttributes` bitmask
    pub flags: u16,
    /// 0 for the return value, otherwise the 1-based parameter position
    pub sequence: u16,
    /// `#Strings` index of the name
    pub name: u32,
}

/// `InterfaceImpl` (0x09)
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InterfaceImplRow {
    /// Implementing `TypeDef` row
    pub class: u32,
    /// `TypeDefOrRef` coded index of the interface
    pub interface: CodedIndex,
}

/// `MemberRef` (0x0A)
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MemberRefRow {
    /// `MemberRefParent` coded index
    pub class: CodedIndex,
    /// `#Strings` index of the name
    pub name: u32,
    /// `#Blob` index of the signature
    pub signature: u32,
}

/// `Constant` (0x0B)
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConstantRow {
    /// Element type of the value
    pub base: u8,
    /// `HasConstant` coded index
    pub parent: CodedIndex,
    /// `#Blob` index of the value
    pub value: u32,
}

/// `CustomAttribute` (0x0C)
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CustomAttributeRow {
    /// `HasCustomAttribute` coded index
    pub parent: CodedIndex,
    /// `CustomAttributeType` coded index of the constructor
    pub constructor: CodedIndex,
    /// `#Blob` index of the attribute value
    pub value: u32,
}

/// `FieldMarshal` (0x0D)
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FieldMarshalRow {
    /// `HasFieldMarshal` coded index
    pub parent: CodedIndex,
    /// `#Blob` index of the marshalling descriptor
    pub native_type: u32,
}

/// `DeclSecurity` (0x0E)
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeclSecurityRow {
    /// Security action
    pub action: u16,
    /// `HasDeclSecurity` coded index
    pub parent: CodedIndex,
    /// `#Blob` index of the permission set
    pub permission_set: u32,
}

/// `ClassLayout` (0x0F)
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClassLayoutRow {
    /// Field alignment in bytes
    pub packing_size: u16,
    /// Total size of the type in bytes
    pub class_size: u32,
    /// Owning `TypeDef` row
    pub parent: u32,
}

/// `FieldLayout` (0x10)
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FieldLayoutRow {
    /// Byte offset of the field
    pub field_offset: u32,
    /// `Field` row
    pub field: u32,
}

/// `StandAloneSig` (0x11)
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StandAloneSigRow {
    /// `#Blob` index of the signature
    pub signature: u32,
}

/// `EventMap` (0x12)
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EventMapRow {
    /// Owning `TypeDef` row
    pub parent: u32,
    /// First `Event` row of the owner
    pub event_list: u32,
}

/// `Event` (0x14)
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EventRow {
    /// `EventAttributes` bitmask
    pub flags: u16,
    /// `#Strings` index of the name
    pub name: u32,
    /// `TypeDefOrRef` coded index of the delegate type
    pub event_type: CodedIndex,
}

/// `PropertyMap` (0x15)
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PropertyMapRow {
    /// Owning `TypeDef` row
    pub parent: u32,
    /// First `Property` row of the owner
    pub property_list: u32,
}

/// `Property` (0x17)
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PropertyRow {
    /// `PropertyAttributes` bitmask
    pub flags: u16,
    /// `#Strings` index of the name
    pub name: u32,
    /// `#Blob` index of the property signature
    pub signature: u32,
}

/// `MethodSemantics` (0x18)
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MethodSemanticsRow {
    /// `MethodSemanticsAttributes` role
    pub semantics: u16,
    /// `MethodDef` row of the accessor
    pub method: u32,
    /// `HasSemantics` coded index of the property or event
    pub association: CodedIndex,
}

/// `MethodImpl` (0x19)
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MethodImplRow {
    /// `TypeDef` row that owns the override
    pub class: u32,
    /// `MethodDefOrRef` of the implementing body
    pub method_body: CodedIndex,
    /// `MethodDefOrRef` of the overridden declaration
    pub method_declaration: CodedIndex,
}

/// `ModuleRef` (0x1A)
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ModuleRefRow {
    /// `#Strings` index of the module name
    pub name: u32,
}

/// `TypeSpec` (0x1B)
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TypeSpecRow {
    /// `#Blob` index of the type signature
    pub signature: u32,
}

/// `ImplMap` (0x1C)
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ImplMapRow {
    /// `PInvokeAttributes` bitmask
    pub mapping_flags: u16,
    /// `MemberForwarded` coded index
    pub member_forwarded: CodedIndex,
    /// `#Strings` index of the native entry point
    pub import_name: u32,
    /// `ModuleRef` row of the native library
    pub import_scope: u32,
}

/// `FieldRVA` (0x1D)
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FieldRvaRow {
    /// Offset of the initial data in the emitted data stream
    pub rva: u32,
    /// `Field` row
    pub field: u32,
}

/// `Assembly` (0x20)
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AssemblyRow {
    /// Hash algorithm id of the `File` hashes
    pub hash_alg_id: u32,
    /// Major version
    pub major_version: u16,
    /// Minor version
    pub minor_version: u16,
    /// Build number
    pub build_number: u16,
    /// Revision number
    pub revision_number: u16,
    /// `AssemblyFlags` bitmask
    pub flags: u32,
    /// `#Blob` index of the public key
    pub public_key: u32,
    /// `#Strings` index of the name
    pub name: u32,
    /// `#Strings` index of the culture
    pub culture: u32,
}

/// `AssemblyRef` (0x23)
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AssemblyRefRow {
    /// Major version
    pub major_version: u16,
    /// Minor version
    pub minor_version: u16,
    /// Build number
    pub build_number: u16,
    /// Revision number
    pub revision_number: u16,
    /// `AssemblyFlags` bitmask
    pub flags: u32,
    /// `#Blob` index of the public key or token
    pub public_key_or_token: u32,
    /// `#Strings` index of the name
    pub name: u32,
    /// `#Strings` index of the culture
    pub culture: u32,
    /// `#Blob` index of the hash value
    pub hash_value: u32,
}

/// `File` (0x26)
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileRow {
    /// `FileAttributes` bitmask
    pub flags: u32,
    /// `#Strings` index of the file name
    pub name: u32,
    /// `#Blob` index of the file hash
    pub hash_value: u32,
}

/// `ExportedType` (0x27)
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExportedTypeRow {
    /// `TypeAttributes` bitmask
    pub flags: u32,
    /// `TypeDef` token hint in the implementing file, 0 for forwarders
    pub type_def_id: u32,
    /// `#Strings` index of the name
    pub type_name: u32,
    /// `#Strings` index of the namespace
    pub type_namespace: u32,
    /// `Implementation` coded index
    pub implementation: CodedIndex,
}

/// `ManifestResource` (0x28)
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ManifestResourceRow {
    /// Offset of the resource in the emitted resource stream
    pub offset: u32,
    /// `ManifestResourceAttributes` bitmask
    pub flags: u32,
    /// `#Strings` index of the name
    pub name: u32,
    /// `Implementation` coded index, null for embedded resources
    pub implementation: CodedIndex,
}

/// `NestedClass` (0x29)
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NestedClassRow {
    /// Nested `TypeDef` row
    pub nested_class: u32,
    /// Enclosing `TypeDef` row
    pub enclosing_class: u32,
}

/// `GenericParam` (0x2A)
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GenericParamRow {
    /// 0-based position in the owner's parameter list
    pub number: u16,
    /// `GenericParamAttributes` bitmask
    pub flags: u16,
    /// `TypeOrMethodDef` coded index of the owner
    pub owner: CodedIndex,
    /// `#Strings` index of the name
    pub name: u32,
}

/// `MethodSpec` (0x2B)
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MethodSpecRow {
    /// `MethodDefOrRef` coded index of the generic method
    pub method: CodedIndex,
    /// `#Blob` index of the instantiation signature
    pub instantiation: u32,
}

/// `GenericParamConstraint` (0x2C)
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GenericParamConstraintRow {
    /// `GenericParam` row
    pub owner: u32,
    /// `TypeDefOrRef` coded index of the constraint
    pub constraint: CodedIndex,
}
