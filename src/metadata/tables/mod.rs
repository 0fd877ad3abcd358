//! Metadata table identifiers, coded indices and the finalized row store.
//!
//! The builder model stages entities in its own arena; only when a module is baked are they
//! flattened into rows. This module defines the vocabulary those rows are expressed in:
//!
//! - [`TableId`] - the ECMA-335 table numbers this crate emits
//! - [`CodedIndexType`] / [`CodedIndex`] - tagged references between tables
//! - [`rows`] - one plain struct per table
//! - [`attributes`] - flag constants of the attribute columns
//! - [`MetadataTables`] - the finalized, ordered row collections of one module
//!
//! # Reference
//! * [ECMA-335 Partition II, Section 22](https://ecma-international.org/wp-content/uploads/ECMA-335_6th_edition_june_2012.pdf) - Metadata Tables
//! * ECMA-335 Partition II, Section 24.2.6 - Coded indices

pub mod attributes;
pub mod rows;
mod store;

use strum::{EnumCount, EnumIter};

use crate::{metadata::token::Token, Error, Result};

pub use store::MetadataTables;

/// Identifiers of the metadata tables produced by the builders.
///
/// Discriminants are the table numbers used in the high byte of a [`Token`].
#[derive(Clone, Copy, PartialEq, Debug, EnumIter, EnumCount, Eq, Hash, PartialOrd, Ord)]
pub enum TableId {
    /// `Module` table (0x00) - the single row describing this module
    Module = 0x00,
    /// `TypeRef` table (0x01) - references to types in other scopes
    TypeRef = 0x01,
    /// `TypeDef` table (0x02) - types defined in this module, `<Module>` first
    TypeDef = 0x02,
    /// `Field` table (0x04) - field definitions, contiguous per owning type
    Field = 0x04,
    /// `MethodDef` table (0x06) - method definitions, contiguous per owning type
    MethodDef = 0x06,
    /// `Param` table (0x08) - parameter definitions, contiguous per owning method
    Param = 0x08,
    /// `InterfaceImpl` table (0x09) - interfaces implemented by types
    InterfaceImpl = 0x09,
    /// `MemberRef` table (0x0A) - references to fields and methods of other types
    MemberRef = 0x0A,
    /// `Constant` table (0x0B) - default values of fields, parameters and properties
    Constant = 0x0B,
    /// `CustomAttribute` table (0x0C) - attribute instances
    CustomAttribute = 0x0C,
    /// `FieldMarshal` table (0x0D) - native marshalling descriptors
    FieldMarshal = 0x0D,
    /// `DeclSecurity` table (0x0E) - declarative security permission sets
    DeclSecurity = 0x0E,
    /// `ClassLayout` table (0x0F) - packing and size of explicitly laid out types
    ClassLayout = 0x0F,
    /// `FieldLayout` table (0x10) - explicit field offsets
    FieldLayout = 0x10,
    /// `StandAloneSig` table (0x11) - local variable and call site signatures
    StandAloneSig = 0x11,
    /// `EventMap` table (0x12) - maps a type to its first event
    EventMap = 0x12,
    /// `Event` table (0x14) - event definitions
    Event = 0x14,
    /// `PropertyMap` table (0x15) - maps a type to its first property
    PropertyMap = 0x15,
    /// `Property` table (0x17) - property definitions
    Property = 0x17,
    /// `MethodSemantics` table (0x18) - accessor roles of methods
    MethodSemantics = 0x18,
    /// `MethodImpl` table (0x19) - explicit method overrides
    MethodImpl = 0x19,
    /// `ModuleRef` table (0x1A) - references to other modules (P/Invoke targets)
    ModuleRef = 0x1A,
    /// `TypeSpec` table (0x1B) - constructed types referenced by signature
    TypeSpec = 0x1B,
    /// `ImplMap` table (0x1C) - P/Invoke mappings
    ImplMap = 0x1C,
    /// `FieldRVA` table (0x1D) - initial data of fields
    FieldRVA = 0x1D,
    /// `Assembly` table (0x20) - the manifest of this assembly
    Assembly = 0x20,
    /// `AssemblyRef` table (0x23) - referenced assemblies
    AssemblyRef = 0x23,
    /// `File` table (0x26) - other files of a multi-module assembly
    File = 0x26,
    /// `ExportedType` table (0x27) - types forwarded or exported from other files
    ExportedType = 0x27,
    /// `ManifestResource` table (0x28) - resources of the assembly
    ManifestResource = 0x28,
    /// `NestedClass` table (0x29) - nesting relationships
    NestedClass = 0x29,
    /// `GenericParam` table (0x2A) - generic parameters of types and methods
    GenericParam = 0x2A,
    /// `MethodSpec` table (0x2B) - generic method instantiations
    MethodSpec = 0x2B,
    /// `GenericParamConstraint` table (0x2C) - constraints on generic parameters
    GenericParamConstraint = 0x2C,
    /// Pseudo table id of user string heap tokens (`ldstr` operands)
    UserString = 0x70,
}

impl TableId {
    /// Maps a token's table byte back to its id.
    #[must_use]
    pub fn from_token(token: Token) -> Option<TableId> {
        use strum::IntoEnumIterator;
        TableId::iter().find(|table| *table as u8 == token.table())
    }
}

/// The kinds of coded index defined in ECMA-335 II.24.2.6.
#[derive(Debug, Hash, Eq, PartialEq, Clone, Copy, EnumIter, EnumCount)]
pub enum CodedIndexType {
    /// `TypeDef`, `TypeRef` or `TypeSpec`
    TypeDefOrRef,
    /// `Field`, `Param` or `Property`
    HasConstant,
    /// Any table that can carry a custom attribute
    HasCustomAttribute,
    /// `Field` or `Param`
    HasFieldMarshal,
    /// `TypeDef`, `MethodDef` or `Assembly`
    HasDeclSecurity,
    /// Parent of a `MemberRef`
    MemberRefParent,
    /// `Event` or `Property`
    HasSemantics,
    /// `MethodDef` or `MemberRef`
    MethodDefOrRef,
    /// `Field` or `MethodDef`
    MemberForwarded,
    /// `File`, `AssemblyRef` or `ExportedType`
    Implementation,
    /// Constructor of a custom attribute
    CustomAttributeType,
    /// Scope of a `TypeRef`
    ResolutionScope,
    /// Owner of a generic parameter
    TypeOrMethodDef,
}

impl CodedIndexType {
    /// Tables addressable by this coded index, in tag order.
    ///
    /// `CustomAttributeType` uses tags 2 and 3 only; the unused tags are `None`.
    #[must_use]
    pub fn tables(&self) -> &'static [Option<TableId>] {
        match self {
            CodedIndexType::TypeDefOrRef => &[
                Some(TableId::TypeDef),
                Some(TableId::TypeRef),
                Some(TableId::TypeSpec),
            ],
            CodedIndexType::HasConstant => &[
                Some(TableId::Field),
                Some(TableId::Param),
                Some(TableId::Property),
            ],
            CodedIndexType::HasCustomAttribute => &[
                Some(TableId::MethodDef),
                Some(TableId::Field),
                Some(TableId::TypeRef),
                Some(TableId::TypeDef),
                Some(TableId::Param),
                Some(TableId::InterfaceImpl),
                Some(TableId::MemberRef),
                Some(TableId::Module),
                Some(TableId::DeclSecurity),
                Some(TableId::Property),
                Some(TableId::Event),
                Some(TableId::StandAloneSig),
                Some(TableId::ModuleRef),
                Some(TableId::TypeSpec),
                Some(TableId::Assembly),
                Some(TableId::AssemblyRef),
                Some(TableId::File),
                Some(TableId::ExportedType),
                Some(TableId::ManifestResource),
                Some(TableId::GenericParam),
                Some(TableId::GenericParamConstraint),
                Some(TableId::MethodSpec),
            ],
            CodedIndexType::HasFieldMarshal => &[Some(TableId::Field), Some(TableId::Param)],
            CodedIndexType::HasDeclSecurity => &[
                Some(TableId::TypeDef),
                Some(TableId::MethodDef),
                Some(TableId::Assembly),
            ],
            CodedIndexType::MemberRefParent => &[
                Some(TableId::TypeDef),
                Some(TableId::TypeRef),
                Some(TableId::ModuleRef),
                Some(TableId::MethodDef),
                Some(TableId::TypeSpec),
            ],
            CodedIndexType::HasSemantics => &[Some(TableId::Event), Some(TableId::Property)],
            CodedIndexType::MethodDefOrRef => {
                &[Some(TableId::MethodDef), Some(TableId::MemberRef)]
            }
            CodedIndexType::MemberForwarded => &[Some(TableId::Field), Some(TableId::MethodDef)],
            CodedIndexType::Implementation => &[
                Some(TableId::File),
                Some(TableId::AssemblyRef),
                Some(TableId::ExportedType),
            ],
            CodedIndexType::CustomAttributeType => &[
                None,
                None,
                Some(TableId::MethodDef),
                Some(TableId::MemberRef),
                None,
            ],
            CodedIndexType::ResolutionScope => &[
                Some(TableId::Module),
                Some(TableId::ModuleRef),
                Some(TableId::AssemblyRef),
                Some(TableId::TypeRef),
            ],
            CodedIndexType::TypeOrMethodDef => &[Some(TableId::TypeDef), Some(TableId::MethodDef)],
        }
    }

    /// Number of low bits used for the tag.
    #[must_use]
    pub fn tag_bits(&self) -> u32 {
        let count = self.tables().len() as u32;
        u32::BITS - (count - 1).leading_zeros()
    }

    /// Encodes `token` as this coded index: `row << tag_bits | tag`.
    ///
    /// # Errors
    /// Returns [`Error::InvalidCodedIndex`] if the token's table is not addressable.
    pub fn encode(&self, token: Token) -> Result<u32> {
        let tag = self
            .tables()
            .iter()
            .position(|table| table.is_some_and(|t| token.is_table(t)))
            .ok_or(Error::InvalidCodedIndex)?;

        Ok((token.row() << self.tag_bits()) | tag as u32)
    }

    /// Decodes a coded index value back into a token.
    ///
    /// # Errors
    /// Returns [`Error::InvalidCodedIndex`] for an unused tag.
    pub fn decode(&self, value: u32) -> Result<Token> {
        let bits = self.tag_bits();
        let tag = (value & ((1 << bits) - 1)) as usize;
        let table = self
            .tables()
            .get(tag)
            .copied()
            .flatten()
            .ok_or(Error::InvalidCodedIndex)?;

        Ok(Token::from_parts(table, value >> bits))
    }
}

/// A decoded coded index: the referenced table and row, plus the equivalent token.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct CodedIndex {
    /// The referenced table
    pub tag: TableId,
    /// The 1-based row in `tag` (0 for a null reference)
    pub row: u32,
    /// The equivalent metadata token
    pub token: Token,
}

impl CodedIndex {
    /// Create a coded index for `row` of `tag`.
    #[must_use]
    pub fn new(tag: TableId, row: u32) -> CodedIndex {
        CodedIndex {
            tag,
            row,
            token: Token::from_parts(tag, row),
        }
    }

    /// A null reference, tagged with the first table of the coded index kind.
    #[must_use]
    pub fn null(kind: CodedIndexType) -> CodedIndex {
        let tag = kind
            .tables()
            .iter()
            .copied()
            .flatten()
            .next()
            .unwrap_or(TableId::TypeDef);
        CodedIndex {
            tag,
            row: 0,
            token: Token::new(0),
        }
    }

    /// Encodes this index for `kind`.
    ///
    /// # Errors
    /// Returns [`Error::InvalidCodedIndex`] if `tag` is not valid for `kind`.
    pub fn encode(&self, kind: CodedIndexType) -> Result<u32> {
        if self.row == 0 {
            return Ok(0);
        }
        kind.encode(self.token)
    }
}

impl TryFrom<Token> for CodedIndex {
    type Error = Error;

    fn try_from(token: Token) -> Result<Self> {
        if token.is_null() {
            return Err(malformed_error!("Cannot convert null token to CodedIndex"));
        }

        let table = TableId::from_token(token)
            .ok_or_else(|| malformed_error!("Unknown table in token {}", token))?;
        Ok(CodedIndex::new(table, token.row()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tag_bits() {
        assert_eq!(CodedIndexType::TypeDefOrRef.tag_bits(), 2);
        assert_eq!(CodedIndexType::HasConstant.tag_bits(), 2);
        assert_eq!(CodedIndexType::HasCustomAttribute.tag_bits(), 5);
        assert_eq!(CodedIndexType::HasFieldMarshal.tag_bits(), 1);
        assert_eq!(CodedIndexType::MemberRefParent.tag_bits(), 3);
        assert_eq!(CodedIndexType::CustomAttributeType.tag_bits(), 3);
        assert_eq!(CodedIndexType::ResolutionScope.tag_bits(), 2);
        assert_eq!(CodedIndexType::TypeOrMethodDef.tag_bits(), 1);
    }

    #[test]
    fn type_def_or_ref() -> Result<()> {
        let kind = CodedIndexType::TypeDefOrRef;
        assert_eq!(kind.encode(Token::new(0x0200_0002))?, 0x08);
        assert_eq!(kind.encode(Token::new(0x0100_0005))?, (5 << 2) | 1);
        assert_eq!(kind.encode(Token::new(0x1B00_0001))?, (1 << 2) | 2);
        assert!(matches!(
            kind.encode(Token::new(0x0600_0001)),
            Err(Error::InvalidCodedIndex)
        ));
        assert_eq!(kind.decode((5 << 2) | 1)?, Token::new(0x0100_0005));
        Ok(())
    }

    #[test]
    fn custom_attribute_type_uses_sparse_tags() -> Result<()> {
        let kind = CodedIndexType::CustomAttributeType;
        assert_eq!(kind.encode(Token::new(0x0600_0001))?, (1 << 3) | 2);
        assert_eq!(kind.encode(Token::new(0x0A00_0004))?, (4 << 3) | 3);
        assert!(kind.decode(1 << 3).is_err());
        Ok(())
    }

    #[test]
    fn coded_index_from_token() -> Result<()> {
        let index = CodedIndex::try_from(Token::new(0x2300_0001))?;
        assert_eq!(index.tag, TableId::AssemblyRef);
        assert_eq!(index.row, 1);
        assert_eq!(index.encode(CodedIndexType::ResolutionScope)?, (1 << 2) | 2);
        assert!(CodedIndex::try_from(Token::new(0)).is_err());
        assert_eq!(
            CodedIndex::null(CodedIndexType::TypeDefOrRef).encode(CodedIndexType::TypeDefOrRef)?,
            0
        );
        Ok(())
    }
}
