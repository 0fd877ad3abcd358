//! Heaps and reference tables shared by everything a module stages.
//!
//! Reference rows (`TypeRef`, `AssemblyRef`, `ModuleRef`, `TypeSpec`, `MemberRef`, `MethodSpec`,
//! `StandAloneSig`) get their row number the moment they are first requested, so their tokens
//! are real from the start. Each kind is deduplicated through an import cache keyed by its
//! content; asking twice for the same reference returns the same token.
//!
//! `MemberRef` and `MethodSpec` rows may point at a method that has no row yet (a vararg call
//! site of a defined method, an instantiation of a defined generic method). Those columns are
//! kept as [`TokenRef`] and resolved when the module bakes.

use std::collections::BTreeMap;

use log::trace;

use crate::{
    builder::{identity::AssemblyRefInfo, TokenTable},
    metadata::{
        heaps::{BlobHeap, GuidHeap, StringHeap, UserStringHeap},
        signatures::{
            encode_typespec_signature, TypeHandle, TypeResolver, TypeSignature,
        },
        tables::{
            rows::{
                AssemblyRefRow, MemberRefRow, MethodSpecRow, ModuleRefRow, StandAloneSigRow,
                TypeRefRow, TypeSpecRow,
            },
            CodedIndex, CodedIndexType, MetadataTables, TableId,
        },
        token::{Token, TokenRef},
    },
    Error, Result,
};

/// A `MemberRef` whose parent may still be pending.
#[derive(Debug, Clone)]
struct StagedMemberRef {
    parent: TokenRef,
    name: u32,
    signature: u32,
}

/// A `MethodSpec` whose method may still be pending.
#[derive(Debug, Clone)]
struct StagedMethodSpec {
    method: TokenRef,
    instantiation: u32,
}

fn row_of(len: usize) -> u32 {
    u32::try_from(len).unwrap_or(u32::MAX)
}

/// The heaps, reference rows and import caches of one module.
#[derive(Debug, Clone)]
pub(crate) struct MetadataScope {
    pub strings: StringHeap,
    pub user_strings: UserStringHeap,
    pub guids: GuidHeap,
    pub blobs: BlobHeap,
    /// Number of types defined so far, excluding `<Module>`
    pub type_count: usize,
    core_library: AssemblyRefInfo,
    type_refs: Vec<TypeRefRow>,
    type_ref_cache: BTreeMap<(Token, String, String), Token>,
    assembly_refs: Vec<AssemblyRefRow>,
    assembly_ref_cache: BTreeMap<String, Token>,
    module_refs: Vec<ModuleRefRow>,
    module_ref_cache: BTreeMap<String, Token>,
    type_specs: Vec<TypeSpecRow>,
    type_spec_cache: BTreeMap<u32, Token>,
    member_refs: Vec<StagedMemberRef>,
    member_ref_cache: BTreeMap<(TokenRef, u32, u32), Token>,
    method_specs: Vec<StagedMethodSpec>,
    method_spec_cache: BTreeMap<(TokenRef, u32), Token>,
    stand_alone_sigs: Vec<StandAloneSigRow>,
    stand_alone_sig_cache: BTreeMap<u32, Token>,
}

impl MetadataScope {
    pub fn new(core_library: AssemblyRefInfo) -> Self {
        MetadataScope {
            strings: StringHeap::new(),
            user_strings: UserStringHeap::new(),
            guids: GuidHeap::new(),
            blobs: BlobHeap::new(),
            type_count: 0,
            core_library,
            type_refs: Vec::new(),
            type_ref_cache: BTreeMap::new(),
            assembly_refs: Vec::new(),
            assembly_ref_cache: BTreeMap::new(),
            module_refs: Vec::new(),
            module_ref_cache: BTreeMap::new(),
            type_specs: Vec::new(),
            type_spec_cache: BTreeMap::new(),
            member_refs: Vec::new(),
            member_ref_cache: BTreeMap::new(),
            method_specs: Vec::new(),
            method_spec_cache: BTreeMap::new(),
            stand_alone_sigs: Vec::new(),
            stand_alone_sig_cache: BTreeMap::new(),
        }
    }

    /// Replace the core library, allowed only before it was first referenced.
    pub fn set_core_library(&mut self, info: AssemblyRefInfo) -> Result<()> {
        if self.assembly_ref_cache.contains_key(&self.core_library.name) {
            return Err(Error::InvalidState(format!(
                "core library {} is already referenced",
                self.core_library.name
            )));
        }
        self.core_library = info;
        Ok(())
    }

    pub fn core_library(&self) -> &AssemblyRefInfo {
        &self.core_library
    }

    /// The `AssemblyRef` for `info`, deduplicated by simple name.
    pub fn assembly_ref(&mut self, info: &AssemblyRefInfo) -> Result<Token> {
        if let Some(&token) = self.assembly_ref_cache.get(&info.name) {
            return Ok(token);
        }

        let row = AssemblyRefRow {
            major_version: info.version.major,
            minor_version: info.version.minor,
            build_number: info.version.build,
            revision_number: info.version.revision,
            flags: info.flags,
            public_key_or_token: self.blobs.add(&info.public_key_or_token)?,
            name: self.strings.add(&info.name)?,
            culture: match &info.culture {
                Some(culture) => self.strings.add(culture)?,
                None => 0,
            },
            hash_value: 0,
        };
        self.assembly_refs.push(row);
        let token = Token::from_parts(TableId::AssemblyRef, row_of(self.assembly_refs.len()));
        self.assembly_ref_cache.insert(info.name.clone(), token);
        trace!("AssemblyRef {} -> {}", info.name, token);
        Ok(token)
    }

    /// The `AssemblyRef` of the named assembly; unknown names get version 0.0.0.0.
    pub fn assembly_ref_by_name(&mut self, name: Option<&str>) -> Result<Token> {
        match name {
            None => {
                let core = self.core_library.clone();
                self.assembly_ref(&core)
            }
            Some(name) if name == self.core_library.name => {
                let core = self.core_library.clone();
                self.assembly_ref(&core)
            }
            Some(name) => match self.assembly_ref_cache.get(name) {
                Some(&token) => Ok(token),
                None => self.assembly_ref(&AssemblyRefInfo::new(name, Default::default())),
            },
        }
    }

    pub fn module_ref(&mut self, name: &str) -> Result<Token> {
        if let Some(&token) = self.module_ref_cache.get(name) {
            return Ok(token);
        }
        let row = ModuleRefRow {
            name: self.strings.add(name)?,
        };
        self.module_refs.push(row);
        let token = Token::from_parts(TableId::ModuleRef, row_of(self.module_refs.len()));
        self.module_ref_cache.insert(name.to_string(), token);
        Ok(token)
    }

    /// The `TypeRef` of `namespace.name` in `scope`.
    pub fn type_ref(&mut self, scope: Token, namespace: &str, name: &str) -> Result<Token> {
        let key = (scope, namespace.to_string(), name.to_string());
        if let Some(&token) = self.type_ref_cache.get(&key) {
            return Ok(token);
        }

        let row = TypeRefRow {
            resolution_scope: CodedIndex::try_from(scope)?,
            type_name: self.strings.add(name)?,
            type_namespace: self.strings.add(namespace)?,
        };
        row.resolution_scope.encode(CodedIndexType::ResolutionScope)?;
        self.type_refs.push(row);
        let token = Token::from_parts(TableId::TypeRef, row_of(self.type_refs.len()));
        self.type_ref_cache.insert(key, token);
        trace!("TypeRef {}.{} -> {}", namespace, name, token);
        Ok(token)
    }

    /// The `TypeSpec` of `signature`, deduplicated by blob content.
    pub fn type_spec(&mut self, signature: &TypeSignature) -> Result<Token> {
        let blob = encode_typespec_signature(signature, self)?;
        let index = self.blobs.add(&blob)?;
        if let Some(&token) = self.type_spec_cache.get(&index) {
            return Ok(token);
        }
        self.type_specs.push(TypeSpecRow { signature: index });
        let token = Token::from_parts(TableId::TypeSpec, row_of(self.type_specs.len()));
        self.type_spec_cache.insert(index, token);
        Ok(token)
    }

    /// The `MemberRef` of `name` with the encoded `signature` on `parent`.
    pub fn member_ref(&mut self, parent: TokenRef, name: &str, signature: &[u8]) -> Result<Token> {
        if let TokenRef::Real(token) = parent {
            CodedIndexType::MemberRefParent.encode(token)?;
        }
        let name = self.strings.add(name)?;
        let signature = self.blobs.add(signature)?;
        let key = (parent, name, signature);
        if let Some(&token) = self.member_ref_cache.get(&key) {
            return Ok(token);
        }

        self.member_refs.push(StagedMemberRef {
            parent,
            name,
            signature,
        });
        let token = Token::from_parts(TableId::MemberRef, row_of(self.member_refs.len()));
        self.member_ref_cache.insert(key, token);
        Ok(token)
    }

    /// The `MethodSpec` instantiating `method` with the encoded `instantiation`.
    pub fn method_spec(&mut self, method: TokenRef, instantiation: &[u8]) -> Result<Token> {
        let instantiation = self.blobs.add(instantiation)?;
        let key = (method, instantiation);
        if let Some(&token) = self.method_spec_cache.get(&key) {
            return Ok(token);
        }
        self.method_specs.push(StagedMethodSpec {
            method,
            instantiation,
        });
        let token = Token::from_parts(TableId::MethodSpec, row_of(self.method_specs.len()));
        self.method_spec_cache.insert(key, token);
        Ok(token)
    }

    /// The `StandAloneSig` of an encoded local or call site signature.
    pub fn stand_alone_sig(&mut self, signature: &[u8]) -> Result<Token> {
        let index = self.blobs.add(signature)?;
        if let Some(&token) = self.stand_alone_sig_cache.get(&index) {
            return Ok(token);
        }
        self.stand_alone_sigs.push(StandAloneSigRow { signature: index });
        let token = Token::from_parts(TableId::StandAloneSig, row_of(self.stand_alone_sigs.len()));
        self.stand_alone_sig_cache.insert(index, token);
        Ok(token)
    }

    /// The `TypeDef` token of the defined type at arena `index`.
    pub fn type_def(&self, index: usize) -> Result<Token> {
        if index >= self.type_count {
            return Err(Error::TypeLoad(format!(
                "type #{} is not defined in this module",
                index
            )));
        }
        // row 1 is <Module>
        Ok(Token::from_parts(TableId::TypeDef, row_of(index + 2)))
    }

    /// Move the staged reference rows into `tables`, resolving pending columns.
    pub fn write_rows(&self, tables: &mut MetadataTables, tokens: &TokenTable) -> Result<()> {
        tables.type_ref = self.type_refs.clone();
        tables.assembly_ref = self.assembly_refs.clone();
        tables.module_ref = self.module_refs.clone();
        tables.type_spec = self.type_specs.clone();
        tables.stand_alone_sig = self.stand_alone_sigs.clone();

        tables.member_ref = self
            .member_refs
            .iter()
            .map(|staged| {
                let parent = tokens.resolve_ref(staged.parent)?;
                CodedIndexType::MemberRefParent.encode(parent)?;
                Ok(MemberRefRow {
                    class: CodedIndex::try_from(parent)?,
                    name: staged.name,
                    signature: staged.signature,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        tables.method_spec = self
            .method_specs
            .iter()
            .map(|staged| {
                let method = tokens.resolve_ref(staged.method)?;
                CodedIndexType::MethodDefOrRef.encode(method)?;
                Ok(MethodSpecRow {
                    method: CodedIndex::try_from(method)?,
                    instantiation: staged.instantiation,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(())
    }
}

impl TypeResolver for MetadataScope {
    fn resolve_type(&mut self, handle: &TypeHandle) -> Result<Token> {
        match handle {
            TypeHandle::Defined(id) => self.type_def(id.index()),
            TypeHandle::Token(token) => Ok(*token),
            TypeHandle::Named(name) => {
                let mut scope = self.assembly_ref_by_name(name.assembly.as_deref())?;
                let mut segments = name.name.split('/');
                let outermost = segments.next().unwrap_or_default();
                scope = self.type_ref(scope, &name.namespace, outermost)?;
                for nested in segments {
                    scope = self.type_ref(scope, "", nested)?;
                }
                Ok(scope)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::signatures::TypeName;

    fn scope() -> MetadataScope {
        MetadataScope::new(AssemblyRefInfo::mscorlib())
    }

    #[test]
    fn named_types_import_once() -> Result<()> {
        let mut scope = scope();
        let handle = TypeHandle::Named(TypeName::core("System", "Console"));
        let first = scope.resolve_type(&handle)?;
        let second = scope.resolve_type(&handle)?;

        assert_eq!(first, second);
        assert_eq!(first, Token::new(0x0100_0001));
        assert_eq!(scope.assembly_refs.len(), 1);
        assert_eq!(scope.type_refs.len(), 1);
        Ok(())
    }

    #[test]
    fn nested_names_chain_type_refs() -> Result<()> {
        let mut scope = scope();
        let handle = TypeHandle::Named(TypeName::new(
            "Lib",
            "N",
            "Outer/Inner",
        ));
        let inner = scope.resolve_type(&handle)?;

        assert_eq!(inner, Token::new(0x0100_0002));
        let inner_row = &scope.type_refs[1];
        assert_eq!(inner_row.resolution_scope.token, Token::new(0x0100_0001));
        assert_eq!(inner_row.type_namespace, 0);
        Ok(())
    }

    #[test]
    fn defined_types_are_bounded() -> Result<()> {
        let mut scope = scope();
        scope.type_count = 2;
        assert_eq!(scope.type_def(1)?, Token::new(0x0200_0003));
        assert!(matches!(scope.type_def(2), Err(Error::TypeLoad(_))));
        Ok(())
    }

    #[test]
    fn member_refs_resolve_pending_parents() -> Result<()> {
        let mut scope = scope();
        let mut tokens = TokenTable::new();
        let pending = tokens.alloc()?;

        let token = scope.member_ref(TokenRef::Pending(pending), "Sum", &[0x05, 0x00, 0x08])?;
        assert_eq!(
            scope.member_ref(TokenRef::Pending(pending), "Sum", &[0x05, 0x00, 0x08])?,
            token
        );

        let mut tables = MetadataTables::default();
        assert!(scope.write_rows(&mut tables, &tokens).is_err());

        tokens.register(pending, Token::new(0x0600_0003))?;
        scope.write_rows(&mut tables, &tokens)?;
        assert_eq!(tables.member_ref.len(), 1);
        assert_eq!(tables.member_ref[0].class, CodedIndex::new(TableId::MethodDef, 3));
        Ok(())
    }

    #[test]
    fn core_library_is_fixed_after_use() -> Result<()> {
        let mut scope = scope();
        scope.resolve_type(&TypeHandle::Named(TypeName::core("System", "Object")))?;
        assert!(scope
            .set_core_library(AssemblyRefInfo::new("System.Runtime", Default::default()))
            .is_err());
        assert_eq!(scope.core_library().name, "mscorlib");
        Ok(())
    }
}
