//! The finished product of a bake: tables, heap images and the patched IL stream.

use crate::{
    metadata::{method::MethodBody, tables::MetadataTables, token::Token},
    utils::Parser,
    Error, Result,
};

/// Everything a PE writer needs to lay out the metadata of one module.
///
/// Heap images are complete, including their leading empty entries. `MethodDef.rva` columns
/// hold offsets into [`EmittedModule::il`] and `FieldRVA.rva` columns offsets into
/// [`EmittedModule::field_data`]; the writer relocates both when it places the sections.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmittedModule {
    /// Finalized rows of every table, sorted where ECMA-335 requires it
    pub tables: MetadataTables,
    /// `#Strings` heap image
    pub strings: Vec<u8>,
    /// `#US` heap image
    pub user_strings: Vec<u8>,
    /// `#GUID` heap image
    pub guids: Vec<u8>,
    /// `#Blob` heap image
    pub blobs: Vec<u8>,
    /// Method bodies with every token patched
    pub il: Vec<u8>,
    /// Initial data of `FieldRVA` fields
    pub field_data: Vec<u8>,
    /// Embedded manifest resources, each prefixed with its `u32` length
    pub resources: Vec<u8>,
    /// `MethodDef` token of the entry point
    pub entry_point: Option<Token>,
}

impl EmittedModule {
    /// Header and code of `MethodDef` row `row` (1-based), without exception sections.
    ///
    /// # Errors
    /// Returns [`Error::InvalidState`] for a row without a body and [`Error::Malformed`] if
    /// the body cannot be parsed.
    pub fn method_body(&self, row: u32) -> Result<&[u8]> {
        let method = row
            .checked_sub(1)
            .and_then(|index| self.tables.method_def.get(index as usize))
            .ok_or_else(|| Error::InvalidState(format!("MethodDef row {} does not exist", row)))?;
        if method.rva == 0 {
            return Err(Error::InvalidState(format!(
                "MethodDef row {} has no body",
                row
            )));
        }

        let start = method.rva as usize;
        let data = self.il.get(start..).ok_or(Error::OutOfBounds)?;
        let parsed = MethodBody::parse(data)?;
        data.get(..parsed.size()).ok_or(Error::OutOfBounds)
    }

    /// The IL code of `MethodDef` row `row`, without header and exception sections.
    ///
    /// # Errors
    /// See [`EmittedModule::method_body`].
    pub fn method_code(&self, row: u32) -> Result<&[u8]> {
        let body = self.method_body(row)?;
        let parsed = MethodBody::parse(body)?;
        body.get(parsed.size_header..parsed.size_header + parsed.size_code)
            .ok_or(Error::OutOfBounds)
    }

    /// The blob at `index` of the `#Blob` image, without its length prefix.
    ///
    /// # Errors
    /// Returns [`Error::OutOfBounds`] if `index` or the blob length lies outside the image.
    pub fn blob(&self, index: u32) -> Result<&[u8]> {
        let mut parser = Parser::new(&self.blobs);
        parser.seek(index as usize)?;
        let length = parser.read_compressed_uint()?;
        parser.read_bytes(length as usize)
    }

    /// The string at `index` of the `#Strings` image.
    #[must_use]
    pub fn string(&self, index: u32) -> Option<&str> {
        let tail = self.strings.get(index as usize..)?;
        let end = tail.iter().position(|byte| *byte == 0)?;
        std::str::from_utf8(&tail[..end]).ok()
    }
}
