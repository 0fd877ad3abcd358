//! Capabilities shared by the staged entities of a module.

use crate::{
    builder::TokenTable,
    metadata::{
        signatures::TypeResolver,
        tables::TableId,
        token::{PendingId, TokenRef},
    },
    Error, Result,
};

/// An entity whose row is assigned when the module is baked.
///
/// The pending id is allocated on the first request, so entities that are never referenced
/// before baking never consume one.
pub trait HasToken {
    /// The table the entity's row lives in.
    fn table(&self) -> TableId;

    /// The entity's pending id slot.
    fn token_slot(&mut self) -> &mut Option<PendingId>;

    /// The token IL and attributes use to refer to the entity before baking.
    ///
    /// # Errors
    /// Returns [`Error::NotSupported`] if the table runs out of pending ids.
    fn token_ref(&mut self, tokens: &mut TokenTable) -> Result<TokenRef> {
        let slot = self.token_slot();
        let id = match *slot {
            Some(id) => id,
            None => *slot.insert(tokens.alloc()?),
        };
        Ok(TokenRef::Pending(id))
    }
}

/// An entity carrying a signature blob.
pub trait HasSignature {
    /// Encode the entity's signature, binding type handles through `resolver`.
    ///
    /// # Errors
    /// Returns an error if a type cannot be resolved or encoded.
    fn signature_blob(&self, resolver: &mut dyn TypeResolver) -> Result<Vec<u8>>;
}

/// An entity that is frozen once baked.
pub trait Bakeable {
    /// Returns `true` once the entity was baked.
    fn is_baked(&self) -> bool;

    /// Name used in error messages.
    fn describe(&self) -> String;

    /// Fail with [`Error::AlreadyBaked`] if the entity can no longer change.
    ///
    /// # Errors
    /// Returns [`Error::AlreadyBaked`] after baking.
    fn ensure_open(&self) -> Result<()> {
        if self.is_baked() {
            Err(Error::AlreadyBaked(self.describe()))
        } else {
            Ok(())
        }
    }
}
