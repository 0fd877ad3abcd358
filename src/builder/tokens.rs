//! Pending token bookkeeping.
//!
//! Methods, fields, parameters, properties, events and generic parameters receive their final
//! row only when the module is baked. Until then they are referenced through a [`PendingId`].
//! [`TokenTable`] hands out those ids, records the real token each one ends up as, and keeps
//! the positions in the IL stream where a placeholder has to be overwritten.

use log::debug;

use crate::{
    metadata::token::{PendingId, Token, TokenRef},
    Error, Result,
};

/// A placeholder in the IL stream that receives the real token of `pending`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenFixup {
    /// Offset of the 4-byte operand in the IL stream
    pub offset: usize,
    /// The placeholder written at `offset`
    pub pending: PendingId,
}

/// Side table mapping pending ids to real tokens.
///
/// # Examples
///
/// ```rust
/// use dotemit::builder::TokenTable;
/// use dotemit::metadata::token::Token;
///
/// let mut tokens = TokenTable::new();
/// let first = tokens.alloc()?;
/// let second = tokens.alloc()?;
/// assert!(second.placeholder() < first.placeholder());
///
/// tokens.register(first, Token::new(0x0600_0001))?;
/// assert_eq!(tokens.resolve(first)?, Token::new(0x0600_0001));
/// assert!(tokens.resolve(second).is_err());
/// assert_eq!(tokens.unresolved()?, vec![second]);
/// # Ok::<(), dotemit::Error>(())
/// ```
#[derive(Debug, Clone, Default)]
pub struct TokenTable {
    mappings: Vec<Option<Token>>,
    registrations: Vec<usize>,
    fixups: Vec<TokenFixup>,
}

/// A state of a [`TokenTable`] that [`TokenTable::rollback`] returns to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenCheckpoint {
    registrations: usize,
    fixups: usize,
}

/// The id stored in `mappings[index]`.
fn pending_at(index: usize) -> Result<PendingId> {
    u32::try_from(index + 1)
        .ok()
        .filter(|&id| i32::try_from(id).is_ok())
        .map(PendingId::new)
        .ok_or_else(|| Error::NotSupported(format!("pending token #{} exceeds i32::MAX", index + 1)))
}

impl TokenTable {
    /// Create an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a fresh pending id.
    ///
    /// # Errors
    /// Returns [`Error::NotSupported`] once the placeholders no longer fit a negative `i32`.
    pub fn alloc(&mut self) -> Result<PendingId> {
        let id = pending_at(self.mappings.len())?;
        self.mappings.push(None);
        Ok(id)
    }

    /// Number of ids handed out.
    #[must_use]
    pub fn len(&self) -> usize {
        self.mappings.len()
    }

    /// Returns `true` if no id was handed out.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.mappings.is_empty()
    }

    fn slot(&self, pending: PendingId) -> Result<usize> {
        let index = (pending.id() as usize).wrapping_sub(1);
        if index < self.mappings.len() {
            Ok(index)
        } else {
            Err(Error::UnresolvedToken(format!(
                "{} was not allocated by this table",
                pending
            )))
        }
    }

    /// Record the real token of `pending`.
    ///
    /// # Errors
    /// Returns [`Error::TokenAlreadyRegistered`] on a second registration of the same id.
    pub fn register(&mut self, pending: PendingId, real: Token) -> Result<()> {
        let slot = self.slot(pending)?;
        match self.mappings[slot] {
            Some(existing) => Err(Error::TokenAlreadyRegistered(format!(
                "{} is already mapped to {}",
                pending, existing
            ))),
            None => {
                self.mappings[slot] = Some(real);
                self.registrations.push(slot);
                Ok(())
            }
        }
    }

    /// The real token registered for `pending`.
    ///
    /// # Errors
    /// Returns [`Error::UnresolvedToken`] if nothing was registered yet.
    pub fn resolve(&self, pending: PendingId) -> Result<Token> {
        let slot = self.slot(pending)?;
        self.mappings[slot]
            .ok_or_else(|| Error::UnresolvedToken(format!("{} has no real token", pending)))
    }

    /// Resolve a token reference, passing real tokens through.
    ///
    /// # Errors
    /// See [`TokenTable::resolve`].
    pub fn resolve_ref(&self, token: TokenRef) -> Result<Token> {
        match token {
            TokenRef::Real(token) => Ok(token),
            TokenRef::Pending(pending) => self.resolve(pending),
        }
    }

    /// Ids that never received a real token.
    ///
    /// # Errors
    /// Returns [`Error::NotSupported`] for an id [`TokenTable::alloc`] could not have produced.
    pub fn unresolved(&self) -> Result<Vec<PendingId>> {
        self.mappings
            .iter()
            .enumerate()
            .filter(|(_, mapping)| mapping.is_none())
            .map(|(index, _)| pending_at(index))
            .collect()
    }

    /// The current registrations and fixups.
    #[must_use]
    pub fn checkpoint(&self) -> TokenCheckpoint {
        TokenCheckpoint {
            registrations: self.registrations.len(),
            fixups: self.fixups.len(),
        }
    }

    /// Undo registrations and fixups made after `checkpoint`.
    ///
    /// Allocated ids stay allocated and can be registered again.
    pub fn rollback(&mut self, checkpoint: TokenCheckpoint) {
        let undone = self.registrations.len().saturating_sub(checkpoint.registrations);
        for slot in self.registrations.drain(checkpoint.registrations.min(self.registrations.len())..) {
            self.mappings[slot] = None;
        }
        self.fixups.truncate(checkpoint.fixups);
        debug!("Rolled back {} token registrations", undone);
    }

    /// Queue a placeholder at `offset` of the IL stream for rewriting.
    pub fn queue_fixup(&mut self, offset: usize, pending: PendingId) {
        self.fixups.push(TokenFixup { offset, pending });
    }

    /// Queued placeholders.
    #[must_use]
    pub fn fixups(&self) -> &[TokenFixup] {
        &self.fixups
    }

    /// Overwrite every queued placeholder in `stream` with its real token.
    ///
    /// # Errors
    /// Returns [`Error::UnresolvedToken`] if a placeholder has no mapping and
    /// [`Error::OutOfBounds`] if an offset lies outside `stream`.
    pub fn apply_fixups(&self, stream: &mut [u8]) -> Result<usize> {
        for fixup in &self.fixups {
            let token = self.resolve(fixup.pending)?;
            let Some(slot) = stream.get_mut(fixup.offset..fixup.offset + 4) else {
                return Err(Error::OutOfBounds);
            };
            let placeholder = fixup.pending.placeholder().to_le_bytes();
            if slot != placeholder {
                return Err(malformed_error!(
                    "Expected placeholder for {} at offset {:#x}",
                    fixup.pending,
                    fixup.offset
                ));
            }
            slot.copy_from_slice(&token.value().to_le_bytes());
        }
        debug!("Resolved {} token fixups", self.fixups.len());
        Ok(self.fixups.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_twice_fails() -> Result<()> {
        let mut tokens = TokenTable::new();
        let id = tokens.alloc()?;
        tokens.register(id, Token::new(0x0400_0001))?;
        assert!(matches!(
            tokens.register(id, Token::new(0x0400_0002)),
            Err(Error::TokenAlreadyRegistered(_))
        ));
        Ok(())
    }

    #[test]
    fn foreign_ids_are_rejected() {
        let tokens = TokenTable::new();
        assert!(matches!(
            tokens.resolve(PendingId::new(3)),
            Err(Error::UnresolvedToken(_))
        ));
    }

    #[test]
    fn fixups_rewrite_placeholders() -> Result<()> {
        let mut tokens = TokenTable::new();
        let id = tokens.alloc()?;
        let mut stream = vec![0x28];
        stream.extend_from_slice(&id.placeholder().to_le_bytes());
        tokens.queue_fixup(1, id);

        assert!(tokens.apply_fixups(&mut stream).is_err());
        tokens.register(id, Token::new(0x0600_0002))?;
        assert_eq!(tokens.apply_fixups(&mut stream)?, 1);
        assert_eq!(stream, [0x28, 0x02, 0x00, 0x00, 0x06]);
        Ok(())
    }

    #[test]
    fn rollback_forgets_later_registrations() -> Result<()> {
        let mut tokens = TokenTable::new();
        let kept = tokens.alloc()?;
        tokens.register(kept, Token::new(0x0600_0001))?;
        let checkpoint = tokens.checkpoint();

        let undone = tokens.alloc()?;
        tokens.register(undone, Token::new(0x0600_0002))?;
        tokens.queue_fixup(0, undone);
        tokens.rollback(checkpoint);

        assert_eq!(tokens.resolve(kept)?, Token::new(0x0600_0001));
        assert_eq!(tokens.unresolved()?, vec![undone]);
        assert!(tokens.fixups().is_empty());
        tokens.register(undone, Token::new(0x0600_0002))?;
        assert_eq!(tokens.resolve(undone)?, Token::new(0x0600_0002));
        Ok(())
    }

    #[test]
    fn ids_beyond_i32_are_rejected() {
        assert!(pending_at(0).is_ok());
        assert!(matches!(
            pending_at(i32::MAX as usize),
            Err(Error::NotSupported(_))
        ));
    }

    #[test]
    fn resolve_ref_passes_real_tokens() -> Result<()> {
        let tokens = TokenTable::new();
        let real = Token::new(0x0A00_0001);
        assert_eq!(tokens.resolve_ref(TokenRef::Real(real))?, real);
        Ok(())
    }
}
