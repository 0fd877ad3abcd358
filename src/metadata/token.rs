//! Metadata tokens, real and pending.
//!
//! A [`Token`] is the 32-bit identifier ECMA-335 uses to name a row: the table id in the high
//! byte and a 1-based row index in the low 24 bits. While a module is being staged some rows do
//! not have a position yet (methods, fields, parameters, properties and events are numbered when
//! their declaring types bake), so references to them are handed out as
//! [`TokenRef::Pending`] and rewritten once the real row is known.
//!
//! # Examples
//!
//! ```rust
//! use dotemit::metadata::{tables::TableId, token::{PendingId, Token, TokenRef}};
//!
//! let token = Token::from_parts(TableId::MethodDef, 1);
//! assert_eq!(token.value(), 0x0600_0001);
//!
//! let pending = TokenRef::Pending(PendingId::new(1));
//! assert_eq!(pending.encoded(), 0xFFFF_FFFF);
//! ```

use std::fmt;

use crate::metadata::tables::TableId;

/// A real metadata token: `table << 24 | row`.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Token(pub u32);

impl Token {
    /// Create a new token from its raw value.
    #[must_use]
    pub fn new(value: u32) -> Self {
        Token(value)
    }

    /// Create a token from a table id and a 1-based row index.
    #[must_use]
    pub fn from_parts(table: TableId, row: u32) -> Self {
        Token(((table as u32) << 24) | (row & 0x00FF_FFFF))
    }

    /// Raw 32-bit value.
    #[must_use]
    pub fn value(&self) -> u32 {
        self.0
    }

    /// Table id byte.
    #[must_use]
    pub fn table(&self) -> u8 {
        (self.0 >> 24) as u8
    }

    /// Row index (1-based; 0 means null).
    #[must_use]
    pub fn row(&self) -> u32 {
        self.0 & 0x00FF_FFFF
    }

    /// Returns `true` for the null token.
    #[must_use]
    pub fn is_null(&self) -> bool {
        self.0 == 0
    }

    /// Returns `true` if this token belongs to `table`.
    #[must_use]
    pub fn is_table(&self, table: TableId) -> bool {
        self.table() == table as u8
    }
}

impl From<u32> for Token {
    fn from(value: u32) -> Self {
        Token(value)
    }
}

impl From<Token> for u32 {
    fn from(token: Token) -> Self {
        token.0
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Token(0x{:08x}, table: 0x{:02x}, row: {})",
            self.0,
            self.table(),
            self.row()
        )
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08x}", self.0)
    }
}

/// Identifier of a pseudo-token handed out before the referenced row exists.
///
/// Ids start at 1 and increase per allocation within one module. The 4-byte placeholder written
/// into IL streams is the negated id, so placeholders decrease strictly from `-1`.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct PendingId(u32);

impl PendingId {
    /// Wrap a raw id. Ids are 1-based.
    #[must_use]
    pub fn new(id: u32) -> Self {
        PendingId(id)
    }

    /// The raw id.
    #[must_use]
    pub fn id(&self) -> u32 {
        self.0
    }

    /// The negative placeholder value written in place of the real token.
    #[must_use]
    pub fn placeholder(&self) -> i32 {
        #[allow(clippy::cast_possible_wrap)]
        let id = self.0 as i32;
        -id
    }
}

impl fmt::Display for PendingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "pending#{}", self.0)
    }
}

/// A token as seen during staging: either already real, or waiting for a fixup.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub enum TokenRef {
    /// A token whose row is final
    Real(Token),
    /// A pseudo-token that will be rewritten during the module's resolution pass
    Pending(PendingId),
}

impl TokenRef {
    /// The 4-byte value to write now: the real token, or the negative placeholder.
    #[must_use]
    pub fn encoded(&self) -> u32 {
        match self {
            TokenRef::Real(token) => token.value(),
            #[allow(clippy::cast_sign_loss)]
            TokenRef::Pending(id) => id.placeholder() as u32,
        }
    }

    /// Returns the real token if already known.
    #[must_use]
    pub fn real(&self) -> Option<Token> {
        match self {
            TokenRef::Real(token) => Some(*token),
            TokenRef::Pending(_) => None,
        }
    }

    /// Returns `true` while the token still needs a fixup.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        matches!(self, TokenRef::Pending(_))
    }
}

impl From<Token> for TokenRef {
    fn from(token: Token) -> Self {
        TokenRef::Real(token)
    }
}

impl From<PendingId> for TokenRef {
    fn from(id: PendingId) -> Self {
        TokenRef::Pending(id)
    }
}

impl fmt::Display for TokenRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenRef::Real(token) => write!(f, "{token}"),
            TokenRef::Pending(id) => write!(f, "{id}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_parts() {
        let token = Token::from_parts(TableId::TypeDef, 5);
        assert_eq!(token.value(), 0x0200_0005);
        assert_eq!(token.table(), 0x02);
        assert_eq!(token.row(), 5);
        assert!(token.is_table(TableId::TypeDef));
        assert!(!token.is_table(TableId::TypeRef));
    }

    #[test]
    fn test_token_is_null() {
        assert!(Token(0).is_null());
        assert!(!Token(0x0600_0001).is_null());
    }

    #[test]
    fn test_token_display() {
        assert_eq!(format!("{}", Token(0x0600_0001)), "0x06000001");
        let debug_str = format!("{:?}", Token(0x0600_0001));
        assert!(debug_str.contains("table: 0x06"));
        assert!(debug_str.contains("row: 1"));
    }

    #[test]
    fn test_placeholders_strictly_decrease() {
        let first = PendingId::new(1).placeholder();
        let second = PendingId::new(2).placeholder();
        assert_eq!(first, -1);
        assert!(second < first);
        assert_eq!(TokenRef::Pending(PendingId::new(2)).encoded(), 0xFFFF_FFFE);
    }

    #[test]
    fn test_token_ref() {
        let real = TokenRef::from(Token(0x0A00_0003));
        assert_eq!(real.real(), Some(Token(0x0A00_0003)));
        assert!(!real.is_pending());

        let pending = TokenRef::from(PendingId::new(7));
        assert!(pending.is_pending());
        assert_eq!(pending.real(), None);
        assert_eq!(pending.to_string(), "pending#7");
    }
}
