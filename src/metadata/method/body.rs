//! Encoding and parsing of CIL method bodies.
//!
//! A method body is a header followed by the IL code and, for fat bodies, optional data
//! sections holding the exception handling table. Two header formats exist:
//!
//! - **Tiny** (1 byte): code shorter than 64 bytes, no locals, no exception handlers and an
//!   evaluation stack of at most 8 entries
//! - **Fat** (12 bytes, 4-byte aligned): everything else
//!
//! [`MethodBodyEncoder`] picks the smallest format that can describe a body, and
//! [`MethodBody::parse`] reads an encoded body back.
//!
//! # Examples
//!
//! ```rust
//! use dotemit::metadata::method::{MethodBody, MethodBodyEncoder};
//!
//! // ldarg.1; ldarg.2; add; ret
//! let encoded = MethodBodyEncoder::new(&[0x03, 0x04, 0x58, 0x2A]).max_stack(2).encode()?;
//! assert_eq!(encoded.bytes, [0x12, 0x03, 0x04, 0x58, 0x2A]);
//!
//! let body = MethodBody::parse(&encoded.bytes)?;
//! assert!(!body.is_fat);
//! assert_eq!(body.size_code, 4);
//! # Ok::<(), dotemit::Error>(())
//! ```
//!
//! # References
//! - ECMA-335 6th Edition, Partition II, Section 25.4 - Common Intermediate Language physical layout

use crate::{
    metadata::{
        method::{
            sort_exception_handlers, ExceptionHandler, ExceptionHandlerFlags, MethodBodyFlags,
            SectionFlags, FAT_HEADER_DWORDS, TINY_MAX_CODE_SIZE, TINY_MAX_STACK,
        },
        token::{PendingId, Token, TokenRef},
    },
    utils::{ByteBuffer, Parser},
    Error::OutOfBounds,
    Result,
};

/// Size of one clause in a small EH section.
const SMALL_CLAUSE_SIZE: usize = 12;
/// Size of one clause in a fat EH section.
const FAT_CLAUSE_SIZE: usize = 24;
/// Largest data size of a small EH section.
const SMALL_SECTION_MAX: usize = 0xFF;

/// Describes one method body that has been encoded to bytes.
///
/// Produced by [`MethodBody::parse`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodBody {
    /// Size of the method (length of all instructions, not counting the header) in bytes
    pub size_code: usize,
    /// Size of the method header in bytes
    pub size_header: usize,
    /// `MetaData` token for a signature describing the layout of the local variables for the method. 0 == no local variables
    pub local_var_sig_token: u32,
    /// Maximum number of items on the operand stack
    pub max_stack: usize,
    /// Flag, indicating the type of the method header
    pub is_fat: bool,
    /// Flag, indicating to call default constructor on all local variables
    pub is_init_local: bool,
    /// Flag, indicating if this method does have exception handlers
    pub is_exception_data: bool,
    /// A list of exception handlers this method has
    pub exception_handlers: Vec<ExceptionHandler>,
}

impl MethodBody {
    /// Parse an encoded method body.
    ///
    /// # Arguments
    /// * `data` - The bytes starting at the method header
    ///
    /// # Errors
    /// Returns an error if the data is empty, out of bounds, or malformed.
    pub fn parse(data: &[u8]) -> Result<MethodBody> {
        if data.is_empty() {
            return Err(malformed_error!("Provided data for body parsing is empty"));
        }

        let first_byte = data[0];
        match MethodBodyFlags::from_bits_truncate(u16::from(first_byte & 0b_0000_0011_u8)) {
            MethodBodyFlags::TINY_FORMAT => {
                let size_code = (first_byte >> 2) as usize;
                if size_code + 1 > data.len() {
                    return Err(OutOfBounds);
                }

                Ok(MethodBody {
                    size_code,
                    size_header: 1,
                    local_var_sig_token: 0,
                    max_stack: usize::from(TINY_MAX_STACK),
                    is_fat: false,
                    is_init_local: false,
                    is_exception_data: false,
                    exception_handlers: Vec::new(),
                })
            }
            MethodBodyFlags::FAT_FORMAT => Self::parse_fat(data),
            _ => Err(malformed_error!(
                "MethodHeader is neither FAT nor TINY - {}",
                first_byte
            )),
        }
    }

    fn parse_fat(data: &[u8]) -> Result<MethodBody> {
        if data.len() < 12 {
            return Err(OutOfBounds);
        }

        let mut parser = Parser::new(data);
        let first_duo = parser.read_le::<u16>()?;
        let max_stack = usize::from(parser.read_le::<u16>()?);
        let size_code = parser.read_le::<u32>()? as usize;
        let local_var_sig_token = parser.read_le::<u32>()?;

        let size_header = usize::from(first_duo >> 12) * 4;
        if size_header < 12 || data.len() < size_code + size_header {
            return Err(OutOfBounds);
        }

        let flags_header = MethodBodyFlags::from_bits_truncate(first_duo & 0x0FFF);

        let mut exception_handlers = Vec::new();
        if flags_header.contains(MethodBodyFlags::MORE_SECTS) {
            parser.seek(size_header + size_code)?;
            parser.align(4)?;

            loop {
                let section = SectionFlags::from_bits_truncate(parser.read_le::<u8>()?);
                let is_fat = section.contains(SectionFlags::FAT_FORMAT);
                let data_size = if is_fat {
                    let low = u32::from(parser.read_le::<u16>()?);
                    let high = u32::from(parser.read_le::<u8>()?);
                    (low | (high << 16)) as usize
                } else {
                    let size = usize::from(parser.read_le::<u8>()?);
                    parser.advance_by(2)?;
                    size
                };
                if data_size < 4 {
                    return Err(malformed_error!("Invalid method data section size {}", data_size));
                }

                if section.contains(SectionFlags::EHTABLE) {
                    let clause_size = if is_fat {
                        FAT_CLAUSE_SIZE
                    } else {
                        SMALL_CLAUSE_SIZE
                    };
                    for _ in 0..(data_size - 4) / clause_size {
                        exception_handlers.push(read_clause(&mut parser, is_fat)?);
                    }
                } else {
                    parser.advance_by(data_size - 4)?;
                }

                if !section.contains(SectionFlags::MORE_SECTS) {
                    break;
                }
                parser.align(4)?;
            }
        }

        Ok(MethodBody {
            size_code,
            size_header,
            local_var_sig_token,
            max_stack,
            is_fat: true,
            is_init_local: flags_header.contains(MethodBodyFlags::INIT_LOCALS),
            is_exception_data: !exception_handlers.is_empty(),
            exception_handlers,
        })
    }

    /// Get the size of header and code, excluding any data sections
    #[must_use]
    pub fn size(&self) -> usize {
        self.size_code + self.size_header
    }
}

fn read_clause(parser: &mut Parser, is_fat: bool) -> Result<ExceptionHandler> {
    let (flags, try_offset, try_length, handler_offset, handler_length) = if is_fat {
        // Clause flags only use the low 16 bits
        #[allow(clippy::cast_possible_truncation)]
        let flags = parser.read_le::<u32>()? as u16;
        (
            flags,
            parser.read_le::<u32>()?,
            parser.read_le::<u32>()?,
            parser.read_le::<u32>()?,
            parser.read_le::<u32>()?,
        )
    } else {
        (
            parser.read_le::<u16>()?,
            u32::from(parser.read_le::<u16>()?),
            u32::from(parser.read_le::<u8>()?),
            u32::from(parser.read_le::<u16>()?),
            u32::from(parser.read_le::<u8>()?),
        )
    };
    let class_or_filter = parser.read_le::<u32>()?;
    let flags = ExceptionHandlerFlags::from_bits_truncate(flags);

    let (class_token, filter_offset) = match flags {
        ExceptionHandlerFlags::FILTER => (None, class_or_filter),
        ExceptionHandlerFlags::EXCEPTION => {
            (Some(TokenRef::Real(Token::new(class_or_filter))), 0)
        }
        _ => (None, 0),
    };

    Ok(ExceptionHandler {
        flags,
        try_offset,
        try_length,
        handler_offset,
        handler_length,
        class_token,
        filter_offset,
    })
}

/// The output of [`MethodBodyEncoder::encode`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedMethodBody {
    /// Header, code and data sections
    pub bytes: Vec<u8>,
    /// `true` for a fat header, which must start on a 4-byte boundary
    pub is_fat: bool,
    /// Offset of the code within `bytes`
    pub code_offset: usize,
    /// Offsets within `bytes` of pending class tokens written into EH clauses
    pub pending_tokens: Vec<(usize, PendingId)>,
}

/// Builds the binary form of a method body from finished IL code.
///
/// Exception handlers are sorted innermost first before they are written.
#[derive(Debug, Clone)]
pub struct MethodBodyEncoder<'a> {
    code: &'a [u8],
    max_stack: u16,
    local_var_sig_token: u32,
    init_locals: bool,
    force_fat: bool,
    exception_handlers: Vec<ExceptionHandler>,
}

impl<'a> MethodBodyEncoder<'a> {
    /// Start encoding `code`.
    #[must_use]
    pub fn new(code: &'a [u8]) -> Self {
        MethodBodyEncoder {
            code,
            max_stack: 0,
            local_var_sig_token: 0,
            init_locals: false,
            force_fat: false,
            exception_handlers: Vec::new(),
        }
    }

    /// Set the maximum evaluation stack depth.
    #[must_use]
    pub fn max_stack(mut self, max_stack: u16) -> Self {
        self.max_stack = max_stack;
        self
    }

    /// Set the `StandAloneSig` token of the local variable signature, 0 for none.
    #[must_use]
    pub fn local_var_sig_token(mut self, token: u32) -> Self {
        self.local_var_sig_token = token;
        self
    }

    /// Request zero-initialization of locals.
    #[must_use]
    pub fn init_locals(mut self, init: bool) -> Self {
        self.init_locals = init;
        self
    }

    /// Always use the fat header.
    #[must_use]
    pub fn force_fat(mut self, force: bool) -> Self {
        self.force_fat = force;
        self
    }

    /// Set the exception handlers.
    #[must_use]
    pub fn exception_handlers(mut self, handlers: Vec<ExceptionHandler>) -> Self {
        self.exception_handlers = handlers;
        self
    }

    /// Returns `true` if the body can use the 1-byte header.
    #[must_use]
    pub fn is_tiny(&self) -> bool {
        !self.force_fat
            && self.code.len() <= TINY_MAX_CODE_SIZE
            && self.max_stack <= TINY_MAX_STACK
            && self.local_var_sig_token == 0
            && self.exception_handlers.is_empty()
    }

    /// Produce the encoded body.
    ///
    /// # Errors
    /// Returns an error if the code or an exception table exceeds the fat format's limits.
    pub fn encode(mut self) -> Result<EncodedMethodBody> {
        let code_size = u32::try_from(self.code.len())
            .map_err(|_| malformed_error!("Method body size exceeds u32 range"))?;

        if self.is_tiny() {
            let mut bytes = Vec::with_capacity(self.code.len() + 1);
            // code_size < 64, so the shifted value fits a byte
            #[allow(clippy::cast_possible_truncation)]
            bytes.push(((code_size as u8) << 2) | MethodBodyFlags::TINY_FORMAT.bits() as u8);
            bytes.extend_from_slice(self.code);
            return Ok(EncodedMethodBody {
                bytes,
                is_fat: false,
                code_offset: 1,
                pending_tokens: Vec::new(),
            });
        }

        let mut flags = MethodBodyFlags::FAT_FORMAT;
        if !self.exception_handlers.is_empty() {
            flags |= MethodBodyFlags::MORE_SECTS;
        }
        if self.init_locals {
            flags |= MethodBodyFlags::INIT_LOCALS;
        }

        let mut buffer = ByteBuffer::with_capacity(12 + self.code.len());
        buffer.write_u16(flags.bits() | (FAT_HEADER_DWORDS << 12));
        buffer.write_u16(self.max_stack);
        buffer.write_u32(code_size);
        buffer.write_u32(self.local_var_sig_token);
        buffer.write_bytes(self.code);

        let mut pending_tokens = Vec::new();
        if !self.exception_handlers.is_empty() {
            sort_exception_handlers(&mut self.exception_handlers);
            buffer.align(4);
            write_eh_section(&mut buffer, &self.exception_handlers, &mut pending_tokens)?;
        }

        Ok(EncodedMethodBody {
            bytes: buffer.into_inner(),
            is_fat: true,
            code_offset: 12,
            pending_tokens,
        })
    }
}

fn write_eh_section(
    buffer: &mut ByteBuffer,
    handlers: &[ExceptionHandler],
    pending_tokens: &mut Vec<(usize, PendingId)>,
) -> Result<()> {
    let small_size = 4 + handlers.len() * SMALL_CLAUSE_SIZE;
    let small = small_size <= SMALL_SECTION_MAX && handlers.iter().all(ExceptionHandler::fits_small);

    if small {
        buffer.write_u8(SectionFlags::EHTABLE.bits());
        // small_size <= 0xFF
        #[allow(clippy::cast_possible_truncation)]
        buffer.write_u8(small_size as u8);
        buffer.write_u16(0);
    } else {
        let fat_size = 4 + handlers.len() * FAT_CLAUSE_SIZE;
        if fat_size > 0x00FF_FFFF {
            return Err(malformed_error!(
                "{} exception handlers exceed the fat section size",
                handlers.len()
            ));
        }
        buffer.write_u8((SectionFlags::EHTABLE | SectionFlags::FAT_FORMAT).bits());
        // fat_size fits 24 bits
        #[allow(clippy::cast_possible_truncation)]
        {
            buffer.write_u16(fat_size as u16);
            buffer.write_u8((fat_size >> 16) as u8);
        }
    }

    for handler in handlers {
        // fits_small() bounds every narrowed field below
        #[allow(clippy::cast_possible_truncation)]
        if small {
            buffer.write_u16(handler.flags.bits());
            buffer.write_u16(handler.try_offset as u16);
            buffer.write_u8(handler.try_length as u8);
            buffer.write_u16(handler.handler_offset as u16);
            buffer.write_u8(handler.handler_length as u8);
        } else {
            buffer.write_u32(u32::from(handler.flags.bits()));
            buffer.write_u32(handler.try_offset);
            buffer.write_u32(handler.try_length);
            buffer.write_u32(handler.handler_offset);
            buffer.write_u32(handler.handler_length);
        }

        if let (ExceptionHandlerFlags::EXCEPTION, Some(TokenRef::Pending(id))) =
            (handler.flags, handler.class_token)
        {
            pending_tokens.push((buffer.len(), id));
        }
        buffer.write_u32(handler.class_or_filter());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tiny() -> Result<()> {
        let encoded = MethodBodyEncoder::new(&[0x02, 0x03, 0x58, 0x2A])
            .max_stack(2)
            .encode()?;
        assert!(!encoded.is_fat);
        assert_eq!(encoded.bytes, [0x12, 0x02, 0x03, 0x58, 0x2A]);

        let body = MethodBody::parse(&encoded.bytes)?;
        assert_eq!(body.size_code, 4);
        assert_eq!(body.size_header, 1);
        assert_eq!(body.size(), 5);
        Ok(())
    }

    #[test]
    fn locals_force_fat() -> Result<()> {
        let code = [0x16, 0x0A, 0x2A];
        let encoded = MethodBodyEncoder::new(&code)
            .max_stack(1)
            .local_var_sig_token(0x1100_0001)
            .init_locals(true)
            .encode()?;
        assert!(encoded.is_fat);
        assert_eq!(encoded.bytes.len(), 12 + code.len());
        assert_eq!(&encoded.bytes[..2], &[0x13, 0x30]);

        let body = MethodBody::parse(&encoded.bytes)?;
        assert!(body.is_fat);
        assert!(body.is_init_local);
        assert_eq!(body.max_stack, 1);
        assert_eq!(body.local_var_sig_token, 0x1100_0001);
        assert_eq!(&encoded.bytes[body.size_header..body.size()], &code);
        Ok(())
    }

    #[test]
    fn size_limits_choose_fat() {
        let code = vec![0x00; 64];
        assert!(MethodBodyEncoder::new(&code[..63]).is_tiny());
        assert!(!MethodBodyEncoder::new(&code).is_tiny());
        assert!(!MethodBodyEncoder::new(&code[..4]).max_stack(9).is_tiny());
        assert!(!MethodBodyEncoder::new(&code[..4]).force_fat(true).is_tiny());
    }

    #[test]
    fn small_exception_section() -> Result<()> {
        let code = vec![0x00; 20];
        let class = TokenRef::Real(Token::new(0x0100_0002));
        let encoded = MethodBodyEncoder::new(&code)
            .max_stack(1)
            .exception_handlers(vec![
                ExceptionHandler::catch(0..10, 10..15, class),
                ExceptionHandler::finally(2..8, 15..17),
            ])
            .encode()?;

        // 12 + 20 = 32, already aligned
        assert_eq!(encoded.bytes[32], 0x01);
        assert_eq!(encoded.bytes[33], 4 + 2 * 12);
        assert_eq!(encoded.bytes.len(), 32 + 4 + 24);

        let body = MethodBody::parse(&encoded.bytes)?;
        assert_eq!(body.exception_handlers.len(), 2);
        assert_eq!(body.exception_handlers[0].flags, ExceptionHandlerFlags::FINALLY);
        assert_eq!(body.exception_handlers[0].try_offset, 2);
        assert_eq!(body.exception_handlers[1].class_token, Some(class));
        Ok(())
    }

    #[test]
    fn fat_exception_section_and_pending_class() -> Result<()> {
        let code = vec![0x00; 0x300];
        let pending = PendingId::new(3);
        let encoded = MethodBodyEncoder::new(&code)
            .exception_handlers(vec![ExceptionHandler::catch(
                0..0x200,
                0x200..0x2FF,
                TokenRef::Pending(pending),
            )])
            .encode()?;

        let section = 12 + 0x300;
        assert_eq!(encoded.bytes[section], 0x41);
        assert_eq!(&encoded.bytes[section + 1..section + 4], &[28, 0, 0]);
        assert_eq!(encoded.pending_tokens, vec![(section + 4 + 20, pending)]);

        let body = MethodBody::parse(&encoded.bytes)?;
        assert_eq!(body.exception_handlers[0].try_length, 0x200);
        assert_eq!(body.exception_handlers[0].handler_length, 0xFF);
        Ok(())
    }

    #[test]
    fn unaligned_code_pads_before_section() -> Result<()> {
        let code = [0x00, 0x00, 0x00, 0x00, 0x00];
        let encoded = MethodBodyEncoder::new(&code)
            .exception_handlers(vec![ExceptionHandler::fault(0..2, 2..4)])
            .encode()?;
        assert_eq!(&encoded.bytes[17..20], &[0, 0, 0]);
        assert_eq!(encoded.bytes[20], 0x01);

        let body = MethodBody::parse(&encoded.bytes)?;
        assert_eq!(body.exception_handlers[0].flags, ExceptionHandlerFlags::FAULT);
        Ok(())
    }

    #[test]
    fn invalid_header() {
        assert!(MethodBody::parse(&[]).is_err());
        assert!(MethodBody::parse(&[0x00]).is_err());
        assert!(MethodBody::parse(&[0x16]).is_err());
        assert!(MethodBody::parse(&[0x03, 0x30, 0x00]).is_err());
    }
}
