//! Exception handling clauses of CIL method bodies.
//!
//! The EH table of a method body (ECMA-335 II.25.4.6) is a flat list without nesting pointers.
//! The runtime searches it front to back, so a clause protecting code inside another clause must
//! come first. [`sort_exception_handlers`] establishes that order.

use std::ops::Range;

use bitflags::bitflags;

use crate::metadata::token::TokenRef;

bitflags! {
    /// Exception handler flags defining the type of exception handling clause.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ExceptionHandlerFlags: u16 {
        /// A typed exception clause.
        ///
        /// `class_token` names the exception type that this handler catches.
        const EXCEPTION = 0x0000;

        /// An exception filter and handler clause.
        ///
        /// The filter block starts at `filter_offset` and ends where the handler starts.
        const FILTER = 0x0001;

        /// A finally clause.
        const FINALLY = 0x0002;

        /// A fault clause (finally that executes only on exception).
        const FAULT = 0x0004;
    }
}

/// One try region together with its handler.
///
/// # Layout in IL
///
/// ```text
/// try {
///     // try_offset -> try_offset + try_length
/// }
/// catch (ExceptionType) {
///     // handler_offset -> handler_offset + handler_length
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExceptionHandler {
    /// Flags describing the type of exception handler (catch, filter, finally, fault).
    pub flags: ExceptionHandlerFlags,
    /// Offset in bytes of try block from start of the code.
    pub try_offset: u32,
    /// Length in bytes of the try block.
    pub try_length: u32,
    /// Location of the handler for this try block.
    pub handler_offset: u32,
    /// Size of the handler code in bytes.
    pub handler_length: u32,
    /// Exception type caught by an [`ExceptionHandlerFlags::EXCEPTION`] clause.
    pub class_token: Option<TokenRef>,
    /// Offset of the filter block of an [`ExceptionHandlerFlags::FILTER`] clause.
    pub filter_offset: u32,
}

impl ExceptionHandler {
    /// A typed catch clause.
    #[must_use]
    pub fn catch(try_range: Range<u32>, handler_range: Range<u32>, class: TokenRef) -> Self {
        Self::with_ranges(ExceptionHandlerFlags::EXCEPTION, try_range, handler_range)
            .with_class(class)
    }

    /// A finally clause.
    #[must_use]
    pub fn finally(try_range: Range<u32>, handler_range: Range<u32>) -> Self {
        Self::with_ranges(ExceptionHandlerFlags::FINALLY, try_range, handler_range)
    }

    /// A fault clause.
    #[must_use]
    pub fn fault(try_range: Range<u32>, handler_range: Range<u32>) -> Self {
        Self::with_ranges(ExceptionHandlerFlags::FAULT, try_range, handler_range)
    }

    /// A filter clause whose filter block starts at `filter_offset`.
    #[must_use]
    pub fn filter(try_range: Range<u32>, filter_offset: u32, handler_range: Range<u32>) -> Self {
        let mut handler =
            Self::with_ranges(ExceptionHandlerFlags::FILTER, try_range, handler_range);
        handler.filter_offset = filter_offset;
        handler
    }

    fn with_ranges(
        flags: ExceptionHandlerFlags,
        try_range: Range<u32>,
        handler_range: Range<u32>,
    ) -> Self {
        ExceptionHandler {
            flags,
            try_offset: try_range.start,
            try_length: try_range.end.saturating_sub(try_range.start),
            handler_offset: handler_range.start,
            handler_length: handler_range.end.saturating_sub(handler_range.start),
            class_token: None,
            filter_offset: 0,
        }
    }

    fn with_class(mut self, class: TokenRef) -> Self {
        self.class_token = Some(class);
        self
    }

    /// Range of the protected block.
    #[must_use]
    pub fn try_range(&self) -> Range<u32> {
        self.try_offset..self.try_offset + self.try_length
    }

    /// Range of the handler block.
    #[must_use]
    pub fn handler_range(&self) -> Range<u32> {
        self.handler_offset..self.handler_offset + self.handler_length
    }

    /// Range of the filter block, for filter clauses.
    #[must_use]
    pub fn filter_range(&self) -> Option<Range<u32>> {
        if self.flags == ExceptionHandlerFlags::FILTER {
            Some(self.filter_offset..self.handler_offset)
        } else {
            None
        }
    }

    /// The clause's last 4-byte field: class token, filter offset or zero.
    #[must_use]
    pub fn class_or_filter(&self) -> u32 {
        match (self.flags, self.class_token) {
            (ExceptionHandlerFlags::FILTER, _) => self.filter_offset,
            (_, Some(token)) => token.encoded(),
            (_, None) => 0,
        }
    }

    /// Returns `true` if every offset and length fits the small clause format.
    #[must_use]
    pub fn fits_small(&self) -> bool {
        self.try_offset <= 0xFFFF
            && self.try_length <= 0xFF
            && self.handler_offset <= 0xFFFF
            && self.handler_length <= 0xFF
    }

    /// Returns `true` if this clause's try block lies inside a block of `outer`.
    ///
    /// Clauses sharing the same try block are not nested in each other.
    #[must_use]
    pub fn is_nested_in(&self, outer: &ExceptionHandler) -> bool {
        let inner = self.try_range();
        let contains = |block: Range<u32>| {
            block != inner && block.start <= inner.start && inner.end <= block.end
        };

        contains(outer.try_range())
            || contains(outer.handler_range())
            || outer.filter_range().is_some_and(contains)
    }
}

/// Orders clauses so that a clause always precedes every clause it is nested in.
///
/// Unrelated clauses keep their relative order. Input that contains a nesting cycle, which
/// well-formed IL cannot produce, falls back to declaration order for the remaining clauses.
pub fn sort_exception_handlers(handlers: &mut Vec<ExceptionHandler>) {
    let count = handlers.len();
    let mut placed = vec![false; count];
    let mut order = Vec::with_capacity(count);

    while order.len() < count {
        let ready = (0..count).find(|&candidate| {
            !placed[candidate]
                && (0..count).all(|other| {
                    placed[other]
                        || other == candidate
                        || !handlers[other].is_nested_in(&handlers[candidate])
                })
        });
        let next = match ready.or_else(|| (0..count).find(|&index| !placed[index])) {
            Some(next) => next,
            None => break,
        };
        placed[next] = true;
        order.push(next);
    }

    let mut sorted: Vec<ExceptionHandler> = order.iter().map(|&i| handlers[i].clone()).collect();
    std::mem::swap(handlers, &mut sorted);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::token::Token;

    #[test]
    fn nested_try_sorts_first() {
        let outer = ExceptionHandler::finally(0..10, 10..15);
        let inner = ExceptionHandler::finally(2..8, 15..17);

        let mut handlers = vec![outer.clone(), inner.clone()];
        sort_exception_handlers(&mut handlers);
        assert_eq!(handlers, vec![inner, outer]);
    }

    #[test]
    fn clause_inside_handler_sorts_first() {
        let outer = ExceptionHandler::finally(0..2, 2..40);
        let inner = ExceptionHandler::fault(5..30, 30..35);

        let mut handlers = vec![outer.clone(), inner.clone()];
        sort_exception_handlers(&mut handlers);
        assert_eq!(handlers, vec![inner, outer]);
    }

    #[test]
    fn unrelated_clauses_keep_declaration_order() {
        let class = TokenRef::Real(Token::new(0x0100_0001));
        let first = ExceptionHandler::catch(0..4, 4..8, class);
        let second = ExceptionHandler::catch(0..4, 8..12, class);
        let third = ExceptionHandler::finally(20..24, 24..26);

        let mut handlers = vec![first.clone(), second.clone(), third.clone()];
        sort_exception_handlers(&mut handlers);
        assert_eq!(handlers, vec![first, second, third]);
    }

    #[test]
    fn class_or_filter_selects_field() {
        let class = TokenRef::Real(Token::new(0x0100_0005));
        assert_eq!(
            ExceptionHandler::catch(0..1, 1..2, class).class_or_filter(),
            0x0100_0005
        );
        assert_eq!(ExceptionHandler::filter(0..1, 1, 3..4).class_or_filter(), 1);
        assert_eq!(ExceptionHandler::finally(0..1, 1..2).class_or_filter(), 0);
    }
}
