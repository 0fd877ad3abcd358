//! Method body encoding.
//!
//! - [`MethodBodyEncoder`] turns finished IL code, locals and exception clauses into the binary
//!   body (tiny or fat header, small or fat EH section)
//! - [`MethodBody`] parses such a body back
//! - [`ExceptionHandler`] describes one exception handling clause
//!
//! # References
//! - ECMA-335 6th Edition, Partition II, Section 25.4 - Method bodies

mod body;
mod exceptions;
mod types;

pub use body::{EncodedMethodBody, MethodBody, MethodBodyEncoder};
pub use exceptions::{sort_exception_handlers, ExceptionHandler, ExceptionHandlerFlags};
pub use types::*;
