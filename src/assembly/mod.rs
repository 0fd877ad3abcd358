//! CIL instruction generation.
//!
//! - [`opcodes`] holds the ECMA-335 opcode table with operand kinds and stack effects
//! - [`ILGenerator`] appends instructions to one method body, resolving labels and tracking the
//!   evaluation stack
//!
//! # References
//! - ECMA-335 6th Edition, Partition III - CIL Instruction Set

mod generator;
pub mod opcodes;

pub use generator::{FinishedIl, ILGenerator, Label, LocalBuilder};
pub use opcodes::{FlowType, OpCode, OperandType};
