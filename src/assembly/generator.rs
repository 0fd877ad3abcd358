//! Streaming CIL generator.
//!
//! [`ILGenerator`] appends instructions to a code buffer while tracking the evaluation stack
//! height, branch labels and exception blocks of one method. Branches to labels that are not
//! marked yet are written as placeholders and patched by [`ILGenerator::finish`] once every label
//! offset is known.
//!
//! # Stack tracking
//!
//! Every label remembers the stack height at which it is first reached. Later references must
//! agree; a mismatch is reported as [`Error::NotSupported`] unless the generator was created with
//! lenient stack tracking. After an instruction that ends control flow (`br`, `ret`, `throw`,
//! `leave`, ...) the height is unknown until the next label is marked; a label first reached in
//! that state starts with an empty stack.
//!
//! # Examples
//!
//! ```rust
//! use dotemit::assembly::{ILGenerator, OpCode};
//!
//! let mut il = ILGenerator::new();
//! let done = il.define_label()?;
//! il.emit_ldarg(0)?;
//! il.emit_branch(OpCode::BRFALSE_S, done)?;
//! il.emit_ldc_i4(1)?;
//! il.emit(OpCode::POP)?;
//! il.mark_label(done)?;
//! il.emit(OpCode::RET)?;
//!
//! let finished = il.finish()?;
//! assert_eq!(finished.code, [0x02, 0x2C, 0x02, 0x17, 0x26, 0x2A]);
//! assert_eq!(finished.max_stack, 1);
//! # Ok::<(), dotemit::Error>(())
//! ```

use std::fmt;

use log::{trace, warn};

use crate::{
    assembly::opcodes::{FlowType, OpCode, OperandType},
    builder::BuilderConfig,
    metadata::{
        method::{ExceptionHandler, ExceptionHandlerFlags},
        signatures::{SignatureLocalVariable, SignatureLocalVariables, SignatureMethod, TypeSignature},
        token::{PendingId, TokenRef},
    },
    utils::ByteBuffer,
    Error, Result,
};

/// A branch target within one generator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Label(u32);

impl Label {
    /// Position of the label in the generator's label table.
    #[must_use]
    pub fn index(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "label#{}", self.0)
    }
}

/// A local variable declared on a generator.
#[derive(Debug, Clone, PartialEq)]
pub struct LocalBuilder {
    index: u16,
    local_type: TypeSignature,
    pinned: bool,
}

impl LocalBuilder {
    /// Slot number used by `ldloc`/`stloc`.
    #[must_use]
    pub fn index(&self) -> u16 {
        self.index
    }

    /// Declared type.
    #[must_use]
    pub fn local_type(&self) -> &TypeSignature {
        &self.local_type
    }

    /// Returns `true` for pinned locals.
    #[must_use]
    pub fn is_pinned(&self) -> bool {
        self.pinned
    }
}

/// Everything a generator produced, with all branch displacements patched.
#[derive(Debug, Clone, PartialEq)]
pub struct FinishedIl {
    /// The IL code
    pub code: Vec<u8>,
    /// Largest tracked evaluation stack height
    pub max_stack: u16,
    /// Declared locals in slot order
    pub locals: Vec<LocalBuilder>,
    /// Exception clauses in the order their blocks were closed
    pub exception_handlers: Vec<ExceptionHandler>,
    /// Offsets in `code` of token operands that still hold placeholders
    pub pending_tokens: Vec<(u32, PendingId)>,
}

impl FinishedIl {
    /// The local variable signature, `None` without locals.
    #[must_use]
    pub fn local_signature(&self) -> Option<SignatureLocalVariables> {
        if self.locals.is_empty() {
            return None;
        }
        Some(SignatureLocalVariables {
            locals: self
                .locals
                .iter()
                .map(|local| SignatureLocalVariable {
                    modifiers: Vec::new(),
                    is_byref: false,
                    is_pinned: local.pinned,
                    base: local.local_type.clone(),
                })
                .collect(),
        })
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct LabelState {
    offset: Option<u32>,
    height: Option<u32>,
}

#[derive(Debug, Clone, Copy)]
struct BranchFixup {
    label: Label,
    position: usize,
    base: u32,
    short: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Segment {
    Try,
    Catch,
    Filter,
    FilterHandler,
    Finally,
    Fault,
}

#[derive(Debug, Clone)]
struct OpenClause {
    flags: ExceptionHandlerFlags,
    try_end: u32,
    handler_start: u32,
    filter_offset: u32,
    class_token: Option<TokenRef>,
}

#[derive(Debug, Clone)]
struct ExceptionBlock {
    try_start: u32,
    try_end: u32,
    end_label: Label,
    segment: Segment,
    clause: Option<OpenClause>,
    has_finally: bool,
}

/// Builds the IL code of one method.
#[derive(Debug, Clone)]
pub struct ILGenerator {
    code: ByteBuffer,
    labels: Vec<LabelState>,
    branch_fixups: Vec<BranchFixup>,
    pending_tokens: Vec<(u32, PendingId)>,
    locals: Vec<LocalBuilder>,
    open_blocks: Vec<ExceptionBlock>,
    exception_handlers: Vec<ExceptionHandler>,
    stack: Option<u32>,
    max_stack: u32,
    returns_value: Option<bool>,
    implicit_leave: bool,
    strict_stack_tracking: bool,
}

impl Default for ILGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl ILGenerator {
    /// Create a generator with the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(&BuilderConfig::default())
    }

    /// Create a generator using the IL related options of `config`.
    #[must_use]
    pub fn with_config(config: &BuilderConfig) -> Self {
        ILGenerator {
            code: ByteBuffer::with_capacity(64),
            labels: Vec::new(),
            branch_fixups: Vec::new(),
            pending_tokens: Vec::new(),
            locals: Vec::new(),
            open_blocks: Vec::new(),
            exception_handlers: Vec::new(),
            stack: Some(0),
            max_stack: 0,
            returns_value: None,
            implicit_leave: config.implicit_leave,
            strict_stack_tracking: config.strict_stack_tracking,
        }
    }

    /// Tell the generator whether the method returns a value, which decides what `ret` pops.
    ///
    /// Without this, `ret` pops one value if the stack is not empty.
    pub fn set_returns_value(&mut self, returns_value: bool) {
        self.returns_value = Some(returns_value);
    }

    /// Offset of the next instruction.
    ///
    /// # Errors
    /// Returns [`Error::NotSupported`] once the code outgrows 32-bit offsets.
    pub fn offset(&self) -> Result<u32> {
        u32::try_from(self.code.len()).map_err(|_| {
            Error::NotSupported(format!("method body of {} bytes", self.code.len()))
        })
    }

    /// Current stack height, `None` after an instruction that ends control flow.
    #[must_use]
    pub fn stack_height(&self) -> Option<u32> {
        self.stack
    }

    /// Largest stack height seen so far.
    #[must_use]
    pub fn max_stack(&self) -> u32 {
        self.max_stack
    }

    /// Declared locals.
    #[must_use]
    pub fn locals(&self) -> &[LocalBuilder] {
        &self.locals
    }

    /// Declare a local variable.
    ///
    /// # Errors
    /// Returns [`Error::NotSupported`] beyond 65535 locals.
    pub fn declare_local(&mut self, local_type: TypeSignature, pinned: bool) -> Result<LocalBuilder> {
        let index = u16::try_from(self.locals.len())
            .ok()
            .filter(|&index| index < u16::MAX)
            .ok_or_else(|| Error::NotSupported("too many local variables".to_string()))?;
        let local = LocalBuilder {
            index,
            local_type,
            pinned,
        };
        self.locals.push(local.clone());
        Ok(local)
    }

    /// Create a new, unmarked label.
    ///
    /// # Errors
    /// Returns [`Error::NotSupported`] beyond `u32::MAX` labels.
    pub fn define_label(&mut self) -> Result<Label> {
        let label = u32::try_from(self.labels.len())
            .map(Label)
            .map_err(|_| Error::NotSupported("too many labels".to_string()))?;
        self.labels.push(LabelState::default());
        Ok(label)
    }

    /// Bind `label` to the current offset.
    ///
    /// # Errors
    /// Returns [`Error::DuplicateLabel`] if the label is already marked and
    /// [`Error::NotSupported`] if branches reach it with a different stack height than the
    /// current one.
    pub fn mark_label(&mut self, label: Label) -> Result<()> {
        let offset = self.offset()?;
        let state = self.label_state(label)?;
        if state.offset.is_some() {
            return Err(Error::DuplicateLabel(format!("{} is already marked", label)));
        }

        let height = match (state.height, self.stack) {
            (Some(required), None) => required,
            (Some(required), Some(current)) => self.reconcile(label, required, current, offset)?,
            (None, Some(current)) => current,
            (None, None) => 0,
        };

        let state = &mut self.labels[label.0 as usize];
        state.offset = Some(offset);
        state.height = Some(height);
        self.stack = Some(height);
        Ok(())
    }

    fn label_state(&self, label: Label) -> Result<LabelState> {
        self.labels
            .get(label.0 as usize)
            .copied()
            .ok_or_else(|| Error::InvalidBranch(format!("{} does not belong to this generator", label)))
    }

    fn reconcile(&self, label: Label, required: u32, current: u32, offset: u32) -> Result<u32> {
        if required == current {
            return Ok(current);
        }
        if self.strict_stack_tracking {
            return Err(Error::NotSupported(format!(
                "backward branch constraint violated at IL_{:04x}: {} expects stack height {} but found {}",
                offset, label, required, current
            )));
        }
        warn!(
            "Stack height mismatch at {} (IL_{:04x}): {} vs {}, using the larger",
            label, offset, required, current
        );
        Ok(required.max(current))
    }

    fn record_target(&mut self, label: Label, height: u32, offset: u32) -> Result<()> {
        let state = self.label_state(label)?;
        let height = match state.height {
            Some(required) => self.reconcile(label, required, height, offset)?,
            None => height,
        };
        self.labels[label.0 as usize].height = Some(height);
        Ok(())
    }

    fn update_stack(&mut self, offset: u32, pops: u32, pushes: u32) -> Result<()> {
        let height = self.stack.unwrap_or(0);
        if pops > height {
            return Err(Error::StackUnderflow { offset });
        }
        let height = height - pops + pushes;
        self.max_stack = self.max_stack.max(height);
        self.stack = Some(height);
        Ok(())
    }

    fn begin_instruction(&mut self, opcode: OpCode, operand: &[OperandType]) -> Result<u32> {
        if !operand.contains(&opcode.operand) {
            return Err(Error::NotSupported(format!(
                "{} takes a {:?} operand",
                opcode, opcode.operand
            )));
        }
        let offset = self.offset()?;
        let (bytes, len) = opcode.bytes();
        self.code.write_bytes(&bytes[..len]);
        Ok(offset)
    }

    fn finish_instruction(&mut self, opcode: OpCode, offset: u32) -> Result<()> {
        self.update_stack(offset, u32::from(opcode.pops), u32::from(opcode.pushes))?;
        if opcode.ends_flow() {
            self.stack = None;
        }
        Ok(())
    }

    /// Emit an instruction without operand.
    ///
    /// # Errors
    /// Returns [`Error::NotSupported`] if the opcode needs an operand or a call signature, and
    /// [`Error::StackUnderflow`] if the stack holds too few values.
    pub fn emit(&mut self, opcode: OpCode) -> Result<()> {
        if opcode == OpCode::RET {
            let height = self.stack.unwrap_or(0);
            let pops = match self.returns_value {
                Some(returns) => u32::from(returns),
                None => height.min(1),
            };
            let offset = self.begin_instruction(opcode, &[OperandType::None])?;
            self.update_stack(offset, pops, 0)?;
            self.stack = None;
            return Ok(());
        }
        if opcode.is_variable() {
            return Err(Error::NotSupported(format!(
                "{} needs a call signature",
                opcode
            )));
        }
        let offset = self.begin_instruction(opcode, &[OperandType::None])?;
        self.finish_instruction(opcode, offset)
    }

    /// Emit an instruction with a signed 8-bit operand (`ldc.i4.s`).
    ///
    /// # Errors
    /// See [`ILGenerator::emit`].
    pub fn emit_i8(&mut self, opcode: OpCode, value: i8) -> Result<()> {
        let offset = self.begin_instruction(opcode, &[OperandType::Int8])?;
        self.code.write_le(value);
        self.finish_instruction(opcode, offset)
    }

    /// Emit an instruction with an unsigned 8-bit operand (`ldarg.s`, `unaligned.`, ...).
    ///
    /// # Errors
    /// See [`ILGenerator::emit`].
    pub fn emit_u8(&mut self, opcode: OpCode, value: u8) -> Result<()> {
        let offset = self.begin_instruction(opcode, &[OperandType::UInt8])?;
        self.code.write_u8(value);
        self.finish_instruction(opcode, offset)
    }

    /// Emit an instruction with a 16-bit index operand (`ldarg`, `stloc`, ...).
    ///
    /// # Errors
    /// See [`ILGenerator::emit`].
    pub fn emit_u16(&mut self, opcode: OpCode, value: u16) -> Result<()> {
        let offset = self.begin_instruction(opcode, &[OperandType::UInt16])?;
        self.code.write_u16(value);
        self.finish_instruction(opcode, offset)
    }

    /// Emit an instruction with a 32-bit integer operand (`ldc.i4`).
    ///
    /// # Errors
    /// See [`ILGenerator::emit`].
    pub fn emit_i32(&mut self, opcode: OpCode, value: i32) -> Result<()> {
        let offset = self.begin_instruction(opcode, &[OperandType::Int32])?;
        self.code.write_le(value);
        self.finish_instruction(opcode, offset)
    }

    /// Emit an instruction with a 64-bit integer operand (`ldc.i8`).
    ///
    /// # Errors
    /// See [`ILGenerator::emit`].
    pub fn emit_i64(&mut self, opcode: OpCode, value: i64) -> Result<()> {
        let offset = self.begin_instruction(opcode, &[OperandType::Int64])?;
        self.code.write_le(value);
        self.finish_instruction(opcode, offset)
    }

    /// Emit an instruction with a 32-bit float operand (`ldc.r4`).
    ///
    /// # Errors
    /// See [`ILGenerator::emit`].
    pub fn emit_f32(&mut self, opcode: OpCode, value: f32) -> Result<()> {
        let offset = self.begin_instruction(opcode, &[OperandType::Float32])?;
        self.code.write_le(value);
        self.finish_instruction(opcode, offset)
    }

    /// Emit an instruction with a 64-bit float operand (`ldc.r8`).
    ///
    /// # Errors
    /// See [`ILGenerator::emit`].
    pub fn emit_f64(&mut self, opcode: OpCode, value: f64) -> Result<()> {
        let offset = self.begin_instruction(opcode, &[OperandType::Float64])?;
        self.code.write_le(value);
        self.finish_instruction(opcode, offset)
    }

    fn write_token(&mut self, token: TokenRef) -> Result<()> {
        if let TokenRef::Pending(id) = token {
            self.pending_tokens.push((self.offset()?, id));
        }
        self.code.write_u32(token.encoded());
        Ok(())
    }

    /// Emit an instruction with a metadata token operand.
    ///
    /// Pending tokens are written as placeholders and reported in
    /// [`FinishedIl::pending_tokens`].
    ///
    /// # Errors
    /// See [`ILGenerator::emit`]. Call instructions must use [`ILGenerator::emit_call`].
    pub fn emit_token(&mut self, opcode: OpCode, token: TokenRef) -> Result<()> {
        if opcode.is_variable() {
            return Err(Error::NotSupported(format!(
                "{} needs a call signature",
                opcode
            )));
        }
        let offset = self.begin_instruction(opcode, &[OperandType::Token])?;
        self.write_token(token)?;
        self.finish_instruction(opcode, offset)
    }

    /// Emit `call`, `callvirt` or `newobj`, taking the stack effect from `signature`.
    ///
    /// # Errors
    /// See [`ILGenerator::emit`].
    pub fn emit_call(
        &mut self,
        opcode: OpCode,
        method: TokenRef,
        signature: &SignatureMethod,
    ) -> Result<()> {
        if ![OpCode::CALL, OpCode::CALLVIRT, OpCode::NEWOBJ].contains(&opcode) {
            return Err(Error::NotSupported(format!("{} is not a call", opcode)));
        }
        let (pops, pushes) = if opcode == OpCode::NEWOBJ {
            let this = u32::from(signature.has_this && !signature.explicit_this);
            (signature.stack_pops() - this, 1)
        } else {
            (signature.stack_pops(), u32::from(signature.returns_value()))
        };

        let offset = self.begin_instruction(opcode, &[OperandType::Token])?;
        self.write_token(method)?;
        self.update_stack(offset, pops, pushes)
    }

    /// Emit `calli` through a `StandAloneSig` token describing `signature`.
    ///
    /// # Errors
    /// See [`ILGenerator::emit`].
    pub fn emit_calli(&mut self, signature_token: TokenRef, signature: &SignatureMethod) -> Result<()> {
        let offset = self.begin_instruction(OpCode::CALLI, &[OperandType::Token])?;
        self.write_token(signature_token)?;
        self.update_stack(
            offset,
            signature.stack_pops() + 1,
            u32::from(signature.returns_value()),
        )
    }

    /// Emit a branch to `label`.
    ///
    /// # Errors
    /// Returns [`Error::InvalidBranch`] if a marked label is out of range of a short branch and
    /// [`Error::NotSupported`] if the stack height disagrees with the label's.
    pub fn emit_branch(&mut self, opcode: OpCode, label: Label) -> Result<()> {
        let offset =
            self.begin_instruction(opcode, &[OperandType::ShortBranch, OperandType::Branch])?;
        let short = opcode.operand == OperandType::ShortBranch;
        let position = self.code.len();
        let base = offset + opcode.size() as u32 + if short { 1 } else { 4 };

        if opcode.flow == FlowType::Leave {
            self.stack = Some(0);
        } else {
            self.update_stack(offset, u32::from(opcode.pops), u32::from(opcode.pushes))?;
        }
        let height = self.stack.unwrap_or(0);
        self.record_target(label, height, offset)?;

        self.write_displacement(label, position, base, short)?;
        if opcode.ends_flow() {
            self.stack = None;
        }
        Ok(())
    }

    fn write_displacement(&mut self, label: Label, position: usize, base: u32, short: bool) -> Result<()> {
        match self.label_state(label)?.offset {
            Some(target) => {
                let displacement = i64::from(target) - i64::from(base);
                if short {
                    self.code.write_le(short_displacement(label, displacement)?);
                } else {
                    self.code.write_le(long_displacement(label, displacement)?);
                }
            }
            None => {
                if short {
                    self.code.write_u8(0);
                } else {
                    self.code.write_u32(0);
                }
                self.branch_fixups.push(BranchFixup {
                    label,
                    position,
                    base,
                    short,
                });
            }
        }
        Ok(())
    }

    /// Emit a `switch` over `targets`.
    ///
    /// Displacements are relative to the end of the whole instruction.
    ///
    /// # Errors
    /// See [`ILGenerator::emit_branch`].
    pub fn emit_switch(&mut self, targets: &[Label]) -> Result<()> {
        let count = u32::try_from(targets.len())
            .map_err(|_| Error::NotSupported("switch table too large".to_string()))?;
        let offset = self.begin_instruction(OpCode::SWITCH, &[OperandType::Switch])?;
        self.code.write_u32(count);
        let base = offset + 1 + 4 + 4 * count;

        self.update_stack(offset, 1, 0)?;
        let height = self.stack.unwrap_or(0);
        for &label in targets {
            self.record_target(label, height, offset)?;
            let position = self.code.len();
            self.write_displacement(label, position, base, false)?;
        }
        Ok(())
    }

    /// Emit `ldarg` in its shortest form.
    ///
    /// # Errors
    /// See [`ILGenerator::emit`].
    pub fn emit_ldarg(&mut self, index: u16) -> Result<()> {
        match index {
            0 => self.emit(OpCode::LDARG_0),
            1 => self.emit(OpCode::LDARG_1),
            2 => self.emit(OpCode::LDARG_2),
            3 => self.emit(OpCode::LDARG_3),
            x => match u8::try_from(x) {
                Ok(short) => self.emit_u8(OpCode::LDARG_S, short),
                Err(_) => self.emit_u16(OpCode::LDARG, x),
            },
        }
    }

    /// Emit `ldarga` in its shortest form.
    ///
    /// # Errors
    /// See [`ILGenerator::emit`].
    pub fn emit_ldarga(&mut self, index: u16) -> Result<()> {
        match u8::try_from(index) {
            Ok(short) => self.emit_u8(OpCode::LDARGA_S, short),
            Err(_) => self.emit_u16(OpCode::LDARGA, index),
        }
    }

    /// Emit `starg` in its shortest form.
    ///
    /// # Errors
    /// See [`ILGenerator::emit`].
    pub fn emit_starg(&mut self, index: u16) -> Result<()> {
        match u8::try_from(index) {
            Ok(short) => self.emit_u8(OpCode::STARG_S, short),
            Err(_) => self.emit_u16(OpCode::STARG, index),
        }
    }

    /// Emit `ldloc` in its shortest form.
    ///
    /// # Errors
    /// See [`ILGenerator::emit`].
    pub fn emit_ldloc(&mut self, index: u16) -> Result<()> {
        match index {
            0 => self.emit(OpCode::LDLOC_0),
            1 => self.emit(OpCode::LDLOC_1),
            2 => self.emit(OpCode::LDLOC_2),
            3 => self.emit(OpCode::LDLOC_3),
            x => match u8::try_from(x) {
                Ok(short) => self.emit_u8(OpCode::LDLOC_S, short),
                Err(_) => self.emit_u16(OpCode::LDLOC, x),
            },
        }
    }

    /// Emit `ldloca` in its shortest form.
    ///
    /// # Errors
    /// See [`ILGenerator::emit`].
    pub fn emit_ldloca(&mut self, index: u16) -> Result<()> {
        match u8::try_from(index) {
            Ok(short) => self.emit_u8(OpCode::LDLOCA_S, short),
            Err(_) => self.emit_u16(OpCode::LDLOCA, index),
        }
    }

    /// Emit `stloc` in its shortest form.
    ///
    /// # Errors
    /// See [`ILGenerator::emit`].
    pub fn emit_stloc(&mut self, index: u16) -> Result<()> {
        match index {
            0 => self.emit(OpCode::STLOC_0),
            1 => self.emit(OpCode::STLOC_1),
            2 => self.emit(OpCode::STLOC_2),
            3 => self.emit(OpCode::STLOC_3),
            x => match u8::try_from(x) {
                Ok(short) => self.emit_u8(OpCode::STLOC_S, short),
                Err(_) => self.emit_u16(OpCode::STLOC, x),
            },
        }
    }

    /// Emit `ldc.i4` in its shortest form.
    ///
    /// # Errors
    /// See [`ILGenerator::emit`].
    pub fn emit_ldc_i4(&mut self, value: i32) -> Result<()> {
        match value {
            -1 => self.emit(OpCode::LDC_I4_M1),
            0 => self.emit(OpCode::LDC_I4_0),
            1 => self.emit(OpCode::LDC_I4_1),
            2 => self.emit(OpCode::LDC_I4_2),
            3 => self.emit(OpCode::LDC_I4_3),
            4 => self.emit(OpCode::LDC_I4_4),
            5 => self.emit(OpCode::LDC_I4_5),
            6 => self.emit(OpCode::LDC_I4_6),
            7 => self.emit(OpCode::LDC_I4_7),
            8 => self.emit(OpCode::LDC_I4_8),
            x => match i8::try_from(x) {
                Ok(short) => self.emit_i8(OpCode::LDC_I4_S, short),
                Err(_) => self.emit_i32(OpCode::LDC_I4, x),
            },
        }
    }

    /// Open a try block and return the label marking the end of the whole exception block.
    ///
    /// # Errors
    /// See [`ILGenerator::define_label`] and [`ILGenerator::offset`].
    pub fn begin_exception_block(&mut self) -> Result<Label> {
        let end_label = self.define_label()?;
        self.open_blocks.push(ExceptionBlock {
            try_start: self.offset()?,
            try_end: 0,
            end_label,
            segment: Segment::Try,
            clause: None,
            has_finally: false,
        });
        Ok(end_label)
    }

    fn current_block(&self, operation: &str) -> Result<&ExceptionBlock> {
        self.open_blocks.last().ok_or_else(|| {
            Error::InvalidState(format!("{} outside of an exception block", operation))
        })
    }

    fn close_segment(&mut self) -> Result<()> {
        let (segment, end_label) = {
            let block = self.current_block("closing a block")?;
            (block.segment, block.end_label)
        };

        if self.implicit_leave {
            match segment {
                Segment::Try | Segment::Catch | Segment::FilterHandler => {
                    self.emit_branch(OpCode::LEAVE, end_label)?;
                }
                Segment::Filter => self.emit(OpCode::ENDFILTER)?,
                Segment::Finally | Segment::Fault => self.emit(OpCode::ENDFINALLY)?,
            }
        }

        let offset = self.offset()?;
        let Some(block) = self.open_blocks.last_mut() else {
            return Err(Error::InvalidState("exception block vanished".to_string()));
        };
        match segment {
            Segment::Try => block.try_end = offset,
            Segment::Filter => {}
            Segment::Catch | Segment::FilterHandler | Segment::Finally | Segment::Fault => {
                if let Some(clause) = block.clause.take() {
                    let handler = ExceptionHandler {
                        flags: clause.flags,
                        try_offset: block.try_start,
                        try_length: clause.try_end - block.try_start,
                        handler_offset: clause.handler_start,
                        handler_length: offset - clause.handler_start,
                        class_token: clause.class_token,
                        filter_offset: clause.filter_offset,
                    };
                    self.exception_handlers.push(handler);
                }
            }
        }
        Ok(())
    }

    fn enter_handler(&mut self, height: u32) {
        self.stack = Some(height);
        self.max_stack = self.max_stack.max(height);
    }

    /// Start a catch handler.
    ///
    /// Directly after [`ILGenerator::begin_except_filter_block`] this starts the filter's handler
    /// and `exception_type` must be `None`; otherwise it starts a typed catch clause.
    ///
    /// # Errors
    /// Returns [`Error::InvalidState`] outside of an exception block, after a finally or fault
    /// handler, or when `exception_type` does not match the clause kind.
    pub fn begin_catch_block(&mut self, exception_type: Option<TokenRef>) -> Result<()> {
        let block = self.current_block("catch block")?;
        if block.segment == Segment::Filter {
            if exception_type.is_some() {
                return Err(Error::InvalidState(
                    "the handler of a filter cannot name an exception type".to_string(),
                ));
            }
            if self.implicit_leave {
                self.emit(OpCode::ENDFILTER)?;
            }
            let offset = self.offset()?;
            if let Some(block) = self.open_blocks.last_mut() {
                block.segment = Segment::FilterHandler;
                if let Some(clause) = block.clause.as_mut() {
                    clause.handler_start = offset;
                }
            }
            self.enter_handler(1);
            return Ok(());
        }

        if block.has_finally {
            return Err(Error::InvalidState(
                "catch block after a finally or fault handler".to_string(),
            ));
        }
        let Some(class_token) = exception_type else {
            return Err(Error::InvalidState(
                "catch block without an exception type".to_string(),
            ));
        };

        self.close_segment()?;
        let offset = self.offset()?;
        if let Some(block) = self.open_blocks.last_mut() {
            block.segment = Segment::Catch;
            block.clause = Some(OpenClause {
                flags: ExceptionHandlerFlags::EXCEPTION,
                try_end: block.try_end,
                handler_start: offset,
                filter_offset: 0,
                class_token: Some(class_token),
            });
        }
        self.enter_handler(1);
        Ok(())
    }

    /// Start a filter block; its handler follows with [`ILGenerator::begin_catch_block`].
    ///
    /// # Errors
    /// Returns [`Error::InvalidState`] outside of an exception block or after a finally or fault
    /// handler.
    pub fn begin_except_filter_block(&mut self) -> Result<()> {
        let block = self.current_block("filter block")?;
        if block.has_finally || block.segment == Segment::Filter {
            return Err(Error::InvalidState(
                "filter block must follow a try or handler block".to_string(),
            ));
        }

        self.close_segment()?;
        let offset = self.offset()?;
        if let Some(block) = self.open_blocks.last_mut() {
            block.segment = Segment::Filter;
            block.clause = Some(OpenClause {
                flags: ExceptionHandlerFlags::FILTER,
                try_end: block.try_end,
                handler_start: offset,
                filter_offset: offset,
                class_token: None,
            });
        }
        self.enter_handler(1);
        Ok(())
    }

    /// Start a finally handler.
    ///
    /// The finally clause protects the try block and any catch handlers before it.
    ///
    /// # Errors
    /// Returns [`Error::InvalidState`] outside of an exception block or if the block already has
    /// a finally or fault handler.
    pub fn begin_finally_block(&mut self) -> Result<()> {
        self.begin_terminal_handler(ExceptionHandlerFlags::FINALLY, Segment::Finally)
    }

    /// Start a fault handler.
    ///
    /// # Errors
    /// See [`ILGenerator::begin_finally_block`].
    pub fn begin_fault_block(&mut self) -> Result<()> {
        self.begin_terminal_handler(ExceptionHandlerFlags::FAULT, Segment::Fault)
    }

    fn begin_terminal_handler(&mut self, flags: ExceptionHandlerFlags, segment: Segment) -> Result<()> {
        let block = self.current_block("finally or fault block")?;
        if block.has_finally {
            return Err(Error::InvalidState(
                "exception block already has a finally or fault handler".to_string(),
            ));
        }
        if block.segment == Segment::Filter {
            return Err(Error::InvalidState("filter block without a handler".to_string()));
        }

        self.close_segment()?;
        let offset = self.offset()?;
        if let Some(block) = self.open_blocks.last_mut() {
            block.segment = segment;
            block.has_finally = true;
            block.clause = Some(OpenClause {
                flags,
                try_end: offset,
                handler_start: offset,
                filter_offset: 0,
                class_token: None,
            });
        }
        self.enter_handler(0);
        Ok(())
    }

    /// Close the innermost exception block and mark its end label.
    ///
    /// # Errors
    /// Returns [`Error::InvalidState`] if no block is open or the block has no handler.
    pub fn end_exception_block(&mut self) -> Result<()> {
        let block = self.current_block("end of block")?;
        match block.segment {
            Segment::Try => {
                return Err(Error::InvalidState(
                    "exception block without a handler".to_string(),
                ))
            }
            Segment::Filter => {
                return Err(Error::InvalidState("filter block without a handler".to_string()))
            }
            _ => {}
        }

        self.close_segment()?;
        let Some(block) = self.open_blocks.pop() else {
            return Err(Error::InvalidState("exception block vanished".to_string()));
        };
        self.mark_label(block.end_label)
    }

    /// Patch every forward branch and return the finished code.
    ///
    /// # Errors
    /// Returns [`Error::InvalidState`] while exception blocks are open and
    /// [`Error::InvalidBranch`] for unmarked labels or short branches out of range.
    pub fn finish(mut self) -> Result<FinishedIl> {
        if !self.open_blocks.is_empty() {
            return Err(Error::InvalidState(format!(
                "{} exception blocks are still open",
                self.open_blocks.len()
            )));
        }

        for fixup in std::mem::take(&mut self.branch_fixups) {
            let target = self.label_state(fixup.label)?.offset.ok_or_else(|| {
                Error::InvalidBranch(format!("{} was never marked", fixup.label))
            })?;
            let displacement = i64::from(target) - i64::from(fixup.base);
            if fixup.short {
                self.code
                    .patch_le(fixup.position, short_displacement(fixup.label, displacement)?)?;
            } else {
                self.code
                    .patch_le(fixup.position, long_displacement(fixup.label, displacement)?)?;
            }
        }

        let max_stack = u16::try_from(self.max_stack)
            .map_err(|_| Error::NotSupported(format!("stack depth {} exceeds 65535", self.max_stack)))?;
        trace!(
            "Finished IL: {} bytes, max stack {}, {} locals, {} clauses",
            self.code.len(),
            max_stack,
            self.locals.len(),
            self.exception_handlers.len()
        );

        Ok(FinishedIl {
            code: self.code.into_inner(),
            max_stack,
            locals: self.locals,
            exception_handlers: self.exception_handlers,
            pending_tokens: self.pending_tokens,
        })
    }
}

fn short_displacement(label: Label, displacement: i64) -> Result<i8> {
    i8::try_from(displacement).map_err(|_| {
        Error::InvalidBranch(format!(
            "short branch to {} out of range ({} bytes)",
            label, displacement
        ))
    })
}

fn long_displacement(label: Label, displacement: i64) -> Result<i32> {
    i32::try_from(displacement).map_err(|_| {
        Error::InvalidBranch(format!("branch to {} out of range ({} bytes)", label, displacement))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::token::Token;

    #[test]
    fn forward_and_backward_branches() -> Result<()> {
        let mut il = ILGenerator::new();
        let top = il.define_label()?;
        let exit = il.define_label()?;

        il.mark_label(top)?;
        il.emit_ldarg(0)?;
        il.emit_branch(OpCode::BRTRUE, exit)?;
        il.emit_branch(OpCode::BR_S, top)?;
        il.mark_label(exit)?;
        il.emit(OpCode::RET)?;

        let finished = il.finish()?;
        assert_eq!(
            finished.code,
            [0x02, 0x3A, 0x02, 0x00, 0x00, 0x00, 0x2B, 0xF8, 0x2A]
        );
        Ok(())
    }

    #[test]
    fn duplicate_and_unmarked_labels() -> Result<()> {
        let mut il = ILGenerator::new();
        let label = il.define_label()?;
        il.mark_label(label)?;
        assert!(matches!(il.mark_label(label), Err(Error::DuplicateLabel(_))));

        let mut il = ILGenerator::new();
        let never = il.define_label()?;
        il.emit_branch(OpCode::BR, never)?;
        assert!(matches!(il.finish(), Err(Error::InvalidBranch(_))));
        Ok(())
    }

    #[test]
    fn short_branch_overflow() -> Result<()> {
        let mut il = ILGenerator::new();
        let far = il.define_label()?;
        il.emit_branch(OpCode::BR_S, far)?;
        for _ in 0..200 {
            il.emit(OpCode::NOP)?;
        }
        il.mark_label(far)?;
        il.emit(OpCode::RET)?;
        assert!(matches!(il.finish(), Err(Error::InvalidBranch(_))));

        let mut il = ILGenerator::new();
        let back = il.define_label()?;
        il.mark_label(back)?;
        for _ in 0..200 {
            il.emit(OpCode::NOP)?;
        }
        assert!(matches!(
            il.emit_branch(OpCode::BR_S, back),
            Err(Error::InvalidBranch(_))
        ));
        Ok(())
    }

    #[test]
    fn height_mismatch_is_rejected() -> Result<()> {
        let mut il = ILGenerator::new();
        let join = il.define_label()?;
        il.emit_ldc_i4(0)?;
        il.emit_branch(OpCode::BRTRUE_S, join)?;
        il.emit_ldc_i4(1)?;
        assert!(matches!(il.mark_label(join), Err(Error::NotSupported(_))));
        Ok(())
    }

    #[test]
    fn height_mismatch_tolerated_in_compat_mode() -> Result<()> {
        let mut il = ILGenerator::with_config(&BuilderConfig::compat());
        let join = il.define_label()?;
        il.emit_ldc_i4(0)?;
        il.emit_branch(OpCode::BRTRUE_S, join)?;
        il.emit_ldc_i4(1)?;
        il.mark_label(join)?;
        assert_eq!(il.stack_height(), Some(1));
        Ok(())
    }

    #[test]
    fn unknown_height_seeds_zero() -> Result<()> {
        let mut il = ILGenerator::new();
        let after = il.define_label()?;
        il.emit(OpCode::RET)?;
        assert_eq!(il.stack_height(), None);
        il.mark_label(after)?;
        assert_eq!(il.stack_height(), Some(0));
        Ok(())
    }

    #[test]
    fn underflow() {
        let mut il = ILGenerator::new();
        assert!(matches!(
            il.emit(OpCode::ADD),
            Err(Error::StackUnderflow { offset: 0 })
        ));
    }

    #[test]
    fn switch_displacements_relative_to_instruction_end() -> Result<()> {
        let mut il = ILGenerator::new();
        let a = il.define_label()?;
        let b = il.define_label()?;
        il.emit_ldarg(0)?;
        il.emit_switch(&[a, b])?;
        il.mark_label(a)?;
        il.emit(OpCode::NOP)?;
        il.mark_label(b)?;
        il.emit(OpCode::RET)?;

        let finished = il.finish()?;
        // ldarg.0 | switch 2 | +0 | +1
        assert_eq!(&finished.code[1..2], &[0x45]);
        assert_eq!(&finished.code[2..6], &2u32.to_le_bytes());
        assert_eq!(&finished.code[6..10], &0i32.to_le_bytes());
        assert_eq!(&finished.code[10..14], &1i32.to_le_bytes());
        Ok(())
    }

    #[test]
    fn short_forms() -> Result<()> {
        let mut il = ILGenerator::new();
        il.emit_ldarg(5)?;
        il.emit_ldarg(300)?;
        il.emit_ldc_i4(-1)?;
        il.emit_ldc_i4(100)?;
        il.emit_ldc_i4(1000)?;
        il.emit_stloc(4)?;
        let finished = il.finish()?;
        assert_eq!(
            finished.code,
            [
                0x0E, 0x05, 0xFE, 0x09, 0x2C, 0x01, 0x15, 0x1F, 0x64, 0x20, 0xE8, 0x03, 0x00,
                0x00, 0x13, 0x04
            ]
        );
        assert_eq!(finished.max_stack, 5);
        Ok(())
    }

    #[test]
    fn call_stack_effect() -> Result<()> {
        let signature = SignatureMethod::instance(
            TypeSignature::I4,
            vec![TypeSignature::I4, TypeSignature::I4],
        );
        let mut il = ILGenerator::new();
        il.emit_ldarg(0)?;
        il.emit_ldc_i4(1)?;
        il.emit_ldc_i4(2)?;
        il.emit_call(OpCode::CALL, TokenRef::Real(Token::new(0x0600_0001)), &signature)?;
        assert_eq!(il.stack_height(), Some(1));

        il.emit_ldc_i4(1)?;
        il.emit_ldc_i4(2)?;
        il.emit_call(OpCode::NEWOBJ, TokenRef::Real(Token::new(0x0A00_0001)), &signature)?;
        assert_eq!(il.stack_height(), Some(2));
        assert!(il.emit_token(OpCode::CALL, TokenRef::Real(Token::new(1))).is_err());
        Ok(())
    }

    #[test]
    fn pending_tokens_are_recorded() -> Result<()> {
        let mut il = ILGenerator::new();
        il.emit(OpCode::NOP)?;
        il.emit_token(OpCode::LDSFLD, TokenRef::Pending(PendingId::new(2)))?;
        let finished = il.finish()?;
        assert_eq!(finished.pending_tokens, vec![(2, PendingId::new(2))]);
        assert_eq!(&finished.code[2..6], &(-2i32).to_le_bytes());
        Ok(())
    }

    #[test]
    fn try_catch_finally_layout() -> Result<()> {
        let class = TokenRef::Real(Token::new(0x0100_0003));
        let mut il = ILGenerator::new();
        il.begin_exception_block()?;
        il.emit(OpCode::NOP)?; // 0
        il.begin_catch_block(Some(class))?; // leave at 1..6
        assert_eq!(il.stack_height(), Some(1));
        il.emit(OpCode::POP)?; // 6
        il.begin_finally_block()?; // leave at 7..12
        assert_eq!(il.stack_height(), Some(0));
        il.emit(OpCode::NOP)?; // 12
        il.end_exception_block()?; // endfinally at 13
        il.emit(OpCode::RET)?; // 14

        let finished = il.finish()?;
        assert_eq!(finished.code.len(), 15);
        assert_eq!(
            finished.exception_handlers,
            vec![
                ExceptionHandler::catch(0..6, 6..12, class),
                ExceptionHandler::finally(0..12, 12..14),
            ]
        );
        // both leaves target offset 14
        assert_eq!(&finished.code[2..6], &8i32.to_le_bytes());
        assert_eq!(&finished.code[8..12], &2i32.to_le_bytes());
        Ok(())
    }

    #[test]
    fn filter_clause() -> Result<()> {
        let mut il = ILGenerator::new();
        il.begin_exception_block()?;
        il.emit(OpCode::NOP)?; // 0
        il.begin_except_filter_block()?; // leave 1..6, filter at 6
        il.emit(OpCode::POP)?; // 6
        il.emit_ldc_i4(1)?; // 7
        il.begin_catch_block(None)?; // endfilter 8..10, handler at 10
        il.emit(OpCode::POP)?; // 10
        il.end_exception_block()?; // leave 11..16
        il.emit(OpCode::RET)?;

        let finished = il.finish()?;
        assert_eq!(
            finished.exception_handlers,
            vec![ExceptionHandler::filter(0..6, 6, 10..16)]
        );
        Ok(())
    }

    #[test]
    fn misnested_blocks() -> Result<()> {
        let mut il = ILGenerator::new();
        assert!(matches!(
            il.begin_catch_block(Some(TokenRef::Real(Token::new(0x0100_0001)))),
            Err(Error::InvalidState(_))
        ));
        assert!(matches!(il.end_exception_block(), Err(Error::InvalidState(_))));

        il.begin_exception_block()?;
        assert!(matches!(il.end_exception_block(), Err(Error::InvalidState(_))));
        il.begin_finally_block()?;
        assert!(matches!(il.begin_fault_block(), Err(Error::InvalidState(_))));
        assert!(matches!(
            il.begin_catch_block(Some(TokenRef::Real(Token::new(0x0100_0001)))),
            Err(Error::InvalidState(_))
        ));

        let mut open = ILGenerator::new();
        open.begin_exception_block()?;
        assert!(matches!(open.finish(), Err(Error::InvalidState(_))));
        Ok(())
    }

    #[test]
    fn local_signature() -> Result<()> {
        let mut il = ILGenerator::new();
        let first = il.declare_local(TypeSignature::I4, false)?;
        let second = il.declare_local(TypeSignature::String, true)?;
        assert_eq!((first.index(), second.index()), (0, 1));
        il.emit(OpCode::RET)?;

        let finished = il.finish()?;
        let signature = finished.local_signature().ok_or(Error::OutOfBounds)?;
        assert_eq!(signature.locals.len(), 2);
        assert!(signature.locals[1].is_pinned);
        Ok(())
    }
}
