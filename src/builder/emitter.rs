//! IL emission bound to a method of a [`ModuleBuilder`].
//!
//! [`IlEmitter`] wraps the method's [`ILGenerator`] and turns builder-level references
//! (defined methods, fields, types, string literals) into tokens before emitting them.
//! Tokens of methods and fields defined in the module are still pending at this point and
//! are patched when the module bakes.

use log::trace;

use crate::{
    assembly::{ILGenerator, Label, LocalBuilder, OpCode},
    builder::{
        entities::MethodBodyState, Bakeable, FieldTarget, MethodId, MethodTarget, ModuleBuilder,
    },
    metadata::{
        signatures::{
            encode_method_signature, CallingConvention, SignatureMethod, SignatureParameter,
            TypeHandle, TypeSignature,
        },
        token::{Token, TokenRef},
    },
    Error, Result,
};

impl ModuleBuilder {
    /// Start or resume IL generation for `method`.
    ///
    /// # Errors
    /// Returns [`Error::InvalidState`] if the method cannot have a body or already received a
    /// raw one, and [`Error::AlreadyBaked`] once it was created.
    pub fn il_generator(&mut self, method: MethodId) -> Result<IlEmitter<'_>> {
        self.ensure_open()?;
        if let Some(owner) = self.method_entry(method)?.owner {
            self.type_entry(owner)?.ensure_open()?;
        }
        let returns_value = self.method_entry(method)?.signature.returns_value();
        let config = self.config.clone();

        let entry = self.open_method(method)?;
        if !entry.accepts_body() {
            return Err(Error::InvalidState(format!(
                "{} cannot have a body",
                entry.describe()
            )));
        }
        match entry.body {
            MethodBodyState::Generating(_) => {}
            MethodBodyState::Empty => {
                trace!("Starting IL for {}", entry.describe());
                let mut generator = ILGenerator::with_config(&config);
                generator.set_returns_value(returns_value);
                entry.body = MethodBodyState::Generating(Box::new(generator));
            }
            MethodBodyState::Raw(_) | MethodBodyState::Encoded(_) => {
                return Err(Error::InvalidState(format!(
                    "{} already has a body",
                    entry.describe()
                )));
            }
        }

        Ok(IlEmitter {
            module: self,
            method,
        })
    }
}

/// Emits IL into one method of a [`ModuleBuilder`].
///
/// Obtained from [`ModuleBuilder::il_generator`]. The emitter borrows the module, so token
/// lookups and emission share one mutable handle.
pub struct IlEmitter<'m> {
    module: &'m mut ModuleBuilder,
    method: MethodId,
}

impl IlEmitter<'_> {
    fn generator(&mut self) -> Result<&mut ILGenerator> {
        match &mut self.module.methods[self.method.index()].body {
            MethodBodyState::Generating(generator) => Ok(&mut **generator),
            _ => Err(Error::InvalidState(format!(
                "{} is not generating IL",
                self.method
            ))),
        }
    }

    fn peek(&self) -> Option<&ILGenerator> {
        match &self.module.methods[self.method.index()].body {
            MethodBodyState::Generating(generator) => Some(&**generator),
            _ => None,
        }
    }

    /// The method being emitted into.
    #[must_use]
    pub fn method(&self) -> MethodId {
        self.method
    }

    /// The module owning the method, for token lookups.
    pub fn module(&mut self) -> &mut ModuleBuilder {
        self.module
    }

    /// Offset of the next instruction.
    ///
    /// # Errors
    /// See [`ILGenerator::offset`].
    pub fn offset(&self) -> Result<u32> {
        self.peek().map_or(Ok(0), ILGenerator::offset)
    }

    /// Current evaluation stack height, `None` after an unconditional transfer.
    #[must_use]
    pub fn stack_height(&self) -> Option<u32> {
        self.peek().and_then(ILGenerator::stack_height)
    }

    /// Deepest stack seen so far.
    #[must_use]
    pub fn max_stack(&self) -> u32 {
        self.peek().map_or(0, ILGenerator::max_stack)
    }

    /// Emit an instruction without operand.
    ///
    /// # Errors
    /// See [`ILGenerator::emit`].
    pub fn emit(&mut self, opcode: OpCode) -> Result<()> {
        self.generator()?.emit(opcode)
    }

    /// Emit an instruction with an `int8` operand.
    ///
    /// # Errors
    /// See [`ILGenerator::emit`].
    pub fn emit_i8(&mut self, opcode: OpCode, value: i8) -> Result<()> {
        self.generator()?.emit_i8(opcode, value)
    }

    /// Emit an instruction with a `uint8` operand.
    ///
    /// # Errors
    /// See [`ILGenerator::emit`].
    pub fn emit_u8(&mut self, opcode: OpCode, value: u8) -> Result<()> {
        self.generator()?.emit_u8(opcode, value)
    }

    /// Emit an instruction with a `uint16` operand.
    ///
    /// # Errors
    /// See [`ILGenerator::emit`].
    pub fn emit_u16(&mut self, opcode: OpCode, value: u16) -> Result<()> {
        self.generator()?.emit_u16(opcode, value)
    }

    /// Emit an instruction with an `int32` operand.
    ///
    /// # Errors
    /// See [`ILGenerator::emit`].
    pub fn emit_i32(&mut self, opcode: OpCode, value: i32) -> Result<()> {
        self.generator()?.emit_i32(opcode, value)
    }

    /// Emit an instruction with an `int64` operand.
    ///
    /// # Errors
    /// See [`ILGenerator::emit`].
    pub fn emit_i64(&mut self, opcode: OpCode, value: i64) -> Result<()> {
        self.generator()?.emit_i64(opcode, value)
    }

    /// Emit an instruction with a `float32` operand.
    ///
    /// # Errors
    /// See [`ILGenerator::emit`].
    pub fn emit_f32(&mut self, opcode: OpCode, value: f32) -> Result<()> {
        self.generator()?.emit_f32(opcode, value)
    }

    /// Emit an instruction with a `float64` operand.
    ///
    /// # Errors
    /// See [`ILGenerator::emit`].
    pub fn emit_f64(&mut self, opcode: OpCode, value: f64) -> Result<()> {
        self.generator()?.emit_f64(opcode, value)
    }

    /// Emit the shortest `ldc.i4` form for `value`.
    ///
    /// # Errors
    /// See [`ILGenerator::emit`].
    pub fn emit_ldc_i4(&mut self, value: i32) -> Result<()> {
        self.generator()?.emit_ldc_i4(value)
    }

    /// Emit the shortest `ldarg` form.
    ///
    /// # Errors
    /// See [`ILGenerator::emit`].
    pub fn emit_ldarg(&mut self, index: u16) -> Result<()> {
        self.generator()?.emit_ldarg(index)
    }

    /// Emit the shortest `ldarga` form.
    ///
    /// # Errors
    /// See [`ILGenerator::emit`].
    pub fn emit_ldarga(&mut self, index: u16) -> Result<()> {
        self.generator()?.emit_ldarga(index)
    }

    /// Emit the shortest `starg` form.
    ///
    /// # Errors
    /// See [`ILGenerator::emit`].
    pub fn emit_starg(&mut self, index: u16) -> Result<()> {
        self.generator()?.emit_starg(index)
    }

    /// Emit the shortest `ldloc` form.
    ///
    /// # Errors
    /// See [`ILGenerator::emit`].
    pub fn emit_ldloc(&mut self, local: &LocalBuilder) -> Result<()> {
        self.generator()?.emit_ldloc(local.index())
    }

    /// Emit the shortest `ldloca` form.
    ///
    /// # Errors
    /// See [`ILGenerator::emit`].
    pub fn emit_ldloca(&mut self, local: &LocalBuilder) -> Result<()> {
        self.generator()?.emit_ldloca(local.index())
    }

    /// Emit the shortest `stloc` form.
    ///
    /// # Errors
    /// See [`ILGenerator::emit`].
    pub fn emit_stloc(&mut self, local: &LocalBuilder) -> Result<()> {
        self.generator()?.emit_stloc(local.index())
    }

    /// Declare a local variable.
    ///
    /// # Errors
    /// Returns [`Error::NotSupported`] past 65535 locals.
    pub fn declare_local(&mut self, local_type: TypeSignature, pinned: bool) -> Result<LocalBuilder> {
        self.generator()?.declare_local(local_type, pinned)
    }

    /// Create a label to be marked later.
    ///
    /// # Errors
    /// Returns [`Error::InvalidState`] if the method stopped generating IL.
    pub fn define_label(&mut self) -> Result<Label> {
        self.generator()?.define_label()
    }

    /// Bind `label` to the current offset.
    ///
    /// # Errors
    /// See [`ILGenerator::mark_label`].
    pub fn mark_label(&mut self, label: Label) -> Result<()> {
        self.generator()?.mark_label(label)
    }

    /// Emit a branch to `label`.
    ///
    /// # Errors
    /// See [`ILGenerator::emit_branch`].
    pub fn emit_branch(&mut self, opcode: OpCode, label: Label) -> Result<()> {
        self.generator()?.emit_branch(opcode, label)
    }

    /// Emit a `switch` over `targets`.
    ///
    /// # Errors
    /// See [`ILGenerator::emit_switch`].
    pub fn emit_switch(&mut self, targets: &[Label]) -> Result<()> {
        self.generator()?.emit_switch(targets)
    }

    /// Emit an instruction taking a raw token operand.
    ///
    /// # Errors
    /// Returns [`Error::NotSupported`] for call instructions, which need a signature.
    pub fn emit_token(&mut self, opcode: OpCode, token: TokenRef) -> Result<()> {
        self.generator()?.emit_token(opcode, token)
    }

    /// Emit a call-like instruction against `method`.
    ///
    /// `ldftn`, `ldvirtftn` and `jmp` take the method token only; `call`, `callvirt` and
    /// `newobj` also need the callee's signature, which a raw [`MethodTarget::Token`] lacks.
    ///
    /// # Errors
    /// Returns [`Error::NotSupported`] for a call through a raw token.
    pub fn emit_call(&mut self, opcode: OpCode, method: impl Into<MethodTarget>) -> Result<()> {
        let (token, signature) = self.module.method_target_token(&method.into())?;
        if [OpCode::LDFTN, OpCode::LDVIRTFTN, OpCode::JMP].contains(&opcode) {
            return self.generator()?.emit_token(opcode, token);
        }
        match signature {
            Some(signature) => self.generator()?.emit_call(opcode, token, &signature),
            None => Err(Error::NotSupported(format!(
                "{} through a raw token needs a signature",
                opcode
            ))),
        }
    }

    /// Emit a call through an existing method token (for example a `MethodSpec`) described
    /// by `signature`.
    ///
    /// # Errors
    /// See [`ILGenerator::emit_call`].
    pub fn emit_call_token(
        &mut self,
        opcode: OpCode,
        token: Token,
        signature: &SignatureMethod,
    ) -> Result<()> {
        self.generator()?
            .emit_call(opcode, TokenRef::Real(token), signature)
    }

    /// Call the vararg `method` passing `extra` arguments after the sentinel.
    ///
    /// The call site gets its own `MemberRef` whose parent is the method definition.
    ///
    /// # Errors
    /// Returns [`Error::NotSupported`] if `method` is not a vararg method.
    pub fn emit_vararg_call(
        &mut self,
        opcode: OpCode,
        method: MethodId,
        extra: Vec<TypeSignature>,
    ) -> Result<()> {
        let entry = self.module.method_entry(method)?;
        if entry.signature.calling_convention != CallingConvention::VarArg {
            return Err(Error::NotSupported(format!(
                "{} is not a vararg method",
                entry.describe()
            )));
        }
        let name = entry.name.clone();
        let mut signature = entry.signature.clone();
        signature.varargs = extra.into_iter().map(SignatureParameter::new).collect();

        let blob = encode_method_signature(&signature, &mut self.module.scope)?;
        let parent = self.module.method_token(method)?;
        let call_site = self.module.scope.member_ref(parent, &name, &blob)?;
        self.generator()?
            .emit_call(opcode, TokenRef::Real(call_site), &signature)
    }

    /// Emit `calli` for a call site described by `signature`.
    ///
    /// # Errors
    /// Returns an error if the signature cannot be encoded.
    pub fn emit_calli(&mut self, signature: &SignatureMethod) -> Result<()> {
        let token = self.module.call_site_signature(signature)?;
        self.generator()?
            .emit_calli(TokenRef::Real(token), signature)
    }

    /// Emit a field instruction (`ldfld`, `stsfld`, `ldflda`, ...) against `field`.
    ///
    /// # Errors
    /// Returns [`Error::NotSupported`] if a raw token is not a field.
    pub fn emit_field(&mut self, opcode: OpCode, field: impl Into<FieldTarget>) -> Result<()> {
        let token = self.module.field_target_token(&field.into())?;
        self.generator()?.emit_token(opcode, token)
    }

    /// Emit a type instruction (`box`, `newarr`, `castclass`, `ldtoken`, ...) against `ty`.
    ///
    /// # Errors
    /// Returns an error if the type cannot be referenced.
    pub fn emit_type(&mut self, opcode: OpCode, ty: impl Into<TypeHandle>) -> Result<()> {
        let token = self.module.type_token(ty)?;
        self.generator()?.emit_token(opcode, TokenRef::Real(token))
    }

    /// Emit a type instruction against a constructed type such as `List<int>` or `int[]`.
    ///
    /// # Errors
    /// Returns an error if the signature cannot be encoded.
    pub fn emit_type_spec(&mut self, opcode: OpCode, signature: &TypeSignature) -> Result<()> {
        let token = self.module.type_spec(signature)?;
        self.generator()?.emit_token(opcode, TokenRef::Real(token))
    }

    /// Emit `ldstr value`.
    ///
    /// # Errors
    /// Returns [`Error::HeapFull`] once the `#US` heap is exhausted.
    pub fn emit_string(&mut self, value: &str) -> Result<()> {
        let token = self.module.user_string(value)?;
        self.generator()?
            .emit_token(OpCode::LDSTR, TokenRef::Real(token))
    }

    /// Open a protected region; the returned label marks its end.
    ///
    /// # Errors
    /// Returns [`Error::InvalidState`] if the method stopped generating IL.
    pub fn begin_exception_block(&mut self) -> Result<Label> {
        self.generator()?.begin_exception_block()
    }

    /// Start a catch handler for `exception_type`.
    ///
    /// # Errors
    /// See [`ILGenerator::begin_catch_block`].
    pub fn begin_catch_block(&mut self, exception_type: impl Into<TypeHandle>) -> Result<()> {
        let token = self.module.type_token(exception_type)?;
        self.generator()?
            .begin_catch_block(Some(TokenRef::Real(token)))
    }

    /// Start the filter of a filtered handler.
    ///
    /// # Errors
    /// See [`ILGenerator::begin_except_filter_block`].
    pub fn begin_except_filter_block(&mut self) -> Result<()> {
        self.generator()?.begin_except_filter_block()
    }

    /// Start the handler following a filter.
    ///
    /// # Errors
    /// See [`ILGenerator::begin_catch_block`].
    pub fn begin_filter_handler(&mut self) -> Result<()> {
        self.generator()?.begin_catch_block(None)
    }

    /// Start a finally handler.
    ///
    /// # Errors
    /// See [`ILGenerator::begin_finally_block`].
    pub fn begin_finally_block(&mut self) -> Result<()> {
        self.generator()?.begin_finally_block()
    }

    /// Start a fault handler.
    ///
    /// # Errors
    /// See [`ILGenerator::begin_fault_block`].
    pub fn begin_fault_block(&mut self) -> Result<()> {
        self.generator()?.begin_fault_block()
    }

    /// Close the innermost protected region.
    ///
    /// # Errors
    /// See [`ILGenerator::end_exception_block`].
    pub fn end_exception_block(&mut self) -> Result<()> {
        self.generator()?.end_exception_block()
    }
}
