//! Static CIL opcode table.
//!
//! Every opcode is a constant [`OpCode`] carrying its encoding, operand kind, flow control kind and
//! the number of stack slots it pops and pushes. Two-byte opcodes are stored with their `0xFE`
//! prefix in the high byte of [`OpCode::value`].
//!
//! Opcodes whose stack effect depends on a call signature (`call`, `callvirt`, `newobj`, `calli`,
//! `ret`) report [`VARIABLE`] and are resolved by the generator.
//!
//! # References
//! - ECMA-335 6th Edition, Partition III - CIL Instruction Set

/// Marker for a stack effect that depends on the operand.
pub const VARIABLE: u8 = u8::MAX;

/// The kind of inline operand following an opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperandType {
    /// No operand
    None,
    /// 1-byte signed branch displacement
    ShortBranch,
    /// 4-byte signed branch displacement
    Branch,
    /// Signed 8-bit immediate
    Int8,
    /// Unsigned 8-bit immediate (short argument/local index, alignment, check flags)
    UInt8,
    /// Unsigned 16-bit immediate (argument/local index)
    UInt16,
    /// Signed 32-bit immediate
    Int32,
    /// Signed 64-bit immediate
    Int64,
    /// 32-bit float
    Float32,
    /// 64-bit float
    Float64,
    /// Metadata token
    Token,
    /// Jump table: a `u32` count followed by that many 4-byte displacements
    Switch,
}

impl OperandType {
    /// Size of the operand in bytes; the switch table is counted by its count field only.
    #[must_use]
    pub fn size(self) -> usize {
        match self {
            OperandType::None => 0,
            OperandType::ShortBranch | OperandType::Int8 | OperandType::UInt8 => 1,
            OperandType::UInt16 => 2,
            OperandType::Branch
            | OperandType::Int32
            | OperandType::Float32
            | OperandType::Token
            | OperandType::Switch => 4,
            OperandType::Int64 | OperandType::Float64 => 8,
        }
    }
}

/// How an instruction affects control flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FlowType {
    /// Execution continues with the next instruction
    Sequential,
    /// Debugger breakpoint
    Break,
    /// Branch taken or not taken depending on the stack
    ConditionalBranch,
    /// Branch always taken
    UnconditionalBranch,
    /// Jump table
    Switch,
    /// Method call; execution continues afterwards
    Call,
    /// Leaves the method (`ret`, `jmp`)
    Return,
    /// Raises an exception (`throw`, `rethrow`)
    Throw,
    /// Exits a protected region (`leave`, `leave.s`)
    Leave,
    /// Ends a handler block (`endfinally`, `endfilter`)
    EndHandler,
    /// Instruction prefix
    Meta,
}

/// One CIL opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OpCode {
    /// Mnemonic
    pub name: &'static str,
    /// Encoding; two-byte opcodes carry `0xFE` in the high byte
    pub value: u16,
    /// Inline operand kind
    pub operand: OperandType,
    /// Control flow kind
    pub flow: FlowType,
    /// Stack slots consumed, or [`VARIABLE`]
    pub pops: u8,
    /// Stack slots produced, or [`VARIABLE`]
    pub pushes: u8,
}

impl OpCode {
    /// Returns `true` for `0xFE`-prefixed opcodes.
    #[must_use]
    pub fn is_two_byte(&self) -> bool {
        self.value > 0xFF
    }

    /// Encoded size of the opcode without its operand.
    #[must_use]
    pub fn size(&self) -> usize {
        if self.is_two_byte() {
            2
        } else {
            1
        }
    }

    /// Encoded opcode bytes.
    #[must_use]
    pub fn bytes(&self) -> ([u8; 2], usize) {
        let [high, low] = self.value.to_be_bytes();
        if self.is_two_byte() {
            ([high, low], 2)
        } else {
            ([low, 0], 1)
        }
    }

    /// Returns `true` if execution never falls through to the next instruction.
    #[must_use]
    pub fn ends_flow(&self) -> bool {
        matches!(
            self.flow,
            FlowType::UnconditionalBranch
                | FlowType::Return
                | FlowType::Throw
                | FlowType::Leave
                | FlowType::EndHandler
        )
    }

    /// Returns `true` if the stack effect depends on a call signature.
    #[must_use]
    pub fn is_variable(&self) -> bool {
        self.pops == VARIABLE || self.pushes == VARIABLE
    }

    /// Look up an opcode by its encoding.
    #[must_use]
    pub fn from_value(value: u16) -> Option<OpCode> {
        OpCode::ALL.iter().copied().find(|op| op.value == value)
    }

    /// Look up an opcode by mnemonic.
    #[must_use]
    pub fn from_name(name: &str) -> Option<OpCode> {
        OpCode::ALL.iter().copied().find(|op| op.name == name)
    }
}

impl std::fmt::Display for OpCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name)
    }
}

macro_rules! opcodes {
    ($($ident:ident = $name:literal, $value:literal, $operand:ident, $flow:ident, $pops:expr, $pushes:expr;)*) => {
        impl OpCode {
            $(
                #[doc = concat!("`", $name, "`")]
                pub const $ident: OpCode = OpCode {
                    name: $name,
                    value: $value,
                    operand: OperandType::$operand,
                    flow: FlowType::$flow,
                    pops: $pops,
                    pushes: $pushes,
                };
            )*

            /// Every defined opcode in encoding order.
            pub const ALL: &'static [OpCode] = &[$(OpCode::$ident,)*];
        }
    };
}

opcodes! {
    NOP = "nop", 0x00, None, Sequential, 0, 0;
    BREAK = "break", 0x01, None, Break, 0, 0;
    LDARG_0 = "ldarg.0", 0x02, None, Sequential, 0, 1;
    LDARG_1 = "ldarg.1", 0x03, None, Sequential, 0, 1;
    LDARG_2 = "ldarg.2", 0x04, None, Sequential, 0, 1;
    LDARG_3 = "ldarg.3", 0x05, None, Sequential, 0, 1;
    LDLOC_0 = "ldloc.0", 0x06, None, Sequential, 0, 1;
    LDLOC_1 = "ldloc.1", 0x07, None, Sequential, 0, 1;
    LDLOC_2 = "ldloc.2", 0x08, None, Sequential, 0, 1;
    LDLOC_3 = "ldloc.3", 0x09, None, Sequential, 0, 1;
    STLOC_0 = "stloc.0", 0x0A, None, Sequential, 1, 0;
    STLOC_1 = "stloc.1", 0x0B, None, Sequential, 1, 0;
    STLOC_2 = "stloc.2", 0x0C, None, Sequential, 1, 0;
    STLOC_3 = "stloc.3", 0x0D, None, Sequential, 1, 0;
    LDARG_S = "ldarg.s", 0x0E, UInt8, Sequential, 0, 1;
    LDARGA_S = "ldarga.s", 0x0F, UInt8, Sequential, 0, 1;
    STARG_S = "starg.s", 0x10, UInt8, Sequential, 1, 0;
    LDLOC_S = "ldloc.s", 0x11, UInt8, Sequential, 0, 1;
    LDLOCA_S = "ldloca.s", 0x12, UInt8, Sequential, 0, 1;
    STLOC_S = "stloc.s", 0x13, UInt8, Sequential, 1, 0;
    LDNULL = "ldnull", 0x14, None, Sequential, 0, 1;
    LDC_I4_M1 = "ldc.i4.m1", 0x15, None, Sequential, 0, 1;
    LDC_I4_0 = "ldc.i4.0", 0x16, None, Sequential, 0, 1;
    LDC_I4_1 = "ldc.i4.1", 0x17, None, Sequential, 0, 1;
    LDC_I4_2 = "ldc.i4.2", 0x18, None, Sequential, 0, 1;
    LDC_I4_3 = "ldc.i4.3", 0x19, None, Sequential, 0, 1;
    LDC_I4_4 = "ldc.i4.4", 0x1A, None, Sequential, 0, 1;
    LDC_I4_5 = "ldc.i4.5", 0x1B, None, Sequential, 0, 1;
    LDC_I4_6 = "ldc.i4.6", 0x1C, None, Sequential, 0, 1;
    LDC_I4_7 = "ldc.i4.7", 0x1D, None, Sequential, 0, 1;
    LDC_I4_8 = "ldc.i4.8", 0x1E, None, Sequential, 0, 1;
    LDC_I4_S = "ldc.i4.s", 0x1F, Int8, Sequential, 0, 1;
    LDC_I4 = "ldc.i4", 0x20, Int32, Sequential, 0, 1;
    LDC_I8 = "ldc.i8", 0x21, Int64, Sequential, 0, 1;
    LDC_R4 = "ldc.r4", 0x22, Float32, Sequential, 0, 1;
    LDC_R8 = "ldc.r8", 0x23, Float64, Sequential, 0, 1;
    DUP = "dup", 0x25, None, Sequential, 1, 2;
    POP = "pop", 0x26, None, Sequential, 1, 0;
    JMP = "jmp", 0x27, Token, Return, 0, 0;
    CALL = "call", 0x28, Token, Call, VARIABLE, VARIABLE;
    CALLI = "calli", 0x29, Token, Call, VARIABLE, VARIABLE;
    RET = "ret", 0x2A, None, Return, VARIABLE, 0;
    BR_S = "br.s", 0x2B, ShortBranch, UnconditionalBranch, 0, 0;
    BRFALSE_S = "brfalse.s", 0x2C, ShortBranch, ConditionalBranch, 1, 0;
    BRTRUE_S = "brtrue.s", 0x2D, ShortBranch, ConditionalBranch, 1, 0;
    BEQ_S = "beq.s", 0x2E, ShortBranch, ConditionalBranch, 2, 0;
    BGE_S = "bge.s", 0x2F, ShortBranch, ConditionalBranch, 2, 0;
    BGT_S = "bgt.s", 0x30, ShortBranch, ConditionalBranch, 2, 0;
    BLE_S = "ble.s", 0x31, ShortBranch, ConditionalBranch, 2, 0;
    BLT_S = "blt.s", 0x32, ShortBranch, ConditionalBranch, 2, 0;
    BNE_UN_S = "bne.un.s", 0x33, ShortBranch, ConditionalBranch, 2, 0;
    BGE_UN_S = "bge.un.s", 0x34, ShortBranch, ConditionalBranch, 2, 0;
    BGT_UN_S = "bgt.un.s", 0x35, ShortBranch, ConditionalBranch, 2, 0;
    BLE_UN_S = "ble.un.s", 0x36, ShortBranch, ConditionalBranch, 2, 0;
    BLT_UN_S = "blt.un.s", 0x37, ShortBranch, ConditionalBranch, 2, 0;
    BR = "br", 0x38, Branch, UnconditionalBranch, 0, 0;
    BRFALSE = "brfalse", 0x39, Branch, ConditionalBranch, 1, 0;
    BRTRUE = "brtrue", 0x3A, Branch, ConditionalBranch, 1, 0;
    BEQ = "beq", 0x3B, Branch, ConditionalBranch, 2, 0;
    BGE = "bge", 0x3C, Branch, ConditionalBranch, 2, 0;
    BGT = "bgt", 0x3D, Branch, ConditionalBranch, 2, 0;
    BLE = "ble", 0x3E, Branch, ConditionalBranch, 2, 0;
    BLT = "blt", 0x3F, Branch, ConditionalBranch, 2, 0;
    BNE_UN = "bne.un", 0x40, Branch, ConditionalBranch, 2, 0;
    BGE_UN = "bge.un", 0x41, Branch, ConditionalBranch, 2, 0;
    BGT_UN = "bgt.un", 0x42, Branch, ConditionalBranch, 2, 0;
    BLE_UN = "ble.un", 0x43, Branch, ConditionalBranch, 2, 0;
    BLT_UN = "blt.un", 0x44, Branch, ConditionalBranch, 2, 0;
    SWITCH = "switch", 0x45, Switch, Switch, 1, 0;
    LDIND_I1 = "ldind.i1", 0x46, None, Sequential, 1, 1;
    LDIND_U1 = "ldind.u1", 0x47, None, Sequential, 1, 1;
    LDIND_I2 = "ldind.i2", 0x48, None, Sequential, 1, 1;
    LDIND_U2 = "ldind.u2", 0x49, None, Sequential, 1, 1;
    LDIND_I4 = "ldind.i4", 0x4A, None, Sequential, 1, 1;
    LDIND_U4 = "ldind.u4", 0x4B, None, Sequential, 1, 1;
    LDIND_I8 = "ldind.i8", 0x4C, None, Sequential, 1, 1;
    LDIND_I = "ldind.i", 0x4D, None, Sequential, 1, 1;
    LDIND_R4 = "ldind.r4", 0x4E, None, Sequential, 1, 1;
    LDIND_R8 = "ldind.r8", 0x4F, None, Sequential, 1, 1;
    LDIND_REF = "ldind.ref", 0x50, None, Sequential, 1, 1;
    STIND_REF = "stind.ref", 0x51, None, Sequential, 2, 0;
    STIND_I1 = "stind.i1", 0x52, None, Sequential, 2, 0;
    STIND_I2 = "stind.i2", 0x53, None, Sequential, 2, 0;
    STIND_I4 = "stind.i4", 0x54, None, Sequential, 2, 0;
    STIND_I8 = "stind.i8", 0x55, None, Sequential, 2, 0;
    STIND_R4 = "stind.r4", 0x56, None, Sequential, 2, 0;
    STIND_R8 = "stind.r8", 0x57, None, Sequential, 2, 0;
    ADD = "add", 0x58, None, Sequential, 2, 1;
    SUB = "sub", 0x59, None, Sequential, 2, 1;
    MUL = "mul", 0x5A, None, Sequential, 2, 1;
    DIV = "div", 0x5B, None, Sequential, 2, 1;
    DIV_UN = "div.un", 0x5C, None, Sequential, 2, 1;
    REM = "rem", 0x5D, None, Sequential, 2, 1;
    REM_UN = "rem.un", 0x5E, None, Sequential, 2, 1;
    AND = "and", 0x5F, None, Sequential, 2, 1;
    OR = "or", 0x60, None, Sequential, 2, 1;
    XOR = "xor", 0x61, None, Sequential, 2, 1;
    SHL = "shl", 0x62, None, Sequential, 2, 1;
    SHR = "shr", 0x63, None, Sequential, 2, 1;
    SHR_UN = "shr.un", 0x64, None, Sequential, 2, 1;
    NEG = "neg", 0x65, None, Sequential, 1, 1;
    NOT = "not", 0x66, None, Sequential, 1, 1;
    CONV_I1 = "conv.i1", 0x67, None, Sequential, 1, 1;
    CONV_I2 = "conv.i2", 0x68, None, Sequential, 1, 1;
    CONV_I4 = "conv.i4", 0x69, None, Sequential, 1, 1;
    CONV_I8 = "conv.i8", 0x6A, None, Sequential, 1, 1;
    CONV_R4 = "conv.r4", 0x6B, None, Sequential, 1, 1;
    CONV_R8 = "conv.r8", 0x6C, None, Sequential, 1, 1;
    CONV_U4 = "conv.u4", 0x6D, None, Sequential, 1, 1;
    CONV_U8 = "conv.u8", 0x6E, None, Sequential, 1, 1;
    CALLVIRT = "callvirt", 0x6F, Token, Call, VARIABLE, VARIABLE;
    CPOBJ = "cpobj", 0x70, Token, Sequential, 2, 0;
    LDOBJ = "ldobj", 0x71, Token, Sequential, 1, 1;
    LDSTR = "ldstr", 0x72, Token, Sequential, 0, 1;
    NEWOBJ = "newobj", 0x73, Token, Call, VARIABLE, 1;
    CASTCLASS = "castclass", 0x74, Token, Sequential, 1, 1;
    ISINST = "isinst", 0x75, Token, Sequential, 1, 1;
    CONV_R_UN = "conv.r.un", 0x76, None, Sequential, 1, 1;
    UNBOX = "unbox", 0x79, Token, Sequential, 1, 1;
    THROW = "throw", 0x7A, None, Throw, 1, 0;
    LDFLD = "ldfld", 0x7B, Token, Sequential, 1, 1;
    LDFLDA = "ldflda", 0x7C, Token, Sequential, 1, 1;
    STFLD = "stfld", 0x7D, Token, Sequential, 2, 0;
    LDSFLD = "ldsfld", 0x7E, Token, Sequential, 0, 1;
    LDSFLDA = "ldsflda", 0x7F, Token, Sequential, 0, 1;
    STSFLD = "stsfld", 0x80, Token, Sequential, 1, 0;
    STOBJ = "stobj", 0x81, Token, Sequential, 2, 0;
    CONV_OVF_I1_UN = "conv.ovf.i1.un", 0x82, None, Sequential, 1, 1;
    CONV_OVF_I2_UN = "conv.ovf.i2.un", 0x83, None, Sequential, 1, 1;
    CONV_OVF_I4_UN = "conv.ovf.i4.un", 0x84, None, Sequential, 1, 1;
    CONV_OVF_I8_UN = "conv.ovf.i8.un", 0x85, None, Sequential, 1, 1;
    CONV_OVF_U1_UN = "conv.ovf.u1.un", 0x86, None, Sequential, 1, 1;
    CONV_OVF_U2_UN = "conv.ovf.u2.un", 0x87, None, Sequential, 1, 1;
    CONV_OVF_U4_UN = "conv.ovf.u4.un", 0x88, None, Sequential, 1, 1;
    CONV_OVF_U8_UN = "conv.ovf.u8.un", 0x89, None, Sequential, 1, 1;
    CONV_OVF_I_UN = "conv.ovf.i.un", 0x8A, None, Sequential, 1, 1;
    CONV_OVF_U_UN = "conv.ovf.u.un", 0x8B, None, Sequential, 1, 1;
    BOX = "box", 0x8C, Token, Sequential, 1, 1;
    NEWARR = "newarr", 0x8D, Token, Sequential, 1, 1;
    LDLEN = "ldlen", 0x8E, None, Sequential, 1, 1;
    LDELEMA = "ldelema", 0x8F, Token, Sequential, 2, 1;
    LDELEM_I1 = "ldelem.i1", 0x90, None, Sequential, 2, 1;
    LDELEM_U1 = "ldelem.u1", 0x91, None, Sequential, 2, 1;
    LDELEM_I2 = "ldelem.i2", 0x92, None, Sequential, 2, 1;
    LDELEM_U2 = "ldelem.u2", 0x93, None, Sequential, 2, 1;
    LDELEM_I4 = "ldelem.i4", 0x94, None, Sequential, 2, 1;
    LDELEM_U4 = "ldelem.u4", 0x95, None, Sequential, 2, 1;
    LDELEM_I8 = "ldelem.i8", 0x96, None, Sequential, 2, 1;
    LDELEM_I = "ldelem.i", 0x97, None, Sequential, 2, 1;
    LDELEM_R4 = "ldelem.r4", 0x98, None, Sequential, 2, 1;
    LDELEM_R8 = "ldelem.r8", 0x99, None, Sequential, 2, 1;
    LDELEM_REF = "ldelem.ref", 0x9A, None, Sequential, 2, 1;
    STELEM_I = "stelem.i", 0x9B, None, Sequential, 3, 0;
    STELEM_I1 = "stelem.i1", 0x9C, None, Sequential, 3, 0;
    STELEM_I2 = "stelem.i2", 0x9D, None, Sequential, 3, 0;
    STELEM_I4 = "stelem.i4", 0x9E, None, Sequential, 3, 0;
    STELEM_I8 = "stelem.i8", 0x9F, None, Sequential, 3, 0;
    STELEM_R4 = "stelem.r4", 0xA0, None, Sequential, 3, 0;
    STELEM_R8 = "stelem.r8", 0xA1, None, Sequential, 3, 0;
    STELEM_REF = "stelem.ref", 0xA2, None, Sequential, 3, 0;
    LDELEM = "ldelem", 0xA3, Token, Sequential, 2, 1;
    STELEM = "stelem", 0xA4, Token, Sequential, 3, 0;
    UNBOX_ANY = "unbox.any", 0xA5, Token, Sequential, 1, 1;
    CONV_OVF_I1 = "conv.ovf.i1", 0xB3, None, Sequential, 1, 1;
    CONV_OVF_U1 = "conv.ovf.u1", 0xB4, None, Sequential, 1, 1;
    CONV_OVF_I2 = "conv.ovf.i2", 0xB5, None, Sequential, 1, 1;
    CONV_OVF_U2 = "conv.ovf.u2", 0xB6, None, Sequential, 1, 1;
    CONV_OVF_I4 = "conv.ovf.i4", 0xB7, None, Sequential, 1, 1;
    CONV_OVF_U4 = "conv.ovf.u4", 0xB8, None, Sequential, 1, 1;
    CONV_OVF_I8 = "conv.ovf.i8", 0xB9, None, Sequential, 1, 1;
    CONV_OVF_U8 = "conv.ovf.u8", 0xBA, None, Sequential, 1, 1;
    REFANYVAL = "refanyval", 0xC2, Token, Sequential, 1, 1;
    CKFINITE = "ckfinite", 0xC3, None, Sequential, 1, 1;
    MKREFANY = "mkrefany", 0xC6, Token, Sequential, 1, 1;
    LDTOKEN = "ldtoken", 0xD0, Token, Sequential, 0, 1;
    CONV_U2 = "conv.u2", 0xD1, None, Sequential, 1, 1;
    CONV_U1 = "conv.u1", 0xD2, None, Sequential, 1, 1;
    CONV_I = "conv.i", 0xD3, None, Sequential, 1, 1;
    CONV_OVF_I = "conv.ovf.i", 0xD4, None, Sequential, 1, 1;
    CONV_OVF_U = "conv.ovf.u", 0xD5, None, Sequential, 1, 1;
    ADD_OVF = "add.ovf", 0xD6, None, Sequential, 2, 1;
    ADD_OVF_UN = "add.ovf.un", 0xD7, None, Sequential, 2, 1;
    MUL_OVF = "mul.ovf", 0xD8, None, Sequential, 2, 1;
    MUL_OVF_UN = "mul.ovf.un", 0xD9, None, Sequential, 2, 1;
    SUB_OVF = "sub.ovf", 0xDA, None, Sequential, 2, 1;
    SUB_OVF_UN = "sub.ovf.un", 0xDB, None, Sequential, 2, 1;
    ENDFINALLY = "endfinally", 0xDC, None, EndHandler, 0, 0;
    LEAVE = "leave", 0xDD, Branch, Leave, 0, 0;
    LEAVE_S = "leave.s", 0xDE, ShortBranch, Leave, 0, 0;
    STIND_I = "stind.i", 0xDF, None, Sequential, 2, 0;
    CONV_U = "conv.u", 0xE0, None, Sequential, 1, 1;
    ARGLIST = "arglist", 0xFE00, None, Sequential, 0, 1;
    CEQ = "ceq", 0xFE01, None, Sequential, 2, 1;
    CGT = "cgt", 0xFE02, None, Sequential, 2, 1;
    CGT_UN = "cgt.un", 0xFE03, None, Sequential, 2, 1;
    CLT = "clt", 0xFE04, None, Sequential, 2, 1;
    CLT_UN = "clt.un", 0xFE05, None, Sequential, 2, 1;
    LDFTN = "ldftn", 0xFE06, Token, Sequential, 0, 1;
    LDVIRTFTN = "ldvirtftn", 0xFE07, Token, Sequential, 1, 1;
    LDARG = "ldarg", 0xFE09, UInt16, Sequential, 0, 1;
    LDARGA = "ldarga", 0xFE0A, UInt16, Sequential, 0, 1;
    STARG = "starg", 0xFE0B, UInt16, Sequential, 1, 0;
    LDLOC = "ldloc", 0xFE0C, UInt16, Sequential, 0, 1;
    LDLOCA = "ldloca", 0xFE0D, UInt16, Sequential, 0, 1;
    STLOC = "stloc", 0xFE0E, UInt16, Sequential, 1, 0;
    LOCALLOC = "localloc", 0xFE0F, None, Sequential, 1, 1;
    ENDFILTER = "endfilter", 0xFE11, None, EndHandler, 1, 0;
    UNALIGNED = "unaligned.", 0xFE12, UInt8, Meta, 0, 0;
    VOLATILE = "volatile.", 0xFE13, None, Meta, 0, 0;
    TAIL = "tail.", 0xFE14, None, Meta, 0, 0;
    INITOBJ = "initobj", 0xFE15, Token, Sequential, 1, 0;
    CONSTRAINED = "constrained.", 0xFE16, Token, Meta, 0, 0;
    CPBLK = "cpblk", 0xFE17, None, Sequential, 3, 0;
    INITBLK = "initblk", 0xFE18, None, Sequential, 3, 0;
    NO = "no.", 0xFE19, UInt8, Meta, 0, 0;
    RETHROW = "rethrow", 0xFE1A, None, Throw, 0, 0;
    SIZEOF = "sizeof", 0xFE1C, Token, Sequential, 0, 1;
    REFANYTYPE = "refanytype", 0xFE1D, None, Sequential, 1, 1;
    READONLY = "readonly.", 0xFE1E, None, Meta, 0, 0;
}
