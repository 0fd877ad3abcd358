use std::fmt;

use crate::{
    builder::TypeId,
    metadata::{signatures::PrimitiveKind, token::Token},
};

/// Name of a type defined outside the module being built.
///
/// `assembly` of `None` refers to the module's core library.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeName {
    /// Name of the defining assembly, `None` for the core library
    pub assembly: Option<String>,
    /// Namespace, empty for the global namespace
    pub namespace: String,
    /// Simple name; nested types use `Outer/Inner`
    pub name: String,
}

impl TypeName {
    /// A type in the core library.
    pub fn core(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        TypeName {
            assembly: None,
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// A type in the named assembly.
    pub fn new(
        assembly: impl Into<String>,
        namespace: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        TypeName {
            assembly: Some(assembly.into()),
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// The well-known primitive this name denotes, if any.
    ///
    /// Only core library types qualify.
    #[must_use]
    pub fn primitive(&self) -> Option<PrimitiveKind> {
        if self.assembly.is_some() {
            return None;
        }
        PrimitiveKind::from_name(&self.namespace, &self.name)
    }

    /// `Namespace.Name`, or just `Name` in the global namespace.
    #[must_use]
    pub fn full_name(&self) -> String {
        if self.namespace.is_empty() {
            self.name.clone()
        } else {
            format!("{}.{}", self.namespace, self.name)
        }
    }
}

impl fmt::Display for TypeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.assembly {
            Some(assembly) => write!(f, "[{}]{}", assembly, self.full_name()),
            None => write!(f, "{}", self.full_name()),
        }
    }
}

/// A reference to a type as it appears in a signature, before it is bound to a token.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TypeHandle {
    /// A type defined in the module being built
    Defined(TypeId),
    /// An already known `TypeDef`, `TypeRef` or `TypeSpec` token
    Token(Token),
    /// An external type, imported as a `TypeRef` on first use
    Named(TypeName),
}

impl From<TypeId> for TypeHandle {
    fn from(id: TypeId) -> Self {
        TypeHandle::Defined(id)
    }
}

impl From<Token> for TypeHandle {
    fn from(token: Token) -> Self {
        TypeHandle::Token(token)
    }
}

impl From<TypeName> for TypeHandle {
    fn from(name: TypeName) -> Self {
        TypeHandle::Named(name)
    }
}

/// A type inside a signature blob.
#[derive(Debug, Clone, PartialEq)]
pub enum TypeSignature {
    /// `void`, only valid as a return type or pointer target
    Void,
    /// `bool`
    Boolean,
    /// `char`
    Char,
    /// `int8`
    I1,
    /// `unsigned int8`
    U1,
    /// `int16`
    I2,
    /// `unsigned int16`
    U2,
    /// `int32`
    I4,
    /// `unsigned int32`
    U4,
    /// `int64`
    I8,
    /// `unsigned int64`
    U8,
    /// `float32`
    R4,
    /// `float64`
    R8,
    /// `native int`
    I,
    /// `native unsigned int`
    U,
    /// `string`
    String,
    /// `object`
    Object,
    /// `typedref`
    TypedByRef,
    /// Unmanaged pointer
    Ptr(Box<TypeSignature>),
    /// Managed reference
    ByRef(Box<TypeSignature>),
    /// A value type
    ValueType(TypeHandle),
    /// A reference type
    Class(TypeHandle),
    /// Generic parameter of the enclosing type (`!n`)
    GenericParamType(u32),
    /// Generic parameter of the enclosing method (`!!n`)
    GenericParamMethod(u32),
    /// General array with rank and optional bounds
    Array(SignatureArray),
    /// Single dimension, zero based array
    SzArray(Box<TypeSignature>),
    /// Instantiated generic type
    GenericInst(Box<TypeSignature>, Vec<TypeSignature>),
    /// Function pointer
    FnPtr(Box<SignatureMethod>),
    /// A type carrying custom modifiers
    Modified(Vec<CustomModifier>, Box<TypeSignature>),
}

impl TypeSignature {
    /// The signature for a well-known primitive.
    #[must_use]
    pub fn primitive(kind: PrimitiveKind) -> TypeSignature {
        match kind {
            PrimitiveKind::Void => TypeSignature::Void,
            PrimitiveKind::Boolean => TypeSignature::Boolean,
            PrimitiveKind::Char => TypeSignature::Char,
            PrimitiveKind::I1 => TypeSignature::I1,
            PrimitiveKind::U1 => TypeSignature::U1,
            PrimitiveKind::I2 => TypeSignature::I2,
            PrimitiveKind::U2 => TypeSignature::U2,
            PrimitiveKind::I4 => TypeSignature::I4,
            PrimitiveKind::U4 => TypeSignature::U4,
            PrimitiveKind::I8 => TypeSignature::I8,
            PrimitiveKind::U8 => TypeSignature::U8,
            PrimitiveKind::R4 => TypeSignature::R4,
            PrimitiveKind::R8 => TypeSignature::R8,
            PrimitiveKind::I => TypeSignature::I,
            PrimitiveKind::U => TypeSignature::U,
            PrimitiveKind::Object => TypeSignature::Object,
            PrimitiveKind::String => TypeSignature::String,
            PrimitiveKind::TypedReference => TypeSignature::TypedByRef,
        }
    }

    /// The primitive this signature denotes, looking through core library class names.
    #[must_use]
    pub fn as_primitive(&self) -> Option<PrimitiveKind> {
        match self {
            TypeSignature::Void => Some(PrimitiveKind::Void),
            TypeSignature::Boolean => Some(PrimitiveKind::Boolean),
            TypeSignature::Char => Some(PrimitiveKind::Char),
            TypeSignature::I1 => Some(PrimitiveKind::I1),
            TypeSignature::U1 => Some(PrimitiveKind::U1),
            TypeSignature::I2 => Some(PrimitiveKind::I2),
            TypeSignature::U2 => Some(PrimitiveKind::U2),
            TypeSignature::I4 => Some(PrimitiveKind::I4),
            TypeSignature::U4 => Some(PrimitiveKind::U4),
            TypeSignature::I8 => Some(PrimitiveKind::I8),
            TypeSignature::U8 => Some(PrimitiveKind::U8),
            TypeSignature::R4 => Some(PrimitiveKind::R4),
            TypeSignature::R8 => Some(PrimitiveKind::R8),
            TypeSignature::I => Some(PrimitiveKind::I),
            TypeSignature::U => Some(PrimitiveKind::U),
            TypeSignature::String => Some(PrimitiveKind::String),
            TypeSignature::Object => Some(PrimitiveKind::Object),
            TypeSignature::TypedByRef => Some(PrimitiveKind::TypedReference),
            TypeSignature::Class(TypeHandle::Named(name))
            | TypeSignature::ValueType(TypeHandle::Named(name)) => name.primitive(),
            _ => None,
        }
    }

    /// A reference type from the core library, e.g. `System.Exception`.
    pub fn core_class(namespace: &str, name: &str) -> TypeSignature {
        TypeSignature::Class(TypeHandle::Named(TypeName::core(namespace, name)))
    }

    /// A value type from the core library, e.g. `System.Guid`.
    pub fn core_value_type(namespace: &str, name: &str) -> TypeSignature {
        TypeSignature::ValueType(TypeHandle::Named(TypeName::core(namespace, name)))
    }

    /// Returns `true` for `void`.
    #[must_use]
    pub fn is_void(&self) -> bool {
        matches!(self.as_primitive(), Some(PrimitiveKind::Void))
    }
}

/// Shape of a general (`ARRAY`) array.
#[derive(Debug, Clone, PartialEq)]
pub struct SignatureArray {
    /// Element type
    pub base: Box<TypeSignature>,
    /// Number of dimensions
    pub rank: u32,
    /// Sizes of the leading dimensions that have one
    pub sizes: Vec<u32>,
    /// Lower bounds of the leading dimensions that have one
    pub lower_bounds: Vec<i32>,
}

/// A `modreq` / `modopt` prefix.
#[derive(Debug, Clone, PartialEq)]
pub struct CustomModifier {
    /// `true` for `modreq`, `false` for `modopt`
    pub is_required: bool,
    /// The modifier type
    pub modifier_type: TypeHandle,
}

impl CustomModifier {
    /// A required modifier.
    pub fn required(modifier_type: impl Into<TypeHandle>) -> Self {
        CustomModifier {
            is_required: true,
            modifier_type: modifier_type.into(),
        }
    }

    /// An optional modifier.
    pub fn optional(modifier_type: impl Into<TypeHandle>) -> Self {
        CustomModifier {
            is_required: false,
            modifier_type: modifier_type.into(),
        }
    }
}

/// A return type or parameter of a method signature.
#[derive(Debug, Clone, PartialEq)]
pub struct SignatureParameter {
    /// Custom modifiers preceding the type
    pub modifiers: Vec<CustomModifier>,
    /// Passed by reference
    pub by_ref: bool,
    /// The parameter type
    pub base: TypeSignature,
}

impl SignatureParameter {
    /// A by-value parameter without modifiers.
    #[must_use]
    pub fn new(base: TypeSignature) -> Self {
        SignatureParameter {
            modifiers: Vec::new(),
            by_ref: false,
            base,
        }
    }

    /// A by-reference parameter.
    #[must_use]
    pub fn by_ref(base: TypeSignature) -> Self {
        SignatureParameter {
            modifiers: Vec::new(),
            by_ref: true,
            base,
        }
    }
}

impl From<TypeSignature> for SignatureParameter {
    fn from(base: TypeSignature) -> Self {
        SignatureParameter::new(base)
    }
}

/// The convention kind in the low nibble of a method signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CallingConvention {
    /// Managed default
    #[default]
    Default,
    /// Unmanaged cdecl
    C,
    /// Unmanaged stdcall
    StdCall,
    /// Unmanaged thiscall
    ThisCall,
    /// Unmanaged fastcall
    FastCall,
    /// Managed vararg
    VarArg,
}

impl CallingConvention {
    /// The convention kind code.
    #[must_use]
    pub fn code(&self) -> u8 {
        match self {
            CallingConvention::Default => 0x00,
            CallingConvention::C => 0x01,
            CallingConvention::StdCall => 0x02,
            CallingConvention::ThisCall => 0x03,
            CallingConvention::FastCall => 0x04,
            CallingConvention::VarArg => 0x05,
        }
    }

    /// Decode a convention kind code.
    #[must_use]
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0x00 => Some(CallingConvention::Default),
            0x01 => Some(CallingConvention::C),
            0x02 => Some(CallingConvention::StdCall),
            0x03 => Some(CallingConvention::ThisCall),
            0x04 => Some(CallingConvention::FastCall),
            0x05 => Some(CallingConvention::VarArg),
            _ => None,
        }
    }
}

/// A `MethodDefSig`, `MethodRefSig` or `StandAloneMethodSig`.
#[derive(Debug, Clone, PartialEq)]
pub struct SignatureMethod {
    /// Instance method
    pub has_this: bool,
    /// `this` appears explicitly as the first parameter
    pub explicit_this: bool,
    /// Convention kind
    pub calling_convention: CallingConvention,
    /// Number of method generic parameters, 0 for non-generic methods
    pub generic_param_count: u32,
    /// Return type
    pub return_type: SignatureParameter,
    /// Fixed parameters
    pub params: Vec<SignatureParameter>,
    /// Parameters after the vararg sentinel (call sites only)
    pub varargs: Vec<SignatureParameter>,
}

impl SignatureMethod {
    /// An instance method with the default convention.
    #[must_use]
    pub fn instance(return_type: TypeSignature, params: Vec<TypeSignature>) -> Self {
        SignatureMethod {
            has_this: true,
            ..SignatureMethod::static_method(return_type, params)
        }
    }

    /// A static method with the default convention.
    #[must_use]
    pub fn static_method(return_type: TypeSignature, params: Vec<TypeSignature>) -> Self {
        SignatureMethod {
            has_this: false,
            explicit_this: false,
            calling_convention: CallingConvention::Default,
            generic_param_count: 0,
            return_type: SignatureParameter::new(return_type),
            params: params.into_iter().map(SignatureParameter::new).collect(),
            varargs: Vec::new(),
        }
    }

    /// Mark the method generic over `count` parameters.
    #[must_use]
    pub fn with_generic_params(mut self, count: u32) -> Self {
        self.generic_param_count = count;
        self
    }

    /// Number of values a call pops, including `this`.
    #[must_use]
    pub fn stack_pops(&self) -> u32 {
        let this = u32::from(self.has_this && !self.explicit_this);
        (self.params.len() + self.varargs.len()) as u32 + this
    }

    /// Returns `true` if a call leaves a value on the stack.
    #[must_use]
    pub fn returns_value(&self) -> bool {
        self.return_type.by_ref || !self.return_type.base.is_void()
    }
}

/// A `FieldSig`.
#[derive(Debug, Clone, PartialEq)]
pub struct SignatureField {
    /// Custom modifiers preceding the type
    pub modifiers: Vec<CustomModifier>,
    /// Field type
    pub base: TypeSignature,
}

impl SignatureField {
    /// A field of type `base`.
    #[must_use]
    pub fn new(base: TypeSignature) -> Self {
        SignatureField {
            modifiers: Vec::new(),
            base,
        }
    }
}

/// A `PropertySig`.
#[derive(Debug, Clone, PartialEq)]
pub struct SignatureProperty {
    /// Instance property
    pub has_this: bool,
    /// Custom modifiers preceding the type
    pub modifiers: Vec<CustomModifier>,
    /// Property type
    pub base: TypeSignature,
    /// Indexer parameters
    pub params: Vec<SignatureParameter>,
}

/// One local in a `LocalVarSig`.
#[derive(Debug, Clone, PartialEq)]
pub struct SignatureLocalVariable {
    /// Custom modifiers preceding the type
    pub modifiers: Vec<CustomModifier>,
    /// Local is a managed reference
    pub is_byref: bool,
    /// Local pins the object it references
    pub is_pinned: bool,
    /// Local type
    pub base: TypeSignature,
}

impl SignatureLocalVariable {
    /// A plain local of type `base`.
    #[must_use]
    pub fn new(base: TypeSignature) -> Self {
        SignatureLocalVariable {
            modifiers: Vec::new(),
            is_byref: false,
            is_pinned: false,
            base,
        }
    }
}

/// A `LocalVarSig`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SignatureLocalVariables {
    /// Locals in slot order
    pub locals: Vec<SignatureLocalVariable>,
}

/// A `MethodSpec` instantiation blob.
#[derive(Debug, Clone, PartialEq)]
pub struct SignatureMethodSpec {
    /// Generic arguments in parameter order
    pub generic_args: Vec<TypeSignature>,
}

/// Any signature that can appear in a `MemberRef`.
#[derive(Debug, Clone, PartialEq)]
pub enum MemberSignature {
    /// A method reference
    Method(SignatureMethod),
    /// A field reference
    Field(SignatureField),
}
