//! Typed handles into the module arena and references to methods and fields.

use std::fmt;

use crate::metadata::{
    signatures::{SignatureField, SignatureMethod, TypeHandle},
    token::Token,
};

macro_rules! entity_ids {
    ($($(#[$meta:meta])* $name:ident),* $(,)?) => {
        $(
            $(#[$meta])*
            #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
            pub struct $name(pub(crate) u32);

            impl $name {
                /// Position of the entity in its arena, in definition order.
                #[must_use]
                pub fn index(&self) -> usize {
                    self.0 as usize
                }

                pub(crate) fn from_index(index: usize) -> Self {
                    $name(u32::try_from(index).unwrap_or(u32::MAX))
                }
            }

            impl fmt::Display for $name {
                fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                    write!(f, "{}#{}", stringify!($name), self.0)
                }
            }
        )*
    };
}

entity_ids! {
    /// A type defined in a module.
    TypeId,
    /// A method or constructor defined in a module.
    MethodId,
    /// A field defined in a module.
    FieldId,
    /// A property defined on a type.
    PropertyId,
    /// An event defined on a type.
    EventId,
    /// A parameter of a defined method.
    ParamId,
    /// A generic parameter of a defined type or method.
    GenericParamId,
}

/// A method that IL or a custom attribute refers to.
#[derive(Debug, Clone, PartialEq)]
pub enum MethodTarget {
    /// A method of the module being built
    Defined(MethodId),
    /// A method of another type, imported as a `MemberRef`
    External {
        /// Declaring type
        parent: TypeHandle,
        /// Method name
        name: String,
        /// Call signature
        signature: SignatureMethod,
    },
    /// A `MethodDef`, `MemberRef` or `MethodSpec` token obtained elsewhere
    Token(Token),
}

impl MethodTarget {
    /// A method declared on `parent`, resolved through the module's import cache.
    pub fn external(
        parent: impl Into<TypeHandle>,
        name: impl Into<String>,
        signature: SignatureMethod,
    ) -> Self {
        MethodTarget::External {
            parent: parent.into(),
            name: name.into(),
            signature,
        }
    }
}

impl From<MethodId> for MethodTarget {
    fn from(id: MethodId) -> Self {
        MethodTarget::Defined(id)
    }
}

impl From<Token> for MethodTarget {
    fn from(token: Token) -> Self {
        MethodTarget::Token(token)
    }
}

/// A field that IL refers to.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldTarget {
    /// A field of the module being built
    Defined(FieldId),
    /// A field of another type, imported as a `MemberRef`
    External {
        /// Declaring type
        parent: TypeHandle,
        /// Field name
        name: String,
        /// Field signature
        signature: SignatureField,
    },
    /// A `Field` or `MemberRef` token obtained elsewhere
    Token(Token),
}

impl FieldTarget {
    /// A field declared on `parent`, resolved through the module's import cache.
    pub fn external(
        parent: impl Into<TypeHandle>,
        name: impl Into<String>,
        signature: SignatureField,
    ) -> Self {
        FieldTarget::External {
            parent: parent.into(),
            name: name.into(),
            signature,
        }
    }
}

impl From<FieldId> for FieldTarget {
    fn from(id: FieldId) -> Self {
        FieldTarget::Defined(id)
    }
}

impl From<Token> for FieldTarget {
    fn from(token: Token) -> Self {
        FieldTarget::Token(token)
    }
}

/// An entity that can carry custom attributes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttributeTarget {
    /// The module itself
    Module,
    /// A defined type
    Type(TypeId),
    /// A defined method or constructor
    Method(MethodId),
    /// A defined field
    Field(FieldId),
    /// A parameter or return value
    Param(ParamId),
    /// A property
    Property(PropertyId),
    /// An event
    Event(EventId),
    /// A generic parameter
    GenericParam(GenericParamId),
}

macro_rules! attribute_target_from {
    ($($id:ident => $variant:ident),*) => {
        $(
            impl From<$id> for AttributeTarget {
                fn from(id: $id) -> Self {
                    AttributeTarget::$variant(id)
                }
            }
        )*
    };
}

attribute_target_from! {
    TypeId => Type,
    MethodId => Method,
    FieldId => Field,
    ParamId => Param,
    PropertyId => Property,
    EventId => Event,
    GenericParamId => GenericParam
}

/// A property or event whose accessor list a method joins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SemanticsOwner {
    /// A property
    Property(PropertyId),
    /// An event
    Event(EventId),
}

impl From<PropertyId> for SemanticsOwner {
    fn from(id: PropertyId) -> Self {
        SemanticsOwner::Property(id)
    }
}

impl From<EventId> for SemanticsOwner {
    fn from(id: EventId) -> Self {
        SemanticsOwner::Event(id)
    }
}
