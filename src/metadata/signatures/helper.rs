use crate::{
    metadata::signatures::{
        method_convention_byte, CustomModifier, SignatureField, SignatureLocalVariable,
        SignatureMethod, SignatureParameter, SignatureWriter, TypeResolver, TypeSignature,
        CALLING_CONVENTION,
    },
    Error, Result,
};

#[derive(Debug, Clone, PartialEq)]
enum HelperKind {
    Method {
        convention: u8,
        generic_param_count: u32,
        return_type: SignatureParameter,
    },
    Field {
        modifiers: Vec<CustomModifier>,
        base: TypeSignature,
    },
    Property {
        has_this: bool,
        base: TypeSignature,
    },
    Locals,
}

#[derive(Debug, Clone, PartialEq)]
enum Entry {
    Argument(SignatureParameter),
    Sentinel,
    Local(SignatureLocalVariable),
}

/// Lazily bound signature.
///
/// Collects a signature's shape with unresolved [`crate::metadata::signatures::TypeHandle`]s and
/// produces the blob once a module is supplied to [`SignatureHelper::get_signature`]. The same
/// helper can be bound to different resolvers.
///
/// # Examples
///
/// ```rust
/// use dotemit::metadata::signatures::{NullResolver, SignatureHelper, TypeSignature};
///
/// let mut helper = SignatureHelper::local_var_sig();
/// helper.add_local(TypeSignature::I4, false)?;
/// helper.add_local(TypeSignature::String, false)?;
/// assert_eq!(helper.get_signature(&mut NullResolver)?, [0x07, 0x02, 0x08, 0x0E]);
/// # Ok::<(), dotemit::Error>(())
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct SignatureHelper {
    kind: HelperKind,
    entries: Vec<Entry>,
}

impl SignatureHelper {
    /// A method signature with the given this-ness and return type.
    #[must_use]
    pub fn method_sig(has_this: bool, return_type: TypeSignature) -> Self {
        let template = SignatureMethod {
            has_this,
            ..SignatureMethod::static_method(return_type, Vec::new())
        };
        Self::from_method(&template)
    }

    /// A helper seeded from a complete method signature.
    #[must_use]
    pub fn from_method(signature: &SignatureMethod) -> Self {
        let mut entries: Vec<Entry> = signature
            .params
            .iter()
            .cloned()
            .map(Entry::Argument)
            .collect();
        if !signature.varargs.is_empty() {
            entries.push(Entry::Sentinel);
            entries.extend(signature.varargs.iter().cloned().map(Entry::Argument));
        }
        SignatureHelper {
            kind: HelperKind::Method {
                convention: method_convention_byte(signature),
                generic_param_count: signature.generic_param_count,
                return_type: signature.return_type.clone(),
            },
            entries,
        }
    }

    /// A field signature.
    #[must_use]
    pub fn field_sig(base: TypeSignature) -> Self {
        SignatureHelper {
            kind: HelperKind::Field {
                modifiers: Vec::new(),
                base,
            },
            entries: Vec::new(),
        }
    }

    /// A property signature.
    #[must_use]
    pub fn property_sig(has_this: bool, base: TypeSignature) -> Self {
        SignatureHelper {
            kind: HelperKind::Property { has_this, base },
            entries: Vec::new(),
        }
    }

    /// An empty local variable signature.
    #[must_use]
    pub fn local_var_sig() -> Self {
        SignatureHelper {
            kind: HelperKind::Locals,
            entries: Vec::new(),
        }
    }

    /// Append an argument to a method or property signature.
    ///
    /// # Errors
    /// Returns [`Error::InvalidState`] for field and local signatures.
    pub fn add_argument(&mut self, parameter: impl Into<SignatureParameter>) -> Result<()> {
        match self.kind {
            HelperKind::Method { .. } | HelperKind::Property { .. } => {
                self.entries.push(Entry::Argument(parameter.into()));
                Ok(())
            }
            _ => Err(Error::InvalidState(
                "Arguments can only be added to method or property signatures".to_string(),
            )),
        }
    }

    /// Append several arguments.
    ///
    /// # Errors
    /// See [`SignatureHelper::add_argument`].
    pub fn add_arguments<I>(&mut self, parameters: I) -> Result<()>
    where
        I: IntoIterator<Item = TypeSignature>,
    {
        for parameter in parameters {
            self.add_argument(parameter)?;
        }
        Ok(())
    }

    /// Mark the start of the optional arguments of a vararg call site.
    ///
    /// # Errors
    /// Returns [`Error::InvalidState`] if the helper is not a method signature or a sentinel was
    /// already added.
    pub fn add_sentinel(&mut self) -> Result<()> {
        let HelperKind::Method { convention, .. } = &mut self.kind else {
            return Err(Error::InvalidState(
                "Sentinels are only valid in method signatures".to_string(),
            ));
        };
        if self.entries.contains(&Entry::Sentinel) {
            return Err(Error::InvalidState("Sentinel already added".to_string()));
        }
        *convention = (*convention & !CALLING_CONVENTION::KIND_MASK) | CALLING_CONVENTION::VARARG;
        self.entries.push(Entry::Sentinel);
        Ok(())
    }

    /// Append a local to a local variable signature.
    ///
    /// # Errors
    /// Returns [`Error::InvalidState`] for non-local signatures.
    pub fn add_local(&mut self, base: TypeSignature, pinned: bool) -> Result<()> {
        let mut local = SignatureLocalVariable::new(base);
        local.is_pinned = pinned;
        self.add_local_variable(local)
    }

    /// Append a fully described local.
    ///
    /// # Errors
    /// Returns [`Error::InvalidState`] for non-local signatures.
    pub fn add_local_variable(&mut self, local: SignatureLocalVariable) -> Result<()> {
        if self.kind != HelperKind::Locals {
            return Err(Error::InvalidState(
                "Locals can only be added to local variable signatures".to_string(),
            ));
        }
        self.entries.push(Entry::Local(local));
        Ok(())
    }

    /// Number of arguments or locals added so far.
    #[must_use]
    pub fn count(&self) -> usize {
        self.entries
            .iter()
            .filter(|entry| !matches!(entry, Entry::Sentinel))
            .count()
    }

    /// Bind every type handle through `resolver` and produce the blob.
    ///
    /// # Errors
    /// Returns an error if a handle cannot be resolved or a value is out of range.
    pub fn get_signature(&self, resolver: &mut dyn TypeResolver) -> Result<Vec<u8>> {
        let mut writer = match &self.kind {
            HelperKind::Method {
                convention,
                generic_param_count,
                return_type,
            } => SignatureWriter::method(resolver, *convention, *generic_param_count, return_type)?,
            HelperKind::Field { modifiers, base } => {
                let field = SignatureField {
                    modifiers: modifiers.clone(),
                    base: base.clone(),
                };
                return SignatureWriter::field(resolver, &field)?.finish();
            }
            HelperKind::Property { has_this, base } => {
                SignatureWriter::property(resolver, *has_this, &[], base)?
            }
            HelperKind::Locals => SignatureWriter::local_vars(resolver),
        };

        for entry in &self.entries {
            match entry {
                Entry::Argument(parameter) => writer.add_argument(parameter)?,
                Entry::Sentinel => writer.add_sentinel()?,
                Entry::Local(local) => writer.add_local(local)?,
            }
        }
        writer.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::signatures::{encode_method_signature, NullResolver};

    #[test]
    fn matches_eager_encoding() -> Result<()> {
        let mut helper = SignatureHelper::method_sig(true, TypeSignature::Void);
        helper.add_arguments([TypeSignature::String, TypeSignature::R8])?;

        let eager = SignatureMethod::instance(
            TypeSignature::Void,
            vec![TypeSignature::String, TypeSignature::R8],
        );
        assert_eq!(
            helper.get_signature(&mut NullResolver)?,
            encode_method_signature(&eager, &mut NullResolver)?
        );
        Ok(())
    }

    #[test]
    fn sentinel_switches_to_vararg() -> Result<()> {
        let mut helper = SignatureHelper::method_sig(false, TypeSignature::Void);
        helper.add_argument(TypeSignature::String)?;
        helper.add_sentinel()?;
        helper.add_argument(TypeSignature::I4)?;
        assert_eq!(helper.count(), 2);
        assert_eq!(
            helper.get_signature(&mut NullResolver)?,
            [0x05, 0x02, 0x01, 0x0E, 0x41, 0x08]
        );
        assert!(helper.add_sentinel().is_err());
        Ok(())
    }

    #[test]
    fn wrong_kind_is_rejected() {
        let mut helper = SignatureHelper::field_sig(TypeSignature::I4);
        assert!(matches!(
            helper.add_argument(TypeSignature::I4),
            Err(Error::InvalidState(_))
        ));
        assert!(SignatureHelper::local_var_sig()
            .add_argument(TypeSignature::I4)
            .is_err());
    }
}
