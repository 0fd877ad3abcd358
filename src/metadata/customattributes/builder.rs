use crate::{
    builder::MethodTarget,
    metadata::customattributes::{
        encode_custom_attribute_value, CustomAttributeArgument, CustomAttributeNamedArgument,
        CustomAttributeType, CustomAttributeValue,
    },
    Result,
};

/// A custom attribute ready to be applied to a metadata entity.
///
/// Built from a constructor, its parameter types and the fixed arguments, plus any number of
/// named field and property arguments. A pre-encoded blob can be supplied instead with
/// [`CustomAttributeBuilder::from_blob`]; such attributes are never treated as
/// pseudo-attributes.
///
/// # Examples
///
/// ```rust
/// use dotemit::builder::MethodTarget;
/// use dotemit::metadata::customattributes::{
///     CustomAttributeArgument, CustomAttributeBuilder, CustomAttributeType,
/// };
/// use dotemit::metadata::signatures::{SignatureMethod, TypeName, TypeSignature};
///
/// let ctor = MethodTarget::external(
///     TypeName::core("System", "ObsoleteAttribute"),
///     ".ctor",
///     SignatureMethod::instance(TypeSignature::Void, vec![TypeSignature::String]),
/// );
/// let attribute = CustomAttributeBuilder::new(
///     ctor,
///     vec![CustomAttributeType::String],
///     vec![CustomAttributeArgument::string("use Add2")],
/// )?
/// .named_property("DiagnosticId", CustomAttributeArgument::string("X001"))?;
///
/// assert_eq!(&attribute.blob()?[..3], &[0x01, 0x00, 0x08]);
/// # Ok::<(), dotemit::Error>(())
/// ```
#[derive(Debug, Clone)]
pub struct CustomAttributeBuilder {
    constructor: MethodTarget,
    ctor_params: Vec<CustomAttributeType>,
    value: CustomAttributeValue,
    raw: Option<Vec<u8>>,
}

impl CustomAttributeBuilder {
    /// Create an attribute invoking `constructor` with `fixed_args`.
    ///
    /// # Errors
    /// Returns an error if the arguments do not match `ctor_params`.
    pub fn new(
        constructor: impl Into<MethodTarget>,
        ctor_params: Vec<CustomAttributeType>,
        fixed_args: Vec<CustomAttributeArgument>,
    ) -> Result<Self> {
        let builder = CustomAttributeBuilder {
            constructor: constructor.into(),
            ctor_params,
            value: CustomAttributeValue {
                fixed_args,
                named_args: Vec::new(),
            },
            raw: None,
        };
        builder.blob()?;
        Ok(builder)
    }

    /// Wrap an already encoded blob.
    pub fn from_blob(constructor: impl Into<MethodTarget>, blob: Vec<u8>) -> Self {
        CustomAttributeBuilder {
            constructor: constructor.into(),
            ctor_params: Vec::new(),
            value: CustomAttributeValue::default(),
            raw: Some(blob),
        }
    }

    /// Add a named field argument.
    ///
    /// # Errors
    /// Returns an error if the value's type cannot be serialized.
    pub fn named_field(
        self,
        name: impl Into<String>,
        value: CustomAttributeArgument,
    ) -> Result<Self> {
        self.named(true, name.into(), value)
    }

    /// Add a named property argument.
    ///
    /// # Errors
    /// Returns an error if the value's type cannot be serialized.
    pub fn named_property(
        self,
        name: impl Into<String>,
        value: CustomAttributeArgument,
    ) -> Result<Self> {
        self.named(false, name.into(), value)
    }

    fn named(mut self, is_field: bool, name: String, value: CustomAttributeArgument) -> Result<Self> {
        let arg_type = value.attribute_type()?;
        self.value.named_args.push(CustomAttributeNamedArgument {
            is_field,
            name,
            arg_type,
            value,
        });
        Ok(self)
    }

    /// The attribute constructor.
    #[must_use]
    pub fn constructor(&self) -> &MethodTarget {
        &self.constructor
    }

    /// The structured value, `None` for attributes built from a raw blob.
    #[must_use]
    pub fn value(&self) -> Option<&CustomAttributeValue> {
        if self.raw.is_some() {
            None
        } else {
            Some(&self.value)
        }
    }

    /// Constructor parameter types.
    #[must_use]
    pub fn ctor_params(&self) -> &[CustomAttributeType] {
        &self.ctor_params
    }

    /// The encoded attribute blob.
    ///
    /// # Errors
    /// Returns an error if an argument cannot be encoded.
    pub fn blob(&self) -> Result<Vec<u8>> {
        match &self.raw {
            Some(raw) => Ok(raw.clone()),
            None => encode_custom_attribute_value(&self.value, &self.ctor_params),
        }
    }
}
