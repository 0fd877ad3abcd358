//! Builder configuration
//!
//! This module provides the options that control policy decisions taken while staging and baking
//! a module: constructor synthesis, method header selection, implicit exception block
//! instructions and how strictly evaluation stack heights are checked.

/// Configuration for assembly and module builders
///
/// The options never change the binary format; they select between equally valid encodings or
/// switch convenience behavior on and off.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(clippy::struct_excessive_bools)]
pub struct BuilderConfig {
    /// Add a public parameterless constructor to classes that declare no instance constructor
    pub synthesize_default_constructors: bool,

    /// Set the `InitLocals` flag on fat method headers
    pub init_locals: bool,

    /// Always emit the 12-byte fat method header, even where the tiny header would do
    pub force_fat_headers: bool,

    /// Emit `leave`, `endfilter` and `endfinally` automatically when exception blocks are
    /// switched or closed
    pub implicit_leave: bool,

    /// Use this value as `max_stack` for every method instead of the tracked maximum
    pub max_stack_override: Option<u16>,

    /// Reject conflicting stack heights at a label; when disabled the conflict is logged and the
    /// larger height is used
    pub strict_stack_tracking: bool,
}

impl Default for BuilderConfig {
    fn default() -> Self {
        Self {
            synthesize_default_constructors: true,
            init_locals: true,
            force_fat_headers: false,
            implicit_leave: true,
            max_stack_override: None,
            strict_stack_tracking: true,
        }
    }
}

impl BuilderConfig {
    /// Creates the configuration used when nothing else is requested
    ///
    /// Equivalent to [`BuilderConfig::default`].
    #[must_use]
    pub fn strict() -> Self {
        Self::default()
    }

    /// Creates a lenient configuration for replaying IL produced by other tools
    ///
    /// Stack height conflicts are reconciled instead of rejected, and no implicit instructions
    /// or constructors are added to what the caller emits.
    #[must_use]
    pub fn compat() -> Self {
        Self {
            synthesize_default_constructors: false,
            init_locals: true,
            force_fat_headers: false,
            implicit_leave: false,
            max_stack_override: None,
            strict_stack_tracking: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_config_presets() {
        let strict = BuilderConfig::strict();
        assert!(strict.synthesize_default_constructors);
        assert!(strict.init_locals);
        assert!(!strict.force_fat_headers);
        assert!(strict.implicit_leave);
        assert!(strict.strict_stack_tracking);
        assert_eq!(strict.max_stack_override, None);

        let compat = BuilderConfig::compat();
        assert!(!compat.synthesize_default_constructors);
        assert!(!compat.implicit_leave);
        assert!(!compat.strict_stack_tracking);
    }

    #[test]
    fn test_default_config() {
        assert_eq!(BuilderConfig::default(), BuilderConfig::strict());
    }
}
