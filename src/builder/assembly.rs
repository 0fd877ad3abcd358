//! The assembly manifest around a module.
//!
//! [`AssemblyBuilder`] owns the module being emitted and everything that only exists at
//! assembly level: the `Assembly` row with its attributes and security, embedded resources,
//! the other files of a multi-module assembly and type forwarders. Baking the assembly bakes
//! its module with these manifest rows added.

use std::path::Path;

use log::debug;

use crate::{
    builder::{
        entities::SecurityEntry,
        identity::{hash_with, AssemblyName, AssemblyRefInfo},
        Bakeable, BuilderConfig, EmittedModule, MethodTarget, ModuleBuilder,
    },
    metadata::{
        customattributes::CustomAttributeBuilder,
        tables::attributes::{FileAttributes, ManifestResourceAttributes},
    },
    Error, Result,
};

/// An embedded manifest resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ResourceEntry {
    pub name: String,
    pub flags: u32,
    pub data: Vec<u8>,
}

/// Another file of the assembly, with its hash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct FileEntry {
    pub name: String,
    pub flags: u32,
    pub hash: Vec<u8>,
}

/// A type that now lives in another assembly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ForwarderEntry {
    pub namespace: String,
    pub name: String,
    pub assembly: AssemblyRefInfo,
}

/// Assembly-level rows added to the module when it bakes.
#[derive(Debug, Clone)]
pub(crate) struct AssemblyManifest {
    pub name: AssemblyName,
    pub attributes: Vec<CustomAttributeBuilder>,
    pub security: Vec<SecurityEntry>,
    pub resources: Vec<ResourceEntry>,
    pub files: Vec<FileEntry>,
    pub forwarders: Vec<ForwarderEntry>,
}

/// Builds a single-module assembly.
///
/// # Examples
///
/// ```rust
/// use dotemit::builder::{AssemblyBuilder, AssemblyName, AssemblyVersion, BuilderConfig};
///
/// let mut assembly = AssemblyBuilder::new(
///     AssemblyName::new("Calc", AssemblyVersion::new(1, 0, 0, 0)),
///     BuilderConfig::default(),
/// );
/// assembly.define_module("Calc.dll")?;
/// assembly.add_resource("strings.resources", vec![1, 2, 3], true)?;
///
/// let emitted = assembly.bake()?;
/// assert_eq!(emitted.tables.assembly.len(), 1);
/// assert_eq!(emitted.resources, vec![3, 0, 0, 0, 1, 2, 3]);
/// # Ok::<(), dotemit::Error>(())
/// ```
#[derive(Debug, Clone)]
pub struct AssemblyBuilder {
    config: BuilderConfig,
    module: Option<ModuleBuilder>,
    manifest: AssemblyManifest,
    baked: bool,
}

impl Bakeable for AssemblyBuilder {
    fn is_baked(&self) -> bool {
        self.baked
    }

    fn describe(&self) -> String {
        format!("assembly {}", self.manifest.name.name)
    }
}

impl AssemblyBuilder {
    /// Start an assembly called `name`.
    #[must_use]
    pub fn new(name: AssemblyName, config: BuilderConfig) -> Self {
        AssemblyBuilder {
            config,
            module: None,
            manifest: AssemblyManifest {
                name,
                attributes: Vec::new(),
                security: Vec::new(),
                resources: Vec::new(),
                files: Vec::new(),
                forwarders: Vec::new(),
            },
            baked: false,
        }
    }

    /// The assembly identity.
    #[must_use]
    pub fn name(&self) -> &AssemblyName {
        &self.manifest.name
    }

    /// Create the manifest module.
    ///
    /// # Errors
    /// Returns [`Error::InvalidState`] if the module already exists.
    pub fn define_module(&mut self, name: &str) -> Result<&mut ModuleBuilder> {
        self.ensure_open()?;
        if self.module.is_some() {
            return Err(Error::InvalidState(format!(
                "{} already has a module",
                self.describe()
            )));
        }
        let module = ModuleBuilder::new(name, self.config.clone())?;
        Ok(self.module.insert(module))
    }

    /// The manifest module.
    ///
    /// # Errors
    /// Returns [`Error::InvalidState`] before [`AssemblyBuilder::define_module`].
    pub fn module_mut(&mut self) -> Result<&mut ModuleBuilder> {
        self.module
            .as_mut()
            .ok_or_else(|| Error::InvalidState("The assembly has no module".to_string()))
    }

    /// Apply `attribute` to the assembly.
    ///
    /// # Errors
    /// Returns [`Error::NotSupported`] if the constructor is not a `.ctor` or the value cannot
    /// be encoded.
    pub fn set_custom_attribute(&mut self, attribute: CustomAttributeBuilder) -> Result<()> {
        self.ensure_open()?;
        if let MethodTarget::External { name, .. } = attribute.constructor() {
            if name != ".ctor" {
                return Err(Error::NotSupported(
                    "Custom attributes must be constructed through a .ctor".to_string(),
                ));
            }
        }
        attribute.blob()?;
        self.manifest.attributes.push(attribute);
        Ok(())
    }

    /// Attach a declarative security permission set to the assembly.
    ///
    /// # Errors
    /// Returns [`Error::AlreadyBaked`] after baking.
    pub fn add_declarative_security(&mut self, action: u16, permission_set: Vec<u8>) -> Result<()> {
        self.ensure_open()?;
        self.manifest.security.push(SecurityEntry {
            action,
            permission_set,
        });
        Ok(())
    }

    /// Embed a manifest resource.
    ///
    /// # Errors
    /// Returns [`Error::InvalidState`] for a duplicate resource name.
    pub fn add_resource(&mut self, name: &str, data: Vec<u8>, public: bool) -> Result<()> {
        self.ensure_open()?;
        if self.manifest.resources.iter().any(|r| r.name == name) {
            return Err(Error::InvalidState(format!(
                "Duplicate resource {}",
                name
            )));
        }
        u32::try_from(data.len()).map_err(|_| Error::HeapFull("resources"))?;
        self.manifest.resources.push(ResourceEntry {
            name: name.to_string(),
            flags: if public {
                ManifestResourceAttributes::PUBLIC
            } else {
                ManifestResourceAttributes::PRIVATE
            },
            data,
        });
        Ok(())
    }

    /// Add another file of the assembly, hashed with the assembly's hash algorithm.
    ///
    /// # Errors
    /// Returns [`Error::NotSupported`] for an unsupported hash algorithm.
    pub fn add_file(&mut self, name: &str, contents: &[u8], contains_metadata: bool) -> Result<()> {
        self.ensure_open()?;
        let hash = hash_with(self.manifest.name.hash_algorithm, contents)?;
        self.manifest.files.push(FileEntry {
            name: name.to_string(),
            flags: if contains_metadata {
                FileAttributes::CONTAINS_METADATA
            } else {
                FileAttributes::CONTAINS_NO_METADATA
            },
            hash,
        });
        Ok(())
    }

    /// Add the file at `path`, named after its file name.
    ///
    /// # Errors
    /// Returns [`Error::FileError`] if the file cannot be read.
    pub fn add_file_from_path(&mut self, path: impl AsRef<Path>, contains_metadata: bool) -> Result<()> {
        let path = path.as_ref();
        let contents = std::fs::read(path)?;
        let name = path
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| Error::NotSupported(format!("Invalid file name {}", path.display())))?;
        self.add_file(name, &contents, contains_metadata)
    }

    /// Record that `namespace.name` moved to `assembly`.
    ///
    /// # Errors
    /// Returns [`Error::InvalidState`] if the type was already forwarded.
    pub fn add_type_forwarder(
        &mut self,
        namespace: &str,
        name: &str,
        assembly: AssemblyRefInfo,
    ) -> Result<()> {
        self.ensure_open()?;
        if self
            .manifest
            .forwarders
            .iter()
            .any(|f| f.namespace == namespace && f.name == name)
        {
            return Err(Error::InvalidState(format!(
                "{}.{} is already forwarded",
                namespace, name
            )));
        }
        self.manifest.forwarders.push(ForwarderEntry {
            namespace: namespace.to_string(),
            name: name.to_string(),
            assembly,
        });
        Ok(())
    }

    /// Bake the module together with the manifest.
    ///
    /// # Errors
    /// Returns [`Error::InvalidState`] without a module, plus any error of
    /// [`ModuleBuilder::bake`].
    pub fn bake(&mut self) -> Result<EmittedModule> {
        self.ensure_open()?;
        let module = self
            .module
            .as_mut()
            .ok_or_else(|| Error::InvalidState("The assembly has no module".to_string()))?;
        debug!("Baking {}", self.manifest.name.display_name());
        let emitted = module.bake_with_manifest(Some(&self.manifest))?;
        self.baked = true;
        Ok(emitted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{builder::AssemblyVersion, metadata::tables::attributes::TypeAttributes};

    fn assembly() -> AssemblyBuilder {
        AssemblyBuilder::new(
            AssemblyName::new("Lib", AssemblyVersion::new(2, 1, 0, 0)),
            BuilderConfig::default(),
        )
    }

    #[test]
    fn one_module_only() -> Result<()> {
        let mut assembly = assembly();
        assert!(assembly.module_mut().is_err());
        assembly.define_module("Lib.dll")?;
        assert!(matches!(
            assembly.define_module("Other.dll"),
            Err(Error::InvalidState(_))
        ));
        Ok(())
    }

    #[test]
    fn bake_needs_module() {
        assert!(matches!(assembly().bake(), Err(Error::InvalidState(_))));
    }

    #[test]
    fn manifest_rows() -> Result<()> {
        let mut assembly = assembly();
        assembly
            .define_module("Lib.dll")?
            .define_type("Lib", "Widget", TypeAttributes::PUBLIC, None)?;
        assembly.add_resource("a.txt", b"hello".to_vec(), false)?;
        assembly.add_resource("b.txt", Vec::new(), true)?;
        assert!(assembly.add_resource("a.txt", Vec::new(), true).is_err());
        assembly.add_file("Native.dll", b"MZ", false)?;
        assembly.add_type_forwarder(
            "Lib",
            "Moved",
            AssemblyRefInfo::new("Lib.Core", AssemblyVersion::new(1, 0, 0, 0)),
        )?;
        assembly.add_declarative_security(2, vec![0x2E, 0x00])?;

        let emitted = assembly.bake()?;
        let row = &emitted.tables.assembly[0];
        assert_eq!((row.major_version, row.minor_version), (2, 1));
        assert_eq!(emitted.tables.manifest_resource.len(), 2);
        assert_eq!(emitted.tables.manifest_resource[1].offset, 9);
        assert_eq!(emitted.resources, b"\x05\0\0\0hello\0\0\0\0".to_vec());
        assert_eq!(emitted.tables.file.len(), 1);
        assert_eq!(
            emitted.tables.file[0].flags,
            FileAttributes::CONTAINS_NO_METADATA
        );
        assert_eq!(emitted.tables.exported_type.len(), 1);
        assert_eq!(
            emitted.tables.exported_type[0].flags,
            TypeAttributes::FORWARDER
        );
        assert_eq!(emitted.tables.decl_security.len(), 1);
        assert!(matches!(
            assembly.add_resource("c.txt", Vec::new(), true),
            Err(Error::AlreadyBaked(_))
        ));
        Ok(())
    }

    #[test]
    fn missing_file_propagates_io_error() -> Result<()> {
        let mut assembly = assembly();
        let result = assembly.add_file_from_path("/nonexistent/dotemit/Native.dll", true);
        assert!(matches!(result, Err(Error::FileError(_))));
        Ok(())
    }
}
