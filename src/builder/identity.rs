//! Assembly identities: the defined assembly's name and references to other assemblies.
//!
//! Public key tokens follow ECMA-335 II.6.2.1.3: the last eight bytes of the SHA-1 hash of the
//! public key, in reverse order.

use std::fmt;

use md5::Md5;
use sha1::{Digest, Sha1};

use crate::{metadata::tables::attributes::AssemblyFlags, Error, Result};

/// `AssemblyHashAlgorithm` identifiers of the `Assembly.HashAlgId` column.
#[allow(non_snake_case)]
pub mod AssemblyHashAlgorithm {
    /// No hashing
    pub const NONE: u32 = 0x0000;
    /// MD5
    pub const MD5: u32 = 0x8003;
    /// SHA-1, the default
    pub const SHA1: u32 = 0x8004;
}

/// Hash `data` with the algorithm identified by `algorithm`.
///
/// # Errors
/// Returns [`Error::NotSupported`] for algorithms other than MD5 and SHA-1.
pub fn hash_with(algorithm: u32, data: &[u8]) -> Result<Vec<u8>> {
    match algorithm {
        AssemblyHashAlgorithm::MD5 => {
            let mut hasher = Md5::new();
            hasher.update(data);
            Ok(hasher.finalize().to_vec())
        }
        AssemblyHashAlgorithm::SHA1 => {
            let mut hasher = Sha1::new();
            hasher.update(data);
            Ok(hasher.finalize().to_vec())
        }
        other => Err(Error::NotSupported(format!(
            "Hash algorithm {:#x} is not supported",
            other
        ))),
    }
}

/// The 8-byte token of `public_key`.
#[must_use]
pub fn public_key_token(public_key: &[u8]) -> [u8; 8] {
    let mut hasher = Sha1::new();
    hasher.update(public_key);
    let digest = hasher.finalize();

    let mut token = [0u8; 8];
    for (slot, byte) in token.iter_mut().zip(digest.iter().rev()) {
        *slot = *byte;
    }
    token
}

/// Four-part assembly version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct AssemblyVersion {
    /// Major version
    pub major: u16,
    /// Minor version
    pub minor: u16,
    /// Build number
    pub build: u16,
    /// Revision number
    pub revision: u16,
}

impl AssemblyVersion {
    /// Create a version from its components.
    #[must_use]
    pub fn new(major: u16, minor: u16, build: u16, revision: u16) -> Self {
        AssemblyVersion {
            major,
            minor,
            build,
            revision,
        }
    }

    /// Parse `1.2.3.4`; missing components are zero.
    ///
    /// # Errors
    /// Returns [`Error::Malformed`] for more than four components or a non-numeric one.
    pub fn parse(version: &str) -> Result<Self> {
        let parts: Vec<&str> = version.split('.').collect();
        if parts.len() > 4 {
            return Err(malformed_error!("Invalid version format: {}", version));
        }

        let mut components = [0u16; 4];
        for (slot, part) in components.iter_mut().zip(&parts) {
            *slot = part
                .parse::<u16>()
                .map_err(|_| malformed_error!("Invalid version component: {}", part))?;
        }

        Ok(AssemblyVersion::new(
            components[0],
            components[1],
            components[2],
            components[3],
        ))
    }
}

impl fmt::Display for AssemblyVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{}.{}.{}",
            self.major, self.minor, self.build, self.revision
        )
    }
}

/// Identity of the assembly being defined.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssemblyName {
    /// Simple name
    pub name: String,
    /// Version
    pub version: AssemblyVersion,
    /// Culture, `None` for culture-neutral assemblies
    pub culture: Option<String>,
    /// Full public key, empty for assemblies without a strong name
    pub public_key: Vec<u8>,
    /// `AssemblyFlags` bits other than `PublicKey`, which is derived from `public_key`
    pub flags: u32,
    /// Algorithm used for `File` hashes
    pub hash_algorithm: u32,
}

impl AssemblyName {
    /// A culture-neutral assembly without a strong name.
    pub fn new(name: impl Into<String>, version: AssemblyVersion) -> Self {
        AssemblyName {
            name: name.into(),
            version,
            culture: None,
            public_key: Vec::new(),
            flags: 0,
            hash_algorithm: AssemblyHashAlgorithm::SHA1,
        }
    }

    /// Attach a public key.
    #[must_use]
    pub fn with_public_key(mut self, public_key: Vec<u8>) -> Self {
        self.public_key = public_key;
        self
    }

    /// The flags written to the `Assembly` row.
    #[must_use]
    pub fn row_flags(&self) -> u32 {
        if self.public_key.is_empty() {
            self.flags & !AssemblyFlags::PUBLIC_KEY
        } else {
            self.flags | AssemblyFlags::PUBLIC_KEY
        }
    }

    /// A reference to this assembly, carrying the public key token.
    #[must_use]
    pub fn to_reference(&self) -> AssemblyRefInfo {
        AssemblyRefInfo {
            name: self.name.clone(),
            version: self.version,
            culture: self.culture.clone(),
            public_key_or_token: if self.public_key.is_empty() {
                Vec::new()
            } else {
                public_key_token(&self.public_key).to_vec()
            },
            flags: 0,
        }
    }

    /// `Name, Version=x.x.x.x, Culture=..., PublicKeyToken=...`
    #[must_use]
    pub fn display_name(&self) -> String {
        let token = if self.public_key.is_empty() {
            "null".to_string()
        } else {
            hex(&public_key_token(&self.public_key))
        };
        format!(
            "{}, Version={}, Culture={}, PublicKeyToken={}",
            self.name,
            self.version,
            self.culture.as_deref().unwrap_or("neutral"),
            token
        )
    }
}

/// A referenced assembly, emitted as an `AssemblyRef` row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssemblyRefInfo {
    /// Simple name
    pub name: String,
    /// Version
    pub version: AssemblyVersion,
    /// Culture, `None` for culture-neutral assemblies
    pub culture: Option<String>,
    /// Public key token (8 bytes) or full key (with `AssemblyFlags::PUBLIC_KEY`)
    pub public_key_or_token: Vec<u8>,
    /// `AssemblyFlags` bitmask
    pub flags: u32,
}

impl AssemblyRefInfo {
    /// A culture-neutral reference without a key.
    pub fn new(name: impl Into<String>, version: AssemblyVersion) -> Self {
        AssemblyRefInfo {
            name: name.into(),
            version,
            culture: None,
            public_key_or_token: Vec::new(),
            flags: 0,
        }
    }

    /// Attach a public key token.
    #[must_use]
    pub fn with_public_key_token(mut self, token: [u8; 8]) -> Self {
        self.public_key_or_token = token.to_vec();
        self.flags &= !AssemblyFlags::PUBLIC_KEY;
        self
    }

    /// `mscorlib, Version=4.0.0.0, PublicKeyToken=b77a5c561934e089`, the default core library.
    #[must_use]
    pub fn mscorlib() -> Self {
        AssemblyRefInfo::new("mscorlib", AssemblyVersion::new(4, 0, 0, 0))
            .with_public_key_token([0xB7, 0x7A, 0x5C, 0x56, 0x19, 0x34, 0xE0, 0x89])
    }
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|byte| format!("{:02x}", byte)).collect()
}
