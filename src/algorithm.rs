//! Symmetric algorithms a secret key can be created for.
//!
//! An [`Algorithm`] is a plain `(name, key size)` value. Any pair can be
//! expressed, but only the pairs listed in [`DEFAULT_ALGORITHMS`] map to a
//! cipher; everything else is rejected by the codec's capability probe.

use crate::error::{Result, SecuredPropertiesError};
use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Algorithm {
    name: Cow<'static, str>,
    key_size_bits: u32,
}

impl Algorithm {
    pub const AES_256: Algorithm = Algorithm::from_static("AES", 256);
    pub const AES_192: Algorithm = Algorithm::from_static("AES", 192);
    pub const AES_128: Algorithm = Algorithm::from_static("AES", 128);
    pub const DESEDE_168: Algorithm = Algorithm::from_static("DESede", 168);
    pub const DESEDE_112: Algorithm = Algorithm::from_static("DESede", 112);

    const fn from_static(name: &'static str, key_size_bits: u32) -> Self {
        Self {
            name: Cow::Borrowed(name),
            key_size_bits,
        }
    }

    pub fn new(name: impl Into<String>, key_size_bits: u32) -> Self {
        Self {
            name: Cow::Owned(name.into()),
            key_size_bits,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn key_size_bits(&self) -> u32 {
        self.key_size_bits
    }

    /// The `name_size` form written to secret files, e.g. `AES_256`.
    pub fn identifier(&self) -> String {
        self.to_string()
    }

    pub(crate) fn cipher_kind(&self) -> Result<CipherKind> {
        match (self.name(), self.key_size_bits) {
            ("AES", 128) => Ok(CipherKind::Aes128),
            ("AES", 192) => Ok(CipherKind::Aes192),
            ("AES", 256) => Ok(CipherKind::Aes256),
            ("DESede", 112) => Ok(CipherKind::DesEde2Key),
            ("DESede", 168) => Ok(CipherKind::DesEde3Key),
            ("AES", size) => Err(self.unsupported(format!(
                "wrong key size {}: must be equal to 128, 192 or 256",
                size
            ))),
            ("DESede", size) => Err(self.unsupported(format!(
                "wrong key size {}: must be equal to 112 or 168",
                size
            ))),
            (name, _) => Err(self.unsupported(format!("unknown cipher '{}'", name))),
        }
    }

    fn unsupported(&self, reason: String) -> SecuredPropertiesError {
        SecuredPropertiesError::UnsupportedAlgorithm {
            algorithm: self.identifier(),
            reason,
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.name, self.key_size_bits)
    }
}

impl FromStr for Algorithm {
    type Err = SecuredPropertiesError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || SecuredPropertiesError::UnsupportedAlgorithm {
            algorithm: s.to_string(),
            reason: "expected <name>_<key size in bits>".to_string(),
        };
        let (name, size) = s.trim().rsplit_once('_').ok_or_else(invalid)?;
        if name.is_empty() {
            return Err(invalid());
        }
        let size = size.parse::<u32>().map_err(|_| invalid())?;

        Ok(DEFAULT_ALGORITHMS
            .iter()
            .find(|alg| alg.name() == name && alg.key_size_bits() == size)
            .cloned()
            .unwrap_or_else(|| Algorithm::new(name, size)))
    }
}

/// Strongest first.
pub const DEFAULT_ALGORITHMS: [Algorithm; 5] = [
    Algorithm::AES_256,
    Algorithm::AES_192,
    Algorithm::AES_128,
    Algorithm::DESEDE_168,
    Algorithm::DESEDE_112,
];

pub(crate) fn join_identifiers(algorithms: &[Algorithm]) -> String {
    algorithms
        .iter()
        .map(Algorithm::identifier)
        .collect::<Vec<_>>()
        .join(", ")
}

/// The concrete ciphers behind the supported algorithms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CipherKind {
    Aes128,
    Aes192,
    Aes256,
    /// Two-key Triple-DES, stored as a 24 byte EDE3 key with K3 = K1.
    DesEde2Key,
    DesEde3Key,
}

impl CipherKind {
    /// Length of the key bytes as serialized in the secret file.
    pub(crate) fn key_len(self) -> usize {
        match self {
            Self::Aes128 => 16,
            Self::Aes192 => 24,
            Self::Aes256 => 32,
            Self::DesEde2Key | Self::DesEde3Key => 24,
        }
    }

    pub(crate) fn block_size(self) -> usize {
        match self {
            Self::Aes128 | Self::Aes192 | Self::Aes256 => 16,
            Self::DesEde2Key | Self::DesEde3Key => 8,
        }
    }
}
