//! Locating, creating and reading the secret key file.
//!
//! The file holds exactly two lines: the algorithm identifier
//! (`AES_256`) and the base64 encoded key bytes.

use crate::algorithm::{Algorithm, join_identifiers};
use crate::crypto::{self, SecretKey};
use crate::error::{Result, SecuredPropertiesError};
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// The resolved `(algorithm, key)` pair used for one encrypt/decrypt batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecretContainer {
    algorithm: Algorithm,
    key: SecretKey,
}

impl SecretContainer {
    pub fn new(algorithm: Algorithm, key: SecretKey) -> Self {
        Self { algorithm, key }
    }

    pub fn algorithm(&self) -> &Algorithm {
        &self.algorithm
    }

    pub fn key(&self) -> &SecretKey {
        &self.key
    }

    pub fn encrypt(&self, salt_length: usize, plaintext: &str) -> Result<String> {
        crypto::encrypt(&self.algorithm, &self.key, salt_length, plaintext)
    }

    pub fn decrypt(&self, salt_length: usize, token: &str) -> Result<String> {
        crypto::decrypt(&self.algorithm, &self.key, salt_length, token)
    }
}

/// Reads the secret file at `path`, or creates it when it is absent and
/// `auto_create` is set.
///
/// Creation picks the first entry of `allowed_algorithms` that works in this
/// build. Reading an existing file never changes it, so repeated calls
/// return identical key material.
///
/// Two processes creating the same missing file at once is not fully
/// serialized: the loser of the `create_new` race reads the winner's key,
/// but callers needing stronger guarantees must lock externally.
pub fn resolve_container(
    path: &Path,
    auto_create: bool,
    allowed_algorithms: &[Algorithm],
) -> Result<SecretContainer> {
    if path.exists() {
        debug!(path = %path.display(), "Reading secret file");
        read(path, allowed_algorithms)
    } else if auto_create {
        let algorithm = crypto::first_supported_algorithm(allowed_algorithms)?;
        let key = crypto::generate_key(&algorithm)?;
        let container = SecretContainer::new(algorithm, key);
        match write(&container, path) {
            Ok(()) => {
                info!(path = %path.display(), algorithm = %container.algorithm, "Created new secret file");
                Ok(container)
            }
            Err(WriteError::AlreadyExists) => {
                debug!(path = %path.display(), "Secret file was created concurrently, reading it");
                read(path, allowed_algorithms)
            }
            Err(WriteError::Io(reason)) => Err(SecuredPropertiesError::SecretFileUnwritable {
                path: absolute_display(path),
                reason,
            }),
        }
    } else {
        Err(SecuredPropertiesError::SecretFileMissing {
            path: absolute_display(path),
        })
    }
}

/// `<home>/.secret/securedProperties.key`, or a relative `.secret` directory
/// when no home directory is known.
pub fn default_secret_file() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_default()
        .join(".secret")
        .join("securedProperties.key")
}

fn read(path: &Path, allowed_algorithms: &[Algorithm]) -> Result<SecretContainer> {
    let malformed = |reason: String| SecuredPropertiesError::MalformedSecretFile {
        path: absolute_display(path),
        reason,
    };

    let content = fs::read_to_string(path).map_err(|e| malformed(e.to_string()))?;
    let mut lines = content.lines();
    let (Some(algorithm_line), Some(key_line)) = (lines.next(), lines.next()) else {
        return Err(malformed("secret file must have at least two lines".into()));
    };

    let algorithm = allowed_algorithms
        .iter()
        .find(|alg| alg.identifier() == algorithm_line)
        .cloned()
        .ok_or_else(|| SecuredPropertiesError::AlgorithmNotAllowed {
            found: algorithm_line.to_string(),
            allowed: join_identifiers(allowed_algorithms),
        })?;

    let key = crypto::parse_key(&algorithm, key_line).map_err(|e| malformed(e.to_string()))?;
    Ok(SecretContainer::new(algorithm, key))
}

enum WriteError {
    AlreadyExists,
    Io(String),
}

fn write(container: &SecretContainer, path: &Path) -> std::result::Result<(), WriteError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| WriteError::Io(e.to_string()))?;
    }

    let mut file = match fs::OpenOptions::new().write(true).create_new(true).open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == ErrorKind::AlreadyExists => return Err(WriteError::AlreadyExists),
        Err(e) => return Err(WriteError::Io(e.to_string())),
    };

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        file.set_permissions(fs::Permissions::from_mode(0o600))
            .map_err(|e| WriteError::Io(e.to_string()))?;
    }

    let content = format!(
        "{}\n{}\n",
        container.algorithm.identifier(),
        crypto::serialize_key(&container.key)
    );
    file.write_all(content.as_bytes())
        .and_then(|()| file.sync_all())
        .map_err(|e| WriteError::Io(e.to_string()))
}

fn absolute_display(path: &Path) -> String {
    std::path::absolute(path)
        .unwrap_or_else(|_| path.to_path_buf())
        .display()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algorithm::DEFAULT_ALGORITHMS;

    #[test]
    fn test_auto_create_writes_two_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("dir").join("test.key");

        let container = resolve_container(&path, true, &DEFAULT_ALGORITHMS).unwrap();
        assert_eq!(container.algorithm(), &Algorithm::AES_256);

        let content = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], "AES_256");
        assert_eq!(lines[1], crypto::serialize_key(container.key()));
    }

    #[cfg(unix)]
    #[test]
    fn test_created_file_is_private() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.key");
        resolve_container(&path, true, &DEFAULT_ALGORITHMS).unwrap();

        let mode = fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn test_resolution_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.key");

        let first = resolve_container(&path, true, &DEFAULT_ALGORITHMS).unwrap();
        let second = resolve_container(&path, true, &DEFAULT_ALGORITHMS).unwrap();
        let third = resolve_container(&path, false, &DEFAULT_ALGORITHMS).unwrap();
        assert_eq!(first.key().as_bytes(), second.key().as_bytes());
        assert_eq!(first, third);
    }

    #[test]
    fn test_auto_create_skips_unsupported_algorithms() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.key");
        let allowed = [Algorithm::new("AES", 1000), Algorithm::DESEDE_112];

        let container = resolve_container(&path, true, &allowed).unwrap();
        assert_eq!(container.algorithm(), &Algorithm::DESEDE_112);
    }

    #[test]
    fn test_auto_create_without_supported_algorithm() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.key");
        let allowed = [Algorithm::new("test", 1)];

        let err = resolve_container(&path, true, &allowed).unwrap_err();
        assert_eq!(
            err,
            SecuredPropertiesError::NoSupportedAlgorithm {
                candidates: "test_1".into()
            }
        );
        assert!(!path.exists());
    }

    #[test]
    fn test_missing_file_without_auto_create() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.key");

        let err = resolve_container(&path, false, &DEFAULT_ALGORITHMS).unwrap_err();
        match &err {
            SecuredPropertiesError::SecretFileMissing { path: reported } => {
                assert!(reported.ends_with("test.key"));
                assert!(Path::new(reported).is_absolute());
            }
            other => panic!("unexpected error: {}", other),
        }
        assert!(err.to_string().contains("doesn't exist, and auto create is off"));
        assert!(!path.exists());
        assert!(!dir.path().join(".secret").exists());
    }

    #[test]
    fn test_algorithm_not_allowed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.key");
        resolve_container(&path, true, &[Algorithm::AES_128]).unwrap();

        let err = resolve_container(&path, true, &[Algorithm::AES_256, Algorithm::DESEDE_168])
            .unwrap_err();
        assert_eq!(
            err,
            SecuredPropertiesError::AlgorithmNotAllowed {
                found: "AES_128".into(),
                allowed: "AES_256, DESede_168".into()
            }
        );
    }

    #[test]
    fn test_single_line_file_is_malformed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.key");
        fs::write(&path, "AES_128\n").unwrap();

        let err = resolve_container(&path, true, &DEFAULT_ALGORITHMS).unwrap_err();
        assert!(matches!(err, SecuredPropertiesError::MalformedSecretFile { .. }));
        // an existing file is never replaced
        assert_eq!(fs::read_to_string(&path).unwrap(), "AES_128\n");
    }

    #[test]
    fn test_key_not_matching_algorithm_is_malformed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.key");
        let key = crypto::generate_key(&Algorithm::AES_128).unwrap();
        fs::write(&path, format!("AES_256\n{}\n", crypto::serialize_key(&key))).unwrap();

        let err = resolve_container(&path, false, &DEFAULT_ALGORITHMS).unwrap_err();
        assert!(matches!(err, SecuredPropertiesError::MalformedSecretFile { .. }));
    }

    #[test]
    fn test_reads_crlf_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.key");
        let key = crypto::generate_key(&Algorithm::DESEDE_168).unwrap();
        fs::write(&path, format!("DESede_168\r\n{}\r\n", crypto::serialize_key(&key))).unwrap();

        let container = resolve_container(&path, false, &DEFAULT_ALGORITHMS).unwrap();
        assert_eq!(container.key(), &key);
    }

    #[test]
    fn test_container_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.key");
        let container = resolve_container(&path, true, &DEFAULT_ALGORITHMS).unwrap();

        let token = container.encrypt(11, "test").unwrap();
        assert_eq!(container.decrypt(11, &token).unwrap(), "test");
    }

    #[test]
    fn test_default_secret_file() {
        let path = default_secret_file();
        assert_eq!(path.file_name().unwrap(), "securedProperties.key");
        assert_eq!(path.parent().unwrap().file_name().unwrap(), ".secret");
    }
}
