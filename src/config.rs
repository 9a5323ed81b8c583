use crate::algorithm::{Algorithm, DEFAULT_ALGORITHMS};
use crate::error::{Result, SecuredPropertiesError};
use crate::properties::{Properties, load_properties};
use crate::store::default_secret_file;
use std::path::{Path, PathBuf};
use tracing::debug;

pub const DEFAULT_SALT_LENGTH: usize = 11;

/// Prefix for environment variables, e.g. `SECURED_PROPERTIES_SALT_LENGTH`.
pub const DEFAULT_PREFIX_UPPER_CASE: &str = "SECURED_PROPERTIES";
/// Prefix for file and lookup keys, e.g. `secured-properties.salt-length`.
pub const DEFAULT_PREFIX_KEBAB_CASE: &str = "secured-properties";

/// Controls where the secret key lives and how values are encrypted.
#[derive(Debug, Clone, PartialEq)]
pub struct SecuredPropertiesConfig {
    secret_file: Option<PathBuf>,
    salt_length: usize,
    allowed_algorithms: Vec<Algorithm>,
    auto_create_secret_key: bool,
    auto_encrypt_non_encrypted_values: bool,
}

impl Default for SecuredPropertiesConfig {
    fn default() -> Self {
        Self {
            secret_file: None,
            salt_length: DEFAULT_SALT_LENGTH,
            allowed_algorithms: DEFAULT_ALGORITHMS.to_vec(),
            auto_create_secret_key: true,
            auto_encrypt_non_encrypted_values: true,
        }
    }
}

impl SecuredPropertiesConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a config from the given property files (missing ones are
    /// skipped) and then the `SECURED_PROPERTIES_*` environment variables.
    /// Later sources override earlier ones.
    pub fn init<P: AsRef<Path>>(files: &[P]) -> Result<Self> {
        let mut config = Self::default();
        for file in files {
            config.apply(&PropertyFileSource::new(file.as_ref())?)?;
        }
        config.apply(&EnvSource::new())?;
        Ok(config)
    }

    /// Overrides every field `source` has a value for.
    pub fn apply(&mut self, source: &dyn ConfigSource) -> Result<()> {
        for key in ConfigKey::ALL {
            let Some(value) = source.value(key) else {
                continue;
            };
            match key {
                ConfigKey::SecretFile => self.secret_file = Some(PathBuf::from(value)),
                ConfigKey::SaltLength => {
                    self.salt_length = value.trim().parse().map_err(|e: std::num::ParseIntError| {
                        invalid_value(key, &value, e.to_string())
                    })?;
                }
                ConfigKey::AllowedAlgorithm => {
                    self.allowed_algorithms = parse_algorithms(&value)
                        .map_err(|e| invalid_value(key, &value, e.to_string()))?;
                }
                ConfigKey::AutoCreateSecretKey => self.auto_create_secret_key = parse_bool(&value),
                ConfigKey::AutoEncryptNonEncryptedValues => {
                    self.auto_encrypt_non_encrypted_values = parse_bool(&value);
                }
            }
        }
        Ok(())
    }

    /// The configured secret file, or `<home>/.secret/securedProperties.key`.
    /// Nothing is created here.
    pub fn secret_file(&self) -> PathBuf {
        match &self.secret_file {
            Some(path) => path.clone(),
            None => {
                let path = default_secret_file();
                debug!(path = %path.display(), "No secret file configured, using default location");
                path
            }
        }
    }

    pub fn salt_length(&self) -> usize {
        self.salt_length
    }

    pub fn allowed_algorithms(&self) -> &[Algorithm] {
        &self.allowed_algorithms
    }

    pub fn auto_create_secret_key(&self) -> bool {
        self.auto_create_secret_key
    }

    pub fn auto_encrypt_non_encrypted_values(&self) -> bool {
        self.auto_encrypt_non_encrypted_values
    }

    pub fn with_secret_file(mut self, secret_file: impl Into<PathBuf>) -> Self {
        self.secret_file = Some(secret_file.into());
        self
    }

    /// `0` makes encryption deterministic for a given key.
    pub fn with_salt_length(mut self, salt_length: usize) -> Self {
        self.salt_length = salt_length;
        self
    }

    pub fn with_allowed_algorithms(mut self, algorithms: impl IntoIterator<Item = Algorithm>) -> Self {
        self.allowed_algorithms = algorithms.into_iter().collect();
        self
    }

    pub fn add_allowed_algorithms(mut self, algorithms: impl IntoIterator<Item = Algorithm>) -> Self {
        self.allowed_algorithms.extend(algorithms);
        self
    }

    pub fn with_auto_create_secret_key(mut self, auto_create: bool) -> Self {
        self.auto_create_secret_key = auto_create;
        self
    }

    pub fn with_auto_encrypt_non_encrypted_values(mut self, auto_encrypt: bool) -> Self {
        self.auto_encrypt_non_encrypted_values = auto_encrypt;
        self
    }
}

fn invalid_value(key: ConfigKey, value: &str, reason: String) -> SecuredPropertiesError {
    SecuredPropertiesError::InvalidConfigValue {
        key: key.upper_case().to_string(),
        value: value.to_string(),
        reason,
    }
}

fn parse_algorithms(value: &str) -> Result<Vec<Algorithm>> {
    value
        .split([',', ' '])
        .filter(|part| !part.is_empty())
        .map(str::parse)
        .collect()
}

fn parse_bool(value: &str) -> bool {
    value.trim().eq_ignore_ascii_case("true")
}

/// The externally configurable fields of [`SecuredPropertiesConfig`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConfigKey {
    SecretFile,
    SaltLength,
    AllowedAlgorithm,
    AutoCreateSecretKey,
    AutoEncryptNonEncryptedValues,
}

impl ConfigKey {
    pub const ALL: [ConfigKey; 5] = [
        ConfigKey::SecretFile,
        ConfigKey::SaltLength,
        ConfigKey::AllowedAlgorithm,
        ConfigKey::AutoCreateSecretKey,
        ConfigKey::AutoEncryptNonEncryptedValues,
    ];

    pub fn upper_case(self) -> &'static str {
        match self {
            Self::SecretFile => "SECRET_FILE",
            Self::SaltLength => "SALT_LENGTH",
            Self::AllowedAlgorithm => "ALLOWED_ALGORITHM",
            Self::AutoCreateSecretKey => "AUTO_CREATE_SECRET_KEY",
            Self::AutoEncryptNonEncryptedValues => "AUTO_ENCRYPT_NON_ENCRYPTED_VALUES",
        }
    }

    pub fn kebab_case(self) -> &'static str {
        match self {
            Self::SecretFile => "secret-file",
            Self::SaltLength => "salt-length",
            Self::AllowedAlgorithm => "allowed-algorithm",
            Self::AutoCreateSecretKey => "auto-create-secret-key",
            Self::AutoEncryptNonEncryptedValues => "auto-encrypt-non-encrypted-values",
        }
    }
}

/// Somewhere config values can come from.
pub trait ConfigSource {
    fn value(&self, key: ConfigKey) -> Option<String>;
}

/// Reads `SECURED_PROPERTIES_<KEY>` style environment variables.
#[derive(Debug, Clone)]
pub struct EnvSource {
    prefix: String,
}

impl EnvSource {
    pub fn new() -> Self {
        Self::with_prefix(DEFAULT_PREFIX_UPPER_CASE)
    }

    /// An empty prefix reads the bare key names, e.g. `SALT_LENGTH`.
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn variable_name(&self, key: ConfigKey) -> String {
        if self.prefix.is_empty() {
            key.upper_case().to_string()
        } else {
            format!("{}_{}", self.prefix, key.upper_case())
        }
    }
}

impl Default for EnvSource {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigSource for EnvSource {
    fn value(&self, key: ConfigKey) -> Option<String> {
        std::env::var(self.variable_name(key)).ok()
    }
}

fn kebab_name(prefix: &str, key: ConfigKey) -> String {
    if prefix.is_empty() {
        key.kebab_case().to_string()
    } else {
        format!("{}.{}", prefix, key.kebab_case())
    }
}

/// Reads `secured-properties.<key>` entries from a property file. A missing
/// file provides no values.
#[derive(Debug, Clone, Default)]
pub struct PropertyFileSource {
    properties: Properties,
}

impl PropertyFileSource {
    pub fn new(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!(path = %path.display(), "Config file does not exist, skipping");
            return Ok(Self::default());
        }
        Ok(Self {
            properties: load_properties(path)?,
        })
    }
}

impl ConfigSource for PropertyFileSource {
    fn value(&self, key: ConfigKey) -> Option<String> {
        self.properties
            .get(&kebab_name(DEFAULT_PREFIX_KEBAB_CASE, key))
            .cloned()
    }
}

/// Adapts an injected `name -> value` lookup (for example the host
/// application's own settings) using `secured-properties.<key>` names.
pub struct LookupSource<F> {
    prefix: String,
    lookup: F,
}

impl<F> LookupSource<F>
where
    F: Fn(&str) -> Option<String>,
{
    pub fn new(lookup: F) -> Self {
        Self::with_prefix(DEFAULT_PREFIX_KEBAB_CASE, lookup)
    }

    pub fn with_prefix(prefix: impl Into<String>, lookup: F) -> Self {
        Self {
            prefix: prefix.into(),
            lookup,
        }
    }
}

impl<F> ConfigSource for LookupSource<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn value(&self, key: ConfigKey) -> Option<String> {
        (self.lookup)(&kebab_name(&self.prefix, key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::fs;

    #[test]
    fn test_defaults() {
        let config = SecuredPropertiesConfig::default();
        assert_eq!(config.salt_length(), 11);
        assert_eq!(config.allowed_algorithms(), &DEFAULT_ALGORITHMS[..]);
        assert!(config.auto_create_secret_key());
        assert!(config.auto_encrypt_non_encrypted_values());

        let secret_file = config.secret_file();
        assert!(secret_file.ends_with(".secret/securedProperties.key"));
    }

    #[test]
    fn test_builders() {
        let config = SecuredPropertiesConfig::new()
            .with_secret_file("test.key")
            .with_salt_length(0)
            .with_allowed_algorithms([Algorithm::AES_128])
            .add_allowed_algorithms([Algorithm::DESEDE_112])
            .with_auto_create_secret_key(false)
            .with_auto_encrypt_non_encrypted_values(false);

        assert_eq!(config.secret_file(), PathBuf::from("test.key"));
        assert_eq!(config.salt_length(), 0);
        assert_eq!(
            config.allowed_algorithms(),
            &[Algorithm::AES_128, Algorithm::DESEDE_112]
        );
        assert!(!config.auto_create_secret_key());
        assert!(!config.auto_encrypt_non_encrypted_values());
    }

    #[test]
    fn test_key_names() {
        assert_eq!(
            EnvSource::new().variable_name(ConfigKey::SecretFile),
            "SECURED_PROPERTIES_SECRET_FILE"
        );
        assert_eq!(
            EnvSource::with_prefix("").variable_name(ConfigKey::SaltLength),
            "SALT_LENGTH"
        );
        assert_eq!(
            kebab_name(DEFAULT_PREFIX_KEBAB_CASE, ConfigKey::AutoEncryptNonEncryptedValues),
            "secured-properties.auto-encrypt-non-encrypted-values"
        );
    }

    #[test]
    fn test_env_source_missing_variable() {
        let source = EnvSource::with_prefix("SECURED_PROPERTIES_UNIT_TEST_NOT_SET");
        assert_eq!(source.value(ConfigKey::AutoCreateSecretKey), None);
    }

    #[test]
    fn test_lookup_source() {
        let values: HashMap<&str, &str> = HashMap::from([
            ("secured-properties.secret-file", "lookup.key"),
            ("secured-properties.salt-length", "0"),
            ("secured-properties.allowed-algorithm", "AES_128, DESede_168"),
            ("secured-properties.auto-create-secret-key", "FALSE"),
            ("secured-properties.auto-encrypt-non-encrypted-values", "True"),
        ]);
        let source = LookupSource::new(|name: &str| values.get(name).map(|v| v.to_string()));

        let mut config = SecuredPropertiesConfig::new().with_auto_encrypt_non_encrypted_values(false);
        config.apply(&source).unwrap();

        assert_eq!(config.secret_file(), PathBuf::from("lookup.key"));
        assert_eq!(config.salt_length(), 0);
        assert_eq!(
            config.allowed_algorithms(),
            &[Algorithm::AES_128, Algorithm::DESEDE_168]
        );
        assert!(!config.auto_create_secret_key());
        assert!(config.auto_encrypt_non_encrypted_values());
    }

    #[test]
    fn test_unset_values_are_kept() {
        let source = LookupSource::new(|_: &str| None);
        let mut config = SecuredPropertiesConfig::new().with_salt_length(3);
        config.apply(&source).unwrap();
        assert_eq!(config, SecuredPropertiesConfig::new().with_salt_length(3));
    }

    #[test]
    fn test_invalid_salt_length() {
        let source = LookupSource::new(|name: &str| {
            (name == "secured-properties.salt-length").then(|| "-1".to_string())
        });
        let err = SecuredPropertiesConfig::new().apply(&source).unwrap_err();
        assert!(matches!(
            err,
            SecuredPropertiesError::InvalidConfigValue { ref key, .. } if key == "SALT_LENGTH"
        ));
    }

    #[test]
    fn test_invalid_algorithm_list() {
        let source = LookupSource::new(|name: &str| {
            (name == "secured-properties.allowed-algorithm").then(|| "AES_256,AES".to_string())
        });
        let err = SecuredPropertiesConfig::new().apply(&source).unwrap_err();
        assert!(matches!(err, SecuredPropertiesError::InvalidConfigValue { .. }));
    }

    #[test]
    fn test_property_file_source() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.properties");
        fs::write(
            &path,
            "secured-properties.secret-file=Test-value-for-Property-File\nother=1\n",
        )
        .unwrap();

        let source = PropertyFileSource::new(&path).unwrap();
        assert_eq!(
            source.value(ConfigKey::SecretFile).as_deref(),
            Some("Test-value-for-Property-File")
        );
        assert_eq!(source.value(ConfigKey::AutoEncryptNonEncryptedValues), None);
    }

    #[test]
    fn test_property_file_source_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let source = PropertyFileSource::new(&dir.path().join("doesnt-exist.properties")).unwrap();
        assert_eq!(source.value(ConfigKey::SecretFile), None);
    }

    #[test]
    fn test_init_later_files_win() {
        let dir = tempfile::tempdir().unwrap();
        let first = dir.path().join("first.properties");
        let second = dir.path().join("second.properties");
        fs::write(&first, "secured-properties.salt-length=5\nsecured-properties.secret-file=first.key\n").unwrap();
        fs::write(&second, "secured-properties.salt-length=7\n").unwrap();

        let config =
            SecuredPropertiesConfig::init(&[first, dir.path().join("missing.properties"), second]).unwrap();
        assert_eq!(config.salt_length(), 7);
        assert_eq!(config.secret_file(), PathBuf::from("first.key"));
    }
}
