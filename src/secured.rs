//! Reading secret values out of property files.
//!
//! A plain-text value found in a property file is returned as is and, when
//! auto-encrypt is on, replaced on disk by its encrypted form. Encrypted
//! values are decrypted with the key from the configured secret file.
//!
//! ```no_run
//! use secured_properties::{SecuredPropertiesConfig, get_secret_value};
//! use std::path::Path;
//!
//! let config = SecuredPropertiesConfig::new().with_secret_file("/etc/myapp/secret.key");
//! // myConfiguration.properties: mySecretPassword = test
//! let value = get_secret_value(&config, Path::new("myConfiguration.properties"), "mySecretPassword")?;
//! assert_eq!(value.as_deref(), Some("test"));
//! // the file now reads: mySecretPassword = {wVtvW8lQrwCf8MA9sadwww==}
//! # Ok::<(), secured_properties::SecuredPropertiesError>(())
//! ```

use crate::config::SecuredPropertiesConfig;
use crate::crypto;
use crate::error::Result;
use crate::properties::load_properties;
use crate::rewrite;
use crate::store::{self, SecretContainer};
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, info, warn};

/// Requested keys mapped to their plain-text value, `None` when no source
/// had a non-empty value.
pub type SecretValues = HashMap<String, Option<String>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Rewrite {
    WhenConfigured,
    Always,
}

pub fn get_secret_value(
    config: &SecuredPropertiesConfig,
    property_file: &Path,
    key: &str,
) -> Result<Option<String>> {
    let mut values = get_secret_values(config, &[property_file], &[key])?;
    Ok(values.remove(key).flatten())
}

/// Resolves `keys` from every existing file in `property_files`.
///
/// Files that do not exist are skipped. Each existing file's resolution of a
/// key overrides the one from an earlier file, so a key absent from the last
/// existing file resolves to `None`. Plain-text values are collected
/// per file and written back encrypted in a single rewrite of that file.
pub fn get_secret_values<P, K>(
    config: &SecuredPropertiesConfig,
    property_files: &[P],
    keys: &[K],
) -> Result<SecretValues>
where
    P: AsRef<Path>,
    K: AsRef<str>,
{
    let mut container = None;
    scan_files(config, property_files, keys, Rewrite::WhenConfigured, &mut container)
}

/// Like [`get_secret_values`], but keys no property file resolves are
/// looked up through `fallback` (for example the host's own settings).
///
/// An encrypted fallback value is decrypted. A plain-text one is returned
/// unchanged and its encrypted form is logged so it can be pasted into the
/// source it came from; nothing is rewritten.
pub fn get_secret_values_with_fallback<P, K, F>(
    config: &SecuredPropertiesConfig,
    property_files: &[P],
    keys: &[K],
    fallback: F,
) -> Result<SecretValues>
where
    P: AsRef<Path>,
    K: AsRef<str>,
    F: Fn(&str) -> Option<String>,
{
    let mut container = None;
    let mut values = scan_files(config, property_files, keys, Rewrite::WhenConfigured, &mut container)?;

    for key in keys {
        let key = key.as_ref();
        if matches!(values.get(key), Some(Some(_))) {
            continue;
        }
        let Some(external) = fallback(key).filter(|value| !value.is_empty()) else {
            values.insert(key.to_string(), None);
            continue;
        };

        let secret = match container.as_ref() {
            Some(secret) => secret,
            None => &*container.insert(resolve_container(config)?),
        };
        if crypto::is_encrypted_value(&external) {
            let plaintext = secret.decrypt(config.salt_length(), &external)?;
            values.insert(key.to_string(), Some(plaintext));
        } else {
            let encrypted = secret.encrypt(config.salt_length(), &external)?;
            info!("You could now use the following encrypted value: {}={}", key, encrypted);
            values.insert(key.to_string(), Some(external));
        }
    }
    Ok(values)
}

/// Encrypts every plain-text value of `keys` in the existing files,
/// regardless of the auto-encrypt setting.
pub fn encrypt_non_encrypted_values<P, K>(
    config: &SecuredPropertiesConfig,
    property_files: &[P],
    keys: &[K],
) -> Result<()>
where
    P: AsRef<Path>,
    K: AsRef<str>,
{
    let mut container = None;
    scan_files(config, property_files, keys, Rewrite::Always, &mut container).map(|_| ())
}

/// Encrypts a single value, creating the secret file if allowed.
pub fn encrypt(config: &SecuredPropertiesConfig, plaintext: &str) -> Result<String> {
    resolve_container(config)?.encrypt(config.salt_length(), plaintext)
}

pub fn decrypt(config: &SecuredPropertiesConfig, encrypted: &str) -> Result<String> {
    resolve_container(config)?.decrypt(config.salt_length(), encrypted)
}

pub fn resolve_container(config: &SecuredPropertiesConfig) -> Result<SecretContainer> {
    store::resolve_container(
        &config.secret_file(),
        config.auto_create_secret_key(),
        config.allowed_algorithms(),
    )
}

fn scan_files<P, K>(
    config: &SecuredPropertiesConfig,
    property_files: &[P],
    keys: &[K],
    rewrite: Rewrite,
    container: &mut Option<SecretContainer>,
) -> Result<SecretValues>
where
    P: AsRef<Path>,
    K: AsRef<str>,
{
    let mut values = SecretValues::new();

    for property_file in property_files {
        let property_file = property_file.as_ref();
        if !property_file.exists() {
            debug!(path = %property_file.display(), "Property file does not exist, skipping");
            continue;
        }

        let properties = load_properties(property_file)?;
        let secret = match container.as_ref() {
            Some(secret) => secret,
            None => &*container.insert(resolve_container(config)?),
        };

        let mut plaintext_values: Vec<(String, String)> = Vec::new();
        for key in keys {
            let key = key.as_ref();
            match properties.get(key).map(String::as_str) {
                Some(value) if crypto::is_encrypted_value(value) => {
                    let plaintext = secret.decrypt(config.salt_length(), value)?;
                    values.insert(key.to_string(), Some(plaintext));
                }
                Some(value) if !value.is_empty() => {
                    if !plaintext_values.iter().any(|(staged, _)| staged == key) {
                        plaintext_values.push((key.to_string(), value.to_string()));
                    }
                    values.insert(key.to_string(), Some(value.to_string()));
                }
                _ => {
                    values.insert(key.to_string(), None);
                }
            }
        }

        if plaintext_values.is_empty() {
            continue;
        }
        if rewrite == Rewrite::Always || config.auto_encrypt_non_encrypted_values() {
            encrypt_in_place(config, secret, property_file, &plaintext_values)?;
        } else {
            warn!(
                path = %property_file.display(),
                "AutoEncryptNonEncryptedValues is off. Secret values in property file will remain plain-text."
            );
        }
    }

    Ok(values)
}

fn encrypt_in_place(
    config: &SecuredPropertiesConfig,
    secret: &SecretContainer,
    property_file: &Path,
    plaintext_values: &[(String, String)],
) -> Result<()> {
    let encrypted_values = plaintext_values
        .iter()
        .map(|(key, value)| {
            secret
                .encrypt(config.salt_length(), value)
                .map(|encrypted| (key.as_str(), encrypted))
        })
        .collect::<Result<Vec<_>>>()?;

    let replaced = rewrite::replace_values(property_file, &encrypted_values)?;
    if replaced < encrypted_values.len() {
        warn!(
            path = %property_file.display(),
            expected = encrypted_values.len(),
            replaced,
            "Some plain-text values are not written as 'key=value' and were left unencrypted"
        );
    } else {
        info!(path = %property_file.display(), replaced, "Encrypted plain-text values in property file");
    }
    Ok(())
}
