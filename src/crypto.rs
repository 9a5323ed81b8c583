use crate::algorithm::{Algorithm, CipherKind, join_identifiers};
use crate::error::{Result, SecuredPropertiesError};
use base64::{Engine, engine::general_purpose::STANDARD};
use cbc::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit, block_padding::Pkcs7};
use rand::RngCore;
use regex::Regex;
use std::fmt;
use std::sync::LazyLock;
use tracing::info;

static ENCRYPTED_VALUE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^\{([A-Za-z0-9+/]{4})*([A-Za-z0-9+/]{4}|[A-Za-z0-9+/]{3}=|[A-Za-z0-9+/]{2}==)\}$",
    )
    .expect("valid encrypted value pattern")
});

// CBC with a fixed IV keeps unsalted encryption deterministic; the salt
// prefix is what randomises the chain.
const ZERO_IV: [u8; 16] = [0; 16];

/// Raw key material for one [`Algorithm`].
#[derive(Clone, PartialEq, Eq)]
pub struct SecretKey(Vec<u8>);

impl SecretKey {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SecretKey({} bytes)", self.0.len())
    }
}

/// Probes whether `algorithm` can create a key and encrypt with it.
pub fn is_algorithm_supported(algorithm: &Algorithm) -> bool {
    let probe = generate_key(algorithm).and_then(|key| encrypt(algorithm, &key, 0, "test"));
    match probe {
        Ok(_) => true,
        Err(e) => {
            info!(algorithm = %algorithm, "Algorithm is not supported: {}", e);
            false
        }
    }
}

pub fn first_supported_algorithm(candidates: &[Algorithm]) -> Result<Algorithm> {
    candidates
        .iter()
        .find(|algorithm| is_algorithm_supported(algorithm))
        .cloned()
        .ok_or_else(|| SecuredPropertiesError::NoSupportedAlgorithm {
            candidates: join_identifiers(candidates),
        })
}

/// Generates fresh random key material sized for `algorithm`.
pub fn generate_key(algorithm: &Algorithm) -> Result<SecretKey> {
    let kind = algorithm.cipher_kind()?;
    let mut rng = rand::thread_rng();
    let bytes = match kind {
        CipherKind::DesEde2Key => {
            let mut bytes = vec![0u8; 16];
            rng.fill_bytes(&mut bytes);
            let k1 = bytes[..8].to_vec();
            bytes.extend_from_slice(&k1);
            bytes
        }
        _ => {
            let mut bytes = vec![0u8; kind.key_len()];
            rng.fill_bytes(&mut bytes);
            bytes
        }
    };
    Ok(SecretKey(bytes))
}

pub fn serialize_key(key: &SecretKey) -> String {
    STANDARD.encode(&key.0)
}

pub fn parse_key(algorithm: &Algorithm, encoded: &str) -> Result<SecretKey> {
    let kind = algorithm.cipher_kind()?;
    let bytes = STANDARD
        .decode(encoded.trim())
        .map_err(|e| SecuredPropertiesError::InvalidKey {
            algorithm: algorithm.identifier(),
            reason: format!("invalid base64: {}", e),
        })?;

    if bytes.len() != kind.key_len() {
        return Err(SecuredPropertiesError::InvalidKey {
            algorithm: algorithm.identifier(),
            reason: format!(
                "key is {} bytes, expected {}",
                bytes.len(),
                kind.key_len()
            ),
        });
    }
    Ok(SecretKey(bytes))
}

/// Checks whether `value` has the `{base64}` shape of an encrypted value.
/// No decryption is attempted.
pub fn is_encrypted_value(value: &str) -> bool {
    !value.is_empty() && ENCRYPTED_VALUE.is_match(value)
}

/// Encrypts `plaintext` into a `{base64}` token.
///
/// With `salt_length > 0` that many random bytes are prepended before the
/// cipher runs, so two encryptions of the same text differ. With
/// `salt_length == 0` the token is a pure function of key and plaintext.
pub fn encrypt(
    algorithm: &Algorithm,
    key: &SecretKey,
    salt_length: usize,
    plaintext: &str,
) -> Result<String> {
    let kind = algorithm.cipher_kind()?;

    let mut data = vec![0u8; salt_length];
    rand::thread_rng().fill_bytes(&mut data);
    data.extend_from_slice(plaintext.as_bytes());

    let ciphertext = cipher_encrypt(kind, key.as_bytes(), &data)?;
    Ok(format!("{{{}}}", STANDARD.encode(ciphertext)))
}

pub fn decrypt(
    algorithm: &Algorithm,
    key: &SecretKey,
    salt_length: usize,
    token: &str,
) -> Result<String> {
    let kind = algorithm.cipher_kind()?;

    let encoded = token
        .strip_prefix('{')
        .and_then(|rest| rest.strip_suffix('}'))
        .ok_or_else(|| {
            SecuredPropertiesError::DecryptionFailed("value is not enclosed in '{...}'".into())
        })?;
    let ciphertext = STANDARD
        .decode(encoded)
        .map_err(|e| SecuredPropertiesError::DecryptionFailed(format!("invalid base64: {}", e)))?;

    if ciphertext.is_empty() || ciphertext.len() % kind.block_size() != 0 {
        return Err(SecuredPropertiesError::DecryptionFailed(format!(
            "ciphertext length {} is not a positive multiple of the {} byte block size",
            ciphertext.len(),
            kind.block_size()
        )));
    }

    let mut data = cipher_decrypt(kind, key.as_bytes(), &ciphertext)?;
    if data.len() < salt_length {
        return Err(SecuredPropertiesError::DecryptionFailed(format!(
            "decrypted value is shorter than the {} byte salt",
            salt_length
        )));
    }
    let plaintext = data.split_off(salt_length);

    String::from_utf8(plaintext)
        .map_err(|e| SecuredPropertiesError::DecryptionFailed(format!("invalid UTF-8: {}", e)))
}

fn cipher_encrypt(kind: CipherKind, key: &[u8], data: &[u8]) -> Result<Vec<u8>> {
    let iv = &ZERO_IV[..kind.block_size()];
    let ciphertext = match kind {
        CipherKind::Aes128 => cbc::Encryptor::<aes::Aes128>::new_from_slices(key, iv)
            .map(|c| c.encrypt_padded_vec_mut::<Pkcs7>(data)),
        CipherKind::Aes192 => cbc::Encryptor::<aes::Aes192>::new_from_slices(key, iv)
            .map(|c| c.encrypt_padded_vec_mut::<Pkcs7>(data)),
        CipherKind::Aes256 => cbc::Encryptor::<aes::Aes256>::new_from_slices(key, iv)
            .map(|c| c.encrypt_padded_vec_mut::<Pkcs7>(data)),
        CipherKind::DesEde2Key | CipherKind::DesEde3Key => {
            cbc::Encryptor::<des::TdesEde3>::new_from_slices(key, iv)
                .map(|c| c.encrypt_padded_vec_mut::<Pkcs7>(data))
        }
    };
    ciphertext.map_err(|e| SecuredPropertiesError::EncryptionFailed(e.to_string()))
}

fn cipher_decrypt(kind: CipherKind, key: &[u8], data: &[u8]) -> Result<Vec<u8>> {
    let iv = &ZERO_IV[..kind.block_size()];
    let plaintext = match kind {
        CipherKind::Aes128 => cbc::Decryptor::<aes::Aes128>::new_from_slices(key, iv)
            .map(|c| c.decrypt_padded_vec_mut::<Pkcs7>(data)),
        CipherKind::Aes192 => cbc::Decryptor::<aes::Aes192>::new_from_slices(key, iv)
            .map(|c| c.decrypt_padded_vec_mut::<Pkcs7>(data)),
        CipherKind::Aes256 => cbc::Decryptor::<aes::Aes256>::new_from_slices(key, iv)
            .map(|c| c.decrypt_padded_vec_mut::<Pkcs7>(data)),
        CipherKind::DesEde2Key | CipherKind::DesEde3Key => {
            cbc::Decryptor::<des::TdesEde3>::new_from_slices(key, iv)
                .map(|c| c.decrypt_padded_vec_mut::<Pkcs7>(data))
        }
    };

    match plaintext {
        Ok(Ok(bytes)) => Ok(bytes),
        Ok(Err(_)) => Err(SecuredPropertiesError::DecryptionFailed(
            "bad padding, wrong key or algorithm".into(),
        )),
        Err(e) => Err(SecuredPropertiesError::DecryptionFailed(e.to_string())),
    }
}
