use thiserror::Error;

pub type Result<T> = std::result::Result<T, SecuredPropertiesError>;

#[derive(Debug, PartialEq, Error)]
pub enum SecuredPropertiesError {
    #[error("No supported algorithm found in: [{candidates}]")]
    NoSupportedAlgorithm { candidates: String },

    #[error("Unable to parse algorithm '{found}'. Allowed algorithms are: [{allowed}]")]
    AlgorithmNotAllowed { found: String, allowed: String },

    #[error("Algorithm {algorithm} is not supported: {reason}")]
    UnsupportedAlgorithm { algorithm: String, reason: String },

    #[error("The secret key could not be read from file '{path}': {reason}")]
    MalformedSecretFile { path: String, reason: String },

    #[error("Secret file '{path}' doesn't exist, and auto create is off.")]
    SecretFileMissing { path: String },

    #[error("The secret key could not be written to file '{path}': {reason}")]
    SecretFileUnwritable { path: String, reason: String },

    #[error("Invalid key for {algorithm}: {reason}")]
    InvalidKey { algorithm: String, reason: String },

    #[error("Encryption failed: {0}")]
    EncryptionFailed(String),

    #[error("Decryption failed: {0}")]
    DecryptionFailed(String),

    #[error("Property file '{path}' could not be read: {reason}")]
    PropertyFileUnreadable { path: String, reason: String },

    #[error("Property file '{path}' could not be written: {reason}")]
    PropertyFileUnwritable { path: String, reason: String },

    #[error("Invalid value '{value}' for config key {key}: {reason}")]
    InvalidConfigValue {
        key: String,
        value: String,
        reason: String,
    },
}
