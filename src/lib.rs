pub mod algorithm;
pub mod config;
pub mod crypto;
pub mod error;
pub mod properties;
pub mod rewrite;
pub mod secured;
pub mod store;

pub use algorithm::{Algorithm, DEFAULT_ALGORITHMS};
pub use config::{
    ConfigKey, ConfigSource, EnvSource, LookupSource, PropertyFileSource, SecuredPropertiesConfig,
};
pub use crypto::{SecretKey, is_encrypted_value};
pub use error::{Result, SecuredPropertiesError};
pub use rewrite::{replace_value, replace_values};
pub use secured::{
    SecretValues, decrypt, encrypt, encrypt_non_encrypted_values, get_secret_value,
    get_secret_values, get_secret_values_with_fallback, resolve_container,
};
pub use store::SecretContainer;
