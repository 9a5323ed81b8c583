use clap::{Args, Parser, Subcommand};
use secured_properties::{
    SecuredPropertiesConfig, SecuredPropertiesError, decrypt, encrypt,
    encrypt_non_encrypted_values, get_secret_values, is_encrypted_value,
};
use std::path::PathBuf;
use std::process;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "secured-properties")]
#[command(about = "Keep secret values encrypted inside .properties files", long_about = None)]
struct Cli {
    #[command(flatten)]
    options: ConfigOptions,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct ConfigOptions {
    /// Property files with `secured-properties.*` settings, applied in order
    #[arg(long = "config", global = true)]
    config_files: Vec<PathBuf>,

    /// Secret key file (default: ~/.secret/securedProperties.key)
    #[arg(long, global = true)]
    secret_file: Option<PathBuf>,

    /// Random salt bytes per value; 0 makes encryption deterministic
    #[arg(long, global = true)]
    salt_length: Option<usize>,

    /// Fail instead of creating a missing secret file
    #[arg(long, global = true)]
    no_auto_create: bool,

    /// Leave plain-text values in property files untouched
    #[arg(long, global = true)]
    no_auto_encrypt: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Encrypts a raw value and prints the {base64} token
    Encrypt {
        /// The raw value to encrypt
        #[arg(long)]
        value: String,
    },
    /// Decrypts a {base64} token
    Decrypt {
        /// The encrypted value
        #[arg(long)]
        value: String,
    },
    /// Prints the plain-text values of keys, encrypting plain-text values in place
    Get {
        /// Property files, later ones override earlier ones
        #[arg(long = "file", required = true)]
        files: Vec<PathBuf>,

        /// Property keys to read
        #[arg(long = "key", required = true)]
        keys: Vec<String>,
    },
    /// Encrypts plain-text values of keys in property files
    EncryptFile {
        /// Property files to rewrite
        #[arg(long = "file", required = true)]
        files: Vec<PathBuf>,

        /// Property keys to encrypt
        #[arg(long = "key", required = true)]
        keys: Vec<String>,
    },
    /// Exits with 0 if the value looks encrypted, 1 otherwise
    IsEncrypted {
        /// The value to check
        #[arg(long)]
        value: String,
    },
}

impl ConfigOptions {
    fn build(&self) -> Result<SecuredPropertiesConfig, SecuredPropertiesError> {
        let mut config = SecuredPropertiesConfig::init(&self.config_files)?;
        if let Some(secret_file) = &self.secret_file {
            config = config.with_secret_file(secret_file);
        }
        if let Some(salt_length) = self.salt_length {
            config = config.with_salt_length(salt_length);
        }
        if self.no_auto_create {
            config = config.with_auto_create_secret_key(false);
        }
        if self.no_auto_encrypt {
            config = config.with_auto_encrypt_non_encrypted_values(false);
        }
        Ok(config)
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if let Commands::IsEncrypted { value } = &cli.command {
        process::exit(if is_encrypted_value(value) { 0 } else { 1 });
    }

    let config = match cli.options.build() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error reading configuration: {}", e);
            process::exit(1);
        }
    };

    match cli.command {
        Commands::Encrypt { value } => match encrypt(&config, &value) {
            Ok(encrypted) => println!("{}", encrypted),
            Err(e) => {
                eprintln!("Error encrypting value: {}", e);
                process::exit(1);
            }
        },
        Commands::Decrypt { value } => match decrypt(&config, &value) {
            Ok(decrypted) => println!("{}", decrypted),
            Err(e) => {
                eprintln!("Error decrypting value: {}", e);
                process::exit(1);
            }
        },
        Commands::Get { files, keys } => match get_secret_values(&config, &files, &keys) {
            Ok(values) => {
                for key in &keys {
                    match values.get(key).cloned().flatten() {
                        Some(value) => println!("{}={}", key, value),
                        None => println!("{}", key),
                    }
                }
            }
            Err(e) => {
                eprintln!("Error reading values: {}", e);
                process::exit(1);
            }
        },
        Commands::EncryptFile { files, keys } => {
            if let Err(e) = encrypt_non_encrypted_values(&config, &files, &keys) {
                eprintln!("Error encrypting file: {}", e);
                process::exit(1);
            } else {
                eprintln!("Files encrypted successfully.");
            }
        }
        Commands::IsEncrypted { .. } => {}
    }
}
