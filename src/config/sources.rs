use super::models::Config;
use config::{ConfigError, Environment, File};
use std::env;
use std::path::PathBuf;

const CONFIG_ENV_VAR: &str = "BLOCKYARD_CONFIG";
const DEFAULT_CONFIG_PATH: &str = "config/blockyard.toml";
const ENV_PREFIX: &str = "BLOCKYARD";
const ENV_SEPARATOR: &str = "__";

/// Object store credentials, in lookup order. Never read from the TOML file.
const ACCESS_KEY_VARS: &[&str] = &["S3_ACCESS_KEY", "AWS_ACCESS_KEY_ID"];
const SECRET_KEY_VARS: &[&str] = &["S3_SECRET_KEY", "AWS_SECRET_ACCESS_KEY"];

/// Load from `$BLOCKYARD_CONFIG`, falling back to `config/blockyard.toml`
pub fn load() -> Result<Config, ConfigError> {
    let path = env::var(CONFIG_ENV_VAR)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH));

    load_from_path(path)
}

/// Load from an explicit file, still honouring `.env` and environment overrides
pub fn load_from_path(path: PathBuf) -> Result<Config, ConfigError> {
    // A missing .env is fine
    let _ = dotenvy::dotenv();

    let mut config = load_from_sources(path)?;
    config.storage.access_key = first_env(ACCESS_KEY_VARS).or(config.storage.access_key);
    config.storage.secret_key = first_env(SECRET_KEY_VARS).or(config.storage.secret_key);

    Ok(config)
}

fn first_env(names: &[&str]) -> Option<String> {
    names.iter().find_map(|name| env::var(name).ok())
}

/// Struct defaults, then the TOML file if present, then `BLOCKYARD__*` variables
pub fn load_from_sources(path: PathBuf) -> Result<Config, ConfigError> {
    let mut builder = config::Config::builder();

    if path.exists() {
        tracing::info!(path = %path.display(), "Loading configuration file");
        builder = builder.add_source(File::from(path).required(false));
    } else {
        tracing::warn!(
            path = %path.display(),
            "Configuration file not found, using defaults and environment"
        );
    }

    // BLOCKYARD__COMPACTOR__WAIT_PERIOD -> compactor.wait_period
    builder = builder.add_source(
        Environment::with_prefix(ENV_PREFIX)
            .prefix_separator(ENV_SEPARATOR)
            .separator(ENV_SEPARATOR)
            .try_parsing(true),
    );

    builder.build()?.try_deserialize()
}
