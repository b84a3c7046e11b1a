use serde::{Deserialize, Serialize};

use std::{env, fs, path::Path, path::PathBuf, time::Duration};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_port")]
    pub port: u16,
    pub database_dsn: String,
    /// Directory holding uploaded images.
    pub blob_root: PathBuf,
    /// Externally reachable base URL, used to build image retrieval links.
    pub public_base_url: String,
    pub signing_secret: String,
    /// Lifetime of a retrieval link, e.g. `15m`.
    #[serde(with = "humantime_serde", default = "default_url_ttl")]
    pub url_ttl: Duration,
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
}

const fn default_port() -> u16 {
    8000
}

const fn default_url_ttl() -> Duration {
    Duration::from_secs(15 * 60)
}

const fn default_max_upload_bytes() -> usize {
    10 * 1024 * 1024
}

fn load_from_file(path: &Path) -> Result<Config, Box<dyn std::error::Error>> {
    let contents = fs::read_to_string(path)?;
    serde_yaml::from_str(&contents).map_err(Into::into)
}

/// Reads `NOTES_PORT`, `NOTES_DATABASE_DSN`, `NOTES_BLOB_ROOT`, ...
fn load_from_env() -> Result<Config, envy::Error> {
    envy::prefixed("NOTES_").from_env::<Config>()
}

pub fn load_config() -> Result<Config, Box<dyn std::error::Error>> {
    // Retrieve env variable
    let config_path = env::var("NOTES_APP_CONFIG").unwrap_or_else(|_| "config.yaml".to_string());

    // Try env path
    if Path::new(&config_path).exists() {
        return load_from_file(Path::new(&config_path));
    }

    // Fallback to config.yaml
    if Path::new("config.yaml").exists() {
        tracing::warn!(
            "Config file '{}' not found, falling back to 'config.yaml'",
            config_path
        );
        return load_from_file(Path::new("config.yaml"));
    }

    // Fallback to config.example.yaml
    if Path::new("config.example.yaml").exists() {
        tracing::warn!(
            "Config file '{}' and 'config.yaml' not found, falling back to 'config.example.yaml'\
             \n This file should not be used and should be replaced with actual data",
            config_path
        );
        return load_from_file(Path::new("config.example.yaml"));
    }

    // Fallback to environment variables
    tracing::info!(
        "No config file found, attempting to load configuration from environment variables"
    );
    match load_from_env() {
        Ok(config) => {
            tracing::info!("Successfully loaded configuration from environment variables");
            Ok(config)
        }
        Err(e) => Err(format!(
            "Config file not found and environment variables are incomplete. \
             Tried: '{config_path}', 'config.yaml', 'config.example.yaml', and environment variables. \
             Error: {e}"
        )
        .into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn given_minimal_yaml_when_loading_then_defaults_apply() {
        let file = write_config(
            "database_dsn: postgres://notes@localhost/notes\n\
             blob_root: /var/lib/notes/blobs\n\
             public_base_url: http://localhost:8000\n\
             signing_secret: s3cret\n",
        );

        let config = load_from_file(file.path()).unwrap();

        assert_eq!(config.port, 8000);
        assert_eq!(config.url_ttl, Duration::from_secs(900));
        assert_eq!(config.max_upload_bytes, 10 * 1024 * 1024);
        assert_eq!(config.blob_root, PathBuf::from("/var/lib/notes/blobs"));
    }

    #[test]
    fn given_humantime_ttl_when_loading_then_parsed() {
        let file = write_config(
            "port: 9000\n\
             database_dsn: postgres://notes@localhost/notes\n\
             blob_root: ./blobs\n\
             public_base_url: https://notes.example.com\n\
             signing_secret: s3cret\n\
             url_ttl: 1h 30m\n\
             max_upload_bytes: 1024\n",
        );

        let config = load_from_file(file.path()).unwrap();

        assert_eq!(config.port, 9000);
        assert_eq!(config.url_ttl, Duration::from_secs(90 * 60));
        assert_eq!(config.max_upload_bytes, 1024);
    }

    #[test]
    fn given_missing_required_field_when_loading_then_fails() {
        let file = write_config("port: 9000\n");

        assert!(load_from_file(file.path()).is_err());
    }
}
