//! Configuration handling for the docgen service.
//! Settings come from an optional `docgen.json` / `docgen.yml` / `docgen.yaml`
//! file, then environment variables, then command-line flags.

use crate::binder::NullPolicy;
use crate::constants::{
    CONFIG_FILES, DEFAULT_FILE_NAME_PATTERN, DEFAULT_HOST, DEFAULT_MAX_BODY_BYTES,
    DEFAULT_MAX_TEMPLATE_BYTES, DEFAULT_MAX_UNCOMPRESSED_BYTES, DEFAULT_PORT,
    DEFAULT_TEMPLATES_DIR, DEFAULT_TEMPLATE_GLOB, PRODUCTION_ENV,
};
use crate::error::{Error, Result};
use log::debug;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Service settings.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub templates_dir: PathBuf,
    pub max_body_bytes: usize,
    pub max_template_bytes: u64,
    pub max_uncompressed_bytes: u64,
    /// Policy used when a request does not choose one
    pub default_policy: NullPolicy,
    pub linebreaks: bool,
    pub file_name_pattern: String,
    pub template_glob: String,
    pub cors_allowed_origins: Vec<String>,
    /// `production` hides internal error details from clients
    pub environment: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            templates_dir: PathBuf::from(DEFAULT_TEMPLATES_DIR),
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            max_template_bytes: DEFAULT_MAX_TEMPLATE_BYTES,
            max_uncompressed_bytes: DEFAULT_MAX_UNCOMPRESSED_BYTES,
            default_policy: NullPolicy::Lenient,
            linebreaks: true,
            file_name_pattern: DEFAULT_FILE_NAME_PATTERN.to_string(),
            template_glob: DEFAULT_TEMPLATE_GLOB.to_string(),
            cors_allowed_origins: vec!["*".to_string()],
            environment: "development".to_string(),
        }
    }
}

impl Config {
    pub fn is_production(&self) -> bool {
        self.environment.eq_ignore_ascii_case(PRODUCTION_ENV)
    }

    /// Applies environment overrides through a lookup function.
    ///
    /// Recognised keys: `PORT`, `DOCGEN_TEMPLATES_DIR`, `DOCGEN_ENV`, `NODE_ENV`.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(port) = lookup("PORT") {
            self.port = port
                .trim()
                .parse()
                .map_err(|e| Error::Config(format!("invalid PORT '{port}': {e}")))?;
        }
        if let Some(dir) = lookup("DOCGEN_TEMPLATES_DIR") {
            self.templates_dir = PathBuf::from(dir);
        }
        if let Some(env) = lookup("DOCGEN_ENV").or_else(|| lookup("NODE_ENV")) {
            self.environment = env;
        }
        Ok(())
    }
}

/// Loads configuration from a directory, trying every supported file name.
///
/// # Arguments
/// * `dir` - Directory to search
/// * `config_files` - Candidate file names, in priority order
///
/// # Returns
/// * `Result<Option<String>>` - Contents of the first file found, if any
pub fn load_config<P: AsRef<Path>>(dir: P, config_files: &[&str]) -> Result<Option<String>> {
    for file in config_files {
        let config_path = dir.as_ref().join(file);
        if config_path.exists() {
            debug!("Loading configuration from {}", config_path.display());
            return Ok(Some(std::fs::read_to_string(&config_path)?));
        }
    }
    Ok(None)
}

/// Parses configuration content, trying JSON first and YAML second.
///
/// # Errors
/// * `Error::Config` if the content is neither valid JSON nor valid YAML
pub fn parse_config(content: &str) -> Result<Config> {
    match serde_json::from_str(content) {
        Ok(config) => Ok(config),
        Err(_) => serde_yaml::from_str(content)
            .map_err(|e| Error::Config(format!("Invalid configuration format: {e}"))),
    }
}

/// Builds the effective configuration.
///
/// # Arguments
/// * `config_path` - Explicit config file; when absent the working directory is searched
pub fn get_config(config_path: Option<&Path>) -> Result<Config> {
    let content = match config_path {
        Some(path) => Some(std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("cannot read '{}': {e}", path.display()))
        })?),
        None => load_config(std::env::current_dir()?, &CONFIG_FILES)?,
    };
    let mut config = match content {
        Some(content) => parse_config(&content)?,
        None => Config::default(),
    };
    config.apply_env(|key| std::env::var(key).ok())?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_parse_json_and_yaml() {
        let json = parse_config(r#"{"port": 4000, "defaultPolicy": "strict"}"#).unwrap();
        assert_eq!(json.port, 4000);
        assert_eq!(json.default_policy, NullPolicy::Strict);
        assert_eq!(json.templates_dir, PathBuf::from(DEFAULT_TEMPLATES_DIR));

        let yaml = parse_config("templatesDir: /srv/templates\nlinebreaks: false\n").unwrap();
        assert_eq!(yaml.templates_dir, PathBuf::from("/srv/templates"));
        assert!(!yaml.linebreaks);
        assert_eq!(yaml.port, DEFAULT_PORT);
    }

    #[test]
    fn test_invalid_config() {
        assert!(matches!(parse_config("port: [nope"), Err(Error::Config(_))));
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> =
            HashMap::from([("PORT", "8080"), ("NODE_ENV", "production")]);
        let mut config = Config::default();
        config.apply_env(|k| vars.get(k).map(|v| v.to_string())).unwrap();
        assert_eq!(config.port, 8080);
        assert!(config.is_production());

        let mut config = Config::default();
        let result = config.apply_env(|k| (k == "PORT").then(|| "http".to_string()));
        assert!(result.is_err());
    }
}
