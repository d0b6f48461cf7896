use envconfig::Envconfig;
use log::debug;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error(transparent)]
    Env(#[from] envconfig::Error),

    #[error("{name} must be a plain SQL identifier, got {value:?}")]
    InvalidIdentifier { name: &'static str, value: String },
}

#[derive(Envconfig, Clone, Debug)]
pub struct Config {
    #[envconfig(from = "SALES_DB_PATH", default = "data/superstore.db")]
    pub db_path: PathBuf,

    #[envconfig(from = "SALES_RELATION", default = "sales")]
    pub relation: String,

    #[envconfig(from = "SALES_DATE_COLUMN", default = "order_date")]
    pub date_column: String,

    #[envconfig(from = "CACHE_TTL_SECS", default = "300")]
    pub cache_ttl_secs: u64,

    #[envconfig(from = "QUERY_TIMEOUT_MS")]
    pub query_timeout_ms: Option<u64>,

    #[envconfig(from = "TEMPLATES_JSON_PATH")]
    pub templates_json_path: Option<PathBuf>,

    #[envconfig(from = "STRICT_COMPOSITION", default = "false")]
    pub strict_composition: bool,
}

impl Config {
    pub fn new() -> Result<Self, ConfigError> {
        let config = Self::init_from_env()?;
        config.validate()?;
        debug!(
            "Config loaded: db_path={}, relation={}, date_column={}, cache_ttl_secs={}, query_timeout_ms={:?}, templates_json_path={:?}, strict_composition={}",
            config.db_path.display(),
            config.relation,
            config.date_column,
            config.cache_ttl_secs,
            config.query_timeout_ms,
            config.templates_json_path,
            config.strict_composition
        );
        Ok(config)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn query_timeout(&self) -> Option<Duration> {
        self.query_timeout_ms.map(Duration::from_millis)
    }

    /// The relation and date column are written into SQL text, so they are
    /// restricted to identifiers that need no quoting.
    fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in [
            ("SALES_RELATION", &self.relation),
            ("SALES_DATE_COLUMN", &self.date_column),
        ] {
            if !is_plain_identifier(value) {
                return Err(ConfigError::InvalidIdentifier {
                    name,
                    value: value.clone(),
                });
            }
        }
        Ok(())
    }
}

fn is_plain_identifier(value: &str) -> bool {
    let mut chars = value.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    }
}
