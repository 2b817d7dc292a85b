//! Configuration loaded from environment variables.

use std::env;
use std::path::PathBuf;

use anyhow::{Context, Result};

use crate::tagging::DEFAULT_DELIMITER;

/// Application configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// PostgreSQL connection URL.
    pub database_url: String,

    /// Maximum database connections in pool (default: 10).
    pub database_max_connections: u32,

    /// Path to plugins directory (default: ./plugins).
    pub plugins_dir: PathBuf,

    /// Separator between tags in a tag string (default: ",").
    pub tag_delimiter: String,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        let database_url =
            env::var("DATABASE_URL").context("DATABASE_URL environment variable is required")?;

        let database_max_connections = env::var("DATABASE_MAX_CONNECTIONS")
            .unwrap_or_else(|_| "10".to_string())
            .parse()
            .context("DATABASE_MAX_CONNECTIONS must be a valid u32")?;

        let plugins_dir = env::var("PLUGINS_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./plugins"));

        let tag_delimiter = parse_delimiter(env::var("TAG_DELIMITER").ok())?;

        Ok(Self {
            database_url,
            database_max_connections,
            plugins_dir,
            tag_delimiter,
        })
    }
}

fn parse_delimiter(raw: Option<String>) -> Result<String> {
    match raw {
        None => Ok(DEFAULT_DELIMITER.to_string()),
        Some(d) if d.trim().is_empty() => {
            anyhow::bail!("TAG_DELIMITER must contain a non-whitespace character")
        }
        Some(d) => Ok(d),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn delimiter_defaults_to_comma() {
        assert_eq!(parse_delimiter(None).unwrap(), ",");
        assert_eq!(parse_delimiter(Some(";".into())).unwrap(), ";");
        assert!(parse_delimiter(Some("  ".into())).is_err());
    }
}
