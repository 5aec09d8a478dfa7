//! Connection-related data models.
//!
//! This module defines the backing-store type and the connection descriptor
//! consumed once when the gateway initializes its pool.

use crate::config::PoolOptions;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use url::Url;

/// Supported database types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseType {
    #[value(name = "postgresql", alias = "postgres")]
    PostgreSQL,
    /// Includes MariaDB
    #[value(name = "mysql", alias = "mariadb")]
    MySQL,
}

impl DatabaseType {
    /// Parse database type from a connection string.
    pub fn from_connection_string(connection_string: &str) -> Option<Self> {
        let lower = connection_string.to_lowercase();
        if lower.starts_with("postgres://") || lower.starts_with("postgresql://") {
            Some(Self::PostgreSQL)
        } else if lower.starts_with("mysql://") || lower.starts_with("mariadb://") {
            Some(Self::MySQL)
        } else {
            None
        }
    }

    /// Get the display name for this database type.
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::PostgreSQL => "PostgreSQL",
            Self::MySQL => "MySQL",
        }
    }

    /// URL scheme understood by the sqlx driver.
    pub fn scheme(&self) -> &'static str {
        match self {
            Self::PostgreSQL => "postgres",
            Self::MySQL => "mysql",
        }
    }

    /// Get the default port for this database type.
    pub fn default_port(&self) -> u16 {
        match self {
            Self::PostgreSQL => 5432,
            Self::MySQL => 3306,
        }
    }
}

impl std::fmt::Display for DatabaseType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

/// Host, credentials and target database for the pool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionDescriptor {
    pub db_type: DatabaseType,
    /// Contains sensitive data - never log
    #[serde(skip_serializing)]
    pub connection_string: String,
    pub database: String,
    #[serde(default)]
    pub pool_options: PoolOptions,
}

impl ConnectionDescriptor {
    /// Pool option keys that we extract from URL query parameters.
    const POOL_OPTION_KEYS: &'static [&'static str] = &[
        "max_connections",
        "min_connections",
        "idle_timeout",
        "acquire_timeout",
        "test_before_acquire",
    ];

    /// Parse a descriptor from a connection URL.
    ///
    /// Pool options travel as query parameters and are stripped before the
    /// URL reaches the driver:
    ///
    /// ```text
    /// mysql://app:secret@db:3306/sales?max_connections=20
    /// postgres://app:secret@db/sales?sslmode=require&acquire_timeout=5
    /// ```
    pub fn parse(s: &str) -> Result<Self, String> {
        let db_type = DatabaseType::from_connection_string(s)
            .ok_or_else(|| "Unsupported database URL scheme (expected mysql:// or postgres://)".to_string())?;

        let mut url = Url::parse(s).map_err(|e| format!("Invalid URL: {e}"))?;
        let mut opts = Self::extract_options(&mut url, Self::POOL_OPTION_KEYS);
        let pool_options = PoolOptions::from_query(&mut opts);
        pool_options.validate()?;

        let database = Self::db_name(&url)
            .ok_or_else(|| "The connection URL must name a target database".to_string())?;

        Ok(Self {
            db_type,
            connection_string: url.to_string(),
            database,
            pool_options,
        })
    }

    /// Build a descriptor from discrete settings.
    pub fn from_parts(
        db_type: DatabaseType,
        host: &str,
        port: Option<u16>,
        user: &str,
        password: Option<&str>,
        database: &str,
        pool_options: PoolOptions,
    ) -> Result<Self, String> {
        if database.is_empty() {
            return Err("Database name cannot be empty".to_string());
        }
        pool_options.validate()?;

        let port = port.unwrap_or_else(|| db_type.default_port());
        let mut url = Url::parse(&format!("{}://{}:{}", db_type.scheme(), host, port))
            .map_err(|e| format!("Invalid host: {e}"))?;
        url.set_username(user)
            .map_err(|_| "Cannot set user on connection URL".to_string())?;
        url.set_password(password)
            .map_err(|_| "Cannot set password on connection URL".to_string())?;
        url.set_path(&format!("/{}", database));

        Ok(Self {
            db_type,
            connection_string: url.to_string(),
            database: database.to_string(),
            pool_options,
        })
    }

    /// Get a display-safe version of the connection string (credentials masked).
    pub fn masked_connection_string(&self) -> String {
        match Url::parse(&self.connection_string) {
            Ok(mut url) if url.password().is_some() => {
                let _ = url.set_password(Some("****"));
                url.to_string()
            }
            Ok(url) => url.to_string(),
            Err(_) => "<invalid url>".to_string(),
        }
    }

    /// Extract pool options from URL query params, keeping others for the driver.
    fn extract_options(url: &mut Url, keys: &[&str]) -> HashMap<String, String> {
        let mut opts = HashMap::new();
        let remaining: Vec<(String, String)> = url
            .query_pairs()
            .filter_map(|(k, v)| {
                let key_lower = k.to_ascii_lowercase();
                if keys.contains(&key_lower.as_str()) {
                    opts.insert(key_lower, v.into_owned());
                    None
                } else {
                    Some((k.into_owned(), v.into_owned()))
                }
            })
            .collect();

        if remaining.is_empty() {
            url.set_query(None);
        } else {
            url.query_pairs_mut().clear().extend_pairs(remaining);
        }
        opts
    }

    fn db_name(url: &Url) -> Option<String> {
        url.path()
            .rsplit('/')
            .next()
            .filter(|s| !s.is_empty())
            .map(String::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_database_type_from_connection_string() {
        assert_eq!(
            DatabaseType::from_connection_string("postgresql://h/db"),
            Some(DatabaseType::PostgreSQL)
        );
        assert_eq!(
            DatabaseType::from_connection_string("MARIADB://h/db"),
            Some(DatabaseType::MySQL)
        );
        assert_eq!(DatabaseType::from_connection_string("sqlite:x.db"), None);
    }

    #[test]
    fn test_parse_extracts_database_and_pool_options() {
        let d = ConnectionDescriptor::parse(
            "mysql://app:secret@db:3306/sales?max_connections=20&charset=utf8mb4",
        )
        .unwrap();
        assert_eq!(d.db_type, DatabaseType::MySQL);
        assert_eq!(d.database, "sales");
        assert_eq!(d.pool_options.max_connections, Some(20));
        assert!(d.connection_string.contains("charset=utf8mb4"));
        assert!(!d.connection_string.contains("max_connections"));
    }

    #[test]
    fn test_parse_requires_database() {
        let err = ConnectionDescriptor::parse("postgres://app@db:5432/").unwrap_err();
        assert!(err.contains("target database"));
    }

    #[test]
    fn test_parse_rejects_unknown_scheme() {
        assert!(ConnectionDescriptor::parse("sqlite://data.db").is_err());
    }

    #[test]
    fn test_parse_rejects_invalid_pool_options() {
        let err =
            ConnectionDescriptor::parse("mysql://h/db?min_connections=10&max_connections=5")
                .unwrap_err();
        assert!(err.contains("cannot exceed"));
    }

    #[test]
    fn test_from_parts_encodes_credentials() {
        let d = ConnectionDescriptor::from_parts(
            DatabaseType::PostgreSQL,
            "localhost",
            None,
            "app",
            Some("p@ss word"),
            "orders",
            PoolOptions::default(),
        )
        .unwrap();
        assert!(d.connection_string.starts_with("postgres://app:"));
        assert!(d.connection_string.ends_with("@localhost:5432/orders"));
        assert!(!d.connection_string.contains("p@ss word"));
    }

    #[test]
    fn test_masked_connection_string_hides_password() {
        let d = ConnectionDescriptor::parse("mysql://app:secret@db:3306/sales").unwrap();
        let masked = d.masked_connection_string();
        assert!(!masked.contains("secret"));
        assert!(masked.contains("****"));
    }
}
