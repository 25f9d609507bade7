//! Configuration loading and validation.

mod types;
mod validation;

pub use types::*;
pub use validation::validate_descriptor;

use crate::error::Result;
use std::path::Path;

impl Config {
    /// Load configuration from a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        validation::validate(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::DialectKind;

    #[test]
    fn test_from_yaml_full() {
        let yaml = r#"
local:
  path: /tmp/recorder.db
connection:
  connect_timeout_secs: 3
target:
  dialect: postgres
  host: db.example.com
  database: recorder
  username: app
  password: secret
  connectionMethod: tcp
  ssl: true
"#;
        let config = Config::from_yaml(yaml).unwrap();
        assert_eq!(config.local.path, Path::new("/tmp/recorder.db"));
        assert_eq!(config.connection.connect_timeout_secs, 3);

        let target = config.target.unwrap();
        assert_eq!(target.dialect, DialectKind::Postgresql);
        assert_eq!(target.port_or_default(), 5432);
        assert_eq!(target.connection_method, ConnectionMethod::Direct);
        assert!(target.ssl);
    }

    #[test]
    fn test_from_yaml_defaults() {
        let config = Config::from_yaml("{}").unwrap();
        assert_eq!(config.local.path, Path::new("defaultRecorder.db"));
        assert_eq!(config.connection.connect_timeout_secs, 10);
        assert!(config.target.is_none());
    }

    #[test]
    fn test_from_yaml_mariadb_alias() {
        let yaml = "target:\n  dialect: mariadb\n  host: h\n  database: d\n  username: u\n";
        let target = Config::from_yaml(yaml).unwrap().target.unwrap();
        assert_eq!(target.dialect, DialectKind::Mysql);
        assert_eq!(target.port_or_default(), 3306);
        assert_eq!(target.address(), "h:3306/d");
    }

    #[test]
    fn test_from_yaml_rejects_incomplete_target() {
        let yaml = "target:\n  dialect: mysql\n  database: d\n";
        assert!(Config::from_yaml(yaml).is_err());
    }
}
