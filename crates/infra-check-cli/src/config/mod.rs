//! Inventory and catalog loading
//!
//! Files are parsed by extension (`.yaml`/`.yml`, `.json`, `.toml`) after
//! `${VAR}` references are substituted from the process environment.

pub mod catalog;
pub mod inventory;

pub use catalog::{load_catalog, CatalogFile};
pub use inventory::{load_inventory, HostEntry, InventoryFile, LoadedInventory, ReportSettings};

use crate::error::{CliError, Result};
use regex::{Captures, Regex};
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};

const ENV_REFERENCE: &str = r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}";

/// Supported file formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    Yaml,
    Json,
    Toml,
}

impl FileFormat {
    pub fn from_path(path: &Path) -> Result<Self> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_lowercase();

        match extension.as_str() {
            "yaml" | "yml" => Ok(FileFormat::Yaml),
            "json" => Ok(FileFormat::Json),
            "toml" => Ok(FileFormat::Toml),
            _ => Err(CliError::invalid_input(format!(
                "Unsupported file format: '{}'. Supported formats: yaml, yml, json, toml",
                path.display()
            ))),
        }
    }
}

/// Replace `${VAR}` with values from `lookup`; unresolved references stay verbatim
pub fn substitute_vars<F>(content: &str, lookup: F) -> Result<String>
where
    F: Fn(&str) -> Option<String>,
{
    let pattern = Regex::new(ENV_REFERENCE).map_err(|e| CliError::Internal(e.to_string()))?;
    let substituted = pattern.replace_all(content, |caps: &Captures| {
        lookup(&caps[1]).unwrap_or_else(|| caps[0].to_string())
    });
    Ok(substituted.into_owned())
}

/// `substitute_vars` against the process environment
pub fn substitute_env(content: &str) -> Result<String> {
    substitute_vars(content, |name| std::env::var(name).ok())
}

/// Parse `content` in the given format
pub fn parse_str<T: DeserializeOwned>(content: &str, format: FileFormat) -> Result<T> {
    let value = match format {
        FileFormat::Yaml => serde_yaml::from_str(content)?,
        FileFormat::Json => serde_json::from_str(content)?,
        FileFormat::Toml => toml::from_str(content)?,
    };
    Ok(value)
}

/// Read, substitute and parse a config file
pub fn load_file<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let format = FileFormat::from_path(path)?;
    let content = std::fs::read_to_string(path).map_err(|e| {
        CliError::file_error(format!("Failed to read '{}': {}", path.display(), e))
    })?;
    let content = substitute_env(&content)?;

    parse_str(&content, format).map_err(|e| match e {
        CliError::ParseError(msg) => {
            CliError::parse_error(format!("{}: {}", path.display(), msg))
        }
        other => other,
    })
}

/// Expand a leading `~/` against `home`
pub fn expand_home(path: &str, home: Option<&Path>) -> PathBuf {
    match (path.strip_prefix("~/"), home) {
        (Some(rest), Some(home)) => home.join(rest),
        _ => PathBuf::from(path),
    }
}

/// `expand_home` against `$HOME`
pub fn expand_home_env(path: &str) -> PathBuf {
    let home = std::env::var_os("HOME").map(PathBuf::from);
    expand_home(path, home.as_deref())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_format_from_extension() {
        assert_eq!(
            FileFormat::from_path(Path::new("a/inventory.yml")).unwrap(),
            FileFormat::Yaml
        );
        assert_eq!(
            FileFormat::from_path(Path::new("inventory.TOML")).unwrap(),
            FileFormat::Toml
        );
        assert!(FileFormat::from_path(Path::new("inventory.ini")).is_err());
    }

    #[test]
    fn test_substitute_vars() {
        let vars: HashMap<&str, &str> = [("SSH_USER", "audit"), ("KEY_DIR", "/keys")].into();
        let out = substitute_vars(
            "user: ${SSH_USER}\nkey: ${KEY_DIR}/id_rsa\nother: ${MISSING}\nplain: $HOME",
            |name| vars.get(name).map(|v| v.to_string()),
        )
        .unwrap();

        assert_eq!(
            out,
            "user: audit\nkey: /keys/id_rsa\nother: ${MISSING}\nplain: $HOME"
        );
    }

    #[test]
    fn test_parse_each_format() {
        #[derive(serde::Deserialize)]
        struct Doc {
            name: String,
        }

        let yaml: Doc = parse_str("name: a", FileFormat::Yaml).unwrap();
        let json: Doc = parse_str(r#"{"name": "b"}"#, FileFormat::Json).unwrap();
        let toml: Doc = parse_str("name = \"c\"", FileFormat::Toml).unwrap();
        assert_eq!((yaml.name, json.name, toml.name), ("a".into(), "b".into(), "c".into()));
    }

    #[test]
    fn test_load_missing_file() {
        let err = load_file::<serde_json::Value>(Path::new("/nonexistent/inventory.yaml"))
            .unwrap_err();
        assert!(matches!(err, CliError::FileError(_)));
    }

    #[test]
    fn test_expand_home() {
        let home = Path::new("/home/audit");
        assert_eq!(
            expand_home("~/.ssh/id_rsa", Some(home)),
            PathBuf::from("/home/audit/.ssh/id_rsa")
        );
        assert_eq!(expand_home("/etc/key", Some(home)), PathBuf::from("/etc/key"));
        assert_eq!(expand_home("~/.ssh/id_rsa", None), PathBuf::from("~/.ssh/id_rsa"));
    }
}
