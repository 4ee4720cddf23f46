//! Check catalog file
//!
//! One list of check definitions per category. The category of each check is
//! taken from the list it appears in.

use super::load_file;
use crate::error::Result;
use infra_check_engine::{CheckCategory, CheckDefinition, CheckRegistry, EngineError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CatalogFile {
    #[serde(default, alias = "os_checks")]
    pub os: Vec<CheckDefinition>,

    #[serde(default, alias = "k8s_cluster_checks")]
    pub cluster: Vec<CheckDefinition>,

    #[serde(default, alias = "k8s_service_checks")]
    pub service: Vec<CheckDefinition>,

    #[serde(default, alias = "cicd_checks")]
    pub cicd: Vec<CheckDefinition>,

    #[serde(default, alias = "db_checks")]
    pub database: Vec<CheckDefinition>,
}

impl CatalogFile {
    pub fn into_groups(self) -> BTreeMap<CheckCategory, Vec<CheckDefinition>> {
        [
            (CheckCategory::Os, self.os),
            (CheckCategory::Cluster, self.cluster),
            (CheckCategory::Service, self.service),
            (CheckCategory::Cicd, self.cicd),
            (CheckCategory::Database, self.database),
        ]
        .into_iter()
        .filter(|(_, checks)| !checks.is_empty())
        .collect()
    }

    /// Validate into a registry
    pub fn into_registry(self) -> Result<CheckRegistry> {
        let registry = CheckRegistry::from_groups(self.into_groups())?;
        if registry.is_empty() {
            return Err(EngineError::EmptyCatalog.into());
        }
        Ok(registry)
    }
}

/// Load and validate a catalog file
pub fn load_catalog(path: &Path) -> Result<CheckRegistry> {
    let file: CatalogFile = load_file(path)?;
    file.into_registry()
}
