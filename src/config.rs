use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::Deserialize;
use uuid::Uuid;

use crate::error::AppError;

/// Connection parameters for one managed Kubernetes cluster.
#[derive(Debug, Clone, Deserialize)]
pub struct ClusterConfig {
    pub name: String,
    pub subscription_id: Uuid,
    pub resource_group: String,
}

/// Connection parameters for the one registry a run operates on. The
/// subscription and resource group identify the registry in the document
/// even though the data-plane client only needs the URL.
#[derive(Debug, Clone, Deserialize)]
#[allow(dead_code)]
pub struct RegistryConfig {
    pub url: String,
    pub subscription_id: Uuid,
    pub resource_group: String,
}

/// The configuration document: any number of clusters keyed by alias, and
/// exactly one registry. Loaded once at startup, immutable afterwards.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub kubernetes_clusters: BTreeMap<String, ClusterConfig>,
    pub container_registry: RegistryConfig,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, AppError> {
        let raw = fs::read_to_string(path).map_err(|e| {
            AppError::Configuration(format!("failed to read {}: {}", path.display(), e))
        })?;
        serde_json::from_str(&raw).map_err(|e| {
            AppError::Configuration(format!("failed to parse {}: {}", path.display(), e))
        })
    }
}
