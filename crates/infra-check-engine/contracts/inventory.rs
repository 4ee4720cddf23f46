//! Audit targets
//!
//! Hosts, service endpoints and clusters the engine dispatches checks against.
//! All of it is resolved by the inventory loader before a run starts and is
//! shared read-only across workers.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Deployment environment a target belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Environment {
    /// Development
    #[serde(rename = "DEV", alias = "dev")]
    Dev,
    /// Staging
    #[serde(rename = "STG", alias = "stg")]
    Stg,
    /// Production
    #[serde(rename = "PRD", alias = "prd")]
    Prd,
    /// Infrastructure serving every environment (CI/CD)
    #[serde(rename = "SHARED", alias = "shared")]
    Shared,
}

impl Environment {
    pub const ALL: [Environment; 4] = [
        Environment::Dev,
        Environment::Stg,
        Environment::Prd,
        Environment::Shared,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Dev => "DEV",
            Environment::Stg => "STG",
            Environment::Prd => "PRD",
            Environment::Shared => "SHARED",
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "dev" | "development" => Ok(Environment::Dev),
            "stg" | "stage" | "staging" => Ok(Environment::Stg),
            "prd" | "prod" | "production" => Ok(Environment::Prd),
            "shared" | "cicd" | "ci/cd" => Ok(Environment::Shared),
            _ => Err(format!("Unknown environment: {}", s)),
        }
    }
}

/// Role of a host inside the fleet
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Role {
    /// Kubernetes control-plane node
    Master,
    /// Kubernetes worker node
    Worker,
    /// Database server
    Database,
    /// CI/CD service host (Jenkins, registry, ...)
    CicdService,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Master => "master",
            Role::Worker => "worker",
            Role::Database => "database",
            Role::CicdService => "cicd-service",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A network service exposed by a target
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceEndpoint {
    /// Service name (e.g. "Jenkins", "MySQL")
    pub name: String,

    /// TCP port
    pub port: u16,

    /// Path used by HTTP probes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

impl ServiceEndpoint {
    pub fn new(name: impl Into<String>, port: u16) -> Self {
        Self {
            name: name.into(),
            port,
            path: None,
        }
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }
}

/// One addressable endpoint of the fleet
///
/// Identity is `(environment, hostname)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Target {
    /// Environment tag
    pub environment: Environment,

    /// Hostname (identity within the environment)
    pub hostname: String,

    /// Display name used in reports
    pub name: String,

    /// IP address or resolvable address used for connections
    pub address: String,

    /// SSH port
    #[serde(default = "default_ssh_port")]
    pub ssh_port: u16,

    /// Role of the host
    pub role: Role,

    /// Services exposed by the host
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub services: Vec<ServiceEndpoint>,

    /// Owning cluster, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster: Option<String>,
}

fn default_ssh_port() -> u16 {
    22
}

impl Target {
    /// Create a target whose display name and address equal its hostname
    pub fn new(environment: Environment, hostname: impl Into<String>, role: Role) -> Self {
        let hostname = hostname.into();
        Self {
            environment,
            name: hostname.clone(),
            address: hostname.clone(),
            hostname,
            ssh_port: default_ssh_port(),
            role,
            services: Vec::new(),
            cluster: None,
        }
    }

    pub fn with_address(mut self, address: impl Into<String>) -> Self {
        self.address = address.into();
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_ssh_port(mut self, port: u16) -> Self {
        self.ssh_port = port;
        self
    }

    pub fn with_service(mut self, service: ServiceEndpoint) -> Self {
        self.services.push(service);
        self
    }

    pub fn with_cluster(mut self, cluster: impl Into<String>) -> Self {
        self.cluster = Some(cluster.into());
        self
    }

    /// Identity of the target
    pub fn identity(&self) -> (Environment, &str) {
        (self.environment, self.hostname.as_str())
    }
}

/// A Kubernetes cluster whose control plane is queried once per check
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterRef {
    /// Cluster name
    pub name: String,

    /// Environment the cluster serves
    pub environment: Environment,

    /// Host the cluster queries are executed on (first master)
    pub api_host: Target,

    /// Node names known from the inventory
    #[serde(default)]
    pub nodes: Vec<String>,
}

/// The resolved set of targets for one run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Inventory {
    /// Individual hosts
    pub targets: Vec<Target>,

    /// Clusters for cluster-scoped checks
    #[serde(default)]
    pub clusters: Vec<ClusterRef>,
}

impl Inventory {
    pub fn new(targets: Vec<Target>, clusters: Vec<ClusterRef>) -> Self {
        Self { targets, clusters }
    }

    /// True when there is nothing to audit
    pub fn is_empty(&self) -> bool {
        self.targets.is_empty() && self.clusters.is_empty()
    }

    /// Keep only targets and clusters of the given environments
    pub fn retain_environments(mut self, environments: &[Environment]) -> Self {
        self.targets.retain(|t| environments.contains(&t.environment));
        self.clusters.retain(|c| environments.contains(&c.environment));
        self
    }

    /// Targets carrying one of the given roles
    pub fn targets_with_roles<'a>(
        &'a self,
        roles: &'a [Role],
    ) -> impl Iterator<Item = &'a Target> + 'a {
        self.targets.iter().filter(move |t| roles.contains(&t.role))
    }

    /// Environments present in this inventory, in presentation order
    pub fn environments(&self) -> Vec<Environment> {
        let mut envs: Vec<Environment> = self
            .targets
            .iter()
            .map(|t| t.environment)
            .chain(self.clusters.iter().map(|c| c.environment))
            .collect();
        envs.sort();
        envs.dedup();
        envs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_environment_parse() {
        assert_eq!("dev".parse::<Environment>().unwrap(), Environment::Dev);
        assert_eq!("PRODUCTION".parse::<Environment>().unwrap(), Environment::Prd);
        assert_eq!("cicd".parse::<Environment>().unwrap(), Environment::Shared);
        assert!("qa".parse::<Environment>().is_err());
    }

    #[test]
    fn test_environment_serde_names() {
        let json = serde_json::to_string(&Environment::Stg).unwrap();
        assert_eq!(json, "\"STG\"");
        let env: Environment = serde_json::from_str("\"prd\"").unwrap();
        assert_eq!(env, Environment::Prd);
    }

    #[test]
    fn test_role_serde_kebab_case() {
        let json = serde_json::to_string(&Role::CicdService).unwrap();
        assert_eq!(json, "\"cicd-service\"");
    }

    #[test]
    fn test_retain_environments() {
        let inventory = Inventory::new(
            vec![
                Target::new(Environment::Dev, "dev-w1", Role::Worker),
                Target::new(Environment::Prd, "prd-w1", Role::Worker),
                Target::new(Environment::Shared, "jenkins", Role::CicdService),
            ],
            vec![],
        );

        let filtered = inventory.retain_environments(&[Environment::Prd, Environment::Shared]);
        assert_eq!(filtered.targets.len(), 2);
        assert_eq!(
            filtered.environments(),
            vec![Environment::Prd, Environment::Shared]
        );
    }
}
