//! Inventory file
//!
//! ```yaml
//! ssh_config:
//!   default_user: ${SSH_USER}
//!   private_key_path: ~/.ssh/id_rsa
//! clusters:
//!   - name: dev-cluster
//!     env: dev
//!     masters: [{ name: dev-master-1, hostname: dev-m1, ip: 10.0.1.10 }]
//!     workers: [{ name: dev-worker-1, hostname: dev-w1, ip: 10.0.1.20 }]
//! cicd_servers:
//!   - { name: jenkins, hostname: ci-1, ip: 10.0.9.10, services: [{ name: Jenkins, port: 8080, path: /login }] }
//! report: { type: weekly, company_name: Example, team_name: Platform, output_dir: ./output }
//! ```

use super::{expand_home_env, load_file};
use crate::error::{CliError, Result};
use infra_check_engine::channel::ShellConfig;
use infra_check_engine::{ClusterRef, Environment, Inventory, ReportType, Role, ServiceEndpoint, Target};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

/// Top-level inventory document
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InventoryFile {
    #[serde(default)]
    pub ssh_config: SshSettings,

    #[serde(default)]
    pub clusters: Vec<ClusterEntry>,

    #[serde(default)]
    pub cicd_servers: Vec<HostEntry>,

    #[serde(default)]
    pub report: ReportSettings,
}

/// SSH defaults; timeouts in seconds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SshSettings {
    #[serde(default)]
    pub default_user: Option<String>,

    #[serde(default)]
    pub private_key_path: Option<String>,

    #[serde(default = "default_connect_timeout")]
    pub connect_timeout: u64,

    #[serde(default = "default_command_timeout")]
    pub command_timeout: u64,
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_command_timeout() -> u64 {
    30
}

impl Default for SshSettings {
    fn default() -> Self {
        Self {
            default_user: None,
            private_key_path: None,
            connect_timeout: default_connect_timeout(),
            command_timeout: default_command_timeout(),
        }
    }
}

impl SshSettings {
    /// Resolve against command-line overrides; `~/` in the key path is expanded
    pub fn resolve(&self, user: Option<String>, key: Option<String>) -> ShellConfig {
        let user = user
            .or_else(|| self.default_user.clone())
            .filter(|u| !u.is_empty() && !u.starts_with("${"));
        let private_key_path = key
            .or_else(|| self.private_key_path.clone())
            .filter(|k| !k.is_empty() && !k.starts_with("${"))
            .map(|k| expand_home_env(&k).to_string_lossy().into_owned());

        ShellConfig {
            user,
            private_key_path,
            connect_timeout: Duration::from_secs(self.connect_timeout),
            command_timeout: Duration::from_secs(self.command_timeout),
            ..ShellConfig::default()
        }
    }
}

/// One cluster and its hosts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterEntry {
    pub name: String,

    pub env: String,

    #[serde(default)]
    pub masters: Vec<HostEntry>,

    #[serde(default)]
    pub workers: Vec<HostEntry>,

    #[serde(default)]
    pub databases: Vec<HostEntry>,
}

/// One host
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostEntry {
    /// Display name, defaults to the hostname
    #[serde(default)]
    pub name: Option<String>,

    pub hostname: String,

    /// Connection address, defaults to the hostname
    #[serde(default)]
    pub ip: Option<String>,

    #[serde(default, alias = "port")]
    pub ssh_port: Option<u16>,

    #[serde(default)]
    pub services: Vec<ServiceEndpoint>,
}

impl HostEntry {
    fn to_target(&self, environment: Environment, role: Role) -> Target {
        let mut target = Target::new(environment, self.hostname.clone(), role);
        if let Some(name) = &self.name {
            target = target.with_name(name.clone());
        }
        if let Some(ip) = &self.ip {
            target = target.with_address(ip.clone());
        }
        if let Some(port) = self.ssh_port {
            target = target.with_ssh_port(port);
        }
        target.services = self.services.clone();
        target
    }
}

/// Report metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportSettings {
    #[serde(default, rename = "type")]
    pub report_type: Option<ReportType>,

    #[serde(default = "default_company_name")]
    pub company_name: String,

    #[serde(default = "default_team_name")]
    pub team_name: String,

    #[serde(default = "default_output_dir")]
    pub output_dir: String,
}

fn default_company_name() -> String {
    "Infrastructure".to_string()
}

fn default_team_name() -> String {
    "Platform Team".to_string()
}

fn default_output_dir() -> String {
    "./output".to_string()
}

impl Default for ReportSettings {
    fn default() -> Self {
        Self {
            report_type: None,
            company_name: default_company_name(),
            team_name: default_team_name(),
            output_dir: default_output_dir(),
        }
    }
}

/// Inventory converted to engine types
#[derive(Debug, Clone)]
pub struct LoadedInventory {
    pub inventory: Inventory,
    pub ssh: SshSettings,
    pub report: ReportSettings,
}

impl InventoryFile {
    /// Assign roles and environments, build one cluster per cluster with a master
    pub fn into_loaded(self) -> Result<LoadedInventory> {
        let mut targets = Vec::new();
        let mut clusters = Vec::new();

        for entry in &self.clusters {
            let environment: Environment = entry.env.parse().map_err(|e: String| {
                CliError::config_error(format!("cluster '{}': {}", entry.name, e))
            })?;

            let hosts = entry
                .masters
                .iter()
                .map(|h| (h, Role::Master))
                .chain(entry.workers.iter().map(|h| (h, Role::Worker)))
                .chain(entry.databases.iter().map(|h| (h, Role::Database)));

            for (host, role) in hosts {
                targets.push(host.to_target(environment, role).with_cluster(entry.name.clone()));
            }

            match entry.masters.first() {
                Some(master) => clusters.push(ClusterRef {
                    name: entry.name.clone(),
                    environment,
                    api_host: master
                        .to_target(environment, Role::Master)
                        .with_cluster(entry.name.clone()),
                    nodes: entry
                        .masters
                        .iter()
                        .chain(entry.workers.iter())
                        .map(|h| h.hostname.clone())
                        .collect(),
                }),
                None => tracing::warn!(
                    cluster = %entry.name,
                    "cluster has no master, cluster checks skipped"
                ),
            }
        }

        for host in &self.cicd_servers {
            targets.push(host.to_target(Environment::Shared, Role::CicdService));
        }

        let mut seen = HashSet::new();
        for target in &targets {
            if target.hostname.trim().is_empty() {
                return Err(CliError::config_error(format!(
                    "host '{}' in {} has an empty hostname",
                    target.name, target.environment
                )));
            }
            if !seen.insert(target.identity()) {
                return Err(CliError::config_error(format!(
                    "duplicate host '{}' in {}",
                    target.hostname, target.environment
                )));
            }
        }

        Ok(LoadedInventory {
            inventory: Inventory::new(targets, clusters),
            ssh: self.ssh_config,
            report: self.report,
        })
    }
}

/// Load and convert an inventory file
pub fn load_inventory(path: &Path) -> Result<LoadedInventory> {
    let file: InventoryFile = load_file(path)?;
    file.into_loaded()
}
