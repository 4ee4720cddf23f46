//! Work planning
//!
//! Expands the catalog against the inventory into one work item per
//! (subject, check) pair. Cluster queries are planned once per cluster.

use crate::channel::Subject;
use crate::contracts::*;
use crate::registry::CheckRegistry;
use std::sync::Arc;

/// One unit of dispatch
#[derive(Debug, Clone)]
pub struct WorkItem {
    pub subject: Subject,
    pub check: Arc<CheckDefinition>,
}

impl WorkItem {
    pub fn new(subject: Subject, check: Arc<CheckDefinition>) -> Self {
        Self { subject, check }
    }
}

/// Expand `registry` against `inventory`, in catalog order
pub fn plan(inventory: &Inventory, registry: &CheckRegistry) -> Vec<WorkItem> {
    let mut items = Vec::new();

    for check in registry.iter() {
        let roles = check.applicable_roles();
        match check.channel {
            ChannelKind::RemoteShell => {
                for target in inventory.targets_with_roles(roles) {
                    items.push(WorkItem::new(
                        Subject::Host(target.clone()),
                        Arc::clone(check),
                    ));
                }
            }
            ChannelKind::ClusterQuery => {
                for cluster in &inventory.clusters {
                    items.push(WorkItem::new(
                        Subject::Cluster(cluster.clone()),
                        Arc::clone(check),
                    ));
                }
            }
            ChannelKind::NetworkProbe | ChannelKind::DatabaseProbe => {
                for target in inventory.targets_with_roles(roles) {
                    for endpoint in &target.services {
                        items.push(WorkItem::new(
                            Subject::Service {
                                target: target.clone(),
                                endpoint: endpoint.clone(),
                            },
                            Arc::clone(check),
                        ));
                    }
                }
            }
        }
    }

    items
}
