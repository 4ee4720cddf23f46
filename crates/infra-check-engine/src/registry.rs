//! Check definition registry
//!
//! Validated, read-only catalog of checks keyed by id.

use crate::contracts::*;
use crate::error::{EngineError, Result};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

#[derive(Debug, Clone, Default)]
pub struct CheckRegistry {
    checks: Vec<Arc<CheckDefinition>>,
    index: HashMap<String, usize>,
}

impl CheckRegistry {
    /// Validate and index a catalog
    pub fn new(checks: Vec<CheckDefinition>) -> Result<Self> {
        let mut registry = Self::default();
        for check in checks {
            validate(&check)?;
            if registry.index.contains_key(&check.id) {
                return Err(EngineError::DuplicateCheck(check.id));
            }
            registry
                .index
                .insert(check.id.clone(), registry.checks.len());
            registry.checks.push(Arc::new(check));
        }
        Ok(registry)
    }

    /// Build from a grouped catalog, stamping each check with its group
    pub fn from_groups(groups: BTreeMap<CheckCategory, Vec<CheckDefinition>>) -> Result<Self> {
        let checks = groups
            .into_iter()
            .flat_map(|(category, checks)| {
                checks.into_iter().map(move |mut check| {
                    check.category = category;
                    check
                })
            })
            .collect();
        Self::new(checks)
    }

    pub fn get(&self, id: &str) -> Option<&Arc<CheckDefinition>> {
        self.index.get(id).map(|&i| &self.checks[i])
    }

    /// Checks in declaration order
    pub fn iter(&self) -> impl Iterator<Item = &Arc<CheckDefinition>> {
        self.checks.iter()
    }

    pub fn len(&self) -> usize {
        self.checks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.checks.is_empty()
    }

    pub fn by_category(&self, category: CheckCategory) -> impl Iterator<Item = &Arc<CheckDefinition>> {
        self.checks.iter().filter(move |c| c.category == category)
    }

    /// Subset of the registry, in declaration order
    pub fn select<S: AsRef<str>>(&self, ids: &[S]) -> Result<Self> {
        for id in ids {
            if !self.index.contains_key(id.as_ref()) {
                return Err(EngineError::UnknownCheck(id.as_ref().to_string()));
            }
        }

        let mut subset = Self::default();
        for check in &self.checks {
            if ids.iter().any(|id| id.as_ref() == check.id) {
                subset.index.insert(check.id.clone(), subset.checks.len());
                subset.checks.push(Arc::clone(check));
            }
        }
        Ok(subset)
    }
}

fn validate(check: &CheckDefinition) -> Result<()> {
    let invalid = |reason: &str| Err(EngineError::invalid_check(&check.id, reason));

    if check.id.trim().is_empty() {
        return Err(EngineError::invalid_check("<empty>", "check id is empty"));
    }
    if check.command.trim().is_empty() {
        return invalid("command template is empty");
    }

    match &check.policy {
        ThresholdPolicy::UpperBound { warning, critical } => {
            if !warning.is_finite() || !critical.is_finite() {
                return invalid("thresholds must be finite numbers");
            }
            if warning > critical {
                return invalid("warning threshold is above critical threshold");
            }
        }
        ThresholdPolicy::AcceptedStates { accepted, .. } => {
            if accepted.is_empty() {
                return invalid("accepted states list is empty");
            }
        }
        ThresholdPolicy::CountBands { bands } => {
            if bands.is_empty() {
                return invalid("count bands are empty");
            }
            if bands.iter().any(|b| b.at_least == 0) {
                return invalid("count band at_least must be >= 1");
            }
            if bands.windows(2).any(|w| w[0].at_least >= w[1].at_least) {
                return invalid("count bands must be strictly ascending");
            }
        }
        ThresholdPolicy::Informational | ThresholdPolicy::ReplicaMatch => {}
    }

    if check.fan_out == FanOut::PerResource && check.channel != ChannelKind::ClusterQuery {
        return invalid("per_resource fan-out is only valid for cluster_query checks");
    }

    Ok(())
}
