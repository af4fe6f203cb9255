//! Module dependency resolution
//!
//! Partitions the registry into the INIT sequence and NORMAL dependency
//! levels, applying feature-flag/permission gating and detecting cycles.

use serde::Serialize;
use std::collections::{HashMap, HashSet, VecDeque};
use tracing::{debug, info, warn};

use crate::module::registry::descriptor::ModuleDescriptor;
use crate::module::registry::manifest::LoadType;
use crate::module::registry::ModuleRegistry;
use crate::module::security::gating::{GateDecision, GateEvaluator};
use crate::module::traits::ModuleError;

/// Why a NORMAL module will not be activated
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExclusionReason {
    /// Its own flags or permissions are not all satisfied
    Gated {
        missing_flags: Vec<String>,
        missing_permissions: Vec<String>,
    },
    /// It depends on a module absent from the registry
    MissingDependency { dependency: String },
    /// It depends on a module that is itself excluded
    DependencyExcluded { dependency: String },
}

/// A module left out of activation, with the reason
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Exclusion {
    pub module: String,
    pub reason: ExclusionReason,
}

impl Exclusion {
    /// Excluded because of its own gating, as opposed to an unsatisfied dependency
    pub fn is_gated(&self) -> bool {
        matches!(self.reason, ExclusionReason::Gated { .. })
    }
}

/// Computed activation order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ActivationPlan {
    /// INIT modules in activation order
    pub init: Vec<String>,
    /// NORMAL dependency levels; level k depends only on levels below k
    pub levels: Vec<Vec<String>>,
    /// NORMAL modules that will not be activated
    pub excluded: Vec<Exclusion>,
}

impl ActivationPlan {
    /// Build the plan for a registry under the given gating
    ///
    /// Fails with [`ModuleError::DependencyCycle`] when NORMAL modules depend
    /// on each other cyclically. Gating and missing dependencies never fail the
    /// plan; they produce [`Exclusion`]s.
    pub fn build(registry: &ModuleRegistry, gate: &GateEvaluator) -> Result<Self, ModuleError> {
        let init: Vec<String> = registry
            .init_modules()
            .into_iter()
            .map(|d| d.name.clone())
            .collect();

        let normal = registry.normal_modules();
        let order = Self::topological_order(&normal)?;

        let mut excluded: Vec<Exclusion> = Vec::new();
        let mut excluded_names: HashSet<&str> = HashSet::new();
        let mut level_of: HashMap<&str, usize> = HashMap::new();

        for descriptor in order {
            let reason = Self::exclusion_reason(registry, gate, descriptor, &excluded_names);

            if let Some(reason) = reason {
                warn!("Module {} excluded from activation: {:?}", descriptor.name, reason);
                excluded_names.insert(descriptor.name.as_str());
                excluded.push(Exclusion {
                    module: descriptor.name.clone(),
                    reason,
                });
                continue;
            }

            // INIT dependencies are already loaded before any level runs
            let level = descriptor
                .dependencies
                .iter()
                .filter_map(|dep| level_of.get(dep.as_str()))
                .map(|l| l + 1)
                .max()
                .unwrap_or(0);
            level_of.insert(descriptor.name.as_str(), level);
        }

        let depth = level_of.values().max().map_or(0, |max| max + 1);
        let mut levels: Vec<Vec<String>> = vec![Vec::new(); depth];
        // normal_modules() is already ordered by priority, then declaration
        for descriptor in &normal {
            if let Some(&level) = level_of.get(descriptor.name.as_str()) {
                levels[level].push(descriptor.name.clone());
            }
        }

        // keep exclusions in declaration order for stable reporting
        excluded.sort_by_key(|e| registry.position(&e.module));

        info!(
            "Activation plan: {} init modules, {} levels, {} excluded",
            init.len(),
            levels.len(),
            excluded.len()
        );
        debug!("Activation levels: {:?}", levels);

        Ok(Self {
            init,
            levels,
            excluded,
        })
    }

    fn exclusion_reason(
        registry: &ModuleRegistry,
        gate: &GateEvaluator,
        descriptor: &ModuleDescriptor,
        excluded_names: &HashSet<&str>,
    ) -> Option<ExclusionReason> {
        if let GateDecision::Denied {
            missing_flags,
            missing_permissions,
        } = gate.evaluate(descriptor)
        {
            return Some(ExclusionReason::Gated {
                missing_flags,
                missing_permissions,
            });
        }

        for dep in &descriptor.dependencies {
            if !registry.contains(dep) {
                return Some(ExclusionReason::MissingDependency {
                    dependency: dep.clone(),
                });
            }
            if excluded_names.contains(dep.as_str()) {
                return Some(ExclusionReason::DependencyExcluded {
                    dependency: dep.clone(),
                });
            }
        }

        None
    }

    /// Kahn's algorithm over NORMAL-to-NORMAL edges
    fn topological_order<'a>(
        normal: &[&'a ModuleDescriptor],
    ) -> Result<Vec<&'a ModuleDescriptor>, ModuleError> {
        let by_name: HashMap<&str, &'a ModuleDescriptor> =
            normal.iter().map(|d| (d.name.as_str(), *d)).collect();

        let mut in_degree: HashMap<&str, usize> = HashMap::new();
        let mut dependents: HashMap<&str, Vec<&str>> = HashMap::new();

        for descriptor in normal {
            in_degree.entry(descriptor.name.as_str()).or_insert(0);
            for dep in &descriptor.dependencies {
                if by_name.contains_key(dep.as_str()) {
                    dependents
                        .entry(dep.as_str())
                        .or_default()
                        .push(descriptor.name.as_str());
                    *in_degree.entry(descriptor.name.as_str()).or_insert(0) += 1;
                }
            }
        }

        let mut queue: VecDeque<&str> = normal
            .iter()
            .map(|d| d.name.as_str())
            .filter(|name| in_degree.get(name) == Some(&0))
            .collect();

        let mut order = Vec::with_capacity(normal.len());
        while let Some(name) = queue.pop_front() {
            if let Some(descriptor) = by_name.get(name) {
                order.push(*descriptor);
            }
            for &dependent in dependents.get(name).map(Vec::as_slice).unwrap_or_default() {
                if let Some(degree) = in_degree.get_mut(dependent) {
                    *degree -= 1;
                    if *degree == 0 {
                        queue.push_back(dependent);
                    }
                }
            }
        }

        if order.len() != normal.len() {
            let cycle = Self::cycle_members(normal, &in_degree, &dependents);
            warn!("Circular dependency detected: {:?}", cycle);
            return Err(ModuleError::DependencyCycle(cycle));
        }

        Ok(order)
    }

    /// Modules left after Kahn, minus those merely downstream of a cycle
    fn cycle_members(
        normal: &[&ModuleDescriptor],
        in_degree: &HashMap<&str, usize>,
        dependents: &HashMap<&str, Vec<&str>>,
    ) -> Vec<String> {
        let mut remaining: HashSet<&str> = in_degree
            .iter()
            .filter(|(_, &degree)| degree > 0)
            .map(|(name, _)| *name)
            .collect();

        // A node with no remaining dependents cannot close a cycle
        loop {
            let prunable: Vec<&str> = remaining
                .iter()
                .filter(|name| {
                    !dependents
                        .get(*name)
                        .is_some_and(|ds| ds.iter().any(|d| remaining.contains(d)))
                })
                .copied()
                .collect();
            if prunable.is_empty() {
                break;
            }
            for name in prunable {
                remaining.remove(name);
            }
        }

        normal
            .iter()
            .filter(|d| remaining.contains(d.name.as_str()))
            .map(|d| d.name.clone())
            .collect()
    }

    /// Level a NORMAL module will be activated in
    pub fn level_of(&self, module: &str) -> Option<usize> {
        self.levels
            .iter()
            .position(|level| level.iter().any(|m| m == module))
    }

    pub fn exclusion(&self, module: &str) -> Option<&Exclusion> {
        self.excluded.iter().find(|e| e.module == module)
    }

    pub fn is_excluded(&self, module: &str) -> bool {
        self.exclusion(module).is_some()
    }

    /// NORMAL modules that will be activated
    pub fn scheduled_count(&self) -> usize {
        self.levels.iter().map(Vec::len).sum()
    }

    /// Load type of a module named in the plan
    pub fn load_type_of(&self, module: &str) -> Option<LoadType> {
        if self.init.iter().any(|m| m == module) {
            Some(LoadType::Init)
        } else if self.level_of(module).is_some() || self.is_excluded(module) {
            Some(LoadType::Normal)
        } else {
            None
        }
    }
}
