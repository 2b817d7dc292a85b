//! Plugin dependency resolution using topological sort.
//!
//! Orders plugins so required plugins come before the plugins that need them.
//! Uses Kahn's algorithm with cycle detection.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};

use anyhow::{Result, bail};

use super::info_parser::PluginInfo;

/// Resolve load order for a set of plugins.
///
/// Requirements on plugins outside the set are ignored here; the loader
/// checks those individually. Ties are broken alphabetically so the order is
/// stable across runs.
///
/// # Errors
/// Returns error if the requirements within the set form a cycle.
pub fn resolve_load_order(plugins: &BTreeMap<String, PluginInfo>) -> Result<Vec<String>> {
    // in_degree[p] = number of plugins in the set that p requires
    let mut in_degree: HashMap<&str, usize> = HashMap::new();
    let mut dependents: HashMap<&str, Vec<&str>> = HashMap::new();

    for name in plugins.keys() {
        in_degree.insert(name, 0);
    }

    for (name, info) in plugins {
        for dep in &info.required_plugins {
            if !plugins.contains_key(dep) {
                continue;
            }
            if let Some(degree) = in_degree.get_mut(name.as_str()) {
                *degree += 1;
            }
            dependents.entry(dep.as_str()).or_default().push(name);
        }
    }

    let mut result = Vec::with_capacity(plugins.len());
    // BTreeMap keys are sorted, so the initial queue is too
    let mut queue: VecDeque<&str> = plugins
        .keys()
        .map(String::as_str)
        .filter(|name| in_degree.get(name) == Some(&0))
        .collect();

    while let Some(plugin) = queue.pop_front() {
        result.push(plugin.to_string());

        if let Some(deps) = dependents.get(plugin) {
            for dependent in deps {
                if let Some(degree) = in_degree.get_mut(dependent) {
                    *degree -= 1;
                    if *degree == 0 {
                        queue.push_back(dependent);
                    }
                }
            }
        }
    }

    if result.len() != plugins.len() {
        let loaded: HashSet<_> = result.iter().map(String::as_str).collect();
        let in_cycle: Vec<_> = plugins
            .keys()
            .filter(|k| !loaded.contains(k.as_str()))
            .cloned()
            .collect();

        bail!(
            "circular dependency detected involving plugins: {}",
            in_cycle.join(", ")
        );
    }

    Ok(result)
}

/// Why a required plugin is not usable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unmet {
    Missing,
    NotInstalled,
    Inactive,
    NotLoaded,
}

impl Unmet {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Missing => "missing",
            Self::NotInstalled => "not installed",
            Self::Inactive => "inactive",
            Self::NotLoaded => "not loaded",
        }
    }
}

/// Describe each unmet requirement as `"name (reason)"`.
///
/// `status` reports why a required plugin is unusable, or `None` when it is
/// installed, active and loaded.
pub fn unmet_dependencies<F>(required: &[String], status: F) -> Vec<String>
where
    F: Fn(&str) -> Option<Unmet>,
{
    required
        .iter()
        .filter_map(|dep| status(dep).map(|why| format!("{dep} ({})", why.as_str())))
        .collect()
}
