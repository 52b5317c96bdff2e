//! Repository to project mapping.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use serde_json::Value;

use crate::error::{CocomError, Result};

/// Project assigned to repositories missing from the map.
pub const DEFAULT_PROJECT: &str = "Main";

/// Data source name under which repositories are looked up.
pub const COCOM_DATA_SOURCE: &str = "cocom";

/// Lookup from repository origin to project name, per data source.
///
/// Built from a projects file of the form
/// `{"<project>": {"<data source>": ["<repo url>", ...]}}`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProjectMap {
    by_source: HashMap<String, HashMap<String, String>>,
}

impl ProjectMap {
    /// Build a project map from the parsed projects file.
    pub fn from_json(value: &Value) -> Result<Self> {
        let projects = value
            .as_object()
            .ok_or_else(|| CocomError::Other("projects file must be a JSON object".to_string()))?;

        let mut by_source: HashMap<String, HashMap<String, String>> = HashMap::new();
        for (project, sources) in projects {
            let Some(sources) = sources.as_object() else {
                continue;
            };
            for (source, repos) in sources {
                let Some(repos) = repos.as_array() else {
                    continue;
                };
                let repos_for_source = by_source.entry(source.clone()).or_default();
                for repo in repos.iter().filter_map(Value::as_str) {
                    repos_for_source.insert(strip_filter(repo).to_string(), project.clone());
                }
            }
        }

        Ok(Self { by_source })
    }

    /// Load a project map from a JSON projects file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let value: Value = serde_json::from_str(&contents)?;
        Self::from_json(&value)
    }

    /// Project configured for the origin under the cocom data source.
    pub fn find_project(&self, origin: &str) -> Option<&str> {
        self.by_source
            .get(COCOM_DATA_SOURCE)
            .and_then(|repos| repos.get(origin))
            .map(String::as_str)
    }

    /// Fields to merge into a record: `project` plus its dotted levels.
    pub fn project_fields(&self, origin: &str) -> BTreeMap<String, Value> {
        let project = self.find_project(origin).unwrap_or(DEFAULT_PROJECT);
        let mut fields = project_levels(project);
        fields.insert("project".to_string(), Value::String(project.to_string()));
        fields
    }
}

/// `a.b.c` becomes `project_1 = a`, `project_2 = a.b`, `project_3 = a.b.c`.
pub fn project_levels(project: &str) -> BTreeMap<String, Value> {
    let mut levels = BTreeMap::new();
    let mut path = String::new();
    for (idx, part) in project.split('.').enumerate() {
        if idx > 0 {
            path.push('.');
        }
        path.push_str(part);
        levels.insert(format!("project_{}", idx + 1), Value::String(path.clone()));
    }
    levels
}

fn strip_filter(repo: &str) -> &str {
    match repo.find(" --filter-raw") {
        Some(idx) => repo[..idx].trim_end(),
        None => repo.trim(),
    }
}
