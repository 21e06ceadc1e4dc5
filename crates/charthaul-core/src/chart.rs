//! Chart object model
//!
//! A `Chart` is the parsed form of a fetched artifact: its metadata
//! (including declared dependencies) plus the dependency charts that have
//! been attached by resolution. Parsing chart *content* (templates, values)
//! is the job of an external loader; this crate only models the shape the
//! resolver walks.

use semver::Version;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// A declared dependency as it appears in chart metadata
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DependencyRef {
    /// Dependency chart name
    pub name: String,

    /// Version constraint or pinned version
    pub version: String,

    /// Repository source the dependency is fetched from
    pub repository: String,
}

/// Chart metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartMetadata {
    /// Chart name (required)
    pub name: String,

    /// Chart version (required, SemVer)
    pub version: Version,

    /// Description
    #[serde(default)]
    pub description: Option<String>,

    /// Declared dependencies
    #[serde(default)]
    pub dependencies: Vec<DependencyRef>,
}

impl ChartMetadata {
    pub fn new(name: impl Into<String>, version: Version) -> Self {
        Self {
            name: name.into(),
            version,
            description: None,
            dependencies: Vec::new(),
        }
    }
}

/// A loaded chart with its attached dependency tree
#[derive(Debug, Clone)]
pub struct Chart {
    /// Chart metadata
    pub metadata: ChartMetadata,

    /// Embedded values schema, if the chart ships one
    pub schema: Option<serde_json::Value>,

    /// Directory the chart was loaded from
    pub root: PathBuf,

    /// Attached dependency charts
    ///
    /// Populated either by the loader (vendored subcharts) or by the
    /// resolver once a subtree has fully resolved.
    dependencies: Vec<Chart>,
}

impl Chart {
    pub fn new(metadata: ChartMetadata, root: impl Into<PathBuf>) -> Self {
        Self {
            metadata,
            schema: None,
            root: root.into(),
            dependencies: Vec::new(),
        }
    }

    /// Chart name
    #[inline]
    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    /// Attached dependency charts
    pub fn dependencies(&self) -> &[Chart] {
        &self.dependencies
    }

    /// Replace the attached dependency list
    ///
    /// Callers attach a subtree only once it has fully resolved; a
    /// partially resolved level is never attached.
    pub fn set_dependencies(&mut self, deps: Vec<Chart>) {
        self.dependencies = deps;
    }

    /// Detach and return the current dependency list
    pub fn take_dependencies(&mut self) -> Vec<Chart> {
        std::mem::take(&mut self.dependencies)
    }

    /// Drop embedded schema data from this chart and all attached dependencies
    ///
    /// Opting out of schema validation is a performance knob, not a
    /// correctness requirement.
    pub fn strip_schema(&mut self) {
        self.schema = None;
        for dep in &mut self.dependencies {
            dep.strip_schema();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chart(name: &str) -> Chart {
        Chart::new(ChartMetadata::new(name, Version::new(1, 0, 0)), "/tmp/c")
    }

    #[test]
    fn test_metadata_yaml_roundtrip() {
        let yaml = r#"
name: webapp
version: 1.2.3
description: A web application
dependencies:
  - name: redis
    version: 17.0.0
    repository: https://charts.example.com
"#;
        let meta: ChartMetadata = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(meta.name, "webapp");
        assert_eq!(meta.version, Version::new(1, 2, 3));
        assert_eq!(meta.dependencies.len(), 1);
        assert_eq!(meta.dependencies[0].name, "redis");
    }

    #[test]
    fn test_metadata_without_dependencies() {
        let meta: ChartMetadata = serde_yaml::from_str("name: lone\nversion: 0.1.0\n").unwrap();
        assert!(meta.dependencies.is_empty());
    }

    #[test]
    fn test_set_and_take_dependencies() {
        let mut root = chart("root");
        root.set_dependencies(vec![chart("a"), chart("b")]);
        assert_eq!(root.dependencies().len(), 2);

        let taken = root.take_dependencies();
        assert_eq!(taken.len(), 2);
        assert!(root.dependencies().is_empty());
    }

    #[test]
    fn test_strip_schema_recursive() {
        let mut child = chart("child");
        child.schema = Some(serde_json::json!({"type": "object"}));

        let mut root = chart("root");
        root.schema = Some(serde_json::json!({"type": "object"}));
        root.set_dependencies(vec![child]);

        root.strip_schema();
        assert!(root.schema.is_none());
        assert!(root.dependencies()[0].schema.is_none());
    }
}
