//! Shared definition fragments.
//!
//! A library contributes properties, root defaults, display defaults and tags
//! to any map that names it. Libraries may import each other; the built-in
//! `core` library is always imported first and supplies the default edge
//! combiners and node styles.

use indexmap::{IndexMap, IndexSet};
use serde::Deserialize;

use super::raw::{
    RawEdgeCombiners, RawMapDisplay, RawNodeStyle, RawPropertyDefinition, RawScalars,
    RawTagDefinition,
};
use super::MapDisplay;
use crate::error::{Error, Result};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Library {
    #[serde(default)]
    pub description: Option<String>,
    /// Libraries merged in before this one.
    #[serde(default)]
    pub imports: Vec<String>,
    #[serde(default)]
    pub properties: IndexMap<String, RawPropertyDefinition>,
    #[serde(default)]
    pub root: RawScalars,
    #[serde(default)]
    pub display: RawMapDisplay,
    #[serde(default)]
    pub tags: IndexMap<String, RawTagDefinition>,
}

impl Library {
    fn core() -> Self {
        let defaults = MapDisplay::default();
        Self {
            description: Some("Built-in display defaults".to_string()),
            display: RawMapDisplay {
                edges: RawEdgeCombiners {
                    color: Some(defaults.edges.color),
                    width: Some(defaults.edges.width),
                    opacity: Some(defaults.edges.opacity),
                },
                nodes: RawNodeStyle {
                    radius: Some(defaults.nodes.radius),
                    color: Some(defaults.nodes.color),
                    opacity: Some(defaults.nodes.opacity),
                },
            },
            ..Self::default()
        }
    }
}

/// Named libraries available to the processor.
#[derive(Debug, Clone)]
pub struct LibrarySet {
    libraries: IndexMap<String, Library>,
}

impl Default for LibrarySet {
    fn default() -> Self {
        Self::builtin()
    }
}

impl LibrarySet {
    pub const CORE: &'static str = "core";

    /// Only the built-in `core` library.
    pub fn builtin() -> Self {
        let mut libraries = IndexMap::new();
        libraries.insert(Self::CORE.to_string(), Library::core());
        Self { libraries }
    }

    pub fn with_library(mut self, name: impl Into<String>, library: Library) -> Self {
        self.insert(name, library);
        self
    }

    /// Add or replace a library. Replacing `core` is allowed.
    pub fn insert(&mut self, name: impl Into<String>, library: Library) {
        self.libraries.insert(name.into(), library);
    }

    pub fn get(&self, name: &str) -> Option<&Library> {
        self.libraries.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.libraries.keys().map(String::as_str)
    }

    /// Builtins plus the libraries in a JSON object of `{name: library}`.
    pub fn from_json(json: &str) -> Result<Self> {
        let extra: IndexMap<String, Library> = serde_json::from_str(json)?;
        let mut set = Self::builtin();
        for (name, library) in extra {
            set.insert(name, library);
        }
        Ok(set)
    }

    /// The import closure of `requested`, `core` first, each library after
    /// everything it imports and listed once.
    pub fn resolve(&self, requested: &[String]) -> Result<Vec<&str>> {
        let mut visited = IndexSet::new();
        let mut order = Vec::new();
        self.visit(Self::CORE, &mut visited, &mut order)?;
        for name in requested {
            self.visit(name, &mut visited, &mut order)?;
        }
        Ok(order)
    }

    fn visit<'a>(
        &'a self,
        name: &str,
        visited: &mut IndexSet<&'a str>,
        order: &mut Vec<&'a str>,
    ) -> Result<()> {
        let (key, library) = self
            .libraries
            .get_key_value(name)
            .ok_or_else(|| Error::UnknownLibrary(name.to_string()))?;
        // Marked before walking imports so import cycles terminate.
        if !visited.insert(key.as_str()) {
            return Ok(());
        }
        for import in &library.imports {
            self.visit(import, visited, order)?;
        }
        order.push(key.as_str());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn importing(imports: &[&str]) -> Library {
        Library {
            imports: imports.iter().map(|s| s.to_string()).collect(),
            ..Library::default()
        }
    }

    #[test]
    fn core_comes_first_and_imports_precede_importers() {
        let set = LibrarySet::builtin()
            .with_library("base", importing(&[]))
            .with_library("risk", importing(&["base"]))
            .with_library("cost", importing(&["base", "risk"]));

        let order = set.resolve(&["cost".to_string(), "risk".to_string()]).unwrap();
        assert_eq!(order, vec!["core", "base", "risk", "cost"]);
    }

    #[test]
    fn import_cycles_terminate() {
        let set = LibrarySet::builtin()
            .with_library("a", importing(&["b"]))
            .with_library("b", importing(&["a"]));
        assert_eq!(set.resolve(&["a".to_string()]).unwrap(), vec!["core", "b", "a"]);
    }

    #[test]
    fn unknown_library_is_an_error() {
        let err = LibrarySet::builtin()
            .resolve(&["missing".to_string()])
            .unwrap_err();
        assert!(matches!(err, Error::UnknownLibrary(ref name) if name == "missing"));
    }

    #[test]
    fn libraries_load_from_json() {
        let set = LibrarySet::from_json(
            r#"{"weights": {"properties": {"w": {"value": 1}}, "root": {"w": 2}}}"#,
        )
        .unwrap();
        assert!(set.get("core").is_some());
        assert!(set.get("weights").unwrap().properties.contains_key("w"));
    }
}
