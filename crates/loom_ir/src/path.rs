//! Hierarchical module paths such as `top.cpu.alu`.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The path of a module instance from the root, one component per level.
///
/// Named submodules contribute their name; anonymous ones contribute their
/// module kind.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct HierPath(Vec<String>);

impl HierPath {
    /// Creates a path consisting of the root component only.
    pub fn root(name: impl Into<String>) -> Self {
        Self(vec![name.into()])
    }

    /// Returns a new path extended by one component.
    pub fn child(&self, component: impl Into<String>) -> Self {
        let mut parts = self.0.clone();
        parts.push(component.into());
        Self(parts)
    }

    /// Returns the components, outermost first.
    pub fn components(&self) -> &[String] {
        &self.0
    }

    /// Returns the number of components.
    pub fn depth(&self) -> usize {
        self.0.len()
    }
}

impl From<Vec<String>> for HierPath {
    fn from(parts: Vec<String>) -> Self {
        Self(parts)
    }
}

impl fmt::Display for HierPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join("."))
    }
}
