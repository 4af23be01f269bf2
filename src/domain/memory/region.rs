//! Region layout: named, positionally fixed slots in a working memory.

use serde::{Deserialize, Serialize};

use crate::domain::foundation::ValidationError;

use super::errors::MemoryError;

/// Region holding the soul's personality and framing.
pub const CORE_REGION: &str = "core";
/// Region holding retrieved knowledge for the current exchange.
pub const CONTEXT_REGION: &str = "context";
/// Region holding summaries of compressed history.
pub const SUMMARY_REGION: &str = "summary";

/// Whether a region may be rewritten by compression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RegionKind {
    /// Always linearized first, never compressed.
    Persistent,
    /// Linearized after persistent regions; may be replaced by a summary.
    Compressible,
}

/// A single region declaration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionSpec {
    pub name: String,
    pub kind: RegionKind,
}

/// Ordered region declarations for a working memory.
///
/// Linearization walks persistent regions in declaration order, then
/// compressible regions in declaration order, then freeform entries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegionLayout {
    specs: Vec<RegionSpec>,
}

impl RegionLayout {
    /// Creates a layout with no regions; every entry is freeform.
    pub fn empty() -> Self {
        Self { specs: Vec::new() }
    }

    /// Declares a region, rejecting empty or duplicate names.
    pub fn with_region(mut self, name: impl Into<String>, kind: RegionKind) -> Result<Self, MemoryError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(ValidationError::empty_field("region").into());
        }
        if self.get(&name).is_some() {
            return Err(MemoryError::DuplicateRegion(name));
        }
        self.specs.push(RegionSpec { name, kind });
        Ok(self)
    }

    /// Looks up a region by name.
    pub fn get(&self, name: &str) -> Option<&RegionSpec> {
        self.specs.iter().find(|spec| spec.name == name)
    }

    /// Returns true if the region exists and is compressible.
    pub fn is_compressible(&self, name: &str) -> bool {
        matches!(self.get(name), Some(spec) if spec.kind == RegionKind::Compressible)
    }

    /// Region names in linearization order.
    pub fn linearization_order(&self) -> impl Iterator<Item = &str> {
        let persistent = self
            .specs
            .iter()
            .filter(|spec| spec.kind == RegionKind::Persistent);
        let compressible = self
            .specs
            .iter()
            .filter(|spec| spec.kind == RegionKind::Compressible);
        persistent.chain(compressible).map(|spec| spec.name.as_str())
    }

    /// All declared regions, in declaration order.
    pub fn specs(&self) -> &[RegionSpec] {
        &self.specs
    }
}

impl Default for RegionLayout {
    fn default() -> Self {
        Self {
            specs: vec![
                RegionSpec {
                    name: CORE_REGION.to_string(),
                    kind: RegionKind::Persistent,
                },
                RegionSpec {
                    name: CONTEXT_REGION.to_string(),
                    kind: RegionKind::Persistent,
                },
                RegionSpec {
                    name: SUMMARY_REGION.to_string(),
                    kind: RegionKind::Compressible,
                },
            ],
        }
    }
}
