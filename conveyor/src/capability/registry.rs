//! Registry mapping stage names to capabilities.

use super::StageCapability;
use dashmap::DashMap;
use std::sync::Arc;

/// A concurrent registry of stage capabilities, keyed by stage name.
///
/// A job's stage sequence is resolved against the registry at run time;
/// selection is purely by name, never by inspecting the capability type.
#[derive(Debug, Default)]
pub struct CapabilityRegistry {
    capabilities: DashMap<String, Arc<dyn StageCapability>>,
}

impl CapabilityRegistry {
    /// Creates a new empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a capability under its own name.
    ///
    /// A later registration for the same name replaces the earlier one.
    pub fn register(&self, capability: Arc<dyn StageCapability>) {
        self.capabilities
            .insert(capability.name().to_string(), capability);
    }

    /// Returns the capability registered for a stage name.
    #[must_use]
    pub fn get(&self, stage_name: &str) -> Option<Arc<dyn StageCapability>> {
        self.capabilities.get(stage_name).map(|c| c.clone())
    }

    /// Returns true if a capability is registered for the stage name.
    #[must_use]
    pub fn contains(&self, stage_name: &str) -> bool {
        self.capabilities.contains_key(stage_name)
    }

    /// Returns all registered stage names.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.capabilities
            .iter()
            .map(|entry| entry.key().clone())
            .collect()
    }

    /// Returns the number of registered capabilities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.capabilities.len()
    }

    /// Returns true if no capabilities are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.capabilities.is_empty()
    }
}
