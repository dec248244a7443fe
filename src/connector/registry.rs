// src/connector/registry.rs
//! Registry mapping connector ids to connector instances.
//!
//! Built once at startup from configuration, then shared immutably behind an
//! `Arc`. Enumeration follows registration order; that order only affects
//! report and log ordering, never correctness.

use std::collections::HashMap;
use std::sync::Arc;

use crate::connector::Connector;
use crate::error::RegistryError;

#[derive(Default)]
pub struct ConnectorRegistry {
    connectors: Vec<Arc<dyn Connector>>,
    index: HashMap<String, usize>,
}

impl ConnectorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connector under its `connector_id`.
    pub fn register(&mut self, connector: Arc<dyn Connector>) -> Result<(), RegistryError> {
        let id = connector.connector_id().to_string();
        if self.index.contains_key(&id) {
            return Err(RegistryError::Duplicate(id));
        }
        self.index.insert(id, self.connectors.len());
        self.connectors.push(connector);
        Ok(())
    }

    pub fn get(&self, connector_id: &str) -> Option<Arc<dyn Connector>> {
        self.index
            .get(connector_id)
            .map(|&i| Arc::clone(&self.connectors[i]))
    }

    /// All connectors, in registration order.
    pub fn all(&self) -> impl Iterator<Item = &Arc<dyn Connector>> {
        self.connectors.iter()
    }

    /// All connector ids, in registration order.
    pub fn ids(&self) -> Vec<String> {
        self.connectors
            .iter()
            .map(|c| c.connector_id().to_string())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.connectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connectors.is_empty()
    }
}

impl std::fmt::Debug for ConnectorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectorRegistry")
            .field("ids", &self.ids())
            .finish()
    }
}
