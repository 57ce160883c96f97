//! Collaborators the engine reads from but does not own: the table registry
//! and the customer directory.

use std::path::Path;

use async_trait::async_trait;
use dashmap::{DashMap, DashSet};
use serde::Deserialize;

use crate::engine::{Entity, EngineError};
use crate::model::*;

#[async_trait]
pub trait TableRegistry: Send + Sync {
    async fn get_table(&self, id: TableId) -> Result<Table, EngineError>;

    /// Tables seating at least `min_capacity`, optionally restricted to one status.
    async fn list_tables(
        &self,
        min_capacity: u32,
        status: Option<TableStatus>,
    ) -> Result<Vec<Table>, EngineError>;
}

#[async_trait]
pub trait CustomerDirectory: Send + Sync {
    async fn customer_exists(&self, id: CustomerId) -> Result<bool, EngineError>;
}

#[derive(Default)]
pub struct InMemoryRegistry {
    tables: DashMap<TableId, Table>,
}

impl InMemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_table(&self, table: Table) {
        self.tables.insert(table.id, table);
    }

    /// Flip a table in or out of service. Returns false if the table is unknown.
    pub fn set_status(&self, id: TableId, status: TableStatus) -> bool {
        match self.tables.get_mut(&id) {
            Some(mut t) => {
                t.status = status;
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}

#[async_trait]
impl TableRegistry for InMemoryRegistry {
    async fn get_table(&self, id: TableId) -> Result<Table, EngineError> {
        self.tables
            .get(&id)
            .map(|e| e.value().clone())
            .ok_or_else(|| EngineError::not_found(Entity::Table, id))
    }

    async fn list_tables(
        &self,
        min_capacity: u32,
        status: Option<TableStatus>,
    ) -> Result<Vec<Table>, EngineError> {
        Ok(self
            .tables
            .iter()
            .filter(|e| e.capacity >= min_capacity && status.is_none_or(|s| e.status == s))
            .map(|e| e.value().clone())
            .collect())
    }
}

#[derive(Default)]
pub struct InMemoryDirectory {
    customers: DashSet<CustomerId>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_customer(&self, id: CustomerId) {
        self.customers.insert(id);
    }
}

#[async_trait]
impl CustomerDirectory for InMemoryDirectory {
    async fn customer_exists(&self, id: CustomerId) -> Result<bool, EngineError> {
        Ok(self.customers.contains(&id))
    }
}

/// Startup data for the in-memory collaborators.
#[derive(Debug, Default, Deserialize)]
pub struct Seed {
    #[serde(default)]
    pub tables: Vec<Table>,
    #[serde(default)]
    pub customers: Vec<CustomerId>,
}

impl Seed {
    pub fn from_json(raw: &str) -> serde_json::Result<Self> {
        serde_json::from_str(raw)
    }

    pub fn load(path: &Path) -> std::io::Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json(&raw).map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    }

    pub fn into_collaborators(self) -> (InMemoryRegistry, InMemoryDirectory) {
        let registry = InMemoryRegistry::new();
        for table in self.tables {
            registry.insert_table(table);
        }
        let directory = InMemoryDirectory::new();
        for id in self.customers {
            directory.insert_customer(id);
        }
        (registry, directory)
    }
}
