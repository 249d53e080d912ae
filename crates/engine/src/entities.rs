use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::{Error, Result};

/// The closed set of entity tables workflow actions may write to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Suppliers,
    InventoryItems,
    PurchaseOrders,
    Orders,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityKind::Suppliers => write!(f, "suppliers"),
            EntityKind::InventoryItems => write!(f, "inventory_items"),
            EntityKind::PurchaseOrders => write!(f, "purchase_orders"),
            EntityKind::Orders => write!(f, "orders"),
        }
    }
}

impl FromStr for EntityKind {
    type Err = Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "suppliers" => Ok(EntityKind::Suppliers),
            "inventory_items" => Ok(EntityKind::InventoryItems),
            "purchase_orders" => Ok(EntityKind::PurchaseOrders),
            "orders" => Ok(EntityKind::Orders),
            other => Err(Error::UnsupportedEntity(other.to_string())),
        }
    }
}

/// Data access for one entity table. Implementations live in the host
/// application's persistence layer; every write is tenant-scoped.
#[async_trait]
pub trait EntityRecords: Send + Sync {
    async fn insert(&self, tenant_id: Uuid, record: Value) -> Result<()>;
    async fn update(&self, tenant_id: Uuid, id: Uuid, fields: Value) -> Result<()>;
}

/// Registry mapping entity kinds to their data-access implementations.
#[derive(Clone, Default)]
pub struct EntityRegistry {
    records: HashMap<EntityKind, Arc<dyn EntityRecords>>,
}

impl EntityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(mut self, kind: EntityKind, records: Arc<dyn EntityRecords>) -> Self {
        self.records.insert(kind, records);
        self
    }

    pub fn records(&self, kind: EntityKind) -> Result<Arc<dyn EntityRecords>> {
        self.records
            .get(&kind)
            .cloned()
            .ok_or_else(|| Error::UnsupportedEntity(kind.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NoopRecords;

    #[async_trait]
    impl EntityRecords for NoopRecords {
        async fn insert(&self, _tenant_id: Uuid, _record: Value) -> Result<()> {
            Ok(())
        }

        async fn update(&self, _tenant_id: Uuid, _id: Uuid, _fields: Value) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn parses_known_tables() {
        assert_eq!("suppliers".parse::<EntityKind>().unwrap(), EntityKind::Suppliers);
        assert_eq!(
            "purchase_orders".parse::<EntityKind>().unwrap(),
            EntityKind::PurchaseOrders
        );
    }

    #[test]
    fn rejects_unknown_tables() {
        let err = "invoices".parse::<EntityKind>().unwrap_err();
        assert!(matches!(err, Error::UnsupportedEntity(t) if t == "invoices"));
    }

    #[test]
    fn registry_rejects_unregistered_kinds() {
        let registry = EntityRegistry::new().register(EntityKind::Orders, Arc::new(NoopRecords));
        assert!(registry.records(EntityKind::Orders).is_ok());
        assert!(matches!(
            registry.records(EntityKind::Suppliers),
            Err(Error::UnsupportedEntity(_))
        ));
    }
}
