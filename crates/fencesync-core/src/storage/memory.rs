//! In-memory storage implementation.

use super::{BoxFuture, Storage, StorageError, StorageResult};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::RwLock;

/// In-memory storage for testing and ephemeral use.
#[derive(Default)]
pub struct MemoryStorage {
    plans: RwLock<BTreeMap<String, Value>>,
}

impl MemoryStorage {
    /// Create a new empty memory storage.
    pub fn new() -> Self {
        Self::default()
    }
}

fn lock_error(e: impl std::fmt::Display) -> StorageError {
    StorageError::Other(format!("Lock error: {}", e))
}

impl Storage for MemoryStorage {
    fn save(&self, id: &str, plan: &Value) -> BoxFuture<'_, StorageResult<()>> {
        let id = id.to_string();
        let plan = plan.clone();
        Box::pin(async move {
            let mut plans = self.plans.write().map_err(lock_error)?;
            plans.insert(id, plan);
            Ok(())
        })
    }

    fn load(&self, id: &str) -> BoxFuture<'_, StorageResult<Value>> {
        let id = id.to_string();
        Box::pin(async move {
            let plans = self.plans.read().map_err(lock_error)?;
            plans.get(&id).cloned().ok_or(StorageError::NotFound(id))
        })
    }

    fn delete(&self, id: &str) -> BoxFuture<'_, StorageResult<()>> {
        let id = id.to_string();
        Box::pin(async move {
            let mut plans = self.plans.write().map_err(lock_error)?;
            plans.remove(&id);
            Ok(())
        })
    }

    fn list(&self) -> BoxFuture<'_, StorageResult<Vec<String>>> {
        Box::pin(async move {
            let plans = self.plans.read().map_err(lock_error)?;
            Ok(plans.keys().cloned().collect())
        })
    }

    fn exists(&self, id: &str) -> BoxFuture<'_, StorageResult<bool>> {
        let id = id.to_string();
        Box::pin(async move {
            let plans = self.plans.read().map_err(lock_error)?;
            Ok(plans.contains_key(&id))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::block_on;
    use serde_json::json;

    fn plan() -> Value {
        json!({ "version": 2, "polygons": [], "circles": [] })
    }

    #[test]
    fn test_save_and_load() {
        let storage = MemoryStorage::new();
        block_on(storage.save("test", &plan())).unwrap();
        assert_eq!(block_on(storage.load("test")).unwrap(), plan());
    }

    #[test]
    fn test_not_found() {
        let storage = MemoryStorage::new();
        let result = block_on(storage.load("nonexistent"));
        assert!(matches!(result, Err(StorageError::NotFound(_))));
    }

    #[test]
    fn test_delete() {
        let storage = MemoryStorage::new();
        block_on(storage.save("test", &plan())).unwrap();
        assert!(block_on(storage.exists("test")).unwrap());

        block_on(storage.delete("test")).unwrap();
        assert!(!block_on(storage.exists("test")).unwrap());
        block_on(storage.delete("test")).unwrap();
    }

    #[test]
    fn test_list_sorted() {
        let storage = MemoryStorage::new();
        block_on(storage.save("field-b", &plan())).unwrap();
        block_on(storage.save("field-a", &plan())).unwrap();
        assert_eq!(block_on(storage.list()).unwrap(), vec!["field-a", "field-b"]);
    }
}
