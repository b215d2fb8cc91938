//! In-memory store: per-entity ordered rows behind one lock.
//!
//! Backs the test suite and small deployments. Unique-field checks mirror
//! what the PostgreSQL backend gets from unique indexes.

use super::{Key, Record, Store, StoreError, StoreScope};
use crate::descriptor::EntityDescriptor;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Default)]
struct TableState {
    rows: BTreeMap<Key, Record>,
    last_key: Key,
}

impl TableState {
    fn next_key(&mut self) -> Key {
        self.last_key += 1;
        self.last_key
    }
}

type Tables = HashMap<String, TableState>;

#[derive(Clone, Default)]
pub struct MemoryStore {
    tables: Arc<Mutex<Tables>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn scope(&self) -> Result<Box<dyn StoreScope>, StoreError> {
        Ok(Box::new(MemoryScope {
            tables: Arc::clone(&self.tables),
        }))
    }
}

struct MemoryScope {
    tables: Arc<Mutex<Tables>>,
}

impl MemoryScope {
    fn lock(&self) -> Result<MutexGuard<'_, Tables>, StoreError> {
        self.tables
            .lock()
            .map_err(|_| StoreError::Backend("store lock poisoned".into()))
    }
}

/// Field name of the first unique-field collision with another row, if any.
fn unique_clash(
    entity: &EntityDescriptor,
    table: &TableState,
    record: &Record,
    skip_key: Option<Key>,
) -> Option<String> {
    for field in entity.fields.iter().filter(|f| f.unique) {
        let candidate = match record.get(&field.name) {
            Some(v) if !v.is_null() => v,
            _ => continue,
        };
        let clash = table.rows.iter().any(|(key, row)| {
            Some(*key) != skip_key && row.get(&field.name) == Some(candidate)
        });
        if clash {
            return Some(field.name.clone());
        }
    }
    None
}

#[async_trait]
impl StoreScope for MemoryScope {
    async fn insert(
        &mut self,
        entity: &EntityDescriptor,
        mut record: Record,
    ) -> Result<Record, StoreError> {
        let mut tables = self.lock()?;
        let table = tables.entry(entity.name.clone()).or_default();
        if let Some(field) = unique_clash(entity, table, &record, None) {
            return Err(StoreError::Conflict(format!("duplicate value for {field}")));
        }
        let key = table.next_key();
        record.insert(entity.primary_key_field.clone(), Value::from(key));
        table.rows.insert(key, record.clone());
        Ok(record)
    }

    async fn get(
        &mut self,
        entity: &EntityDescriptor,
        key: Key,
    ) -> Result<Option<Record>, StoreError> {
        let tables = self.lock()?;
        Ok(tables
            .get(&entity.name)
            .and_then(|table| table.rows.get(&key))
            .cloned())
    }

    async fn list(&mut self, entity: &EntityDescriptor) -> Result<Vec<Record>, StoreError> {
        let tables = self.lock()?;
        Ok(tables
            .get(&entity.name)
            .map(|table| table.rows.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn update(
        &mut self,
        entity: &EntityDescriptor,
        record: Record,
    ) -> Result<Record, StoreError> {
        let key = record
            .get(&entity.primary_key_field)
            .and_then(Value::as_i64)
            .ok_or_else(|| StoreError::Backend("update without primary key".into()))?;
        let mut tables = self.lock()?;
        let table = tables
            .get_mut(&entity.name)
            .ok_or(StoreError::NotFound)?;
        if !table.rows.contains_key(&key) {
            return Err(StoreError::NotFound);
        }
        if let Some(field) = unique_clash(entity, table, &record, Some(key)) {
            return Err(StoreError::Conflict(format!("duplicate value for {field}")));
        }
        table.rows.insert(key, record.clone());
        Ok(record)
    }

    async fn delete(&mut self, entity: &EntityDescriptor, key: Key) -> Result<(), StoreError> {
        let mut tables = self.lock()?;
        let table = tables
            .get_mut(&entity.name)
            .ok_or(StoreError::NotFound)?;
        table.rows.remove(&key).map(|_| ()).ok_or(StoreError::NotFound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::FieldType;
    use serde_json::json;

    fn person() -> EntityDescriptor {
        EntityDescriptor::new("person")
            .with_field("name", FieldType::Text)
            .with_unique_field("email", FieldType::Text)
    }

    fn record(pairs: &[(&str, Value)]) -> Record {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[tokio::test]
    async fn insert_assigns_sequential_keys() {
        let store = MemoryStore::new();
        let entity = person();
        let mut scope = store.scope().await.unwrap();

        let first = scope
            .insert(&entity, record(&[("name", json!("John"))]))
            .await
            .unwrap();
        let second = scope
            .insert(&entity, record(&[("name", json!("Jane"))]))
            .await
            .unwrap();
        assert_eq!(first.get("pk"), Some(&json!(1)));
        assert_eq!(second.get("pk"), Some(&json!(2)));
    }

    #[tokio::test]
    async fn unique_field_conflicts() {
        let store = MemoryStore::new();
        let entity = person();
        let mut scope = store.scope().await.unwrap();

        scope
            .insert(&entity, record(&[("email", json!("j@x.com"))]))
            .await
            .unwrap();
        let err = scope
            .insert(&entity, record(&[("email", json!("j@x.com"))]))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }

    #[tokio::test]
    async fn delete_is_visible_and_not_repeatable() {
        let store = MemoryStore::new();
        let entity = person();
        let mut scope = store.scope().await.unwrap();

        let row = scope
            .insert(&entity, record(&[("name", json!("John"))]))
            .await
            .unwrap();
        let key = row.get("pk").and_then(Value::as_i64).unwrap();

        scope.delete(&entity, key).await.unwrap();
        assert!(scope.get(&entity, key).await.unwrap().is_none());
        assert!(matches!(
            scope.delete(&entity, key).await,
            Err(StoreError::NotFound)
        ));
    }

    #[tokio::test]
    async fn update_replaces_row() {
        let store = MemoryStore::new();
        let entity = person();
        let mut scope = store.scope().await.unwrap();

        let row = scope
            .insert(&entity, record(&[("name", json!("John"))]))
            .await
            .unwrap();
        let mut updated = row.clone();
        updated.insert("name".into(), json!("Johnny"));
        scope.update(&entity, updated).await.unwrap();

        let fetched = scope
            .get(&entity, row.get("pk").and_then(Value::as_i64).unwrap())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(fetched.get("name"), Some(&json!("Johnny")));
    }

    #[tokio::test]
    async fn scopes_share_the_same_tables() {
        let store = MemoryStore::new();
        let entity = person();

        let mut first = store.scope().await.unwrap();
        let row = first
            .insert(&entity, record(&[("name", json!("John"))]))
            .await
            .unwrap();
        drop(first);

        let mut second = store.scope().await.unwrap();
        let key = row.get("pk").and_then(Value::as_i64).unwrap();
        assert!(second.get(&entity, key).await.unwrap().is_some());
    }
}
