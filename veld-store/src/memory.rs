//! In-memory store backend.
//!
//! Backs the test suites and the demo CLI. All collections live behind
//! mutexes so one instance can serve as the session for a whole process.
//! Records are returned by clone; callers never observe internal aliasing.

use crate::error::StoreError;
use crate::session::{DataStoreSession, FunctionRegistry};
use crate::types::{
    FunctionDefinition, LinkDirection, LinkRecord, LinkType, ObjectRecord, ObjectType,
};
use chrono::Utc;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Mutex;
use uuid::Uuid;

#[derive(Debug, Default)]
pub struct MemoryStore {
    objects: Mutex<HashMap<String, ObjectRecord>>,
    links: Mutex<HashMap<String, LinkRecord>>,
    object_types: Mutex<HashMap<String, ObjectType>>,
    link_types: Mutex<HashMap<String, LinkType>>,
    functions: Mutex<HashMap<String, FunctionDefinition>>,
}

fn lock<'a, T>(m: &'a Mutex<T>, what: &str) -> Result<std::sync::MutexGuard<'a, T>, StoreError> {
    m.lock()
        .map_err(|_| StoreError::Backend(format!("{} mutex poisoned", what)))
}

/// True when every entry of `filters` (a JSON object) is matched verbatim by
/// the object's properties. Non-object filters match nothing.
fn matches_filters(record: &ObjectRecord, filters: &Value) -> bool {
    match filters.as_object() {
        Some(map) if map.is_empty() => true,
        Some(map) => map
            .iter()
            .all(|(k, v)| record.property(k).map(|p| p == v).unwrap_or(false)),
        None => filters.is_null(),
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an object type and returns its id.
    pub fn add_object_type(&self, api_name: &str, display_name: &str) -> Result<String, StoreError> {
        let id = Uuid::new_v4().to_string();
        let ot = ObjectType {
            id: id.clone(),
            api_name: api_name.to_string(),
            display_name: display_name.to_string(),
            description: None,
        };
        lock(&self.object_types, "object_types")?.insert(id.clone(), ot);
        Ok(id)
    }

    /// Registers a link type between two object types and returns its id.
    pub fn add_link_type(
        &self,
        api_name: &str,
        source_type_id: &str,
        target_type_id: &str,
    ) -> Result<String, StoreError> {
        let id = Uuid::new_v4().to_string();
        let lt = LinkType {
            id: id.clone(),
            api_name: api_name.to_string(),
            display_name: api_name.to_string(),
            source_type_id: source_type_id.to_string(),
            target_type_id: target_type_id.to_string(),
        };
        lock(&self.link_types, "link_types")?.insert(id.clone(), lt);
        Ok(id)
    }

    /// Stores a user function definition.
    pub fn add_function(&self, def: FunctionDefinition) -> Result<(), StoreError> {
        let mut funcs = lock(&self.functions, "functions")?;
        if funcs.contains_key(&def.id) {
            return Err(StoreError::Conflict(format!(
                "function '{}' already registered",
                def.id
            )));
        }
        funcs.insert(def.id.clone(), def);
        Ok(())
    }
}

impl DataStoreSession for MemoryStore {
    fn get_object(&self, id: &str) -> Result<Option<ObjectRecord>, StoreError> {
        Ok(lock(&self.objects, "objects")?.get(id).cloned())
    }

    fn create_object(&self, type_id: &str, properties: Value) -> Result<ObjectRecord, StoreError> {
        if lock(&self.object_types, "object_types")?.get(type_id).is_none() {
            return Err(StoreError::NotFound(format!(
                "object type '{}' does not exist",
                type_id
            )));
        }
        if !properties.is_object() {
            return Err(StoreError::TypeMismatch(
                "object properties must be a JSON object".to_string(),
            ));
        }
        let now = Utc::now();
        let record = ObjectRecord {
            id: Uuid::new_v4().to_string(),
            type_id: type_id.to_string(),
            properties,
            created_at: now,
            updated_at: now,
        };
        lock(&self.objects, "objects")?.insert(record.id.clone(), record.clone());
        Ok(record)
    }

    fn update_object(&self, id: &str, patch: Value) -> Result<ObjectRecord, StoreError> {
        let patch_map = patch.as_object().ok_or_else(|| {
            StoreError::TypeMismatch("object patch must be a JSON object".to_string())
        })?;
        let mut objects = lock(&self.objects, "objects")?;
        let record = objects
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(format!("object '{}' does not exist", id)))?;
        if !record.properties.is_object() {
            record.properties = json!({});
        }
        if let Some(props) = record.properties.as_object_mut() {
            for (k, v) in patch_map {
                props.insert(k.clone(), v.clone());
            }
        }
        record.updated_at = Utc::now();
        Ok(record.clone())
    }

    fn delete_object(&self, id: &str) -> Result<bool, StoreError> {
        let removed = lock(&self.objects, "objects")?.remove(id).is_some();
        if removed {
            // Drop dangling link rows along with the object.
            let mut links = lock(&self.links, "links")?;
            let before = links.len();
            links.retain(|_, l| l.source_id != id && l.target_id != id);
            let dropped = before - links.len();
            if dropped > 0 {
                log::debug!("dropped {} dangling link(s) for object '{}'", dropped, id);
            }
        }
        Ok(removed)
    }

    fn query_objects(
        &self,
        type_id: &str,
        filters: &Value,
        limit: Option<usize>,
    ) -> Result<Vec<ObjectRecord>, StoreError> {
        let objects = lock(&self.objects, "objects")?;
        let mut found: Vec<ObjectRecord> = objects
            .values()
            .filter(|o| o.type_id == type_id && matches_filters(o, filters))
            .cloned()
            .collect();
        found.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        if let Some(n) = limit {
            found.truncate(n);
        }
        Ok(found)
    }

    fn get_object_type(&self, id: &str) -> Result<Option<ObjectType>, StoreError> {
        Ok(lock(&self.object_types, "object_types")?.get(id).cloned())
    }

    fn find_object_type_by_api_name(
        &self,
        api_name: &str,
    ) -> Result<Option<ObjectType>, StoreError> {
        Ok(lock(&self.object_types, "object_types")?
            .values()
            .find(|t| t.api_name == api_name)
            .cloned())
    }

    fn get_link_type(&self, id: &str) -> Result<Option<LinkType>, StoreError> {
        Ok(lock(&self.link_types, "link_types")?.get(id).cloned())
    }

    fn find_link_type_by_api_name(&self, api_name: &str) -> Result<Option<LinkType>, StoreError> {
        Ok(lock(&self.link_types, "link_types")?
            .values()
            .find(|t| t.api_name == api_name)
            .cloned())
    }

    fn links_for_object(
        &self,
        object_id: &str,
        link_type_id: &str,
        direction: LinkDirection,
    ) -> Result<Vec<LinkRecord>, StoreError> {
        let links = lock(&self.links, "links")?;
        let mut found: Vec<LinkRecord> = links
            .values()
            .filter(|l| l.link_type_id == link_type_id)
            .filter(|l| match direction {
                LinkDirection::Outgoing => l.source_id == object_id,
                LinkDirection::Incoming => l.target_id == object_id,
                LinkDirection::Both => l.source_id == object_id || l.target_id == object_id,
            })
            .cloned()
            .collect();
        found.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(found)
    }

    fn create_link(
        &self,
        link_type_id: &str,
        source_id: &str,
        target_id: &str,
        properties: Value,
    ) -> Result<LinkRecord, StoreError> {
        if lock(&self.link_types, "link_types")?.get(link_type_id).is_none() {
            return Err(StoreError::NotFound(format!(
                "link type '{}' does not exist",
                link_type_id
            )));
        }
        {
            let objects = lock(&self.objects, "objects")?;
            for endpoint in [source_id, target_id] {
                if !objects.contains_key(endpoint) {
                    return Err(StoreError::NotFound(format!(
                        "object '{}' does not exist",
                        endpoint
                    )));
                }
            }
        }
        let record = LinkRecord {
            id: Uuid::new_v4().to_string(),
            link_type_id: link_type_id.to_string(),
            source_id: source_id.to_string(),
            target_id: target_id.to_string(),
            properties,
            created_at: Utc::now(),
        };
        lock(&self.links, "links")?.insert(record.id.clone(), record.clone());
        Ok(record)
    }

    fn delete_link(&self, id: &str) -> Result<bool, StoreError> {
        Ok(lock(&self.links, "links")?.remove(id).is_some())
    }
}

impl FunctionRegistry for MemoryStore {
    fn get_function(&self, id: &str) -> Result<Option<FunctionDefinition>, StoreError> {
        Ok(lock(&self.functions, "functions")?.get(id).cloned())
    }

    fn find_function_by_api_name(
        &self,
        api_name: &str,
    ) -> Result<Option<FunctionDefinition>, StoreError> {
        Ok(lock(&self.functions, "functions")?
            .values()
            .find(|f| f.api_name == api_name)
            .cloned())
    }
}
