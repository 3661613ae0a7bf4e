//! Session traits for store access.
//!
//! Responsibilities:
//! - Define a minimal storage-agnostic API for object/link CRUD and type
//!   metadata lookup, sized to what the execution subsystem needs.
//! - Keep interfaces small so alternate backends stay easy to write.
//!
//! One session is opened per execution request; a session is never shared
//! across concurrent requests.

use crate::error::StoreError;
use crate::types::{
    FunctionDefinition, LinkDirection, LinkRecord, LinkType, ObjectRecord, ObjectType,
};
use serde_json::Value;

/// Storage-agnostic session over object and link instances plus their type
/// metadata.
///
/// Notes:
/// - Implementations must be Send + Sync to allow sharing behind Arcs.
/// - `query_objects` matches objects whose properties equal every entry of
///   `filters` (an empty filter map matches all objects of the type).
pub trait DataStoreSession: Send + Sync {
    fn get_object(&self, id: &str) -> Result<Option<ObjectRecord>, StoreError>;
    fn create_object(&self, type_id: &str, properties: Value) -> Result<ObjectRecord, StoreError>;
    fn update_object(&self, id: &str, patch: Value) -> Result<ObjectRecord, StoreError>;
    fn delete_object(&self, id: &str) -> Result<bool, StoreError>;
    fn query_objects(
        &self,
        type_id: &str,
        filters: &Value,
        limit: Option<usize>,
    ) -> Result<Vec<ObjectRecord>, StoreError>;

    fn get_object_type(&self, id: &str) -> Result<Option<ObjectType>, StoreError>;
    fn find_object_type_by_api_name(&self, api_name: &str)
        -> Result<Option<ObjectType>, StoreError>;

    fn get_link_type(&self, id: &str) -> Result<Option<LinkType>, StoreError>;
    fn find_link_type_by_api_name(&self, api_name: &str) -> Result<Option<LinkType>, StoreError>;

    /// Returns link rows of the given type touching `object_id` in the given
    /// direction. For `Both`, rows where the object appears on either side
    /// are returned once each.
    fn links_for_object(
        &self,
        object_id: &str,
        link_type_id: &str,
        direction: LinkDirection,
    ) -> Result<Vec<LinkRecord>, StoreError>;
    fn create_link(
        &self,
        link_type_id: &str,
        source_id: &str,
        target_id: &str,
        properties: Value,
    ) -> Result<LinkRecord, StoreError>;
    fn delete_link(&self, id: &str) -> Result<bool, StoreError>;
}

/// Read-only lookup of stored user functions.
pub trait FunctionRegistry: Send + Sync {
    fn get_function(&self, id: &str) -> Result<Option<FunctionDefinition>, StoreError>;
    fn find_function_by_api_name(
        &self,
        api_name: &str,
    ) -> Result<Option<FunctionDefinition>, StoreError>;
}
