//! Capability API injected into in-process script execution.
//!
//! One `CapabilityApi` instance wraps one data-store session for the
//! lifetime of one execution request. Every call is appended to an ordered
//! in-memory log (params and result-or-error) that only the host can see;
//! the log is never exposed to the running script.
//!
//! Store failures are raised into the script as runtime faults; the
//! executor converts them into a non-throwing `ExecutionResult`.

use rhai::{Dynamic, Engine, EvalAltResult, Position};
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use veld_store::{DataStoreSession, LinkDirection, ObjectRecord, StoreError};

/// Function names scripts may call; also used by the dispatcher to detect
/// capability usage in a script body.
pub const CAPABILITY_FUNCTION_NAMES: [&str; 10] = [
    "get_object",
    "update_object",
    "create_object",
    "delete_object",
    "query_objects",
    "get_linked_objects",
    "create_link",
    "delete_link",
    "get_source",
    "get_object_type",
];

/// One audited capability call.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CapabilityCallRecord {
    pub operation: String,
    pub params: Value,
    pub result: Option<Value>,
    pub error: Option<String>,
}

pub struct CapabilityApi {
    session: Arc<dyn DataStoreSession>,
    source_context: Value,
    log: Mutex<Vec<CapabilityCallRecord>>,
}

fn object_to_json(record: &ObjectRecord) -> Result<Value, StoreError> {
    Ok(serde_json::to_value(record)?)
}

impl CapabilityApi {
    pub fn new(session: Arc<dyn DataStoreSession>, source_context: Value) -> Self {
        Self {
            session,
            source_context,
            log: Mutex::new(Vec::new()),
        }
    }

    /// Snapshot of the ordered call log.
    pub fn call_log(&self) -> Vec<CapabilityCallRecord> {
        self.log.lock().map(|l| l.clone()).unwrap_or_default()
    }

    fn logged(
        &self,
        operation: &str,
        params: Value,
        outcome: Result<Value, StoreError>,
    ) -> Result<Value, StoreError> {
        let record = match &outcome {
            Ok(v) => CapabilityCallRecord {
                operation: operation.to_string(),
                params,
                result: Some(v.clone()),
                error: None,
            },
            Err(e) => CapabilityCallRecord {
                operation: operation.to_string(),
                params,
                result: None,
                error: Some(e.to_string()),
            },
        };
        if let Ok(mut log) = self.log.lock() {
            log.push(record);
        }
        outcome
    }

    pub fn get_object(&self, id: &str) -> Result<Value, StoreError> {
        let outcome = self.session.get_object(id).and_then(|found| match found {
            Some(rec) => object_to_json(&rec),
            None => Ok(Value::Null),
        });
        self.logged("get_object", json!({ "id": id }), outcome)
    }

    pub fn update_object(&self, id: &str, patch: Value) -> Result<Value, StoreError> {
        let params = json!({ "id": id, "patch": patch });
        let outcome = self
            .session
            .update_object(id, patch)
            .and_then(|rec| object_to_json(&rec));
        self.logged("update_object", params, outcome)
    }

    pub fn create_object(&self, type_id: &str, properties: Value) -> Result<Value, StoreError> {
        let params = json!({ "type_id": type_id, "properties": properties });
        let outcome = self
            .session
            .create_object(type_id, properties)
            .and_then(|rec| object_to_json(&rec));
        self.logged("create_object", params, outcome)
    }

    pub fn delete_object(&self, id: &str) -> Result<Value, StoreError> {
        let outcome = self.session.delete_object(id).map(Value::Bool);
        self.logged("delete_object", json!({ "id": id }), outcome)
    }

    /// Queries objects by type id or api-name. An unresolved type name
    /// yields an empty sequence, not an error.
    pub fn query_objects(
        &self,
        type_ref: &str,
        filters: Value,
        limit: Option<usize>,
    ) -> Result<Value, StoreError> {
        let params = json!({ "type": type_ref, "filters": filters, "limit": limit });
        let outcome = (|| {
            let resolved = match self.session.get_object_type(type_ref)? {
                Some(t) => Some(t),
                None => self.session.find_object_type_by_api_name(type_ref)?,
            };
            let type_id = match resolved {
                Some(t) => t.id,
                None => return Ok(Value::Array(Vec::new())),
            };
            let records = self.session.query_objects(&type_id, &filters, limit)?;
            let mut out = Vec::with_capacity(records.len());
            for rec in &records {
                out.push(object_to_json(rec)?);
            }
            Ok(Value::Array(out))
        })();
        self.logged("query_objects", params, outcome)
    }

    /// Returns distinct neighbor objects connected to `id` through the
    /// given link type, each with the link row's own properties attached
    /// under `link_properties`. For `both`, the neighbor of each row is
    /// resolved against the origin so no row is counted twice.
    pub fn get_linked_objects(
        &self,
        id: &str,
        link_type_ref: &str,
        direction: &str,
    ) -> Result<Value, StoreError> {
        let params = json!({ "id": id, "link_type": link_type_ref, "direction": direction });
        let outcome = (|| {
            let dir = LinkDirection::parse(direction).ok_or_else(|| {
                StoreError::TypeMismatch(format!(
                    "unknown direction '{}' (expected outgoing, incoming or both)",
                    direction
                ))
            })?;
            let link_type = match self.session.get_link_type(link_type_ref)? {
                Some(t) => Some(t),
                None => self.session.find_link_type_by_api_name(link_type_ref)?,
            }
            .ok_or_else(|| {
                StoreError::NotFound(format!("link type '{}' does not exist", link_type_ref))
            })?;

            let rows = self.session.links_for_object(id, &link_type.id, dir)?;
            let mut seen: HashSet<String> = HashSet::new();
            let mut out = Vec::new();
            for row in &rows {
                let neighbor_id = if row.source_id == id {
                    &row.target_id
                } else {
                    &row.source_id
                };
                if !seen.insert(neighbor_id.clone()) {
                    continue;
                }
                let Some(neighbor) = self.session.get_object(neighbor_id)? else {
                    continue;
                };
                let mut hydrated = object_to_json(&neighbor)?;
                if let Some(map) = hydrated.as_object_mut() {
                    map.insert("link_properties".to_string(), row.properties.clone());
                }
                out.push(hydrated);
            }
            Ok(Value::Array(out))
        })();
        self.logged("get_linked_objects", params, outcome)
    }

    pub fn create_link(
        &self,
        link_type_ref: &str,
        source_id: &str,
        target_id: &str,
        properties: Value,
    ) -> Result<Value, StoreError> {
        let params = json!({
            "link_type": link_type_ref,
            "source_id": source_id,
            "target_id": target_id,
            "properties": properties,
        });
        let outcome = (|| {
            let link_type = match self.session.get_link_type(link_type_ref)? {
                Some(t) => Some(t),
                None => self.session.find_link_type_by_api_name(link_type_ref)?,
            }
            .ok_or_else(|| {
                StoreError::NotFound(format!("link type '{}' does not exist", link_type_ref))
            })?;
            let rec = self
                .session
                .create_link(&link_type.id, source_id, target_id, properties)?;
            Ok(serde_json::to_value(&rec)?)
        })();
        self.logged("create_link", params, outcome)
    }

    pub fn delete_link(&self, id: &str) -> Result<Value, StoreError> {
        let outcome = self.session.delete_link(id).map(Value::Bool);
        self.logged("delete_link", json!({ "id": id }), outcome)
    }

    /// The context object that triggered this execution.
    pub fn get_source(&self) -> Result<Value, StoreError> {
        let source = self.source_context.clone();
        self.logged("get_source", json!({}), Ok(source))
    }

    pub fn get_object_type(&self, type_ref: &str) -> Result<Value, StoreError> {
        let outcome = (|| {
            let resolved = match self.session.get_object_type(type_ref)? {
                Some(t) => Some(t),
                None => self.session.find_object_type_by_api_name(type_ref)?,
            };
            match resolved {
                Some(t) => Ok(serde_json::to_value(&t)?),
                None => Ok(Value::Null),
            }
        })();
        self.logged("get_object_type", json!({ "ref": type_ref }), outcome)
    }
}

fn store_fault(e: StoreError) -> Box<EvalAltResult> {
    EvalAltResult::ErrorRuntime(
        Dynamic::from(format!("capability error: {}", e)),
        Position::NONE,
    )
    .into()
}

fn map_to_json(map: rhai::Map) -> Result<Value, Box<EvalAltResult>> {
    rhai::serde::from_dynamic(&Dynamic::from(map))
}

fn json_result(value: Value) -> Result<Dynamic, Box<EvalAltResult>> {
    crate::engine::json_to_dynamic(&value)
}

/// Registers the capability surface into a script engine. Each closure
/// holds its own handle to the shared api instance.
pub fn register_capabilities(engine: &mut Engine, api: Arc<CapabilityApi>) {
    let a = Arc::clone(&api);
    engine.register_fn("get_object", move |id: &str| {
        json_result(a.get_object(id).map_err(store_fault)?)
    });

    let a = Arc::clone(&api);
    engine.register_fn("update_object", move |id: &str, patch: rhai::Map| {
        json_result(a.update_object(id, map_to_json(patch)?).map_err(store_fault)?)
    });

    let a = Arc::clone(&api);
    engine.register_fn("create_object", move |type_id: &str, props: rhai::Map| {
        json_result(a.create_object(type_id, map_to_json(props)?).map_err(store_fault)?)
    });

    let a = Arc::clone(&api);
    engine.register_fn("delete_object", move |id: &str| {
        json_result(a.delete_object(id).map_err(store_fault)?)
    });

    let a = Arc::clone(&api);
    engine.register_fn("query_objects", move |type_ref: &str| {
        json_result(a.query_objects(type_ref, json!({}), None).map_err(store_fault)?)
    });
    let a = Arc::clone(&api);
    engine.register_fn("query_objects", move |type_ref: &str, filters: rhai::Map| {
        json_result(
            a.query_objects(type_ref, map_to_json(filters)?, None)
                .map_err(store_fault)?,
        )
    });
    let a = Arc::clone(&api);
    engine.register_fn(
        "query_objects",
        move |type_ref: &str, filters: rhai::Map, limit: i64| {
            let limit = if limit >= 0 { Some(limit as usize) } else { None };
            json_result(
                a.query_objects(type_ref, map_to_json(filters)?, limit)
                    .map_err(store_fault)?,
            )
        },
    );

    let a = Arc::clone(&api);
    engine.register_fn(
        "get_linked_objects",
        move |id: &str, link_type: &str, direction: &str| {
            json_result(
                a.get_linked_objects(id, link_type, direction)
                    .map_err(store_fault)?,
            )
        },
    );

    let a = Arc::clone(&api);
    engine.register_fn(
        "create_link",
        move |link_type: &str, source_id: &str, target_id: &str, props: rhai::Map| {
            json_result(
                a.create_link(link_type, source_id, target_id, map_to_json(props)?)
                    .map_err(store_fault)?,
            )
        },
    );

    let a = Arc::clone(&api);
    engine.register_fn("delete_link", move |id: &str| {
        json_result(a.delete_link(id).map_err(store_fault)?)
    });

    let a = Arc::clone(&api);
    engine.register_fn("get_source", move || {
        json_result(a.get_source().map_err(store_fault)?)
    });

    let a = Arc::clone(&api);
    engine.register_fn("get_object_type", move |type_ref: &str| {
        json_result(a.get_object_type(type_ref).map_err(store_fault)?)
    });
}
